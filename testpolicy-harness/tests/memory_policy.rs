use std::hint::black_box;

use pretty_assertions::assert_eq;
use testpolicy_harness::CountingAllocator;
use testpolicy_harness::EnforcementSession;
use testpolicy_harness::PolicyConfig;
use testpolicy_harness::PolicyDecision;
use testpolicy_harness::PolicyKind;
use tracing_test::traced_test;

#[global_allocator]
static ALLOCATOR: CountingAllocator = CountingAllocator::system();

fn running_session(config: PolicyConfig) -> EnforcementSession {
    let mut session = EnforcementSession::with_all_policies(config.with_auto_apply(true));
    session.program_start();
    session.suite_start("memory");
    session
}

#[test]
fn allocating_test_is_reported() {
    let mut session = running_session(PolicyConfig::default());

    let passed = session.run_test("allocates", |_, _| {
        black_box(Box::new(7u64));
    });
    assert!(!passed);
    assert!(session.is_violated(PolicyKind::DynamicMemoryAllocation));

    session.suite_end("memory");
    let report = session.program_end();
    assert_eq!(report.violation_count(PolicyKind::DynamicMemoryAllocation), 1);
    assert!(
        report.tests[0].record.failures()[0]
            .message
            .contains("Dynamic memory allocation is not permitted")
    );
}

#[test]
fn allocation_free_test_passes() {
    let mut session = running_session(PolicyConfig::default());

    let passed = session.run_test("quiet", |_, _| {
        black_box(1u64 + 1);
    });
    assert!(passed);

    session.suite_end("memory");
    assert!(session.program_end().passed());
}

#[test]
fn allocation_while_granted_mid_test_is_allowed() {
    let mut session = running_session(PolicyConfig::default());

    let passed = session.run_test("granted-window", |registry, _| {
        let memory = registry.memory_allocation();
        memory.grant();
        black_box(Box::new([0u8; 64]));
        memory.deny();
    });
    assert!(passed);
    assert!(session.registry().memory_allocation().is_denied());
}

#[test]
fn allocation_before_grant_is_reported() {
    let mut session = running_session(PolicyConfig::default());

    let passed = session.run_test("late-grant", |registry, _| {
        black_box(vec![1u32, 2, 3]);
        registry.memory_allocation().grant();
    });
    assert!(!passed);
    assert!(session.registry().memory_allocation().is_denied());
}

#[test]
fn failing_test_hides_allocation_violation() {
    let mut session = running_session(PolicyConfig::default());

    // Recording the failure allocates, inside the armed window.
    let passed = session.run_test("already-failed", |_, record| {
        record.add_failure("expected 1, got 2");
    });
    assert!(!passed);
    assert!(session.is_violated(PolicyKind::DynamicMemoryAllocation));

    session.suite_end("memory");
    let report = session.program_end();
    assert_eq!(report.tests[0].record.failures().len(), 1);
    assert_eq!(report.violation_count(PolicyKind::DynamicMemoryAllocation), 0);
}

#[test]
fn granted_by_config_allows_allocation() {
    let config = PolicyConfig::default()
        .with_default(PolicyKind::DynamicMemoryAllocation, PolicyDecision::Grant);
    let mut session = running_session(config);

    let passed = session.run_test("allowed", |_, _| {
        black_box(String::from("allocated"));
    });
    assert!(passed);
}

#[traced_test]
#[test]
fn toggling_other_policies_under_a_subscriber_does_not_allocate() {
    let mut session = running_session(PolicyConfig::default());

    let passed = session.run_test("toggles-output", |registry, _| {
        registry.standard_output().grant();
        registry.standard_error().grant();
        registry.standard_error().deny();
    });
    assert!(passed);
    assert!(!session.is_violated(PolicyKind::DynamicMemoryAllocation));

    session.suite_end("memory");
    assert!(session.program_end().passed());
    assert!(logs_contain("test end"));
}
