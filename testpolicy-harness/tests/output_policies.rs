use std::io::Write;

use pretty_assertions::assert_eq;
use testpolicy_harness::EnforcementSession;
use testpolicy_harness::OutputStream;
use testpolicy_harness::PolicyConfig;
use testpolicy_harness::PolicyDecision;
use testpolicy_harness::PolicyKind;

fn running_session(config: PolicyConfig) -> EnforcementSession {
    let config = PolicyConfig {
        silence_warnings: true,
        auto_apply: true,
        ..config
    };
    let mut session = EnforcementSession::with_all_policies(config);
    session.program_start();
    session.suite_start("output");
    session
}

#[test]
fn write_to_denied_stdout_is_reported() {
    let mut session = running_session(PolicyConfig::default());
    let mut stdout = session.tap(OutputStream::Stdout, Vec::new());

    let passed = session.run_test("prints", |_, _| {
        writeln!(stdout, "Hello World").unwrap();
    });
    assert!(!passed);

    session.suite_end("output");
    let report = session.program_end();
    assert_eq!(report.tests[0].record.violations(), vec![PolicyKind::StandardOutput]);
    assert!(
        report.tests[0].record.failures()[0]
            .message
            .starts_with("Policy violation: standard-output\n")
    );
    assert_eq!(stdout.get_ref().as_slice(), b"Hello World\n");
}

#[test]
fn flush_alone_is_not_output() {
    let mut session = running_session(PolicyConfig::default());
    let mut stdout = session.tap(OutputStream::Stdout, Vec::new());
    let mut stderr = session.tap(OutputStream::Stderr, Vec::new());

    let passed = session.run_test("flushes", |_, _| {
        stdout.flush().unwrap();
        stderr.flush().unwrap();
    });
    assert!(passed);
}

#[test]
fn streams_are_guarded_independently() {
    let mut session = running_session(PolicyConfig::default());
    let mut stderr = session.tap(OutputStream::Stderr, Vec::new());

    let passed = session.run_test("complains", |_, _| {
        stderr.write_all(b"warning").unwrap();
    });
    assert!(!passed);
    assert!(session.is_violated(PolicyKind::StandardError));
    assert!(!session.is_violated(PolicyKind::StandardOutput));
}

#[test]
fn granted_stdout_may_be_written() {
    let config = PolicyConfig::default().with_default(PolicyKind::StandardOutput, PolicyDecision::Grant);
    let mut session = running_session(config);
    let mut stdout = session.tap(OutputStream::Stdout, Vec::new());

    let passed = session.run_test("prints", |_, _| {
        stdout.write_all(b"fine").unwrap();
    });
    assert!(passed);
}

#[test]
fn denying_mid_test_opens_window() {
    let config = PolicyConfig::default().with_default(PolicyKind::StandardOutput, PolicyDecision::Grant);
    let mut session = running_session(config);
    let mut stdout = session.tap(OutputStream::Stdout, Vec::new());

    let passed = session.run_test("late-deny", |registry, _| {
        stdout.write_all(b"allowed").unwrap();
        registry.standard_output().deny();
        stdout.write_all(b"forbidden").unwrap();
    });
    assert!(!passed);
    assert!(!session.registry().standard_output().is_denied());
}

#[test]
fn suite_level_grant_ends_with_suite() {
    let mut session = running_session(PolicyConfig::default());
    let mut stdout = session.tap(OutputStream::Stdout, Vec::new());
    session.suite_end("output");

    session.suite_start("verbose");
    session.registry().standard_output().grant();
    let passed = session.run_test("prints", |_, _| {
        stdout.write_all(b"progress").unwrap();
    });
    assert!(passed);
    session.suite_end("verbose");
    assert!(session.registry().standard_output().is_denied());

    session.suite_start("strict");
    let passed = session.run_test("prints", |_, _| {
        stdout.write_all(b"progress").unwrap();
    });
    assert!(!passed);
    session.suite_end("strict");

    let report = session.program_end();
    let suites: Vec<Option<&str>> = report.tests.iter().map(|t| t.suite.as_deref()).collect();
    assert_eq!(suites, vec![Some("verbose"), Some("strict")]);
}

#[test]
fn session_writers_share_the_policy_counter() {
    let session = running_session(PolicyConfig::default());
    let mut tapped = session.tap(OutputStream::Stderr, Vec::new());
    tapped.write_all(b"12345").unwrap();
    assert_eq!(session.stderr().counter().count(), 5);
    assert_eq!(session.stdout().counter().count(), 0);
}
