use serde::Deserialize;
use serde::Serialize;

use crate::kind::PolicyKind;

// ---------------------------------------------------------------------------
// PolicyViolation
// ---------------------------------------------------------------------------

/// A denied side effect observed inside an armed detection window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyViolation {
    pub policy: PolicyKind,
}

impl PolicyViolation {
    pub fn new(policy: PolicyKind) -> Self {
        Self { policy }
    }
}

impl std::fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Policy violation: {}\n{} is not permitted by the test policy for this test case.",
            self.policy,
            self.policy.description()
        )
    }
}

impl std::error::Error for PolicyViolation {}

// ---------------------------------------------------------------------------
// FailureChannel
// ---------------------------------------------------------------------------

/// What a controller needs from the test runner at test-end: whether the
/// current test already failed, and a way to add a non-fatal failure to it.
pub trait FailureChannel {
    fn has_failure(&self) -> bool;
    fn report_nonfatal(&mut self, violation: PolicyViolation);
}

// ---------------------------------------------------------------------------
// TestRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "policy")]
pub enum FailureKind {
    /// Failure raised by the test body itself.
    Assertion,
    /// Failure raised by a policy controller.
    PolicyViolation(PolicyKind),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// Failures recorded against one test case. Non-fatal: recording a failure
/// never stops the test.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRecord {
    pub name: String,
    failures: Vec<TestFailure>,
}

impl TestRecord {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            failures: Vec::new(),
        }
    }

    /// Record a failure raised by the test itself.
    pub fn add_failure(&mut self, message: &str) {
        self.failures.push(TestFailure {
            kind: FailureKind::Assertion,
            message: message.into(),
        });
    }

    pub fn failures(&self) -> &[TestFailure] {
        &self.failures
    }

    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn violations(&self) -> Vec<PolicyKind> {
        self.failures
            .iter()
            .filter_map(|f| match f.kind {
                FailureKind::PolicyViolation(kind) => Some(kind),
                FailureKind::Assertion => None,
            })
            .collect()
    }
}

impl FailureChannel for TestRecord {
    fn has_failure(&self) -> bool {
        !self.failures.is_empty()
    }

    fn report_nonfatal(&mut self, violation: PolicyViolation) {
        self.failures.push(TestFailure {
            kind: FailureKind::PolicyViolation(violation.policy),
            message: violation.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_new_record_has_no_failure() {
        let record = TestRecord::new("suite.case");
        assert!(record.passed());
        assert!(!record.has_failure());
        assert!(record.failures().is_empty());
    }

    #[test]
    fn test_violation_message_names_policy() {
        let message = PolicyViolation::new(PolicyKind::DynamicMemoryAllocation).to_string();
        assert!(message.starts_with("Policy violation: memory-allocation\n"));
        assert!(message.contains("Dynamic memory allocation is not permitted"));
    }

    #[test]
    fn test_report_nonfatal_records_policy_failure() {
        let mut record = TestRecord::new("suite.case");
        record.report_nonfatal(PolicyViolation::new(PolicyKind::StandardOutput));
        record.add_failure("expected 1, got 2");

        assert!(record.has_failure());
        assert_eq!(record.violations(), vec![PolicyKind::StandardOutput]);
        assert_eq!(record.failures()[1].kind, FailureKind::Assertion);
    }

    #[test]
    fn test_failure_kind_serialization() {
        let json =
            serde_json::to_string(&FailureKind::PolicyViolation(PolicyKind::StandardError))
                .unwrap();
        assert_eq!(json, r#"{"type":"policy_violation","policy":"standard-error"}"#);

        let parsed: FailureKind = serde_json::from_str(r#"{"type":"assertion"}"#).unwrap();
        assert_eq!(parsed, FailureKind::Assertion);
    }
}
