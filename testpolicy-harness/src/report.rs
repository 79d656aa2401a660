use std::path::Path;

use serde::Deserialize;
use serde::Serialize;
use testpolicy_core::PolicyKind;
use testpolicy_core::TestRecord;

use crate::error::HarnessError;
use crate::error::Result;

/// A finished test and the suite it ran in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub suite: Option<String>,
    #[serde(flatten)]
    pub record: TestRecord,
}

impl TestOutcome {
    pub fn passed(&self) -> bool {
        self.record.passed()
    }
}

/// Outcomes of every test that ended during one program scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub tests: Vec<TestOutcome>,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.tests.iter().all(TestOutcome::passed)
    }

    pub fn failed(&self) -> impl Iterator<Item = &TestOutcome> + '_ {
        self.tests.iter().filter(|outcome| !outcome.passed())
    }

    /// Number of tests that reported a violation of `kind`.
    pub fn violation_count(&self, kind: PolicyKind) -> usize {
        self.tests
            .iter()
            .filter(|outcome| outcome.record.violations().contains(&kind))
            .count()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?).map_err(|source| HarnessError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
