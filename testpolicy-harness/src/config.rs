use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;
use testpolicy_core::PolicyKind;

use crate::error::HarnessError;
use crate::error::Result;

/// Default stance of a policy before any scope overrides it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyDecision {
    Grant,
    Deny,
}

impl PolicyDecision {
    pub fn is_deny(self) -> bool {
        self == Self::Deny
    }
}

/// Session configuration, usually read from a TOML file:
///
/// ```toml
/// auto_apply = true
/// silence_warnings = false
/// capture_process_streams = false
///
/// [defaults]
/// memory-allocation = "deny"
/// standard-output = "grant"
/// ```
///
/// Policies missing from `[defaults]` are denied by default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Arm every registered policy right after each test starts.
    pub auto_apply: bool,
    /// Skip the warning about allocation tracking being unavailable.
    pub silence_warnings: bool,
    /// Redirect the process stdout/stderr descriptors during output
    /// windows instead of counting only the session's writers. Process-wide;
    /// needs a runner that does not share the streams between threads.
    pub capture_process_streams: bool,
    pub defaults: BTreeMap<PolicyKind, PolicyDecision>,
}

impl PolicyConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| HarnessError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string(self)?)
    }

    pub fn with_default(mut self, kind: PolicyKind, decision: PolicyDecision) -> Self {
        self.defaults.insert(kind, decision);
        self
    }

    pub fn with_auto_apply(mut self, auto_apply: bool) -> Self {
        self.auto_apply = auto_apply;
        self
    }

    pub fn decision(&self, kind: PolicyKind) -> PolicyDecision {
        self.defaults
            .get(&kind)
            .copied()
            .unwrap_or(PolicyDecision::Deny)
    }

    pub fn denied_by_default(&self, kind: PolicyKind) -> bool {
        self.decision(kind).is_deny()
    }
}
