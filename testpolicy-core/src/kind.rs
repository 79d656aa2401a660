use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::error::PolicyError;

/// The side effects a test can forbid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    /// Allocating heap memory.
    #[serde(rename = "memory-allocation")]
    DynamicMemoryAllocation,
    /// Writing to the standard output stream.
    StandardOutput,
    /// Writing to the standard error stream.
    StandardError,
}

impl PolicyKind {
    /// Every policy, in registration order. Allocation comes last so that its
    /// detection window opens after, and closes before, the bookkeeping of
    /// the other policies.
    pub const ALL: [PolicyKind; 3] = [
        PolicyKind::StandardOutput,
        PolicyKind::StandardError,
        PolicyKind::DynamicMemoryAllocation,
    ];

    /// Registry name of the policy.
    pub fn name(self) -> &'static str {
        match self {
            Self::DynamicMemoryAllocation => "memory-allocation",
            Self::StandardOutput => "standard-output",
            Self::StandardError => "standard-error",
        }
    }

    /// What the policy forbids, phrased for a failure message.
    pub fn description(self) -> &'static str {
        match self {
            Self::DynamicMemoryAllocation => "Dynamic memory allocation",
            Self::StandardOutput => "Writing to standard output",
            Self::StandardError => "Writing to standard error",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PolicyKind {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| PolicyError::UnknownPolicy(s.to_string()))
    }
}
