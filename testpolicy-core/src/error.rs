use crate::kind::PolicyKind;

/// Errors produced by policy lookup and registration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("unknown policy: {0}")]
    UnknownPolicy(String),

    #[error("policy '{0}' already has a registered controller")]
    DuplicatePolicy(PolicyKind),
}

pub type Result<T> = std::result::Result<T, PolicyError>;
