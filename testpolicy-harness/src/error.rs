use std::path::PathBuf;

use testpolicy_core::PolicyError;

/// Errors produced while configuring or reporting a policy-enforced run.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    InvalidConfig(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    SerializeConfig(#[from] toml::ser::Error),

    #[error("failed to serialize report: {0}")]
    SerializeReport(#[from] serde_json::Error),

    #[error(transparent)]
    Policy(#[from] PolicyError),
}

pub type Result<T> = std::result::Result<T, HarnessError>;
