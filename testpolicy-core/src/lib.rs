//! Scoped enforcement of test policies.
//!
//! A [`PermissionContext`] holds the allow/deny flag of one policy. A
//! [`ScopedPolicyController`] bound to it listens to the runner's lifecycle
//! events, snapshots and restores the flag at each scope boundary, arms its
//! monitor while the policy is denied and reports a non-fatal failure when
//! the monitor saw the forbidden side effect.

pub mod context;
pub mod controller;
pub mod error;
pub mod kind;
pub mod listener;
pub mod probe;
pub mod record;

// Re-export key types for convenience.
pub use context::PermissionContext;
pub use controller::ScopedPolicyController;
pub use error::{PolicyError, Result};
pub use kind::PolicyKind;
pub use listener::{LifecycleEvent, LifecycleListener};
pub use probe::PolicyProbe;
pub use record::{FailureChannel, FailureKind, PolicyViolation, TestFailure, TestRecord};
