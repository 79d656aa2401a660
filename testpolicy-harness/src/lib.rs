//! Runner-side integration of test policies: the policy registry, session
//! configuration, and an event source that drives the policy controllers
//! through program, suite and test scopes.

pub mod config;
pub mod error;
pub mod registry;
pub mod report;
pub mod scope;
pub mod session;

// Re-export key types for convenience.
pub use config::{PolicyConfig, PolicyDecision};
pub use error::{HarnessError, Result};
pub use registry::PolicyRegistry;
pub use report::{RunReport, TestOutcome};
pub use scope::{Scope, ScopeTracker};
pub use session::EnforcementSession;
pub use testpolicy_core::{PolicyKind, TestRecord};
pub use testpolicy_monitor::{CountingAllocator, OutputStream};
