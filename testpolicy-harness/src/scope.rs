use serde::Deserialize;
use serde::Serialize;
use testpolicy_core::LifecycleEvent;
use tracing::warn;

/// Innermost scope currently open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    #[default]
    Idle,
    Program,
    Suite,
    Test,
}

impl Scope {
    /// Scope an event expects to find open, and the scope it leaves open.
    fn transition(event: LifecycleEvent) -> (Scope, Scope) {
        match event {
            LifecycleEvent::ProgramStart => (Scope::Idle, Scope::Program),
            LifecycleEvent::SuiteStart => (Scope::Program, Scope::Suite),
            LifecycleEvent::TestStart => (Scope::Suite, Scope::Test),
            LifecycleEvent::TestEnd => (Scope::Test, Scope::Suite),
            LifecycleEvent::SuiteEnd => (Scope::Suite, Scope::Program),
            LifecycleEvent::ProgramEnd => (Scope::Program, Scope::Idle),
        }
    }
}

/// Follows the nesting of lifecycle events.
///
/// Out-of-order events are logged and counted but otherwise accepted: the
/// tracker moves to the scope the event implies, and the caller still
/// forwards the event.
#[derive(Debug, Clone, Default)]
pub struct ScopeTracker {
    scope: Scope,
    suite: Option<String>,
    tests_run: u32,
    out_of_order: u32,
}

impl ScopeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Name of the open suite, if any.
    pub fn suite(&self) -> Option<&str> {
        self.suite.as_deref()
    }

    pub fn tests_run(&self) -> u32 {
        self.tests_run
    }

    pub fn out_of_order(&self) -> u32 {
        self.out_of_order
    }

    /// Record `event`. Returns false when it did not fit the open scope.
    pub fn advance(&mut self, event: LifecycleEvent) -> bool {
        let (expected, next) = Scope::transition(event);
        let in_order = self.scope == expected;
        if !in_order {
            self.out_of_order += 1;
            warn!(?event, scope = ?self.scope, "lifecycle event out of order");
        }
        self.scope = next;
        if event == LifecycleEvent::TestEnd {
            self.tests_run += 1;
        }
        in_order
    }

    pub fn enter_suite(&mut self, suite: &str) -> bool {
        let in_order = self.advance(LifecycleEvent::SuiteStart);
        self.suite = Some(suite.to_string());
        in_order
    }

    pub fn leave_suite(&mut self) -> bool {
        self.suite = None;
        self.advance(LifecycleEvent::SuiteEnd)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
