use std::cell::RefCell;
use std::rc::Rc;

use testpolicy_monitor::Monitor;
use testpolicy_monitor::OutputStreamMonitor;
use tracing::debug;
use tracing::warn;

use crate::context::PermissionContext;
use crate::kind::PolicyKind;
use crate::listener::LifecycleListener;
use crate::probe::PolicyProbe;
use crate::record::FailureChannel;
use crate::record::PolicyViolation;

// ---------------------------------------------------------------------------
// ControllerState
// ---------------------------------------------------------------------------

/// Mutable state of a controller. The owning controller holds the only
/// strong reference; the bound context reaches it through a `Weak`.
///
/// Monitors are armed as the last step and disarmed as the first step of
/// every transition, so no bookkeeping lands inside a detection window.
/// Nothing between arming and the end of test-end logs: another policy's
/// window may still be open, and a subscriber may allocate or write.
pub(crate) struct ControllerState {
    program_level_denied: bool,
    suite_level_denied: bool,
    test_level_denied: bool,
    violated: bool,
    in_test_scope: bool,
    armed: bool,
    monitor: PolicyProbe,
}

impl ControllerState {
    fn new(monitor: PolicyProbe) -> Self {
        Self {
            program_level_denied: false,
            suite_level_denied: false,
            test_level_denied: false,
            violated: false,
            in_test_scope: false,
            armed: false,
            monitor,
        }
    }

    pub(crate) fn in_test_scope(&self) -> bool {
        self.in_test_scope
    }

    pub(crate) fn is_violated(&self) -> bool {
        self.violated
    }

    /// Arm detection once per test. Arming while granted still counts, so a
    /// later deny inside the same test opens a window.
    pub(crate) fn apply(&mut self, kind: PolicyKind, denied: bool) {
        if !self.in_test_scope {
            debug!(policy = %kind, "apply outside test scope ignored");
            return;
        }
        if self.armed {
            return;
        }
        self.armed = true;
        if denied {
            self.monitor.start();
        }
    }

    pub(crate) fn report_violation(&mut self, denied: bool) {
        if self.in_test_scope && denied && self.armed {
            self.violated = true;
        }
    }

    pub(crate) fn on_policy_change_during_test(&mut self, denied: bool) {
        if !self.armed {
            return;
        }
        if denied {
            self.monitor.start();
        } else if self.monitor.stop() {
            self.violated = true;
        }
    }
}

// ---------------------------------------------------------------------------
// ScopedPolicyController
// ---------------------------------------------------------------------------

/// Enforces one policy across program, suite and test scopes.
///
/// Each scope start snapshots the context's flag into its own slot and each
/// scope end restores that slot, so a value set at a broader scope is
/// inherited by nested scopes and an override ends with the scope that made
/// it. Nesting depth is fixed at three.
pub struct ScopedPolicyController {
    context: Rc<PermissionContext>,
    state: Rc<RefCell<ControllerState>>,
}

impl ScopedPolicyController {
    pub fn new(context: Rc<PermissionContext>, monitor: PolicyProbe) -> Self {
        Self {
            context,
            state: Rc::new(RefCell::new(ControllerState::new(monitor))),
        }
    }

    /// Controller with the standard probe for the context's policy.
    pub fn standard(context: Rc<PermissionContext>) -> Self {
        let monitor = PolicyProbe::for_kind(context.kind());
        Self::new(context, monitor)
    }

    pub fn kind(&self) -> PolicyKind {
        self.context.kind()
    }

    pub fn context(&self) -> &Rc<PermissionContext> {
        &self.context
    }

    pub fn is_violated(&self) -> bool {
        self.state.borrow().violated
    }

    pub fn in_test_scope(&self) -> bool {
        self.state.borrow().in_test_scope
    }

    /// True while the context's back-reference points at this controller.
    pub fn is_bound(&self) -> bool {
        self.context.is_bound_to(&self.state)
    }

    /// Arm detection for the current test; idempotent within one test.
    pub fn apply(&self) {
        let denied = self.context.is_denied();
        self.state.borrow_mut().apply(self.kind(), denied);
    }

    /// Handle on the output probe, sharing its byte counter.
    pub fn output_monitor(&self) -> Option<OutputStreamMonitor> {
        self.state.borrow().monitor.as_output().cloned()
    }
}

impl LifecycleListener for ScopedPolicyController {
    fn on_program_start(&mut self) {
        if self.context.bind(&self.state) {
            warn!(policy = %self.kind(), "context was observed by another controller, rebinding");
        }
        let denied = self.context.is_denied();
        self.state.borrow_mut().program_level_denied = denied;
        debug!(policy = %self.kind(), denied, "program scope entered");
    }

    fn on_suite_start(&mut self, suite: &str) {
        let denied = self.context.is_denied();
        self.state.borrow_mut().suite_level_denied = denied;
        debug!(policy = %self.kind(), suite, denied, "suite scope entered");
    }

    fn on_test_start(&mut self, test: &str) {
        let denied = self.context.is_denied();
        let mut state = self.state.borrow_mut();
        state.test_level_denied = denied;
        state.in_test_scope = true;
        state.violated = false;
        state.armed = false;
        debug!(policy = %self.kind(), test, denied, "test scope entered");
    }

    /// Reports through `channel` only. Callers log the outcome once every
    /// controller has seen test-end.
    fn on_test_end(&mut self, _test: &str, channel: &mut dyn FailureChannel) {
        let denied = self.context.is_denied();
        let report = {
            let mut state = self.state.borrow_mut();
            if denied && state.armed && state.monitor.stop() {
                state.report_violation(denied);
            }
            let report = state.in_test_scope && state.violated && !channel.has_failure();
            state.in_test_scope = false;
            state.armed = false;
            self.context.restore(state.test_level_denied);
            report
        };

        if report {
            channel.report_nonfatal(PolicyViolation::new(self.kind()));
        }
    }

    fn on_suite_end(&mut self, suite: &str) {
        let denied = self.state.borrow().suite_level_denied;
        self.context.restore(denied);
        debug!(policy = %self.kind(), suite, denied, "suite scope left");
    }

    fn on_program_end(&mut self) {
        let denied = self.state.borrow().program_level_denied;
        self.context.restore(denied);
        self.context.unbind(&self.state);
        debug!(policy = %self.kind(), denied, "program scope left");
    }
}

impl Drop for ScopedPolicyController {
    fn drop(&mut self) {
        self.context.unbind(&self.state);
    }
}

impl std::fmt::Debug for ScopedPolicyController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedPolicyController")
            .field("policy", &self.kind())
            .field("denied", &self.context.is_denied())
            .finish_non_exhaustive()
    }
}
