use std::cell::Cell;
use std::cell::RefCell;
use std::rc::Rc;
use std::rc::Weak;

use tracing::warn;

use crate::controller::ControllerState;
use crate::kind::PolicyKind;

/// Current allow/deny state of one policy.
///
/// Contexts are shared through `Rc` and may be toggled from anywhere on the
/// owning thread. While a [`ScopedPolicyController`] is bound, toggles made
/// inside a test are forwarded to it so detection follows the denied
/// intervals; otherwise the flag changes silently.
///
/// The back-reference to the controller is a `Weak` handle: set when the
/// controller receives program-start, cleared on program-end or when the
/// controller is dropped.
///
/// [`ScopedPolicyController`]: crate::controller::ScopedPolicyController
#[derive(Debug)]
pub struct PermissionContext {
    kind: PolicyKind,
    denied: Cell<bool>,
    denied_by_default: bool,
    controller: RefCell<Weak<RefCell<ControllerState>>>,
}

impl PermissionContext {
    pub fn new(kind: PolicyKind, denied_by_default: bool) -> Self {
        Self {
            kind,
            denied: Cell::new(denied_by_default),
            denied_by_default,
            controller: RefCell::new(Weak::new()),
        }
    }

    /// A context that starts out denied.
    pub fn denied(kind: PolicyKind) -> Self {
        Self::new(kind, true)
    }

    pub fn kind(&self) -> PolicyKind {
        self.kind
    }

    pub fn deny(&self) {
        self.set_denied(true);
    }

    pub fn grant(&self) {
        self.set_denied(false);
    }

    /// Set the flag and forward the change to the bound controller. A change
    /// made while the controller itself is running (from inside a monitor)
    /// cannot be delivered and is dropped with a warning, leaving the flag
    /// and the detection window in agreement.
    pub fn set_denied(&self, denied: bool) {
        if self.denied.get() == denied {
            return;
        }
        let Some(state) = self.controller() else {
            self.denied.set(denied);
            return;
        };
        let Ok(mut state) = state.try_borrow_mut() else {
            warn!(policy = %self.kind, denied, "controller busy, policy change ignored");
            return;
        };
        self.denied.set(denied);
        if state.in_test_scope() {
            state.on_policy_change_during_test(denied);
        }
    }

    /// Restore the constructed default without notifying any controller.
    pub fn reset(&self) {
        self.denied.set(self.denied_by_default);
    }

    pub fn is_denied(&self) -> bool {
        self.denied.get()
    }

    pub fn denied_by_default(&self) -> bool {
        self.denied_by_default
    }

    pub fn is_bound(&self) -> bool {
        self.controller().is_some()
    }

    /// Whether the bound controller observed a violation in the current or
    /// most recent test. False when unbound.
    pub fn is_violated(&self) -> bool {
        self.controller()
            .is_some_and(|state| state.try_borrow().is_ok_and(|state| state.is_violated()))
    }

    /// Record that the guarded side effect just happened. Counts only inside
    /// an armed test while denied; no-op when unbound.
    pub fn mark_as_violated(&self) {
        let Some(state) = self.controller() else {
            return;
        };
        if let Ok(mut state) = state.try_borrow_mut() {
            state.report_violation(self.is_denied());
        }
    }

    /// Arm detection for the current test. No-op when unbound.
    pub fn apply(&self) {
        let Some(state) = self.controller() else {
            return;
        };
        if let Ok(mut state) = state.try_borrow_mut() {
            state.apply(self.kind, self.is_denied());
        }
    }

    /// Guard for code that asks before acting: returns true when the side
    /// effect is permitted, otherwise records a violation and returns false.
    pub fn check(&self) -> bool {
        if self.is_denied() {
            self.mark_as_violated();
            false
        } else {
            true
        }
    }

    fn controller(&self) -> Option<Rc<RefCell<ControllerState>>> {
        self.controller.borrow().upgrade()
    }

    /// Point the back-reference at `state`. Returns true when a different
    /// live controller was displaced.
    pub(crate) fn bind(&self, state: &Rc<RefCell<ControllerState>>) -> bool {
        let mut slot = self.controller.borrow_mut();
        let displaced = slot
            .upgrade()
            .is_some_and(|current| !Rc::ptr_eq(&current, state));
        *slot = Rc::downgrade(state);
        displaced
    }

    pub(crate) fn is_bound_to(&self, state: &Rc<RefCell<ControllerState>>) -> bool {
        std::ptr::eq(self.controller.borrow().as_ptr(), Rc::as_ptr(state))
    }

    /// Clear the back-reference if it still points at `state`.
    pub(crate) fn unbind(&self, state: &Rc<RefCell<ControllerState>>) {
        if self.is_bound_to(state) {
            *self.controller.borrow_mut() = Weak::new();
        }
    }

    /// Set the flag bypassing controller notification.
    pub(crate) fn restore(&self, denied: bool) {
        self.denied.set(denied);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn context() -> PermissionContext {
        PermissionContext::denied(PolicyKind::DynamicMemoryAllocation)
    }

    #[test]
    fn test_denied_by_default() {
        let policy = context();
        assert!(policy.is_denied());
        assert!(policy.denied_by_default());
        assert!(!policy.is_bound());
    }

    #[test]
    fn test_constructed_as_granted() {
        let policy = PermissionContext::new(PolicyKind::StandardOutput, false);
        assert!(!policy.is_denied());
        assert_eq!(policy.kind(), PolicyKind::StandardOutput);
    }

    #[test]
    fn test_deny_and_grant() {
        let policy = PermissionContext::new(PolicyKind::StandardError, false);
        policy.deny();
        assert!(policy.is_denied());
        policy.grant();
        assert!(!policy.is_denied());
    }

    #[test]
    fn test_set_denied_sets_given_value() {
        let policy = context();
        policy.set_denied(false);
        assert!(!policy.is_denied());
        policy.set_denied(true);
        assert!(policy.is_denied());
    }

    #[test]
    fn test_not_violated_when_unbound() {
        let policy = context();
        assert!(!policy.is_violated());
    }

    #[test]
    fn test_mark_as_violated_is_no_op_when_unbound() {
        let policy = context();
        policy.mark_as_violated();
        policy.apply();
        assert!(!policy.is_violated());
        assert!(policy.is_denied());
    }

    #[test]
    fn test_check_reports_permission() {
        let policy = context();
        assert!(!policy.check());
        policy.grant();
        assert!(policy.check());
        assert!(!policy.is_violated());
    }

    proptest! {
        #[test]
        fn prop_is_denied_tracks_last_call(calls in prop::collection::vec(any::<bool>(), 1..32)) {
            let policy = context();
            for denied in &calls {
                policy.set_denied(*denied);
            }
            prop_assert_eq!(policy.is_denied(), *calls.last().unwrap());
        }

        #[test]
        fn prop_reset_restores_default(
            default in any::<bool>(),
            calls in prop::collection::vec(any::<bool>(), 0..32),
        ) {
            let policy = PermissionContext::new(PolicyKind::StandardOutput, default);
            for denied in calls {
                if denied { policy.deny() } else { policy.grant() }
            }
            policy.reset();
            prop_assert_eq!(policy.is_denied(), default);
        }
    }
}
