use std::rc::Rc;

use testpolicy_core::PermissionContext;
use testpolicy_core::PolicyKind;
use testpolicy_core::Result;

use crate::config::PolicyConfig;

/// The named policy contexts of one run.
///
/// An explicit object rather than process-wide statics, so independent
/// registries can coexist (one per session, one per test of the mechanism).
#[derive(Debug)]
pub struct PolicyRegistry {
    memory_allocation: Rc<PermissionContext>,
    standard_output: Rc<PermissionContext>,
    standard_error: Rc<PermissionContext>,
}

impl PolicyRegistry {
    /// Registry with every policy denied by default.
    pub fn new() -> Self {
        Self::from_config(&PolicyConfig::default())
    }

    pub fn from_config(config: &PolicyConfig) -> Self {
        let context = |kind| Rc::new(PermissionContext::new(kind, config.denied_by_default(kind)));
        Self {
            memory_allocation: context(PolicyKind::DynamicMemoryAllocation),
            standard_output: context(PolicyKind::StandardOutput),
            standard_error: context(PolicyKind::StandardError),
        }
    }

    pub fn get(&self, kind: PolicyKind) -> &Rc<PermissionContext> {
        match kind {
            PolicyKind::DynamicMemoryAllocation => &self.memory_allocation,
            PolicyKind::StandardOutput => &self.standard_output,
            PolicyKind::StandardError => &self.standard_error,
        }
    }

    /// Look a policy up by its registry name, e.g. `"standard-output"`.
    pub fn lookup(&self, name: &str) -> Result<&Rc<PermissionContext>> {
        Ok(self.get(name.parse()?))
    }

    pub fn memory_allocation(&self) -> &Rc<PermissionContext> {
        &self.memory_allocation
    }

    pub fn standard_output(&self) -> &Rc<PermissionContext> {
        &self.standard_output
    }

    pub fn standard_error(&self) -> &Rc<PermissionContext> {
        &self.standard_error
    }

    /// Contexts in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Rc<PermissionContext>> + '_ {
        PolicyKind::ALL.into_iter().map(|kind| self.get(kind))
    }

    /// Arm every bound policy for the current test.
    pub fn apply_all(&self) {
        for context in self.iter() {
            context.apply();
        }
    }

    pub fn reset_all(&self) {
        for context in self.iter() {
            context.reset();
        }
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
