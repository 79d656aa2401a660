use std::io::Write;
use std::rc::Rc;

use testpolicy_core::LifecycleEvent;
use testpolicy_core::LifecycleListener;
use testpolicy_core::PolicyError;
use testpolicy_core::PolicyKind;
use testpolicy_core::PolicyProbe;
use testpolicy_core::ScopedPolicyController;
use testpolicy_core::TestRecord;
use testpolicy_monitor::AllocationMonitor;
use testpolicy_monitor::CountingWriter;
use testpolicy_monitor::OutputStream;
use testpolicy_monitor::OutputStreamMonitor;
use testpolicy_monitor::StandardStream;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config::PolicyConfig;
use crate::registry::PolicyRegistry;
use crate::report::RunReport;
use crate::report::TestOutcome;
use crate::scope::ScopeTracker;

// ---------------------------------------------------------------------------
// Registered listeners
// ---------------------------------------------------------------------------

enum Registered {
    Policy(ScopedPolicyController),
    Listener(Box<dyn LifecycleListener>),
}

impl Registered {
    fn listener(&mut self) -> &mut dyn LifecycleListener {
        match self {
            Self::Policy(controller) => controller,
            Self::Listener(listener) => listener.as_mut(),
        }
    }

    fn policy(&self) -> Option<&ScopedPolicyController> {
        match self {
            Self::Policy(controller) => Some(controller),
            Self::Listener(_) => None,
        }
    }
}

fn output_kind(stream: OutputStream) -> PolicyKind {
    match stream {
        OutputStream::Stdout => PolicyKind::StandardOutput,
        OutputStream::Stderr => PolicyKind::StandardError,
    }
}

// ---------------------------------------------------------------------------
// EnforcementSession
// ---------------------------------------------------------------------------

/// Delivers a test runner's lifecycle events to the registered policy
/// controllers and extra listeners.
///
/// Start events reach listeners in registration order, end events in
/// reverse order, so the last registered monitor is armed last and
/// disarmed first. [`EnforcementSession::with_all_policies`] registers
/// the allocation policy last for that reason.
pub struct EnforcementSession {
    registry: PolicyRegistry,
    config: PolicyConfig,
    registered: Vec<Registered>,
    tracker: ScopeTracker,
    report: RunReport,
    warned_untracked: bool,
}

impl EnforcementSession {
    pub fn new(registry: PolicyRegistry, config: PolicyConfig) -> Self {
        Self {
            registry,
            config,
            registered: Vec::new(),
            tracker: ScopeTracker::new(),
            report: RunReport::default(),
            warned_untracked: false,
        }
    }

    /// Session over a fresh registry with a standard controller for every
    /// policy.
    pub fn with_all_policies(config: PolicyConfig) -> Self {
        let registry = PolicyRegistry::from_config(&config);
        let mut session = Self::new(registry, config);
        for kind in PolicyKind::ALL {
            let controller = session.standard_controller(kind);
            session.push_policy(controller);
        }
        session
    }

    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn tracker(&self) -> &ScopeTracker {
        &self.tracker
    }

    /// Register a controller. At most one controller per policy.
    pub fn register(&mut self, controller: ScopedPolicyController) -> Result<(), PolicyError> {
        let kind = controller.kind();
        if self.controller(kind).is_some() {
            return Err(PolicyError::DuplicatePolicy(kind));
        }
        self.push_policy(controller);
        Ok(())
    }

    /// Register the standard controller for `kind` over the registry's
    /// context.
    pub fn register_policy(&mut self, kind: PolicyKind) -> Result<(), PolicyError> {
        let controller = self.standard_controller(kind);
        self.register(controller)
    }

    /// Controller over the registry's context for `kind`. Output policies
    /// redirect the process streams when `capture_process_streams` is set.
    fn standard_controller(&self, kind: PolicyKind) -> ScopedPolicyController {
        let context = Rc::clone(self.registry.get(kind));
        if !self.config.capture_process_streams {
            return ScopedPolicyController::standard(context);
        }
        let monitor = PolicyProbe::capturing(kind);
        let capturing = monitor.as_output().is_some_and(OutputStreamMonitor::is_capturing);
        debug!(policy = %kind, capturing, "process stream capture requested");
        ScopedPolicyController::new(context, monitor)
    }

    pub fn register_listener(&mut self, listener: Box<dyn LifecycleListener>) {
        self.registered.push(Registered::Listener(listener));
    }

    fn push_policy(&mut self, controller: ScopedPolicyController) {
        if controller.kind() == PolicyKind::DynamicMemoryAllocation {
            self.warn_if_untracked();
        }
        debug!(policy = %controller.kind(), "policy controller registered");
        self.registered.push(Registered::Policy(controller));
    }

    fn warn_if_untracked(&mut self) {
        if self.warned_untracked || self.config.silence_warnings {
            return;
        }
        if !AllocationMonitor::is_supported() {
            self.warned_untracked = true;
            warn!(
                "allocation tracking is not installed; memory-allocation violations will not be \
                 detected (install CountingAllocator as the global allocator)"
            );
        }
    }

    pub fn controller(&self, kind: PolicyKind) -> Option<&ScopedPolicyController> {
        self.registered
            .iter()
            .filter_map(Registered::policy)
            .find(|controller| controller.kind() == kind)
    }

    pub fn is_violated(&self, kind: PolicyKind) -> bool {
        self.controller(kind)
            .is_some_and(ScopedPolicyController::is_violated)
    }

    /// Arm every registered controller for the current test.
    pub fn apply_all(&self) {
        for controller in self.registered.iter().filter_map(Registered::policy) {
            controller.apply();
        }
    }

    // -----------------------------------------------------------------------
    // Output
    // -----------------------------------------------------------------------

    /// Monitor guarding `stream`, or a detached one when no controller for
    /// that stream is registered.
    pub fn output_monitor(&self, stream: OutputStream) -> OutputStreamMonitor {
        self.controller(output_kind(stream))
            .and_then(ScopedPolicyController::output_monitor)
            .unwrap_or_else(|| OutputStreamMonitor::new(stream))
    }

    pub fn stdout(&self) -> CountingWriter<StandardStream> {
        self.output_monitor(OutputStream::Stdout).writer()
    }

    pub fn stderr(&self) -> CountingWriter<StandardStream> {
        self.output_monitor(OutputStream::Stderr).writer()
    }

    /// Counting writer that reports to the policy guarding `stream` but
    /// writes into `inner`.
    pub fn tap<W: Write>(&self, stream: OutputStream, inner: W) -> CountingWriter<W> {
        self.output_monitor(stream).tap(inner)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    pub fn program_start(&mut self) {
        self.tracker.advance(LifecycleEvent::ProgramStart);
        debug!(listeners = self.registered.len(), "program start");
        for registered in &mut self.registered {
            registered.listener().on_program_start();
        }
    }

    pub fn suite_start(&mut self, suite: &str) {
        self.tracker.enter_suite(suite);
        debug!(suite, "suite start");
        for registered in &mut self.registered {
            registered.listener().on_suite_start(suite);
        }
    }

    /// Open a test scope and return the record its failures go to. With
    /// `auto_apply` every registered policy is armed before returning.
    pub fn test_start(&mut self, test: &str) -> TestRecord {
        let record = TestRecord::new(test);
        self.tracker.advance(LifecycleEvent::TestStart);
        debug!(test, "test start");
        for registered in &mut self.registered {
            registered.listener().on_test_start(test);
        }
        if self.config.auto_apply {
            self.apply_all();
        }
        record
    }

    /// Close the test scope and file its record. Returns whether the test
    /// passed.
    pub fn test_end(&mut self, mut record: TestRecord) -> bool {
        // Nothing may allocate before the allocation probe is disarmed.
        self.tracker.advance(LifecycleEvent::TestEnd);
        let name = std::mem::take(&mut record.name);
        for registered in self.registered.iter_mut().rev() {
            registered.listener().on_test_end(&name, &mut record);
        }
        record.name = name;

        // Every window is closed from here on.
        let violations = record.violations();
        for kind in &violations {
            info!(policy = %kind, test = %record.name, "policy violation");
        }
        for controller in self.registered.iter().filter_map(Registered::policy) {
            if controller.is_violated() && !violations.contains(&controller.kind()) {
                debug!(
                    policy = %controller.kind(),
                    test = %record.name,
                    "violation suppressed, test already failed"
                );
            }
        }

        let passed = record.passed();
        debug!(test = %record.name, passed, "test end");
        self.report.tests.push(TestOutcome {
            suite: self.tracker.suite().map(str::to_string),
            record,
        });
        passed
    }

    pub fn suite_end(&mut self, suite: &str) {
        for registered in self.registered.iter_mut().rev() {
            registered.listener().on_suite_end(suite);
        }
        self.tracker.leave_suite();
        debug!(suite, "suite end");
    }

    /// Close the program scope and hand back the outcomes collected since
    /// program start.
    pub fn program_end(&mut self) -> RunReport {
        for registered in self.registered.iter_mut().rev() {
            registered.listener().on_program_end();
        }
        self.tracker.advance(LifecycleEvent::ProgramEnd);
        let report = std::mem::take(&mut self.report);
        info!(
            tests = report.tests.len(),
            failed = report.failed().count(),
            "run finished"
        );
        report
    }

    /// Run `body` inside a test scope.
    pub fn run_test<F>(&mut self, test: &str, body: F) -> bool
    where
        F: FnOnce(&PolicyRegistry, &mut TestRecord),
    {
        let mut record = self.test_start(test);
        body(&self.registry, &mut record);
        self.test_end(record)
    }
}

impl std::fmt::Debug for EnforcementSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let policies: Vec<PolicyKind> = self
            .registered
            .iter()
            .filter_map(Registered::policy)
            .map(ScopedPolicyController::kind)
            .collect();
        f.debug_struct("EnforcementSession")
            .field("policies", &policies)
            .field("listeners", &self.registered.len())
            .field("config", &self.config)
            .field("scope", &self.tracker.scope())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
