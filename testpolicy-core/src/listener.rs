use serde::Deserialize;
use serde::Serialize;

use crate::record::FailureChannel;

/// Scope lifecycle events delivered by a test runner, strictly nested:
/// program-start, then per suite {suite-start, per test {test-start,
/// test-end}, suite-end}, then program-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    ProgramStart,
    SuiteStart,
    TestStart,
    TestEnd,
    SuiteEnd,
    ProgramEnd,
}

/// Receiver of lifecycle events. Every method defaults to doing nothing.
pub trait LifecycleListener {
    fn on_program_start(&mut self) {}

    fn on_suite_start(&mut self, _suite: &str) {}

    fn on_test_start(&mut self, _test: &str) {}

    fn on_test_end(&mut self, _test: &str, _channel: &mut dyn FailureChannel) {}

    fn on_suite_end(&mut self, _suite: &str) {}

    fn on_program_end(&mut self) {}
}
