use testpolicy_monitor::AllocationMonitor;
use testpolicy_monitor::Monitor;
use testpolicy_monitor::OutputStream;
use testpolicy_monitor::OutputStreamMonitor;

use crate::kind::PolicyKind;

/// The monitor owned by a controller.
///
/// The policy set is closed, so the standard probes are plain variants;
/// `Custom` exists for exercising the controller with scripted monitors.
pub enum PolicyProbe {
    Allocation(AllocationMonitor),
    Output(OutputStreamMonitor),
    Custom(Box<dyn Monitor>),
}

impl PolicyProbe {
    /// The standard probe for a policy.
    pub fn for_kind(kind: PolicyKind) -> Self {
        match kind {
            PolicyKind::DynamicMemoryAllocation => Self::Allocation(AllocationMonitor::new()),
            PolicyKind::StandardOutput => {
                Self::Output(OutputStreamMonitor::new(OutputStream::Stdout))
            }
            PolicyKind::StandardError => {
                Self::Output(OutputStreamMonitor::new(OutputStream::Stderr))
            }
        }
    }

    /// Like [`PolicyProbe::for_kind`], but the output probes redirect the
    /// process stream for the duration of each window. Falls back to the
    /// counting writers where redirection is unavailable.
    pub fn capturing(kind: PolicyKind) -> Self {
        match kind {
            PolicyKind::StandardOutput => {
                Self::Output(OutputStreamMonitor::capturing(OutputStream::Stdout))
            }
            PolicyKind::StandardError => {
                Self::Output(OutputStreamMonitor::capturing(OutputStream::Stderr))
            }
            PolicyKind::DynamicMemoryAllocation => Self::for_kind(kind),
        }
    }

    pub fn custom(monitor: impl Monitor + 'static) -> Self {
        Self::Custom(Box::new(monitor))
    }

    pub fn as_output(&self) -> Option<&OutputStreamMonitor> {
        match self {
            Self::Output(monitor) => Some(monitor),
            Self::Allocation(_) | Self::Custom(_) => None,
        }
    }
}

impl Monitor for PolicyProbe {
    fn start(&mut self) {
        match self {
            Self::Allocation(monitor) => monitor.start(),
            Self::Output(monitor) => monitor.start(),
            Self::Custom(monitor) => monitor.start(),
        }
    }

    fn stop(&mut self) -> bool {
        match self {
            Self::Allocation(monitor) => monitor.stop(),
            Self::Output(monitor) => monitor.stop(),
            Self::Custom(monitor) => monitor.stop(),
        }
    }
}

impl std::fmt::Debug for PolicyProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Allocation(monitor) => f.debug_tuple("Allocation").field(monitor).finish(),
            Self::Output(monitor) => f.debug_tuple("Output").field(monitor).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use testpolicy_monitor::NullMonitor;

    #[test]
    fn test_standard_probe_per_kind() {
        assert!(matches!(
            PolicyProbe::for_kind(PolicyKind::DynamicMemoryAllocation),
            PolicyProbe::Allocation(_)
        ));
        let stdout = PolicyProbe::for_kind(PolicyKind::StandardOutput);
        assert_eq!(stdout.as_output().map(OutputStreamMonitor::stream), Some(OutputStream::Stdout));
        let stderr = PolicyProbe::for_kind(PolicyKind::StandardError);
        assert_eq!(stderr.as_output().map(OutputStreamMonitor::stream), Some(OutputStream::Stderr));
    }

    #[test]
    fn test_output_probe_forwards_to_monitor() {
        let mut probe = PolicyProbe::for_kind(PolicyKind::StandardOutput);
        let mut sink = probe.as_output().unwrap().tap(Vec::new());
        probe.start();
        sink.write_all(b"Hello").unwrap();
        assert!(probe.stop());
    }

    #[test]
    fn test_capturing_monitors_per_kind() {
        assert!(matches!(
            PolicyProbe::capturing(PolicyKind::DynamicMemoryAllocation),
            PolicyProbe::Allocation(_)
        ));
        let stderr = PolicyProbe::capturing(PolicyKind::StandardError);
        let monitor = stderr.as_output().unwrap();
        assert_eq!(monitor.stream(), OutputStream::Stderr);
        assert_eq!(monitor.is_capturing(), cfg!(unix));
        assert!(!PolicyProbe::for_kind(PolicyKind::StandardError).as_output().unwrap().is_capturing());
    }

    #[test]
    fn test_custom_probe() {
        let mut probe = PolicyProbe::custom(NullMonitor);
        assert!(probe.as_output().is_none());
        probe.start();
        assert!(!probe.stop());
        assert_eq!(format!("{probe:?}"), "Custom(..)");
    }
}
