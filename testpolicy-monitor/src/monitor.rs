/// A probe that can be armed and later read-and-disarmed.
///
/// `start` begins observing; `stop` ends observing and reports whether at
/// least one guarded event happened since the matching `start`. A monitor
/// must accept an immediate `start` after `stop`, since a policy can be
/// toggled several times within one test.
pub trait Monitor {
    fn start(&mut self);
    fn stop(&mut self) -> bool;
}

impl<M: Monitor + ?Sized> Monitor for Box<M> {
    fn start(&mut self) {
        (**self).start();
    }

    fn stop(&mut self) -> bool {
        (**self).stop()
    }
}

/// Monitor that never observes anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullMonitor;

impl Monitor for NullMonitor {
    fn start(&mut self) {}

    fn stop(&mut self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_monitor_never_reports() {
        let mut monitor = NullMonitor;
        monitor.start();
        assert!(!monitor.stop());
        assert!(!monitor.stop());
    }

    #[test]
    fn test_boxed_monitor_forwards() {
        struct Flag(bool);
        impl Monitor for Flag {
            fn start(&mut self) {
                self.0 = true;
            }
            fn stop(&mut self) -> bool {
                std::mem::replace(&mut self.0, false)
            }
        }

        let mut boxed: Box<dyn Monitor> = Box::new(Flag(false));
        assert!(!boxed.stop());
        boxed.start();
        assert!(boxed.stop());
    }
}
