pub mod alloc;
pub mod capture;
pub mod monitor;
pub mod output;

// Re-export key types for convenience.
pub use alloc::{AllocationMonitor, CountingAllocator, allocation_count, is_tracking_allocations};
pub use capture::StreamCapture;
pub use monitor::{Monitor, NullMonitor};
pub use output::{ByteCounter, CountingWriter, OutputStream, OutputStreamMonitor, StandardStream};
