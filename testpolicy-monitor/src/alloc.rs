//! Allocation counting.
//!
//! [`CountingAllocator`] wraps another [`GlobalAlloc`] and bumps a per-thread
//! counter on every allocation. It has to be installed by the test binary:
//!
//! ```ignore
//! #[global_allocator]
//! static ALLOCATOR: CountingAllocator = CountingAllocator::system();
//! ```
//!
//! Without it the counter never moves and [`AllocationMonitor`] never reports.

use std::alloc::GlobalAlloc;
use std::alloc::Layout;
use std::alloc::System;
use std::cell::Cell;

use crate::monitor::Monitor;

thread_local! {
    static ALLOCATIONS: Cell<u64> = const { Cell::new(0) };
}

fn record_allocation() {
    // `try_with` keeps allocations made during thread teardown from panicking.
    let _ = ALLOCATIONS.try_with(|count| count.set(count.get().wrapping_add(1)));
}

/// Number of allocations made by the current thread through
/// [`CountingAllocator`].
pub fn allocation_count() -> u64 {
    ALLOCATIONS.try_with(Cell::get).unwrap_or(0)
}

/// Returns true when [`CountingAllocator`] is the global allocator.
pub fn is_tracking_allocations() -> bool {
    let before = allocation_count();
    let probe = std::hint::black_box(Box::new(0u8));
    drop(probe);
    allocation_count() != before
}

/// Global allocator wrapper that counts `alloc`, `alloc_zeroed` and
/// `realloc` calls per thread. Deallocation is not counted.
#[derive(Debug, Default)]
pub struct CountingAllocator<A = System> {
    inner: A,
}

impl CountingAllocator<System> {
    pub const fn system() -> Self {
        Self { inner: System }
    }
}

impl<A> CountingAllocator<A> {
    pub const fn new(inner: A) -> Self {
        Self { inner }
    }
}

// SAFETY: every call is forwarded unchanged to the inner allocator; the
// counter is a const-initialized thread local that never allocates.
unsafe impl<A: GlobalAlloc> GlobalAlloc for CountingAllocator<A> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        record_allocation();
        unsafe { self.inner.alloc(layout) }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        record_allocation();
        unsafe { self.inner.alloc_zeroed(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { self.inner.dealloc(ptr, layout) }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        record_allocation();
        unsafe { self.inner.realloc(ptr, layout, new_size) }
    }
}

/// Detects dynamic memory allocation on the current thread between `start`
/// and `stop`.
#[derive(Debug, Default)]
pub struct AllocationMonitor {
    baseline: Option<u64>,
}

impl AllocationMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this monitor can observe anything in the running binary.
    pub fn is_supported() -> bool {
        is_tracking_allocations()
    }
}

impl Monitor for AllocationMonitor {
    fn start(&mut self) {
        self.baseline = Some(allocation_count());
    }

    fn stop(&mut self) -> bool {
        let current = allocation_count();
        let Some(baseline) = self.baseline.take() else {
            return false;
        };
        current != baseline
    }
}
