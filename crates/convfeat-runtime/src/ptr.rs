//! Pointer wrappers for partitioned kernels.
//!
//! Kernel tasks share one tensor's storage: every task reads the same input
//! and writes a disjoint region of the output. The wrappers make the raw
//! pointers `Send` so they can cross into pool tasks.
//!
//! Safety contract for both wrappers: the caller must keep the pointed-to
//! allocation alive until every task using the pointer has been joined, and
//! concurrent tasks must touch pairwise-disjoint ranges when writing. All
//! kernels in this workspace join their handles before their tensors can be
//! dropped.

/// Mutable storage pointer shared across partitioned tasks.
#[derive(Clone, Copy)]
pub struct SendMutPtr<T>(pub *mut T);

unsafe impl<T: Send> Send for SendMutPtr<T> {}

impl<T> SendMutPtr<T> {
    /// # Safety
    /// `offset` must lie within the allocation the pointer was created from.
    pub unsafe fn add(self, offset: usize) -> *mut T {
        self.0.add(offset)
    }
}

/// Read-only storage pointer shared across partitioned tasks.
#[derive(Clone, Copy)]
pub struct SendConstPtr<T>(pub *const T);

unsafe impl<T: Sync> Send for SendConstPtr<T> {}

impl<T> SendConstPtr<T> {
    /// # Safety
    /// `offset` must lie within the allocation the pointer was created from.
    pub unsafe fn add(self, offset: usize) -> *const T {
        self.0.add(offset)
    }
}
