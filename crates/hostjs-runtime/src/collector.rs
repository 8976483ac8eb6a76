//! The Object Collector: batches persistent engine handle releases so they
//! happen only on the Isolate Manager's owner thread, however many threads
//! asked for the release.
//!
//! `collect` is reentrant: releasing a handle can run a JS finalizer that
//! itself calls back into `collect` (e.g. a weak-ref cleanup enqueuing more
//! work). `drain` takes the pending batch out from under the lock before
//! running any release, so a reentrant `collect` during a drain never
//! deadlocks — it simply lands in the next batch.

use parking_lot::{Condvar, Mutex};

use crate::value::PersistentHandle;

pub struct Collector {
    pending: Mutex<Vec<PersistentHandle>>,
    idle: Condvar,
}

impl Collector {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            idle: Condvar::new(),
        }
    }

    /// Queue a handle for release. Callable from any thread.
    pub fn collect(&self, handle: PersistentHandle) {
        self.pending.lock().push(handle);
    }

    /// Release every handle queued so far.
    ///
    /// # Safety
    /// Must run on the Isolate Manager's owner thread.
    pub unsafe fn drain(&self) -> usize {
        let batch = std::mem::take(&mut *self.pending.lock());
        let n = batch.len();
        for handle in batch {
            unsafe { handle.release() };
        }
        if n > 0 {
            tracing::trace!(count = n, "drained persistent handles");
            self.idle.notify_all();
        }
        n
    }

    /// Block until the queue is empty. Used by context teardown, which
    /// submits a final drain to the owner thread and then waits here for it
    /// to land — satisfies the "no JS handle outlives its Context" property.
    pub fn wait_until_empty(&self) {
        let mut guard = self.pending.lock();
        while !guard.is_empty() {
            self.idle.wait(&mut guard);
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostjs_sys::{JSContextRef, JSValueRef};
    use std::ptr;

    fn fake_handle() -> PersistentHandle {
        PersistentHandle {
            ctx: ptr::null_mut::<std::ffi::c_void>() as JSContextRef,
            value: ptr::null_mut::<std::ffi::c_void>() as JSValueRef,
        }
    }

    #[test]
    fn collect_queues_without_releasing() {
        // Only exercises queue bookkeeping; draining a real handle requires
        // a live JSContextRef and must run on the owner thread (isolate.rs).
        let collector = Collector::new();
        collector.collect(fake_handle());
        assert_eq!(collector.pending_count(), 1);
    }
}
