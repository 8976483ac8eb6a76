//! The Cancelable Task Manager: not-started → running → {completed |
//! canceled}, with exactly one terminal callback ever firing per task.
//!
//! Grounded on the same `DashMap`-keyed bookkeeping style as the Value
//! Registry, generalized to a job lifecycle instead of a handle table. The
//! terminal callback is registered once, at `schedule` time, and stored
//! inside the task's entry; `complete` and `cancel` both try to `take()` it
//! out from behind the same per-task `parking_lot::Mutex`, so whichever one
//! gets there first is the only one that ever runs it — this is what makes
//! the guarantee hold even when completion and an explicit cancel request
//! race from different threads (§4.5).

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

pub type TaskId = u64;

/// Runs exactly once: `Some(addr)` for a completed task's result handle,
/// `None` for a canceled one.
type OnTerminal = Box<dyn FnOnce(Option<usize>) + Send>;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum TaskState {
    NotStarted,
    Running,
    Completed,
    Canceled,
}

struct TaskEntry {
    state: TaskState,
    on_terminal: Option<OnTerminal>,
}

pub struct TaskManager {
    next_id: AtomicU64,
    tasks: DashMap<TaskId, Mutex<TaskEntry>>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            tasks: DashMap::new(),
        }
    }

    /// Register a new task in the `NotStarted` state, storing the callback
    /// that must fire exactly once when the task reaches a terminal state.
    pub fn schedule(&self, on_terminal: impl FnOnce(Option<usize>) + Send + 'static) -> TaskId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.tasks.insert(
            id,
            Mutex::new(TaskEntry {
                state: TaskState::NotStarted,
                on_terminal: Some(Box::new(on_terminal)),
            }),
        );
        id
    }

    /// NotStarted -> Running. Returns `false` if the task was canceled
    /// before it got a chance to start.
    pub fn begin(&self, id: TaskId) -> bool {
        match self.tasks.get(&id) {
            Some(entry) => {
                let mut e = entry.lock();
                if e.state == TaskState::NotStarted {
                    e.state = TaskState::Running;
                    true
                } else {
                    false
                }
            }
            None => false,
        }
    }

    /// {NotStarted | Running} -> Completed. A no-op if a `cancel` already
    /// won the race. `make_addr` is only invoked when this call wins,
    /// so a result that loses the race is never registered anywhere —
    /// the caller's computed value is simply dropped rather than leaked
    /// into the Registry with no handle anyone will ever free.
    pub fn complete(&self, id: TaskId, make_addr: impl FnOnce() -> usize) {
        let callback = match self.tasks.get(&id) {
            Some(entry) => {
                let mut e = entry.lock();
                if e.state != TaskState::Canceled {
                    e.state = TaskState::Completed;
                    e.on_terminal.take()
                } else {
                    None
                }
            }
            None => None,
        };
        self.tasks.remove(&id);
        match &callback {
            Some(_) => tracing::debug!(task_id = id, "task completed"),
            None => tracing::debug!(task_id = id, "complete lost the race to a prior cancel"),
        }
        if let Some(cb) = callback {
            cb(Some(make_addr()));
        }
    }

    /// {NotStarted | Running} -> Canceled. A no-op if a `complete` already
    /// won the race. Returns whether this call's cancellation took effect.
    ///
    /// `terminate_running` is called when this cancellation wins the race
    /// against a task that was actually `Running` — the Isolate Manager's
    /// `terminate_running()`, per §4.5 ("if transitioning from running,
    /// call `terminate_running()`"). A task still `NotStarted` has nothing
    /// executing on the owner thread to abort.
    pub fn cancel(&self, id: TaskId, terminate_running: impl FnOnce()) -> bool {
        let mut was_running = false;
        let callback = match self.tasks.get(&id) {
            Some(entry) => {
                let mut e = entry.lock();
                if e.state != TaskState::Completed {
                    was_running = e.state == TaskState::Running;
                    e.state = TaskState::Canceled;
                    e.on_terminal.take()
                } else {
                    None
                }
            }
            None => None,
        };
        let took_effect = callback.is_some();
        if took_effect {
            self.tasks.remove(&id);
            tracing::debug!(task_id = id, was_running, "task canceled");
        } else {
            tracing::debug!(task_id = id, "cancel lost the race to a prior complete");
        }
        if was_running {
            terminate_running();
        }
        if let Some(cb) = callback {
            cb(None);
        }
        took_effect
    }

    pub fn is_live(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id)
    }

    pub fn live_count(&self) -> usize {
        self.tasks.len()
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn complete_wins_when_uncontested() {
        let mgr = TaskManager::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        let id = mgr.schedule(move |result| {
            assert_eq!(result, Some(42));
            f.fetch_add(1, Ordering::SeqCst);
        });
        assert!(mgr.begin(id));
        mgr.complete(id, || 42);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!mgr.is_live(id));
    }

    #[test]
    fn cancel_after_complete_is_a_no_op() {
        let mgr = TaskManager::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        let id = mgr.schedule(move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        });
        mgr.begin(id);
        mgr.complete(id, || 1);
        assert!(!mgr.cancel(id, || panic!("must not terminate a completed task")));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn complete_after_cancel_is_a_no_op() {
        let mgr = TaskManager::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        let id = mgr.schedule(move |result| {
            assert_eq!(result, None);
            f.fetch_add(1, Ordering::SeqCst);
        });
        mgr.begin(id);
        assert!(mgr.cancel(id, || {}));
        mgr.complete(id, || 99);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancel_from_running_requests_termination() {
        let mgr = TaskManager::new();
        let id = mgr.schedule(|_| {});
        mgr.begin(id);
        let terminated = Arc::new(AtomicUsize::new(0));
        let t = terminated.clone();
        assert!(mgr.cancel(id, move || {
            t.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(terminated.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancel_from_not_started_does_not_request_termination() {
        let mgr = TaskManager::new();
        let id = mgr.schedule(|_| {});
        assert!(mgr.cancel(id, || panic!("nothing running to terminate")));
    }
}
