//! The Isolate Manager: a single owner thread that is the only thread ever
//! allowed to touch an [`EngineContext`]. Every other component reaches the
//! engine by submitting a closure and awaiting its result.
//!
//! Grounded on `otter-runtime`'s worker-thread-plus-channel pattern
//! (`isolate.rs`/`worker.rs` in that crate run a `JscContext` on a dedicated
//! thread and hand work to it over a channel); generalized here to the
//! explicit RUN/NO_JS/STOP state machine this spec requires, plus
//! termination wired through `JSContextGroupSetExecutionTimeLimit`, which
//! JavaScriptCore documents as safe to call from a thread other than the
//! one running the script — exactly the "watchdog" use this manager needs.

use crossbeam_channel::{Sender, unbounded};
use hostjs_core::EngineContext;
use hostjs_sys::{JSContextGroupRef, JSContextGroupSetExecutionTimeLimit};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::oneshot;

use crate::collector::Collector;
use crate::memory::MemoryMonitor;

#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum IsolateState {
    Run = 0,
    NoJs = 1,
    Stop = 2,
}

impl From<u8> for IsolateState {
    fn from(v: u8) -> Self {
        match v {
            0 => IsolateState::Run,
            1 => IsolateState::NoJs,
            _ => IsolateState::Stop,
        }
    }
}

/// `JSContextGroupRef` is just a pointer, but raw pointers are `!Send` by
/// default. `JSContextGroupSetExecutionTimeLimit` is documented by
/// JavaScriptCore as safe to call from any thread, which is the only
/// operation this crate performs on a `GroupHandle` off the owner thread.
#[derive(Clone, Copy)]
struct GroupHandle(JSContextGroupRef);
unsafe impl Send for GroupHandle {}
unsafe impl Sync for GroupHandle {}

type Job = Box<dyn FnOnce(&EngineContext, &Collector, &MemoryMonitor) + Send>;

/// How often the watchdog thread samples [`MemoryMonitor`] to catch a hard
/// memory limit breached mid-script, when the owner thread itself is
/// blocked running that script and can't sample between jobs.
const WATCHDOG_INTERVAL: Duration = Duration::from_millis(5);

/// Owns the engine context's single owner thread and the FIFO job queue
/// feeding it.
pub struct IsolateManager {
    sender: Sender<Job>,
    state: Arc<AtomicU8>,
    group: Mutex<Option<GroupHandle>>,
    collector: Arc<Collector>,
    memory: Arc<MemoryMonitor>,
    join: Mutex<Option<JoinHandle<()>>>,
    watchdog: Mutex<Option<JoinHandle<()>>>,
}

impl IsolateManager {
    pub fn new(thread_name: Option<String>) -> Self {
        let (sender, receiver) = unbounded::<Job>();
        let state = Arc::new(AtomicU8::new(IsolateState::Run as u8));
        let collector = Arc::new(Collector::new());
        let memory = Arc::new(MemoryMonitor::new());
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<GroupHandle>();

        let loop_state = state.clone();
        let loop_collector = collector.clone();
        let loop_memory = memory.clone();

        let mut builder = std::thread::Builder::new();
        if let Some(name) = thread_name {
            builder = builder.name(name);
        }
        let join = builder
            .spawn(move || {
                let ctx = EngineContext::new().expect("failed to create JavaScriptCore context");
                let _ = ready_tx.send(GroupHandle(ctx.group()));
                tracing::debug!("isolate owner thread started");

                while let Ok(job) = receiver.recv() {
                    job(&ctx, &loop_collector, &loop_memory);
                    // SAFETY: this closure runs on the owner thread, which
                    // is the one constraint `Collector::drain` requires.
                    unsafe { loop_collector.drain() };
                    loop_memory.sample();
                    if IsolateState::from(loop_state.load(Ordering::Acquire)) == IsolateState::Stop
                    {
                        break;
                    }
                }
                // SAFETY: still the owner thread; release anything queued
                // by the final job before the thread exits.
                unsafe { loop_collector.drain() };
                tracing::debug!("isolate owner thread exiting");
            })
            .expect("failed to spawn isolate owner thread");

        let group = ready_rx.recv().ok();

        let watchdog_state = state.clone();
        let watchdog_memory = memory.clone();
        let watchdog_group = group;
        let watchdog = std::thread::Builder::new()
            .name("hostjs-memory-watchdog".into())
            .spawn(move || {
                let mut was_hard_reached = false;
                loop {
                    if IsolateState::from(watchdog_state.load(Ordering::Acquire))
                        == IsolateState::Stop
                    {
                        break;
                    }
                    watchdog_memory.sample();
                    let now_reached = watchdog_memory.is_hard_reached();
                    if now_reached && !was_hard_reached {
                        if let Some(group) = watchdog_group {
                            tracing::warn!(
                                used_bytes = watchdog_memory.last_sampled_bytes(),
                                hard_limit_bytes = watchdog_memory.hard_limit(),
                                "hard memory limit reached, terminating running script"
                            );
                            // SAFETY: documented safe to call from any
                            // thread; group is valid for the isolate's
                            // lifetime.
                            unsafe {
                                JSContextGroupSetExecutionTimeLimit(
                                    group.0,
                                    0.0,
                                    None,
                                    std::ptr::null_mut(),
                                );
                            }
                        }
                    }
                    was_hard_reached = now_reached;
                    std::thread::sleep(WATCHDOG_INTERVAL);
                }
            })
            .expect("failed to spawn memory watchdog thread");

        Self {
            sender,
            state,
            group: Mutex::new(group),
            collector,
            memory,
            join: Mutex::new(Some(join)),
            watchdog: Mutex::new(Some(watchdog)),
        }
    }

    /// Submit `f` to run on the owner thread; resolves once it has run.
    /// Jobs run strictly in submission order (§4.1's FIFO guarantee), since
    /// `crossbeam_channel::unbounded` preserves sender order and the owner
    /// thread drains one job at a time.
    pub fn submit<F, R>(&self, f: F) -> oneshot::Receiver<R>
    where
        F: FnOnce(&EngineContext) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move |ctx, _collector, _memory| {
            let result = f(ctx);
            let _ = tx.send(result);
        });
        // If the owner thread is already gone the receiver is simply
        // dropped unfulfilled; callers observe that as a closed channel.
        let _ = self.sender.send(job);
        rx
    }

    pub fn collector(&self) -> &Arc<Collector> {
        &self.collector
    }

    pub fn memory(&self) -> &Arc<MemoryMonitor> {
        &self.memory
    }

    pub fn state(&self) -> IsolateState {
        IsolateState::from(self.state.load(Ordering::Acquire))
    }

    /// RUN -> NO_JS: forbids further JS (eval-class operations in
    /// `Context` check `state()` and short-circuit to a `terminated_exception`
    /// instead of calling into JSC) and requests termination of whatever
    /// script is running right now, per §4.1.
    pub fn stop_javascript(&self) {
        let transitioned = self
            .state
            .compare_exchange(
                IsolateState::Run as u8,
                IsolateState::NoJs as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if transitioned {
            tracing::info!("javascript stopped for this isolate");
            self.terminate_running();
        }
    }

    /// Abort whatever script is currently running on the owner thread, if
    /// any, by arming JavaScriptCore's execution time limit at zero.
    /// Callable from any thread. Has no persistent effect: `ops::eval`
    /// clears the limit before starting each new evaluation so a past
    /// `terminate_running` call never kills an unrelated later script.
    pub fn terminate_running(&self) {
        if let Some(group) = *self.group.lock() {
            tracing::debug!("requesting termination of running script");
            // SAFETY: documented safe to call from any thread; group
            // remains valid for the isolate's lifetime.
            unsafe {
                JSContextGroupSetExecutionTimeLimit(group.0, 0.0, None, std::ptr::null_mut());
            }
        }
    }

    pub(crate) fn group(&self) -> Option<JSContextGroupRef> {
        self.group.lock().map(|g| g.0)
    }
}

impl Drop for IsolateManager {
    fn drop(&mut self) {
        tracing::debug!("isolate manager dropping, signaling owner thread to stop");
        self.state.store(IsolateState::Stop as u8, Ordering::Release);
        let _ = self
            .sender
            .send(Box::new(move |_ctx, _collector, _memory| {}));
        if let Some(handle) = self.join.lock().take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.watchdog.lock().take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_runs_in_order_and_reports_result() {
        let mgr = IsolateManager::new(None);
        let rx = mgr.submit(|ctx| ctx.eval("1 + 1").unwrap().to_number().unwrap());
        let result = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(rx)
            .unwrap();
        assert_eq!(result, 2.0);
    }

    #[test]
    fn stop_javascript_transitions_state() {
        let mgr = IsolateManager::new(None);
        assert_eq!(mgr.state(), IsolateState::Run);
        mgr.stop_javascript();
        assert_eq!(mgr.state(), IsolateState::NoJs);
    }
}
