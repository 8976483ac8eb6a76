//! The Context Façade (§4.7): the one type client code actually holds. Wires
//! the Isolate Manager, Value Registry/Factory, Object Collector, Memory
//! Monitor, and Cancelable Task Manager together behind an async API.

use hostjs_core::EngineContext;
use hostjs_sys::{JSContextRef, JSObjectRef, JSValueRef};
use std::sync::Arc;

use crate::config::{ContextConfig, HostConfig};
use crate::error::{HostError, HostResult};
use crate::isolate::{IsolateManager, IsolateState};
use crate::ops;
use crate::ops::heap::HeapReport;
use crate::registry::Registry;
use crate::task::{TaskId, TaskManager};
use crate::value::{TypeTag, Value};

pub struct Context {
    isolate: IsolateManager,
    registry: Arc<Registry>,
    tasks: Arc<TaskManager>,
}

impl Context {
    pub fn new(host_config: HostConfig, context_config: ContextConfig) -> Self {
        let isolate = IsolateManager::new(host_config.owner_thread_name.clone());
        isolate.memory().set_soft_limit(context_config.soft_memory_limit);
        isolate.memory().set_hard_limit(context_config.hard_memory_limit);
        Self {
            isolate,
            registry: Arc::new(Registry::new()),
            tasks: Arc::new(TaskManager::new()),
        }
    }

    /// Run `script`, remember the resulting (possibly error-tagged) value,
    /// and return its handle address. If JS has been stopped (§4.1), short
    /// circuits to a `terminated_exception` without ever touching JSC.
    pub async fn eval(&self, script: String, source_url: String) -> HostResult<usize> {
        if self.isolate.state() != IsolateState::Run {
            return Ok(self.registry.remember(Self::js_stopped_exception()));
        }
        let memory = self.isolate.memory().clone();
        let rx = self
            .isolate
            .submit(move |ctx| unsafe { ops::eval::run(ctx, &script, &source_url, &memory) });
        let value = rx.await.map_err(|_| HostError::OwnerThreadGone)?;
        Ok(self.registry.remember(value))
    }

    /// `eval` as a cancelable task (§6 "Async ops"): returns a task id
    /// immediately; `on_done` fires exactly once with the resulting handle
    /// address, or `None` if `cancel_task` wins the race against completion.
    pub fn eval_task(
        &self,
        script: String,
        source_url: String,
        on_done: impl FnOnce(Option<usize>) + Send + 'static,
    ) -> TaskId {
        if self.isolate.state() != IsolateState::Run {
            let addr = self.registry.remember(Self::js_stopped_exception());
            let id = self.tasks.schedule(on_done);
            self.tasks.begin(id);
            self.tasks.complete(id, || addr);
            return id;
        }
        let memory = self.isolate.memory().clone();
        self.schedule_task(
            move |ctx| unsafe { ops::eval::run(ctx, &script, &source_url, &memory) },
            on_done,
        )
    }

    fn js_stopped_exception() -> Value {
        Value::exception(TypeTag::TerminatedException, "JavaScript execution is stopped")
    }

    /// `call_function` as a cancelable task, mirroring [`Context::eval_task`].
    pub fn call_function_task(
        &self,
        function_addr: usize,
        this_addr: Option<usize>,
        arg_addrs: Vec<usize>,
        on_done: impl FnOnce(Option<usize>) + Send + 'static,
    ) -> HostResult<TaskId> {
        let function_raw = self.raw_object_of(function_addr)?;
        let this_raw = match this_addr {
            Some(a) => self.raw_value_of(a)? as JSObjectRef,
            None => std::ptr::null_mut(),
        };
        let mut args = Vec::with_capacity(arg_addrs.len());
        for a in arg_addrs {
            args.push(self.raw_value_of(a)?);
        }
        Ok(self.schedule_task(
            move |ctx| unsafe { ops::object::call(ctx.raw(), function_raw, this_raw, &args) },
            on_done,
        ))
    }

    pub async fn get_property(&self, object_addr: usize, key: String) -> HostResult<usize> {
        self.with_object(object_addr, move |ctx, obj| unsafe {
            ops::object::get(ctx, obj, &key)
        })
        .await
    }

    pub async fn set_property(
        &self,
        object_addr: usize,
        key: String,
        value_addr: usize,
    ) -> HostResult<bool> {
        let value_raw = self.raw_value_of(value_addr)?;
        self.with_raw_object(object_addr, move |ctx, obj| unsafe {
            ops::object::set(ctx, obj, &key, value_raw)
        })
        .await
    }

    pub async fn has_property(&self, object_addr: usize, key: String) -> HostResult<bool> {
        self.with_raw_object(object_addr, move |ctx, obj| unsafe {
            ops::object::has(ctx, obj, &key)
        })
        .await
    }

    pub async fn delete_property(&self, object_addr: usize, key: String) -> HostResult<usize> {
        self.with_object(object_addr, move |ctx, obj| unsafe {
            ops::object::delete(ctx, obj, &key)
        })
        .await
    }

    pub async fn get_index(&self, object_addr: usize, index: u32) -> HostResult<usize> {
        self.with_object(object_addr, move |ctx, obj| unsafe {
            ops::object::get_index(ctx, obj, index)
        })
        .await
    }

    pub async fn set_index(
        &self,
        object_addr: usize,
        index: u32,
        value_addr: usize,
    ) -> HostResult<bool> {
        let value_raw = self.raw_value_of(value_addr)?;
        self.with_raw_object(object_addr, move |ctx, obj| unsafe {
            ops::object::set_index(ctx, obj, index, value_raw)
        })
        .await
    }

    pub async fn call_function(
        &self,
        function_addr: usize,
        this_addr: Option<usize>,
        arg_addrs: Vec<usize>,
    ) -> HostResult<usize> {
        let this_raw = match this_addr {
            Some(a) => self.raw_value_of(a)?,
            None => std::ptr::null_mut(),
        };
        let mut args = Vec::with_capacity(arg_addrs.len());
        for a in arg_addrs {
            args.push(self.raw_value_of(a)?);
        }
        self.with_raw_object(function_addr, move |ctx, function| unsafe {
            ops::object::call(ctx, function, this_raw as JSObjectRef, &args)
        })
        .await
    }

    pub async fn own_property_names(&self, object_addr: usize) -> HostResult<Vec<String>> {
        let raw = self.raw_object_of(object_addr)?;
        let rx = self
            .isolate
            .submit(move |ctx| unsafe { ops::object::own_property_names(ctx.raw(), raw) });
        rx.await.map_err(|_| HostError::OwnerThreadGone)
    }

    /// `own_property_names`, wrapped as the array Value the client boundary
    /// expects (see [`Context::own_property_names`] for the `Vec<String>`
    /// form used internally and by tests).
    pub async fn own_property_names_value(&self, object_addr: usize) -> HostResult<usize> {
        self.with_object(object_addr, move |ctx, obj| unsafe {
            ops::object::own_property_names_array(ctx, obj)
        })
        .await
    }

    pub async fn length(&self, object_addr: usize) -> HostResult<u64> {
        let raw = self.raw_object_of(object_addr)?;
        let rx = self
            .isolate
            .submit(move |ctx| unsafe { ops::object::length(ctx.raw(), raw) });
        rx.await.map_err(|_| HostError::OwnerThreadGone)
    }

    pub async fn identity_hash(&self, object_addr: usize) -> HostResult<i64> {
        self.with_raw_object(object_addr, move |_ctx, obj| unsafe {
            ops::object::identity_hash(obj)
        })
        .await
    }

    pub async fn splice(
        &self,
        object_addr: usize,
        start: i64,
        delete_count: i64,
        new_val_addr: Option<usize>,
    ) -> HostResult<usize> {
        let new_val_raw = match new_val_addr {
            Some(a) => Some(self.raw_value_of(a)?),
            None => None,
        };
        self.with_object(object_addr, move |ctx, obj| unsafe {
            ops::object::splice(ctx, obj, start, delete_count, new_val_raw)
        })
        .await
    }

    pub async fn push(&self, object_addr: usize, value_addr: usize) -> HostResult<usize> {
        let value_raw = self.raw_value_of(value_addr)?;
        self.with_object(object_addr, move |ctx, obj| unsafe {
            ops::object::push(ctx, obj, value_raw)
        })
        .await
    }

    /// `heap_stats()` (§4.6): dispatched through the owner thread like every
    /// other operation module call, even though building the JSON payload
    /// itself touches only the Registry/Monitor, not the engine context.
    pub async fn heap_stats(&self) -> HostResult<usize> {
        let registry = self.registry.clone();
        let memory = self.isolate.memory().clone();
        let rx = self
            .isolate
            .submit(move |_ctx| ops::heap::heap_stats_value(&registry, &memory));
        let value = rx.await.map_err(|_| HostError::OwnerThreadGone)?;
        Ok(self.registry.remember(value))
    }

    pub async fn heap_snapshot(&self) -> HostResult<usize> {
        let registry = self.registry.clone();
        let memory = self.isolate.memory().clone();
        let rx = self
            .isolate
            .submit(move |_ctx| ops::heap::heap_snapshot_value(&registry, &memory));
        let value = rx.await.map_err(|_| HostError::OwnerThreadGone)?;
        Ok(self.registry.remember(value))
    }

    pub fn set_hard_memory_limit(&self, bytes: u64) {
        self.isolate.memory().set_hard_limit(bytes);
    }

    pub fn set_soft_memory_limit(&self, bytes: u64) {
        self.isolate.memory().set_soft_limit(bytes);
    }

    pub fn hard_memory_limit_reached(&self) -> bool {
        self.isolate.memory().is_hard_reached()
    }

    pub fn soft_memory_limit_reached(&self) -> bool {
        self.isolate.memory().is_soft_reached()
    }

    /// Forward a moderate-pressure hint to the engine (§4.3). Dispatched
    /// through the owner thread since it ultimately calls `JSGarbageCollect`.
    pub async fn low_memory_notification(&self) -> HostResult<()> {
        let memory = self.isolate.memory().clone();
        let rx = self
            .isolate
            .submit(move |ctx| memory.apply_low_memory_notification(ctx));
        rx.await.map_err(|_| HostError::OwnerThreadGone)
    }

    /// Create a JS-callable function wrapping `body`. `body` receives raw
    /// argument references for the duration of the call only. Returns the
    /// registry address of the persisted function value and its `(id,
    /// generation)` identity pair.
    pub async fn make_callback(
        &self,
        body: ops::callback::HostCallback,
    ) -> HostResult<(usize, u64, u64)> {
        let rx = self.isolate.submit(move |ctx| {
            let c = ctx.raw();
            let (object, id, generation) = unsafe { ops::callback::make_callback(c, body) };
            let handle = unsafe { crate::value::protect(c, object as JSValueRef) };
            (Value::persistent(TypeTag::Function, handle), id, generation)
        });
        let (value, id, generation) = rx.await.map_err(|_| HostError::OwnerThreadGone)?;
        let addr = self.registry.remember(value);
        Ok((addr, id, generation))
    }

    /// Run `body` on the owner thread and report its outcome through
    /// `on_done`: `Some(addr)` for the registry address of the completed
    /// result, `None` if `cancel_task` won the race first. `on_done` fires
    /// exactly once (`TaskManager`'s guarantee, §4.5).
    pub fn schedule_task<F, OnDone>(&self, body: F, on_done: OnDone) -> TaskId
    where
        F: FnOnce(&EngineContext) -> Value + Send + 'static,
        OnDone: FnOnce(Option<usize>) + Send + 'static,
    {
        let registry = self.registry.clone();
        let id = self.tasks.schedule(on_done);
        let tasks = self.tasks.clone();
        tasks.begin(id);

        let rx = self.isolate.submit(move |ctx| body(ctx));
        tokio::spawn(async move {
            match rx.await {
                Ok(value) => {
                    tasks.complete(id, move || registry.remember(value));
                }
                Err(_) => {
                    // Owner thread is gone before the job ran; resolve the
                    // task as canceled so `on_done` still fires exactly once.
                    // Nothing is running on a thread that no longer exists.
                    tasks.cancel(id, || {});
                }
            }
        });
        id
    }

    /// Cancel task `id` (§4.5): if it was actually `running`, this also
    /// requests termination of the script executing on the owner thread.
    pub fn cancel_task(&self, id: TaskId) -> bool {
        self.tasks.cancel(id, || self.isolate.terminate_running())
    }

    /// Build an inline primitive Value directly, without a trip through the
    /// owner thread (§3 "Create... on any thread, for pure primitives built
    /// from client-supplied bytes").
    pub fn alloc_int(&self, v: i64, tag: TypeTag) -> usize {
        let value = match tag {
            TypeTag::Bool => Value::bool(v != 0),
            TypeTag::Null => Value::null(),
            TypeTag::Undefined => Value::undefined(),
            _ => Value::integer(v),
        };
        self.registry.remember(value)
    }

    pub fn alloc_double(&self, v: f64, tag: TypeTag) -> usize {
        let value = if tag == TypeTag::Date {
            Value::date(v)
        } else {
            Value::double(v)
        };
        self.registry.remember(value)
    }

    /// Register an already-built Value (e.g. one constructed outside the
    /// owner-thread dispatch path, such as an array packed by a JS
    /// callback's trampoline) and return its handle address.
    pub fn alloc_value(&self, value: Value) -> usize {
        self.registry.remember(value)
    }

    pub fn alloc_string(&self, s: &str, tag: TypeTag) -> usize {
        let value = if tag.is_exception() {
            Value::exception(tag, s)
        } else {
            Value::string(tag, s)
        };
        self.registry.remember(value)
    }

    pub fn free_value(&self, addr: usize) -> bool {
        match self.registry.forget(addr) {
            Some(value) => {
                if let Some(handle) = value.persistent_handle() {
                    self.isolate.collector().collect(handle);
                    // Nudge a drain promptly instead of waiting for the
                    // next unrelated job.
                    let _ = self.isolate.submit(|_ctx| ());
                }
                true
            }
            None => false,
        }
    }

    pub fn terminate_running(&self) {
        self.isolate.terminate_running();
    }

    pub fn stop_javascript(&self) {
        self.isolate.stop_javascript();
    }

    pub fn heap_report(&self) -> HeapReport {
        ops::heap::report(&self.registry, self.isolate.memory())
    }

    pub fn live_value_count(&self) -> usize {
        self.registry.count()
    }

    /// Read the UTF-8 content of a client-allocated string Value back out,
    /// for operations (like `eval`) whose engine-side entry point takes a
    /// plain `&str` rather than another Value handle.
    pub fn read_string(&self, addr: usize) -> Option<String> {
        self.registry
            .with(addr, |v| v.as_str().map(str::to_owned))
            .flatten()
    }

    fn raw_value_of(&self, addr: usize) -> HostResult<JSValueRef> {
        self.registry
            .with(addr, |v| v.raw_engine_value())
            .flatten()
            .ok_or_else(|| HostError::internal("handle does not reference an engine value"))
    }

    fn raw_object_of(&self, addr: usize) -> HostResult<JSObjectRef> {
        self.raw_value_of(addr).map(|v| v as JSObjectRef)
    }

    async fn with_object<F>(&self, object_addr: usize, f: F) -> HostResult<usize>
    where
        F: FnOnce(JSContextRef, JSObjectRef) -> Value + Send + 'static,
    {
        let raw = self.raw_object_of(object_addr)?;
        let rx = self.isolate.submit(move |ctx| f(ctx.raw(), raw));
        let value = rx.await.map_err(|_| HostError::OwnerThreadGone)?;
        Ok(self.registry.remember(value))
    }

    async fn with_raw_object<F, R>(&self, object_addr: usize, f: F) -> HostResult<R>
    where
        F: FnOnce(JSContextRef, JSObjectRef) -> R + Send + 'static,
        R: Send + 'static,
    {
        let raw = self.raw_object_of(object_addr)?;
        let rx = self.isolate.submit(move |ctx| f(ctx.raw(), raw));
        rx.await.map_err(|_| HostError::OwnerThreadGone)
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        // Give the owner thread a last chance to drain before it shuts
        // down (IsolateManager's own Drop joins the thread after this).
        self.isolate.collector().wait_until_empty();
    }
}
