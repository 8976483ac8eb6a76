//! The client boundary (§6): the `extern "C"` surface a foreign-language
//! client links against. Everything here is a thin adapter over
//! [`crate::context::Context`] — argument-handle validation, address
//! casts, and delivering async results through the client's callback
//! pointer — rather than new engine logic.
//!
//! Grounded on the same "one global table keyed by an opaque id" shape
//! `ops::callback`'s process-wide registry already uses, generalized from
//! callback identity to context identity. There is deliberately no
//! `JSContextRef`-shaped handle here: a `context_id` is the only thing that
//! ever crosses the boundary, so a client can never smuggle a raw engine
//! pointer past the Registry.

use dashmap::DashMap;
use std::os::raw::c_char;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use crate::config::{ContextConfig, HostConfig};
use crate::context::Context;
use crate::value::{TypeTag, Value, ValueHandle};

/// The wire-level handle type: the address of a [`ValueHandle`] embedded in
/// a Registry-owned [`Value`], reinterpreted as a pointer. Never
/// dereferenced on this side of the boundary except through
/// [`Context`]'s address-keyed Registry lookups.
pub type Handle = *mut ValueHandle;

/// `void callback(callback_id: u64, result: ValueHandle*)` (§6 "Callback
/// contract"). May be invoked from the owner thread.
pub type ClientCallback = unsafe extern "C" fn(callback_id: u64, result: Handle);

struct ContextEntry {
    context: Arc<Context>,
    callback: ClientCallback,
}

static HOST_CONFIG: OnceLock<HostConfig> = OnceLock::new();
static CONTEXTS: OnceLock<DashMap<u64, ContextEntry>> = OnceLock::new();
static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);
static RUNTIME: OnceLock<tokio::runtime::Runtime> = OnceLock::new();

fn contexts() -> &'static DashMap<u64, ContextEntry> {
    CONTEXTS.get_or_init(DashMap::new)
}

/// `Context::schedule_task` calls bare `tokio::spawn`, which needs an
/// ambient runtime on the calling thread. Every entry point that reaches it
/// enters this runtime for the duration of the call via `.enter()`.
fn runtime() -> &'static tokio::runtime::Runtime {
    RUNTIME.get_or_init(|| {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("hostjs-ffi-worker")
            .build()
            .expect("failed to start the hostjs-runtime async worker pool")
    })
}

/// # Safety
/// `ptr` must be either null or a valid, NUL-terminated UTF-8 C string for
/// the duration of the call.
unsafe fn c_str_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    unsafe { std::ffi::CStr::from_ptr(ptr) }
        .to_str()
        .ok()
        .map(str::to_owned)
}

/// # Safety
/// `ptr` must be valid for `len` bytes, or `len` must be `0`.
unsafe fn bytes_to_string(ptr: *const u8, len: usize) -> Option<String> {
    if len == 0 {
        return Some(String::new());
    }
    if ptr.is_null() {
        return None;
    }
    let bytes = unsafe { std::slice::from_raw_parts(ptr, len) };
    std::str::from_utf8(bytes).ok().map(str::to_owned)
}

fn context_of(id: u64) -> Option<Arc<Context>> {
    contexts().get(&id).map(|e| e.context.clone())
}

fn entry_of(id: u64) -> Option<(Arc<Context>, ClientCallback)> {
    contexts().get(&id).map(|e| (e.context.clone(), e.callback))
}

/// Build and register a `value_exception` for a handle that failed
/// validation, per §4.7's "synthesize a value_exception Value (\"Bad
/// handle: <name>\") delivered via the same path the operation would use".
fn bad_handle(ctx: &Context, name: &str) -> Handle {
    ctx.alloc_string(&format!("Bad handle: {name}"), TypeTag::ValueException) as Handle
}

/// Deliver a value through a context's callback, consuming the callback
/// pointer. Shared by every async entry point's completion path.
fn deliver(callback: ClientCallback, callback_id: u64, handle: Handle) {
    unsafe { callback(callback_id, handle) };
}

// ---------------------------------------------------------------------
// Process init
// ---------------------------------------------------------------------

/// `init(engine_flags_string, icu_data_path, snapshot_path)` (§6). Must be
/// called at most once before any `make_context`; later calls are no-ops,
/// which `OnceLock::set` already guarantees without an extra flag.
///
/// # Safety
/// Each pointer must be either null or a valid NUL-terminated C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostjs_init(
    engine_flags: *const c_char,
    icu_data_path: *const c_char,
    snapshot_path: *const c_char,
) {
    let cfg = HostConfig {
        owner_thread_name: Some("hostjs-owner".to_string()),
        engine_flags: unsafe { c_str_to_string(engine_flags) }.unwrap_or_default(),
        icu_data_path: unsafe { c_str_to_string(icu_data_path) },
        snapshot_path: unsafe { c_str_to_string(snapshot_path) },
    };
    let _ = HOST_CONFIG.set(cfg);
}

// ---------------------------------------------------------------------
// Context lifecycle
// ---------------------------------------------------------------------

/// `make_context(callback_fp) -> context_id` (§6).
#[unsafe(no_mangle)]
pub extern "C" fn hostjs_make_context(callback: ClientCallback) -> u64 {
    let host_config = HOST_CONFIG.get().cloned().unwrap_or_default();
    let context = Arc::new(Context::new(host_config, ContextConfig::default()));
    let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
    contexts().insert(id, ContextEntry { context, callback });
    id
}

/// `free_context(id)` (§6). Unknown ids are a no-op, matching §7's "lookup
/// misses for context ids return a null handle / zero task id" policy.
#[unsafe(no_mangle)]
pub extern "C" fn hostjs_free_context(id: u64) {
    contexts().remove(&id);
}

/// `context_count() -> n` (§6).
#[unsafe(no_mangle)]
pub extern "C" fn hostjs_context_count() -> u64 {
    contexts().len() as u64
}

// ---------------------------------------------------------------------
// Value allocation / release
// ---------------------------------------------------------------------

#[unsafe(no_mangle)]
pub extern "C" fn hostjs_alloc_int(id: u64, v: i64, tag: u8) -> Handle {
    match context_of(id) {
        Some(ctx) => ctx.alloc_int(v, TypeTag::from_u8(tag)) as Handle,
        None => std::ptr::null_mut(),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn hostjs_alloc_double(id: u64, v: f64, tag: u8) -> Handle {
    match context_of(id) {
        Some(ctx) => ctx.alloc_double(v, TypeTag::from_u8(tag)) as Handle,
        None => std::ptr::null_mut(),
    }
}

/// # Safety
/// `ptr` must be valid for `len` bytes, or `len` must be `0`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostjs_alloc_string(
    id: u64,
    ptr: *const u8,
    len: usize,
    tag: u8,
) -> Handle {
    let Some(ctx) = context_of(id) else {
        return std::ptr::null_mut();
    };
    match unsafe { bytes_to_string(ptr, len) } {
        Some(s) => ctx.alloc_string(&s, TypeTag::from_u8(tag)) as Handle,
        None => bad_handle(&ctx, "alloc_string"),
    }
}

/// `free_value(id, handle)` (§6).
#[unsafe(no_mangle)]
pub extern "C" fn hostjs_free_value(id: u64, handle: Handle) -> bool {
    match context_of(id) {
        Some(ctx) => ctx.free_value(handle as usize),
        None => false,
    }
}

// ---------------------------------------------------------------------
// Async ops
// ---------------------------------------------------------------------

/// `eval(id, code_handle, callback_id) -> task_id` (§6). `code_handle` must
/// reference a string Value; a missing handle or a wrong-shape argument
/// both deliver a `value_exception` through the callback immediately and
/// return task id `0` (§4.6 Code Evaluator, §4.7 argument validation).
#[unsafe(no_mangle)]
pub extern "C" fn hostjs_eval(id: u64, code_handle: Handle, callback_id: u64) -> u64 {
    let Some((ctx, callback)) = entry_of(id) else {
        return 0;
    };
    let Some(code) = ctx.read_string(code_handle as usize) else {
        deliver(callback, callback_id, bad_handle(&ctx, "code_value"));
        return 0;
    };

    let _guard = runtime().enter();
    let on_done_ctx = ctx.clone();
    ctx.eval_task(code, "<anonymous>".to_string(), move |result| {
        finish_task(&on_done_ctx, callback, callback_id, result);
    })
}

/// `call_function(id, func_handle, this_handle, argv_handle, callback_id)
/// -> task_id` (§6). `argv_handle` references an array Value; it is
/// unpacked element-by-element (via `length`/`get_index`, the same ops the
/// Object Manipulator already exposes) before the call is scheduled, since
/// `Context::call_function_task` takes resolved argument addresses rather
/// than a single packed array.
#[unsafe(no_mangle)]
pub extern "C" fn hostjs_call_function(
    id: u64,
    func_handle: Handle,
    this_handle: Handle,
    argv_handle: Handle,
    callback_id: u64,
) -> u64 {
    let Some((ctx, callback)) = entry_of(id) else {
        return 0;
    };
    let _guard = runtime().enter();

    let this_addr = if this_handle.is_null() {
        None
    } else {
        Some(this_handle as usize)
    };
    let arg_addrs = match runtime().block_on(unpack_argv(&ctx, argv_handle as usize)) {
        Some(addrs) => addrs,
        None => {
            deliver(callback, callback_id, bad_handle(&ctx, "argv_handle"));
            return 0;
        }
    };

    let on_done_ctx = ctx.clone();
    match ctx.call_function_task(func_handle as usize, this_addr, arg_addrs, move |result| {
        finish_task(&on_done_ctx, callback, callback_id, result);
    }) {
        Ok(task_id) => task_id,
        Err(_) => {
            deliver(callback, callback_id, bad_handle(&ctx, "func_handle"));
            0
        }
    }
}

/// Unpack an array Value's elements into fresh Registry addresses, each
/// one a newly allocated Value the client will separately `free_value`.
async fn unpack_argv(ctx: &Context, argv_addr: usize) -> Option<Vec<usize>> {
    let len = ctx.length(argv_addr).await.ok()?;
    let mut out = Vec::with_capacity(len as usize);
    for i in 0..len {
        out.push(ctx.get_index(argv_addr, i as u32).await.ok()?);
    }
    Some(out)
}

/// Shared completion path for both async ops: `None` (the task lost the
/// race to `cancel_task`) becomes a `terminated_exception`, matching §7's
/// "terminated_exception — task was canceled".
fn finish_task(ctx: &Context, callback: ClientCallback, callback_id: u64, result: Option<usize>) {
    let handle = match result {
        Some(addr) => addr as Handle,
        None => ctx.alloc_string("", TypeTag::TerminatedException) as Handle,
    };
    deliver(callback, callback_id, handle);
}

// ---------------------------------------------------------------------
// Sync ops
// ---------------------------------------------------------------------

#[unsafe(no_mangle)]
pub extern "C" fn hostjs_get_identity_hash(id: u64, object_handle: Handle) -> i64 {
    let Some(ctx) = context_of(id) else { return 0 };
    let _guard = runtime().enter();
    runtime()
        .block_on(ctx.identity_hash(object_handle as usize))
        .unwrap_or(0)
}

#[unsafe(no_mangle)]
pub extern "C" fn hostjs_get_own_property_names(id: u64, object_handle: Handle) -> Handle {
    let Some(ctx) = context_of(id) else {
        return std::ptr::null_mut();
    };
    let _guard = runtime().enter();
    match runtime().block_on(ctx.own_property_names_value(object_handle as usize)) {
        Ok(addr) => addr as Handle,
        Err(_) => bad_handle(&ctx, "object_handle"),
    }
}

/// # Safety
/// `key_ptr` must be valid for `key_len` bytes, or `key_len` must be `0`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostjs_get_object_item(
    id: u64,
    object_handle: Handle,
    key_ptr: *const u8,
    key_len: usize,
) -> Handle {
    let Some(ctx) = context_of(id) else {
        return std::ptr::null_mut();
    };
    let Some(key) = (unsafe { bytes_to_string(key_ptr, key_len) }) else {
        return bad_handle(&ctx, "key");
    };
    let _guard = runtime().enter();
    match runtime().block_on(ctx.get_property(object_handle as usize, key)) {
        Ok(addr) => addr as Handle,
        Err(_) => bad_handle(&ctx, "object_handle"),
    }
}

/// # Safety
/// `key_ptr` must be valid for `key_len` bytes, or `key_len` must be `0`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostjs_set_object_item(
    id: u64,
    object_handle: Handle,
    key_ptr: *const u8,
    key_len: usize,
    value_handle: Handle,
) -> bool {
    let Some(ctx) = context_of(id) else { return false };
    let Some(key) = (unsafe { bytes_to_string(key_ptr, key_len) }) else {
        return false;
    };
    let _guard = runtime().enter();
    runtime()
        .block_on(ctx.set_property(object_handle as usize, key, value_handle as usize))
        .unwrap_or(false)
}

/// # Safety
/// `key_ptr` must be valid for `key_len` bytes, or `key_len` must be `0`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostjs_del_object_item(
    id: u64,
    object_handle: Handle,
    key_ptr: *const u8,
    key_len: usize,
) -> Handle {
    let Some(ctx) = context_of(id) else {
        return std::ptr::null_mut();
    };
    let Some(key) = (unsafe { bytes_to_string(key_ptr, key_len) }) else {
        return bad_handle(&ctx, "key");
    };
    let _guard = runtime().enter();
    match runtime().block_on(ctx.delete_property(object_handle as usize, key)) {
        Ok(addr) => addr as Handle,
        Err(_) => bad_handle(&ctx, "object_handle"),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn hostjs_splice_array(
    id: u64,
    object_handle: Handle,
    start: i64,
    delete_count: i64,
    new_val_handle: Handle,
) -> Handle {
    let Some(ctx) = context_of(id) else {
        return std::ptr::null_mut();
    };
    let new_val_addr = if new_val_handle.is_null() {
        None
    } else {
        Some(new_val_handle as usize)
    };
    let _guard = runtime().enter();
    match runtime().block_on(ctx.splice(object_handle as usize, start, delete_count, new_val_addr)) {
        Ok(addr) => addr as Handle,
        Err(_) => bad_handle(&ctx, "object_handle"),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn hostjs_array_push(id: u64, object_handle: Handle, value_handle: Handle) -> Handle {
    let Some(ctx) = context_of(id) else {
        return std::ptr::null_mut();
    };
    let _guard = runtime().enter();
    match runtime().block_on(ctx.push(object_handle as usize, value_handle as usize)) {
        Ok(addr) => addr as Handle,
        Err(_) => bad_handle(&ctx, "object_handle"),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn hostjs_heap_stats(id: u64) -> Handle {
    let Some(ctx) = context_of(id) else {
        return std::ptr::null_mut();
    };
    let _guard = runtime().enter();
    runtime()
        .block_on(ctx.heap_stats())
        .map(|a| a as Handle)
        .unwrap_or(std::ptr::null_mut())
}

#[unsafe(no_mangle)]
pub extern "C" fn hostjs_heap_snapshot(id: u64) -> Handle {
    let Some(ctx) = context_of(id) else {
        return std::ptr::null_mut();
    };
    let _guard = runtime().enter();
    runtime()
        .block_on(ctx.heap_snapshot())
        .map(|a| a as Handle)
        .unwrap_or(std::ptr::null_mut())
}

/// `make_js_callback(callback_id) -> function Value` (§4.6, §6). The
/// produced function re-enters the client on invocation: its JS arguments
/// are packed into a fresh array Value and the context's stored
/// `ClientCallback` is invoked with `(callback_id, argv_as_handle)`. If the
/// context has already been torn down by the time the JS function fires,
/// the call is silently ignored (§4.6's stated rationale: embedding a raw
/// native pointer in a JS-reachable value would tie JS object lifetime to
/// native teardown).
#[unsafe(no_mangle)]
pub extern "C" fn hostjs_make_js_callback(id: u64, callback_id: u64) -> Handle {
    let Some(ctx) = context_of(id) else {
        return std::ptr::null_mut();
    };
    let _guard = runtime().enter();
    let body_ctx_id = id;
    let body: crate::ops::callback::HostCallback = Box::new(move |raw_ctx, args| {
        let Some((ctx, callback)) = entry_of(body_ctx_id) else {
            // Context already torn down; drop the invocation on the floor
            // per §4.6's stated rationale.
            return Value::undefined();
        };
        let mut exception = std::ptr::null_mut();
        let array = unsafe {
            hostjs_sys::JSObjectMakeArray(raw_ctx, args.len(), args.as_ptr(), &mut exception)
        };
        let argv_value = if exception.is_null() {
            unsafe { crate::factory::Factory::from_any(raw_ctx, array as hostjs_sys::JSValueRef) }
        } else {
            Value::exception(TypeTag::ExecuteException, "failed to pack callback arguments")
        };
        let argv_addr = ctx.alloc_value(argv_value);
        deliver(callback, callback_id, argv_addr as Handle);
        Value::undefined()
    });
    match runtime().block_on(ctx.make_callback(body)) {
        Ok((addr, _call_id, _generation)) => addr as Handle,
        Err(_) => bad_handle(&ctx, "make_js_callback"),
    }
}

// ---------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------

/// `cancel_task(id, task_id)` (§6).
#[unsafe(no_mangle)]
pub extern "C" fn hostjs_cancel_task(id: u64, task_id: u64) -> bool {
    match context_of(id) {
        Some(ctx) => ctx.cancel_task(task_id),
        None => false,
    }
}

// ---------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------

#[unsafe(no_mangle)]
pub extern "C" fn hostjs_set_hard_memory_limit(id: u64, bytes: u64) {
    if let Some(ctx) = context_of(id) {
        ctx.set_hard_memory_limit(bytes);
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn hostjs_set_soft_memory_limit(id: u64, bytes: u64) {
    if let Some(ctx) = context_of(id) {
        ctx.set_soft_memory_limit(bytes);
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn hostjs_hard_memory_limit_reached(id: u64) -> bool {
    context_of(id).map(|ctx| ctx.hard_memory_limit_reached()).unwrap_or(false)
}

#[unsafe(no_mangle)]
pub extern "C" fn hostjs_soft_memory_limit_reached(id: u64) -> bool {
    context_of(id).map(|ctx| ctx.soft_memory_limit_reached()).unwrap_or(false)
}

#[unsafe(no_mangle)]
pub extern "C" fn hostjs_low_memory_notification(id: u64) {
    if let Some(ctx) = context_of(id) {
        let _guard = runtime().enter();
        let _ = runtime().block_on(ctx.low_memory_notification());
    }
}

// ---------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------

/// `v8_version() -> string` (§6): kept under its spec'd name for client
/// compatibility even though this host runs JavaScriptCore, not V8. The
/// returned string names the underlying engine rather than lying about a
/// V8 release.
#[unsafe(no_mangle)]
pub extern "C" fn hostjs_v8_version() -> *const c_char {
    static VERSION: OnceLock<std::ffi::CString> = OnceLock::new();
    VERSION
        .get_or_init(|| std::ffi::CString::new("javascriptcore").unwrap_or_default())
        .as_ptr()
}

/// `v8_is_using_sandbox() -> bool` (§6): JavaScriptCore has no V8-Sandbox
/// equivalent, so this always reports `false`.
#[unsafe(no_mangle)]
pub extern "C" fn hostjs_v8_is_using_sandbox() -> bool {
    false
}

#[unsafe(no_mangle)]
pub extern "C" fn hostjs_value_count(id: u64) -> u64 {
    context_of(id).map(|ctx| ctx.live_value_count() as u64).unwrap_or(0)
}
