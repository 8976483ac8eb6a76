//! The JS Callback Maker (§4.6): wraps a Rust closure as a callable
//! JavaScript function.
//!
//! JSC's `JSObjectGetPrivate`/`JSObjectSetPrivate` only work on objects
//! created from a `JSClass` that reserves a private-data slot, so this
//! module defines one minimal class (`call_as_function` + `finalize`) and
//! stores a thin, C-ABI-compatible pointer to the Rust closure as that
//! object's private data — freed by `finalize` when JSC's GC collects the
//! function, which is also what makes the Collector's deferred-release
//! story apply to callbacks the same as any other engine-backed value.
//!
//! The identity returned to the client is a two-element `(id, generation)`
//! pair (exposed as a bigint pair across the FFI boundary) rather than the
//! private-data pointer itself, so client code never needs to smuggle a raw
//! Rust pointer through JS. This implementation never reuses an id, so
//! `generation` is always `0`; the field exists for forward compatibility
//! with a slot-reuse scheme, should callback churn ever make one worth
//! adding.

use hostjs_sys::*;
use std::ffi::c_void;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::value::{TypeTag, Value};

pub type HostCallback = Box<dyn Fn(JSContextRef, &[JSValueRef]) -> Value + Send + Sync>;

struct Entry {
    id: u64,
    generation: u64,
    body: HostCallback,
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// The callback class is created lazily and lives for the process'
/// lifetime — it carries no per-context state, only the two function
/// pointers below, so sharing one instance across every context is safe.
static CALLBACK_CLASS: std::sync::OnceLock<ClassHandle> = std::sync::OnceLock::new();

struct ClassHandle(JSClassRef);
unsafe impl Send for ClassHandle {}
unsafe impl Sync for ClassHandle {}

fn callback_class() -> JSClassRef {
    CALLBACK_CLASS
        .get_or_init(|| {
            let mut def = JSClassDefinition {
                call_as_function: Some(trampoline),
                finalize: Some(finalize),
                ..JSClassDefinition::default()
            };
            // SAFETY: `def` outlives the call; JSClassCreate copies what it
            // needs out of the definition.
            let class = unsafe { JSClassCreate(&mut def) };
            ClassHandle(class)
        })
        .0
}

/// Create a JS function object backed by `body`. Returns the function
/// object and the `(id, generation)` identity pair.
///
/// # Safety
/// `ctx` must be valid and current on the owner thread.
pub unsafe fn make_callback(ctx: JSContextRef, body: HostCallback) -> (JSObjectRef, u64, u64) {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    let entry = Box::new(Entry {
        id,
        generation: 0,
        body,
    });
    let private = Box::into_raw(entry) as *mut c_void;
    let object = unsafe { JSObjectMake(ctx, callback_class(), private) };
    (object, id, 0)
}

pub fn identity_tag() -> TypeTag {
    TypeTag::Function
}

unsafe extern "C" fn trampoline(
    ctx: JSContextRef,
    function: JSObjectRef,
    _this_object: JSObjectRef,
    argument_count: usize,
    arguments: *const JSValueRef,
    exception: *mut JSValueRef,
) -> JSValueRef {
    let private = unsafe { JSObjectGetPrivate(function) } as *const Entry;
    if private.is_null() {
        return unsafe { JSValueMakeUndefined(ctx) };
    }
    let entry = unsafe { &*private };
    let args = if argument_count == 0 {
        &[][..]
    } else {
        unsafe { std::slice::from_raw_parts(arguments, argument_count) }
    };

    let result = (entry.body)(ctx, args);
    match result.raw_engine_value() {
        Some(raw) => raw,
        None => unsafe { inline_to_raw(ctx, &result, exception) },
    }
}

unsafe extern "C" fn finalize(object: JSObjectRef) {
    let private = unsafe { JSObjectGetPrivate(object) } as *mut Entry;
    if !private.is_null() {
        // SAFETY: private was created by `Box::into_raw` in `make_callback`
        // and JSC guarantees `finalize` runs at most once.
        drop(unsafe { Box::from_raw(private) });
    }
}

/// Convert an inline (non-engine-backed) [`Value`] into a fresh `JSValueRef`
/// for a callback's return path. Engine-backed values already carry their
/// `JSValueRef` via `raw_engine_value`; only primitives need this.
unsafe fn inline_to_raw(ctx: JSContextRef, value: &Value, exception: *mut JSValueRef) -> JSValueRef {
    use crate::value::ValueData;
    match (&value.data, value.handle.tag) {
        (ValueData::Inline, TypeTag::Null) => unsafe { JSValueMakeNull(ctx) },
        (ValueData::Inline, TypeTag::Undefined) => unsafe { JSValueMakeUndefined(ctx) },
        (ValueData::Inline, TypeTag::Bool) => unsafe {
            JSValueMakeBoolean(ctx, value.handle.payload.integer != 0)
        },
        (ValueData::Inline, TypeTag::Integer) => unsafe {
            JSValueMakeNumber(ctx, value.handle.payload.integer as f64)
        },
        (ValueData::Inline, TypeTag::Double) => unsafe {
            JSValueMakeNumber(ctx, value.handle.payload.double)
        },
        (ValueData::InlineBytes(_), tag) if tag.is_exception() => {
            // A thrown value from a host callback is reported to the
            // caller through `exception`, not returned normally.
            unsafe {
                if !exception.is_null() {
                    let msg = std::ffi::CString::new("host callback failed").unwrap_or_default();
                    let js_str = JSStringCreateWithUTF8CString(msg.as_ptr());
                    *exception = JSValueMakeString(ctx, js_str);
                    JSStringRelease(js_str);
                }
                JSValueMakeUndefined(ctx)
            }
        }
        (ValueData::InlineBytes(bytes), _) => {
            let s = String::from_utf8_lossy(&bytes[..bytes.len().saturating_sub(1)]);
            let c = std::ffi::CString::new(s.into_owned()).unwrap_or_default();
            unsafe {
                let js_str = JSStringCreateWithUTF8CString(c.as_ptr());
                let v = JSValueMakeString(ctx, js_str);
                JSStringRelease(js_str);
                v
            }
        }
        _ => unsafe { JSValueMakeUndefined(ctx) },
    }
}
