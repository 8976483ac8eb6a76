//! The Value Factory: turns engine results into [`Value`]s in the Registry,
//! and the reverse direction for the Callback Maker.
//!
//! `from_any`'s type-inference order is fixed by the host contract; it must
//! run in the exact order listed below even though several branches are
//! mutually exclusive only by convention (e.g. a `Date` is also an
//! `Object`). Grounded on `hostjs-core::EngineValue`'s `is_*`/`to_*` probes,
//! extended here with raw `hostjs-sys` calls for the checks `EngineValue`
//! doesn't expose (function, symbol, date, typed-array kind) since those are
//! only needed at this inference boundary, not by every consumer of
//! `EngineValue`.

use hostjs_sys::*;
use std::ptr;

use crate::value::{TypeTag, Value, protect};

/// Runs on the owner thread: every raw FFI call below touches `ctx`, which
/// is only valid there.
pub struct Factory;

impl Factory {
    pub fn from_bool(v: bool) -> Value {
        Value::bool(v)
    }

    pub fn from_int(v: i64) -> Value {
        Value::integer(v)
    }

    pub fn from_double(v: f64) -> Value {
        Value::double(v)
    }

    pub fn from_string(s: &str) -> Value {
        Value::string(TypeTag::String, s)
    }

    pub fn from_exception(tag: TypeTag, summary: &str) -> Value {
        Value::exception(tag, summary)
    }

    /// Classify and wrap a raw engine value per the fixed inference order.
    ///
    /// # Safety
    /// `ctx`/`raw` must be valid and current on the calling (owner) thread.
    pub unsafe fn from_any(c: JSContextRef, raw: JSValueRef) -> Value {
        unsafe {
            if JSValueIsNull(c, raw) {
                return Value::null();
            }
            if JSValueIsUndefined(c, raw) {
                return Value::undefined();
            }
            if JSValueIsObject(c, raw) && JSObjectIsFunction(c, raw as JSObjectRef) {
                return Self::wrap_persistent(c, raw, TypeTag::Function);
            }
            if JSValueIsSymbol(c, raw) {
                return Self::wrap_persistent(c, raw, TypeTag::Symbol);
            }
            if Self::is_promise(c, raw) {
                return Self::wrap_persistent(c, raw, TypeTag::Promise);
            }
            if JSValueIsArray(c, raw) {
                return Self::wrap_persistent(c, raw, TypeTag::Array);
            }
            if JSValueIsNumber(c, raw) {
                let mut exception: JSValueRef = ptr::null_mut();
                let n = JSValueToNumber(c, raw, &mut exception);
                if !exception.is_null() {
                    return Value::double(f64::NAN);
                }
                // JSC's public API has no int32/BigInt distinction at the
                // JSValueRef level; whole numbers within i64 range are
                // reported as Integer, everything else as Double.
                if n.fract() == 0.0 && n.is_finite() && n.abs() <= (i64::MAX as f64) {
                    return Value::integer(n as i64);
                }
                return Value::double(n);
            }
            if JSValueIsBoolean(c, raw) {
                return Value::bool(JSValueToBoolean(c, raw));
            }
            if JSValueIsDate(c, raw) {
                let mut exception: JSValueRef = ptr::null_mut();
                let n = JSValueToNumber(c, raw, &mut exception);
                return Value::date(if exception.is_null() { n } else { f64::NAN });
            }
            if JSValueIsString(c, raw) {
                let mut exception: JSValueRef = ptr::null_mut();
                let js_str = JSValueToStringCopy(c, raw, &mut exception);
                if exception.is_null() && !js_str.is_null() {
                    let s = hostjs_core::js_string_to_rust(js_str);
                    JSStringRelease(js_str);
                    return Value::string(TypeTag::String, &s);
                }
                return Value::invalid();
            }
            if JSValueIsObject(c, raw) {
                let ty = JSValueGetTypedArrayType(c, raw, ptr::null_mut());
                if ty == K_JS_TYPED_ARRAY_TYPE_ARRAY_BUFFER {
                    return Self::wrap_array_buffer(c, raw);
                }
                if ty != K_JS_TYPED_ARRAY_TYPE_NONE {
                    return Self::wrap_typed_array(c, raw);
                }
                return Self::wrap_persistent(c, raw, TypeTag::Object);
            }
            Value::invalid()
        }
    }

    unsafe fn is_promise(ctx: JSContextRef, raw: JSValueRef) -> bool {
        if unsafe { !JSValueIsObject(ctx, raw) } {
            return false;
        }
        unsafe {
            let name = std::ffi::CString::new("Promise").unwrap();
            let js_name = JSStringCreateWithUTF8CString(name.as_ptr());
            let global = JSContextGetGlobalObject(ctx);
            let mut exception: JSValueRef = ptr::null_mut();
            let ctor = JSObjectGetProperty(ctx, global, js_name, &mut exception);
            JSStringRelease(js_name);
            if !exception.is_null() || ctor.is_null() || !JSValueIsObject(ctx, ctor) {
                return false;
            }
            let mut check: JSValueRef = ptr::null_mut();
            let is_instance =
                JSValueIsInstanceOfConstructor(ctx, raw, ctor as JSObjectRef, &mut check);
            check.is_null() && is_instance
        }
    }

    unsafe fn wrap_persistent(ctx: JSContextRef, raw: JSValueRef, tag: TypeTag) -> Value {
        let handle = unsafe { protect(ctx, raw) };
        Value::persistent(tag, handle)
    }

    unsafe fn wrap_array_buffer(ctx: JSContextRef, raw: JSValueRef) -> Value {
        let handle = unsafe { protect(ctx, raw) };
        let obj = raw as JSObjectRef;
        let mut exception: JSValueRef = ptr::null_mut();
        let ptr = unsafe { JSObjectGetArrayBufferBytesPtr(ctx, obj, &mut exception) };
        let len = if exception.is_null() {
            let mut ex2: JSValueRef = ptr::null_mut();
            unsafe { JSObjectGetArrayBufferByteLength(ctx, obj, &mut ex2) }
        } else {
            0
        };
        Value::array_buffer_like(TypeTag::ArrayBuffer, handle, ptr as *mut u8, len)
    }

    unsafe fn wrap_typed_array(ctx: JSContextRef, raw: JSValueRef) -> Value {
        let handle = unsafe { protect(ctx, raw) };
        let obj = raw as JSObjectRef;
        let mut exception: JSValueRef = ptr::null_mut();
        let ptr = unsafe { JSObjectGetTypedArrayBytesPtr(ctx, obj, &mut exception) };
        let len = if exception.is_null() {
            let mut ex2: JSValueRef = ptr::null_mut();
            unsafe { JSObjectGetTypedArrayByteLength(ctx, obj, &mut ex2) }
        } else {
            0
        };
        Value::array_buffer_like(TypeTag::ArrayBufferView, handle, ptr as *mut u8, len)
    }
}
