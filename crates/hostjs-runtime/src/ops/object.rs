//! The Object Manipulator operation module (§4.6): property and element
//! access, function calls, and own-property enumeration over engine-backed
//! [`Value`]s.
//!
//! Grounded on `hostjs-core::EngineObject`, generalized from its `!Send`
//! single-context API to operate directly on the raw `JSObjectRef` a
//! [`Value`]'s persistent handle carries, since here the object and its
//! context both come from the Registry rather than from one owning struct.

use hostjs_sys::*;
use std::ffi::CString;
use std::ptr;

use crate::factory::Factory;
use crate::value::{TypeTag, Value};

fn js_string(s: &str) -> JSStringRef {
    let c = CString::new(s).unwrap_or_default();
    // SAFETY: c is a valid, NUL-terminated string for the call's duration.
    unsafe { JSStringCreateWithUTF8CString(c.as_ptr()) }
}

/// # Safety
/// `ctx`/`object` must be valid and current on the owner thread.
pub unsafe fn get(ctx: JSContextRef, object: JSObjectRef, key: &str) -> Value {
    if unsafe { !has(ctx, object, key) } {
        return Value::exception(TypeTag::KeyException, "No such key");
    }
    let name = js_string(key);
    let mut exception: JSValueRef = ptr::null_mut();
    let result = unsafe { JSObjectGetProperty(ctx, object, name, &mut exception) };
    unsafe { JSStringRelease(name) };
    if !exception.is_null() {
        return Value::exception(TypeTag::KeyException, &format!("get '{key}' failed"));
    }
    unsafe { Factory::from_any(ctx, result) }
}

/// # Safety
/// `ctx`/`object`/`value` must be valid and current on the owner thread.
pub unsafe fn set(ctx: JSContextRef, object: JSObjectRef, key: &str, value: JSValueRef) -> bool {
    let name = js_string(key);
    let mut exception: JSValueRef = ptr::null_mut();
    unsafe {
        JSObjectSetProperty(
            ctx,
            object,
            name,
            value,
            K_JS_PROPERTY_ATTRIBUTE_NONE,
            &mut exception,
        )
    };
    unsafe { JSStringRelease(name) };
    exception.is_null()
}

/// # Safety
/// `ctx`/`object` must be valid and current on the owner thread.
pub unsafe fn has(ctx: JSContextRef, object: JSObjectRef, key: &str) -> bool {
    let name = js_string(key);
    let result = unsafe { JSObjectHasProperty(ctx, object, name) };
    unsafe { JSStringRelease(name) };
    result
}

/// `del(o, k)` (§4.6): a missing key is itself a `key_exception`, distinct
/// from a present key that the engine refuses to delete (reported as a
/// plain `false`).
///
/// # Safety
/// `ctx`/`object` must be valid and current on the owner thread.
pub unsafe fn delete(ctx: JSContextRef, object: JSObjectRef, key: &str) -> Value {
    if unsafe { !has(ctx, object, key) } {
        return Value::exception(TypeTag::KeyException, "No such key");
    }
    let name = js_string(key);
    let mut exception: JSValueRef = ptr::null_mut();
    let result = unsafe { JSObjectDeleteProperty(ctx, object, name, &mut exception) };
    unsafe { JSStringRelease(name) };
    if !exception.is_null() {
        return Value::exception(TypeTag::ExecuteException, &format!("delete '{key}' failed"));
    }
    Value::bool(result)
}

/// # Safety
/// `ctx`/`object` must be valid and current on the owner thread.
pub unsafe fn get_index(ctx: JSContextRef, object: JSObjectRef, index: u32) -> Value {
    let mut exception: JSValueRef = ptr::null_mut();
    let result = unsafe { JSObjectGetPropertyAtIndex(ctx, object, index, &mut exception) };
    if !exception.is_null() {
        return Value::exception(
            TypeTag::KeyException,
            &format!("index {index} out of range"),
        );
    }
    unsafe { Factory::from_any(ctx, result) }
}

/// # Safety
/// `ctx`/`object`/`value` must be valid and current on the owner thread.
pub unsafe fn set_index(ctx: JSContextRef, object: JSObjectRef, index: u32, value: JSValueRef) -> bool {
    let mut exception: JSValueRef = ptr::null_mut();
    unsafe { JSObjectSetPropertyAtIndex(ctx, object, index, value, &mut exception) };
    exception.is_null()
}

/// Call `function` with `this`/`args`, returning a tagged Value either way
/// (thrown exceptions become `execute_exception`, matching the rest of the
/// Operation Modules' "never an out-of-band Err" contract).
///
/// # Safety
/// `ctx`/`function`/`this` and every entry of `args` must be valid and
/// current on the owner thread.
pub unsafe fn call(
    ctx: JSContextRef,
    function: JSObjectRef,
    this: JSObjectRef,
    args: &[JSValueRef],
) -> Value {
    let mut exception: JSValueRef = ptr::null_mut();
    let result = unsafe {
        JSObjectCallAsFunction(ctx, function, this, args.len(), args.as_ptr(), &mut exception)
    };
    if !exception.is_null() {
        return Value::exception(TypeTag::ExecuteException, "function call threw");
    }
    unsafe { Factory::from_any(ctx, result) }
}

/// The own, enumerable property names of `object`, in engine-reported
/// order.
///
/// # Safety
/// `ctx`/`object` must be valid and current on the owner thread.
pub unsafe fn own_property_names(ctx: JSContextRef, object: JSObjectRef) -> Vec<String> {
    let array = unsafe { JSObjectCopyPropertyNames(ctx, object) };
    let count = unsafe { JSPropertyNameArrayGetCount(array) };
    let mut names = Vec::with_capacity(count);
    for i in 0..count {
        let name = unsafe { JSPropertyNameArrayGetNameAtIndex(array, i) };
        names.push(hostjs_core::js_string_to_rust(name));
    }
    unsafe { JSPropertyNameArrayRelease(array) };
    names
}

/// `identity_hash(o)` (§4.6): JavaScriptCore's public C API has no
/// identity-hash entry point (that's a V8-ism). Resolved by using the
/// object pointer's own address, which is exactly the same "address is
/// identity" principle this crate already applies to `Value::handle_addr`
/// — stable for the object's lifetime, distinct per live object.
///
/// # Safety
/// `object` must be a valid `JSObjectRef`.
pub unsafe fn identity_hash(object: JSObjectRef) -> i64 {
    object as usize as i64
}

/// `splice(o, start, delete_count, new_val?)` (§4.6): look up `o.splice`
/// and call it with `[start, delete_count]` plus `new_val` if supplied.
///
/// # Safety
/// `ctx`/`object` must be valid and current on the owner thread; `new_val`,
/// if present, must also be.
pub unsafe fn splice(
    ctx: JSContextRef,
    object: JSObjectRef,
    start: i64,
    delete_count: i64,
    new_val: Option<JSValueRef>,
) -> Value {
    call_named_method(ctx, object, "splice", |ctx| {
        let mut args = vec![
            unsafe { JSValueMakeNumber(ctx, start as f64) },
            unsafe { JSValueMakeNumber(ctx, delete_count as f64) },
        ];
        if let Some(v) = new_val {
            args.push(v);
        }
        args
    })
}

/// `push(o, v)` (§4.6): look up `o.push` and call it with `[v]`.
///
/// # Safety
/// `ctx`/`object`/`value` must be valid and current on the owner thread.
pub unsafe fn push(ctx: JSContextRef, object: JSObjectRef, value: JSValueRef) -> Value {
    call_named_method(ctx, object, "push", |_ctx| vec![value])
}

/// Shared plumbing for `splice`/`push`: look up a method by name, requiring
/// it to be callable, then invoke it with the caller-built argument list.
/// Absent or non-callable methods, and thrown exceptions, both surface as
/// `execute_exception` per §4.6's "all calls that invoke user JS" rule.
unsafe fn call_named_method(
    ctx: JSContextRef,
    object: JSObjectRef,
    method: &str,
    build_args: impl FnOnce(JSContextRef) -> Vec<JSValueRef>,
) -> Value {
    let name = js_string(method);
    let mut exception: JSValueRef = ptr::null_mut();
    let func = unsafe { JSObjectGetProperty(ctx, object, name, &mut exception) };
    unsafe { JSStringRelease(name) };
    if !exception.is_null() || unsafe { !JSValueIsObject(ctx, func) } {
        return Value::exception(
            TypeTag::ExecuteException,
            &format!("'{method}' is not callable"),
        );
    }
    let func_obj = func as JSObjectRef;
    if unsafe { !JSObjectIsFunction(ctx, func_obj) } {
        return Value::exception(
            TypeTag::ExecuteException,
            &format!("'{method}' is not callable"),
        );
    }
    let args = build_args(ctx);
    let mut call_exception: JSValueRef = ptr::null_mut();
    let result = unsafe {
        JSObjectCallAsFunction(
            ctx,
            func_obj,
            object,
            args.len(),
            args.as_ptr(),
            &mut call_exception,
        )
    };
    if !call_exception.is_null() {
        return Value::exception(TypeTag::ExecuteException, &format!("'{method}' threw"));
    }
    unsafe { Factory::from_any(ctx, result) }
}

/// `own_property_names(o)` (§4.6): as [`own_property_names`], but wrapped
/// as an engine-backed array Value, matching the Object Manipulator's
/// "returns an array Value" contract at the client boundary.
///
/// # Safety
/// `ctx`/`object` must be valid and current on the owner thread.
pub unsafe fn own_property_names_array(ctx: JSContextRef, object: JSObjectRef) -> Value {
    let names = unsafe { own_property_names(ctx, object) };
    let elements: Vec<JSValueRef> = names
        .iter()
        .map(|n| {
            let s = js_string(n);
            let v = unsafe { JSValueMakeString(ctx, s) };
            unsafe { JSStringRelease(s) };
            v
        })
        .collect();
    let mut exception: JSValueRef = ptr::null_mut();
    let array = unsafe { JSObjectMakeArray(ctx, elements.len(), elements.as_ptr(), &mut exception) };
    if !exception.is_null() {
        return Value::exception(TypeTag::ExecuteException, "failed to build property list");
    }
    unsafe { Factory::from_any(ctx, array as JSValueRef) }
}

/// `object.length`, for arrays and array-likes. Returns `0` if the
/// property is absent or not a number.
///
/// # Safety
/// `ctx`/`object` must be valid and current on the owner thread.
pub unsafe fn length(ctx: JSContextRef, object: JSObjectRef) -> u64 {
    let name = js_string("length");
    let mut exception: JSValueRef = ptr::null_mut();
    let value = unsafe { JSObjectGetProperty(ctx, object, name, &mut exception) };
    unsafe { JSStringRelease(name) };
    if !exception.is_null() {
        return 0;
    }
    let mut ex2: JSValueRef = ptr::null_mut();
    let n = unsafe { JSValueToNumber(ctx, value, &mut ex2) };
    if ex2.is_null() && n.is_finite() && n >= 0.0 {
        n as u64
    } else {
        0
    }
}
