//! Core JavaScriptCore context wrapper: safe evaluation and object
//! manipulation, no event loop or task scheduling.
//!
//! This is the `!Send + !Sync` single-threaded layer; `hostjs-runtime` is
//! responsible for marshaling access onto one owner thread.

use hostjs_sys::*;
use std::ffi::CString;
use std::marker::PhantomData;
use std::ptr;

use crate::error::{EngineError, EngineResult};
use crate::value::{EngineValue, extract_exception};

/// A JavaScript execution context, plus the context group it was created in.
///
/// Every context belongs to a group; the group is what
/// `JSContextGroupSetExecutionTimeLimit` operates on, which is how the host
/// runtime terminates a runaway script from another thread.
///
/// # Thread Safety
///
/// `!Send + !Sync`: JavaScriptCore contexts are not safe to touch from
/// multiple threads. Cross-thread access is undefined behavior.
pub struct EngineContext {
    group: JSContextGroupRef,
    ctx: JSGlobalContextRef,
    _not_send: PhantomData<*mut ()>,
}

impl EngineContext {
    /// Create a new context in a freshly created group.
    pub fn new() -> EngineResult<Self> {
        // SAFETY: JSContextGroupCreate never returns null on success paths we observe.
        let group = unsafe { JSContextGroupCreate() };
        if group.is_null() {
            return Err(EngineError::ContextCreation {
                message: "JSContextGroupCreate returned null".to_string(),
            });
        }

        // SAFETY: group is valid per above check.
        let ctx = unsafe { JSGlobalContextCreateInGroup(group, ptr::null_mut()) };
        if ctx.is_null() {
            // SAFETY: group was retained by JSContextGroupCreate.
            unsafe { JSContextGroupRelease(group) };
            return Err(EngineError::ContextCreation {
                message: "JSGlobalContextCreateInGroup returned null".to_string(),
            });
        }

        Ok(Self {
            group,
            ctx,
            _not_send: PhantomData,
        })
    }

    pub fn raw(&self) -> JSContextRef {
        self.ctx as JSContextRef
    }

    pub fn raw_global(&self) -> JSGlobalContextRef {
        self.ctx
    }

    pub fn group(&self) -> JSContextGroupRef {
        self.group
    }

    pub fn global_object(&self) -> JSObjectRef {
        // SAFETY: self.ctx is valid for the lifetime of self.
        unsafe { JSContextGetGlobalObject(self.ctx as JSContextRef) }
    }

    pub fn eval(&self, script: &str) -> EngineResult<EngineValue> {
        self.eval_with_source(script, "<anonymous>")
    }

    pub fn eval_with_source(&self, script: &str, source_url: &str) -> EngineResult<EngineValue> {
        let script_cstr = CString::new(script)
            .map_err(|e| EngineError::Internal(format!("Invalid script: {}", e)))?;
        let source_cstr = CString::new(source_url)
            .map_err(|e| EngineError::Internal(format!("Invalid source URL: {}", e)))?;

        // SAFETY: CStrings are valid null-terminated, ctx is valid.
        unsafe {
            let script_ref = JSStringCreateWithUTF8CString(script_cstr.as_ptr());
            let source_ref = JSStringCreateWithUTF8CString(source_cstr.as_ptr());
            let mut exception: JSValueRef = ptr::null_mut();

            let result = JSEvaluateScript(
                self.ctx as JSContextRef,
                script_ref,
                ptr::null_mut(),
                source_ref,
                1,
                &mut exception,
            );

            JSStringRelease(script_ref);
            JSStringRelease(source_ref);

            if !exception.is_null() {
                return Err(extract_exception(self.ctx as JSContextRef, exception));
            }

            Ok(EngineValue::new(self.ctx as JSContextRef, result))
        }
    }

    /// Compile `script` without running it. Returns the syntax error if
    /// compilation fails; never produces a value.
    pub fn check_syntax(&self, script: &str, source_url: &str) -> EngineResult<()> {
        let script_cstr = CString::new(script)
            .map_err(|e| EngineError::Internal(format!("Invalid script: {}", e)))?;
        let source_cstr = CString::new(source_url)
            .map_err(|e| EngineError::Internal(format!("Invalid source URL: {}", e)))?;

        // SAFETY: CStrings are valid null-terminated, ctx is valid.
        unsafe {
            let script_ref = JSStringCreateWithUTF8CString(script_cstr.as_ptr());
            let source_ref = JSStringCreateWithUTF8CString(source_cstr.as_ptr());
            let mut exception: JSValueRef = ptr::null_mut();

            let ok = JSCheckScriptSyntax(
                self.ctx as JSContextRef,
                script_ref,
                source_ref,
                1,
                &mut exception,
            );

            JSStringRelease(script_ref);
            JSStringRelease(source_ref);

            if !ok {
                return Err(extract_exception(self.ctx as JSContextRef, exception));
            }

            Ok(())
        }
    }

    pub fn set_global(&self, name: &str, value: &EngineValue) -> EngineResult<()> {
        let name_cstr = CString::new(name)
            .map_err(|e| EngineError::Internal(format!("Invalid name: {}", e)))?;

        // SAFETY: CString is valid, ctx is valid.
        unsafe {
            let name_ref = JSStringCreateWithUTF8CString(name_cstr.as_ptr());
            let mut exception: JSValueRef = ptr::null_mut();

            JSObjectSetProperty(
                self.ctx as JSContextRef,
                self.global_object(),
                name_ref,
                value.raw(),
                K_JS_PROPERTY_ATTRIBUTE_NONE,
                &mut exception,
            );

            JSStringRelease(name_ref);

            if !exception.is_null() {
                return Err(extract_exception(self.ctx as JSContextRef, exception));
            }

            Ok(())
        }
    }

    pub fn get_global(&self, name: &str) -> EngineResult<EngineValue> {
        let name_cstr = CString::new(name)
            .map_err(|e| EngineError::Internal(format!("Invalid name: {}", e)))?;

        // SAFETY: CString is valid, ctx is valid.
        unsafe {
            let name_ref = JSStringCreateWithUTF8CString(name_cstr.as_ptr());
            let mut exception: JSValueRef = ptr::null_mut();

            let value = JSObjectGetProperty(
                self.ctx as JSContextRef,
                self.global_object(),
                name_ref,
                &mut exception,
            );

            JSStringRelease(name_ref);

            if !exception.is_null() {
                return Err(extract_exception(self.ctx as JSContextRef, exception));
            }

            Ok(EngineValue::new(self.ctx as JSContextRef, value))
        }
    }

    pub fn create_object(&self) -> EngineValue {
        // SAFETY: ctx is valid, null class creates a plain object.
        unsafe {
            let obj = JSObjectMake(self.ctx as JSContextRef, ptr::null_mut(), ptr::null_mut());
            EngineValue::new(self.ctx as JSContextRef, obj as JSValueRef)
        }
    }

    pub fn register_function(
        &self,
        name: &str,
        callback: JSObjectCallAsFunctionCallback,
    ) -> EngineResult<()> {
        let name_cstr = CString::new(name)
            .map_err(|e| EngineError::Internal(format!("Invalid name: {}", e)))?;

        // SAFETY: CString is valid, ctx is valid.
        unsafe {
            let name_ref = JSStringCreateWithUTF8CString(name_cstr.as_ptr());
            let func =
                JSObjectMakeFunctionWithCallback(self.ctx as JSContextRef, name_ref, callback);

            let mut exception: JSValueRef = ptr::null_mut();
            JSObjectSetProperty(
                self.ctx as JSContextRef,
                self.global_object(),
                name_ref,
                func as JSValueRef,
                K_JS_PROPERTY_ATTRIBUTE_NONE,
                &mut exception,
            );

            JSStringRelease(name_ref);

            if !exception.is_null() {
                return Err(extract_exception(self.ctx as JSContextRef, exception));
            }

            Ok(())
        }
    }

    /// Force a synchronous garbage collection. Used by the memory monitor's
    /// low-memory notification and by tests.
    pub fn gc(&self) {
        // SAFETY: ctx is valid.
        unsafe { JSGarbageCollect(self.ctx as JSContextRef) };
    }

    pub fn inject_json(&self, name: &str, json: &str) -> EngineResult<()> {
        let value = EngineValue::from_json(self.ctx as JSContextRef, json)?;
        self.set_global(name, &value)
    }

    pub fn string(&self, s: &str) -> EngineResult<EngineValue> {
        EngineValue::string(self.ctx as JSContextRef, s)
    }

    pub fn number(&self, n: f64) -> EngineValue {
        EngineValue::number(self.ctx as JSContextRef, n)
    }

    pub fn boolean(&self, b: bool) -> EngineValue {
        EngineValue::boolean(self.ctx as JSContextRef, b)
    }

    pub fn undefined(&self) -> EngineValue {
        EngineValue::undefined(self.ctx as JSContextRef)
    }

    pub fn null(&self) -> EngineValue {
        EngineValue::null(self.ctx as JSContextRef)
    }
}

impl Drop for EngineContext {
    fn drop(&mut self) {
        // SAFETY: ctx and group were created together in new() and are
        // released in the reverse order: context first, then its group.
        unsafe {
            JSGlobalContextRelease(self.ctx);
            JSContextGroupRelease(self.group);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_context() {
        let ctx = EngineContext::new().unwrap();
        drop(ctx);
    }

    #[test]
    fn eval_number() {
        let ctx = EngineContext::new().unwrap();
        let result = ctx.eval("1 + 1").unwrap();
        assert_eq!(result.to_number().unwrap(), 2.0);
    }

    #[test]
    fn eval_string() {
        let ctx = EngineContext::new().unwrap();
        let result = ctx.eval("'hello'").unwrap();
        assert_eq!(result.to_string().unwrap(), "hello");
    }

    #[test]
    fn eval_error() {
        let ctx = EngineContext::new().unwrap();
        let result = ctx.eval("throw new Error('oops')");
        assert!(result.is_err());
    }

    #[test]
    fn check_syntax_rejects_bad_script() {
        let ctx = EngineContext::new().unwrap();
        assert!(ctx.check_syntax("1 +", "<anonymous>").is_err());
        assert!(ctx.check_syntax("1 + 1", "<anonymous>").is_ok());
    }

    #[test]
    fn set_get_global() {
        let ctx = EngineContext::new().unwrap();
        let value = ctx.number(42.0);
        ctx.set_global("myVar", &value).unwrap();

        let result = ctx.eval("myVar * 2").unwrap();
        assert_eq!(result.to_number().unwrap(), 84.0);
    }

    #[test]
    fn inject_json() {
        let ctx = EngineContext::new().unwrap();
        ctx.inject_json("config", r#"{"name": "test", "value": 123}"#)
            .unwrap();

        let name = ctx.eval("config.name").unwrap();
        assert_eq!(name.to_string().unwrap(), "test");

        let value = ctx.eval("config.value").unwrap();
        assert_eq!(value.to_number().unwrap(), 123.0);
    }
}
