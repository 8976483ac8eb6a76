// Allow raw pointer dereference in public functions - this is an FFI wrapper
// where the caller is responsible for providing valid JSContextRef pointers.
#![allow(clippy::not_unsafe_ptr_arg_deref)]

//! Safe wrappers for JavaScriptCore.
//!
//! This crate provides memory-safe, RAII-based wrappers around
//! the raw JSC FFI bindings in `hostjs-sys`.
//!
//! # Example
//!
//! ```
//! use hostjs_core::EngineContext;
//!
//! let ctx = EngineContext::new().unwrap();
//! let result = ctx.eval("1 + 1").unwrap();
//! assert_eq!(result.to_number().unwrap(), 2.0);
//! ```
//!
//! # Thread Safety
//!
//! All types in this crate are `!Send` and `!Sync` because JavaScriptCore
//! contexts and values are not thread-safe. Attempting to use them from
//! multiple threads causes undefined behavior.
//!
//! For multi-threaded usage, use `hostjs-runtime`'s `Context`, which
//! provides a thread-safe API by marshaling operations onto a dedicated
//! owner thread.
//!
//! ## Example: Wrong (won't compile)
//!
//! ```compile_fail
//! use hostjs_core::EngineContext;
//! use std::thread;
//!
//! let ctx = EngineContext::new().unwrap();
//! thread::spawn(move || {
//!     ctx.eval("1 + 1"); // Error: EngineContext is !Send
//! });
//! ```
//!
//! ## Example: Correct
//!
//! ```ignore
//! use hostjs_runtime::Context;
//!
//! let ctx = Context::new(HostConfig::default())?;
//! let handle = ctx.eval(code_handle).await; // marshaled to the owner thread
//! ```

mod context;
mod error;
mod object;
pub mod string;
mod value;

pub use context::EngineContext;
pub use error::{EngineError, EngineResult};
pub use object::EngineObject;
pub use string::{EngineString, js_string_to_rust};
pub use value::{EngineValue, extract_exception};

// Re-export jsc-sys for direct FFI access when needed
pub use hostjs_sys;
