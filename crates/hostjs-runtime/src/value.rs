//! The wire-level value model: [`TypeTag`], [`ValueHandle`], and the
//! server-side [`Value`] record the Registry owns.
//!
//! Grounded on `hostjs-core`'s `EngineValue`/`EngineObject` for the
//! engine-backed variants; the inline/persistent split below is new, driven
//! by the requirement that handle identity be a stable address reachable
//! from any thread while the engine payload behind it is only ever touched
//! on the owner thread.

use hostjs_sys::{JSContextRef, JSValueRef, JSValueProtect};
use std::ptr;

/// Closed set of value kinds, including the error tags. `#[repr(u8)]` so the
/// discriminant matches the wire layout in §6.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    Null = 0,
    Undefined = 1,
    Bool = 2,
    Integer = 3,
    Double = 4,
    String = 5,
    Date = 6,
    Symbol = 7,
    Array = 8,
    Object = 9,
    Function = 10,
    Promise = 11,
    ArrayBuffer = 12,
    SharedArrayBuffer = 13,
    ArrayBufferView = 14,
    Invalid = 15,
    ParseException = 16,
    ExecuteException = 17,
    OomException = 18,
    TimeoutException = 19,
    TerminatedException = 20,
    ValueException = 21,
    KeyException = 22,
}

impl TypeTag {
    pub fn is_exception(self) -> bool {
        matches!(
            self,
            TypeTag::ParseException
                | TypeTag::ExecuteException
                | TypeTag::OomException
                | TypeTag::TimeoutException
                | TypeTag::TerminatedException
                | TypeTag::ValueException
                | TypeTag::KeyException
        )
    }

    /// Decode a wire-level tag byte (§6). Out-of-range bytes decode to
    /// `Invalid` rather than panicking, since this is the one place a
    /// malformed value from across the FFI boundary is first interpreted.
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => TypeTag::Null,
            1 => TypeTag::Undefined,
            2 => TypeTag::Bool,
            3 => TypeTag::Integer,
            4 => TypeTag::Double,
            5 => TypeTag::String,
            6 => TypeTag::Date,
            7 => TypeTag::Symbol,
            8 => TypeTag::Array,
            9 => TypeTag::Object,
            10 => TypeTag::Function,
            11 => TypeTag::Promise,
            12 => TypeTag::ArrayBuffer,
            13 => TypeTag::SharedArrayBuffer,
            14 => TypeTag::ArrayBufferView,
            16 => TypeTag::ParseException,
            17 => TypeTag::ExecuteException,
            18 => TypeTag::OomException,
            19 => TypeTag::TimeoutException,
            20 => TypeTag::TerminatedException,
            21 => TypeTag::ValueException,
            22 => TypeTag::KeyException,
            _ => TypeTag::Invalid,
        }
    }
}

/// Wire-level identity handed to the client: an 8-byte payload union, an
/// 8-byte length, and a 1-byte tag (§6 "ValueHandle wire layout").
#[repr(C)]
pub union HandlePayload {
    pub integer: i64,
    pub double: f64,
    pub bytes_ptr: *const u8,
}

#[repr(C)]
pub struct ValueHandle {
    pub payload: HandlePayload,
    pub length: u64,
    pub tag: TypeTag,
}

impl ValueHandle {
    fn inline_integer(tag: TypeTag, v: i64) -> Self {
        Self {
            payload: HandlePayload { integer: v },
            length: 0,
            tag,
        }
    }

    fn inline_double(tag: TypeTag, v: f64) -> Self {
        Self {
            payload: HandlePayload { double: v },
            length: 0,
            tag,
        }
    }

    fn bytes(tag: TypeTag, ptr: *const u8, len: u64) -> Self {
        Self {
            payload: HandlePayload { bytes_ptr: ptr },
            length: len,
            tag,
        }
    }
}

/// A protected, engine-owned value. Holding one keeps the underlying
/// JSValueRef alive (via `JSValueProtect`) until [`PersistentHandle::release`]
/// is called.
///
/// # Thread Safety
///
/// The raw pointers here are never dereferenced except by JavaScriptCore
/// calls made from the Isolate Manager's owner thread (see `isolate.rs` and
/// the `ops` modules, which are the only code that calls into `hostjs-sys`
/// with a `PersistentHandle`'s fields). Moving or dropping the handle from
/// any other thread is safe; only `release` carries the owner-thread
/// requirement, documented on the method itself.
#[derive(Clone, Copy)]
pub struct PersistentHandle {
    pub ctx: JSContextRef,
    pub value: JSValueRef,
}

unsafe impl Send for PersistentHandle {}
unsafe impl Sync for PersistentHandle {}

impl PersistentHandle {
    /// # Safety
    /// Must run on the Isolate Manager's owner thread for the context that
    /// produced `self`. Must be called at most once per handle.
    pub unsafe fn release(self) {
        unsafe { hostjs_sys::JSValueUnprotect(self.ctx, self.value) };
    }
}

/// Extra, type-tag-dependent payload a [`Value`] carries beyond its handle.
pub enum ValueData {
    /// Primitives whose full value already lives inline in the handle:
    /// null, undefined, bool, integer, double, date.
    Inline,
    /// Owns the UTF-8 bytes the handle's payload points at. Used for
    /// strings and for the UTF-8 exception-summary text on error tags.
    InlineBytes(Box<[u8]>),
    /// An engine-backed object/array/function/promise/symbol, kept alive by
    /// a persistent handle. Released through the Object Collector.
    Persistent(PersistentHandle),
    /// An array-buffer-like value: the persistent handle keeps the backing
    /// store alive; `bytes`/`len` alias it directly (§3, §8 property 10).
    ArrayBufferLike {
        persistent: PersistentHandle,
        bytes: *mut u8,
        len: usize,
    },
}

/// The server-side record. Owned solely by the Registry; the client only
/// ever sees the address of `handle`.
pub struct Value {
    pub handle: ValueHandle,
    pub data: ValueData,
}

impl Value {
    /// Address identity per §3: "the address of the embedded ValueHandle".
    /// Only meaningful once `self` is pinned behind a `Box` (see
    /// `Registry::remember`), since that address must be stable.
    pub fn handle_addr(&self) -> usize {
        ptr::addr_of!(self.handle) as usize
    }

    pub fn null() -> Self {
        Self {
            handle: ValueHandle::inline_integer(TypeTag::Null, 0),
            data: ValueData::Inline,
        }
    }

    pub fn undefined() -> Self {
        Self {
            handle: ValueHandle::inline_integer(TypeTag::Undefined, 0),
            data: ValueData::Inline,
        }
    }

    pub fn bool(v: bool) -> Self {
        Self {
            handle: ValueHandle::inline_integer(TypeTag::Bool, v as i64),
            data: ValueData::Inline,
        }
    }

    pub fn integer(v: i64) -> Self {
        Self {
            handle: ValueHandle::inline_integer(TypeTag::Integer, v),
            data: ValueData::Inline,
        }
    }

    pub fn double(v: f64) -> Self {
        Self {
            handle: ValueHandle::inline_double(TypeTag::Double, v),
            data: ValueData::Inline,
        }
    }

    pub fn date(epoch_millis: f64) -> Self {
        Self {
            handle: ValueHandle::inline_double(TypeTag::Date, epoch_millis),
            data: ValueData::Inline,
        }
    }

    /// Build a string Value. The buffer is NUL-terminated at `len` to
    /// satisfy §8 property 9; `length` on the handle is the UTF-8 byte
    /// length, not counting that terminator.
    pub fn string(tag: TypeTag, s: &str) -> Self {
        let mut owned = Vec::with_capacity(s.len() + 1);
        owned.extend_from_slice(s.as_bytes());
        owned.push(0);
        let owned = owned.into_boxed_slice();
        let ptr = owned.as_ptr();
        let len = s.len() as u64;
        Self {
            handle: ValueHandle::bytes(tag, ptr, len),
            data: ValueData::InlineBytes(owned),
        }
    }

    /// Build an error-tagged Value carrying a UTF-8 summary string, per §7.
    pub fn exception(tag: TypeTag, summary: &str) -> Self {
        debug_assert!(tag.is_exception());
        Self::string(tag, summary)
    }

    pub fn invalid() -> Self {
        Self {
            handle: ValueHandle::inline_integer(TypeTag::Invalid, 0),
            data: ValueData::Inline,
        }
    }

    /// Wrap an already-protected engine value.
    pub fn persistent(tag: TypeTag, handle: PersistentHandle) -> Self {
        Self {
            handle: ValueHandle::bytes(tag, ptr::null(), 0),
            data: ValueData::Persistent(handle),
        }
    }

    /// Wrap a protected ArrayBuffer/TypedArray, aliasing its backing store.
    pub fn array_buffer_like(
        tag: TypeTag,
        persistent: PersistentHandle,
        bytes: *mut u8,
        len: usize,
    ) -> Self {
        Self {
            handle: ValueHandle::bytes(tag, bytes as *const u8, len as u64),
            data: ValueData::ArrayBufferLike {
                persistent,
                bytes,
                len,
            },
        }
    }

    /// The persistent engine handle backing this Value, if any. Present for
    /// every engine-backed type tag.
    pub fn persistent_handle(&self) -> Option<PersistentHandle> {
        match self.data {
            ValueData::Persistent(h) => Some(h),
            ValueData::ArrayBufferLike { persistent, .. } => Some(persistent),
            _ => None,
        }
    }

    /// Reconstruct the JSC value reference for operations that need to pass
    /// this Value back into an engine call. Only `None` for values that were
    /// never engine-backed (inline primitives/strings), which callers must
    /// first promote via the Factory if an engine-side value is required.
    pub fn raw_engine_value(&self) -> Option<JSValueRef> {
        self.persistent_handle().map(|h| h.value)
    }

    /// Borrow this Value's content as a UTF-8 string, if it is a
    /// non-exception `String`-tagged inline value. Used to pull a
    /// client-allocated string Value's bytes back out for operations (like
    /// `eval`) that need plain `&str`, not another Value.
    pub fn as_str(&self) -> Option<&str> {
        match (&self.data, self.handle.tag) {
            (ValueData::InlineBytes(bytes), TypeTag::String) => {
                std::str::from_utf8(&bytes[..bytes.len().saturating_sub(1)]).ok()
            }
            _ => None,
        }
    }
}

// SAFETY: a Value's raw pointers (inline string buffer, persistent engine
// handle) are either owned Rust memory or a PersistentHandle, both of which
// are Send/Sync per their own justifications above. The Registry shares
// `Box<Value>` across threads for lookup/forget; no thread other than the
// Isolate Manager's owner thread ever dereferences the engine-side pointers.
unsafe impl Send for Value {}
unsafe impl Sync for Value {}

/// Protect a raw JSValueRef and wrap it as a [`PersistentHandle`].
///
/// # Safety
/// `ctx` and `value` must be valid and current on the calling thread.
pub unsafe fn protect(ctx: JSContextRef, value: JSValueRef) -> PersistentHandle {
    unsafe { JSValueProtect(ctx, value) };
    PersistentHandle { ctx, value }
}
