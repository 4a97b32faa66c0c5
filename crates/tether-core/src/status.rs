//! Decoding of native tagged results.
//!
//! Fallible native calls return a handle to a tagged result: a status code,
//! an `ok` flag, an optional value, and its own `delete`. Unwrapping turns
//! it into a [`Result`], re-owning the inner value and always releasing the
//! tagged wrapper, even when extraction fails or panics.

use std::ffi::{CStr, c_char};
use std::fmt;

use crate::error::{Error, Result};
use crate::handle::{HandleRegistry, NativeHandle, OwnedHandle, ReleaseFn};

/// Status code reported by the native engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    InvalidArgument,
    NotFound,
    Cancelled,
    EndOfStream,
    Internal,
    /// A code this bridge does not know; kept verbatim.
    Unknown(i32),
}

impl From<i32> for StatusCode {
    fn from(code: i32) -> Self {
        match code {
            0 => Self::Ok,
            1 => Self::InvalidArgument,
            2 => Self::NotFound,
            3 => Self::Cancelled,
            4 => Self::EndOfStream,
            5 => Self::Internal,
            other => Self::Unknown(other),
        }
    }
}

impl StatusCode {
    pub fn as_i32(&self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::InvalidArgument => 1,
            Self::NotFound => 2,
            Self::Cancelled => 3,
            Self::EndOfStream => 4,
            Self::Internal => 5,
            Self::Unknown(code) => *code,
        }
    }

    /// Convert a failure status into the matching bridge error.
    pub fn into_error(self, reason: String) -> Error {
        match self {
            Self::Cancelled => Error::Cancelled,
            Self::EndOfStream => Error::EndOfStream,
            code => Error::Foreign { code, reason },
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::NotFound => write!(f, "not found"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::EndOfStream => write!(f, "end of stream"),
            Self::Internal => write!(f, "internal"),
            Self::Unknown(code) => write!(f, "status {}", code),
        }
    }
}

pub type StatusCodeFn = unsafe extern "C" fn(NativeHandle) -> i32;
pub type StatusOkFn = unsafe extern "C" fn(NativeHandle) -> bool;
pub type StatusValueFn = unsafe extern "C" fn(NativeHandle) -> NativeHandle;
pub type StatusMessageFn = unsafe extern "C" fn(NativeHandle) -> *const c_char;

/// Accessors for one tagged-result type (`<engine>_<Type>Result_*`).
#[derive(Debug, Clone, Copy)]
pub struct StatusFns {
    pub status: StatusCodeFn,
    pub ok: StatusOkFn,
    /// Transfers ownership of the inner value to the caller.
    pub value: StatusValueFn,
    pub delete: ReleaseFn,
    /// Human-readable failure reason, owned by the tagged result.
    pub message: Option<StatusMessageFn>,
}

/// Unwrap a tagged result, handing the inner value to `extract` on success.
///
/// The tagged wrapper is released exactly once on every path. If `extract`
/// does not take ownership of the value it receives, the value leaks; use
/// [`unwrap_handle`] when the value should simply be owned.
pub fn unwrap_with<T>(
    tagged: NativeHandle,
    fns: &StatusFns,
    extract: impl FnOnce(NativeHandle) -> Result<T>,
) -> Result<T> {
    if tagged.is_null() {
        return Err(Error::InvalidHandle(
            "native call returned a null tagged result".to_string(),
        ));
    }

    // Owning the wrapper first means unwinding out of `extract` still releases it.
    let guard = OwnedHandle::new(tagged, fns.delete);
    let raw = guard.raw();

    let ok = unsafe { (fns.ok)(raw) };
    if ok {
        let value = unsafe { (fns.value)(raw) };
        extract(value)
    } else {
        Err(failure(raw, fns))
    }
}

/// Unwrap a tagged result whose value is itself a handle.
///
/// On success the value is registered with `registry`; a successful result
/// without a value yields an invalid wrapper.
pub fn unwrap_handle(
    tagged: NativeHandle,
    fns: &StatusFns,
    registry: &HandleRegistry,
    value_release: ReleaseFn,
) -> Result<OwnedHandle> {
    unwrap_with(tagged, fns, |value| Ok(registry.register(value, value_release)))
}

fn failure(raw: NativeHandle, fns: &StatusFns) -> Error {
    let code = StatusCode::from(unsafe { (fns.status)(raw) });
    let reason = fns
        .message
        .map(|message| unsafe { (message)(raw) })
        .filter(|ptr| !ptr.is_null())
        // Safety: the message is a NUL-terminated string owned by the tagged
        // result, which stays alive until `guard` drops in the caller.
        .map(|ptr| unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("native status {}", code.as_i32()));

    tracing::debug!("tagged result failed with {}: {}", code, reason);
    code.into_error(reason)
}
