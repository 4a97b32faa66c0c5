//! Native-side access to a threaded executor's correlation store.
//!
//! When the engine drives an invocation itself it needs more than the
//! callback: it must deposit the input under its chosen id and read the
//! outcome back by the same id. A [`NativeChannel`] bundles the callback
//! with those entries. Values cross as NUL-terminated text; text returned
//! by `take_output`/`take_error` is host-allocated and must be handed back
//! through `release_text`.
//!
//! ```text
//! engine                                   host
//!   set_input(ctx, 7, "1,2") ───────────►  store.set_input(7, ..)
//!   run(ctx, 7) ────────────────────────►  user logic, store.set_output(7, ..)
//!   take_output(ctx, 7) ◄───────────────   "{\"x\":1,\"y\":2}" | null
//!   take_error(ctx, 7)  ◄───────────────   reason | null
//!   release_text(ptr) ──────────────────►  freed
//! ```

use std::ffi::{CString, c_char, c_void};

use serde_json::Value;

use super::callback::ThreadedCallback;
use super::threaded::ThreadedEntry;

/// Deposit the input for an id. Returns `false` if it was rejected.
pub type SetInputEntry =
    unsafe extern "C" fn(context: *mut c_void, execution_id: u64, input: *const c_char) -> bool;

/// Read back the output (or failure reason) for an id; null when absent.
pub type TakeTextEntry = unsafe extern "C" fn(context: *mut c_void, execution_id: u64) -> *mut c_char;

/// Free text returned by a take entry.
pub type ReleaseTextEntry = unsafe extern "C" fn(text: *mut c_char);

/// Everything the engine needs to drive a threaded executor by id.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct NativeChannel {
    pub context: *mut c_void,
    pub run: ThreadedEntry,
    pub set_input: SetInputEntry,
    pub take_output: TakeTextEntry,
    pub take_error: TakeTextEntry,
    pub release_text: ReleaseTextEntry,
}

// Safety: see `CallbackPair`; the context points at `Send + Sync` state.
unsafe impl Send for NativeChannel {}
unsafe impl Sync for NativeChannel {}

impl NativeChannel {
    /// The bare (context, function) pair, for engines that only run it.
    pub fn callback(&self) -> ThreadedCallback {
        ThreadedCallback::new(self.context, self.run)
    }
}

/// Text encoding of a slot value on the native side of a channel.
pub trait WireValue: Sized {
    fn from_wire(text: &str) -> Result<Self, String>;

    fn to_wire(&self) -> Result<String, String>;
}

impl WireValue for String {
    fn from_wire(text: &str) -> Result<Self, String> {
        Ok(text.to_string())
    }

    fn to_wire(&self) -> Result<String, String> {
        Ok(self.clone())
    }
}

impl WireValue for Value {
    fn from_wire(text: &str) -> Result<Self, String> {
        serde_json::from_str(text).map_err(|e| format!("input is not JSON: {}", e))
    }

    fn to_wire(&self) -> Result<String, String> {
        serde_json::to_string(self).map_err(|e| e.to_string())
    }
}

impl WireValue for bool {
    fn from_wire(text: &str) -> Result<Self, String> {
        match text.trim() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(format!("expected true or false, got '{}'", other)),
        }
    }

    fn to_wire(&self) -> Result<String, String> {
        Ok(self.to_string())
    }
}

/// Hand `text` to the engine. Interior NULs are replaced.
pub(super) fn into_native_text(text: String) -> *mut c_char {
    CString::new(text.replace('\0', " "))
        .map(CString::into_raw)
        .unwrap_or(std::ptr::null_mut())
}

pub(super) unsafe extern "C" fn release_text(text: *mut c_char) {
    if !text.is_null() {
        // Safety: every non-null pointer handed out came from `into_native_text`.
        drop(unsafe { CString::from_raw(text) });
    }
}
