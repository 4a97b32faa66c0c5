//! Callback registration pairs.
//!
//! A host callback reaches native code as two raw pointers: an opaque
//! context and an `extern "C"` function that receives it back. Native
//! constructors disagree on which of the two comes first, so the pair is
//! kept in one canonical `(context, function)` order and flipped only at
//! the call site via [`ArgOrder`].

use std::ffi::c_void;

use serde::{Deserialize, Serialize};

use super::single_shot::SingleShotEntry;
use super::threaded::ThreadedEntry;

/// Parameter order a native constructor expects for a callback pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgOrder {
    #[default]
    ContextFirst,
    FunctionFirst,
}

/// A host callback as seen by native code.
#[derive(Debug, Clone, Copy)]
pub struct CallbackPair<F> {
    pub context: *mut c_void,
    pub function: F,
}

// Safety: the context always points at executor state that is itself
// `Send + Sync`, and `F` is a plain function pointer.
unsafe impl<F: Send> Send for CallbackPair<F> {}
unsafe impl<F: Sync> Sync for CallbackPair<F> {}

pub type SingleShotCallback = CallbackPair<SingleShotEntry>;
pub type ThreadedCallback = CallbackPair<ThreadedEntry>;

impl<F: Copy> CallbackPair<F> {
    pub fn new(context: *mut c_void, function: F) -> Self {
        Self { context, function }
    }

    /// The two pointers in the order a native constructor expects.
    pub fn ordered(&self, order: ArgOrder) -> [*mut c_void; 2] {
        assert_eq!(
            std::mem::size_of::<F>(),
            std::mem::size_of::<*mut c_void>(),
            "callback function must be a plain function pointer"
        );
        // Safety: size checked above; F is a function pointer type.
        let function: *mut c_void = unsafe { std::mem::transmute_copy(&self.function) };
        match order {
            ArgOrder::ContextFirst => [self.context, function],
            ArgOrder::FunctionFirst => [function, self.context],
        }
    }
}
