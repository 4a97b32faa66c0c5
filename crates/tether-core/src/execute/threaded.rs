//! Threaded executor: callbacks addressed by execution id.

use std::ffi::{CStr, c_char, c_void};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::correlation::{CorrelationStore, ExecutionId, SlotOutput};
use crate::error::Result;

use super::callback::ThreadedCallback;
use super::channel::{self, NativeChannel, WireValue};
use super::dispatch::Dispatcher;

/// Native-callable entry: the only argument besides the context is the id.
pub type ThreadedEntry = unsafe extern "C" fn(context: *mut c_void, execution_id: u64);

type ThreadedFn<I, O> = dyn Fn(ExecutionId, &[I]) -> SlotOutput<O> + Send + Sync;

struct ThreadedState<I, O> {
    name: String,
    store: Arc<CorrelationStore<I, O>>,
    func: Box<ThreadedFn<I, O>>,
    invocations: AtomicUsize,
}

impl<I: Clone, O> ThreadedState<I, O> {
    /// One callback invocation. Touches only the slot for `id`.
    fn handle(&self, id: ExecutionId) {
        self.invocations.fetch_add(1, Ordering::Relaxed);

        let inputs = match self.store.inputs(id) {
            Ok(inputs) => inputs,
            Err(e) => {
                tracing::error!("threaded executor '{}' has nothing to read: {}", self.name, e);
                return;
            }
        };

        let output = catch_unwind(AssertUnwindSafe(|| (self.func)(id, &inputs)))
            .unwrap_or_else(|_| Err(format!("threaded executor '{}' panicked", self.name)));
        if let Err(reason) = &output {
            tracing::debug!("{} failed in '{}': {}", id, self.name, reason);
        }

        if let Err(e) = self.store.set_output(id, output) {
            tracing::error!("threaded executor '{}' could not publish output: {}", self.name, e);
        }
    }
}

/// A host function invoked from native worker threads.
///
/// Each invocation carries only an [`ExecutionId`]; inputs and the output
/// travel through the executor's [`CorrelationStore`]. Any number of ids may
/// be in flight at once. Failures (including panics) are written to the
/// slot as error outputs and never unwind into native code.
pub struct ThreadedExecutor<I, O> {
    state: Arc<ThreadedState<I, O>>,
}

impl<I, O> Clone for ThreadedExecutor<I, O> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<I, O> ThreadedExecutor<I, O>
where
    I: Clone + Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(ExecutionId, &[I]) -> SlotOutput<O> + Send + Sync + 'static,
    ) -> Self {
        Self::with_store(name, Arc::new(CorrelationStore::new()), func)
    }

    /// Build an executor over an existing store (e.g. a strict one).
    pub fn with_store(
        name: impl Into<String>,
        store: Arc<CorrelationStore<I, O>>,
        func: impl Fn(ExecutionId, &[I]) -> SlotOutput<O> + Send + Sync + 'static,
    ) -> Self {
        Self {
            state: Arc::new(ThreadedState {
                name: name.into(),
                store,
                func: Box::new(func),
                invocations: AtomicUsize::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }

    pub fn store(&self) -> &Arc<CorrelationStore<I, O>> {
        &self.state.store
    }

    /// Number of times the entry point has run.
    pub fn invocations(&self) -> usize {
        self.state.invocations.load(Ordering::Relaxed)
    }

    /// The (context, function) pair to hand to native code.
    pub fn callback(&self) -> ThreadedCallback {
        ThreadedCallback::new(Arc::as_ptr(&self.state) as *mut c_void, Self::entry)
    }

    /// Full round-trip for `id`: store the inputs, have `dispatcher` run the
    /// callback, and read the output back. Blocks until the output exists.
    pub fn invoke(&self, id: ExecutionId, inputs: Vec<I>, dispatcher: &dyn Dispatcher) -> Result<O> {
        let store = &self.state.store;
        tracing::debug!("{} entering '{}' with {} input(s)", id, self.state.name, inputs.len());

        store.open(id);
        for input in inputs {
            store.set_input(id, input);
        }

        if let Err(e) = dispatcher.dispatch(self.callback(), id) {
            store.evict(id);
            return Err(e);
        }
        store.take_output(id)
    }

    unsafe extern "C" fn entry(context: *mut c_void, execution_id: u64) {
        if context.is_null() {
            return;
        }
        // Safety: `context` came from `callback()` and the executor outlives
        // every native component it was registered with.
        let state = unsafe { &*(context as *const ThreadedState<I, O>) };
        let id = ExecutionId::new(execution_id);
        // A strict store panics on misuse; that must not unwind into native code.
        if catch_unwind(AssertUnwindSafe(|| state.handle(id))).is_err() {
            tracing::error!("threaded executor '{}' panicked outside user logic", state.name);
        }
    }
}

impl<I, O> ThreadedExecutor<I, O>
where
    I: WireValue + Clone + Send + Sync + 'static,
    O: WireValue + Send + Sync + 'static,
{
    /// The callback plus the entries the engine uses to feed it by id.
    ///
    /// Ids the engine picks must stay below
    /// [`HOST_ID_BASE`](crate::correlation::HOST_ID_BASE); `set_input`
    /// rejects the rest.
    pub fn channel(&self) -> NativeChannel {
        NativeChannel {
            context: Arc::as_ptr(&self.state) as *mut c_void,
            run: Self::entry,
            set_input: Self::set_input_entry,
            take_output: Self::take_output_entry,
            take_error: Self::take_error_entry,
            release_text: channel::release_text,
        }
    }

    unsafe extern "C" fn set_input_entry(
        context: *mut c_void,
        execution_id: u64,
        input: *const c_char,
    ) -> bool {
        if context.is_null() || input.is_null() {
            return false;
        }
        let state = unsafe { &*(context as *const ThreadedState<I, O>) };
        let id = ExecutionId::new(execution_id);
        if id.is_host() {
            tracing::error!("'{}' refused native input for host-range {}", state.name, id);
            return false;
        }

        let text = unsafe { CStr::from_ptr(input) }.to_string_lossy();
        match catch_unwind(AssertUnwindSafe(|| I::from_wire(&text))) {
            Ok(Ok(value)) => {
                state.store.set_input(id, value);
                true
            }
            Ok(Err(reason)) => {
                tracing::error!("'{}' could not decode input for {}: {}", state.name, id, reason);
                false
            }
            Err(_) => false,
        }
    }

    unsafe extern "C" fn take_output_entry(context: *mut c_void, execution_id: u64) -> *mut c_char {
        if context.is_null() {
            return std::ptr::null_mut();
        }
        let state = unsafe { &*(context as *const ThreadedState<I, O>) };
        let id = ExecutionId::new(execution_id);
        let Some(value) = state.store.take_ok(id) else {
            return std::ptr::null_mut();
        };
        match value.to_wire() {
            Ok(text) => channel::into_native_text(text),
            Err(reason) => {
                tracing::error!("'{}' could not encode output for {}: {}", state.name, id, reason);
                std::ptr::null_mut()
            }
        }
    }

    unsafe extern "C" fn take_error_entry(context: *mut c_void, execution_id: u64) -> *mut c_char {
        if context.is_null() {
            return std::ptr::null_mut();
        }
        let state = unsafe { &*(context as *const ThreadedState<I, O>) };
        state
            .store
            .take_err(ExecutionId::new(execution_id))
            .map_or(std::ptr::null_mut(), channel::into_native_text)
    }
}

impl<I, O> fmt::Debug for ThreadedExecutor<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadedExecutor")
            .field("name", &self.state.name)
            .field("invocations", &self.state.invocations.load(Ordering::Relaxed))
            .finish()
    }
}
