//! Driving a threaded callback for one execution id.

use std::ffi::c_void;
use std::fmt;

use crate::correlation::ExecutionId;
use crate::error::Result;
use crate::native::NativeEngine;

use super::callback::{ArgOrder, ThreadedCallback};

/// Decides where a threaded callback runs for a given id.
///
/// `dispatch` returns only after the callback has finished, so the output
/// is in the correlation store when it returns `Ok`.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, callback: ThreadedCallback, id: ExecutionId) -> Result<()>;
}

/// Runs the callback directly on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineDispatcher;

impl Dispatcher for InlineDispatcher {
    fn dispatch(&self, callback: ThreadedCallback, id: ExecutionId) -> Result<()> {
        unsafe { (callback.function)(callback.context, id.as_u64()) };
        Ok(())
    }
}

/// `<engine>_Executor_run`: schedules the callback on a native worker and
/// waits for it. The pointer pair arrives in the engine's own order.
pub type ExecutorRunFn = unsafe extern "C" fn(first: *mut c_void, second: *mut c_void, execution_id: u64);

/// Hands the callback to the native engine's worker pool.
#[derive(Clone, Copy)]
pub struct NativeDispatcher {
    run: ExecutorRunFn,
    order: ArgOrder,
}

impl NativeDispatcher {
    pub fn new(engine: &NativeEngine, order: ArgOrder) -> Result<Self> {
        let run = unsafe { engine.resolve::<ExecutorRunFn>("Executor", "run")? };
        Ok(Self::from_fn(run, order))
    }

    pub fn from_fn(run: ExecutorRunFn, order: ArgOrder) -> Self {
        Self { run, order }
    }

    pub fn order(&self) -> ArgOrder {
        self.order
    }
}

impl Dispatcher for NativeDispatcher {
    fn dispatch(&self, callback: ThreadedCallback, id: ExecutionId) -> Result<()> {
        let [first, second] = callback.ordered(self.order);
        tracing::trace!("{} dispatched to native worker pool", id);
        unsafe { (self.run)(first, second, id.as_u64()) };
        Ok(())
    }
}

impl fmt::Debug for NativeDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeDispatcher")
            .field("order", &self.order)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::ExecutionId;
    use crate::execute::{ThreadedEntry, ThreadedExecutor};
    use crate::testing;

    unsafe extern "C" fn run_context_first(context: *mut c_void, function: *mut c_void, id: u64) {
        let entry: ThreadedEntry = unsafe { std::mem::transmute(function) };
        unsafe { entry(context, id) };
    }

    fn shout() -> ThreadedExecutor<String, String> {
        ThreadedExecutor::new("shout", |_, inputs: &[String]| Ok(inputs.concat().to_uppercase()))
    }

    #[test]
    fn test_native_dispatcher_with_fake_engine() {
        let engine = testing::engine();
        let dispatcher = NativeDispatcher::new(&engine, testing::EXECUTOR_ARG_ORDER).unwrap();

        let exec = shout();
        let out = exec
            .invoke(ExecutionId::new(11), vec!["quiet".to_string()], &dispatcher)
            .unwrap();
        assert_eq!(out, "QUIET");
    }

    #[test]
    fn test_context_first_engine() {
        let dispatcher = NativeDispatcher::from_fn(run_context_first, ArgOrder::ContextFirst);
        let exec = shout();
        let out = exec
            .invoke(ExecutionId::new(12), vec!["ab".to_string(), "c".to_string()], &dispatcher)
            .unwrap();
        assert_eq!(out, "ABC");
    }
}
