//! Single-shot executor: synchronous native callback with inline parameters.

use std::ffi::c_void;
use std::mem::MaybeUninit;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{Error, Result};

use super::callback::SingleShotCallback;

/// Native-callable entry: reads `*input`, writes `*output`, returns whether
/// `*output` was written.
pub type SingleShotEntry =
    unsafe extern "C" fn(context: *mut c_void, input: *const c_void, output: *mut c_void) -> bool;

type SingleShotFn<I, O> = dyn Fn(&I) -> O + Send + Sync;

enum Failure {
    Reentrant,
    Panicked,
}

struct SingleShotState<I, O> {
    name: String,
    func: Box<SingleShotFn<I, O>>,
    busy: AtomicBool,
    rejected: AtomicUsize,
    last_input: Mutex<Option<I>>,
    last_output: Mutex<Option<O>>,
}

/// Clears the busy flag when an invocation ends, including by panic.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<I: Clone, O: Clone> SingleShotState<I, O> {
    fn run(&self, input: &I) -> std::result::Result<O, Failure> {
        if self.busy.swap(true, Ordering::AcqRel) {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::error!("single-shot executor '{}' entered while busy", self.name);
            return Err(Failure::Reentrant);
        }
        let _busy = BusyGuard(&self.busy);

        *self.last_input.lock().unwrap_or_else(PoisonError::into_inner) = Some(input.clone());

        match catch_unwind(AssertUnwindSafe(|| (self.func)(input))) {
            Ok(output) => {
                *self.last_output.lock().unwrap_or_else(PoisonError::into_inner) =
                    Some(output.clone());
                Ok(output)
            }
            Err(_) => {
                tracing::error!("single-shot executor '{}' panicked", self.name);
                Err(Failure::Panicked)
            }
        }
    }
}

/// A host closure callable by native code with inline input/output pointers.
///
/// The native side must not overlap invocations. Overlap is detected: the
/// second caller gets `false` from the entry (or [`Error::Reentrant`] from
/// [`call`](Self::call)) and the closure is not run.
///
/// The executor must outlive every native component it was registered
/// with; cloning shares the same state.
pub struct SingleShotExecutor<I, O> {
    state: Arc<SingleShotState<I, O>>,
}

impl<I, O> Clone for SingleShotExecutor<I, O> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<I, O> SingleShotExecutor<I, O>
where
    I: Clone + Send + 'static,
    O: Clone + Send + 'static,
{
    pub fn new(name: impl Into<String>, func: impl Fn(&I) -> O + Send + Sync + 'static) -> Self {
        Self {
            state: Arc::new(SingleShotState {
                name: name.into(),
                func: Box::new(func),
                busy: AtomicBool::new(false),
                rejected: AtomicUsize::new(0),
                last_input: Mutex::new(None),
                last_output: Mutex::new(None),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }

    /// The (context, function) pair to hand to a native constructor.
    pub fn callback(&self) -> SingleShotCallback {
        SingleShotCallback::new(Arc::as_ptr(&self.state) as *mut c_void, Self::entry)
    }

    /// Invoke from the host side, with the same guard the native entry uses.
    pub fn call(&self, input: &I) -> Result<O> {
        self.state.run(input).map_err(|failure| match failure {
            Failure::Reentrant => Error::Reentrant(self.state.name.clone()),
            Failure::Panicked => {
                Error::Callback(format!("single-shot executor '{}' panicked", self.state.name))
            }
        })
    }

    /// Invoke through the native entry point, exactly as native code would.
    pub fn call_native(&self, input: &I) -> Result<O> {
        let callback = self.callback();
        let mut output = MaybeUninit::<O>::uninit();
        let written = unsafe {
            (callback.function)(
                callback.context,
                input as *const I as *const c_void,
                output.as_mut_ptr() as *mut c_void,
            )
        };
        if written {
            // Safety: the entry returned true, so it wrote `output`.
            Ok(unsafe { output.assume_init() })
        } else {
            Err(Error::Callback(format!(
                "single-shot executor '{}' produced no output",
                self.state.name
            )))
        }
    }

    /// Input of the most recent invocation.
    pub fn last_input(&self) -> Option<I> {
        self.state
            .last_input
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Output of the most recent successful invocation.
    pub fn last_output(&self) -> Option<O> {
        self.state
            .last_output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Invocations refused because another was still running.
    pub fn rejected(&self) -> usize {
        self.state.rejected.load(Ordering::Relaxed)
    }

    unsafe extern "C" fn entry(
        context: *mut c_void,
        input: *const c_void,
        output: *mut c_void,
    ) -> bool {
        if context.is_null() || input.is_null() || output.is_null() {
            return false;
        }
        // Safety: `context` came from `callback()` and the executor is kept
        // alive by whoever registered it; `input`/`output` point at an `I`
        // and an uninitialized `O` per the entry's contract.
        let state = unsafe { &*(context as *const SingleShotState<I, O>) };
        let input = unsafe { &*(input as *const I) };
        match state.run(input) {
            Ok(value) => {
                unsafe { std::ptr::write(output as *mut O, value) };
                true
            }
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::time::Duration;

    #[test]
    fn test_call() {
        let exec = SingleShotExecutor::new("double", |x: &i64| x * 2);
        assert_eq!(exec.call(&21).unwrap(), 42);
        assert_eq!(exec.last_input(), Some(21));
        assert_eq!(exec.last_output(), Some(42));
    }

    #[test]
    fn test_call_native() {
        let exec = SingleShotExecutor::new("greet", |name: &String| format!("hi {}", name));
        assert_eq!(exec.call_native(&"ada".to_string()).unwrap(), "hi ada");
    }

    #[test]
    fn test_entry_rejects_null() {
        let exec = SingleShotExecutor::new("noop", |x: &i32| *x);
        let callback = exec.callback();
        let written = unsafe {
            (callback.function)(callback.context, std::ptr::null(), std::ptr::null_mut())
        };
        assert!(!written);
    }

    #[test]
    fn test_reentrancy_rejected() {
        let barrier = Arc::new(Barrier::new(2));
        let inner = barrier.clone();
        let exec = SingleShotExecutor::new("slow", move |x: &u32| {
            if *x == 1 {
                inner.wait();
                std::thread::sleep(Duration::from_millis(50));
            }
            *x
        });

        let background = exec.clone();
        let worker = std::thread::spawn(move || background.call(&1));

        barrier.wait();
        let overlapping = exec.call(&2);
        assert!(matches!(overlapping, Err(Error::Reentrant(_))));
        assert_eq!(worker.join().unwrap().unwrap(), 1);
        assert_eq!(exec.rejected(), 1);

        // The guard is released once the first call returns.
        assert_eq!(exec.call(&5).unwrap(), 5);
    }

    #[test]
    fn test_panic_is_contained() {
        let exec = SingleShotExecutor::new("panics", |_: &i32| -> i32 { panic!("boom") });
        assert!(matches!(exec.call(&1), Err(Error::Callback(_))));
        // Busy flag cleared by the guard.
        assert!(matches!(exec.call(&1), Err(Error::Callback(_))));
        assert_eq!(exec.rejected(), 0);
    }
}
