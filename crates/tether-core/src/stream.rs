//! Cancellation contexts and native streams.
//!
//! Cancellation is cooperative. A [`CancellationContext`] is handed to the
//! engine when a stream (or graph run) is set up; the engine observes it
//! between elements, and the host side checks it before every read so a
//! cancelled stream never calls out again.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};
use crate::handle::{HandleRegistry, NativeHandle, OwnedHandle, ReleaseFn};
use crate::native::NativeEngine;
use crate::strategy::{StrategyTable, StreamStrategy};

type CancelCreateFn = unsafe extern "C" fn() -> NativeHandle;
type CancelFn = unsafe extern "C" fn(NativeHandle);
type IsCancelledFn = unsafe extern "C" fn(NativeHandle) -> bool;

#[derive(Debug, Clone, Copy)]
struct CancelFns {
    cancel: CancelFn,
    is_cancelled: IsCancelledFn,
}

struct CancelInner {
    handle: OwnedHandle,
    fns: Option<CancelFns>,
    cancelled: AtomicBool,
}

/// Shared cancellation token, optionally mirrored by a native context.
///
/// Clones share the same state; the native context is released when the
/// last clone drops.
#[derive(Clone)]
pub struct CancellationContext {
    inner: Arc<CancelInner>,
}

impl CancellationContext {
    /// Create a native `CancellationContext` owned through `handles`.
    pub fn native(engine: &NativeEngine, handles: &HandleRegistry) -> Result<Self> {
        let ty = "CancellationContext";
        let (create, delete, fns) = unsafe {
            let create: CancelCreateFn = engine.resolve(ty, "create")?;
            let delete: ReleaseFn = engine.resolve(ty, "delete")?;
            let fns = CancelFns {
                cancel: engine.resolve(ty, "cancel")?,
                is_cancelled: engine.resolve(ty, "is_cancelled")?,
            };
            (create, delete, fns)
        };

        let handle = handles.register(unsafe { create() }, delete);
        if !handle.is_valid() {
            return Err(Error::InvalidHandle(
                "CancellationContext_create returned null".to_string(),
            ));
        }
        Ok(Self {
            inner: Arc::new(CancelInner {
                handle,
                fns: Some(fns),
                cancelled: AtomicBool::new(false),
            }),
        })
    }

    /// A host-only token, for runs that involve no native producer.
    pub fn local() -> Self {
        Self {
            inner: Arc::new(CancelInner {
                handle: OwnedHandle::invalid(),
                fns: None,
                cancelled: AtomicBool::new(false),
            }),
        }
    }

    /// Handle to pass to native constructors; null for a local token.
    pub fn raw(&self) -> NativeHandle {
        self.inner.handle.raw()
    }

    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!("cancellation requested");
        if let Some(fns) = self.inner.fns {
            if self.inner.handle.is_valid() {
                unsafe { (fns.cancel)(self.inner.handle.raw()) };
            }
        }
    }

    /// Whether either side has cancelled.
    pub fn is_cancelled(&self) -> bool {
        if self.inner.cancelled.load(Ordering::Acquire) {
            return true;
        }
        match self.inner.fns {
            Some(fns) if self.inner.handle.is_valid() => {
                let cancelled = unsafe { (fns.is_cancelled)(self.inner.handle.raw()) };
                if cancelled {
                    self.inner.cancelled.store(true, Ordering::Release);
                }
                cancelled
            }
            _ => false,
        }
    }
}

impl Default for CancellationContext {
    fn default() -> Self {
        Self::local()
    }
}

impl fmt::Debug for CancellationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationContext")
            .field("handle", &self.inner.handle.raw())
            .field("cancelled", &self.inner.cancelled.load(Ordering::Relaxed))
            .finish()
    }
}

/// An engine-produced stream of `T`.
///
/// Also an [`Iterator`] of `Result<T>` that stops once `has_next` is false.
pub struct NativeStream<T: 'static> {
    handle: OwnedHandle,
    strategy: Option<Arc<dyn StreamStrategy<T>>>,
    cancellation: CancellationContext,
}

impl<T: 'static> NativeStream<T> {
    /// Take ownership of a stream handle returned by the engine.
    ///
    /// `cancellation` must be the context the stream was constructed with.
    pub fn adopt(
        raw: NativeHandle,
        table: &StrategyTable,
        handles: &HandleRegistry,
        cancellation: CancellationContext,
    ) -> Self {
        match table.stream::<T>() {
            Ok(strategy) => Self {
                handle: handles.register(raw, strategy.release_fn()),
                strategy: Some(strategy),
                cancellation,
            },
            Err(_) => {
                // Without a strategy there is no release function either.
                if !raw.is_null() {
                    tracing::warn!("stream handle {} leaked: no strategy to release it", raw);
                }
                Self {
                    handle: OwnedHandle::invalid(),
                    strategy: None,
                    cancellation,
                }
            }
        }
    }

    pub fn is_valid(&self) -> bool {
        self.strategy.is_some() && self.handle.is_valid()
    }

    pub fn cancellation(&self) -> &CancellationContext {
        &self.cancellation
    }

    fn live(&self) -> Option<(&dyn StreamStrategy<T>, NativeHandle)> {
        match &self.strategy {
            Some(strategy) if self.handle.is_valid() => Some((strategy.as_ref(), self.handle.raw())),
            _ => None,
        }
    }

    /// `false` for released, inert or cancelled streams.
    pub fn has_next(&self) -> bool {
        if self.cancellation.is_cancelled() {
            return false;
        }
        self.live().is_some_and(|(s, h)| s.has_next(h))
    }

    /// Next element. Reading past the end yields [`Error::EndOfStream`],
    /// reading after cancellation yields [`Error::Cancelled`].
    pub fn read(&mut self) -> Result<T> {
        let Some((strategy, handle)) = self.live() else {
            return Err(Error::InvalidHandle("stream is released or has no strategy".to_string()));
        };
        if self.cancellation.is_cancelled() {
            return Err(Error::Cancelled);
        }
        strategy.read(handle)
    }

    /// Drain the remaining elements.
    pub fn collect_all(&mut self) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while self.has_next() {
            items.push(self.read()?);
        }
        if self.cancellation.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(items)
    }

    pub fn release(&mut self) {
        self.handle.release();
    }
}

impl<T: 'static> Iterator for NativeStream<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cancellation.is_cancelled() && self.is_valid() {
            // Surface cancellation once, then stop.
            self.release();
            return Some(Err(Error::Cancelled));
        }
        if !self.has_next() {
            return None;
        }
        Some(self.read())
    }
}

impl<T: 'static> fmt::Debug for NativeStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeStream")
            .field("native_type", &self.strategy.as_ref().map(|s| s.native_type()))
            .field("handle", &self.handle)
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    fn setup() -> (StrategyTable, HandleRegistry, CancellationContext) {
        let engine = testing::engine();
        let handles = HandleRegistry::new();
        let cancel = CancellationContext::native(&engine, &handles).unwrap();
        (StrategyTable::builtin(&engine), handles, cancel)
    }

    #[test]
    fn test_read_all_then_end_of_stream() {
        let (table, handles, cancel) = setup();
        let raw = testing::make_stream(&["one", "two"], cancel.raw());
        let mut stream: NativeStream<String> = NativeStream::adopt(raw, &table, &handles, cancel);

        assert!(stream.has_next());
        assert_eq!(stream.read().unwrap(), "one");
        assert_eq!(stream.read().unwrap(), "two");
        assert!(!stream.has_next());
        assert!(matches!(stream.read(), Err(Error::EndOfStream)));
    }

    #[test]
    fn test_read_after_cancel() {
        let (table, handles, cancel) = setup();
        let raw = testing::make_stream(&["a", "b", "c"], cancel.raw());
        let mut stream: NativeStream<String> =
            NativeStream::adopt(raw, &table, &handles, cancel.clone());

        assert_eq!(stream.read().unwrap(), "a");
        cancel.cancel();
        assert!(testing::is_cancelled(cancel.raw()));

        let calls = testing::call_count(raw);
        assert!(!stream.has_next());
        assert!(matches!(stream.read(), Err(Error::Cancelled)));
        assert_eq!(testing::call_count(raw), calls);
    }

    #[test]
    fn test_native_side_cancellation_is_observed() {
        let (table, handles, cancel) = setup();
        let raw = testing::make_stream(&["a", "b"], cancel.raw());
        let mut stream: NativeStream<String> =
            NativeStream::adopt(raw, &table, &handles, cancel.clone());

        testing::cancel_natively(cancel.raw());
        assert!(cancel.is_cancelled());
        assert!(matches!(stream.read(), Err(Error::Cancelled)));
    }

    #[test]
    fn test_iterator() {
        let (table, handles, cancel) = setup();
        let raw = testing::make_stream(&["x", "y", "z"], cancel.raw());
        let stream: NativeStream<String> = NativeStream::adopt(raw, &table, &handles, cancel);

        let items: Result<Vec<String>> = stream.collect();
        assert_eq!(items.unwrap(), vec!["x", "y", "z"]);
        assert_eq!(testing::delete_count(raw), 1);
    }

    #[test]
    fn test_released_stream_makes_no_calls() {
        let (table, handles, cancel) = setup();
        let raw = testing::make_stream(&["x"], cancel.raw());
        let mut stream: NativeStream<String> = NativeStream::adopt(raw, &table, &handles, cancel);

        stream.release();
        let calls = testing::call_count(raw);
        assert!(!stream.has_next());
        assert!(matches!(stream.read(), Err(Error::InvalidHandle(_))));
        assert_eq!(testing::call_count(raw), calls);
    }

    #[test]
    fn test_local_token() {
        let token = CancellationContext::local();
        let shared = token.clone();
        assert!(token.raw().is_null());
        assert!(!shared.is_cancelled());
        token.cancel();
        assert!(shared.is_cancelled());
    }
}
