//! Handle registry with live-handle accounting.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::owned::{NativeHandle, OwnedHandle, ReleaseFn};

/// Shared counters updated by every handle the registry hands out.
#[derive(Debug, Default)]
pub(crate) struct HandleLedger {
    registered: AtomicUsize,
    released: AtomicUsize,
    transferred: AtomicUsize,
}

impl HandleLedger {
    pub(crate) fn on_register(&self) {
        self.registered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn on_release(&self) {
        self.released.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn on_transfer(&self) {
        self.transferred.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of a registry's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleStats {
    /// Handles registered over the registry's lifetime.
    pub registered: usize,
    /// Handles released through their release function.
    pub released: usize,
    /// Handles given back to native code via `into_raw`.
    pub transferred: usize,
}

impl HandleStats {
    /// Handles currently owned on the host side.
    pub fn live(&self) -> usize {
        self.registered
            .saturating_sub(self.released)
            .saturating_sub(self.transferred)
    }
}

/// Creates [`OwnedHandle`]s and tracks how many are still alive.
///
/// Cloning the registry shares the counters.
#[derive(Debug, Clone, Default)]
pub struct HandleRegistry {
    ledger: Arc<HandleLedger>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a handle returned by a native call.
    pub fn register(&self, raw: NativeHandle, release: ReleaseFn) -> OwnedHandle {
        if raw.is_null() {
            tracing::debug!("null handle registered; returning invalid wrapper");
        }
        OwnedHandle::with_ledger(raw, release, Some(self.ledger.clone()))
    }

    pub fn stats(&self) -> HandleStats {
        HandleStats {
            registered: self.ledger.registered.load(Ordering::Relaxed),
            released: self.ledger.released.load(Ordering::Relaxed),
            transferred: self.ledger.transferred.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe extern "C" fn noop_release(_: NativeHandle) {}

    #[test]
    fn test_registry_counts() {
        let registry = HandleRegistry::new();

        let a = registry.register(NativeHandle::from_raw(1), noop_release);
        let mut b = registry.register(NativeHandle::from_raw(2), noop_release);
        let c = registry.register(NativeHandle::from_raw(3), noop_release);
        assert_eq!(registry.stats().live(), 3);

        b.release();
        b.release();
        assert_eq!(registry.stats().released, 1);

        let _ = c.into_raw();
        assert_eq!(registry.stats().transferred, 1);
        assert_eq!(registry.stats().live(), 1);

        drop(a);
        assert_eq!(registry.stats().live(), 0);
    }

    #[test]
    fn test_null_not_counted() {
        let registry = HandleRegistry::new();
        let handle = registry.register(NativeHandle::NULL, noop_release);
        assert!(!handle.is_valid());
        assert_eq!(registry.stats().registered, 0);
    }

    #[test]
    fn test_replace_keeps_ledger() {
        let registry = HandleRegistry::new();
        let mut handle = registry.register(NativeHandle::from_raw(10), noop_release);
        handle.replace(NativeHandle::from_raw(11), noop_release);

        let stats = registry.stats();
        assert_eq!(stats.registered, 2);
        assert_eq!(stats.released, 1);
        assert_eq!(stats.live(), 1);
    }
}
