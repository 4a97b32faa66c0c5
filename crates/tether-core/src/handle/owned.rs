//! Move-only wrapper around a native handle.

use std::fmt;
use std::sync::Arc;

use super::registry::HandleLedger;

/// Opaque reference to a resource owned by the native engine.
///
/// The value is never dereferenced on the host side. It is passed back to
/// native entry points verbatim and compared by value.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NativeHandle(usize);

impl NativeHandle {
    /// The null handle. Native constructors return it on failure.
    pub const NULL: NativeHandle = NativeHandle(0);

    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub const fn as_usize(&self) -> usize {
        self.0
    }

    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Native release function, the `<engine>_<Type>_delete` entry point.
pub type ReleaseFn = unsafe extern "C" fn(NativeHandle);

/// Sole owner of a native handle.
///
/// Not `Clone`: moving the wrapper moves ownership, so the release function
/// can only ever run once for a given handle. A wrapper built from a null
/// handle is *invalid*; callers check [`is_valid`](Self::is_valid) and skip
/// the foreign call instead of passing null across the boundary.
pub struct OwnedHandle {
    raw: NativeHandle,
    release: Option<ReleaseFn>,
    ledger: Option<Arc<HandleLedger>>,
}

impl OwnedHandle {
    /// Take ownership of `raw`, to be released with `release`.
    ///
    /// A null `raw` yields an invalid wrapper and `release` is never called.
    pub fn new(raw: NativeHandle, release: ReleaseFn) -> Self {
        Self::with_ledger(raw, release, None)
    }

    pub(crate) fn with_ledger(
        raw: NativeHandle,
        release: ReleaseFn,
        ledger: Option<Arc<HandleLedger>>,
    ) -> Self {
        if raw.is_null() {
            return Self::invalid();
        }
        if let Some(ledger) = &ledger {
            ledger.on_register();
        }
        Self {
            raw,
            release: Some(release),
            ledger,
        }
    }

    /// The sentinel wrapper: owns nothing, releases nothing.
    pub fn invalid() -> Self {
        Self {
            raw: NativeHandle::NULL,
            release: None,
            ledger: None,
        }
    }

    /// Whether the wrapper still owns a live handle.
    pub fn is_valid(&self) -> bool {
        self.release.is_some()
    }

    /// The raw handle for passing to a native call.
    ///
    /// Returns [`NativeHandle::NULL`] once released.
    pub fn raw(&self) -> NativeHandle {
        self.raw
    }

    /// Release the handle now. Subsequent calls are no-ops.
    pub fn release(&mut self) {
        let Some(release) = self.release.take() else {
            return;
        };
        let raw = std::mem::replace(&mut self.raw, NativeHandle::NULL);
        tracing::trace!("releasing native handle {}", raw);

        // Safety: `release` was supplied together with `raw` by the native
        // side, and taking it out of the Option guarantees a single call.
        unsafe { release(raw) };

        if let Some(ledger) = &self.ledger {
            ledger.on_release();
        }
    }

    /// Release the current handle and take ownership of `raw` instead.
    pub fn replace(&mut self, raw: NativeHandle, release: ReleaseFn) {
        self.release();
        let ledger = self.ledger.take();
        *self = Self::with_ledger(raw, release, ledger);
    }

    /// Give ownership back to native code without releasing.
    ///
    /// Used when a native call consumes the handle (e.g. a node taking
    /// ownership of its configuration).
    pub fn into_raw(mut self) -> NativeHandle {
        let raw = std::mem::replace(&mut self.raw, NativeHandle::NULL);
        if self.release.take().is_some() {
            if let Some(ledger) = &self.ledger {
                ledger.on_transfer();
            }
        }
        raw
    }
}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for OwnedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedHandle")
            .field("raw", &self.raw)
            .field("valid", &self.is_valid())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static RELEASED: Mutex<Vec<usize>> = Mutex::new(Vec::new());

    unsafe extern "C" fn record_release(handle: NativeHandle) {
        RELEASED.lock().unwrap().push(handle.as_usize());
    }

    fn release_count(raw: usize) -> usize {
        RELEASED.lock().unwrap().iter().filter(|&&h| h == raw).count()
    }

    #[test]
    fn test_null_is_invalid() {
        let handle = OwnedHandle::new(NativeHandle::NULL, record_release);
        assert!(!handle.is_valid());
        assert!(handle.raw().is_null());
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut handle = OwnedHandle::new(NativeHandle::from_raw(0x1001), record_release);
        assert!(handle.is_valid());

        handle.release();
        handle.release();
        drop(handle);

        assert_eq!(release_count(0x1001), 1);
    }

    #[test]
    fn test_drop_releases() {
        {
            let _handle = OwnedHandle::new(NativeHandle::from_raw(0x1002), record_release);
        }
        assert_eq!(release_count(0x1002), 1);
    }

    #[test]
    fn test_raw_after_release_is_null() {
        let mut handle = OwnedHandle::new(NativeHandle::from_raw(0x1003), record_release);
        handle.release();
        assert!(handle.raw().is_null());
        assert!(!handle.is_valid());
    }

    #[test]
    fn test_replace_releases_previous() {
        let mut handle = OwnedHandle::new(NativeHandle::from_raw(0x1004), record_release);
        handle.replace(NativeHandle::from_raw(0x1005), record_release);

        assert_eq!(release_count(0x1004), 1);
        assert_eq!(release_count(0x1005), 0);
        assert_eq!(handle.raw(), NativeHandle::from_raw(0x1005));

        drop(handle);
        assert_eq!(release_count(0x1005), 1);
    }

    #[test]
    fn test_into_raw_skips_release() {
        let handle = OwnedHandle::new(NativeHandle::from_raw(0x1006), record_release);
        let raw = handle.into_raw();
        assert_eq!(raw.as_usize(), 0x1006);
        assert_eq!(release_count(0x1006), 0);
    }

    #[test]
    fn test_release_on_other_thread() {
        let handle = OwnedHandle::new(NativeHandle::from_raw(0x1007), record_release);
        std::thread::spawn(move || drop(handle)).join().unwrap();
        assert_eq!(release_count(0x1007), 1);
    }

    #[test]
    fn test_display() {
        assert_eq!(NativeHandle::from_raw(255).to_string(), "0xff");
    }
}
