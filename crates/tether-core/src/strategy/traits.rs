//! Operation sets for the generic native wrappers.
//!
//! Strategies never own handles. The wrapper owns the handle and passes
//! its raw value in; a strategy only knows which entry points to call.

use crate::error::Result;
use crate::handle::{NativeHandle, ReleaseFn};

/// Operations of one native map instantiation.
pub trait MapStrategy<K, V>: Send + Sync {
    /// Native type name, e.g. `StringStringMap`.
    fn native_type(&self) -> &'static str;

    /// Construct an empty map. Null on failure.
    fn create(&self) -> NativeHandle;

    /// The `<Type>_delete` entry point.
    fn release_fn(&self) -> ReleaseFn;

    fn size(&self, map: NativeHandle) -> i64;

    fn get(&self, map: NativeHandle, key: &K) -> Option<V>;

    /// Insert or overwrite; `false` if the engine rejected the write.
    fn set(&self, map: NativeHandle, key: &K, value: &V) -> bool;

    fn contains(&self, map: NativeHandle, key: &K) -> bool;

    fn remove(&self, map: NativeHandle, key: &K) -> bool;
}

/// Operations of one native set instantiation.
pub trait SetStrategy<T>: Send + Sync {
    fn native_type(&self) -> &'static str;

    fn create(&self) -> NativeHandle;

    fn release_fn(&self) -> ReleaseFn;

    fn size(&self, set: NativeHandle) -> i64;

    /// `false` if the value was already present.
    fn insert(&self, set: NativeHandle, value: &T) -> bool;

    fn contains(&self, set: NativeHandle, value: &T) -> bool;

    fn remove(&self, set: NativeHandle, value: &T) -> bool;
}

/// Operations of one native stream instantiation.
///
/// Streams are produced by the engine, never created from the host side.
pub trait StreamStrategy<T>: Send + Sync {
    fn native_type(&self) -> &'static str;

    fn release_fn(&self) -> ReleaseFn;

    fn has_next(&self, stream: NativeHandle) -> bool;

    /// Next element, or the engine's failure (end of stream, cancellation).
    fn read(&self, stream: NativeHandle) -> Result<T>;
}
