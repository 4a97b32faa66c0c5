//! Typed native map.

use std::fmt;
use std::sync::Arc;

use crate::handle::{HandleRegistry, NativeHandle, OwnedHandle};
use crate::strategy::{INVALID_SIZE, MapStrategy, StrategyTable};

/// A native map with host key type `K` and value type `V`.
pub struct NativeMap<K: 'static, V: 'static> {
    handle: OwnedHandle,
    strategy: Option<Arc<dyn MapStrategy<K, V>>>,
}

impl<K: 'static, V: 'static> NativeMap<K, V> {
    /// Create an empty native map through the strategy registered for
    /// `(K, V)`. Never fails: a missing strategy yields an inert map.
    pub fn new(table: &StrategyTable, handles: &HandleRegistry) -> Self {
        let Ok(strategy) = table.map::<K, V>() else {
            return Self::inert();
        };

        let handle = handles.register(strategy.create(), strategy.release_fn());
        if !handle.is_valid() {
            tracing::error!("{}_create returned a null handle", strategy.native_type());
        }
        Self {
            handle,
            strategy: Some(strategy),
        }
    }

    /// A map that owns nothing and never calls out.
    pub fn inert() -> Self {
        Self {
            handle: OwnedHandle::invalid(),
            strategy: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.strategy.is_some() && self.handle.is_valid()
    }

    /// Raw handle, for passing the map to other native calls.
    pub fn raw(&self) -> NativeHandle {
        self.handle.raw()
    }

    fn live(&self) -> Option<(&dyn MapStrategy<K, V>, NativeHandle)> {
        match &self.strategy {
            Some(strategy) if self.handle.is_valid() => Some((strategy.as_ref(), self.handle.raw())),
            _ => None,
        }
    }

    /// Number of entries, or [`INVALID_SIZE`] for an inert map.
    pub fn size(&self) -> i64 {
        self.live().map_or(INVALID_SIZE, |(s, h)| s.size(h))
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.live().and_then(|(s, h)| s.get(h, key))
    }

    pub fn set(&mut self, key: &K, value: &V) -> bool {
        self.live().is_some_and(|(s, h)| s.set(h, key, value))
    }

    pub fn contains(&self, key: &K) -> bool {
        self.live().is_some_and(|(s, h)| s.contains(h, key))
    }

    pub fn remove(&mut self, key: &K) -> bool {
        self.live().is_some_and(|(s, h)| s.remove(h, key))
    }

    /// Release the native map now; the wrapper becomes inert.
    pub fn release(&mut self) {
        self.handle.release();
    }
}

impl<K: 'static, V: 'static> fmt::Debug for NativeMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeMap")
            .field("native_type", &self.strategy.as_ref().map(|s| s.native_type()))
            .field("handle", &self.handle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    fn string_map() -> (NativeMap<String, String>, HandleRegistry) {
        let engine = testing::engine();
        let table = StrategyTable::builtin(&engine);
        let handles = HandleRegistry::new();
        (NativeMap::new(&table, &handles), handles)
    }

    #[test]
    fn test_string_map_operations() {
        let (mut map, _) = string_map();
        assert!(map.is_valid());
        assert_eq!(map.size(), 0);

        let key = "model".to_string();
        assert!(map.set(&key, &"small".to_string()));
        assert!(map.set(&key, &"large".to_string()));
        assert_eq!(map.size(), 1);
        assert_eq!(map.get(&key).as_deref(), Some("large"));
        assert!(map.contains(&key));

        assert!(map.remove(&key));
        assert!(!map.remove(&key));
        assert_eq!(map.size(), 0);
    }

    #[test]
    fn test_unregistered_pair_is_inert() {
        let engine = testing::engine();
        let table = StrategyTable::builtin(&engine);
        let mut map: NativeMap<String, u64> = NativeMap::new(&table, &HandleRegistry::new());

        assert!(!map.is_valid());
        assert_eq!(map.size(), INVALID_SIZE);
        assert!(!map.set(&"k".to_string(), &1));
        assert_eq!(map.get(&"k".to_string()), None);
        assert!(!map.contains(&"k".to_string()));
        assert!(!map.remove(&"k".to_string()));
    }

    #[test]
    fn test_release_makes_inert_without_calls() {
        let (mut map, handles) = string_map();
        let raw = map.raw();
        map.set(&"a".to_string(), &"1".to_string());

        map.release();
        map.release();
        assert_eq!(testing::delete_count(raw), 1);
        assert_eq!(handles.stats().live(), 0);

        let calls = testing::call_count(raw);
        assert_eq!(map.size(), INVALID_SIZE);
        assert_eq!(map.get(&"a".to_string()), None);
        assert!(!map.set(&"b".to_string(), &"2".to_string()));
        assert_eq!(testing::call_count(raw), calls);
    }

    #[test]
    fn test_drop_releases() {
        let (map, handles) = string_map();
        let raw = map.raw();
        drop(map);
        assert_eq!(testing::delete_count(raw), 1);
        assert_eq!(handles.stats().released, 1);
    }
}
