//! Type-keyed strategy table.

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::native::NativeEngine;

use super::builtin::{StringSetStrategy, StringStreamStrategy, StringStringMapStrategy};
use super::traits::{MapStrategy, SetStrategy, StreamStrategy};

/// Which wrapper family a strategy serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    Map,
    Set,
    Stream,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Map => write!(f, "map"),
            Self::Set => write!(f, "set"),
            Self::Stream => write!(f, "stream"),
        }
    }
}

/// Type identity of a strategy: one type, or a (key, value) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKey {
    Single(TypeId),
    Pair(TypeId, TypeId),
}

impl TypeKey {
    pub fn of<T: 'static>() -> Self {
        Self::Single(TypeId::of::<T>())
    }

    pub fn pair<A: 'static, B: 'static>() -> Self {
        Self::Pair(TypeId::of::<A>(), TypeId::of::<B>())
    }
}

struct Entry {
    /// Holds an `Arc<dyn MapStrategy<K, V>>` (or set/stream equivalent).
    strategy: Box<dyn Any + Send + Sync>,
    type_names: String,
    native_type: &'static str,
}

/// Registered strategies, keyed by wrapper kind and type identity.
#[derive(Default)]
pub struct StrategyTable {
    entries: FxHashMap<(StrategyKind, TypeKey), Entry>,
}

impl StrategyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with the string instantiations the engine exports.
    ///
    /// Instantiations whose entry points are missing are left out (and
    /// logged), so wrappers for them come up inert.
    pub fn builtin(engine: &NativeEngine) -> Self {
        let mut table = Self::new();

        match StringStringMapStrategy::resolve(engine) {
            Ok(strategy) => table.register_map::<String, String>(strategy),
            Err(e) => tracing::warn!("StringStringMap unavailable: {}", e),
        }
        match StringSetStrategy::resolve(engine) {
            Ok(strategy) => table.register_set::<String>(strategy),
            Err(e) => tracing::warn!("StringSet unavailable: {}", e),
        }
        match StringStreamStrategy::resolve(engine) {
            Ok(strategy) => table.register_stream::<String>(strategy),
            Err(e) => tracing::warn!("StringStream unavailable: {}", e),
        }

        tracing::debug!("strategy table built with {} entries", table.len());
        table
    }

    pub fn register_map<K: 'static, V: 'static>(&mut self, strategy: impl MapStrategy<K, V> + 'static) {
        let native_type = strategy.native_type();
        let strategy: Arc<dyn MapStrategy<K, V>> = Arc::new(strategy);
        self.insert(
            StrategyKind::Map,
            TypeKey::pair::<K, V>(),
            format!("{}, {}", type_name::<K>(), type_name::<V>()),
            native_type,
            Box::new(strategy),
        );
    }

    pub fn register_set<T: 'static>(&mut self, strategy: impl SetStrategy<T> + 'static) {
        let native_type = strategy.native_type();
        let strategy: Arc<dyn SetStrategy<T>> = Arc::new(strategy);
        self.insert(
            StrategyKind::Set,
            TypeKey::of::<T>(),
            type_name::<T>().to_string(),
            native_type,
            Box::new(strategy),
        );
    }

    pub fn register_stream<T: 'static>(&mut self, strategy: impl StreamStrategy<T> + 'static) {
        let native_type = strategy.native_type();
        let strategy: Arc<dyn StreamStrategy<T>> = Arc::new(strategy);
        self.insert(
            StrategyKind::Stream,
            TypeKey::of::<T>(),
            type_name::<T>().to_string(),
            native_type,
            Box::new(strategy),
        );
    }

    pub fn map<K: 'static, V: 'static>(&self) -> Result<Arc<dyn MapStrategy<K, V>>> {
        self.lookup(StrategyKind::Map, TypeKey::pair::<K, V>(), || {
            format!("{}, {}", type_name::<K>(), type_name::<V>())
        })
    }

    pub fn set<T: 'static>(&self) -> Result<Arc<dyn SetStrategy<T>>> {
        self.lookup(StrategyKind::Set, TypeKey::of::<T>(), || type_name::<T>().to_string())
    }

    pub fn stream<T: 'static>(&self) -> Result<Arc<dyn StreamStrategy<T>>> {
        self.lookup(StrategyKind::Stream, TypeKey::of::<T>(), || type_name::<T>().to_string())
    }

    pub fn contains(&self, kind: StrategyKind, key: TypeKey) -> bool {
        self.entries.contains_key(&(kind, key))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(kind, host types, native type)` for every registered strategy.
    pub fn describe(&self) -> Vec<(StrategyKind, String, &'static str)> {
        let mut rows: Vec<_> = self
            .entries
            .iter()
            .map(|((kind, _), entry)| (*kind, entry.type_names.clone(), entry.native_type))
            .collect();
        rows.sort_by(|a, b| a.2.cmp(b.2));
        rows
    }

    fn insert(
        &mut self,
        kind: StrategyKind,
        key: TypeKey,
        type_names: String,
        native_type: &'static str,
        strategy: Box<dyn Any + Send + Sync>,
    ) {
        tracing::debug!("registered {} strategy <{}> -> {}", kind, type_names, native_type);
        let previous = self.entries.insert(
            (kind, key),
            Entry {
                strategy,
                type_names,
                native_type,
            },
        );
        if let Some(previous) = previous {
            tracing::warn!("{} strategy for <{}> replaced", kind, previous.type_names);
        }
    }

    fn lookup<S: ?Sized + 'static>(
        &self,
        kind: StrategyKind,
        key: TypeKey,
        names: impl FnOnce() -> String,
    ) -> Result<Arc<S>> {
        self.entries
            .get(&(kind, key))
            .and_then(|entry| entry.strategy.downcast_ref::<Arc<S>>())
            .cloned()
            .ok_or_else(|| {
                let error = Error::UnregisteredType(format!("no {} strategy for <{}>", kind, names()));
                tracing::error!("{}", error);
                error
            })
    }
}

impl fmt::Debug for StrategyTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyTable")
            .field("entries", &self.entries.len())
            .finish()
    }
}
