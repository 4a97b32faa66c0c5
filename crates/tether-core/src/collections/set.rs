//! Typed native set.

use std::fmt;
use std::sync::Arc;

use crate::handle::{HandleRegistry, NativeHandle, OwnedHandle};
use crate::strategy::{INVALID_SIZE, SetStrategy, StrategyTable};

/// A native set of host values of type `T`.
pub struct NativeSet<T: 'static> {
    handle: OwnedHandle,
    strategy: Option<Arc<dyn SetStrategy<T>>>,
}

impl<T: 'static> NativeSet<T> {
    pub fn new(table: &StrategyTable, handles: &HandleRegistry) -> Self {
        let Ok(strategy) = table.set::<T>() else {
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

    pub fn inert() -> Self {
        Self {
            handle: OwnedHandle::invalid(),
            strategy: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.strategy.is_some() && self.handle.is_valid()
    }

    pub fn raw(&self) -> NativeHandle {
        self.handle.raw()
    }

    fn live(&self) -> Option<(&dyn SetStrategy<T>, NativeHandle)> {
        match &self.strategy {
            Some(strategy) if self.handle.is_valid() => Some((strategy.as_ref(), self.handle.raw())),
            _ => None,
        }
    }

    pub fn size(&self) -> i64 {
        self.live().map_or(INVALID_SIZE, |(s, h)| s.size(h))
    }

    pub fn insert(&mut self, value: &T) -> bool {
        self.live().is_some_and(|(s, h)| s.insert(h, value))
    }

    pub fn contains(&self, value: &T) -> bool {
        self.live().is_some_and(|(s, h)| s.contains(h, value))
    }

    pub fn remove(&mut self, value: &T) -> bool {
        self.live().is_some_and(|(s, h)| s.remove(h, value))
    }

    pub fn release(&mut self) {
        self.handle.release();
    }
}

impl<T: 'static> fmt::Debug for NativeSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeSet")
            .field("native_type", &self.strategy.as_ref().map(|s| s.native_type()))
            .field("handle", &self.handle)
            .finish()
    }
}
