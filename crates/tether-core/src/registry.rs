//! Custom data-kind registry.
//!
//! The engine serializes values of custom kinds by calling back into the
//! host: each kind has a deserializer (text to value) and a serializer
//! (value to text), both threaded executors addressed by execution id.
//! Kinds are looked up by name; an unknown name is an error, not a crash.
//!
//! Conversions run in either direction: the host calls
//! [`DataKindRegistry::deserialize`] and friends, while the engine drives
//! the [`NativeChannel`]s from [`DataKindRegistry::callbacks`] with ids of
//! its own choosing.

use std::sync::{Arc, LazyLock, Mutex, PoisonError, RwLock};

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::correlation::ExecutionIds;
use crate::error::{Error, Result};
use crate::execute::{Dispatcher, InlineDispatcher, NativeChannel, ThreadedExecutor};

/// One registered kind: its (deserializer, serializer) executors.
#[derive(Debug, Clone)]
pub struct DataKind {
    pub name: String,
    pub deserializer: ThreadedExecutor<String, Value>,
    pub serializer: ThreadedExecutor<Value, String>,
}

/// Channels handed to the engine for one kind.
#[derive(Debug, Clone, Copy)]
pub struct DataKindChannels {
    pub deserializer: NativeChannel,
    pub serializer: NativeChannel,
}

/// Name-keyed registry of custom data kinds.
pub struct DataKindRegistry {
    kinds: RwLock<FxHashMap<String, Arc<DataKind>>>,
    /// Replaced kinds; the engine may still hold their channels.
    retired: Mutex<Vec<Arc<DataKind>>>,
    ids: ExecutionIds,
    dispatcher: Arc<dyn Dispatcher>,
}

static GLOBAL: LazyLock<DataKindRegistry> = LazyLock::new(DataKindRegistry::new);

impl DataKindRegistry {
    /// Registry whose host-side conversions run on the calling thread.
    pub fn new() -> Self {
        Self::with_dispatcher(Arc::new(InlineDispatcher))
    }

    pub fn with_dispatcher(dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            kinds: RwLock::new(FxHashMap::default()),
            retired: Mutex::new(Vec::new()),
            ids: ExecutionIds::new(),
            dispatcher,
        }
    }

    /// Process-wide registry consulted by graph compilation.
    pub fn global() -> &'static DataKindRegistry {
        &GLOBAL
    }

    /// Register (or replace) a kind.
    ///
    /// A replaced kind stops serving host-side conversions but stays alive
    /// with the registry, so channels already given to the engine remain
    /// valid and keep running the old conversions.
    pub fn register(
        &self,
        name: impl Into<String>,
        deserialize: impl Fn(&str) -> std::result::Result<Value, String> + Send + Sync + 'static,
        serialize: impl Fn(&Value) -> std::result::Result<String, String> + Send + Sync + 'static,
    ) {
        let name = name.into();
        let kind = DataKind {
            deserializer: ThreadedExecutor::new(format!("{}::deserialize", name), move |_, inputs: &[String]| {
                let text = inputs.first().ok_or("no text to deserialize")?;
                deserialize(text)
            }),
            serializer: ThreadedExecutor::new(format!("{}::serialize", name), move |_, inputs: &[Value]| {
                let value = inputs.first().ok_or("no value to serialize")?;
                serialize(value)
            }),
            name: name.clone(),
        };

        let mut kinds = self.kinds.write().unwrap_or_else(PoisonError::into_inner);
        match kinds.insert(name.clone(), Arc::new(kind)) {
            Some(previous) => {
                tracing::warn!("data kind '{}' re-registered", name);
                self.retired
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(previous);
            }
            None => tracing::debug!("data kind '{}' registered", name),
        }
    }

    /// Number of replaced kinds kept alive for outstanding channels.
    pub fn retired(&self) -> usize {
        self.retired.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.kinds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .kinds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn get(&self, name: &str) -> Result<Arc<DataKind>> {
        self.kinds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| {
                let error = Error::UnregisteredType(format!("data kind '{}'", name));
                tracing::error!("{}", error);
                error
            })
    }

    /// Channels to hand to the engine for `name`.
    ///
    /// Their context pointers stay valid for the life of the registry, even
    /// if `name` is registered again. The engine picks its own execution ids,
    /// below [`HOST_ID_BASE`](crate::correlation::HOST_ID_BASE).
    pub fn callbacks(&self, name: &str) -> Result<DataKindChannels> {
        let kind = self.get(name)?;
        Ok(DataKindChannels {
            deserializer: kind.deserializer.channel(),
            serializer: kind.serializer.channel(),
        })
    }

    pub fn deserialize(&self, name: &str, text: &str) -> Result<Value> {
        let kind = self.get(name)?;
        kind.deserializer
            .invoke(self.ids.next(), vec![text.to_string()], self.dispatcher.as_ref())
    }

    pub fn serialize(&self, name: &str, value: &Value) -> Result<String> {
        let kind = self.get(name)?;
        kind.serializer
            .invoke(self.ids.next(), vec![value.clone()], self.dispatcher.as_ref())
    }
}

impl Default for DataKindRegistry {
    fn default() -> Self {
        Self::new()
    }
}
