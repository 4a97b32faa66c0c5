//! The bridge: one native engine plus everything needed to talk to it.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::collections::{NativeMap, NativeSet};
use crate::config::BridgeConfig;
use crate::correlation::{CorrelationStore, ExecutionId, SlotOutput};
use crate::error::Result;
use crate::execute::{Dispatcher, InlineDispatcher, NativeDispatcher, ThreadedExecutor};
use crate::graph::{CustomNode, Graph, NativeNode};
use crate::handle::{HandleRegistry, HandleStats, NativeHandle};
use crate::native::NativeEngine;
use crate::strategy::{BUILTIN_OPS, StrategyTable};
use crate::stream::{CancellationContext, NativeStream};

/// Whether one engine entry point resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolStatus {
    pub symbol: String,
    pub native_type: &'static str,
    pub operation: &'static str,
    pub resolved: bool,
}

/// Entry point for host code.
///
/// Owns the engine, the handle registry every wrapper registers with, the
/// strategy table, and the dispatcher threaded executors run on.
pub struct Bridge {
    engine: Arc<NativeEngine>,
    handles: HandleRegistry,
    strategies: StrategyTable,
    dispatcher: Arc<dyn Dispatcher>,
    config: BridgeConfig,
}

impl Bridge {
    /// Load the engine library named by `config` (or `TETHER_LIBRARY`).
    pub fn load(mut config: BridgeConfig) -> Result<Self> {
        config.apply_env();
        config.validate()?;
        let engine = NativeEngine::load(config.engine_prefix.clone(), config.require_library()?)?;
        Ok(Self::with_engine(Arc::new(engine), config))
    }

    /// Build over an already constructed engine.
    pub fn with_engine(engine: Arc<NativeEngine>, config: BridgeConfig) -> Self {
        let strategies = StrategyTable::builtin(&engine);
        let dispatcher: Arc<dyn Dispatcher> =
            match NativeDispatcher::new(&engine, config.executor_arg_order) {
                Ok(native) => Arc::new(native),
                Err(e) => {
                    tracing::warn!("{}; threaded callbacks will run on the calling thread", e);
                    Arc::new(InlineDispatcher)
                }
            };
        tracing::info!(
            "bridge ready: {} ({} strategies)",
            engine.describe(),
            strategies.len()
        );

        Self {
            engine,
            handles: HandleRegistry::new(),
            strategies,
            dispatcher,
            config,
        }
    }

    pub fn engine(&self) -> &Arc<NativeEngine> {
        &self.engine
    }

    pub fn handles(&self) -> &HandleRegistry {
        &self.handles
    }

    pub fn handle_stats(&self) -> HandleStats {
        self.handles.stats()
    }

    pub fn strategies(&self) -> &StrategyTable {
        &self.strategies
    }

    /// For registering additional instantiations.
    pub fn strategies_mut(&mut self) -> &mut StrategyTable {
        &mut self.strategies
    }

    pub fn dispatcher(&self) -> &Arc<dyn Dispatcher> {
        &self.dispatcher
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn map<K: 'static, V: 'static>(&self) -> NativeMap<K, V> {
        NativeMap::new(&self.strategies, &self.handles)
    }

    pub fn set<T: 'static>(&self) -> NativeSet<T> {
        NativeSet::new(&self.strategies, &self.handles)
    }

    /// Adopt a stream handle the engine produced under `cancellation`.
    pub fn stream<T: 'static>(&self, raw: NativeHandle, cancellation: CancellationContext) -> NativeStream<T> {
        NativeStream::adopt(raw, &self.strategies, &self.handles, cancellation)
    }

    /// A new native cancellation context.
    pub fn cancellation(&self) -> Result<CancellationContext> {
        CancellationContext::native(&self.engine, &self.handles)
    }

    pub fn native_node(&self, id: impl Into<String>, kind: &str, config: &Value) -> Result<NativeNode> {
        NativeNode::create(&self.engine, &self.handles, id, kind, config)
    }

    /// A threaded executor whose store follows `strict_callbacks`.
    pub fn threaded_executor<I, O>(
        &self,
        name: impl Into<String>,
        func: impl Fn(ExecutionId, &[I]) -> SlotOutput<O> + Send + Sync + 'static,
    ) -> ThreadedExecutor<I, O>
    where
        I: Clone + Send + Sync + 'static,
        O: Send + Sync + 'static,
    {
        let store = if self.config.strict_callbacks {
            CorrelationStore::strict()
        } else {
            CorrelationStore::new()
        };
        ThreadedExecutor::with_store(name, Arc::new(store), func)
    }

    /// A custom node run on the bridge's dispatcher.
    pub fn custom_node(
        &self,
        id: impl Into<String>,
        func: impl Fn(&[Value]) -> std::result::Result<Value, String> + Send + Sync + 'static,
    ) -> CustomNode {
        let id = id.into();
        let executor = self.threaded_executor(id.clone(), move |_, inputs: &[Value]| func(inputs));
        CustomNode::from_executor(id, executor, self.dispatcher.clone())
    }

    /// An empty graph bounded by `max_graph_steps`.
    pub fn graph(&self) -> Graph {
        Graph::new().with_max_steps(self.config.max_graph_steps)
    }

    /// Check every entry point the built-ins rely on.
    pub fn probe(&self) -> Vec<SymbolStatus> {
        probe_engine(&self.engine)
    }
}

/// Check every entry point the built-ins rely on, without building a bridge.
pub fn probe_engine(engine: &NativeEngine) -> Vec<SymbolStatus> {
    BUILTIN_OPS
        .iter()
        .flat_map(|ops| {
            ops.operations.iter().map(move |&operation| SymbolStatus {
                symbol: engine.symbol_name(ops.native_type, operation),
                native_type: ops.native_type,
                operation,
                resolved: engine.has_symbol(ops.native_type, operation),
            })
        })
        .collect()
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("engine", &self.engine)
            .field("strategies", &self.strategies)
            .field("handles", &self.handles.stats())
            .finish()
    }
}
