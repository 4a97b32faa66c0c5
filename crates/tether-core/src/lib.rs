//! Execution bridge between host code and a native AI-processing engine.
//!
//! This crate provides:
//! - Move-only ownership of opaque native handles
//! - Tagged-result unwrapping into typed errors
//! - Single-shot and threaded callback executors with a correlation store
//! - Strategy dispatch for native maps, sets and streams
//! - A node/edge graph with conditional, optional and looping edges

pub mod bridge;
pub mod collections;
pub mod config;
pub mod correlation;
pub mod error;
pub mod execute;
pub mod graph;
pub mod handle;
pub mod native;
pub mod registry;
pub mod status;
pub mod strategy;
pub mod stream;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use bridge::{Bridge, SymbolStatus, probe_engine};
pub use collections::{NativeMap, NativeSet};
pub use config::BridgeConfig;
pub use correlation::{CorrelationStore, ExecutionId, ExecutionIds, HOST_ID_BASE};
pub use error::{Error, Result};
pub use execute::{
    ArgOrder, Dispatcher, InlineDispatcher, NativeChannel, NativeDispatcher, SingleShotExecutor,
    ThreadedExecutor, WireValue,
};
pub use graph::{
    CustomNode, Edge, EdgeCondition, Graph, NativeNode, Node, NodeState, ProcessContext, RunReport,
};
pub use handle::{HandleRegistry, HandleStats, NativeHandle, OwnedHandle};
pub use native::{LibrarySymbols, NativeEngine, StaticSymbols};
pub use registry::{DataKind, DataKindChannels, DataKindRegistry};
pub use status::{StatusCode, StatusFns};
pub use strategy::{MapStrategy, SetStrategy, StrategyTable, StreamStrategy};
pub use stream::{CancellationContext, NativeStream};
