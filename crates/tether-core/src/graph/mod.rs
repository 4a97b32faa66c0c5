//! Node/edge graph execution.
//!
//! This module provides:
//! - The node lifecycle and processing contract
//! - Native nodes backed by engine handles, and custom nodes backed by
//!   threaded executors
//! - Edges with always / single-shot / threaded conditions, plus loop and
//!   optional modifiers
//! - A graph runtime that walks forward edges in topological order and
//!   re-enters loop targets
//!
//! Loop termination state lives in the edge (see [`Edge::repeat`]), so two
//! edges with the same kind of condition are independent state machines.

mod edge;
mod native_node;
mod node;
mod runtime;

pub use edge::{Edge, EdgeCondition};
pub use native_node::NativeNode;
pub use node::{CustomNode, Lifecycle, Node, NodeState, ProcessContext, ProcessingGuard};
pub use runtime::{DEFAULT_MAX_STEPS, Graph, RunReport};
