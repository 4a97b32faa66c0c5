//! Node lifecycle and the processing contract.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use serde_json::Value;

use crate::correlation::ExecutionIds;
use crate::error::{Error, Result};
use crate::execute::{Dispatcher, ThreadedExecutor};
use crate::stream::CancellationContext;

/// `Uninitialized → Valid → (Processing)* → Invalid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Uninitialized,
    Valid,
    Processing,
    /// Released; terminal.
    Invalid,
}

impl NodeState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Uninitialized,
            1 => Self::Valid,
            2 => Self::Processing,
            _ => Self::Invalid,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Uninitialized => 0,
            Self::Valid => 1,
            Self::Processing => 2,
            Self::Invalid => 3,
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Valid => write!(f, "valid"),
            Self::Processing => write!(f, "processing"),
            Self::Invalid => write!(f, "invalid"),
        }
    }
}

/// Atomic node state with checked transitions.
#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
}

/// Returns the node to `Valid` when processing ends.
pub struct ProcessingGuard<'a> {
    lifecycle: &'a Lifecycle,
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        // A release during processing wins; only Processing goes back to Valid.
        let _ = self.lifecycle.state.compare_exchange(
            NodeState::Processing.as_u8(),
            NodeState::Valid.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

impl Lifecycle {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(0),
        }
    }

    pub fn state(&self) -> NodeState {
        NodeState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// `Uninitialized → Valid`, once the node's resources exist.
    pub fn mark_valid(&self) {
        let _ = self.state.compare_exchange(
            NodeState::Uninitialized.as_u8(),
            NodeState::Valid.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// `Valid → Processing` for the lifetime of the returned guard.
    ///
    /// Overlapping calls on one node are a caller error and are reported
    /// rather than serialized.
    pub fn begin(&self, node_id: &str) -> Result<ProcessingGuard<'_>> {
        match self.state.compare_exchange(
            NodeState::Valid.as_u8(),
            NodeState::Processing.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Ok(ProcessingGuard { lifecycle: self }),
            Err(actual) => {
                let state = NodeState::from_u8(actual);
                tracing::error!("node '{}' cannot process while {}", node_id, state);
                Err(Error::InvalidOperation(format!(
                    "node '{}' cannot process while {}",
                    node_id, state
                )))
            }
        }
    }

    /// Enter the terminal state. Returns whether this call did the transition.
    pub fn invalidate(&self) -> bool {
        self.state.swap(NodeState::Invalid.as_u8(), Ordering::AcqRel) != NodeState::Invalid.as_u8()
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-run context handed to every `process` call.
#[derive(Debug, Clone, Default)]
pub struct ProcessContext {
    cancellation: CancellationContext,
}

impl ProcessContext {
    pub fn new(cancellation: CancellationContext) -> Self {
        Self { cancellation }
    }

    pub fn cancellation(&self) -> &CancellationContext {
        &self.cancellation
    }

    /// `Err(Cancelled)` once the run has been cancelled.
    pub fn check(&self) -> Result<()> {
        if self.cancellation.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// A processing unit in a graph.
///
/// `process` is synchronous from the caller's side even when the work runs
/// on native worker threads.
pub trait Node: Send + Sync {
    fn id(&self) -> &str;

    fn state(&self) -> NodeState;

    fn process(&self, ctx: &ProcessContext, inputs: &[Value]) -> Result<Value>;

    /// Release the node's resources. Idempotent.
    fn release(&self);
}

/// A node whose logic is a host function run through a threaded executor.
pub struct CustomNode {
    id: String,
    lifecycle: Lifecycle,
    executor: ThreadedExecutor<Value, Value>,
    dispatcher: Arc<dyn Dispatcher>,
    ids: ExecutionIds,
}

impl CustomNode {
    pub fn new(
        id: impl Into<String>,
        dispatcher: Arc<dyn Dispatcher>,
        func: impl Fn(&[Value]) -> std::result::Result<Value, String> + Send + Sync + 'static,
    ) -> Self {
        let id = id.into();
        let executor = ThreadedExecutor::new(id.clone(), move |_, inputs: &[Value]| func(inputs));
        Self::from_executor(id, executor, dispatcher)
    }

    /// Wrap an existing executor, e.g. one over a strict store.
    pub fn from_executor(
        id: impl Into<String>,
        executor: ThreadedExecutor<Value, Value>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        let lifecycle = Lifecycle::new();
        lifecycle.mark_valid();
        Self {
            id: id.into(),
            lifecycle,
            executor,
            dispatcher,
            ids: ExecutionIds::new(),
        }
    }

    pub fn executor(&self) -> &ThreadedExecutor<Value, Value> {
        &self.executor
    }
}

impl Node for CustomNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn state(&self) -> NodeState {
        self.lifecycle.state()
    }

    fn process(&self, ctx: &ProcessContext, inputs: &[Value]) -> Result<Value> {
        let _processing = self.lifecycle.begin(&self.id)?;
        ctx.check()?;
        self.executor
            .invoke(self.ids.next(), inputs.to_vec(), self.dispatcher.as_ref())
    }

    fn release(&self) {
        if self.lifecycle.invalidate() {
            tracing::debug!("custom node '{}' released", self.id);
        }
    }
}

impl fmt::Debug for CustomNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomNode")
            .field("id", &self.id)
            .field("state", &self.lifecycle.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execute::InlineDispatcher;
    use serde_json::json;
    use std::sync::Barrier;
    use std::time::Duration;

    fn adder() -> CustomNode {
        CustomNode::new("add", Arc::new(InlineDispatcher), |inputs| {
            let sum: i64 = inputs.iter().filter_map(Value::as_i64).sum();
            Ok(json!(sum))
        })
    }

    #[test]
    fn test_custom_node_process() {
        let node = adder();
        assert_eq!(node.state(), NodeState::Valid);

        let out = node
            .process(&ProcessContext::default(), &[json!(2), json!(40)])
            .unwrap();
        assert_eq!(out, json!(42));
        assert_eq!(node.state(), NodeState::Valid);
    }

    #[test]
    fn test_released_node_rejects_process() {
        let node = adder();
        node.release();
        node.release();
        assert_eq!(node.state(), NodeState::Invalid);

        let result = node.process(&ProcessContext::default(), &[json!(1)]);
        assert!(matches!(result, Err(Error::InvalidOperation(_))));
        assert_eq!(node.executor().invocations(), 0);
    }

    #[test]
    fn test_cancelled_context() {
        let node = adder();
        let cancel = CancellationContext::local();
        cancel.cancel();

        let result = node.process(&ProcessContext::new(cancel), &[json!(1)]);
        assert!(matches!(result, Err(Error::Cancelled)));
        // The guard put the node back.
        assert_eq!(node.state(), NodeState::Valid);
    }

    #[test]
    fn test_overlapping_process_is_reported() {
        let barrier = Arc::new(Barrier::new(2));
        let inner = barrier.clone();
        let node = Arc::new(CustomNode::new("slow", Arc::new(InlineDispatcher), move |_| {
            inner.wait();
            std::thread::sleep(Duration::from_millis(50));
            Ok(Value::Null)
        }));

        let background = node.clone();
        let worker =
            std::thread::spawn(move || background.process(&ProcessContext::default(), &[]));

        barrier.wait();
        let overlapping = node.process(&ProcessContext::default(), &[]);
        assert!(matches!(overlapping, Err(Error::InvalidOperation(_))));
        assert!(worker.join().unwrap().is_ok());
    }

    #[test]
    fn test_lifecycle_transitions() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), NodeState::Uninitialized);
        assert!(lifecycle.begin("n").is_err());

        lifecycle.mark_valid();
        {
            let _guard = lifecycle.begin("n").unwrap();
            assert_eq!(lifecycle.state(), NodeState::Processing);
        }
        assert_eq!(lifecycle.state(), NodeState::Valid);

        assert!(lifecycle.invalidate());
        assert!(!lifecycle.invalidate());
        lifecycle.mark_valid();
        assert_eq!(lifecycle.state(), NodeState::Invalid);
    }
}
