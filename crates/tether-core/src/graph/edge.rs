//! Edges and their traversal conditions.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::Value;

use crate::correlation::ExecutionIds;
use crate::error::Result;
use crate::execute::{Dispatcher, SingleShotExecutor, ThreadedExecutor};

/// When an edge may be traversed, given the source node's last output.
#[derive(Clone)]
pub enum EdgeCondition {
    Always,
    /// Evaluated inline through a single-shot executor.
    Sync(SingleShotExecutor<Value, bool>),
    /// Evaluated through a threaded executor on `dispatcher`.
    Threaded {
        executor: ThreadedExecutor<Value, bool>,
        dispatcher: Arc<dyn Dispatcher>,
    },
}

impl fmt::Debug for EdgeCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => write!(f, "Always"),
            Self::Sync(executor) => write!(f, "Sync({})", executor.name()),
            Self::Threaded { executor, .. } => write!(f, "Threaded({})", executor.name()),
        }
    }
}

/// A directed connection between two nodes.
///
/// `looping` edges may point backwards (or at their own source) and re-enter
/// their target when they fire. `optional` edges never abort a run: a false
/// or failing condition still activates the target, without a value.
#[derive(Debug)]
pub struct Edge {
    from: String,
    to: String,
    condition: EdgeCondition,
    looping: bool,
    optional: bool,
    ids: ExecutionIds,
    /// Evaluation count of a `repeat` edge.
    evaluations: Option<Arc<AtomicUsize>>,
}

impl Edge {
    /// An unconditional forward edge.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: EdgeCondition::Always,
            looping: false,
            optional: false,
            ids: ExecutionIds::new(),
            evaluations: None,
        }
    }

    pub fn when(mut self, condition: SingleShotExecutor<Value, bool>) -> Self {
        self.condition = EdgeCondition::Sync(condition);
        self
    }

    pub fn when_threaded(
        mut self,
        condition: ThreadedExecutor<Value, bool>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        self.condition = EdgeCondition::Threaded {
            executor: condition,
            dispatcher,
        };
        self
    }

    /// Mark as a back-edge, excluded from cycle detection.
    pub fn looping(mut self) -> Self {
        self.looping = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// A loop edge that fires on evaluations `1..times` and falls through on
    /// evaluation `times`, then starts counting again.
    ///
    /// The counter belongs to this edge alone and is re-armed by
    /// [`Edge::reset`] at the start of every graph run.
    pub fn repeat(mut self, times: usize) -> Self {
        let name = format!("{} -> {} x{}", self.from, self.to, times);
        let evaluations = Arc::new(AtomicUsize::new(0));
        self.evaluations = Some(evaluations.clone());
        let counter = SingleShotExecutor::new(name, move |_: &Value| {
            let n = evaluations.fetch_add(1, Ordering::AcqRel) + 1;
            if n >= times {
                evaluations.store(0, Ordering::Release);
                false
            } else {
                true
            }
        });
        self.when(counter).looping()
    }

    pub fn from(&self) -> &str {
        &self.from
    }

    pub fn to(&self) -> &str {
        &self.to
    }

    pub fn condition(&self) -> &EdgeCondition {
        &self.condition
    }

    pub fn is_loop(&self) -> bool {
        self.looping
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Forget evaluations left over from an earlier, possibly aborted, run.
    pub fn reset(&self) {
        if let Some(evaluations) = &self.evaluations {
            evaluations.store(0, Ordering::Release);
        }
    }

    /// Evaluate the condition against the source's last output.
    pub fn evaluate(&self, value: &Value) -> Result<bool> {
        match &self.condition {
            EdgeCondition::Always => Ok(true),
            EdgeCondition::Sync(executor) => executor.call_native(value),
            EdgeCondition::Threaded {
                executor,
                dispatcher,
            } => executor.invoke(self.ids.next(), vec![value.clone()], dispatcher.as_ref()),
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::execute::InlineDispatcher;
    use serde_json::json;

    #[test]
    fn test_repeat_counts_per_edge() {
        let a = Edge::new("n", "n").repeat(3);
        let b = Edge::new("m", "m").repeat(3);
        assert!(a.is_loop());

        let fired: Vec<bool> = (0..3).map(|_| a.evaluate(&Value::Null).unwrap()).collect();
        assert_eq!(fired, vec![true, true, false]);

        // `b` has seen nothing yet.
        assert!(b.evaluate(&Value::Null).unwrap());

        // `a` re-armed after falling through.
        assert!(a.evaluate(&Value::Null).unwrap());
    }

    #[test]
    fn test_reset_rearms_repeat() {
        let edge = Edge::new("n", "n").repeat(3);
        assert!(edge.evaluate(&Value::Null).unwrap());
        assert!(edge.evaluate(&Value::Null).unwrap());

        edge.reset();
        let fired: Vec<bool> = (0..3).map(|_| edge.evaluate(&Value::Null).unwrap()).collect();
        assert_eq!(fired, vec![true, true, false]);

        // Plain edges have nothing to reset.
        Edge::new("a", "b").reset();
    }

    #[test]
    fn test_sync_condition() {
        let positive = SingleShotExecutor::new("positive", |v: &Value| v.as_i64().is_some_and(|n| n > 0));
        let edge = Edge::new("a", "b").when(positive);
        assert!(edge.evaluate(&json!(5)).unwrap());
        assert!(!edge.evaluate(&json!(-5)).unwrap());
    }

    #[test]
    fn test_threaded_condition() {
        let long = ThreadedExecutor::new("long", |_, inputs: &[Value]| {
            let text = inputs.first().and_then(Value::as_str).ok_or("expected text")?;
            Ok(text.len() > 3)
        });
        let edge = Edge::new("a", "b").when_threaded(long, Arc::new(InlineDispatcher));

        assert!(edge.evaluate(&json!("long enough")).unwrap());
        assert!(!edge.evaluate(&json!("no")).unwrap());
        assert!(matches!(edge.evaluate(&json!(1)), Err(Error::Callback(_))));
    }

    #[test]
    fn test_display() {
        assert_eq!(Edge::new("stt", "llm").optional().to_string(), "stt -> llm");
    }
}
