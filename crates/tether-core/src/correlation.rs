//! Execution correlation store.
//!
//! Native callbacks only receive primitive arguments and have no channel
//! back to the logical caller, which may be blocked on another thread. The
//! store is the rendezvous between the two: the caller deposits inputs
//! under an execution id, the callback (invoked with just that id) reads
//! them and deposits its output under the same id, and the caller reads the
//! output back.
//!
//! ```text
//! caller                    store                     callback (worker thread)
//!   │ set_input(id, a) ───►  slot[id].inputs = [a]
//!   │ invoke(id) ───────────────────────────────────►  inputs(id) → [a]
//!   │                        slot[id].output = Ok(b) ◄─ set_output(id, Ok(b))
//!   │ take_output(id) ◄────  slot[id] removed
//! ```
//!
//! The native side drives the same protocol through the entries of a
//! [`NativeChannel`](crate::execute::NativeChannel), choosing ids below
//! [`HOST_ID_BASE`]. Ids the host allocates itself start at that base, so
//! the two directions never share a slot.
//!
//! Slots for different ids never interact. A single id is a rendezvous,
//! not a queue: it carries one invocation at a time.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::error::{Error, Result};

/// First id of the range [`ExecutionIds`] allocates from. Lower ids belong
/// to the native engine.
pub const HOST_ID_BASE: u64 = 1 << 63;

/// Identifies one logical in-flight invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExecutionId(u64);

impl ExecutionId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Whether this id lies in the host-allocated range.
    pub const fn is_host(&self) -> bool {
        self.0 >= HOST_ID_BASE
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exec_{}", self.0)
    }
}

/// Allocates fresh execution ids for host-driven invocations.
#[derive(Debug)]
pub struct ExecutionIds {
    next: AtomicU64,
}

impl ExecutionIds {
    /// Allocate from [`HOST_ID_BASE`] upwards.
    pub const fn new() -> Self {
        Self::starting_at(HOST_ID_BASE)
    }

    /// Start allocating at `first`.
    pub const fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    pub fn next(&self) -> ExecutionId {
        ExecutionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ExecutionIds {
    fn default() -> Self {
        Self::new()
    }
}

/// Output of one invocation: a value, or the reason the callback failed.
pub type SlotOutput<O> = std::result::Result<O, String>;

struct Slot<I, O> {
    inputs: Vec<I>,
    output: Option<SlotOutput<O>>,
}

impl<I, O> Slot<I, O> {
    fn empty() -> Self {
        Self {
            inputs: Vec::new(),
            output: None,
        }
    }
}

/// Id-indexed input/output slots shared by callers and callbacks.
pub struct CorrelationStore<I, O> {
    slots: DashMap<u64, Slot<I, O>>,
    /// Panic on contract violations instead of reporting them.
    strict: bool,
}

impl<I, O> CorrelationStore<I, O> {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
            strict: false,
        }
    }

    /// A store that panics on protocol misuse, for debugging callback code.
    pub fn strict() -> Self {
        Self {
            slots: DashMap::new(),
            strict: true,
        }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Begin a cycle for `id` with no inputs yet.
    ///
    /// Any previous slot for `id` is replaced.
    pub fn open(&self, id: ExecutionId) {
        if self.slots.insert(id.0, Slot::empty()).is_some() {
            tracing::debug!("{} reopened; previous slot replaced", id);
        }
    }

    /// Append an input for `id`, creating the slot on first write.
    ///
    /// If the slot still holds an unread output from a previous cycle, that
    /// output is discarded and a new cycle begins.
    pub fn set_input(&self, id: ExecutionId, value: I) {
        let mut slot = self.slots.entry(id.0).or_insert_with(Slot::empty);
        if slot.output.is_some() {
            tracing::warn!("{} reused before its output was read; discarding stale output", id);
            *slot = Slot::empty();
        }
        slot.inputs.push(value);
    }

    /// Number of inputs pending for `id`.
    pub fn input_count(&self, id: ExecutionId) -> usize {
        self.slots.get(&id.0).map_or(0, |slot| slot.inputs.len())
    }

    /// Write the output for `id`.
    ///
    /// Fails if no input is pending for `id` or an output was already
    /// written in this cycle.
    pub fn set_output(&self, id: ExecutionId, output: SlotOutput<O>) -> Result<()> {
        match self.slots.entry(id.0) {
            Entry::Vacant(_) => self.violation(format!("output written for {} with no pending input", id)),
            Entry::Occupied(mut entry) => {
                let slot = entry.get_mut();
                if slot.output.is_some() {
                    return self.violation(format!("output for {} written twice", id));
                }
                slot.output = Some(output);
                Ok(())
            }
        }
    }

    /// Read back the output for `id` and remove its slot.
    ///
    /// A callback failure comes back as [`Error::Callback`]; a missing
    /// output is a contract violation, never a stale value.
    pub fn take_output(&self, id: ExecutionId) -> Result<O> {
        let has_output = self
            .slots
            .get(&id.0)
            .is_some_and(|slot| slot.output.is_some());
        if !has_output {
            return self.violation(format!("no output available for {}", id));
        }

        match self.slots.remove(&id.0).and_then(|(_, slot)| slot.output) {
            Some(Ok(value)) => Ok(value),
            Some(Err(reason)) => Err(Error::Callback(reason)),
            None => self.violation(format!("output for {} vanished during read-back", id)),
        }
    }

    /// Read back a successful output for `id`, leaving anything else in place.
    ///
    /// Unlike [`take_output`](Self::take_output) a miss is not a violation:
    /// the native side polls with this after its callback returns.
    pub fn take_ok(&self, id: ExecutionId) -> Option<O> {
        let (_, slot) = self
            .slots
            .remove_if(&id.0, |_, slot| matches!(slot.output, Some(Ok(_))))?;
        slot.output.and_then(|output| output.ok())
    }

    /// Read back the failure reason for `id`, leaving anything else in place.
    pub fn take_err(&self, id: ExecutionId) -> Option<String> {
        let (_, slot) = self
            .slots
            .remove_if(&id.0, |_, slot| matches!(slot.output, Some(Err(_))))?;
        slot.output.and_then(|output| output.err())
    }

    /// Drop the slot for `id` regardless of its state.
    pub fn evict(&self, id: ExecutionId) -> bool {
        self.slots.remove(&id.0).is_some()
    }

    /// Number of live slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&self) {
        self.slots.clear();
    }

    fn violation<T>(&self, message: String) -> Result<T> {
        tracing::error!("correlation contract violated: {}", message);
        if self.strict {
            panic!("correlation contract violated: {}", message);
        }
        Err(Error::CallbackContract(message))
    }
}

impl<I: Clone, O> CorrelationStore<I, O> {
    /// All inputs for `id`, in the order they were set.
    pub fn inputs(&self, id: ExecutionId) -> Result<Vec<I>> {
        match self.slots.get(&id.0) {
            Some(slot) => Ok(slot.inputs.clone()),
            None => self.violation(format!("no invocation pending for {}", id)),
        }
    }

    /// The first input for `id`.
    pub fn input(&self, id: ExecutionId) -> Result<I> {
        match self.slots.get(&id.0).and_then(|slot| slot.inputs.first().cloned()) {
            Some(value) => Ok(value),
            None => self.violation(format!("no input pending for {}", id)),
        }
    }
}

impl<I, O> Default for CorrelationStore<I, O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I, O> fmt::Debug for CorrelationStore<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrelationStore")
            .field("slots", &self.slots.len())
            .field("strict", &self.strict)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};

    #[test]
    fn test_round_trip() {
        let store: CorrelationStore<String, String> = CorrelationStore::new();
        let id = ExecutionId::new(1);

        store.set_input(id, "in".to_string());
        assert_eq!(store.input(id).unwrap(), "in");
        store.set_output(id, Ok("out".to_string())).unwrap();

        assert_eq!(store.take_output(id).unwrap(), "out");
        assert!(store.is_empty());
    }

    #[test]
    fn test_inputs_read_many() {
        let store: CorrelationStore<i32, i32> = CorrelationStore::new();
        let id = ExecutionId::new(2);
        store.set_input(id, 1);
        store.set_input(id, 2);

        assert_eq!(store.inputs(id).unwrap(), vec![1, 2]);
        assert_eq!(store.inputs(id).unwrap(), vec![1, 2]);
        assert_eq!(store.input_count(id), 2);
    }

    #[test]
    fn test_open_without_inputs() {
        let store: CorrelationStore<i32, i32> = CorrelationStore::new();
        let id = ExecutionId::new(8);
        store.open(id);

        assert!(store.inputs(id).unwrap().is_empty());
        assert!(matches!(store.input(id), Err(Error::CallbackContract(_))));
        store.set_output(id, Ok(3)).unwrap();
        assert_eq!(store.take_output(id).unwrap(), 3);
    }

    #[test]
    fn test_output_without_input_is_violation() {
        let store: CorrelationStore<i32, i32> = CorrelationStore::new();
        let result = store.set_output(ExecutionId::new(3), Ok(1));
        assert!(matches!(result, Err(Error::CallbackContract(_))));
    }

    #[test]
    fn test_double_output_is_violation() {
        let store: CorrelationStore<i32, i32> = CorrelationStore::new();
        let id = ExecutionId::new(4);
        store.set_input(id, 0);
        store.set_output(id, Ok(1)).unwrap();

        assert!(matches!(store.set_output(id, Ok(2)), Err(Error::CallbackContract(_))));
        // The first write wins.
        assert_eq!(store.take_output(id).unwrap(), 1);
    }

    #[test]
    fn test_missing_output_is_violation_not_stale() {
        let store: CorrelationStore<i32, i32> = CorrelationStore::new();
        let id = ExecutionId::new(5);
        store.set_input(id, 0);
        store.set_output(id, Ok(10)).unwrap();
        store.take_output(id).unwrap();

        // Reading again must not return the previous value.
        assert!(matches!(store.take_output(id), Err(Error::CallbackContract(_))));
    }

    #[test]
    fn test_callback_error_surfaces() {
        let store: CorrelationStore<i32, i32> = CorrelationStore::new();
        let id = ExecutionId::new(6);
        store.set_input(id, 0);
        store.set_output(id, Err("bad input".to_string())).unwrap();

        match store.take_output(id) {
            Err(Error::Callback(reason)) => assert_eq!(reason, "bad input"),
            other => panic!("expected callback error, got {:?}", other),
        }
    }

    #[test]
    fn test_reuse_discards_unread_output() {
        let store: CorrelationStore<i32, i32> = CorrelationStore::new();
        let id = ExecutionId::new(7);
        store.set_input(id, 1);
        store.set_output(id, Ok(100)).unwrap();

        store.set_input(id, 2);
        assert_eq!(store.inputs(id).unwrap(), vec![2]);
        assert!(matches!(store.take_output(id), Err(Error::CallbackContract(_))));
    }

    #[test]
    fn test_isolation_between_ids() {
        let store: CorrelationStore<&str, &str> = CorrelationStore::new();
        let a = ExecutionId::new(10);
        let b = ExecutionId::new(11);

        store.set_input(a, "A");
        store.set_input(b, "B");
        store.set_output(a, Ok("a-out")).unwrap();

        assert_eq!(store.take_output(a).unwrap(), "a-out");
        assert_eq!(store.input(b).unwrap(), "B");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_concurrent_ids_never_cross() {
        let store: Arc<CorrelationStore<u64, u64>> = Arc::new(CorrelationStore::new());
        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads as u64)
            .map(|t| {
                let store = store.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    for round in 0..200u64 {
                        let id = ExecutionId::new(t * 1_000 + round);
                        store.set_input(id, id.as_u64());
                        let seen = store.input(id).unwrap();
                        assert_eq!(seen, id.as_u64());
                        store.set_output(id, Ok(seen * 2)).unwrap();
                        assert_eq!(store.take_output(id).unwrap(), id.as_u64() * 2);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(store.is_empty());
    }

    #[test]
    #[should_panic(expected = "correlation contract violated")]
    fn test_strict_store_panics() {
        let store: CorrelationStore<i32, i32> = CorrelationStore::strict();
        let _ = store.take_output(ExecutionId::new(99));
    }

    #[test]
    fn test_take_ok_and_err_leave_other_outcomes() {
        let store: CorrelationStore<i32, i32> = CorrelationStore::strict();
        let good = ExecutionId::new(20);
        let bad = ExecutionId::new(21);
        store.set_input(good, 1);
        store.set_input(bad, 2);

        // Nothing written yet: a miss, not a violation.
        assert_eq!(store.take_ok(good), None);
        assert_eq!(store.take_err(good), None);

        store.set_output(good, Ok(10)).unwrap();
        store.set_output(bad, Err("rejected".to_string())).unwrap();

        assert_eq!(store.take_err(good), None);
        assert_eq!(store.take_ok(bad), None);
        assert_eq!(store.take_ok(good), Some(10));
        assert_eq!(store.take_err(bad).as_deref(), Some("rejected"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_execution_ids() {
        let ids = ExecutionIds::starting_at(100);
        assert_eq!(ids.next(), ExecutionId::new(100));
        assert_eq!(ids.next(), ExecutionId::new(101));
        assert_eq!(ExecutionId::new(7).to_string(), "exec_7");
    }

    #[test]
    fn test_host_ids_stay_out_of_native_range() {
        let ids = ExecutionIds::new();
        let first = ids.next();
        assert_eq!(first.as_u64(), HOST_ID_BASE);
        assert!(first.is_host());
        assert!(ids.next().is_host());
        assert!(!ExecutionId::new(7).is_host());
        assert!(!ExecutionId::new(HOST_ID_BASE - 1).is_host());
    }
}
