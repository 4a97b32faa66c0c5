//! Nodes implemented by the native engine.

use std::ffi::c_char;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use serde_json::Value;

use crate::error::{Error, Result};
use crate::handle::{HandleRegistry, NativeHandle, OwnedHandle, ReleaseFn};
use crate::native::{NativeEngine, StringFns, to_cstring};
use crate::status::{StatusFns, unwrap_with};

use super::node::{Lifecycle, Node, NodeState, ProcessContext};

/// `Node_create(kind, config_json)`; null on failure.
type NodeCreateFn = unsafe extern "C" fn(*const c_char, *const c_char) -> NativeHandle;
/// `Node_process(node, cancellation, inputs_json)`; returns a `NodeResult`.
type NodeProcessFn = unsafe extern "C" fn(NativeHandle, NativeHandle, *const c_char) -> NativeHandle;

#[derive(Debug, Clone, Copy)]
struct NodeFns {
    process: NodeProcessFn,
    result: StatusFns,
    strings: StringFns,
}

/// An engine node. Inputs and outputs cross the boundary as JSON text.
pub struct NativeNode {
    id: String,
    kind: String,
    lifecycle: Lifecycle,
    handle: Mutex<OwnedHandle>,
    fns: NodeFns,
}

impl NativeNode {
    /// Construct an engine node of `kind` with the given configuration.
    pub fn create(
        engine: &NativeEngine,
        handles: &HandleRegistry,
        id: impl Into<String>,
        kind: &str,
        config: &Value,
    ) -> Result<Self> {
        let id = id.into();
        let (create, delete, fns) = unsafe {
            let create: NodeCreateFn = engine.resolve("Node", "create")?;
            let delete: ReleaseFn = engine.resolve("Node", "delete")?;
            let fns = NodeFns {
                process: engine.resolve("Node", "process")?,
                result: engine.status_fns("NodeResult")?,
                strings: engine.string_fns()?,
            };
            (create, delete, fns)
        };

        let kind_c = to_cstring(kind)?;
        let config_c = to_cstring(&serde_json::to_string(config)?)?;
        let handle = handles.register(unsafe { create(kind_c.as_ptr(), config_c.as_ptr()) }, delete);
        if !handle.is_valid() {
            return Err(Error::InvalidHandle(format!(
                "engine could not create node '{}' of kind '{}'",
                id, kind
            )));
        }

        let lifecycle = Lifecycle::new();
        lifecycle.mark_valid();
        tracing::debug!("native node '{}' ({}) created as {}", id, kind, handle.raw());

        Ok(Self {
            id,
            kind: kind.to_string(),
            lifecycle,
            handle: Mutex::new(handle),
            fns,
        })
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }
}

impl Node for NativeNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn state(&self) -> NodeState {
        self.lifecycle.state()
    }

    fn process(&self, ctx: &ProcessContext, inputs: &[Value]) -> Result<Value> {
        let _processing = self.lifecycle.begin(&self.id)?;
        ctx.check()?;

        let handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if !handle.is_valid() {
            return Err(Error::InvalidHandle(format!("node '{}' is released", self.id)));
        }

        let payload = to_cstring(&serde_json::to_string(inputs)?)?;
        let tagged = unsafe {
            (self.fns.process)(handle.raw(), ctx.cancellation().raw(), payload.as_ptr())
        };
        let text = unwrap_with(tagged, &self.fns.result, |value| {
            self.fns
                .strings
                .take(value)
                .ok_or_else(|| Error::InvalidHandle(format!("node '{}' returned no output", self.id)))
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    fn release(&self) {
        if self.lifecycle.invalidate() {
            tracing::debug!("native node '{}' released", self.id);
        }
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .release();
    }
}

impl fmt::Debug for NativeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeNode")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.lifecycle.state())
            .finish()
    }
}
