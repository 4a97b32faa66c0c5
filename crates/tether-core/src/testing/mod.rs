//! An in-process fake engine.
//!
//! Exposes the full `fake_<Type>_<op>` surface through [`StaticSymbols`],
//! so bridges, strategies, executors and graphs can be exercised without a
//! shared library. Every object is tracked in one process-wide table that
//! records how often it was called and deleted.

mod fake;

use std::ffi::c_void;
use std::sync::Arc;

use crate::bridge::Bridge;
use crate::config::BridgeConfig;
use crate::error::{Error, Result};
use crate::execute::{ArgOrder, NativeChannel};
use crate::handle::NativeHandle;
use crate::native::{NativeEngine, StaticSymbols, StringFns, to_cstring};
use crate::status::{StatusCode, StatusFns, unwrap_with};

use fake::{Object, with_state};

/// Symbol prefix of the fake engine.
pub const PREFIX: &str = "fake";

/// The fake `Executor_run` takes the function before the context.
pub const EXECUTOR_ARG_ORDER: ArgOrder = ArgOrder::FunctionFirst;

/// Every entry point, keyed by its name without the prefix.
pub fn symbols() -> StaticSymbols {
    let table: &[(&str, *const c_void)] = &[
        ("String_data", fake::string_data as *const c_void),
        ("String_delete", fake::delete as *const c_void),
        ("StringStringMap_create", fake::map_create as *const c_void),
        ("StringStringMap_delete", fake::delete as *const c_void),
        ("StringStringMap_size", fake::map_size as *const c_void),
        ("StringStringMap_get", fake::map_get as *const c_void),
        ("StringStringMap_set", fake::map_set as *const c_void),
        ("StringStringMap_contains", fake::map_contains as *const c_void),
        ("StringStringMap_remove", fake::map_remove as *const c_void),
        ("StringSet_create", fake::set_create as *const c_void),
        ("StringSet_delete", fake::delete as *const c_void),
        ("StringSet_size", fake::set_size as *const c_void),
        ("StringSet_insert", fake::set_insert as *const c_void),
        ("StringSet_contains", fake::set_contains as *const c_void),
        ("StringSet_remove", fake::set_remove as *const c_void),
        ("StringStream_delete", fake::delete as *const c_void),
        ("StringStream_has_next", fake::stream_has_next as *const c_void),
        ("StringStream_read", fake::stream_read as *const c_void),
        ("StringResult_status", fake::tagged_status as *const c_void),
        ("StringResult_ok", fake::tagged_ok as *const c_void),
        ("StringResult_value", fake::tagged_value as *const c_void),
        ("StringResult_message", fake::tagged_message as *const c_void),
        ("StringResult_delete", fake::delete as *const c_void),
        ("NodeResult_status", fake::tagged_status as *const c_void),
        ("NodeResult_ok", fake::tagged_ok as *const c_void),
        ("NodeResult_value", fake::tagged_value as *const c_void),
        ("NodeResult_message", fake::tagged_message as *const c_void),
        ("NodeResult_delete", fake::delete as *const c_void),
        ("CancellationContext_create", fake::cancel_create as *const c_void),
        ("CancellationContext_delete", fake::delete as *const c_void),
        ("CancellationContext_cancel", fake::cancel_cancel as *const c_void),
        ("CancellationContext_is_cancelled", fake::cancel_is_cancelled as *const c_void),
        ("Node_create", fake::node_create as *const c_void),
        ("Node_delete", fake::delete as *const c_void),
        ("Node_process", fake::node_process as *const c_void),
        ("Executor_run", fake::executor_run as *const c_void),
        ("DataKind_convert", fake::data_kind_convert as *const c_void),
    ];

    let mut symbols = StaticSymbols::new("fake engine");
    for (name, function) in table {
        symbols.insert(format!("{}_{}", PREFIX, name), *function);
    }
    symbols
}

pub fn engine() -> Arc<NativeEngine> {
    Arc::new(NativeEngine::new(PREFIX, symbols()))
}

pub fn config() -> BridgeConfig {
    BridgeConfig {
        engine_prefix: PREFIX.to_string(),
        executor_arg_order: EXECUTOR_ARG_ORDER,
        ..BridgeConfig::default()
    }
}

/// A bridge over a fresh fake engine.
pub fn bridge() -> Bridge {
    Bridge::with_engine(engine(), config())
}

/// Node kinds `Node_create` accepts.
pub fn node_kinds() -> &'static [&'static str] {
    fake::NODE_KINDS
}

pub fn make_string(value: &str) -> NativeHandle {
    with_state(|s| s.string(value))
}

/// A successful `StringResult` holding a string.
pub fn make_ok_string(value: &str) -> NativeHandle {
    with_state(|s| {
        let inner = s.string(value);
        s.ok(inner)
    })
}

/// A failed `StringResult` with a raw status code.
pub fn make_failure(code: i32, message: &str) -> NativeHandle {
    with_state(|s| s.failure(StatusCode::from(code), message))
}

/// A `StringStream` over `items`, observing `cancel` (may be null).
pub fn make_stream(items: &[&str], cancel: NativeHandle) -> NativeHandle {
    let items = items.iter().map(|item| item.to_string()).collect();
    with_state(|s| s.alloc(Object::Stream { items, cancel }))
}

/// Cancel a cancellation context from the engine's side.
pub fn cancel_natively(handle: NativeHandle) {
    unsafe { fake::cancel_cancel(handle) }
}

pub fn is_cancelled(handle: NativeHandle) -> bool {
    with_state(|s| {
        matches!(
            s.slots.get(&handle.as_usize()).and_then(|slot| slot.object.as_ref()),
            Some(Object::Cancel(true))
        )
    })
}

/// Accessors for the fake `StringResult` type.
pub fn result_fns() -> StatusFns {
    StatusFns {
        status: fake::tagged_status,
        ok: fake::tagged_ok,
        value: fake::tagged_value,
        delete: fake::delete,
        message: Some(fake::tagged_message),
    }
}

/// Have the engine convert `text` through `channel` under its own `id`.
pub fn convert_natively(channel: &NativeChannel, id: u64, text: &str) -> Result<String> {
    let text = to_cstring(text)?;
    let tagged = unsafe { fake::data_kind_convert(channel, id, text.as_ptr()) };
    let strings = StringFns {
        data: fake::string_data,
        delete: fake::delete,
    };
    unwrap_with(tagged, &result_fns(), |value| {
        strings
            .take(value)
            .ok_or_else(|| Error::InvalidHandle("conversion produced no string".to_string()))
    })
}

/// Release function for fake strings.
pub unsafe extern "C" fn release_string(handle: NativeHandle) {
    unsafe { fake::delete(handle) }
}

/// Operations (other than deletion) made against `handle`.
pub fn call_count(handle: NativeHandle) -> usize {
    with_state(|s| s.slots.get(&handle.as_usize()).map_or(0, |slot| slot.calls))
}

pub fn delete_count(handle: NativeHandle) -> usize {
    with_state(|s| s.slots.get(&handle.as_usize()).map_or(0, |slot| slot.deletes))
}

/// Whether `handle` names an object that has not been deleted.
pub fn is_live(handle: NativeHandle) -> bool {
    with_state(|s| {
        s.slots
            .get(&handle.as_usize())
            .is_some_and(|slot| slot.object.is_some())
    })
}
