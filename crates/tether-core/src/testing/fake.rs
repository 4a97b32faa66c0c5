//! Entry points of the fake engine.
//!
//! Every function here is called across an `extern "C"` boundary and must
//! not panic. Objects live in one process-wide table; handle values are
//! never reused, so counters stay queryable after deletion.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::ffi::{CStr, CString, c_char, c_void};
use std::sync::{LazyLock, Mutex, PoisonError};

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::execute::{NativeChannel, ThreadedEntry};
use crate::handle::NativeHandle;
use crate::status::StatusCode;

pub(super) enum Object {
    Str(CString),
    Map(BTreeMap<String, String>),
    Set(BTreeSet<String>),
    Stream {
        items: VecDeque<String>,
        cancel: NativeHandle,
    },
    Tagged {
        code: i32,
        value: NativeHandle,
        message: CString,
    },
    Cancel(bool),
    Node {
        kind: String,
    },
}

#[derive(Default)]
pub(super) struct Slot {
    pub(super) object: Option<Object>,
    pub(super) calls: usize,
    pub(super) deletes: usize,
}

pub(super) struct FakeState {
    next: usize,
    pub(super) slots: FxHashMap<usize, Slot>,
}

static STATE: LazyLock<Mutex<FakeState>> = LazyLock::new(|| {
    Mutex::new(FakeState {
        next: 0x10_000,
        slots: FxHashMap::default(),
    })
});

static POOL: LazyLock<Option<rayon::ThreadPool>> = LazyLock::new(|| {
    rayon::ThreadPoolBuilder::new()
        .num_threads(4)
        .thread_name(|i| format!("fake-engine-{}", i))
        .build()
        .ok()
});

pub(super) fn with_state<R>(f: impl FnOnce(&mut FakeState) -> R) -> R {
    let mut state = STATE.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut state)
}

impl FakeState {
    pub(super) fn alloc(&mut self, object: Object) -> NativeHandle {
        let raw = self.next;
        self.next += 1;
        self.slots.insert(
            raw,
            Slot {
                object: Some(object),
                ..Slot::default()
            },
        );
        NativeHandle::from_raw(raw)
    }

    /// Live object behind `handle`, counting the call.
    fn object(&mut self, handle: NativeHandle) -> Option<&mut Object> {
        let slot = self.slots.get_mut(&handle.as_usize())?;
        slot.calls += 1;
        slot.object.as_mut()
    }

    fn delete(&mut self, handle: NativeHandle) {
        let owned_value = match self.slots.get_mut(&handle.as_usize()) {
            Some(slot) => {
                slot.deletes += 1;
                match slot.object.take() {
                    Some(Object::Tagged { value, .. }) => value,
                    _ => NativeHandle::NULL,
                }
            }
            None => NativeHandle::NULL,
        };
        // A tagged result still holding its value owns it.
        if !owned_value.is_null() {
            self.delete(owned_value);
        }
    }

    fn is_cancelled(&self, cancel: NativeHandle) -> bool {
        matches!(
            self.slots.get(&cancel.as_usize()).and_then(|s| s.object.as_ref()),
            Some(Object::Cancel(true))
        )
    }

    pub(super) fn ok(&mut self, value: NativeHandle) -> NativeHandle {
        self.alloc(Object::Tagged {
            code: StatusCode::Ok.as_i32(),
            value,
            message: CString::default(),
        })
    }

    pub(super) fn failure(&mut self, code: StatusCode, message: &str) -> NativeHandle {
        self.alloc(Object::Tagged {
            code: code.as_i32(),
            value: NativeHandle::NULL,
            message: CString::new(message.replace('\0', " ")).unwrap_or_default(),
        })
    }

    pub(super) fn string(&mut self, value: &str) -> NativeHandle {
        self.alloc(Object::Str(
            CString::new(value.replace('\0', " ")).unwrap_or_default(),
        ))
    }
}

unsafe fn read_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

pub(super) unsafe extern "C" fn delete(handle: NativeHandle) {
    with_state(|s| s.delete(handle));
}

// String

pub(super) unsafe extern "C" fn string_data(handle: NativeHandle) -> *const c_char {
    with_state(|s| match s.object(handle) {
        Some(Object::Str(text)) => text.as_ptr(),
        _ => std::ptr::null(),
    })
}

// StringStringMap

pub(super) unsafe extern "C" fn map_create() -> NativeHandle {
    with_state(|s| s.alloc(Object::Map(BTreeMap::new())))
}

pub(super) unsafe extern "C" fn map_size(handle: NativeHandle) -> i64 {
    with_state(|s| match s.object(handle) {
        Some(Object::Map(map)) => map.len() as i64,
        _ => -1,
    })
}

pub(super) unsafe extern "C" fn map_get(handle: NativeHandle, key: *const c_char) -> NativeHandle {
    let Some(key) = (unsafe { read_str(key) }) else {
        return NativeHandle::NULL;
    };
    with_state(|s| {
        let found = match s.object(handle) {
            Some(Object::Map(map)) => map.get(&key).cloned(),
            _ => None,
        };
        found.map_or(NativeHandle::NULL, |value| s.string(&value))
    })
}

pub(super) unsafe extern "C" fn map_set(
    handle: NativeHandle,
    key: *const c_char,
    value: *const c_char,
) -> bool {
    let (Some(key), Some(value)) = (unsafe { read_str(key) }, unsafe { read_str(value) }) else {
        return false;
    };
    with_state(|s| match s.object(handle) {
        Some(Object::Map(map)) => {
            map.insert(key, value);
            true
        }
        _ => false,
    })
}

pub(super) unsafe extern "C" fn map_contains(handle: NativeHandle, key: *const c_char) -> bool {
    let Some(key) = (unsafe { read_str(key) }) else {
        return false;
    };
    with_state(|s| matches!(s.object(handle), Some(Object::Map(map)) if map.contains_key(&key)))
}

pub(super) unsafe extern "C" fn map_remove(handle: NativeHandle, key: *const c_char) -> bool {
    let Some(key) = (unsafe { read_str(key) }) else {
        return false;
    };
    with_state(|s| match s.object(handle) {
        Some(Object::Map(map)) => map.remove(&key).is_some(),
        _ => false,
    })
}

// StringSet

pub(super) unsafe extern "C" fn set_create() -> NativeHandle {
    with_state(|s| s.alloc(Object::Set(BTreeSet::new())))
}

pub(super) unsafe extern "C" fn set_size(handle: NativeHandle) -> i64 {
    with_state(|s| match s.object(handle) {
        Some(Object::Set(set)) => set.len() as i64,
        _ => -1,
    })
}

pub(super) unsafe extern "C" fn set_insert(handle: NativeHandle, value: *const c_char) -> bool {
    let Some(value) = (unsafe { read_str(value) }) else {
        return false;
    };
    with_state(|s| match s.object(handle) {
        Some(Object::Set(set)) => set.insert(value),
        _ => false,
    })
}

pub(super) unsafe extern "C" fn set_contains(handle: NativeHandle, value: *const c_char) -> bool {
    let Some(value) = (unsafe { read_str(value) }) else {
        return false;
    };
    with_state(|s| matches!(s.object(handle), Some(Object::Set(set)) if set.contains(&value)))
}

pub(super) unsafe extern "C" fn set_remove(handle: NativeHandle, value: *const c_char) -> bool {
    let Some(value) = (unsafe { read_str(value) }) else {
        return false;
    };
    with_state(|s| match s.object(handle) {
        Some(Object::Set(set)) => set.remove(&value),
        _ => false,
    })
}

// StringStream

pub(super) unsafe extern "C" fn stream_has_next(handle: NativeHandle) -> bool {
    with_state(|s| {
        let (remaining, cancel) = match s.object(handle) {
            Some(Object::Stream { items, cancel }) => (!items.is_empty(), *cancel),
            _ => return false,
        };
        remaining && !s.is_cancelled(cancel)
    })
}

pub(super) unsafe extern "C" fn stream_read(handle: NativeHandle) -> NativeHandle {
    with_state(|s| {
        let cancel = match s.object(handle) {
            Some(Object::Stream { cancel, .. }) => *cancel,
            _ => return s.failure(StatusCode::InvalidArgument, "not a stream"),
        };
        if s.is_cancelled(cancel) {
            return s.failure(StatusCode::Cancelled, "stream cancelled");
        }
        let next = match s.slots.get_mut(&handle.as_usize()).and_then(|slot| slot.object.as_mut()) {
            Some(Object::Stream { items, .. }) => items.pop_front(),
            _ => None,
        };
        match next {
            Some(item) => {
                let value = s.string(&item);
                s.ok(value)
            }
            None => s.failure(StatusCode::EndOfStream, "stream exhausted"),
        }
    })
}

// StringResult / NodeResult

pub(super) unsafe extern "C" fn tagged_status(handle: NativeHandle) -> i32 {
    with_state(|s| match s.object(handle) {
        Some(Object::Tagged { code, .. }) => *code,
        _ => StatusCode::InvalidArgument.as_i32(),
    })
}

pub(super) unsafe extern "C" fn tagged_ok(handle: NativeHandle) -> bool {
    with_state(|s| matches!(s.object(handle), Some(Object::Tagged { code: 0, .. })))
}

/// Transfers the value out; a second call returns null.
pub(super) unsafe extern "C" fn tagged_value(handle: NativeHandle) -> NativeHandle {
    with_state(|s| match s.object(handle) {
        Some(Object::Tagged { value, .. }) => std::mem::replace(value, NativeHandle::NULL),
        _ => NativeHandle::NULL,
    })
}

pub(super) unsafe extern "C" fn tagged_message(handle: NativeHandle) -> *const c_char {
    with_state(|s| match s.object(handle) {
        Some(Object::Tagged { message, .. }) => message.as_ptr(),
        _ => std::ptr::null(),
    })
}

// CancellationContext

pub(super) unsafe extern "C" fn cancel_create() -> NativeHandle {
    with_state(|s| s.alloc(Object::Cancel(false)))
}

pub(super) unsafe extern "C" fn cancel_cancel(handle: NativeHandle) {
    with_state(|s| {
        if let Some(Object::Cancel(flag)) = s.object(handle) {
            *flag = true;
        }
    });
}

pub(super) unsafe extern "C" fn cancel_is_cancelled(handle: NativeHandle) -> bool {
    with_state(|s| matches!(s.object(handle), Some(Object::Cancel(true))))
}

// Node

/// Node kinds the fake engine can construct.
pub(super) const NODE_KINDS: &[&str] = &["echo", "uppercase", "fail"];

pub(super) unsafe extern "C" fn node_create(kind: *const c_char, _config: *const c_char) -> NativeHandle {
    match unsafe { read_str(kind) } {
        Some(kind) if NODE_KINDS.contains(&kind.as_str()) => with_state(|s| s.alloc(Object::Node { kind })),
        _ => NativeHandle::NULL,
    }
}

fn uppercase(value: Value) -> Value {
    match value {
        Value::String(text) => Value::String(text.to_uppercase()),
        other => other,
    }
}

pub(super) unsafe extern "C" fn node_process(
    node: NativeHandle,
    cancel: NativeHandle,
    inputs: *const c_char,
) -> NativeHandle {
    let inputs = unsafe { read_str(inputs) };
    with_state(|s| {
        let kind = match s.object(node) {
            Some(Object::Node { kind }) => kind.clone(),
            _ => return s.failure(StatusCode::InvalidArgument, "not a node"),
        };
        if s.is_cancelled(cancel) {
            return s.failure(StatusCode::Cancelled, "node run cancelled");
        }
        let Some(Ok(Value::Array(mut values))) = inputs.map(|text| serde_json::from_str(&text)) else {
            return s.failure(StatusCode::InvalidArgument, "inputs must be a JSON array");
        };

        match kind.as_str() {
            "fail" => return s.failure(StatusCode::Internal, "node kind 'fail' always fails"),
            "uppercase" => values = values.into_iter().map(uppercase).collect(),
            _ => {}
        }
        let output = match values.len() {
            0 => Value::Null,
            1 => values.pop().unwrap_or(Value::Null),
            _ => Value::Array(values),
        };
        let text = s.string(&output.to_string());
        s.ok(text)
    })
}

// Executor

/// `(function, context, id)`: the fake engine takes the function first.
pub(super) unsafe extern "C" fn executor_run(function: *mut c_void, context: *mut c_void, id: u64) {
    if function.is_null() {
        return;
    }
    // Safety: the bridge only passes threaded entry points here.
    let entry: ThreadedEntry = unsafe { std::mem::transmute(function) };
    let context = context as usize;
    let job = move || unsafe { entry(context as *mut c_void, id) };
    match POOL.as_ref() {
        Some(pool) => pool.install(job),
        None => job(),
    }
}

// DataKind

/// Convert `input` through a host data kind, driving its channel by `id`.
///
/// Returns a `StringResult`: the converted text, or the host's failure
/// reason with status `Internal`.
pub(super) unsafe extern "C" fn data_kind_convert(
    channel: *const NativeChannel,
    id: u64,
    input: *const c_char,
) -> NativeHandle {
    if channel.is_null() {
        return with_state(|s| s.failure(StatusCode::InvalidArgument, "null channel"));
    }
    let channel = unsafe { *channel };
    if !unsafe { (channel.set_input)(channel.context, id, input) } {
        return with_state(|s| s.failure(StatusCode::InvalidArgument, "input rejected by host"));
    }

    let context = channel.context as usize;
    let job = move || unsafe { (channel.run)(context as *mut c_void, id) };
    match POOL.as_ref() {
        Some(pool) => pool.install(job),
        None => job(),
    }

    let (code, text) = unsafe {
        let output = (channel.take_output)(channel.context, id);
        if !output.is_null() {
            (StatusCode::Ok, output)
        } else {
            (StatusCode::Internal, (channel.take_error)(channel.context, id))
        }
    };
    let Some(message) = (unsafe { read_str(text) }) else {
        return with_state(|s| s.failure(StatusCode::Internal, "host wrote no output"));
    };
    unsafe { (channel.release_text)(text) };

    with_state(|s| match code {
        StatusCode::Ok => {
            let value = s.string(&message);
            s.ok(value)
        }
        code => s.failure(code, &message),
    })
}
