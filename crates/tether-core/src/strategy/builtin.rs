//! Adapters for the string instantiations exported by the engine.

use std::ffi::c_char;

use crate::error::{Error, Result};
use crate::handle::{NativeHandle, ReleaseFn};
use crate::native::{NativeEngine, StringFns, to_cstring};
use crate::status::{StatusFns, unwrap_with};

use super::traits::{MapStrategy, SetStrategy, StreamStrategy};

/// Native entry points one engine type must export.
#[derive(Debug, Clone, Copy)]
pub struct NativeOps {
    pub native_type: &'static str,
    pub operations: &'static [&'static str],
}

/// Everything the built-in strategies, nodes and dispatcher resolve.
pub const BUILTIN_OPS: &[NativeOps] = &[
    NativeOps {
        native_type: "String",
        operations: &["data", "delete"],
    },
    NativeOps {
        native_type: "StringStringMap",
        operations: &["create", "delete", "size", "get", "set", "contains", "remove"],
    },
    NativeOps {
        native_type: "StringSet",
        operations: &["create", "delete", "size", "insert", "contains", "remove"],
    },
    NativeOps {
        native_type: "StringStream",
        operations: &["has_next", "read", "delete"],
    },
    NativeOps {
        native_type: "StringResult",
        operations: &["status", "ok", "value", "message", "delete"],
    },
    NativeOps {
        native_type: "CancellationContext",
        operations: &["create", "cancel", "is_cancelled", "delete"],
    },
    NativeOps {
        native_type: "Node",
        operations: &["create", "process", "delete"],
    },
    NativeOps {
        native_type: "NodeResult",
        operations: &["status", "ok", "value", "message", "delete"],
    },
    NativeOps {
        native_type: "Executor",
        operations: &["run"],
    },
];

type CreateFn = unsafe extern "C" fn() -> NativeHandle;
type SizeFn = unsafe extern "C" fn(NativeHandle) -> i64;
type KeyFn = unsafe extern "C" fn(NativeHandle, *const c_char) -> bool;
type MapGetFn = unsafe extern "C" fn(NativeHandle, *const c_char) -> NativeHandle;
type MapSetFn = unsafe extern "C" fn(NativeHandle, *const c_char, *const c_char) -> bool;
type HasNextFn = unsafe extern "C" fn(NativeHandle) -> bool;
type ReadFn = unsafe extern "C" fn(NativeHandle) -> NativeHandle;

/// Run `call` with `value` as a C string; strings with interior NULs
/// cannot cross the boundary and yield `default`.
fn with_cstr<R>(value: &str, default: R, call: impl FnOnce(*const c_char) -> R) -> R {
    match to_cstring(value) {
        Ok(c) => call(c.as_ptr()),
        Err(e) => {
            tracing::warn!("{}", e);
            default
        }
    }
}

/// `StringStringMap`: string keys to string values.
#[derive(Debug, Clone, Copy)]
pub struct StringStringMapStrategy {
    create: CreateFn,
    delete: ReleaseFn,
    size: SizeFn,
    get: MapGetFn,
    set: MapSetFn,
    contains: KeyFn,
    remove: KeyFn,
    strings: StringFns,
}

impl StringStringMapStrategy {
    const TYPE: &'static str = "StringStringMap";

    pub fn resolve(engine: &NativeEngine) -> Result<Self> {
        let ty = Self::TYPE;
        unsafe {
            Ok(Self {
                create: engine.resolve(ty, "create")?,
                delete: engine.resolve(ty, "delete")?,
                size: engine.resolve(ty, "size")?,
                get: engine.resolve(ty, "get")?,
                set: engine.resolve(ty, "set")?,
                contains: engine.resolve(ty, "contains")?,
                remove: engine.resolve(ty, "remove")?,
                strings: engine.string_fns()?,
            })
        }
    }
}

impl MapStrategy<String, String> for StringStringMapStrategy {
    fn native_type(&self) -> &'static str {
        Self::TYPE
    }

    fn create(&self) -> NativeHandle {
        unsafe { (self.create)() }
    }

    fn release_fn(&self) -> ReleaseFn {
        self.delete
    }

    fn size(&self, map: NativeHandle) -> i64 {
        unsafe { (self.size)(map) }
    }

    fn get(&self, map: NativeHandle, key: &String) -> Option<String> {
        let value = with_cstr(key, NativeHandle::NULL, |key| unsafe { (self.get)(map, key) });
        self.strings.take(value)
    }

    fn set(&self, map: NativeHandle, key: &String, value: &String) -> bool {
        with_cstr(key, false, |key| {
            with_cstr(value, false, |value| unsafe { (self.set)(map, key, value) })
        })
    }

    fn contains(&self, map: NativeHandle, key: &String) -> bool {
        with_cstr(key, false, |key| unsafe { (self.contains)(map, key) })
    }

    fn remove(&self, map: NativeHandle, key: &String) -> bool {
        with_cstr(key, false, |key| unsafe { (self.remove)(map, key) })
    }
}

/// `StringSet`.
#[derive(Debug, Clone, Copy)]
pub struct StringSetStrategy {
    create: CreateFn,
    delete: ReleaseFn,
    size: SizeFn,
    insert: KeyFn,
    contains: KeyFn,
    remove: KeyFn,
}

impl StringSetStrategy {
    const TYPE: &'static str = "StringSet";

    pub fn resolve(engine: &NativeEngine) -> Result<Self> {
        let ty = Self::TYPE;
        unsafe {
            Ok(Self {
                create: engine.resolve(ty, "create")?,
                delete: engine.resolve(ty, "delete")?,
                size: engine.resolve(ty, "size")?,
                insert: engine.resolve(ty, "insert")?,
                contains: engine.resolve(ty, "contains")?,
                remove: engine.resolve(ty, "remove")?,
            })
        }
    }
}

impl SetStrategy<String> for StringSetStrategy {
    fn native_type(&self) -> &'static str {
        Self::TYPE
    }

    fn create(&self) -> NativeHandle {
        unsafe { (self.create)() }
    }

    fn release_fn(&self) -> ReleaseFn {
        self.delete
    }

    fn size(&self, set: NativeHandle) -> i64 {
        unsafe { (self.size)(set) }
    }

    fn insert(&self, set: NativeHandle, value: &String) -> bool {
        with_cstr(value, false, |value| unsafe { (self.insert)(set, value) })
    }

    fn contains(&self, set: NativeHandle, value: &String) -> bool {
        with_cstr(value, false, |value| unsafe { (self.contains)(set, value) })
    }

    fn remove(&self, set: NativeHandle, value: &String) -> bool {
        with_cstr(value, false, |value| unsafe { (self.remove)(set, value) })
    }
}

/// `StringStream`: reads come back as `StringResult` tagged results.
#[derive(Debug, Clone, Copy)]
pub struct StringStreamStrategy {
    delete: ReleaseFn,
    has_next: HasNextFn,
    read: ReadFn,
    result: StatusFns,
    strings: StringFns,
}

impl StringStreamStrategy {
    const TYPE: &'static str = "StringStream";

    pub fn resolve(engine: &NativeEngine) -> Result<Self> {
        let ty = Self::TYPE;
        unsafe {
            Ok(Self {
                delete: engine.resolve(ty, "delete")?,
                has_next: engine.resolve(ty, "has_next")?,
                read: engine.resolve(ty, "read")?,
                result: engine.status_fns("StringResult")?,
                strings: engine.string_fns()?,
            })
        }
    }
}

impl StreamStrategy<String> for StringStreamStrategy {
    fn native_type(&self) -> &'static str {
        Self::TYPE
    }

    fn release_fn(&self) -> ReleaseFn {
        self.delete
    }

    fn has_next(&self, stream: NativeHandle) -> bool {
        unsafe { (self.has_next)(stream) }
    }

    fn read(&self, stream: NativeHandle) -> Result<String> {
        let tagged = unsafe { (self.read)(stream) };
        unwrap_with(tagged, &self.result, |value| {
            self.strings
                .take(value)
                .ok_or_else(|| Error::InvalidHandle("stream produced a null string".to_string()))
        })
    }
}
