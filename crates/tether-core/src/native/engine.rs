//! Engine symbol resolution by type and operation.

use std::ffi::c_void;
use std::fmt;
use std::path::Path;

use crate::error::{Error, Result};
use crate::status::StatusFns;

use super::string::StringFns;
use super::symbols::{LibrarySymbols, SymbolSource};

/// A native engine: symbol prefix plus where its entry points come from.
pub struct NativeEngine {
    prefix: String,
    source: Box<dyn SymbolSource>,
}

impl NativeEngine {
    pub fn new(prefix: impl Into<String>, source: impl SymbolSource + 'static) -> Self {
        Self {
            prefix: prefix.into(),
            source: Box::new(source),
        }
    }

    /// Load the engine library at `path`.
    pub fn load(prefix: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(prefix, LibrarySymbols::open(path)?))
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn describe(&self) -> String {
        self.source.describe()
    }

    /// Full symbol name for `ty` and `op`, e.g. `engine_StringSet_insert`.
    pub fn symbol_name(&self, ty: &str, op: &str) -> String {
        format!("{}_{}_{}", self.prefix, ty, op)
    }

    pub fn has_symbol(&self, ty: &str, op: &str) -> bool {
        self.source.lookup(&self.symbol_name(ty, op)).is_some()
    }

    /// Resolve `<prefix>_<ty>_<op>` as a function pointer of type `F`.
    ///
    /// # Safety
    ///
    /// `F` must be an `extern "C"` function pointer type matching the
    /// native definition exactly. Nothing checks the correspondence.
    pub unsafe fn resolve<F: Copy>(&self, ty: &str, op: &str) -> Result<F> {
        if std::mem::size_of::<F>() != std::mem::size_of::<*const c_void>() {
            return Err(Error::InvalidOperation(format!(
                "cannot resolve {}_{} as a non-pointer type",
                ty, op
            )));
        }

        let name = self.symbol_name(ty, op);
        let ptr = self
            .source
            .lookup(&name)
            .filter(|ptr| !ptr.is_null())
            .ok_or_else(|| Error::MissingSymbol(name.clone()))?;

        tracing::trace!("resolved {} at {:p}", name, ptr);
        // Safety: size checked above; signature guaranteed by the caller.
        Ok(unsafe { std::mem::transmute_copy::<*const c_void, F>(&ptr) })
    }

    /// Accessors for the tagged result type `ty` (e.g. `StringResult`).
    pub fn status_fns(&self, ty: &str) -> Result<StatusFns> {
        unsafe {
            Ok(StatusFns {
                status: self.resolve(ty, "status")?,
                ok: self.resolve(ty, "ok")?,
                value: self.resolve(ty, "value")?,
                delete: self.resolve(ty, "delete")?,
                message: self.resolve(ty, "message").ok(),
            })
        }
    }

    /// Accessors for native string objects.
    pub fn string_fns(&self) -> Result<StringFns> {
        unsafe {
            Ok(StringFns {
                data: self.resolve("String", "data")?,
                delete: self.resolve("String", "delete")?,
            })
        }
    }
}

impl fmt::Debug for NativeEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeEngine")
            .field("prefix", &self.prefix)
            .field("source", &self.source.describe())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::NativeHandle;
    use crate::native::StaticSymbols;
    use crate::testing;

    extern "C" fn twice(x: i64) -> i64 {
        x * 2
    }

    #[test]
    fn test_symbol_name() {
        let engine = NativeEngine::new("engine", StaticSymbols::new("empty"));
        assert_eq!(engine.symbol_name("StringSet", "insert"), "engine_StringSet_insert");
    }

    #[test]
    fn test_resolve_and_call() {
        let symbols = StaticSymbols::new("test").with("math_Int_twice", twice as *const c_void);
        let engine = NativeEngine::new("math", symbols);

        let f: extern "C" fn(i64) -> i64 = unsafe { engine.resolve("Int", "twice") }.unwrap();
        assert_eq!(f(21), 42);
    }

    #[test]
    fn test_missing_symbol() {
        let engine = NativeEngine::new("math", StaticSymbols::new("empty"));
        let result: Result<extern "C" fn(i64) -> i64> = unsafe { engine.resolve("Int", "twice") };
        match result {
            Err(Error::MissingSymbol(name)) => assert_eq!(name, "math_Int_twice"),
            other => panic!("expected missing symbol, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_string_fns_from_fake_engine() {
        let engine = testing::engine();
        let strings = engine.string_fns().unwrap();

        let handle = testing::make_string("native text");
        assert_eq!(strings.take(handle).as_deref(), Some("native text"));
        assert_eq!(testing::delete_count(handle), 1);
        assert_eq!(strings.take(NativeHandle::NULL), None);
    }
}
