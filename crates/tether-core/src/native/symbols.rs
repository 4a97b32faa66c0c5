//! Sources of native entry points.

use std::ffi::c_void;
use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};
use rustc_hash::FxHashMap;

use crate::error::Result;

/// Looks up native entry points by their full symbol name.
pub trait SymbolSource: Send + Sync {
    /// Address of the symbol, or `None` if it is not exported.
    fn lookup(&self, name: &str) -> Option<*const c_void>;

    /// Human-readable origin, for logs and diagnostics.
    fn describe(&self) -> String;
}

/// Symbols exported by a dynamically loaded engine library.
pub struct LibrarySymbols {
    library: Library,
    path: PathBuf,
}

impl LibrarySymbols {
    /// Load the engine library at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        // Safety: loading runs the library's initializers; the engine library
        // is trusted the same way any linked dependency is.
        let library = unsafe { Library::new(&path) }?;
        tracing::info!("loaded native engine from {}", path.display());
        Ok(Self { library, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SymbolSource for LibrarySymbols {
    fn lookup(&self, name: &str) -> Option<*const c_void> {
        // Safety: the symbol is only read as an address here; callers
        // transmute it to the signature they expect.
        let symbol: Symbol<unsafe extern "C" fn()> =
            unsafe { self.library.get(name.as_bytes()) }.ok()?;
        Some(*symbol as *const c_void)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-process symbol table, used when the engine is linked statically or
/// replaced by a test double.
#[derive(Debug, Default, Clone)]
pub struct StaticSymbols {
    symbols: FxHashMap<String, usize>,
    label: String,
}

impl StaticSymbols {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            symbols: FxHashMap::default(),
            label: label.into(),
        }
    }

    /// Register an entry point under its full symbol name.
    pub fn insert(&mut self, name: impl Into<String>, function: *const c_void) {
        self.symbols.insert(name.into(), function as usize);
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, function: *const c_void) -> Self {
        self.insert(name, function);
        self
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.symbols.remove(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl SymbolSource for StaticSymbols {
    fn lookup(&self, name: &str) -> Option<*const c_void> {
        self.symbols.get(name).map(|&addr| addr as *const c_void)
    }

    fn describe(&self) -> String {
        format!("static symbols ({})", self.label)
    }
}
