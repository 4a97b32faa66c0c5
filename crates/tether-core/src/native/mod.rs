//! Native engine symbol resolution.
//!
//! Every engine entry point follows the `<engine>_<Type>_<operation>`
//! naming convention. A [`NativeEngine`] pairs the engine prefix with a
//! [`SymbolSource`]: either a dynamically loaded library or an in-process
//! table of function pointers.

mod engine;
mod string;
mod symbols;

pub use engine::NativeEngine;
pub use string::{StringFns, to_cstring};
pub use symbols::{LibrarySymbols, StaticSymbols, SymbolSource};
