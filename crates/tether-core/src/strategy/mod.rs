//! Generic-strategy dispatch.
//!
//! The native engine is monomorphized: a string→string map and a future
//! int→string map are different native types with different entry points.
//! Generic host wrappers recover genericity through a [`StrategyTable`]
//! keyed by Rust type identity. Each entry is an adapter implementing the
//! fixed operation set for one native instantiation. Wrappers resolve their
//! strategy once, at construction.
//!
//! # Module Structure
//!
//! - `traits` - Operation sets for maps, sets and streams
//! - `table` - Type-keyed strategy table
//! - `builtin` - Adapters for the string instantiations the engine ships

mod builtin;
mod table;
mod traits;

pub use builtin::{BUILTIN_OPS, NativeOps, StringSetStrategy, StringStreamStrategy, StringStringMapStrategy};
pub use table::{StrategyKind, StrategyTable, TypeKey};
pub use traits::{MapStrategy, SetStrategy, StreamStrategy};

/// Size reported by wrappers that have no strategy or no live handle.
pub const INVALID_SIZE: i64 = -1;
