//! Generic wrappers over native containers.
//!
//! A wrapper resolves its strategy once. If the type combination has no
//! strategy, or the native constructor fails, the wrapper is inert for its
//! whole life: sizes read [`INVALID_SIZE`](crate::strategy::INVALID_SIZE),
//! lookups miss, writes report `false`, and nothing crosses the boundary.

mod map;
mod set;

pub use map::NativeMap;
pub use set::NativeSet;
