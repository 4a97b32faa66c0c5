//! Ownership of opaque native handles.
//!
//! Every resource the native engine hands out is wrapped in an
//! [`OwnedHandle`] the moment it crosses the boundary. The wrapper is
//! move-only, so a handle has exactly one owner and is released exactly
//! once: on drop, on an explicit [`OwnedHandle::release`], or when it is
//! superseded through [`OwnedHandle::replace`].
//!
//! ```text
//! native constructor ──► NativeHandle ──► HandleRegistry::register
//!                                              │
//!                                              └── OwnedHandle ──► Drop ──► <engine>_<Type>_delete
//! ```

mod owned;
mod registry;

pub use owned::{NativeHandle, OwnedHandle, ReleaseFn};
pub use registry::{HandleRegistry, HandleStats};
