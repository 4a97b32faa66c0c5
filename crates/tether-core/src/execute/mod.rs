//! Host functions exposed to the native engine as callable entry points.
//!
//! # Executors
//!
//! - **`SingleShotExecutor`** - Invoked synchronously by native code with
//!   inline input/output pointers (edge conditions and other quick checks).
//!   Not re-entrant: an overlapping call fails explicitly.
//! - **`ThreadedExecutor`** - Invoked from the native worker pool with only an
//!   execution id. Inputs and outputs travel through a [`CorrelationStore`].
//!
//! # Architecture
//!
//! ```text
//! ThreadedExecutor::invoke(id, inputs)
//!     │
//!     ├── store.set_input(id, ..)
//!     │
//!     ├── Dispatcher::dispatch(callback, id)
//!     │       ├── InlineDispatcher  → entry(ctx, id) on the caller thread
//!     │       └── NativeDispatcher  → <engine>_Executor_run(fn, ctx, id)
//!     │                                   └── native worker → entry(ctx, id)
//!     │                                           ├── store.inputs(id)
//!     │                                           ├── user logic
//!     │                                           └── store.set_output(id, ..)
//!     │
//!     └── store.take_output(id)
//! ```
//!
//! When the engine drives an invocation itself, it receives a
//! [`NativeChannel`] instead of the bare callback and performs the store
//! steps through its `set_input`, `take_output` and `take_error` entries.
//!
//! # Module Structure
//!
//! - `callback` - (context, function) pairs and boundary argument order
//! - `channel` - Entries for feeding a threaded executor from native code
//! - `dispatch` - How a threaded callback is driven for an id
//! - `single_shot` - Inline, re-entrancy guarded executor
//! - `threaded` - Execution-id indexed executor
//!
//! [`CorrelationStore`]: crate::correlation::CorrelationStore

mod callback;
mod channel;
mod dispatch;
mod single_shot;
mod threaded;

pub use callback::{ArgOrder, CallbackPair, SingleShotCallback, ThreadedCallback};
pub use channel::{NativeChannel, ReleaseTextEntry, SetInputEntry, TakeTextEntry, WireValue};
pub use dispatch::{Dispatcher, ExecutorRunFn, InlineDispatcher, NativeDispatcher};
pub use single_shot::{SingleShotEntry, SingleShotExecutor};
pub use threaded::{ThreadedEntry, ThreadedExecutor};
