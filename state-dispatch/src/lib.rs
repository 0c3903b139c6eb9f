//! state-dispatch: Redux-style state management for Rust applications
//!
//! A single [`Store`] owns the state. Every change is an [`Action`] routed
//! through a middleware chain into a pure [`Reducer`], after which
//! subscribers are notified. Async work runs on tokio tasks and feeds its
//! results back through an [`ActionQueue`].
//!
//! # Example
//! ```ignore
//! use state_dispatch::prelude::*;
//!
//! #[derive(ActionType, Clone, Copy, Debug, PartialEq, Eq)]
//! #[action(namespace = "counter")]
//! enum CounterAction {
//!     Increment,
//!     Decrement,
//! }
//!
//! let counter = ReducerBuilder::new(json!(0))
//!     .on(CounterAction::Increment.as_str(), |state, _| Ok(Arc::new(json!(state.as_i64().unwrap_or(0) + 1))))
//!     .build();
//! let store = Store::new(Slices::new(), CombinedReducer::new().slice("counter", counter));
//! store.dispatch(CounterAction::Increment.action())?;
//! ```

// Re-export everything from core
pub use state_dispatch_core::*;

// Re-export derive macros
pub use state_dispatch_macros::ActionType;

/// Prelude for convenient imports
pub mod prelude {
    pub use state_dispatch_core::prelude::*;

    // Derive macros
    pub use state_dispatch_macros::ActionType;

    pub use state_dispatch_core::serde_json::{json, Value};
    pub use std::sync::Arc;
}
