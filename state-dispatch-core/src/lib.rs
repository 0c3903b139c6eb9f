//! Core traits and types for state-dispatch
//!
//! This crate provides a Redux-style state container: a single [`Store`]
//! holds the application state, [`Action`]s describe changes, pure
//! [`Reducer`]s compute the next state and [`Middleware`] intercepts
//! dispatches for side effects.
//!
//! # Core Concepts
//!
//! - **Action**: a type tag plus optional JSON payload, meta map and error flag
//! - **Reducer**: `(state, action) -> state`, composable per slice
//! - **Store**: owns the state snapshot, runs middleware, notifies subscribers
//! - **Middleware**: logging, timing, validation, crash reports, async lifecycles
//!
//! # Basic Example
//!
//! ```
//! use std::sync::Arc;
//! use serde_json::{json, Value};
//! use state_dispatch_core::prelude::*;
//!
//! let counter = ReducerBuilder::new(json!(0))
//!     .on("INCREMENT", |state: &Arc<Value>, _: &Action| {
//!         Ok(Arc::new(json!(state.as_i64().unwrap_or(0) + 1)))
//!     })
//!     .build();
//! let root = CombinedReducer::new().slice("counter", counter);
//!
//! let store = Store::new(Slices::new(), root);
//! store.dispatch(Action::new("INCREMENT").unwrap()).unwrap();
//! assert_eq!(store.get_state().select_path("counter"), Some(&json!(1)));
//! ```
//!
//! # Async Actions
//!
//! The store is single-threaded and never awaits. Async work is started by
//! [`AsyncMiddleware`], which dispatches `<TYPE>_LOADING` right away and
//! sends `<TYPE>_SUCCESS` / `<TYPE>_ERROR` back over an [`ActionQueue`]
//! that the owning task drains:
//!
//! ```ignore
//! let (tx, mut queue) = ActionQueue::channel();
//! let store = Store::builder(Slices::new(), root)
//!     .middleware(AsyncMiddleware::new(tx).handler("FETCH", |action| {
//!         let id = action.payload().cloned();
//!         async move { api::fetch(id).await.map_err(Into::into) }
//!     }))
//!     .build();
//!
//! store.dispatch(Action::new("FETCH")?.with_payload(7).with_meta("async", true))?;
//! queue.run(&store, shutdown).await?;
//! ```

pub mod action;
#[cfg(feature = "tasks")]
pub mod async_action;
pub mod config;
pub mod error;
pub mod logger;
pub mod middleware;
pub mod persist;
pub mod reducer;
pub mod runtime;
pub mod state;
pub mod store;
#[cfg(feature = "tasks")]
pub mod tasks;
pub mod testing;

// Action exports
pub use action::{
    Action, ActionCreator, ActionType, Meta, META_ASYNC, META_CANCEL, META_DEBOUNCE_MS,
};

// Error exports
pub use error::{
    BoxError, DispatchError, InvalidActionError, MiddlewareError, ReducerError, SubscriberError,
};

// Reducer and state exports
pub use reducer::{
    batched, combine_reducers, hydrating, reducer_fn, CombinedReducer, HandlerReducer,
    PathReducer, Reducer, ReducerBuilder, SliceReducer,
};
pub use state::{immutable_delete, immutable_update, select_path, Slices};

// Store exports
pub use config::{NotifyPolicy, StoreConfig, DEFAULT_HISTORY_LIMIT};
pub use store::{
    from_fn, FnMiddleware, Middleware, MiddlewareId, Next, Store, StoreBuilder, Subscription,
    SubscriptionId, WeakStore,
};

// Middleware exports
pub use logger::{ActionLogConfig, ActionLogHandle, ActionLoggerConfig, ActionLoggerMiddleware};
pub use middleware::{CrashReporterMiddleware, TimingMiddleware, ValidationMiddleware};

// Runtime exports
pub use runtime::ActionQueue;

// Task exports (requires "tasks" feature)
#[cfg(feature = "tasks")]
pub use async_action::{AsyncMiddleware, AsyncWork};
#[cfg(feature = "tasks")]
pub use tasks::{TaskKey, TaskManager};

// Testing exports
pub use testing::{Recorder, TestHarness};

pub use serde_json;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::action::{Action, ActionCreator, ActionType};
    pub use crate::config::{NotifyPolicy, StoreConfig};
    pub use crate::error::{DispatchError, ReducerError};
    pub use crate::logger::{ActionLoggerConfig, ActionLoggerMiddleware};
    pub use crate::middleware::{CrashReporterMiddleware, TimingMiddleware, ValidationMiddleware};
    pub use crate::reducer::{
        batched, combine_reducers, hydrating, CombinedReducer, PathReducer, Reducer,
        ReducerBuilder, SliceReducer,
    };
    pub use crate::runtime::ActionQueue;
    pub use crate::state::Slices;
    pub use crate::store::{from_fn, Middleware, Next, Store, Subscription};
    #[cfg(feature = "tasks")]
    pub use crate::async_action::AsyncMiddleware;
    #[cfg(feature = "tasks")]
    pub use crate::tasks::{TaskKey, TaskManager};
}
