//! Asynchronous action lifecycle
//!
//! [`AsyncMiddleware`] turns an action flagged with `meta.async = true` into
//! a `<TYPE>_LOADING` / `<TYPE>_SUCCESS` / `<TYPE>_ERROR` sequence:
//!
//! 1. `<TYPE>_LOADING` is dispatched synchronously, before `dispatch` returns.
//! 2. The handler registered for `<TYPE>` runs as a keyed tokio task.
//! 3. Its result is sent over the action channel as `<TYPE>_SUCCESS` (payload
//!    is the result) or `<TYPE>_ERROR` (error flag set, payload is the
//!    message). The loop that owns the store dispatches it.
//!
//! A second async `<TYPE>` replaces the running one. `meta.cancel = true`
//! aborts the running task and dispatches `<TYPE>_CANCELLED`;
//! `meta.debounce_ms` delays the start. The flagged action itself never
//! reaches the reducer.

use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::action::{Action, ActionType, Meta, META_ASYNC, META_CANCEL, META_DEBOUNCE_MS};
use crate::error::{BoxError, DispatchError, MiddlewareError};
use crate::store::{Middleware, Next, Store};
use crate::tasks::{TaskKey, TaskManager};

pub const LOADING: &str = "LOADING";
pub const SUCCESS: &str = "SUCCESS";
pub const ERROR: &str = "ERROR";
pub const CANCELLED: &str = "CANCELLED";

/// Boxed future produced by an async handler.
pub type AsyncWork = Pin<Box<dyn Future<Output = Result<Value, BoxError>> + Send>>;

type Handler = Box<dyn Fn(&Action) -> AsyncWork>;

/// Middleware running registered async handlers on a [`TaskManager`].
///
/// # Example
///
/// ```ignore
/// let (tx, mut queue) = ActionQueue::channel();
/// let fetch = AsyncMiddleware::new(tx).handler("FETCH_USER", |action| {
///     let id = action.payload().cloned();
///     async move { api::user(id).await.map_err(Into::into) }
/// });
///
/// let store = Store::builder(initial, reducer).middleware(fetch).build();
/// store.dispatch(Action::new("FETCH_USER")?.with_payload(7).with_meta("async", true))?;
/// queue.run(&store, shutdown).await?;
/// ```
pub struct AsyncMiddleware {
    handlers: HashMap<String, Handler>,
    tasks: RefCell<TaskManager>,
}

impl AsyncMiddleware {
    /// Completed lifecycle actions are sent to `action_tx`.
    pub fn new(action_tx: mpsc::UnboundedSender<Action>) -> Self {
        Self {
            handlers: HashMap::new(),
            tasks: RefCell::new(TaskManager::new(action_tx)),
        }
    }

    /// Register the handler for async actions of type `kind`.
    ///
    /// The handler is called on the dispatching thread and must move what it
    /// needs from the action into the returned future.
    pub fn handler<F, Fut>(mut self, kind: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Action) -> Fut + 'static,
        Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
    {
        self.handlers.insert(
            kind.into(),
            Box::new(move |action: &Action| -> AsyncWork { Box::pin(handler(action)) }),
        );
        self
    }

    pub fn handles(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Whether an async action of type `kind` is still in flight.
    pub fn is_running(&self, kind: &str) -> bool {
        self.tasks.borrow().is_running(&TaskKey::new(kind))
    }

    /// Abort every task in flight without dispatching anything.
    pub fn cancel_all(&self) {
        self.tasks.borrow_mut().cancel_all();
    }

    fn fail(&self, kind: &ActionType, message: String) -> DispatchError {
        DispatchError::middleware("AsyncMiddleware", kind, MiddlewareError::new(message))
    }
}

/// Meta without the markers that drive this middleware.
fn lifecycle_meta(meta: &Meta) -> Meta {
    meta.iter()
        .filter(|(key, _)| ![META_ASYNC, META_CANCEL, META_DEBOUNCE_MS].contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

impl<S: 'static> Middleware<S> for AsyncMiddleware {
    fn handle(
        &self,
        store: &Store<S>,
        action: Action,
        next: Next<'_, S>,
    ) -> Result<Action, DispatchError> {
        let cancel = action.meta_flag(META_CANCEL);
        if !cancel && !action.is_async() {
            return next.run(action);
        }

        let kind = action.kind().clone();
        let key = TaskKey::new(kind.as_str());
        let meta = lifecycle_meta(action.meta());

        if cancel {
            let aborted = self.tasks.borrow_mut().cancel(&key);
            tracing::debug!(action = %kind, aborted, "async cancel");
            if aborted {
                store.dispatch(Action::of(kind.lifecycle(CANCELLED)).with_meta_map(meta))?;
            }
            return Ok(action);
        }

        let Some(handler) = self.handlers.get(kind.as_str()) else {
            return Err(self.fail(&kind, format!("no async handler registered for `{kind}`")));
        };
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(self.fail(&kind, "async action dispatched outside a tokio runtime".into()));
        }

        let loading = Action::of(kind.lifecycle(LOADING)).with_meta_map(meta.clone());
        let loading = match action.payload() {
            Some(payload) => loading.with_payload(payload.clone()),
            None => loading,
        };
        store.dispatch(loading)?;

        let work = handler(&action);
        let (success, error) = (kind.lifecycle(SUCCESS), kind.lifecycle(ERROR));
        let completion = async move {
            match work.await {
                Ok(value) => Action::of(success).with_payload(value).with_meta_map(meta),
                Err(e) => Action::of(error)
                    .with_payload(e.to_string())
                    .with_error(true)
                    .with_meta_map(meta),
            }
        };

        let debounce = action.meta_u64(META_DEBOUNCE_MS).map(Duration::from_millis);
        let mut tasks = self.tasks.borrow_mut();
        match debounce {
            Some(delay) => tasks.debounce(key, delay, completion),
            None => tasks.spawn(key, completion),
        };
        tracing::debug!(action = %kind, ?debounce, "async action started");

        Ok(action)
    }

    fn name(&self) -> &'static str {
        "AsyncMiddleware"
    }
}
