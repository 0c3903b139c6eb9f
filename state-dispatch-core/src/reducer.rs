//! Reducers and reducer composition
//!
//! A reducer is a pure function `(state, action) -> state`. It must not
//! perform I/O or mutate its input, and it returns the *same* `Arc` when the
//! action does not concern it; the store and [`CombinedReducer`] rely on
//! `Arc::ptr_eq` for change detection.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use serde_json::{json, Value};
//! use state_dispatch_core::reducer::{CombinedReducer, Reducer, ReducerBuilder};
//! use state_dispatch_core::{Action, Slices};
//!
//! let counter = ReducerBuilder::new(json!(0))
//!     .on("INCREMENT", |state: &Arc<Value>, _: &Action| {
//!         Ok(Arc::new(json!(state.as_i64().unwrap_or(0) + 1)))
//!     })
//!     .build();
//!
//! let root = CombinedReducer::new().slice("counter", counter);
//! let state = Arc::new(Slices::new());
//! let next = root.reduce(&state, &Action::new("INCREMENT").unwrap()).unwrap();
//! assert_eq!(next.select_path("counter"), Some(&json!(1)));
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::action::{Action, ActionType};
use crate::error::ReducerError;
use crate::state::{immutable_delete, immutable_update, Slices};

/// Pure state transition for state type `S`.
pub trait Reducer<S> {
    /// Compute the next state. Return `state` itself (same `Arc`) for no-ops.
    fn reduce(&self, state: &Arc<S>, action: &Action) -> Result<Arc<S>, ReducerError>;

    /// Default slice value used when the composite state lacks this key.
    fn initial_state(&self) -> Option<Arc<S>> {
        None
    }
}

impl<S, F> Reducer<S> for F
where
    F: Fn(&Arc<S>, &Action) -> Result<Arc<S>, ReducerError>,
{
    fn reduce(&self, state: &Arc<S>, action: &Action) -> Result<Arc<S>, ReducerError> {
        self(state, action)
    }
}

/// Pin a closure to the reducer signature so its argument lifetimes infer.
pub fn reducer_fn<S, F>(f: F) -> F
where
    F: Fn(&Arc<S>, &Action) -> Result<Arc<S>, ReducerError>,
{
    f
}

type Handler<S> = Box<dyn Fn(&Arc<S>, &Action) -> Result<Arc<S>, ReducerError>>;

/// Builder for a [`HandlerReducer`]: one handler per action type.
pub struct ReducerBuilder<S> {
    initial: Arc<S>,
    handlers: HashMap<String, Handler<S>>,
}

impl<S> ReducerBuilder<S> {
    pub fn new(initial: S) -> Self {
        Self {
            initial: Arc::new(initial),
            handlers: HashMap::new(),
        }
    }

    /// Handle `kind`. A later handler for the same type replaces the earlier one.
    pub fn on<F>(mut self, kind: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Arc<S>, &Action) -> Result<Arc<S>, ReducerError> + 'static,
    {
        self.handlers.insert(kind.into(), Box::new(handler));
        self
    }

    pub fn build(self) -> HandlerReducer<S> {
        HandlerReducer {
            initial: self.initial,
            handlers: self.handlers,
        }
    }
}

/// Reducer dispatching on the action type; unmatched actions are no-ops.
pub struct HandlerReducer<S> {
    initial: Arc<S>,
    handlers: HashMap<String, Handler<S>>,
}

impl<S> HandlerReducer<S> {
    pub fn handles(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }
}

impl<S> std::fmt::Debug for HandlerReducer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.handlers.keys().collect();
        kinds.sort();
        f.debug_struct("HandlerReducer")
            .field("handlers", &kinds)
            .finish()
    }
}

impl<S> Reducer<S> for HandlerReducer<S> {
    fn reduce(&self, state: &Arc<S>, action: &Action) -> Result<Arc<S>, ReducerError> {
        match self.handlers.get(action.kind().as_str()) {
            Some(handler) => handler(state, action),
            None => Ok(Arc::clone(state)),
        }
    }

    fn initial_state(&self) -> Option<Arc<S>> {
        Some(Arc::clone(&self.initial))
    }
}

/// Root reducer over [`Slices`], built from named sub-reducers.
#[derive(Default)]
pub struct CombinedReducer {
    reducers: BTreeMap<String, Box<dyn Reducer<Value>>>,
}

/// Combine named sub-reducers into one root reducer.
pub fn combine_reducers<I, K>(reducers: I) -> CombinedReducer
where
    I: IntoIterator<Item = (K, Box<dyn Reducer<Value>>)>,
    K: Into<String>,
{
    CombinedReducer {
        reducers: reducers.into_iter().map(|(k, r)| (k.into(), r)).collect(),
    }
}

impl CombinedReducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a slice reducer under `name`, replacing any previous one.
    pub fn slice(mut self, name: impl Into<String>, reducer: impl Reducer<Value> + 'static) -> Self {
        self.reducers.insert(name.into(), Box::new(reducer));
        self
    }

    pub fn slice_names(&self) -> impl Iterator<Item = &str> {
        self.reducers.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for CombinedReducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CombinedReducer")
            .field("slices", &self.reducers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Reducer<Slices> for CombinedReducer {
    fn reduce(&self, state: &Arc<Slices>, action: &Action) -> Result<Arc<Slices>, ReducerError> {
        let mut changed: Vec<(&str, Arc<Value>)> = Vec::new();

        for (key, reducer) in &self.reducers {
            let (previous, materialized) = match state.get(key) {
                Some(slice) => (Arc::clone(slice), false),
                None => (
                    reducer
                        .initial_state()
                        .unwrap_or_else(|| Arc::new(Value::Null)),
                    true,
                ),
            };

            let next = reducer.reduce(&previous, action).map_err(|err| {
                ReducerError::with_source(format!("slice `{key}` failed on `{}`", action.kind()), err)
            })?;

            if materialized || !Arc::ptr_eq(&previous, &next) {
                changed.push((key.as_str(), next));
            }
        }

        if changed.is_empty() {
            return Ok(Arc::clone(state));
        }

        let mut next = Slices::clone(state);
        for (key, slice) in changed {
            next.insert(key.to_owned(), slice);
        }
        Ok(Arc::new(next))
    }
}

type SliceHandler = Box<dyn Fn(&Arc<Value>, &Value) -> Result<Arc<Value>, ReducerError>>;

/// A namespaced slice: handles `"<name>/<case>"` and ignores everything else.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use serde_json::{json, Value};
/// use state_dispatch_core::reducer::{Reducer, SliceReducer};
///
/// let todos = SliceReducer::new("todos", json!([]))
///     .case("add", |state: &Arc<Value>, payload: &Value| {
///         let mut items = state.as_array().cloned().unwrap_or_default();
///         items.push(payload.clone());
///         Ok(Arc::new(Value::Array(items)))
///     });
///
/// let add = todos.action("add", "milk").unwrap();
/// assert_eq!(add.kind().as_str(), "todos/add");
///
/// let state = todos.initial_state().unwrap();
/// let next = todos.reduce(&state, &add).unwrap();
/// assert_eq!(*next, json!(["milk"]));
/// ```
pub struct SliceReducer {
    name: String,
    initial: Arc<Value>,
    cases: HashMap<String, SliceHandler>,
}

impl SliceReducer {
    pub fn new(name: impl Into<String>, initial: Value) -> Self {
        Self {
            name: name.into(),
            initial: Arc::new(initial),
            cases: HashMap::new(),
        }
    }

    /// Register a case; the handler receives the slice and the action payload.
    pub fn case<F>(mut self, case: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Arc<Value>, &Value) -> Result<Arc<Value>, ReducerError> + 'static,
    {
        self.cases.insert(case.into(), Box::new(handler));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Action creator for a registered case; `None` for unknown cases.
    pub fn action(&self, case: &str, payload: impl Into<Value>) -> Option<Action> {
        if !self.cases.contains_key(case) {
            return None;
        }
        let kind = ActionType::new(format!("{}/{}", self.name, case)).ok()?;
        Some(Action::of(kind).with_payload(payload))
    }

    fn case_of<'a>(&self, kind: &'a ActionType) -> Option<&'a str> {
        kind.as_str()
            .strip_prefix(self.name.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
    }
}

impl std::fmt::Debug for SliceReducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SliceReducer")
            .field("name", &self.name)
            .field("cases", &self.cases.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Reducer<Value> for SliceReducer {
    fn reduce(&self, state: &Arc<Value>, action: &Action) -> Result<Arc<Value>, ReducerError> {
        let handler = self
            .case_of(action.kind())
            .and_then(|case| self.cases.get(case));
        match handler {
            Some(handler) => handler(state, action.payload().unwrap_or(&Value::Null)),
            None => Ok(Arc::clone(state)),
        }
    }

    fn initial_state(&self) -> Option<Arc<Value>> {
        Some(Arc::clone(&self.initial))
    }
}

/// Generic data reducer for `UPDATE`, `SET`, `DELETE` and `CLEAR`.
///
/// Pairs with [`ActionCreator`](crate::ActionCreator): a creator and a path
/// reducer sharing a namespace form a small key/value store.
#[derive(Debug, Clone, Default)]
pub struct PathReducer {
    namespace: Option<String>,
}

impl PathReducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only react to `"<namespace>/UPDATE"` and friends.
    pub fn namespaced(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
        }
    }

    fn operation<'a>(&self, kind: &'a ActionType) -> Option<&'a str> {
        match &self.namespace {
            Some(ns) => kind
                .as_str()
                .strip_prefix(ns.as_str())
                .and_then(|rest| rest.strip_prefix('/')),
            None => Some(kind.as_str()),
        }
    }
}

impl Reducer<Value> for PathReducer {
    fn reduce(&self, state: &Arc<Value>, action: &Action) -> Result<Arc<Value>, ReducerError> {
        let Some(op) = self.operation(action.kind()) else {
            return Ok(Arc::clone(state));
        };
        let payload = action.payload().unwrap_or(&Value::Null);

        let next = match op {
            "UPDATE" => {
                let path = payload
                    .get("path")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ReducerError::new("UPDATE requires a string `path`"))?;
                let value = payload.get("value").cloned().unwrap_or(Value::Null);
                immutable_update(state, path, value)
            }
            "DELETE" => {
                let path = payload
                    .as_str()
                    .ok_or_else(|| ReducerError::new("DELETE requires a path payload"))?;
                immutable_delete(state, path)
            }
            "SET" => {
                let data = payload
                    .as_object()
                    .ok_or_else(|| ReducerError::new("SET requires an object payload"))?;
                let mut merged = state.as_object().cloned().unwrap_or_default();
                merged.extend(data.iter().map(|(k, v)| (k.clone(), v.clone())));
                Value::Object(merged)
            }
            "CLEAR" => Value::Object(Map::new()),
            _ => return Ok(Arc::clone(state)),
        };
        Ok(Arc::new(next))
    }

    fn initial_state(&self) -> Option<Arc<Value>> {
        Some(Arc::new(Value::Object(Map::new())))
    }
}

/// Applies every action of a `BATCH` payload in order within one reduction.
#[derive(Debug, Clone)]
pub struct Batched<R> {
    inner: R,
}

/// Wrap `reducer` so that `BATCH` actions are unpacked.
pub fn batched<R>(reducer: R) -> Batched<R> {
    Batched { inner: reducer }
}

impl<S, R: Reducer<S>> Reducer<S> for Batched<R> {
    fn reduce(&self, state: &Arc<S>, action: &Action) -> Result<Arc<S>, ReducerError> {
        if action.kind().as_str().rsplit('/').next() != Some(ActionType::BATCH.as_str()) {
            return self.inner.reduce(state, action);
        }

        let items = action
            .payload()
            .and_then(Value::as_array)
            .ok_or_else(|| ReducerError::new("BATCH requires an array payload"))?;

        items.iter().try_fold(Arc::clone(state), |current, item| {
            let action = Action::from_value(item.clone())
                .map_err(|err| ReducerError::with_source("invalid action inside BATCH", err))?;
            self.reduce(&current, &action)
        })
    }

    fn initial_state(&self) -> Option<Arc<S>> {
        self.inner.initial_state()
    }
}

/// Replaces the whole state with the decoded payload of `@@HYDRATE`.
#[derive(Debug, Clone)]
pub struct Hydrating<R> {
    inner: R,
}

/// Wrap `reducer` so that persisted state can be restored by an action.
pub fn hydrating<R>(reducer: R) -> Hydrating<R> {
    Hydrating { inner: reducer }
}

impl<S: DeserializeOwned, R: Reducer<S>> Reducer<S> for Hydrating<R> {
    fn reduce(&self, state: &Arc<S>, action: &Action) -> Result<Arc<S>, ReducerError> {
        if action.kind() != &ActionType::HYDRATE {
            return self.inner.reduce(state, action);
        }
        let restored: S = action
            .payload_as()
            .map_err(|err| ReducerError::with_source("failed to hydrate state", err))?;
        Ok(Arc::new(restored))
    }

    fn initial_state(&self) -> Option<Arc<S>> {
        self.inner.initial_state()
    }
}
