//! Centralized state store with reducer pattern and middleware pipeline

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use serde_json::Value;

use crate::action::{Action, ActionType};
use crate::config::{NotifyPolicy, StoreConfig};
use crate::error::{DispatchError, SubscriberError};
use crate::reducer::Reducer;

/// Stable identity of a subscription. Never reused within a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of a middleware registered with [`Store::add_middleware`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MiddlewareId(u64);

type Listener<S> = Rc<dyn Fn(&Arc<S>) -> Result<(), SubscriberError>>;

/// Interceptor in the dispatch pipeline.
///
/// A middleware receives the store, the action and a [`Next`] continuation.
/// Calling `next.run(action)` continues the chain; `Next` is consumed by the
/// call, so the chain cannot be continued twice. Returning without calling it
/// swallows the action: the reducer does not run and nobody is notified.
///
/// Middleware is the place for side effects. It may read state, dispatch
/// further actions through `store`, and keep private mutable resources behind
/// `Cell`/`RefCell` (handlers take `&self` because dispatch is reentrant).
///
/// # Example
///
/// ```
/// use state_dispatch_core::{Action, DispatchError, Middleware, Next, Store};
///
/// struct Stamp;
///
/// impl<S: 'static> Middleware<S> for Stamp {
///     fn handle(
///         &self,
///         _store: &Store<S>,
///         action: Action,
///         next: Next<'_, S>,
///     ) -> Result<Action, DispatchError> {
///         next.run(action.with_meta("stamped", true))
///     }
/// }
/// ```
pub trait Middleware<S> {
    fn handle(
        &self,
        store: &Store<S>,
        action: Action,
        next: Next<'_, S>,
    ) -> Result<Action, DispatchError>;

    /// Name reported in [`DispatchError::Middleware`].
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Continuation of the middleware chain; the last link applies the reducer.
pub struct Next<'a, S> {
    store: &'a Store<S>,
    chain: &'a [Rc<dyn Middleware<S>>],
}

impl<S: 'static> Next<'_, S> {
    /// Pass `action` to the rest of the chain.
    pub fn run(self, action: Action) -> Result<Action, DispatchError> {
        match self.chain.split_first() {
            Some((head, rest)) => head.handle(
                self.store,
                action,
                Next {
                    store: self.store,
                    chain: rest,
                },
            ),
            None => self.store.apply(action),
        }
    }
}

/// Middleware built from a closure, see [`from_fn`].
pub struct FnMiddleware<F> {
    f: F,
    name: &'static str,
}

/// Turn a closure into a middleware.
pub fn from_fn<S, F>(f: F) -> FnMiddleware<F>
where
    F: Fn(&Store<S>, Action, Next<'_, S>) -> Result<Action, DispatchError>,
{
    FnMiddleware { f, name: "from_fn" }
}

impl<F> FnMiddleware<F> {
    /// Set the name reported in errors.
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

impl<S, F> Middleware<S> for FnMiddleware<F>
where
    F: Fn(&Store<S>, Action, Next<'_, S>) -> Result<Action, DispatchError>,
{
    fn handle(
        &self,
        store: &Store<S>,
        action: Action,
        next: Next<'_, S>,
    ) -> Result<Action, DispatchError> {
        (self.f)(store, action, next)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Bounded list of recorded states with a cursor for undo/redo.
struct History<S> {
    states: VecDeque<Arc<S>>,
    cursor: usize,
    limit: usize,
}

impl<S> History<S> {
    fn new(initial: Arc<S>, limit: usize) -> Self {
        let mut history = Self {
            states: VecDeque::new(),
            cursor: 0,
            limit,
        };
        history.reset(initial);
        history
    }

    fn reset(&mut self, state: Arc<S>) {
        self.states.clear();
        self.cursor = 0;
        if self.limit > 0 {
            self.states.push_back(state);
        }
    }

    fn record(&mut self, state: Arc<S>) {
        if self.limit == 0 {
            return;
        }
        self.states.truncate(self.cursor + 1);
        self.states.push_back(state);
        while self.states.len() > self.limit {
            self.states.pop_front();
        }
        self.cursor = self.states.len() - 1;
    }

    fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    fn can_redo(&self) -> bool {
        self.cursor + 1 < self.states.len()
    }

    fn undo(&mut self) -> Option<Arc<S>> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        self.states.get(self.cursor).cloned()
    }

    fn redo(&mut self) -> Option<Arc<S>> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        self.states.get(self.cursor).cloned()
    }
}

struct Inner<S> {
    state: RefCell<Arc<S>>,
    reducer: RefCell<Rc<dyn Reducer<S>>>,
    middleware: RefCell<Vec<(MiddlewareId, Rc<dyn Middleware<S>>)>>,
    subscribers: RefCell<Vec<(SubscriptionId, Listener<S>)>>,
    history: RefCell<History<S>>,
    next_id: Cell<u64>,
    depth: Cell<usize>,
    config: StoreConfig,
}

impl<S> Inner<S> {
    fn next_id(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }
}

trait Registry {
    fn remove_subscriber(&self, id: SubscriptionId) -> bool;
}

impl<S> Registry for Inner<S> {
    fn remove_subscriber(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }
}

/// Handle returned by [`Store::subscribe`].
///
/// The subscription stays active until [`unsubscribe`](Self::unsubscribe) is
/// called; dropping the handle does not remove it.
pub struct Subscription {
    id: SubscriptionId,
    registry: Weak<dyn Registry>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove the subscriber. Returns `true` only on the call that removed it;
    /// further calls are no-ops.
    pub fn unsubscribe(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.remove_subscriber(self.id))
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

struct DepthGuard<'a>(&'a Cell<usize>);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

/// Centralized state store with Redux-like reducer pattern
///
/// The store owns the current state snapshot, the root reducer, the
/// middleware chain and the subscriber list. `Store` is a cheap handle:
/// clones share the same store. It belongs to one thread; async work sends
/// its results back through an [`ActionQueue`](crate::ActionQueue) and the
/// owning task dispatches them.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use serde_json::{json, Value};
/// use state_dispatch_core::{Action, ReducerError, Store};
///
/// fn reducer(state: &Arc<Value>, action: &Action) -> Result<Arc<Value>, ReducerError> {
///     let count = state["counter"].as_i64().unwrap_or(0);
///     match action.kind().as_str() {
///         "INCREMENT" => Ok(Arc::new(json!({ "counter": count + 1 }))),
///         "DECREMENT" => Ok(Arc::new(json!({ "counter": count - 1 }))),
///         _ => Ok(Arc::clone(state)),
///     }
/// }
///
/// let store = Store::new(json!({ "counter": 0 }), reducer);
/// let subscription = store.subscribe(|state| println!("counter: {}", state["counter"]));
///
/// store.dispatch(Action::new("INCREMENT").unwrap()).unwrap();
/// assert_eq!(*store.get_state(), json!({ "counter": 1 }));
///
/// subscription.unsubscribe();
/// ```
pub struct Store<S> {
    inner: Rc<Inner<S>>,
}

impl<S> Clone for Store<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<S: fmt::Debug> fmt::Debug for Store<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("state", &self.inner.state.borrow())
            .field("middleware", &self.inner.middleware.borrow().len())
            .field("subscribers", &self.inner.subscribers.borrow().len())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl<S: 'static> Store<S> {
    /// Create a store with initial state, root reducer and default config.
    pub fn new<R: Reducer<S> + 'static>(state: S, reducer: R) -> Self {
        StoreBuilder::new(state, reducer).build()
    }

    /// Start building a store with middleware or custom config.
    pub fn builder<R: Reducer<S> + 'static>(state: S, reducer: R) -> StoreBuilder<S> {
        StoreBuilder::new(state, reducer)
    }

    /// Dispatch an action through the middleware chain and the reducer.
    ///
    /// Returns what the chain returns, the action itself unless a middleware
    /// substitutes another. Nested dispatches (from middleware or
    /// subscribers) complete fully, notifications included, before the
    /// outer dispatch continues.
    pub fn dispatch(&self, action: Action) -> Result<Action, DispatchError> {
        let depth = self.inner.depth.get() + 1;
        self.inner.depth.set(depth);
        let _guard = DepthGuard(&self.inner.depth);
        let _span = tracing::trace_span!("dispatch", action = %action.kind(), depth).entered();

        let chain: Vec<Rc<dyn Middleware<S>>> = self
            .inner
            .middleware
            .borrow()
            .iter()
            .map(|(_, m)| Rc::clone(m))
            .collect();

        Next {
            store: self,
            chain: &chain,
        }
        .run(action)
    }

    /// Decode a JSON action and dispatch it.
    pub fn dispatch_value(&self, value: Value) -> Result<Action, DispatchError> {
        let action = Action::from_value(value)?;
        self.dispatch(action)
    }

    /// Current state snapshot. Callers must treat it as read-only.
    pub fn get_state(&self) -> Arc<S> {
        Arc::clone(&self.inner.state.borrow())
    }

    /// Project a value out of the current state.
    pub fn select<T>(&self, selector: impl FnOnce(&S) -> T) -> T {
        let state = self.get_state();
        selector(&state)
    }

    /// Register an infallible subscriber.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Arc<S>) + 'static,
    {
        self.try_subscribe(move |state| {
            listener(state);
            Ok(())
        })
    }

    /// Register a subscriber whose error aborts the notification pass.
    pub fn try_subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Arc<S>) -> Result<(), SubscriberError> + 'static,
    {
        let id = SubscriptionId(self.inner.next_id());
        self.inner
            .subscribers
            .borrow_mut()
            .push((id, Rc::new(listener)));

        let registry: Weak<dyn Registry> = Rc::downgrade(&self.inner) as Weak<dyn Registry>;
        Subscription { id, registry }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }

    /// Swap the root reducer for all future dispatches. Nobody is notified.
    pub fn replace_reducer<R: Reducer<S> + 'static>(&self, reducer: R) {
        *self.inner.reducer.borrow_mut() = Rc::new(reducer);
        tracing::debug!("root reducer replaced");
    }

    /// Append a middleware. Dispatches already in flight keep their chain.
    pub fn add_middleware<M: Middleware<S> + 'static>(&self, middleware: M) -> MiddlewareId {
        let id = MiddlewareId(self.inner.next_id());
        self.inner
            .middleware
            .borrow_mut()
            .push((id, Rc::new(middleware)));
        id
    }

    /// Remove a middleware added earlier. Returns `false` if it was not present.
    pub fn remove_middleware(&self, id: MiddlewareId) -> bool {
        let mut middleware = self.inner.middleware.borrow_mut();
        let before = middleware.len();
        middleware.retain(|(mid, _)| *mid != id);
        middleware.len() != before
    }

    pub fn middleware_count(&self) -> usize {
        self.inner.middleware.borrow().len()
    }

    /// Nesting level of the dispatch currently running (0 when idle).
    pub fn dispatch_depth(&self) -> usize {
        self.inner.depth.get()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Step back to the previously recorded state and notify subscribers.
    ///
    /// Returns `Ok(false)` when there is nothing to undo.
    pub fn undo(&self) -> Result<bool, DispatchError> {
        let restored = self.inner.history.borrow_mut().undo();
        self.restore(restored, &ActionType::UNDO)
    }

    /// Re-apply a state previously stepped back from.
    pub fn redo(&self) -> Result<bool, DispatchError> {
        let restored = self.inner.history.borrow_mut().redo();
        self.restore(restored, &ActionType::REDO)
    }

    pub fn can_undo(&self) -> bool {
        self.inner.history.borrow().can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.inner.history.borrow().can_redo()
    }

    /// Recorded states, oldest first.
    pub fn history(&self) -> Vec<Arc<S>> {
        self.inner.history.borrow().states.iter().cloned().collect()
    }

    /// Replace state with `state` run through the reducer with `@@RESET`.
    ///
    /// Clears history and notifies subscribers. Middleware is bypassed.
    pub fn reset(&self, state: S) -> Result<(), DispatchError> {
        let action = Action::of(ActionType::RESET);
        let reducer = Rc::clone(&self.inner.reducer.borrow());
        let next = reducer
            .reduce(&Arc::new(state), &action)
            .map_err(|source| DispatchError::Reducer {
                action: ActionType::RESET,
                source,
            })?;

        *self.inner.state.borrow_mut() = Arc::clone(&next);
        self.inner.history.borrow_mut().reset(Arc::clone(&next));
        tracing::debug!("store reset");
        self.notify(&ActionType::RESET, &next)
    }

    /// Weak handle for subscribers or middleware that must not keep the
    /// store alive.
    pub fn downgrade(&self) -> WeakStore<S> {
        WeakStore {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Terminal stage: apply the root reducer, replace state, notify.
    fn apply(&self, action: Action) -> Result<Action, DispatchError> {
        let reducer = Rc::clone(&self.inner.reducer.borrow());
        let current = self.get_state();

        let next = reducer
            .reduce(&current, &action)
            .map_err(|source| DispatchError::Reducer {
                action: action.kind().clone(),
                source,
            })?;

        let changed = !Arc::ptr_eq(&current, &next);
        *self.inner.state.borrow_mut() = Arc::clone(&next);
        if changed {
            self.inner.history.borrow_mut().record(Arc::clone(&next));
        }
        tracing::trace!(action = %action.kind(), changed, "state replaced");

        if changed || self.inner.config.notify == NotifyPolicy::Always {
            self.notify(action.kind(), &next)?;
        }
        Ok(action)
    }

    fn restore(&self, restored: Option<Arc<S>>, kind: &ActionType) -> Result<bool, DispatchError> {
        let Some(state) = restored else {
            return Ok(false);
        };
        *self.inner.state.borrow_mut() = Arc::clone(&state);
        tracing::debug!(action = %kind, "state restored from history");
        self.notify(kind, &state)?;
        Ok(true)
    }

    /// Call subscribers in registration order over a snapshot of the list.
    fn notify(&self, kind: &ActionType, state: &Arc<S>) -> Result<(), DispatchError> {
        let listeners: Vec<(SubscriptionId, Listener<S>)> = self
            .inner
            .subscribers
            .borrow()
            .iter()
            .map(|(id, listener)| (*id, Rc::clone(listener)))
            .collect();

        for (id, listener) in listeners {
            listener(state).map_err(|source| DispatchError::Subscriber {
                subscription: id,
                action: kind.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

/// Non-owning store handle, see [`Store::downgrade`].
pub struct WeakStore<S> {
    inner: Weak<Inner<S>>,
}

impl<S> Clone for WeakStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<S> WeakStore<S> {
    pub fn upgrade(&self) -> Option<Store<S>> {
        self.inner.upgrade().map(|inner| Store { inner })
    }
}

/// Builder for [`Store`].
pub struct StoreBuilder<S> {
    state: S,
    reducer: Rc<dyn Reducer<S>>,
    middleware: Vec<Rc<dyn Middleware<S>>>,
    config: StoreConfig,
}

impl<S: 'static> StoreBuilder<S> {
    pub fn new<R: Reducer<S> + 'static>(state: S, reducer: R) -> Self {
        Self {
            state,
            reducer: Rc::new(reducer),
            middleware: Vec::new(),
            config: StoreConfig::default(),
        }
    }

    /// Append a middleware. The first one added runs outermost.
    pub fn middleware<M: Middleware<S> + 'static>(mut self, middleware: M) -> Self {
        self.middleware.push(Rc::new(middleware));
        self
    }

    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Store<S> {
        let state = Arc::new(self.state);
        let history = History::new(Arc::clone(&state), self.config.history_limit);
        let inner = Inner {
            state: RefCell::new(state),
            reducer: RefCell::new(self.reducer),
            middleware: RefCell::new(Vec::new()),
            subscribers: RefCell::new(Vec::new()),
            history: RefCell::new(history),
            next_id: Cell::new(0),
            depth: Cell::new(0),
            config: self.config,
        };
        let middleware = self
            .middleware
            .into_iter()
            .map(|m| (MiddlewareId(inner.next_id()), m))
            .collect();
        *inner.middleware.borrow_mut() = middleware;

        Store {
            inner: Rc::new(inner),
        }
    }
}
