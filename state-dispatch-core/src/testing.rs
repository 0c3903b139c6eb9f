//! Test utilities for state-dispatch applications
//!
//! - [`Recorder`]: middleware that keeps every action reaching it
//! - [`TestHarness`]: a store wired with a recorder, a notification counter
//!   and an action queue standing in for background tasks
//! - Assertion macros over recorded actions, matching by action type
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use serde_json::{json, Value};
//! use state_dispatch_core::testing::TestHarness;
//! use state_dispatch_core::{assert_dispatched, assert_not_dispatched, Action, ReducerError};
//!
//! fn reducer(state: &Arc<Value>, action: &Action) -> Result<Arc<Value>, ReducerError> {
//!     match action.kind().as_str() {
//!         "INCREMENT" => Ok(Arc::new(json!(state.as_i64().unwrap_or(0) + 1))),
//!         _ => Ok(Arc::clone(state)),
//!     }
//! }
//!
//! let harness = TestHarness::new(json!(0), reducer);
//! harness.dispatch(Action::new("INCREMENT").unwrap()).unwrap();
//!
//! let actions = harness.take_dispatched();
//! assert_dispatched!(actions, "INCREMENT");
//! assert_not_dispatched!(actions, "DECREMENT");
//! assert_eq!(*harness.state(), json!(1));
//! ```

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::action::Action;
use crate::error::DispatchError;
use crate::reducer::Reducer;
use crate::runtime::ActionQueue;
use crate::store::{Middleware, Next, Store, StoreBuilder, Subscription};

/// Middleware recording every action that reaches it, then forwarding it.
///
/// Clones share the same record, so keep one clone for assertions and hand
/// the other to the store.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    seen: Rc<RefCell<Vec<Action>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the recorded actions, oldest first.
    pub fn actions(&self) -> Vec<Action> {
        self.seen.borrow().clone()
    }

    /// Recorded action types, oldest first.
    pub fn kinds(&self) -> Vec<String> {
        self.seen
            .borrow()
            .iter()
            .map(|action| action.kind().to_string())
            .collect()
    }

    /// Take the recorded actions, leaving the record empty.
    pub fn take(&self) -> Vec<Action> {
        std::mem::take(&mut *self.seen.borrow_mut())
    }

    pub fn clear(&self) {
        self.seen.borrow_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.seen.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.borrow().is_empty()
    }
}

impl<S: 'static> Middleware<S> for Recorder {
    fn handle(
        &self,
        _store: &Store<S>,
        action: Action,
        next: Next<'_, S>,
    ) -> Result<Action, DispatchError> {
        self.seen.borrow_mut().push(action.clone());
        next.run(action)
    }

    fn name(&self) -> &'static str {
        "Recorder"
    }
}

/// Store test harness.
///
/// The recorder is the innermost middleware, so it sees exactly the actions
/// that reach the reducer, nested dispatches included. Actions sent through
/// [`sender`](Self::sender) wait in a queue until
/// [`process_emitted`](Self::process_emitted) dispatches them, the way a
/// store owner loop would.
pub struct TestHarness<S> {
    pub store: Store<S>,
    recorder: Recorder,
    notifications: Rc<Cell<usize>>,
    _subscription: Subscription,
    tx: mpsc::UnboundedSender<Action>,
    queue: ActionQueue,
}

impl<S: 'static> TestHarness<S> {
    /// Harness over a store with no other middleware.
    pub fn new<R: Reducer<S> + 'static>(state: S, reducer: R) -> Self {
        Self::from_builder(StoreBuilder::new(state, reducer))
    }

    /// Harness over a store configured by `builder`.
    pub fn from_builder(builder: StoreBuilder<S>) -> Self {
        let recorder = Recorder::new();
        let store = builder.middleware(recorder.clone()).build();

        let notifications = Rc::new(Cell::new(0));
        let counter = Rc::clone(&notifications);
        let subscription = store.subscribe(move |_| counter.set(counter.get() + 1));

        let (tx, queue) = ActionQueue::channel();
        Self {
            store,
            recorder,
            notifications,
            _subscription: subscription,
            tx,
            queue,
        }
    }

    pub fn dispatch(&self, action: Action) -> Result<Action, DispatchError> {
        self.store.dispatch(action)
    }

    /// Dispatch every action in order, stopping at the first failure.
    pub fn dispatch_all(
        &self,
        actions: impl IntoIterator<Item = Action>,
    ) -> Result<(), DispatchError> {
        for action in actions {
            self.store.dispatch(action)?;
        }
        Ok(())
    }

    pub fn state(&self) -> Arc<S> {
        self.store.get_state()
    }

    /// Sender standing in for background tasks.
    pub fn sender(&self) -> mpsc::UnboundedSender<Action> {
        self.tx.clone()
    }

    /// Queue an action as if a background task produced it.
    pub fn emit(&self, action: Action) {
        let _ = self.tx.send(action);
    }

    /// Take queued actions without dispatching them.
    pub fn drain_emitted(&mut self) -> Vec<Action> {
        std::iter::from_fn(|| self.queue.try_next()).collect()
    }

    /// Dispatch everything queued so far.
    pub fn process_emitted(&mut self) -> Result<usize, DispatchError> {
        self.queue.drain(&self.store)
    }

    /// Actions that reached the reducer since the last take.
    pub fn take_dispatched(&self) -> Vec<Action> {
        self.recorder.take()
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    /// How many times subscribers have been notified.
    pub fn notifications(&self) -> usize {
        self.notifications.get()
    }
}

/// Whether `action` has type `kind`. Used by the assertion macros.
pub fn kind_is<K: AsRef<str> + ?Sized>(action: &Action, kind: &K) -> bool {
    action.kind().as_str() == kind.as_ref()
}

/// Apply a predicate to an action. Used by the assertion macros.
pub fn check<F: Fn(&Action) -> bool>(action: &Action, predicate: F) -> bool {
    predicate(action)
}

/// Action types of `actions`, for assertion messages.
pub fn kinds<'a>(actions: impl IntoIterator<Item = &'a Action>) -> Vec<&'a str> {
    actions.into_iter().map(|action| action.kind().as_str()).collect()
}

/// Assert that an action of the given type was dispatched.
///
/// An optional predicate narrows the match further.
///
/// ```ignore
/// let actions = harness.take_dispatched();
/// assert_dispatched!(actions, "INCREMENT");
/// assert_dispatched!(actions, "SET", |a| a.payload() == Some(&json!(42)));
/// ```
#[macro_export]
macro_rules! assert_dispatched {
    ($actions:expr, $kind:expr) => {
        assert!(
            $actions.iter().any(|a| $crate::testing::kind_is(a, &$kind)),
            "Expected action `{}` to be dispatched, but got: {:?}",
            AsRef::<str>::as_ref(&$kind),
            $crate::testing::kinds(&$actions)
        );
    };
    ($actions:expr, $kind:expr, $predicate:expr) => {
        assert!(
            $actions.iter().any(|a| $crate::testing::kind_is(a, &$kind)
                && $crate::testing::check(a, $predicate)),
            "Expected action `{}` matching `{}` to be dispatched, but got: {:?}",
            AsRef::<str>::as_ref(&$kind),
            stringify!($predicate),
            $crate::testing::kinds(&$actions)
        );
    };
}

/// Assert that no action of the given type was dispatched.
///
/// ```ignore
/// assert_not_dispatched!(harness.take_dispatched(), "QUIT");
/// ```
#[macro_export]
macro_rules! assert_not_dispatched {
    ($actions:expr, $kind:expr) => {
        assert!(
            !$actions.iter().any(|a| $crate::testing::kind_is(a, &$kind)),
            "Expected action `{}` NOT to be dispatched, but got: {:?}",
            AsRef::<str>::as_ref(&$kind),
            $crate::testing::kinds(&$actions)
        );
    };
}

/// Find the first action of the given type.
///
/// ```ignore
/// let set = find_dispatched!(actions, "SET").unwrap();
/// assert_eq!(set.payload(), Some(&json!(42)));
/// ```
#[macro_export]
macro_rules! find_dispatched {
    ($actions:expr, $kind:expr) => {
        $actions.iter().find(|a| $crate::testing::kind_is(a, &$kind))
    };
}

/// Count actions of the given type.
///
/// ```ignore
/// assert_eq!(count_dispatched!(actions, "TICK"), 3);
/// ```
#[macro_export]
macro_rules! count_dispatched {
    ($actions:expr, $kind:expr) => {
        $actions
            .iter()
            .filter(|a| $crate::testing::kind_is(a, &$kind))
            .count()
    };
}
