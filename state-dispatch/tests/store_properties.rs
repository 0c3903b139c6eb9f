//! Store behavior through the public facade

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use serde_json::{json, Value};
use state_dispatch::{
    from_fn, Action, ActionType, CombinedReducer, DispatchError, Next, Reducer, ReducerError,
    Slices, Store,
};

fn act(kind: &'static str) -> Action {
    Action::of(ActionType::from_static(kind))
}

fn counter(state: &Arc<Value>, action: &Action) -> Result<Arc<Value>, ReducerError> {
    let delta = match action.kind().as_str() {
        "INCREMENT" => 1,
        "DECREMENT" => -1,
        "EXPLODE" => return Err(ReducerError::new("counter exploded")),
        _ => return Ok(Arc::clone(state)),
    };
    Ok(Arc::new(json!(state.as_i64().unwrap_or(0) + delta)))
}

fn action_log(state: &Arc<Value>, action: &Action) -> Result<Arc<Value>, ReducerError> {
    let mut entries = state.as_array().cloned().unwrap_or_default();
    entries.push(json!(action.kind().as_str()));
    Ok(Arc::new(Value::Array(entries)))
}

fn toggles(state: &Arc<Value>, action: &Action) -> Result<Arc<Value>, ReducerError> {
    match action.kind().as_str() {
        "TOGGLE" => Ok(Arc::new(json!(!state.as_bool().unwrap_or(false)))),
        _ => Ok(Arc::clone(state)),
    }
}

fn counter_root(state: &Arc<Value>, action: &Action) -> Result<Arc<Value>, ReducerError> {
    let current = Arc::new(state["counter"].clone());
    let next = counter(&current, action)?;
    if Arc::ptr_eq(&current, &next) {
        return Ok(Arc::clone(state));
    }
    Ok(Arc::new(json!({ "counter": Value::clone(&next) })))
}

fn counter_store() -> Store<Value> {
    Store::new(json!({ "counter": 0 }), counter_root)
}

#[test]
fn test_unmatched_action_returns_same_state() {
    let reducer = CombinedReducer::new().slice("counter", counter).slice("flag", toggles);
    let state = Arc::new(Slices::from_value(json!({ "counter": 3, "flag": false })).unwrap());

    let next = reducer.reduce(&state, &act("UNRELATED")).unwrap();
    assert!(Arc::ptr_eq(&state, &next));

    let store = Store::new(Slices::clone(&state), reducer);
    let before = store.get_state();
    store.dispatch(act("UNRELATED")).unwrap();
    assert!(Arc::ptr_eq(&before, &store.get_state()));
}

#[test]
fn test_combined_reducer_isolates_slices() {
    let store = Store::new(
        Slices::from_value(json!({ "a": 0, "b": true })).unwrap(),
        CombinedReducer::new().slice("a", counter).slice("b", toggles),
    );
    let before = store.get_state();

    store.dispatch(act("INCREMENT")).unwrap();

    let after = store.get_state();
    assert_eq!(after.select_path("a"), Some(&json!(1)));
    assert!(Arc::ptr_eq(
        before.get("b").unwrap(),
        after.get("b").unwrap()
    ));
}

#[test]
fn test_reducer_failure_leaves_state_untouched() {
    let store = counter_store();
    store.dispatch(act("INCREMENT")).unwrap();
    let before = store.get_state();

    let err = store.dispatch(act("EXPLODE")).unwrap_err();

    assert!(matches!(err, DispatchError::Reducer { ref action, .. } if action == "EXPLODE"));
    assert!(Arc::ptr_eq(&before, &store.get_state()));
}

#[test]
fn test_subscribers_see_same_state_in_order() {
    let store = counter_store();
    let seen: Rc<RefCell<Vec<(&'static str, Arc<Value>)>>> = Rc::default();

    for name in ["f1", "f2", "f3"] {
        let seen = Rc::clone(&seen);
        store.subscribe(move |state| seen.borrow_mut().push((name, Arc::clone(state))));
    }

    store.dispatch(act("INCREMENT")).unwrap();

    let seen = seen.borrow();
    let names: Vec<_> = seen.iter().map(|(name, _)| *name).collect();
    assert_eq!(names, vec!["f1", "f2", "f3"]);
    let current = store.get_state();
    assert!(seen.iter().all(|(_, state)| Arc::ptr_eq(state, &current)));
}

#[test]
fn test_unsubscribe_twice_leaves_others_alone() {
    let store = counter_store();
    let first = Rc::new(Cell::new(0));
    let second = Rc::new(Cell::new(0));

    let f = Rc::clone(&first);
    let subscription = store.subscribe(move |_| f.set(f.get() + 1));
    let s = Rc::clone(&second);
    store.subscribe(move |_| s.set(s.get() + 1));

    store.dispatch(act("INCREMENT")).unwrap();
    assert!(subscription.unsubscribe());
    assert!(!subscription.unsubscribe());
    store.dispatch(act("INCREMENT")).unwrap();

    assert_eq!(first.get(), 1);
    assert_eq!(second.get(), 2);
}

#[test]
fn test_short_circuit_skips_reducer_and_subscribers() {
    let store = counter_store();
    let notified = Rc::new(Cell::new(0));
    let n = Rc::clone(&notified);
    store.subscribe(move |_| n.set(n.get() + 1));

    store.add_middleware(
        from_fn(|_: &Store<Value>, action: Action, next: Next<'_, Value>| {
            if action.kind() == "INCREMENT" {
                return Ok(action);
            }
            next.run(action)
        })
        .named("Swallow"),
    );

    let before = store.get_state();
    store.dispatch(act("INCREMENT")).unwrap();

    assert!(Arc::ptr_eq(&before, &store.get_state()));
    assert_eq!(notified.get(), 0);

    store.dispatch(act("DECREMENT")).unwrap();
    assert_eq!(*store.get_state(), json!({ "counter": -1 }));
    assert_eq!(notified.get(), 1);
}

#[test]
fn test_nested_dispatch_completes_before_outer_loop_continues() {
    let store = counter_store();
    let log: Rc<RefCell<Vec<String>>> = Rc::default();

    let weak = store.downgrade();
    let l = Rc::clone(&log);
    store.try_subscribe(move |state| {
        let count = state["counter"].as_i64().unwrap_or(0);
        l.borrow_mut().push(format!("f1 saw {count}"));
        if count == 1 {
            if let Some(store) = weak.upgrade() {
                store.dispatch(act("INCREMENT"))?;
            }
        }
        Ok(())
    });
    let l = Rc::clone(&log);
    store.subscribe(move |state| l.borrow_mut().push(format!("f2 saw {}", state["counter"])));

    store.dispatch(act("INCREMENT")).unwrap();

    assert_eq!(
        *log.borrow(),
        vec!["f1 saw 1", "f1 saw 2", "f2 saw 2", "f2 saw 1"]
    );
}

#[test]
fn test_counter_end_to_end() {
    let store = counter_store();

    for kind in ["INCREMENT", "INCREMENT", "DECREMENT"] {
        store.dispatch(act(kind)).unwrap();
    }

    assert_eq!(*store.get_state(), json!({ "counter": 1 }));
}

#[test]
fn test_combined_counter_and_log() {
    let initial = Slices::from_value(json!({ "counter": 0, "log": [] })).unwrap();
    let original_log = Arc::clone(initial.get("log").unwrap());
    let store = Store::new(
        initial,
        CombinedReducer::new()
            .slice("counter", counter)
            .slice("log", action_log),
    );

    store.dispatch(act("INCREMENT")).unwrap();

    let state = store.get_state();
    assert_eq!(state.to_value(), json!({ "counter": 1, "log": ["INCREMENT"] }));
    assert!(!Arc::ptr_eq(&original_log, state.get("log").unwrap()));
    assert_eq!(*original_log, json!([]));
}

#[test]
fn test_json_action_through_store() {
    let store = counter_store();

    store
        .dispatch_value(json!({ "type": "INCREMENT", "meta": { "source": "test" } }))
        .unwrap();
    let err = store.dispatch_value(json!({ "payload": 1 })).unwrap_err();

    assert!(matches!(err, DispatchError::InvalidAction(_)));
    assert_eq!(*store.get_state(), json!({ "counter": 1 }));
}
