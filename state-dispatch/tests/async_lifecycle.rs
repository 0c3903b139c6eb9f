//! Async actions end to end: middleware, task, queue, reducer

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use state_dispatch::testing::Recorder;
use state_dispatch::{
    assert_dispatched, assert_not_dispatched, Action, ActionLoggerMiddleware, ActionQueue,
    AsyncMiddleware, BoxError, CombinedReducer, ReducerBuilder, Slices, Store, META_ASYNC,
};
use tokio_util::sync::CancellationToken;

fn user_slice() -> impl state_dispatch::Reducer<Value> {
    ReducerBuilder::new(json!({ "loading": false, "user": null }))
        .on("FETCH_LOADING", |_: &Arc<Value>, _: &Action| {
            Ok(Arc::new(json!({ "loading": true, "user": null })))
        })
        .on("FETCH_SUCCESS", |_: &Arc<Value>, action: &Action| {
            Ok(Arc::new(json!({ "loading": false, "user": action.payload() })))
        })
        .on("FETCH_ERROR", |_: &Arc<Value>, action: &Action| {
            Ok(Arc::new(json!({ "loading": false, "user": null, "error": action.payload() })))
        })
        .build()
}

fn fetch_user(id: u64) -> Action {
    Action::new("FETCH")
        .unwrap()
        .with_payload(id)
        .with_meta(META_ASYNC, true)
}

fn build(recorder: &Recorder) -> (Store<Slices>, ActionQueue) {
    let (tx, queue) = ActionQueue::channel();
    let api = AsyncMiddleware::new(tx).handler("FETCH", |action: &Action| {
        let id = action.payload().and_then(Value::as_u64);
        async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            match id {
                Some(id) => Ok::<_, BoxError>(json!({ "id": id, "name": format!("user-{id}") })),
                None => Err("user id required".into()),
            }
        }
    });

    let store = Store::builder(Slices::new(), CombinedReducer::new().slice("users", user_slice()))
        .middleware(api)
        .middleware(recorder.clone())
        .build();
    (store, queue)
}

#[tokio::test]
async fn test_fetch_loading_then_success() {
    let recorder = Recorder::new();
    let (store, mut queue) = build(&recorder);

    store.dispatch(fetch_user(7)).unwrap();
    assert_eq!(recorder.kinds(), vec!["FETCH_LOADING"]);
    assert_eq!(store.get_state().select_path("users.loading"), Some(&json!(true)));

    let done = tokio::time::timeout(Duration::from_millis(500), queue.next())
        .await
        .expect("timeout")
        .expect("queue closed");
    store.dispatch(done).unwrap();

    assert_eq!(recorder.kinds(), vec!["FETCH_LOADING", "FETCH_SUCCESS"]);
    let success = recorder.actions().pop().unwrap();
    assert_eq!(success.payload(), Some(&json!({ "id": 7, "name": "user-7" })));
    assert_eq!(store.get_state().select_path("users.user.id"), Some(&json!(7)));
    assert_eq!(store.get_state().select_path("users.loading"), Some(&json!(false)));
}

#[tokio::test]
async fn test_fetch_failure_dispatches_error() {
    let recorder = Recorder::new();
    let (store, mut queue) = build(&recorder);

    store
        .dispatch(Action::new("FETCH").unwrap().with_meta(META_ASYNC, true))
        .unwrap();
    let failed = tokio::time::timeout(Duration::from_millis(500), queue.next())
        .await
        .expect("timeout")
        .expect("queue closed");
    store.dispatch(failed).unwrap();

    let actions = recorder.take();
    assert_dispatched!(actions, "FETCH_ERROR", |a: &Action| a.is_error());
    assert_not_dispatched!(actions, "FETCH_SUCCESS");
    assert_eq!(
        store.get_state().select_path("users.error"),
        Some(&json!("user id required"))
    );
}

#[tokio::test]
async fn test_queue_run_until_cancelled() {
    let recorder = Recorder::new();
    let (store, mut queue) = build(&recorder);
    let logger = ActionLoggerMiddleware::with_default_log();
    let log = logger.handle().unwrap();
    store.add_middleware(logger);

    store.dispatch(fetch_user(1)).unwrap();
    store.dispatch(fetch_user(2)).unwrap();

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });
    let dispatched = queue.run(&store, shutdown).await.unwrap();

    // the second fetch replaced the first
    assert_eq!(dispatched, 1);
    assert_eq!(store.get_state().select_path("users.user.id"), Some(&json!(2)));
    assert!(log.entries().iter().any(|e| e.kind == "FETCH_SUCCESS" && e.state_changed == Some(true)));
}
