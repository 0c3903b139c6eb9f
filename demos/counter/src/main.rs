//! Counter - headless state-dispatch demo
//!
//! Walks one store through the whole pattern:
//! - State: a `counter` slice and a `settings` key/value slice
//! - Actions: derived from an enum, plus namespaced creators
//! - Reducer: slice reducers combined, wrapped for `BATCH` and `@@HYDRATE`
//! - Middleware: crash reporter, action log, timing, async lifecycle
//! - Owner loop: async results come back through the action queue
//!
//! Run with `RUST_LOG=debug` to see every action.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use state_dispatch::prelude::*;
use state_dispatch::{
    immutable_update, persist, ActionLogConfig, BoxError, HandlerReducer, META_ASYNC,
};
use tracing_subscriber::EnvFilter;

/// Headless counter demonstrating state-dispatch
#[derive(Parser, Debug)]
#[command(name = "counter")]
#[command(about = "A headless counter demonstrating state-dispatch patterns")]
struct Args {
    /// Number of increments to dispatch as one batch
    #[arg(long, short, default_value = "3")]
    steps: u32,

    /// Step size, loaded through an async action before counting
    #[arg(long, default_value = "1")]
    step: i64,

    /// Undo this many state changes at the end
    #[arg(long, default_value = "0")]
    undo: usize,

    /// Action patterns to log (e.g. "counter/*,settings/*")
    #[arg(long)]
    debug_actions: Option<String>,

    /// Action patterns to leave out of the log
    #[arg(long)]
    debug_actions_exclude: Option<String>,

    /// Write the final state to this file
    #[arg(long)]
    save: Option<PathBuf>,
}

#[derive(ActionType, Clone, Copy, Debug, PartialEq, Eq)]
#[action(namespace = "counter")]
enum CounterAction {
    Increment,
    Decrement,
    FetchStep,
}

fn lifecycle(action: CounterAction, stage: &str) -> String {
    action.action_type().lifecycle(stage).to_string()
}

fn set(state: &Value, path: &str, value: Value) -> Result<Arc<Value>, ReducerError> {
    Ok(Arc::new(immutable_update(state, path, value)))
}

fn count_by(state: &Value, sign: i64) -> Result<Arc<Value>, ReducerError> {
    let count = state["count"].as_i64().unwrap_or(0);
    let step = state["step"].as_i64().unwrap_or(1);
    set(state, "count", json!(count + sign * step))
}

fn counter_reducer() -> HandlerReducer<Value> {
    ReducerBuilder::new(json!({ "count": 0, "step": 1, "loading": false }))
        .on(CounterAction::Increment.as_str(), |state, _| count_by(state, 1))
        .on(CounterAction::Decrement.as_str(), |state, _| count_by(state, -1))
        .on(lifecycle(CounterAction::FetchStep, "LOADING"), |state, _| {
            set(state, "loading", json!(true))
        })
        .on(lifecycle(CounterAction::FetchStep, "SUCCESS"), |state, action| {
            let loaded = set(state, "loading", json!(false))?;
            set(&loaded, "step", action.payload().cloned().unwrap_or(json!(1)))
        })
        .on(lifecycle(CounterAction::FetchStep, "ERROR"), |state, _| {
            set(state, "loading", json!(false))
        })
        .build()
}

fn root_reducer() -> impl Reducer<Slices> {
    hydrating(batched(
        CombinedReducer::new()
            .slice("counter", counter_reducer())
            .slice("settings", PathReducer::namespaced("settings")),
    ))
}

fn fetch_step(
    action: &Action,
) -> impl std::future::Future<Output = Result<Value, BoxError>> + Send + 'static {
    let step = action.payload().and_then(Value::as_i64);
    async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        step.map(Value::from)
            .ok_or_else(|| BoxError::from("step must be an integer"))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let (action_tx, mut queue) = ActionQueue::channel();
    let logger = ActionLoggerMiddleware::with_log(ActionLogConfig::new(
        64,
        ActionLoggerConfig::new(
            args.debug_actions.as_deref(),
            args.debug_actions_exclude.as_deref(),
        ),
    ));
    let log = logger.handle();

    let store = Store::builder(Slices::new(), root_reducer())
        .middleware(CrashReporterMiddleware::new())
        .middleware(logger)
        .middleware(TimingMiddleware::new().slow_threshold(Duration::from_millis(5)))
        .middleware(AsyncMiddleware::new(action_tx).handler(CounterAction::FetchStep.as_str(), fetch_step))
        .config(StoreConfig::default().with_history_limit(32))
        .build();

    let _render = store.subscribe(|state: &Arc<Slices>| {
        tracing::info!(
            count = ?state.select_path("counter.count"),
            loading = ?state.select_path("counter.loading"),
            "render"
        );
    });

    // Load the step size; LOADING is applied before dispatch returns.
    store.dispatch(
        CounterAction::FetchStep
            .with_payload(args.step)
            .with_meta(META_ASYNC, true),
    )?;
    if let Some(completed) = queue.next().await {
        store.dispatch(completed)?;
    }

    let increments: Vec<Action> = (0..args.steps)
        .map(|_| CounterAction::Increment.action())
        .collect();
    store.dispatch(ActionCreator::default().batch(&increments)?)?;
    store.dispatch(CounterAction::Decrement.action())?;

    let settings = ActionCreator::new("settings");
    store.dispatch(settings.update("theme", "dark")?)?;

    for _ in 0..args.undo {
        if !store.undo()? {
            break;
        }
    }

    if let Some(log) = log {
        for entry in log.entries() {
            tracing::debug!(
                sequence = entry.sequence,
                action = %entry.kind,
                changed = ?entry.state_changed,
                "logged"
            );
        }
    }

    if let Some(path) = &args.save {
        persist::save(&store, path)?;
        tracing::info!(path = %path.display(), "state saved");
    }

    println!("{}", serde_json::to_string_pretty(&store.get_state().to_value())?);
    Ok(())
}
