//! General purpose middleware: timing, validation and crash reporting

use std::cell::Cell;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::json;

use crate::action::{Action, ActionType};
use crate::error::DispatchError;
use crate::store::{Middleware, Next, Store};

/// Reports how long each dispatch took through the rest of the chain.
///
/// Durations are emitted at `debug`; dispatches slower than the optional
/// threshold are emitted at `warn`.
#[derive(Debug, Clone, Default)]
pub struct TimingMiddleware {
    slow_threshold: Option<Duration>,
}

impl TimingMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Warn about dispatches taking longer than `threshold`.
    pub fn slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = Some(threshold);
        self
    }
}

impl<S: 'static> Middleware<S> for TimingMiddleware {
    fn handle(
        &self,
        _store: &Store<S>,
        action: Action,
        next: Next<'_, S>,
    ) -> Result<Action, DispatchError> {
        let kind = action.kind().clone();
        let start = Instant::now();
        let result = next.run(action);
        let elapsed = start.elapsed();
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;

        match self.slow_threshold {
            Some(threshold) if elapsed > threshold => {
                tracing::warn!(action = %kind, elapsed_ms, "slow dispatch")
            }
            _ => tracing::debug!(action = %kind, elapsed_ms, "dispatch timed"),
        }
        result
    }

    fn name(&self) -> &'static str {
        "TimingMiddleware"
    }
}

type Validator = Box<dyn Fn(&Action) -> Result<(), String>>;

/// Rejects actions that fail the validator registered for their type.
///
/// A rejected action is logged at `warn` and swallowed: `dispatch` still
/// returns `Ok` with the action, but the reducer never sees it. Types
/// without a validator pass through.
///
/// # Example
///
/// ```
/// use state_dispatch_core::ValidationMiddleware;
///
/// let validation = ValidationMiddleware::new().validator("SET_AGE", |action| {
///     match action.payload().and_then(|p| p.as_u64()) {
///         Some(age) if age < 150 => Ok(()),
///         _ => Err("age must be a number below 150".into()),
///     }
/// });
/// assert!(validation.validates("SET_AGE"));
/// ```
#[derive(Default)]
pub struct ValidationMiddleware {
    validators: HashMap<String, Validator>,
}

impl ValidationMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the validator for `kind`, replacing any previous one.
    pub fn validator<F>(mut self, kind: impl Into<String>, validator: F) -> Self
    where
        F: Fn(&Action) -> Result<(), String> + 'static,
    {
        self.validators.insert(kind.into(), Box::new(validator));
        self
    }

    pub fn validates(&self, kind: &str) -> bool {
        self.validators.contains_key(kind)
    }
}

impl std::fmt::Debug for ValidationMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationMiddleware")
            .field("validators", &self.validators.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<S: 'static> Middleware<S> for ValidationMiddleware {
    fn handle(
        &self,
        _store: &Store<S>,
        action: Action,
        next: Next<'_, S>,
    ) -> Result<Action, DispatchError> {
        if let Some(validator) = self.validators.get(action.kind().as_str()) {
            if let Err(reason) = validator(&action) {
                tracing::warn!(action = %action.kind(), %reason, "action failed validation");
                return Ok(action);
            }
        }
        next.run(action)
    }

    fn name(&self) -> &'static str {
        "ValidationMiddleware"
    }
}

/// Reports downstream failures as `ERROR_OCCURRED` actions.
///
/// When the rest of the chain fails, the error is logged, an
/// `ERROR_OCCURRED` action with payload `{"action": <type>, "error":
/// <message>}` and the error flag is dispatched, and the original error is
/// returned to the caller. Failures of `ERROR_OCCURRED` itself are not
/// reported again.
///
/// A failure inside a nested dispatch is reported once, for the innermost
/// action. Outer dispatches the same error propagates through stay quiet.
#[derive(Debug, Clone, Default)]
pub struct CrashReporterMiddleware {
    /// Set while an already reported error travels up nested dispatches.
    reported: Cell<bool>,
}

impl CrashReporterMiddleware {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S: 'static> Middleware<S> for CrashReporterMiddleware {
    fn handle(
        &self,
        store: &Store<S>,
        action: Action,
        next: Next<'_, S>,
    ) -> Result<Action, DispatchError> {
        let outermost = store.dispatch_depth() <= 1;
        let kind = action.kind().clone();
        let err = match next.run(action) {
            Ok(action) => {
                self.reported.set(false);
                return Ok(action);
            }
            Err(err) => err,
        };

        if !self.reported.get() {
            tracing::error!(action = %kind, error = %err, "dispatch failed");
            if kind != ActionType::ERROR_OCCURRED {
                let report = Action::of(ActionType::ERROR_OCCURRED)
                    .with_payload(json!({ "action": kind.as_str(), "error": err.to_string() }))
                    .with_error(true);
                if let Err(report_err) = store.dispatch(report) {
                    tracing::error!(action = %kind, error = %report_err, "crash report failed");
                }
            }
            self.reported.set(!outermost);
        } else if outermost {
            self.reported.set(false);
        }
        Err(err)
    }

    fn name(&self) -> &'static str {
        "CrashReporterMiddleware"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReducerError;
    use serde_json::Value;
    use std::sync::Arc;

    fn reducer(state: &Arc<Value>, action: &Action) -> Result<Arc<Value>, ReducerError> {
        match action.kind().as_str() {
            "SET_AGE" => Ok(Arc::new(json!({ "age": action.payload() }))),
            "EXPLODE" => Err(ReducerError::new("kaboom")),
            "ERROR_OCCURRED" => Ok(Arc::new(json!({ "crash": action.payload() }))),
            _ => Ok(Arc::clone(state)),
        }
    }

    fn age_validation() -> ValidationMiddleware {
        ValidationMiddleware::new().validator("SET_AGE", |action| {
            match action.payload().and_then(Value::as_u64) {
                Some(age) if age < 150 => Ok(()),
                _ => Err("age must be a number below 150".into()),
            }
        })
    }

    #[test]
    fn test_validation_swallows_invalid() {
        let store = Store::builder(json!({}), reducer)
            .middleware(age_validation())
            .build();

        let returned = store
            .dispatch(Action::new("SET_AGE").unwrap().with_payload(400))
            .unwrap();
        assert_eq!(returned.payload(), Some(&json!(400)));
        assert_eq!(*store.get_state(), json!({}));

        store
            .dispatch(Action::new("SET_AGE").unwrap().with_payload(40))
            .unwrap();
        assert_eq!(*store.get_state(), json!({ "age": 40 }));
    }

    #[test]
    fn test_validation_ignores_unregistered_types() {
        let validation = age_validation();
        assert!(validation.validates("SET_AGE"));
        assert!(!validation.validates("OTHER"));

        let store = Store::builder(json!({}), reducer).middleware(validation).build();
        assert!(store.dispatch(Action::new("OTHER").unwrap()).is_ok());
    }

    #[test]
    fn test_crash_reporter_dispatches_error_occurred() {
        let store = Store::builder(json!({}), reducer)
            .middleware(CrashReporterMiddleware::new())
            .build();

        let err = store.dispatch(Action::new("EXPLODE").unwrap()).unwrap_err();
        assert!(matches!(err, DispatchError::Reducer { .. }));

        let crash = &store.get_state()["crash"];
        assert_eq!(crash["action"], json!("EXPLODE"));
        assert!(crash["error"].as_str().unwrap().contains("kaboom"));
    }

    #[test]
    fn test_crash_reporter_does_not_report_itself() {
        let always_fails = |_: &Arc<Value>, action: &Action| -> Result<Arc<Value>, ReducerError> {
            Err(ReducerError::new(format!("cannot handle {}", action.kind())))
        };
        let store = Store::builder(json!({}), always_fails)
            .middleware(CrashReporterMiddleware::new())
            .build();

        let err = store.dispatch(Action::new("ANY").unwrap()).unwrap_err();
        assert_eq!(err.action(), Some(&ActionType::from_static("ANY")));
        assert_eq!(store.dispatch_depth(), 0);
    }

    #[test]
    fn test_crash_reporter_reports_nested_failure_once() {
        let crashes = |state: &Arc<Value>, action: &Action| -> Result<Arc<Value>, ReducerError> {
            match action.kind().as_str() {
                "CHILD" => Err(ReducerError::new("child failed")),
                "ERROR_OCCURRED" => {
                    let mut seen = state.as_array().cloned().unwrap_or_default();
                    seen.push(action.payload().cloned().unwrap_or(Value::Null));
                    Ok(Arc::new(Value::Array(seen)))
                }
                _ => Ok(Arc::clone(state)),
            }
        };
        let spawn_child = crate::store::from_fn(
            |store: &Store<Value>, action: Action, next: Next<'_, Value>| {
                if action.kind() == "PARENT" {
                    store.dispatch(Action::new("CHILD").unwrap())?;
                }
                next.run(action)
            },
        );
        let store = Store::builder(json!([]), crashes)
            .middleware(CrashReporterMiddleware::new())
            .middleware(spawn_child)
            .build();

        let err = store.dispatch(Action::new("PARENT").unwrap()).unwrap_err();
        assert_eq!(err.action(), Some(&ActionType::from_static("CHILD")));

        let reports = store.get_state();
        assert_eq!(reports.as_array().map(Vec::len), Some(1));
        assert_eq!(reports[0]["action"], json!("CHILD"));

        // a later failure is reported again
        store.dispatch(Action::new("CHILD").unwrap()).unwrap_err();
        assert_eq!(store.get_state().as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn test_timing_passes_result_through() {
        let store = Store::builder(json!({}), reducer)
            .middleware(TimingMiddleware::new().slow_threshold(Duration::from_secs(5)))
            .build();

        store
            .dispatch(Action::new("SET_AGE").unwrap().with_payload(3))
            .unwrap();
        assert_eq!(*store.get_state(), json!({ "age": 3 }));
        assert!(store.dispatch(Action::new("EXPLODE").unwrap()).is_err());
    }
}
