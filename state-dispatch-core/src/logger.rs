//! Action logging with pattern-based filtering and in-memory storage
//!
//! [`ActionLoggerMiddleware`] traces every dispatched action through
//! `tracing` and can keep the most recent ones in an [`ActionLog`] ring
//! buffer, shared through an [`ActionLogHandle`] so the application can read
//! it after the middleware has been moved into the store.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use serde_json::{json, Value};
//! use state_dispatch_core::logger::{ActionLogConfig, ActionLoggerMiddleware};
//! use state_dispatch_core::{Action, ReducerError, Store};
//!
//! fn reducer(state: &Arc<Value>, _: &Action) -> Result<Arc<Value>, ReducerError> {
//!     Ok(Arc::clone(state))
//! }
//!
//! let logger = ActionLoggerMiddleware::with_log(ActionLogConfig::default());
//! let log = logger.handle().unwrap();
//!
//! let store = Store::builder(json!({}), reducer).middleware(logger).build();
//! store.dispatch(Action::new("CONNECT").unwrap()).unwrap();
//!
//! for entry in log.recent(10) {
//!     println!("{} {}", entry.elapsed_display(), entry.summary);
//! }
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::action::{Action, ActionType};
use crate::error::DispatchError;
use crate::store::{Middleware, Next, Store};

fn default_excludes() -> Vec<String> {
    vec!["TICK".to_string(), "RENDER".to_string()]
}

/// Configuration for action logging with glob pattern filtering.
///
/// Patterns support:
/// - `*` matches any sequence of characters
/// - `?` matches any single character
/// - Literal text matches exactly
///
/// # Examples
///
/// - `SEARCH_*` matches SEARCH_ADD_CHAR, SEARCH_CLEAR, etc.
/// - `todos/*` matches every action of the `todos` namespace
/// - `*_ERROR` matches FETCH_ERROR, SAVE_ERROR, etc.
/// - `TICK` matches only TICK
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionLoggerConfig {
    /// If non-empty, only log actions matching these patterns
    pub include_patterns: Vec<String>,
    /// Exclude actions matching these patterns (applied after include)
    pub exclude_patterns: Vec<String>,
}

impl Default for ActionLoggerConfig {
    fn default() -> Self {
        Self {
            include_patterns: Vec::new(),
            exclude_patterns: default_excludes(),
        }
    }
}

impl ActionLoggerConfig {
    /// Create a new config from comma-separated pattern strings
    ///
    /// # Arguments
    /// - `include`: comma-separated glob patterns (or None for all)
    /// - `exclude`: comma-separated glob patterns (or None for default excludes)
    ///
    /// # Example
    /// ```
    /// use state_dispatch_core::logger::ActionLoggerConfig;
    ///
    /// let config = ActionLoggerConfig::new(Some("SEARCH_*,CONNECT"), Some("TICK"));
    /// assert!(config.should_log("SEARCH_ADD_CHAR"));
    /// assert!(config.should_log("CONNECT"));
    /// assert!(!config.should_log("TICK"));
    /// ```
    pub fn new(include: Option<&str>, exclude: Option<&str>) -> Self {
        Self {
            include_patterns: include.map(split_patterns).unwrap_or_default(),
            exclude_patterns: exclude.map(split_patterns).unwrap_or_else(default_excludes),
        }
    }

    /// Parse a JSON document such as `{"include_patterns": ["todos/*"]}`.
    ///
    /// Missing fields take their defaults; anything but an object is an error.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        crate::config::from_json_object(json)
    }

    /// Create a config with specific pattern vectors
    pub fn with_patterns(include: Vec<String>, exclude: Vec<String>) -> Self {
        Self {
            include_patterns: include,
            exclude_patterns: exclude,
        }
    }

    /// Check if an action type should be logged based on include/exclude patterns
    pub fn should_log(&self, kind: &str) -> bool {
        if !self.include_patterns.is_empty()
            && !self.include_patterns.iter().any(|p| glob_match(p, kind))
        {
            return false;
        }
        !self.exclude_patterns.iter().any(|p| glob_match(p, kind))
    }
}

fn split_patterns(patterns: &str) -> Vec<String> {
    patterns
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

// ============================================================================
// In-Memory Action Log
// ============================================================================

/// An entry in the action log
#[derive(Debug, Clone)]
pub struct ActionLogEntry {
    pub kind: ActionType,
    /// Compact JSON of the payload, empty when there is none
    pub summary: String,
    /// Whether the action was flagged as an error
    pub error: bool,
    pub timestamp: Instant,
    /// Sequence number for ordering
    pub sequence: u64,
    /// Whether the action caused a state change (set once the chain returns)
    pub state_changed: Option<bool>,
}

impl ActionLogEntry {
    pub fn new(action: &Action, sequence: u64) -> Self {
        Self {
            kind: action.kind().clone(),
            summary: action.payload().map(Value::to_string).unwrap_or_default(),
            error: action.is_error(),
            timestamp: Instant::now(),
            sequence,
            state_changed: None,
        }
    }

    /// Time since this action was logged
    pub fn elapsed(&self) -> std::time::Duration {
        self.timestamp.elapsed()
    }

    /// Format the elapsed time for display (e.g., "2.3s", "150ms")
    pub fn elapsed_display(&self) -> String {
        let elapsed = self.elapsed();
        if elapsed.as_secs() >= 1 {
            format!("{:.1}s", elapsed.as_secs_f64())
        } else {
            format!("{}ms", elapsed.as_millis())
        }
    }
}

/// Configuration for the action log ring buffer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionLogConfig {
    /// Maximum number of entries to keep
    pub capacity: usize,
    pub filter: ActionLoggerConfig,
}

impl Default for ActionLogConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            filter: ActionLoggerConfig::default(),
        }
    }
}

impl ActionLogConfig {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    pub fn new(capacity: usize, filter: ActionLoggerConfig) -> Self {
        Self { capacity, filter }
    }
}

/// In-memory ring buffer for storing recent actions
///
/// Older entries are discarded when capacity is reached.
#[derive(Debug, Clone)]
pub struct ActionLog {
    entries: VecDeque<ActionLogEntry>,
    config: ActionLogConfig,
    next_sequence: u64,
}

impl Default for ActionLog {
    fn default() -> Self {
        Self::new(ActionLogConfig::default())
    }
}

impl ActionLog {
    pub fn new(config: ActionLogConfig) -> Self {
        Self {
            entries: VecDeque::with_capacity(config.capacity),
            config,
            next_sequence: 0,
        }
    }

    /// Log an action if it passes the filter.
    ///
    /// Returns the sequence number of the new entry, None if filtered out.
    pub fn log(&mut self, action: &Action) -> Option<u64> {
        if self.config.capacity == 0 || !self.config.filter.should_log(action.kind().as_str()) {
            return None;
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;

        if self.entries.len() >= self.config.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(ActionLogEntry::new(action, sequence));
        Some(sequence)
    }

    /// Record the outcome of the entry with `sequence`, if still buffered.
    ///
    /// Entries are addressed by sequence because nested dispatches log
    /// newer entries before the outer one completes.
    pub fn set_state_changed(&mut self, sequence: u64, changed: bool) {
        if let Some(entry) = self.entries.iter_mut().rev().find(|e| e.sequence == sequence) {
            entry.state_changed = Some(changed);
        }
    }

    /// All entries, oldest first
    pub fn entries(&self) -> impl Iterator<Item = &ActionLogEntry> {
        self.entries.iter()
    }

    /// The most recent N entries, newest first
    pub fn recent(&self, count: usize) -> impl Iterator<Item = &ActionLogEntry> {
        self.entries.iter().rev().take(count)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn config(&self) -> &ActionLogConfig {
        &self.config
    }
}

/// Shared read access to the log owned by an [`ActionLoggerMiddleware`].
#[derive(Debug, Clone, Default)]
pub struct ActionLogHandle(Rc<RefCell<ActionLog>>);

impl ActionLogHandle {
    /// Snapshot of all entries, oldest first.
    pub fn entries(&self) -> Vec<ActionLogEntry> {
        self.0.borrow().entries().cloned().collect()
    }

    /// Snapshot of the most recent N entries, newest first.
    pub fn recent(&self, count: usize) -> Vec<ActionLogEntry> {
        self.0.borrow().recent(count).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }

    /// Run `f` against the log without copying entries.
    pub fn with<R>(&self, f: impl FnOnce(&ActionLog) -> R) -> R {
        f(&self.0.borrow())
    }
}

// ============================================================================
// Middleware
// ============================================================================

/// Middleware that logs actions with configurable pattern filtering.
///
/// Supports two modes:
/// - **Tracing only** (default): logs via `tracing::debug!()`
/// - **With storage**: also keeps entries in an [`ActionLog`] ring buffer
///
/// With [`with_state`](Self::with_state) the previous and next state are
/// traced at `trace` level as well.
#[derive(Debug, Clone)]
pub struct ActionLoggerMiddleware {
    config: ActionLoggerConfig,
    log: Option<ActionLogHandle>,
    trace_state: bool,
    /// When false, the middleware only forwards actions.
    active: bool,
}

impl ActionLoggerMiddleware {
    /// Tracing only, no in-memory storage
    pub fn new(config: ActionLoggerConfig) -> Self {
        Self {
            config,
            log: None,
            trace_state: false,
            active: true,
        }
    }

    /// Tracing plus in-memory storage
    pub fn with_log(config: ActionLogConfig) -> Self {
        Self {
            config: config.filter.clone(),
            log: Some(ActionLogHandle(Rc::new(RefCell::new(ActionLog::new(config))))),
            trace_state: false,
            active: true,
        }
    }

    pub fn with_default_log() -> Self {
        Self::with_log(ActionLogConfig::default())
    }

    /// Default filter (excludes TICK and RENDER), tracing only
    pub fn default_filtering() -> Self {
        Self::new(ActionLoggerConfig::default())
    }

    /// No filtering, tracing only
    pub fn log_all() -> Self {
        Self::new(ActionLoggerConfig::with_patterns(vec![], vec![]))
    }

    /// Set whether the middleware is active.
    ///
    /// Useful for conditional logging based on CLI flags:
    ///
    /// ```ignore
    /// let logger = ActionLoggerMiddleware::default_filtering().active(args.debug);
    /// ```
    pub fn active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Also trace previous and next state around each logged action.
    pub fn with_state(mut self, trace_state: bool) -> Self {
        self.trace_state = trace_state;
        self
    }

    /// Handle to the in-memory log, if storage is enabled.
    pub fn handle(&self) -> Option<ActionLogHandle> {
        self.log.clone()
    }

    pub fn config(&self) -> &ActionLoggerConfig {
        &self.config
    }
}

impl<S: fmt::Debug + 'static> Middleware<S> for ActionLoggerMiddleware {
    fn handle(
        &self,
        store: &Store<S>,
        action: Action,
        next: Next<'_, S>,
    ) -> Result<Action, DispatchError> {
        if !self.active {
            return next.run(action);
        }

        let kind = action.kind().clone();
        let traced = self.config.should_log(kind.as_str());
        if traced {
            tracing::debug!(action = %kind, error = action.is_error(), "action");
        }
        let sequence = self.log.as_ref().and_then(|log| log.0.borrow_mut().log(&action));

        let before = store.get_state();
        if traced && self.trace_state {
            tracing::trace!(action = %kind, state = ?before, "prev state");
        }

        let result = next.run(action);

        let after = store.get_state();
        let changed = !Arc::ptr_eq(&before, &after);
        if let (Some(log), Some(sequence)) = (&self.log, sequence) {
            log.0.borrow_mut().set_state_changed(sequence, changed);
        }
        if traced {
            match &result {
                Ok(_) if self.trace_state => {
                    tracing::trace!(action = %kind, state = ?after, changed, "next state")
                }
                Ok(_) => {}
                Err(e) => tracing::debug!(action = %kind, error = %e, "dispatch failed"),
            }
        }
        result
    }

    fn name(&self) -> &'static str {
        "ActionLoggerMiddleware"
    }
}

/// Simple glob pattern matching supporting `*` and `?`.
///
/// - `*` matches zero or more characters
/// - `?` matches exactly one character
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < text.len() {
        match pattern.get(pi) {
            Some('*') => {
                star = Some((pi, ti));
                pi += 1;
            }
            Some(&c) if c == '?' || c == text[ti] => {
                pi += 1;
                ti += 1;
            }
            _ => match star {
                // backtrack: let the last star swallow one more char
                Some((spi, sti)) => {
                    star = Some((spi, sti + 1));
                    pi = spi + 1;
                    ti = sti + 1;
                }
                None => return false,
            },
        }
    }

    pattern[pi..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReducerError;
    use serde_json::json;

    fn act(kind: &'static str) -> Action {
        Action::of(ActionType::from_static(kind))
    }

    fn unfiltered(capacity: usize) -> ActionLog {
        ActionLog::new(ActionLogConfig::new(
            capacity,
            ActionLoggerConfig::with_patterns(vec![], vec![]),
        ))
    }

    #[test]
    fn test_glob_match_exact() {
        assert!(glob_match("TICK", "TICK"));
        assert!(!glob_match("TICK", "TOCK"));
        assert!(!glob_match("TICK", "TICK_TOCK"));
    }

    #[test]
    fn test_glob_match_star() {
        assert!(glob_match("SEARCH_*", "SEARCH_ADD_CHAR"));
        assert!(glob_match("SEARCH*", "SEARCH"));
        assert!(!glob_match("SEARCH*", "START_SEARCH"));
        assert!(glob_match("*SEARCH", "START_SEARCH"));
        assert!(glob_match("*SEARCH*", "START_SEARCH_NOW"));
        assert!(glob_match("todos/*", "todos/ADD"));
    }

    #[test]
    fn test_glob_match_question() {
        assert!(glob_match("TICK?", "TICKS"));
        assert!(!glob_match("TICK?", "TICK"));
        assert!(!glob_match("TICK?", "TICKSS"));
    }

    #[test]
    fn test_glob_match_combined() {
        assert!(glob_match("*ADD*", "SEARCH_ADD_CHAR"));
        assert!(glob_match("CONNECTION*ADD*", "CONNECTION_FORM_ADD_CHAR"));
        assert!(glob_match("*_ERROR", "FETCH_USER_ERROR"));
        assert!(!glob_match("*_ERROR", "FETCH_USER_ERRORS"));
    }

    #[test]
    fn test_config_include_and_exclude() {
        let config = ActionLoggerConfig::new(Some("FETCH_*"), Some("FETCH_*_LOADING"));
        assert!(config.should_log("FETCH_USER"));
        assert!(config.should_log("FETCH_USER_SUCCESS"));
        assert!(!config.should_log("FETCH_USER_LOADING"));
        assert!(!config.should_log("CONNECT"));
    }

    #[test]
    fn test_config_default() {
        let config = ActionLoggerConfig::default();
        assert!(!config.should_log("TICK"));
        assert!(!config.should_log("RENDER"));
        assert!(config.should_log("CONNECT"));
    }

    #[test]
    fn test_config_from_json() {
        let config: ActionLogConfig =
            serde_json::from_str(r#"{ "capacity": 5, "filter": { "include_patterns": ["A*"] } }"#)
                .unwrap();
        assert_eq!(config.capacity, 5);
        assert_eq!(config.filter.include_patterns, vec!["A*".to_string()]);
        assert_eq!(config.filter.exclude_patterns, default_excludes());
    }

    #[test]
    fn test_logger_config_from_json_str() {
        let config = ActionLoggerConfig::from_json_str(r#"{ "exclude_patterns": ["*_LOADING"] }"#).unwrap();
        assert!(config.include_patterns.is_empty());
        assert!(!config.should_log("FETCH_LOADING"));
        assert!(config.should_log("TICK"));

        assert!(ActionLoggerConfig::from_json_str("[]").is_err());
    }

    #[test]
    fn test_action_log_basic() {
        let mut log = ActionLog::default();
        assert!(log.is_empty());

        assert_eq!(log.log(&act("CONNECT").with_payload(json!({ "host": "a" }))), Some(0));
        assert_eq!(log.log(&act("TICK")), None);
        assert_eq!(log.len(), 1);

        let entry = log.entries().next().unwrap();
        assert_eq!(entry.kind, "CONNECT");
        assert_eq!(entry.summary, r#"{"host":"a"}"#);
        assert_eq!(entry.sequence, 0);
    }

    #[test]
    fn test_action_log_capacity() {
        let mut log = unfiltered(3);
        for _ in 0..4 {
            log.log(&act("CONNECT"));
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.entries().next().unwrap().sequence, 1);

        let recent: Vec<_> = log.recent(2).map(|e| e.sequence).collect();
        assert_eq!(recent, vec![3, 2]);
    }

    #[test]
    fn test_action_log_state_changed_by_sequence() {
        let mut log = unfiltered(10);
        let outer = log.log(&act("OUTER")).unwrap();
        let inner = log.log(&act("INNER")).unwrap();

        log.set_state_changed(inner, false);
        log.set_state_changed(outer, true);

        let changed: Vec<_> = log.entries().map(|e| e.state_changed).collect();
        assert_eq!(changed, vec![Some(true), Some(false)]);
    }

    #[test]
    fn test_entry_elapsed_display() {
        let entry = ActionLogEntry::new(&act("TEST"), 0);
        assert!(entry.elapsed_display().ends_with('s'));
    }

    fn counter(state: &Arc<Value>, action: &Action) -> Result<Arc<Value>, ReducerError> {
        match action.kind().as_str() {
            "INCREMENT" => Ok(Arc::new(json!(state.as_i64().unwrap_or(0) + 1))),
            _ => Ok(Arc::clone(state)),
        }
    }

    #[test]
    fn test_middleware_records_state_changes() {
        let logger = ActionLoggerMiddleware::with_default_log().with_state(true);
        let log = logger.handle().unwrap();
        let store = Store::builder(json!(0), counter).middleware(logger).build();

        store.dispatch(act("INCREMENT")).unwrap();
        store.dispatch(act("NOOP")).unwrap();
        store.dispatch(act("TICK")).unwrap();

        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].state_changed, Some(true));
        assert_eq!(entries[1].kind, "NOOP");
        assert_eq!(entries[1].state_changed, Some(false));
    }

    #[test]
    fn test_inactive_middleware_forwards_only() {
        let logger = ActionLoggerMiddleware::with_default_log().active(false);
        let log = logger.handle().unwrap();
        let store = Store::builder(json!(0), counter).middleware(logger).build();

        store.dispatch(act("INCREMENT")).unwrap();
        assert!(log.is_empty());
        assert_eq!(*store.get_state(), json!(1));
    }
}
