//! Store configuration

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default number of states kept for undo/redo.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// When subscribers are notified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyPolicy {
    /// After every dispatch that reaches the reducer.
    #[default]
    Always,
    /// Only when the reducer returned a different state `Arc`.
    OnChange,
}

/// Parse a config struct from a JSON document that must be an object.
///
/// Sequences are rejected even though `#[serde(default)]` structs accept them.
pub(crate) fn from_json_object<T: DeserializeOwned>(json: &str) -> Result<T, serde_json::Error> {
    let value: Value = serde_json::from_str(json)?;
    if !value.is_object() {
        return Err(serde_json::Error::custom(format!(
            "expected a JSON object, got {value}"
        )));
    }
    serde_json::from_value(value)
}

/// Runtime options for a [`Store`](crate::Store).
///
/// # Example
///
/// ```
/// use state_dispatch_core::{NotifyPolicy, StoreConfig};
///
/// let config = StoreConfig::from_json_str(r#"{ "notify": "on_change" }"#).unwrap();
/// assert_eq!(config.notify, NotifyPolicy::OnChange);
/// assert_eq!(config.history_limit, 100);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Maximum recorded states; `0` disables history.
    pub history_limit: usize,
    pub notify: NotifyPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            notify: NotifyPolicy::Always,
        }
    }
}

impl StoreConfig {
    /// Parse a JSON object; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        from_json_object(json)
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn with_notify(mut self, notify: NotifyPolicy) -> Self {
        self.notify = notify;
        self
    }
}
