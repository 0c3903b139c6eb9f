//! Actions describe intended state transitions
//!
//! An [`Action`] is a type tag plus an optional JSON payload, a metadata map
//! and an error flag. Actions are immutable: every builder method consumes
//! the action and returns a new one, so middleware that stamps metadata
//! hands a fresh value down the chain.
//!
//! # Example
//!
//! ```
//! use state_dispatch_core::{Action, ActionType};
//! use serde_json::json;
//!
//! let action = Action::new("todos/ADD")
//!     .unwrap()
//!     .with_payload(json!({ "title": "write docs" }))
//!     .with_meta("source", "keyboard");
//!
//! assert_eq!(action.kind().as_str(), "todos/ADD");
//! assert_eq!(action.kind().namespace(), Some("todos"));
//! assert_eq!(action.meta_value("source"), Some(&json!("keyboard")));
//!
//! let loading = ActionType::from_static("FETCH").lifecycle("LOADING");
//! assert_eq!(loading.as_str(), "FETCH_LOADING");
//! ```

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::InvalidActionError;

/// Auxiliary annotations attached to an action.
pub type Meta = BTreeMap<String, Value>;

/// Meta key marking an action for [`AsyncMiddleware`](crate::AsyncMiddleware).
pub const META_ASYNC: &str = "async";
/// Meta key requesting cancellation of a running async action.
pub const META_CANCEL: &str = "cancel";
/// Meta key holding a debounce delay in milliseconds.
pub const META_DEBOUNCE_MS: &str = "debounce_ms";

/// Stable, non-empty identifier of an action.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ActionType(Cow<'static, str>);

impl ActionType {
    /// Dispatched by [`Store::reset`](crate::Store::reset).
    pub const RESET: ActionType = ActionType::from_static("@@RESET");
    /// Reserved for applications that prime reducers by hand after
    /// construction. The store itself never dispatches it.
    pub const INIT: ActionType = ActionType::from_static("@@INIT");
    /// Reserved for applications that announce a
    /// [`Store::replace_reducer`](crate::Store::replace_reducer) swap. The
    /// store itself never dispatches it.
    pub const REPLACE: ActionType = ActionType::from_static("@@REPLACE");
    /// Restores persisted state, see [`Hydrating`](crate::reducer::Hydrating).
    pub const HYDRATE: ActionType = ActionType::from_static("@@HYDRATE");
    /// Reported for subscriber failures during [`Store::undo`](crate::Store::undo).
    pub const UNDO: ActionType = ActionType::from_static("@@UNDO");
    /// Reported for subscriber failures during [`Store::redo`](crate::Store::redo).
    pub const REDO: ActionType = ActionType::from_static("@@REDO");
    pub const UPDATE: ActionType = ActionType::from_static("UPDATE");
    pub const SET: ActionType = ActionType::from_static("SET");
    pub const DELETE: ActionType = ActionType::from_static("DELETE");
    pub const CLEAR: ActionType = ActionType::from_static("CLEAR");
    pub const BATCH: ActionType = ActionType::from_static("BATCH");
    /// Dispatched by [`CrashReporterMiddleware`](crate::middleware::CrashReporterMiddleware).
    pub const ERROR_OCCURRED: ActionType = ActionType::from_static("ERROR_OCCURRED");

    /// Create a type from any string, rejecting the empty string.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Result<Self, InvalidActionError> {
        let name = name.into();
        if name.is_empty() {
            return Err(InvalidActionError::EmptyType);
        }
        Ok(Self(name))
    }

    /// Create a type from a string literal.
    ///
    /// # Panics
    ///
    /// Panics if `name` is empty. In a `const` context this is a compile error.
    pub const fn from_static(name: &'static str) -> Self {
        assert!(!name.is_empty(), "action type must not be empty");
        Self(Cow::Borrowed(name))
    }

    /// The type as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is a store-internal type (`@@` prefix).
    pub fn is_internal(&self) -> bool {
        self.0.starts_with("@@")
    }

    /// Namespace prefix before the first `/`, if any.
    pub fn namespace(&self) -> Option<&str> {
        self.0.split_once('/').map(|(ns, _)| ns)
    }

    /// Derive a lifecycle type such as `FETCH_LOADING` from `FETCH`.
    pub fn lifecycle(&self, suffix: &str) -> ActionType {
        Self(Cow::Owned(format!("{}_{}", self.0, suffix)))
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl AsRef<str> for ActionType {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for ActionType {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ActionType {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl TryFrom<String> for ActionType {
    type Error = InvalidActionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ActionType {
    type Error = InvalidActionError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value.to_owned())
    }
}

impl From<ActionType> for String {
    fn from(value: ActionType) -> Self {
        value.0.into_owned()
    }
}

/// An immutable description of one intended state change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    kind: ActionType,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    payload: Value,
    #[serde(
        default,
        deserialize_with = "nullable_meta",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    meta: Meta,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    error: bool,
}

/// `"meta": null` reads as no metadata.
fn nullable_meta<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Meta, D::Error> {
    Ok(Option::<Meta>::deserialize(deserializer)?.unwrap_or_default())
}

impl Action {
    /// Create an action from a type string.
    pub fn new(kind: impl Into<Cow<'static, str>>) -> Result<Self, InvalidActionError> {
        Ok(Self::of(ActionType::new(kind)?))
    }

    /// Create an action from an already validated type.
    pub fn of(kind: ActionType) -> Self {
        Self {
            kind,
            payload: Value::Null,
            meta: Meta::new(),
            error: false,
        }
    }

    /// Decode an action from its JSON form (`{"type": .., "payload": ..}`).
    pub fn from_value(value: Value) -> Result<Self, InvalidActionError> {
        match &value {
            Value::Object(map) => match map.get("type") {
                None | Some(Value::Null) => return Err(InvalidActionError::MissingType),
                Some(Value::String(s)) if s.is_empty() => {
                    return Err(InvalidActionError::EmptyType)
                }
                Some(_) => {}
            },
            other => {
                return Err(InvalidActionError::Malformed(format!(
                    "expected an object, got {other}"
                )))
            }
        }
        serde_json::from_value(value).map_err(|e| InvalidActionError::Malformed(e.to_string()))
    }

    /// Encode the action as JSON. Empty fields are always present here.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("type".into(), Value::String(self.kind.to_string()));
        map.insert("payload".into(), self.payload.clone());
        map.insert(
            "meta".into(),
            Value::Object(self.meta.clone().into_iter().collect()),
        );
        map.insert("error".into(), Value::Bool(self.error));
        Value::Object(map)
    }

    /// Return a copy carrying `payload`.
    pub fn with_payload(mut self, payload: impl Into<Value>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Return a copy with one metadata entry set.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Return a copy with the whole metadata map replaced.
    pub fn with_meta_map(mut self, meta: Meta) -> Self {
        self.meta = meta;
        self
    }

    /// Return a copy with the error flag set.
    pub fn with_error(mut self, error: bool) -> Self {
        self.error = error;
        self
    }

    pub fn kind(&self) -> &ActionType {
        &self.kind
    }

    /// The payload, or `None` when absent (`null`).
    pub fn payload(&self) -> Option<&Value> {
        (!self.payload.is_null()).then_some(&self.payload)
    }

    /// Decode the payload into a typed value.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub fn meta_value(&self, key: &str) -> Option<&Value> {
        self.meta.get(key)
    }

    /// True when `meta[key]` is the boolean `true`.
    pub fn meta_flag(&self, key: &str) -> bool {
        matches!(self.meta.get(key), Some(Value::Bool(true)))
    }

    pub fn meta_u64(&self, key: &str) -> Option<u64> {
        self.meta.get(key).and_then(Value::as_u64)
    }

    pub fn is_error(&self) -> bool {
        self.error
    }

    /// Whether the action asks for asynchronous handling (`meta.async == true`).
    pub fn is_async(&self) -> bool {
        self.meta_flag(META_ASYNC)
    }
}

impl From<ActionType> for Action {
    fn from(kind: ActionType) -> Self {
        Self::of(kind)
    }
}

/// Factory for namespaced actions (`"<namespace>/<TYPE>"`).
///
/// # Example
///
/// ```
/// use state_dispatch_core::ActionCreator;
///
/// let settings = ActionCreator::new("settings");
/// let action = settings.update("theme.name", "dark").unwrap();
/// assert_eq!(action.kind().as_str(), "settings/UPDATE");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionCreator {
    namespace: Option<String>,
}

impl ActionCreator {
    /// Create a creator for a namespace. An empty namespace means none.
    pub fn new(namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self {
            namespace: (!namespace.is_empty()).then_some(namespace),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Full type string for a short name.
    pub fn type_for(&self, name: &str) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}/{name}"),
            None => name.to_owned(),
        }
    }

    /// Create a namespaced action with a payload.
    pub fn create(&self, name: &str, payload: impl Into<Value>) -> Result<Action, InvalidActionError> {
        if name.is_empty() {
            return Err(InvalidActionError::EmptyType);
        }
        Ok(Action::new(self.type_for(name))?.with_payload(payload))
    }

    /// `UPDATE` with `{"path": .., "value": ..}`.
    pub fn update(&self, path: &str, value: impl Into<Value>) -> Result<Action, InvalidActionError> {
        let mut payload = Map::new();
        payload.insert("path".into(), Value::String(path.to_owned()));
        payload.insert("value".into(), value.into());
        self.create(ActionType::UPDATE.as_str(), Value::Object(payload))
    }

    /// `SET` with an object to merge.
    pub fn set(&self, data: Map<String, Value>) -> Result<Action, InvalidActionError> {
        self.create(ActionType::SET.as_str(), Value::Object(data))
    }

    /// `DELETE` with a dotted path.
    pub fn delete(&self, path: &str) -> Result<Action, InvalidActionError> {
        self.create(ActionType::DELETE.as_str(), path)
    }

    pub fn clear(&self) -> Result<Action, InvalidActionError> {
        self.create(ActionType::CLEAR.as_str(), Value::Null)
    }

    /// `BATCH` carrying the encoded actions in order.
    pub fn batch(&self, actions: &[Action]) -> Result<Action, InvalidActionError> {
        let items = actions.iter().map(Action::to_value).collect::<Vec<_>>();
        self.create(ActionType::BATCH.as_str(), Value::Array(items))
    }
}
