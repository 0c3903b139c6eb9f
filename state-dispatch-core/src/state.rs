//! Composite state and JSON path helpers
//!
//! [`Slices`] is the keyed state shape produced by
//! [`CombinedReducer`](crate::reducer::CombinedReducer): every slice sits
//! behind its own `Arc`, so unchanged slices keep their identity across
//! dispatches and subscribers can detect no-ops with `Arc::ptr_eq`.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keyed mapping from slice name to slice value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slices(BTreeMap<String, Arc<Value>>);

impl Slices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build slices from a JSON object; each top-level key becomes a slice.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Encode all slices as one JSON object.
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), Value::clone(v)))
                .collect(),
        )
    }

    pub fn get(&self, key: &str) -> Option<&Arc<Value>> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Return a copy with `key` set. Other slices share their `Arc`s.
    pub fn with(mut self, key: impl Into<String>, value: Arc<Value>) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    pub(crate) fn insert(&mut self, key: String, value: Arc<Value>) {
        self.0.insert(key, value);
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<Value>)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Select by dotted path; the first segment names the slice.
    pub fn select_path(&self, path: &str) -> Option<&Value> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        let slice = self.0.get(head)?;
        match rest {
            Some(rest) => select_path(slice, rest),
            None => Some(slice),
        }
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Slices {
    fn from_iter<T: IntoIterator<Item = (K, Value)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), Arc::new(v)))
                .collect(),
        )
    }
}

/// Look up a dotted path (`"user.profile.name"`) in a JSON value.
///
/// Array elements can be addressed by index (`"items.0"`).
pub fn select_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, key| match current {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Return a copy of `state` with `value` stored at the dotted `path`.
///
/// Missing or non-object intermediate keys are replaced by objects.
pub fn immutable_update(state: &Value, path: &str, value: Value) -> Value {
    let mut next = state.clone();
    let keys: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = keys.split_last() else {
        return next;
    };

    let mut current: &mut Value = &mut next;
    for key in parents {
        current = object_mut(current)
            .entry((*key).to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    object_mut(current).insert((*last).to_owned(), value);
    next
}

/// Return a copy of `state` without the key at the dotted `path`.
///
/// A path that does not exist yields an unmodified copy.
pub fn immutable_delete(state: &Value, path: &str) -> Value {
    let mut next = state.clone();
    let keys: Vec<&str> = path.split('.').collect();
    if let Some((last, parents)) = keys.split_last() {
        remove_at(&mut next, parents, last);
    }
    next
}

fn remove_at(value: &mut Value, parents: &[&str], last: &str) {
    let mut current = value;
    for key in parents {
        match current.as_object_mut().and_then(|map| map.get_mut(*key)) {
            Some(child) => current = child,
            None => return,
        }
    }
    if let Some(map) = current.as_object_mut() {
        map.remove(last);
    }
}

fn object_mut(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced by an object"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_slices_from_value() {
        let slices = Slices::from_value(json!({ "counter": 0, "log": [] })).unwrap();
        assert_eq!(slices.len(), 2);
        assert_eq!(slices.get("counter").map(|v| v.as_ref()), Some(&json!(0)));
        assert_eq!(slices.keys().collect::<Vec<_>>(), vec!["counter", "log"]);
        assert_eq!(slices.to_value(), json!({ "counter": 0, "log": [] }));

        assert!(Slices::from_value(json!([1, 2])).is_err());
    }

    #[test]
    fn test_slices_with_shares_untouched() {
        let slices: Slices = [("a", json!(1)), ("b", json!(2))].into_iter().collect();
        let b = slices.get("b").cloned().unwrap();

        let next = slices.clone().with("a", Arc::new(json!(10)));
        assert!(Arc::ptr_eq(next.get("b").unwrap(), &b));
        assert_eq!(slices.get("a").map(|v| v.as_ref()), Some(&json!(1)));
    }

    #[test]
    fn test_select_path() {
        let value = json!({ "user": { "profile": { "name": "ada" } }, "items": [10, 20] });
        assert_eq!(select_path(&value, "user.profile.name"), Some(&json!("ada")));
        assert_eq!(select_path(&value, "items.1"), Some(&json!(20)));
        assert_eq!(select_path(&value, "user.missing"), None);
        assert_eq!(select_path(&value, "items.x"), None);
        assert_eq!(select_path(&value, ""), Some(&value));

        let slices = Slices::from_value(value).unwrap();
        assert_eq!(slices.select_path("user.profile.name"), Some(&json!("ada")));
        assert_eq!(slices.select_path("items"), Some(&json!([10, 20])));
        assert_eq!(slices.select_path("nope.x"), None);
    }

    #[test]
    fn test_immutable_update() {
        let state = json!({ "user": { "name": "ada" } });
        let next = immutable_update(&state, "user.profile.theme", json!("dark"));

        assert_eq!(state, json!({ "user": { "name": "ada" } }));
        assert_eq!(
            next,
            json!({ "user": { "name": "ada", "profile": { "theme": "dark" } } })
        );

        let next = immutable_update(&json!({ "a": 1 }), "a.b", json!(2));
        assert_eq!(next, json!({ "a": { "b": 2 } }));
    }

    #[test]
    fn test_immutable_delete() {
        let state = json!({ "user": { "name": "ada", "age": 36 } });
        let next = immutable_delete(&state, "user.age");

        assert_eq!(next, json!({ "user": { "name": "ada" } }));
        assert_eq!(state["user"]["age"], json!(36));
        assert_eq!(immutable_delete(&state, "nope.age"), state);
    }
}
