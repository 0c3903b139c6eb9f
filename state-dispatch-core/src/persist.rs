//! Saving and restoring store state as JSON
//!
//! A snapshot is the serialized current state. Restoring goes through the
//! normal dispatch path: [`hydrate_action`] builds a `@@HYDRATE` action
//! carrying the snapshot, and a root reducer wrapped with
//! [`hydrating`](crate::reducer::hydrating) swaps it in. Middleware and
//! subscribers therefore observe a restore like any other change.

use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use crate::action::{Action, ActionType};
use crate::error::DispatchError;
use crate::store::Store;

/// Errors raised while saving or loading a snapshot file.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Serialize the current state.
pub fn snapshot<S: Serialize + 'static>(store: &Store<S>) -> Result<Value, serde_json::Error> {
    serde_json::to_value(&*store.get_state())
}

/// The `@@HYDRATE` action restoring `state`.
pub fn hydrate_action(state: Value) -> Action {
    Action::of(ActionType::HYDRATE).with_payload(state)
}

/// Dispatch a `@@HYDRATE` action restoring `state`.
pub fn hydrate<S: 'static>(store: &Store<S>, state: Value) -> Result<Action, DispatchError> {
    store.dispatch(hydrate_action(state))
}

/// Write a pretty-printed snapshot to `path`.
pub fn save<S: Serialize + 'static>(store: &Store<S>, path: impl AsRef<Path>) -> Result<(), PersistError> {
    let json = serde_json::to_string_pretty(&*store.get_state())?;
    std::fs::write(path.as_ref(), json)?;
    tracing::debug!(path = %path.as_ref().display(), "state snapshot saved");
    Ok(())
}

/// Read a snapshot from `path` and hydrate the store with it.
pub fn load<S: 'static>(store: &Store<S>, path: impl AsRef<Path>) -> Result<(), PersistError> {
    let json = std::fs::read_to_string(path.as_ref())?;
    let state: Value = serde_json::from_str(&json)?;
    hydrate(store, state)?;
    tracing::debug!(path = %path.as_ref().display(), "state snapshot loaded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reducer::{hydrating, CombinedReducer, PathReducer};
    use crate::state::Slices;
    use serde_json::json;
    use std::sync::Arc;

    fn store() -> Store<Slices> {
        let root = CombinedReducer::new().slice("settings", PathReducer::new());
        Store::new(Slices::new(), hydrating(root))
    }

    #[test]
    fn test_snapshot_then_hydrate() {
        let source = store();
        source
            .dispatch(Action::of(ActionType::UPDATE).with_payload(json!({ "path": "theme", "value": "dark" })))
            .unwrap();
        let saved = snapshot(&source).unwrap();
        assert_eq!(saved, json!({ "settings": { "theme": "dark" } }));

        let target = store();
        let before = target.get_state();
        hydrate(&target, saved).unwrap();

        assert!(!Arc::ptr_eq(&before, &target.get_state()));
        assert_eq!(target.get_state().select_path("settings.theme"), Some(&json!("dark")));
    }

    #[test]
    fn test_hydrate_rejects_wrong_shape() {
        let target = store();
        let err = hydrate(&target, json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, DispatchError::Reducer { ref action, .. } if *action == ActionType::HYDRATE));
        assert!(target.get_state().is_empty());
    }

    #[test]
    fn test_hydrate_action() {
        let action = hydrate_action(json!({ "a": 1 }));
        assert_eq!(action.kind(), &ActionType::HYDRATE);
        assert_eq!(action.payload(), Some(&json!({ "a": 1 })));
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("state-dispatch-{}.json", std::process::id()));

        let source = store();
        source
            .dispatch(Action::of(ActionType::UPDATE).with_payload(json!({ "path": "lang", "value": "en" })))
            .unwrap();
        save(&source, &path).unwrap();

        let target = store();
        load(&target, &path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(snapshot(&target).unwrap(), json!({ "settings": { "lang": "en" } }));
        assert!(matches!(load(&target, &path), Err(PersistError::Io(_))));
    }
}
