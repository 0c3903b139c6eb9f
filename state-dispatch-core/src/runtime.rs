//! Owner-loop plumbing for actions produced off the store's thread
//!
//! The store is single-threaded. Background tasks therefore never dispatch
//! directly: they send actions into an [`ActionQueue`] channel, and the task
//! that owns the store dispatches them one by one, each as its own cycle.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::action::Action;
use crate::error::DispatchError;
use crate::store::Store;

/// Receiving end of the action channel, drained by the store's owner.
///
/// # Example
///
/// ```ignore
/// let (tx, mut queue) = ActionQueue::channel();
/// let store = Store::builder(initial, reducer)
///     .middleware(AsyncMiddleware::new(tx).handler("FETCH", fetch))
///     .build();
///
/// let shutdown = CancellationToken::new();
/// queue.run(&store, shutdown.clone()).await?;
/// ```
#[derive(Debug)]
pub struct ActionQueue {
    rx: mpsc::UnboundedReceiver<Action>,
}

impl ActionQueue {
    /// Create the queue together with its first sender.
    ///
    /// The queue closes once every sender clone has been dropped.
    pub fn channel() -> (mpsc::UnboundedSender<Action>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }

    /// Dispatch every action already queued, without waiting.
    ///
    /// Returns how many actions were dispatched. Stops at the first failing
    /// dispatch; actions after it stay queued.
    pub fn drain<S: 'static>(&mut self, store: &Store<S>) -> Result<usize, DispatchError> {
        let mut dispatched = 0;
        while let Ok(action) = self.rx.try_recv() {
            store.dispatch(action)?;
            dispatched += 1;
        }
        Ok(dispatched)
    }

    /// Take the next queued action without waiting or dispatching it.
    pub fn try_next(&mut self) -> Option<Action> {
        self.rx.try_recv().ok()
    }

    /// Wait for the next action. `None` once all senders are gone.
    pub async fn next(&mut self) -> Option<Action> {
        self.rx.recv().await
    }

    /// Dispatch queued actions as they arrive until `cancel` fires or the
    /// channel closes.
    ///
    /// Returns how many actions were dispatched. A failing dispatch ends the
    /// loop and is returned.
    pub async fn run<S: 'static>(
        &mut self,
        store: &Store<S>,
        cancel: CancellationToken,
    ) -> Result<usize, DispatchError> {
        let mut dispatched = 0;
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    tracing::debug!(dispatched, "action queue cancelled");
                    break;
                }

                received = self.rx.recv() => {
                    let Some(action) = received else {
                        tracing::debug!(dispatched, "action queue closed");
                        break;
                    };
                    store.dispatch(action)?;
                    dispatched += 1;
                }
            }
        }
        Ok(dispatched)
    }

    /// Number of actions waiting to be dispatched.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReducerError;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;

    fn count(state: &Arc<Value>, action: &Action) -> Result<Arc<Value>, ReducerError> {
        match action.kind().as_str() {
            "ADD" => Ok(Arc::new(json!(state.as_i64().unwrap_or(0) + 1))),
            "BAD" => Err(ReducerError::new("bad")),
            _ => Ok(Arc::clone(state)),
        }
    }

    fn add() -> Action {
        Action::new("ADD").unwrap()
    }

    #[test]
    fn test_drain() {
        let store = Store::new(json!(0), count);
        let (tx, mut queue) = ActionQueue::channel();

        tx.send(add()).unwrap();
        tx.send(add()).unwrap();
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.drain(&store).unwrap(), 2);
        assert!(queue.is_empty());
        assert_eq!(*store.get_state(), json!(2));
    }

    #[test]
    fn test_drain_stops_at_failure() {
        let store = Store::new(json!(0), count);
        let (tx, mut queue) = ActionQueue::channel();

        tx.send(add()).unwrap();
        tx.send(Action::new("BAD").unwrap()).unwrap();
        tx.send(add()).unwrap();

        assert!(queue.drain(&store).is_err());
        assert_eq!(*store.get_state(), json!(1));
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_run_until_senders_dropped() {
        let store = Store::new(json!(0), count);
        let (tx, mut queue) = ActionQueue::channel();

        tokio::spawn(async move {
            for _ in 0..3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
                let _ = tx.send(add());
            }
        });

        let dispatched = queue.run(&store, CancellationToken::new()).await.unwrap();
        assert_eq!(dispatched, 3);
        assert_eq!(*store.get_state(), json!(3));
    }

    #[tokio::test]
    async fn test_run_until_cancelled() {
        let store = Store::new(json!(0), count);
        let (tx, mut queue) = ActionQueue::channel();
        let cancel = CancellationToken::new();

        tx.send(add()).unwrap();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let dispatched = tokio::time::timeout(Duration::from_millis(500), queue.run(&store, cancel))
            .await
            .expect("timeout")
            .unwrap();
        assert_eq!(dispatched, 1);
        drop(tx);
    }

    #[tokio::test]
    async fn test_next() {
        let (tx, mut queue) = ActionQueue::channel();
        tx.send(add()).unwrap();
        drop(tx);

        assert_eq!(queue.next().await.map(|a| a.kind().to_string()), Some("ADD".into()));
        assert!(queue.next().await.is_none());
    }
}
