//! Keyed slots that callers can await before a value is known
//!
//! A slot is opened with `set_future`, completed with `set_result` and
//! dropped with `cancel`. Waiters on a dropped slot get `None`.

use std::collections::HashMap;
use std::hash::Hash;

use futures::future::{FutureExt, Shared};
use parking_lot::Mutex;
use tokio::sync::oneshot;

struct Slot<V> {
    tx: Option<oneshot::Sender<V>>,
    rx: Shared<oneshot::Receiver<V>>,
}

pub struct AsyncCache<K, V> {
    slots: Mutex<HashMap<K, Slot<V>>>,
}

impl<K, V> Default for AsyncCache<K, V> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> AsyncCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Await the slot for `key`; `None` when absent or cancelled
    pub async fn get(&self, key: &K) -> Option<V> {
        let rx = self.slots.lock().get(key).map(|slot| slot.rx.clone())?;
        rx.await.ok()
    }

    /// Open a fresh slot, replacing (and cancelling) any previous one
    pub fn set_future(&self, key: K) {
        let (tx, rx) = oneshot::channel();
        self.slots.lock().insert(
            key,
            Slot {
                tx: Some(tx),
                rx: rx.shared(),
            },
        );
    }

    /// Complete an open slot; later `get`s return the value immediately
    pub fn set_result(&self, key: &K, value: V) {
        if let Some(tx) = self.slots.lock().get_mut(key).and_then(|s| s.tx.take()) {
            let _ = tx.send(value);
        }
    }

    pub fn cancel(&self, key: &K) {
        self.slots.lock().remove(key);
    }

    pub fn clear(&self) {
        self.slots.lock().clear();
    }

    pub fn contains(&self, key: &K) -> bool {
        self.slots.lock().contains_key(key)
    }

    /// Slot exists and has not been completed yet
    pub fn is_pending(&self, key: &K) -> bool {
        self.slots.lock().get(key).is_some_and(|slot| slot.tx.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_waiter_gets_result() {
        let cache = Arc::new(AsyncCache::<u32, String>::new());
        cache.set_future(1);

        let waiter = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get(&1).await })
        };
        tokio::task::yield_now().await;
        cache.set_result(&1, "ok".to_string());

        assert_eq!(waiter.await.unwrap(), Some("ok".to_string()));
        assert_eq!(cache.get(&1).await, Some("ok".to_string()));
    }

    #[tokio::test]
    async fn test_cancel_releases_waiters() {
        let cache = Arc::new(AsyncCache::<u32, u8>::new());
        cache.set_future(7);
        let waiter = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get(&7).await })
        };
        tokio::task::yield_now().await;
        cache.cancel(&7);
        assert_eq!(waiter.await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_missing_key() {
        let cache = AsyncCache::<u32, u8>::new();
        assert_eq!(cache.get(&3).await, None);
        cache.set_future(3);
        cache.clear();
        assert!(!cache.contains(&3));
    }
}
