//! Shared configuration with change notification.
//!
//! Readers take a cheap `Arc` snapshot of the current value; long running
//! loops hold a [`ConfigWatcher`] and react when the value is replaced
//! (on SIGHUP in the server).

use std::sync::Arc;
use tokio::sync::watch;

/// A shared configuration value that can be swapped at runtime.
pub struct ConfigStore<T> {
    tx: Arc<watch::Sender<Arc<T>>>,
}

/// Waits for the next replacement of a [`ConfigStore`] value.
pub struct ConfigWatcher<T> {
    rx: watch::Receiver<Arc<T>>,
}

impl<T> ConfigStore<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _) = watch::channel(Arc::new(initial));
        Self { tx: Arc::new(tx) }
    }

    /// Replace the value and wake every watcher.
    pub fn update(&self, value: T) {
        self.tx.send_replace(Arc::new(value));
    }

    /// Snapshot of the current value.
    pub fn current(&self) -> Arc<T> {
        Arc::clone(&self.tx.borrow())
    }

    pub fn subscribe(&self) -> ConfigWatcher<T> {
        ConfigWatcher {
            rx: self.tx.subscribe(),
        }
    }
}

impl<T> Clone for ConfigStore<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T> ConfigWatcher<T> {
    /// Wait for the next update and return the new value.
    ///
    /// Returns `None` once every [`ConfigStore`] handle has been dropped.
    pub async fn changed(&mut self) -> Option<Arc<T>> {
        self.rx.changed().await.ok()?;
        Some(Arc::clone(&self.rx.borrow_and_update()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_watcher_sees_update() {
        let store = ConfigStore::new(1u32);
        let mut watcher = store.subscribe();

        store.update(2);
        assert_eq!(*watcher.changed().await.unwrap(), 2);
        assert_eq!(*store.current(), 2);
    }

    #[tokio::test]
    async fn test_watcher_ends_when_store_dropped() {
        let store = ConfigStore::new(1u32);
        let mut watcher = store.subscribe();
        drop(store);
        assert!(watcher.changed().await.is_none());
    }
}
