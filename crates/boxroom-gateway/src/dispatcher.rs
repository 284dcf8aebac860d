use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use boxroom_core::ports::{Listener, ListenerId};
use boxroom_types::models::{Profile, RawFeed};
use boxroom_types::{BoxError, Result};

type Sender<T> = mpsc::UnboundedSender<Result<T>>;

/// Listeners of one kind of document, grouped by document key.
struct Topic<T> {
    name: &'static str,
    /// key -> (listener_id -> sender)
    listeners: RwLock<HashMap<String, HashMap<ListenerId, Sender<T>>>>,
}

impl<T: Clone> Topic<T> {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            listeners: RwLock::new(HashMap::new()),
        }
    }

    async fn register(&self, key: &str) -> (ListenerId, mpsc::UnboundedReceiver<Result<T>>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners
            .write()
            .await
            .entry(key.to_string())
            .or_default()
            .insert(id, tx);
        debug!("Registered {} listener {} for {}", self.name, id, key);
        (id, rx)
    }

    /// Remove a listener wherever it is registered. Returns false if the id
    /// is unknown (already released).
    async fn unregister(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().await;
        let key = listeners
            .iter()
            .find(|(_, by_id)| by_id.contains_key(&id))
            .map(|(key, _)| key.clone());

        let Some(key) = key else {
            return false;
        };
        if let Some(by_id) = listeners.get_mut(&key) {
            by_id.remove(&id);
            if by_id.is_empty() {
                listeners.remove(&key);
            }
        }
        debug!("Released {} listener {} for {}", self.name, id, key);
        true
    }

    /// Send to a single listener.
    async fn send_to(&self, key: &str, id: ListenerId, value: T) {
        let listeners = self.listeners.read().await;
        if let Some(tx) = listeners.get(key).and_then(|by_id| by_id.get(&id)) {
            let _ = tx.send(Ok(value));
        }
    }

    /// Send to every listener of `key`, dropping listeners whose receiver is
    /// gone.
    async fn publish(&self, key: &str, value: T) {
        let mut listeners = self.listeners.write().await;
        let Some(by_id) = listeners.get_mut(key) else {
            return;
        };
        by_id.retain(|id, tx| {
            let alive = tx.send(Ok(value.clone())).is_ok();
            if !alive {
                warn!("Dropping closed {} listener {} for {}", self.name, id, key);
            }
            alive
        });
        if by_id.is_empty() {
            listeners.remove(key);
        }
    }

    /// Deliver `err` to every listener of `key` and forget them.
    async fn fail(&self, key: &str, err: BoxError) {
        if let Some(by_id) = self.listeners.write().await.remove(key) {
            warn!("Failing {} {} listeners for {}: {}", by_id.len(), self.name, key, err);
            for tx in by_id.values() {
                let _ = tx.send(Err(err.clone()));
            }
        }
    }

    async fn count(&self, key: &str) -> usize {
        self.listeners
            .read()
            .await
            .get(key)
            .map_or(0, |by_id| by_id.len())
    }
}

/// Fans out feed and profile snapshots to registered listeners.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Feed listeners by box id
    feeds: Topic<Option<RawFeed>>,

    /// Profile listeners by user id
    profiles: Topic<Option<Profile>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                feeds: Topic::new("feed"),
                profiles: Topic::new("profile"),
            }),
        }
    }

    // -- Feeds --

    pub async fn register_feed(&self, box_id: &str) -> Listener<Option<RawFeed>> {
        let (id, events) = self.inner.feeds.register(box_id).await;
        Listener { id, events }
    }

    pub async fn unregister_feed(&self, id: ListenerId) -> bool {
        self.inner.feeds.unregister(id).await
    }

    pub async fn send_feed_to(&self, box_id: &str, id: ListenerId, feed: Option<RawFeed>) {
        self.inner.feeds.send_to(box_id, id, feed).await;
    }

    pub async fn publish_feed(&self, box_id: &str, feed: Option<RawFeed>) {
        self.inner.feeds.publish(box_id, feed).await;
    }

    pub async fn fail_feed(&self, box_id: &str, err: BoxError) {
        self.inner.feeds.fail(box_id, err).await;
    }

    pub async fn feed_listeners(&self, box_id: &str) -> usize {
        self.inner.feeds.count(box_id).await
    }

    // -- Profiles --

    pub async fn register_profile(&self, uid: &str) -> Listener<Option<Profile>> {
        let (id, events) = self.inner.profiles.register(uid).await;
        Listener { id, events }
    }

    pub async fn unregister_profile(&self, id: ListenerId) -> bool {
        self.inner.profiles.unregister(id).await
    }

    pub async fn send_profile_to(&self, uid: &str, id: ListenerId, profile: Option<Profile>) {
        self.inner.profiles.send_to(uid, id, profile).await;
    }

    pub async fn publish_profile(&self, uid: &str, profile: Option<Profile>) {
        self.inner.profiles.publish(uid, profile).await;
    }

    pub async fn profile_listeners(&self, uid: &str) -> usize {
        self.inner.profiles.count(uid).await
    }
}
