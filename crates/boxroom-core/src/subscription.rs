//! Live feed and profile subscriptions.
//!
//! A subscription moves through
//! `Unsubscribed -> Subscribing -> Active -> (Error | Unsubscribed)`.
//! Each one owns a pump task that drains its store listener and hands every
//! snapshot, in transport order, to a single callback. Callbacks for one
//! handle never overlap. Unsubscribing is synchronous and idempotent, may
//! happen from inside the callback, and stops deliveries before the store
//! listener is released by the pump.
//!
//! Transport failures are delivered once as `SnapshotEvent::Failed` and end
//! the subscription. There is no automatic retry: subscribe again.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::{Notify, watch};
use tracing::{debug, warn};

use boxroom_types::events::SnapshotEvent;
use boxroom_types::models::{Profile, RawFeed};
use boxroom_types::{BoxError, Result};

use crate::ports::{FeedStore, Listener, ProfileStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Unsubscribed,
    Subscribing,
    Active,
    Error,
}

struct HandleInner {
    target: String,
    state: watch::Sender<SubscriptionState>,
    cancel: Notify,
    released: watch::Sender<bool>,
    last_error: Mutex<Option<BoxError>>,
}

/// Opaque token for one live subscription. Clones refer to the same
/// subscription.
#[derive(Clone)]
pub struct SubscriptionHandle {
    inner: Arc<HandleInner>,
}

impl SubscriptionHandle {
    fn new(target: &str) -> Self {
        let (state, _) = watch::channel(SubscriptionState::Subscribing);
        let (released, _) = watch::channel(false);
        Self {
            inner: Arc::new(HandleInner {
                target: target.to_string(),
                state,
                cancel: Notify::new(),
                released,
                last_error: Mutex::new(None),
            }),
        }
    }

    /// Box id or user id this subscription watches.
    pub fn target(&self) -> &str {
        &self.inner.target
    }

    pub fn state(&self) -> SubscriptionState {
        *self.inner.state.borrow()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == SubscriptionState::Unsubscribed
    }

    pub fn same(&self, other: &SubscriptionHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Stop deliveries. Calling it again, or on a failed subscription, is a
    /// no-op.
    pub fn unsubscribe(&self) {
        let changed = self.inner.state.send_if_modified(|state| match state {
            SubscriptionState::Subscribing | SubscriptionState::Active => {
                *state = SubscriptionState::Unsubscribed;
                true
            }
            _ => false,
        });
        if changed {
            debug!("Unsubscribed from {}", self.inner.target);
            self.inner.cancel.notify_one();
        }
    }

    /// Wait until the first snapshot was delivered. Fails if the
    /// subscription errored or was cancelled first.
    pub async fn ready(&self) -> Result<()> {
        let mut rx = self.inner.state.subscribe();
        let state = match rx
            .wait_for(|state| *state != SubscriptionState::Subscribing)
            .await
        {
            Ok(state) => *state,
            Err(_) => SubscriptionState::Unsubscribed,
        };
        match state {
            SubscriptionState::Active => Ok(()),
            SubscriptionState::Error => Err(self
                .last_error()
                .unwrap_or_else(|| BoxError::Transport("subscription failed".into()))),
            _ => Err(BoxError::Transport(format!(
                "subscription to {} was cancelled",
                self.inner.target
            ))),
        }
    }

    /// Wait until the store listener behind this handle has been released.
    pub async fn released(&self) {
        let mut rx = self.inner.released.subscribe();
        let _ = rx.wait_for(|released| *released).await;
    }

    pub fn last_error(&self) -> Option<BoxError> {
        self.inner
            .last_error
            .lock()
            .ok()
            .and_then(|err| err.clone())
    }

    fn activate(&self) {
        self.inner.state.send_if_modified(|state| {
            if *state == SubscriptionState::Subscribing {
                *state = SubscriptionState::Active;
                true
            } else {
                false
            }
        });
    }

    /// Returns false if the subscription was already cancelled.
    fn fail(&self, err: &BoxError) -> bool {
        if let Ok(mut last) = self.inner.last_error.lock() {
            *last = Some(err.clone());
        }
        self.inner.state.send_if_modified(|state| match state {
            SubscriptionState::Subscribing | SubscriptionState::Active => {
                *state = SubscriptionState::Error;
                true
            }
            _ => false,
        })
    }

    fn mark_released(&self) {
        self.inner.released.send_replace(true);
    }
}

/// Drain `listener` into `on_event` until cancelled or failed, then release.
///
/// `map` turns a raw store value into the delivered snapshot. An `Err` from
/// `map` is delivered without ending the subscription; an `Err` from the
/// store ends it.
async fn pump<R, T, M, F, Rel>(
    handle: SubscriptionHandle,
    mut listener: Listener<R>,
    mut map: M,
    mut on_event: F,
    release: Rel,
) where
    M: FnMut(R) -> Result<T>,
    F: FnMut(SnapshotEvent<T>),
    Rel: Future<Output = ()>,
{
    loop {
        tokio::select! {
            biased;
            _ = handle.inner.cancel.notified() => break,
            next = listener.events.recv() => {
                if handle.is_cancelled() {
                    break;
                }
                match next {
                    Some(Ok(raw)) => match map(raw) {
                        Ok(data) => {
                            on_event(SnapshotEvent::Snapshot(data));
                            handle.activate();
                        }
                        Err(err) => on_event(SnapshotEvent::Failed(err)),
                    },
                    Some(Err(err)) => {
                        warn!("Subscription to {} failed: {}", handle.target(), err);
                        if handle.fail(&err) {
                            on_event(SnapshotEvent::Failed(err));
                        }
                        break;
                    }
                    None => {
                        let err = BoxError::Transport("listener closed by the store".into());
                        warn!("Subscription to {} lost: {}", handle.target(), err);
                        if handle.fail(&err) {
                            on_event(SnapshotEvent::Failed(err));
                        }
                        break;
                    }
                }
            }
        }
    }

    release.await;
    handle.mark_released();
    debug!("Released listener {} for {}", listener.id, handle.target());
}

/// One live subscription per target, replacing on re-subscribe.
#[derive(Default)]
struct Registry {
    active: Mutex<HashMap<String, SubscriptionHandle>>,
}

impl Registry {
    /// Register a fresh handle for `target`, cancelling the previous one.
    fn replace(&self, target: &str) -> SubscriptionHandle {
        let handle = SubscriptionHandle::new(target);
        let previous = self
            .active
            .lock()
            .ok()
            .and_then(|mut active| active.insert(target.to_string(), handle.clone()));
        if let Some(previous) = previous {
            debug!("Replacing live subscription to {}", target);
            previous.unsubscribe();
        }
        handle
    }

    fn remove(&self, handle: &SubscriptionHandle) {
        if let Ok(mut active) = self.active.lock() {
            if active.get(handle.target()).is_some_and(|h| h.same(handle)) {
                active.remove(handle.target());
            }
        }
    }

    fn count(&self) -> usize {
        self.active
            .lock()
            .map(|active| {
                active
                    .values()
                    .filter(|h| {
                        matches!(
                            h.state(),
                            SubscriptionState::Subscribing | SubscriptionState::Active
                        )
                    })
                    .count()
            })
            .unwrap_or(0)
    }
}

/// Live subscriptions to box post feeds, one per box.
pub struct FeedSubscriber {
    store: Arc<dyn FeedStore>,
    registry: Registry,
}

impl FeedSubscriber {
    pub fn new(store: Arc<dyn FeedStore>) -> Self {
        Self {
            store,
            registry: Registry::default(),
        }
    }

    /// Subscribe to the feed of `box_id`. An absent feed is delivered as an
    /// empty one. Any earlier subscription to the same box made through this
    /// subscriber is cancelled first.
    pub async fn subscribe<F>(&self, box_id: &str, mut on_event: F) -> SubscriptionHandle
    where
        F: FnMut(SnapshotEvent<RawFeed>) + Send + 'static,
    {
        let handle = self.registry.replace(box_id);

        let listener = match self.store.listen_feed(box_id).await {
            Ok(listener) => listener,
            Err(err) => {
                warn!("Could not subscribe to feed of {}: {}", box_id, err);
                if handle.fail(&err) {
                    on_event(SnapshotEvent::Failed(err));
                }
                handle.mark_released();
                return handle;
            }
        };
        debug!("Subscribed to feed of {} (listener {})", box_id, listener.id);

        let store = self.store.clone();
        let id = listener.id;
        let release = async move { store.release_feed(id).await };
        tokio::spawn(pump(
            handle.clone(),
            listener,
            |feed: Option<RawFeed>| Ok(feed.unwrap_or_default()),
            on_event,
            release,
        ));
        handle
    }

    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        handle.unsubscribe();
        self.registry.remove(handle);
    }

    /// Number of subscriptions still delivering or about to.
    pub fn live_count(&self) -> usize {
        self.registry.count()
    }
}

/// Live subscriptions to user profile documents, one per user.
pub struct ProfileSubscriber {
    store: Arc<dyn ProfileStore>,
    registry: Registry,
}

impl ProfileSubscriber {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self {
            store,
            registry: Registry::default(),
        }
    }

    /// Subscribe to the profile of `uid`. A missing document is delivered
    /// as `AccountDeleted` and the subscription keeps listening.
    pub async fn subscribe<F>(&self, uid: &str, mut on_event: F) -> SubscriptionHandle
    where
        F: FnMut(SnapshotEvent<Profile>) + Send + 'static,
    {
        let handle = self.registry.replace(uid);

        let listener = match self.store.listen_profile(uid).await {
            Ok(listener) => listener,
            Err(err) => {
                warn!("Could not subscribe to profile of {}: {}", uid, err);
                if handle.fail(&err) {
                    on_event(SnapshotEvent::Failed(err));
                }
                handle.mark_released();
                return handle;
            }
        };
        debug!("Subscribed to profile of {} (listener {})", uid, listener.id);

        let store = self.store.clone();
        let id = listener.id;
        let release = async move { store.release_profile(id).await };
        let owner = uid.to_string();
        tokio::spawn(pump(
            handle.clone(),
            listener,
            move |profile: Option<Profile>| {
                profile.ok_or_else(|| BoxError::AccountDeleted(owner.clone()))
            },
            on_event,
            release,
        ));
        handle
    }

    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        handle.unsubscribe();
        self.registry.remove(handle);
    }

    pub fn live_count(&self) -> usize {
        self.registry.count()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;
    use crate::testing::{FakeFeedStore, FakeProfileStore};
    use boxroom_types::models::PostRecord;

    fn feed(keys: &[&str]) -> Option<RawFeed> {
        Some(
            keys.iter()
                .map(|k| {
                    (
                        k.to_string(),
                        PostRecord {
                            uid: "u".into(),
                            ..Default::default()
                        },
                    )
                })
                .collect(),
        )
    }

    fn channel_subscriber() -> (
        impl FnMut(SnapshotEvent<RawFeed>) + Send + 'static,
        mpsc::UnboundedReceiver<SnapshotEvent<RawFeed>>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            move |event: SnapshotEvent<RawFeed>| {
                let _ = tx.send(event);
            },
            rx,
        )
    }

    async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn delivers_full_snapshots_in_order() {
        let store = Arc::new(FakeFeedStore::default());
        let feeds = FeedSubscriber::new(store.clone());
        let (on_event, mut rx) = channel_subscriber();

        let handle = feeds.subscribe("box1", on_event).await;
        assert_eq!(handle.state(), SubscriptionState::Subscribing);

        store.topic.push("box1", feed(&["a"]));
        store.topic.push("box1", None);
        store.topic.push("box1", feed(&["a", "b"]));

        let sizes: Vec<usize> = [
            next(&mut rx).await,
            next(&mut rx).await,
            next(&mut rx).await,
        ]
        .into_iter()
        .map(|e| e.into_result().unwrap().len())
        .collect();
        assert_eq!(sizes, [1, 0, 2]);

        handle.ready().await.unwrap();
        assert_eq!(handle.state(), SubscriptionState::Active);
    }

    #[tokio::test]
    async fn unsubscribe_twice_is_a_noop() {
        let store = Arc::new(FakeFeedStore::default());
        let feeds = FeedSubscriber::new(store.clone());
        let (on_event, _rx) = channel_subscriber();

        let handle = feeds.subscribe("box1", on_event).await;
        feeds.unsubscribe(&handle);
        feeds.unsubscribe(&handle);
        handle.unsubscribe();
        handle.released().await;

        assert_eq!(handle.state(), SubscriptionState::Unsubscribed);
        assert_eq!(store.topic.active("box1"), 0);
        assert_eq!(store.topic.released(), 1);
        assert_eq!(feeds.live_count(), 0);
    }

    #[tokio::test]
    async fn nothing_is_delivered_after_unsubscribe() {
        let store = Arc::new(FakeFeedStore::default());
        let feeds = FeedSubscriber::new(store.clone());
        let (on_event, mut rx) = channel_subscriber();

        let handle = feeds.subscribe("box1", on_event).await;
        store.topic.push("box1", feed(&["a"]));
        next(&mut rx).await;

        // Queued before cancellation but not yet processed.
        store.topic.push("box1", feed(&["a", "b"]));
        handle.unsubscribe();
        handle.released().await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribe_from_inside_the_callback() {
        let store = Arc::new(FakeFeedStore::default());
        let feeds = FeedSubscriber::new(store.clone());
        let delivered = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<SubscriptionHandle>>> = Arc::new(Mutex::new(None));

        let counter = delivered.clone();
        let own = slot.clone();
        let handle = feeds
            .subscribe("box1", move |_event| {
                counter.fetch_add(1, Ordering::SeqCst);
                if let Some(handle) = own.lock().unwrap().as_ref() {
                    handle.unsubscribe();
                }
            })
            .await;
        *slot.lock().unwrap() = Some(handle.clone());

        store.topic.push("box1", feed(&["a"]));
        store.topic.push("box1", feed(&["b"]));
        handle.released().await;

        assert_eq!(delivered.load(Ordering::SeqCst), 1);
        assert_eq!(handle.state(), SubscriptionState::Unsubscribed);
    }

    #[tokio::test]
    async fn resubscribing_replaces_the_old_listener() {
        let store = Arc::new(FakeFeedStore::default());
        let feeds = FeedSubscriber::new(store.clone());
        let (first_cb, _first_rx) = channel_subscriber();
        let (second_cb, mut second_rx) = channel_subscriber();

        let first = feeds.subscribe("box1", first_cb).await;
        let second = feeds.subscribe("box1", second_cb).await;
        first.released().await;

        assert_eq!(first.state(), SubscriptionState::Unsubscribed);
        assert_eq!(store.topic.active("box1"), 1);
        assert_eq!(feeds.live_count(), 1);

        store.topic.push("box1", feed(&["a"]));
        next(&mut second_rx).await;
        assert_eq!(second.state(), SubscriptionState::Active);

        // Stale handles do not evict the current one.
        feeds.unsubscribe(&first);
        assert_eq!(feeds.live_count(), 1);
    }

    #[tokio::test]
    async fn transport_error_ends_the_subscription() {
        let store = Arc::new(FakeFeedStore::default());
        let feeds = FeedSubscriber::new(store.clone());
        let (on_event, mut rx) = channel_subscriber();

        let handle = feeds.subscribe("box1", on_event).await;
        store
            .topic
            .fail("box1", BoxError::Transport("permission denied".into()));

        assert_eq!(
            next(&mut rx).await,
            SnapshotEvent::Failed(BoxError::Transport("permission denied".into()))
        );
        handle.released().await;
        assert_eq!(handle.state(), SubscriptionState::Error);
        assert!(handle.ready().await.is_err());
        assert_eq!(store.topic.active("box1"), 0);

        // Errors are terminal: unsubscribing afterwards changes nothing.
        handle.unsubscribe();
        assert_eq!(handle.state(), SubscriptionState::Error);
    }

    #[tokio::test]
    async fn failed_listen_is_reported_through_the_callback() {
        let store = Arc::new(FakeFeedStore::default());
        store.topic.set_fail_listen(true);
        let feeds = FeedSubscriber::new(store.clone());
        let (on_event, mut rx) = channel_subscriber();

        let handle = feeds.subscribe("box1", on_event).await;
        assert!(matches!(next(&mut rx).await, SnapshotEvent::Failed(BoxError::Transport(_))));
        assert_eq!(handle.state(), SubscriptionState::Error);
        handle.released().await;
    }

    #[tokio::test]
    async fn missing_profile_is_account_deleted() {
        let store = Arc::new(FakeProfileStore::default());
        let profiles = ProfileSubscriber::new(store.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handle = profiles
            .subscribe("u1", move |event| {
                let _ = tx.send(event);
            })
            .await;

        store.topic.push("u1", None);
        assert_eq!(
            next(&mut rx).await,
            SnapshotEvent::Failed(BoxError::AccountDeleted("u1".into()))
        );

        let profile = Profile {
            name: "Ann".into(),
            avatar_ref: None,
        };
        store.topic.push("u1", Some(profile.clone()));
        assert_eq!(next(&mut rx).await, SnapshotEvent::Snapshot(profile));
        assert_eq!(handle.state(), SubscriptionState::Active);

        profiles.unsubscribe(&handle);
        handle.released().await;
        assert_eq!(store.topic.released(), 1);
    }
}
