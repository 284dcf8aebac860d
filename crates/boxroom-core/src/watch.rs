use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use boxroom_types::BoxError;
use boxroom_types::events::{Severity, SnapshotEvent};
use boxroom_types::models::{Profile, UserAggregate};

use crate::aggregate::reduce;
use crate::context::BoxContext;
use crate::notify::Notifier;
use crate::subscription::{FeedSubscriber, ProfileSubscriber, SubscriptionHandle};

/// Live statistics of one user in one box.
///
/// Every feed snapshot is reduced from scratch and published on a `watch`
/// channel. Feed errors go to the notifier. Once stopped, nothing more is
/// published.
pub struct UserStatsWatcher {
    handle: Option<SubscriptionHandle>,
    stats: watch::Receiver<UserAggregate>,
}

impl UserStatsWatcher {
    /// Watch `uid`'s posts in the box of `ctx`. Without a box there is no
    /// feed to watch and the stats stay at zero.
    pub async fn start(
        feeds: &FeedSubscriber,
        ctx: &BoxContext,
        uid: &str,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (tx, stats) = watch::channel(UserAggregate::empty(uid));
        if !ctx.has_box() {
            debug!("No box selected, stats of {} stay empty", uid);
            return Self {
                handle: None,
                stats,
            };
        }

        let target = uid.to_string();
        let handle = feeds
            .subscribe(&ctx.box_id, move |event| match event {
                SnapshotEvent::Snapshot(feed) => {
                    tx.send_replace(reduce(&feed, &target));
                }
                SnapshotEvent::Failed(err) => notifier.notify(&err.to_string(), Severity::Error),
            })
            .await;

        Self {
            handle: Some(handle),
            stats,
        }
    }

    pub fn stats(&self) -> watch::Receiver<UserAggregate> {
        self.stats.clone()
    }

    pub fn current(&self) -> UserAggregate {
        self.stats.borrow().clone()
    }

    pub fn handle(&self) -> Option<&SubscriptionHandle> {
        self.handle.as_ref()
    }

    pub fn stop(&self) {
        if let Some(handle) = &self.handle {
            handle.unsubscribe();
        }
    }
}

impl Drop for UserStatsWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

const ACCOUNT_DELETED: &str = "User not found, your account might be deleted!";

/// Live profile document of one user. `None` until the first snapshot.
/// A vanished document is reported as a warning and watching continues.
pub struct ProfileWatcher {
    handle: SubscriptionHandle,
    profile: watch::Receiver<Option<Profile>>,
}

impl ProfileWatcher {
    pub async fn start(
        profiles: &ProfileSubscriber,
        uid: &str,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (tx, profile) = watch::channel(None);
        let handle = profiles
            .subscribe(uid, move |event| match event {
                SnapshotEvent::Snapshot(doc) => {
                    tx.send_replace(Some(doc));
                }
                SnapshotEvent::Failed(BoxError::AccountDeleted(_)) => {
                    notifier.notify(ACCOUNT_DELETED, Severity::Warning)
                }
                SnapshotEvent::Failed(err) => notifier.notify(&err.to_string(), Severity::Error),
            })
            .await;

        Self { handle, profile }
    }

    pub fn profile(&self) -> watch::Receiver<Option<Profile>> {
        self.profile.clone()
    }

    pub fn current(&self) -> Option<Profile> {
        self.profile.borrow().clone()
    }

    pub fn handle(&self) -> &SubscriptionHandle {
        &self.handle
    }

    pub fn stop(&self) {
        self.handle.unsubscribe();
    }
}

impl Drop for ProfileWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
