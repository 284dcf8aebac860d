//! Collaborator contracts consumed by the core.
//!
//! Implementations live outside this crate (the gateway's `LocalStore`, test
//! fakes). All calls may fail with `BoxError::Transport`.

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use boxroom_types::Result;
use boxroom_types::models::{BoxInfo, Profile, RawFeed};

pub type ListenerId = Uuid;

/// A registered push listener. The store sends a full snapshot on
/// registration and after every change; an `Err` ends the listener.
pub struct Listener<T> {
    pub id: ListenerId,
    pub events: mpsc::UnboundedReceiver<Result<T>>,
}

#[async_trait]
pub trait BoxStore: Send + Sync {
    /// Current author and roster. `NotFound` once the box is gone.
    async fn fetch_box(&self, box_id: &str) -> Result<BoxInfo>;

    /// Resolve `identifier` (email or user id) and enroll that user.
    async fn enroll(&self, box_id: &str, identifier: &str) -> Result<()>;

    async fn unenroll(&self, box_id: &str, uid: &str) -> Result<()>;
}

#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Listen to the post feed of a box. A `None` snapshot means the box has
    /// no feed at all.
    async fn listen_feed(&self, box_id: &str) -> Result<Listener<Option<RawFeed>>>;

    /// Release a feed listener. Unknown ids are ignored.
    async fn release_feed(&self, id: ListenerId);

    async fn delete_post(&self, box_id: &str, post_key: &str) -> Result<()>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Listen to a user's profile document. `None` means the document does
    /// not exist.
    async fn listen_profile(&self, uid: &str) -> Result<Listener<Option<Profile>>>;

    async fn release_profile(&self, id: ListenerId);
}
