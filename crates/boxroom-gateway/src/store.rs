//! `LocalStore`: every collaborator port implemented over the SQLite
//! database, with live snapshots fanned out through the `Dispatcher`.
//!
//! Listeners receive the current snapshot on registration and a fresh full
//! snapshot after every mutation that touches their document.
//!
//! Reading a snapshot and handing it to the dispatcher happen under one lock
//! per document kind, so snapshots leave in the order they were read and the
//! last one a listener sees is never older than the database.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use boxroom_core::ports::{BoxStore, FeedStore, Listener, ListenerId, ProfileStore};
use boxroom_db::Database;
use boxroom_db::models::{EnrollOutcome, PostRow, ReactionRow};
use boxroom_types::models::{
    BoxInfo, Member, PostRecord, Profile, RawFeed, ReactionKind, post_key,
};
use boxroom_types::{BoxError, Result};

use crate::dispatcher::Dispatcher;

#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Database>,
    dispatcher: Dispatcher,
    /// Held across a feed snapshot read and its delivery
    feed_order: Arc<Mutex<()>>,
    /// Held across a profile snapshot read and its delivery
    profile_order: Arc<Mutex<()>>,
}

impl LocalStore {
    pub fn new(db: Database, dispatcher: Dispatcher) -> Self {
        Self {
            db: Arc::new(db),
            dispatcher,
            feed_order: Arc::new(Mutex::new(())),
            profile_order: Arc::new(Mutex::new(())),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Run blocking DB work off the async runtime.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                BoxError::transport(e)
            })?
            .map_err(|e| {
                error!("Database error: {:#}", e);
                BoxError::transport(e)
            })
    }

    async fn feed_snapshot(&self, box_id: &str) -> Result<Option<RawFeed>> {
        let id = box_id.to_string();
        let (posts, reactions) = self
            .blocking(move |db| Ok((db.get_posts(&id)?, db.get_reactions(&id)?)))
            .await?;
        Ok(assemble_feed(posts, reactions))
    }

    async fn profile_snapshot(&self, uid: &str) -> Result<Option<Profile>> {
        let id = uid.to_string();
        let row = self.blocking(move |db| db.get_user(&id)).await?;
        Ok(row.map(|user| Profile {
            name: user.name,
            avatar_ref: user.avatar_ref,
        }))
    }

    /// Push the current feed of a box to all of its listeners.
    async fn refresh_feed(&self, box_id: &str) {
        let _order = self.feed_order.lock().await;
        match self.feed_snapshot(box_id).await {
            Ok(feed) => self.dispatcher.publish_feed(box_id, feed).await,
            Err(err) => self.dispatcher.fail_feed(box_id, err).await,
        }
    }

    /// Push the current profile of a user to all of its listeners.
    async fn refresh_profile(&self, uid: &str) -> Result<()> {
        let _order = self.profile_order.lock().await;
        let profile = self.profile_snapshot(uid).await?;
        self.dispatcher.publish_profile(uid, profile).await;
        Ok(())
    }

    // -- Accounts and boxes --

    pub async fn create_user(
        &self,
        uid: &str,
        email: &str,
        name: &str,
        avatar_ref: Option<&str>,
    ) -> Result<()> {
        let (id, mail, display, avatar) = (
            uid.to_string(),
            email.to_string(),
            name.to_string(),
            avatar_ref.map(str::to_string),
        );
        self.blocking(move |db| db.create_user(&id, &mail, &display, avatar.as_deref()))
            .await?;
        info!("Created user {} <{}>", uid, email);
        self.refresh_profile(uid).await
    }

    /// Delete an account. Profile listeners see the document disappear.
    pub async fn delete_user(&self, uid: &str) -> Result<()> {
        let id = uid.to_string();
        let removed = self.blocking(move |db| db.delete_user(&id)).await?;
        if !removed {
            return Err(BoxError::NotFound(format!("user {}", uid)));
        }
        info!("Deleted user {}", uid);
        self.refresh_profile(uid).await
    }

    pub async fn create_box(&self, box_id: &str, author_uid: &str) -> Result<()> {
        let (id, author) = (box_id.to_string(), author_uid.to_string());
        self.blocking(move |db| db.create_box(&id, &author)).await?;
        info!("Created box {} by {}", box_id, author_uid);
        Ok(())
    }

    // -- Posts and reactions --

    /// Add a post named `name`; its key is derived from the name.
    pub async fn create_post(
        &self,
        box_id: &str,
        uid: &str,
        name: &str,
        content_ref: &str,
    ) -> Result<String> {
        let key = post_key(name).to_string();
        if key.trim().is_empty() {
            return Err(BoxError::Validation("post name is empty".into()));
        }

        let (bid, k, author, n, content) = (
            box_id.to_string(),
            key.clone(),
            uid.to_string(),
            name.to_string(),
            content_ref.to_string(),
        );
        self.blocking(move |db| db.insert_post(&bid, &k, &author, &n, &content))
            .await?;
        self.refresh_feed(box_id).await;
        Ok(key)
    }

    /// Toggle `uid`'s reaction on a post. Returns true when it was added.
    pub async fn toggle_reaction(
        &self,
        box_id: &str,
        post_key: &str,
        uid: &str,
        kind: ReactionKind,
    ) -> Result<bool> {
        let (bid, key, user) = (box_id.to_string(), post_key.to_string(), uid.to_string());
        let added = self
            .blocking(move |db| {
                let exists = db.get_posts(&bid)?.iter().any(|p| p.key == key);
                if !exists {
                    return Ok(None);
                }
                db.toggle_reaction(&bid, &key, &user, kind.as_str()).map(Some)
            })
            .await?
            .ok_or_else(|| BoxError::NotFound(format!("post {}", post_key)))?;
        self.refresh_feed(box_id).await;
        Ok(added)
    }

    /// Simulate a transport failure on every feed listener of a box.
    pub async fn disconnect_feed(&self, box_id: &str, reason: &str) {
        self.dispatcher
            .fail_feed(box_id, BoxError::Transport(reason.to_string()))
            .await;
    }
}

/// Group reaction rows onto their posts. A box without posts has no feed.
fn assemble_feed(posts: Vec<PostRow>, reactions: Vec<ReactionRow>) -> Option<RawFeed> {
    if posts.is_empty() {
        return None;
    }

    // post_key -> kind -> reactor ids, in reaction order
    let mut by_post: HashMap<String, HashMap<ReactionKind, Vec<String>>> = HashMap::new();
    for r in reactions {
        let Some(kind) = ReactionKind::parse(&r.kind) else {
            warn!("Ignoring reaction with unknown kind '{}' on {}", r.kind, r.post_key);
            continue;
        };
        by_post
            .entry(r.post_key)
            .or_default()
            .entry(kind)
            .or_default()
            .push(r.user_id);
    }

    let feed = posts
        .into_iter()
        .map(|row| {
            let mut buckets = by_post.remove(&row.key).unwrap_or_default();
            let record = PostRecord {
                uid: row.uid,
                name: row.name,
                content_ref: row.content_ref,
                love: buckets.remove(&ReactionKind::Love),
                meh: buckets.remove(&ReactionKind::Meh),
                sad: buckets.remove(&ReactionKind::Sad),
            };
            (row.key, record)
        })
        .collect();

    Some(feed)
}

#[async_trait]
impl BoxStore for LocalStore {
    async fn fetch_box(&self, box_id: &str) -> Result<BoxInfo> {
        let id = box_id.to_string();
        let (header, members) = self
            .blocking(move |db| db.get_box(&id))
            .await?
            .ok_or_else(|| BoxError::NotFound(format!("box {}", box_id)))?;

        Ok(BoxInfo {
            id: header.id,
            author: Member {
                uid: header.author_id,
                name: header.author_name,
            },
            roster: members
                .into_iter()
                .map(|m| Member {
                    uid: m.user_id,
                    name: m.name,
                })
                .collect(),
        })
    }

    async fn enroll(&self, box_id: &str, identifier: &str) -> Result<()> {
        let (id, ident) = (box_id.to_string(), identifier.to_string());
        match self.blocking(move |db| db.enroll(&id, &ident)).await? {
            EnrollOutcome::Enrolled { .. } => Ok(()),
            EnrollOutcome::AlreadyMember { user_id } => Err(BoxError::AlreadyMember {
                box_id: box_id.to_string(),
                user_id,
            }),
            EnrollOutcome::UnknownBox => Err(BoxError::NotFound(format!("box {}", box_id))),
            EnrollOutcome::UnknownUser => {
                Err(BoxError::NotFound(format!("user {}", identifier)))
            }
        }
    }

    async fn unenroll(&self, box_id: &str, uid: &str) -> Result<()> {
        let (id, user) = (box_id.to_string(), uid.to_string());
        if !self.blocking(move |db| db.unenroll(&id, &user)).await? {
            warn!("{} was not enrolled in box {}", uid, box_id);
        }
        Ok(())
    }
}

#[async_trait]
impl FeedStore for LocalStore {
    async fn listen_feed(&self, box_id: &str) -> Result<Listener<Option<RawFeed>>> {
        // Registered before reading: a refresh waiting on the lock reaches
        // this listener after its first snapshot.
        let _order = self.feed_order.lock().await;
        let listener = self.dispatcher.register_feed(box_id).await;
        match self.feed_snapshot(box_id).await {
            Ok(snapshot) => {
                self.dispatcher
                    .send_feed_to(box_id, listener.id, snapshot)
                    .await;
                Ok(listener)
            }
            Err(err) => {
                self.dispatcher.unregister_feed(listener.id).await;
                Err(err)
            }
        }
    }

    async fn release_feed(&self, id: ListenerId) {
        self.dispatcher.unregister_feed(id).await;
    }

    async fn delete_post(&self, box_id: &str, post_key: &str) -> Result<()> {
        let (id, key) = (box_id.to_string(), post_key.to_string());
        if !self.blocking(move |db| db.delete_post(&id, &key)).await? {
            return Err(BoxError::NotFound(format!("post {}", post_key)));
        }
        self.refresh_feed(box_id).await;
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for LocalStore {
    async fn listen_profile(&self, uid: &str) -> Result<Listener<Option<Profile>>> {
        let _order = self.profile_order.lock().await;
        let listener = self.dispatcher.register_profile(uid).await;
        match self.profile_snapshot(uid).await {
            Ok(snapshot) => {
                self.dispatcher
                    .send_profile_to(uid, listener.id, snapshot)
                    .await;
                Ok(listener)
            }
            Err(err) => {
                self.dispatcher.unregister_profile(listener.id).await;
                Err(err)
            }
        }
    }

    async fn release_profile(&self, id: ListenerId) {
        self.dispatcher.unregister_profile(id).await;
    }
}
