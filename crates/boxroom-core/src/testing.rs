//! In-memory collaborator fakes for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use boxroom_types::models::{BoxInfo, Member, Profile, RawFeed};
use boxroom_types::{BoxError, Result};

use crate::ports::{BoxStore, FeedStore, Listener, ListenerId, ProfileStore};

#[derive(Default)]
pub struct FakeBoxStore {
    boxes: Mutex<HashMap<String, BoxInfo>>,
    users: Mutex<Vec<(String, Member)>>,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl FakeBoxStore {
    pub fn with_box(box_id: &str, author_uid: &str, author_name: &str) -> Self {
        let store = Self::default();
        let author = Member {
            uid: author_uid.into(),
            name: author_name.into(),
        };
        store.boxes.lock().unwrap().insert(
            box_id.into(),
            BoxInfo {
                id: box_id.into(),
                author: author.clone(),
                roster: vec![author],
            },
        );
        store
    }

    pub fn add_user(&self, email: &str, uid: &str, name: &str) {
        self.users.lock().unwrap().push((
            email.into(),
            Member {
                uid: uid.into(),
                name: name.into(),
            },
        ));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn begin(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(BoxError::Transport("backend unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl BoxStore for FakeBoxStore {
    async fn fetch_box(&self, box_id: &str) -> Result<BoxInfo> {
        self.begin()?;
        self.boxes
            .lock()
            .unwrap()
            .get(box_id)
            .cloned()
            .ok_or_else(|| BoxError::NotFound(format!("box {}", box_id)))
    }

    async fn enroll(&self, box_id: &str, identifier: &str) -> Result<()> {
        self.begin()?;
        let member = self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|(email, m)| email == identifier || m.uid == identifier)
            .map(|(_, m)| m.clone())
            .ok_or_else(|| BoxError::NotFound(format!("user {}", identifier)))?;

        let mut boxes = self.boxes.lock().unwrap();
        let info = boxes
            .get_mut(box_id)
            .ok_or_else(|| BoxError::NotFound(format!("box {}", box_id)))?;
        if info.contains(&member.uid) {
            return Err(BoxError::AlreadyMember {
                box_id: box_id.into(),
                user_id: member.uid,
            });
        }
        info.roster.push(member);
        Ok(())
    }

    async fn unenroll(&self, box_id: &str, uid: &str) -> Result<()> {
        self.begin()?;
        if let Some(info) = self.boxes.lock().unwrap().get_mut(box_id) {
            info.roster.retain(|m| m.uid != uid);
        }
        Ok(())
    }
}

type Senders<T> = Mutex<HashMap<ListenerId, (String, mpsc::UnboundedSender<Result<T>>)>>;

/// Push-driven fake: tests decide when snapshots arrive.
pub struct FakeTopic<T> {
    senders: Senders<T>,
    released: Mutex<Vec<ListenerId>>,
    fail_listen: AtomicBool,
}

impl<T> Default for FakeTopic<T> {
    fn default() -> Self {
        Self {
            senders: Mutex::new(HashMap::new()),
            released: Mutex::new(Vec::new()),
            fail_listen: AtomicBool::new(false),
        }
    }
}

impl<T: Clone> FakeTopic<T> {
    pub fn push(&self, key: &str, value: T) {
        for (k, tx) in self.senders.lock().unwrap().values() {
            if k == key {
                let _ = tx.send(Ok(value.clone()));
            }
        }
    }

    pub fn fail(&self, key: &str, err: BoxError) {
        for (k, tx) in self.senders.lock().unwrap().values() {
            if k == key {
                let _ = tx.send(Err(err.clone()));
            }
        }
    }

    pub fn active(&self, key: &str) -> usize {
        self.senders
            .lock()
            .unwrap()
            .values()
            .filter(|(k, _)| k == key)
            .count()
    }

    pub fn released(&self) -> usize {
        self.released.lock().unwrap().len()
    }

    pub fn set_fail_listen(&self, fail: bool) {
        self.fail_listen.store(fail, Ordering::SeqCst);
    }

    fn listen(&self, key: &str) -> Result<Listener<T>> {
        if self.fail_listen.load(Ordering::SeqCst) {
            return Err(BoxError::Transport("connection refused".into()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        self.senders.lock().unwrap().insert(id, (key.into(), tx));
        Ok(Listener { id, events: rx })
    }

    fn release(&self, id: ListenerId) {
        if self.senders.lock().unwrap().remove(&id).is_some() {
            self.released.lock().unwrap().push(id);
        }
    }
}

#[derive(Default)]
pub struct FakeFeedStore {
    pub topic: FakeTopic<Option<RawFeed>>,
    pub deleted: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl FeedStore for FakeFeedStore {
    async fn listen_feed(&self, box_id: &str) -> Result<Listener<Option<RawFeed>>> {
        self.topic.listen(box_id)
    }

    async fn release_feed(&self, id: ListenerId) {
        self.topic.release(id);
    }

    async fn delete_post(&self, box_id: &str, post_key: &str) -> Result<()> {
        self.deleted
            .lock()
            .unwrap()
            .push((box_id.into(), post_key.into()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeProfileStore {
    pub topic: FakeTopic<Option<Profile>>,
}

#[async_trait]
impl ProfileStore for FakeProfileStore {
    async fn listen_profile(&self, uid: &str) -> Result<Listener<Option<Profile>>> {
        self.topic.listen(uid)
    }

    async fn release_profile(&self, id: ListenerId) {
        self.topic.release(id);
    }
}
