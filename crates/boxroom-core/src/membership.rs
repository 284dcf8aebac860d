use std::sync::Arc;

use tracing::{debug, info, warn};

use boxroom_types::models::BoxInfo;
use boxroom_types::{BoxError, Result};

use crate::ports::BoxStore;

/// Roster of a single box as last loaded from the box store.
///
/// Mutations never patch the in-memory roster: after `add_member` or
/// `remove_member` the caller re-`load`s to observe the new state, the same
/// way every other consumer sees it through the store.
///
/// Calls against the same box are not queued internally. Await each call
/// before issuing one that depends on it.
pub struct MembershipStore {
    store: Arc<dyn BoxStore>,
    snapshot: Option<BoxInfo>,
}

impl MembershipStore {
    pub fn new(store: Arc<dyn BoxStore>) -> Self {
        Self {
            store,
            snapshot: None,
        }
    }

    /// Last loaded roster, if any.
    pub fn snapshot(&self) -> Option<&BoxInfo> {
        self.snapshot.as_ref()
    }

    pub async fn load(&mut self, box_id: &str) -> Result<&BoxInfo> {
        let info = self.store.fetch_box(box_id).await?;
        if !info.contains(&info.author.uid) {
            warn!("Box {} roster is missing its author {}", box_id, info.author.uid);
        }
        debug!("Loaded box {} with {} members", box_id, info.len());
        Ok(self.snapshot.insert(info))
    }

    /// Enroll the user behind `identifier` (email or user id).
    pub async fn add_member(&self, box_id: &str, identifier: &str) -> Result<()> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(BoxError::Validation("You didn't type an email!".into()));
        }

        self.store.enroll(box_id, identifier).await?;
        info!("Enrolled {} in box {}", identifier, box_id);
        Ok(())
    }

    /// Remove a member. The author check runs against the loaded roster
    /// before the store is contacted, so the box must have been loaded.
    pub async fn remove_member(&self, box_id: &str, uid: &str) -> Result<()> {
        let snapshot = self
            .snapshot
            .as_ref()
            .filter(|info| info.id == box_id)
            .ok_or_else(|| {
                BoxError::Validation(format!(
                    "box {} must be loaded before removing members",
                    box_id
                ))
            })?;

        if snapshot.is_author(uid) {
            return Err(BoxError::AuthorProtected {
                box_id: box_id.to_string(),
                user_id: uid.to_string(),
            });
        }

        self.store.unenroll(box_id, uid).await?;
        info!("Removed {} from box {}", uid, box_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBoxStore;

    fn store() -> Arc<FakeBoxStore> {
        let store = FakeBoxStore::with_box("box1", "u1", "Ann");
        store.add_user("u2@x.com", "u2", "Bo");
        store.add_user("u3@x.com", "u3", "Cy");
        Arc::new(store)
    }

    fn uids(info: &BoxInfo) -> Vec<&str> {
        info.roster.iter().map(|m| m.uid.as_str()).collect()
    }

    #[tokio::test]
    async fn load_missing_box_is_not_found() {
        let mut membership = MembershipStore::new(store());
        let err = membership.load("nope").await.unwrap_err();
        assert!(matches!(err, BoxError::NotFound(_)));
        assert!(membership.snapshot().is_none());
    }

    #[tokio::test]
    async fn blank_identifiers_never_reach_the_store() {
        let fake = store();
        let membership = MembershipStore::new(fake.clone());

        for identifier in ["", "   ", "\t\n"] {
            let err = membership.add_member("box1", identifier).await.unwrap_err();
            assert!(matches!(err, BoxError::Validation(_)));
        }
        assert_eq!(fake.calls(), 0);
    }

    #[tokio::test]
    async fn add_requires_reload_to_observe() {
        let fake = store();
        let mut membership = MembershipStore::new(fake.clone());
        membership.load("box1").await.unwrap();

        membership.add_member("box1", "u2@x.com").await.unwrap();
        assert_eq!(uids(membership.snapshot().unwrap()), ["u1"]);

        let info = membership.load("box1").await.unwrap();
        assert_eq!(uids(info), ["u1", "u2"]);
    }

    #[tokio::test]
    async fn already_member_is_propagated() {
        let fake = store();
        let membership = MembershipStore::new(fake.clone());
        membership.add_member("box1", "u2@x.com").await.unwrap();

        let err = membership.add_member("box1", " u2@x.com ").await.unwrap_err();
        assert_eq!(
            err,
            BoxError::AlreadyMember {
                box_id: "box1".into(),
                user_id: "u2".into()
            }
        );
    }

    #[tokio::test]
    async fn author_is_never_removed() {
        let fake = store();
        let mut membership = MembershipStore::new(fake.clone());
        membership.add_member("box1", "u2").await.unwrap();
        let before = membership.load("box1").await.unwrap().clone();
        let calls = fake.calls();

        let err = membership.remove_member("box1", "u1").await.unwrap_err();
        assert!(matches!(err, BoxError::AuthorProtected { .. }));
        assert_eq!(fake.calls(), calls);
        assert_eq!(membership.load("box1").await.unwrap(), &before);
    }

    #[tokio::test]
    async fn remove_needs_a_loaded_roster() {
        let fake = store();
        let mut membership = MembershipStore::new(fake.clone());

        let err = membership.remove_member("box1", "u2").await.unwrap_err();
        assert!(matches!(err, BoxError::Validation(_)));

        membership.load("box1").await.unwrap();
        let err = membership.remove_member("other", "u2").await.unwrap_err();
        assert!(matches!(err, BoxError::Validation(_)));
    }

    #[tokio::test]
    async fn transport_errors_surface_unchanged() {
        let fake = store();
        let mut membership = MembershipStore::new(fake.clone());
        membership.load("box1").await.unwrap();
        fake.set_failing(true);

        let err = membership.remove_member("box1", "u2").await.unwrap_err();
        assert_eq!(err, BoxError::Transport("backend unavailable".into()));
        let err = membership.add_member("box1", "u3").await.unwrap_err();
        assert_eq!(err, BoxError::Transport("backend unavailable".into()));
    }

    #[tokio::test]
    async fn enroll_then_remove_round() {
        let fake = store();
        let mut membership = MembershipStore::new(fake.clone());

        membership.add_member("box1", "u2@x.com").await.unwrap();
        membership.add_member("box1", "u3").await.unwrap();
        assert_eq!(uids(membership.load("box1").await.unwrap()), ["u1", "u2", "u3"]);

        membership.remove_member("box1", "u2").await.unwrap();
        assert_eq!(uids(membership.load("box1").await.unwrap()), ["u1", "u3"]);
    }
}
