use std::sync::Arc;

use tracing::{error, info};

use boxroom_types::events::{MenuAction, Severity};
use boxroom_types::models::{BoxInfo, post_key};
use boxroom_types::{BoxError, Result};

use crate::context::BoxContext;
use crate::membership::MembershipStore;
use crate::notify::Notifier;
use crate::ports::{BoxStore, FeedStore};

/// Item an action sheet was opened for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Member { uid: String },
    Post { key: String },
}

impl Selection {
    pub fn member(uid: impl Into<String>) -> Self {
        Self::Member { uid: uid.into() }
    }

    /// Select a post by its content name (`"abc.jpg"` selects post `abc`).
    pub fn post_named(name: &str) -> Self {
        Self::Post {
            key: post_key(name).to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Removed { uid: String },
    Deleted { key: String },
    Cancelled,
}

/// Routes action-sheet choices to membership and feed commands and reports
/// every result through the notifier.
///
/// Choosing the destructive option is the confirmation: nothing else is
/// asked. The pending selection is cleared after every resolution,
/// successful or not. The add-member input is cleared only once the
/// enrollment it names went through.
pub struct ActionDispatcher {
    membership: MembershipStore,
    feeds: Arc<dyn FeedStore>,
    notifier: Arc<dyn Notifier>,
    pending: Option<Selection>,
    /// Text typed into the add-member field
    input: String,
}

impl ActionDispatcher {
    pub fn new(
        boxes: Arc<dyn BoxStore>,
        feeds: Arc<dyn FeedStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            membership: MembershipStore::new(boxes),
            feeds,
            notifier,
            pending: None,
            input: String::new(),
        }
    }

    pub fn membership(&self) -> &MembershipStore {
        &self.membership
    }

    /// Re-load the roster of the current box.
    pub async fn refresh(&mut self, ctx: &BoxContext) -> Result<&BoxInfo> {
        match self.membership.load(&ctx.box_id).await {
            Ok(info) => Ok(info),
            Err(err) => {
                self.notifier.notify(&err.to_string(), Severity::Error);
                Err(err)
            }
        }
    }

    /// Enroll a user, then re-load the roster so the new member shows up.
    /// A failed re-load is reported but does not undo the enrollment.
    pub async fn add_member(&mut self, ctx: &BoxContext, identifier: &str) -> Result<()> {
        if let Err(err) = self.membership.add_member(&ctx.box_id, identifier).await {
            self.report(&err);
            return Err(err);
        }
        self.notifier.notify("User Added", Severity::Info);
        let _ = self.refresh(ctx).await;
        Ok(())
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    /// Enroll whoever was typed into the add-member field, keeping the text
    /// when the enrollment fails so it can be corrected.
    pub async fn submit_input(&mut self, ctx: &BoxContext) -> Result<()> {
        let identifier = self.input.clone();
        self.add_member(ctx, &identifier).await?;
        self.input.clear();
        Ok(())
    }

    pub fn select(&mut self, selection: Selection) {
        self.pending = Some(selection);
    }

    pub fn pending(&self) -> Option<&Selection> {
        self.pending.as_ref()
    }

    /// Resolve a raw action-sheet index. Indices other than the destructive
    /// and cancel options are a caller bug.
    pub async fn resolve_index(&mut self, ctx: &BoxContext, index: usize) -> Result<Outcome> {
        match MenuAction::from_index(index) {
            Ok(action) => self.resolve(ctx, action).await,
            Err(err) => {
                error!("Action sheet returned index {} for {:?}", index, self.pending);
                self.pending = None;
                self.report(&err);
                Err(err)
            }
        }
    }

    pub async fn resolve(&mut self, ctx: &BoxContext, action: MenuAction) -> Result<Outcome> {
        let selection = self.pending.take();
        let result = match (action, selection) {
            (MenuAction::Cancel, _) => {
                info!("Cancelling the action sheet");
                return Ok(Outcome::Cancelled);
            }
            (MenuAction::Destructive, None) => {
                Err(BoxError::Validation("nothing is selected".into()))
            }
            (MenuAction::Destructive, Some(Selection::Member { uid })) => {
                self.remove_member(ctx, uid).await
            }
            (MenuAction::Destructive, Some(Selection::Post { key })) => {
                self.delete_post(ctx, key).await
            }
        };

        if let Err(err) = &result {
            self.report(err);
        }
        result
    }

    async fn remove_member(&mut self, ctx: &BoxContext, uid: String) -> Result<Outcome> {
        self.membership.remove_member(&ctx.box_id, &uid).await?;
        self.notifier
            .notify("User removed from the box", Severity::Info);
        let _ = self.refresh(ctx).await;
        Ok(Outcome::Removed { uid })
    }

    async fn delete_post(&mut self, ctx: &BoxContext, key: String) -> Result<Outcome> {
        if key.trim().is_empty() {
            return Err(BoxError::Validation("post key is empty".into()));
        }
        self.feeds.delete_post(&ctx.box_id, &key).await?;
        info!("Deleted post {} from box {}", key, ctx.box_id);
        self.notifier
            .notify("Post Deleted Successfully", Severity::Info);
        Ok(Outcome::Deleted { key })
    }

    fn report(&self, err: &BoxError) {
        match err {
            BoxError::AuthorProtected { .. } => self
                .notifier
                .notify("Author can't leave the box", Severity::Warning),
            other => self.notifier.notify(&other.to_string(), Severity::Error),
        }
    }
}
