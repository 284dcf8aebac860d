use serde::{Deserialize, Serialize};

use crate::error::BoxError;
use crate::models::{Profile, UserAggregate};

/// One delivery from a live subscription. Every `Snapshot` is the complete
/// current state and supersedes any earlier one; it is never a diff.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotEvent<T> {
    Snapshot(T),
    Failed(BoxError),
}

impl<T> SnapshotEvent<T> {
    pub fn into_result(self) -> Result<T, BoxError> {
        match self {
            Self::Snapshot(data) => Ok(data),
            Self::Failed(err) => Err(err),
        }
    }
}

/// Choice made on an item's action sheet. The sheet always presents the
/// destructive option first and cancel second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MenuAction {
    /// Remove the selected member or delete the selected post.
    Destructive,
    Cancel,
}

impl MenuAction {
    pub const DESTRUCTIVE_INDEX: usize = 0;
    pub const CANCEL_INDEX: usize = 1;

    /// Convert a raw sheet index once, at the UI boundary.
    pub fn from_index(index: usize) -> Result<Self, BoxError> {
        match index {
            Self::DESTRUCTIVE_INDEX => Ok(Self::Destructive),
            Self::CANCEL_INDEX => Ok(Self::Cancel),
            other => Err(BoxError::InvalidSelection(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Events pushed to a live WebSocket client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum LiveEvent {
    /// Aggregate recomputed from a fresh feed snapshot
    Stats(UserAggregate),

    /// Profile document changed
    Profile(Profile),

    /// Message for the user, as raised through a notification sink
    Notice { message: String, severity: Severity },
}
