//! Error taxonomy shared by the core, the stores and the HTTP surface.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BoxError>;

/// Errors raised by box membership and feed operations.
///
/// `Validation`, `AuthorProtected` and `InvalidSelection` are local: they are
/// produced before any store call is issued. The remaining variants come from
/// a collaborator and are surfaced unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoxError {
    /// Bad local input.
    #[error("{0}")]
    Validation(String),

    /// Attempt to remove the author of a box.
    #[error("user {user_id} is the author of box {box_id} and cannot be removed")]
    AuthorProtected { box_id: String, user_id: String },

    #[error("user {user_id} is already a member of box {box_id}")]
    AlreadyMember { box_id: String, user_id: String },

    #[error("{0} not found")]
    NotFound(String),

    /// A watched profile document no longer exists.
    #[error("user {0} not found, the account might be deleted")]
    AccountDeleted(String),

    /// Network or backend failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// A menu index outside the presented options. Always a caller bug.
    #[error("invalid selection index {0}")]
    InvalidSelection(usize),
}

impl BoxError {
    /// True for errors detected without touching a store.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::AuthorProtected { .. } | Self::InvalidSelection(_)
        )
    }

    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_errors_are_classified() {
        assert!(BoxError::Validation("x".into()).is_local());
        assert!(BoxError::InvalidSelection(7).is_local());
        assert!(
            BoxError::AuthorProtected {
                box_id: "b".into(),
                user_id: "u".into()
            }
            .is_local()
        );
        assert!(!BoxError::transport("socket closed").is_local());
        assert!(!BoxError::AccountDeleted("u".into()).is_local());
    }

    #[test]
    fn messages_are_human_readable() {
        let err = BoxError::AlreadyMember {
            box_id: "box1".into(),
            user_id: "u2".into(),
        };
        assert_eq!(err.to_string(), "user u2 is already a member of box box1");
        assert_eq!(
            BoxError::transport("timed out").to_string(),
            "transport error: timed out"
        );
    }
}
