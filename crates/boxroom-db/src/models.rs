/// Database row types, mapped directly from SQLite rows.
/// Distinct from boxroom-types models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub name: String,
    pub avatar_ref: Option<String>,
}

pub struct BoxRow {
    pub id: String,
    pub author_id: String,
    pub author_name: String,
}

pub struct MemberRow {
    pub user_id: String,
    pub name: String,
}

pub struct PostRow {
    pub key: String,
    pub uid: String,
    pub name: String,
    pub content_ref: String,
}

pub struct ReactionRow {
    pub post_key: String,
    pub user_id: String,
    pub kind: String,
}

/// Result of enrolling an identifier into a box.
#[derive(Debug, PartialEq, Eq)]
pub enum EnrollOutcome {
    Enrolled { user_id: String },
    AlreadyMember { user_id: String },
    UnknownBox,
    UnknownUser,
}
