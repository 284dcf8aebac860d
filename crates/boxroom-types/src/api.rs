use serde::{Deserialize, Serialize};

use crate::models::ReactionKind;

// -- Members --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddMemberRequest {
    /// Email address or user id of the user to enroll.
    pub identifier: String,
}

// -- Posts --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePostRequest {
    pub uid: String,
    /// Content name such as `"1699999999.jpg"`. Generated when absent.
    #[serde(default)]
    pub name: Option<String>,
    pub content_ref: String,
}

#[derive(Debug, Serialize)]
pub struct CreatePostResponse {
    pub key: String,
}

// -- Reactions --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToggleReactionRequest {
    pub uid: String,
    pub kind: ReactionKind,
}

#[derive(Debug, Serialize)]
pub struct ToggleReactionResponse {
    pub added: bool,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
