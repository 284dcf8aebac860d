use std::path::Path as FsPath;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use boxroom_core::{
    ActionDispatcher, BoxContext, FeedSubscriber, MembershipStore, Selection, TracingNotifier,
    UserStatsWatcher,
};
use boxroom_gateway::LocalStore;
use boxroom_types::BoxError;
use boxroom_types::api::{
    AddMemberRequest, CreatePostRequest, CreatePostResponse, ErrorResponse, ToggleReactionRequest,
    ToggleReactionResponse,
};
use boxroom_types::events::MenuAction;
use boxroom_types::models::{BoxInfo, UserAggregate};

use crate::live;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub store: Arc<LocalStore>,
}

impl AppStateInner {
    /// Dispatcher for one request. HTTP callers have no session, so the
    /// context carries the box only.
    fn dispatcher(&self) -> ActionDispatcher {
        ActionDispatcher::new(
            self.store.clone(),
            self.store.clone(),
            Arc::new(TracingNotifier),
        )
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/boxes/{box_id}", get(get_box))
        .route("/boxes/{box_id}/members", post(add_member))
        .route("/boxes/{box_id}/members/{user_id}", delete(remove_member))
        .route("/boxes/{box_id}/users/{user_id}/stats", get(user_stats))
        .route("/boxes/{box_id}/users/{user_id}/live", get(live::live))
        .route("/boxes/{box_id}/posts", post(create_post))
        .route("/boxes/{box_id}/posts/{post_key}", delete(delete_post))
        .route(
            "/boxes/{box_id}/posts/{post_key}/reactions",
            post(toggle_reaction),
        )
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

// ── Errors ──

pub struct ApiError(BoxError);

impl From<BoxError> for ApiError {
    fn from(err: BoxError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            BoxError::Validation(_) | BoxError::InvalidSelection(_) => StatusCode::BAD_REQUEST,
            BoxError::AuthorProtected { .. } => StatusCode::FORBIDDEN,
            BoxError::NotFound(_) | BoxError::AccountDeleted(_) => StatusCode::NOT_FOUND,
            BoxError::AlreadyMember { .. } => StatusCode::CONFLICT,
            BoxError::Transport(_) => StatusCode::BAD_GATEWAY,
        };
        if status.is_server_error() {
            warn!("Request failed: {}", self.0);
        }
        let body = ErrorResponse {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ── Members ──

pub async fn get_box(
    State(state): State<AppState>,
    Path(box_id): Path<String>,
) -> ApiResult<Json<BoxInfo>> {
    let mut membership = MembershipStore::new(state.store.clone());
    let info = membership.load(&box_id).await?;
    Ok(Json(info.clone()))
}

pub async fn add_member(
    State(state): State<AppState>,
    Path(box_id): Path<String>,
    Json(req): Json<AddMemberRequest>,
) -> ApiResult<impl IntoResponse> {
    let ctx = BoxContext::new(box_id, "");
    let mut dispatcher = state.dispatcher();
    dispatcher.set_input(req.identifier);
    dispatcher.submit_input(&ctx).await?;

    // The enrollment stands even if the re-load failed.
    let info = match dispatcher.membership().snapshot() {
        Some(info) => info.clone(),
        None => dispatcher.refresh(&ctx).await?.clone(),
    };
    Ok((StatusCode::CREATED, Json(info)))
}

pub async fn remove_member(
    State(state): State<AppState>,
    Path((box_id, user_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let ctx = BoxContext::new(box_id, "");
    let mut dispatcher = state.dispatcher();
    dispatcher.refresh(&ctx).await?;
    dispatcher.select(Selection::member(user_id));
    dispatcher.resolve(&ctx, MenuAction::Destructive).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Stats ──

/// One-shot read of a user's stats: subscribe, take the first snapshot,
/// unsubscribe.
pub async fn user_stats(
    State(state): State<AppState>,
    Path((box_id, user_id)): Path<(String, String)>,
) -> ApiResult<Json<UserAggregate>> {
    MembershipStore::new(state.store.clone())
        .load(&box_id)
        .await?;

    let feeds = FeedSubscriber::new(state.store.clone());
    let ctx = BoxContext::new(box_id, user_id.as_str());
    let watcher =
        UserStatsWatcher::start(&feeds, &ctx, &user_id, Arc::new(TracingNotifier)).await;
    if let Some(handle) = watcher.handle() {
        handle.ready().await?;
    }
    let stats = watcher.current();
    watcher.stop();
    Ok(Json(stats))
}

// ── Posts ──

pub async fn create_post(
    State(state): State<AppState>,
    Path(box_id): Path<String>,
    Json(req): Json<CreatePostRequest>,
) -> ApiResult<impl IntoResponse> {
    let name = req
        .name
        .unwrap_or_else(|| generated_name(&req.content_ref));
    let key = state
        .store
        .create_post(&box_id, &req.uid, &name, &req.content_ref)
        .await?;
    Ok((StatusCode::CREATED, Json(CreatePostResponse { key })))
}

pub async fn toggle_reaction(
    State(state): State<AppState>,
    Path((box_id, post_key)): Path<(String, String)>,
    Json(req): Json<ToggleReactionRequest>,
) -> ApiResult<Json<ToggleReactionResponse>> {
    let added = state
        .store
        .toggle_reaction(&box_id, &post_key, &req.uid, req.kind)
        .await?;
    Ok(Json(ToggleReactionResponse { added }))
}

pub async fn delete_post(
    State(state): State<AppState>,
    Path((box_id, post_key)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let ctx = BoxContext::new(box_id, "");
    let mut dispatcher = state.dispatcher();
    dispatcher.select(Selection::Post { key: post_key });
    dispatcher.resolve(&ctx, MenuAction::Destructive).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Timestamp name keeping the extension of the content, `jpg` by default.
fn generated_name(content_ref: &str) -> String {
    let ext = FsPath::new(content_ref)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("jpg");
    format!("{}.{}", chrono::Utc::now().timestamp_millis(), ext)
}
