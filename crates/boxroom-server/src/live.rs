//! Live WebSocket stream of one user's stats and profile in a box.
//!
//! Every connection gets its own subscribers, so two clients watching the
//! same box never replace each other's subscription.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use boxroom_core::{
    BoxContext, FeedSubscriber, Notifier, ProfileSubscriber, ProfileWatcher, UserStatsWatcher,
};
use boxroom_types::events::{LiveEvent, Severity};

use crate::routes::AppState;

/// Forwards notifications to the connection loop.
struct ChannelNotifier {
    tx: mpsc::UnboundedSender<(String, Severity)>,
}

impl Notifier for ChannelNotifier {
    fn notify(&self, message: &str, severity: Severity) {
        let _ = self.tx.send((message.to_string(), severity));
    }
}

pub async fn live(
    State(state): State<AppState>,
    Path((box_id, user_id)): Path<(String, String)>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_live(socket, state, box_id, user_id))
}

async fn run_live(socket: WebSocket, state: AppState, box_id: String, user_id: String) {
    let (mut sender, mut receiver) = socket.split();
    info!("{} watching box {}", user_id, box_id);

    let (note_tx, mut notes) = mpsc::unbounded_channel();
    let notifier: Arc<dyn Notifier> = Arc::new(ChannelNotifier { tx: note_tx });

    let feeds = FeedSubscriber::new(state.store.clone());
    let profiles = ProfileSubscriber::new(state.store.clone());
    let ctx = BoxContext::new(box_id.as_str(), user_id.as_str());
    let stats_watcher = UserStatsWatcher::start(&feeds, &ctx, &user_id, notifier.clone()).await;
    let profile_watcher = ProfileWatcher::start(&profiles, &user_id, notifier).await;

    let mut stats = stats_watcher.stats();
    let mut profile = profile_watcher.profile();

    // Without a box there is no feed: the zero stats go out once and the
    // profile keeps streaming.
    let has_feed = stats_watcher.handle().is_some();
    if !has_feed && !send_event(&mut sender, &LiveEvent::Stats(stats_watcher.current())).await {
        return;
    }

    loop {
        // Notices first: a failing feed reports before its channel closes.
        let event = tokio::select! {
            biased;
            Some((message, severity)) = notes.recv() => LiveEvent::Notice { message, severity },
            changed = stats.changed(), if has_feed => match changed {
                Ok(()) => LiveEvent::Stats(stats.borrow_and_update().clone()),
                Err(_) => {
                    debug!("Feed of box {} ended", box_id);
                    break;
                }
            },
            changed = profile.changed() => match changed {
                Ok(()) => match profile.borrow_and_update().clone() {
                    Some(doc) => LiveEvent::Profile(doc),
                    None => continue,
                },
                Err(_) => break,
            },
            msg = receiver.next() => match msg {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => continue,
            },
        };

        if !send_event(&mut sender, &event).await {
            break;
        }
    }

    // Deliver anything reported while shutting down, then stop watching.
    while let Ok((message, severity)) = notes.try_recv() {
        if !send_event(&mut sender, &LiveEvent::Notice { message, severity }).await {
            break;
        }
    }
    stats_watcher.stop();
    profile_watcher.stop();
    info!("{} stopped watching box {}", user_id, box_id);
}

async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &LiveEvent) -> bool {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to encode live event: {}", e);
            return true;
        }
    };
    sender.send(Message::Text(text.into())).await.is_ok()
}
