//! Notification sink for user-visible reports.
//!
//! The core calls `notify` and moves on: delivery is fire-and-forget and
//! never awaited.

use std::sync::Mutex;

use boxroom_types::events::Severity;

pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, severity: Severity);
}

/// Notifier that writes to `tracing`.
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Info => tracing::info!(target: "boxroom::notify", "{}", message),
            Severity::Warning => tracing::warn!(target: "boxroom::notify", "{}", message),
            Severity::Error => tracing::error!(target: "boxroom::notify", "{}", message),
        }
    }
}

/// Keeps every notification in memory, in order.
#[derive(Default)]
pub struct MemoryNotifier {
    entries: Mutex<Vec<(String, Severity)>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(String, Severity)> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.entries().into_iter().map(|(message, _)| message).collect()
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, message: &str, severity: Severity) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((message.to_string(), severity));
        }
    }
}
