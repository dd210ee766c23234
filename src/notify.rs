//! Progress notification port.
//!
//! The orchestrator and tool agents emit short human-readable status messages
//! while they work ("Running web search", "Visiting example.com…"). The sink
//! is a one-way observational side channel handed in at construction — it
//! must never block or fail the calling operation, and it never affects
//! control flow.

use std::sync::Arc;

use serde::Serialize;

// ─── Types ──────────────────────────────────────────────────────────────────

/// Severity of a progress notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Danger,
}

/// A single progress notification.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    /// Short source label, e.g. `"WebSearch"` or `"Retrieval"`.
    pub title: String,
    pub message: String,
    pub level: Severity,
}

impl Notification {
    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            level: Severity::Info,
        }
    }

    pub fn danger(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            level: Severity::Danger,
        }
    }
}

// ─── Sink ───────────────────────────────────────────────────────────────────

/// Fire-and-forget notification sink.
///
/// Implementations must not block and must swallow their own delivery
/// failures — a dropped status message is preferable to a stalled attempt.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, note: Notification);
}

/// Shared sink handle passed into the orchestrator and agents.
pub type SharedSink = Arc<dyn NotificationSink>;

/// Sink that forwards notifications over an unbounded tokio channel.
///
/// The UI side holds the receiver; `send` on an unbounded channel never
/// blocks, and a closed receiver is ignored.
pub struct ChannelSink {
    tx: tokio::sync::mpsc::UnboundedSender<Notification>,
}

impl ChannelSink {
    pub fn new() -> (Self, tokio::sync::mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, note: Notification) {
        let _ = self.tx.send(note);
    }
}

/// Sink that drops every notification. Useful for tests and headless runs.
pub struct NullSink;

impl NotificationSink for NullSink {
    fn notify(&self, _note: Notification) {}
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_sink_delivers() {
        let (sink, mut rx) = ChannelSink::new();
        sink.notify(Notification::info("Test", "hello"));

        let note = rx.try_recv().unwrap();
        assert_eq!(note.title, "Test");
        assert_eq!(note.message, "hello");
        assert_eq!(note.level, Severity::Info);
    }

    #[test]
    fn channel_sink_survives_dropped_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        // Must not panic or error — fire and forget
        sink.notify(Notification::danger("Test", "receiver gone"));
    }
}
