//! The sink through which everything reaches the UI shell.
//!
//! Three channels: serialized protocol messages, toast-level notifications,
//! and user-visible output lines. The bridge builds the protocol JSON here
//! so the rest of the code deals in typed params.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

/// Severity of a toast notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
    Success,
}

impl NotificationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationLevel::Info => "info",
            NotificationLevel::Warning => "warning",
            NotificationLevel::Error => "error",
            NotificationLevel::Success => "success",
        }
    }

    /// Lenient parse; unknown levels degrade to `Info`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "warning" => NotificationLevel::Warning,
            "error" => NotificationLevel::Error,
            "success" => NotificationLevel::Success,
            _ => NotificationLevel::Info,
        }
    }
}

/// Severity of a user-output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLevel {
    Debug,
    Info,
    Log,
    Warning,
    Error,
    Success,
}

impl OutputLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputLevel::Debug => "debug",
            OutputLevel::Info => "info",
            OutputLevel::Log => "log",
            OutputLevel::Warning => "warning",
            OutputLevel::Error => "error",
            OutputLevel::Success => "success",
        }
    }

    /// Map an adapter output category onto a client level.
    pub fn from_category(category: &str) -> Self {
        match category {
            "console" | "debug" => OutputLevel::Debug,
            "info" => OutputLevel::Info,
            "warning" => OutputLevel::Warning,
            "error" | "stderr" => OutputLevel::Error,
            "success" => OutputLevel::Success,
            // "log", "stdout" and anything unrecognized
            _ => OutputLevel::Log,
        }
    }
}

/// Implemented by the host embedding the bridge.
pub trait ClientCallback: Send + Sync + 'static {
    /// A serialized protocol message (response or event).
    fn send_protocol_message(&self, message: String);

    /// A toast-level notification.
    fn send_notification(&self, level: NotificationLevel, message: String);

    /// One line of debuggee or adapter output.
    fn send_user_output(&self, level: OutputLevel, text: String);
}

/// Shared handle over the [`ClientCallback`], with protocol-JSON builders.
/// Closing is idempotent; sends after close are dropped.
#[derive(Clone)]
pub struct ClientSink {
    callback: Arc<dyn ClientCallback>,
    closed: Arc<AtomicBool>,
}

impl ClientSink {
    pub fn new(callback: Arc<dyn ClientCallback>) -> Self {
        Self {
            callback,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn send(&self, message: serde_json::Value) {
        if self.closed.load(Ordering::SeqCst) {
            tracing::debug!("dropping message after close");
            return;
        }
        self.callback.send_protocol_message(message.to_string());
    }

    pub fn reply(&self, id: i64, result: serde_json::Value) {
        self.send(serde_json::json!({"id": id, "result": result}));
    }

    pub fn reply_empty(&self, id: i64) {
        self.reply(id, serde_json::json!({}));
    }

    pub fn reply_error(&self, id: i64, message: impl std::fmt::Display) {
        self.send(serde_json::json!({
            "id": id,
            "error": {"message": message.to_string()},
        }));
    }

    pub fn event(&self, method: &str, params: impl Serialize) {
        let params = match serde_json::to_value(params) {
            Ok(params) => params,
            Err(e) => {
                tracing::error!(method, error = %e, "failed to serialize event params");
                return;
            }
        };
        self.send(serde_json::json!({"method": method, "params": params}));
    }

    pub fn notification(&self, level: NotificationLevel, message: String) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        self.callback.send_notification(level, message);
    }

    pub fn user_output(&self, level: OutputLevel, text: String) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        self.callback.send_user_output(level, text);
    }
}
