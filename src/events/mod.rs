//! Robot status, info and error events
//!
//! Replaces callback side channels with a typed broadcast bus. Publishing is
//! best-effort: every event is logged, and delivery to subscribers never
//! propagates an error to the publisher.
//!
//! Create one [`EventBus`] at startup, clone it into each component, and call
//! [`EventBus::subscribe`] wherever events are consumed.

use std::fmt;

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::Error;

/// Default number of buffered events per subscriber
const DEFAULT_CAPACITY: usize = 256;

/// Lifecycle status transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Device reported online to the cloud
    DeviceOnline,
    /// Device reported offline to the cloud
    DeviceOffline,
    /// Device opened its streaming socket
    StreamConnected,
    /// Streaming socket closed or errored
    StreamDisconnected,
    /// Device online and stream connected
    ChatbotReady,
}

impl Status {
    /// Wire name of the status
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DeviceOnline => "DEVICE_ONLINE",
            Self::DeviceOffline => "DEVICE_OFFLINE",
            Self::StreamConnected => "STREAM_CONNECTED",
            Self::StreamDisconnected => "STREAM_DISCONNECTED",
            Self::ChatbotReady => "CHATBOT_READY",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of a recovered error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Socket-level failure
    Connection,
    /// Recording sink write failure
    Recording,
    /// Nothing recognized in an utterance
    Recognition,
    /// Intent classifier failure
    Classification,
    /// Behavior failure
    Dispatch,
    /// Device function call failure
    RemoteCommand,
    /// Audio output pipeline failure
    Pipeline,
    /// Device cloud login or event stream failure
    DeviceCloud,
    /// Bad configuration, phrase file or tone
    Config,
    /// HTTP or payload decoding failure outside a more specific boundary
    Transport,
}

impl ErrorKind {
    /// Classify a crate error
    #[must_use]
    pub const fn of(error: &Error) -> Self {
        match error {
            Error::Connection(_) | Error::NotConnected | Error::Io(_) => Self::Connection,
            Error::Recording(_) => Self::Recording,
            Error::Recognition(_) | Error::Stt(_) => Self::Recognition,
            Error::Classification(_) => Self::Classification,
            Error::RemoteCommand(_) => Self::RemoteCommand,
            Error::DeviceCloud(_) => Self::DeviceCloud,
            Error::Audio(_) | Error::Tts(_) => Self::Pipeline,
            Error::Dispatch(_) => Self::Dispatch,
            Error::Config(_) | Error::Yaml(_) | Error::Toml(_) | Error::InvalidTone(_) => {
                Self::Config
            }
            Error::Http(_) | Error::Serialization(_) => Self::Transport,
        }
    }
}

/// Event payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Lifecycle transition
    Status {
        /// New status
        status: Status,
    },
    /// Informational message
    Info {
        /// Message text
        message: String,
    },
    /// Recovered error
    Error {
        /// Error category
        kind: ErrorKind,
        /// Error description
        message: String,
    },
}

/// An event published on the bus
#[derive(Debug, Clone, Serialize)]
pub struct RobotEvent {
    /// Unique event ID (UUID v4)
    pub id: String,
    /// RFC 3339 timestamp
    pub timestamp: String,
    /// Event payload
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl RobotEvent {
    /// Create a new event with auto-generated `id` and `timestamp`.
    #[must_use]
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            payload,
        }
    }

    /// Build a status event
    #[must_use]
    pub fn status(status: Status) -> Self {
        Self::new(EventPayload::Status { status })
    }

    /// Build an info event
    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(EventPayload::Info {
            message: message.into(),
        })
    }

    /// Build an error event
    #[must_use]
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::new(EventPayload::Error {
            kind,
            message: message.into(),
        })
    }

    /// Status carried by this event, if any
    #[must_use]
    pub const fn as_status(&self) -> Option<Status> {
        match self.payload {
            EventPayload::Status { status } => Some(status),
            _ => None,
        }
    }

    /// Error kind carried by this event, if any
    #[must_use]
    pub const fn error_kind(&self) -> Option<ErrorKind> {
        match self.payload {
            EventPayload::Error { kind, .. } => Some(kind),
            _ => None,
        }
    }
}

/// Broadcast bus for [`RobotEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RobotEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a bus with the default buffer size
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus buffering up to `capacity` events per subscriber
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to events published after this call
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RobotEvent> {
        self.tx.subscribe()
    }

    /// Publish an event (best-effort)
    pub fn publish(&self, event: RobotEvent) {
        match &event.payload {
            EventPayload::Status { status } => tracing::info!(%status, "status"),
            EventPayload::Info { message } => tracing::debug!(%message, "info"),
            EventPayload::Error { kind, message } => {
                tracing::warn!(?kind, %message, "recovered error");
            }
        }

        // No subscribers is not an error
        let _ = self.tx.send(event);
    }

    /// Publish a status transition
    pub fn status(&self, status: Status) {
        self.publish(RobotEvent::status(status));
    }

    /// Publish an info message
    pub fn info(&self, message: impl Into<String>) {
        self.publish(RobotEvent::info(message));
    }

    /// Publish a recovered error of an explicit kind
    pub fn error(&self, kind: ErrorKind, message: impl Into<String>) {
        self.publish(RobotEvent::error(kind, message));
    }

    /// Publish a recovered crate error, classified by [`ErrorKind::of`]
    pub fn report(&self, error: &Error) {
        self.error(ErrorKind::of(error), error.to_string());
    }
}
