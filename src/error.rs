//! Error types for the chat robot gateway

use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the chat robot gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Streaming socket error (non-fatal, tears down the session)
    #[error("connection error: {0}")]
    Connection(String),

    /// Streaming session is not connected
    #[error("not connected to the streaming socket")]
    NotConnected,

    /// Failed to write captured audio to the recording sink
    #[error("recording error: {0}")]
    Recording(String),

    /// Speech was captured but nothing was recognized
    #[error("recognition failure: {0}")]
    Recognition(String),

    /// Intent classification request failed
    #[error("classification failure: {0}")]
    Classification(String),

    /// A behavior handler failed or panicked
    #[error("dispatch error: {0}")]
    Dispatch(String),

    /// Device cloud function call failed
    #[error("remote command error: {0}")]
    RemoteCommand(String),

    /// Device cloud authentication or event stream error
    #[error("device cloud error: {0}")]
    DeviceCloud(String),

    /// Audio encoding/conversion error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Malformed tone specification
    #[error("invalid tone: {0}")]
    InvalidTone(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl From<hound::Error> for Error {
    fn from(e: hound::Error) -> Self {
        Self::Audio(e.to_string())
    }
}
