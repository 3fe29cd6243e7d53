//! TOML configuration file loading
//!
//! Supports `~/.config/chatrobot/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct RobotConfigFile {
    /// Device cloud identity
    #[serde(default)]
    pub device: DeviceFileConfig,

    /// Streaming server
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Audio capture parameters
    #[serde(default)]
    pub capture: CaptureFileConfig,

    /// Audio output parameters
    #[serde(default)]
    pub output: OutputFileConfig,

    /// Speech service
    #[serde(default)]
    pub speech: SpeechFileConfig,

    /// Intent classifier
    #[serde(default)]
    pub intent: IntentFileConfig,

    /// Timeout for external HTTP calls, in seconds
    pub request_timeout_secs: Option<u64>,

    /// Bulk reply phrase file
    pub phrases: Option<String>,
}

/// Device cloud configuration
#[derive(Debug, Default, Deserialize)]
pub struct DeviceFileConfig {
    pub id: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub cloud_url: Option<String>,
}

/// Streaming server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Listening port
    pub port: Option<u16>,

    /// Host advertised to the device (defaults to the outbound address)
    pub host: Option<String>,
}

/// Capture configuration
#[derive(Debug, Default, Deserialize)]
pub struct CaptureFileConfig {
    pub sample_rate: Option<u32>,
    pub bits_per_sample: Option<u16>,
    pub channels: Option<u16>,
    pub nominal_samples: Option<u32>,
    pub end_packet_size: Option<usize>,
    pub recording_path: Option<String>,
}

/// Output configuration
#[derive(Debug, Default, Deserialize)]
pub struct OutputFileConfig {
    pub bytes_per_second: Option<u32>,
    pub chunk_size: Option<u32>,
    pub queue_depth: Option<usize>,
}

/// Speech service configuration
#[derive(Debug, Default, Deserialize)]
pub struct SpeechFileConfig {
    pub api_key: Option<String>,
    /// "male" or "female"
    pub voice: Option<String>,
    pub token_url: Option<String>,
    pub tts_url: Option<String>,
    pub stt_url: Option<String>,
}

/// Intent classifier configuration
#[derive(Debug, Default, Deserialize)]
pub struct IntentFileConfig {
    pub app_id: Option<String>,
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `RobotConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> RobotConfigFile {
    let Some(path) = config_file_path() else {
        return RobotConfigFile::default();
    };

    if !path.exists() {
        return RobotConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                RobotConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            RobotConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/chatrobot/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    std::env::var("CHATROBOT_CONFIG").map_or_else(
        |_| directories::BaseDirs::new().map(|d| d.config_dir().join("chatrobot").join("config.toml")),
        |p| Some(PathBuf::from(p)),
    )
}
