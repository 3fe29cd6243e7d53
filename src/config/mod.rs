//! Configuration management for the chat robot gateway
//!
//! Values resolve with priority env > TOML file > default.

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::speech::VoiceGender;
use crate::{Error, Result};

pub use file::RobotConfigFile;

/// Default streaming server port
pub const DEFAULT_PORT: u16 = 5000;

/// Default device cloud base URL
const DEFAULT_CLOUD_URL: &str = "https://api.particle.io";

/// Default speech token endpoint
const DEFAULT_TOKEN_URL: &str = "https://westus.api.cognitive.microsoft.com/sts/v1.0/issueToken";

/// Default text-to-speech endpoint
const DEFAULT_TTS_URL: &str = "https://westus.tts.speech.microsoft.com/cognitiveservices/v1";

/// Default speech-to-text endpoint
const DEFAULT_STT_URL: &str = "https://speech.platform.bing.com/recognize";

/// Default intent classifier endpoint
const DEFAULT_INTENT_URL: &str = "https://westus.api.cognitive.microsoft.com/luis/v2.0/apps";

/// Chat robot gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Device cloud identity
    pub device: DeviceConfig,

    /// Streaming server
    pub server: ServerConfig,

    /// Audio capture parameters
    pub capture: CaptureConfig,

    /// Audio output parameters
    pub output: OutputConfig,

    /// Speech service
    pub speech: SpeechConfig,

    /// Intent classifier
    pub intent: IntentConfig,

    /// Timeout applied to every external HTTP call
    pub request_timeout: Duration,

    /// Bulk reply phrase file
    pub phrases_path: Option<PathBuf>,
}

/// Device cloud configuration
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Device identifier
    pub device_id: String,

    /// Cloud account username
    pub username: String,

    /// Cloud account password
    pub password: SecretString,

    /// Cloud REST base URL
    pub cloud_url: String,
}

/// Streaming server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listening port
    pub port: u16,

    /// Host advertised to the device; detected when absent
    pub host: Option<String>,
}

/// Audio capture configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Capture sample rate in Hz
    pub sample_rate: u32,

    /// Capture bit depth
    pub bits_per_sample: u16,

    /// Capture channel count
    pub channels: u16,

    /// Nominal sample count used for the placeholder RIFF size
    pub nominal_samples: u32,

    /// Trailing window inspected for the end-of-utterance marker
    pub end_packet_size: usize,

    /// Mirror each recording to this file
    pub recording_path: Option<PathBuf>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            bits_per_sample: 8,
            channels: 1,
            nominal_samples: 1000,
            end_packet_size: 100,
            recording_path: None,
        }
    }
}

/// Audio output configuration
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Byte rate cap
    pub bytes_per_second: u32,

    /// Bytes written per throttled write
    pub chunk_size: u32,

    /// Chunks buffered between conversion and throttling
    pub queue_depth: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            bytes_per_second: 16 * 1024,
            chunk_size: 16,
            queue_depth: 500,
        }
    }
}

/// Speech service configuration
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    /// Subscription key
    pub api_key: Option<SecretString>,

    /// Synthesized voice
    pub voice: VoiceGender,

    /// Token issuance endpoint
    pub token_url: String,

    /// Synthesis endpoint
    pub tts_url: String,

    /// Recognition endpoint
    pub stt_url: String,
}

/// Intent classifier configuration
#[derive(Debug, Clone)]
pub struct IntentConfig {
    /// Application ID
    pub app_id: Option<String>,

    /// Subscription key
    pub api_key: Option<SecretString>,

    /// Base endpoint, the app ID is appended
    pub endpoint: String,
}

impl Config {
    /// Load configuration from the environment and the TOML config file
    ///
    /// # Errors
    ///
    /// Returns error if a value is present but malformed
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        Self::resolve(fc, |key| std::env::var(key).ok())
    }

    /// Resolve configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a value is present but malformed
    pub fn resolve<F>(fc: RobotConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let device = DeviceConfig {
            device_id: env("PARTICLE_DEVICE_ID")
                .or(fc.device.id)
                .unwrap_or_default(),
            username: env("PARTICLE_USERNAME")
                .or(fc.device.username)
                .unwrap_or_default(),
            password: SecretString::from(
                env("PARTICLE_PASSWORD")
                    .or(fc.device.password)
                    .unwrap_or_default(),
            ),
            cloud_url: env("CHATROBOT_CLOUD_URL")
                .or(fc.device.cloud_url)
                .unwrap_or_else(|| DEFAULT_CLOUD_URL.to_string()),
        };

        let port = match env("CHATBOT_PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|_| Error::Config(format!("invalid CHATBOT_PORT: {raw}")))?,
            None => fc.server.port.unwrap_or(DEFAULT_PORT),
        };
        let server = ServerConfig {
            port,
            host: env("CHATBOT_HOST").or(fc.server.host).filter(|h| !h.is_empty()),
        };

        let capture_default = CaptureConfig::default();
        let end_packet_size = match env("CHATROBOT_END_PACKET_SIZE") {
            Some(raw) => raw
                .parse()
                .map_err(|_| Error::Config(format!("invalid CHATROBOT_END_PACKET_SIZE: {raw}")))?,
            None => fc
                .capture
                .end_packet_size
                .unwrap_or(capture_default.end_packet_size),
        };
        if end_packet_size == 0 {
            return Err(Error::Config("end packet size must be non-zero".to_string()));
        }
        let capture = CaptureConfig {
            sample_rate: fc.capture.sample_rate.unwrap_or(capture_default.sample_rate),
            bits_per_sample: fc
                .capture
                .bits_per_sample
                .unwrap_or(capture_default.bits_per_sample),
            channels: fc.capture.channels.unwrap_or(capture_default.channels),
            nominal_samples: fc
                .capture
                .nominal_samples
                .unwrap_or(capture_default.nominal_samples),
            end_packet_size,
            recording_path: env("CHATROBOT_RECORDING_PATH")
                .or(fc.capture.recording_path)
                .map(PathBuf::from),
        };

        let output_default = OutputConfig::default();
        let output = OutputConfig {
            bytes_per_second: fc
                .output
                .bytes_per_second
                .unwrap_or(output_default.bytes_per_second),
            chunk_size: fc.output.chunk_size.unwrap_or(output_default.chunk_size),
            queue_depth: fc.output.queue_depth.unwrap_or(output_default.queue_depth),
        };
        if output.bytes_per_second == 0 || output.chunk_size == 0 || output.queue_depth == 0 {
            return Err(Error::Config(
                "output rate, chunk size and queue depth must be non-zero".to_string(),
            ));
        }
        if output.chunk_size > output.bytes_per_second {
            return Err(Error::Config(
                "output chunk size cannot exceed the byte rate".to_string(),
            ));
        }

        let voice = env("CHATROBOT_VOICE")
            .or(fc.speech.voice)
            .map(|v| v.parse::<VoiceGender>())
            .transpose()?
            .unwrap_or_default();
        let speech = SpeechConfig {
            api_key: env("MICROSOFT_SPEECH_API_KEY")
                .or(fc.speech.api_key)
                .filter(|k| !k.is_empty())
                .map(SecretString::from),
            voice,
            token_url: fc
                .speech
                .token_url
                .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
            tts_url: fc.speech.tts_url.unwrap_or_else(|| DEFAULT_TTS_URL.to_string()),
            stt_url: fc.speech.stt_url.unwrap_or_else(|| DEFAULT_STT_URL.to_string()),
        };

        let intent = IntentConfig {
            app_id: env("MICROSOFT_LUIS_APPID")
                .or(fc.intent.app_id)
                .filter(|k| !k.is_empty()),
            api_key: env("MICROSOFT_LUIS_KEY")
                .or(fc.intent.api_key)
                .filter(|k| !k.is_empty())
                .map(SecretString::from),
            endpoint: env("CHATROBOT_INTENT_URL")
                .or(fc.intent.endpoint)
                .unwrap_or_else(|| DEFAULT_INTENT_URL.to_string()),
        };

        let request_timeout = Duration::from_secs(
            env("CHATROBOT_REQUEST_TIMEOUT")
                .and_then(|s| s.parse().ok())
                .or(fc.request_timeout_secs)
                .unwrap_or(15),
        );

        let phrases_path = env("CHATROBOT_PHRASES")
            .or(fc.phrases)
            .map(PathBuf::from);

        Ok(Self {
            device,
            server,
            capture,
            output,
            speech,
            intent,
            request_timeout,
            phrases_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_env_or_file() {
        let config = Config::resolve(RobotConfigFile::default(), env_from(&[])).unwrap();

        assert_eq!(config.server.port, DEFAULT_PORT);
        assert!(config.server.host.is_none());
        assert_eq!(config.capture.sample_rate, 16_000);
        assert_eq!(config.capture.bits_per_sample, 8);
        assert_eq!(config.capture.channels, 1);
        assert_eq!(config.capture.nominal_samples, 1000);
        assert_eq!(config.capture.end_packet_size, 100);
        assert_eq!(config.output.bytes_per_second, 16 * 1024);
        assert_eq!(config.output.chunk_size, 16);
        assert_eq!(config.output.queue_depth, 500);
        assert_eq!(config.speech.voice, VoiceGender::Female);
        assert!(config.speech.api_key.is_none());
        assert_eq!(config.request_timeout, Duration::from_secs(15));
    }

    #[test]
    fn env_overrides_file() {
        let fc: RobotConfigFile = toml::from_str(
            r#"
            [server]
            port = 6000
            host = "10.0.0.2"

            [device]
            id = "file-device"
            "#,
        )
        .unwrap();

        let config = Config::resolve(
            fc,
            env_from(&[
                ("CHATBOT_PORT", "7000"),
                ("PARTICLE_DEVICE_ID", "env-device"),
                ("PARTICLE_PASSWORD", "hunter2"),
            ]),
        )
        .unwrap();

        assert_eq!(config.server.port, 7000);
        assert_eq!(config.server.host.as_deref(), Some("10.0.0.2"));
        assert_eq!(config.device.device_id, "env-device");
        assert_eq!(config.device.password.expose_secret(), "hunter2");
    }

    #[test]
    fn invalid_port_is_rejected() {
        let result = Config::resolve(
            RobotConfigFile::default(),
            env_from(&[("CHATBOT_PORT", "not-a-port")]),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn zero_end_packet_size_is_rejected() {
        let result = Config::resolve(
            RobotConfigFile::default(),
            env_from(&[("CHATROBOT_END_PACKET_SIZE", "0")]),
        );
        assert!(result.is_err());
    }

    #[test]
    fn empty_host_falls_back_to_detection() {
        let config = Config::resolve(
            RobotConfigFile::default(),
            env_from(&[("CHATBOT_HOST", "")]),
        )
        .unwrap();
        assert!(config.server.host.is_none());
    }

    #[test]
    fn password_is_redacted_in_debug() {
        let config = Config::resolve(
            RobotConfigFile::default(),
            env_from(&[("PARTICLE_PASSWORD", "hunter2")]),
        )
        .unwrap();
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
