//! Speech recognition and synthesis (Azure-compatible)

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::config::SpeechConfig;
use crate::{Error, Result};

/// Lifetime of an issued access token
const TOKEN_TTL: Duration = Duration::from_secs(10 * 60);

/// Refresh this long before the token actually expires
const TOKEN_MARGIN: Duration = Duration::from_secs(30);

/// Synthesis output format, the only one the output pipeline accepts
pub const TTS_OUTPUT_FORMAT: &str = "raw-16khz-16bit-mono-pcm";

/// Sample rate declared for recognition uploads
const STT_SAMPLE_RATE: u32 = 16_000;

/// Recognition service application ID
const STT_APP_ID: &str = "D4D52672-91D7-4C74-8AD8-42B1D98141A5";

/// Recognition service instance ID
const STT_INSTANCE_ID: &str = "f7370be0-c9b3-46a6-bf6e-a7f6049a1aba";

const USER_AGENT: &str = "Chat Robot";

/// Synthesized voice
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VoiceGender {
    /// Male neural voice
    Male,
    /// Female neural voice with a conversational style
    #[default]
    Female,
}

impl VoiceGender {
    /// Wire name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
        }
    }

    /// Wrap escaped text in the SSML document for this voice
    #[must_use]
    pub fn ssml(&self, text: &str) -> String {
        let text = escape_xml(text);
        let voice = match self {
            Self::Male => format!(r#"<voice name="en-US-ChristopherNeural">{text}</voice>"#),
            Self::Female => format!(
                r#"<voice style="chat" styledegree="2" name="en-US-JennyNeural">{text}</voice>"#
            ),
        };
        format!(
            r#"<speak version="1.0" xmlns="http://www.w3.org/2001/10/synthesis" xml:lang="en-US">{voice}</speak>"#
        )
    }
}

impl fmt::Display for VoiceGender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoiceGender {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" => Ok(Self::Male),
            "female" => Ok(Self::Female),
            other => Err(Error::Config(format!("unknown voice gender: {other}"))),
        }
    }
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Speech recognition and synthesis
#[async_trait]
pub trait SpeechService: Send + Sync {
    /// Transcribe a WAV container; `None` when nothing was recognized
    async fn recognize(&self, wav: &[u8]) -> Result<Option<String>>;

    /// Synthesize text to 16 kHz 16-bit mono PCM
    async fn synthesize(&self, text: &str, voice: VoiceGender) -> Result<Vec<u8>>;
}

#[derive(Deserialize)]
struct RecognitionResponse {
    header: RecognitionHeader,
}

#[derive(Deserialize)]
struct RecognitionHeader {
    status: String,
    #[serde(default)]
    name: Option<String>,
}

/// Extract the recognized phrase from a recognition response body
fn recognized_text(body: &str) -> Result<Option<String>> {
    let response: RecognitionResponse = serde_json::from_str(body)?;
    if response.header.status != "success" {
        return Ok(None);
    }
    Ok(response
        .header
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty()))
}

struct CachedToken {
    token: String,
    expires: Instant,
}

/// Azure speech client with a cached access token
pub struct AzureSpeech {
    client: reqwest::Client,
    api_key: SecretString,
    token_url: String,
    tts_url: String,
    stt_url: String,
    timeout: Duration,
    token: RwLock<Option<CachedToken>>,
}

impl fmt::Debug for AzureSpeech {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureSpeech")
            .field("tts_url", &self.tts_url)
            .field("stt_url", &self.stt_url)
            .finish_non_exhaustive()
    }
}

impl AzureSpeech {
    /// Create a client from configuration
    ///
    /// # Errors
    ///
    /// Returns error if no API key is configured
    pub fn new(config: &SpeechConfig, timeout: Duration) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| Error::Config("speech API key required".to_string()))?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            token_url: config.token_url.clone(),
            tts_url: config.tts_url.clone(),
            stt_url: config.stt_url.clone(),
            timeout,
            token: RwLock::new(None),
        })
    }

    /// Current access token, issuing a new one when missing or near expiry
    async fn access_token(&self) -> Result<String> {
        {
            let cached = self.token.read().await;
            if let Some(t) = cached.as_ref().filter(|t| t.expires > Instant::now()) {
                return Ok(t.token.clone());
            }
        }

        let mut cached = self.token.write().await;
        if let Some(t) = cached.as_ref().filter(|t| t.expires > Instant::now()) {
            return Ok(t.token.clone());
        }

        let token = self.issue_token().await?;
        *cached = Some(CachedToken {
            token: token.clone(),
            expires: Instant::now() + TOKEN_TTL - TOKEN_MARGIN,
        });
        Ok(token)
    }

    async fn invalidate_token(&self) {
        *self.token.write().await = None;
    }

    async fn issue_token(&self) -> Result<String> {
        let response = self
            .client
            .post(&self.token_url)
            .header("Ocp-Apim-Subscription-Key", self.api_key.expose_secret())
            .header(reqwest::header::CONTENT_LENGTH, 0)
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "speech token request failed");
            return Err(Error::Stt(format!("token request failed: {status}")));
        }

        tracing::debug!("issued speech access token");
        Ok(response.text().await?)
    }
}

#[async_trait]
impl SpeechService for AzureSpeech {
    async fn recognize(&self, wav: &[u8]) -> Result<Option<String>> {
        let token = self.access_token().await?;
        let request_id = uuid::Uuid::new_v4().to_string();

        let response = self
            .client
            .post(&self.stt_url)
            .query(&[
                ("scenarios", "ulm"),
                ("appid", STT_APP_ID),
                ("locale", "en-US"),
                ("device.os", "wp7"),
                ("version", "3.0"),
                ("format", "json"),
                ("requestid", request_id.as_str()),
                ("instanceid", STT_INSTANCE_ID),
            ])
            .bearer_auth(&token)
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("audio/wav; samplerate={STT_SAMPLE_RATE}; sourcerate={STT_SAMPLE_RATE}"),
            )
            .body(wav.to_vec())
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "speech recognition failed");
            if status == reqwest::StatusCode::UNAUTHORIZED {
                self.invalidate_token().await;
            }
            return Err(Error::Stt(format!("recognition failed: {status}")));
        }

        let body = response.text().await?;
        let text = recognized_text(&body)?;
        tracing::debug!(text = ?text, bytes = wav.len(), "recognized utterance");
        Ok(text)
    }

    async fn synthesize(&self, text: &str, voice: VoiceGender) -> Result<Vec<u8>> {
        let token = self.access_token().await?;

        let response = self
            .client
            .post(&self.tts_url)
            .bearer_auth(&token)
            .header(reqwest::header::CONTENT_TYPE, "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", TTS_OUTPUT_FORMAT)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .body(voice.ssml(text))
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if status == reqwest::StatusCode::UNAUTHORIZED {
                self.invalidate_token().await;
            }
            return Err(Error::Tts(format!("synthesis failed {status}: {body}")));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }
}
