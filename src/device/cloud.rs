//! Device cloud client (Particle-compatible REST API)

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::{Error, Result};

/// Event name carrying device connectivity
pub const STATUS_EVENT: &str = "spark/status";

/// Connectivity reported by the device cloud
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    /// Device connected to the cloud
    Online,
    /// Device dropped off the cloud
    Offline,
}

impl DeviceStatus {
    /// Parse the `data` field of a status event
    #[must_use]
    pub fn from_event_data(data: &str) -> Option<Self> {
        match data.trim() {
            "online" => Some(Self::Online),
            "offline" => Some(Self::Offline),
            _ => None,
        }
    }
}

/// Device cloud operations
#[async_trait]
pub trait DeviceCloud: Send + Sync {
    /// Exchange account credentials for a bearer token
    async fn login(&self, username: &str, password: &SecretString) -> Result<String>;

    /// Open a stream of connectivity changes for a device
    async fn subscribe_status(
        &self,
        device_id: &str,
        token: &str,
    ) -> Result<BoxStream<'static, Result<DeviceStatus>>>;

    /// Invoke a named function on the device, returning its integer result
    async fn call_function(
        &self,
        device_id: &str,
        token: &str,
        name: &str,
        argument: &str,
    ) -> Result<i64>;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct FunctionResponse {
    #[serde(default)]
    return_value: i64,
}

#[derive(Deserialize)]
struct EventData {
    data: String,
}

/// Particle cloud client
#[derive(Debug, Clone)]
pub struct ParticleCloud {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl ParticleCloud {
    /// Create a client against `base_url` with a per-request timeout
    #[must_use]
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl DeviceCloud for ParticleCloud {
    async fn login(&self, username: &str, password: &SecretString) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/oauth/token", self.base_url))
            .basic_auth("particle", Some("particle"))
            .form(&[
                ("grant_type", "password"),
                ("username", username),
                ("password", password.expose_secret()),
            ])
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "device cloud login failed");
            return Err(Error::DeviceCloud(format!("login failed: {status}")));
        }

        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }

    async fn subscribe_status(
        &self,
        device_id: &str,
        token: &str,
    ) -> Result<BoxStream<'static, Result<DeviceStatus>>> {
        // Long-lived stream; only the connect is bounded by the timeout
        let connect = self
            .client
            .get(format!(
                "{}/v1/devices/{device_id}/events/{}",
                self.base_url,
                urlencoding::encode(STATUS_EVENT)
            ))
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send();

        let response = tokio::time::timeout(self.timeout, connect)
            .await
            .map_err(|_| Error::DeviceCloud("event stream connect timed out".to_string()))??;

        if !response.status().is_success() {
            return Err(Error::DeviceCloud(format!(
                "event stream rejected: {}",
                response.status()
            )));
        }

        let statuses = response
            .bytes_stream()
            .scan(SseParser::default(), |parser, chunk| {
                let items: Vec<Result<DeviceStatus>> = match chunk {
                    Ok(bytes) => parser
                        .push(&bytes)
                        .into_iter()
                        .filter(|event| event.event == STATUS_EVENT)
                        .filter_map(|event| parse_status(&event.data))
                        .map(Ok)
                        .collect(),
                    Err(e) => vec![Err(Error::DeviceCloud(format!("event stream read failed: {e}")))],
                };
                std::future::ready(Some(stream::iter(items)))
            })
            .flatten();

        Ok(statuses.boxed())
    }

    async fn call_function(
        &self,
        device_id: &str,
        token: &str,
        name: &str,
        argument: &str,
    ) -> Result<i64> {
        let response = self
            .client
            .post(format!("{}/v1/devices/{device_id}/{name}", self.base_url))
            .bearer_auth(token)
            .form(&[("arg", argument)])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::RemoteCommand(format!("{name}: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(function = name, status = %status, body = %body, "device function rejected");
            return Err(Error::RemoteCommand(format!("{name}: {status}")));
        }

        let result: FunctionResponse = response
            .json()
            .await
            .map_err(|e| Error::RemoteCommand(format!("{name}: {e}")))?;
        Ok(result.return_value)
    }
}

/// Extract a device status from an event `data` payload
///
/// The payload is JSON with a `data` field; a bare string is accepted too.
fn parse_status(payload: &str) -> Option<DeviceStatus> {
    serde_json::from_str::<EventData>(payload).map_or_else(
        |_| DeviceStatus::from_event_data(payload),
        |event| DeviceStatus::from_event_data(&event.data),
    )
}

/// One server-sent event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// Event name, empty when unnamed
    pub event: String,
    /// Joined data lines
    pub data: String,
}

/// Incremental server-sent events parser
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    current: SseEvent,
}

impl SseParser {
    /// Feed raw bytes and return every event completed by them
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                let event = std::mem::take(&mut self.current);
                if !event.data.is_empty() || !event.event.is_empty() {
                    events.push(event);
                }
                continue;
            }

            // Comment line
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = line.split_once(':').unwrap_or((line, ""));
            let value = value.strip_prefix(' ').unwrap_or(value);
            match field {
                "event" => value.clone_into(&mut self.current.event),
                "data" => {
                    if !self.current.data.is_empty() {
                        self.current.data.push('\n');
                    }
                    self.current.data.push_str(value);
                }
                _ => {}
            }
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_particle_status_events() {
        let mut parser = SseParser::default();
        let events = parser.push(
            b":ok\n\nevent: spark/status\ndata: {\"data\":\"online\",\"ttl\":60,\"coreid\":\"abc\"}\n\n",
        );

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, STATUS_EVENT);
        assert_eq!(parse_status(&events[0].data), Some(DeviceStatus::Online));
    }

    #[test]
    fn events_may_span_chunks() {
        let mut parser = SseParser::default();
        assert!(parser.push(b"event: spark/sta").is_empty());
        assert!(parser.push(b"tus\r\ndata: {\"data\":\"off").is_empty());

        let events = parser.push(b"line\"}\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(parse_status(&events[0].data), Some(DeviceStatus::Offline));
    }

    #[test]
    fn multiline_data_is_joined() {
        let mut parser = SseParser::default();
        let events = parser.push(b"data: one\ndata: two\n\n");
        assert_eq!(events[0].data, "one\ntwo");
        assert!(events[0].event.is_empty());
    }

    #[test]
    fn unknown_status_is_ignored() {
        assert_eq!(parse_status("{\"data\":\"auto-update\"}"), None);
        assert_eq!(parse_status("online"), Some(DeviceStatus::Online));
    }
}
