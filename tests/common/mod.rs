//! Shared test utilities

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use secrecy::SecretString;
use tokio::sync::Mutex;

use chatrobot_gateway::audio::AudioSource;
use chatrobot_gateway::config::{CaptureConfig, DeviceConfig, ServerConfig};
use chatrobot_gateway::device::{DeviceCloud, DeviceRemote, DeviceStatus};
use chatrobot_gateway::{
    DeviceConnectionManager, Error, EventBus, Intent, IntentClassifier, RobotActions, RobotEvent,
    ToneSpec,
};

/// Classifier answering from a fixed table
#[derive(Default)]
pub struct MockClassifier {
    intents: HashMap<String, Intent>,
    fail: bool,
    calls: AtomicUsize,
}

impl MockClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifier whose every call fails
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn with(mut self, text: &str, intent: Intent) -> Self {
        self.intents.insert(text.to_string(), intent);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IntentClassifier for MockClassifier {
    async fn classify(&self, text: &str) -> chatrobot_gateway::Result<Intent> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Classification("service unavailable".to_string()));
        }
        Ok(self
            .intents
            .get(text)
            .cloned()
            .unwrap_or_else(|| Intent::new("None", 0.1)))
    }
}

/// One recorded robot action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Speak(String),
    Play,
    Tone(String),
    Drive(u32),
    Eyes(u32, u32),
    Shutdown,
}

/// Actions that record every call instead of touching a device
#[derive(Default)]
pub struct RecordingActions {
    actions: Mutex<Vec<Action>>,
    fail_speech: bool,
}

impl RecordingActions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Actions whose speech always fails
    pub fn failing_speech() -> Self {
        Self {
            fail_speech: true,
            ..Self::default()
        }
    }

    pub async fn actions(&self) -> Vec<Action> {
        self.actions.lock().await.clone()
    }

    pub async fn spoken(&self) -> Vec<String> {
        self.actions
            .lock()
            .await
            .iter()
            .filter_map(|a| match a {
                Action::Speak(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn clear(&self) {
        self.actions.lock().await.clear();
    }

    async fn record(&self, action: Action) {
        self.actions.lock().await.push(action);
    }
}

#[async_trait]
impl RobotActions for RecordingActions {
    async fn speak(&self, text: &str) -> chatrobot_gateway::Result<()> {
        if self.fail_speech {
            return Err(Error::Tts("synthesis failed".to_string()));
        }
        self.record(Action::Speak(text.to_string())).await;
        Ok(())
    }

    async fn play(&self, _source: AudioSource) -> chatrobot_gateway::Result<()> {
        self.record(Action::Play).await;
        Ok(())
    }

    async fn play_tone(&self, tone: &ToneSpec) -> chatrobot_gateway::Result<()> {
        self.record(Action::Tone(tone.to_string())).await;
        Ok(())
    }

    async fn drive(&self, seconds: u32) -> chatrobot_gateway::Result<()> {
        self.record(Action::Drive(seconds)).await;
        Ok(())
    }

    async fn eyes_spin(&self, seconds: u32, speed: u32) -> chatrobot_gateway::Result<()> {
        self.record(Action::Eyes(seconds, speed)).await;
        Ok(())
    }

    async fn shutdown(&self) -> chatrobot_gateway::Result<()> {
        self.record(Action::Shutdown).await;
        Ok(())
    }
}

/// Device cloud that accepts everything and reports nothing
#[derive(Default)]
pub struct NullCloud;

#[async_trait]
impl DeviceCloud for NullCloud {
    async fn login(
        &self,
        _username: &str,
        _password: &SecretString,
    ) -> chatrobot_gateway::Result<String> {
        Ok("token".to_string())
    }

    async fn subscribe_status(
        &self,
        _device_id: &str,
        _token: &str,
    ) -> chatrobot_gateway::Result<BoxStream<'static, chatrobot_gateway::Result<DeviceStatus>>>
    {
        Ok(futures::stream::empty().boxed())
    }

    async fn call_function(
        &self,
        _device_id: &str,
        _token: &str,
        _name: &str,
        _argument: &str,
    ) -> chatrobot_gateway::Result<i64> {
        Ok(0)
    }
}

/// Connection manager without cloud credentials, serving on an ephemeral port
pub fn local_manager(capture: CaptureConfig, events: EventBus) -> DeviceConnectionManager {
    let device = DeviceConfig {
        device_id: String::new(),
        username: String::new(),
        password: SecretString::from(""),
        cloud_url: String::new(),
    };
    let server = ServerConfig {
        port: 0,
        host: Some("127.0.0.1".to_string()),
    };
    let remote = DeviceRemote::new(Arc::new(NullCloud), "", events.clone());
    DeviceConnectionManager::new(server, device, capture, remote, events)
}

/// Wait for the next event matching `pred`, failing after two seconds
pub async fn next_event<F>(
    rx: &mut tokio::sync::broadcast::Receiver<RobotEvent>,
    pred: F,
) -> RobotEvent
where
    F: Fn(&RobotEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let event = rx.recv().await.expect("event bus closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}
