//! Chat robot orchestrator
//!
//! Wires the connection manager, speech, classifier and dispatcher together
//! and runs the per-utterance pipeline: recognize, then dispatch.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::audio::{AudioOutputPipeline, AudioSource, Utterance};
use crate::behavior::{BehaviorDispatcher, BehaviorRegistry, DispatchOutcome, RobotActions};
use crate::config::Config;
use crate::device::{DeviceCloud, DeviceConnectionManager, DeviceRemote, StreamingSession, ToneSpec};
use crate::events::EventBus;
use crate::intent::IntentClassifier;
use crate::speech::{SpeechService, VoiceGender};
use crate::{Error, Result};

/// Completed utterances waiting for recognition
const UTTERANCE_QUEUE: usize = 8;

/// [`RobotActions`] backed by the live device
pub struct DeviceActions {
    manager: DeviceConnectionManager,
    pipeline: AudioOutputPipeline,
    speech: Arc<dyn SpeechService>,
    voice: VoiceGender,
}

impl std::fmt::Debug for DeviceActions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceActions")
            .field("voice", &self.voice)
            .finish_non_exhaustive()
    }
}

impl DeviceActions {
    /// Create actions over a manager, pipeline and speech service
    #[must_use]
    pub fn new(
        manager: DeviceConnectionManager,
        pipeline: AudioOutputPipeline,
        speech: Arc<dyn SpeechService>,
        voice: VoiceGender,
    ) -> Self {
        Self {
            manager,
            pipeline,
            speech,
            voice,
        }
    }

    fn session(&self) -> Result<Arc<StreamingSession>> {
        self.manager.current_session().ok_or(Error::NotConnected)
    }
}

#[async_trait]
impl RobotActions for DeviceActions {
    async fn speak(&self, text: &str) -> Result<()> {
        // Skip synthesis when there is nowhere to play it
        let session = self.session()?;
        tracing::info!(text, "speaking");
        let pcm = self.speech.synthesize(text, self.voice).await?;
        self.pipeline
            .stream_out(&session, AudioSource::Pcm16(pcm))
            .await
            .map(|_| ())
    }

    async fn play(&self, source: AudioSource) -> Result<()> {
        let session = self.session()?;
        self.pipeline.stream_out(&session, source).await.map(|_| ())
    }

    async fn play_tone(&self, tone: &ToneSpec) -> Result<()> {
        self.manager.remote().play_tone(tone).await;
        Ok(())
    }

    async fn drive(&self, seconds: u32) -> Result<()> {
        self.manager.remote().drive(seconds).await;
        Ok(())
    }

    async fn eyes_spin(&self, seconds: u32, speed: u32) -> Result<()> {
        self.manager.remote().eyes_spin(seconds, speed).await;
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.manager.remote().shutdown().await;
        Ok(())
    }
}

/// The chat robot service
pub struct ChatRobot {
    manager: DeviceConnectionManager,
    speech: Arc<dyn SpeechService>,
    dispatcher: BehaviorDispatcher,
    events: EventBus,
}

impl std::fmt::Debug for ChatRobot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatRobot")
            .field("manager", &self.manager)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl ChatRobot {
    /// Assemble the robot from configuration and its external services
    #[must_use]
    pub fn new(
        config: &Config,
        cloud: Arc<dyn DeviceCloud>,
        speech: Arc<dyn SpeechService>,
        classifier: Arc<dyn IntentClassifier>,
        registry: BehaviorRegistry,
        events: EventBus,
    ) -> Self {
        let remote = DeviceRemote::new(cloud, config.device.device_id.clone(), events.clone());
        let manager = DeviceConnectionManager::new(
            config.server.clone(),
            config.device.clone(),
            config.capture.clone(),
            remote,
            events.clone(),
        );
        let pipeline = AudioOutputPipeline::new(config.output.clone(), events.clone());
        let actions = Arc::new(DeviceActions::new(
            manager.clone(),
            pipeline,
            Arc::clone(&speech),
            config.speech.voice,
        ));
        let dispatcher = BehaviorDispatcher::new(registry, classifier, actions, events.clone());

        Self {
            manager,
            speech,
            dispatcher,
            events,
        }
    }

    /// Event bus shared by every component
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// Connection manager
    #[must_use]
    pub const fn manager(&self) -> &DeviceConnectionManager {
        &self.manager
    }

    /// Serve the device until `shutdown` resolves
    ///
    /// # Errors
    ///
    /// Returns error if the listener is unusable
    pub async fn run<F>(mut self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let addr = listener.local_addr()?;
        let (tx, mut rx) = mpsc::channel(UTTERANCE_QUEUE);
        let server = self.manager.serve(listener, tx);
        let watcher = self.manager.connect_cloud().await;

        tracing::info!(
            %addr,
            tokens = self.dispatcher.registry().tokens().len(),
            "chat robot running"
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                Some(utterance) = rx.recv() => {
                    self.process_utterance(utterance).await;
                }
            }
        }

        tracing::info!("chat robot stopping");
        server.abort();
        if let Some(watcher) = watcher {
            watcher.abort();
        }
        if let Some(session) = self.manager.current_session() {
            session.mark_disconnected();
        }
        Ok(())
    }

    /// Recognize one utterance and dispatch the result
    pub async fn process_utterance(&mut self, utterance: Utterance) -> DispatchOutcome {
        tracing::info!(
            bytes = utterance.payload().len(),
            elapsed_ms = u64::try_from(utterance.elapsed().as_millis()).unwrap_or(u64::MAX),
            "processing utterance"
        );

        let text = match self.speech.recognize(utterance.container()).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "speech recognition failed");
                self.events.report(&Error::Recognition(e.to_string()));
                None
            }
        };

        if let Some(text) = &text {
            self.events.info(format!("recognized: {text}"));
        }

        self.dispatcher.dispatch(text.as_deref()).await
    }
}
