//! Behavior registration and dispatch
//!
//! A behavior is the robot's response to one utterance. Behaviors are grouped
//! by intent token; the dispatcher picks exactly one per utterance and runs it
//! against a [`RobotActions`] implementation.

pub mod builtin;
pub mod dispatcher;
pub mod group;
pub mod phrases;
pub mod registry;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;

use crate::Result;
use crate::audio::AudioSource;
use crate::device::ToneSpec;
use crate::intent::Entity;

pub use dispatcher::{BehaviorDispatcher, DispatchOutcome};
pub use group::BehaviorGroup;
pub use phrases::PhraseFile;
pub use registry::BehaviorRegistry;

/// Side effects available to behaviors
#[async_trait]
pub trait RobotActions: Send + Sync {
    /// Synthesize and play text
    async fn speak(&self, text: &str) -> Result<()>;

    /// Play an audio source
    async fn play(&self, source: AudioSource) -> Result<()>;

    /// Play a tone sequence on the buzzer
    async fn play_tone(&self, tone: &ToneSpec) -> Result<()>;

    /// Drive forward for `seconds`
    async fn drive(&self, seconds: u32) -> Result<()>;

    /// Spin the eyes for `seconds` at `speed`
    async fn eyes_spin(&self, seconds: u32, speed: u32) -> Result<()>;

    /// Power the device down
    async fn shutdown(&self) -> Result<()>;
}

/// Handle passed to a running behavior
#[derive(Clone)]
pub struct BehaviorContext {
    actions: Arc<dyn RobotActions>,
    token: Option<String>,
}

impl std::fmt::Debug for BehaviorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BehaviorContext")
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

impl BehaviorContext {
    /// Create a context over a set of robot actions
    #[must_use]
    pub fn new(actions: Arc<dyn RobotActions>, token: Option<String>) -> Self {
        Self { actions, token }
    }

    /// Intent token that selected this behavior, if any
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Underlying robot actions
    #[must_use]
    pub fn actions(&self) -> &dyn RobotActions {
        self.actions.as_ref()
    }

    /// Synthesize and play text
    ///
    /// # Errors
    ///
    /// Returns error if synthesis or playback fails
    pub async fn speak(&self, text: &str) -> Result<()> {
        self.actions.speak(text).await
    }

    /// Play an audio source
    ///
    /// # Errors
    ///
    /// Returns error if playback fails
    pub async fn play(&self, source: AudioSource) -> Result<()> {
        self.actions.play(source).await
    }

    /// Play a tone sequence
    ///
    /// # Errors
    ///
    /// Returns error if the command cannot be issued
    pub async fn play_tone(&self, tone: &ToneSpec) -> Result<()> {
        self.actions.play_tone(tone).await
    }

    /// Drive forward
    ///
    /// # Errors
    ///
    /// Returns error if the command cannot be issued
    pub async fn drive(&self, seconds: u32) -> Result<()> {
        self.actions.drive(seconds).await
    }

    /// Spin the eyes
    ///
    /// # Errors
    ///
    /// Returns error if the command cannot be issued
    pub async fn eyes_spin(&self, seconds: u32, speed: u32) -> Result<()> {
        self.actions.eyes_spin(seconds, speed).await
    }

    /// Power the device down
    ///
    /// # Errors
    ///
    /// Returns error if the command cannot be issued
    pub async fn shutdown(&self) -> Result<()> {
        self.actions.shutdown().await
    }
}

/// A registered response
#[async_trait]
pub trait Behavior: Send + Sync {
    /// Run the behavior with the classified entities
    async fn run(&self, ctx: BehaviorContext, entities: Vec<Entity>) -> Result<()>;

    /// Short label for logs
    fn describe(&self) -> String;
}

/// Speaks a fixed reply
#[derive(Debug, Clone)]
pub struct ReplyBehavior {
    text: String,
}

impl ReplyBehavior {
    /// Create a reply
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Reply text
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }
}

#[async_trait]
impl Behavior for ReplyBehavior {
    async fn run(&self, ctx: BehaviorContext, _entities: Vec<Entity>) -> Result<()> {
        tracing::info!(reply = %self.text, "speaking reply");
        ctx.speak(&self.text).await
    }

    fn describe(&self) -> String {
        format!("reply {:?}", self.text)
    }
}

type Handler = dyn Fn(BehaviorContext, Vec<Entity>) -> BoxFuture<'static, Result<()>> + Send + Sync;

/// Runs an async closure
#[derive(Clone)]
pub struct CustomBehavior {
    name: String,
    handler: Arc<Handler>,
}

impl std::fmt::Debug for CustomBehavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomBehavior")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl CustomBehavior {
    /// Wrap an async handler
    pub fn new<F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(BehaviorContext, Vec<Entity>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            handler: Arc::new(move |ctx, entities| handler(ctx, entities).boxed()),
        }
    }
}

#[async_trait]
impl Behavior for CustomBehavior {
    async fn run(&self, ctx: BehaviorContext, entities: Vec<Entity>) -> Result<()> {
        (self.handler)(ctx, entities).await
    }

    fn describe(&self) -> String {
        format!("custom {}", self.name)
    }
}

/// Powers the device down, optionally saying goodbye first
#[derive(Debug, Clone, Default)]
pub struct ShutdownBehavior {
    farewell: Option<String>,
}

impl ShutdownBehavior {
    /// Shut down silently
    #[must_use]
    pub const fn new() -> Self {
        Self { farewell: None }
    }

    /// Speak `text` before shutting down
    #[must_use]
    pub fn with_farewell(text: impl Into<String>) -> Self {
        Self {
            farewell: Some(text.into()),
        }
    }
}

#[async_trait]
impl Behavior for ShutdownBehavior {
    async fn run(&self, ctx: BehaviorContext, _entities: Vec<Entity>) -> Result<()> {
        if let Some(farewell) = &self.farewell {
            // Goodbye is best effort; the shutdown command still goes out
            if let Err(e) = ctx.speak(farewell).await {
                tracing::warn!(error = %e, "farewell failed");
            }
        }
        tracing::info!("shutting down device");
        ctx.shutdown().await
    }

    fn describe(&self) -> String {
        "shutdown".to_string()
    }
}
