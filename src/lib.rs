//! Chat Robot Gateway - audio streaming and behavior dispatch for a toy robot
//!
//! The device streams raw captured audio over a persistent TCP socket. The
//! gateway segments it into utterances, recognizes and classifies each one,
//! runs exactly one behavior in response, and streams synthesized speech back
//! over the same socket at a rate the device can consume.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  raw PCM   ┌────────────────────────┐  Utterance  ┌─────────────┐
//! │    Device    │ ─────────▶ │ DeviceConnectionManager │ ──────────▶ │  ChatRobot  │
//! │ (TCP socket) │ ◀───────── │  + AudioCaptureSession  │             │ STT → intent│
//! └──────┬───────┘  u8 PCM    └────────────────────────┘             └──────┬──────┘
//!        │                          ▲                                       │
//!        │ cloud functions          │ AudioOutputPipeline                   ▼
//!        └──────────────────────────┴──────────────────────── BehaviorDispatcher
//! ```

pub mod audio;
pub mod behavior;
pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod intent;
pub mod robot;
pub mod speech;

pub use audio::{AudioCaptureSession, AudioOutputPipeline, AudioSource, Utterance};
pub use behavior::{
    Behavior, BehaviorContext, BehaviorDispatcher, BehaviorRegistry, DispatchOutcome,
    RobotActions,
};
pub use config::Config;
pub use device::{DeviceConnectionManager, StreamingSession, ToneSpec};
pub use error::{Error, Result};
pub use events::{EventBus, RobotEvent};
pub use intent::{Entity, Intent, IntentClassifier};
pub use robot::ChatRobot;
pub use speech::{SpeechService, VoiceGender};
