//! Audio capture, framing and playback
//!
//! - `wav`: capture header framing and WAV source decoding
//! - `capture`: utterance segmentation of the inbound stream
//! - `convert`: 16-bit to 8-bit PCM conversion
//! - `throttle`: byte-rate limiting
//! - `output`: the two-stage playback pipeline

pub mod capture;
pub mod convert;
pub mod output;
pub mod throttle;
pub mod wav;

pub use capture::{AudioCaptureSession, CaptureState, FileSink, MemorySink, RecordingSink, Utterance};
pub use convert::Pcm16ToU8;
pub use output::{AudioOutputPipeline, AudioSource, PlaybackReport};
pub use throttle::Throttle;
pub use wav::{HEADER_LEN, WavFormat, WavHeader};
