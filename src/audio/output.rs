//! Throttled, format-converted playback to the device socket
//!
//! Playback runs in two stages joined by a bounded channel. The convert stage
//! turns 16-bit PCM into the device's 8-bit format and cuts it into
//! fixed-size chunks; the write stage releases chunks at the configured byte
//! rate onto the session writer. The socket is never closed by playback.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use super::convert::Pcm16ToU8;
use super::throttle::Throttle;
use super::wav;
use crate::config::OutputConfig;
use crate::device::StreamingSession;
use crate::events::{ErrorKind, EventBus};
use crate::{Error, Result};

/// Input block size for the convert stage
const CONVERT_BLOCK: usize = 4096;

/// Audio to play on the device
#[derive(Debug, Clone)]
pub enum AudioSource {
    /// Raw 16-bit signed little-endian mono PCM
    Pcm16(Vec<u8>),
    /// A WAV file held in memory
    Wav(Vec<u8>),
    /// A WAV file on disk
    WavFile(PathBuf),
}

impl AudioSource {
    /// Resolve the source to raw 16-bit PCM
    ///
    /// # Errors
    ///
    /// Returns error if a WAV source cannot be read or decoded
    pub async fn into_pcm16(self) -> Result<Vec<u8>> {
        match self {
            Self::Pcm16(pcm) => Ok(pcm),
            Self::Wav(bytes) => wav::decode_pcm16(&bytes).map(|(_, pcm)| pcm),
            Self::WavFile(path) => {
                let bytes = tokio::fs::read(&path).await.map_err(|e| {
                    Error::Audio(format!("failed to read {}: {e}", path.display()))
                })?;
                wav::decode_pcm16(&bytes).map(|(_, pcm)| pcm)
            }
        }
    }
}

/// Outcome of one completed playback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackReport {
    /// 16-bit PCM bytes consumed
    pub bytes_in: usize,
    /// 8-bit bytes written to the socket
    pub bytes_out: usize,
    /// Wall time from first chunk to drain
    pub elapsed: Duration,
}

/// Streams audio to a connected device
#[derive(Debug, Clone)]
pub struct AudioOutputPipeline {
    config: OutputConfig,
    events: EventBus,
}

impl AudioOutputPipeline {
    /// Create a pipeline with the given output parameters
    #[must_use]
    pub const fn new(config: OutputConfig, events: EventBus) -> Self {
        Self { config, events }
    }

    /// Output parameters in use
    #[must_use]
    pub const fn config(&self) -> &OutputConfig {
        &self.config
    }

    /// Convert and stream `source` to the session, resolving when drained
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] without writing if the session is
    /// closed. Any stage failure is published as a pipeline error event and
    /// returned.
    pub async fn stream_out(
        &self,
        session: &StreamingSession,
        source: AudioSource,
    ) -> Result<PlaybackReport> {
        if !session.is_connected() {
            return Err(Error::NotConnected);
        }

        let result = self.run(session, source).await;
        match &result {
            Ok(report) => tracing::debug!(
                session = session.id(),
                bytes_in = report.bytes_in,
                bytes_out = report.bytes_out,
                elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
                "playback drained"
            ),
            Err(e) => self.events.error(ErrorKind::Pipeline, e.to_string()),
        }
        result
    }

    async fn run(&self, session: &StreamingSession, source: AudioSource) -> Result<PlaybackReport> {
        let throttle = Throttle::new(self.config.bytes_per_second, self.config.chunk_size)?;
        let pcm = source.into_pcm16().await?;
        let bytes_in = pcm.len();

        let (tx, rx) = mpsc::channel(self.config.queue_depth.max(1));
        let convert = tokio::spawn(convert_stage(pcm, throttle.chunk_size(), tx));

        let written = self.write_stage(session, &throttle, rx).await;
        let converted = convert
            .await
            .map_err(|e| Error::Audio(format!("convert stage failed: {e}")))?;

        let (bytes_out, elapsed) = written?;
        if bytes_out != converted {
            return Err(Error::Audio(format!(
                "wrote {bytes_out} of {converted} converted bytes"
            )));
        }

        Ok(PlaybackReport {
            bytes_in,
            bytes_out,
            elapsed,
        })
    }

    async fn write_stage(
        &self,
        session: &StreamingSession,
        throttle: &Throttle,
        rx: mpsc::Receiver<Vec<u8>>,
    ) -> Result<(usize, Duration)> {
        let mut writer = session.lock_writer().await?;
        let mut chunks = ReceiverStream::new(rx);
        let start = Instant::now();
        let mut written = 0;

        while let Some(chunk) = chunks.next().await {
            if !session.is_connected() {
                return Err(Error::NotConnected);
            }
            throttle.acquire(chunk.len()).await?;
            session.write_locked(&mut writer, &chunk).await?;
            written += chunk.len();
        }

        Ok((written, start.elapsed()))
    }
}

/// Convert PCM to device format and emit `chunk_size` pieces
///
/// Returns the number of bytes produced. Stops early if the write stage has
/// gone away.
async fn convert_stage(pcm: Vec<u8>, chunk_size: usize, tx: mpsc::Sender<Vec<u8>>) -> usize {
    let mut converter = Pcm16ToU8::new();
    let mut pending = Vec::with_capacity(chunk_size * 2);
    let mut produced = 0;

    for block in pcm.chunks(CONVERT_BLOCK) {
        pending.extend(converter.convert(block));

        while pending.len() >= chunk_size {
            let rest = pending.split_off(chunk_size);
            let chunk = std::mem::replace(&mut pending, rest);
            produced += chunk.len();
            if tx.send(chunk).await.is_err() {
                return produced;
            }
        }
    }

    if converter.has_pending() {
        tracing::debug!("dropping trailing half sample");
    }

    if !pending.is_empty() {
        produced += pending.len();
        let _ = tx.send(pending).await;
    }

    produced
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::audio::convert::sample_to_u8;

    fn fast_config() -> OutputConfig {
        OutputConfig {
            bytes_per_second: 1_000_000,
            chunk_size: 16,
            queue_depth: 4,
        }
    }

    fn ramp(samples: usize) -> (Vec<u8>, Vec<u8>) {
        let values: Vec<i16> = (0..samples)
            .map(|i| i16::try_from(i).unwrap().wrapping_mul(97).wrapping_sub(16_000))
            .collect();
        let pcm = values.iter().flat_map(|s| s.to_le_bytes()).collect();
        let expected = values.iter().map(|&s| sample_to_u8(s)).collect();
        (pcm, expected)
    }

    #[tokio::test]
    async fn writes_exactly_the_converted_bytes() {
        let (pcm, expected) = ramp(1_000);
        let mock = tokio_test::io::Builder::new()
            .write(&expected)
            .write(b"after")
            .build();
        let session = StreamingSession::new(1, None, mock);
        let pipeline = AudioOutputPipeline::new(fast_config(), EventBus::new());

        let report = pipeline
            .stream_out(&session, AudioSource::Pcm16(pcm))
            .await
            .unwrap();

        assert_eq!(report.bytes_in, 2_000);
        assert_eq!(report.bytes_out, 1_000);

        // Socket stays open for further writes
        assert!(session.is_connected());
        let mut writer = session.lock_writer().await.unwrap();
        session.write_locked(&mut writer, b"after").await.unwrap();
    }

    #[tokio::test]
    async fn disconnected_session_is_refused() {
        let session = StreamingSession::new(2, None, tokio_test::io::Builder::new().build());
        session.mark_disconnected();
        let pipeline = AudioOutputPipeline::new(fast_config(), EventBus::new());

        let err = pipeline
            .stream_out(&session, AudioSource::Pcm16(vec![0; 64]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }

    #[tokio::test]
    async fn write_failure_publishes_pipeline_error() {
        let mock = tokio_test::io::Builder::new()
            .write_error(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let session = StreamingSession::new(3, None, mock);
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let pipeline = AudioOutputPipeline::new(fast_config(), events);

        let err = pipeline
            .stream_out(&session, AudioSource::Pcm16(vec![0; 256]))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Connection(_)));
        assert!(!session.is_connected());
        assert_eq!(rx.recv().await.unwrap().error_kind(), Some(ErrorKind::Pipeline));
    }

    #[tokio::test]
    async fn wav_source_is_decoded() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for s in [i16::MIN, 0, i16::MAX] {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }

        let mock = tokio_test::io::Builder::new().write(&[0, 128, 255]).build();
        let session = StreamingSession::new(4, None, mock);
        let pipeline = AudioOutputPipeline::new(fast_config(), EventBus::new());

        let report = pipeline
            .stream_out(&session, AudioSource::Wav(cursor.into_inner()))
            .await
            .unwrap();
        assert_eq!(report.bytes_out, 3);
    }

    #[tokio::test]
    async fn missing_wav_file_fails() {
        let session = StreamingSession::new(5, None, tokio_test::io::Builder::new().build());
        let pipeline = AudioOutputPipeline::new(fast_config(), EventBus::new());

        let err = pipeline
            .stream_out(
                &session,
                AudioSource::WavFile(PathBuf::from("/nonexistent/song.wav")),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Audio(_)));
        assert!(session.is_connected());
    }
}
