//! Utterance capture from the device stream
//!
//! The device sends raw 8-bit PCM with no framing. An utterance ends when the
//! first byte of the trailing `end_packet_size` window of a chunk is zero.
//! That marker is embedded by the device firmware; a genuine zero sample at
//! that offset also ends the recording.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use super::wav::{self, HEADER_LEN, WavFormat};
use crate::config::CaptureConfig;
use crate::{Error, Result};

/// State of the capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Waiting for the first chunk of an utterance
    Idle,
    /// Appending chunks to the open container
    Recording,
}

/// Destination for the container being recorded
pub trait RecordingSink: Send {
    /// Start a fresh container, discarding any previous contents
    ///
    /// # Errors
    ///
    /// Returns error if the sink cannot be opened
    fn open(&mut self) -> io::Result<()>;

    /// Append bytes to the open container
    ///
    /// # Errors
    ///
    /// Returns error if the write fails
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Close the container and return its full contents
    ///
    /// # Errors
    ///
    /// Returns error if the container cannot be flushed or read back
    fn finish(&mut self) -> io::Result<Vec<u8>>;
}

/// In-memory recording sink
#[derive(Debug, Default)]
pub struct MemorySink {
    buffer: Vec<u8>,
}

impl RecordingSink for MemorySink {
    fn open(&mut self) -> io::Result<()> {
        self.buffer.clear();
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    fn finish(&mut self) -> io::Result<Vec<u8>> {
        Ok(std::mem::take(&mut self.buffer))
    }
}

/// File-backed recording sink
///
/// Overwrites the same file for every utterance and reads it back on finish.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl FileSink {
    /// Create a sink writing to `path`
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path, writer: None }
    }
}

impl RecordingSink for FileSink {
    fn open(&mut self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        self.writer = Some(BufWriter::new(File::create(&self.path)?));
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer
            .as_mut()
            .ok_or_else(|| io::Error::other("recording file not open"))?
            .write_all(bytes)
    }

    fn finish(&mut self) -> io::Result<Vec<u8>> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        std::fs::read(&self.path)
    }
}

/// A completed recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    container: Vec<u8>,
    elapsed: Duration,
}

impl Utterance {
    /// Wrap a finished container
    #[must_use]
    pub const fn new(container: Vec<u8>, elapsed: Duration) -> Self {
        Self { container, elapsed }
    }

    /// Full container, header included
    #[must_use]
    pub fn container(&self) -> &[u8] {
        &self.container
    }

    /// Audio bytes following the header
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.container[HEADER_LEN.min(self.container.len())..]
    }

    /// Time between the first and the terminal chunk
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Take ownership of the container bytes
    #[must_use]
    pub fn into_container(self) -> Vec<u8> {
        self.container
    }
}

/// Check whether a chunk carries the end-of-utterance marker
///
/// Inspects the first byte of the trailing `end_packet_size` window. Chunks
/// shorter than the window are inspected from their first byte; an empty
/// chunk is never terminal.
#[must_use]
pub fn is_terminal(chunk: &[u8], end_packet_size: usize) -> bool {
    let start = chunk.len().saturating_sub(end_packet_size);
    chunk.get(start).is_some_and(|&b| b == 0)
}

/// Segments a device byte stream into utterances
pub struct AudioCaptureSession {
    format: WavFormat,
    nominal_samples: u32,
    end_packet_size: usize,
    state: CaptureState,
    sink: Box<dyn RecordingSink>,
    started: Option<Instant>,
    chunks: usize,
}

impl std::fmt::Debug for AudioCaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioCaptureSession")
            .field("format", &self.format)
            .field("end_packet_size", &self.end_packet_size)
            .field("state", &self.state)
            .field("chunks", &self.chunks)
            .finish_non_exhaustive()
    }
}

impl AudioCaptureSession {
    /// Create a capture session recording into memory
    #[must_use]
    pub fn new(config: &CaptureConfig) -> Self {
        Self::with_sink(config, Box::new(MemorySink::default()))
    }

    /// Create a capture session from config, mirroring to the recording file if set
    #[must_use]
    pub fn from_config(config: &CaptureConfig) -> Self {
        match &config.recording_path {
            Some(path) => Self::with_sink(config, Box::new(FileSink::new(path.clone()))),
            None => Self::new(config),
        }
    }

    /// Create a capture session with an explicit sink
    #[must_use]
    pub fn with_sink(config: &CaptureConfig, sink: Box<dyn RecordingSink>) -> Self {
        Self {
            format: WavFormat {
                sample_rate: config.sample_rate,
                bits_per_sample: config.bits_per_sample,
                channels: config.channels,
            },
            nominal_samples: config.nominal_samples,
            end_packet_size: config.end_packet_size.max(1),
            state: CaptureState::Idle,
            sink,
            started: None,
            chunks: 0,
        }
    }

    /// Feed one chunk as received from the socket
    ///
    /// Returns the completed utterance when `chunk` is terminal. The terminal
    /// chunk itself is part of the payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Recording`] if the sink fails. The state is left
    /// unchanged, except that a failed finish discards the recording.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Result<Option<Utterance>> {
        if chunk.is_empty() {
            return Ok(None);
        }

        if self.state == CaptureState::Idle {
            self.begin()?;
        }

        self.sink
            .write(chunk)
            .map_err(|e| Error::Recording(format!("failed to append chunk: {e}")))?;
        self.chunks += 1;
        tracing::trace!(bytes = chunk.len(), chunks = self.chunks, "chunk recorded");

        if !is_terminal(chunk, self.end_packet_size) {
            return Ok(None);
        }

        let elapsed = self.recording_elapsed().unwrap_or_default();
        let chunks = self.chunks;
        let finished = self.sink.finish();
        self.clear();

        let container =
            finished.map_err(|e| Error::Recording(format!("failed to finalize recording: {e}")))?;

        tracing::info!(
            seconds = elapsed.as_secs_f64(),
            chunks,
            bytes = container.len().saturating_sub(HEADER_LEN),
            "utterance captured"
        );

        Ok(Some(Utterance::new(container, elapsed)))
    }

    /// Open the sink and write the header
    fn begin(&mut self) -> Result<()> {
        let header = wav::encode_header(&self.format, self.nominal_samples);

        self.sink
            .open()
            .and_then(|()| self.sink.write(&header))
            .map_err(|e| Error::Recording(format!("failed to open recording: {e}")))?;

        self.state = CaptureState::Recording;
        self.started = Some(Instant::now());
        self.chunks = 0;
        tracing::info!("listening");
        Ok(())
    }

    fn clear(&mut self) {
        self.state = CaptureState::Idle;
        self.started = None;
        self.chunks = 0;
    }

    /// Discard any in-flight recording
    pub fn reset(&mut self) {
        if self.state == CaptureState::Recording {
            tracing::debug!(chunks = self.chunks, "discarding in-flight recording");
            let _ = self.sink.finish();
        }
        self.clear();
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> CaptureState {
        self.state
    }

    /// Check if an utterance is being recorded
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.state == CaptureState::Recording
    }

    /// Time since the current recording started
    #[must_use]
    pub fn recording_elapsed(&self) -> Option<Duration> {
        self.started.map(|t| t.elapsed())
    }

    /// Configured end-of-utterance window
    #[must_use]
    pub const fn end_packet_size(&self) -> usize {
        self.end_packet_size
    }
}
