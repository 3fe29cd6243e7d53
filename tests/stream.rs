//! Streaming socket integration tests
//!
//! Runs the connection manager on an ephemeral loopback port and plays the
//! device side with a plain TCP client.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use chatrobot_gateway::audio::{AudioSource, HEADER_LEN};
use chatrobot_gateway::config::{CaptureConfig, OutputConfig};
use chatrobot_gateway::events::Status;
use chatrobot_gateway::{AudioOutputPipeline, DeviceConnectionManager, EventBus, Utterance};

mod common;
use common::{local_manager, next_event};

const WAIT: Duration = Duration::from_secs(2);

struct Harness {
    manager: DeviceConnectionManager,
    events: EventBus,
    addr: SocketAddr,
    utterances: mpsc::Receiver<Utterance>,
    server: JoinHandle<()>,
}

impl Harness {
    async fn start(capture: CaptureConfig) -> Self {
        let events = EventBus::new();
        let manager = local_manager(capture, events.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, utterances) = mpsc::channel(4);
        let server = manager.serve(listener, tx);

        Self {
            manager,
            events,
            addr,
            utterances,
            server,
        }
    }

    /// Connect as the device and wait for the session to register
    async fn connect(&self) -> TcpStream {
        let mut rx = self.events.subscribe();
        let stream = TcpStream::connect(self.addr).await.unwrap();
        next_event(&mut rx, |e| e.as_status() == Some(Status::StreamConnected)).await;
        stream
    }

    async fn next_utterance(&mut self) -> Utterance {
        tokio::time::timeout(WAIT, self.utterances.recv())
            .await
            .expect("timed out waiting for utterance")
            .expect("utterance channel closed")
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Speech-like bytes with no zero anywhere
fn voice(len: usize) -> Vec<u8> {
    (0..len).map(|i| u8::try_from(i % 200).unwrap() + 20).collect()
}

#[tokio::test]
async fn utterance_is_segmented_from_stream() {
    let mut harness = Harness::start(CaptureConfig::default()).await;
    let mut device = harness.connect().await;

    device.write_all(&voice(600)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    device.write_all(&[0u8; 200]).await.unwrap();

    let utterance = harness.next_utterance().await;

    assert_eq!(&utterance.container()[..4], b"RIFF");
    assert_eq!(utterance.container().len(), HEADER_LEN + 800);
    assert_eq!(utterance.payload().len(), 800);
    assert_eq!(&utterance.payload()[..600], voice(600).as_slice());
}

#[tokio::test]
async fn recording_is_mirrored_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capture.wav");
    let capture = CaptureConfig {
        recording_path: Some(path.clone()),
        ..CaptureConfig::default()
    };
    let mut harness = Harness::start(capture).await;
    let mut device = harness.connect().await;

    device.write_all(&voice(300)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    device.write_all(&[0u8; 150]).await.unwrap();

    let utterance = harness.next_utterance().await;
    let on_disk = std::fs::read(&path).unwrap();

    assert_eq!(on_disk, utterance.container());
}

#[tokio::test]
async fn second_connection_is_refused() {
    let harness = Harness::start(CaptureConfig::default()).await;
    let _device = harness.connect().await;
    let first = harness.manager.current_session().unwrap();

    let mut intruder = TcpStream::connect(harness.addr).await.unwrap();
    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(WAIT, intruder.read(&mut buf))
        .await
        .expect("refused connection should be closed");
    assert!(matches!(read, Ok(0) | Err(_)));

    let current = harness.manager.current_session().unwrap();
    assert_eq!(current.id(), first.id());
}

#[tokio::test]
async fn disconnect_frees_the_slot() {
    let harness = Harness::start(CaptureConfig::default()).await;
    let mut rx = harness.events.subscribe();

    let device = harness.connect().await;
    let first = harness.manager.current_session().unwrap().id();
    drop(device);

    next_event(&mut rx, |e| e.as_status() == Some(Status::StreamDisconnected)).await;
    assert!(harness.manager.current_session().is_none());

    let _device = harness.connect().await;
    let second = harness.manager.current_session().unwrap().id();
    assert_ne!(first, second);
}

#[tokio::test]
async fn speech_is_converted_on_the_wire() {
    let harness = Harness::start(CaptureConfig::default()).await;
    let mut device = harness.connect().await;
    let session = harness.manager.current_session().unwrap();

    let samples: [i16; 4] = [0, 256, -256, i16::MAX];
    let pcm: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    let pipeline = AudioOutputPipeline::new(OutputConfig::default(), harness.events.clone());

    let report = pipeline
        .stream_out(&session, AudioSource::Pcm16(pcm))
        .await
        .unwrap();
    assert_eq!(report.bytes_out, 4);

    let mut received = [0u8; 4];
    tokio::time::timeout(WAIT, device.read_exact(&mut received))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, [0x80, 0x81, 0x7F, 0xFF]);
}
