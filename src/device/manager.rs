//! Device and streaming socket lifecycle

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::cloud::DeviceStatus;
use super::remote::DeviceRemote;
use super::session::StreamingSession;
use crate::audio::{AudioCaptureSession, Utterance};
use crate::config::{CaptureConfig, DeviceConfig, ServerConfig};
use crate::events::{ErrorKind, EventBus, Status};
use crate::{Error, Result};

/// Socket read buffer size
const READ_BUFFER: usize = 64 * 1024;

/// Delay after a failed accept before retrying
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Address used to discover the outbound interface; nothing is sent
const PROBE_ADDR: (Ipv4Addr, u16) = (Ipv4Addr::new(8, 8, 8, 8), 80);

#[derive(Debug, Default)]
struct LinkState {
    online: AtomicBool,
    ready: AtomicBool,
    next_id: AtomicU64,
    session: Mutex<Option<Arc<StreamingSession>>>,
}

/// Owns the device online/offline lifecycle and the streaming socket
///
/// Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct DeviceConnectionManager {
    server: ServerConfig,
    device: DeviceConfig,
    capture: CaptureConfig,
    remote: DeviceRemote,
    events: EventBus,
    state: Arc<LinkState>,
}

impl DeviceConnectionManager {
    /// Create a manager
    #[must_use]
    pub fn new(
        server: ServerConfig,
        device: DeviceConfig,
        capture: CaptureConfig,
        remote: DeviceRemote,
        events: EventBus,
    ) -> Self {
        Self {
            server,
            device,
            capture,
            remote,
            events,
            state: Arc::new(LinkState::default()),
        }
    }

    /// Remote command handle for the device
    #[must_use]
    pub const fn remote(&self) -> &DeviceRemote {
        &self.remote
    }

    /// Whether the cloud last reported the device online
    #[must_use]
    pub fn is_device_online(&self) -> bool {
        self.state.online.load(Ordering::Acquire)
    }

    /// The connected streaming session, if any
    #[must_use]
    pub fn current_session(&self) -> Option<Arc<StreamingSession>> {
        self.slot()
            .as_ref()
            .filter(|s| s.is_connected())
            .cloned()
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Arc<StreamingSession>>> {
        // A poisoned slot still holds a valid Option
        self.state
            .session
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Log in to the device cloud and start watching device status
    ///
    /// Failures are logged and published; the streaming server runs either way.
    pub async fn connect_cloud(&self) -> Option<JoinHandle<()>> {
        if self.device.device_id.is_empty() || self.device.username.is_empty() {
            tracing::warn!("device cloud credentials not configured, skipping login");
            return None;
        }

        let token = match self
            .remote
            .login(&self.device.username, &self.device.password)
            .await
        {
            Ok(token) => token,
            Err(e) => {
                tracing::error!(error = %e, "device cloud login failed");
                self.events
                    .error(ErrorKind::DeviceCloud, format!("login failed: {e}"));
                return None;
            }
        };

        let this = self.clone();
        Some(tokio::spawn(async move { this.watch_status(&token).await }))
    }

    async fn watch_status(&self, token: &str) {
        let mut statuses = match self
            .remote
            .cloud()
            .subscribe_status(&self.device.device_id, token)
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(error = %e, "failed to subscribe to device status");
                self.events
                    .error(ErrorKind::DeviceCloud, format!("status subscription failed: {e}"));
                return;
            }
        };

        while let Some(item) = statuses.next().await {
            match item {
                Ok(status) => self.handle_status(status).await,
                Err(e) => {
                    tracing::warn!(error = %e, "device status stream failed");
                    self.events
                        .error(ErrorKind::DeviceCloud, format!("status stream failed: {e}"));
                    return;
                }
            }
        }

        tracing::info!("device status stream ended");
    }

    /// Apply a connectivity change reported by the cloud
    pub async fn handle_status(&self, status: DeviceStatus) {
        match status {
            DeviceStatus::Online => {
                if !self.state.online.swap(true, Ordering::AcqRel) {
                    self.events.status(Status::DeviceOnline);
                }
                if self.current_session().is_none() {
                    let host_port = self.advertised_address().await;
                    tracing::info!(%host_port, "pointing device at streaming server");
                    self.remote.update_server(&host_port).await;
                }
            }
            DeviceStatus::Offline => {
                if self.state.online.swap(false, Ordering::AcqRel) {
                    self.events.status(Status::DeviceOffline);
                }
            }
        }
        self.refresh_ready();
    }

    fn refresh_ready(&self) {
        let ready = self.is_device_online() && self.current_session().is_some();
        if ready {
            if !self.state.ready.swap(true, Ordering::AcqRel) {
                self.events.status(Status::ChatbotReady);
            }
        } else {
            self.state.ready.store(false, Ordering::Release);
        }
    }

    /// `host:port` the device should connect to
    pub async fn advertised_address(&self) -> String {
        let host = match &self.server.host {
            Some(host) => host.clone(),
            None => match outbound_ipv4().await {
                Ok(ip) => ip.to_string(),
                Err(e) => {
                    tracing::warn!(error = %e, "could not detect outbound address, using loopback");
                    Ipv4Addr::LOCALHOST.to_string()
                }
            },
        };
        format!("{host}:{}", self.server.port)
    }

    /// Bind the streaming listener on all interfaces
    ///
    /// # Errors
    ///
    /// Returns error if the port cannot be bound
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.server.port));
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(addr = %listener.local_addr()?, "streaming server listening");
        Ok(listener)
    }

    /// Accept device connections until the task is aborted
    ///
    /// Completed utterances are sent on `utterances`.
    pub fn serve(&self, listener: TcpListener, utterances: mpsc::Sender<Utterance>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move { this.accept_loop(listener, utterances).await })
    }

    async fn accept_loop(&self, listener: TcpListener, utterances: mpsc::Sender<Utterance>) {
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    self.events
                        .error(ErrorKind::Connection, format!("accept failed: {e}"));
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            if self.slot().is_some() {
                tracing::warn!(%peer, "streaming session already active, refusing connection");
                drop(stream);
                continue;
            }

            self.attach(stream, peer, utterances.clone());
        }
    }

    /// Register a new streaming session and start its reader
    ///
    /// Sets `TCP_NODELAY`. TCP keepalive is not set; a dead peer is detected
    /// by the next failed read or write.
    fn attach(&self, stream: TcpStream, peer: SocketAddr, utterances: mpsc::Sender<Utterance>) {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "failed to set TCP_NODELAY");
        }

        let (reader, writer) = stream.into_split();
        let id = self.state.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let session = Arc::new(StreamingSession::new(id, Some(peer), writer));
        *self.slot() = Some(Arc::clone(&session));

        tracing::info!(session = id, %peer, "streaming client connected");
        self.events.status(Status::StreamConnected);
        self.refresh_ready();

        let this = self.clone();
        tokio::spawn(async move {
            this.read_loop(&session, reader, &utterances).await;
            this.detach(&session);
        });
    }

    async fn read_loop(
        &self,
        session: &StreamingSession,
        mut reader: OwnedReadHalf,
        utterances: &mpsc::Sender<Utterance>,
    ) {
        let mut capture = AudioCaptureSession::from_config(&self.capture);
        let mut buf = vec![0u8; READ_BUFFER];

        loop {
            let read = tokio::select! {
                biased;
                () = session.closed() => break,
                read = reader.read(&mut buf) => read,
            };

            match read {
                Ok(0) => {
                    tracing::info!(session = session.id(), "device closed stream");
                    break;
                }
                Ok(n) => match capture.push_chunk(&buf[..n]) {
                    Ok(Some(utterance)) => {
                        if utterances.send(utterance).await.is_err() {
                            tracing::warn!("utterance consumer gone, dropping recording");
                        }
                    }
                    Ok(None) => {}
                    Err(e) => self.events.report(&e),
                },
                Err(e) => {
                    self.events
                        .report(&Error::Connection(format!("read from device failed: {e}")));
                    break;
                }
            }
        }

        capture.reset();
    }

    fn detach(&self, session: &Arc<StreamingSession>) {
        session.mark_disconnected();
        {
            let mut slot = self.slot();
            if slot.as_ref().is_some_and(|s| Arc::ptr_eq(s, session)) {
                *slot = None;
            }
        }

        tracing::info!(session = session.id(), peer = ?session.peer(), "streaming client disconnected");
        self.events.status(Status::StreamDisconnected);
        self.refresh_ready();
    }
}

/// Local IPv4 address of the interface used for outbound traffic
///
/// # Errors
///
/// Returns error if no route is available
pub async fn outbound_ipv4() -> Result<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    socket.connect(PROBE_ADDR).await?;
    let ip = socket.local_addr()?.ip();
    if ip.is_unspecified() {
        return Err(Error::Connection("no outbound interface".to_string()));
    }
    Ok(ip)
}
