//! Streaming session for one connected device socket

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, MutexGuard, Notify};

use crate::{Error, Result};

/// Boxed write half of the device socket
pub type SessionWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One connected device socket
///
/// The read half is owned by the connection's reader task; the write half
/// lives here so playback can share it. The writer is never shut down; the
/// socket closes only when the session is dropped.
pub struct StreamingSession {
    id: u64,
    peer: Option<SocketAddr>,
    connected: AtomicBool,
    closed: Notify,
    writer: Mutex<SessionWriter>,
}

impl std::fmt::Debug for StreamingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingSession")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl StreamingSession {
    /// Create a connected session around a socket write half
    #[must_use]
    pub fn new<W>(id: u64, peer: Option<SocketAddr>, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            id,
            peer,
            connected: AtomicBool::new(true),
            closed: Notify::new(),
            writer: Mutex::new(Box::new(writer)),
        }
    }

    /// Session identifier, unique per manager
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Remote address of the device
    #[must_use]
    pub const fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Check if the socket is still usable
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Mark the socket closed
    ///
    /// Returns true if this call performed the transition.
    pub fn mark_disconnected(&self) -> bool {
        let was_connected = self.connected.swap(false, Ordering::AcqRel);
        if was_connected {
            self.closed.notify_one();
        }
        was_connected
    }

    /// Resolve once the session has been marked disconnected
    ///
    /// Intended for a single waiter, the connection's reader task.
    pub async fn closed(&self) {
        if self.is_connected() {
            self.closed.notified().await;
        }
    }

    /// Lock the writer for exclusive use
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] if the session is closed
    pub async fn lock_writer(&self) -> Result<MutexGuard<'_, SessionWriter>> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        Ok(self.writer.lock().await)
    }

    /// Write bytes through a locked writer without closing it
    ///
    /// A failed write marks the session disconnected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the write fails
    pub async fn write_locked(&self, writer: &mut SessionWriter, bytes: &[u8]) -> Result<()> {
        let result = async {
            writer.write_all(bytes).await?;
            writer.flush().await
        }
        .await;

        result.map_err(|e| {
            self.mark_disconnected();
            Error::Connection(format!("write to device failed: {e}"))
        })
    }
}
