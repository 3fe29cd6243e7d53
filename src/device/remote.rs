//! Remote commands sent to the device through the cloud

use std::sync::Arc;

use secrecy::SecretString;
use tokio::sync::RwLock;

use super::cloud::DeviceCloud;
use super::tone::ToneSpec;
use crate::events::EventBus;
use crate::{Error, Result};

/// Device function names
pub mod function {
    /// Point the device at the streaming server
    pub const UPDATE_SERVER: &str = "updateServer";
    /// Drive forward for N seconds
    pub const DRIVE: &str = "drive";
    /// Play a tone spec on the buzzer
    pub const PLAY_TONE: &str = "playTone";
    /// Spin the eye LEDs
    pub const EYES_SPIN: &str = "eyesSpin";
    /// Power down
    pub const SHUTDOWN: &str = "shutdown";
}

/// Handle for invoking device functions
///
/// Commands are fire-and-forget: failures are logged and published as
/// remote command errors, never returned to the caller.
#[derive(Clone)]
pub struct DeviceRemote {
    cloud: Arc<dyn DeviceCloud>,
    device_id: String,
    token: Arc<RwLock<Option<String>>>,
    events: EventBus,
}

impl std::fmt::Debug for DeviceRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRemote")
            .field("device_id", &self.device_id)
            .finish_non_exhaustive()
    }
}

impl DeviceRemote {
    /// Create a remote for one device
    #[must_use]
    pub fn new(cloud: Arc<dyn DeviceCloud>, device_id: impl Into<String>, events: EventBus) -> Self {
        Self {
            cloud,
            device_id: device_id.into(),
            token: Arc::new(RwLock::new(None)),
            events,
        }
    }

    /// Device identifier
    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Cloud client shared with the connection manager
    #[must_use]
    pub fn cloud(&self) -> Arc<dyn DeviceCloud> {
        Arc::clone(&self.cloud)
    }

    /// Log in and keep the bearer token for later calls
    ///
    /// # Errors
    ///
    /// Returns error if the cloud rejects the credentials
    pub async fn login(&self, username: &str, password: &SecretString) -> Result<String> {
        let token = self.cloud.login(username, password).await?;
        *self.token.write().await = Some(token.clone());
        tracing::info!(device = %self.device_id, "logged in to device cloud");
        Ok(token)
    }

    /// Current bearer token, if logged in
    pub async fn token(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    /// Point the device at `host:port`
    pub async fn update_server(&self, host_port: &str) -> Option<i64> {
        self.call(function::UPDATE_SERVER, host_port).await
    }

    /// Drive forward for `seconds`
    pub async fn drive(&self, seconds: u32) -> Option<i64> {
        self.call(function::DRIVE, &seconds.to_string()).await
    }

    /// Play a tone sequence
    pub async fn play_tone(&self, tone: &ToneSpec) -> Option<i64> {
        self.call(function::PLAY_TONE, &tone.to_string()).await
    }

    /// Spin the eyes for `seconds` at `speed`
    pub async fn eyes_spin(&self, seconds: u32, speed: u32) -> Option<i64> {
        self.call(function::EYES_SPIN, &format!("{seconds};{speed}"))
            .await
    }

    /// Power the device down
    pub async fn shutdown(&self) -> Option<i64> {
        self.call(function::SHUTDOWN, "").await
    }

    /// Invoke a device function, returning its result on success
    pub async fn call(&self, name: &str, argument: &str) -> Option<i64> {
        match self.try_call(name, argument).await {
            Ok(value) => {
                tracing::debug!(function = name, argument, value, "device function returned");
                Some(value)
            }
            Err(e) => {
                tracing::warn!(function = name, error = %e, "device function failed");
                self.events.report(&e);
                None
            }
        }
    }

    async fn try_call(&self, name: &str, argument: &str) -> Result<i64> {
        let token = self
            .token()
            .await
            .ok_or_else(|| Error::RemoteCommand(format!("{name}: not logged in")))?;
        self.cloud
            .call_function(&self.device_id, &token, name, argument)
            .await
            .map_err(|e| match e {
                Error::RemoteCommand(_) => e,
                other => Error::RemoteCommand(format!("{name}: {other}")),
            })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use futures::stream::BoxStream;

    use super::*;
    use crate::device::cloud::DeviceStatus;
    use crate::events::ErrorKind;

    #[derive(Default)]
    struct FakeCloud {
        calls: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl DeviceCloud for FakeCloud {
        async fn login(&self, _username: &str, _password: &SecretString) -> Result<String> {
            Ok("token-1".to_string())
        }

        async fn subscribe_status(
            &self,
            _device_id: &str,
            _token: &str,
        ) -> Result<BoxStream<'static, Result<DeviceStatus>>> {
            Err(Error::DeviceCloud("unsupported".into()))
        }

        async fn call_function(
            &self,
            _device_id: &str,
            token: &str,
            name: &str,
            argument: &str,
        ) -> Result<i64> {
            assert_eq!(token, "token-1");
            if self.fail {
                return Err(Error::RemoteCommand(format!("{name}: offline")));
            }
            self.calls
                .lock()
                .unwrap()
                .push((name.to_string(), argument.to_string()));
            Ok(1)
        }
    }

    #[tokio::test]
    async fn commands_format_arguments() {
        let cloud = Arc::new(FakeCloud::default());
        let remote = DeviceRemote::new(cloud.clone(), "dev", EventBus::new());
        remote
            .login("user", &SecretString::from("pw"))
            .await
            .unwrap();

        remote.update_server("10.0.0.2:5000").await;
        remote.drive(5).await;
        remote.eyes_spin(3, 7).await;
        remote.play_tone(&"C4Q,G4H;120".parse().unwrap()).await;
        remote.shutdown().await;

        let calls = cloud.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                ("updateServer".to_string(), "10.0.0.2:5000".to_string()),
                ("drive".to_string(), "5".to_string()),
                ("eyesSpin".to_string(), "3;7".to_string()),
                ("playTone".to_string(), "C4Q,G4H;120".to_string()),
                ("shutdown".to_string(), String::new()),
            ]
        );
    }

    #[tokio::test]
    async fn failures_are_published_not_returned() {
        let cloud = Arc::new(FakeCloud {
            fail: true,
            ..FakeCloud::default()
        });
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let remote = DeviceRemote::new(cloud, "dev", events);
        remote
            .login("user", &SecretString::from("pw"))
            .await
            .unwrap();

        assert_eq!(remote.drive(2).await, None);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.error_kind(), Some(ErrorKind::RemoteCommand));
    }

    #[tokio::test]
    async fn calls_without_login_fail_quietly() {
        let remote = DeviceRemote::new(Arc::new(FakeCloud::default()), "dev", EventBus::new());
        assert_eq!(remote.shutdown().await, None);
        assert_eq!(remote.token().await, None);
    }
}
