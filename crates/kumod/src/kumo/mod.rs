//! Kumo Cloud session and device directory.

mod client;

use async_trait::async_trait;
pub use client::KumoApi;

use crate::accessory::RemoteDevice;

#[derive(Debug, thiserror::Error)]
pub enum KumoError {
    #[error("not logged in to Kumo Cloud")]
    NotLoggedIn,

    #[error("Kumo Cloud request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Kumo Cloud returned HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("Kumo Cloud response is missing {0}")]
    MissingField(&'static str),

    #[error("{0}")]
    Other(String),
}

/// Remote session plus the device directory it unlocks.
///
/// This trait allows for mocking the cloud API for testing purposes.
#[async_trait]
pub trait KumoSession: Send + Sync {
    /// Log in (or refresh the login). `false` means authentication failed and
    /// the directory must not be queried.
    async fn acquire_security_token(&self) -> bool;

    /// Devices known to the account, in directory order.
    async fn devices(&self) -> Result<Vec<RemoteDevice>, KumoError>;
}

/// Mock session for testing
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockSession {
    pub authenticate: bool,
    pub fail_directory: bool,
    /// Delay before login completes, for timeout tests
    pub delay: Option<std::time::Duration>,
    /// Delay before the directory is returned
    pub directory_delay: Option<std::time::Duration>,
    devices: std::sync::Mutex<Vec<RemoteDevice>>,
    logins: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockSession {
    pub fn new(devices: Vec<RemoteDevice>) -> Self {
        Self {
            authenticate: true,
            devices: std::sync::Mutex::new(devices),
            ..Default::default()
        }
    }

    pub fn set_devices(&self, devices: Vec<RemoteDevice>) {
        *self.devices.lock().unwrap() = devices;
    }

    pub fn logins(&self) -> usize {
        self.logins.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl KumoSession for MockSession {
    async fn acquire_security_token(&self) -> bool {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.logins.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.authenticate
    }

    async fn devices(&self) -> Result<Vec<RemoteDevice>, KumoError> {
        if let Some(delay) = self.directory_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_directory {
            return Err(KumoError::Other("directory unavailable".to_string()));
        }
        Ok(self.devices.lock().unwrap().clone())
    }
}
