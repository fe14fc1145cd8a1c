//! Contract with the home-automation host.
//!
//! The host owns accessory persistence and the process lifecycle. It talks to
//! the platform through two channels:
//! - `HostEvent`: lifecycle signals delivered to the platform's event loop
//! - `HostPlatform`: registration calls made by the platform

mod store;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
pub use store::AccessoryStore;
use tokio::sync::mpsc;

use crate::accessory::AccessoryRecord;
use crate::identity::AccessoryIdentity;

/// Capacity of the host→platform event channel
pub const HOST_EVENT_CHANNEL_SIZE: usize = 256;

pub type HostEventSender = mpsc::Sender<HostEvent>;
pub type HostEventReceiver = mpsc::Receiver<HostEvent>;

/// Lifecycle signals from the host.
#[derive(Debug)]
pub enum HostEvent {
    /// A previously registered accessory was restored from disk. Fired once
    /// per accessory, before `DidFinishLaunching`.
    ConfigureAccessory(AccessoryRecord),

    /// The host has restored its whole cache; new accessories may now be
    /// registered.
    DidFinishLaunching,
}

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("accessory {0} is already registered")]
    DuplicateIdentity(AccessoryIdentity),

    #[error("accessory {0} is not registered")]
    UnknownIdentity(AccessoryIdentity),

    #[error("accessory store {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("accessory store {0} is malformed: {1}")]
    Malformed(PathBuf, #[source] serde_json::Error),

    #[error("accessory store {path} has unsupported version {found} (expected {expected})")]
    UnsupportedVersion {
        path: PathBuf,
        expected: u32,
        found: u32,
    },

    #[error("failed to serialize accessories: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("host rejected accessory: {0}")]
    Rejected(String),
}

/// Registration API exposed by the host.
#[async_trait]
pub trait HostPlatform: Send + Sync {
    /// Register accessories the host has never seen. Must be called at most
    /// once per identity.
    async fn register_new_accessories(
        &self,
        plugin: &str,
        platform: &str,
        accessories: &[AccessoryRecord],
    ) -> Result<(), HostError>;

    /// Persist context/metadata changes of already registered accessories.
    async fn update_existing_accessories(
        &self,
        accessories: &[AccessoryRecord],
    ) -> Result<(), HostError>;

    /// Remove accessories from the host.
    async fn unregister_accessories(
        &self,
        plugin: &str,
        platform: &str,
        accessories: &[AccessoryRecord],
    ) -> Result<(), HostError>;
}

#[async_trait]
impl<T: HostPlatform + ?Sized> HostPlatform for Arc<T> {
    async fn register_new_accessories(
        &self,
        plugin: &str,
        platform: &str,
        accessories: &[AccessoryRecord],
    ) -> Result<(), HostError> {
        (**self)
            .register_new_accessories(plugin, platform, accessories)
            .await
    }

    async fn update_existing_accessories(
        &self,
        accessories: &[AccessoryRecord],
    ) -> Result<(), HostError> {
        (**self).update_existing_accessories(accessories).await
    }

    async fn unregister_accessories(
        &self,
        plugin: &str,
        platform: &str,
        accessories: &[AccessoryRecord],
    ) -> Result<(), HostError> {
        (**self)
            .unregister_accessories(plugin, platform, accessories)
            .await
    }
}

/// Call recorded by [`MockHost`].
#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    Register {
        plugin: String,
        platform: String,
        identities: Vec<AccessoryIdentity>,
    },
    Update {
        identities: Vec<AccessoryIdentity>,
    },
    Unregister {
        identities: Vec<AccessoryIdentity>,
    },
}

/// Mock host for testing
///
/// Records every call. Registration of an identity it has already accepted is
/// rejected, the way a real host refuses duplicate UUIDs.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockHost {
    calls: std::sync::Mutex<Vec<HostCall>>,
    registered: std::sync::Mutex<Vec<AccessoryIdentity>>,
    reject_serials: Vec<String>,
}

#[cfg(test)]
impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host that fails every call touching one of these serials.
    pub fn rejecting(serials: &[&str]) -> Self {
        Self {
            reject_serials: serials.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Host that already knows these identities (as if restored from disk).
    pub fn with_registered(identities: impl IntoIterator<Item = AccessoryIdentity>) -> Self {
        let host = Self::default();
        host.registered.lock().unwrap().extend(identities);
        host
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn registrations_of(&self, identity: &AccessoryIdentity) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, HostCall::Register { identities, .. } if identities.contains(identity)))
            .count()
    }

    pub fn register_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, HostCall::Register { .. }))
            .count()
    }

    pub fn update_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, HostCall::Update { .. }))
            .count()
    }

    fn check_rejected(&self, accessories: &[AccessoryRecord]) -> Result<(), HostError> {
        match accessories
            .iter()
            .find(|a| self.reject_serials.contains(&a.context.serial))
        {
            Some(a) => Err(HostError::Rejected(a.context.serial.clone())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl HostPlatform for MockHost {
    async fn register_new_accessories(
        &self,
        plugin: &str,
        platform: &str,
        accessories: &[AccessoryRecord],
    ) -> Result<(), HostError> {
        let identities: Vec<_> = accessories.iter().map(|a| a.identity).collect();
        self.calls.lock().unwrap().push(HostCall::Register {
            plugin: plugin.to_string(),
            platform: platform.to_string(),
            identities: identities.clone(),
        });
        self.check_rejected(accessories)?;

        let mut registered = self.registered.lock().unwrap();
        if let Some(dup) = identities.iter().find(|id| registered.contains(id)) {
            return Err(HostError::DuplicateIdentity(*dup));
        }
        registered.extend(identities);
        Ok(())
    }

    async fn update_existing_accessories(
        &self,
        accessories: &[AccessoryRecord],
    ) -> Result<(), HostError> {
        self.calls.lock().unwrap().push(HostCall::Update {
            identities: accessories.iter().map(|a| a.identity).collect(),
        });
        self.check_rejected(accessories)
    }

    async fn unregister_accessories(
        &self,
        _plugin: &str,
        _platform: &str,
        accessories: &[AccessoryRecord],
    ) -> Result<(), HostError> {
        self.calls.lock().unwrap().push(HostCall::Unregister {
            identities: accessories.iter().map(|a| a.identity).collect(),
        });
        self.check_rejected(accessories)?;
        self.registered
            .lock()
            .unwrap()
            .retain(|id| !accessories.iter().any(|a| &a.identity == id));
        Ok(())
    }
}
