//! JSON-file backed host.
//!
//! Keeps registered accessories in a single versioned document:
//! ```json
//! {
//!   "version": 1,
//!   "accessories": [
//!     { "plugin": "homebridge-kumo", "platform": "Kumo", "UUID": "...",
//!       "displayName": "Bedroom", "context": { "serial": "...", "zoneTable": {} } }
//!   ]
//! }
//! ```

use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;
use tracing::info;

use super::HostError;
use super::HostEvent;
use super::HostEventSender;
use super::HostPlatform;
use crate::accessory::AccessoryRecord;

const STORE_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredAccessory {
    plugin: String,
    platform: String,
    #[serde(flatten)]
    record: AccessoryRecord,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreDocument {
    version: u32,
    accessories: Vec<StoredAccessory>,
}

pub struct AccessoryStore {
    path: PathBuf,
    accessories: Mutex<Vec<StoredAccessory>>,
}

impl AccessoryStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, HostError> {
        let path = path.as_ref().to_path_buf();

        let accessories = match fs::read(&path).await {
            Ok(bytes) => {
                let doc: StoreDocument = serde_json::from_slice(&bytes)
                    .map_err(|e| HostError::Malformed(path.clone(), e))?;
                if doc.version != STORE_VERSION {
                    return Err(HostError::UnsupportedVersion {
                        path,
                        expected: STORE_VERSION,
                        found: doc.version,
                    });
                }
                doc.accessories
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No accessory store at {}, starting empty", path.display());
                Vec::new()
            }
            Err(e) => return Err(HostError::Io(path, e)),
        };

        debug!(
            "Opened accessory store {} with {} accessories",
            path.display(),
            accessories.len()
        );

        Ok(Self {
            path,
            accessories: Mutex::new(accessories),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the stored records.
    pub async fn accessories(&self) -> Vec<AccessoryRecord> {
        self.accessories
            .lock()
            .await
            .iter()
            .map(|s| s.record.clone())
            .collect()
    }

    /// Replay every stored accessory to the platform, then signal that the
    /// host has finished launching.
    pub async fn launch(
        &self,
        tx: &HostEventSender,
    ) -> Result<(), tokio::sync::mpsc::error::SendError<HostEvent>> {
        for record in self.accessories().await {
            tx.send(HostEvent::ConfigureAccessory(record)).await?;
        }
        tx.send(HostEvent::DidFinishLaunching).await
    }

    /// Write the document next to the target and rename it into place.
    async fn persist(&self, accessories: &[StoredAccessory]) -> Result<(), HostError> {
        let doc = StoreDocument {
            version: STORE_VERSION,
            accessories: accessories.to_vec(),
        };
        let bytes = serde_json::to_vec_pretty(&doc).map_err(HostError::Serialize)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, bytes)
            .await
            .map_err(|e| HostError::Io(tmp.clone(), e))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| HostError::Io(self.path.clone(), e))
    }
}

#[async_trait]
impl HostPlatform for AccessoryStore {
    async fn register_new_accessories(
        &self,
        plugin: &str,
        platform: &str,
        accessories: &[AccessoryRecord],
    ) -> Result<(), HostError> {
        let mut stored = self.accessories.lock().await;

        for (i, record) in accessories.iter().enumerate() {
            let seen_earlier = accessories[..i]
                .iter()
                .any(|a| a.identity == record.identity);
            if seen_earlier || stored.iter().any(|s| s.record.identity == record.identity) {
                return Err(HostError::DuplicateIdentity(record.identity));
            }
        }

        let mut next = stored.clone();
        next.extend(accessories.iter().map(|record| StoredAccessory {
            plugin: plugin.to_string(),
            platform: platform.to_string(),
            record: record.detached(),
        }));
        self.persist(&next).await?;
        *stored = next;
        Ok(())
    }

    async fn update_existing_accessories(
        &self,
        accessories: &[AccessoryRecord],
    ) -> Result<(), HostError> {
        let mut stored = self.accessories.lock().await;

        let mut next = stored.clone();
        for record in accessories {
            let entry = next
                .iter_mut()
                .find(|s| s.record.identity == record.identity)
                .ok_or(HostError::UnknownIdentity(record.identity))?;
            entry.record = record.detached();
        }
        self.persist(&next).await?;
        *stored = next;
        Ok(())
    }

    async fn unregister_accessories(
        &self,
        _plugin: &str,
        _platform: &str,
        accessories: &[AccessoryRecord],
    ) -> Result<(), HostError> {
        let mut stored = self.accessories.lock().await;

        if let Some(missing) = accessories
            .iter()
            .find(|a| !stored.iter().any(|s| s.record.identity == a.identity))
        {
            return Err(HostError::UnknownIdentity(missing.identity));
        }

        let next: Vec<_> = stored
            .iter()
            .filter(|s| !accessories.iter().any(|a| a.identity == s.record.identity))
            .cloned()
            .collect();
        self.persist(&next).await?;
        *stored = next;
        Ok(())
    }
}
