//! In-memory view of the accessories the host has already persisted.
//!
//! The cache starts out `Loading` and accepts records replayed by the host's
//! "configure accessory" events. The first reconciliation pass moves it to
//! `Ready`; from then on only the engine mutates it, through the `&mut` it
//! holds for the duration of a pass.

use crate::accessory::AccessoryRecord;
use crate::identity::AccessoryIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Loading,
    Ready,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("accessory cache is sealed; {0} arrived after the platform was ready")]
    Sealed(AccessoryIdentity),

    #[error("accessory {0} is already cached")]
    DuplicateIdentity(AccessoryIdentity),
}

#[derive(Debug, Default)]
pub struct AccessoryCache {
    records: Vec<AccessoryRecord>,
    phase: Phase,
}

impl AccessoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Add a record restored by the host. Only valid while loading.
    pub fn configure(&mut self, record: AccessoryRecord) -> Result<(), CacheError> {
        if self.phase == Phase::Ready {
            return Err(CacheError::Sealed(record.identity));
        }
        if self.contains(&record.identity) {
            return Err(CacheError::DuplicateIdentity(record.identity));
        }
        self.records.push(record);
        Ok(())
    }

    /// Stop accepting host-restored records.
    pub fn seal(&mut self) {
        self.phase = Phase::Ready;
    }

    pub fn contains(&self, identity: &AccessoryIdentity) -> bool {
        self.find(identity).is_some()
    }

    // Linear scans: a home has tens of units at most.
    pub fn find(&self, identity: &AccessoryIdentity) -> Option<&AccessoryRecord> {
        self.records.iter().find(|r| &r.identity == identity)
    }

    pub fn find_mut(&mut self, identity: &AccessoryIdentity) -> Option<&mut AccessoryRecord> {
        self.records.iter_mut().find(|r| &r.identity == identity)
    }

    /// Track a record the engine has just registered with the host.
    pub(crate) fn insert(&mut self, record: AccessoryRecord) -> Result<(), CacheError> {
        if self.contains(&record.identity) {
            return Err(CacheError::DuplicateIdentity(record.identity));
        }
        self.records.push(record);
        Ok(())
    }

    pub(crate) fn remove(&mut self, identity: &AccessoryIdentity) -> Option<AccessoryRecord> {
        let index = self.records.iter().position(|r| &r.identity == identity)?;
        Some(self.records.remove(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &AccessoryRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
