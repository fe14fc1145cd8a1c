//! Stable accessory identities.
//!
//! Every accessory is keyed by an identity derived from the serial number of
//! the device behind it. The derivation is a name-based (v5, SHA-1) UUID under
//! a fixed namespace, so the same serial maps to the same identity on every
//! pass and across restarts.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

/// Namespace for serial-derived identities. Changing this orphans every
/// accessory already persisted by the host.
const SERIAL_NAMESPACE: Uuid = Uuid::from_u128(0x6b75_6d6f_2d61_6363_8000_0000_7365_7269);

/// Opaque identity of a host-visible accessory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessoryIdentity(Uuid);

impl AccessoryIdentity {
    /// Derive the identity for a device serial.
    pub fn resolve(serial: &str) -> Self {
        Self(Uuid::new_v5(&SERIAL_NAMESPACE, serial.as_bytes()))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for AccessoryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}

impl FromStr for AccessoryIdentity {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Shorthand for [`AccessoryIdentity::resolve`].
pub fn resolve(serial: &str) -> AccessoryIdentity {
    AccessoryIdentity::resolve(serial)
}
