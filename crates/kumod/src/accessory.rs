//! Accessory data model shared by the engine, the host and the Kumo client.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::handler::HandlerVariant;
use crate::identity::AccessoryIdentity;

/// Capability/configuration payload for one Kumo zone.
///
/// Only the `unitType` discriminator is guaranteed to be meaningful. Everything
/// else varies by unit and is read leniently by the controller that needs it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneTable(Map<String, Value>);

impl ZoneTable {
    /// Build a zone table from an arbitrary JSON value. Returns `None` unless the
    /// value is an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    /// The `unitType` discriminator, if present and a string.
    pub fn unit_type(&self) -> Option<&str> {
        self.0.get("unitType").and_then(Value::as_str)
    }

    /// Look up a nested field, e.g. `["reportedCondition", "room_temp"]`.
    pub fn pointer(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        rest.iter()
            .try_fold(self.0.get(*first)?, |value, key| value.get(*key))
    }
}

/// A controllable unit as reported by the Kumo device directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDevice {
    /// Globally unique and stable; the only input to identity derivation.
    pub serial: String,
    pub label: String,
    pub zone_table: ZoneTable,
}

/// Data the engine keeps with an accessory across restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessoryContext {
    pub serial: String,
    pub zone_table: ZoneTable,
}

/// Host-visible representation of one physical unit.
///
/// The handler is live state bound at (re)attachment time and is never
/// persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessoryRecord {
    #[serde(rename = "UUID")]
    pub identity: AccessoryIdentity,

    #[serde(rename = "displayName")]
    pub display_name: String,

    pub context: AccessoryContext,

    #[serde(skip)]
    pub handler: Option<HandlerVariant>,
}

impl AccessoryRecord {
    /// Create a fresh record for a device that has never been seen before.
    pub fn from_device(identity: AccessoryIdentity, device: &RemoteDevice) -> Self {
        Self {
            identity,
            display_name: device.label.clone(),
            context: AccessoryContext {
                serial: device.serial.clone(),
                zone_table: device.zone_table.clone(),
            },
            handler: None,
        }
    }

    /// Copy of the persistable part of the record.
    pub fn detached(&self) -> Self {
        Self {
            identity: self.identity,
            display_name: self.display_name.clone(),
            context: self.context.clone(),
            handler: None,
        }
    }
}
