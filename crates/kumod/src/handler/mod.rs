//! Behavioral handlers for accessories.
//!
//! Each accessory gets exactly one controller, picked from the `unitType` of
//! its zone table at the moment it is attached. Unknown or missing unit types
//! fall back to the generic controller; there is no unsupported-unit path.

mod ductless;
mod generic;

pub use ductless::DuctlessController;
pub use generic::GenericController;
use serde_json::Value;
use tracing::debug;

use crate::accessory::AccessoryRecord;
use crate::accessory::ZoneTable;

/// Unit families that get distinct handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum UnitType {
    #[strum(serialize = "ductless")]
    Ductless,
    #[strum(serialize = "generic (unspecified)")]
    Generic,
}

impl UnitType {
    /// Map a zone table discriminator to a unit type.
    pub fn from_discriminator(unit_type: Option<&str>) -> Self {
        match unit_type {
            Some("ductless") => UnitType::Ductless,
            _ => UnitType::Generic,
        }
    }

    pub fn of(zone_table: &ZoneTable) -> Self {
        Self::from_discriminator(zone_table.unit_type())
    }
}

/// Host services a controller exposes for its accessory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Service {
    Thermostat,
    HeaterCooler,
    Fan,
}

/// The live controller bound to an accessory.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerVariant {
    Ductless(DuctlessController),
    Generic(GenericController),
}

impl HandlerVariant {
    pub fn unit_type(&self) -> UnitType {
        match self {
            HandlerVariant::Ductless(_) => UnitType::Ductless,
            HandlerVariant::Generic(_) => UnitType::Generic,
        }
    }

    pub fn services(&self) -> &'static [Service] {
        match self {
            HandlerVariant::Ductless(_) => DuctlessController::SERVICES,
            HandlerVariant::Generic(_) => GenericController::SERVICES,
        }
    }
}

/// Build the controller for a record based on its current zone table.
pub fn attach(record: &AccessoryRecord) -> HandlerVariant {
    match UnitType::of(&record.context.zone_table) {
        UnitType::Ductless => HandlerVariant::Ductless(DuctlessController::bind(record)),
        UnitType::Generic => HandlerVariant::Generic(GenericController::bind(record)),
    }
}

/// Read a numeric zone field. Missing or non-numeric values read as absent.
fn read_f64(record: &AccessoryRecord, path: &[&str]) -> Option<f64> {
    let value = record.context.zone_table.pointer(path);
    let number = value.and_then(Value::as_f64);
    if number.is_none() {
        debug!(
            "[{}] zone field {} is {}",
            record.context.serial,
            path.join("."),
            if value.is_some() { "not a number" } else { "missing" }
        );
    }
    number
}

/// Read a textual zone field. Numbers are accepted and stringified.
fn read_string(record: &AccessoryRecord, path: &[&str]) -> Option<String> {
    match record.context.zone_table.pointer(path) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        other => {
            debug!(
                "[{}] zone field {} is {}",
                record.context.serial,
                path.join("."),
                if other.is_some() { "not a string" } else { "missing" }
            );
            None
        }
    }
}
