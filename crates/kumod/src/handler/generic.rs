use super::read_f64;
use super::read_string;
use super::Service;
use crate::accessory::AccessoryRecord;

/// Controller for units without specific handling (central ducted systems and
/// anything the cloud does not label `ductless`).
#[derive(Debug, Clone, PartialEq)]
pub struct GenericController {
    pub serial: String,
    pub name: String,
    pub room_temp: Option<f64>,
    pub heat_setpoint: Option<f64>,
    pub cool_setpoint: Option<f64>,
    pub operation_mode: Option<String>,
}

impl GenericController {
    pub const SERVICES: &'static [Service] = &[Service::Thermostat];

    pub fn bind(record: &AccessoryRecord) -> Self {
        Self {
            serial: record.context.serial.clone(),
            name: record.display_name.clone(),
            room_temp: read_f64(record, &["reportedCondition", "room_temp"]),
            heat_setpoint: read_f64(record, &["reportedCondition", "sp_heat"]),
            cool_setpoint: read_f64(record, &["reportedCondition", "sp_cool"]),
            operation_mode: read_string(record, &["reportedCondition", "operation_mode"]),
        }
    }
}
