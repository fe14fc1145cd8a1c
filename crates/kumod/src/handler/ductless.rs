use super::read_f64;
use super::read_string;
use super::Service;
use crate::accessory::AccessoryRecord;

/// Controller for ductless (wall/ceiling cassette) indoor units. These expose
/// fan speed and vane direction on top of the heating/cooling set points.
#[derive(Debug, Clone, PartialEq)]
pub struct DuctlessController {
    pub serial: String,
    pub name: String,
    /// LAN address of the unit, when the cloud reports one.
    pub address: Option<String>,
    pub room_temp: Option<f64>,
    pub heat_setpoint: Option<f64>,
    pub cool_setpoint: Option<f64>,
    pub operation_mode: Option<String>,
    pub fan_speed: Option<String>,
    pub vane_direction: Option<String>,
}

impl DuctlessController {
    pub const SERVICES: &'static [Service] = &[Service::HeaterCooler, Service::Fan];

    pub fn bind(record: &AccessoryRecord) -> Self {
        Self {
            serial: record.context.serial.clone(),
            name: record.display_name.clone(),
            address: read_string(record, &["address"]),
            room_temp: read_f64(record, &["reportedCondition", "room_temp"]),
            heat_setpoint: read_f64(record, &["reportedCondition", "sp_heat"]),
            cool_setpoint: read_f64(record, &["reportedCondition", "sp_cool"]),
            operation_mode: read_string(record, &["reportedCondition", "operation_mode"]),
            fan_speed: read_string(record, &["reportedCondition", "fan_speed"]),
            vane_direction: read_string(record, &["reportedCondition", "vane_dir"]),
        }
    }
}
