pub mod accessory;
pub mod cache;
pub mod config;
pub mod handler;
pub mod host;
pub mod identity;
pub mod kumo;
pub mod platform;

pub use accessory::AccessoryRecord;
pub use accessory::RemoteDevice;
pub use accessory::ZoneTable;
pub use config::Config;
pub use config::LogLevel;
pub use identity::AccessoryIdentity;
pub use platform::PassError;
pub use platform::Platform;
pub use platform::ReconcileReport;
