//! Accessory reconciliation.
//!
//! The platform matches the devices reported by Kumo Cloud against the
//! accessories the host restored from disk. Every device ends up with exactly
//! one accessory: restored and refreshed when its identity is already cached,
//! created and registered once otherwise.

use std::collections::HashSet;
use std::slice;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::accessory::AccessoryRecord;
use crate::accessory::RemoteDevice;
use crate::cache::AccessoryCache;
use crate::config::PlatformConfig;
use crate::handler;
use crate::host::HostError;
use crate::host::HostEvent;
use crate::host::HostEventReceiver;
use crate::host::HostPlatform;
use crate::identity;
use crate::identity::AccessoryIdentity;
use crate::kumo::KumoError;
use crate::kumo::KumoSession;

/// Bounded stages of a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Stage {
    #[strum(serialize = "login")]
    Login,
    #[strum(serialize = "device directory fetch")]
    DirectoryFetch,
}

/// Errors that abort a whole reconciliation pass.
#[derive(Debug, thiserror::Error)]
pub enum PassError {
    #[error("failed to log in to Kumo Cloud")]
    Authentication,

    #[error("failed to fetch the Kumo device directory: {0}")]
    DirectoryFetch(#[source] KumoError),

    #[error("{stage} timed out after {timeout:?}")]
    Timeout { stage: Stage, timeout: Duration },

    #[error("a reconciliation pass is already running")]
    PassInProgress,
}

/// A device whose accessory the host refused to register or update.
#[derive(Debug)]
pub struct DeviceFailure {
    pub serial: String,
    pub identity: AccessoryIdentity,
    pub error: HostError,
}

/// Outcome of one pass.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub restored: Vec<AccessoryIdentity>,
    pub created: Vec<AccessoryIdentity>,
    pub failed: Vec<DeviceFailure>,
    /// Cached accessories that no device in this pass maps to
    pub stale: Vec<AccessoryIdentity>,
    /// Stale accessories unregistered by the cleanup pass
    pub removed: Vec<AccessoryIdentity>,
}

enum Action {
    Restored,
    Created,
}

/// Kumo platform
///
/// Owns the accessory cache on behalf of the host and runs reconciliation
/// passes against the Kumo device directory.
pub struct Platform<S, H> {
    session: S,
    host: H,
    config: PlatformConfig,

    /// Bound on login and on the directory fetch
    timeout: Duration,

    /// Held for the whole of a pass; `try_lock` failing means a pass is running
    cache: Mutex<AccessoryCache>,

    /// Set once the host's ready signal has been handled
    launched: AtomicBool,
}

impl<S: KumoSession, H: HostPlatform> Platform<S, H> {
    pub fn new(session: S, host: H, config: PlatformConfig, timeout: Duration) -> Self {
        debug!("Finished initializing platform: {}", config.name);
        Self {
            session,
            host,
            config,
            timeout,
            cache: Mutex::new(AccessoryCache::new()),
            launched: AtomicBool::new(false),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    /// Snapshot of the cached accessories, handlers included.
    pub async fn accessories(&self) -> Vec<AccessoryRecord> {
        self.cache.lock().await.iter().cloned().collect()
    }

    /// Process host events until the host closes the channel.
    pub async fn run(&self, mut events: HostEventReceiver) {
        info!("Platform {} starting", self.config.name);

        while let Some(event) = events.recv().await {
            match event {
                HostEvent::ConfigureAccessory(record) => self.configure_accessory(record).await,
                HostEvent::DidFinishLaunching => {
                    if self.launched.swap(true, Ordering::SeqCst) {
                        warn!("Host signalled ready more than once, ignoring");
                        continue;
                    }
                    debug!("Executed didFinishLaunching callback");

                    match self.reconcile().await {
                        Ok(report) => info!(
                            "Reconciliation complete: {} restored, {} created, {} failed, {} stale, {} removed",
                            report.restored.len(),
                            report.created.len(),
                            report.failed.len(),
                            report.stale.len(),
                            report.removed.len()
                        ),
                        Err(e) => error!("Reconciliation aborted: {}", e),
                    }
                }
            }
        }

        info!("Platform {} shutting down", self.config.name);
    }

    /// Track an accessory the host restored from disk.
    pub async fn configure_accessory(&self, record: AccessoryRecord) {
        info!("Loading accessory from cache: {}", record.display_name);

        if let Err(e) = self.cache.lock().await.configure(record) {
            warn!("Not loading accessory: {}", e);
        }
    }

    /// Run one reconciliation pass.
    ///
    /// Login and directory failures abort the pass before anything is touched.
    /// Host failures for a single accessory are recorded in the report and do
    /// not stop the remaining devices.
    pub async fn reconcile(&self) -> Result<ReconcileReport, PassError> {
        let mut cache = self
            .cache
            .try_lock()
            .map_err(|_| PassError::PassInProgress)?;
        cache.seal();

        let devices = self.fetch_directory().await?;
        debug!("Kumo directory returned {} devices", devices.len());

        let mut report = ReconcileReport::default();
        for device in &devices {
            let identity = identity::resolve(&device.serial);
            match self.reconcile_device(&mut cache, identity, device).await {
                Ok(Action::Restored) => report.restored.push(identity),
                Ok(Action::Created) => report.created.push(identity),
                Err(error) => {
                    warn!(
                        "Failed to reconcile accessory {} ({}): {}",
                        device.label, device.serial, error
                    );
                    report.failed.push(DeviceFailure {
                        serial: device.serial.clone(),
                        identity,
                        error,
                    });
                }
            }
        }

        self.handle_stale(&mut cache, &devices, &mut report).await;

        Ok(report)
    }

    async fn fetch_directory(&self) -> Result<Vec<RemoteDevice>, PassError> {
        let authenticated = timeout(self.timeout, self.session.acquire_security_token())
            .await
            .map_err(|_| PassError::Timeout {
                stage: Stage::Login,
                timeout: self.timeout,
            })?;

        if !authenticated {
            error!("Failed to login. Restart kumod to try again.");
            return Err(PassError::Authentication);
        }

        timeout(self.timeout, self.session.devices())
            .await
            .map_err(|_| PassError::Timeout {
                stage: Stage::DirectoryFetch,
                timeout: self.timeout,
            })?
            .map_err(|e| {
                error!("Failed to fetch Kumo devices: {}. Restart kumod to try again.", e);
                PassError::DirectoryFetch(e)
            })
    }

    async fn reconcile_device(
        &self,
        cache: &mut AccessoryCache,
        identity: AccessoryIdentity,
        device: &RemoteDevice,
    ) -> Result<Action, HostError> {
        if let Some(existing) = cache.find_mut(&identity) {
            info!(
                "Restoring existing accessory from cache: {}",
                existing.display_name
            );

            // Refresh before the handler sees the record
            existing.context.zone_table = device.zone_table.clone();
            let updated = self
                .host
                .update_existing_accessories(slice::from_ref(existing))
                .await;

            Self::attach_handler(existing);
            return updated.map(|()| Action::Restored);
        }

        info!("Adding new accessory: {}", device.label);

        let mut record = AccessoryRecord::from_device(identity, device);
        Self::attach_handler(&mut record);

        self.host
            .register_new_accessories(
                &self.config.plugin,
                &self.config.name,
                slice::from_ref(&record),
            )
            .await?;

        if let Err(e) = cache.insert(record) {
            warn!("Registered accessory not tracked: {}", e);
        }
        Ok(Action::Created)
    }

    fn attach_handler(record: &mut AccessoryRecord) {
        let handler = handler::attach(record);
        info!(
            "Initializing \"{}\" as {} unit.",
            record.display_name,
            handler.unit_type()
        );
        debug!(
            "[{}] exposing services: {}",
            record.context.serial,
            handler
                .services()
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
        record.handler = Some(handler);
    }

    /// Find cached accessories without a device and, when enabled, unregister
    /// them.
    async fn handle_stale(
        &self,
        cache: &mut AccessoryCache,
        devices: &[RemoteDevice],
        report: &mut ReconcileReport,
    ) {
        let seen: HashSet<AccessoryIdentity> = devices
            .iter()
            .map(|d| identity::resolve(&d.serial))
            .collect();
        report.stale = cache
            .iter()
            .map(|r| r.identity)
            .filter(|id| !seen.contains(id))
            .collect();

        if report.stale.is_empty() {
            return;
        }

        if !self.config.remove_stale {
            info!(
                "{} cached accessories are no longer in the Kumo directory, leaving them in place",
                report.stale.len()
            );
            return;
        }

        // Never clear the whole cache on an empty directory
        if devices.is_empty() {
            warn!("Kumo directory is empty, skipping stale accessory cleanup");
            return;
        }

        for identity in &report.stale {
            let Some(record) = cache.find(identity) else {
                continue;
            };
            let name = record.display_name.clone();

            let result = self
                .host
                .unregister_accessories(
                    &self.config.plugin,
                    &self.config.name,
                    slice::from_ref(record),
                )
                .await;
            match result {
                Ok(()) => {
                    cache.remove(identity);
                    report.removed.push(*identity);
                    info!("Removed stale accessory: {}", name);
                }
                Err(e) => warn!("Failed to remove stale accessory {}: {}", name, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::accessory::ZoneTable;
    use crate::handler::HandlerVariant;
    use crate::handler::UnitType;
    use crate::host::HostCall;
    use crate::host::MockHost;
    use crate::kumo::MockSession;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn zone_table(unit_type: Option<&str>) -> ZoneTable {
        let value = match unit_type {
            Some(t) => json!({"unitType": t}),
            None => json!({}),
        };
        ZoneTable::from_value(value).unwrap()
    }

    fn device(serial: &str, unit_type: Option<&str>) -> RemoteDevice {
        RemoteDevice {
            serial: serial.to_string(),
            label: format!("Unit {}", serial),
            zone_table: zone_table(unit_type),
        }
    }

    fn cached(serial: &str, unit_type: Option<&str>) -> AccessoryRecord {
        AccessoryRecord::from_device(identity::resolve(serial), &device(serial, unit_type))
    }

    fn platform(session: MockSession, host: MockHost) -> Platform<MockSession, MockHost> {
        Platform::new(session, host, PlatformConfig::default(), TIMEOUT)
    }

    fn stale_platform(session: MockSession, host: MockHost) -> Platform<MockSession, MockHost> {
        let config = PlatformConfig {
            remove_stale: true,
            ..PlatformConfig::default()
        };
        Platform::new(session, host, config, TIMEOUT)
    }

    async fn find(
        platform: &Platform<MockSession, MockHost>,
        serial: &str,
    ) -> Option<AccessoryRecord> {
        let id = identity::resolve(serial);
        platform
            .accessories()
            .await
            .into_iter()
            .find(|r| r.identity == id)
    }

    #[tokio::test]
    async fn test_creates_accessories_for_new_devices() {
        let session = MockSession::new(vec![
            device("SN-001", Some("ductless")),
            device("SN-002", Some("central")),
        ]);
        let platform = platform(session, MockHost::new());

        let report = platform.reconcile().await.unwrap();
        assert_eq!(
            report.created,
            vec![identity::resolve("SN-001"), identity::resolve("SN-002")]
        );
        assert!(report.restored.is_empty());
        assert!(report.failed.is_empty());

        assert_eq!(
            platform.host().calls(),
            vec![
                HostCall::Register {
                    plugin: "homebridge-kumo".to_string(),
                    platform: "Kumo".to_string(),
                    identities: vec![identity::resolve("SN-001")],
                },
                HostCall::Register {
                    plugin: "homebridge-kumo".to_string(),
                    platform: "Kumo".to_string(),
                    identities: vec![identity::resolve("SN-002")],
                },
            ]
        );

        let first = find(&platform, "SN-001").await.unwrap();
        assert_eq!(first.display_name, "Unit SN-001");
        assert_eq!(first.context.serial, "SN-001");
        assert!(matches!(first.handler, Some(HandlerVariant::Ductless(_))));

        let second = find(&platform, "SN-002").await.unwrap();
        assert!(matches!(second.handler, Some(HandlerVariant::Generic(_))));
    }

    #[tokio::test]
    async fn test_idempotent_restore() {
        let devices = vec![
            device("SN-001", Some("ductless")),
            device("SN-002", None),
        ];
        let platform = platform(MockSession::new(devices), MockHost::new());

        platform.reconcile().await.unwrap();
        assert_eq!(platform.host().register_calls(), 2);
        assert_eq!(platform.host().update_calls(), 0);

        let report = platform.reconcile().await.unwrap();
        assert!(report.created.is_empty());
        assert_eq!(report.restored.len(), 2);
        assert_eq!(platform.host().register_calls(), 2);
        assert_eq!(platform.host().update_calls(), 2);
        assert_eq!(platform.accessories().await.len(), 2);
    }

    #[tokio::test]
    async fn test_at_most_one_registration_per_identity() {
        let session = MockSession::new(vec![device("SN-001", Some("ductless"))]);
        let platform = platform(session, MockHost::new());

        for _ in 0..3 {
            platform.reconcile().await.unwrap();
        }
        platform
            .session()
            .set_devices(vec![device("SN-001", None), device("SN-002", None)]);
        platform.reconcile().await.unwrap();

        assert_eq!(
            platform.host().registrations_of(&identity::resolve("SN-001")),
            1
        );
        assert_eq!(
            platform.host().registrations_of(&identity::resolve("SN-002")),
            1
        );
    }

    #[tokio::test]
    async fn test_restore_refreshes_zone_table() {
        let fresh = ZoneTable::from_value(json!({
            "unitType": "ductless",
            "reportedCondition": {"room_temp": 23.5}
        }))
        .unwrap();
        let mut remote = device("SN-001", None);
        remote.zone_table = fresh.clone();

        let platform = platform(
            MockSession::new(vec![remote]),
            MockHost::with_registered([identity::resolve("SN-001")]),
        );
        platform
            .configure_accessory(cached("SN-001", Some("ductless")))
            .await;

        platform.reconcile().await.unwrap();

        let record = find(&platform, "SN-001").await.unwrap();
        assert_eq!(record.context.zone_table, fresh);
        match record.handler {
            Some(HandlerVariant::Ductless(controller)) => {
                assert_eq!(controller.room_temp, Some(23.5))
            }
            other => panic!("expected ductless handler, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unit_type_change_reattaches_handler() {
        let platform = platform(
            MockSession::new(vec![device("SN-001", Some("ductless"))]),
            MockHost::with_registered([identity::resolve("SN-001")]),
        );
        platform
            .configure_accessory(cached("SN-001", Some("generic")))
            .await;

        let report = platform.reconcile().await.unwrap();

        assert_eq!(report.restored, vec![identity::resolve("SN-001")]);
        assert!(report.created.is_empty());
        assert_eq!(platform.host().update_calls(), 1);
        assert_eq!(platform.host().register_calls(), 0);
        assert_eq!(
            platform.host().calls(),
            vec![HostCall::Update {
                identities: vec![identity::resolve("SN-001")]
            }]
        );

        let record = find(&platform, "SN-001").await.unwrap();
        assert_eq!(
            record.handler.map(|h| h.unit_type()),
            Some(UnitType::Ductless)
        );
    }

    #[tokio::test]
    async fn test_handler_fallback() {
        let platform = platform(
            MockSession::new(vec![
                device("SN-D", Some("ductless")),
                device("SN-H", Some("heatpump")),
                device("SN-N", None),
            ]),
            MockHost::new(),
        );
        platform.reconcile().await.unwrap();

        let unit_type = |record: Option<AccessoryRecord>| {
            record.and_then(|r| r.handler).map(|h| h.unit_type())
        };
        assert_eq!(
            unit_type(find(&platform, "SN-D").await),
            Some(UnitType::Ductless)
        );
        assert_eq!(
            unit_type(find(&platform, "SN-H").await),
            Some(UnitType::Generic)
        );
        assert_eq!(
            unit_type(find(&platform, "SN-N").await),
            Some(UnitType::Generic)
        );
    }

    #[tokio::test]
    async fn test_authentication_failure_aborts_pass() {
        let mut session = MockSession::new(vec![device("SN-001", Some("ductless"))]);
        session.authenticate = false;
        let platform = platform(session, MockHost::new());
        platform
            .configure_accessory(cached("SN-002", Some("central")))
            .await;

        let err = platform.reconcile().await.unwrap_err();
        assert!(matches!(err, PassError::Authentication));
        assert!(platform.host().calls().is_empty());

        let accessories = platform.accessories().await;
        assert_eq!(accessories.len(), 1);
        assert_eq!(accessories[0].context.zone_table, zone_table(Some("central")));
        assert!(accessories[0].handler.is_none());
    }

    #[tokio::test]
    async fn test_directory_failure_aborts_pass() {
        let mut session = MockSession::new(vec![device("SN-001", Some("ductless"))]);
        session.fail_directory = true;
        let platform = platform(session, MockHost::new());
        platform
            .configure_accessory(cached("SN-001", Some("central")))
            .await;

        let err = platform.reconcile().await.unwrap_err();
        assert!(matches!(err, PassError::DirectoryFetch(_)));
        assert!(platform.host().calls().is_empty());

        let record = find(&platform, "SN-001").await.unwrap();
        assert_eq!(record.context.zone_table, zone_table(Some("central")));
        assert!(record.handler.is_none());
    }

    #[tokio::test]
    async fn test_login_timeout_aborts_pass() {
        let mut session = MockSession::new(vec![device("SN-001", None)]);
        session.delay = Some(Duration::from_secs(30));
        let platform = Platform::new(
            session,
            MockHost::new(),
            PlatformConfig::default(),
            Duration::from_millis(20),
        );

        let err = platform.reconcile().await.unwrap_err();
        assert!(matches!(
            err,
            PassError::Timeout {
                stage: Stage::Login,
                ..
            }
        ));
        assert!(platform.host().calls().is_empty());
    }

    #[tokio::test]
    async fn test_directory_timeout_aborts_pass() {
        let mut session = MockSession::new(vec![device("SN-001", Some("ductless"))]);
        session.directory_delay = Some(Duration::from_secs(30));
        let platform = Platform::new(
            session,
            MockHost::new(),
            PlatformConfig::default(),
            Duration::from_millis(20),
        );
        platform
            .configure_accessory(cached("SN-001", Some("central")))
            .await;

        let err = platform.reconcile().await.unwrap_err();
        assert!(matches!(
            err,
            PassError::Timeout {
                stage: Stage::DirectoryFetch,
                ..
            }
        ));
        assert_eq!(platform.session().logins(), 1);
        assert!(platform.host().calls().is_empty());

        let accessories = platform.accessories().await;
        assert_eq!(accessories.len(), 1);
        assert_eq!(accessories[0].context.zone_table, zone_table(Some("central")));
        assert!(accessories[0].handler.is_none());
    }

    #[tokio::test]
    async fn test_registration_failure_is_isolated() {
        let session = MockSession::new(vec![
            device("SN-001", None),
            device("SN-002", None),
            device("SN-003", Some("ductless")),
        ]);
        let host = MockHost::rejecting(&["SN-002"]);
        let platform = platform(session, host);

        let report = platform.reconcile().await.unwrap();
        assert_eq!(
            report.created,
            vec![identity::resolve("SN-001"), identity::resolve("SN-003")]
        );
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].serial, "SN-002");
        assert!(matches!(report.failed[0].error, HostError::Rejected(_)));

        assert!(find(&platform, "SN-002").await.is_none());
        assert_eq!(platform.accessories().await.len(), 2);
    }

    #[tokio::test]
    async fn test_update_failure_still_attaches_handler() {
        let session = MockSession::new(vec![
            device("SN-001", Some("ductless")),
            device("SN-002", None),
        ]);
        let host = MockHost::rejecting(&["SN-001"]);
        let platform = platform(session, host);
        platform.configure_accessory(cached("SN-001", None)).await;

        let report = platform.reconcile().await.unwrap();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.created, vec![identity::resolve("SN-002")]);

        let record = find(&platform, "SN-001").await.unwrap();
        assert_eq!(record.context.zone_table.unit_type(), Some("ductless"));
        assert!(matches!(record.handler, Some(HandlerVariant::Ductless(_))));
    }

    #[tokio::test]
    async fn test_duplicate_identity_rejected_by_host() {
        // The host knows SN-001 but never replayed it, so the platform tries
        // to create it and the host refuses.
        let platform = platform(
            MockSession::new(vec![device("SN-001", None)]),
            MockHost::with_registered([identity::resolve("SN-001")]),
        );

        let report = platform.reconcile().await.unwrap();
        assert!(report.created.is_empty());
        assert!(matches!(
            report.failed[0].error,
            HostError::DuplicateIdentity(id) if id == identity::resolve("SN-001")
        ));
    }

    #[tokio::test]
    async fn test_concurrent_pass_rejected() {
        let platform = platform(MockSession::new(vec![]), MockHost::new());

        let _guard = platform.cache.try_lock().unwrap();
        let err = platform.reconcile().await.unwrap_err();
        assert!(matches!(err, PassError::PassInProgress));
        assert_eq!(platform.session().logins(), 0);
    }

    #[tokio::test]
    async fn test_stale_accessories_kept_by_default() {
        let platform = platform(
            MockSession::new(vec![device("SN-001", None)]),
            MockHost::with_registered([identity::resolve("SN-001"), identity::resolve("SN-OLD")]),
        );
        platform.configure_accessory(cached("SN-001", None)).await;
        platform.configure_accessory(cached("SN-OLD", None)).await;

        let report = platform.reconcile().await.unwrap();
        assert_eq!(report.stale, vec![identity::resolve("SN-OLD")]);
        assert!(report.removed.is_empty());
        assert_eq!(platform.accessories().await.len(), 2);
        assert!(!platform
            .host()
            .calls()
            .iter()
            .any(|c| matches!(c, HostCall::Unregister { .. })));
    }

    #[tokio::test]
    async fn test_stale_cleanup_when_enabled() {
        let platform = stale_platform(
            MockSession::new(vec![device("SN-001", None)]),
            MockHost::with_registered([identity::resolve("SN-001"), identity::resolve("SN-OLD")]),
        );
        platform.configure_accessory(cached("SN-001", None)).await;
        platform.configure_accessory(cached("SN-OLD", None)).await;

        let report = platform.reconcile().await.unwrap();
        assert_eq!(report.removed, vec![identity::resolve("SN-OLD")]);
        assert!(find(&platform, "SN-OLD").await.is_none());
        assert!(platform.host().calls().contains(&HostCall::Unregister {
            identities: vec![identity::resolve("SN-OLD")]
        }));
    }

    #[tokio::test]
    async fn test_stale_cleanup_failure_keeps_accessory() {
        let platform = stale_platform(
            MockSession::new(vec![device("SN-001", None), device("SN-002", Some("ductless"))]),
            MockHost::rejecting(&["SN-OLD"]),
        );
        platform.configure_accessory(cached("SN-001", None)).await;
        platform.configure_accessory(cached("SN-OLD", None)).await;

        let report = platform.reconcile().await.unwrap();
        assert_eq!(report.restored, vec![identity::resolve("SN-001")]);
        assert_eq!(report.created, vec![identity::resolve("SN-002")]);
        assert!(report.failed.is_empty());
        assert_eq!(report.stale, vec![identity::resolve("SN-OLD")]);
        assert!(report.removed.is_empty());

        assert!(platform.host().calls().contains(&HostCall::Unregister {
            identities: vec![identity::resolve("SN-OLD")]
        }));
        assert!(find(&platform, "SN-OLD").await.is_some());
        assert_eq!(platform.accessories().await.len(), 3);
    }

    #[tokio::test]
    async fn test_stale_cleanup_skipped_for_empty_directory() {
        let platform = stale_platform(MockSession::new(vec![]), MockHost::new());
        platform.configure_accessory(cached("SN-001", None)).await;

        let report = platform.reconcile().await.unwrap();
        assert_eq!(report.stale, vec![identity::resolve("SN-001")]);
        assert!(report.removed.is_empty());
        assert_eq!(platform.accessories().await.len(), 1);
    }

    #[tokio::test]
    async fn test_run_handles_host_lifecycle() {
        let platform = platform(
            MockSession::new(vec![
                device("SN-001", Some("ductless")),
                device("SN-002", None),
            ]),
            MockHost::with_registered([identity::resolve("SN-001")]),
        );

        let (tx, rx) = mpsc::channel(16);
        tx.send(HostEvent::ConfigureAccessory(cached("SN-001", None)))
            .await
            .unwrap();
        tx.send(HostEvent::DidFinishLaunching).await.unwrap();
        tx.send(HostEvent::DidFinishLaunching).await.unwrap();
        // Too late: the cache is sealed once the first pass has run
        tx.send(HostEvent::ConfigureAccessory(cached("SN-LATE", None)))
            .await
            .unwrap();
        drop(tx);

        platform.run(rx).await;

        assert_eq!(platform.session().logins(), 1);
        assert_eq!(platform.host().register_calls(), 1);
        assert_eq!(platform.host().update_calls(), 1);

        let accessories = platform.accessories().await;
        assert_eq!(accessories.len(), 2);
        assert!(accessories.iter().all(|r| r.handler.is_some()));
        assert!(find(&platform, "SN-LATE").await.is_none());
    }
}
