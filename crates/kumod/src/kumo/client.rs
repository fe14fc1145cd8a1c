use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::KumoError;
use super::KumoSession;
use crate::accessory::RemoteDevice;
use crate::accessory::ZoneTable;
use crate::config::KumoConfig;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
    app_version: &'a str,
}

/// State obtained from a successful login
struct Session {
    devices: Vec<RemoteDevice>,
}

/// Kumo Cloud client
///
/// A single login call returns both the security token and the account's
/// device tree, so the directory is served from the last successful login.
pub struct KumoApi {
    http: reqwest::Client,
    login_url: String,
    username: String,
    password: String,
    app_version: String,
    session: Mutex<Option<Session>>,
}

impl KumoApi {
    pub fn new(config: &KumoConfig) -> Result<Self, KumoError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            login_url: format!("{}/login", config.base_url.trim_end_matches('/')),
            username: config.username.clone(),
            password: config.password.clone(),
            app_version: config.app_version.clone(),
            session: Mutex::new(None),
        })
    }

    async fn login(&self) -> Result<Session, KumoError> {
        debug!("Logging in to Kumo Cloud at {}", self.login_url);

        let response = self
            .http
            .post(&self.login_url)
            .json(&LoginRequest {
                username: &self.username,
                password: &self.password,
                app_version: &self.app_version,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(KumoError::Status(response.status()));
        }

        let body: Value = response.json().await?;
        parse_login_response(&body)
    }
}

#[async_trait]
impl KumoSession for KumoApi {
    async fn acquire_security_token(&self) -> bool {
        match self.login().await {
            Ok(session) => {
                info!(
                    "Logged in to Kumo Cloud as {} ({} devices)",
                    self.username,
                    session.devices.len()
                );
                *self.session.lock().await = Some(session);
                true
            }
            Err(e) => {
                warn!("Kumo Cloud login failed: {}", e);
                false
            }
        }
    }

    async fn devices(&self) -> Result<Vec<RemoteDevice>, KumoError> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|s| s.devices.clone())
            .ok_or(KumoError::NotLoggedIn)
    }
}

/// Parse the login response.
///
/// The body is an array: element 0 carries the `token`, element 2 is the
/// account's device tree. Every node of the tree may hold a `zoneTable` keyed
/// by serial and nested `children`.
fn parse_login_response(body: &Value) -> Result<Session, KumoError> {
    // A login without a token did not succeed, whatever the status code
    body.get(0)
        .and_then(|v| v.get("token"))
        .and_then(Value::as_str)
        .ok_or(KumoError::MissingField("token"))?;

    let tree = body.get(2).ok_or(KumoError::MissingField("device tree"))?;

    let mut devices = Vec::new();
    collect_devices(tree, &mut devices);

    Ok(Session { devices })
}

fn collect_devices(node: &Value, devices: &mut Vec<RemoteDevice>) {
    if let Some(Value::Object(zones)) = node.get("zoneTable") {
        for (serial, entry) in zones {
            if devices.iter().any(|d| &d.serial == serial) {
                warn!("Device {} appears twice in the device tree, ignoring repeat", serial);
                continue;
            }

            let Some(zone_table) = ZoneTable::from_value(entry.clone()) else {
                warn!("Zone table for {} is not an object, skipping", serial);
                continue;
            };

            let label = entry
                .get("label")
                .and_then(Value::as_str)
                .unwrap_or(serial)
                .to_string();

            devices.push(RemoteDevice {
                serial: serial.clone(),
                label,
                zone_table,
            });
        }
    }

    if let Some(Value::Array(children)) = node.get("children") {
        for child in children {
            collect_devices(child, devices);
        }
    }
}
