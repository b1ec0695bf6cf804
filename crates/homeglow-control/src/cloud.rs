//! Cloud REST fallback for lamp operations the LAN protocol does not
//! implement (device listing with names, dynamic scenes), or for when the
//! LAN path is unavailable entirely.
//!
//! Everything here is request/response over HTTPS with the account API
//! key; nothing on the hot show path depends on it.

use std::sync::Mutex;

use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::error::{ControlError, Result};

const CLOUD_BASE: &str = "https://openapi.api.govee.com";

/// One device from the cloud device list.
#[derive(Debug, Clone, Deserialize)]
pub struct CloudDevice {
    /// Device identity, same namespace as LAN discovery.
    pub device: String,
    /// Model code.
    pub sku: String,
    /// User-visible name, when the account has one.
    #[serde(rename = "deviceName", default)]
    pub device_name: String,
}

#[derive(Deserialize)]
struct DeviceListResponse {
    #[serde(default)]
    data: Vec<CloudDevice>,
}

#[derive(Deserialize)]
struct PayloadResponse {
    #[serde(default)]
    payload: serde_json::Value,
}

/// Client for the cloud control API.
pub struct CloudClient {
    api_key: String,
    http: reqwest::blocking::Client,
    devices: Mutex<Option<Vec<CloudDevice>>>,
}

impl std::fmt::Debug for CloudClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudClient")
            .field("api_key", &"***REDACTED***")
            .finish()
    }
}

impl CloudClient {
    /// Build a client around an account API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| ControlError::Cloud(e.to_string()))?;
        Ok(Self {
            api_key: api_key.into(),
            http,
            devices: Mutex::new(None),
        })
    }

    /// List the account's devices, caching the result for SKU lookups.
    pub fn get_devices(&self) -> Result<Vec<CloudDevice>> {
        let response: DeviceListResponse = self
            .http
            .get(format!("{CLOUD_BASE}/router/api/v1/user/devices"))
            .header("Govee-API-Key", &self.api_key)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| ControlError::Cloud(e.to_string()))?
            .json()
            .map_err(|e| ControlError::Cloud(e.to_string()))?;

        debug!("cloud device list: {} device(s)", response.data.len());
        *self.lock_devices() = Some(response.data.clone());
        Ok(response.data)
    }

    /// Current state of a device, or `None` when the account does not know
    /// the id.
    pub fn get_device_state(&self, device_id: &str) -> Result<Option<serde_json::Value>> {
        let Some(device) = self.find_device(device_id)? else {
            return Ok(None);
        };
        let payload = self.post_payload(
            "/router/api/v1/device/state",
            json!({
                "requestId": Uuid::new_v4().to_string(),
                "payload": {
                    "sku": device.sku,
                    "device": device_id,
                },
            }),
        )?;
        Ok(Some(payload))
    }

    /// Send a control capability, e.g.
    /// `{"type": "devices.capabilities.on_off", "instance": "powerSwitch",
    /// "value": 1}`.
    pub fn control_device(
        &self,
        device_id: &str,
        capability: serde_json::Value,
    ) -> Result<Option<serde_json::Value>> {
        let Some(device) = self.find_device(device_id)? else {
            return Ok(None);
        };
        let payload = self.post_payload(
            "/router/api/v1/device/control",
            json!({
                "requestId": Uuid::new_v4().to_string(),
                "payload": {
                    "sku": device.sku,
                    "device": device_id,
                    "capability": capability,
                },
            }),
        )?;
        Ok(Some(payload))
    }

    /// List the dynamic scenes a device supports.
    pub fn get_scenes(&self, device_id: &str) -> Result<Option<serde_json::Value>> {
        let Some(device) = self.find_device(device_id)? else {
            return Ok(None);
        };
        let payload = self.post_payload(
            "/router/api/v1/device/scenes",
            json!({
                "requestId": Uuid::new_v4().to_string(),
                "payload": {
                    "sku": device.sku,
                    "device": device_id,
                },
            }),
        )?;
        Ok(Some(payload))
    }

    /// Power a device on or off through the cloud.
    pub fn turn(&self, device_id: &str, on: bool) -> Result<Option<serde_json::Value>> {
        self.control_device(
            device_id,
            json!({
                "type": "devices.capabilities.on_off",
                "instance": "powerSwitch",
                "value": if on { 1 } else { 0 },
            }),
        )
    }

    /// Set brightness through the cloud, clamped to 1..=100.
    pub fn set_brightness(&self, device_id: &str, value: u8) -> Result<Option<serde_json::Value>> {
        self.control_device(
            device_id,
            json!({
                "type": "devices.capabilities.range",
                "instance": "brightness",
                "value": value.clamp(1, 100),
            }),
        )
    }

    /// Set color through the cloud as a packed 24-bit RGB integer.
    pub fn set_color(
        &self,
        device_id: &str,
        r: u8,
        g: u8,
        b: u8,
    ) -> Result<Option<serde_json::Value>> {
        let rgb = ((r as u32) << 16) | ((g as u32) << 8) | b as u32;
        self.control_device(
            device_id,
            json!({
                "type": "devices.capabilities.color_setting",
                "instance": "colorRgb",
                "value": rgb,
            }),
        )
    }

    fn post_payload(&self, path: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        let response: PayloadResponse = self
            .http
            .post(format!("{CLOUD_BASE}{path}"))
            .header("Govee-API-Key", &self.api_key)
            .json(&body)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| ControlError::Cloud(e.to_string()))?
            .json()
            .map_err(|e| ControlError::Cloud(e.to_string()))?;
        Ok(response.payload)
    }

    fn find_device(&self, device_id: &str) -> Result<Option<CloudDevice>> {
        if self.lock_devices().is_none() {
            self.get_devices()?;
        }
        Ok(self
            .lock_devices()
            .as_ref()
            .and_then(|devices| devices.iter().find(|d| d.device == device_id).cloned()))
    }

    fn lock_devices(&self) -> std::sync::MutexGuard<'_, Option<Vec<CloudDevice>>> {
        self.devices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
