//! Wire format of the LAN lamp protocol: UTF-8 JSON in UDP datagrams,
//! framed only by the datagram boundary.

use std::net::Ipv4Addr;

use serde::Deserialize;
use serde_json::json;
use tracing::warn;

/// One device reported by a discovery scan.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScanDevice {
    /// Opaque device identity.
    #[serde(rename = "device")]
    pub device_id: String,
    /// Reachable LAN address.
    pub ip: Ipv4Addr,
    /// Opaque model code. Some firmware omits it.
    #[serde(default)]
    pub sku: String,
}

/// RGB triple as it appears in status replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Rgb {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

/// Parsed `devStatus` reply. Firmware variants omit fields; a missing
/// field stays `None` ("unknown"), never zero.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LampStatus {
    /// 1 = on, 0 = off.
    #[serde(rename = "onOff")]
    pub on_off: Option<u8>,
    /// Brightness 1..=100.
    pub brightness: Option<u8>,
    /// Current color.
    pub color: Option<Rgb>,
    /// Color temperature in Kelvin; 0 when a color is active.
    #[serde(rename = "colorTemInKelvin")]
    pub color_temp_kelvin: Option<u32>,
}

#[derive(Deserialize)]
struct Reply<T> {
    msg: ReplyMsg<T>,
}

#[derive(Deserialize)]
struct ReplyMsg<T> {
    #[serde(default)]
    cmd: Option<String>,
    data: T,
}

/// Discovery request datagram.
pub fn scan_request() -> Vec<u8> {
    encode(json!({
        "msg": {
            "cmd": "scan",
            "data": { "account_topic": "reserve" },
        }
    }))
}

/// Power command datagram.
pub fn turn_command(on: bool) -> Vec<u8> {
    encode(json!({
        "msg": {
            "cmd": "turn",
            "data": { "value": if on { 1 } else { 0 } },
        }
    }))
}

/// Brightness command datagram. `value` must already be in 1..=100.
pub fn brightness_command(value: u8) -> Vec<u8> {
    encode(json!({
        "msg": {
            "cmd": "brightness",
            "data": { "value": value },
        }
    }))
}

/// RGB color command datagram. A zero Kelvin field selects color mode.
pub fn color_command(r: u8, g: u8, b: u8) -> Vec<u8> {
    encode(json!({
        "msg": {
            "cmd": "colorwc",
            "data": {
                "color": { "r": r, "g": g, "b": b },
                "colorTemInKelvin": 0,
            },
        }
    }))
}

/// Color temperature command datagram. `kelvin` must already be in
/// 2000..=9000.
pub fn color_temp_command(kelvin: u16) -> Vec<u8> {
    encode(json!({
        "msg": {
            "cmd": "colorwc",
            "data": {
                "color": { "r": 0, "g": 0, "b": 0 },
                "colorTemInKelvin": kelvin,
            },
        }
    }))
}

/// Status query datagram.
pub fn status_query() -> Vec<u8> {
    encode(json!({
        "msg": {
            "cmd": "devStatus",
            "data": {},
        }
    }))
}

/// Parse a scan response payload into a device record, or `None`.
pub fn parse_scan_response(data: &[u8]) -> Option<ScanDevice> {
    match serde_json::from_slice::<Reply<ScanDevice>>(data) {
        Ok(reply) => match reply.msg.cmd.as_deref() {
            None | Some("scan") => Some(reply.msg.data),
            Some(other) => {
                warn!("unexpected cmd '{other}' in scan response");
                None
            }
        },
        Err(e) => {
            warn!("failed to parse scan response: {e}");
            None
        }
    }
}

/// Parse a `devStatus` reply, or `None` when the payload is malformed.
pub fn parse_status_response(data: &[u8]) -> Option<LampStatus> {
    match serde_json::from_slice::<Reply<LampStatus>>(data) {
        Ok(reply) => Some(reply.msg.data),
        Err(e) => {
            warn!("failed to parse status response: {e}");
            None
        }
    }
}

fn encode(value: serde_json::Value) -> Vec<u8> {
    // json! values of this shape cannot fail to serialize.
    serde_json::to_vec(&value).unwrap_or_default()
}
