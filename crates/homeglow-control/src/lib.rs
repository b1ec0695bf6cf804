//! HomeGlow Control - Lamp Control and the Audio-Reactive Show Engine
//!
//! This crate provides device control for HomeGlow:
//! - **LAN**: UDP multicast discovery plus fire-and-forget control
//!   datagrams for RGB lamps on the local network
//! - **Cloud**: REST fallback for operations the LAN protocol lacks
//! - **Show**: a 30 Hz worker translating PCM analysis frames (from
//!   `homeglow-core`) into throttled color/brightness commands
//!
//! ## Modules
//!
//! - [`lan`] - LAN transport, device cache, wire protocol
//! - [`cloud`] - cloud API client
//! - [`show`] - show engine, mode policies
//! - [`error`] - error types

#![allow(missing_docs)]

/// Cloud API fallback client
pub mod cloud;
/// Error types
pub mod error;
/// LAN lamp protocol and transport
pub mod lan;
/// Light show engine
pub mod show;

// Re-exports
pub use cloud::{CloudClient, CloudDevice};
pub use error::{ControlError, Result};
pub use lan::{LampControl, LampStatus, LanConfig, LanTransport, ScanDevice};
pub use show::{EngineStatus, ShowEngine, ShowMode};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_round_trips_through_serde() {
        let json = serde_json::to_string(&ShowMode::Ambient).unwrap();
        assert_eq!(json, "\"ambient\"");
        let mode: ShowMode = serde_json::from_str(&json).unwrap();
        assert_eq!(mode, ShowMode::Ambient);
    }

    #[test]
    fn errors_render_their_context() {
        let err = ControlError::NoLamps(2);
        assert!(err.to_string().contains("2 device id(s)"));

        let err = ControlError::ConfigOutOfRange {
            name: "latency_ms",
            value: 900,
            lo: -500,
            hi: 500,
        };
        assert!(err.to_string().contains("latency_ms"));
        assert!(err.to_string().contains("900"));
    }
}
