//! Audio-reactive light show engine.
//!
//! A single worker thread turns analysis frames (or a wall-clock pattern
//! when no audio is flowing) into throttled color/brightness datagrams for
//! up to two lamps.

pub mod engine;
pub mod modes;

use std::time::Duration;

pub use engine::{EngineStatus, ShowEngine};
pub use modes::{LampTarget, ShowMode};

/// Target analysis rate: ~33 ms per iteration.
pub(crate) const LOOP_PERIOD: Duration = Duration::from_micros(33_333);

/// Per-lamp minimum interval between command pairs (20 cmd/s cap).
pub(crate) const MIN_CMD_INTERVAL: Duration = Duration::from_millis(50);

/// Reset color emitted when a show stops.
pub(crate) const WARM_WHITE: (u8, u8, u8) = (255, 180, 100);

/// Reset brightness emitted when a show stops.
pub(crate) const WARM_WHITE_BRIGHTNESS: u8 = 50;

/// How long `stop` waits for the worker to wind down.
pub(crate) const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(2);
