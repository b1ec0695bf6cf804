//! Error types for the control system
use thiserror::Error;

/// Control system errors
#[derive(Error, Debug)]
pub enum ControlError {
    /// `start` resolved no lamp addresses; the engine stays idle
    #[error("no lamps resolved from {0} device id(s)")]
    NoLamps(usize),

    /// Mode string not recognized
    #[error("unknown show mode '{0}'")]
    BadMode(String),

    /// Socket bind/open failure during discovery
    #[error("transport error: {0}")]
    Transport(String),

    /// Audio source missing or unreadable; masked into pattern-only mode
    #[error("audio source unavailable: {0}")]
    AudioUnavailable(String),

    /// Datagram emission failed; logged by callers, never fatal
    #[error("datagram send failed: {0}")]
    SendDropped(String),

    /// Configuration value outside its documented range
    #[error("{name} out of range: {value} (allowed {lo}..={hi})")]
    ConfigOutOfRange {
        /// Name of the offending field
        name: &'static str,
        /// Value that was supplied
        value: i64,
        /// Lower bound, inclusive
        lo: i64,
        /// Upper bound, inclusive
        hi: i64,
    },

    /// Cloud API failure
    #[error("cloud API error: {0}")]
    Cloud(String),

    /// Standard IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/Deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for control operations
pub type Result<T> = std::result::Result<T, ControlError>;
