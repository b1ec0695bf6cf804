//! HomeGlow Core - Audio Analysis and Domain Model
//!
//! This crate contains the audio-facing half of HomeGlow:
//! - PCM window source reading the Spotify-Connect receiver's named pipe
//! - FFT band analysis and beat detection
//! - HSV color math shared by the show modes
//! - Logging configuration
//!
//! No network code lives here; lamp control is in `homeglow-control`.

#![warn(missing_docs)]

use thiserror::Error;

pub mod audio;
pub mod color;
pub mod logging;

pub use audio::analyzer::{AnalysisFrame, SpectrumAnalyzer};
pub use audio::source::{PcmWindow, PipeSource, WindowRead};
pub use color::hsv_to_rgb;
pub use logging::LogConfig;

/// Core error types
#[derive(Error, Debug)]
pub enum CoreError {
    /// Audio source failure that cannot be masked as silence
    #[error("audio source error: {0}")]
    Audio(String),

    /// Standard IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
