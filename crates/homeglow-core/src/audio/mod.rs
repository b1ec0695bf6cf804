//! Audio input and analysis.
//!
//! The pipeline is `FIFO bytes -> PipeSource window -> SpectrumAnalyzer
//! frame`. The source never blocks and never buffers across calls; the
//! analyzer is pure apart from the rolling bass baseline it carries.

pub mod analyzer;
pub mod source;

/// PCM sample rate produced by the receiver.
pub const SAMPLE_RATE: u32 = 44_100;

/// Interleaved channel count of the PCM stream.
pub const CHANNELS: usize = 2;

/// Stereo frames per analysis window (~23 ms of audio).
pub const WINDOW_FRAMES: usize = 1024;

/// Bytes per analysis window (s16le, stereo).
pub const WINDOW_BYTES: usize = WINDOW_FRAMES * CHANNELS * 2;
