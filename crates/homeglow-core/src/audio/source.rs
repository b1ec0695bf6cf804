//! Non-blocking PCM window source over the receiver's named pipe.
//!
//! The receiver writes little-endian signed 16-bit interleaved stereo at
//! 44 100 Hz. We read in exact window-sized units; a short read is
//! discarded rather than padded so the spectrum is never computed over a
//! torn window.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::WINDOW_BYTES;
use crate::CoreError;

/// Result of a single window read attempt.
#[derive(Debug)]
pub enum WindowRead {
    /// A full window of interleaved stereo samples.
    Window(PcmWindow),
    /// Less than one window is available right now; the caller should fall
    /// back to its time-based pattern for this iteration.
    Silent,
    /// The write end is gone; the source is unusable.
    Closed,
}

/// One window of interleaved stereo s16le samples (4096 bytes).
pub struct PcmWindow {
    bytes: [u8; WINDOW_BYTES],
}

impl PcmWindow {
    /// Downmix to mono and normalize to `[-1, 1]`.
    ///
    /// Adjacent samples are paired as left/right and averaged, then divided
    /// by 32 768.
    pub fn to_mono(&self) -> Vec<f32> {
        self.bytes
            .chunks_exact(4)
            .map(|frame| {
                let left = i16::from_le_bytes([frame[0], frame[1]]) as f32;
                let right = i16::from_le_bytes([frame[2], frame[3]]) as f32;
                (left + right) / 2.0 / 32_768.0
            })
            .collect()
    }
}

impl std::fmt::Debug for PcmWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PcmWindow")
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Pull-based PCM source over a named pipe, opened non-blocking.
///
/// Each [`read_window`](Self::read_window) call reads independently; no
/// bytes are carried over between calls.
pub struct PipeSource {
    path: PathBuf,
    file: File,
}

impl PipeSource {
    /// Open the pipe read-only with `O_NONBLOCK`.
    ///
    /// Succeeds even when no writer has attached yet; in that state reads
    /// report [`WindowRead::Closed`].
    pub fn open(path: &Path) -> crate::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => {
                    CoreError::Audio(format!("no pipe at {}", path.display()))
                }
                _ => CoreError::Io(e),
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Path the source was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Attempt to read exactly one window.
    ///
    /// A partial read is discarded and reported as [`WindowRead::Silent`];
    /// transient read errors are also treated as silence so a hiccup does
    /// not tear the source down.
    pub fn read_window(&mut self) -> WindowRead {
        let mut bytes = [0u8; WINDOW_BYTES];
        match self.file.read(&mut bytes) {
            Ok(0) => WindowRead::Closed,
            Ok(n) if n == WINDOW_BYTES => WindowRead::Window(PcmWindow { bytes }),
            Ok(n) => {
                debug!("short pipe read ({n} of {WINDOW_BYTES} bytes), discarding");
                WindowRead::Silent
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => WindowRead::Silent,
            Err(e) => {
                debug!("pipe read error, treating as silence: {e}");
                WindowRead::Silent
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicU32, Ordering};

    static TEST_FILE_SEQ: AtomicU32 = AtomicU32::new(0);

    fn temp_source(contents: &[u8]) -> PipeSource {
        let path = std::env::temp_dir().join(format!(
            "homeglow-source-test-{}-{}",
            std::process::id(),
            TEST_FILE_SEQ.fetch_add(1, Ordering::SeqCst)
        ));
        let mut file = File::create(&path).unwrap();
        file.write_all(contents).unwrap();
        PipeSource::open(&path).unwrap()
    }

    #[test]
    fn mono_downmix_averages_channels() {
        // One stereo frame: left = 1000, right = 3000 -> mono 2000.
        let mut bytes = [0u8; WINDOW_BYTES];
        bytes[0..2].copy_from_slice(&1000i16.to_le_bytes());
        bytes[2..4].copy_from_slice(&3000i16.to_le_bytes());
        let window = PcmWindow { bytes };

        let mono = window.to_mono();
        assert_eq!(mono.len(), super::super::WINDOW_FRAMES);
        assert!((mono[0] - 2000.0 / 32_768.0).abs() < 1e-6);
        assert_eq!(mono[1], 0.0);
    }

    #[test]
    fn mono_normalization_is_full_scale() {
        let mut bytes = [0u8; WINDOW_BYTES];
        for frame in bytes.chunks_exact_mut(4) {
            frame[0..2].copy_from_slice(&i16::MIN.to_le_bytes());
            frame[2..4].copy_from_slice(&i16::MIN.to_le_bytes());
        }
        let window = PcmWindow { bytes };

        let mono = window.to_mono();
        assert!(mono.iter().all(|&s| (s + 1.0).abs() < 1e-6));
    }

    #[test]
    fn full_window_then_eof() {
        let mut source = temp_source(&[0u8; WINDOW_BYTES]);
        assert!(matches!(source.read_window(), WindowRead::Window(_)));
        // Regular file is exhausted -> behaves like a closed pipe.
        assert!(matches!(source.read_window(), WindowRead::Closed));
    }

    #[test]
    fn short_read_is_silent() {
        let mut source = temp_source(&[0u8; 100]);
        assert!(matches!(source.read_window(), WindowRead::Silent));
    }

    #[test]
    fn empty_source_is_closed() {
        let mut source = temp_source(&[]);
        assert!(matches!(source.read_window(), WindowRead::Closed));
    }

    #[test]
    fn missing_path_fails_to_open() {
        let path = std::env::temp_dir().join("homeglow-source-test-does-not-exist");
        assert!(PipeSource::open(&path).is_err());
    }
}
