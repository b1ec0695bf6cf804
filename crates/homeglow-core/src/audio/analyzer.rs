//! FFT band analysis and beat detection.
//!
//! One 1024-sample mono window in, one [`AnalysisFrame`] out. Band energies
//! are mean magnitudes over fixed bin ranges of the 1024-point FFT
//! (~43 Hz per bin at 44 100 Hz); the beat flag compares instantaneous bass
//! against a rolling baseline of the last 40 windows.

use std::collections::VecDeque;
use std::sync::Arc;

use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use tracing::trace;

use super::WINDOW_FRAMES;

/// Band bin ranges, half-open, for the 1024-point FFT.
const BASS_BINS: (usize, usize) = (1, 6); // ~43-258 Hz
const MID_BINS: (usize, usize) = (6, 93); // ~258-4000 Hz
const TREBLE_BINS: (usize, usize) = (93, 372); // ~4000-16000 Hz

/// Bass must exceed the rolling mean by this factor to flag a beat.
const BEAT_THRESHOLD: f32 = 1.4;

/// Rolling bass window (~1.3 s at the 30 Hz analysis rate).
const BASS_HISTORY_LEN: usize = 40;

/// Minimum baseline length before beats are trusted.
const BEAT_WARMUP: usize = 5;

/// Analysis of one PCM window.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalysisFrame {
    /// Mean magnitude over ~43-258 Hz.
    pub bass: f32,
    /// Mean magnitude over ~258-4000 Hz.
    pub mid: f32,
    /// Mean magnitude over ~4000-16000 Hz.
    pub treble: f32,
    /// Root-mean-square of the normalized mono window.
    pub rms: f32,
    /// Bass transient detected this window.
    pub beat: bool,
}

/// Windowed spectral analyzer carrying the rolling bass baseline.
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    fft_buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    bass_history: VecDeque<f32>,
    frames_analyzed: u64,
}

impl SpectrumAnalyzer {
    /// Create an analyzer for the fixed 1024-sample window.
    pub fn new() -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(WINDOW_FRAMES);
        let scratch_len = fft.get_inplace_scratch_len();
        Self {
            fft,
            fft_buffer: vec![Complex::new(0.0, 0.0); WINDOW_FRAMES],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            bass_history: VecDeque::with_capacity(BASS_HISTORY_LEN),
            frames_analyzed: 0,
        }
    }

    /// Analyze one mono window and update the bass baseline.
    ///
    /// `mono` must hold exactly [`WINDOW_FRAMES`] normalized samples.
    pub fn analyze(&mut self, mono: &[f32]) -> AnalysisFrame {
        debug_assert_eq!(mono.len(), WINDOW_FRAMES);

        let rms = (mono.iter().map(|s| s * s).sum::<f32>() / mono.len() as f32).sqrt();

        for (slot, &sample) in self.fft_buffer.iter_mut().zip(mono) {
            *slot = Complex::new(sample, 0.0);
        }
        self.fft
            .process_with_scratch(&mut self.fft_buffer, &mut self.scratch);

        // Magnitudes of the positive-frequency half, M[0..N/2].
        let half = WINDOW_FRAMES / 2;
        let magnitudes: Vec<f32> = self.fft_buffer[..half].iter().map(|c| c.norm()).collect();

        let bass = band_mean(&magnitudes, BASS_BINS);
        let mid = band_mean(&magnitudes, MID_BINS);
        let treble = band_mean(&magnitudes, TREBLE_BINS);

        self.bass_history.push_back(bass);
        if self.bass_history.len() > BASS_HISTORY_LEN {
            self.bass_history.pop_front();
        }
        let baseline =
            self.bass_history.iter().sum::<f32>() / self.bass_history.len() as f32;
        let beat = self.bass_history.len() >= BEAT_WARMUP && bass > BEAT_THRESHOLD * baseline;

        self.frames_analyzed += 1;
        if self.frames_analyzed % 300 == 0 {
            trace!(
                "frame #{}: bass={bass:.4} mid={mid:.4} treble={treble:.4} rms={rms:.4}",
                self.frames_analyzed
            );
        }

        AnalysisFrame {
            bass,
            mid,
            treble,
            rms,
            beat,
        }
    }

    /// Number of baseline entries currently held (at most 40).
    pub fn baseline_len(&self) -> usize {
        self.bass_history.len()
    }

    /// Clear the bass baseline, e.g. on a mode change.
    pub fn reset(&mut self) {
        self.bass_history.clear();
    }
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Mean magnitude over the half-open bin range `[lo, hi)`, clamped to the
/// available spectrum. Out-of-range bands are zero.
fn band_mean(magnitudes: &[f32], (lo, hi): (usize, usize)) -> f32 {
    let hi = hi.min(magnitudes.len());
    if lo >= hi {
        return 0.0;
    }
    magnitudes[lo..hi].iter().sum::<f32>() / (hi - lo) as f32
}

#[cfg(test)]
mod tests {
    use super::super::SAMPLE_RATE;
    use super::*;

    fn sine_window(freq: f32, amplitude: f32) -> Vec<f32> {
        (0..WINDOW_FRAMES)
            .map(|i| {
                (2.0 * std::f32::consts::PI * freq * i as f32 / SAMPLE_RATE as f32).sin()
                    * amplitude
            })
            .collect()
    }

    #[test]
    fn silence_produces_empty_frame() {
        let mut analyzer = SpectrumAnalyzer::new();
        let frame = analyzer.analyze(&vec![0.0; WINDOW_FRAMES]);
        assert_eq!(frame.rms, 0.0);
        assert_eq!(frame.bass, 0.0);
        assert_eq!(frame.mid, 0.0);
        assert_eq!(frame.treble, 0.0);
        assert!(!frame.beat);
    }

    #[test]
    fn bass_band_dominates_for_100hz() {
        let mut analyzer = SpectrumAnalyzer::new();
        let frame = analyzer.analyze(&sine_window(100.0, 0.9));
        assert!(
            frame.bass > frame.mid * 2.0 && frame.bass > frame.treble * 2.0,
            "bass={} mid={} treble={}",
            frame.bass,
            frame.mid,
            frame.treble
        );
    }

    #[test]
    fn treble_band_dominates_for_8khz() {
        let mut analyzer = SpectrumAnalyzer::new();
        let frame = analyzer.analyze(&sine_window(8000.0, 0.9));
        assert!(
            frame.treble > frame.bass && frame.treble > frame.mid,
            "bass={} mid={} treble={}",
            frame.bass,
            frame.mid,
            frame.treble
        );
    }

    #[test]
    fn rms_of_dc_window() {
        let mut analyzer = SpectrumAnalyzer::new();
        let frame = analyzer.analyze(&vec![0.5; WINDOW_FRAMES]);
        assert!((frame.rms - 0.5).abs() < 1e-5);
    }

    #[test]
    fn beat_fires_once_baseline_is_warm() {
        let mut analyzer = SpectrumAnalyzer::new();
        let silence = vec![0.0; WINDOW_FRAMES];
        let kick = sine_window(100.0, 0.9);

        for _ in 0..4 {
            assert!(!analyzer.analyze(&silence).beat);
        }
        // Fifth window satisfies the minimum baseline length, and the kick
        // towers over a near-zero mean.
        assert!(analyzer.analyze(&kick).beat);
    }

    #[test]
    fn no_beat_during_warmup() {
        let mut analyzer = SpectrumAnalyzer::new();
        let silence = vec![0.0; WINDOW_FRAMES];
        let kick = sine_window(100.0, 0.9);

        for _ in 0..3 {
            analyzer.analyze(&silence);
        }
        // Fourth window: bass exceeds the threshold but the baseline is
        // still too short to trust.
        assert!(!analyzer.analyze(&kick).beat);
    }

    #[test]
    fn steady_bass_is_not_a_beat() {
        let mut analyzer = SpectrumAnalyzer::new();
        let tone = sine_window(100.0, 0.5);
        let mut beats = 0;
        for _ in 0..30 {
            if analyzer.analyze(&tone).beat {
                beats += 1;
            }
        }
        // A constant tone tracks its own baseline and never exceeds 1.4x it
        // after warm-up; only the warm-up edge could have fired.
        assert_eq!(beats, 0, "constant tone flagged {beats} beats");
    }

    #[test]
    fn baseline_is_capped_at_forty() {
        let mut analyzer = SpectrumAnalyzer::new();
        let tone = sine_window(100.0, 0.5);
        for _ in 0..50 {
            analyzer.analyze(&tone);
        }
        assert_eq!(analyzer.baseline_len(), 40);
    }

    #[test]
    fn reset_clears_baseline() {
        let mut analyzer = SpectrumAnalyzer::new();
        analyzer.analyze(&sine_window(100.0, 0.5));
        assert_eq!(analyzer.baseline_len(), 1);
        analyzer.reset();
        assert_eq!(analyzer.baseline_len(), 0);
    }

    #[test]
    fn band_mean_clamps_out_of_range() {
        let mags = vec![1.0; 10];
        assert_eq!(band_mean(&mags, (2, 20)), 1.0);
        assert_eq!(band_mean(&mags, (10, 20)), 0.0);
        assert_eq!(band_mean(&mags, (15, 20)), 0.0);
    }
}
