//! Mode policies: analysis frames (or wall-clock time) in, per-lamp
//! color/brightness targets out.
//!
//! The policies are pure apart from the phase state they advance, which
//! keeps them testable without sockets or threads. Lamp positions matter:
//! index 0 and 1 form a complementary pair in ambient and party modes.

use std::fmt;
use std::str::FromStr;

use homeglow_core::{hsv_to_rgb, AnalysisFrame};
use serde::{Deserialize, Serialize};

use crate::error::ControlError;

/// Visual mode of the show engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShowMode {
    /// No show running.
    #[default]
    Off,
    /// Beat-synced flashes with energy-driven color warmth.
    Pulse,
    /// Smooth complementary color rotation.
    Ambient,
    /// Alternating beat flashes with white strobe on energy spikes.
    Party,
}

impl FromStr for ShowMode {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "pulse" => Ok(Self::Pulse),
            "ambient" => Ok(Self::Ambient),
            "party" => Ok(Self::Party),
            other => Err(ControlError::BadMode(other.to_string())),
        }
    }
}

impl fmt::Display for ShowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => write!(f, "off"),
            Self::Pulse => write!(f, "pulse"),
            Self::Ambient => write!(f, "ambient"),
            Self::Party => write!(f, "party"),
        }
    }
}

/// Color/brightness target for one lamp position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LampTarget {
    /// RGB color to send.
    pub rgb: (u8, u8, u8),
    /// Brightness before the 1..=100 clamp at dispatch.
    pub brightness: u8,
}

/// Phase state the worker carries across iterations.
#[derive(Debug, Clone, Default)]
pub struct ModeState {
    /// Hue accumulator in `[0, 1)`.
    pub hue_phase: f32,
    /// Total beats observed, drives party-mode alternation.
    pub beat_count: u64,
}

impl ModeState {
    fn advance_hue(&mut self, delta: f32) {
        self.hue_phase = (self.hue_phase + delta).rem_euclid(1.0);
    }
}

fn brightness(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Targets for one analysis frame. Both lamp positions are driven every
/// iteration.
pub fn audio_targets(
    mode: ShowMode,
    state: &mut ModeState,
    frame: &AnalysisFrame,
    intensity: u8,
) -> [LampTarget; 2] {
    if frame.beat {
        state.beat_count += 1;
    }

    let scale = intensity as f32 / 10.0;
    let energy = (frame.rms * 5.0).min(1.0);

    match mode {
        ShowMode::Pulse => {
            let level = if frame.beat {
                state.advance_hue(0.08);
                100.0 * scale
            } else {
                state.advance_hue(0.002);
                (frame.rms * 500.0).clamp(20.0, 70.0) * scale
            };

            // High energy pulls toward reds/oranges, low energy toward
            // blues/purples.
            let base = if energy > 0.5 {
                energy * 0.1
            } else {
                0.6 + (1.0 - energy) * 0.15
            };
            let hue = (base + state.hue_phase * 0.3).rem_euclid(1.0);
            let rgb = hsv_to_rgb(hue, 0.7 + 0.3 * scale, 1.0);

            let target = LampTarget {
                rgb,
                brightness: brightness(level),
            };
            [target, target]
        }

        ShowMode::Ambient => {
            state.advance_hue(0.001 + energy * 0.005);
            let saturation = 0.4 + 0.3 * energy;
            let level = brightness((30.0 + 50.0 * energy) * scale);

            let a = LampTarget {
                rgb: hsv_to_rgb(state.hue_phase, saturation, 1.0),
                brightness: level,
            };
            let b = LampTarget {
                rgb: hsv_to_rgb(state.hue_phase + 0.5, saturation, 1.0),
                brightness: level,
            };
            [a, b]
        }

        ShowMode::Party => {
            if frame.beat {
                state.advance_hue(0.15);
                let bright = LampTarget {
                    rgb: hsv_to_rgb(state.hue_phase, 1.0, 1.0),
                    brightness: brightness(100.0 * scale),
                };
                let dim = LampTarget {
                    rgb: hsv_to_rgb(state.hue_phase + 0.5, 1.0, 1.0),
                    brightness: brightness(40.0 * scale),
                };
                if state.beat_count % 2 == 0 {
                    [bright, dim]
                } else {
                    [dim, bright]
                }
            } else if energy > 0.8 {
                // Energy spike without a beat: white strobe.
                let strobe = LampTarget {
                    rgb: (255, 255, 255),
                    brightness: brightness(100.0 * scale),
                };
                [strobe, strobe]
            } else {
                let target = LampTarget {
                    rgb: hsv_to_rgb(state.hue_phase, 0.8, 1.0),
                    brightness: brightness((40.0 * energy).max(10.0) * scale),
                };
                [target, target]
            }
        }

        // Unreachable from the worker; emit darkness if it ever is.
        ShowMode::Off => {
            let dark = LampTarget {
                rgb: (0, 0, 0),
                brightness: 1,
            };
            [dark, dark]
        }
    }
}

/// Targets for one pattern-only iteration, driven by seconds since the
/// show started rather than audio.
pub fn pattern_targets(
    mode: ShowMode,
    state: &mut ModeState,
    t: f32,
    intensity: u8,
) -> [LampTarget; 2] {
    let scale = intensity as f32 / 10.0;

    match mode {
        ShowMode::Pulse => {
            state.advance_hue(0.003);
            let level = brightness((40.0 + 30.0 * (2.0 * t).sin()) * scale);
            let target = LampTarget {
                rgb: hsv_to_rgb(state.hue_phase, 0.8, 1.0),
                brightness: level,
            };
            [target, target]
        }

        ShowMode::Ambient => {
            state.advance_hue(0.001);
            let a = LampTarget {
                rgb: hsv_to_rgb(state.hue_phase, 0.6, 1.0),
                brightness: 50,
            };
            let b = LampTarget {
                rgb: hsv_to_rgb(state.hue_phase + 0.5, 0.6, 1.0),
                brightness: 50,
            };
            [a, b]
        }

        ShowMode::Party => {
            state.advance_hue(0.01);
            let flash = LampTarget {
                rgb: hsv_to_rgb(state.hue_phase, 1.0, 1.0),
                brightness: 100,
            };
            let rest = LampTarget {
                rgb: (0, 0, 0),
                brightness: 10,
            };
            if (t * 4.0) as u64 % 2 == 0 {
                [flash, rest]
            } else {
                [rest, flash]
            }
        }

        ShowMode::Off => {
            let dark = LampTarget {
                rgb: (0, 0, 0),
                brightness: 1,
            };
            [dark, dark]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(rms: f32, beat: bool) -> AnalysisFrame {
        AnalysisFrame {
            rms,
            beat,
            ..Default::default()
        }
    }

    #[test]
    fn mode_parsing() {
        assert_eq!("pulse".parse::<ShowMode>().unwrap(), ShowMode::Pulse);
        assert_eq!("PARTY".parse::<ShowMode>().unwrap(), ShowMode::Party);
        assert!(matches!(
            "disco".parse::<ShowMode>(),
            Err(ControlError::BadMode(m)) if m == "disco"
        ));
    }

    #[test]
    fn pulse_beat_at_full_intensity_requests_100() {
        let mut state = ModeState::default();
        let targets = audio_targets(ShowMode::Pulse, &mut state, &frame(0.3, true), 10);
        assert_eq!(targets[0].brightness, 100);
        assert_eq!(targets[0], targets[1]);
    }

    #[test]
    fn pulse_quiet_floor_scales_with_intensity() {
        // rms = 0 with no beat must still give the 20-unit floor, scaled.
        let mut state = ModeState::default();
        let targets = audio_targets(ShowMode::Pulse, &mut state, &frame(0.0, false), 7);
        assert_eq!(targets[0].brightness, 14);
    }

    #[test]
    fn intensity_one_never_exceeds_ten() {
        let mut state = ModeState::default();
        for rms in [0.0, 0.1, 0.5, 1.0] {
            for beat in [false, true] {
                for mode in [ShowMode::Pulse, ShowMode::Ambient, ShowMode::Party] {
                    let targets = audio_targets(mode, &mut state, &frame(rms, beat), 1);
                    assert!(
                        targets.iter().all(|t| t.brightness <= 10),
                        "{mode} rms={rms} beat={beat} -> {targets:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn ambient_lamps_are_complementary() {
        let mut state = ModeState::default();
        let targets = audio_targets(ShowMode::Ambient, &mut state, &frame(0.2, false), 5);
        let expected_a = hsv_to_rgb(state.hue_phase, 0.4 + 0.3 * 1.0f32.min(0.2 * 5.0), 1.0);
        let expected_b = hsv_to_rgb(state.hue_phase + 0.5, 0.4 + 0.3 * 1.0f32.min(0.2 * 5.0), 1.0);
        assert_eq!(targets[0].rgb, expected_a);
        assert_eq!(targets[1].rgb, expected_b);
        assert_eq!(targets[0].brightness, targets[1].brightness);
    }

    #[test]
    fn party_alternates_flash_lamp_on_beats() {
        let mut state = ModeState::default();
        let first = audio_targets(ShowMode::Party, &mut state, &frame(0.1, true), 10);
        let second = audio_targets(ShowMode::Party, &mut state, &frame(0.1, true), 10);

        // beat_count 1 then 2: the flash side swaps.
        assert_eq!(first[1].brightness, 100);
        assert_eq!(first[0].brightness, 40);
        assert_eq!(second[0].brightness, 100);
        assert_eq!(second[1].brightness, 40);
    }

    #[test]
    fn party_strobes_white_on_energy_spike() {
        let mut state = ModeState::default();
        let targets = audio_targets(ShowMode::Party, &mut state, &frame(0.9, false), 10);
        assert_eq!(targets[0].rgb, (255, 255, 255));
        assert_eq!(targets[0].brightness, 100);
        assert_eq!(targets[0], targets[1]);
    }

    #[test]
    fn party_beat_takes_precedence_over_spike() {
        // A beat iteration never strobes, even above the energy threshold.
        let mut state = ModeState::default();
        let targets = audio_targets(ShowMode::Party, &mut state, &frame(0.9, true), 10);
        assert_ne!(targets[0].rgb, (255, 255, 255));
        assert_ne!(targets[0].brightness, targets[1].brightness);
    }

    #[test]
    fn party_quiet_floor() {
        let mut state = ModeState::default();
        let targets = audio_targets(ShowMode::Party, &mut state, &frame(0.0, false), 10);
        assert_eq!(targets[0].brightness, 10);
    }

    #[test]
    fn pattern_pulse_brightness_stays_in_scaled_band() {
        let mut state = ModeState::default();
        for tick in 0..200 {
            let t = tick as f32 * 0.033;
            let targets = pattern_targets(ShowMode::Pulse, &mut state, t, 7);
            assert!(
                (7..=49).contains(&targets[0].brightness),
                "t={t} -> {}",
                targets[0].brightness
            );
        }
    }

    #[test]
    fn pattern_party_alternates_with_time() {
        let mut state = ModeState::default();
        let early = pattern_targets(ShowMode::Party, &mut state, 0.1, 10);
        let later = pattern_targets(ShowMode::Party, &mut state, 0.35, 10);
        assert_eq!(early[0].brightness, 100);
        assert_eq!(early[1].brightness, 10);
        assert_eq!(later[0].brightness, 10);
        assert_eq!(later[1].brightness, 100);
    }

    #[test]
    fn pattern_ambient_is_complementary_and_fixed() {
        let mut state = ModeState::default();
        let targets = pattern_targets(ShowMode::Ambient, &mut state, 1.0, 3);
        assert_eq!(targets[0].brightness, 50);
        assert_eq!(targets[1].brightness, 50);
        assert_eq!(targets[0].rgb, hsv_to_rgb(state.hue_phase, 0.6, 1.0));
        assert_eq!(targets[1].rgb, hsv_to_rgb(state.hue_phase + 0.5, 0.6, 1.0));
    }

    #[test]
    fn hue_phase_wraps() {
        let mut state = ModeState {
            hue_phase: 0.95,
            beat_count: 0,
        };
        for _ in 0..40 {
            audio_targets(ShowMode::Ambient, &mut state, &frame(1.0, false), 5);
        }
        assert!((0.0..1.0).contains(&state.hue_phase));
    }
}
