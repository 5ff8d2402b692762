// THEORY:
// The `FeedbackMapper` is the last, purely presentational stage. It turns the
// tracker's `(state, ratio)` into instructions for whatever renders sound and
// indicators. It does not own an oscillator, a timer, or a widget; it only
// returns a `FeedbackDirective` and the renderer actuates it.
//
// The mapping mirrors a physical laser receiver:
// - laser lost: silence, no indicator;
// - on the line: a continuous tone and the centre indicator;
// - off the line: a pulsed beep whose interval shrinks as the laser
//   approaches the line, so the user hears it "getting warmer".
//
// A `SoundStyle` only changes frequencies, waveforms and cadence bounds. It
// never feeds back into detection or tracking.

use crate::core_modules::tracker::{TrackState, TrackerUpdate};
use std::str::FromStr;

/// Oscillator shape requested from the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Square,
    Triangle,
}

/// How the pulse interval follows the distance ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cadence {
    /// No audio at all.
    Silent,
    /// `min + ratio * (max - min)`, rounded to whole milliseconds.
    Linear { min_interval_ms: u32, max_interval_ms: u32 },
    /// Two fixed intervals split at `threshold`.
    Banded { threshold: f64, near_interval_ms: u32, far_interval_ms: u32 },
}

/// How the pulse pitch follows the distance ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pitch {
    Fixed(f64),
    /// `base_hz + (1 - ratio) * PITCH_SPAN_HZ`: higher as the laser gets closer.
    TracksDistance { base_hz: f64 },
    /// Near/far pitches split at the banded cadence threshold.
    Banded { near_hz: f64, far_hz: f64 },
}

pub const PITCH_SPAN_HZ: f64 = 1000.0;

/// Presentation parameters resolved from a `SoundStyle`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoundProfile {
    pub center_frequency_hz: f64,
    pub pitch: Pitch,
    pub cadence: Cadence,
    /// On-time of each beep, independent of the interval.
    pub duty_ms: u32,
    pub waveform: Waveform,
}

/// The user-selectable sound style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SoundStyle {
    Off,
    Simple,
    #[default]
    Realistic,
    Dull,
    Thin,
    Bosch,
    Leica,
}

impl FromStr for SoundStyle {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "simple" => Ok(Self::Simple),
            "realistic" | "real" => Ok(Self::Realistic),
            "dull" => Ok(Self::Dull),
            "thin" => Ok(Self::Thin),
            "bosch" => Ok(Self::Bosch),
            "leica" => Ok(Self::Leica),
            _ => Err(()),
        }
    }
}

impl SoundStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Simple => "simple",
            Self::Realistic => "realistic",
            Self::Dull => "dull",
            Self::Thin => "thin",
            Self::Bosch => "bosch",
            Self::Leica => "leica",
        }
    }

    pub fn profile(&self) -> SoundProfile {
        let linear = |min_interval_ms, max_interval_ms| Cadence::Linear { min_interval_ms, max_interval_ms };
        match self {
            Self::Off => SoundProfile {
                center_frequency_hz: 0.0,
                pitch: Pitch::Fixed(0.0),
                cadence: Cadence::Silent,
                duty_ms: 0,
                waveform: Waveform::Sine,
            },
            Self::Simple => SoundProfile {
                center_frequency_hz: 700.0,
                pitch: Pitch::Banded { near_hz: 880.0, far_hz: 380.0 },
                cadence: Cadence::Banded { threshold: 0.4, near_interval_ms: 500, far_interval_ms: 1100 },
                duty_ms: 80,
                waveform: Waveform::Sine,
            },
            Self::Realistic => SoundProfile {
                center_frequency_hz: 700.0,
                pitch: Pitch::Fixed(700.0),
                cadence: linear(250, 1200),
                duty_ms: 90,
                waveform: Waveform::Sine,
            },
            Self::Dull => SoundProfile {
                center_frequency_hz: 700.0,
                pitch: Pitch::Fixed(700.0),
                cadence: linear(60, 1000),
                duty_ms: 100,
                waveform: Waveform::Triangle,
            },
            Self::Thin => SoundProfile {
                center_frequency_hz: 900.0,
                pitch: Pitch::Fixed(900.0),
                cadence: linear(60, 1000),
                duty_ms: 80,
                waveform: Waveform::Square,
            },
            Self::Bosch => SoundProfile {
                center_frequency_hz: 1000.0,
                pitch: Pitch::TracksDistance { base_hz: 800.0 },
                cadence: linear(60, 1000),
                duty_ms: 60,
                waveform: Waveform::Sine,
            },
            Self::Leica => SoundProfile {
                center_frequency_hz: 1000.0,
                pitch: Pitch::TracksDistance { base_hz: 1200.0 },
                cadence: linear(60, 1000),
                duty_ms: 60,
                waveform: Waveform::Sine,
            },
        }
    }
}

/// What the audio renderer should be doing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AudioDirective {
    Silent,
    Continuous { frequency_hz: f64, waveform: Waveform },
    Pulsed { frequency_hz: f64, waveform: Waveform, interval_ms: u32, duty_ms: u32 },
}

/// What the indicator renderer should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisualDirective {
    pub state: TrackState,
    /// One-shot full-frame flash on arrival at the centre line.
    pub flash: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedbackDirective {
    pub visual: VisualDirective,
    pub audio: AudioDirective,
}

impl FeedbackDirective {
    pub fn silent() -> Self {
        Self {
            visual: VisualDirective { state: TrackState::None, flash: false },
            audio: AudioDirective::Silent,
        }
    }
}

/// Pulse interval for `ratio` under `cadence`; `None` when the cadence is silent.
pub fn pulse_interval_ms(cadence: &Cadence, ratio: f64) -> Option<u32> {
    let ratio = if ratio.is_finite() { ratio.clamp(0.0, 1.0) } else { 1.0 };
    match *cadence {
        Cadence::Silent => None,
        Cadence::Linear { min_interval_ms, max_interval_ms } => {
            let (min, max) = (min_interval_ms as f64, max_interval_ms.max(min_interval_ms) as f64);
            Some((min + ratio * (max - min)).round() as u32)
        }
        Cadence::Banded { threshold, near_interval_ms, far_interval_ms } => {
            Some(if ratio < threshold { near_interval_ms } else { far_interval_ms })
        }
    }
}

fn pulse_frequency_hz(profile: &SoundProfile, ratio: f64) -> f64 {
    let ratio = ratio.clamp(0.0, 1.0);
    match profile.pitch {
        Pitch::Fixed(hz) => hz,
        Pitch::TracksDistance { base_hz } => base_hz + (1.0 - ratio) * PITCH_SPAN_HZ,
        Pitch::Banded { near_hz, far_hz } => {
            let near = match profile.cadence {
                Cadence::Banded { threshold, .. } => ratio < threshold,
                _ => ratio < 0.5,
            };
            if near { near_hz } else { far_hz }
        }
    }
}

/// Maps a tracker state and distance ratio to feedback.
pub fn map(state: TrackState, ratio: f64, profile: &SoundProfile) -> FeedbackDirective {
    let visual = VisualDirective { state, flash: false };
    let silent = matches!(profile.cadence, Cadence::Silent);

    let audio = match state {
        TrackState::None => AudioDirective::Silent,
        _ if silent => AudioDirective::Silent,
        TrackState::Center => AudioDirective::Continuous {
            frequency_hz: profile.center_frequency_hz,
            waveform: profile.waveform,
        },
        TrackState::Above | TrackState::Below => match pulse_interval_ms(&profile.cadence, ratio) {
            Some(interval_ms) => AudioDirective::Pulsed {
                frequency_hz: pulse_frequency_hz(profile, ratio),
                waveform: profile.waveform,
                interval_ms,
                duty_ms: profile.duty_ms,
            },
            None => AudioDirective::Silent,
        },
    };

    FeedbackDirective { visual, audio }
}

/// Like `map`, and requests the centre flash on the update that entered `Center`.
pub fn map_update(update: &TrackerUpdate, profile: &SoundProfile) -> FeedbackDirective {
    let mut directive = map(update.state, update.ratio, profile);
    directive.visual.flash = update.entered_center;
    directive
}

#[cfg(test)]
mod tests {
    use super::*;

    const STYLES: [SoundStyle; 7] = [
        SoundStyle::Off,
        SoundStyle::Simple,
        SoundStyle::Realistic,
        SoundStyle::Dull,
        SoundStyle::Thin,
        SoundStyle::Bosch,
        SoundStyle::Leica,
    ];

    #[test]
    fn lost_laser_is_silent() {
        for style in STYLES {
            let directive = map(TrackState::None, 0.3, &style.profile());
            assert_eq!(directive, FeedbackDirective::silent());
        }
    }

    #[test]
    fn centre_is_a_continuous_tone() {
        let directive = map(TrackState::Center, 0.05, &SoundStyle::Dull.profile());
        assert_eq!(directive.visual.state, TrackState::Center);
        assert_eq!(
            directive.audio,
            AudioDirective::Continuous { frequency_hz: 700.0, waveform: Waveform::Triangle }
        );
        let directive = map(TrackState::Center, 0.05, &SoundStyle::Thin.profile());
        assert!(matches!(directive.audio, AudioDirective::Continuous { frequency_hz, .. } if frequency_hz == 900.0));
    }

    #[test]
    fn pulse_interval_is_linear_in_ratio() {
        let profile = SoundStyle::Realistic.profile();
        let at = |ratio| match map(TrackState::Above, ratio, &profile).audio {
            AudioDirective::Pulsed { interval_ms, duty_ms, .. } => {
                assert_eq!(duty_ms, 90);
                interval_ms
            }
            other => panic!("expected pulsed audio, got {other:?}"),
        };
        assert_eq!(at(0.0), 250);
        assert_eq!(at(0.5), 725);
        assert_eq!(at(1.0), 1200);
        assert_eq!(at(3.0), 1200);
        assert_eq!(at(-1.0), 250);
    }

    #[test]
    fn interval_is_non_decreasing_in_ratio() {
        for style in STYLES {
            let profile = style.profile();
            for state in [TrackState::Above, TrackState::Below] {
                let mut last = 0u32;
                for step in 0..=1000 {
                    let ratio = step as f64 / 1000.0;
                    if let AudioDirective::Pulsed { interval_ms, .. } = map(state, ratio, &profile).audio {
                        assert!(interval_ms >= last, "{style:?} at {ratio}: {interval_ms} < {last}");
                        last = interval_ms;
                    }
                }
            }
        }
    }

    #[test]
    fn simple_style_uses_two_bands() {
        let profile = SoundStyle::Simple.profile();
        assert_eq!(pulse_interval_ms(&profile.cadence, 0.2), Some(500));
        assert_eq!(pulse_interval_ms(&profile.cadence, 0.4), Some(1100));
        match map(TrackState::Below, 0.2, &profile).audio {
            AudioDirective::Pulsed { frequency_hz, .. } => assert_eq!(frequency_hz, 880.0),
            other => panic!("unexpected {other:?}"),
        }
        match map(TrackState::Below, 0.9, &profile).audio {
            AudioDirective::Pulsed { frequency_hz, .. } => assert_eq!(frequency_hz, 380.0),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn distance_pitch_rises_towards_centre() {
        let profile = SoundStyle::Leica.profile();
        let freq = |ratio| match map(TrackState::Above, ratio, &profile).audio {
            AudioDirective::Pulsed { frequency_hz, .. } => frequency_hz,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(freq(1.0), 1200.0);
        assert_eq!(freq(0.0), 2200.0);
        assert!(freq(0.2) > freq(0.6));
    }

    #[test]
    fn off_style_never_sounds() {
        let profile = SoundStyle::Off.profile();
        for state in [TrackState::Center, TrackState::Above, TrackState::Below] {
            let directive = map(state, 0.5, &profile);
            assert_eq!(directive.audio, AudioDirective::Silent);
            assert_eq!(directive.visual.state, state);
        }
    }

    #[test]
    fn flash_only_on_entering_centre() {
        let profile = SoundStyle::Realistic.profile();
        let entered = TrackerUpdate { state: TrackState::Center, ratio: 0.02, smoothed_y: Some(49.0), entered_center: true };
        assert!(map_update(&entered, &profile).visual.flash);
        let held = TrackerUpdate { entered_center: false, ..entered };
        assert!(!map_update(&held, &profile).visual.flash);
        assert!(!map(TrackState::Center, 0.02, &profile).visual.flash);
    }

    #[test]
    fn style_names_round_trip() {
        for style in STYLES {
            assert_eq!(style.as_str().parse::<SoundStyle>(), Ok(style));
        }
        assert_eq!("real".parse::<SoundStyle>(), Ok(SoundStyle::Realistic));
        assert!("banjo".parse::<SoundStyle>().is_err());
    }
}
