// THEORY:
// The `tracker` module adds memory to the receiver. A single frame's sample is
// noisy: the laser dot flickers, speckles, and occasionally vanishes. The
// tracker folds the stream of per-frame samples into one stable, discrete
// answer: is the laser `Center`, `Above`, `Below`, or not visible (`None`),
// together with a normalised distance from the reference line.
//
// Key principles:
// 1.  **Exponential smoothing**: the vertical estimate follows new samples with
//     weight `1 - alpha`. `alpha` is per frame, not per millisecond, so
//     perceived lag depends on the camera's frame rate.
// 2.  **Hysteresis**: the centre state is entered below one ratio and left
//     above a larger one. The gap between them is a dead-band that stops the
//     indicator from chattering when the laser sits on the boundary.
// 3.  **No stale lock-on**: when the laser disappears the state drops to
//     `None` at once, and after `lost_grace_frames` consecutive misses the
//     smoothed position is discarded, so reacquisition starts fresh.
// 4.  **Strategy seam**: two trackers implement the same contract.
//     `SingleValueTracker` smooths the mean row; `ZoneEnergyTracker` smooths
//     per-third pixel counts and picks the dominant zone. They are not
//     bit-identical, but both yield a stable direction with a dead-band.

use crate::core_modules::frame_sampler::{DetectionSample, FrameSampling, ZoneCounts};
use crate::core_modules::settings::DetectionSettings;
use std::fmt;

pub const DEFAULT_ENTER_CENTER_RATIO: f64 = 0.10;
pub const DEFAULT_EXIT_CENTER_RATIO: f64 = 0.15;
/// History weight for zone energies.
pub const ZONE_HISTORY_WEIGHT: f64 = 0.7;
/// Smoothed zone energy below which nothing is considered visible.
pub const MIN_ZONE_ENERGY: f64 = 6.0;
pub const DEFAULT_CENTER_BIAS: f64 = 1.15;

/// The discrete laser position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackState {
    #[default]
    None,
    Center,
    Above,
    Below,
}

impl fmt::Display for TrackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrackState::None => "none",
            TrackState::Center => "center",
            TrackState::Above => "above",
            TrackState::Below => "below",
        };
        f.write_str(name)
    }
}

/// Tuning that does not change between frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerConfig {
    /// Samples with fewer supporting pixels are treated as no detection.
    pub reliability_floor: u32,
    /// Enter `Center` when the ratio drops below this.
    pub enter_center_ratio: f64,
    /// Leave `Center` when the ratio rises above this.
    pub exit_center_ratio: f64,
    /// Zone tracker: how much the centre zone must outweigh the others to win.
    pub center_bias: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            reliability_floor: 1,
            enter_center_ratio: DEFAULT_ENTER_CENTER_RATIO,
            exit_center_ratio: DEFAULT_EXIT_CENTER_RATIO,
            center_bias: DEFAULT_CENTER_BIAS,
        }
    }
}

impl TrackerConfig {
    /// Builds a config with the dead-band put in order: exit must exceed entry.
    pub fn new(reliability_floor: u32, enter_center_ratio: f64, exit_center_ratio: f64, center_bias: f64) -> Self {
        let (enter, exit) = if enter_center_ratio < exit_center_ratio {
            (enter_center_ratio, exit_center_ratio)
        } else if enter_center_ratio > exit_center_ratio {
            (exit_center_ratio, enter_center_ratio)
        } else {
            (DEFAULT_ENTER_CENTER_RATIO, DEFAULT_EXIT_CENTER_RATIO)
        };
        Self {
            reliability_floor,
            enter_center_ratio: enter.clamp(0.0, 1.0),
            exit_center_ratio: exit.clamp(0.0, 1.0),
            center_bias: center_bias.max(1.0),
        }
    }

    /// Next hysteresis-latched state for a ratio, given the current state.
    pub fn next_state(&self, current: TrackState, ratio: f64, above: bool) -> TrackState {
        let centred = if current == TrackState::Center {
            ratio <= self.exit_center_ratio
        } else {
            ratio < self.enter_center_ratio
        };
        if centred {
            TrackState::Center
        } else if above {
            TrackState::Above
        } else {
            TrackState::Below
        }
    }
}

/// Per-cycle inputs taken from the current settings snapshot and the tilt sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingContext {
    pub alpha: f64,
    /// Added to the reference row, in pixels.
    pub tilt_offset: f64,
    pub lost_grace_frames: u32,
}

impl TrackingContext {
    /// `tilt_beta` is the device pitch in degrees, if a sensor reading is available.
    pub fn from_settings(settings: &DetectionSettings, tilt_beta: Option<f64>) -> Self {
        let beta = tilt_beta.filter(|b| b.is_finite()).unwrap_or(0.0);
        Self {
            alpha: settings.smoothing_alpha(),
            tilt_offset: beta * settings.tilt_factor,
            lost_grace_frames: settings.lost_grace_frames,
        }
    }
}

impl Default for TrackingContext {
    fn default() -> Self {
        Self::from_settings(&DetectionSettings::default(), None)
    }
}

/// One tracker step's output. `(state, ratio)` is what feedback is derived from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerUpdate {
    pub state: TrackState,
    /// Normalised distance from the reference line, in `[0, 1]`.
    pub ratio: f64,
    /// Smoothed row, when the tracker has one.
    pub smoothed_y: Option<f64>,
    /// True on the update that moved the state into `Center`.
    pub entered_center: bool,
}

/// Turns a stream of frame samplings into a stable position.
pub trait PositionTracker: Send {
    fn update(&mut self, sampling: &FrameSampling, context: &TrackingContext) -> TrackerUpdate;

    /// Back to uninitialised, as at session start.
    fn reset(&mut self);

    fn state(&self) -> TrackState;

    fn last_ratio(&self) -> f64;

    fn name(&self) -> &'static str;
}

/// Which tracker a session uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackingStrategy {
    #[default]
    SingleValue,
    ZoneEnergy,
}

impl TrackingStrategy {
    pub fn build(self, config: TrackerConfig) -> Box<dyn PositionTracker> {
        match self {
            TrackingStrategy::SingleValue => Box::new(SingleValueTracker::new(config)),
            TrackingStrategy::ZoneEnergy => Box::new(ZoneEnergyTracker::new(config)),
        }
    }
}

/// Smooths the mean laser row and measures its distance from the frame's centre row.
#[derive(Debug, Clone)]
pub struct SingleValueTracker {
    config: TrackerConfig,
    smoothed_y: Option<f64>,
    state: TrackState,
    last_ratio: f64,
    misses: u32,
}

impl SingleValueTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self { config, smoothed_y: None, state: TrackState::None, last_ratio: 0.0, misses: 0 }
    }

    pub fn smoothed_y(&self) -> Option<f64> {
        self.smoothed_y
    }

    /// Feeds one sample (or its absence) for a frame of `frame_height` rows.
    pub fn observe(
        &mut self,
        sample: Option<&DetectionSample>,
        frame_height: u32,
        context: &TrackingContext,
    ) -> TrackerUpdate {
        let previous = self.state;
        let reliable = sample.filter(|s| s.support_count > 0 && s.support_count >= self.config.reliability_floor);

        let Some(sample) = reliable else {
            self.state = TrackState::None;
            self.misses = self.misses.saturating_add(1);
            if self.misses > context.lost_grace_frames {
                self.smoothed_y = None;
            }
            return TrackerUpdate {
                state: self.state,
                ratio: self.last_ratio,
                smoothed_y: self.smoothed_y,
                entered_center: false,
            };
        };
        self.misses = 0;

        let alpha = context.alpha.clamp(0.0, 0.98);
        let smoothed = match self.smoothed_y {
            None => sample.y,
            Some(prev) => prev * alpha + sample.y * (1.0 - alpha),
        };
        self.smoothed_y = Some(smoothed);

        let half = frame_height as f64 / 2.0;
        let mid = half + context.tilt_offset;
        let ratio = if half > 0.0 { ((smoothed - mid).abs() / half).clamp(0.0, 1.0) } else { 0.0 };
        self.last_ratio = ratio;
        self.state = self.config.next_state(self.state, ratio, smoothed < mid);

        if self.state != previous {
            log::debug!("laser {} -> {} (y {:.1}, ratio {:.3})", previous, self.state, smoothed, ratio);
        }

        TrackerUpdate {
            state: self.state,
            ratio,
            smoothed_y: Some(smoothed),
            entered_center: self.state == TrackState::Center && previous != TrackState::Center,
        }
    }
}

impl PositionTracker for SingleValueTracker {
    fn update(&mut self, sampling: &FrameSampling, context: &TrackingContext) -> TrackerUpdate {
        self.observe(sampling.sample.as_ref(), sampling.frame_height, context)
    }

    fn reset(&mut self) {
        self.smoothed_y = None;
        self.state = TrackState::None;
        self.last_ratio = 0.0;
        self.misses = 0;
    }

    fn state(&self) -> TrackState {
        self.state
    }

    fn last_ratio(&self) -> f64 {
        self.last_ratio
    }

    fn name(&self) -> &'static str {
        "single-value"
    }
}

/// Smoothed pixel energy per horizontal third of the frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ZoneEnergies {
    pub top: f64,
    pub center: f64,
    pub bottom: f64,
}

impl ZoneEnergies {
    pub fn total(&self) -> f64 {
        self.top + self.center + self.bottom
    }

    fn blend(&mut self, counts: &ZoneCounts) {
        let keep = ZONE_HISTORY_WEIGHT;
        self.top = self.top * keep + counts.top as f64 * (1.0 - keep);
        self.center = self.center * keep + counts.center as f64 * (1.0 - keep);
        self.bottom = self.bottom * keep + counts.bottom as f64 * (1.0 - keep);
    }
}

/// Picks the dominant third of the frame from smoothed zone energies.
///
/// The centre zone wins only when it outweighs both other zones by
/// `center_bias`; once it holds the state it keeps it until another zone
/// actually overtakes it. The tilt offset does not apply to zones.
#[derive(Debug, Clone)]
pub struct ZoneEnergyTracker {
    config: TrackerConfig,
    energies: ZoneEnergies,
    state: TrackState,
    last_ratio: f64,
    misses: u32,
}

impl ZoneEnergyTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self { config, energies: ZoneEnergies::default(), state: TrackState::None, last_ratio: 0.0, misses: 0 }
    }

    pub fn energies(&self) -> ZoneEnergies {
        self.energies
    }

    pub fn observe(&mut self, counts: Option<&ZoneCounts>, context: &TrackingContext) -> TrackerUpdate {
        let previous = self.state;
        let reliable = counts.filter(|c| c.total() > 0 && c.total() >= self.config.reliability_floor);

        match reliable {
            Some(counts) => {
                self.misses = 0;
                self.energies.blend(counts);
            }
            None => {
                self.misses = self.misses.saturating_add(1);
                if self.misses > context.lost_grace_frames {
                    self.energies = ZoneEnergies::default();
                } else {
                    self.energies.blend(&ZoneCounts::default());
                }
            }
        }

        let e = self.energies;
        let total = e.total();
        self.state = if reliable.is_none() || total < MIN_ZONE_ENERGY {
            TrackState::None
        } else {
            let strongest_edge = e.top.max(e.bottom);
            let bias = if previous == TrackState::Center { 1.0 } else { self.config.center_bias };
            if e.center >= strongest_edge * bias && e.center > e.top && e.center > e.bottom {
                TrackState::Center
            } else if e.top >= e.bottom {
                TrackState::Above
            } else {
                TrackState::Below
            }
        };

        if self.state != TrackState::None {
            self.last_ratio = (1.0 - e.center / total).clamp(0.0, 1.0);
        }

        if self.state != previous {
            log::debug!("laser {} -> {} (zones {:.1}/{:.1}/{:.1})", previous, self.state, e.top, e.center, e.bottom);
        }

        TrackerUpdate {
            state: self.state,
            ratio: self.last_ratio,
            smoothed_y: None,
            entered_center: self.state == TrackState::Center && previous != TrackState::Center,
        }
    }
}

impl PositionTracker for ZoneEnergyTracker {
    fn update(&mut self, sampling: &FrameSampling, context: &TrackingContext) -> TrackerUpdate {
        let counts = sampling.sample.map(|_| sampling.zones);
        self.observe(counts.as_ref(), context)
    }

    fn reset(&mut self) {
        self.energies = ZoneEnergies::default();
        self.state = TrackState::None;
        self.last_ratio = 0.0;
        self.misses = 0;
    }

    fn state(&self) -> TrackState {
        self.state
    }

    fn last_ratio(&self) -> f64 {
        self.last_ratio
    }

    fn name(&self) -> &'static str {
        "zone-energy"
    }
}
