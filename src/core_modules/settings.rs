// THEORY:
// Settings arrive from the outside world as a flat, loosely-typed record (the
// same record the app persists). The detection core never reads that record
// directly. Instead `DetectionSettings::from_raw` turns it into a fully
// populated, clamped snapshot: every numeric field is forced into its range and
// anything missing, non-numeric, or non-finite falls back to its default. The
// pipeline therefore always runs, even from a half-filled record.
//
// A snapshot is immutable. A "live" settings change is simply a new snapshot
// published through `SettingsHandle`; each detection cycle takes exactly one
// `Arc` of the current snapshot, so a cycle can never see a half-applied edit.

use crate::core_modules::feedback::SoundStyle;
use crate::error::{LaserError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::watch;

pub const DEFAULT_SENSITIVITY: u8 = 200;
pub const DEFAULT_RED_RATIO: f64 = 1.8;
pub const DEFAULT_BLUE_RATIO: f64 = 1.5;
pub const DEFAULT_MIN_BLUE: u8 = 100;
pub const DEFAULT_MIN_BRIGHTNESS: f64 = 160.0;
pub const DEFAULT_MAX_COLOR_DIFF: u8 = 90;
pub const DEFAULT_DETECTION_AREA: u8 = 100;
pub const DEFAULT_RESPONSIVENESS: f64 = 60.0;
pub const DEFAULT_TILT_FACTOR: f64 = 2.0;
pub const DEFAULT_CUSTOM_COLOR: &str = "#04F8D4";

const MIN_DETECTION_AREA: u8 = 20;
const MAX_SAMPLE_STRIDE: u32 = 16;
const MAX_MIN_SUPPORT: u32 = 100_000;
const MAX_LOST_GRACE_FRAMES: u32 = 120;

/// The laser colour the classifier looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaserColor {
    #[default]
    Green,
    Red,
    Blue,
    Custom,
}

impl FromStr for LaserColor {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "green" => Ok(Self::Green),
            "red" => Ok(Self::Red),
            "blue" => Ok(Self::Blue),
            "custom" => Ok(Self::Custom),
            _ => Err(()),
        }
    }
}

/// A plain RGB triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Rgb {
    pub fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /// Parses `#RRGGBB` or `RRGGBB`. Anything else is `None`.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.trim().trim_start_matches('#');
        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&digits[range], 16).ok();
        Some(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.red, self.green, self.blue)
    }
}

/// The flat settings record exactly as persisted. Every field is optional and
/// every value is accepted; interpretation happens in `DetectionSettings::from_raw`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawSettings {
    #[serde(deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub laser_color: Option<String>,
    /// Older name for `laserColor`; `laserColor` wins when both are present.
    #[serde(deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub custom_laser_color: Option<String>,
    #[serde(deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub sensitivity: Option<f64>,
    /// Older names for `sensitivity`, in falling precedence after it.
    #[serde(deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub laser_threshold: Option<f64>,
    #[serde(deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub red_ratio: Option<f64>,
    #[serde(deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub blue_ratio: Option<f64>,
    #[serde(deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub min_blue: Option<f64>,
    #[serde(deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub min_brightness: Option<f64>,
    #[serde(deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub max_color_diff: Option<f64>,
    #[serde(deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub detection_area: Option<f64>,
    #[serde(deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub responsiveness: Option<f64>,
    /// Older name for `responsiveness`.
    #[serde(deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub smoothing: Option<f64>,
    #[serde(deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub min_support: Option<f64>,
    #[serde(deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub sample_stride: Option<f64>,
    #[serde(deserialize_with = "lenient_bool", skip_serializing_if = "Option::is_none")]
    pub auto_adapt: Option<bool>,
    #[serde(deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub sound_mode: Option<String>,
    #[serde(deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub tilt_factor: Option<f64>,
    #[serde(deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub lost_grace_frames: Option<f64>,
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<f64>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => Some(s),
        _ => None,
    })
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<bool>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Bool(b) => Some(b),
        Value::String(s) => s.trim().parse::<bool>().ok(),
        _ => None,
    })
}

/// A finite value clamped into `[min, max]`, or `default`.
fn clamp_or(value: Option<f64>, min: f64, max: f64, default: f64) -> f64 {
    match value {
        Some(v) if v.is_finite() => v.clamp(min, max),
        _ => default,
    }
}

fn clamp_u8(value: Option<f64>, min: u8, max: u8, default: u8) -> u8 {
    clamp_or(value, min as f64, max as f64, default as f64).round() as u8
}

fn clamp_u32(value: Option<f64>, min: u32, max: u32, default: u32) -> u32 {
    clamp_or(value, min as f64, max as f64, default as f64).round() as u32
}

/// An immutable, fully-validated detection settings snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionSettings {
    pub laser_color: LaserColor,
    /// Target colour for `LaserColor::Custom`. `None` when the configured hex was malformed.
    pub custom_color: Option<Rgb>,
    /// Channel-intensity floor for the target channel (1-255).
    pub sensitivity: u8,
    /// Minimum green/red dominance for the green profile.
    pub red_ratio: f64,
    /// Minimum green/blue dominance for the green profile.
    pub blue_ratio: f64,
    pub min_blue: u8,
    pub min_brightness: f64,
    pub max_color_diff: u8,
    /// Centred percentage of the frame height that is scanned (20-100).
    pub detection_area: u8,
    /// Smoothing strength (0-100); see `smoothing_alpha`.
    pub responsiveness: f64,
    /// Samples with fewer accepted pixels than this are reported as no detection. 0 disables.
    pub min_support: u32,
    /// Uniform row/column step used while scanning (1 scans every pixel).
    pub sample_stride: u32,
    /// Adjust the green sensitivity to the frame's ambient light level.
    pub auto_adapt: bool,
    pub sound_style: SoundStyle,
    /// Pixels of centre-line offset per degree of device pitch.
    pub tilt_factor: f64,
    /// Consecutive misses tolerated before the smoothed position is discarded.
    pub lost_grace_frames: u32,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            laser_color: LaserColor::Green,
            custom_color: Rgb::from_hex(DEFAULT_CUSTOM_COLOR),
            sensitivity: DEFAULT_SENSITIVITY,
            red_ratio: DEFAULT_RED_RATIO,
            blue_ratio: DEFAULT_BLUE_RATIO,
            min_blue: DEFAULT_MIN_BLUE,
            min_brightness: DEFAULT_MIN_BRIGHTNESS,
            max_color_diff: DEFAULT_MAX_COLOR_DIFF,
            detection_area: DEFAULT_DETECTION_AREA,
            responsiveness: DEFAULT_RESPONSIVENESS,
            min_support: 0,
            sample_stride: 1,
            auto_adapt: false,
            sound_style: SoundStyle::default(),
            tilt_factor: DEFAULT_TILT_FACTOR,
            lost_grace_frames: 0,
        }
    }
}

impl DetectionSettings {
    /// Builds a snapshot from a raw record, clamping and defaulting every field.
    pub fn from_raw(raw: &RawSettings) -> Self {
        let laser_color = raw
            .laser_color
            .as_deref()
            .or(raw.color.as_deref())
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();

        let custom_hex = raw.custom_laser_color.as_deref().unwrap_or(DEFAULT_CUSTOM_COLOR);
        let custom_color = Rgb::from_hex(custom_hex);

        let sound_style = raw
            .sound_mode
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();

        let settings = Self {
            laser_color,
            custom_color,
            sensitivity: clamp_u8(
                raw.sensitivity.or(raw.threshold).or(raw.laser_threshold),
                1,
                255,
                DEFAULT_SENSITIVITY,
            ),
            red_ratio: clamp_or(raw.red_ratio, 1.0, 10.0, DEFAULT_RED_RATIO),
            blue_ratio: clamp_or(raw.blue_ratio, 1.0, 10.0, DEFAULT_BLUE_RATIO),
            min_blue: clamp_u8(raw.min_blue, 0, 255, DEFAULT_MIN_BLUE),
            min_brightness: clamp_or(raw.min_brightness, 0.0, 255.0, DEFAULT_MIN_BRIGHTNESS),
            max_color_diff: clamp_u8(raw.max_color_diff, 1, 255, DEFAULT_MAX_COLOR_DIFF),
            detection_area: clamp_u8(raw.detection_area, MIN_DETECTION_AREA, 100, DEFAULT_DETECTION_AREA),
            responsiveness: clamp_or(raw.responsiveness.or(raw.smoothing), 0.0, 100.0, DEFAULT_RESPONSIVENESS),
            min_support: clamp_u32(raw.min_support, 0, MAX_MIN_SUPPORT, 0),
            sample_stride: clamp_u32(raw.sample_stride, 1, MAX_SAMPLE_STRIDE, 1),
            auto_adapt: raw.auto_adapt.unwrap_or(false),
            sound_style,
            tilt_factor: clamp_or(raw.tilt_factor, -10.0, 10.0, DEFAULT_TILT_FACTOR),
            lost_grace_frames: clamp_u32(raw.lost_grace_frames, 0, MAX_LOST_GRACE_FRAMES, 0),
        };
        if settings.custom_profile_unusable() {
            log::warn!("Malformed custom laser colour {custom_hex:?}; custom profile will match nothing");
        }
        settings
    }

    /// True when the custom profile is selected but has no valid target colour.
    pub fn custom_profile_unusable(&self) -> bool {
        self.laser_color == LaserColor::Custom && self.custom_color.is_none()
    }

    /// The flat record for this snapshot. A malformed custom colour is dropped.
    pub fn to_raw(&self) -> RawSettings {
        RawSettings {
            laser_color: Some(self.laser_color.as_str().to_string()),
            color: None,
            custom_laser_color: self.custom_color.map(|c| c.to_string()),
            sensitivity: Some(self.sensitivity as f64),
            threshold: None,
            laser_threshold: None,
            red_ratio: Some(self.red_ratio),
            blue_ratio: Some(self.blue_ratio),
            min_blue: Some(self.min_blue as f64),
            min_brightness: Some(self.min_brightness),
            max_color_diff: Some(self.max_color_diff as f64),
            detection_area: Some(self.detection_area as f64),
            responsiveness: Some(self.responsiveness),
            smoothing: None,
            min_support: Some(self.min_support as f64),
            sample_stride: Some(self.sample_stride as f64),
            auto_adapt: Some(self.auto_adapt),
            sound_mode: Some(self.sound_style.as_str().to_string()),
            tilt_factor: Some(self.tilt_factor),
            lost_grace_frames: Some(self.lost_grace_frames as f64),
        }
    }

    /// Parses a JSON settings record.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawSettings = serde_json::from_str(json)?;
        Ok(Self::from_raw(&raw))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_raw())?)
    }

    /// Loads a persisted settings record from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let settings = Self::from_json(&text)
            .map_err(|e| LaserError::settings(format!("{}: {e}", path.display())))?;
        log::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Weight given to the previous smoothed position on each update.
    ///
    /// `0.2 + responsiveness/100 * 0.75`, clamped to `[0, 0.98]`. The floor of 0.2
    /// means some smoothing always applies.
    pub fn smoothing_alpha(&self) -> f64 {
        (0.2 + (self.responsiveness / 100.0) * 0.75).clamp(0.0, 0.98)
    }

    /// First scanned row and one past the last scanned row for a frame of `height`.
    pub fn scan_band(&self, height: u32) -> (u32, u32) {
        let area = self.detection_area.clamp(MIN_DETECTION_AREA, 100) as f64;
        let margin = ((1.0 - area / 100.0) * height as f64 / 2.0).floor() as u32;
        (margin, height.saturating_sub(margin))
    }
}

impl LaserColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Green => "green",
            Self::Red => "red",
            Self::Blue => "blue",
            Self::Custom => "custom",
        }
    }
}

/// Publishes settings snapshots to the running pipeline.
#[derive(Clone)]
pub struct SettingsHandle {
    tx: watch::Sender<Arc<DetectionSettings>>,
}

impl SettingsHandle {
    pub fn new(initial: DetectionSettings) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(initial));
        Self { tx }
    }

    /// Replaces the current snapshot. The next detection cycle observes it whole.
    pub fn publish(&self, settings: DetectionSettings) {
        self.tx.send_replace(Arc::new(settings));
    }

    /// Applies an edit to a copy of the current snapshot and publishes the result.
    pub fn update<F: FnOnce(&mut DetectionSettings)>(&self, edit: F) {
        let mut next = (**self.tx.borrow()).clone();
        edit(&mut next);
        self.publish(next);
    }

    pub fn snapshot(&self) -> Arc<DetectionSettings> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<DetectionSettings>> {
        self.tx.subscribe()
    }
}
