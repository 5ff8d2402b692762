// THEORY:
// The `ColorClassifier` is a pure per-pixel predicate: "is this pixel part of the
// laser line?". It reads one `Pixel` and one settings snapshot and nothing else.
//
// Each colour profile is a conjunction of cheap tests:
// - an intensity floor on the target channel (`sensitivity`),
// - dominance ratios of the target channel over the other two,
// - a Rec. 601 brightness floor,
// - a near-white exclusion that rejects saturated highlights (all channels > 120),
//   which would otherwise sneak through the ratio tests on overexposed glare.
//
// The custom profile is deliberately different: it is a per-channel distance box
// around the configured colour plus the brightness floor, with no ratio tests and
// no near-white exclusion. If the configured hex was malformed there is no target
// colour and the profile matches nothing.

use crate::core_modules::pixel::Pixel;
use crate::core_modules::settings::{DetectionSettings, LaserColor, Rgb};

/// Channels above this on all three of R, G, B count as white glare.
pub const NEAR_WHITE_LEVEL: u8 = 120;
/// Fixed dominance ratios for the red and blue profiles.
pub const PRIMARY_RATIO: f64 = 1.6;
pub const SECONDARY_RATIO: f64 = 1.4;
/// Per-channel tolerance of the custom profile.
pub const CUSTOM_TOLERANCE: i16 = 120;

/// Per-pixel laser membership test for one settings snapshot.
///
/// `sensitivity` is taken separately so the sampler can substitute an
/// ambient-adapted floor without copying the snapshot.
#[derive(Debug, Clone, Copy)]
pub struct ColorClassifier<'a> {
    settings: &'a DetectionSettings,
    sensitivity: u8,
}

impl<'a> ColorClassifier<'a> {
    pub fn new(settings: &'a DetectionSettings) -> Self {
        Self { settings, sensitivity: settings.sensitivity }
    }

    pub fn with_sensitivity(settings: &'a DetectionSettings, sensitivity: u8) -> Self {
        Self { settings, sensitivity }
    }

    pub fn sensitivity(&self) -> u8 {
        self.sensitivity
    }

    pub fn classify(&self, pixel: &Pixel) -> bool {
        match self.settings.laser_color {
            LaserColor::Green => self.is_green(pixel),
            LaserColor::Red => self.is_dominant(pixel.red, pixel.green, pixel.blue, pixel),
            LaserColor::Blue => self.is_dominant(pixel.blue, pixel.red, pixel.green, pixel),
            LaserColor::Custom => match self.settings.custom_color {
                Some(target) => self.is_near(pixel, target),
                None => false,
            },
        }
    }

    fn is_green(&self, pixel: &Pixel) -> bool {
        let s = self.settings;
        let (r, g, b) = (pixel.red as f64, pixel.green as f64, pixel.blue as f64);
        pixel.green > self.sensitivity
            && g > r * s.red_ratio
            && g > b * s.blue_ratio
            && pixel.blue > s.min_blue
            && pixel.brightness() > s.min_brightness
            && (pixel.green as i16 - pixel.blue as i16).abs() < s.max_color_diff as i16
            && !pixel.all_channels_above(NEAR_WHITE_LEVEL)
    }

    /// Red and blue profiles: `target` must clear the floor and dominate
    /// `primary` by 1.6x and `secondary` by 1.4x.
    fn is_dominant(&self, target: u8, primary: u8, secondary: u8, pixel: &Pixel) -> bool {
        target > self.sensitivity
            && target as f64 > primary as f64 * PRIMARY_RATIO
            && target as f64 > secondary as f64 * SECONDARY_RATIO
            && pixel.brightness() > self.settings.min_brightness
            && !pixel.all_channels_above(NEAR_WHITE_LEVEL)
    }

    fn is_near(&self, pixel: &Pixel, target: Rgb) -> bool {
        let close = |a: u8, b: u8| (a as i16 - b as i16).abs() < CUSTOM_TOLERANCE;
        close(pixel.red, target.red)
            && close(pixel.green, target.green)
            && close(pixel.blue, target.blue)
            && pixel.brightness() > self.settings.min_brightness
    }
}

/// Convenience wrapper around `ColorClassifier::classify`.
pub fn classify(pixel: &Pixel, settings: &DetectionSettings) -> bool {
    ColorClassifier::new(settings).classify(pixel)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn green_settings() -> DetectionSettings {
        DetectionSettings { min_blue: 70, ..DetectionSettings::default() }
    }

    #[test]
    fn accepts_typical_green_laser_pixel() {
        let settings = DetectionSettings::default();
        assert!(classify(&Pixel::rgb(0, 255, 168), &settings));
    }

    #[test]
    fn green_rejects_each_failed_clause() {
        let settings = DetectionSettings::default();
        // below sensitivity
        assert!(!classify(&Pixel::rgb(0, 190, 120), &settings));
        // red too strong
        assert!(!classify(&Pixel::rgb(150, 255, 168), &settings));
        // blue too weak for minBlue
        assert!(!classify(&Pixel::rgb(0, 255, 90), &settings));
        // |g - b| too large
        let wide = DetectionSettings { min_blue: 50, ..DetectionSettings::default() };
        assert!(!classify(&Pixel::rgb(0, 255, 150), &wide));
    }

    #[test]
    fn green_rejects_near_white_glare() {
        let settings = DetectionSettings { red_ratio: 1.0, blue_ratio: 1.0, ..DetectionSettings::default() };
        assert!(classify(&Pixel::rgb(110, 255, 200), &settings));
        assert!(!classify(&Pixel::rgb(130, 255, 200), &settings));
    }

    #[test]
    fn green_accept_is_monotone_in_blue() {
        // Raising blue while |g - b| stays inside maxColorDiff must never reject.
        let settings = green_settings();
        let classifier = ColorClassifier::new(&settings);
        for r in (0u8..=120).step_by(8) {
            for g in (150u8..=255).step_by(5) {
                for b in (0u8..=255).step_by(3) {
                    let base = Pixel::rgb(r, g, b);
                    if !classifier.classify(&base) {
                        continue;
                    }
                    for delta in 1u8..=12 {
                        let Some(b2) = b.checked_add(delta) else { break };
                        if (g as i16 - b2 as i16).abs() >= settings.max_color_diff as i16 {
                            break;
                        }
                        // the blue-ratio clause bounds how far blue may rise
                        if g as f64 <= b2 as f64 * settings.blue_ratio {
                            break;
                        }
                        // near-white exclusion is a separate clause
                        if Pixel::rgb(r, g, b2).all_channels_above(NEAR_WHITE_LEVEL) {
                            break;
                        }
                        assert!(
                            classifier.classify(&Pixel::rgb(r, g, b2)),
                            "({r},{g},{b}) accepted but ({r},{g},{b2}) rejected"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn red_and_blue_use_fixed_ratios() {
        let red = DetectionSettings { laser_color: LaserColor::Red, min_brightness: 70.0, ..DetectionSettings::default() };
        assert!(classify(&Pixel::rgb(255, 100, 100), &red));
        assert!(!classify(&Pixel::rgb(255, 160, 100), &red));
        assert!(!classify(&Pixel::rgb(255, 100, 190), &red));

        let blue = DetectionSettings { laser_color: LaserColor::Blue, min_brightness: 30.0, ..DetectionSettings::default() };
        assert!(classify(&Pixel::rgb(100, 100, 255), &blue));
        // blue is compared against red by 1.6 and green by 1.4
        assert!(!classify(&Pixel::rgb(160, 100, 255), &blue));
        assert!(classify(&Pixel::rgb(100, 170, 255), &blue));
        assert!(!classify(&Pixel::rgb(100, 190, 255), &blue));
    }

    #[test]
    fn custom_profile_matches_within_tolerance() {
        let settings = DetectionSettings {
            laser_color: LaserColor::Custom,
            custom_color: Some(Rgb::new(4, 248, 212)),
            ..DetectionSettings::default()
        };
        assert!(classify(&Pixel::rgb(50, 240, 200), &settings));
        assert!(!classify(&Pixel::rgb(130, 240, 200), &settings));
    }

    #[test]
    fn custom_profile_has_no_near_white_exclusion() {
        // Known asymmetry: a bright near-white pixel close to the custom colour passes,
        // while the same pixel is rejected by the ratio profiles.
        let settings = DetectionSettings {
            laser_color: LaserColor::Custom,
            custom_color: Some(Rgb::new(200, 240, 220)),
            ..DetectionSettings::default()
        };
        let glare = Pixel::rgb(230, 250, 240);
        assert!(glare.all_channels_above(NEAR_WHITE_LEVEL));
        assert!(classify(&glare, &settings));
    }

    #[test]
    fn malformed_custom_colour_matches_nothing() {
        let settings = DetectionSettings {
            laser_color: LaserColor::Custom,
            custom_color: None,
            min_brightness: 0.0,
            ..DetectionSettings::default()
        };
        for v in (0u8..=255).step_by(15) {
            assert!(!classify(&Pixel::rgb(v, v, v), &settings));
        }
    }

    #[test]
    fn black_is_never_a_laser() {
        for color in [LaserColor::Green, LaserColor::Red, LaserColor::Blue, LaserColor::Custom] {
            let settings = DetectionSettings { laser_color: color, ..DetectionSettings::default() };
            assert!(!classify(&Pixel::rgb(0, 0, 0), &settings));
        }
    }
}
