// THEORY:
// Calibration points the camera at the working scene (without the laser, or
// with it, either works) and derives acceptance bounds from what it sees. It
// accumulates a handful of frames, then sets the brightness floor just above
// the scene's mean brightness and the intensity floors from the brightest
// channel values observed. The result is a fresh settings snapshot; nothing
// running is mutated.

use crate::core_modules::frame::FrameBuffer;
use crate::core_modules::settings::{DetectionSettings, RawSettings};

pub const DEFAULT_CALIBRATION_FRAMES: usize = 12;

/// Scene statistics gathered over the calibration frames.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SceneStats {
    pub mean_brightness: f64,
    pub max_red: u8,
    pub max_green: u8,
    pub max_blue: u8,
    pub frames: usize,
}

/// Accumulates frames and derives a calibrated settings snapshot.
#[derive(Debug, Clone)]
pub struct Calibrator {
    target_frames: usize,
    brightness_sum: f64,
    pixel_count: u64,
    max_red: u8,
    max_green: u8,
    max_blue: u8,
    frames: usize,
}

impl Default for Calibrator {
    fn default() -> Self {
        Self::new(DEFAULT_CALIBRATION_FRAMES)
    }
}

impl Calibrator {
    pub fn new(target_frames: usize) -> Self {
        Self {
            target_frames: target_frames.max(1),
            brightness_sum: 0.0,
            pixel_count: 0,
            max_red: 0,
            max_green: 0,
            max_blue: 0,
            frames: 0,
        }
    }

    /// Adds one frame. Returns true once enough frames have been collected.
    pub fn add_frame(&mut self, frame: &FrameBuffer) -> bool {
        for pixel in frame.pixels() {
            self.brightness_sum += pixel.brightness();
            self.max_red = self.max_red.max(pixel.red);
            self.max_green = self.max_green.max(pixel.green);
            self.max_blue = self.max_blue.max(pixel.blue);
        }
        self.pixel_count += frame.pixel_count() as u64;
        self.frames += 1;
        self.is_complete()
    }

    pub fn is_complete(&self) -> bool {
        self.frames >= self.target_frames
    }

    pub fn stats(&self) -> Option<SceneStats> {
        if self.frames == 0 || self.pixel_count == 0 {
            return None;
        }
        Some(SceneStats {
            mean_brightness: self.brightness_sum / self.pixel_count as f64,
            max_red: self.max_red,
            max_green: self.max_green,
            max_blue: self.max_blue,
            frames: self.frames,
        })
    }

    /// Derives calibrated settings from `base`. `None` when no frame was added.
    pub fn finish(&self, base: &DetectionSettings) -> Option<DetectionSettings> {
        let stats = self.stats()?;
        let brightest = stats.max_red.max(stats.max_green).max(stats.max_blue) as f64;

        let mut raw: RawSettings = base.to_raw();
        raw.min_brightness = Some((stats.mean_brightness.round() * 1.05).round().max(120.0));
        raw.sensitivity = Some((brightest * 0.55).round().max(120.0));
        raw.min_blue = Some((stats.max_blue as f64 * 0.15).round().max(60.0));

        let calibrated = DetectionSettings::from_raw(&raw);
        log::info!(
            "Calibrated over {} frames: mean brightness {:.1}, minBrightness {}, sensitivity {}, minBlue {}",
            stats.frames,
            stats.mean_brightness,
            calibrated.min_brightness,
            calibrated.sensitivity,
            calibrated.min_blue
        );
        Some(DetectionSettings { custom_color: base.custom_color, ..calibrated })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::pixel::Pixel;

    fn uniform(pixel: Pixel) -> FrameBuffer {
        let mut frame = FrameBuffer::black(8, 6).unwrap();
        for y in 0..6 {
            for x in 0..8 {
                frame.set_pixel(x, y, pixel);
            }
        }
        frame
    }

    #[test]
    fn no_frames_no_result() {
        assert_eq!(Calibrator::default().finish(&DetectionSettings::default()), None);
    }

    #[test]
    fn dark_scene_hits_the_floors() {
        let mut calibrator = Calibrator::new(2);
        assert!(!calibrator.add_frame(&uniform(Pixel::rgb(10, 10, 10))));
        assert!(calibrator.add_frame(&uniform(Pixel::rgb(20, 20, 20))));
        let settings = calibrator.finish(&DetectionSettings::default()).unwrap();
        assert_eq!(settings.min_brightness, 120.0);
        assert_eq!(settings.sensitivity, 120);
        assert_eq!(settings.min_blue, 60);
    }

    #[test]
    fn bright_scene_derives_bounds() {
        let mut calibrator = Calibrator::new(1);
        let mut frame = uniform(Pixel::rgb(200, 200, 200));
        frame.set_pixel(0, 0, Pixel::rgb(0, 255, 255));
        calibrator.add_frame(&frame);
        let stats = calibrator.stats().unwrap();
        assert_eq!((stats.max_red, stats.max_green, stats.max_blue), (200, 255, 255));

        let base = DetectionSettings { red_ratio: 2.5, ..DetectionSettings::default() };
        let settings = calibrator.finish(&base).unwrap();
        // 255 * 0.55 = 140.25
        assert_eq!(settings.sensitivity, 140);
        // 255 * 0.15 = 38.25 -> floor of 60
        assert_eq!(settings.min_blue, 60);
        assert!(settings.min_brightness > 200.0);
        assert_eq!(settings.red_ratio, 2.5);
    }
}
