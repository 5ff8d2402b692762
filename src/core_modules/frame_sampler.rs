// THEORY:
// The `FrameSampler` turns one raw frame into one scalar observation: where,
// vertically, is the laser? It is a pure function of the frame's bytes and a
// settings snapshot and keeps no reference to either once it returns.
//
// Algorithm:
// 1.  **Scan band**: only the centred `detectionArea` percent of rows is
//     scanned. Peripheral rows collect glare and reflections far more often
//     than laser light, so they are excluded outright.
// 2.  **Uniform subsampling**: rows and columns are stepped by the same
//     `sample_stride`, starting at the band's first row and column 0. A
//     uniform step in both axes keeps the vertical mean unbiased.
// 3.  **Classification**: every visited pixel goes through `ColorClassifier`;
//     accepted pixels add their row index to a running sum.
// 4.  **Result**: the unweighted mean row of all accepted pixels, plus the
//     number of pixels supporting it, or `None` when nothing (or too little,
//     below `min_support`) was accepted.
//
// Alongside the sample it reports how the accepted pixels fall into the top,
// centre and bottom thirds of the frame. `ZoneEnergyTracker` consumes those.

use crate::core_modules::ambient;
use crate::core_modules::color_classifier::ColorClassifier;
use crate::core_modules::frame::FrameBuffer;
use crate::core_modules::pixel::{CHANNELS, Pixel};
use crate::core_modules::settings::DetectionSettings;

/// One frame's laser observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionSample {
    /// Mean row index of accepted pixels (0 = top of the frame).
    pub y: f64,
    /// Number of accepted pixels behind `y`.
    pub support_count: u32,
}

/// Accepted-pixel counts per horizontal third of the frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZoneCounts {
    pub top: u32,
    pub center: u32,
    pub bottom: u32,
}

impl ZoneCounts {
    pub fn total(&self) -> u32 {
        self.top + self.center + self.bottom
    }

    fn record(&mut self, y: u32, height: u32) {
        let third = height / 3;
        if y < third {
            self.top += 1;
        } else if y < third * 2 {
            self.center += 1;
        } else {
            self.bottom += 1;
        }
    }
}

/// Everything the sampler learned from one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSampling {
    pub sample: Option<DetectionSample>,
    pub zones: ZoneCounts,
    pub frame_height: u32,
    /// Intensity floor actually used for this frame.
    pub sensitivity: u8,
    /// Measured ambient level when auto-adapt was active.
    pub ambient: Option<u8>,
    /// Scanned rows, `[first, end)`.
    pub scan_band: (u32, u32),
}

/// Stateless frame scanner bound to one settings snapshot.
pub struct FrameSampler<'a> {
    settings: &'a DetectionSettings,
}

impl<'a> FrameSampler<'a> {
    pub fn new(settings: &'a DetectionSettings) -> Self {
        Self { settings }
    }

    /// The laser sample for `frame`, or `None` when no laser is visible.
    pub fn sample(&self, frame: &FrameBuffer) -> Option<DetectionSample> {
        self.analyze(frame).sample
    }

    pub fn analyze(&self, frame: &FrameBuffer) -> FrameSampling {
        let settings = self.settings;
        let (sensitivity, ambient) = ambient::effective_sensitivity(frame, settings);
        let classifier = ColorClassifier::with_sensitivity(settings, sensitivity);

        let height = frame.height();
        let (first_row, end_row) = settings.scan_band(height);
        let stride = settings.sample_stride.max(1) as usize;

        let mut sum_y = 0u64;
        let mut count = 0u32;
        let mut zones = ZoneCounts::default();

        for y in (first_row..end_row).step_by(stride) {
            let row = frame.row(y);
            for bytes in row.chunks_exact(CHANNELS).step_by(stride) {
                if classifier.classify(&Pixel::from(bytes)) {
                    sum_y += y as u64;
                    count += 1;
                    zones.record(y, height);
                }
            }
        }

        let sample = if count == 0 || count < settings.min_support {
            None
        } else {
            Some(DetectionSample { y: sum_y as f64 / count as f64, support_count: count })
        };

        log::trace!(
            "sampled {}x{} rows {}..{}: {:?}",
            frame.width(),
            height,
            first_row,
            end_row,
            sample
        );

        FrameSampling {
            sample,
            zones,
            frame_height: height,
            sensitivity,
            ambient,
            scan_band: (first_row, end_row),
        }
    }
}

/// The laser sample for `frame` under `settings`.
pub fn sample(frame: &FrameBuffer, settings: &DetectionSettings) -> Option<DetectionSample> {
    FrameSampler::new(settings).sample(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::settings::LaserColor;

    const LASER: Pixel = Pixel { red: 0, green: 255, blue: 168, alpha: 255 };

    fn frame_with_rows(width: u32, height: u32, rows: &[u32]) -> FrameBuffer {
        let mut frame = FrameBuffer::black(width, height).unwrap();
        for &y in rows {
            for x in 0..width {
                frame.set_pixel(x, y, LASER);
            }
        }
        frame
    }

    #[test]
    fn single_pixel_fixture() {
        let settings = DetectionSettings { min_blue: 70, ..DetectionSettings::default() };
        let mut frame = FrameBuffer::black(10, 10).unwrap();
        frame.set_pixel(4, 3, LASER);
        assert_eq!(sample(&frame, &settings), Some(DetectionSample { y: 3.0, support_count: 1 }));
    }

    #[test]
    fn mean_of_accepted_rows() {
        let frame = frame_with_rows(8, 20, &[4, 10]);
        let s = sample(&frame, &DetectionSettings::default()).unwrap();
        assert_eq!(s.support_count, 16);
        assert!((s.y - 7.0).abs() < 1e-12);
    }

    #[test]
    fn black_frame_never_detects() {
        let frame = FrameBuffer::black(16, 12).unwrap();
        for color in [LaserColor::Green, LaserColor::Red, LaserColor::Blue, LaserColor::Custom] {
            for sensitivity in [1u8, 50, 200, 255] {
                let settings = DetectionSettings {
                    laser_color: color,
                    sensitivity,
                    auto_adapt: true,
                    ..DetectionSettings::default()
                };
                assert_eq!(sample(&frame, &settings), None);
            }
        }
    }

    #[test]
    fn rows_outside_scan_band_are_ignored() {
        // height 20, area 50% -> margin 5, band [5, 15)
        let settings = DetectionSettings { detection_area: 50, ..DetectionSettings::default() };
        let frame = frame_with_rows(6, 20, &[0, 4, 15, 19]);
        let analysis = FrameSampler::new(&settings).analyze(&frame);
        assert_eq!(analysis.scan_band, (5, 15));
        assert_eq!(analysis.sample, None);

        let frame = frame_with_rows(6, 20, &[4, 5, 14, 15]);
        let s = sample(&frame, &settings).unwrap();
        assert_eq!(s.support_count, 12);
        assert!((s.y - 9.5).abs() < 1e-12);
    }

    #[test]
    fn full_area_scans_every_row() {
        let frame = frame_with_rows(3, 9, &[0, 8]);
        let analysis = FrameSampler::new(&DetectionSettings::default()).analyze(&frame);
        assert_eq!(analysis.scan_band, (0, 9));
        assert_eq!(analysis.sample.unwrap().support_count, 6);
    }

    #[test]
    fn min_support_floor_reports_no_detection() {
        let mut frame = FrameBuffer::black(10, 10).unwrap();
        frame.set_pixel(1, 2, LASER);
        frame.set_pixel(2, 2, LASER);
        let settings = DetectionSettings { min_support: 3, ..DetectionSettings::default() };
        assert_eq!(sample(&frame, &settings), None);
        let settings = DetectionSettings { min_support: 2, ..DetectionSettings::default() };
        assert_eq!(sample(&frame, &settings).unwrap().support_count, 2);
    }

    #[test]
    fn uniform_stride_keeps_mean_unbiased() {
        let frame = frame_with_rows(12, 24, &[6, 7, 8, 9, 10, 11, 12]);
        let full = sample(&frame, &DetectionSettings::default()).unwrap();
        let strided = sample(&frame, &DetectionSettings { sample_stride: 2, ..DetectionSettings::default() }).unwrap();
        assert!((full.y - 9.0).abs() < 1e-12);
        assert!((strided.y - 9.0).abs() < 1e-12);
        assert_eq!(strided.support_count, 4 * 6);
    }

    #[test]
    fn zone_counts_follow_thirds() {
        let frame = frame_with_rows(4, 9, &[1, 4, 5, 8]);
        let analysis = FrameSampler::new(&DetectionSettings::default()).analyze(&frame);
        assert_eq!(analysis.zones, ZoneCounts { top: 4, center: 8, bottom: 4 });
        assert_eq!(analysis.zones.total(), 16);
    }
}
