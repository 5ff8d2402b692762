// Bridges still images on disk and `FrameBuffer`s: loading camera captures for
// offline runs, and writing annotated frames back out for inspection.

use crate::core_modules::frame::FrameBuffer;
use crate::core_modules::frame_sampler::FrameSampling;
use crate::core_modules::pixel::Pixel;
use crate::error::Result;
use image::{ImageEncoder, RgbaImage};
use std::path::Path;

const BAND_COLOR: Pixel = Pixel { red: 4, green: 248, blue: 212, alpha: 255 };
const LASER_ROW_COLOR: Pixel = Pixel { red: 255, green: 0, blue: 255, alpha: 255 };

/// Decodes any format the `image` crate understands into an RGBA frame.
pub fn load_frame(path: &Path) -> Result<FrameBuffer> {
    let image = image::open(path)?.to_rgba8();
    frame_from_image(image)
}

pub fn frame_from_image(image: RgbaImage) -> Result<FrameBuffer> {
    let (width, height) = image.dimensions();
    FrameBuffer::new(width, height, image.into_raw())
}

/// Writes a frame as PNG.
pub fn save_frame(path: &Path, frame: &FrameBuffer) -> Result<()> {
    let output = std::fs::File::create(path)?;
    let encoder = image::codecs::png::PngEncoder::new(output);
    encoder.write_image(frame.as_bytes(), frame.width(), frame.height(), image::ExtendedColorType::Rgba8)?;
    Ok(())
}

/// Copy of `frame` with the scan band edges and the detected laser row drawn in.
pub fn annotate(frame: &FrameBuffer, sampling: &FrameSampling, smoothed_y: Option<f64>) -> FrameBuffer {
    let mut out = frame.clone();
    let height = frame.height();
    let (first, end) = sampling.scan_band;
    let mut draw_row = |y: u32, color: Pixel| {
        if y < height {
            for x in 0..frame.width() {
                out.set_pixel(x, y, color);
            }
        }
    };
    if first > 0 {
        draw_row(first, BAND_COLOR);
    }
    if end < height {
        draw_row(end.saturating_sub(1), BAND_COLOR);
    }
    if let Some(y) = smoothed_y.or(sampling.sample.map(|s| s.y)) {
        draw_row(y.round().clamp(0.0, (height - 1) as f64) as u32, LASER_ROW_COLOR);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::frame_sampler::FrameSampler;
    use crate::core_modules::settings::DetectionSettings;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("laser_receiver_{}_{}", std::process::id(), name))
    }

    #[test]
    fn save_and_reload_frame() {
        let mut frame = FrameBuffer::black(40, 30).unwrap();
        frame.set_pixel(7, 11, Pixel::rgb(0, 255, 168));
        let path = temp_path("roundtrip.png");
        save_frame(&path, &frame).expect("Error Saving File.");
        let loaded = load_frame(&path).expect("Error Loading File.");
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, frame);
    }

    #[test]
    fn reloaded_frame_samples_identically() {
        let mut frame = FrameBuffer::black(64, 48).unwrap();
        for x in 0..64 {
            frame.set_pixel(x, 20, Pixel::rgb(0, 255, 168));
        }
        let path = temp_path("laser_line.png");
        save_frame(&path, &frame).expect("Error Saving File.");
        let loaded = load_frame(&path).expect("Error Loading File.");
        std::fs::remove_file(&path).ok();

        let settings = DetectionSettings::default();
        let sampler = FrameSampler::new(&settings);
        assert_eq!(sampler.sample(&loaded), sampler.sample(&frame));
    }

    #[test]
    fn annotate_marks_band_and_laser_row() {
        let mut frame = FrameBuffer::black(10, 20).unwrap();
        frame.set_pixel(3, 8, Pixel::rgb(0, 255, 168));
        let settings = DetectionSettings { detection_area: 50, ..DetectionSettings::default() };
        let sampling = FrameSampler::new(&settings).analyze(&frame);
        let out = annotate(&frame, &sampling, None);
        assert_eq!(out.pixel(0, 5), BAND_COLOR);
        assert_eq!(out.pixel(9, 14), BAND_COLOR);
        assert_eq!(out.pixel(5, 8), LASER_ROW_COLOR);
        assert_eq!(out.pixel(5, 0), Pixel::rgb(0, 0, 0));
    }
}
