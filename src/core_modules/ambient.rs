// THEORY:
// A green laser dot looks very different on a dim wall than in daylight. When
// auto-adapt is enabled the sampler first estimates the frame's ambient light
// from a sparse set of pixels and shifts the green intensity floor against it:
// brighter scenes lower the floor, darker scenes raise it. The estimate reads
// only every 300th pixel.

use crate::core_modules::frame::FrameBuffer;
use crate::core_modules::settings::{DetectionSettings, LaserColor};

/// Pixel step used when estimating ambient light.
pub const AMBIENT_PIXEL_STEP: usize = 300;
/// Ambient level at which the configured sensitivity is used unchanged.
pub const NEUTRAL_AMBIENT: f64 = 120.0;
/// Sensitivity change per unit of ambient luma.
pub const ADAPT_GAIN: f64 = 0.2;
pub const ADAPTED_MIN: f64 = 100.0;
pub const ADAPTED_MAX: f64 = 240.0;

/// Rounded mean Rec. 709 luma over every `AMBIENT_PIXEL_STEP`-th pixel.
pub fn ambient_level(frame: &FrameBuffer) -> u8 {
    let (sum, count) = frame
        .pixels()
        .step_by(AMBIENT_PIXEL_STEP)
        .fold((0.0_f64, 0usize), |(sum, count), p| (sum + p.luma_709(), count + 1));
    if count == 0 {
        return NEUTRAL_AMBIENT as u8;
    }
    (sum / count as f64).round().clamp(0.0, 255.0) as u8
}

/// The sensitivity for a given ambient level.
pub fn adapted_sensitivity(base: u8, ambient: u8) -> u8 {
    (base as f64 - (ambient as f64 - NEUTRAL_AMBIENT) * ADAPT_GAIN)
        .round()
        .clamp(ADAPTED_MIN, ADAPTED_MAX) as u8
}

/// Effective sensitivity for this frame and, when it was measured, the ambient level.
///
/// Adaptation only applies to the green profile.
pub fn effective_sensitivity(frame: &FrameBuffer, settings: &DetectionSettings) -> (u8, Option<u8>) {
    if !settings.auto_adapt || settings.laser_color != LaserColor::Green {
        return (settings.sensitivity, None);
    }
    let ambient = ambient_level(frame);
    let adapted = adapted_sensitivity(settings.sensitivity, ambient);
    log::trace!("ambient {ambient} -> sensitivity {adapted}");
    (adapted, Some(ambient))
}
