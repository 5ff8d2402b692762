// THEORY:
// The `Pixel` is the most fundamental unit of the receiver. It is a "dumb" data
// container for one RGBA sample plus the single-pixel heuristics the detection
// core needs: brightness in two flavours. Nothing in here knows about
// neighbours, zones, or time; that belongs to the sampler and the trackers.
//
// - `brightness` (Rec. 601 luma) is the acceptance bound used by every colour
//   profile. The weights are fixed and never configurable.
// - `luma_709` (Rec. 709) is only used to estimate the ambient light level of a
//   frame for threshold auto-adaptation.

pub type Channel = u8;
pub type Brightness = f64;

pub const CHANNELS: usize = 4;

/// A single RGBA pixel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pixel {
    /// The red channel value (0-255).
    pub red: Channel,
    /// The green channel value (0-255).
    pub green: Channel,
    /// The blue channel value (0-255).
    pub blue: Channel,
    /// The alpha channel value (0-255). Carried through, never inspected.
    pub alpha: Channel,
}

impl Pixel {
    pub fn new(red: Channel, green: Channel, blue: Channel, alpha: Channel) -> Self {
        Self { red, green, blue, alpha }
    }

    /// Opaque pixel from an RGB triple.
    pub fn rgb(red: Channel, green: Channel, blue: Channel) -> Self {
        Self::new(red, green, blue, 255)
    }

    /// Perceived brightness (Rec. 601 luma) in 0..255.
    #[inline]
    pub fn brightness(&self) -> Brightness {
        0.299_f64 * self.red as f64 + 0.587_f64 * self.green as f64 + 0.114_f64 * self.blue as f64
    }

    /// Rec. 709 luma in 0..255.
    #[inline]
    pub fn luma_709(&self) -> Brightness {
        0.2126_f64 * self.red as f64 + 0.7152_f64 * self.green as f64 + 0.0722_f64 * self.blue as f64
    }

    /// True when every colour channel exceeds `level`. Used to reject white glare.
    #[inline]
    pub fn all_channels_above(&self, level: Channel) -> bool {
        self.red > level && self.green > level && self.blue > level
    }
}

impl From<&[u8]> for Pixel {
    /// Reads the first four bytes as RGBA. Shorter slices are zero-padded.
    fn from(bytes: &[u8]) -> Self {
        let at = |i: usize| bytes.get(i).copied().unwrap_or(0);
        Pixel::new(at(0), at(1), at(2), at(3))
    }
}

impl From<Pixel> for [u8; CHANNELS] {
    fn from(pixel: Pixel) -> Self {
        [pixel.red, pixel.green, pixel.blue, pixel.alpha]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brightness_uses_rec601_weights() {
        let pixel = Pixel::rgb(0, 255, 90);
        assert!((pixel.brightness() - 159.945).abs() < 1e-9);
        assert_eq!(Pixel::rgb(0, 0, 0).brightness(), 0.0);
        assert!((Pixel::rgb(255, 255, 255).brightness() - 255.0).abs() < 1e-9);
    }

    #[test]
    fn luma_709_differs_from_601() {
        let pixel = Pixel::rgb(0, 255, 0);
        assert!((pixel.luma_709() - 182.376).abs() < 1e-9);
        assert!(pixel.luma_709() > pixel.brightness());
    }

    #[test]
    fn from_bytes_reads_rgba_order() {
        let bytes = [10u8, 20, 30, 40];
        assert_eq!(Pixel::from(&bytes[..]), Pixel::new(10, 20, 30, 40));
        let bytes: [u8; CHANNELS] = Pixel::new(1, 2, 3, 4).into();
        assert_eq!(bytes, [1, 2, 3, 4]);
    }

    #[test]
    fn near_white_check_is_strict() {
        assert!(Pixel::rgb(121, 121, 121).all_channels_above(120));
        assert!(!Pixel::rgb(120, 200, 200).all_channels_above(120));
    }
}
