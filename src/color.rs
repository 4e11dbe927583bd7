use image::Rgb;
use palette::{IntoColor, Lab, Mix, Srgb};

// ---------------------------------------------------------------------------
// Diverging heat-map palette
// ---------------------------------------------------------------------------

/// Moreland's smooth cool-warm endpoints.
const COLD: (u8, u8, u8) = (59, 76, 192);
const NEUTRAL: (u8, u8, u8) = (221, 221, 221);
const HOT: (u8, u8, u8) = (180, 4, 38);

/// Blue → white → red ramp, interpolated in CIE Lab so the brightness
/// changes evenly on both halves.
#[derive(Debug, Clone, Copy)]
pub struct HeatPalette {
    cold: Lab,
    neutral: Lab,
    hot: Lab,
}

fn to_lab((r, g, b): (u8, u8, u8)) -> Lab {
    let rgb: Srgb = Srgb::new(r, g, b).into_format();
    rgb.into_color()
}

impl Default for HeatPalette {
    fn default() -> Self {
        Self::new()
    }
}

impl HeatPalette {
    pub fn new() -> Self {
        HeatPalette {
            cold: to_lab(COLD),
            neutral: to_lab(NEUTRAL),
            hot: to_lab(HOT),
        }
    }

    /// Colour for `t` in `[0, 1]`; values outside are clamped, NaN maps to
    /// the neutral midpoint.
    pub fn color_at(&self, t: f64) -> Rgb<u8> {
        let t = if t.is_nan() { 0.5 } else { t.clamp(0.0, 1.0) } as f32;
        let lab = if t < 0.5 {
            self.cold.mix(self.neutral, t * 2.0)
        } else {
            self.neutral.mix(self.hot, (t - 0.5) * 2.0)
        };
        let rgb: Srgb = lab.into_color();
        let rgb: Srgb<u8> = rgb.into_format();
        Rgb([rgb.red, rgb.green, rgb.blue])
    }
}
