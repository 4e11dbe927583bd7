//! Rasterise samples: a single digit as a grayscale PNG, and the mean image
//! of one digit as a heat map.

use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use image::{GrayImage, ImageFormat, Luma, RgbImage};
use log::info;

use crate::color::HeatPalette;
use crate::data::model::{LabeledSplit, Sample};

/// Grayscale image of one sample. Intensities in `[0, 1]` map to `0..=255`.
pub fn digit_image(sample: &Sample, side: usize) -> Result<GrayImage> {
    ensure!(side > 0, "image side must be positive");
    ensure!(
        sample.pixels.len() == side * side,
        "sample has {} pixels, expected {side}x{side}",
        sample.pixels.len()
    );
    let side_u32 = u32::try_from(side).context("image side too large")?;
    Ok(GrayImage::from_fn(side_u32, side_u32, |x, y| {
        let v = sample.pixels[y as usize * side + x as usize];
        Luma([(v.clamp(0.0, 1.0) * 255.0).round() as u8])
    }))
}

/// Per-pixel mean over every sample carrying `label`.
pub fn average_digit(split: &LabeledSplit, label: i64) -> Result<Vec<f64>> {
    let width = split.pixels_per_sample();
    let mut sum = vec![0f64; width];
    let mut count = 0usize;
    for sample in split.samples.iter().filter(|s| s.label == label) {
        for (acc, &p) in sum.iter_mut().zip(&sample.pixels) {
            *acc += p as f64;
        }
        count += 1;
    }
    if count == 0 {
        bail!("no sample is labelled {label}");
    }
    info!("averaged {count} samples of digit {label}");
    for acc in &mut sum {
        *acc /= count as f64;
    }
    Ok(sum)
}

/// Heat map of a square grid, each cell drawn as a `scale`×`scale` block.
/// Values are normalised to the grid's own min/max; a flat grid renders as
/// the palette midpoint.
pub fn heat_map(values: &[f64], side: usize, scale: u32) -> Result<RgbImage> {
    ensure!(side > 0 && scale > 0, "side and scale must be positive");
    ensure!(
        values.len() == side * side,
        "grid has {} cells, expected {side}x{side}",
        values.len()
    );
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;
    let palette = HeatPalette::new();

    let side_u32 = u32::try_from(side).context("image side too large")?;
    let extent = side_u32
        .checked_mul(scale)
        .context("heat map dimensions overflow")?;
    Ok(RgbImage::from_fn(extent, extent, |x, y| {
        let cell = (y / scale) as usize * side + (x / scale) as usize;
        let t = if range > 0.0 {
            (values[cell] - min) / range
        } else {
            0.5
        };
        palette.color_at(t)
    }))
}

/// Write `image` as PNG.
pub fn save_png<P, C>(image: &image::ImageBuffer<P, C>, path: &Path) -> Result<()>
where
    P: image::Pixel + image::PixelWithColorType,
    [P::Subpixel]: image::EncodableLayout,
    C: std::ops::Deref<Target = [P::Subpixel]>,
{
    image
        .save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("writing {}", path.display()))?;
    info!("wrote {}", path.display());
    Ok(())
}
