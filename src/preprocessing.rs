/// Preprocessing functions turning an uploaded image into classifier input.
/// Do not use these functions for any other purpose (for example, to load
/// images for display back to the client); the output is tied to the
/// convention the digit models were trained on.

use image::{imageops, imageops::FilterType, DynamicImage};
use ndarray::Array2;

use crate::error::Result;

/// Both dimensions of the canonical classifier input.
pub const IMAGE_SIZE: usize = 28;

/// A 28x28 grid produced by [`normalize`]: grayscale, polarity-corrected to
/// light-ink-on-dark-background, Otsu-binarized, and rescaled so every
/// element is exactly 0.0 or 1.0. Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedImage(Array2<f32>);

impl NormalizedImage {
    pub fn grid(&self) -> &Array2<f32> {
        &self.0
    }

    #[cfg(test)]
    pub(crate) fn from_grid(grid: Array2<f32>) -> NormalizedImage {
        assert_eq!(grid.dim(), (IMAGE_SIZE, IMAGE_SIZE));
        NormalizedImage(grid)
    }
}

/// Decode an uploaded file into an image. Fails with `Error::Decode` if the
/// bytes are not a supported image format; nothing downstream runs in that
/// case.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    Ok(image::load_from_memory(bytes)?)
}

/// Normalize an arbitrary image into the canonical 28x28 binary grid.
///
/// Steps, in order: grayscale, resize to 28x28 (Catmull-Rom), the
/// corner-average polarity rule, Otsu binarization, rescale to {0.0, 1.0}.
/// Every step is deterministic; the polarity inversion is the only decision
/// made from the image content, and it is a single global decision.
pub fn normalize(image: &DynamicImage) -> NormalizedImage {
    let gray = image.to_luma8();
    let gray = imageops::resize(
        &gray,
        IMAGE_SIZE as u32,
        IMAGE_SIZE as u32,
        FilterType::CatmullRom,
    );

    let last = (IMAGE_SIZE - 1) as u32;
    let corner_mean = (gray.get_pixel(0, 0).0[0] as f32
        + gray.get_pixel(last, 0).0[0] as f32
        + gray.get_pixel(0, last).0[0] as f32
        + gray.get_pixel(last, last).0[0] as f32)
        / 4.0;

    // Dark ink on a light background reads as a bright corner average;
    // invert so the foreground is the bright class, as in the training data.
    let mut intensities = Array2::<u8>::zeros((IMAGE_SIZE, IMAGE_SIZE));
    for (x, y, pixel) in gray.enumerate_pixels() {
        let value = pixel.0[0];
        intensities[[y as usize, x as usize]] = if corner_mean > 127.0 {
            255 - value
        } else {
            value
        };
    }

    let threshold = otsu_threshold(&histogram(&intensities));

    let grid = intensities.mapv(|value| if value >= threshold { 1.0 } else { 0.0 });

    NormalizedImage(grid)
}

fn histogram(intensities: &Array2<u8>) -> [u32; 256] {
    let mut histogram = [0u32; 256];
    for &value in intensities {
        histogram[value as usize] += 1;
    }
    histogram
}

/// Otsu's method: pick the split of the intensity histogram that maximizes
/// the between-class variance (equivalently, minimizes the intra-class
/// variance). Returns the first intensity of the upper class, so callers
/// binarize with `value >= threshold`.
fn otsu_threshold(histogram: &[u32; 256]) -> u8 {
    let total: f64 = histogram.iter().map(|&count| count as f64).sum();
    let weighted_sum: f64 = histogram
        .iter()
        .enumerate()
        .map(|(value, &count)| value as f64 * count as f64)
        .sum();

    let mut background_weight = 0.0;
    let mut background_sum = 0.0;
    let mut best_split = 0usize;
    let mut best_variance = -1.0f64;

    for (value, &count) in histogram.iter().enumerate() {
        background_weight += count as f64;
        if background_weight == 0.0 {
            continue;
        }
        let foreground_weight = total - background_weight;
        if foreground_weight == 0.0 {
            break;
        }
        background_sum += value as f64 * count as f64;

        let background_mean = background_sum / background_weight;
        let foreground_mean = (weighted_sum - background_sum) / foreground_weight;
        let difference = background_mean - foreground_mean;
        let between_variance = background_weight * foreground_weight * difference * difference;

        if between_variance > best_variance {
            best_variance = between_variance;
            best_split = value;
        }
    }

    (best_split + 1) as u8
}
