/// Feature extraction strategies. Each strategy is a pure function from a
/// normalized 28x28 image to a flat feature vector whose length is fixed by
/// the strategy alone, so it can be checked against a model's weight matrix
/// before any arithmetic happens.

use ndarray::{Array1, Array2};

use crate::preprocessing::{NormalizedImage, IMAGE_SIZE};

/// Side length of the averaging blocks used by `BlockAverage`.
pub const BLOCK_SIZE: usize = 2;

const SOBEL_X: [[f32; 3]; 3] = [[-1.0, 0.0, 1.0], [-2.0, 0.0, 2.0], [-1.0, 0.0, 1.0]];
const SOBEL_Y: [[f32; 3]; 3] = [[-1.0, -2.0, -1.0], [0.0, 0.0, 0.0], [1.0, 2.0, 1.0]];

// Keeps the edge map finite when the gradient is zero everywhere.
const EDGE_RESCALE_EPSILON: f32 = 1e-8;

/// The closed set of feature extraction strategies. Every strategy is paired
/// with its own trained weight matrix in the registry; there is no open-ended
/// dispatch and no fallback between strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    Pixel,
    EdgeMagnitude,
    BlockAverage,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [
        Strategy::Pixel,
        Strategy::EdgeMagnitude,
        Strategy::BlockAverage,
    ];

    /// The wire names accepted in the `model_type` request field.
    pub fn from_name(name: &str) -> Option<Strategy> {
        match name {
            "pixel" => Some(Strategy::Pixel),
            "sobel" => Some(Strategy::EdgeMagnitude),
            "block" => Some(Strategy::BlockAverage),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Pixel => "pixel",
            Strategy::EdgeMagnitude => "sobel",
            Strategy::BlockAverage => "block",
        }
    }

    /// Length of the vector `extract` produces. A pure function of the
    /// strategy and the fixed 28x28 input size.
    pub fn feature_len(&self) -> usize {
        match self {
            Strategy::Pixel => IMAGE_SIZE * IMAGE_SIZE,
            Strategy::EdgeMagnitude => 2 * IMAGE_SIZE * IMAGE_SIZE,
            Strategy::BlockAverage => {
                (IMAGE_SIZE / BLOCK_SIZE) * (IMAGE_SIZE / BLOCK_SIZE)
            }
        }
    }

    pub fn extract(&self, image: &NormalizedImage) -> Array1<f32> {
        match self {
            Strategy::Pixel => pixel_features(image),
            Strategy::EdgeMagnitude => edge_features(image),
            Strategy::BlockAverage => block_features(image),
        }
    }
}

/// Row-major flatten of the grid; no transform beyond reshaping.
fn pixel_features(image: &NormalizedImage) -> Array1<f32> {
    Array1::from_iter(image.grid().iter().copied())
}

/// Reflect an out-of-bounds index back into `[0, len)` without repeating the
/// edge sample (reflect-101: -1 -> 1, len -> len - 2).
fn reflect(index: isize, len: usize) -> usize {
    let len = len as isize;
    let reflected = if index < 0 {
        -index
    } else if index >= len {
        2 * len - 2 - index
    } else {
        index
    };
    reflected as usize
}

/// Sobel edge magnitude stacked with the original intensities.
///
/// Applies the two 3x3 directional kernels at every pixel, takes the
/// Euclidean norm of the gradient pair, and rescales the whole map by its
/// maximum. The output interleaves [intensity, edge] per pixel, row-major,
/// channel-minor, so it is twice the pixel count long.
fn edge_features(image: &NormalizedImage) -> Array1<f32> {
    let grid = image.grid();

    let mut magnitude = Array2::<f32>::zeros((IMAGE_SIZE, IMAGE_SIZE));
    for row in 0..IMAGE_SIZE {
        for col in 0..IMAGE_SIZE {
            let mut gx = 0.0f32;
            let mut gy = 0.0f32;
            for dr in -1isize..=1 {
                for dc in -1isize..=1 {
                    let sample = grid[[
                        reflect(row as isize + dr, IMAGE_SIZE),
                        reflect(col as isize + dc, IMAGE_SIZE),
                    ]];
                    gx += SOBEL_X[(dr + 1) as usize][(dc + 1) as usize] * sample;
                    gy += SOBEL_Y[(dr + 1) as usize][(dc + 1) as usize] * sample;
                }
            }
            magnitude[[row, col]] = (gx * gx + gy * gy).sqrt();
        }
    }

    let max = magnitude.iter().copied().fold(0.0f32, f32::max);
    let scale = 1.0 / (max + EDGE_RESCALE_EPSILON);

    let mut features = Array1::<f32>::zeros(2 * IMAGE_SIZE * IMAGE_SIZE);
    for row in 0..IMAGE_SIZE {
        for col in 0..IMAGE_SIZE {
            let offset = 2 * (row * IMAGE_SIZE + col);
            features[offset] = grid[[row, col]];
            features[offset + 1] = magnitude[[row, col]] * scale;
        }
    }
    features
}

/// Mean of each non-overlapping 2x2 block, flattened row-major. Trailing
/// rows and columns that do not fill a complete block are cropped; with a
/// 28x28 input that crop is a no-op.
fn block_features(image: &NormalizedImage) -> Array1<f32> {
    let grid = image.grid();
    let blocks_per_side = IMAGE_SIZE / BLOCK_SIZE;

    let mut features = Array1::<f32>::zeros(blocks_per_side * blocks_per_side);
    for block_row in 0..blocks_per_side {
        for block_col in 0..blocks_per_side {
            let mut sum = 0.0f32;
            for row in block_row * BLOCK_SIZE..(block_row + 1) * BLOCK_SIZE {
                for col in block_col * BLOCK_SIZE..(block_col + 1) * BLOCK_SIZE {
                    sum += grid[[row, col]];
                }
            }
            features[block_row * blocks_per_side + block_col] =
                sum / (BLOCK_SIZE * BLOCK_SIZE) as f32;
        }
    }
    features
}
