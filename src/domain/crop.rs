// ============================================================
// Layer 3 — AnnotatedCrop Domain Type
// ============================================================
// One object crop cut out of a larger photograph, together
// with its category name and its bounding box.
//
// Pixels are stored flattened in height → width → channel
// order (NHWC without the batch axis), which is the layout
// the raw arrays arrive in.

use serde::{Deserialize, Serialize};

/// Height of every crop in pixels.
pub const IMAGE_HEIGHT: usize = 28;

/// Width of every crop in pixels.
pub const IMAGE_WIDTH: usize = 28;

/// Colour channels per pixel (RGB).
pub const IMAGE_CHANNELS: usize = 3;

/// Number of floats in one flattened crop.
pub const IMAGE_LEN: usize = IMAGE_HEIGHT * IMAGE_WIDTH * IMAGE_CHANNELS;

/// Axis-aligned boxes are described by four coordinates.
pub const NUM_COORDINATES: usize = 4;

/// A raw crop before one-hot encoding and standardisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedCrop {
    /// Flattened pixel values, `IMAGE_LEN` long once validated
    pub pixels: Vec<f32>,

    /// Box coordinates, `NUM_COORDINATES` long once validated
    pub bbox: Vec<f32>,

    /// Category name, e.g. "dog" or "bicycle"
    pub category: String,
}

impl AnnotatedCrop {
    pub fn new(pixels: Vec<f32>, bbox: Vec<f32>, category: impl Into<String>) -> Self {
        Self {
            pixels,
            bbox,
            category: category.into(),
        }
    }
}
