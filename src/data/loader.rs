// ============================================================
// Layer 4 — Crop Loader
// ============================================================
// Loads a localisation dataset stored as three parallel JSON
// arrays inside one directory:
//
//   data.json    — N images, each either a flat array of
//                  28·28·3 floats or a nested [28][28][3] array
//   labels.json  — N boxes, 4 floats each
//   names.json   — N category names
//
// Entry i of each file describes the same crop. The three
// arrays must have the same length; anything else is an error
// because silently truncating would misalign labels and images.
//
// Reference: serde_json crate documentation
//            Rust Book §9 (Error Handling)

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::{fs, path::{Path, PathBuf}};

use crate::domain::crop::AnnotatedCrop;
use crate::domain::traits::CropSource;

pub const DATA_FILE:  &str = "data.json";
pub const BOX_FILE:   &str = "labels.json";
pub const CLASS_FILE: &str = "names.json";

/// An image either already flattened or nested as rows × columns × channels.
#[derive(Deserialize)]
#[serde(untagged)]
enum PixelArray {
    Flat(Vec<f32>),
    Nested(Vec<Vec<Vec<f32>>>),
}

impl PixelArray {
    fn into_flat(self) -> Vec<f32> {
        match self {
            PixelArray::Flat(values) => values,
            PixelArray::Nested(rows) => rows.into_iter().flatten().flatten().collect(),
        }
    }
}

/// Reads the three dataset files from a directory.
pub struct JsonCropLoader {
    dir: PathBuf,
}

impl JsonCropLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl CropSource for JsonCropLoader {
    fn load_all(&self) -> Result<Vec<AnnotatedCrop>> {
        let images: Vec<PixelArray> = read_json(&self.dir.join(DATA_FILE))?;
        let boxes:  Vec<Vec<f32>>   = read_json(&self.dir.join(BOX_FILE))?;
        let names:  Vec<String>     = read_json(&self.dir.join(CLASS_FILE))?;

        if images.len() != boxes.len() || images.len() != names.len() {
            bail!(
                "dataset files in '{}' disagree on length: {} images, {} boxes, {} names",
                self.dir.display(),
                images.len(),
                boxes.len(),
                names.len()
            );
        }

        let crops: Vec<AnnotatedCrop> = images
            .into_iter()
            .zip(boxes)
            .zip(names)
            .map(|((pixels, bbox), name)| AnnotatedCrop::new(pixels.into_flat(), bbox, name))
            .collect();

        tracing::info!("Loaded {} crops from '{}'", crops.len(), self.dir.display());
        Ok(crops)
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Cannot read '{}'", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Cannot parse '{}'", path.display()))
}
