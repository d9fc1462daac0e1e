use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

use crate::domain::crop::{IMAGE_LEN, NUM_COORDINATES};
use crate::domain::error::LocaliseError;

/// One standardised crop with its one-hot class row and box.
/// Image layout: flattened [28, 28, 3] (height, width, channel).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalisationItem {
    pub image:       Vec<f32>,
    pub class_label: Vec<f32>,
    pub bbox:        Vec<f32>,
}

impl LocalisationItem {
    /// Index of the hot entry of the class row.
    pub fn class_index(&self) -> Option<usize> {
        self.class_label.iter().position(|&v| v == 1.0)
    }
}

/// Validated, in-memory training set. Every item has the image size,
/// class-row width and box arity the network expects, and every class
/// row is strictly one-hot.
pub struct LocalisationDataset {
    items:       Vec<LocalisationItem>,
    num_classes: usize,
}

impl LocalisationDataset {
    pub fn new(items: Vec<LocalisationItem>, num_classes: usize) -> Result<Self, LocaliseError> {
        for (i, item) in items.iter().enumerate() {
            if item.image.len() != IMAGE_LEN {
                return Err(LocaliseError::Dataset(format!(
                    "item {i}: image has {} values, expected {IMAGE_LEN}",
                    item.image.len()
                )));
            }
            if item.class_label.len() != num_classes {
                return Err(LocaliseError::Dataset(format!(
                    "item {i}: class row has {} columns, expected {num_classes}",
                    item.class_label.len()
                )));
            }
            let ones  = item.class_label.iter().filter(|&&v| v == 1.0).count();
            let zeros = item.class_label.iter().filter(|&&v| v == 0.0).count();
            if ones != 1 || ones + zeros != num_classes {
                return Err(LocaliseError::Dataset(format!(
                    "item {i}: class row is not one-hot"
                )));
            }
            if item.bbox.len() != NUM_COORDINATES {
                return Err(LocaliseError::Dataset(format!(
                    "item {i}: box has {} coordinates, expected {NUM_COORDINATES}",
                    item.bbox.len()
                )));
            }
        }
        Ok(Self { items, num_classes })
    }

    /// Width of every class row.
    pub fn num_classes(&self) -> usize { self.num_classes }
}

impl Dataset<LocalisationItem> for LocalisationDataset {
    fn get(&self, index: usize) -> Option<LocalisationItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}
