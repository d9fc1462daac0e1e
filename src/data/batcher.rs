// ============================================================
// Layer 4 — Localisation Batcher
// ============================================================
// Implements Burn's Batcher trait to convert a Vec of
// LocalisationItems into tensors on the training device.
//
// How batching works here:
//   Input:  N items, each image flattened to 28·28·3 floats
//   Output: images [N, 28, 28, 3], class labels [N, C],
//           boxes [N, 4]
//
//   Every item was validated by LocalisationDataset, so all
//   rows have identical widths and a plain flatten + reshape
//   is enough.
//
// Batches are cut from the dataset as contiguous, fixed-size
// windows: `batch_ranges` yields ⌊N / B⌋ ranges and drops the
// N mod B trailing samples.
//
// Reference: Burn Book §4 (Batcher)

use std::ops::Range;

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::dataset::LocalisationItem;
use crate::domain::crop::{IMAGE_CHANNELS, IMAGE_HEIGHT, IMAGE_WIDTH, NUM_COORDINATES};

// ─── LocalisationBatch ────────────────────────────────────────────────────────
/// A mini-batch ready for the forward pass.
#[derive(Debug, Clone)]
pub struct LocalisationBatch<B: Backend> {
    /// Standardised crops — shape: [batch, 28, 28, 3]
    pub images: Tensor<B, 4>,

    /// One-hot class rows — shape: [batch, num_classes]
    pub class_labels: Tensor<B, 2>,

    /// Box coordinates — shape: [batch, 4]
    pub boxes: Tensor<B, 2>,
}

impl<B: Backend> LocalisationBatch<B> {
    pub fn size(&self) -> usize {
        self.images.dims()[0]
    }
}

// ─── LocalisationBatcher ──────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct LocalisationBatcher<B: Backend> {
    device: B::Device,
}

impl<B: Backend> LocalisationBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<LocalisationItem, LocalisationBatch<B>> for LocalisationBatcher<B> {
    fn batch(&self, items: Vec<LocalisationItem>) -> LocalisationBatch<B> {
        let batch_size  = items.len();
        let num_classes = items.first().map_or(0, |item| item.class_label.len());

        let images: Vec<f32> = items.iter().flat_map(|i| i.image.iter().copied()).collect();
        let labels: Vec<f32> = items.iter().flat_map(|i| i.class_label.iter().copied()).collect();
        let boxes:  Vec<f32> = items.iter().flat_map(|i| i.bbox.iter().copied()).collect();

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(images, [batch_size, IMAGE_HEIGHT, IMAGE_WIDTH, IMAGE_CHANNELS]),
            &self.device,
        );
        let class_labels = Tensor::<B, 2>::from_data(
            TensorData::new(labels, [batch_size, num_classes]),
            &self.device,
        );
        let boxes = Tensor::<B, 2>::from_data(
            TensorData::new(boxes, [batch_size, NUM_COORDINATES]),
            &self.device,
        );

        LocalisationBatch { images, class_labels, boxes }
    }
}

/// Contiguous `batch_size` windows over `len` samples; the remainder
/// that does not fill a whole batch is never yielded.
pub fn batch_ranges(len: usize, batch_size: usize) -> impl Iterator<Item = Range<usize>> {
    let batches = if batch_size == 0 { 0 } else { len / batch_size };
    (0..batches).map(move |j| j * batch_size..(j + 1) * batch_size)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::crop::IMAGE_LEN;
    use burn::backend::NdArray;

    #[test]
    fn test_exact_multiple_uses_every_sample() {
        let ranges: Vec<_> = batch_ranges(256, 128).collect();
        assert_eq!(ranges, vec![0..128, 128..256]);
    }

    #[test]
    fn test_remainder_is_dropped() {
        for (len, bs) in [(10, 4), (7, 3), (129, 128), (5, 5), (3, 8)] {
            let ranges: Vec<_> = batch_ranges(len, bs).collect();
            assert_eq!(ranges.len(), len / bs);
            let fed: usize = ranges.iter().map(|r| r.len()).sum();
            assert_eq!(fed, (len / bs) * bs);
            assert!(ranges.iter().all(|r| r.end <= (len / bs) * bs));
        }
    }

    #[test]
    fn test_zero_batch_size_yields_nothing() {
        assert_eq!(batch_ranges(10, 0).count(), 0);
    }

    #[test]
    fn test_batch_shapes() {
        let device = Default::default();
        let batcher = LocalisationBatcher::<NdArray>::new(device);
        let item = LocalisationItem {
            image: vec![0.5; IMAGE_LEN],
            class_label: vec![0.0, 0.0, 1.0],
            bbox: vec![0.1, 0.2, 0.3, 0.4],
        };
        let batch = batcher.batch(vec![item.clone(), item]);

        assert_eq!(batch.size(), 2);
        assert_eq!(batch.images.dims(), [2, 28, 28, 3]);
        assert_eq!(batch.class_labels.dims(), [2, 3]);
        assert_eq!(batch.boxes.dims(), [2, 4]);
    }
}
