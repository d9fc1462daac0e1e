// ============================================================
// Layer 4 — Synthetic Crop Source
// ============================================================
// Generates random crops in memory so the full pipeline can be
// exercised without a prepared dataset. Pixels are uniform in
// [0, 1), boxes are (x, y, w, h) with the box kept inside the
// unit square, and categories are drawn uniformly.
//
// A seeded StdRng makes two sources with the same seed produce
// exactly the same crops.

use anyhow::{bail, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::domain::crop::{AnnotatedCrop, IMAGE_LEN};
use crate::domain::traits::CropSource;

pub struct SyntheticSource {
    samples:    usize,
    categories: Vec<String>,
    seed:       u64,
}

impl SyntheticSource {
    /// `num_classes` categories named `class_00`, `class_01`, ...
    pub fn new(samples: usize, num_classes: usize, seed: u64) -> Self {
        let categories = (0..num_classes).map(|i| format!("class_{i:02}")).collect();
        Self { samples, categories, seed }
    }
}

impl CropSource for SyntheticSource {
    fn load_all(&self) -> Result<Vec<AnnotatedCrop>> {
        if self.categories.is_empty() {
            bail!("synthetic data needs at least one category");
        }
        let mut rng = StdRng::seed_from_u64(self.seed);

        let crops = (0..self.samples)
            .map(|_| {
                let pixels: Vec<f32> = (0..IMAGE_LEN).map(|_| rng.gen::<f32>()).collect();
                let w = rng.gen_range(0.1f32..0.5);
                let h = rng.gen_range(0.1f32..0.5);
                let x = rng.gen_range(0.0f32..1.0 - w);
                let y = rng.gen_range(0.0f32..1.0 - h);
                let category = &self.categories[rng.gen_range(0..self.categories.len())];
                AnnotatedCrop::new(pixels, vec![x, y, w, h], category.clone())
            })
            .collect();

        Ok(crops)
    }
}
