// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Load annotated crops          (Layer 4 - data)
//   Step 2: One-hot encode categories     (Layer 4 - data)
//   Step 3: Standardise pixel features    (Layer 4 - data)
//   Step 4: Build the dataset             (Layer 4 - data)
//   Step 5: Build the model container     (Layer 5 - ml)
//   Step 6: Bind optimizers + summaries   (Layer 5 - ml)
//   Step 7: Train the selected heads      (Layer 5 - ml)
//
// Both heads share one container and classification runs first.
// Without a regression checkpoint, regression starts from the
// trunk classification just trained; once one exists, restoring
// it replaces the whole network, trunk included.
//
// Reference: Rust Book §13 (Iterators and Closures)
//            Burn Book §5 (Training)

use std::{fs, path::Path};

use anyhow::{bail, Context, Result};
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

use crate::data::{
    dataset::{LocalisationDataset, LocalisationItem},
    loader::JsonCropLoader,
    preprocessor::{global_moments, one_hot_encode, StandardScaler},
    synthetic::SyntheticSource,
};
use crate::domain::{
    crop::{IMAGE_CHANNELS, IMAGE_HEIGHT, IMAGE_WIDTH, NUM_COORDINATES},
    head::Head,
    traits::CropSource,
};
use crate::infra::{checkpoint::CheckpointManager, summary::SummaryPolicy};
use crate::ml::{
    container::ModelContainer,
    model::LocaliseNetConfig,
    trainer::{run_training, TrainingReport},
};

// ─── Training Configuration ──────────────────────────────────────────────────
// Every knob of a training run. Serialisable so it can be read
// from a JSON file and stored next to the checkpoints. Missing
// keys fall back to the defaults; the upper-case aliases accept
// the names the hyper-parameters are usually written with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub data_dir:             Option<String>,
    pub synthetic_samples:    usize,
    pub checkpoint_root:      String,
    pub graphs_root:          String,
    pub classification_dir:   String,
    pub regression_dir:       String,
    #[serde(alias = "N_EPOCHS")]
    pub epochs:               usize,
    #[serde(alias = "BATCH_SIZE")]
    pub batch_size:           usize,
    #[serde(alias = "LEARNING_RATE")]
    pub lr:                   f64,
    #[serde(alias = "NUM_CLASSES")]
    pub num_classes:          usize,
    #[serde(alias = "NUM_COORDINATES")]
    pub num_coordinates:      usize,
    pub checkpoint_every:     usize,
    pub max_to_keep:          usize,
    pub summary_policy:       SummaryPolicy,
    pub train_classification: bool,
    pub train_regression:     bool,
    pub seed:                 u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_dir:             None,
            synthetic_samples:    512,
            checkpoint_root:      "checkpoints".to_string(),
            graphs_root:          "graphs".to_string(),
            classification_dir:   "two_layer".to_string(),
            regression_dir:       "two_layer_reg".to_string(),
            epochs:               10,
            batch_size:           128,
            lr:                   1e-3,
            num_classes:          20,
            num_coordinates:      NUM_COORDINATES,
            checkpoint_every:     5,
            max_to_keep:          5,
            summary_policy:       SummaryPolicy::LastBatch,
            train_classification: true,
            train_regression:     true,
            seed:                 42,
        }
    }
}

impl TrainConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("Cannot read config from '{}'", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Invalid config file '{}'", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            bail!("BATCH_SIZE must be at least 1");
        }
        if !(self.lr.is_finite() && self.lr > 0.0) {
            bail!("LEARNING_RATE must be positive, got {}", self.lr);
        }
        if self.num_classes == 0 {
            bail!("NUM_CLASSES must be at least 1");
        }
        if self.num_coordinates != NUM_COORDINATES {
            bail!("NUM_COORDINATES must be {NUM_COORDINATES} (x, y, w, h), got {}", self.num_coordinates);
        }
        if self.checkpoint_every == 0 {
            bail!("checkpoint_every must be at least 1");
        }
        if self.max_to_keep == 0 {
            bail!("max_to_keep must be at least 1");
        }
        if self.classification_dir.is_empty() || self.regression_dir.is_empty() {
            bail!("checkpoint directory names must not be empty");
        }
        if self.classification_dir == self.regression_dir {
            bail!("classification and regression need separate checkpoint directories");
        }
        if self.data_dir.is_none() && self.synthetic_samples == 0 {
            bail!("no data directory given and synthetic_samples is 0");
        }
        Ok(())
    }

    /// Checkpoint and summary directory name of `head`.
    pub fn head_dir(&self, head: Head) -> &str {
        match head {
            Head::Classification => &self.classification_dir,
            Head::Regression => &self.regression_dir,
        }
    }

    /// Heads to train, in training order.
    pub fn selected_heads(&self) -> Vec<Head> {
        Head::ALL
            .into_iter()
            .filter(|head| match head {
                Head::Classification => self.train_classification,
                Head::Regression => self.train_regression,
            })
            .collect()
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Execute the full pipeline on backend `B`.
    pub fn execute<B: AutodiffBackend>(&self, device: B::Device) -> Result<Vec<TrainingReport>> {
        let cfg = &self.config;
        cfg.validate()?;
        B::seed(cfg.seed);

        let heads = cfg.selected_heads();
        if heads.is_empty() {
            tracing::info!("Neither head selected for training; nothing to do");
            return Ok(Vec::new());
        }

        // ── Step 1: Load annotated crops ──────────────────────────────────────
        let crops = match &cfg.data_dir {
            Some(dir) => {
                tracing::info!("Loading dataset from '{dir}'");
                JsonCropLoader::new(dir).load_all()?
            }
            None => {
                tracing::info!("Generating {} synthetic crops", cfg.synthetic_samples);
                SyntheticSource::new(cfg.synthetic_samples, cfg.num_classes, cfg.seed).load_all()?
            }
        };
        if crops.is_empty() {
            bail!("dataset is empty");
        }
        tracing::info!(
            "Shape of Data: [{}, {IMAGE_HEIGHT}, {IMAGE_WIDTH}, {IMAGE_CHANNELS}]",
            crops.len()
        );
        tracing::info!("Shape of Labels: [{}, {NUM_COORDINATES}]", crops.len());

        // ── Step 2: One-hot encode the category names ─────────────────────────
        let names: Vec<String> = crops.iter().map(|c| c.category.clone()).collect();
        let one_hot = one_hot_encode(&names, cfg.num_classes)?;
        tracing::info!("Number of categories: {}", one_hot.categories.len());

        // ── Step 3: Standardise every pixel feature ───────────────────────────
        let mut images: Vec<Vec<f32>> = Vec::with_capacity(crops.len());
        let mut boxes: Vec<Vec<f32>> = Vec::with_capacity(crops.len());
        for crop in crops {
            images.push(crop.pixels);
            boxes.push(crop.bbox);
        }
        StandardScaler::fit_transform(&mut images)?;
        let (mean, std) = global_moments(&images);
        tracing::info!("Data normalised: mean={mean:.4}, std={std:.4}");

        // ── Step 4: Build the dataset ─────────────────────────────────────────
        let items: Vec<LocalisationItem> = images
            .into_iter()
            .zip(one_hot.rows)
            .zip(boxes)
            .map(|((image, class_label), bbox)| LocalisationItem { image, class_label, bbox })
            .collect();
        let dataset = LocalisationDataset::new(items, cfg.num_classes)?;

        // ── Step 5: Build the model container ─────────────────────────────────
        let net_cfg = LocaliseNetConfig::new(cfg.num_classes).with_num_coordinates(cfg.num_coordinates);
        let mut container = ModelContainer::<B>::build(net_cfg, cfg.lr, device)?;

        // ── Step 6: Bind optimizers and summaries ─────────────────────────────
        for head in Head::ALL {
            container.bind_optimizer(head);
            container.bind_summary(head, cfg.summary_policy);
        }

        // ── Step 7: Train the selected heads ──────────────────────────────────
        let mut reports = Vec::with_capacity(heads.len());
        for head in heads {
            CheckpointManager::new(&cfg.checkpoint_root, cfg.head_dir(head), cfg.max_to_keep)
                .save_config(cfg)?;
            tracing::info!("Training the {head} head");
            let report = run_training(&mut container, &dataset, head, cfg)
                .with_context(|| format!("training the {head} head failed"))?;
            reports.push(report);
        }

        Ok(reports)
    }
}
