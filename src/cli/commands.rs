// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands: `train` and `status`.
//
// `train` flags are all optional overrides: the base config
// comes from `--config <file.json>` (or the defaults) and any
// flag given on the command line replaces that one value.
//
// Reference: Rust Book §12 (Building a CLI Program)

use anyhow::Result;
use clap::{Args, Subcommand, ValueEnum};

use crate::application::train_use_case::TrainConfig;
use crate::infra::summary::SummaryPolicy;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the classification and/or regression head
    Train(TrainArgs),

    /// Show the latest checkpoint of each head
    Status(StatusArgs),
}

/// Compute backend for training.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendArg {
    /// CPU, pure Rust
    Ndarray,
    /// GPU through WebGPU
    Wgpu,
}

/// What the per-head loss summary records.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SummaryArg {
    /// Loss of the final batch of each epoch
    LastBatch,
    /// Mean batch loss of each epoch
    EpochMean,
    /// Every batch loss, keyed by global step
    PerBatch,
}

impl From<SummaryArg> for SummaryPolicy {
    fn from(a: SummaryArg) -> Self {
        match a {
            SummaryArg::LastBatch => SummaryPolicy::LastBatch,
            SummaryArg::EpochMean => SummaryPolicy::EpochMean,
            SummaryArg::PerBatch => SummaryPolicy::PerBatch,
        }
    }
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// JSON file with a training config; flags override its values
    #[arg(long)]
    pub config: Option<String>,

    /// Directory with data.json, labels.json and names.json
    #[arg(long)]
    pub data_dir: Option<String>,

    /// Train on this many generated crops instead of a dataset
    #[arg(long, conflicts_with = "data_dir")]
    pub synthetic: Option<usize>,

    /// Root directory of the per-head checkpoint directories
    #[arg(long)]
    pub checkpoint_root: Option<String>,

    /// Root directory of the per-head summary directories
    #[arg(long)]
    pub graphs_root: Option<String>,

    #[arg(long)]
    pub epochs: Option<usize>,

    #[arg(long)]
    pub batch_size: Option<usize>,

    #[arg(long)]
    pub lr: Option<f64>,

    /// Width of the classification output
    #[arg(long)]
    pub num_classes: Option<usize>,

    /// Save a checkpoint every N epochs
    #[arg(long)]
    pub checkpoint_every: Option<usize>,

    /// Number of checkpoints kept per head
    #[arg(long)]
    pub max_to_keep: Option<usize>,

    #[arg(long, value_enum)]
    pub summary: Option<SummaryArg>,

    /// Train the classification head (true/false)
    #[arg(long)]
    pub train_classification: Option<bool>,

    /// Train the regression head (true/false)
    #[arg(long)]
    pub train_regression: Option<bool>,

    /// Ask on the terminal which heads to train
    #[arg(long)]
    pub interactive: bool,

    #[arg(long, value_enum, default_value_t = BackendArg::Ndarray)]
    pub backend: BackendArg,

    #[arg(long)]
    pub seed: Option<u64>,
}

impl TrainArgs {
    /// Base config (file or defaults) with every given flag applied.
    /// This is the boundary between Layer 1 and Layer 2: the
    /// application layer never sees clap types.
    pub fn to_config(&self) -> Result<TrainConfig> {
        let mut cfg = match &self.config {
            Some(path) => TrainConfig::load(path)?,
            None => TrainConfig::default(),
        };

        if let Some(dir) = &self.data_dir {
            cfg.data_dir = Some(dir.clone());
        }
        if let Some(n) = self.synthetic {
            cfg.data_dir = None;
            cfg.synthetic_samples = n;
        }
        if let Some(v) = &self.checkpoint_root { cfg.checkpoint_root = v.clone(); }
        if let Some(v) = &self.graphs_root { cfg.graphs_root = v.clone(); }
        if let Some(v) = self.epochs { cfg.epochs = v; }
        if let Some(v) = self.batch_size { cfg.batch_size = v; }
        if let Some(v) = self.lr { cfg.lr = v; }
        if let Some(v) = self.num_classes { cfg.num_classes = v; }
        if let Some(v) = self.checkpoint_every { cfg.checkpoint_every = v; }
        if let Some(v) = self.max_to_keep { cfg.max_to_keep = v; }
        if let Some(v) = self.summary { cfg.summary_policy = v.into(); }
        if let Some(v) = self.train_classification { cfg.train_classification = v; }
        if let Some(v) = self.train_regression { cfg.train_regression = v; }
        if let Some(v) = self.seed { cfg.seed = v; }

        Ok(cfg)
    }
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// JSON file with a training config (for directory names)
    #[arg(long)]
    pub config: Option<String>,

    #[arg(long)]
    pub checkpoint_root: Option<String>,
}

impl StatusArgs {
    pub fn to_config(&self) -> Result<TrainConfig> {
        let mut cfg = match &self.config {
            Some(path) => TrainConfig::load(path)?,
            None => TrainConfig::default(),
        };
        if let Some(root) = &self.checkpoint_root {
            cfg.checkpoint_root = root.clone();
        }
        Ok(cfg)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    fn train_args(argv: &[&str]) -> TrainArgs {
        let cli = Cli::try_parse_from(std::iter::once("localise-net").chain(argv.iter().copied())).unwrap();
        match cli.command {
            Commands::Train(args) => args,
            other => panic!("expected train, got {other:?}"),
        }
    }

    #[test]
    fn test_defaults_without_flags() {
        let cfg = train_args(&["train"]).to_config().unwrap();
        assert_eq!(cfg, TrainConfig::default());
    }

    #[test]
    fn test_flags_override_config() {
        let args = train_args(&[
            "train",
            "--epochs", "3",
            "--batch-size", "32",
            "--train-regression", "false",
            "--summary", "epoch-mean",
            "--synthetic", "64",
        ]);
        assert_eq!(args.backend, BackendArg::Ndarray);
        let cfg = args.to_config().unwrap();
        assert_eq!(cfg.epochs, 3);
        assert_eq!(cfg.batch_size, 32);
        assert!(cfg.train_classification);
        assert!(!cfg.train_regression);
        assert_eq!(cfg.summary_policy, SummaryPolicy::EpochMean);
        assert_eq!(cfg.synthetic_samples, 64);
        assert!(cfg.data_dir.is_none());
    }

    #[test]
    fn test_data_dir_and_synthetic_conflict() {
        let result = Cli::try_parse_from(["localise-net", "train", "--data-dir", "d", "--synthetic", "8"]);
        assert!(result.is_err());
    }
}
