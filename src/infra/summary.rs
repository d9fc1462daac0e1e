// ============================================================
// Layer 6 — Loss Summaries
// ============================================================
// Records each head's loss under its own tag so learning curves
// can be plotted after (or during) a run.
//
// Two CSV files per head directory, appended across runs:
//
//   graphs/<head_dir>/scalars.csv
//     tag,step,value
//     cat_loss,1,2.995732
//
//   graphs/<head_dir>/histograms.csv
//     tag,step,count,min,max,mean,std
//     cat_loss,1,2,2.981200,2.995732,2.988466,0.007266
//
// What a scalar row contains depends on the SummaryPolicy:
//
//   LastBatch  one row per epoch, the loss of the final batch
//              (the default; epoch-level granularity)
//   EpochMean  one row per epoch, the mean over all batches
//   PerBatch   one row per optimizer step, keyed by global step
//
// The histogram row always describes every batch loss of the
// epoch, independent of the policy.
//
// Reference: Rust Book §12 (I/O and File Handling)

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::domain::error::LocaliseError;

pub const SCALARS_FILE: &str = "scalars.csv";
pub const HISTOGRAMS_FILE: &str = "histograms.csv";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryPolicy {
    #[default]
    LastBatch,
    EpochMean,
    PerBatch,
}

// ─── HistogramStats ───────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistogramStats {
    pub count: usize,
    pub min:   f64,
    pub max:   f64,
    pub mean:  f64,
    pub std:   f64,
}

impl HistogramStats {
    /// `None` for an empty slice.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let count = values.len();
        let mean = values.iter().sum::<f64>() / count as f64;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some(Self { count, min, max, mean, std: var.sqrt() })
    }
}

// ─── SummaryWriter ────────────────────────────────────────────────────────────
/// Appends summary rows for one head directory.
pub struct SummaryWriter {
    scalars:    PathBuf,
    histograms: PathBuf,
}

impl SummaryWriter {
    /// Creates `dir` if needed and writes CSV headers into new files.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, LocaliseError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let scalars = dir.join(SCALARS_FILE);
        let histograms = dir.join(HISTOGRAMS_FILE);
        write_header(&scalars, "tag,step,value")?;
        write_header(&histograms, "tag,step,count,min,max,mean,std")?;

        tracing::debug!("Writing summaries to '{}'", dir.display());
        Ok(Self { scalars, histograms })
    }

    pub fn scalars_path(&self) -> &Path {
        &self.scalars
    }

    pub fn histograms_path(&self) -> &Path {
        &self.histograms
    }

    pub fn add_scalar(&mut self, tag: &str, step: u64, value: f64) -> Result<(), LocaliseError> {
        let mut f = OpenOptions::new().append(true).open(&self.scalars)?;
        writeln!(f, "{tag},{step},{value:.6}")?;
        Ok(())
    }

    /// Nothing is written for an empty `values`.
    pub fn add_histogram(&mut self, tag: &str, step: u64, values: &[f64]) -> Result<(), LocaliseError> {
        let Some(h) = HistogramStats::from_values(values) else {
            return Ok(());
        };
        let mut f = OpenOptions::new().append(true).open(&self.histograms)?;
        writeln!(
            f,
            "{tag},{step},{},{:.6},{:.6},{:.6},{:.6}",
            h.count, h.min, h.max, h.mean, h.std
        )?;
        Ok(())
    }
}

fn write_header(path: &Path, header: &str) -> Result<(), LocaliseError> {
    if !path.exists() {
        let mut f = fs::File::create(path)?;
        writeln!(f, "{header}")?;
    }
    Ok(())
}

// ─── LossSummary ──────────────────────────────────────────────────────────────
/// Binds a head's loss tag to a recording policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LossSummary {
    tag:    String,
    policy: SummaryPolicy,
}

impl LossSummary {
    pub fn new(tag: impl Into<String>, policy: SummaryPolicy) -> Self {
        Self { tag: tag.into(), policy }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn policy(&self) -> SummaryPolicy {
        self.policy
    }

    /// Called after every optimizer step.
    pub fn on_batch(&self, writer: &mut SummaryWriter, global_step: u64, loss: f64) -> Result<(), LocaliseError> {
        if self.policy == SummaryPolicy::PerBatch {
            writer.add_scalar(&self.tag, global_step, loss)?;
        }
        Ok(())
    }

    /// Called once per epoch with every batch loss of that epoch.
    pub fn on_epoch(&self, writer: &mut SummaryWriter, epoch: usize, batch_losses: &[f64]) -> Result<(), LocaliseError> {
        let step = epoch as u64;
        let scalar = match self.policy {
            SummaryPolicy::LastBatch => batch_losses.last().copied(),
            SummaryPolicy::EpochMean => HistogramStats::from_values(batch_losses).map(|h| h.mean),
            SummaryPolicy::PerBatch => None,
        };
        if let Some(value) = scalar {
            writer.add_scalar(&self.tag, step, value)?;
        }
        writer.add_histogram(&self.tag, step, batch_losses)
    }
}
