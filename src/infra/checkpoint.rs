// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores one head's training state with Burn's
// NamedMpkGzFileRecorder at full precision, so restored
// parameters are bit-identical to the saved ones.
//
// What gets saved per checkpoint:
//   1. Network parameters      <tag>.mpk.gz
//   2. Adam moment estimates   <tag>-optim.mpk.gz
//   3. The pointer file        checkpoint (JSON)
//
// The pointer names the latest tag together with its epoch,
// global step, head and parameter layout, plus every retained
// tag. It is written last (temp file + rename), so a crash
// mid-save leaves the previous checkpoint as the latest one.
// A save must move past the latest epoch: files the pointer
// names are never written again.
//
// File layout (one directory per head):
//   checkpoints/
//     two_layer/
//       checkpoint
//       two_layer-5.mpk.gz
//       two_layer-5-optim.mpk.gz
//       two_layer-10.mpk.gz
//       ...
//     two_layer_reg/
//       ...
//
// At most `max_to_keep` checkpoints are retained; older files
// are deleted once a newer pointer is in place.
//
// Reference: Burn Book §5 (Records and Checkpointing)
//            Rust Book §9 (Error Handling)

use std::{
    fs,
    path::{Path, PathBuf},
};

use burn::{
    module::Module,
    record::{FullPrecisionSettings, NamedMpkGzFileRecorder, Recorder},
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};

use crate::domain::error::LocaliseError;
use crate::domain::head::Head;
use crate::ml::layers::ParamShape;
use crate::ml::model::LocaliseNet;
use crate::ml::optimizer::HeadOptimizer;

pub type CheckpointRecorder = NamedMpkGzFileRecorder<FullPrecisionSettings>;

pub const POINTER_FILE: &str = "checkpoint";
pub const CONFIG_FILE: &str = "train_config.json";
pub const DEFAULT_MAX_TO_KEEP: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    /// File stem of the latest checkpoint, e.g. `two_layer-5`
    pub tag:         String,
    pub head:        Head,
    pub epoch:       usize,
    pub global_step: u64,
    pub layout:      Vec<ParamShape>,
    /// Every tag still on disk, oldest first
    pub retained:    Vec<String>,
}

/// Checkpoints for one head, stored under `<root>/<name>/`.
pub struct CheckpointManager {
    dir:         PathBuf,
    name:        String,
    max_to_keep: usize,
}

impl CheckpointManager {
    /// Nothing is created on disk until the first save.
    pub fn new(root: impl AsRef<Path>, name: impl Into<String>, max_to_keep: usize) -> Self {
        let name = name.into();
        Self {
            dir: root.as_ref().join(&name),
            name,
            max_to_keep: max_to_keep.max(1),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn pointer_path(&self) -> PathBuf {
        self.dir.join(POINTER_FILE)
    }

    fn model_path(&self, tag: &str) -> PathBuf {
        self.dir.join(tag)
    }

    fn optim_path(&self, tag: &str) -> PathBuf {
        self.dir.join(format!("{tag}-optim"))
    }

    /// Reads the pointer file. `Ok(None)` when no checkpoint was ever saved.
    pub fn latest(&self) -> Result<Option<CheckpointMeta>, LocaliseError> {
        let path = self.pointer_path();
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LocaliseError::CheckpointCorrupt { path, reason: e.to_string() }),
        };
        serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| LocaliseError::CheckpointCorrupt { path, reason: e.to_string() })
    }

    /// Writes parameters and optimizer state for `epoch`, then moves the
    /// pointer to the new tag and prunes checkpoints beyond `max_to_keep`.
    /// `epoch` must be later than the latest checkpoint's epoch.
    pub fn save<B: AutodiffBackend>(
        &self,
        net:         &LocaliseNet<B>,
        optimizer:   &HeadOptimizer<B>,
        epoch:       usize,
        global_step: u64,
    ) -> Result<CheckpointMeta, LocaliseError> {
        let write_err = |path: &Path, reason: String| LocaliseError::CheckpointWrite {
            path: path.to_path_buf(),
            reason,
        };
        let previous = self.latest()?;
        if let Some(prev) = previous.as_ref().filter(|prev| epoch <= prev.epoch) {
            return Err(write_err(
                &self.pointer_path(),
                format!("epoch {epoch} does not follow the latest checkpoint '{}' (epoch {})", prev.tag, prev.epoch),
            ));
        }
        fs::create_dir_all(&self.dir).map_err(|e| write_err(&self.dir, e.to_string()))?;

        let tag = format!("{}-{epoch}", self.name);
        let recorder = CheckpointRecorder::new();

        let model_path = self.model_path(&tag);
        recorder
            .record(net.clone().into_record(), model_path.clone())
            .map_err(|e| write_err(&model_path, format!("{e:?}")))?;

        let optim_path = self.optim_path(&tag);
        recorder
            .record(optimizer.to_record(), optim_path.clone())
            .map_err(|e| write_err(&optim_path, format!("{e:?}")))?;

        let mut retained = previous.map(|m| m.retained).unwrap_or_default();
        retained.retain(|t| t != &tag);
        retained.push(tag.clone());
        let expired: Vec<String> = if retained.len() > self.max_to_keep {
            retained.drain(..retained.len() - self.max_to_keep).collect()
        } else {
            Vec::new()
        };

        let meta = CheckpointMeta {
            tag,
            head: optimizer.head(),
            epoch,
            global_step,
            layout: net.layout(),
            retained,
        };
        self.write_pointer(&meta)?;

        for old in &expired {
            self.remove_files(old);
        }

        tracing::debug!("Saved checkpoint '{}' (step {})", meta.tag, meta.global_step);
        Ok(meta)
    }

    /// Loads the checkpoint described by `meta` into `net` and `optimizer`.
    /// The layout is compared before any file is read.
    pub fn restore<B: AutodiffBackend>(
        &self,
        meta:      &CheckpointMeta,
        net:       LocaliseNet<B>,
        optimizer: &mut HeadOptimizer<B>,
        device:    &B::Device,
    ) -> Result<LocaliseNet<B>, LocaliseError> {
        let model_path = self.model_path(&meta.tag);
        let incompatible = |reason: String| LocaliseError::CheckpointIncompatible {
            path: model_path.clone(),
            reason,
        };

        if meta.head != optimizer.head() {
            return Err(incompatible(format!(
                "saved for the {} head, restoring into the {} head",
                meta.head,
                optimizer.head()
            )));
        }
        let expected = net.layout();
        if let Some(reason) = layout_mismatch(&meta.layout, &expected) {
            return Err(incompatible(reason));
        }

        let recorder = CheckpointRecorder::new();
        let record = recorder
            .load(model_path.clone(), device)
            .map_err(|e| LocaliseError::CheckpointCorrupt { path: model_path.clone(), reason: format!("{e:?}") })?;
        let net = net.load_record(record);

        let optim_path = self.optim_path(&meta.tag);
        let optim_record = recorder
            .load(optim_path.clone(), device)
            .map_err(|e| LocaliseError::CheckpointCorrupt { path: optim_path, reason: format!("{e:?}") })?;
        optimizer.load_record(optim_record);

        tracing::debug!("Restored checkpoint '{}'", meta.tag);
        Ok(net)
    }

    /// Stores the run configuration next to the checkpoints.
    pub fn save_config<T: Serialize>(&self, cfg: &T) -> Result<(), LocaliseError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(CONFIG_FILE);
        fs::write(&path, serde_json::to_string_pretty(cfg)?)?;
        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    fn write_pointer(&self, meta: &CheckpointMeta) -> Result<(), LocaliseError> {
        let path = self.pointer_path();
        let tmp = self.dir.join(format!("{POINTER_FILE}.tmp"));
        let json = serde_json::to_string_pretty(meta)?;
        fs::write(&tmp, json)
            .and_then(|()| fs::rename(&tmp, &path))
            .map_err(|e| LocaliseError::CheckpointWrite { path, reason: e.to_string() })
    }

    fn remove_files(&self, tag: &str) {
        let prefixes = [format!("{tag}."), format!("{tag}-optim.")];
        let Ok(entries) = fs::read_dir(&self.dir) else { return };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if prefixes.iter().any(|p| name.starts_with(p.as_str())) {
                if let Err(e) = fs::remove_file(entry.path()) {
                    tracing::warn!("Could not remove old checkpoint file '{}': {e}", name);
                }
            }
        }
    }
}

fn layout_mismatch(saved: &[ParamShape], expected: &[ParamShape]) -> Option<String> {
    if saved.len() != expected.len() {
        return Some(format!(
            "checkpoint holds {} parameter tensors, model has {}",
            saved.len(),
            expected.len()
        ));
    }
    saved.iter().zip(expected).find(|(s, e)| s != e).map(|(s, e)| {
        format!("`{}` {:?} in checkpoint, `{}` {:?} in model", s.name, s.dims, e.name, e.dims)
    })
}
