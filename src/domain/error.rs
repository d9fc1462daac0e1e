// ============================================================
// Layer 3 — Error Kinds
// ============================================================
// Every failure the core can report. Construction errors
// (shapes, names, config) surface before any tensor is
// allocated; checkpoint errors surface before training starts.
//
// A missing checkpoint is NOT represented here: callers get
// `Ok(None)` and start fresh.
//
// Reference: Rust Book §9 (Recoverable Errors with Result)
//            thiserror crate documentation

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::head::Head;

#[derive(Debug, Error)]
pub enum LocaliseError {
    #[error("shape mismatch in `{layer}`: {detail}")]
    Shape { layer: String, detail: String },

    #[error("layer name `{0}` is already defined; every layer needs its own scope")]
    NameCollision(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid dataset: {0}")]
    Dataset(String),

    #[error("no {what} has been bound for the {head} head")]
    Unbound { head: Head, what: &'static str },

    #[error("checkpoint '{}' is corrupt: {reason}", path.display())]
    CheckpointCorrupt { path: PathBuf, reason: String },

    #[error("checkpoint '{}' does not fit this model: {reason}", path.display())]
    CheckpointIncompatible { path: PathBuf, reason: String },

    #[error("failed to write checkpoint '{}': {reason}", path.display())]
    CheckpointWrite { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl LocaliseError {
    pub fn shape(layer: impl Into<String>, detail: impl Into<String>) -> Self {
        LocaliseError::Shape {
            layer: layer.into(),
            detail: detail.into(),
        }
    }
}
