// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The application layer only needs "something that yields
// annotated crops". The JSON loader and the synthetic
// generator both implement it, so the training pipeline does
// not care where the crops came from.
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;

use crate::domain::crop::AnnotatedCrop;

// ─── CropSource ───────────────────────────────────────────────────────────────
/// Any component that can supply annotated crops.
///
/// Implementations:
///   - JsonCropLoader  → reads data.json / labels.json / names.json
///   - SyntheticSource → generates random crops in memory
pub trait CropSource {
    /// Load every available crop, in a stable order.
    fn load_all(&self) -> Result<Vec<AnnotatedCrop>>;
}
