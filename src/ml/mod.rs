// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// Everything that builds, runs or updates the network lives
// here. The data layer only hands over plain items and the
// Burn batcher; no other layer touches tensors.
//
// What's in this layer:
//
//   layers.rs     — Layer builders (conv + ReLU, max pool,
//                   fully connected, softmax head), the name
//                   registry and build-time static shapes
//
//   loss.rs       — Cross-entropy (via log_softmax) and
//                   summed squared box error
//
//   model.rs      — The two-headed network: shared conv
//                   trunk, classification and regression heads
//
//   optimizer.rs  — One Adam optimizer per head, bound lazily;
//                   the regression one only updates its scope
//
//   container.rs  — Placeholders, network, global steps and
//                   the per-head bindings in one place
//
//   trainer.rs    — Epoch/batch loop with restore, summaries
//                   and periodic checkpoints
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)

/// Layer builders and static shapes
pub mod layers;

/// Loss functions for both heads
pub mod loss;

/// LocaliseNet architecture
pub mod model;

/// Per-head Adam optimizers
pub mod optimizer;

/// Model container owning the training state
pub mod container;

/// Training loop with restore and checkpointing
pub mod trainer;
