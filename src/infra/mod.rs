// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Everything that touches the filesystem on behalf of
// training:
//
//   checkpoint.rs  — Saving and restoring a head's parameters
//                    and optimizer state with Burn's
//                    NamedMpkGzFileRecorder, the JSON pointer
//                    file and checkpoint retention. Also
//                    stores the run's TrainConfig as JSON.
//
//   summary.rs     — Per-head loss summaries (scalars and
//                    histograms) appended to CSV files under
//                    graphs/<head_dir>/
//
// Reference: Rust Book §7 (Modules)
//            Burn Book §5 (Checkpointing)

/// Checkpoint saving, restoring and retention
pub mod checkpoint;

/// Loss summaries written as CSV
pub mod summary;
