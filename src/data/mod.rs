// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between raw arrays and tensor batches:
//
//   data.json / labels.json / names.json   (or synthetic)
//       │
//       ▼
//   JsonCropLoader / SyntheticSource → AnnotatedCrops
//       │
//       ▼
//   Preprocessor      → one-hot class rows, standardised pixels
//       │
//       ▼
//   LocalisationDataset → validated items (Burn Dataset)
//       │
//       ▼
//   LocalisationBatcher → contiguous tensor batches
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Reads the three-file JSON dataset layout
pub mod loader;

/// Seeded random crops for demos and tests
pub mod synthetic;

/// One-hot encoding and per-feature standardisation
pub mod preprocessor;

/// Implements Burn's Dataset trait for localisation items
pub mod dataset;

/// Implements Burn's Batcher trait and contiguous batch windows
pub mod batcher;
