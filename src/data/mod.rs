// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from the four CSV tables to tensor batches:
//
//   CSV tables
//       │
//       ▼
//   loader          → typed rows (csv + serde)
//       │
//       ▼
//   preprocessor    → cleaning, context joining, encoding
//       │
//       ▼
//   TaskDataset     → validated Examples, Burn's Dataset trait
//       │
//       ▼
//   sampler         → seeded shuffled batch plans
//       │
//       ▼
//   TaskBatcher     → EncodedBatch tensors
//       │
//       ▼
//   CyclicBatches   → endless scaffold streams for the trainer
//
// Each module is responsible for exactly one step.

/// Reads the input tables with the csv crate
pub mod loader;

/// Cleans rows, joins context and encodes text
pub mod preprocessor;

/// Implements Burn's Dataset trait for one task source
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Seeded batch plans and the per-source batch loader
pub mod sampler;

/// Rewinding stream over a finite batch sequence
pub mod cyclic;
