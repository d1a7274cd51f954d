// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Filesystem-facing pieces used by the application layer:
//
//   checkpoint.rs      — best-epoch checkpoint (model, optimizer,
//                        schedule, metadata) with an atomic swap,
//                        plus the run's TrainConfig as JSON so
//                        `evaluate` can rebuild the model.
//
//   tokenizer_store.rs — loads a pretrained tokenizer.json and
//                        implements the domain TextEncoding trait.
//
//   metrics.rs         — CSV implementation of the domain
//                        MetricSink trait.

/// Best-checkpoint persistence and config JSON
pub mod checkpoint;

/// Pretrained tokenizer loading and fixed-length encoding
pub mod tokenizer_store;

/// Per-epoch scalar metrics as CSV
pub mod metrics;
