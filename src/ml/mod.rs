// ============================================================
// Layer 5 — ML Layer (Burn)
// ============================================================
// Model, losses, optimisation and the training loop.
//
//   model.rs     — shared transformer encoder with a [CLS]
//                  pooler, three task heads, and the forward
//                  dispatch over TaskSelector
//
//   loss.rs      — weighted cross-entropies per head and the
//                  joint / scaffold combinations
//
//   optim.rs     — gradient groups, global-norm clipping,
//                  AdamW with a 10× head rate, polynomial decay
//
//   tracking.rs  — running losses, prediction log, step counts
//
//   trainer.rs   — the interleaving epoch loop, validation and
//                  the best-F1 checkpoint decision
//
//   evaluator.rs — inference-mode validation pass
//
// Reference: Burn Book §3 (Building Blocks), §5 (Training)
//            Swayamdipta et al. (2018) syntactic scaffolds
//            Devlin et al. (2019) BERT

/// Shared encoder, task heads and forward dispatch
pub mod model;

/// Per-task cross-entropy and loss combination
pub mod loss;

/// Backward, clipping, parameter groups and LR schedule
pub mod optim;

/// Per-epoch loss and prediction bookkeeping
pub mod tracking;

/// Multi-task epoch loop with validation and checkpointing
pub mod trainer;

/// Validation pass without gradients
pub mod evaluator;
