// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Wires the other layers together for one goal each. No model
// math and no argument parsing here: the CLI hands in a config
// and a device, and gets a result back to print.
//
// Both use cases are generic over the Burn backend; the CLI
// picks wgpu or ndarray.

/// A full multi-task training run
pub mod train_use_case;

/// Re-scoring the best checkpoint on the validation table
pub mod evaluate_use_case;
