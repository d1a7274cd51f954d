// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types that define what the system works with:
// labelled examples, the three tasks, the sentinel-aware
// precision/recall/F1 engine and the checkpoint policy.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, and traits
//
// Everything here is testable without a tensor backend.

// Examples, label channels and the task enum
pub mod example;

// Confusion counts and sentinel-excluding F1
pub mod scores;

// Best-F1 checkpoint policy
pub mod policy;

// Typed failures shared by the other layers
pub mod errors;

// Seams to external collaborators (tokeniser, metric sink)
pub mod traits;
