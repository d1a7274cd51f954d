// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// Seams to the collaborators the training core doesn't own:
//
//   TextEncoding → turns raw text into fixed-length ids + mask
//                  (implemented by infra::tokenizer_store)
//   MetricSink   → accepts key → scalar pairs per epoch
//                  (implemented by infra::metrics)
//
// The application layer programs against these traits so the
// data and training layers never see a concrete tokenizer or
// tracking backend.

use anyhow::Result;

// ─── TextEncoding ─────────────────────────────────────────────────────────────
/// Any component that can encode text to padded token ids.
pub trait TextEncoding {
    /// Returns `(input_ids, attention_mask)`, both of length `max_len`.
    fn encode(&self, text: &str, max_len: usize) -> Result<(Vec<u32>, Vec<u32>)>;

    /// Number of distinct token ids the encoder's embedding must cover.
    fn vocab_size(&self) -> usize;
}

// ─── MetricSink ───────────────────────────────────────────────────────────────
/// External experiment tracker.
pub trait MetricSink {
    fn log_scalar(&mut self, epoch: usize, key: &str, value: f64) -> Result<()>;
}
