// ============================================================
// Layer 3 — Best-F1 Checkpoint Policy
// ============================================================
// Decides, epoch by epoch, whether the current model is the
// best seen so far in this run. Only strict improvements over
// the running best count; the best starts at 0.0 so an epoch
// must score above zero to be saved at all.
//
// An undefined F1 (see scores.rs) never improves.

use crate::domain::scores::EpochScores;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointDecision {
    /// Strict improvement — persist and replace the previous best.
    Save,
    /// Equal, worse, or undefined — leave the previous best alone.
    Keep,
}

#[derive(Debug, Clone)]
pub struct BestF1Policy {
    best: f64,
    best_epoch: Option<usize>,
}

impl Default for BestF1Policy {
    fn default() -> Self {
        Self { best: 0.0, best_epoch: None }
    }
}

impl BestF1Policy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an epoch's validation F1 (`None` = undefined).
    pub fn observe(&mut self, epoch: usize, f1: Option<f64>) -> CheckpointDecision {
        match f1 {
            // NaN fails the comparison as well, so it can never become the best.
            Some(f1) if f1 > self.best => {
                self.best       = f1;
                self.best_epoch = Some(epoch);
                CheckpointDecision::Save
            }
            _ => CheckpointDecision::Keep,
        }
    }

    pub fn observe_scores(&mut self, epoch: usize, scores: &EpochScores) -> CheckpointDecision {
        self.observe(epoch, scores.f1())
    }

    pub fn best(&self) -> f64 {
        self.best
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }
}
