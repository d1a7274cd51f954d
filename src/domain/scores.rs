// ============================================================
// Layer 3 — Sentinel-Excluding Precision / Recall / F1
// ============================================================
// Primary-task scores over parallel prediction/label streams.
//
//   - records whose true label is SENTINEL_LABEL are skipped
//   - label 1 is the positive class
//   - everything else that isn't 1 counts as negative
//
// No smoothing: a zero denominator yields MetricError::Undefined
// so callers can't mistake "no positives" for a score of 0.

use serde::{Deserialize, Serialize};

use crate::domain::errors::{DataError, MetricError};
use crate::domain::example::SENTINEL_LABEL;

/// 2×2 confusion table for the primary task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionCounts {
    pub tp: usize,
    pub fp: usize,
    pub fn_: usize,
    pub tn: usize,
    /// Records skipped because their label was the sentinel.
    pub excluded: usize,
}

impl ConfusionCounts {
    pub fn tally(predictions: &[i64], labels: &[i64]) -> Result<Self, DataError> {
        if predictions.len() != labels.len() {
            return Err(DataError::LengthMismatch {
                what:  "primary metric input",
                left:  predictions.len(),
                right: labels.len(),
            });
        }

        let mut c = Self::default();
        for (&pred, &label) in predictions.iter().zip(labels) {
            if label == SENTINEL_LABEL {
                c.excluded += 1;
                continue;
            }
            match (label == 1, pred == 1) {
                (true, true)   => c.tp  += 1,
                (true, false)  => c.fn_ += 1,
                (false, true)  => c.fp  += 1,
                (false, false) => c.tn  += 1,
            }
        }
        Ok(c)
    }

    pub fn counted(&self) -> usize {
        self.tp + self.fp + self.fn_ + self.tn
    }

    pub fn precision(&self) -> Result<f64, MetricError> {
        ratio(self.tp, self.tp + self.fp, "precision", "no positive predictions")
    }

    pub fn recall(&self) -> Result<f64, MetricError> {
        ratio(self.tp, self.tp + self.fn_, "recall", "no positive labels")
    }

    pub fn scores(&self) -> Result<BinaryScores, MetricError> {
        let precision = self.precision()?;
        let recall    = self.recall()?;
        if precision + recall == 0.0 {
            return Err(MetricError::Undefined {
                metric: "f1",
                reason: "precision and recall are both zero",
            });
        }
        let f1 = 2.0 * precision * recall / (precision + recall);
        Ok(BinaryScores { precision, recall, f1 })
    }
}

fn ratio(num: usize, den: usize, metric: &'static str, reason: &'static str) -> Result<f64, MetricError> {
    if den == 0 {
        return Err(MetricError::Undefined { metric, reason });
    }
    Ok(num as f64 / den as f64)
}

/// Precision, recall and F1 of the positive class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinaryScores {
    pub precision: f64,
    pub recall:    f64,
    pub f1:        f64,
}

/// Outcome of scoring one epoch: counts are always available,
/// the scores only when every denominator is non-zero.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochScores {
    pub counts: ConfusionCounts,
    pub scores: Result<BinaryScores, MetricError>,
}

impl EpochScores {
    pub fn f1(&self) -> Option<f64> {
        self.scores.as_ref().ok().map(|s| s.f1)
    }
}

/// Score a prediction stream. Length mismatch is a data error;
/// degenerate denominators are reported inside `EpochScores`.
pub fn sentinel_f1(predictions: &[i64], labels: &[i64]) -> Result<EpochScores, DataError> {
    let counts = ConfusionCounts::tally(predictions, labels)?;
    Ok(EpochScores { counts, scores: counts.scores() })
}
