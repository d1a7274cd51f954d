// ============================================================
// Layer 5 — Per-Phase Bookkeeping
// ============================================================
// Accumulates what one training epoch or one validation pass
// produces: a running loss per task, the primary predictions
// next to their true labels, and how many steps of each kind
// ran. `finish` turns it into a PhaseSummary.
//
// Loss denominators fall out of when `add` is called:
//   primary   → once per joint step                   (P)
//   section   → every section step + every joint step (aux + P)
//   citation  → every citation step + every joint step (aux + P)
// During validation only joint steps run, so all three divide
// by the validation batch count.

use burn::prelude::*;

use crate::domain::errors::DataError;
use crate::domain::scores::{sentinel_f1, EpochScores};
use crate::ml::loss::LossValues;
use crate::ml::model::TaskSelector;

/// Sum and step count of one task's loss. Reset each epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningLoss {
    pub sum:   f64,
    pub steps: usize,
}

impl RunningLoss {
    pub fn add(&mut self, value: f64) {
        self.sum   += value;
        self.steps += 1;
    }

    /// NaN when nothing was added.
    pub fn mean(&self) -> f64 {
        if self.steps == 0 {
            return f64::NAN;
        }
        self.sum / self.steps as f64
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepCounts {
    pub joint:    usize,
    pub section:  usize,
    pub citation: usize,
}

impl StepCounts {
    pub fn total(&self) -> usize {
        self.joint + self.section + self.citation
    }
}

/// Primary argmax predictions and raw labels, in batch order.
#[derive(Debug, Clone, Default)]
pub struct PredictionLog {
    pub predictions: Vec<i64>,
    pub labels:      Vec<i64>,
}

impl PredictionLog {
    pub fn record<B: Backend>(&mut self, logits: Tensor<B, 2>, labels: &[i64]) {
        let preds = logits.argmax(1).flatten::<1>(0, 1);
        self.predictions.extend(preds.into_data().iter::<i64>());
        self.labels.extend_from_slice(labels);
    }

    pub fn scores(&self) -> Result<EpochScores, DataError> {
        sentinel_f1(&self.predictions, &self.labels)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PhaseTracker {
    pub primary:     RunningLoss,
    pub section:     RunningLoss,
    pub citation:    RunningLoss,
    pub counts:      StepCounts,
    pub predictions: PredictionLog,
}

impl PhaseTracker {
    pub fn add(&mut self, selector: TaskSelector, values: &LossValues) {
        match selector {
            TaskSelector::Joint        => self.counts.joint    += 1,
            TaskSelector::SectionOnly  => self.counts.section  += 1,
            TaskSelector::CitationOnly => self.counts.citation += 1,
        }
        if let Some(v) = values.primary  { self.primary.add(v); }
        if let Some(v) = values.section  { self.section.add(v); }
        if let Some(v) = values.citation { self.citation.add(v); }
    }

    pub fn finish(self) -> Result<PhaseSummary, DataError> {
        Ok(PhaseSummary {
            primary_loss:  self.primary.mean(),
            section_loss:  self.section.mean(),
            citation_loss: self.citation.mean(),
            scores:        self.predictions.scores()?,
            counts:        self.counts,
        })
    }
}

/// Averages and scores of one training epoch or validation pass.
#[derive(Debug, Clone)]
pub struct PhaseSummary {
    pub primary_loss:  f64,
    pub section_loss:  f64,
    pub citation_loss: f64,
    pub scores:        EpochScores,
    pub counts:        StepCounts,
}

impl PhaseSummary {
    /// Two report lines in the usual epoch-log layout.
    pub fn describe(&self, phase: &str) -> String {
        let scores = match &self.scores.scores {
            Ok(s)  => format!("Precision: {:.4}, Recall: {:.4}, F1 Score: {:.4}", s.precision, s.recall, s.f1),
            Err(e) => format!("Scores: {e}"),
        };
        format!(
            "{phase}: Main Loss: {:.5}, Section Loss : {:.5}, Citation Loss : {:.5}\n{scores}",
            self.primary_loss, self.section_loss, self.citation_loss,
        )
    }
}
