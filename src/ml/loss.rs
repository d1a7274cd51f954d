// ============================================================
// Layer 5 — Task Losses
// ============================================================
// Cross-entropy for each head, combined according to the step:
//
//   Joint step:        primary + λ1·section + λ2·citation
//   Section scaffold:  λ1·section
//   Citation scaffold: λ2·citation
//
// Class weighting:
//   primary   [1 − w, w]           (w = positive-class weight)
//   section   none
//   citation  balanced weights from the citation scaffold labels
//
// Sentinel rows reach the primary head but never the primary
// loss: the batcher records which rows are real and the loss
// selects only those. A batch with no real rows contributes a
// zero primary loss that still belongs to the graph.

use burn::{
    nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig},
    prelude::*,
};

use crate::data::batcher::{EncodedBatch, PrimaryRows, PrimaryTargets};
use crate::domain::errors::DataError;
use crate::ml::model::{JointLogits, ScaffoldLogits, TaskLogits};

#[derive(Debug, Clone)]
pub struct LossConfig {
    /// Weight of primary class 1; class 0 gets `1 − positive_weight`.
    pub positive_weight:  f32,
    pub citation_weights: Vec<f32>,
    pub lambda1:          f64,
    pub lambda2:          f64,
}

pub struct TaskLosses<B: Backend> {
    primary:  CrossEntropyLoss<B>,
    section:  CrossEntropyLoss<B>,
    citation: CrossEntropyLoss<B>,
    lambda1:  f64,
    lambda2:  f64,
}

/// Loss tensors of one forward pass. `objective` is what gets
/// back-propagated; the per-task entries are unscaled.
pub struct StepLoss<B: Backend> {
    pub objective: Tensor<B, 1>,
    pub primary:   Option<Tensor<B, 1>>,
    pub section:   Option<Tensor<B, 1>>,
    pub citation:  Option<Tensor<B, 1>>,
}

/// Host-side readout of a StepLoss.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LossValues {
    pub objective: f64,
    pub primary:   Option<f64>,
    pub section:   Option<f64>,
    pub citation:  Option<f64>,
}

fn scalar<B: Backend>(t: &Tensor<B, 1>) -> f64 {
    t.clone().into_scalar().elem::<f64>()
}

impl<B: Backend> StepLoss<B> {
    pub fn values(&self) -> LossValues {
        LossValues {
            objective: scalar(&self.objective),
            primary:   self.primary.as_ref().map(scalar),
            section:   self.section.as_ref().map(scalar),
            citation:  self.citation.as_ref().map(scalar),
        }
    }
}

impl<B: Backend> TaskLosses<B> {
    pub fn new(cfg: &LossConfig, device: &B::Device) -> Self {
        let w = cfg.positive_weight;
        Self {
            primary: CrossEntropyLossConfig::new()
                .with_weights(Some(vec![1.0 - w, w]))
                .init(device),
            section: CrossEntropyLossConfig::new().init(device),
            citation: CrossEntropyLossConfig::new()
                .with_weights(Some(cfg.citation_weights.clone()))
                .init(device),
            lambda1: cfg.lambda1,
            lambda2: cfg.lambda2,
        }
    }

    pub fn primary(&self, logits: Tensor<B, 2>, targets: &PrimaryTargets<B>) -> Tensor<B, 1> {
        match &targets.rows {
            PrimaryRows::All => self.primary.forward(logits, targets.targets.clone()),
            PrimaryRows::Subset(rows) => self.primary.forward(
                logits.select(0, rows.clone()),
                targets.targets.clone().select(0, rows.clone()),
            ),
            PrimaryRows::Empty => logits.mul_scalar(0.0).sum(),
        }
    }

    pub fn section(&self, logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        self.section.forward(logits, targets)
    }

    pub fn citation(&self, logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        self.citation.forward(logits, targets)
    }

    pub fn joint(&self, logits: JointLogits<B>, batch: &EncodedBatch<B>) -> Result<StepLoss<B>, DataError> {
        let primary  = self.primary(logits.primary, batch.primary()?);
        let section  = self.section(logits.section, batch.section()?);
        let citation = self.citation(logits.citation, batch.citation()?);
        let objective = primary.clone()
            + section.clone().mul_scalar(self.lambda1)
            + citation.clone().mul_scalar(self.lambda2);
        Ok(StepLoss {
            objective,
            primary:  Some(primary),
            section:  Some(section),
            citation: Some(citation),
        })
    }

    pub fn section_scaffold(&self, logits: ScaffoldLogits<B>, batch: &EncodedBatch<B>) -> Result<StepLoss<B>, DataError> {
        let section = self.section(logits.output, batch.section()?);
        Ok(StepLoss {
            objective: section.clone().mul_scalar(self.lambda1),
            primary:   None,
            section:   Some(section),
            citation:  None,
        })
    }

    pub fn citation_scaffold(&self, logits: ScaffoldLogits<B>, batch: &EncodedBatch<B>) -> Result<StepLoss<B>, DataError> {
        let citation = self.citation(logits.output, batch.citation()?);
        Ok(StepLoss {
            objective: citation.clone().mul_scalar(self.lambda2),
            primary:   None,
            section:   None,
            citation:  Some(citation),
        })
    }

    /// Loss matching whichever heads the forward pass ran.
    pub fn compute(&self, logits: TaskLogits<B>, batch: &EncodedBatch<B>) -> Result<StepLoss<B>, DataError> {
        match logits {
            TaskLogits::Joint(l)    => self.joint(l, batch),
            TaskLogits::Section(l)  => self.section_scaffold(l, batch),
            TaskLogits::Citation(l) => self.citation_scaffold(l, batch),
        }
    }
}
