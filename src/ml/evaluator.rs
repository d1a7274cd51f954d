// ============================================================
// Layer 5 — Evaluator
// ============================================================
// One pass over the validation batches in file order. Runs on
// the inner (non-autodiff) backend with dropout disabled, so
// nothing here can touch gradients or optimizer state.
//
// Every batch goes through the joint forward; the three losses
// are averaged over the validation batch count.

use anyhow::{Context, Result};
use burn::prelude::*;

use crate::data::sampler::BatchLoader;
use crate::ml::loss::TaskLosses;
use crate::ml::model::{MultiTaskModel, TaskSelector};
use crate::ml::tracking::{PhaseSummary, PhaseTracker};

const EVAL_LOG_EVERY: usize = 50;

pub struct Evaluator<B: Backend> {
    losses: TaskLosses<B>,
}

impl<B: Backend> Evaluator<B> {
    pub fn new(losses: TaskLosses<B>) -> Self {
        Self { losses }
    }

    /// `model` must already be in inference mode (`model.valid()`).
    pub fn evaluate(&self, model: &MultiTaskModel<B>, loader: &BatchLoader<B>) -> Result<PhaseSummary> {
        let plan    = loader.sequential_plan();
        let total   = plan.len();
        let mut log = PhaseTracker::default();

        for (step, indices) in plan.iter().enumerate() {
            if step % EVAL_LOG_EVERY == 0 && step != 0 {
                tracing::info!("  Validation batch {:>5} of {:>5}", step, total);
            }

            let batch  = loader.load(indices);
            let logits = model.forward_joint(&batch);
            let primary_logits = logits.primary.clone();

            let loss = self
                .losses
                .joint(logits, &batch)
                .with_context(|| format!("Validation batch {step}"))?;
            log.add(TaskSelector::Joint, &loss.values());
            log.predictions.record(primary_logits, &batch.primary()?.raw);
        }

        Ok(log.finish()?)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::TaskDataset;
    use crate::domain::example::{Example, LabelSet, TaskKind};
    use crate::ml::loss::LossConfig;
    use crate::ml::model::tiny_config;

    type TestBackend = burn::backend::NdArray;

    fn loader(batch_size: usize) -> BatchLoader<TestBackend> {
        let examples = vec![
            Example::new(vec![1, 4, 0, 0], vec![1, 1, 0, 0], LabelSet::primary_task(1, 0, 1)),
            Example::new(vec![1, 5, 6, 0], vec![1, 1, 1, 0], LabelSet::primary_task(0, 2, 0)),
            Example::new(vec![1, 7, 0, 0], vec![1, 1, 0, 0], LabelSet::primary_task(6, 3, 0)),
            Example::new(vec![1, 8, 9, 2], vec![1, 1, 1, 1], LabelSet::primary_task(1, 5, 1)),
            Example::new(vec![1, 3, 0, 0], vec![1, 1, 0, 0], LabelSet::primary_task(0, 1, 0)),
        ];
        let dataset = TaskDataset::new(TaskKind::Primary, 4, examples).unwrap();
        BatchLoader::new(dataset, Default::default(), batch_size)
    }

    fn evaluator() -> Evaluator<TestBackend> {
        let cfg = LossConfig {
            positive_weight:  0.75,
            citation_weights: vec![0.5, 0.5],
            lambda1:          0.18,
            lambda2:          0.09,
        };
        Evaluator::new(TaskLosses::new(&cfg, &Default::default()))
    }

    #[test]
    fn test_losses_average_over_validation_batches() {
        let model: MultiTaskModel<TestBackend> = tiny_config().init(&Default::default());
        let summary = evaluator().evaluate(&model, &loader(2)).unwrap();

        assert_eq!(summary.counts.joint, 3);
        assert_eq!(summary.counts.section, 0);
        assert!(summary.primary_loss.is_finite());
        assert!(summary.section_loss.is_finite());
        assert_eq!(summary.scores.counts.excluded, 1);
        assert_eq!(summary.scores.counts.counted(), 4);
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let model: MultiTaskModel<TestBackend> = tiny_config().init(&Default::default());
        let a = evaluator().evaluate(&model, &loader(2)).unwrap();
        let b = evaluator().evaluate(&model, &loader(2)).unwrap();
        assert_eq!(a.primary_loss, b.primary_loss);
        assert_eq!(a.scores, b.scores);
    }
}
