// ============================================================
// Layer 5 — Multi-Task Training Loop
// ============================================================
// One epoch walks the primary batches once. Every third primary
// step is preceded by a burst of scaffold steps:
//
//   i = 0:  S S S S S  C C C C  J
//   i = 1:                      J
//   i = 2:                      J
//   i = 3:  S S S S S  C C C C  J
//   ...
//
//   S = section-only step   (λ1 · section CE)
//   C = citation-only step  (λ2 · weighted citation CE)
//   J = joint step          (primary + λ1·section + λ2·citation)
//
// Every S, C and J is a full optimizer step: forward, backward,
// global-norm clip, AdamW update, schedule advance. The scaffold
// sources are much shorter than the primary one, so they are
// read through CyclicBatches and simply rewind when exhausted.
//
// After each epoch the model is evaluated in inference mode and
// the best validation F1 so far decides whether to checkpoint.
//
// Training runs on the autodiff backend B; validation runs on
// B::InnerBackend via model.valid(), so no gradients are kept.

use anyhow::{Context, Result};
use burn::{
    module::AutodiffModule,
    optim::Optimizer,
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use rand::{rngs::StdRng, SeedableRng};

use crate::data::{batcher::EncodedBatch, cyclic::CyclicBatches, sampler::BatchLoader};
use crate::domain::errors::StepError;
use crate::domain::policy::{BestF1Policy, CheckpointDecision};
use crate::domain::traits::MetricSink;
use crate::infra::checkpoint::{CheckpointManager, CheckpointMeta};
use crate::ml::evaluator::Evaluator;
use crate::ml::loss::TaskLosses;
use crate::ml::model::{MultiTaskModel, TaskLogits, TaskSelector};
use crate::ml::optim::Optimization;
use crate::ml::tracking::{PhaseSummary, PhaseTracker};

pub const SCAFFOLD_EVERY: usize = 3;
pub const SECTION_BURST:  usize = 5;
pub const CITATION_BURST: usize = 4;

const TRAIN_LOG_EVERY: usize = 30;

// ─── Interleaving ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterleaveSchedule {
    pub every:          usize,
    pub section_burst:  usize,
    pub citation_burst: usize,
}

impl Default for InterleaveSchedule {
    fn default() -> Self {
        Self { every: SCAFFOLD_EVERY, section_burst: SECTION_BURST, citation_burst: CITATION_BURST }
    }
}

impl InterleaveSchedule {
    /// Whether primary step `i` is preceded by scaffold bursts.
    pub fn fires_at(&self, i: usize) -> bool {
        i % self.every == 0
    }

    pub fn section_steps(&self, primary_batches: usize) -> usize {
        self.section_burst * primary_batches.div_ceil(self.every)
    }

    pub fn citation_steps(&self, primary_batches: usize) -> usize {
        self.citation_burst * primary_batches.div_ceil(self.every)
    }

    /// Optimizer steps one epoch actually takes.
    pub fn steps_per_epoch(&self, primary_batches: usize) -> usize {
        primary_batches + self.section_steps(primary_batches) + self.citation_steps(primary_batches)
    }
}

// ─── Sources and reports ──────────────────────────────────────────────────────

/// The three training sources, all on the autodiff backend.
pub struct TaskSources<B: Backend> {
    pub primary:  BatchLoader<B>,
    pub section:  BatchLoader<B>,
    pub citation: BatchLoader<B>,
}

impl<B: Backend> TaskSources<B> {
    /// Schedule horizon: every source's batch count, once per epoch.
    pub fn schedule_horizon(&self, epochs: usize) -> usize {
        (self.primary.num_batches() + self.section.num_batches() + self.citation.num_batches()) * epochs
    }
}

#[derive(Debug, Clone)]
pub struct EpochReport {
    pub epoch:           usize,
    pub train:           PhaseSummary,
    pub valid:           PhaseSummary,
    pub optimizer_steps: usize,
    pub decision:        CheckpointDecision,
}

impl EpochReport {
    /// One row of the end-of-run table.
    pub fn summary_line(&self) -> String {
        let f1 = |s: &PhaseSummary| match s.scores.f1() {
            Some(f1) => format!("{f1:.4}"),
            None     => "undefined".to_string(),
        };
        let saved = match self.decision {
            CheckpointDecision::Save => "saved",
            CheckpointDecision::Keep => "",
        };
        format!(
            "{:>5} {:>10.5} {:>10.5} {:>10} {:>10} {:>8} {}",
            self.epoch,
            self.train.primary_loss,
            self.valid.primary_loss,
            f1(&self.train),
            f1(&self.valid),
            self.optimizer_steps,
            saved,
        )
    }
}

// ─── Trainer ──────────────────────────────────────────────────────────────────

pub struct Trainer<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<MultiTaskModel<B>, B>,
{
    losses:     TaskLosses<B>,
    evaluator:  Evaluator<B::InnerBackend>,
    optim:      Optimization<B, O>,
    interleave: InterleaveSchedule,
    policy:     BestF1Policy,
    rng:        StdRng,
}

impl<B, O> Trainer<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<MultiTaskModel<B>, B>,
{
    /// `seed` fixes the batch order of every source in every epoch.
    pub fn new(
        losses:    TaskLosses<B>,
        evaluator: Evaluator<B::InnerBackend>,
        optim:     Optimization<B, O>,
        seed:      u64,
    ) -> Self {
        Self {
            losses,
            evaluator,
            optim,
            interleave: InterleaveSchedule::default(),
            policy:     BestF1Policy::new(),
            rng:        StdRng::seed_from_u64(seed),
        }
    }

    pub fn optimizer_steps(&self) -> usize {
        self.optim.steps()
    }

    pub fn policy(&self) -> &BestF1Policy {
        &self.policy
    }

    /// One optimizer step on `batch`, computing the loss `selector` asks for.
    fn step(
        &mut self,
        model:    MultiTaskModel<B>,
        batch:    &EncodedBatch<B>,
        selector: TaskSelector,
        tracker:  &mut PhaseTracker,
    ) -> Result<MultiTaskModel<B>> {
        let logits = model.forward(batch, selector);
        let primary_logits = match &logits {
            TaskLogits::Joint(joint) => Some(joint.primary.clone().detach()),
            _ => None,
        };

        let loss   = self.losses.compute(logits, batch)?;
        let values = loss.values();
        if !values.objective.is_finite() {
            return Err(StepError::NonFiniteLoss {
                task:  selector.name(),
                value: values.objective,
                step:  self.optimizer_steps(),
            }
            .into());
        }

        tracker.add(selector, &values);
        if let Some(logits) = primary_logits {
            tracker.predictions.record(logits, &batch.primary()?.raw);
        }

        let (model, stats) = self.optim.step(model, loss.objective);
        tracing::debug!(
            task = selector.name(),
            rows = batch.len,
            loss = values.objective,
            grad_norm = stats.grad_norm,
            lr = stats.encoder_lr,
            head_lr = stats.head_lr,
            "optimizer step {}",
            self.optimizer_steps()
        );
        Ok(model)
    }

    pub fn train_epoch(
        &mut self,
        mut model: MultiTaskModel<B>,
        sources:   &TaskSources<B>,
    ) -> Result<(MultiTaskModel<B>, PhaseSummary)> {
        // ── Fresh batch order for every source ────────────────────────────────
        let primary_plan = sources.primary.shuffled_plan(&mut self.rng);
        let mut section  = CyclicBatches::new(
            sources.section.task().name(),
            sources.section.shuffled_plan(&mut self.rng),
        )?;
        let mut citation = CyclicBatches::new(
            sources.citation.task().name(),
            sources.citation.shuffled_plan(&mut self.rng),
        )?;

        let total       = primary_plan.len();
        let mut tracker = PhaseTracker::default();
        tracing::info!(
            "Epoch plan: {} joint, {} section, {} citation = {} optimizer steps",
            total,
            self.interleave.section_steps(total),
            self.interleave.citation_steps(total),
            self.interleave.steps_per_epoch(total)
        );

        for (i, indices) in primary_plan.iter().enumerate() {
            if i % TRAIN_LOG_EVERY == 0 && i != 0 {
                tracing::info!("  Batch {:>5} of {:>5}", i, total);
            }

            if self.interleave.fires_at(i) {
                // ── Section scaffold burst ────────────────────────────────────
                for _ in 0..self.interleave.section_burst {
                    let batch = sources.section.load(&section.draw());
                    model = self.step(model, &batch, TaskSelector::SectionOnly, &mut tracker)?;
                }
                // ── Citation scaffold burst ───────────────────────────────────
                for _ in 0..self.interleave.citation_burst {
                    let batch = sources.citation.load(&citation.draw());
                    model = self.step(model, &batch, TaskSelector::CitationOnly, &mut tracker)?;
                }
            }

            // ── Joint step ────────────────────────────────────────────────────
            let batch = sources.primary.load(indices);
            model = self.step(model, &batch, TaskSelector::Joint, &mut tracker)?;
        }

        tracing::debug!(
            "Scaffold sources rewound: section {} time(s), citation {} time(s)",
            section.laps(),
            citation.laps()
        );
        Ok((model, tracker.finish()?))
    }

    /// Train for `epochs`, validating and applying the checkpoint policy after each.
    pub fn fit(
        &mut self,
        mut model:   MultiTaskModel<B>,
        sources:     &TaskSources<B>,
        valid:       &BatchLoader<B::InnerBackend>,
        epochs:      usize,
        checkpoints: &CheckpointManager,
        sink:        &mut dyn MetricSink,
    ) -> Result<(MultiTaskModel<B>, Vec<EpochReport>)> {
        let mut reports = Vec::with_capacity(epochs);

        for epoch in 1..=epochs {
            println!("\n Epoch {epoch} / {epochs}");

            // ── Training phase ────────────────────────────────────────────────
            let (trained, train) = self
                .train_epoch(model, sources)
                .with_context(|| format!("Training epoch {epoch}"))?;
            model = trained;
            println!("\n{}", train.describe("Training"));
            tracing::info!(
                "Epoch {epoch}: {} optimizer steps ({} joint, {} section, {} citation), F1 over {} labelled sentences",
                train.counts.total(), train.counts.joint, train.counts.section, train.counts.citation,
                train.scores.counts.counted()
            );

            // ── Validation phase ──────────────────────────────────────────────
            // model.valid() → MultiTaskModel<B::InnerBackend>, dropout disabled
            let valid_summary = self
                .evaluator
                .evaluate(&model.valid(), valid)
                .with_context(|| format!("Evaluation after epoch {epoch}"))?;
            println!("\n{}", valid_summary.describe("Validation"));

            // ── Checkpoint policy ─────────────────────────────────────────────
            let decision = self.policy.observe_scores(epoch, &valid_summary.scores);
            if let (CheckpointDecision::Save, Ok(s)) = (decision, &valid_summary.scores.scores) {
                let meta = CheckpointMeta {
                    epoch,
                    f1:              s.f1,
                    precision:       s.precision,
                    recall:          s.recall,
                    optimizer_steps: self.optimizer_steps(),
                };
                checkpoints
                    .save_best(&model, &self.optim, &meta)
                    .with_context(|| format!("Checkpoint after epoch {epoch}"))?;
            }

            log_epoch_metrics(sink, epoch, &train, &valid_summary)?;

            reports.push(EpochReport {
                epoch,
                train,
                valid: valid_summary,
                optimizer_steps: self.optimizer_steps(),
                decision,
            });
        }

        tracing::info!(
            "Training complete after {} optimizer steps. Best validation F1 {:.4} (epoch {:?})",
            self.optimizer_steps(),
            self.policy.best(),
            self.policy.best_epoch()
        );
        Ok((model, reports))
    }
}

/// Push one epoch's scalars to the sink. Undefined scores are skipped.
pub fn log_epoch_metrics(
    sink:  &mut dyn MetricSink,
    epoch: usize,
    train: &PhaseSummary,
    valid: &PhaseSummary,
) -> Result<()> {
    sink.log_scalar(epoch, "training loss", train.primary_loss)?;
    sink.log_scalar(epoch, "validation loss", valid.primary_loss)?;

    match &train.scores.scores {
        Ok(s)  => sink.log_scalar(epoch, "Training F1 Score", s.f1)?,
        Err(e) => tracing::warn!("Epoch {epoch}: training {e}"),
    }
    match &valid.scores.scores {
        Ok(s) => {
            sink.log_scalar(epoch, "Validation Precision", s.precision)?;
            sink.log_scalar(epoch, "Validation Recall", s.recall)?;
            sink.log_scalar(epoch, "Validation F1 Score", s.f1)?;
        }
        Err(e) => tracing::warn!("Epoch {epoch}: validation {e}"),
    }
    Ok(())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::optim::AdamWConfig;
    use tempfile::TempDir;

    use crate::data::dataset::TaskDataset;
    use crate::domain::example::{Example, LabelSet, TaskKind};
    use crate::ml::loss::LossConfig;
    use crate::ml::model::tiny_config;
    use crate::ml::optim::PolynomialDecay;

    type TestBackend = burn::backend::Autodiff<burn::backend::NdArray>;
    type Inner       = burn::backend::NdArray;

    #[derive(Default)]
    struct MemorySink(Vec<(usize, String, f64)>);

    impl MetricSink for MemorySink {
        fn log_scalar(&mut self, epoch: usize, key: &str, value: f64) -> Result<()> {
            self.0.push((epoch, key.to_string(), value));
            Ok(())
        }
    }

    fn ex(id: u32, labels: LabelSet) -> Example {
        Example::new(vec![1, id, 0, 0], vec![1, 1, 0, 0], labels)
    }

    fn primary_examples(n: usize) -> Vec<Example> {
        (0..n)
            .map(|i| ex(2 + i as u32, LabelSet::primary_task((i % 2) as i64, (i % 6) as i64, (i % 2) as i64)))
            .collect()
    }

    fn loader<BB: Backend>(task: TaskKind, examples: Vec<Example>) -> BatchLoader<BB> {
        BatchLoader::new(TaskDataset::new(task, 4, examples).unwrap(), Default::default(), 1)
    }

    fn sources(primary_batches: usize) -> TaskSources<TestBackend> {
        TaskSources {
            primary:  loader(TaskKind::Primary, primary_examples(primary_batches)),
            section:  loader(TaskKind::Section, (0..3).map(|i| ex(10 + i, LabelSet::section_only(i as i64))).collect()),
            citation: loader(TaskKind::Citation, (0..2).map(|i| ex(20 + i, LabelSet::citation_only(i as i64))).collect()),
        }
    }

    fn loss_config() -> LossConfig {
        LossConfig { positive_weight: 0.75, citation_weights: vec![0.5, 0.5], lambda1: 0.18, lambda2: 0.09 }
    }

    fn trainer(cfg: LossConfig) -> Trainer<TestBackend, impl Optimizer<MultiTaskModel<TestBackend>, TestBackend>> {
        let device = Default::default();
        Trainer::new(
            TaskLosses::new(&cfg, &device),
            Evaluator::new(TaskLosses::new(&cfg, &device)),
            Optimization::new(
                AdamWConfig::new().with_epsilon(1e-6).with_weight_decay(0.0).init(),
                PolynomialDecay::new(1e-4, 100),
            ),
            0,
        )
    }

    #[test]
    fn test_scaffold_step_counts() {
        let s = InterleaveSchedule::default();
        assert_eq!(s.section_steps(1), 5);
        assert_eq!(s.section_steps(3), 5);
        assert_eq!(s.section_steps(4), 10);
        assert_eq!(s.citation_steps(7), 12);
        assert_eq!(s.steps_per_epoch(0), 0);
        assert!(s.fires_at(0) && s.fires_at(3) && !s.fires_at(4));
    }

    #[test]
    fn test_epoch_interleaves_and_counts_denominators() {
        let model: MultiTaskModel<TestBackend> = tiny_config().init(&Default::default());
        let mut t = trainer(loss_config());
        let (_, summary) = t.train_epoch(model, &sources(4)).unwrap();

        // P = 4 → two bursts.
        assert_eq!(summary.counts.joint, 4);
        assert_eq!(summary.counts.section, 10);
        assert_eq!(summary.counts.citation, 8);
        assert_eq!(t.optimizer_steps(), 22);
        assert_eq!(summary.counts.total(), InterleaveSchedule::default().steps_per_epoch(4));

        assert!(summary.primary_loss.is_finite());
        assert!(summary.section_loss.is_finite());
        assert!(summary.citation_loss.is_finite());
        assert_eq!(summary.scores.counts.counted(), 4);
    }

    #[test]
    fn test_non_finite_loss_aborts_with_step_error() {
        let model: MultiTaskModel<TestBackend> = tiny_config().init(&Default::default());
        let mut t = trainer(LossConfig { lambda1: f64::NAN, ..loss_config() });
        let err = t.train_epoch(model, &sources(2)).unwrap_err();

        // The very first section step already has a NaN objective.
        match err.downcast_ref::<StepError>() {
            Some(StepError::NonFiniteLoss { task, step, value }) => {
                assert_eq!(*task, "section");
                assert_eq!(*step, 0);
                assert!(value.is_nan());
            }
            None => panic!("expected a StepError, got {err:#}"),
        }
        assert_eq!(t.optimizer_steps(), 0);
    }

    #[test]
    fn test_fit_stops_at_the_failing_epoch() {
        let dir  = TempDir::new().unwrap();
        let ckpt = CheckpointManager::new(dir.path()).unwrap();
        let mut sink = MemorySink::default();

        let model: MultiTaskModel<TestBackend> = tiny_config().init(&Default::default());
        let valid: BatchLoader<Inner> = loader(TaskKind::Primary, primary_examples(2));
        let mut t = trainer(LossConfig { lambda2: f64::INFINITY, ..loss_config() });
        let err = t.fit(model, &sources(2), &valid, 2, &ckpt, &mut sink).unwrap_err();

        // Five section steps succeed, then the first citation step blows up.
        assert!(matches!(
            err.downcast_ref::<StepError>(),
            Some(StepError::NonFiniteLoss { task: "citation", step: 5, .. })
        ));
        assert!(sink.0.is_empty());
        assert!(ckpt.load_meta().is_err());
    }

    #[test]
    fn test_empty_scaffold_source_is_rejected() {
        let model: MultiTaskModel<TestBackend> = tiny_config().init(&Default::default());
        let mut s = sources(2);
        s.citation = loader(TaskKind::Citation, Vec::new());
        assert!(trainer(loss_config()).train_epoch(model, &s).is_err());
    }

    #[test]
    fn test_fit_reports_every_epoch() {
        let dir  = TempDir::new().unwrap();
        let ckpt = CheckpointManager::new(dir.path()).unwrap();
        let mut sink = MemorySink::default();

        let model: MultiTaskModel<TestBackend> = tiny_config().init(&Default::default());
        let valid: BatchLoader<Inner> = loader(TaskKind::Primary, primary_examples(3));
        let mut t = trainer(loss_config());
        let (_, reports) = t.fit(model, &sources(3), &valid, 2, &ckpt, &mut sink).unwrap();

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[1].optimizer_steps, 2 * 12);
        let losses: Vec<usize> = sink.0.iter().filter(|(_, k, _)| k == "training loss").map(|(e, _, _)| *e).collect();
        assert_eq!(losses, vec![1, 2]);

        // A save happens exactly when the policy recorded an improvement.
        let saved = reports.iter().any(|r| r.decision == CheckpointDecision::Save);
        assert_eq!(saved, ckpt.load_meta().is_ok());

        let line = reports[1].summary_line();
        assert!(line.trim_start().starts_with('2'), "{line}");
        assert!(line.contains(" 24"), "{line}");
        assert_eq!(line.ends_with("saved"), reports[1].decision == CheckpointDecision::Save);
    }
}
