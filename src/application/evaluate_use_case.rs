// ============================================================
// Layer 2 — EvaluateUseCase
// ============================================================
// Re-scores the best checkpoint of a finished run:
//
//   Step 1: Load train_config.json        (Layer 6 - infra)
//   Step 2: Rebuild model, load weights   (Layer 5 - ml)
//   Step 3: Encode the validation table   (Layer 4 - data)
//   Step 4: One validation pass           (Layer 5 - ml)
//
// Runs on a plain (non-autodiff) backend; nothing is trained.

use anyhow::{Context, Result};
use burn::prelude::*;

use crate::application::train_use_case::{citation_weights_from_table, load_primary};
use crate::data::{preprocessor::Preprocessor, sampler::BatchLoader};
use crate::domain::traits::TextEncoding;
use crate::infra::{
    checkpoint::{CheckpointManager, CheckpointMeta},
    tokenizer_store::TokenizerStore,
};
use crate::ml::{
    evaluator::Evaluator,
    loss::TaskLosses,
    model::MultiTaskModel,
    tracking::PhaseSummary,
};

pub struct EvaluateOutcome {
    pub meta:    CheckpointMeta,
    pub summary: PhaseSummary,
}

pub struct EvaluateUseCase {
    checkpoint_dir: String,
    /// Overrides the validation table recorded in the run's config.
    valid_path:     Option<String>,
}

impl EvaluateUseCase {
    pub fn new(checkpoint_dir: String, valid_path: Option<String>) -> Self {
        Self { checkpoint_dir, valid_path }
    }

    pub fn execute<B: Backend>(&self, device: B::Device) -> Result<EvaluateOutcome> {
        // ── Step 1: Config and checkpoint metadata ────────────────────────────
        let checkpoints = CheckpointManager::new(&self.checkpoint_dir)?;
        let cfg         = checkpoints.load_config()?;
        let meta        = checkpoints.load_meta()?;
        let schedule    = checkpoints.load_schedule()?;
        tracing::info!(
            "Best checkpoint: epoch {} after {} optimizer steps (schedule at {}/{})",
            meta.epoch, meta.optimizer_steps, schedule.current, schedule.total_steps
        );

        // ── Step 2: Model ─────────────────────────────────────────────────────
        let tokenizer = TokenizerStore::load(&cfg.tokenizer_path)?;
        let model: MultiTaskModel<B> = cfg.model_config(tokenizer.vocab_size()).init(&device);
        let model = checkpoints.load_best_model(model, &device)?;

        // ── Step 3: Validation data ───────────────────────────────────────────
        let valid_path = self.valid_path.as_deref().unwrap_or(&cfg.valid_path);
        let prep       = Preprocessor::new(&tokenizer, cfg.max_seq_len);
        let valid      = load_primary(valid_path, &prep, cfg.max_seq_len).context("Data loading")?;
        let loader     = BatchLoader::<B>::new(valid, device.clone(), cfg.batch_size);

        // ── Step 4: Evaluate ──────────────────────────────────────────────────
        let weights   = citation_weights_from_table(&cfg.citation_path).context("Data loading")?;
        let evaluator = Evaluator::new(TaskLosses::new(&cfg.loss_config(weights), &device));
        let summary   = evaluator.evaluate(&model, &loader).context("Evaluation")?;

        Ok(EvaluateOutcome { meta, summary })
    }
}
