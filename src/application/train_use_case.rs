// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates a full training run in order:
//
//   Step 1: Validate the config         (Layer 2)
//   Step 2: Seed tensor randomness      (Burn backend)
//   Step 3: Load the tokenizer          (Layer 6 - infra)
//   Step 4: Read, clean and encode      (Layer 4 - data)
//           the four input tables
//   Step 5: Balanced citation weights   (Layer 4 - data)
//   Step 6: Build batch loaders         (Layer 4 - data)
//   Step 7: Clear the previous run,     (Layer 6 - infra)
//           save config for evaluate
//   Step 8: Build model + optimizer     (Layer 5 - ml)
//   Step 9: Run the training loop       (Layer 5 - ml)

use anyhow::{Context, Result};
use burn::{
    data::dataset::Dataset,
    optim::AdamWConfig,
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::data::{
    dataset::TaskDataset,
    loader::{read_table, CitationRow, PrimaryRow, SectionRow},
    preprocessor::{balanced_class_weights, Preprocessor},
    sampler::BatchLoader,
};
use crate::domain::errors::ConfigError;
use crate::domain::example::{TaskKind, CITATION_CLASSES};
use crate::domain::traits::TextEncoding;
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::CsvMetricSink,
    tokenizer_store::TokenizerStore,
};
use crate::ml::{
    evaluator::Evaluator,
    loss::{LossConfig, TaskLosses},
    model::{MultiTaskConfig, MultiTaskModel, TextEncoderConfig},
    optim::{Optimization, PolynomialDecay},
    trainer::{EpochReport, TaskSources, Trainer},
};

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters and input paths of a run. Saved next to the
// checkpoint so `evaluate` can rebuild the same model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub train_path:     String,
    pub valid_path:     String,
    pub section_path:   String,
    pub citation_path:  String,
    pub tokenizer_path: String,
    pub checkpoint_dir: String,

    pub epochs:             usize,
    pub batch_size:         usize,
    pub max_seq_len:        usize,
    /// Encoder learning rate; heads train at 10×.
    pub learning_bert_rate: f64,
    /// Primary positive-class weight w; the negative class gets 1 − w.
    pub weights:            f64,
    pub lambda1:            f64,
    pub lambda2:            f64,
    pub dropout:            f64,
    pub seed:               u64,

    pub d_model:    usize,
    pub num_heads:  usize,
    pub num_layers: usize,
    pub d_ff:       usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            train_path:     "data/train.csv".to_string(),
            valid_path:     "data/validation.csv".to_string(),
            section_path:   "data/section_scaffold.csv".to_string(),
            citation_path:  "data/citation_scaffold.csv".to_string(),
            tokenizer_path: "tokenizer/tokenizer.json".to_string(),
            checkpoint_dir: "checkpoints".to_string(),

            epochs:             2,
            batch_size:         16,
            max_seq_len:        256,
            learning_bert_rate: 1e-5,
            weights:            0.75,
            lambda1:            0.18,
            lambda2:            0.09,
            dropout:            0.1,
            seed:               0,

            d_model:    256,
            num_heads:  8,
            num_layers: 4,
            d_ff:       1024,
        }
    }
}

fn out_of_range(field: &'static str, expected: &'static str, value: impl ToString) -> ConfigError {
    ConfigError::OutOfRange { field, expected, value: value.to_string() }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.epochs == 0 {
            return Err(out_of_range("epochs", "> 0", self.epochs));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(out_of_range("dropout", "in [0, 1)", self.dropout));
        }
        if self.weights.is_nan() || self.weights <= 0.0 || self.weights >= 1.0 {
            return Err(out_of_range("weights", "in (0, 1)", self.weights));
        }
        if self.learning_bert_rate.is_nan() || self.learning_bert_rate <= 0.0 {
            return Err(out_of_range("learning_bert_rate", "> 0", self.learning_bert_rate));
        }
        if self.lambda1.is_nan() || self.lambda1 < 0.0 {
            return Err(out_of_range("lambda1", ">= 0", self.lambda1));
        }
        if self.lambda2.is_nan() || self.lambda2 < 0.0 {
            return Err(out_of_range("lambda2", ">= 0", self.lambda2));
        }
        if self.batch_size == 0 {
            return Err(out_of_range("batch_size", "> 0", self.batch_size));
        }
        if self.max_seq_len < 2 {
            return Err(out_of_range("max_seq_len", ">= 2", self.max_seq_len));
        }
        if self.num_heads == 0 || self.d_model % self.num_heads != 0 {
            return Err(out_of_range("num_heads", "a divisor of d_model", self.num_heads));
        }
        Ok(())
    }

    pub fn model_config(&self, vocab_size: usize) -> MultiTaskConfig {
        let encoder = TextEncoderConfig::new(
            vocab_size, self.max_seq_len, self.d_model,
            self.num_heads, self.num_layers, self.d_ff,
        )
        .with_dropout(self.dropout);
        MultiTaskConfig::new(encoder).with_dropout(self.dropout)
    }

    pub fn loss_config(&self, citation_weights: Vec<f32>) -> LossConfig {
        LossConfig {
            positive_weight: self.weights as f32,
            citation_weights,
            lambda1: self.lambda1,
            lambda2: self.lambda2,
        }
    }
}

// ─── Shared data loading ──────────────────────────────────────────────────────

pub(crate) fn load_primary<T: TextEncoding>(path: &str, prep: &Preprocessor<'_, T>, max_len: usize) -> Result<TaskDataset> {
    let rows: Vec<PrimaryRow> = read_table(path)?;
    let examples = prep.primary(&rows).with_context(|| format!("Cannot prepare '{path}'"))?;
    Ok(TaskDataset::new(TaskKind::Primary, max_len, examples)?)
}

pub(crate) fn load_section<T: TextEncoding>(path: &str, prep: &Preprocessor<'_, T>, max_len: usize) -> Result<TaskDataset> {
    let rows: Vec<SectionRow> = read_table(path)?;
    let examples = prep.section(&rows).with_context(|| format!("Cannot prepare '{path}'"))?;
    Ok(TaskDataset::new(TaskKind::Section, max_len, examples)?)
}

pub(crate) fn load_citation<T: TextEncoding>(path: &str, prep: &Preprocessor<'_, T>, max_len: usize) -> Result<TaskDataset> {
    let rows: Vec<CitationRow> = read_table(path)?;
    let examples = prep.citation(&rows).with_context(|| format!("Cannot prepare '{path}'"))?;
    Ok(TaskDataset::new(TaskKind::Citation, max_len, examples)?)
}

/// Balanced weights over the citation scaffold's labels.
pub(crate) fn citation_weights(dataset: &TaskDataset) -> Result<Vec<f32>> {
    Ok(balanced_class_weights(&dataset.labels(TaskKind::Citation), CITATION_CLASSES)?)
}

/// Read only the citation labels needed for the weights, without encoding text.
pub(crate) fn citation_weights_from_table(path: impl AsRef<Path>) -> Result<Vec<f32>> {
    let rows: Vec<CitationRow> = read_table(path)?;
    let labels: Vec<i64> = rows.iter().map(|r| i64::from(r.is_citation)).collect();
    Ok(balanced_class_weights(&labels, CITATION_CLASSES)?)
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────

/// What a finished run reports back to the CLI.
pub struct TrainOutcome {
    pub reports:    Vec<EpochReport>,
    pub best_f1:    f64,
    pub best_epoch: Option<usize>,
}

pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline on backend `B`.
    pub fn execute<B: AutodiffBackend>(&self, device: B::Device) -> Result<TrainOutcome> {
        let cfg = &self.config;

        // ── Step 1: Validate ──────────────────────────────────────────────────
        cfg.validate().context("Invalid configuration")?;

        // ── Step 2: Seed ──────────────────────────────────────────────────────
        // Batch order gets its own StdRng inside the trainer.
        B::seed(cfg.seed);

        // ── Step 3: Tokenizer ─────────────────────────────────────────────────
        let tokenizer = TokenizerStore::load(&cfg.tokenizer_path)?;

        // ── Step 4: Read, clean and encode ────────────────────────────────────
        let prep = Preprocessor::new(&tokenizer, cfg.max_seq_len);
        let train    = load_primary(&cfg.train_path, &prep, cfg.max_seq_len).context("Data loading")?;
        let valid    = load_primary(&cfg.valid_path, &prep, cfg.max_seq_len).context("Data loading")?;
        let section  = load_section(&cfg.section_path, &prep, cfg.max_seq_len).context("Data loading")?;
        let citation = load_citation(&cfg.citation_path, &prep, cfg.max_seq_len).context("Data loading")?;
        tracing::info!(
            "Examples: {} train, {} validation, {} section scaffold, {} citation scaffold",
            train.len(), valid.len(), section.len(), citation.len()
        );

        // ── Step 5: Citation weights ──────────────────────────────────────────
        let weights = citation_weights(&citation).context("Data loading")?;
        tracing::info!("Citation class weights: {:?}", weights);

        // ── Step 6: Batch loaders ─────────────────────────────────────────────
        // Validation runs on the inner backend, no autodiff overhead.
        let sources = TaskSources::<B> {
            primary:  BatchLoader::new(train, device.clone(), cfg.batch_size),
            section:  BatchLoader::new(section, device.clone(), cfg.batch_size),
            citation: BatchLoader::new(citation, device.clone(), cfg.batch_size),
        };
        let valid_loader = BatchLoader::<B::InnerBackend>::new(valid, device.clone(), cfg.batch_size);
        tracing::info!(
            "Batches per epoch: {} primary, {} section, {} citation, {} validation",
            sources.primary.num_batches(), sources.section.num_batches(),
            sources.citation.num_batches(), valid_loader.num_batches()
        );

        // ── Step 7: Persist config ────────────────────────────────────────────
        // The best checkpoint must come from this run and match this config.
        let checkpoints = CheckpointManager::new(&cfg.checkpoint_dir)?;
        checkpoints.reset()?;
        checkpoints.save_config(cfg)?;
        let mut sink = CsvMetricSink::new(checkpoints.dir())?;
        tracing::info!(
            "Checkpoints in '{}', metrics appended to '{}'",
            checkpoints.dir().display(), sink.csv_path().display()
        );

        // ── Step 8: Model, losses, optimizer ──────────────────────────────────
        let model: MultiTaskModel<B> = cfg.model_config(tokenizer.vocab_size()).init(&device);
        tracing::info!("Model ready: {} layers, d_model={}", cfg.num_layers, cfg.d_model);

        let loss_cfg = cfg.loss_config(weights);
        let schedule = PolynomialDecay::new(cfg.learning_bert_rate, sources.schedule_horizon(cfg.epochs));
        let optim    = Optimization::new(
            AdamWConfig::new().with_epsilon(1e-6).with_weight_decay(0.0).init(),
            schedule,
        );
        let mut trainer = Trainer::new(
            TaskLosses::new(&loss_cfg, &device),
            Evaluator::new(TaskLosses::new(&loss_cfg, &device)),
            optim,
            cfg.seed,
        );

        // ── Step 9: Train ─────────────────────────────────────────────────────
        let (_, reports) = trainer.fit(model, &sources, &valid_loader, cfg.epochs, &checkpoints, &mut sink)?;

        Ok(TrainOutcome {
            reports,
            best_f1:    trainer.policy().best(),
            best_epoch: trainer.policy().best_epoch(),
        })
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    use crate::infra::checkpoint::CheckpointMeta;

    fn write_tokenizer(path: &Path) {
        let json = serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": [
                {"id": 0, "content": "[PAD]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
                {"id": 1, "content": "[UNK]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
                {"id": 2, "content": "[CLS]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
                {"id": 3, "content": "[SEP]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true}
            ],
            "normalizer": null,
            "pre_tokenizer": { "type": "Whitespace" },
            "post_processor": null,
            "decoder": null,
            "model": {
                "type": "WordLevel",
                "vocab": {
                    "[PAD]": 0, "[UNK]": 1, "[CLS]": 2, "[SEP]": 3,
                    "we": 4, "propose": 5, "a": 6, "method": 7
                },
                "unk_token": "[UNK]"
            }
        });
        fs::write(path, json.to_string()).unwrap();
    }

    /// Tiny tables and a tiny model in `dir`.
    fn tiny_run(dir: &Path) -> TrainConfig {
        let primary = "text,sub_heading,prev_text,next_text,section,label,citation\n\
                       we propose,a,method,we,method,1,0\n\
                       a method,we,a,propose,result,0,1\n\
                       we,a,a,a,title,6,0\n";
        fs::write(dir.join("train.csv"), primary).unwrap();
        fs::write(dir.join("valid.csv"), primary).unwrap();
        fs::write(dir.join("section.csv"), "text,section\nwe propose,method\na method,abstract\n").unwrap();
        fs::write(dir.join("citation.csv"), "text,is_citation\nwe,True\na,False\n").unwrap();
        write_tokenizer(&dir.join("tokenizer.json"));

        let path = |name: &str| dir.join(name).display().to_string();
        TrainConfig {
            train_path:     path("train.csv"),
            valid_path:     path("valid.csv"),
            section_path:   path("section.csv"),
            citation_path:  path("citation.csv"),
            tokenizer_path: path("tokenizer.json"),
            checkpoint_dir: path("checkpoints"),
            epochs:      1,
            batch_size:  2,
            max_seq_len: 6,
            dropout:     0.0,
            d_model:     8,
            num_heads:   2,
            num_layers:  1,
            d_ff:        16,
            ..TrainConfig::default()
        }
    }

    #[test]
    fn test_new_run_never_inherits_a_previous_best() {
        let dir = TempDir::new().unwrap();
        let cfg = tiny_run(dir.path());

        // A previous run in the same directory left a very good checkpoint.
        let stale = Path::new(&cfg.checkpoint_dir).join("best");
        fs::create_dir_all(&stale).unwrap();
        let meta = CheckpointMeta { epoch: 7, f1: 0.99, precision: 0.99, recall: 0.99, optimizer_steps: 700 };
        fs::write(stale.join("meta.json"), serde_json::to_string(&meta).unwrap()).unwrap();

        type TestBackend = burn::backend::Autodiff<burn::backend::NdArray>;
        let outcome = TrainUseCase::new(cfg.clone()).execute::<TestBackend>(Default::default()).unwrap();
        assert_eq!(outcome.reports.len(), 1);

        let checkpoints = CheckpointManager::new(&cfg.checkpoint_dir).unwrap();
        assert_eq!(checkpoints.load_config().unwrap().d_model, 8);
        match outcome.best_epoch {
            Some(epoch) => assert_eq!(checkpoints.load_meta().unwrap().epoch, epoch),
            None        => assert!(checkpoints.load_meta().is_err()),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(TrainConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let bad = |f: fn(&mut TrainConfig)| {
            let mut cfg = TrainConfig::default();
            f(&mut cfg);
            cfg.validate().unwrap_err()
        };
        assert!(matches!(bad(|c| c.epochs = 0), ConfigError::OutOfRange { field: "epochs", .. }));
        assert!(matches!(bad(|c| c.dropout = 1.0), ConfigError::OutOfRange { field: "dropout", .. }));
        assert!(matches!(bad(|c| c.weights = 1.0), ConfigError::OutOfRange { field: "weights", .. }));
        assert!(matches!(bad(|c| c.weights = 0.0), ConfigError::OutOfRange { field: "weights", .. }));
        assert!(matches!(bad(|c| c.learning_bert_rate = 0.0), ConfigError::OutOfRange { field: "learning_bert_rate", .. }));
        assert!(matches!(bad(|c| c.lambda2 = -0.1), ConfigError::OutOfRange { field: "lambda2", .. }));
        assert!(matches!(bad(|c| c.num_heads = 3), ConfigError::OutOfRange { field: "num_heads", .. }));
    }

    #[test]
    fn test_zero_lambdas_are_allowed() {
        let cfg = TrainConfig { lambda1: 0.0, lambda2: 0.0, ..TrainConfig::default() };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_config_json_round_trip() {
        let cfg  = TrainConfig { seed: 42, ..TrainConfig::default() };
        let back: TrainConfig = serde_json::from_str(&serde_json::to_string(&cfg).unwrap()).unwrap();
        assert_eq!(back.seed, 42);
        assert_eq!(back.lambda1, cfg.lambda1);
    }

    #[test]
    fn test_model_config_uses_tokenizer_vocab() {
        let mc = TrainConfig::default().model_config(31_090);
        assert_eq!(mc.encoder.vocab_size, 31_090);
        assert_eq!(mc.dropout, 0.1);
    }
}
