// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Persists the best epoch of a run and the config needed to
// rebuild its model.
//
// Directory layout:
//   checkpoints/
//     train_config.json      ← full TrainConfig of the run
//     best/
//       meta.json            ← epoch, validation scores, step count
//       model.mpk.gz         ← model record (CompactRecorder)
//       optimizer.mpk.gz     ← AdamW moment estimates
//       schedule.json        ← learning-rate schedule position
//
// Replacing the best checkpoint never leaves a half-written
// `best/` behind:
//   1. write everything into best.partial/
//   2. rename best/         → best.old/
//   3. rename best.partial/ → best/
//   4. delete best.old/
// A crash between 2 and 3 leaves best.old/, which loading
// falls back to. A leftover best.old/ from such a crash is only
// removed once the new best/ is in place.
//
// A new run calls `reset` before saving its config, so `evaluate`
// never pairs one run's config with another run's weights.

use anyhow::{bail, Context, Result};
use burn::{
    optim::Optimizer,
    prelude::*,
    record::{CompactRecorder, Recorder},
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::application::train_use_case::TrainConfig;
use crate::ml::model::MultiTaskModel;
use crate::ml::optim::{Optimization, PolynomialDecay};

const BEST:    &str = "best";
const PARTIAL: &str = "best.partial";
const OLD:     &str = "best.old";

/// What the best checkpoint records about its epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub epoch:           usize,
    pub f1:              f64,
    pub precision:       f64,
    pub recall:          f64,
    pub optimizer_steps: usize,
}

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Creates the directory if it doesn't already exist.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Forget every checkpoint of a previous run in this directory.
    pub fn reset(&self) -> Result<()> {
        for name in [BEST, OLD, PARTIAL] {
            let path = self.dir.join(name);
            if path.exists() {
                fs::remove_dir_all(&path)
                    .with_context(|| format!("Cannot remove previous checkpoint '{}'", path.display()))?;
                tracing::info!("Removed checkpoint of a previous run: '{}'", path.display());
            }
        }
        Ok(())
    }

    /// Write a complete checkpoint and swap it in as the new best.
    pub fn save_best<B, O>(
        &self,
        model: &MultiTaskModel<B>,
        optim: &Optimization<B, O>,
        meta:  &CheckpointMeta,
    ) -> Result<()>
    where
        B: AutodiffBackend,
        O: Optimizer<MultiTaskModel<B>, B>,
    {
        let staging = self.dir.join(PARTIAL);
        if staging.exists() {
            fs::remove_dir_all(&staging)
                .with_context(|| format!("Cannot clear stale '{}'", staging.display()))?;
        }
        fs::create_dir_all(&staging)?;

        // ── Stage ─────────────────────────────────────────────────────────────
        // The recorder appends its own extension.
        CompactRecorder::new()
            .record(model.clone().into_record(), staging.join("model"))
            .context("Failed to write model record")?;
        CompactRecorder::new()
            .record(optim.optim.to_record(), staging.join("optimizer"))
            .context("Failed to write optimizer record")?;
        write_json(&staging.join("schedule.json"), &optim.schedule)?;
        write_json(&staging.join("meta.json"), meta)?;

        // ── Swap ──────────────────────────────────────────────────────────────
        let best = self.dir.join(BEST);
        let old  = self.dir.join(OLD);
        if best.join("meta.json").exists() {
            if old.exists() {
                fs::remove_dir_all(&old)?;
            }
            fs::rename(&best, &old).context("Cannot move previous best checkpoint aside")?;
        } else if best.exists() {
            // Incomplete best/; best.old/ stays the fallback until the rename below.
            fs::remove_dir_all(&best)?;
        }
        fs::rename(&staging, &best).context("Cannot promote staged checkpoint")?;
        if old.exists() {
            fs::remove_dir_all(&old)?;
        }

        tracing::info!("Best checkpoint updated: epoch {} (F1 {:.4})", meta.epoch, meta.f1);
        Ok(())
    }

    /// Directory of the most recent complete best checkpoint.
    fn best_dir(&self) -> Result<PathBuf> {
        let best = self.dir.join(BEST);
        if best.join("meta.json").exists() {
            return Ok(best);
        }
        let old = self.dir.join(OLD);
        if old.join("meta.json").exists() {
            tracing::warn!("'{}' is incomplete, falling back to '{}'", best.display(), old.display());
            return Ok(old);
        }
        bail!(
            "No best checkpoint in '{}'. Has a training epoch produced a defined F1 yet?",
            self.dir.display()
        )
    }

    pub fn load_meta(&self) -> Result<CheckpointMeta> {
        read_json(&self.best_dir()?.join("meta.json"))
    }

    pub fn load_schedule(&self) -> Result<PolynomialDecay> {
        read_json(&self.best_dir()?.join("schedule.json"))
    }

    /// Load the best weights into a model of the same architecture.
    pub fn load_best_model<B: Backend>(
        &self,
        model:  MultiTaskModel<B>,
        device: &B::Device,
    ) -> Result<MultiTaskModel<B>> {
        let path = self.best_dir()?.join("model");
        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| format!("Cannot load checkpoint '{}'", path.display()))?;
        Ok(model.load_record(record))
    }

    /// Saved before training starts so `evaluate` can rebuild the model.
    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        write_json(&self.dir.join("train_config.json"), cfg)
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join("train_config.json");
        read_json(&path).with_context(|| "Make sure you have run 'train' before 'evaluate'.")
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("Cannot write '{}'", path.display()))
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Cannot read '{}'", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Malformed JSON in '{}'", path.display()))
}
