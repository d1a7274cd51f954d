// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses arguments with clap, picks the Burn backend, and
// hands off to Layer 2. Only routing and printing here.
//
//   1. `train`    — multi-task training with best-F1 checkpoint
//   2. `evaluate` — re-score that checkpoint on validation data

pub mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use commands::{Commands, DeviceKind, EvaluateArgs, TrainArgs};

use crate::application::{
    evaluate_use_case::EvaluateUseCase,
    train_use_case::{TrainConfig, TrainUseCase},
};

type GpuBackend = burn::backend::Wgpu;
type CpuBackend = burn::backend::NdArray;

#[derive(Parser, Debug)]
#[command(
    name = "scaffold-trainer",
    version,
    about = "Fine-tune a shared encoder on a primary task with section and citation scaffolds."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)    => run_train(args),
            Commands::Evaluate(args) => run_evaluate(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    let device = args.device;
    let config: TrainConfig = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Cannot read config '{path}'"))?;
            serde_json::from_str(&json).with_context(|| format!("Malformed config '{path}'"))?
        }
        None => args.into(),
    };
    tracing::info!("Training with checkpoints in '{}'", config.checkpoint_dir);

    let use_case = TrainUseCase::new(config);
    let outcome = match device {
        DeviceKind::Gpu => use_case.execute::<burn::backend::Autodiff<GpuBackend>>(Default::default())?,
        DeviceKind::Cpu => use_case.execute::<burn::backend::Autodiff<CpuBackend>>(Default::default())?,
    };

    println!("\n{:>5} {:>10} {:>10} {:>10} {:>10} {:>8}", "Epoch", "Train loss", "Valid loss", "Train F1", "Valid F1", "Steps");
    for report in &outcome.reports {
        println!("{}", report.summary_line());
    }

    match outcome.best_epoch {
        Some(epoch) => println!(
            "\nTraining complete. Best validation F1 {:.4} at epoch {} of {}.",
            outcome.best_f1, epoch, outcome.reports.len()
        ),
        None => println!("\nTraining complete. No epoch produced a validation F1 above zero; nothing saved."),
    }
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    let use_case = EvaluateUseCase::new(args.checkpoint_dir, args.valid_path);
    let outcome = match args.device {
        DeviceKind::Gpu => use_case.execute::<GpuBackend>(Default::default())?,
        DeviceKind::Cpu => use_case.execute::<CpuBackend>(Default::default())?,
    };

    println!("\nBest checkpoint: epoch {} (saved F1 {:.4})", outcome.meta.epoch, outcome.meta.f1);
    println!("\n{}", outcome.summary.describe("Validation"));
    Ok(())
}
