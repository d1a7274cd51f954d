// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `train` and `evaluate`, and all
// their flags. Defaults mirror TrainConfig::default().

use clap::{Args, Subcommand, ValueEnum};
use crate::application::train_use_case::TrainConfig;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the shared encoder with the primary task and both scaffolds
    Train(TrainArgs),

    /// Score the best checkpoint of a finished run on the validation table
    Evaluate(EvaluateArgs),
}

/// Where tensors live.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceKind {
    /// wgpu (Vulkan / Metal / DX12)
    Gpu,
    /// ndarray on the CPU
    Cpu,
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Load the full TrainConfig from this JSON file; other flags are ignored
    #[arg(long)]
    pub config: Option<String>,

    #[arg(long, value_enum, default_value_t = DeviceKind::Gpu)]
    pub device: DeviceKind,

    /// Primary-task training table
    #[arg(long, default_value = "data/train.csv")]
    pub train_path: String,

    /// Primary-task validation table
    #[arg(long, default_value = "data/validation.csv")]
    pub valid_path: String,

    /// Section scaffold table (text, section)
    #[arg(long, default_value = "data/section_scaffold.csv")]
    pub section_path: String,

    /// Citation scaffold table (text, is_citation)
    #[arg(long, default_value = "data/citation_scaffold.csv")]
    pub citation_path: String,

    /// Pretrained HuggingFace tokenizer.json
    #[arg(long, default_value = "tokenizer/tokenizer.json")]
    pub tokenizer_path: String,

    /// Where the best checkpoint, config and metrics.csv go
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    #[arg(long, default_value_t = 2)]
    pub epochs: usize,

    #[arg(long, default_value_t = 16)]
    pub batch_size: usize,

    /// Sequence length after [CLS]/[SEP] wrapping and padding
    #[arg(long, default_value_t = 256)]
    pub max_seq_len: usize,

    /// Encoder learning rate (heads use 10×)
    #[arg(long, default_value_t = 1e-5)]
    pub learning_bert_rate: f64,

    /// Positive-class weight of the primary loss
    #[arg(long, default_value_t = 0.75)]
    pub weights: f64,

    /// Section scaffold loss weight
    #[arg(long, default_value_t = 0.18)]
    pub lambda1: f64,

    /// Citation scaffold loss weight
    #[arg(long, default_value_t = 0.09)]
    pub lambda2: f64,

    #[arg(long, default_value_t = 0.1)]
    pub dropout: f64,

    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    #[arg(long, default_value_t = 256)]
    pub d_model: usize,

    /// d_model must be divisible by num_heads
    #[arg(long, default_value_t = 8)]
    pub num_heads: usize,

    #[arg(long, default_value_t = 4)]
    pub num_layers: usize,

    #[arg(long, default_value_t = 1024)]
    pub d_ff: usize,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            train_path:         a.train_path,
            valid_path:         a.valid_path,
            section_path:       a.section_path,
            citation_path:      a.citation_path,
            tokenizer_path:     a.tokenizer_path,
            checkpoint_dir:     a.checkpoint_dir,
            epochs:             a.epochs,
            batch_size:         a.batch_size,
            max_seq_len:        a.max_seq_len,
            learning_bert_rate: a.learning_bert_rate,
            weights:            a.weights,
            lambda1:            a.lambda1,
            lambda2:            a.lambda2,
            dropout:            a.dropout,
            seed:               a.seed,
            d_model:            a.d_model,
            num_heads:          a.num_heads,
            num_layers:         a.num_layers,
            d_ff:               a.d_ff,
        }
    }
}

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Directory a previous `train` run wrote to
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Validation table to score instead of the one the run used
    #[arg(long)]
    pub valid_path: Option<String>,

    #[arg(long, value_enum, default_value_t = DeviceKind::Gpu)]
    pub device: DeviceKind,
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    #[test]
    fn test_train_defaults_match_config_defaults() {
        let cli = Cli::try_parse_from(["scaffold-trainer", "train"]).unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        assert_eq!(args.device, DeviceKind::Gpu);

        let from_cli: TrainConfig = args.into();
        let default = TrainConfig::default();
        assert_eq!(serde_json::to_value(&from_cli).unwrap(), serde_json::to_value(&default).unwrap());
    }

    #[test]
    fn test_evaluate_flags() {
        let cli = Cli::try_parse_from([
            "scaffold-trainer", "evaluate", "--device", "cpu", "--valid-path", "v.csv",
        ])
        .unwrap();
        let Commands::Evaluate(args) = cli.command else { panic!("expected evaluate") };
        assert_eq!(args.device, DeviceKind::Cpu);
        assert_eq!(args.valid_path.as_deref(), Some("v.csv"));
    }
}
