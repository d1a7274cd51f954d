// ============================================================
// Layer 3 — Error Taxonomy
// ============================================================
// Typed failures for the stages of a run. The application
// layer wraps these in anyhow contexts naming the stage
// (data loading, training epoch N, evaluation, checkpoint).
//
//   DataError   → fatal, the run aborts
//   MetricError → non-fatal, an undefined score never improves
//   ConfigError → fatal, raised before any data is touched
//   StepError   → fatal, raised during forward/backward

use thiserror::Error;

/// Malformed or inconsistent input data.
#[derive(Debug, Error, PartialEq)]
pub enum DataError {
    #[error("{channel} label {value} at row {row} is outside 0..{classes}")]
    LabelOutOfRange {
        channel: &'static str,
        value:   i64,
        row:     usize,
        classes: usize,
    },

    #[error("{task} example at row {row} is missing its {channel} label")]
    MissingLabel {
        task:    &'static str,
        channel: &'static str,
        row:     usize,
    },

    #[error("row {row}: expected sequences of length {expected}, got input_ids={ids} attention_mask={mask}")]
    SequenceLength {
        row:      usize,
        expected: usize,
        ids:      usize,
        mask:     usize,
    },

    #[error("row {row}: attention mask value {value} is not 0 or 1")]
    MaskValue { row: usize, value: u32 },

    #[error("batch carries no {channel} labels")]
    MissingChannel { channel: &'static str },

    #[error("{what}: {left} predictions vs {right} labels")]
    LengthMismatch {
        what:  &'static str,
        left:  usize,
        right: usize,
    },

    #[error("{task} source has no batches to draw from")]
    EmptySource { task: &'static str },

    #[error("unknown section name '{0}'")]
    UnknownSection(String),

    #[error("citation class {class} never occurs, balanced weights are undefined")]
    MissingClass { class: usize },
}

/// A score whose denominator is zero.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MetricError {
    #[error("{metric} is undefined: {reason}")]
    Undefined {
        metric: &'static str,
        reason: &'static str,
    },
}

/// Out-of-range hyperparameter.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be {expected}, got {value}")]
    OutOfRange {
        field:    &'static str,
        expected: &'static str,
        value:    String,
    },
}

/// Failure inside one optimisation step.
#[derive(Debug, Error, PartialEq)]
pub enum StepError {
    #[error("{task} loss is not finite ({value}) at optimizer step {step}")]
    NonFiniteLoss {
        task:  &'static str,
        value: f64,
        step:  usize,
    },
}
