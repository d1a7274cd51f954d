// ============================================================
// Layer 4 — Multi-Task Batcher
// ============================================================
// Implements Burn's Batcher trait to stack a Vec<Example> into
// one EncodedBatch on the target device.
//
// How batching works here:
//   Input:  Vec of N Examples, each with sequences of length L
//   Output: EncodedBatch with input_ids / attention_mask [N, L]
//           plus one [N] Int tensor per label channel that
//           every example in the batch carries
//
// Primary labels need extra care: a row labelled with the
// sentinel must stay in the metric stream but must not reach
// the primary cross-entropy (its class index doesn't exist).
// The batcher therefore also records which rows are real.

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::domain::errors::DataError;
use crate::domain::example::{Example, TaskKind, SENTINEL_LABEL};

// ─── PrimaryTargets ───────────────────────────────────────────────────────────
/// Primary-task labels of one batch.
#[derive(Debug, Clone)]
pub struct PrimaryTargets<B: Backend> {
    /// Labels for the loss — sentinel rows are replaced by 0 and
    /// must be filtered through `rows` before use. Shape: [N]
    pub targets: Tensor<B, 1, Int>,

    /// Which rows the primary loss may see.
    pub rows: PrimaryRows<B>,

    /// Raw labels (sentinel included) for the metric engine.
    pub raw: Vec<i64>,
}

#[derive(Debug, Clone)]
pub enum PrimaryRows<B: Backend> {
    /// No sentinel in the batch.
    All,
    /// Indices of the non-sentinel rows.
    Subset(Tensor<B, 1, Int>),
    /// Every row is a sentinel.
    Empty,
}

// ─── EncodedBatch ─────────────────────────────────────────────────────────────
/// A batch ready for the model forward pass.
/// All tensors have batch_size as their first dimension.
#[derive(Debug, Clone)]
pub struct EncodedBatch<B: Backend> {
    /// Token ID sequences — shape: [batch_size, seq_len]
    pub input_ids: Tensor<B, 2, Int>,

    /// Attention masks — shape: [batch_size, seq_len]
    /// 1 = real token, 0 = padding
    pub attention_mask: Tensor<B, 2, Int>,

    pub primary:  Option<PrimaryTargets<B>>,
    pub section:  Option<Tensor<B, 1, Int>>,
    pub citation: Option<Tensor<B, 1, Int>>,

    pub len: usize,
}

impl<B: Backend> EncodedBatch<B> {
    pub fn primary(&self) -> Result<&PrimaryTargets<B>, DataError> {
        self.primary.as_ref().ok_or(DataError::MissingChannel { channel: "primary" })
    }

    pub fn section(&self) -> Result<Tensor<B, 1, Int>, DataError> {
        self.section.clone().ok_or(DataError::MissingChannel { channel: "section" })
    }

    pub fn citation(&self) -> Result<Tensor<B, 1, Int>, DataError> {
        self.citation.clone().ok_or(DataError::MissingChannel { channel: "citation" })
    }
}

// ─── TaskBatcher ──────────────────────────────────────────────────────────────
/// Holds the target device so tensors are created on the right GPU/CPU.
#[derive(Clone, Debug)]
pub struct TaskBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> TaskBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    fn labels(&self, items: &[Example], channel: TaskKind) -> Option<Tensor<B, 1, Int>> {
        let values: Option<Vec<i32>> = items
            .iter()
            .map(|e| e.label(channel).map(|v| v as i32))
            .collect();
        values.map(|v| Tensor::<B, 1, Int>::from_ints(v.as_slice(), &self.device))
    }

    fn primary(&self, items: &[Example]) -> Option<PrimaryTargets<B>> {
        let raw: Vec<i64> = items
            .iter()
            .map(|e| e.labels.primary)
            .collect::<Option<_>>()?;

        let keep: Vec<i32> = raw
            .iter()
            .enumerate()
            .filter(|(_, &l)| l != SENTINEL_LABEL)
            .map(|(i, _)| i as i32)
            .collect();

        let rows = if keep.len() == raw.len() {
            PrimaryRows::All
        } else if keep.is_empty() {
            PrimaryRows::Empty
        } else {
            PrimaryRows::Subset(Tensor::<B, 1, Int>::from_ints(keep.as_slice(), &self.device))
        };

        let loss_labels: Vec<i32> = raw
            .iter()
            .map(|&l| if l == SENTINEL_LABEL { 0 } else { l as i32 })
            .collect();

        Some(PrimaryTargets {
            targets: Tensor::<B, 1, Int>::from_ints(loss_labels.as_slice(), &self.device),
            rows,
            raw,
        })
    }
}

impl<B: Backend> Batcher<Example, EncodedBatch<B>> for TaskBatcher<B> {
    fn batch(&self, items: Vec<Example>) -> EncodedBatch<B> {
        let batch_size = items.len();
        // TaskDataset guarantees every sequence has the same length.
        let seq_len = items.first().map(|e| e.input_ids.len()).unwrap_or(0);

        let input_flat: Vec<i32> = items
            .iter()
            .flat_map(|e| e.input_ids.iter().map(|&x| x as i32))
            .collect();
        let mask_flat: Vec<i32> = items
            .iter()
            .flat_map(|e| e.attention_mask.iter().map(|&x| x as i32))
            .collect();

        let input_ids = Tensor::<B, 1, Int>::from_ints(input_flat.as_slice(), &self.device)
            .reshape([batch_size, seq_len]);
        let attention_mask = Tensor::<B, 1, Int>::from_ints(mask_flat.as_slice(), &self.device)
            .reshape([batch_size, seq_len]);

        EncodedBatch {
            input_ids,
            attention_mask,
            primary:  self.primary(&items),
            section:  self.labels(&items, TaskKind::Section),
            citation: self.labels(&items, TaskKind::Citation),
            len:      batch_size,
        }
    }
}
