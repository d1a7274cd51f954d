// ============================================================
// Layer 4 — Task Dataset
// ============================================================
// Implements Burn's Dataset trait over the encoded examples of
// one source (primary, section scaffold or citation scaffold).
//
// Every example is checked against the source's task on the
// way in: sequence length, mask values, and the label channels
// that task requires. `row` in those errors is the position in
// the dataset; rows built from a CSV table were already checked
// against their file line by the preprocessor.

use burn::data::dataset::Dataset;

use crate::domain::errors::DataError;
use crate::domain::example::{Example, TaskKind};

/// The examples of one task source, validated once at construction
/// so batching never has to fail.
pub struct TaskDataset {
    task:     TaskKind,
    examples: Vec<Example>,
}

impl TaskDataset {
    pub fn new(task: TaskKind, seq_len: usize, examples: Vec<Example>) -> Result<Self, DataError> {
        for (row, ex) in examples.iter().enumerate() {
            ex.validate(task, seq_len, row)?;
        }
        Ok(Self { task, examples })
    }

    pub fn task(&self) -> TaskKind { self.task }

    /// Every value of one label channel, in row order.
    pub fn labels(&self, channel: TaskKind) -> Vec<i64> {
        self.examples.iter().filter_map(|e| e.label(channel)).collect()
    }

    /// Number of batches of `batch_size`, keeping a partial last batch.
    pub fn batch_count(&self, batch_size: usize) -> usize {
        self.examples.len().div_ceil(batch_size.max(1))
    }
}

impl Dataset<Example> for TaskDataset {
    fn get(&self, index: usize) -> Option<Example> {
        self.examples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.examples.len()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::example::LabelSet;

    fn ex(section: i64) -> Example {
        Example::new(vec![1, 2], vec![1, 1], LabelSet::section_only(section))
    }

    #[test]
    fn test_batch_count_keeps_partial_batch() {
        let ds = TaskDataset::new(TaskKind::Section, 2, (0..5).map(|_| ex(1)).collect()).unwrap();
        assert_eq!(ds.batch_count(2), 3);
        assert_eq!(ds.batch_count(5), 1);
    }

    #[test]
    fn test_invalid_row_is_reported_with_its_index() {
        let err = TaskDataset::new(TaskKind::Section, 2, vec![ex(0), ex(9)])
            .err()
            .unwrap();
        assert!(matches!(err, DataError::LabelOutOfRange { row: 1, value: 9, .. }));
    }

    #[test]
    fn test_labels_follow_row_order() {
        let ds = TaskDataset::new(TaskKind::Section, 2, vec![ex(3), ex(0), ex(5)]).unwrap();
        assert_eq!(ds.labels(TaskKind::Section), vec![3, 0, 5]);
        assert!(ds.labels(TaskKind::Citation).is_empty());
        assert_eq!(ds.task(), TaskKind::Section);
    }
}
