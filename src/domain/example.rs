// ============================================================
// Layer 3 — Example Domain Type
// ============================================================
// One tokenised textual unit with up to three label channels:
//
//   primary   0/1 (or the sentinel 6)  — main task
//   section   0..=5                    — section scaffold
//   citation  0/1                      — citation scaffold
//
// Which channels are present depends on where the example
// came from: primary-task rows carry all three, each scaffold
// row carries only its own.

use serde::{Deserialize, Serialize};

use crate::domain::errors::DataError;

/// Label value marking a primary record as "not applicable".
/// Such records are skipped by the F1 computation and by the
/// primary loss.
pub const SENTINEL_LABEL: i64 = 6;

pub const PRIMARY_CLASSES:  usize = 2;
pub const SECTION_CLASSES:  usize = 6;
pub const CITATION_CLASSES: usize = 2;

/// Fixed section vocabulary, index = class id.
pub const SECTION_NAMES: [&str; SECTION_CLASSES] =
    ["result", "background", "method", "introduction", "abstract", "title"];

/// Map a section name to its class id.
pub fn section_id(name: &str) -> Result<i64, DataError> {
    SECTION_NAMES
        .iter()
        .position(|s| *s == name)
        .map(|i| i as i64)
        .ok_or_else(|| DataError::UnknownSection(name.to_string()))
}

/// The three tasks sharing the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    Primary,
    Section,
    Citation,
}

impl TaskKind {
    pub fn name(self) -> &'static str {
        match self {
            TaskKind::Primary  => "primary",
            TaskKind::Section  => "section",
            TaskKind::Citation => "citation",
        }
    }

    pub fn num_classes(self) -> usize {
        match self {
            TaskKind::Primary  => PRIMARY_CLASSES,
            TaskKind::Section  => SECTION_CLASSES,
            TaskKind::Citation => CITATION_CLASSES,
        }
    }
}

/// Optional label channels of one example.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSet {
    pub primary:  Option<i64>,
    pub section:  Option<i64>,
    pub citation: Option<i64>,
}

impl LabelSet {
    pub fn primary_task(primary: i64, section: i64, citation: i64) -> Self {
        Self { primary: Some(primary), section: Some(section), citation: Some(citation) }
    }

    pub fn section_only(section: i64) -> Self {
        Self { section: Some(section), ..Self::default() }
    }

    pub fn citation_only(citation: i64) -> Self {
        Self { citation: Some(citation), ..Self::default() }
    }
}

/// A fully tokenised and padded example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub input_ids:      Vec<u32>,
    pub attention_mask: Vec<u32>,
    pub labels:         LabelSet,
}

impl Example {
    pub fn new(input_ids: Vec<u32>, attention_mask: Vec<u32>, labels: LabelSet) -> Self {
        Self { input_ids, attention_mask, labels }
    }

    /// Check shape and label ranges for an example drawn from `task`'s source.
    /// `row` is only used for error messages.
    pub fn validate(&self, task: TaskKind, seq_len: usize, row: usize) -> Result<(), DataError> {
        if self.input_ids.len() != seq_len || self.attention_mask.len() != seq_len {
            return Err(DataError::SequenceLength {
                row,
                expected: seq_len,
                ids:      self.input_ids.len(),
                mask:     self.attention_mask.len(),
            });
        }
        if let Some(&value) = self.attention_mask.iter().find(|&&m| m > 1) {
            return Err(DataError::MaskValue { row, value });
        }

        let required: &[TaskKind] = match task {
            TaskKind::Primary  => &[TaskKind::Primary, TaskKind::Section, TaskKind::Citation],
            TaskKind::Section  => &[TaskKind::Section],
            TaskKind::Citation => &[TaskKind::Citation],
        };
        for &channel in required {
            let value = self.label(channel).ok_or(DataError::MissingLabel {
                task:    task.name(),
                channel: channel.name(),
                row,
            })?;
            let sentinel_ok = channel == TaskKind::Primary && value == SENTINEL_LABEL;
            if !sentinel_ok && !(0..channel.num_classes() as i64).contains(&value) {
                return Err(DataError::LabelOutOfRange {
                    channel: channel.name(),
                    value,
                    row,
                    classes: channel.num_classes(),
                });
            }
        }
        Ok(())
    }

    pub fn label(&self, channel: TaskKind) -> Option<i64> {
        match channel {
            TaskKind::Primary  => self.labels.primary,
            TaskKind::Section  => self.labels.section,
            TaskKind::Citation => self.labels.citation,
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn padded(labels: LabelSet) -> Example {
        Example::new(vec![101, 7, 102, 0], vec![1, 1, 1, 0], labels)
    }

    #[test]
    fn test_section_ids_follow_fixed_dictionary() {
        assert_eq!(section_id("result").unwrap(), 0);
        assert_eq!(section_id("title").unwrap(), 5);
        assert!(matches!(section_id("discussion"), Err(DataError::UnknownSection(_))));
    }

    #[test]
    fn test_primary_example_needs_all_channels() {
        let ex  = padded(LabelSet { primary: Some(1), section: Some(2), citation: None });
        let err = ex.validate(TaskKind::Primary, 4, 3).unwrap_err();
        assert_eq!(
            err,
            DataError::MissingLabel { task: "primary", channel: "citation", row: 3 }
        );
    }

    #[test]
    fn test_sentinel_is_a_valid_primary_label() {
        let ex = padded(LabelSet::primary_task(SENTINEL_LABEL, 0, 1));
        assert!(ex.validate(TaskKind::Primary, 4, 0).is_ok());
    }

    #[test]
    fn test_sentinel_is_rejected_on_other_channels() {
        let ex = padded(LabelSet::section_only(SENTINEL_LABEL));
        assert!(matches!(
            ex.validate(TaskKind::Section, 4, 0),
            Err(DataError::LabelOutOfRange { channel: "section", .. })
        ));
    }

    #[test]
    fn test_ragged_sequence_is_rejected() {
        let ex = padded(LabelSet::citation_only(1));
        assert!(matches!(
            ex.validate(TaskKind::Citation, 5, 0),
            Err(DataError::SequenceLength { expected: 5, .. })
        ));
    }

    #[test]
    fn test_scaffold_example_ignores_absent_channels() {
        let ex = padded(LabelSet::section_only(5));
        assert!(ex.validate(TaskKind::Section, 4, 0).is_ok());
    }
}
