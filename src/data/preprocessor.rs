// ============================================================
// Layer 4 — Row Cleaning and Encoding
// ============================================================
// Turns loaded table rows into validated Examples.
//
// Cleaning rules (applied before encoding):
//   primary tables   — drop rows whose section is "others",
//                      rewrite "experiment" → "result"
//   section scaffold — drop rows labelled "discussion"
//
// Input text for the primary task joins the sentence with its
// surrounding context:
//
//   text # sub_heading # prev_text # next_text
//
// Scaffold rows are encoded from their text alone.
//
// Errors name the CSV line of the offending row (header = line 1),
// counted before any row is dropped.

use anyhow::{Context, Result};

use crate::data::loader::{CitationRow, PrimaryRow, SectionRow};
use crate::domain::errors::DataError;
use crate::domain::example::{section_id, Example, LabelSet, TaskKind};
use crate::domain::traits::TextEncoding;

const DROPPED_PRIMARY_SECTION:  &str = "others";
const DROPPED_SCAFFOLD_SECTION: &str = "discussion";
const CONTEXT_SEPARATOR:        &str = " # ";

pub struct Preprocessor<'a, T: TextEncoding> {
    encoder: &'a T,
    max_len: usize,
}

impl<'a, T: TextEncoding> Preprocessor<'a, T> {
    pub fn new(encoder: &'a T, max_len: usize) -> Self {
        Self { encoder, max_len }
    }

    pub fn primary(&self, rows: &[PrimaryRow]) -> Result<Vec<Example>> {
        let kept: Vec<(usize, &PrimaryRow)> = numbered(rows)
            .filter(|(_, r)| r.section != DROPPED_PRIMARY_SECTION)
            .collect();
        tracing::info!(
            "Primary rows: kept {} of {} (dropped section '{}')",
            kept.len(), rows.len(), DROPPED_PRIMARY_SECTION
        );

        kept.into_iter()
            .map(|(line, row)| -> Result<Example> {
                let section = section_id(&normalise_primary_section(&row.section))
                    .with_context(|| format!("Line {line}"))?;
                let (ids, mask) = self.encode(&compose_context(row), line)?;
                let labels = LabelSet::primary_task(row.label, section, row.citation);
                self.checked(TaskKind::Primary, Example::new(ids, mask, labels), line)
            })
            .collect()
    }

    pub fn section(&self, rows: &[SectionRow]) -> Result<Vec<Example>> {
        let kept: Vec<(usize, &SectionRow)> = numbered(rows)
            .filter(|(_, r)| r.section != DROPPED_SCAFFOLD_SECTION)
            .collect();
        tracing::info!("Section scaffold rows: kept {} of {}", kept.len(), rows.len());

        kept.into_iter()
            .map(|(line, row)| -> Result<Example> {
                let section = section_id(&row.section).with_context(|| format!("Line {line}"))?;
                let (ids, mask) = self.encode(&row.text, line)?;
                self.checked(TaskKind::Section, Example::new(ids, mask, LabelSet::section_only(section)), line)
            })
            .collect()
    }

    pub fn citation(&self, rows: &[CitationRow]) -> Result<Vec<Example>> {
        numbered(rows)
            .map(|(line, row)| -> Result<Example> {
                let (ids, mask) = self.encode(&row.text, line)?;
                let labels = LabelSet::citation_only(i64::from(row.is_citation));
                self.checked(TaskKind::Citation, Example::new(ids, mask, labels), line)
            })
            .collect()
    }

    fn encode(&self, text: &str, line: usize) -> Result<(Vec<u32>, Vec<u32>)> {
        self.encoder
            .encode(text, self.max_len)
            .with_context(|| format!("Cannot encode line {line}"))
    }

    fn checked(&self, task: TaskKind, example: Example, line: usize) -> Result<Example> {
        example
            .validate(task, self.max_len, line)
            .with_context(|| format!("Invalid {} row at line {line}", task.name()))?;
        Ok(example)
    }
}

/// Pair every row with its CSV line number.
fn numbered<T>(rows: &[T]) -> impl Iterator<Item = (usize, &T)> {
    rows.iter().enumerate().map(|(i, row)| (i + 2, row))
}

/// `experiment` sections are folded into `result`.
pub fn normalise_primary_section(section: &str) -> String {
    section.replace("experiment", "result")
}

pub fn compose_context(row: &PrimaryRow) -> String {
    [
        row.text.as_str(),
        row.sub_heading.as_str(),
        row.prev_text.as_str(),
        row.next_text.as_str(),
    ]
    .join(CONTEXT_SEPARATOR)
}

/// Balanced class weights `n / (k · count_c)`, normalised to sum to 1.
pub fn balanced_class_weights(labels: &[i64], num_classes: usize) -> Result<Vec<f32>, DataError> {
    let mut counts = vec![0usize; num_classes];
    for (row, &label) in labels.iter().enumerate() {
        let slot = usize::try_from(label)
            .ok()
            .filter(|&c| c < num_classes)
            .ok_or(DataError::LabelOutOfRange {
                channel: "citation",
                value:   label,
                row,
                classes: num_classes,
            })?;
        counts[slot] += 1;
    }
    if let Some(class) = counts.iter().position(|&c| c == 0) {
        return Err(DataError::MissingClass { class });
    }

    let n = labels.len() as f64;
    let raw: Vec<f64> = counts
        .iter()
        .map(|&c| n / (num_classes as f64 * c as f64))
        .collect();
    let total: f64 = raw.iter().sum();
    Ok(raw.iter().map(|w| (w / total) as f32).collect())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    /// One id per character, padded with zeros.
    struct CharEncoder;

    impl TextEncoding for CharEncoder {
        fn encode(&self, text: &str, max_len: usize) -> Result<(Vec<u32>, Vec<u32>)> {
            let mut ids: Vec<u32> = text.chars().take(max_len).map(|c| c as u32 % 50 + 1).collect();
            let mut mask = vec![1u32; ids.len()];
            ids.resize(max_len, 0);
            mask.resize(max_len, 0);
            Ok((ids, mask))
        }

        fn vocab_size(&self) -> usize { 51 }
    }

    fn primary_row(section: &str, label: i64) -> PrimaryRow {
        PrimaryRow {
            text:        "a".into(),
            sub_heading: "b".into(),
            prev_text:   "c".into(),
            next_text:   "d".into(),
            section:     section.into(),
            label,
            citation:    0,
        }
    }

    #[test]
    fn test_context_is_joined_with_hashes() {
        assert_eq!(compose_context(&primary_row("method", 0)), "a # b # c # d");
    }

    #[test]
    fn test_primary_cleaning_drops_others_and_folds_experiment() {
        let enc  = CharEncoder;
        let prep = Preprocessor::new(&enc, 16);
        let rows = vec![
            primary_row("others", 0),
            primary_row("experiment", 1),
            primary_row("title", 0),
        ];
        let examples = prep.primary(&rows).unwrap();
        assert_eq!(examples.len(), 2);
        assert_eq!(examples[0].labels.section, Some(0)); // result
        assert_eq!(examples[1].labels.section, Some(5)); // title
        assert_eq!(examples[0].input_ids.len(), 16);
    }

    #[test]
    fn test_section_scaffold_drops_discussion() {
        let enc  = CharEncoder;
        let prep = Preprocessor::new(&enc, 8);
        let rows = vec![
            SectionRow { text: "x".into(), section: "discussion".into() },
            SectionRow { text: "y".into(), section: "background".into() },
        ];
        let examples = prep.section(&rows).unwrap();
        assert_eq!(examples.len(), 1);
        assert_eq!(examples[0].labels, LabelSet::section_only(1));
    }

    #[test]
    fn test_unknown_section_is_fatal() {
        let enc  = CharEncoder;
        let prep = Preprocessor::new(&enc, 8);
        assert!(prep.primary(&[primary_row("appendix", 0)]).is_err());
    }

    #[test]
    fn test_errors_name_the_csv_line_before_filtering() {
        let enc  = CharEncoder;
        let prep = Preprocessor::new(&enc, 8);
        let rows = vec![
            primary_row("others", 0),
            primary_row("others", 0),
            primary_row("method", 3),
        ];
        let err = prep.primary(&rows).unwrap_err();
        assert!(format!("{err:#}").contains("line 4"), "{err:#}");
        assert!(matches!(
            err.downcast_ref::<DataError>(),
            Some(DataError::LabelOutOfRange { row: 4, value: 3, .. })
        ));
    }

    #[test]
    fn test_balanced_weights_are_normalised() {
        // 3 negatives, 1 positive → raw [4/6, 4/2] → normalised [0.25, 0.75]
        let w = balanced_class_weights(&[0, 0, 0, 1], 2).unwrap();
        assert!((w[0] - 0.25).abs() < 1e-6);
        assert!((w[1] - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_balanced_weights_need_every_class() {
        assert_eq!(
            balanced_class_weights(&[0, 0], 2),
            Err(DataError::MissingClass { class: 1 })
        );
    }
}
