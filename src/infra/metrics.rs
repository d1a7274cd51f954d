// ============================================================
// Layer 6 — Metrics Sink
// ============================================================
// Appends key → scalar records to a CSV file, one row per
// metric per epoch:
//
//   epoch,key,value
//   1,training loss,0.512345
//   1,validation loss,0.498765
//   1,Validation F1 Score,0.612000
//
// The long format keeps the column set fixed however many keys
// the trainer reports, and appending lets several runs share a
// directory without clobbering each other.

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
};

use crate::domain::traits::MetricSink;

pub struct CsvMetricSink {
    csv_path: PathBuf,
    writer:   csv::Writer<fs::File>,
}

impl CsvMetricSink {
    /// Open `dir/metrics.csv`, writing the header only if the file is new.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let csv_path = dir.join("metrics.csv");
        let is_new   = !csv_path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&csv_path)
            .with_context(|| format!("Cannot open metrics file '{}'", csv_path.display()))?;

        let mut writer = csv::Writer::from_writer(file);
        if is_new {
            writer.write_record(["epoch", "key", "value"])?;
            writer.flush()?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }
        Ok(Self { csv_path, writer })
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

impl MetricSink for CsvMetricSink {
    fn log_scalar(&mut self, epoch: usize, key: &str, value: f64) -> Result<()> {
        self.writer
            .write_record([epoch.to_string(), key.to_string(), format!("{value:.6}")])
            .with_context(|| format!("Cannot append '{key}' to '{}'", self.csv_path.display()))?;
        // Flushed per row so a crashed run keeps every finished epoch.
        self.writer.flush()?;
        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn rows(path: &Path) -> Vec<Vec<String>> {
        let mut reader = csv::Reader::from_path(path).unwrap();
        reader
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect()
    }

    #[test]
    fn test_appends_long_format_rows() {
        let dir      = TempDir::new().unwrap();
        let mut sink = CsvMetricSink::new(dir.path()).unwrap();
        sink.log_scalar(1, "training loss", 0.5).unwrap();
        sink.log_scalar(1, "Validation F1 Score", 0.25).unwrap();

        assert_eq!(
            rows(sink.csv_path()),
            vec![
                vec!["1".to_string(), "training loss".into(), "0.500000".into()],
                vec!["1".to_string(), "Validation F1 Score".into(), "0.250000".into()],
            ]
        );
    }

    #[test]
    fn test_reopening_keeps_a_single_header() {
        let dir = TempDir::new().unwrap();
        CsvMetricSink::new(dir.path()).unwrap().log_scalar(1, "validation loss", 1.0).unwrap();
        CsvMetricSink::new(dir.path()).unwrap().log_scalar(2, "validation loss", 0.5).unwrap();

        let all = rows(&dir.path().join("metrics.csv"));
        assert_eq!(all.len(), 2);
        assert_eq!(all[1][0], "2");
    }
}
