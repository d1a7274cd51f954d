// ============================================================
// Layer 4 — Table Loader
// ============================================================
// Reads the four input tables with the csv crate. Each table is
// deserialised straight into a typed row struct via serde, so a
// missing required column fails loudly with the file name.
//
//   primary train / validation:
//     text, sub_heading, prev_text, next_text, section, label, citation
//   section scaffold:
//     text, section
//   citation scaffold:
//     text, is_citation          (True/False, true/false or 1/0)
//
// Extra columns are ignored. Empty text cells become "".

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use std::path::Path;

/// One row of the primary training or validation table.
#[derive(Debug, Clone, Deserialize)]
pub struct PrimaryRow {
    pub text: String,
    #[serde(default)]
    pub sub_heading: String,
    #[serde(default)]
    pub prev_text: String,
    #[serde(default)]
    pub next_text: String,
    pub section: String,
    pub label: i64,
    pub citation: i64,
}

/// One row of the section-scaffold table.
#[derive(Debug, Clone, Deserialize)]
pub struct SectionRow {
    pub text: String,
    pub section: String,
}

/// One row of the citation-scaffold table.
#[derive(Debug, Clone, Deserialize)]
pub struct CitationRow {
    pub text: String,
    #[serde(deserialize_with = "flag")]
    pub is_citation: bool,
}

/// Read every row of a CSV file with headers.
pub fn read_table<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Vec<T>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Cannot open table '{}'", path.display()))?;

    let mut rows = Vec::new();
    for (i, record) in reader.deserialize().enumerate() {
        // +2: one for the header line, one for 1-based numbering
        let row: T = record
            .with_context(|| format!("Malformed row at line {} of '{}'", i + 2, path.display()))?;
        rows.push(row);
    }

    tracing::info!("Read {} rows from '{}'", rows.len(), path.display());
    Ok(rows)
}

fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    let raw = String::deserialize(deserializer)?;
    match raw.trim() {
        "True" | "true" | "TRUE" | "1" | "1.0" => Ok(true),
        "False" | "false" | "FALSE" | "0" | "0.0" => Ok(false),
        other => Err(serde::de::Error::custom(format!("not a boolean flag: '{other}'"))),
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_reads_primary_rows_with_missing_context() {
        let dir  = TempDir::new().unwrap();
        let path = dir.path().join("train.csv");
        fs::write(
            &path,
            "text,sub_heading,prev_text,next_text,section,label,citation\n\
             We propose X.,Intro,,Next one.,introduction,1,0\n",
        )
        .unwrap();

        let rows: Vec<PrimaryRow> = read_table(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].prev_text, "");
        assert_eq!(rows[0].section, "introduction");
        assert_eq!(rows[0].label, 1);
    }

    #[test]
    fn test_citation_flags_accept_python_booleans() {
        let dir  = TempDir::new().unwrap();
        let path = dir.path().join("citation.csv");
        fs::write(&path, "text,is_citation\na,True\nb,False\nc,1\n").unwrap();

        let rows: Vec<CitationRow> = read_table(&path).unwrap();
        let flags: Vec<bool> = rows.iter().map(|r| r.is_citation).collect();
        assert_eq!(flags, vec![true, false, true]);
    }

    #[test]
    fn test_bad_flag_names_the_line() {
        let dir  = TempDir::new().unwrap();
        let path = dir.path().join("citation.csv");
        fs::write(&path, "text,is_citation\na,maybe\n").unwrap();

        let err = read_table::<CitationRow>(&path).unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(read_table::<SectionRow>(dir.path().join("nope.csv")).is_err());
    }
}
