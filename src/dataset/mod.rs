//! Reading survey exports into a [`Dataset`].
//!
//! Spreadsheets go through calamine and delimited text through csv. The
//! parser suggested by the file extension is tried first and the other one
//! second, so a mislabelled export still loads.

use crate::error::{PipelineError, Result};
use crate::models::{Cell, Dataset};
use calamine::{open_workbook_auto, Data, Reader};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Spreadsheet,
    Delimited(u8),
}

/// Read a survey export from disk.
pub fn read_dataset(path: &Path) -> Result<Dataset> {
    let source = path.display().to_string();
    let bytes = std::fs::read(path).map_err(|e| PipelineError::unreadable(&source, e))?;

    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "survey".to_string());

    let attempts = match preferred_format(path) {
        Format::Spreadsheet => [Format::Spreadsheet, Format::Delimited(b',')],
        delimited => [delimited, Format::Spreadsheet],
    };

    let mut failures = Vec::new();
    for format in attempts {
        let parsed = match format {
            Format::Spreadsheet => read_spreadsheet(path),
            Format::Delimited(fallback) => {
                read_delimited(&bytes, sniff_delimiter(&bytes, fallback))
            }
        };

        match parsed {
            Ok((headers, rows)) => {
                let dataset = Dataset::new(name, headers, rows).with_digest(digest(&bytes));
                info!(
                    "Loaded {} ({} rows x {} columns, {:?})",
                    source,
                    dataset.row_count(),
                    dataset.columns().len(),
                    format
                );
                return Ok(dataset);
            }
            Err(reason) => {
                debug!("{:?} parser rejected {}: {}", format, source, reason);
                failures.push(reason);
            }
        }
    }

    Err(PipelineError::unreadable(source, failures.join("; ")))
}

/// Hex SHA-256 of the raw input bytes.
pub fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn preferred_format(path: &Path) -> Format {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => Format::Spreadsheet,
        "tsv" | "tab" => Format::Delimited(b'\t'),
        _ => Format::Delimited(b','),
    }
}

const CANDIDATE_DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];

/// Pick the delimiter that splits the header line into the most fields.
/// Quoted text is ignored; `fallback` wins ties.
fn sniff_delimiter(bytes: &[u8], fallback: u8) -> u8 {
    let header = bytes.split(|&b| b == b'\n').next().unwrap_or_default();

    let mut counts = [0usize; CANDIDATE_DELIMITERS.len()];
    let mut quoted = false;
    for &b in header {
        if b == b'"' {
            quoted = !quoted;
        } else if !quoted {
            if let Some(i) = CANDIDATE_DELIMITERS.iter().position(|&d| d == b) {
                counts[i] += 1;
            }
        }
    }

    let count_of = |delimiter: u8| {
        CANDIDATE_DELIMITERS
            .iter()
            .position(|&d| d == delimiter)
            .map_or(0, |i| counts[i])
    };
    let best = CANDIDATE_DELIMITERS
        .iter()
        .copied()
        .max_by_key(|&d| count_of(d))
        .unwrap_or(fallback);

    if count_of(best) > count_of(fallback) {
        best
    } else {
        fallback
    }
}

type Table = (Vec<String>, Vec<Vec<Cell>>);

fn read_delimited(bytes: &[u8], delimiter: u8) -> std::result::Result<Table, String> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| format!("invalid header row: {}", e))?
        .iter()
        .enumerate()
        .map(|(i, h)| {
            if i == 0 {
                h.trim_start_matches('\u{feff}').to_string()
            } else {
                h.to_string()
            }
        })
        .collect();

    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err("no header columns".to_string());
    }

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| format!("record {}: {}", line + 1, e))?;
        rows.push(record.iter().map(Cell::parse).collect());
    }

    Ok((headers, rows))
}

fn read_spreadsheet(path: &Path) -> std::result::Result<Table, String> {
    let mut workbook = open_workbook_auto(path).map_err(|e| e.to_string())?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| "workbook has no sheets".to_string())?
        .map_err(|e| e.to_string())?;

    let mut rows_iter = range.rows();
    let headers: Vec<String> = rows_iter
        .next()
        .ok_or_else(|| "first sheet is empty".to_string())?
        .iter()
        .map(|c| c.to_string())
        .collect();

    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err("no header columns".to_string());
    }

    let rows = rows_iter
        .map(|row| row.iter().map(spreadsheet_cell).collect())
        .collect();

    Ok((headers, rows))
}

fn spreadsheet_cell(data: &Data) -> Cell {
    match data {
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::String(s) => Cell::parse(s),
        Data::Empty | Data::Error(_) => Cell::Missing,
        other => Cell::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_read_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("survey.csv");
        fs::write(
            &path,
            "\u{feff}Branch,Teaching [Clarity],Suggestions\nCS,5,Great\nIT,,More labs\nCS,3\n",
        )
        .unwrap();

        let ds = read_dataset(&path).unwrap();
        assert_eq!(ds.name, "survey");
        assert_eq!(ds.columns(), &["Branch", "Teaching [Clarity]", "Suggestions"]);
        assert_eq!(ds.row_count(), 3);
        assert_eq!(ds.cell(0, 1), &Cell::Number(5.0));
        assert_eq!(ds.cell(1, 1), &Cell::Missing);
        assert_eq!(ds.cell(2, 2), &Cell::Missing);
        assert_eq!(ds.digest.len(), 64);
    }

    #[test]
    fn test_read_tsv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("survey.tsv");
        fs::write(&path, "Library\tFacilities\n4\t2\n").unwrap();

        let ds = read_dataset(&path).unwrap();
        assert_eq!(ds.columns(), &["Library", "Facilities"]);
        assert_eq!(ds.cell(0, 1), &Cell::Number(2.0));
    }

    #[test]
    fn test_semicolon_csv_is_sniffed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.csv");
        fs::write(&path, "Branch;\"Teaching [Clarity, pace]\";Library\nCS;5;4\nIT;3;2\n").unwrap();

        let ds = read_dataset(&path).unwrap();
        assert_eq!(ds.columns(), &["Branch", "Teaching [Clarity, pace]", "Library"]);
        assert_eq!(ds.cell(1, 2), &Cell::Number(2.0));
    }

    #[test]
    fn test_sniff_delimiter() {
        assert_eq!(sniff_delimiter(b"A,B,C\n1,2,3\n", b','), b',');
        assert_eq!(sniff_delimiter(b"A;B;C\n1;2;3\n", b','), b';');
        assert_eq!(sniff_delimiter(b"A|B\n", b','), b'|');
        assert_eq!(sniff_delimiter(b"\"x,y,z\";B\n", b','), b';');
        assert_eq!(sniff_delimiter(b"Single\n5\n", b'\t'), b'\t');
        assert_eq!(sniff_delimiter(b"", b','), b',');
    }

    #[test]
    fn test_mislabelled_spreadsheet_falls_back_to_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("actually_text.xlsx");
        fs::write(&path, "A,B\n1,2\n").unwrap();

        let ds = read_dataset(&path).unwrap();
        assert_eq!(ds.columns(), &["A", "B"]);
        assert_eq!(ds.row_count(), 1);
    }

    #[test]
    fn test_corrupt_input_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.xlsx");
        fs::write(&path, [0xffu8, 0xfe, 0x00, 0x9c, 0x80, 0x0a, 0xc3, 0x28]).unwrap();

        match read_dataset(&path) {
            Err(PipelineError::UnreadableInput { path: p, .. }) => {
                assert!(p.ends_with("broken.xlsx"))
            }
            other => panic!("expected UnreadableInput, got {:?}", other.map(|d| d.name)),
        }
    }

    #[test]
    fn test_missing_file_is_unreadable() {
        let err = read_dataset(Path::new("/no/such/survey.csv")).unwrap_err();
        assert!(matches!(err, PipelineError::UnreadableInput { .. }));
    }

    #[test]
    fn test_empty_file_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        fs::write(&path, "").unwrap();
        assert!(read_dataset(&path).is_err());
    }

    #[test]
    fn test_digest_is_stable() {
        assert_eq!(digest(b"abc"), digest(b"abc"));
        assert_ne!(digest(b"abc"), digest(b"abd"));
        assert!(digest(b"abc").starts_with("ba7816bf"));
    }
}
