use crate::core::models::structure::{QualityMetric, ResidueAngles, ResidueScore};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("CSV parsing error for '{path}': {source}")]
    Csv { path: String, source: csv::Error },
    #[error("Invalid record in '{path}' at line {line}: {reason}")]
    InvalidRecord {
        path: String,
        line: u64,
        reason: String,
    },
}

impl TableError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_string_lossy().to_string(),
            source,
        }
    }

    pub(crate) fn csv(path: &Path, source: csv::Error) -> Self {
        Self::Csv {
            path: path.to_string_lossy().to_string(),
            source,
        }
    }
}

/// Reads every row of a headed CSV file, keeping the 1-based line number of each row.
pub(crate) fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<(u64, T)>, TableError> {
    let file = std::fs::File::open(path).map_err(|e| TableError::io(path, e))?;
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(file);
    let headers = reader
        .headers()
        .map_err(|e| TableError::csv(path, e))?
        .clone();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| TableError::csv(path, e))?;
        let line = record.position().map_or(0, |p| p.line());
        let row = record
            .deserialize(Some(&headers))
            .map_err(|e| TableError::csv(path, e))?;
        rows.push((line, row));
    }
    Ok(rows)
}

/// Reads a structure table with columns `protein_id,pos,seq_ctxt,phi,psi`.
pub fn read_residue_angles(path: &Path) -> Result<Vec<ResidueAngles>, TableError> {
    Ok(read_rows(path)?.into_iter().map(|(_, r)| r).collect())
}

/// Reads a quality metric table with columns `protein_id,metric`.
pub fn read_quality_metrics(path: &Path) -> Result<Vec<QualityMetric>, TableError> {
    let rows: Vec<(u64, QualityMetric)> = read_rows(path)?;
    rows.into_iter()
        .map(|(line, m)| {
            if m.metric.is_finite() {
                Ok(m)
            } else {
                Err(TableError::InvalidRecord {
                    path: path.to_string_lossy().to_string(),
                    line,
                    reason: format!("metric for '{}' is not a finite number", m.protein_id),
                })
            }
        })
        .collect()
}

/// Reads per-residue scores previously written by [`write_records`].
pub fn read_residue_scores(path: &Path) -> Result<Vec<ResidueScore>, TableError> {
    Ok(read_rows(path)?.into_iter().map(|(_, r)| r).collect())
}

pub fn write_records<T: Serialize>(path: &Path, records: &[T]) -> Result<(), TableError> {
    let file = std::fs::File::create(path).map_err(|e| TableError::io(path, e))?;
    write_records_to(file, records).map_err(|e| TableError::csv(path, e))
}

pub fn write_records_to<W: Write, T: Serialize>(writer: W, records: &[T]) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(writer);
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}
