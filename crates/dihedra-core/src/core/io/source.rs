use super::tables::{TableError, read_rows};
use crate::core::angles::PhiPsi;
use crate::core::models::observation::WindowMatch;
use crate::core::models::window::{SequenceWindow, WindowError};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Invalid window request: {0}")]
    Window(#[from] WindowError),
    #[error("Angle source failed: {0}")]
    Backend(String),
}

/// Retrieval interface for historical angle observations.
///
/// Given a sequence context and a window size, an implementation returns every recorded
/// occurrence of the centered sub-window of that size. Returning no matches is valid and
/// means the database holds no data for that window.
pub trait AngleSource {
    fn fetch(
        &self,
        context: &SequenceWindow,
        window_size: usize,
    ) -> Result<Vec<WindowMatch>, SourceError>;
}

#[derive(Debug, Deserialize)]
struct ObservationRecord {
    window: String,
    match_id: u64,
    offset: usize,
    phi: Option<f64>,
    psi: Option<f64>,
}

/// An in-memory observation table keyed by sub-window sequence.
///
/// Matches for each window are kept ordered by `match_id`, so every consumer sees the same
/// sample order for the same table.
#[derive(Debug, Default, Clone)]
pub struct AngleTable {
    matches: HashMap<String, Vec<WindowMatch>>,
}

impl AngleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a match under the given sub-window sequence.
    pub fn insert(&mut self, window: &SequenceWindow, window_match: WindowMatch) {
        let entry = self.matches.entry(window.as_str().to_string()).or_default();
        let at = entry.partition_point(|m| m.match_id <= window_match.match_id);
        entry.insert(at, window_match);
    }

    pub fn window_count(&self) -> usize {
        self.matches.len()
    }

    /// Loads a table from CSV with columns `window,match_id,offset,phi,psi`.
    ///
    /// Each row holds the angles of one residue (`offset`, zero-based) of one match. Empty
    /// `phi`/`psi` cells mark undefined dihedrals.
    pub fn load(path: &Path) -> Result<Self, TableError> {
        let rows: Vec<(u64, ObservationRecord)> = read_rows(path)?;
        let invalid = |line: u64, reason: String| TableError::InvalidRecord {
            path: path.to_string_lossy().to_string(),
            line,
            reason,
        };

        let mut grouped: BTreeMap<(SequenceWindow, u64), Vec<Option<Option<PhiPsi>>>> =
            BTreeMap::new();
        for (line, record) in rows {
            let window =
                SequenceWindow::new(&record.window).map_err(|e| invalid(line, e.to_string()))?;
            if record.offset >= window.width() {
                return Err(invalid(
                    line,
                    format!(
                        "offset {} is outside window '{}' of width {}",
                        record.offset,
                        window,
                        window.width()
                    ),
                ));
            }
            let width = window.width();
            let slots = grouped
                .entry((window, record.match_id))
                .or_insert_with(|| vec![None; width]);
            if slots[record.offset].is_some() {
                return Err(invalid(
                    line,
                    format!(
                        "duplicate offset {} for match {}",
                        record.offset, record.match_id
                    ),
                ));
            }
            slots[record.offset] = Some(PhiPsi::from_optional(record.phi, record.psi));
        }

        let mut table = Self::new();
        for ((window, match_id), slots) in grouped {
            let window_size = window.width();
            // Offsets never listed are treated like rows with empty angles.
            let angles = slots.into_iter().map(Option::flatten).collect();
            table.insert(
                &window,
                WindowMatch {
                    match_id,
                    window_size,
                    angles,
                },
            );
        }
        Ok(table)
    }
}

impl AngleSource for AngleTable {
    fn fetch(
        &self,
        context: &SequenceWindow,
        window_size: usize,
    ) -> Result<Vec<WindowMatch>, SourceError> {
        let window = context.subwindow(window_size)?;
        Ok(self
            .matches
            .get(window.as_str())
            .cloned()
            .unwrap_or_default())
    }
}
