use crate::core::residues;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum WindowError {
    #[error("Sequence window cannot be empty")]
    Empty,
    #[error("Invalid residue code '{code}' at position {position} of window '{window}'")]
    InvalidResidue {
        window: String,
        code: char,
        position: usize,
    },
    #[error("Window size {size} must be between 1 and the context width {width}")]
    InvalidSize { size: usize, width: usize },
}

/// A contiguous stretch of residues, used as the lookup key into the angle database.
///
/// The central residue sits at index `width / 2`. Sub-windows of any size are taken
/// centered on that same residue, so all of them describe the same position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SequenceWindow {
    residues: String,
}

impl SequenceWindow {
    pub fn new(sequence: &str) -> Result<Self, WindowError> {
        let residues = sequence.trim().to_ascii_uppercase();
        if residues.is_empty() {
            return Err(WindowError::Empty);
        }
        if let Some((position, code)) = residues
            .chars()
            .enumerate()
            .find(|(_, c)| !residues::is_residue_code(*c))
        {
            return Err(WindowError::InvalidResidue {
                window: residues.clone(),
                code,
                position,
            });
        }
        Ok(Self { residues })
    }

    pub fn as_str(&self) -> &str {
        &self.residues
    }

    pub fn width(&self) -> usize {
        self.residues.len()
    }

    pub fn center_index(&self) -> usize {
        self.width() / 2
    }

    pub fn center_residue(&self) -> char {
        // Non-empty and ASCII-only by construction.
        self.residues.as_bytes()[self.center_index()] as char
    }

    /// Offset of the centered sub-window of `size` residues within this window.
    pub fn subwindow_offset(&self, size: usize) -> Result<usize, WindowError> {
        if size == 0 || size > self.width() {
            return Err(WindowError::InvalidSize {
                size,
                width: self.width(),
            });
        }
        Ok(self.center_index() - size / 2)
    }

    pub fn subwindow(&self, size: usize) -> Result<SequenceWindow, WindowError> {
        let start = self.subwindow_offset(size)?;
        Ok(Self {
            residues: self.residues[start..start + size].to_string(),
        })
    }
}

impl fmt::Display for SequenceWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.residues)
    }
}
