use super::observation::WindowMatch;
use super::window::{SequenceWindow, WindowError};
use crate::core::angles::PhiPsi;

/// `(phi, psi)` pairs for every residue of a fixed-width sequence context.
///
/// Positions are `None` where the sample has no valid pair: residues outside a shorter
/// sub-window, chain termini, or undefined dihedrals in the source structure.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiResidueAngleVector {
    positions: Vec<Option<PhiPsi>>,
}

impl MultiResidueAngleVector {
    pub fn new(positions: Vec<Option<PhiPsi>>) -> Self {
        Self { positions }
    }

    /// Places the angles of a sub-window match into the full context width.
    pub fn from_match(
        window_match: &WindowMatch,
        context: &SequenceWindow,
    ) -> Result<Self, WindowError> {
        let offset = context.subwindow_offset(window_match.window_size)?;
        let mut positions = vec![None; context.width()];
        for (i, angles) in window_match.angles.iter().enumerate() {
            if let Some(slot) = positions.get_mut(offset + i) {
                *slot = *angles;
            }
        }
        Ok(Self { positions })
    }

    pub fn width(&self) -> usize {
        self.positions.len()
    }

    pub fn positions(&self) -> &[Option<PhiPsi>] {
        &self.positions
    }

    pub fn get(&self, index: usize) -> Option<PhiPsi> {
        self.positions.get(index).copied().flatten()
    }

    pub fn valid_count(&self) -> usize {
        self.positions.iter().filter(|p| p.is_some()).count()
    }

    /// Sum of per-position circular distances over positions valid in both vectors.
    ///
    /// Returns `None` when the widths differ or no position is valid in both.
    pub fn distance(&self, other: &Self) -> Option<f64> {
        if self.width() != other.width() {
            return None;
        }
        let mut total = 0.0;
        let mut overlap = 0usize;
        for (a, b) in self.positions.iter().zip(&other.positions) {
            if let (Some(a), Some(b)) = (a, b) {
                total += a.distance(b);
                overlap += 1;
            }
        }
        (overlap > 0).then_some(total)
    }
}
