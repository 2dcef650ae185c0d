use crate::core::angles::PhiPsi;
use serde::{Deserialize, Serialize};

/// Backbone angles of one residue of one structure (a prediction or the reference).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResidueAngles {
    pub protein_id: String,
    pub pos: i64,
    /// Sequence context centered on this residue.
    pub seq_ctxt: String,
    pub phi: Option<f64>,
    pub psi: Option<f64>,
}

impl ResidueAngles {
    pub fn angles(&self) -> Option<PhiPsi> {
        PhiPsi::from_optional(self.phi, self.psi)
    }
}

/// An external global quality label for one structure, e.g. GDT_TS or RMSD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetric {
    pub protein_id: String,
    pub metric: f64,
}

/// Outcome of scoring one residue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WindowStatus {
    Scored,
    /// No historical observations, or the residue itself has no angle pair.
    MissingData,
    /// The observation pool had a singular covariance and no fallback was allowed.
    Degenerate,
}

/// Dihedral adherence of one residue of one structure.
///
/// `da` is `None` unless `status` is `Scored`; a missing score is never written as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResidueScore {
    pub protein_id: String,
    pub pos: i64,
    pub seq_ctxt: String,
    pub phi: Option<f64>,
    pub psi: Option<f64>,
    pub target_phi: Option<f64>,
    pub target_psi: Option<f64>,
    pub da: Option<f64>,
    pub status: WindowStatus,
}
