use serde::{Deserialize, Serialize};

/// A backbone dihedral angle pair, in degrees.
///
/// Both angles are expected in `(-180, 180]`. Values outside that range are still
/// handled correctly by [`circular_distance`], which reduces differences modulo 360.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhiPsi {
    pub phi: f64,
    pub psi: f64,
}

impl PhiPsi {
    pub const fn new(phi: f64, psi: f64) -> Self {
        Self { phi, psi }
    }

    /// Builds a pair from two optional angles, returning `None` if either is absent or not finite.
    pub fn from_optional(phi: Option<f64>, psi: Option<f64>) -> Option<Self> {
        match (phi, psi) {
            (Some(phi), Some(psi)) if phi.is_finite() && psi.is_finite() => {
                Some(Self::new(phi, psi))
            }
            _ => None,
        }
    }

    /// Axis-wise wrapped separation combined with a Euclidean norm.
    ///
    /// This is not the geodesic on the torus; adherence values are defined by this formula.
    #[inline]
    pub fn distance(&self, other: &PhiPsi) -> f64 {
        let d_phi = circular_distance(self.phi, other.phi);
        let d_psi = circular_distance(self.psi, other.psi);
        (d_phi * d_phi + d_psi * d_psi).sqrt()
    }

    pub fn wrapped(&self) -> Self {
        Self::new(wrap_degrees(self.phi), wrap_degrees(self.psi))
    }
}

/// Minimal angular separation between two angles in degrees, always in `[0, 180]`.
#[inline]
pub fn circular_distance(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(360.0);
    d.min(360.0 - d)
}

/// Maps any angle in degrees into `(-180, 180]`.
pub fn wrap_degrees(angle: f64) -> f64 {
    let wrapped = (angle + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 { 180.0 } else { wrapped }
}
