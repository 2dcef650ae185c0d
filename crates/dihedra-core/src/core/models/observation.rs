use crate::core::angles::PhiPsi;

/// One historical `(phi, psi)` sample for the central residue of a sequence window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngleObservation {
    pub angles: PhiPsi,
    /// Size of the sequence window the sample was mined with.
    pub window_size: usize,
}

impl AngleObservation {
    pub const fn new(angles: PhiPsi, window_size: usize) -> Self {
        Self {
            angles,
            window_size,
        }
    }
}

/// One historical occurrence of a sequence window, with angles for every residue it spans.
///
/// `angles[i]` is `None` when the source structure had no defined dihedral pair at that
/// residue (typically the first `phi` or last `psi` of a chain).
#[derive(Debug, Clone, PartialEq)]
pub struct WindowMatch {
    pub match_id: u64,
    pub window_size: usize,
    pub angles: Vec<Option<PhiPsi>>,
}

impl WindowMatch {
    /// The observation at the central residue, if its angles are defined.
    pub fn center_observation(&self) -> Option<AngleObservation> {
        self.angles
            .get(self.window_size / 2)
            .copied()
            .flatten()
            .map(|angles| AngleObservation::new(angles, self.window_size))
    }
}

/// An immutable, ordered pool of observations with one weight per observation.
///
/// Weights encode provenance, e.g. down-weighting window sizes other than the primary one.
/// Entries whose weight is not a positive finite number contribute nothing to a density and
/// are dropped at construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightedAngleSet {
    observations: Vec<AngleObservation>,
    weights: Vec<f64>,
}

impl WeightedAngleSet {
    pub fn new(entries: impl IntoIterator<Item = (AngleObservation, f64)>) -> Self {
        let (observations, weights) = entries
            .into_iter()
            .filter(|(_, w)| w.is_finite() && *w > 0.0)
            .unzip();
        Self {
            observations,
            weights,
        }
    }

    /// Every point carries the same weight.
    pub fn uniform(points: impl IntoIterator<Item = PhiPsi>, window_size: usize) -> Self {
        Self::new(
            points
                .into_iter()
                .map(|p| (AngleObservation::new(p, window_size), 1.0)),
        )
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn observations(&self) -> &[AngleObservation] {
        &self.observations
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn points(&self) -> impl Iterator<Item = PhiPsi> + '_ {
        self.observations.iter().map(|o| o.angles)
    }

    pub fn total_weight(&self) -> f64 {
        self.weights.iter().sum()
    }

    pub fn count_for_window_size(&self, window_size: usize) -> usize {
        self.observations
            .iter()
            .filter(|o| o.window_size == window_size)
            .count()
    }
}
