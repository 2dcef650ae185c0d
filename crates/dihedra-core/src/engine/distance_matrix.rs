use super::error::EngineError;
use crate::core::angles::circular_distance;
use crate::core::models::vector::MultiResidueAngleVector;
use itertools::Itertools;
use tracing::{debug, instrument};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Symmetric matrix of pairwise distances between multi-residue angle vectors.
///
/// Entries are `None` where two vectors share no position with valid angles in both; the
/// diagonal is always `Some(0.0)`.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    size: usize,
    values: Vec<Option<f64>>,
}

impl DistanceMatrix {
    /// Builds a matrix from explicit rows.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ShapeMismatch` if any row length differs from the row count.
    pub fn from_rows(rows: Vec<Vec<Option<f64>>>) -> Result<Self, EngineError> {
        let size = rows.len();
        if let Some((index, row)) = rows.iter().find_position(|r| r.len() != size) {
            return Err(EngineError::ShapeMismatch {
                expected: size,
                found: row.len(),
                index,
            });
        }
        Ok(Self {
            size,
            values: rows.into_iter().flatten().collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Distance between samples `i` and `j`.
    ///
    /// # Panics
    ///
    /// Panics if either index is out of bounds.
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> Option<f64> {
        assert!(i < self.size && j < self.size, "index ({i}, {j}) out of bounds");
        self.values[i * self.size + j]
    }

    #[inline]
    pub fn row(&self, i: usize) -> &[Option<f64>] {
        &self.values[i * self.size..(i + 1) * self.size]
    }

    /// Number of off-diagonal pairs (counted once) with an undefined distance.
    pub fn undefined_pairs(&self) -> usize {
        (0..self.size)
            .tuple_combinations()
            .filter(|&(i, j)| self.get(i, j).is_none())
            .count()
    }

    /// The matrix restricted to `indices`, in the given order.
    pub fn submatrix(&self, indices: &[usize]) -> Self {
        let values = indices
            .iter()
            .flat_map(|&i| indices.iter().map(move |&j| (i, j)))
            .map(|(i, j)| self.get(i, j))
            .collect();
        Self {
            size: indices.len(),
            values,
        }
    }
}

/// Flattened per-position angles of all vectors, so each pair comparison walks two
/// contiguous slices.
struct PackedVectors {
    width: usize,
    phi: Vec<f64>,
    psi: Vec<f64>,
    valid: Vec<bool>,
}

impl PackedVectors {
    fn new(vectors: &[MultiResidueAngleVector], width: usize) -> Self {
        let total = vectors.len() * width;
        let mut packed = Self {
            width,
            phi: Vec::with_capacity(total),
            psi: Vec::with_capacity(total),
            valid: Vec::with_capacity(total),
        };
        for position in vectors.iter().flat_map(|v| v.positions()) {
            match position {
                Some(p) => {
                    packed.phi.push(p.phi);
                    packed.psi.push(p.psi);
                    packed.valid.push(true);
                }
                None => {
                    packed.phi.push(0.0);
                    packed.psi.push(0.0);
                    packed.valid.push(false);
                }
            }
        }
        packed
    }

    fn pair_distance(&self, i: usize, j: usize) -> Option<f64> {
        let (a, b) = (i * self.width, j * self.width);
        let range_a = a..a + self.width;
        let range_b = b..b + self.width;

        let mut total = 0.0;
        let mut overlap = false;
        for (((phi_a, psi_a), valid_a), ((phi_b, psi_b), valid_b)) in self.phi[range_a.clone()]
            .iter()
            .zip(&self.psi[range_a.clone()])
            .zip(&self.valid[range_a])
            .zip(
                self.phi[range_b.clone()]
                    .iter()
                    .zip(&self.psi[range_b.clone()])
                    .zip(&self.valid[range_b]),
            )
        {
            if *valid_a && *valid_b {
                let d_phi = circular_distance(*phi_a, *phi_b);
                let d_psi = circular_distance(*psi_a, *psi_b);
                total += (d_phi * d_phi + d_psi * d_psi).sqrt();
                overlap = true;
            }
        }
        overlap.then_some(total)
    }
}

/// Computes all pairwise distances between `vectors`.
///
/// The distance of a pair is the sum of per-position 2-D circular distances over positions
/// where both vectors have angles. Memory grows as `N^2`; callers with very dense windows
/// should subsample first.
///
/// # Errors
///
/// Returns `EngineError::ShapeMismatch` if the vectors do not all share the width of the
/// first one.
#[instrument(skip_all, name = "distance_matrix", fields(samples = vectors.len()))]
pub fn build_matrix(vectors: &[MultiResidueAngleVector]) -> Result<DistanceMatrix, EngineError> {
    let n = vectors.len();
    let width = vectors.first().map_or(0, |v| v.width());
    if let Some((index, v)) = vectors.iter().find_position(|v| v.width() != width) {
        return Err(EngineError::ShapeMismatch {
            expected: width,
            found: v.width(),
            index,
        });
    }

    let packed = PackedVectors::new(vectors, width);
    let pairs = (0..n).tuple_combinations::<(usize, usize)>();

    #[cfg(not(feature = "parallel"))]
    let iterator = pairs;

    #[cfg(feature = "parallel")]
    let iterator = pairs.par_bridge();

    let distances: Vec<((usize, usize), Option<f64>)> = iterator
        .map(|(i, j)| ((i, j), packed.pair_distance(i, j)))
        .collect();

    let mut values = vec![None; n * n];
    for i in 0..n {
        values[i * n + i] = Some(0.0);
    }
    for ((i, j), d) in distances {
        values[i * n + j] = d;
        values[j * n + i] = d;
    }

    let matrix = DistanceMatrix { size: n, values };
    debug!(
        width,
        undefined_pairs = matrix.undefined_pairs(),
        "Built pairwise distance matrix."
    );
    Ok(matrix)
}
