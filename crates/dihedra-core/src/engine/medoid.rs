use super::cluster::{ClusterAssignment, NOISE};
use super::distance_matrix::DistanceMatrix;
use super::error::EngineError;
use crate::core::models::vector::MultiResidueAngleVector;

/// Index of the member of `label` with the smallest summed distance to the other members.
///
/// Undefined distances contribute nothing to a sum. Ties go to the lowest index.
///
/// # Errors
///
/// Returns `EngineError::LengthMismatch` if the matrix and assignment sizes differ, and
/// `EngineError::UnknownCluster` if `label` is noise or has no members.
pub fn medoid_index(
    matrix: &DistanceMatrix,
    assignment: &ClusterAssignment,
    label: i32,
) -> Result<usize, EngineError> {
    if assignment.len() != matrix.len() {
        return Err(EngineError::LengthMismatch {
            argument: "assignment",
            expected: matrix.len(),
            found: assignment.len(),
        });
    }
    if label == NOISE {
        return Err(EngineError::UnknownCluster(label));
    }
    let members = assignment.members(label);

    let mut best: Option<(usize, f64)> = None;
    for &i in &members {
        let total: f64 = members
            .iter()
            .filter(|&&j| j != i)
            .filter_map(|&j| matrix.get(i, j))
            .sum();
        if best.is_none_or(|(_, b)| total < b) {
            best = Some((i, total));
        }
    }
    best.map(|(i, _)| i)
        .ok_or(EngineError::UnknownCluster(label))
}

/// The sample vector acting as representative of cluster `label`.
pub fn medoid<'v>(
    matrix: &DistanceMatrix,
    vectors: &'v [MultiResidueAngleVector],
    assignment: &ClusterAssignment,
    label: i32,
) -> Result<&'v MultiResidueAngleVector, EngineError> {
    if vectors.len() != matrix.len() {
        return Err(EngineError::LengthMismatch {
            argument: "vectors",
            expected: matrix.len(),
            found: vectors.len(),
        });
    }
    let index = medoid_index(matrix, assignment, label)?;
    Ok(&vectors[index])
}
