use super::config::EpsilonSelection;
use super::distance_matrix::DistanceMatrix;
use super::error::EngineError;
use crate::core::models::vector::MultiResidueAngleVector;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

/// Label of samples that belong to no cluster.
pub const NOISE: i32 = -1;

/// Cluster label per sample index. Labels run from `0` upward in order of discovery;
/// [`NOISE`] marks unclustered samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterAssignment {
    labels: Vec<i32>,
}

impl ClusterAssignment {
    pub fn new(labels: Vec<i32>) -> Self {
        Self { labels }
    }

    pub fn labels(&self) -> &[i32] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn label(&self, index: usize) -> Option<i32> {
        self.labels.get(index).copied()
    }

    pub fn is_noise(&self, index: usize) -> bool {
        self.label(index) == Some(NOISE)
    }

    pub fn noise_count(&self) -> usize {
        self.labels.iter().filter(|&&l| l == NOISE).count()
    }

    /// Indices of the samples carrying `label`, ascending.
    pub fn members(&self, label: i32) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter(|&(_, &l)| l == label)
            .map(|(i, _)| i)
            .collect()
    }

    /// Member count of every non-noise label, ordered by label.
    pub fn cluster_sizes(&self) -> BTreeMap<i32, usize> {
        let mut sizes = BTreeMap::new();
        for &label in self.labels.iter().filter(|&&l| l != NOISE) {
            *sizes.entry(label).or_insert(0) += 1;
        }
        sizes
    }
}

/// Result of one cluster extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
    pub cluster_count: usize,
    pub assignment: ClusterAssignment,
    /// Neighborhood radius actually used.
    pub epsilon: f64,
}

impl Clustering {
    /// True when every sample was labelled noise.
    pub fn is_all_noise(&self) -> bool {
        self.cluster_count == 0
    }
}

/// Density-based clustering over a precomputed distance matrix.
///
/// Two samples are neighbors when their distance is defined and at most `epsilon`; every
/// sample is its own neighbor. Samples with at least `min_neighbors` neighbors are core
/// samples. Clusters are the connected components of core samples plus the non-core samples
/// within reach of one; everything else is noise. Expansion visits samples in index order,
/// so labels are deterministic. An undefined distance never links two samples.
///
/// # Errors
///
/// Returns `EngineError::Config` if `min_neighbors` is zero or the epsilon selection is
/// invalid.
#[instrument(skip_all, name = "cluster_extraction", fields(samples = matrix.len(), min_neighbors = min_neighbors))]
pub fn cluster(
    matrix: &DistanceMatrix,
    min_neighbors: usize,
    epsilon: EpsilonSelection,
) -> Result<Clustering, EngineError> {
    if min_neighbors == 0 {
        return Err(super::config::ConfigError::InvalidParameter {
            name: "min_neighbors",
            reason: "must be at least 1".to_string(),
        }
        .into());
    }
    epsilon.validate()?;

    let eps = match epsilon {
        EpsilonSelection::Fixed(eps) => eps,
        selection => estimate_epsilon(matrix, min_neighbors, selection),
    };

    let n = matrix.len();
    let neighborhoods: Vec<Vec<usize>> = (0..n)
        .map(|i| {
            matrix
                .row(i)
                .iter()
                .enumerate()
                .filter(|&(j, d)| j == i || d.is_some_and(|d| d <= eps))
                .map(|(j, _)| j)
                .collect()
        })
        .collect();
    let is_core = |i: usize| neighborhoods[i].len() >= min_neighbors;

    let mut labels = vec![NOISE; n];
    let mut next_label = 0i32;
    for seed in 0..n {
        if labels[seed] != NOISE || !is_core(seed) {
            continue;
        }
        labels[seed] = next_label;
        let mut queue: Vec<usize> = neighborhoods[seed].clone();
        let mut head = 0;
        while head < queue.len() {
            let j = queue[head];
            head += 1;
            if labels[j] != NOISE {
                continue;
            }
            labels[j] = next_label;
            if is_core(j) {
                queue.extend(neighborhoods[j].iter().filter(|&&k| labels[k] == NOISE));
            }
        }
        next_label += 1;
    }

    let assignment = ClusterAssignment::new(labels);
    let cluster_count = next_label as usize;
    info!(
        epsilon = eps,
        clusters = cluster_count,
        noise = assignment.noise_count(),
        "Cluster extraction complete."
    );
    Ok(Clustering {
        cluster_count,
        assignment,
        epsilon: eps,
    })
}

/// Sorted distances from every sample to its `k`-th nearest neighbor, with `k` counting the
/// sample itself. Samples with too few defined distances are left out.
pub fn k_distances(matrix: &DistanceMatrix, k: usize) -> Vec<f64> {
    let rank = k.saturating_sub(1).max(1) - 1;
    let mut result: Vec<f64> = (0..matrix.len())
        .filter_map(|i| {
            let mut others: Vec<f64> = matrix
                .row(i)
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .filter_map(|(_, d)| *d)
                .collect();
            others.sort_by(f64::total_cmp);
            others.get(rank).copied()
        })
        .collect();
    result.sort_by(f64::total_cmp);
    result
}

/// Derives a neighborhood radius from the k-distance distribution of `matrix`.
///
/// `Fixed` is returned unchanged. When no sample has a k-distance the radius is zero.
pub fn estimate_epsilon(
    matrix: &DistanceMatrix,
    min_neighbors: usize,
    selection: EpsilonSelection,
) -> f64 {
    let distances = k_distances(matrix, min_neighbors);
    let eps = match selection {
        EpsilonSelection::Fixed(eps) => eps,
        EpsilonSelection::Percentile(q) => quantile(&distances, q),
        EpsilonSelection::Knee => knee(&distances).unwrap_or_else(|| quantile(&distances, 0.5)),
    };
    debug!(
        ?selection,
        defined = distances.len(),
        epsilon = eps,
        "Estimated neighborhood radius."
    );
    eps
}

/// Linear-interpolated quantile of sorted values; zero for an empty slice.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        len => {
            let position = q.clamp(0.0, 1.0) * (len - 1) as f64;
            let lower = position.floor() as usize;
            let upper = position.ceil() as usize;
            let fraction = position - lower as f64;
            sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
        }
    }
}

/// Value at the point of the sorted curve lying farthest below the chord joining its ends,
/// on axes normalized to `[0, 1]`. `None` when the curve has fewer than three points or no
/// point lies below the chord.
fn knee(sorted: &[f64]) -> Option<f64> {
    if sorted.len() < 3 {
        return None;
    }
    let first = sorted[0];
    let last = sorted[sorted.len() - 1];
    let span = last - first;
    if span <= 0.0 {
        return None;
    }
    let steps = (sorted.len() - 1) as f64;

    let mut best: Option<(usize, f64)> = None;
    for (i, &value) in sorted.iter().enumerate() {
        let x = i as f64 / steps;
        let y = (value - first) / span;
        let gap = x - y;
        if gap > 0.0 && best.is_none_or(|(_, g)| gap > g) {
            best = Some((i, gap));
        }
    }
    best.map(|(i, _)| sorted[i])
}

/// Samples surviving noise removal, with their positions in the unfiltered input.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredSamples {
    pub matrix: DistanceMatrix,
    pub vectors: Vec<MultiResidueAngleVector>,
    pub assignment: ClusterAssignment,
    pub original_indices: Vec<usize>,
}

/// Drops every noise sample from the matrix, the vectors and the assignment together.
///
/// # Errors
///
/// Returns `EngineError::LengthMismatch` if the three inputs disagree on the sample count.
pub fn filter_noise(
    matrix: &DistanceMatrix,
    vectors: &[MultiResidueAngleVector],
    assignment: &ClusterAssignment,
) -> Result<FilteredSamples, EngineError> {
    let n = matrix.len();
    if vectors.len() != n {
        return Err(EngineError::LengthMismatch {
            argument: "vectors",
            expected: n,
            found: vectors.len(),
        });
    }
    if assignment.len() != n {
        return Err(EngineError::LengthMismatch {
            argument: "assignment",
            expected: n,
            found: assignment.len(),
        });
    }

    let kept: Vec<usize> = (0..n).filter(|&i| !assignment.is_noise(i)).collect();
    Ok(FilteredSamples {
        matrix: matrix.submatrix(&kept),
        vectors: kept.iter().map(|&i| vectors[i].clone()).collect(),
        assignment: ClusterAssignment::new(kept.iter().map(|&i| assignment.labels[i]).collect()),
        original_indices: kept,
    })
}
