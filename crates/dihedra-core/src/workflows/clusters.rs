use crate::core::io::source::AngleSource;
use crate::core::models::vector::MultiResidueAngleVector;
use crate::core::models::window::SequenceWindow;
use crate::engine::cluster::{cluster, filter_noise};
use crate::engine::config::{ClusteringConfig, WindowWeights};
use crate::engine::distance_matrix::build_matrix;
use crate::engine::error::EngineError;
use crate::engine::medoid::medoid_index;
use crate::engine::progress::{Progress, ProgressReporter};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{info, instrument, warn};

/// One extracted cluster and its representative sample.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSummary {
    pub label: i32,
    pub size: usize,
    pub medoid: MultiResidueAngleVector,
}

/// The medoid lying closest to a caller-supplied reference vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestMedoid {
    pub label: i32,
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClusterOutcome {
    /// Every sample was labelled noise.
    NoClusters,
    Clusters {
        /// Ordered by size, largest first; equal sizes by label.
        clusters: Vec<ClusterSummary>,
        nearest_to_reference: Option<NearestMedoid>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterReport {
    pub context: String,
    /// `(window_size, vectors)` contributed by each configured window size.
    pub samples_per_window: Vec<(usize, usize)>,
    pub samples_total: usize,
    pub samples_used: usize,
    pub epsilon: f64,
    pub noise: usize,
    pub outcome: ClusterOutcome,
}

/// Clusters the multi-residue observations of `context` across all window sizes in
/// `windows` and reports a medoid per cluster.
///
/// # Errors
///
/// Returns `EngineError::MissingData` when no observation has a valid angle pair.
#[instrument(skip_all, name = "cluster_workflow", fields(context = %context))]
pub fn run<S>(
    source: &S,
    context: &SequenceWindow,
    windows: &WindowWeights,
    config: &ClusteringConfig,
    reference: Option<&MultiResidueAngleVector>,
    reporter: &ProgressReporter,
) -> Result<ClusterReport, EngineError>
where
    S: AngleSource + ?Sized,
{
    reporter.report(Progress::PhaseStart {
        name: "Sample Collection",
    });
    let (vectors, samples_per_window) = collect_vectors(source, context, windows)?;
    let samples_total = vectors.len();
    if samples_total == 0 {
        return Err(EngineError::MissingData {
            context: format!("window '{context}'"),
        });
    }
    let vectors = subsample(vectors, config.max_samples, config.subsample_seed);
    let samples_used = vectors.len();
    info!(samples_total, samples_used, "Collected multi-residue samples.");
    reporter.report(Progress::PhaseFinish);

    reporter.report(Progress::PhaseStart {
        name: "Clustering",
    });
    let matrix = build_matrix(&vectors)?;
    let clustering = cluster(&matrix, config.min_neighbors, config.epsilon)?;
    reporter.report(Progress::PhaseFinish);

    let noise = clustering.assignment.noise_count();
    let base = |outcome: ClusterOutcome| ClusterReport {
        context: context.to_string(),
        samples_per_window: samples_per_window.clone(),
        samples_total,
        samples_used,
        epsilon: clustering.epsilon,
        noise,
        outcome,
    };
    if clustering.is_all_noise() {
        warn!(samples_used, "Every sample was labelled noise; no clusters to report.");
        return Ok(base(ClusterOutcome::NoClusters));
    }

    reporter.report(Progress::PhaseStart {
        name: "Medoid Selection",
    });
    let filtered = filter_noise(&matrix, &vectors, &clustering.assignment)?;
    let mut clusters = filtered
        .assignment
        .cluster_sizes()
        .into_iter()
        .map(|(label, size)| {
            let index = medoid_index(&filtered.matrix, &filtered.assignment, label)?;
            Ok(ClusterSummary {
                label,
                size,
                medoid: filtered.vectors[index].clone(),
            })
        })
        .collect::<Result<Vec<_>, EngineError>>()?;
    clusters.sort_by(|a, b| b.size.cmp(&a.size).then(a.label.cmp(&b.label)));

    let nearest_to_reference = reference.and_then(|r| nearest_medoid(r, &clusters));
    reporter.report(Progress::PhaseFinish);

    info!(
        clusters = clusters.len(),
        noise,
        nearest = ?nearest_to_reference.map(|n| n.label),
        "Clustering workflow complete."
    );
    Ok(base(ClusterOutcome::Clusters {
        clusters,
        nearest_to_reference,
    }))
}

fn collect_vectors<S>(
    source: &S,
    context: &SequenceWindow,
    windows: &WindowWeights,
) -> Result<(Vec<MultiResidueAngleVector>, Vec<(usize, usize)>), EngineError>
where
    S: AngleSource + ?Sized,
{
    let mut vectors = Vec::new();
    let mut per_window = Vec::new();
    for window_size in windows.sizes().filter(|&s| s <= context.width()) {
        let before = vectors.len();
        for window_match in source.fetch(context, window_size)? {
            let vector = MultiResidueAngleVector::from_match(&window_match, context)?;
            if vector.valid_count() > 0 {
                vectors.push(vector);
            }
        }
        per_window.push((window_size, vectors.len() - before));
    }
    Ok((vectors, per_window))
}

/// Keeps a seeded random subset of at most `max_samples` vectors, in their original order.
fn subsample(
    vectors: Vec<MultiResidueAngleVector>,
    max_samples: Option<usize>,
    seed: u64,
) -> Vec<MultiResidueAngleVector> {
    let Some(max) = max_samples.filter(|&m| m < vectors.len()) else {
        return vectors;
    };
    let mut rng = StdRng::seed_from_u64(seed);
    let mut keep = rand::seq::index::sample(&mut rng, vectors.len(), max).into_vec();
    keep.sort_unstable();

    let mut keep = keep.into_iter().peekable();
    vectors
        .into_iter()
        .enumerate()
        .filter_map(|(i, v)| {
            if keep.peek() == Some(&i) {
                keep.next();
                Some(v)
            } else {
                None
            }
        })
        .collect()
}

fn nearest_medoid(
    reference: &MultiResidueAngleVector,
    clusters: &[ClusterSummary],
) -> Option<NearestMedoid> {
    let mut best: Option<NearestMedoid> = None;
    for summary in clusters {
        let Some(distance) = reference.distance(&summary.medoid) else {
            continue;
        };
        if best.is_none_or(|b| distance < b.distance) {
            best = Some(NearestMedoid {
                label: summary.label,
                distance,
            });
        }
    }
    best
}
