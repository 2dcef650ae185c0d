use super::config::{DegeneratePolicy, ScoringConfig};
use super::density::DensityEstimate;
use super::error::EngineError;
use crate::core::angles::PhiPsi;
use crate::core::io::source::AngleSource;
use crate::core::models::observation::WeightedAngleSet;
use crate::core::models::window::SequenceWindow;
use tracing::{debug, instrument, trace, warn};

/// Contribution of one configured window size to a pooled sample set.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolEntry {
    pub window_size: usize,
    /// The centered sub-window queried, or `None` when the size exceeds the context.
    pub window: Option<String>,
    pub weight: f64,
    pub samples: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolSummary {
    pub entries: Vec<PoolEntry>,
}

impl PoolSummary {
    pub fn total_samples(&self) -> usize {
        self.entries.iter().map(|e| e.samples).sum()
    }

    pub fn samples_for(&self, window_size: usize) -> Option<usize> {
        self.entries
            .iter()
            .find(|e| e.window_size == window_size)
            .map(|e| e.samples)
    }
}

/// How the target of a window was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSource {
    DensityMode,
    /// The pooled points were degenerate and the fallback point was used.
    RepeatedPoint,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowTarget {
    pub target: PhiPsi,
    pub source: TargetSource,
    pub pool: PoolSummary,
}

/// Adherence scores of a batch of candidates, all measured against one shared target.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowScore {
    pub target: PhiPsi,
    pub source: TargetSource,
    pub scores: Vec<f64>,
    pub pool: PoolSummary,
}

/// Scores candidate angle pairs of one sequence context against the dominant mode of its
/// pooled historical observations.
pub struct WindowScorer<'a, S>
where
    S: AngleSource + ?Sized,
{
    source: &'a S,
    config: &'a ScoringConfig,
}

impl<'a, S> WindowScorer<'a, S>
where
    S: AngleSource + ?Sized,
{
    pub fn new(source: &'a S, config: &'a ScoringConfig) -> Self {
        Self { source, config }
    }

    /// Gathers the center observations of every configured window size into one weighted set.
    ///
    /// Window sizes wider than `context` are skipped and recorded with zero samples.
    pub fn pool(
        &self,
        context: &SequenceWindow,
    ) -> Result<(WeightedAngleSet, PoolSummary), EngineError> {
        let mut entries = Vec::new();
        let mut summary = PoolSummary::default();

        for (window_size, weight) in self.config.window_weights.iter() {
            if window_size > context.width() {
                trace!(window_size, width = context.width(), "Skipping oversized window.");
                summary.entries.push(PoolEntry {
                    window_size,
                    window: None,
                    weight,
                    samples: 0,
                });
                continue;
            }

            let window = context.subwindow(window_size)?;
            let matches = self.source.fetch(context, window_size)?;
            let before = entries.len();
            entries.extend(
                matches
                    .iter()
                    .filter_map(|m| m.center_observation())
                    .map(|obs| (obs, weight)),
            );
            let samples = entries.len() - before;
            debug!(window_size, window = %window, samples, "Pooled window observations.");
            summary.entries.push(PoolEntry {
                window_size,
                window: Some(window.as_str().to_string()),
                weight,
                samples,
            });
        }

        Ok((WeightedAngleSet::new(entries), summary))
    }

    /// Computes the target (density mode) for a context.
    #[instrument(level = "debug", skip_all, fields(context = %context))]
    pub fn target(&self, context: &SequenceWindow) -> Result<WindowTarget, EngineError> {
        self.config.grid.validate()?;
        let (set, pool) = self.pool(context)?;
        if set.is_empty() {
            return Err(EngineError::MissingData {
                context: format!("window '{context}'"),
            });
        }

        match DensityEstimate::fit(&set, self.config.bandwidth) {
            Ok(estimate) => Ok(WindowTarget {
                target: estimate.mode(&self.config.grid)?,
                source: TargetSource::DensityMode,
                pool,
            }),
            Err(EngineError::DegenerateInput { point_count })
                if self.config.degenerate_policy == DegeneratePolicy::UseRepeatedPoint =>
            {
                let target = heaviest_point(&set).ok_or_else(|| EngineError::MissingData {
                    context: format!("window '{context}'"),
                })?;
                warn!(
                    context = %context,
                    point_count,
                    phi = target.phi,
                    psi = target.psi,
                    "Degenerate observation pool; using the repeated point as target."
                );
                Ok(WindowTarget {
                    target,
                    source: TargetSource::RepeatedPoint,
                    pool,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Scores every candidate against the same target.
    pub fn score(
        &self,
        context: &SequenceWindow,
        candidates: &[PhiPsi],
    ) -> Result<WindowScore, EngineError> {
        let WindowTarget {
            target,
            source,
            pool,
        } = self.target(context)?;
        let scores = candidates.iter().map(|c| c.distance(&target)).collect();
        Ok(WindowScore {
            target,
            source,
            scores,
            pool,
        })
    }

    pub fn score_one(&self, context: &SequenceWindow, candidate: PhiPsi) -> Result<f64, EngineError> {
        let target = self.target(context)?.target;
        Ok(candidate.distance(&target))
    }
}

/// Scores `candidates` for one sequence context.
pub fn score<S>(
    source: &S,
    context: &SequenceWindow,
    candidates: &[PhiPsi],
    config: &ScoringConfig,
) -> Result<WindowScore, EngineError>
where
    S: AngleSource + ?Sized,
{
    WindowScorer::new(source, config).score(context, candidates)
}

/// The distinct point with the largest summed weight; ties go to the first seen.
fn heaviest_point(set: &WeightedAngleSet) -> Option<PhiPsi> {
    let mut totals: Vec<(PhiPsi, f64)> = Vec::new();
    for (point, weight) in set.points().zip(set.weights()) {
        match totals.iter_mut().find(|(p, _)| *p == point) {
            Some((_, total)) => *total += weight,
            None => totals.push((point, *weight)),
        }
    }
    let mut best: Option<(PhiPsi, f64)> = None;
    for (point, total) in totals {
        if best.is_none_or(|(_, b)| total > b) {
            best = Some((point, total));
        }
    }
    best.map(|(p, _)| p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::source::{AngleTable, SourceError};
    use crate::core::models::observation::WindowMatch;
    use crate::engine::config::{GridConfig, ScoringConfigBuilder};

    fn center_match(match_id: u64, window_size: usize, angles: PhiPsi) -> WindowMatch {
        let mut slots = vec![None; window_size];
        slots[window_size / 2] = Some(angles);
        WindowMatch {
            match_id,
            window_size,
            angles: slots,
        }
    }

    fn table_with(context: &SequenceWindow, window_size: usize, points: &[PhiPsi]) -> AngleTable {
        let mut table = AngleTable::new();
        add_points(&mut table, context, window_size, points);
        table
    }

    fn add_points(
        table: &mut AngleTable,
        context: &SequenceWindow,
        window_size: usize,
        points: &[PhiPsi],
    ) {
        let window = context.subwindow(window_size).unwrap();
        for (i, p) in points.iter().enumerate() {
            table.insert(&window, center_match(i as u64, window_size, *p));
        }
    }

    fn square_around(center: PhiPsi, side: usize) -> Vec<PhiPsi> {
        let half = (side as f64 - 1.0) / 2.0;
        let mut points = Vec::new();
        for i in 0..side {
            for j in 0..side {
                points.push(PhiPsi::new(
                    center.phi + i as f64 - half,
                    center.psi + j as f64 - half,
                ));
            }
        }
        points
    }

    fn single_window_config() -> ScoringConfig {
        ScoringConfigBuilder::new()
            .window_weights(vec![(5, 1.0)])
            .build()
            .unwrap()
    }

    #[test]
    fn helix_candidate_scores_low_and_outlier_candidate_scores_high() {
        let context = SequenceWindow::new("AKLMN").unwrap();
        let mut points = square_around(PhiPsi::new(-60.0, -45.0), 10);
        points.extend([
            PhiPsi::new(120.0, 130.0),
            PhiPsi::new(121.0, 131.0),
            PhiPsi::new(119.0, 129.0),
            PhiPsi::new(122.0, 128.0),
            PhiPsi::new(118.0, 132.0),
            PhiPsi::new(120.5, 127.5),
            PhiPsi::new(119.5, 132.5),
            PhiPsi::new(123.0, 130.0),
            PhiPsi::new(117.0, 130.0),
            PhiPsi::new(120.0, 126.0),
        ]);
        assert_eq!(points.len(), 110);
        let table = table_with(&context, 5, &points);
        let config = single_window_config();

        let result = score(
            &table,
            &context,
            &[PhiPsi::new(-59.0, -44.0), PhiPsi::new(120.0, 130.0)],
            &config,
        )
        .unwrap();

        assert_eq!(result.source, TargetSource::DensityMode);
        assert!(result.scores[0] < 5.0, "helix score was {}", result.scores[0]);
        assert!(result.scores[1] > 100.0, "outlier score was {}", result.scores[1]);
        assert_eq!(result.pool.total_samples(), 110);
    }

    #[test]
    fn batch_candidates_share_one_target() {
        let context = SequenceWindow::new("AKLMN").unwrap();
        let table = table_with(&context, 5, &square_around(PhiPsi::new(-120.0, 130.0), 6));
        let config = single_window_config();
        let candidates = [
            PhiPsi::new(-120.0, 130.0),
            PhiPsi::new(60.0, 40.0),
            PhiPsi::new(179.0, -179.0),
        ];
        let result = WindowScorer::new(&table, &config)
            .score(&context, &candidates)
            .unwrap();
        for (candidate, score) in candidates.iter().zip(&result.scores) {
            assert_eq!(*score, candidate.distance(&result.target));
        }
    }

    #[test]
    fn repeated_scoring_is_bit_identical() {
        let context = SequenceWindow::new("AKLMN").unwrap();
        let table = table_with(&context, 5, &square_around(PhiPsi::new(-70.0, 140.0), 5));
        let config = ScoringConfigBuilder::new()
            .window_weights(vec![(5, 1.0)])
            .grid_points_per_axis(121)
            .build()
            .unwrap();
        let scorer = WindowScorer::new(&table, &config);
        let first = scorer.score_one(&context, PhiPsi::new(-60.0, 120.0)).unwrap();
        let second = scorer.score_one(&context, PhiPsi::new(-60.0, 120.0)).unwrap();
        assert_eq!(first.to_bits(), second.to_bits());
    }

    #[test]
    fn pool_combines_window_sizes_with_their_weights() {
        let context = SequenceWindow::new("GAKLMNP").unwrap();
        let mut table = AngleTable::new();
        add_points(&mut table, &context, 3, &square_around(PhiPsi::new(-60.0, -45.0), 3));
        add_points(&mut table, &context, 5, &square_around(PhiPsi::new(-62.0, -40.0), 2));
        let config = ScoringConfigBuilder::new()
            .window_weights(vec![(3, 0.5), (5, 1.0), (7, 0.5)])
            .build()
            .unwrap();

        let (set, summary) = WindowScorer::new(&table, &config).pool(&context).unwrap();
        assert_eq!(set.len(), 13);
        assert_eq!(set.count_for_window_size(3), 9);
        assert_eq!(set.count_for_window_size(5), 4);
        assert!((set.total_weight() - (9.0 * 0.5 + 4.0)).abs() < 1e-12);

        assert_eq!(summary.samples_for(3), Some(9));
        assert_eq!(summary.samples_for(5), Some(4));
        assert_eq!(summary.samples_for(7), Some(0));
        assert_eq!(summary.entries[0].window.as_deref(), Some("KLM"));
        assert_eq!(summary.entries[2].window.as_deref(), Some("GAKLMNP"));
    }

    #[test]
    fn window_sizes_wider_than_the_context_are_skipped() {
        let context = SequenceWindow::new("KLM").unwrap();
        let table = table_with(&context, 3, &square_around(PhiPsi::new(-60.0, -45.0), 4));
        let config = ScoringConfig {
            grid: GridConfig { points_per_axis: 91 },
            ..ScoringConfig::default()
        };
        let result = score(&table, &context, &[PhiPsi::new(-60.0, -45.0)], &config).unwrap();
        assert_eq!(result.pool.samples_for(5), Some(0));
        assert_eq!(result.pool.entries[1].window, None);
        assert_eq!(result.pool.entries[2].window, None);
        assert_eq!(result.pool.total_samples(), 16);
    }

    #[test]
    fn empty_pool_is_missing_data_not_zero() {
        let context = SequenceWindow::new("AKLMN").unwrap();
        let table = AngleTable::new();
        let result = score(&table, &context, &[PhiPsi::new(0.0, 0.0)], &single_window_config());
        match result {
            Err(e @ EngineError::MissingData { .. }) => assert!(e.is_recoverable()),
            other => panic!("expected MissingData, got {other:?}"),
        }
    }

    #[test]
    fn matches_without_center_angles_do_not_count() {
        let context = SequenceWindow::new("AKLMN").unwrap();
        let mut table = AngleTable::new();
        table.insert(
            &context,
            WindowMatch {
                match_id: 1,
                window_size: 5,
                angles: vec![Some(PhiPsi::new(-60.0, -45.0)), None, None, None, None],
            },
        );
        let result = score(&table, &context, &[], &single_window_config());
        assert!(matches!(result, Err(EngineError::MissingData { .. })));
    }

    #[test]
    fn degenerate_pool_is_reported_by_default() {
        let context = SequenceWindow::new("AKLMN").unwrap();
        let table = table_with(&context, 5, &[PhiPsi::new(-60.0, -45.0); 8]);
        let result = score(&table, &context, &[PhiPsi::new(0.0, 0.0)], &single_window_config());
        assert!(matches!(
            result,
            Err(EngineError::DegenerateInput { point_count: 8 })
        ));
    }

    #[test]
    fn degenerate_pool_can_fall_back_to_the_repeated_point() {
        let context = SequenceWindow::new("AKLMN").unwrap();
        let table = table_with(&context, 5, &[PhiPsi::new(-60.0, -45.0); 8]);
        let config = ScoringConfigBuilder::new()
            .window_weights(vec![(5, 1.0)])
            .degenerate_policy(DegeneratePolicy::UseRepeatedPoint)
            .build()
            .unwrap();
        let result = score(&table, &context, &[PhiPsi::new(-57.0, -41.0)], &config).unwrap();
        assert_eq!(result.source, TargetSource::RepeatedPoint);
        assert_eq!(result.target, PhiPsi::new(-60.0, -45.0));
        assert!((result.scores[0] - 5.0).abs() < 1e-12);
    }

    #[test]
    fn heaviest_point_prefers_larger_total_weight() {
        use crate::core::models::observation::AngleObservation;
        let a = PhiPsi::new(0.0, 0.0);
        let b = PhiPsi::new(10.0, 10.0);
        let set = WeightedAngleSet::new([
            (AngleObservation::new(a, 3), 0.5),
            (AngleObservation::new(b, 5), 1.0),
            (AngleObservation::new(a, 3), 0.5),
            (AngleObservation::new(a, 7), 0.25),
        ]);
        assert_eq!(heaviest_point(&set), Some(a));
        assert_eq!(heaviest_point(&WeightedAngleSet::default()), None);
    }

    struct FailingSource;

    impl AngleSource for FailingSource {
        fn fetch(
            &self,
            _context: &SequenceWindow,
            _window_size: usize,
        ) -> Result<Vec<WindowMatch>, SourceError> {
            Err(SourceError::Backend("connection refused".to_string()))
        }
    }

    #[test]
    fn source_failures_propagate_as_unrecoverable_errors() {
        let context = SequenceWindow::new("AKLMN").unwrap();
        let result = score(&FailingSource, &context, &[], &single_window_config());
        match result {
            Err(e @ EngineError::Source { .. }) => assert!(!e.is_recoverable()),
            other => panic!("expected a source error, got {other:?}"),
        }
    }

    #[test]
    fn hand_built_grid_without_points_is_a_config_error() {
        let context = SequenceWindow::new("AKLMN").unwrap();
        let table = table_with(&context, 5, &square_around(PhiPsi::new(-60.0, -45.0), 5));
        let mut config = single_window_config();
        config.grid.points_per_axis = 0;
        let result = score(&table, &context, &[PhiPsi::new(-60.0, -45.0)], &config);
        match result {
            Err(e @ EngineError::Config { .. }) => assert!(!e.is_recoverable()),
            other => panic!("expected a config error, got {other:?}"),
        }
    }

    #[test]
    fn full_width_window_is_pooled_from_the_whole_context() {
        let context = SequenceWindow::new("AKLMN").unwrap();
        let table = table_with(&context, 5, &square_around(PhiPsi::new(-60.0, -45.0), 3));
        let config = single_window_config();
        let scorer = WindowScorer::new(&table, &config);
        let (set, summary) = scorer.pool(&context).unwrap();
        assert_eq!(set.len(), 9);
        assert_eq!(summary.entries[0].window.as_deref(), Some("AKLMN"));
    }
}

