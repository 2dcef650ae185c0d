use super::config::{BandwidthConfig, BandwidthRule, GridConfig};
use super::error::EngineError;
use crate::core::angles::PhiPsi;
use crate::core::models::observation::WeightedAngleSet;
use nalgebra::{Matrix2, Vector2};
use std::f64::consts::PI;
use tracing::{debug, instrument, trace};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

const DIMENSIONS: f64 = 2.0;
/// Per-axis variance (deg^2) below which an axis is considered constant.
const MIN_AXIS_VARIANCE: f64 = 1e-12;
/// Relative determinant below which the sample covariance is treated as singular.
const MIN_RELATIVE_DETERMINANT: f64 = 1e-10;

/// A weighted 2-D Gaussian kernel density estimate over the `(phi, psi)` plane.
///
/// The estimate follows the usual weighted KDE conventions: weights are normalised to sum to
/// one, the effective sample size is `1 / sum(w^2)`, the data covariance is the
/// reliability-weighted unbiased covariance, and the kernel covariance is that covariance
/// scaled by the square of the bandwidth factor. The estimate is planar: kernels are not
/// wrapped around the +/-180 seam.
#[derive(Debug, Clone)]
pub struct DensityEstimate {
    points: Vec<Vector2<f64>>,
    weights: Vec<f64>,
    factor: f64,
    effective_size: f64,
    kernel_covariance: Matrix2<f64>,
    inverse_kernel: Matrix2<f64>,
    normalization: f64,
}

impl DensityEstimate {
    /// Fits the estimate to a weighted set.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Config` for an invalid explicit bandwidth,
    /// `EngineError::MissingData` for an empty set, and `EngineError::DegenerateInput` when the
    /// weighted covariance is singular (every point identical, a single effective point, or
    /// all points on one line).
    #[instrument(level = "debug", skip_all, fields(points = set.len(), bandwidth = %bandwidth))]
    pub fn fit(set: &WeightedAngleSet, bandwidth: BandwidthConfig) -> Result<Self, EngineError> {
        bandwidth.validate()?;
        if set.is_empty() {
            return Err(EngineError::MissingData {
                context: "density estimate".to_string(),
            });
        }
        let degenerate = || EngineError::DegenerateInput {
            point_count: set.len(),
        };

        let total = set.total_weight();
        let weights: Vec<f64> = set.weights().iter().map(|w| w / total).collect();
        let points: Vec<Vector2<f64>> = set.points().map(|p| Vector2::new(p.phi, p.psi)).collect();

        let sum_sq: f64 = weights.iter().map(|w| w * w).sum();
        let effective_size = 1.0 / sum_sq;
        let unbiased_denominator = 1.0 - sum_sq;
        if unbiased_denominator <= f64::EPSILON {
            return Err(degenerate());
        }

        let mean: Vector2<f64> = points
            .iter()
            .zip(&weights)
            .fold(Vector2::zeros(), |acc, (p, w)| acc + p * *w);
        let scatter: Matrix2<f64> = points
            .iter()
            .zip(&weights)
            .fold(Matrix2::zeros(), |acc, (p, w)| {
                let d = p - mean;
                acc + d * d.transpose() * *w
            });
        let covariance = scatter / unbiased_denominator;

        let (var_phi, var_psi) = (covariance[(0, 0)], covariance[(1, 1)]);
        if var_phi <= MIN_AXIS_VARIANCE
            || var_psi <= MIN_AXIS_VARIANCE
            || covariance.determinant() <= MIN_RELATIVE_DETERMINANT * var_phi * var_psi
        {
            return Err(degenerate());
        }

        let factor = bandwidth_factor(bandwidth, effective_size);
        let kernel_covariance = covariance * (factor * factor);
        let inverse_kernel = kernel_covariance.try_inverse().ok_or_else(degenerate)?;
        let normalization = 1.0 / (2.0 * PI * kernel_covariance.determinant().sqrt());

        debug!(
            factor,
            effective_size,
            var_phi,
            var_psi,
            "Fitted weighted density estimate."
        );

        Ok(Self {
            points,
            weights,
            factor,
            effective_size,
            kernel_covariance,
            inverse_kernel,
            normalization,
        })
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    pub fn effective_size(&self) -> f64 {
        self.effective_size
    }

    pub fn kernel_covariance(&self) -> Matrix2<f64> {
        self.kernel_covariance
    }

    /// Density at a single point.
    pub fn evaluate(&self, at: PhiPsi) -> f64 {
        let x = Vector2::new(at.phi, at.psi);
        let a = self.inverse_kernel[(0, 0)];
        let b = self.inverse_kernel[(0, 1)];
        let c = self.inverse_kernel[(1, 1)];
        let sum: f64 = self
            .points
            .iter()
            .zip(&self.weights)
            .map(|(p, w)| {
                let d = x - p;
                let q = a * d.x * d.x + 2.0 * b * d.x * d.y + c * d.y * d.y;
                w * (-0.5 * q).exp()
            })
            .sum();
        sum * self.normalization
    }

    /// Evaluates the density on a uniform grid, rows indexed by psi and columns by phi.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Config` if the grid has fewer than two points per axis.
    #[instrument(level = "debug", skip_all, fields(points_per_axis = grid.points_per_axis))]
    pub fn evaluate_grid(&self, grid: &GridConfig) -> Result<DensityGrid, EngineError> {
        grid.validate()?;
        let coordinates = grid.coordinates();
        let a = self.inverse_kernel[(0, 0)];
        let b = self.inverse_kernel[(0, 1)];
        let c = self.inverse_kernel[(1, 1)];

        let row = |psi: f64| -> Vec<f64> {
            // Per-point terms that only depend on the row.
            let row_terms: Vec<(f64, f64, f64)> = self
                .points
                .iter()
                .map(|p| {
                    let dy = psi - p.y;
                    (p.x, 2.0 * b * dy, c * dy * dy)
                })
                .collect();
            coordinates
                .iter()
                .map(|&phi| {
                    let sum: f64 = row_terms
                        .iter()
                        .zip(&self.weights)
                        .map(|(&(px, cross, yy), w)| {
                            let dx = phi - px;
                            let q = a * dx * dx + cross * dx + yy;
                            w * (-0.5 * q).exp()
                        })
                        .sum();
                    sum * self.normalization
                })
                .collect()
        };

        #[cfg(not(feature = "parallel"))]
        let rows: Vec<Vec<f64>> = coordinates.iter().map(|&psi| row(psi)).collect();

        #[cfg(feature = "parallel")]
        let rows: Vec<Vec<f64>> = coordinates.par_iter().map(|&psi| row(psi)).collect();

        Ok(DensityGrid {
            coordinates,
            values: rows.into_iter().flatten().collect(),
        })
    }

    /// The grid point of maximum density.
    pub fn mode(&self, grid: &GridConfig) -> Result<PhiPsi, EngineError> {
        let density = self.evaluate_grid(grid)?;
        let (mode, value) = density.argmax();
        trace!(phi = mode.phi, psi = mode.psi, density = value, "Located density mode.");
        Ok(mode)
    }
}

/// Density values over a square grid, stored row-major (psi outer, phi inner).
#[derive(Debug, Clone, PartialEq)]
pub struct DensityGrid {
    coordinates: Vec<f64>,
    values: Vec<f64>,
}

impl DensityGrid {
    pub fn coordinates(&self) -> &[f64] {
        &self.coordinates
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn value_at(&self, row: usize, col: usize) -> Option<f64> {
        let n = self.coordinates.len();
        (row < n && col < n).then(|| self.values[row * n + col])
    }

    /// Point and value of the maximum; ties go to the first cell in row-major order.
    pub fn argmax(&self) -> (PhiPsi, f64) {
        let n = self.coordinates.len();
        let mut best_index = 0;
        let mut best_value = f64::NEG_INFINITY;
        for (i, &v) in self.values.iter().enumerate() {
            if v > best_value {
                best_value = v;
                best_index = i;
            }
        }
        let (row, col) = (best_index / n, best_index % n);
        (
            PhiPsi::new(self.coordinates[col], self.coordinates[row]),
            best_value,
        )
    }
}

fn bandwidth_factor(bandwidth: BandwidthConfig, effective_size: f64) -> f64 {
    let exponent = -1.0 / (DIMENSIONS + 4.0);
    match bandwidth {
        BandwidthConfig::Default | BandwidthConfig::Named(BandwidthRule::Scott) => {
            effective_size.powf(exponent)
        }
        BandwidthConfig::Named(BandwidthRule::Silverman) => {
            (effective_size * (DIMENSIONS + 2.0) / 4.0).powf(exponent)
        }
        BandwidthConfig::Explicit(factor) => factor,
    }
}

/// Fits a density to `set` and returns its grid mode.
pub fn estimate_mode(
    set: &WeightedAngleSet,
    bandwidth: BandwidthConfig,
    grid: &GridConfig,
) -> Result<PhiPsi, EngineError> {
    grid.validate()?;
    DensityEstimate::fit(set, bandwidth)?.mode(grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::observation::AngleObservation;

    fn cluster_around(center: PhiPsi, spread: f64, n: usize) -> Vec<PhiPsi> {
        // Deterministic points on a small spiral around the center.
        (0..n)
            .map(|i| {
                let t = i as f64 * 2.399_963;
                let r = spread * ((i as f64 + 0.5) / n as f64).sqrt();
                PhiPsi::new(center.phi + r * t.cos(), center.psi + r * t.sin())
            })
            .collect()
    }

    fn coarse_grid() -> GridConfig {
        GridConfig {
            points_per_axis: 181,
        }
    }

    #[test]
    fn empty_set_is_missing_data() {
        let result = DensityEstimate::fit(&WeightedAngleSet::default(), BandwidthConfig::Default);
        assert!(matches!(result, Err(EngineError::MissingData { .. })));
    }

    #[test]
    fn identical_points_are_degenerate() {
        let set = WeightedAngleSet::uniform(vec![PhiPsi::new(-60.0, -45.0); 12], 5);
        let result = DensityEstimate::fit(&set, BandwidthConfig::Default);
        assert!(matches!(
            result,
            Err(EngineError::DegenerateInput { point_count: 12 })
        ));
    }

    #[test]
    fn single_point_is_degenerate() {
        let set = WeightedAngleSet::uniform(vec![PhiPsi::new(10.0, 10.0)], 5);
        assert!(matches!(
            DensityEstimate::fit(&set, BandwidthConfig::Default),
            Err(EngineError::DegenerateInput { point_count: 1 })
        ));
    }

    #[test]
    fn collinear_points_are_degenerate() {
        let points = (0..10).map(|i| PhiPsi::new(i as f64, 2.0 * i as f64));
        let set = WeightedAngleSet::uniform(points, 5);
        assert!(matches!(
            DensityEstimate::fit(&set, BandwidthConfig::Default),
            Err(EngineError::DegenerateInput { .. })
        ));
    }

    #[test]
    fn mode_of_tight_cluster_lies_near_its_center() {
        let center = PhiPsi::new(50.0, -60.0);
        let set = WeightedAngleSet::uniform(cluster_around(center, 4.0, 60), 5);
        let mode = estimate_mode(&set, BandwidthConfig::Default, &GridConfig::default()).unwrap();
        assert!(mode.distance(&center) < 5.0, "mode {mode:?} too far from center");
    }

    #[test]
    fn mode_is_deterministic_across_calls() {
        let mut points = cluster_around(PhiPsi::new(-60.0, -45.0), 10.0, 50);
        points.extend(cluster_around(PhiPsi::new(-120.0, 130.0), 15.0, 30));
        let set = WeightedAngleSet::uniform(points, 5);
        let grid = coarse_grid();
        let first = estimate_mode(&set, BandwidthConfig::Default, &grid).unwrap();
        for _ in 0..3 {
            let again = estimate_mode(&set, BandwidthConfig::Default, &grid).unwrap();
            assert_eq!(first.phi.to_bits(), again.phi.to_bits());
            assert_eq!(first.psi.to_bits(), again.psi.to_bits());
        }
    }

    #[test]
    fn weights_shift_the_mode_to_the_heavier_basin() {
        let helix = PhiPsi::new(-60.0, -45.0);
        let sheet = PhiPsi::new(-120.0, 130.0);
        let entries = cluster_around(helix, 8.0, 40)
            .into_iter()
            .map(|p| (AngleObservation::new(p, 3), 0.1))
            .chain(
                cluster_around(sheet, 8.0, 40)
                    .into_iter()
                    .map(|p| (AngleObservation::new(p, 5), 1.0)),
            );
        let set = WeightedAngleSet::new(entries);
        let mode = estimate_mode(&set, BandwidthConfig::Default, &coarse_grid()).unwrap();
        assert!(mode.distance(&sheet) < 10.0, "mode {mode:?} should sit in the sheet basin");
    }

    #[test]
    fn scott_and_silverman_factors_follow_effective_size() {
        let points = cluster_around(PhiPsi::new(0.0, 0.0), 20.0, 64);
        let set = WeightedAngleSet::uniform(points, 5);
        let scott = DensityEstimate::fit(&set, BandwidthConfig::Named(BandwidthRule::Scott)).unwrap();
        let silverman =
            DensityEstimate::fit(&set, BandwidthConfig::Named(BandwidthRule::Silverman)).unwrap();
        let default = DensityEstimate::fit(&set, BandwidthConfig::Default).unwrap();

        assert!((scott.effective_size() - 64.0).abs() < 1e-9);
        assert!((scott.factor() - 64f64.powf(-1.0 / 6.0)).abs() < 1e-12);
        // In two dimensions both rules reduce to the same factor.
        assert!((silverman.factor() - scott.factor()).abs() < 1e-12);
        assert_eq!(default.factor(), scott.factor());
    }

    #[test]
    fn explicit_bandwidth_scales_the_kernel_covariance() {
        let points = cluster_around(PhiPsi::new(0.0, 0.0), 20.0, 64);
        let set = WeightedAngleSet::uniform(points, 5);
        let narrow = DensityEstimate::fit(&set, BandwidthConfig::Explicit(0.1)).unwrap();
        let wide = DensityEstimate::fit(&set, BandwidthConfig::Explicit(0.2)).unwrap();
        let ratio = wide.kernel_covariance()[(0, 0)] / narrow.kernel_covariance()[(0, 0)];
        assert!((ratio - 4.0).abs() < 1e-9);
        assert_eq!(narrow.factor(), 0.1);
    }

    #[test]
    fn density_integrates_to_roughly_one() {
        let points = cluster_around(PhiPsi::new(0.0, 0.0), 30.0, 100);
        let set = WeightedAngleSet::uniform(points, 5);
        let estimate = DensityEstimate::fit(&set, BandwidthConfig::Default).unwrap();
        let grid = estimate.evaluate_grid(&coarse_grid()).unwrap();
        let cell = 2.0 * 2.0;
        let mass: f64 = grid.values().iter().sum::<f64>() * cell;
        assert!((mass - 1.0).abs() < 0.05, "mass was {mass}");
    }

    #[test]
    fn grid_values_match_pointwise_evaluation() {
        let points = cluster_around(PhiPsi::new(30.0, 60.0), 25.0, 40);
        let set = WeightedAngleSet::uniform(points, 5);
        let estimate = DensityEstimate::fit(&set, BandwidthConfig::Default).unwrap();
        let grid_config = GridConfig { points_per_axis: 5 };
        let grid = estimate.evaluate_grid(&grid_config).unwrap();
        let coords = grid.coordinates().to_vec();
        for (row, &psi) in coords.iter().enumerate() {
            for (col, &phi) in coords.iter().enumerate() {
                let expected = estimate.evaluate(PhiPsi::new(phi, psi));
                let actual = grid.value_at(row, col).unwrap();
                assert!((expected - actual).abs() <= 1e-12 * expected.max(1e-300));
            }
        }
    }

    #[test]
    fn argmax_breaks_ties_by_first_row_major_cell() {
        let grid = DensityGrid {
            coordinates: vec![-180.0, 0.0, 180.0],
            values: vec![0.0, 0.5, 0.0, 0.5, 0.1, 0.0, 0.0, 0.0, 0.5],
        };
        let (point, value) = grid.argmax();
        assert_eq!(point, PhiPsi::new(0.0, -180.0));
        assert_eq!(value, 0.5);
    }

    #[test]
    fn a_handful_of_spread_points_still_has_a_mode() {
        let set = WeightedAngleSet::uniform(
            vec![
                PhiPsi::new(0.0, 0.0),
                PhiPsi::new(10.0, 0.0),
                PhiPsi::new(0.0, 10.0),
            ],
            5,
        );
        let mode = estimate_mode(&set, BandwidthConfig::Default, &coarse_grid()).unwrap();
        assert!(mode.distance(&PhiPsi::new(3.0, 3.0)) < 10.0, "mode {mode:?}");

        let four = WeightedAngleSet::uniform(
            vec![
                PhiPsi::new(-70.0, -40.0),
                PhiPsi::new(-60.0, -50.0),
                PhiPsi::new(-65.0, -30.0),
                PhiPsi::new(-55.0, -45.0),
            ],
            5,
        );
        assert!(estimate_mode(&four, BandwidthConfig::Default, &coarse_grid()).is_ok());
    }

    #[test]
    fn invalid_grids_are_rejected_without_panicking() {
        let set = WeightedAngleSet::uniform(cluster_around(PhiPsi::new(0.0, 0.0), 20.0, 30), 5);
        for points_per_axis in [0, 1] {
            let grid = GridConfig { points_per_axis };
            assert!(matches!(
                estimate_mode(&set, BandwidthConfig::Default, &grid),
                Err(EngineError::Config { .. })
            ));
            let estimate = DensityEstimate::fit(&set, BandwidthConfig::Default).unwrap();
            assert!(matches!(
                estimate.mode(&grid),
                Err(EngineError::Config { .. })
            ));
        }
    }

    #[test]
    fn invalid_explicit_bandwidth_is_a_config_error() {
        let set = WeightedAngleSet::uniform(cluster_around(PhiPsi::new(0.0, 0.0), 20.0, 30), 5);
        for factor in [0.0, -0.5, f64::NAN] {
            assert!(matches!(
                DensityEstimate::fit(&set, BandwidthConfig::Explicit(factor)),
                Err(EngineError::Config { .. })
            ));
        }
    }
}
