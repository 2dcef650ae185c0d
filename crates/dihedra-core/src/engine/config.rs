use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidParameter {
        name,
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BandwidthRule {
    #[default]
    Scott,
    Silverman,
}

/// How the kernel bandwidth of the density estimate is chosen.
///
/// `Explicit(s)` uses `s` directly as the bandwidth factor that scales the weighted sample
/// covariance (the kernel covariance is `cov * s^2`).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum BandwidthConfig {
    #[default]
    Default,
    Named(BandwidthRule),
    Explicit(f64),
}

impl BandwidthConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            BandwidthConfig::Explicit(s) if !(s.is_finite() && *s > 0.0) => Err(invalid(
                "bandwidth",
                format!("explicit bandwidth must be a positive number, got {s}"),
            )),
            _ => Ok(()),
        }
    }
}

impl FromStr for BandwidthConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "default" => Ok(BandwidthConfig::Default),
            "scott" => Ok(BandwidthConfig::Named(BandwidthRule::Scott)),
            "silverman" => Ok(BandwidthConfig::Named(BandwidthRule::Silverman)),
            other => {
                let value: f64 = other.parse().map_err(|_| {
                    invalid(
                        "bandwidth",
                        format!(
                            "'{s}' is neither 'default', 'scott', 'silverman' nor a number"
                        ),
                    )
                })?;
                let config = BandwidthConfig::Explicit(value);
                config.validate()?;
                Ok(config)
            }
        }
    }
}

impl fmt::Display for BandwidthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BandwidthConfig::Default => f.write_str("default"),
            BandwidthConfig::Named(BandwidthRule::Scott) => f.write_str("scott"),
            BandwidthConfig::Named(BandwidthRule::Silverman) => f.write_str("silverman"),
            BandwidthConfig::Explicit(s) => write!(f, "{s}"),
        }
    }
}

/// Uniform evaluation grid over `[-180, 180]` on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridConfig {
    pub points_per_axis: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            points_per_axis: 360,
        }
    }
}

impl GridConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.points_per_axis < 2 {
            return Err(invalid(
                "grid.points_per_axis",
                format!("at least 2 points are required, got {}", self.points_per_axis),
            ));
        }
        Ok(())
    }

    /// Evenly spaced coordinates from -180 to 180 inclusive.
    ///
    /// Grids that fail [`GridConfig::validate`] yield no coordinates for zero points and a
    /// single `180` for one point.
    pub fn coordinates(&self) -> Vec<f64> {
        let n = self.points_per_axis;
        let step = 360.0 / n.saturating_sub(1).max(1) as f64;
        (0..n)
            .map(|i| if i == n - 1 { 180.0 } else { -180.0 + step * i as f64 })
            .collect()
    }
}

/// Window sizes pooled for one residue, each with the weight of its observations.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowWeights {
    entries: Vec<(usize, f64)>,
}

impl WindowWeights {
    pub fn new(entries: impl IntoIterator<Item = (usize, f64)>) -> Result<Self, ConfigError> {
        let mut entries: Vec<(usize, f64)> = entries.into_iter().collect();
        entries.sort_by_key(|(size, _)| *size);

        if entries.is_empty() {
            return Err(ConfigError::MissingParameter("window_weights"));
        }
        for pair in entries.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(invalid(
                    "window_weights",
                    format!("window size {} is listed twice", pair[0].0),
                ));
            }
        }
        for &(size, weight) in &entries {
            if size == 0 {
                return Err(invalid("window_weights", "window sizes must be at least 1"));
            }
            if !(weight.is_finite() && weight >= 0.0) {
                return Err(invalid(
                    "window_weights",
                    format!("weight for window size {size} must be finite and non-negative"),
                ));
            }
        }
        if entries.iter().all(|&(_, w)| w == 0.0) {
            return Err(invalid(
                "window_weights",
                "at least one window size needs a positive weight",
            ));
        }
        Ok(Self { entries })
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.entries.iter().copied()
    }

    pub fn sizes(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries.iter().map(|(size, _)| *size)
    }

    pub fn weight_for(&self, window_size: usize) -> Option<f64> {
        self.entries
            .iter()
            .find(|(size, _)| *size == window_size)
            .map(|(_, w)| *w)
    }

    pub fn max_size(&self) -> usize {
        self.entries.last().map_or(0, |(size, _)| *size)
    }
}

impl Default for WindowWeights {
    fn default() -> Self {
        Self {
            entries: vec![(3, 0.5), (5, 1.0), (7, 0.5)],
        }
    }
}

/// What the scorer does when the pooled points have a singular covariance, e.g. when every
/// pooled point is identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DegeneratePolicy {
    /// Surface the condition as `EngineError::DegenerateInput`.
    #[default]
    Report,
    /// Use the repeated point as the mode. When the points are distinct but collinear, the
    /// distinct point carrying the most weight is used.
    UseRepeatedPoint,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoringConfig {
    pub bandwidth: BandwidthConfig,
    pub grid: GridConfig,
    pub window_weights: WindowWeights,
    pub degenerate_policy: DegeneratePolicy,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            bandwidth: BandwidthConfig::Default,
            grid: GridConfig::default(),
            window_weights: WindowWeights::default(),
            degenerate_policy: DegeneratePolicy::Report,
        }
    }
}

#[derive(Default)]
pub struct ScoringConfigBuilder {
    bandwidth: Option<BandwidthConfig>,
    grid_points_per_axis: Option<usize>,
    window_weights: Option<Vec<(usize, f64)>>,
    degenerate_policy: Option<DegeneratePolicy>,
}

impl ScoringConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bandwidth(mut self, bandwidth: BandwidthConfig) -> Self {
        self.bandwidth = Some(bandwidth);
        self
    }
    pub fn grid_points_per_axis(mut self, n: usize) -> Self {
        self.grid_points_per_axis = Some(n);
        self
    }
    pub fn window_weights(mut self, weights: Vec<(usize, f64)>) -> Self {
        self.window_weights = Some(weights);
        self
    }
    pub fn degenerate_policy(mut self, policy: DegeneratePolicy) -> Self {
        self.degenerate_policy = Some(policy);
        self
    }

    pub fn build(self) -> Result<ScoringConfig, ConfigError> {
        let bandwidth = self.bandwidth.unwrap_or_default();
        bandwidth.validate()?;

        let grid = self
            .grid_points_per_axis
            .map(|points_per_axis| GridConfig { points_per_axis })
            .unwrap_or_default();
        grid.validate()?;

        let window_weights = WindowWeights::new(
            self.window_weights
                .ok_or(ConfigError::MissingParameter("window_weights"))?,
        )?;

        Ok(ScoringConfig {
            bandwidth,
            grid,
            window_weights,
            degenerate_policy: self.degenerate_policy.unwrap_or_default(),
        })
    }
}

/// How the neighborhood radius of the cluster extractor is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum EpsilonSelection {
    Fixed(f64),
    /// Knee of the sorted k-nearest-neighbor distance curve.
    #[default]
    Knee,
    /// Quantile `q` in `[0, 1]` of the k-nearest-neighbor distances.
    Percentile(f64),
}

impl EpsilonSelection {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            EpsilonSelection::Fixed(eps) if !(eps.is_finite() && eps >= 0.0) => Err(invalid(
                "epsilon",
                format!("fixed epsilon must be finite and non-negative, got {eps}"),
            )),
            EpsilonSelection::Percentile(q) if !(0.0..=1.0).contains(&q) => Err(invalid(
                "epsilon",
                format!("percentile must lie in [0, 1], got {q}"),
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClusteringConfig {
    pub min_neighbors: usize,
    pub epsilon: EpsilonSelection,
    /// Upper bound on samples fed to the O(N^2) matrix; larger pools are subsampled.
    pub max_samples: Option<usize>,
    pub subsample_seed: u64,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            min_neighbors: 20,
            epsilon: EpsilonSelection::Knee,
            max_samples: None,
            subsample_seed: 0,
        }
    }
}

#[derive(Default)]
pub struct ClusteringConfigBuilder {
    min_neighbors: Option<usize>,
    epsilon: Option<EpsilonSelection>,
    max_samples: Option<usize>,
    subsample_seed: Option<u64>,
}

impl ClusteringConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min_neighbors(mut self, n: usize) -> Self {
        self.min_neighbors = Some(n);
        self
    }
    pub fn epsilon(mut self, epsilon: EpsilonSelection) -> Self {
        self.epsilon = Some(epsilon);
        self
    }
    pub fn max_samples(mut self, n: usize) -> Self {
        self.max_samples = Some(n);
        self
    }
    pub fn subsample_seed(mut self, seed: u64) -> Self {
        self.subsample_seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<ClusteringConfig, ConfigError> {
        let min_neighbors = self
            .min_neighbors
            .ok_or(ConfigError::MissingParameter("min_neighbors"))?;
        if min_neighbors == 0 {
            return Err(invalid("min_neighbors", "must be at least 1"));
        }
        let epsilon = self.epsilon.unwrap_or_default();
        epsilon.validate()?;
        if self.max_samples == Some(0) {
            return Err(invalid("max_samples", "must be at least 1 when set"));
        }
        Ok(ClusteringConfig {
            min_neighbors,
            epsilon,
            max_samples: self.max_samples,
            subsample_seed: self.subsample_seed.unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bandwidth_parses_named_rules_and_numbers() {
        assert_eq!("default".parse::<BandwidthConfig>(), Ok(BandwidthConfig::Default));
        assert_eq!(
            "Scott".parse::<BandwidthConfig>(),
            Ok(BandwidthConfig::Named(BandwidthRule::Scott))
        );
        assert_eq!(
            "silverman".parse::<BandwidthConfig>(),
            Ok(BandwidthConfig::Named(BandwidthRule::Silverman))
        );
        assert_eq!("0.25".parse::<BandwidthConfig>(), Ok(BandwidthConfig::Explicit(0.25)));
    }

    #[test]
    fn bandwidth_rejects_garbage_and_non_positive_values() {
        assert!("wide".parse::<BandwidthConfig>().is_err());
        assert!("0".parse::<BandwidthConfig>().is_err());
        assert!("-1.5".parse::<BandwidthConfig>().is_err());
        assert!(BandwidthConfig::Explicit(f64::NAN).validate().is_err());
    }

    #[test]
    fn grid_coordinates_span_both_ends() {
        let coords = GridConfig { points_per_axis: 5 }.coordinates();
        assert_eq!(coords, vec![-180.0, -90.0, 0.0, 90.0, 180.0]);
        let default = GridConfig::default().coordinates();
        assert_eq!(default.len(), 360);
        assert_eq!(default[0], -180.0);
        assert_eq!(default[359], 180.0);
    }

    #[test]
    fn undersized_grid_coordinates_do_not_underflow() {
        assert!(GridConfig { points_per_axis: 0 }.coordinates().is_empty());
        assert_eq!(GridConfig { points_per_axis: 1 }.coordinates(), vec![180.0]);
    }

    #[test]
    fn window_weights_are_sorted_and_validated() {
        let weights = WindowWeights::new(vec![(7, 0.5), (3, 0.25), (5, 1.0)]).unwrap();
        assert_eq!(weights.sizes().collect::<Vec<_>>(), vec![3, 5, 7]);
        assert_eq!(weights.weight_for(3), Some(0.25));
        assert_eq!(weights.weight_for(9), None);
        assert_eq!(weights.max_size(), 7);

        assert!(WindowWeights::new(vec![(5, 1.0), (5, 2.0)]).is_err());
        assert!(WindowWeights::new(vec![(0, 1.0)]).is_err());
        assert!(WindowWeights::new(vec![(5, -1.0)]).is_err());
        assert!(WindowWeights::new(vec![(5, 0.0), (7, 0.0)]).is_err());
        assert_eq!(
            WindowWeights::new(Vec::new()),
            Err(ConfigError::MissingParameter("window_weights"))
        );
    }

    #[test]
    fn scoring_builder_requires_window_weights() {
        let result = ScoringConfigBuilder::new().build();
        assert_eq!(
            result,
            Err(ConfigError::MissingParameter("window_weights"))
        );
    }

    #[test]
    fn scoring_builder_applies_overrides_and_defaults() {
        let config = ScoringConfigBuilder::new()
            .window_weights(vec![(5, 1.0)])
            .bandwidth(BandwidthConfig::Explicit(0.3))
            .grid_points_per_axis(181)
            .build()
            .unwrap();
        assert_eq!(config.bandwidth, BandwidthConfig::Explicit(0.3));
        assert_eq!(config.grid.points_per_axis, 181);
        assert_eq!(config.degenerate_policy, DegeneratePolicy::Report);
    }

    #[test]
    fn scoring_builder_rejects_tiny_grids() {
        let result = ScoringConfigBuilder::new()
            .window_weights(vec![(5, 1.0)])
            .grid_points_per_axis(1)
            .build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidParameter { name: "grid.points_per_axis", .. })
        ));
    }

    #[test]
    fn clustering_builder_validates_parameters() {
        assert_eq!(
            ClusteringConfigBuilder::new().build(),
            Err(ConfigError::MissingParameter("min_neighbors"))
        );
        assert!(ClusteringConfigBuilder::new().min_neighbors(0).build().is_err());
        assert!(
            ClusteringConfigBuilder::new()
                .min_neighbors(5)
                .epsilon(EpsilonSelection::Percentile(1.5))
                .build()
                .is_err()
        );
        assert!(
            ClusteringConfigBuilder::new()
                .min_neighbors(5)
                .epsilon(EpsilonSelection::Fixed(-2.0))
                .build()
                .is_err()
        );

        let config = ClusteringConfigBuilder::new()
            .min_neighbors(5)
            .epsilon(EpsilonSelection::Fixed(30.0))
            .max_samples(500)
            .build()
            .unwrap();
        assert_eq!(config.epsilon, EpsilonSelection::Fixed(30.0));
        assert_eq!(config.max_samples, Some(500));
        assert_eq!(config.subsample_seed, 0);
    }
}
