use crate::cli::{ClustersArgs, ScoreArgs};
use crate::error::{CliError, Result};
use crate::utils::parser;
use dihedra::engine::config::{
    self as core_config, BandwidthConfig, ClusteringConfig, DegeneratePolicy, ScoringConfig,
    WindowWeights,
};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialScoringConfig {
    bandwidth: Option<String>,
    #[serde(rename = "grid-points")]
    grid_points: Option<usize>,
    #[serde(rename = "window-weights")]
    window_weights: Option<String>,
    #[serde(rename = "degenerate-policy")]
    degenerate_policy: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialClusteringConfig {
    #[serde(rename = "min-neighbors")]
    min_neighbors: Option<usize>,
    epsilon: Option<String>,
    #[serde(rename = "max-samples")]
    max_samples: Option<usize>,
    seed: Option<u64>,
}

/// The configuration file as written by the user. Every field is optional; anything left out
/// falls back to a command-line override or to the library defaults.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialDihedraConfig {
    scoring: Option<PartialScoringConfig>,
    clustering: Option<PartialClusteringConfig>,
}

impl PartialDihedraConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    /// Reads `path` when given, otherwise starts from an empty configuration.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn merge_scoring(mut self, args: &ScoreArgs) -> Result<ScoringConfig> {
        self.apply_set_values(&args.set_values)?;
        let file = self.scoring.take().unwrap_or_default();

        let bandwidth = match args.bandwidth.as_ref().or(file.bandwidth.as_ref()) {
            Some(s) => s
                .parse::<BandwidthConfig>()
                .map_err(|e| CliError::Config(e.to_string()))?,
            None => BandwidthConfig::Default,
        };
        let window_weights =
            Self::resolve_window_weights(args.windows.as_deref(), file.window_weights.as_deref())?;
        let degenerate_policy = if args.use_repeated_point {
            DegeneratePolicy::UseRepeatedPoint
        } else {
            match file.degenerate_policy.as_deref() {
                Some(s) => parser::parse_degenerate_policy(s)
                    .map_err(|e| CliError::Config(e.to_string()))?,
                None => DegeneratePolicy::Report,
            }
        };

        let mut builder = core_config::ScoringConfigBuilder::new()
            .bandwidth(bandwidth)
            .window_weights(window_weights)
            .degenerate_policy(degenerate_policy);
        if let Some(n) = args.grid_points.or(file.grid_points) {
            builder = builder.grid_points_per_axis(n);
        }
        builder.build().map_err(|e| CliError::Config(e.to_string()))
    }

    /// Builds the clustering parameters together with the window sizes pooled into samples.
    ///
    /// The window sizes come from `--windows` or the `[scoring]` section; their weights are
    /// ignored by clustering.
    pub fn merge_clustering(
        mut self,
        args: &ClustersArgs,
    ) -> Result<(WindowWeights, ClusteringConfig)> {
        self.apply_set_values(&args.set_values)?;
        let scoring = self.scoring.take().unwrap_or_default();
        let file = self.clustering.take().unwrap_or_default();

        let windows = WindowWeights::new(Self::resolve_window_weights(
            args.windows.as_deref(),
            scoring.window_weights.as_deref(),
        )?)
        .map_err(|e| CliError::Config(e.to_string()))?;

        let defaults = ClusteringConfig::default();
        let epsilon = match args.epsilon.as_ref().or(file.epsilon.as_ref()) {
            Some(s) => parser::parse_epsilon(s).map_err(|e| CliError::Config(e.to_string()))?,
            None => defaults.epsilon,
        };

        let mut builder = core_config::ClusteringConfigBuilder::new()
            .min_neighbors(
                args.min_neighbors
                    .or(file.min_neighbors)
                    .unwrap_or(defaults.min_neighbors),
            )
            .epsilon(epsilon)
            .subsample_seed(args.seed.or(file.seed).unwrap_or(defaults.subsample_seed));
        if let Some(n) = args.max_samples.or(file.max_samples) {
            builder = builder.max_samples(n);
        }
        let config = builder
            .build()
            .map_err(|e| CliError::Config(e.to_string()))?;
        Ok((windows, config))
    }

    fn resolve_window_weights(
        cli: Option<&str>,
        file: Option<&str>,
    ) -> Result<Vec<(usize, f64)>> {
        match cli.or(file) {
            Some(s) => {
                parser::parse_window_weights(s).map_err(|e| CliError::Config(e.to_string()))
            }
            None => Ok(WindowWeights::default().iter().collect()),
        }
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let (key, value_str) = kv_pair.split_once('=').ok_or_else(|| {
                CliError::Config(format!(
                    "Invalid --set format: '{}'. Expected KEY=VALUE.",
                    kv_pair
                ))
            })?;
            let invalid_integer = || {
                CliError::Config(format!("Invalid integer value for {}: {}", key, value_str))
            };

            match key {
                "scoring.bandwidth" => {
                    self.scoring.get_or_insert_with(Default::default).bandwidth =
                        Some(value_str.to_string());
                }
                "scoring.grid-points" => {
                    self.scoring.get_or_insert_with(Default::default).grid_points =
                        Some(value_str.parse().map_err(|_| invalid_integer())?);
                }
                "scoring.window-weights" => {
                    self.scoring
                        .get_or_insert_with(Default::default)
                        .window_weights = Some(value_str.to_string());
                }
                "scoring.degenerate-policy" => {
                    self.scoring
                        .get_or_insert_with(Default::default)
                        .degenerate_policy = Some(value_str.to_string());
                }
                "clustering.min-neighbors" => {
                    self.clustering
                        .get_or_insert_with(Default::default)
                        .min_neighbors = Some(value_str.parse().map_err(|_| invalid_integer())?);
                }
                "clustering.epsilon" => {
                    self.clustering.get_or_insert_with(Default::default).epsilon =
                        Some(value_str.to_string());
                }
                "clustering.max-samples" => {
                    self.clustering
                        .get_or_insert_with(Default::default)
                        .max_samples = Some(value_str.parse().map_err(|_| invalid_integer())?);
                }
                "clustering.seed" => {
                    self.clustering.get_or_insert_with(Default::default).seed =
                        Some(value_str.parse().map_err(|_| invalid_integer())?);
                }
                _ => {
                    return Err(CliError::Config(format!(
                        "Unsupported configuration key for --set: '{}'",
                        key
                    )));
                }
            }
        }
        Ok(())
    }
}
