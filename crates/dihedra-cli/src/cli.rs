use clap::{Args, Parser, Subcommand};
use dihedra::engine::aggregate::AggregateMethod;
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "Tony Kan, Ted Yu, William A. Goddard III, Victor Wai Tak Kam",
    version,
    about = "Dihedra CLI - Scores how closely the backbone dihedrals of protein structures follow the angle distributions observed for the same sequence windows.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub log: LogArgs,

    /// Set the number of threads for parallel computation.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

/// Console and file logging options shared by every subcommand.
#[derive(Args, Debug)]
pub struct LogArgs {
    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Silence log output and progress bars
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

impl LogArgs {
    pub fn level(&self) -> LevelFilter {
        if self.quiet {
            return LevelFilter::OFF;
        }
        match self.verbose {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Score every residue of one or more structures against its sequence context.
    Score(ScoreArgs),
    /// Aggregate per-residue scores per protein and fit them against a quality metric.
    Fit(FitArgs),
    /// Cluster the multi-residue observations of one sequence context and report medoids.
    Clusters(ClustersArgs),
}

/// Arguments for the `score` subcommand.
#[derive(Args, Debug)]
pub struct ScoreArgs {
    /// Observation table (CSV with columns window,match_id,offset,phi,psi).
    #[arg(short = 'a', long, required = true, value_name = "PATH")]
    pub observations: PathBuf,

    /// Structure table (CSV with columns protein_id,pos,seq_ctxt,phi,psi).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Path for the per-residue score table.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub output: PathBuf,

    /// Path to a configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override the kernel bandwidth ('default', 'scott', 'silverman' or a positive number).
    #[arg(short, long, value_name = "RULE_OR_FLOAT")]
    pub bandwidth: Option<String>,

    /// Override the pooled window sizes and their weights, e.g. '3:0.5,5:1.0,7:0.5'.
    #[arg(short, long, value_name = "SIZE:WEIGHT,...")]
    pub windows: Option<String>,

    /// Override the number of density grid points per axis.
    #[arg(long, value_name = "INT")]
    pub grid_points: Option<usize>,

    /// Use the repeated point as the target when a pool has a singular covariance.
    #[arg(long)]
    pub use_repeated_point: bool,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S scoring.grid-points=180
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `fit` subcommand.
#[derive(Args, Debug)]
pub struct FitArgs {
    /// Per-residue score table written by `score`.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub scores: PathBuf,

    /// Quality metric table (CSV with columns protein_id,metric).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub metrics: PathBuf,

    /// How residue scores are reduced per protein ('mean' or 'log-mean').
    #[arg(long, default_value_t = AggregateMethod::LogMean, value_name = "METHOD")]
    pub method: AggregateMethod,

    /// Write the per-protein aggregates to this CSV file.
    #[arg(long, value_name = "PATH")]
    pub aggregates_output: Option<PathBuf>,

    /// Protein id of the reference structure, enabling a per-residue comparison.
    #[arg(long, value_name = "PROTEIN_ID", requires = "prediction")]
    pub reference: Option<String>,

    /// Protein id of the prediction compared against the reference.
    #[arg(long, value_name = "PROTEIN_ID", requires = "reference")]
    pub prediction: Option<String>,

    /// Number of largest per-residue differences to print.
    #[arg(long, default_value_t = 10, value_name = "INT")]
    pub top: usize,

    /// Write the per-residue comparison to this CSV file.
    #[arg(long, value_name = "PATH", requires = "reference")]
    pub comparison_output: Option<PathBuf>,
}

/// Arguments for the `clusters` subcommand.
#[derive(Args, Debug)]
pub struct ClustersArgs {
    /// Observation table (CSV with columns window,match_id,offset,phi,psi).
    #[arg(short = 'a', long, required = true, value_name = "PATH")]
    pub observations: PathBuf,

    /// Sequence context to cluster, e.g. 'GAKLMNP'.
    #[arg(short = 'x', long, required = true, value_name = "SEQUENCE")]
    pub context: String,

    /// Path for the medoid table.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub output: PathBuf,

    /// Path to a configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override the window sizes combined into the sample pool, e.g. '3:1,5:1,7:1'.
    #[arg(short, long, value_name = "SIZE:WEIGHT,...")]
    pub windows: Option<String>,

    /// Override the minimum neighborhood size of a core sample.
    #[arg(short = 'k', long, value_name = "INT")]
    pub min_neighbors: Option<usize>,

    /// Override the neighborhood radius ('knee', 'p<quantile>' such as 'p0.9', or a number).
    #[arg(short, long, value_name = "SELECTION")]
    pub epsilon: Option<String>,

    /// Override the upper bound on clustered samples; larger pools are subsampled.
    #[arg(long, value_name = "INT")]
    pub max_samples: Option<usize>,

    /// Override the subsampling seed.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    /// Reference angles for the context, one 'phi/psi' or '-' per residue separated by
    /// commas, e.g. '-,-57/-47,-63/-41,-,-'.
    #[arg(short, long, value_name = "ANGLES", allow_hyphen_values = true)]
    pub reference: Option<String>,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S clustering.min-neighbors=10
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}
