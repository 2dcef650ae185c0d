use super::progress_handler;
use crate::cli::ClustersArgs;
use crate::config::PartialDihedraConfig;
use crate::error::{CliError, Result};
use crate::utils::parser;
use dihedra::core::io::source::AngleTable;
use dihedra::core::io::tables;
use dihedra::core::models::window::SequenceWindow;
use dihedra::core::residues;
use dihedra::engine::progress::ProgressReporter;
use dihedra::workflows::{self, clusters::ClusterOutcome, clusters::ClusterReport};
use serde::Serialize;
use tracing::{info, warn};

/// One residue of one medoid, as written to the output table.
#[derive(Debug, Clone, PartialEq, Serialize)]
struct MedoidRow {
    label: i32,
    size: usize,
    position: usize,
    residue: char,
    phi: Option<f64>,
    psi: Option<f64>,
    nearest_to_reference: bool,
}

pub fn run(args: ClustersArgs, show_progress: bool) -> Result<()> {
    let context = SequenceWindow::new(&args.context)
        .map_err(|e| CliError::Argument(format!("Invalid context '{}': {}", args.context, e)))?;
    let reference = args
        .reference
        .as_deref()
        .map(parser::parse_angle_vector)
        .transpose()
        .map_err(|e| CliError::Argument(e.to_string()))?;
    if let Some(reference) = &reference {
        if reference.width() != context.width() {
            return Err(CliError::Argument(format!(
                "Reference angles cover {} residue(s) but context '{}' has {}",
                reference.width(),
                context,
                context.width()
            )));
        }
    }

    let partial_config = PartialDihedraConfig::load(args.config.as_deref())?;
    info!("Merging configuration from file and CLI arguments...");
    let (windows, config) = partial_config.merge_clustering(&args)?;

    info!("Loading observation table from {:?}", &args.observations);
    let table = AngleTable::load(&args.observations)?;

    let progress_handler = progress_handler(show_progress);
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!("Clustering observations for context {}...", context_label(&context));
    let report = workflows::clusters::run(
        &table,
        &context,
        &windows,
        &config,
        reference.as_ref(),
        &reporter,
    )?;

    for (size, count) in &report.samples_per_window {
        let window = context.subwindow(*size).map_err(|e| CliError::Other(e.into()))?;
        println!("  Win {}: {} - {} samples", size, window, count);
    }
    println!(
        "  {} of {} samples clustered with epsilon {:.3}; {} labelled noise.",
        report.samples_used, report.samples_total, report.epsilon, report.noise
    );

    let rows = medoid_rows(&report, &context);
    match &report.outcome {
        ClusterOutcome::NoClusters => {
            warn!("No clusters found for context {}.", context);
            println!("Warning: every sample was labelled noise; no medoids to write.");
        }
        ClusterOutcome::Clusters {
            clusters,
            nearest_to_reference,
        } => {
            println!("  {} cluster(s) found.", clusters.len());
            if let Some(nearest) = nearest_to_reference {
                println!(
                    "  Reference is nearest to cluster {} (distance {:.2}).",
                    nearest.label, nearest.distance
                );
            }
        }
    }

    tables::write_records(&args.output, &rows)?;
    println!("✓ Medoids written to: {}", args.output.display());
    Ok(())
}

/// The context with its central residue spelled out, e.g. `AKLMN (center LEU)`.
fn context_label(context: &SequenceWindow) -> String {
    let center = context.center_residue();
    let name = residues::three_letter_code(center).unwrap_or("UNK");
    format!("{} (center {})", context, name)
}

fn medoid_rows(report: &ClusterReport, context: &SequenceWindow) -> Vec<MedoidRow> {
    let ClusterOutcome::Clusters {
        clusters,
        nearest_to_reference,
    } = &report.outcome
    else {
        return Vec::new();
    };
    let nearest = nearest_to_reference.map(|n| n.label);

    clusters
        .iter()
        .flat_map(|summary| {
            summary
                .medoid
                .positions()
                .iter()
                .zip(context.as_str().chars())
                .enumerate()
                .map(move |(position, (angles, residue))| MedoidRow {
                    label: summary.label,
                    size: summary.size,
                    position,
                    residue,
                    phi: angles.map(|a| a.phi),
                    psi: angles.map(|a| a.psi),
                    nearest_to_reference: nearest == Some(summary.label),
                })
        })
        .collect()
}
