use super::progress_handler;
use crate::cli::ScoreArgs;
use crate::config::PartialDihedraConfig;
use crate::error::Result;
use dihedra::core::io::source::AngleTable;
use dihedra::core::io::tables;
use dihedra::core::models::structure::WindowStatus;
use dihedra::engine::progress::ProgressReporter;
use dihedra::workflows;
use tracing::{info, warn};

pub fn run(args: ScoreArgs, show_progress: bool) -> Result<()> {
    let partial_config = PartialDihedraConfig::load(args.config.as_deref())?;
    info!("Merging configuration from file and CLI arguments...");
    let config = partial_config.merge_scoring(&args)?;

    info!("Loading observation table from {:?}", &args.observations);
    let table = AngleTable::load(&args.observations)?;
    info!(windows = table.window_count(), "Observation table loaded.");

    info!("Loading structure table from {:?}", &args.input);
    let residues = tables::read_residue_angles(&args.input)?;

    let progress_handler = progress_handler(show_progress);
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!("Scoring {} residue(s)...", residues.len());
    let report = workflows::score::run(&table, &residues, &config, &reporter)?;

    let scored = report.count(WindowStatus::Scored);
    let missing = report.count(WindowStatus::MissingData);
    let degenerate = report.count(WindowStatus::Degenerate);
    if scored == 0 && !report.residues.is_empty() {
        warn!("No residue could be scored; check that the observation table covers the input contexts.");
    }

    tables::write_records(&args.output, &report.residues)?;
    println!(
        "✓ {} scored, {} without data, {} degenerate; written to: {}",
        scored,
        missing,
        degenerate,
        args.output.display()
    );
    Ok(())
}
