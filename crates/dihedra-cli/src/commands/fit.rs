use crate::cli::FitArgs;
use crate::error::{CliError, Result};
use dihedra::core::io::tables;
use dihedra::core::models::structure::ResidueScore;
use dihedra::engine::aggregate::{self, ReferenceComparison};
use tracing::info;

pub fn run(args: FitArgs) -> Result<()> {
    info!("Loading residue scores from {:?}", &args.scores);
    let scores = tables::read_residue_scores(&args.scores)?;
    info!("Loading quality metrics from {:?}", &args.metrics);
    let metrics = tables::read_quality_metrics(&args.metrics)?;

    let aggregates = aggregate::per_protein(&scores);
    info!(proteins = aggregates.len(), "Aggregated residue scores.");
    if let Some(path) = &args.aggregates_output {
        tables::write_records(path, &aggregates)?;
        println!("Per-protein aggregates written to: {}", path.display());
    }

    let fit = aggregate::fit_against(&aggregates, &metrics, args.method)?;
    println!("Linear fit of metric against {} adherence (n = {}):", args.method, fit.n);
    println!("  slope        {:>12.6}", fit.slope);
    println!("  intercept    {:>12.6}", fit.intercept);
    println!("  r            {:>12.6}", fit.r_value);
    println!("  r^2          {:>12.6}", fit.r_squared);
    println!("  slope stderr {:>12.6}", fit.slope_stderr);

    if let (Some(reference), Some(prediction)) = (&args.reference, &args.prediction) {
        let comparison = compare(&scores, prediction, reference)?;
        print_comparison(&comparison, prediction, reference, args.top);
        if let Some(path) = &args.comparison_output {
            tables::write_records(path, &comparison.residues)?;
            println!("Per-residue comparison written to: {}", path.display());
        }
    }
    Ok(())
}

fn scores_for(scores: &[ResidueScore], protein_id: &str) -> Result<Vec<ResidueScore>> {
    let selected: Vec<ResidueScore> = scores
        .iter()
        .filter(|s| s.protein_id == protein_id)
        .cloned()
        .collect();
    if selected.is_empty() {
        return Err(CliError::Argument(format!(
            "No residue scores found for protein '{}'",
            protein_id
        )));
    }
    Ok(selected)
}

fn compare(
    scores: &[ResidueScore],
    prediction: &str,
    reference: &str,
) -> Result<ReferenceComparison> {
    let prediction_scores = scores_for(scores, prediction)?;
    let reference_scores = scores_for(scores, reference)?;
    Ok(aggregate::compare_to_reference(
        &prediction_scores,
        &reference_scores,
    ))
}

fn print_comparison(comparison: &ReferenceComparison, prediction: &str, reference: &str, top: usize) {
    println!(
        "Comparison of '{}' against '{}' over {} shared context(s):",
        prediction,
        reference,
        comparison.residues.len()
    );
    match comparison.difference_stats() {
        Some((mean, std)) => println!("  DA difference: mean {:.3}, std {:.3}", mean, std),
        None => println!("  No context is scored in both structures."),
    }
    for residue in comparison.largest_differences(top) {
        println!(
            "  pos {:>5} (ref {:>5}) {}  pred {:>8.2}  ref {:>8.2}  diff {:>+8.2}",
            residue.pos,
            residue.pos_reference,
            residue.seq_ctxt,
            residue.da_pred.unwrap_or(f64::NAN),
            residue.da_ref.unwrap_or(f64::NAN),
            residue.da_diff.unwrap_or(f64::NAN),
        );
    }
}
