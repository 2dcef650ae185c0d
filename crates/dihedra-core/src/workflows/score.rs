use crate::core::angles::PhiPsi;
use crate::core::io::source::AngleSource;
use crate::core::models::structure::{ResidueAngles, ResidueScore, WindowStatus};
use crate::core::models::window::SequenceWindow;
use crate::engine::config::ScoringConfig;
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::scorer::{TargetSource, WindowScorer};
use std::collections::{BTreeSet, HashMap};
use tracing::{info, instrument, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Target estimation result for one sequence context.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContextOutcome {
    Target { target: PhiPsi, source: TargetSource },
    MissingData,
    Degenerate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreReport {
    /// One score per input residue, in input order.
    pub residues: Vec<ResidueScore>,
    pub contexts: HashMap<String, ContextOutcome>,
}

impl ScoreReport {
    pub fn count(&self, status: WindowStatus) -> usize {
        self.residues.iter().filter(|r| r.status == status).count()
    }
}

/// Scores every residue of `residues` against the target of its sequence context.
///
/// A context without observations or with a degenerate pool does not abort the batch; its
/// residues are reported with `WindowStatus::MissingData` or `WindowStatus::Degenerate`.
/// Source failures and configuration errors abort the whole run.
#[instrument(skip_all, name = "score_workflow", fields(residues = residues.len()))]
pub fn run<S>(
    source: &S,
    residues: &[ResidueAngles],
    config: &ScoringConfig,
    reporter: &ProgressReporter,
) -> Result<ScoreReport, EngineError>
where
    S: AngleSource + Sync + ?Sized,
{
    reporter.report(Progress::PhaseStart {
        name: "Target Estimation",
    });
    let unique: Vec<&str> = residues
        .iter()
        .map(|r| r.seq_ctxt.as_str())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    info!(
        contexts = unique.len(),
        "Estimating dihedral targets for unique sequence contexts."
    );
    reporter.report(Progress::TaskStart {
        total_steps: unique.len() as u64,
    });

    let scorer = WindowScorer::new(source, config);
    let estimate = |ctxt: &str| -> Result<(String, ContextOutcome), EngineError> {
        let outcome = estimate_context(&scorer, ctxt);
        reporter.report(Progress::TaskIncrement);
        outcome.map(|o| (ctxt.to_string(), o))
    };

    #[cfg(not(feature = "parallel"))]
    let contexts: HashMap<String, ContextOutcome> = unique
        .iter()
        .map(|c| estimate(*c))
        .collect::<Result<_, _>>()?;

    #[cfg(feature = "parallel")]
    let contexts: HashMap<String, ContextOutcome> = unique
        .par_iter()
        .map(|c| estimate(*c))
        .collect::<Result<_, _>>()?;

    reporter.report(Progress::TaskFinish);
    reporter.report(Progress::PhaseFinish);

    reporter.report(Progress::PhaseStart {
        name: "Residue Scoring",
    });
    let scored: Vec<ResidueScore> = residues
        .iter()
        .map(|r| score_residue(r, contexts.get(&r.seq_ctxt).copied()))
        .collect();
    reporter.report(Progress::PhaseFinish);

    let report = ScoreReport {
        residues: scored,
        contexts,
    };
    info!(
        scored = report.count(WindowStatus::Scored),
        missing = report.count(WindowStatus::MissingData),
        degenerate = report.count(WindowStatus::Degenerate),
        "Scoring workflow complete."
    );
    Ok(report)
}

fn estimate_context<S>(
    scorer: &WindowScorer<'_, S>,
    ctxt: &str,
) -> Result<ContextOutcome, EngineError>
where
    S: AngleSource + ?Sized,
{
    let window = match SequenceWindow::new(ctxt) {
        Ok(window) => window,
        Err(e) => {
            warn!(context = ctxt, error = %e, "Skipping malformed sequence context.");
            return Ok(ContextOutcome::MissingData);
        }
    };
    match scorer.target(&window) {
        Ok(t) => Ok(ContextOutcome::Target {
            target: t.target,
            source: t.source,
        }),
        Err(EngineError::MissingData { .. }) => {
            warn!(context = ctxt, "No observations for window; residues left unscored.");
            Ok(ContextOutcome::MissingData)
        }
        Err(EngineError::DegenerateInput { point_count }) => {
            warn!(
                context = ctxt,
                point_count, "Degenerate observation pool; residues left unscored."
            );
            Ok(ContextOutcome::Degenerate)
        }
        Err(e) => Err(e),
    }
}

fn score_residue(residue: &ResidueAngles, outcome: Option<ContextOutcome>) -> ResidueScore {
    let target = match outcome {
        Some(ContextOutcome::Target { target, .. }) => Some(target),
        _ => None,
    };
    let da = target.zip(residue.angles()).map(|(t, a)| a.distance(&t));
    let status = match (outcome, da) {
        (_, Some(_)) => WindowStatus::Scored,
        (Some(ContextOutcome::Degenerate), None) => WindowStatus::Degenerate,
        _ => WindowStatus::MissingData,
    };
    ResidueScore {
        protein_id: residue.protein_id.clone(),
        pos: residue.pos,
        seq_ctxt: residue.seq_ctxt.clone(),
        phi: residue.phi,
        psi: residue.psi,
        target_phi: target.map(|t| t.phi),
        target_psi: target.map(|t| t.psi),
        da,
        status,
    }
}
