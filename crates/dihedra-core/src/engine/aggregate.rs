use super::error::EngineError;
use crate::core::models::structure::{QualityMetric, ResidueScore};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use tracing::{info, instrument, warn};

/// How per-residue scores are reduced to one value per protein before fitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AggregateMethod {
    Mean,
    /// `log10` of the mean, compressing the long right tail of adherence scores.
    #[default]
    LogMean,
}

impl FromStr for AggregateMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" => Ok(AggregateMethod::Mean),
            "log-mean" | "log_mean" | "logmean" => Ok(AggregateMethod::LogMean),
            other => Err(format!("unknown aggregate method '{other}'")),
        }
    }
}

impl fmt::Display for AggregateMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateMethod::Mean => f.write_str("mean"),
            AggregateMethod::LogMean => f.write_str("log-mean"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProteinAggregate {
    pub protein_id: String,
    pub mean_da: Option<f64>,
    pub log_da: Option<f64>,
    pub scored: usize,
    pub missing: usize,
}

impl ProteinAggregate {
    pub fn value(&self, method: AggregateMethod) -> Option<f64> {
        match method {
            AggregateMethod::Mean => self.mean_da,
            AggregateMethod::LogMean => self.log_da,
        }
    }
}

/// Groups residue scores by protein, ordered by protein id.
///
/// Residues without a score are counted as missing and left out of the mean.
pub fn per_protein(scores: &[ResidueScore]) -> Vec<ProteinAggregate> {
    let mut groups: BTreeMap<&str, (f64, usize, usize)> = BTreeMap::new();
    for score in scores {
        let (sum, scored, missing) = groups.entry(score.protein_id.as_str()).or_default();
        match score.da {
            Some(da) => {
                *sum += da;
                *scored += 1;
            }
            None => *missing += 1,
        }
    }

    groups
        .into_iter()
        .map(|(protein_id, (sum, scored, missing))| {
            let mean_da = (scored > 0).then(|| sum / scored as f64);
            ProteinAggregate {
                protein_id: protein_id.to_string(),
                mean_da,
                log_da: mean_da.filter(|m| *m > 0.0).map(f64::log10),
                scored,
                missing,
            }
        })
        .collect()
}

/// Ordinary least-squares fit of `y = slope * x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    /// Pearson correlation coefficient.
    pub r_value: f64,
    pub r_squared: f64,
    /// Standard error of the slope; zero for a two-point fit.
    pub slope_stderr: f64,
    pub n: usize,
}

impl LinearFit {
    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Fits a line through index-aligned samples.
///
/// # Errors
///
/// Returns `EngineError::LengthMismatch` if the slices differ in length,
/// `EngineError::InsufficientData` for fewer than two samples, and
/// `EngineError::DegenerateInput` when every `x` is identical.
pub fn fit_linear(x: &[f64], y: &[f64]) -> Result<LinearFit, EngineError> {
    if x.len() != y.len() {
        return Err(EngineError::LengthMismatch {
            argument: "y",
            expected: x.len(),
            found: y.len(),
        });
    }
    let n = x.len();
    if n < 2 {
        return Err(EngineError::InsufficientData {
            needed: 2,
            found: n,
        });
    }

    let count = n as f64;
    let x_mean = x.iter().sum::<f64>() / count;
    let y_mean = y.iter().sum::<f64>() / count;
    let (mut ss_xx, mut ss_yy, mut ss_xy) = (0.0, 0.0, 0.0);
    for (xi, yi) in x.iter().zip(y) {
        let dx = xi - x_mean;
        let dy = yi - y_mean;
        ss_xx += dx * dx;
        ss_yy += dy * dy;
        ss_xy += dx * dy;
    }
    if ss_xx == 0.0 {
        return Err(EngineError::DegenerateInput { point_count: n });
    }

    let slope = ss_xy / ss_xx;
    let intercept = y_mean - slope * x_mean;
    let r_value = if ss_yy == 0.0 {
        0.0
    } else {
        (ss_xy / (ss_xx * ss_yy).sqrt()).clamp(-1.0, 1.0)
    };
    let r_squared = r_value * r_value;
    let slope_stderr = if n > 2 {
        ((1.0 - r_squared) * ss_yy / ss_xx / (count - 2.0)).sqrt()
    } else {
        0.0
    };

    Ok(LinearFit {
        slope,
        intercept,
        r_value,
        r_squared,
        slope_stderr,
        n,
    })
}

/// Regresses a quality metric on the aggregated adherence of each protein.
///
/// Proteins are joined on `protein_id`; those without an aggregate value or without a
/// metric are skipped. The aggregate is the independent variable.
#[instrument(skip_all, name = "aggregate_fit", fields(method = %method))]
pub fn fit_against(
    aggregates: &[ProteinAggregate],
    metrics: &[QualityMetric],
    method: AggregateMethod,
) -> Result<LinearFit, EngineError> {
    let metric_by_id: HashMap<&str, f64> = metrics
        .iter()
        .map(|m| (m.protein_id.as_str(), m.metric))
        .collect();

    let (x, y): (Vec<f64>, Vec<f64>) = aggregates
        .iter()
        .filter_map(|a| Some((a.value(method)?, *metric_by_id.get(a.protein_id.as_str())?)))
        .unzip();
    let skipped = aggregates.len() - x.len();
    if skipped > 0 {
        warn!(skipped, "Proteins without an aggregate or a metric were left out of the fit.");
    }

    let fit = fit_linear(&x, &y)?;
    info!(
        n = fit.n,
        slope = fit.slope,
        intercept = fit.intercept,
        r_squared = fit.r_squared,
        "Fitted quality metric against aggregated adherence."
    );
    Ok(fit)
}

/// Adherence of one residue context in a prediction next to the reference structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResidueComparison {
    pub pos: i64,
    pub pos_reference: i64,
    pub seq_ctxt: String,
    pub da_pred: Option<f64>,
    pub da_ref: Option<f64>,
    /// `da_pred - da_ref`, when both are scored.
    pub da_diff: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceComparison {
    pub residues: Vec<ResidueComparison>,
}

impl ReferenceComparison {
    /// Mean and sample standard deviation of the defined differences.
    pub fn difference_stats(&self) -> Option<(f64, f64)> {
        let diffs: Vec<f64> = self.residues.iter().filter_map(|r| r.da_diff).collect();
        if diffs.is_empty() {
            return None;
        }
        let n = diffs.len() as f64;
        let mean = diffs.iter().sum::<f64>() / n;
        let std = if diffs.len() > 1 {
            (diffs.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        } else {
            0.0
        };
        Some((mean, std))
    }

    /// The `n` residues where the prediction deviates most beyond the reference.
    pub fn largest_differences(&self, n: usize) -> Vec<&ResidueComparison> {
        let mut defined: Vec<&ResidueComparison> =
            self.residues.iter().filter(|r| r.da_diff.is_some()).collect();
        defined.sort_by(|a, b| {
            let (a, b) = (a.da_diff.unwrap_or(0.0), b.da_diff.unwrap_or(0.0));
            b.total_cmp(&a)
        });
        defined.truncate(n);
        defined
    }
}

/// Pairs the residues of one prediction with the reference by sequence context.
///
/// Only the first residue of each context is used on either side. Contexts present in only
/// one structure are dropped. The result is ordered by prediction position.
pub fn compare_to_reference(
    prediction: &[ResidueScore],
    reference: &[ResidueScore],
) -> ReferenceComparison {
    let mut reference_by_ctxt: HashMap<&str, &ResidueScore> = HashMap::new();
    for r in reference {
        reference_by_ctxt.entry(r.seq_ctxt.as_str()).or_insert(r);
    }

    let mut seen = HashSet::new();
    let mut residues: Vec<ResidueComparison> = prediction
        .iter()
        .filter(|p| seen.insert(p.seq_ctxt.as_str()))
        .filter_map(|p| {
            let r = reference_by_ctxt.get(p.seq_ctxt.as_str())?;
            Some(ResidueComparison {
                pos: p.pos,
                pos_reference: r.pos,
                seq_ctxt: p.seq_ctxt.clone(),
                da_pred: p.da,
                da_ref: r.da,
                da_diff: p.da.zip(r.da).map(|(a, b)| a - b),
            })
        })
        .collect();
    residues.sort_by_key(|r| r.pos);
    ReferenceComparison { residues }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::structure::WindowStatus;

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn residue(protein_id: &str, pos: i64, seq_ctxt: &str, da: Option<f64>) -> ResidueScore {
        ResidueScore {
            protein_id: protein_id.to_string(),
            pos,
            seq_ctxt: seq_ctxt.to_string(),
            phi: None,
            psi: None,
            target_phi: None,
            target_psi: None,
            da,
            status: if da.is_some() {
                WindowStatus::Scored
            } else {
                WindowStatus::MissingData
            },
        }
    }

    fn metric(protein_id: &str, value: f64) -> QualityMetric {
        QualityMetric {
            protein_id: protein_id.to_string(),
            metric: value,
        }
    }

    #[test]
    fn per_protein_skips_missing_scores_instead_of_zero_filling() {
        let scores = vec![
            residue("b", 1, "AAKLM", Some(10.0)),
            residue("a", 1, "AAKLM", Some(10.0)),
            residue("a", 2, "AKLMN", None),
            residue("a", 3, "KLMNP", Some(30.0)),
            residue("c", 1, "AAKLM", None),
        ];
        let aggregates = per_protein(&scores);
        assert_eq!(aggregates.len(), 3);

        let a = &aggregates[0];
        assert_eq!(a.protein_id, "a");
        assert_eq!(a.mean_da, Some(20.0));
        assert!(f64_approx_equal(a.log_da.unwrap(), 20f64.log10()));
        assert_eq!((a.scored, a.missing), (2, 1));

        let c = &aggregates[2];
        assert_eq!(c.mean_da, None);
        assert_eq!(c.log_da, None);
        assert_eq!((c.scored, c.missing), (0, 1));
    }

    #[test]
    fn log_of_a_zero_mean_is_undefined() {
        let aggregates = per_protein(&[residue("a", 1, "AAKLM", Some(0.0))]);
        assert_eq!(aggregates[0].mean_da, Some(0.0));
        assert_eq!(aggregates[0].log_da, None);
    }

    #[test]
    fn fit_linear_recovers_an_exact_line() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y = [5.0, 3.0, 1.0, -1.0];
        let fit = fit_linear(&x, &y).unwrap();
        assert!(f64_approx_equal(fit.slope, -2.0));
        assert!(f64_approx_equal(fit.intercept, 7.0));
        assert!(f64_approx_equal(fit.r_value, -1.0));
        assert!(f64_approx_equal(fit.r_squared, 1.0));
        assert!(f64_approx_equal(fit.slope_stderr, 0.0));
        assert!(f64_approx_equal(fit.predict(10.0), -13.0));
    }

    #[test]
    fn fit_linear_matches_hand_computed_statistics() {
        let x = [0.0, 1.0, 2.0];
        let y = [0.0, 2.0, 1.0];
        let fit = fit_linear(&x, &y).unwrap();
        // ss_xx = 2, ss_yy = 2, ss_xy = 1.
        assert!(f64_approx_equal(fit.slope, 0.5));
        assert!(f64_approx_equal(fit.intercept, 0.5));
        assert!(f64_approx_equal(fit.r_value, 0.5));
        assert!(f64_approx_equal(fit.slope_stderr, (0.75f64 * 2.0 / 2.0).sqrt()));
        assert_eq!(fit.n, 3);
    }

    #[test]
    fn fit_linear_rejects_bad_inputs() {
        assert!(matches!(
            fit_linear(&[1.0], &[1.0]),
            Err(EngineError::InsufficientData { needed: 2, found: 1 })
        ));
        assert!(matches!(
            fit_linear(&[1.0, 2.0], &[1.0]),
            Err(EngineError::LengthMismatch { argument: "y", .. })
        ));
        assert!(matches!(
            fit_linear(&[3.0, 3.0, 3.0], &[1.0, 2.0, 3.0]),
            Err(EngineError::DegenerateInput { point_count: 3 })
        ));
    }

    #[test]
    fn fit_against_joins_on_protein_id_and_drops_missing_values() {
        let aggregates = per_protein(&[
            residue("p1", 1, "AAKLM", Some(10.0)),
            residue("p2", 1, "AAKLM", Some(100.0)),
            residue("p3", 1, "AAKLM", Some(1000.0)),
            residue("p4", 1, "AAKLM", None),
            residue("p5", 1, "AAKLM", Some(50.0)),
        ]);
        let metrics = vec![
            metric("p3", 20.0),
            metric("p1", 80.0),
            metric("p2", 50.0),
            metric("p4", 10.0),
        ];
        let fit = fit_against(&aggregates, &metrics, AggregateMethod::LogMean).unwrap();
        assert_eq!(fit.n, 3);
        assert!(f64_approx_equal(fit.slope, -30.0));
        assert!(f64_approx_equal(fit.intercept, 110.0));

        let mean_fit = fit_against(&aggregates, &metrics, AggregateMethod::Mean).unwrap();
        assert_eq!(mean_fit.n, 3);
        assert!(mean_fit.slope < 0.0);
    }

    #[test]
    fn compare_to_reference_pairs_contexts_and_ranks_differences() {
        let prediction = vec![
            residue("pred", 3, "KLMNP", Some(40.0)),
            residue("pred", 1, "AAKLM", Some(12.0)),
            residue("pred", 2, "AKLMN", None),
            residue("pred", 4, "LMNPQ", Some(5.0)),
            residue("pred", 9, "KLMNP", Some(99.0)),
            residue("pred", 5, "MNPQR", Some(8.0)),
        ];
        let reference = vec![
            residue("xray", 11, "AAKLM", Some(10.0)),
            residue("xray", 12, "AKLMN", Some(7.0)),
            residue("xray", 13, "KLMNP", Some(15.0)),
            residue("xray", 14, "LMNPQ", Some(6.0)),
        ];
        let comparison = compare_to_reference(&prediction, &reference);
        let positions: Vec<i64> = comparison.residues.iter().map(|r| r.pos).collect();
        assert_eq!(positions, vec![1, 2, 3, 4]);
        assert_eq!(comparison.residues[0].pos_reference, 11);
        assert_eq!(comparison.residues[1].da_diff, None);
        assert_eq!(comparison.residues[2].da_diff, Some(25.0));

        let top = comparison.largest_differences(2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].seq_ctxt, "KLMNP");
        assert_eq!(top[1].seq_ctxt, "AAKLM");

        let (mean, std) = comparison.difference_stats().unwrap();
        assert!(f64_approx_equal(mean, (2.0 + 25.0 - 1.0) / 3.0));
        assert!(std > 0.0);
    }

    #[test]
    fn aggregate_method_parses_and_displays() {
        assert_eq!("mean".parse::<AggregateMethod>(), Ok(AggregateMethod::Mean));
        assert_eq!("log-mean".parse::<AggregateMethod>(), Ok(AggregateMethod::LogMean));
        assert!("median".parse::<AggregateMethod>().is_err());
        assert_eq!(AggregateMethod::LogMean.to_string(), "log-mean");
    }
}
