use dihedra::core::angles::PhiPsi;
use dihedra::core::models::vector::MultiResidueAngleVector;
use dihedra::engine::config::{DegeneratePolicy, EpsilonSelection};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid window weight '{0}'. Expected 'size:weight' (e.g., '5:1.0').")]
    InvalidWindowWeight(String),

    #[error("Window weight list cannot be empty.")]
    EmptyWindowWeights,

    #[error(
        "Invalid epsilon selection '{0}'. Expected 'knee', 'p<quantile>' (e.g., 'p0.9') or a number."
    )]
    InvalidEpsilon(String),

    #[error("Invalid degenerate policy '{0}'. Expected 'report' or 'use-repeated-point'.")]
    InvalidDegeneratePolicy(String),

    #[error("Invalid angle pair '{0}' at position {1}. Expected 'phi/psi' or '-'.")]
    InvalidAnglePair(String, usize),
}

/// Parses `size:weight` pairs separated by commas.
pub fn parse_window_weights(s: &str) -> Result<Vec<(usize, f64)>, ParseError> {
    let pairs: Vec<(usize, f64)> = s
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let (size, weight) = part
                .split_once(':')
                .ok_or_else(|| ParseError::InvalidWindowWeight(part.to_string()))?;
            let size = size
                .trim()
                .parse()
                .map_err(|_| ParseError::InvalidWindowWeight(part.to_string()))?;
            let weight = weight
                .trim()
                .parse()
                .map_err(|_| ParseError::InvalidWindowWeight(part.to_string()))?;
            Ok((size, weight))
        })
        .collect::<Result<_, ParseError>>()?;

    if pairs.is_empty() {
        return Err(ParseError::EmptyWindowWeights);
    }
    Ok(pairs)
}

pub fn parse_epsilon(s: &str) -> Result<EpsilonSelection, ParseError> {
    let trimmed = s.trim();
    let invalid = || ParseError::InvalidEpsilon(s.to_string());
    if trimmed.eq_ignore_ascii_case("knee") {
        return Ok(EpsilonSelection::Knee);
    }
    if let Some(q) = trimmed.strip_prefix(['p', 'P']) {
        return q.parse().map(EpsilonSelection::Percentile).map_err(|_| invalid());
    }
    trimmed.parse().map(EpsilonSelection::Fixed).map_err(|_| invalid())
}

pub fn parse_degenerate_policy(s: &str) -> Result<DegeneratePolicy, ParseError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "report" => Ok(DegeneratePolicy::Report),
        "use-repeated-point" => Ok(DegeneratePolicy::UseRepeatedPoint),
        _ => Err(ParseError::InvalidDegeneratePolicy(s.to_string())),
    }
}

/// Parses one `phi/psi` pair or `-` per residue, separated by commas.
///
/// Angles are wrapped into `(-180, 180]`.
pub fn parse_angle_vector(s: &str) -> Result<MultiResidueAngleVector, ParseError> {
    let positions = s
        .split(',')
        .map(str::trim)
        .enumerate()
        .map(|(i, part)| {
            if part == "-" {
                return Ok(None);
            }
            let invalid = || ParseError::InvalidAnglePair(part.to_string(), i);
            let (phi, psi) = part.split_once('/').ok_or_else(invalid)?;
            let phi: f64 = phi.trim().parse().map_err(|_| invalid())?;
            let psi: f64 = psi.trim().parse().map_err(|_| invalid())?;
            Ok(Some(PhiPsi::new(phi, psi).wrapped()))
        })
        .collect::<Result<Vec<_>, ParseError>>()?;
    Ok(MultiResidueAngleVector::new(positions))
}
