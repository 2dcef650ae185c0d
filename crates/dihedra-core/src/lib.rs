//! # Dihedra Core Library
//!
//! Scores how closely the backbone dihedral angles of a protein structure follow the
//! distributions historically observed for the same short sequence windows.
//!
//! ## Architectural Philosophy
//!
//! The library keeps the same three-layer split used across our tooling:
//!
//! - **[`core`]: The Foundation.** Stateless data models (`PhiPsi`, `WeightedAngleSet`,
//!   `MultiResidueAngleVector`), the circular distance primitive, residue code tables and
//!   tabular I/O adapters for angle observations and structure tables.
//!
//! - **[`engine`]: The Logic Core.** Density estimation over circular angle data, dominant
//!   mode extraction, single-window adherence scoring, multi-residue distance matrices,
//!   density-based clustering, medoid selection and per-protein aggregation.
//!
//! - **[`workflows`]: The Public API.** End-to-end procedures that tie `engine` and `core`
//!   together: scoring whole structure tables and clustering the observations of one
//!   sequence context.
//!
//! Every operation is a pure function of its inputs. Nothing is cached between calls.

pub mod core;
pub mod engine;
pub mod workflows;
