//! # Core Module
//!
//! Fundamental building blocks shared by every scoring and clustering procedure.
//!
//! - **Angle Geometry** ([`angles`]) - `(phi, psi)` pairs and the circular distance primitive
//! - **Data Models** ([`models`]) - Observations, weighted sample sets, multi-residue vectors
//!   and per-residue structure records
//! - **Residue Codes** ([`residues`]) - One-letter to three-letter amino-acid lookup
//! - **Tabular I/O** ([`io`]) - CSV-backed observation and structure tables, and the
//!   [`io::source::AngleSource`] retrieval interface

pub mod angles;
pub mod io;
pub mod models;
pub mod residues;
