//! # Workflows Module
//!
//! High-level procedures that tie the angle sources, the density estimator and the
//! clustering machinery together.
//!
//! ## Architecture
//!
//! - **Scoring Workflow** ([`score`]) - Per-residue dihedral adherence for whole structure
//!   tables. Every unique sequence context is scored once and shared by all structures
//!   that contain it. Missing or degenerate windows become per-residue statuses instead of
//!   aborting the batch.
//! - **Clustering Workflow** ([`clusters`]) - Combines the multi-residue observations of all
//!   configured window sizes for one context, clusters them, and reports one medoid per
//!   cluster.

pub mod clusters;
pub mod score;
