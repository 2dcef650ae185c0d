//! # Engine Module
//!
//! The numerical core of dihedral adherence scoring.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Bandwidth rules, grid resolution, window weights and
//!   clustering parameters, with validating builders
//! - **Error Handling** ([`error`]) - Recoverable per-window conditions and programmer errors
//! - **Progress Monitoring** ([`progress`]) - Callback-based progress events for front ends
//! - **Density Estimation** ([`density`]) - Weighted 2-D Gaussian KDE and grid mode search
//! - **Window Scoring** ([`scorer`]) - Multi-window pooling and distance-to-mode scoring
//! - **Distance Matrices** ([`distance_matrix`]) - Pairwise distances over multi-residue vectors
//! - **Clustering** ([`cluster`]) - Density-based cluster extraction with noise labelling
//! - **Medoids** ([`medoid`]) - Representative sample selection for circular data
//! - **Aggregation** ([`aggregate`]) - Per-protein summaries and least-squares fits
//!
//! Every operation is synchronous and free of shared mutable state. Independent windows can
//! be processed concurrently by the caller. The `parallel` feature enables `rayon` inside the
//! expensive kernels (grid evaluation, distance matrices).

pub mod aggregate;
pub mod cluster;
pub mod config;
pub mod density;
pub mod distance_matrix;
pub mod error;
pub mod medoid;
pub mod progress;
pub mod scorer;
