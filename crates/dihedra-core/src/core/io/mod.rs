//! Adapters for the tabular data this library consumes and produces.
//!
//! Retrieval of raw angle observations is abstracted behind [`source::AngleSource`], so a
//! live mining service and a CSV export can be swapped freely. Structure tables, quality
//! metrics and per-residue score output are plain CSV files handled by [`tables`].

pub mod source;
pub mod tables;
