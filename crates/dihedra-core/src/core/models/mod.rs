//! Data models for angle observations, sample sets and structure records.

pub mod observation;
pub mod structure;
pub mod vector;
pub mod window;
