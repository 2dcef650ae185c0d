use super::config::ConfigError;
use crate::core::io::source::SourceError;
use crate::core::models::window::WindowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("No usable observations for {context}")]
    MissingData { context: String },

    #[error("Density estimation is undefined for {point_count} point(s) with singular covariance")]
    DegenerateInput { point_count: usize },

    #[error("Shape mismatch at index {index}: expected {expected}, found {found}")]
    ShapeMismatch {
        expected: usize,
        found: usize,
        index: usize,
    },

    #[error("Length mismatch for '{argument}': expected {expected}, found {found}")]
    LengthMismatch {
        argument: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Cluster label {0} has no members")]
    UnknownCluster(i32),

    #[error("Not enough data: at least {needed} value(s) required, found {found}")]
    InsufficientData { needed: usize, found: usize },

    #[error("Invalid sequence window: {source}")]
    Window {
        #[from]
        source: WindowError,
    },

    #[error("Angle retrieval failed: {source}")]
    Source {
        #[from]
        source: SourceError,
    },

    #[error("Invalid configuration: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },
}

impl EngineError {
    /// Whether the error only concerns one window and should not abort a batch.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::MissingData { .. } | EngineError::DegenerateInput { .. }
        )
    }
}
