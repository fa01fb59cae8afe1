//! Error type shared by all match-up stages.

use std::io;
use thiserror::Error;

/// Errors that can occur while configuring or running a match-up extraction.
///
/// Expected absences (a reference point that does not map onto the raster)
/// and soft rejections (records annotated with an exclusion reason) are
/// never reported through this type.
#[derive(Error, Debug)]
pub enum MatchupError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid expression '{expression}': {message}")]
    Expression { expression: String, message: String },

    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    #[error("Raster read failed for product '{product}': {message}")]
    Raster { product: String, message: String },

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Invalid JSON document: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MatchupError>;

impl MatchupError {
    /// True for errors that must be reported before any record is processed.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            MatchupError::Config(_) | MatchupError::Expression { .. } | MatchupError::Json(_)
        )
    }
}
