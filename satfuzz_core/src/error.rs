use crate::config::ConfigError;
use crate::corpus::CorpusError;
use crate::coverage::CoverageError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the fuzzing engine.
#[derive(Error, Debug)]
pub enum FuzzError {
    #[error("Invalid seed {0:?}: expected an unsigned integer")]
    InvalidSeed(String),

    #[error("Invalid strategy weights: {0}")]
    InvalidWeights(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Corpus error: {0}")]
    Corpus(#[from] CorpusError),

    #[error("Coverage measurement failed: {0}")]
    Coverage(#[from] CoverageError),

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FuzzError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FuzzError::Io {
            path: path.into(),
            source,
        }
    }
}
