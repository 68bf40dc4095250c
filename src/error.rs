use std::path::PathBuf;

use thiserror::Error;

/// Failure kinds surfaced by loaders, configuration setters and trainers.
///
/// Unknown users or items at prediction time are deliberately *not* an
/// error: `predict_score` returns `f32::NAN` and downstream ranking skips
/// the pair.
#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed line {line} in {path}")]
    MalformedLine { path: PathBuf, line: usize },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("numerical degeneracy: {0}")]
    Numerical(String),
}

pub type Result<T> = std::result::Result<T, Error>;
