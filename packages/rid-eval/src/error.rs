//! error.rs — Error taxonomy for the evaluation engine
//!
//! Only conditions that must abort a scenario load or a run are errors.
//! Coverage gaps, solver non-convergence and degenerate label sets are
//! absorbed into scores/metrics and never surface here.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvalError {
    /// Missing column, missing header, or an unparseable required field.
    #[error("input format error in {}: {detail}", path.display())]
    InputFormat { path: PathBuf, detail: String },

    #[error("csv error in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("unknown parameter `{name}` for detector {detector}")]
    UnknownParameter { detector: &'static str, name: String },

    #[error("invalid value for parameter `{name}`: {detail}")]
    InvalidParameter { name: String, detail: String },

    #[error("no scenarios found in {}", .0.display())]
    EmptyDataset(PathBuf),
}

impl EvalError {
    pub fn input_format(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Self::InputFormat { path: path.into(), detail: detail.into() }
    }

    pub fn invalid_param(name: &str, detail: impl Into<String>) -> Self {
        Self::InvalidParameter { name: name.to_string(), detail: detail.into() }
    }
}

pub type Result<T> = std::result::Result<T, EvalError>;
