//! Hard errors. Soft problems are `report::Diagnostic` records, not errors.
use std::path::PathBuf;

use thiserror::Error;

/// Failure to parse one expression or statement. Always recovered by the
/// analyzer (the statement degrades to raw text plus a flag).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
    #[error("line {line}: expected {expected}, found `{found}`")]
    Expected {
        expected: String,
        found: String,
        line: usize,
    },
    #[error("unexpected end of input, expected {expected}")]
    UnexpectedEnd { expected: String },
    #[error("line {line}: unexpected `{found}`")]
    Unexpected { found: String, line: usize },
}

impl ExprError {
    pub fn line(&self) -> Option<usize> {
        match self {
            ExprError::Expected { line, .. } | ExprError::Unexpected { line, .. } => Some(*line),
            ExprError::UnexpectedEnd { .. } => None,
        }
    }
}

/// Structural failure while isolating one container or block. The extractor
/// turns these into manual-review flags and skips the container.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("unterminated {what} `{name}` starting at line {line}")]
    Unterminated {
        what: &'static str,
        name: String,
        line: usize,
    },
    #[error("malformed {what} at line {line}: {detail}")]
    Malformed {
        what: &'static str,
        detail: String,
        line: usize,
    },
}

impl ExtractError {
    pub fn line(&self) -> usize {
        match self {
            ExtractError::Unterminated { line, .. } | ExtractError::Malformed { line, .. } => *line,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {message}")]
    Invalid { path: PathBuf, message: String },
}

/// The only conditions the engine surfaces as failures.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to read input {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}
