//! Error taxonomy for the batch inference run

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the individual stages of a run.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("failed to load pipeline artifact {}: {message}", path.display())]
    ArtifactLoad { path: PathBuf, message: String },

    #[error("inference failed: {0}")]
    Inference(String),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn artifact(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::ArtifactLoad {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Inference error keeping the message the model runtime reported.
    pub fn inference(context: &str, cause: impl std::fmt::Display) -> Self {
        Error::Inference(format!("{}: {}", context, cause))
    }

    /// Whether this is an I/O error for a path that does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Stages of a run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Artifact,
    Clean,
    Infer,
    Write,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Load => write!(f, "load"),
            Stage::Artifact => write!(f, "artifact"),
            Stage::Clean => write!(f, "clean"),
            Stage::Infer => write!(f, "infer"),
            Stage::Write => write!(f, "write"),
        }
    }
}

/// A stage failure: which stage stopped the run, and why.
#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {source}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub source: Error,
}

impl StageError {
    pub fn new(stage: Stage, source: Error) -> Self {
        Self { stage, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_error_names_stage_and_cause() {
        let err = StageError::new(
            Stage::Clean,
            Error::SchemaMismatch("missing required feature columns: AGE".to_string()),
        );
        let msg = err.to_string();
        assert!(msg.contains("stage `clean` failed"));
        assert!(msg.contains("AGE"));
    }

    #[test]
    fn test_inference_error_keeps_underlying_message() {
        let err = Error::inference("model rejected input", "bad tensor shape [3, 2]");
        assert_eq!(
            err.to_string(),
            "inference failed: model rejected input: bad tensor shape [3, 2]"
        );
    }

    #[test]
    fn test_not_found_detection() {
        let err = Error::io(
            "missing.csv",
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        );
        assert!(err.is_not_found());
        assert!(!Error::SchemaMismatch("x".into()).is_not_found());
    }
}
