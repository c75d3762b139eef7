//! Error taxonomy shared by every stage of a job.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, JobError>;

#[derive(Debug, Error)]
pub enum JobError {
    /// Missing, malformed or unknown input. `key` is the dotted path of the field.
    #[error("Configuration error in '{key}': {message}")]
    Config { key: String, message: String },

    #[error("Unknown {context} function '{name}'")]
    UnknownFunction { context: String, name: String },

    #[error("{0} is not implemented")]
    NotImplemented(String),

    #[error("Solver error: {0}")]
    Solver(String),

    #[error("Coordination error: {0}")]
    Coordination(String),

    #[error("Failed to persist artifact '{name}': {source}")]
    Artifact {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read input file '{path}': {source}", path = path.display())]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yml::Error),
}

impl JobError {
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        JobError::Config {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn unknown_function(context: impl Into<String>, name: impl Into<String>) -> Self {
        JobError::UnknownFunction {
            context: context.into(),
            name: name.into(),
        }
    }
}
