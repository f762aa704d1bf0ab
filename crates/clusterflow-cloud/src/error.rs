//! Resource graph error types

use thiserror::Error;

/// Errors raised while assembling or validating a program
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Duplicate name in program: {0}")]
    DuplicateName(String),

    #[error("`{from}` references `{target}`, which is not declared")]
    UnresolvedReference { from: String, target: String },

    #[error("Dependency cycle between: {}", .0.join(", "))]
    Cycle(Vec<String>),

    #[error("Output `{output}` exposes `{source_ref}` and must be marked secret")]
    UnmarkedSecret { output: String, source_ref: String },

    #[error("Invalid resource `{name}`: {message}")]
    InvalidResource { name: String, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;
