//! OPNsense error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OpnsenseError {
    #[error("Environment variable not set: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("OPNsense API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("OPNsense rejected {action}: {message}")]
    Rejected { action: String, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, OpnsenseError>;
