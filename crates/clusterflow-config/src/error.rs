use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "no configuration file found. Looked in:\n\
        - $CLUSTERFLOW_CONFIG_PATH\n\
        - current directory: clusterflow.local.yaml, clusterflow.yaml\n\
        - ./.clusterflow/\n\
        - ~/.config/clusterflow/clusterflow.yaml"
    )]
    ConfigFileNotFound,

    #[error("failed to read {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid value for `{field}`: {message}")]
    InvalidField { field: String, message: String },

    #[error("stack file has no `{key}` entry")]
    MissingStackKey { key: String },

    #[error("unknown key in stack file: `{0}`")]
    UnknownStackKey(String),

    #[error("invalid address `{value}`: {message}")]
    Address { value: String, message: String },

    #[error("1Password error: {0}")]
    OnePassword(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
