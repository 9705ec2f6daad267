//! Errors of the terminal front end

use std::io;
use std::path::PathBuf;

use sw3d_core::{SceneError, StlError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing value for {0}")]
    MissingValue(String),

    #[error("invalid value {value:?} for {flag}")]
    InvalidValue { flag: String, value: String },

    #[error("unknown option {0}")]
    UnknownFlag(String),

    #[error("unexpected argument {0}")]
    UnexpectedArgument(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to load {path}: {source}")]
    Stl { path: PathBuf, source: StlError },

    #[error("terminal error: {0}")]
    Io(#[from] io::Error),

    #[error("scene error: {0}")]
    Scene(#[from] SceneError),
}

pub type Result<T> = std::result::Result<T, AppError>;
