//! Error types for hoshi-core.

use crate::engine::EngineError;
use thiserror::Error;

/// Error type for hoshi-core operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid model descriptor: {0}")]
    InvalidModel(String),

    #[error("Unsupported model version: {0}")]
    UnsupportedVersion(i32),

    #[error("Engine: {0}")]
    Engine(#[from] EngineError),
}

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;
