//! Centralized error type for the hoshi umbrella crate.
//!
//! Wraps all subsystem errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] hoshi_core::Error),

    #[error("NN: {0}")]
    Nn(#[from] hoshi_nn::Error),

    #[error("Engine: {0}")]
    Engine(#[from] hoshi_core::EngineError),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation: {0}")]
    Validation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
