//! Error types for contexts, handles and the evaluator.

use hoshi_core::{EngineError, EngineKind};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Core error: {0}")]
    Core(#[from] hoshi_core::Error),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("No {0} engine bound to this context")]
    EngineMissing(EngineKind),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Evaluator thread failed during init: {0}")]
    EvaluatorInit(String),

    #[error("Evaluator send failed")]
    EvaluatorSend,

    #[error("Evaluator recv failed")]
    EvaluatorRecv,

    #[error("Batch failed: {0}")]
    BatchFailed(String),

    #[error("Failed to spawn thread: {0}")]
    ThreadSpawn(String),
}
