//! Evaluator configuration, loadable from TOML.

use crate::error::{Error, Result};
use hoshi_core::ContextConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings for a [`NeuralEvaluator`](crate::NeuralEvaluator).
///
/// ```toml
/// max_batch_size = 16
/// routing_indices = [0, 100]
/// batch_wait_ms = 2
///
/// [context]
/// extent = { x_len = 9, y_len = 9 }
/// fp16_mode = "auto"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    pub context: ContextConfig,
    pub max_batch_size: usize,
    /// Requests carry channel-last spatial tensors.
    pub inputs_use_nhwc: bool,
    /// One server thread per entry; each picks its engine by routing index.
    pub routing_indices: Vec<i32>,
    /// Longest a partial batch waits before it is run.
    pub batch_wait_ms: u64,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            context: ContextConfig::default(),
            max_batch_size: 8,
            inputs_use_nhwc: false,
            routing_indices: vec![0],
            batch_wait_ms: 2,
        }
    }
}

impl EvaluatorConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        self.context.validate()?;
        if self.max_batch_size == 0 {
            return Err(Error::InvalidConfig(
                "max_batch_size must be at least 1".to_string(),
            ));
        }
        if self.routing_indices.is_empty() {
            return Err(Error::InvalidConfig(
                "routing_indices needs at least one entry".to_string(),
            ));
        }
        Ok(())
    }
}
