//! Compute engine abstraction.
//!
//! Defines the [`ComputeEngine`] trait that the two interchangeable backends
//! implement. Engines operate on the flat max-extent batch slices of
//! [`InputBuffers`](crate::InputBuffers); no framework tensor types cross the
//! boundary.

mod host;

pub use host::{HostEngine, HostForwardFn};

use crate::buffers::{BatchInputs, BatchOutputs};
use crate::config::{BoardExtent, ContextConfig};
use crate::descriptor::ModelDescriptor;
use core::fmt;
use serde::{Deserialize, Serialize};

/// Routing indices at or above this value select the secondary engine.
pub const SECONDARY_ROUTING_START: i32 = 100;

#[derive(Debug)]
pub enum EngineError {
    BackendInit(String),
    DeviceUnavailable(String),
    ModelLoad(String),
    SlotNotFound(i32),
    ContextMissing,
    ExecuteFailed(String),
    ShapeMismatch(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BackendInit(msg) => write!(f, "Backend initialization failed: {}", msg),
            Self::DeviceUnavailable(msg) => write!(f, "Device unavailable: {}", msg),
            Self::ModelLoad(msg) => write!(f, "Model load failed: {}", msg),
            Self::SlotNotFound(slot) => write!(f, "Model slot not found: {}", slot),
            Self::ContextMissing => write!(f, "Engine context has not been created"),
            Self::ExecuteFailed(msg) => write!(f, "Batch execution failed: {}", msg),
            Self::ShapeMismatch(msg) => write!(f, "Shape mismatch: {}", msg),
        }
    }
}

impl std::error::Error for EngineError {}

/// Which of the two engines services a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Accelerated,
    Secondary,
}

impl EngineKind {
    pub const fn from_routing_index(routing_index: i32) -> Self {
        if routing_index < SECONDARY_ROUTING_START {
            Self::Accelerated
        } else {
            Self::Secondary
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accelerated => write!(f, "accelerated"),
            Self::Secondary => write!(f, "secondary"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineCapabilities {
    /// e.g. "Burn/Wgpu", "Host"
    pub name: String,
    pub kind: EngineKind,
    pub supports_reduced_precision: bool,
    pub has_gpu: bool,
}

/// Per-handle settings passed to [`ComputeEngine::load_model`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineModelConfig {
    /// Extent every backend tensor is shaped for.
    pub model_extent: BoardExtent,
    pub max_batch_size: usize,
    pub use_fp16: bool,
    pub use_nhwc: bool,
    pub routing_index: i32,
    pub server_thread_idx: usize,
}

/// Opaque integer handle to a model compiled inside a secondary engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub i32);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A model as loaded by one engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineModel {
    pub kind: EngineKind,
    /// Model version as the engine sees it.
    pub version: i32,
    pub slot: Option<SlotId>,
    pub config: EngineModelConfig,
}

/// One of the interchangeable compute backends.
///
/// # Lifecycle
///
/// 1. [`create_context`](Self::create_context) once per owning context
/// 2. [`load_model`](Self::load_model) once per handle
/// 3. [`execute_batch`](Self::execute_batch) per batch
/// 4. [`release_model`](Self::release_model) when the handle drops
/// 5. [`destroy_context`](Self::destroy_context) after every handle is gone
///
/// # Thread Safety
///
/// One engine is shared by every handle of a context, and handles live on
/// different worker threads, so engines are `Send + Sync` and synchronize
/// internal state themselves.
pub trait ComputeEngine: Send + Sync {
    fn capabilities(&self) -> EngineCapabilities;

    fn create_context(&self, config: &ContextConfig) -> Result<(), EngineError>;

    fn destroy_context(&self);

    fn load_model(
        &self,
        desc: &ModelDescriptor,
        config: &EngineModelConfig,
    ) -> Result<EngineModel, EngineError>;

    /// Runs the network once over the first `batch_size` rows.
    ///
    /// Slices cover exactly the occupied prefix. The engine must fill every
    /// output slot of every row.
    fn execute_batch(
        &self,
        model: &EngineModel,
        inputs: &BatchInputs<'_>,
        outputs: &mut BatchOutputs<'_>,
        batch_size: usize,
    ) -> Result<(), EngineError>;

    fn release_model(&self, model: &EngineModel);

    /// Slot registry, for engines that key models by integer handle.
    fn slots(&self) -> Option<&dyn ModelSlots> {
        None
    }
}

/// Integer-keyed model registry of a secondary engine.
pub trait ModelSlots {
    fn create_slot(
        &self,
        desc: &ModelDescriptor,
        config: &EngineModelConfig,
    ) -> Result<SlotId, EngineError>;

    fn destroy_slot(&self, slot: SlotId) -> Result<(), EngineError>;

    /// Version declared by the compiled model in `slot`.
    fn slot_version(&self, slot: SlotId) -> Result<i32, EngineError>;

    fn live_slots(&self) -> usize;
}
