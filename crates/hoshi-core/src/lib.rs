//! Framework-free core of the batched board-evaluation layer.
//!
//! # Primary API
//!
//! - [`Symmetry`]: the eight board symmetries and strided tensor copies
//! - [`InputBuffers`]: per-handle batch scratch at the compile-time maximum extent
//! - [`EvalRequest`] / [`EvalOutput`]: one row in, one decoded result out
//! - [`decode`]: policy blending, value, ownership and the versioned score table
//! - [`ComputeEngine`]: the backend seam, with [`HostEngine`] as a host-side implementation
//!
//! # Example
//!
//! ```ignore
//! use hoshi_core::{BoardExtent, InputBuffers, ModelDescriptor};
//!
//! let desc = ModelDescriptor::for_version("b18c384", 14)?;
//! let mut buffers = InputBuffers::new(&desc, 16, BoardExtent::square(9))?;
//! ```

pub mod error;
pub use error::{Error, Result};

pub mod config;
pub use config::{BoardExtent, ContextConfig, Enabled, COMPILE_MAX_BOARD_LEN, MIN_BOARD_LEN};

pub mod version;
pub use version::{
    policy_channels_for_version, FeatureLayout, MAX_MODEL_VERSION, MIN_MODEL_VERSION,
    MORE_MISC_VALUE_SLOTS, OPTIMISTIC_POLICY_VERSION, SCORE_VALUE_SLOTS, VALUE_SLOTS,
};

mod descriptor;
pub use descriptor::ModelDescriptor;

pub mod symmetry;
pub use symmetry::{
    copy_from_canonical, copy_inputs_with_symmetry, copy_outputs_with_symmetry,
    copy_to_canonical, Symmetry, TensorLayout,
};

mod buffers;
pub use buffers::{BatchInputs, BatchOutputs, BufferSizes, InputBuffers};

mod request;
pub use request::{EvalOutput, EvalRequest};

pub mod decode;
pub use decode::{decode_row, policy_optimism_blend, ScoreValues};

pub mod engine;
pub use engine::{
    ComputeEngine, EngineCapabilities, EngineError, EngineKind, EngineModel, EngineModelConfig,
    HostEngine, HostForwardFn, ModelSlots, SlotId, SECONDARY_ROUTING_START,
};
