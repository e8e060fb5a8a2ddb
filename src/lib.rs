//! # Hoshi - Batched Board Evaluation
//!
//! Neural-network evaluation layer for a Go engine, built from modular
//! subsystems.
//!
//! ## Architecture
//!
//! Hoshi is an umbrella crate that coordinates:
//! - **hoshi-core** - Symmetry transform, batch buffers, output decoding, engine traits
//! - **hoshi-nn** - Compute contexts and handles, batch dispatch, queued evaluator
//! - **hoshi-burn** - Burn engines (wgpu accelerated, NdArray secondary)
//!
//! ## Quick Start
//!
//! ```ignore
//! use hoshi::prelude::*;
//!
//! let context = ComputeContext::builder()
//!     .extent(BoardExtent::square(19))
//!     .accelerated(engine)
//!     .build()?;
//!
//! let handle = ComputeHandle::new(&context, &descriptor, 16, false, 0, 0)?;
//! let mut buffers = handle.create_buffers()?;
//! let mut outputs: Vec<_> = requests.iter().map(EvalOutput::for_request).collect();
//! handle.execute(&mut buffers, &requests, &mut outputs)?;
//! ```
//!
//! ## Feature Flags
//!
//! - `default` - Core types, dispatch and the host engine
//! - `burn` - Burn engines (adds burn + wgpu)

/// Re-export of hoshi-core for direct access
pub use hoshi_core as core;

/// Re-export of hoshi-nn for direct access
pub use hoshi_nn as nn;

/// Burn engines
#[cfg(feature = "burn")]
pub use hoshi_burn as burn;

pub use hoshi_core::{
    BoardExtent, ComputeEngine, ContextConfig, EngineError, EngineKind, Enabled, EvalOutput,
    EvalRequest, HostEngine, InputBuffers, ModelDescriptor, Symmetry,
};
pub use hoshi_nn::{ComputeContext, ComputeHandle, EvaluatorConfig, NeuralEvaluator};

mod error;
pub use error::{Error, Result};

pub mod validation;
pub use validation::{run_validation, ValidationInput, ValidationOutput};

/// Convenience prelude for common imports
pub mod prelude {
    pub use crate::core::{
        BoardExtent, ContextConfig, Enabled, EvalOutput, EvalRequest, InputBuffers,
        ModelDescriptor, Symmetry,
    };
    pub use crate::core::{ComputeEngine, EngineKind, HostEngine};
    pub use crate::nn::{ComputeContext, ComputeHandle, EvaluatorConfig, NeuralEvaluator};

    #[cfg(feature = "burn")]
    pub use crate::burn::{AcceleratedEngine, BurnNetwork, NetworkHeads, SecondaryEngine};
}
