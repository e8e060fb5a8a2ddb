//! Compute contexts, handles and batch dispatch over the core engine traits.
//!
//! This crate contains NO ML framework dependencies. Engines are provided as
//! [`ComputeEngine`](hoshi_core::ComputeEngine) trait objects when the
//! context is built. Use `hoshi-burn` for Burn-based engines, or
//! [`HostEngine`](hoshi_core::HostEngine) for a host closure.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hoshi_nn::{ComputeContext, ComputeHandle};
//!
//! let context = ComputeContext::builder()
//!     .extent(BoardExtent::square(19))
//!     .accelerated(accelerated_engine)
//!     .secondary(secondary_engine)
//!     .build()?;
//!
//! let handle = ComputeHandle::new(&context, &descriptor, 16, true, 0, 0)?;
//! let mut buffers = handle.create_buffers()?;
//! handle.execute(&mut buffers, &requests, &mut outputs)?;
//! ```

mod error;
pub use error::{Error, Result};

mod config;
pub use config::EvaluatorConfig;

mod context;
pub use context::{ComputeContext, ComputeContextBuilder};

mod handle;
pub use handle::ComputeHandle;

mod dispatch;

mod batch;
pub use batch::BatchCollector;

mod evaluator;
pub use evaluator::{EvalResponse, NeuralEvaluator};
