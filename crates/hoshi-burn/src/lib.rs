//! Burn compute engines for Hoshi.
//!
//! Provides [`ComputeEngine`](hoshi_core::ComputeEngine) implementations using
//! [Burn](https://burn.dev): [`AcceleratedEngine`] on wgpu and
//! [`SecondaryEngine`] on NdArray with integer model slots.
//!
//! ```rust,ignore
//! let context = ComputeContext::builder()
//!     .accelerated(Arc::new(hoshi_burn::AcceleratedEngine::new(gpu_network)))
//!     .secondary(Arc::new(hoshi_burn::SecondaryEngine::new(cpu_network)))
//!     .build()?;
//! ```

mod accelerated;
mod device;
mod network;
mod secondary;

pub use accelerated::AcceleratedEngine;
pub use network::{BurnNetwork, NetworkHeads, ScoreHeads, MISC_VALUE_SLOTS};
pub use secondary::SecondaryEngine;

/// Backends the engines run on, for writing forward functions.
pub use burn::backend::{wgpu::Wgpu, NdArray};

/// Re-export of burn for writing forward functions.
pub use burn;
