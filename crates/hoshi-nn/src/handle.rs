//! Per-worker binding of one model to one engine.

use crate::context::ComputeContext;
use crate::error::{Error, Result};
use hoshi_core::{
    BoardExtent, ComputeEngine, Enabled, EngineKind, EngineModel, EngineModelConfig,
    InputBuffers, ModelDescriptor, SlotId,
};
use std::sync::Arc;

/// A loaded model on the engine picked by the routing index.
///
/// Used by one worker thread at a time. Dropping the handle releases the
/// engine-side model (and its slot, on the secondary engine).
pub struct ComputeHandle {
    context: ComputeContext,
    engine: Arc<dyn ComputeEngine>,
    model: EngineModel,
    descriptor: ModelDescriptor,
    nn_extent: BoardExtent,
    inputs_use_nhwc: bool,
    max_batch_size: usize,
}

impl ComputeHandle {
    /// Loads `descriptor` on the engine selected by `routing_index`.
    ///
    /// Indices below [`SECONDARY_ROUTING_START`](hoshi_core::SECONDARY_ROUTING_START)
    /// route to the accelerated engine, the rest to the secondary engine.
    pub fn new(
        context: &ComputeContext,
        descriptor: &ModelDescriptor,
        max_batch_size: usize,
        inputs_use_nhwc: bool,
        routing_index: i32,
        server_thread_idx: usize,
    ) -> Result<Self> {
        descriptor.validate()?;
        if max_batch_size == 0 {
            return Err(Error::InvalidConfig(
                "max_batch_size must be at least 1".to_string(),
            ));
        }

        let kind = EngineKind::from_routing_index(routing_index);
        let engine = context.engine(kind)?.clone();
        let caps = engine.capabilities();
        let config = context.config();

        let use_fp16 = config.fp16_mode.allows() && caps.supports_reduced_precision;
        if config.fp16_mode.forces() && !use_fp16 {
            tracing::warn!(
                "{} engine has no reduced-precision support, using fp32",
                caps.name
            );
        }
        let use_nhwc = match config.nhwc_mode {
            Enabled::True => true,
            Enabled::False => false,
            Enabled::Auto => inputs_use_nhwc,
        };

        let model_config = EngineModelConfig {
            model_extent: BoardExtent::compile_max(),
            max_batch_size,
            use_fp16,
            use_nhwc,
            routing_index,
            server_thread_idx,
        };
        let model = engine.load_model(descriptor, &model_config)?;

        tracing::info!(
            "Model {} on {} engine ({}): version {}{} fp16={} nhwc={} inputs_nhwc={} thread={}",
            descriptor.name,
            kind,
            caps.name,
            model.version,
            model
                .slot
                .map(|s| format!(" slot {}", s))
                .unwrap_or_default(),
            use_fp16,
            use_nhwc,
            inputs_use_nhwc,
            server_thread_idx
        );
        if model.version != descriptor.version {
            tracing::debug!(
                "{} engine reports version {} for {} (descriptor says {})",
                kind,
                model.version,
                descriptor.name,
                descriptor.version
            );
        }

        Ok(Self {
            context: context.clone(),
            engine,
            model,
            descriptor: descriptor.clone(),
            nn_extent: context.extent(),
            inputs_use_nhwc,
            max_batch_size,
        })
    }

    /// Allocates a buffer pool matching this handle.
    pub fn create_buffers(&self) -> Result<InputBuffers> {
        Ok(InputBuffers::with_model_extent(
            &self.descriptor,
            self.max_batch_size,
            self.nn_extent,
            self.model.config.model_extent,
        )?)
    }

    pub fn kind(&self) -> EngineKind {
        self.model.kind
    }

    /// Model version as reported by the bound engine.
    pub fn model_version(&self) -> i32 {
        self.model.version
    }

    pub fn slot(&self) -> Option<SlotId> {
        self.model.slot
    }

    pub fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    pub fn nn_extent(&self) -> BoardExtent {
        self.nn_extent
    }

    pub fn inputs_use_nhwc(&self) -> bool {
        self.inputs_use_nhwc
    }

    pub fn use_fp16(&self) -> bool {
        self.model.config.use_fp16
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    pub fn routing_index(&self) -> i32 {
        self.model.config.routing_index
    }

    pub fn context(&self) -> &ComputeContext {
        &self.context
    }

    pub(crate) fn engine(&self) -> &dyn ComputeEngine {
        self.engine.as_ref()
    }

    pub(crate) fn model(&self) -> &EngineModel {
        &self.model
    }
}

impl Drop for ComputeHandle {
    fn drop(&mut self) {
        self.engine.release_model(&self.model);
        tracing::debug!(
            "Released {} on {} engine",
            self.descriptor.name,
            self.model.kind
        );
    }
}
