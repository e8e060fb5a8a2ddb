//! Host-side engine running a plain closure over the batch slices.

use super::{
    ComputeEngine, EngineCapabilities, EngineError, EngineKind, EngineModel, EngineModelConfig,
    ModelSlots, SlotId,
};
use crate::buffers::{BatchInputs, BatchOutputs};
use crate::config::ContextConfig;
use crate::descriptor::ModelDescriptor;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Forward pass over the occupied prefix: `(inputs, outputs, batch_size)`.
pub type HostForwardFn = Arc<
    dyn Fn(&BatchInputs<'_>, &mut BatchOutputs<'_>, usize) -> Result<(), EngineError>
        + Send
        + Sync,
>;

#[derive(Default)]
struct HostState {
    context: Option<ContextConfig>,
    slots: BTreeMap<SlotId, i32>,
    next_slot: i32,
}

/// Engine that evaluates on the calling thread with a host closure.
///
/// Acts as either engine kind. As a secondary engine it hands out integer
/// model slots and may declare a model version of its own, which is what
/// handles bound to it will report.
pub struct HostEngine {
    name: String,
    kind: EngineKind,
    forward: HostForwardFn,
    declared_version: Option<i32>,
    reduced_precision: bool,
    state: Mutex<HostState>,
}

impl HostEngine {
    pub fn new(kind: EngineKind, forward: HostForwardFn) -> Self {
        Self {
            name: "Host".to_string(),
            kind,
            forward,
            declared_version: None,
            reduced_precision: false,
            state: Mutex::new(HostState::default()),
        }
    }

    pub fn from_fn<F>(kind: EngineKind, f: F) -> Self
    where
        F: Fn(&BatchInputs<'_>, &mut BatchOutputs<'_>, usize) -> Result<(), EngineError>
            + Send
            + Sync
            + 'static,
    {
        Self::new(kind, Arc::new(f))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Version the loaded model reports, overriding the descriptor.
    pub fn with_declared_version(mut self, version: i32) -> Self {
        self.declared_version = Some(version);
        self
    }

    /// Advertise reduced-precision support. The closure decides what it means.
    pub fn with_reduced_precision(mut self, supported: bool) -> Self {
        self.reduced_precision = supported;
        self
    }

    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    pub fn has_context(&self) -> bool {
        self.state.lock().context.is_some()
    }

    fn model_version(&self, desc: &ModelDescriptor) -> i32 {
        self.declared_version.unwrap_or(desc.version)
    }
}

impl ComputeEngine for HostEngine {
    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities {
            name: self.name.clone(),
            kind: self.kind,
            supports_reduced_precision: self.reduced_precision,
            has_gpu: false,
        }
    }

    fn create_context(&self, config: &ContextConfig) -> Result<(), EngineError> {
        tracing::debug!("{} engine ({}): context for {}", self.name, self.kind, config.extent);
        self.state.lock().context = Some(config.clone());
        Ok(())
    }

    fn destroy_context(&self) {
        let mut state = self.state.lock();
        if !state.slots.is_empty() {
            tracing::warn!(
                "{} engine: destroying context with {} live slot(s)",
                self.name,
                state.slots.len()
            );
        }
        state.context = None;
    }

    fn load_model(
        &self,
        desc: &ModelDescriptor,
        config: &EngineModelConfig,
    ) -> Result<EngineModel, EngineError> {
        if !self.has_context() {
            return Err(EngineError::ContextMissing);
        }
        let (version, slot) = match self.kind {
            EngineKind::Accelerated => (self.model_version(desc), None),
            EngineKind::Secondary => {
                let slot = self.create_slot(desc, config)?;
                (self.slot_version(slot)?, Some(slot))
            }
        };
        Ok(EngineModel {
            kind: self.kind,
            version,
            slot,
            config: *config,
        })
    }

    fn execute_batch(
        &self,
        model: &EngineModel,
        inputs: &BatchInputs<'_>,
        outputs: &mut BatchOutputs<'_>,
        batch_size: usize,
    ) -> Result<(), EngineError> {
        {
            let state = self.state.lock();
            if state.context.is_none() {
                return Err(EngineError::ContextMissing);
            }
            if let Some(slot) = model.slot {
                if !state.slots.contains_key(&slot) {
                    return Err(EngineError::SlotNotFound(slot.0));
                }
            }
        }
        if batch_size > model.config.max_batch_size {
            return Err(EngineError::ShapeMismatch(format!(
                "batch of {} exceeds compiled capacity {}",
                batch_size, model.config.max_batch_size
            )));
        }
        tracing::trace!("{} engine: executing batch of {}", self.name, batch_size);
        (self.forward)(inputs, outputs, batch_size)
    }

    fn release_model(&self, model: &EngineModel) {
        if let Some(slot) = model.slot {
            if let Err(e) = self.destroy_slot(slot) {
                tracing::warn!("{} engine: release failed: {}", self.name, e);
            }
        }
    }

    fn slots(&self) -> Option<&dyn ModelSlots> {
        match self.kind {
            EngineKind::Secondary => Some(self),
            EngineKind::Accelerated => None,
        }
    }
}

impl ModelSlots for HostEngine {
    fn create_slot(
        &self,
        desc: &ModelDescriptor,
        _config: &EngineModelConfig,
    ) -> Result<SlotId, EngineError> {
        let version = self.model_version(desc);
        let mut state = self.state.lock();
        let slot = SlotId(state.next_slot);
        state.next_slot += 1;
        state.slots.insert(slot, version);
        tracing::debug!("{} engine: model {} in slot {}", self.name, desc.name, slot);
        Ok(slot)
    }

    fn destroy_slot(&self, slot: SlotId) -> Result<(), EngineError> {
        self.state
            .lock()
            .slots
            .remove(&slot)
            .map(|_| ())
            .ok_or(EngineError::SlotNotFound(slot.0))
    }

    fn slot_version(&self, slot: SlotId) -> Result<i32, EngineError> {
        self.state
            .lock()
            .slots
            .get(&slot)
            .copied()
            .ok_or(EngineError::SlotNotFound(slot.0))
    }

    fn live_slots(&self) -> usize {
        self.state.lock().slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffers::InputBuffers;
    use crate::config::BoardExtent;

    fn noop(kind: EngineKind) -> HostEngine {
        HostEngine::from_fn(kind, |_, _, _| Ok(()))
    }

    fn model_config(max_batch_size: usize) -> EngineModelConfig {
        EngineModelConfig {
            model_extent: BoardExtent::compile_max(),
            max_batch_size,
            use_fp16: false,
            use_nhwc: false,
            routing_index: 0,
            server_thread_idx: 0,
        }
    }

    #[test]
    fn test_load_requires_context() {
        let engine = noop(EngineKind::Accelerated);
        let desc = ModelDescriptor::for_version("m", 10).unwrap();
        assert!(matches!(
            engine.load_model(&desc, &model_config(1)),
            Err(EngineError::ContextMissing)
        ));
    }

    #[test]
    fn test_secondary_slots_and_declared_version() {
        let engine = noop(EngineKind::Secondary).with_declared_version(11);
        engine.create_context(&ContextConfig::default()).unwrap();
        let desc = ModelDescriptor::for_version("m", 10).unwrap();

        let a = engine.load_model(&desc, &model_config(1)).unwrap();
        let b = engine.load_model(&desc, &model_config(1)).unwrap();
        assert_eq!(a.version, 11);
        assert_ne!(a.slot, b.slot);
        assert_eq!(engine.live_slots(), 2);

        engine.release_model(&a);
        assert_eq!(engine.live_slots(), 1);
        assert!(matches!(
            engine.slot_version(a.slot.unwrap()),
            Err(EngineError::SlotNotFound(_))
        ));
    }

    #[test]
    fn test_accelerated_has_no_slots() {
        let engine = noop(EngineKind::Accelerated);
        engine.create_context(&ContextConfig::default()).unwrap();
        let desc = ModelDescriptor::for_version("m", 14).unwrap();
        let model = engine.load_model(&desc, &model_config(1)).unwrap();
        assert_eq!(model.slot, None);
        assert_eq!(model.version, 14);
        assert!(engine.slots().is_none());
    }

    #[test]
    fn test_execute_after_release_fails() {
        let engine = noop(EngineKind::Secondary);
        engine.create_context(&ContextConfig::default()).unwrap();
        let desc = ModelDescriptor::for_version("m", 10).unwrap();
        let model = engine.load_model(&desc, &model_config(2)).unwrap();
        let mut buffers = InputBuffers::new(&desc, 2, BoardExtent::square(9)).unwrap();

        {
            let (inputs, mut outputs) = buffers.batch_io(2);
            assert!(engine.execute_batch(&model, &inputs, &mut outputs, 2).is_ok());
        }
        engine.release_model(&model);
        let (inputs, mut outputs) = buffers.batch_io(1);
        assert!(matches!(
            engine.execute_batch(&model, &inputs, &mut outputs, 1),
            Err(EngineError::SlotNotFound(0))
        ));
    }

    #[test]
    fn test_forward_sees_prefix_only() {
        let engine = HostEngine::from_fn(EngineKind::Accelerated, |inputs, outputs, n| {
            assert_eq!(inputs.batch_size(), n);
            outputs.value.iter_mut().for_each(|v| *v = n as f32);
            Ok(())
        });
        engine.create_context(&ContextConfig::default()).unwrap();
        let desc = ModelDescriptor::for_version("m", 8).unwrap();
        let model = engine.load_model(&desc, &model_config(4)).unwrap();
        let mut buffers = InputBuffers::new(&desc, 4, BoardExtent::square(9)).unwrap();
        {
            let (inputs, mut outputs) = buffers.batch_io(3);
            engine.execute_batch(&model, &inputs, &mut outputs, 3).unwrap();
        }
        assert_eq!(buffers.value_row(2), &[3.0, 3.0, 3.0]);
        assert_eq!(buffers.value_row(3), &[0.0, 0.0, 0.0]);
    }
}
