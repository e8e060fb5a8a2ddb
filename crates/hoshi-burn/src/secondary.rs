//! CPU engine on the NdArray backend, with integer-keyed model slots.

use crate::device::CpuDevice;
use crate::network::BurnNetwork;
use burn::backend::NdArray;
use dashmap::DashMap;
use hoshi_core::{
    BatchInputs, BatchOutputs, ComputeEngine, ContextConfig, EngineCapabilities, EngineError,
    EngineKind, EngineModel, EngineModelConfig, ModelDescriptor, ModelSlots, SlotId,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

/// A network compiled into a slot, with the version it declares.
struct CompiledModel {
    network: BurnNetwork<NdArray>,
    version: i32,
    max_batch_size: usize,
}

/// Secondary engine: every loaded model gets its own slot.
///
/// The compiled model's version is what handles see, even when it differs
/// from the descriptor.
pub struct SecondaryEngine {
    network: BurnNetwork<NdArray>,
    device: Mutex<Option<CpuDevice>>,
    slots: DashMap<SlotId, Arc<CompiledModel>>,
    next_slot: AtomicI32,
}

impl SecondaryEngine {
    pub fn new(network: BurnNetwork<NdArray>) -> Self {
        Self {
            network,
            device: Mutex::new(None),
            slots: DashMap::new(),
            next_slot: AtomicI32::new(0),
        }
    }

    fn compiled(&self, slot: SlotId) -> Result<Arc<CompiledModel>, EngineError> {
        self.slots
            .get(&slot)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(EngineError::SlotNotFound(slot.0))
    }
}

impl ComputeEngine for SecondaryEngine {
    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities {
            name: "Burn/NdArray".into(),
            kind: EngineKind::Secondary,
            supports_reduced_precision: true,
            has_gpu: false,
        }
    }

    fn create_context(&self, config: &ContextConfig) -> Result<(), EngineError> {
        tracing::debug!("Secondary engine context for {}", config.extent);
        *self.device.lock() = Some(CpuDevice::default());
        Ok(())
    }

    fn destroy_context(&self) {
        if !self.slots.is_empty() {
            tracing::warn!(
                "Secondary engine: destroying context with {} live slot(s)",
                self.slots.len()
            );
        }
        self.device.lock().take();
    }

    fn load_model(
        &self,
        desc: &ModelDescriptor,
        config: &EngineModelConfig,
    ) -> Result<EngineModel, EngineError> {
        if self.device.lock().is_none() {
            return Err(EngineError::ContextMissing);
        }
        let slot = self.create_slot(desc, config)?;
        Ok(EngineModel {
            kind: EngineKind::Secondary,
            version: self.slot_version(slot)?,
            slot: Some(slot),
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
        let slot = model
            .slot
            .ok_or_else(|| EngineError::ExecuteFailed("model has no slot".into()))?;
        let compiled = self.compiled(slot)?;
        if batch_size > compiled.max_batch_size {
            return Err(EngineError::ShapeMismatch(format!(
                "batch of {} exceeds slot {} capacity {}",
                batch_size, slot, compiled.max_batch_size
            )));
        }
        let device = self
            .device
            .lock()
            .clone()
            .ok_or(EngineError::ContextMissing)?;
        compiled
            .network
            .run_batch(&device, inputs, outputs, batch_size, model.config.use_fp16)
    }

    fn release_model(&self, model: &EngineModel) {
        if let Some(slot) = model.slot {
            if let Err(e) = self.destroy_slot(slot) {
                tracing::warn!("Secondary engine: release failed: {}", e);
            }
        }
    }

    fn slots(&self) -> Option<&dyn ModelSlots> {
        Some(self)
    }
}

impl ModelSlots for SecondaryEngine {
    fn create_slot(
        &self,
        desc: &ModelDescriptor,
        config: &EngineModelConfig,
    ) -> Result<SlotId, EngineError> {
        let slot = SlotId(self.next_slot.fetch_add(1, Ordering::Relaxed));
        let compiled = CompiledModel {
            network: self.network.clone(),
            version: self.network.version().unwrap_or(desc.version),
            max_batch_size: config.max_batch_size,
        };
        tracing::debug!(
            "Secondary engine: {} compiled into slot {} (version {})",
            desc.name,
            slot,
            compiled.version
        );
        self.slots.insert(slot, Arc::new(compiled));
        Ok(slot)
    }

    fn destroy_slot(&self, slot: SlotId) -> Result<(), EngineError> {
        self.slots
            .remove(&slot)
            .map(|_| ())
            .ok_or(EngineError::SlotNotFound(slot.0))
    }

    fn slot_version(&self, slot: SlotId) -> Result<i32, EngineError> {
        self.compiled(slot).map(|c| c.version)
    }

    fn live_slots(&self) -> usize {
        self.slots.len()
    }
}
