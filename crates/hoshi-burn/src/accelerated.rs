//! GPU engine on the wgpu backend.

use crate::device::{open_gpu, GpuSelection};
use crate::network::BurnNetwork;
use burn::backend::wgpu::{Wgpu, WgpuDevice};
use hoshi_core::{
    BatchInputs, BatchOutputs, ComputeEngine, ContextConfig, EngineCapabilities, EngineError,
    EngineKind, EngineModel, EngineModelConfig, ModelDescriptor,
};
use parking_lot::Mutex;

/// Accelerated engine: one network on one wgpu device.
///
/// `create_context` fails with [`EngineError::DeviceUnavailable`] when no
/// GPU adapter exists; there is no CPU fallback.
pub struct AcceleratedEngine {
    network: BurnNetwork<Wgpu>,
    device: Mutex<Option<WgpuDevice>>,
}

impl AcceleratedEngine {
    pub fn new(network: BurnNetwork<Wgpu>) -> Self {
        Self {
            network,
            device: Mutex::new(None),
        }
    }

    pub fn has_device(&self) -> bool {
        self.device.lock().is_some()
    }
}

impl ComputeEngine for AcceleratedEngine {
    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities {
            name: "Burn/wgpu".into(),
            kind: EngineKind::Accelerated,
            supports_reduced_precision: true,
            has_gpu: self.has_device(),
        }
    }

    fn create_context(&self, config: &ContextConfig) -> Result<(), EngineError> {
        let device = open_gpu(GpuSelection::from_device_indices(&config.device_indices)?)?;
        tracing::debug!("Accelerated engine bound to {:?}", device);
        *self.device.lock() = Some(device);
        Ok(())
    }

    fn destroy_context(&self) {
        self.device.lock().take();
    }

    fn load_model(
        &self,
        desc: &ModelDescriptor,
        config: &EngineModelConfig,
    ) -> Result<EngineModel, EngineError> {
        if !self.has_device() {
            return Err(EngineError::ContextMissing);
        }
        Ok(EngineModel {
            kind: EngineKind::Accelerated,
            version: self.network.version().unwrap_or(desc.version),
            slot: None,
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
        if batch_size > model.config.max_batch_size {
            return Err(EngineError::ShapeMismatch(format!(
                "batch of {} exceeds compiled capacity {}",
                batch_size, model.config.max_batch_size
            )));
        }
        let device = self
            .device
            .lock()
            .clone()
            .ok_or(EngineError::ContextMissing)?;
        self.network
            .run_batch(&device, inputs, outputs, batch_size, model.config.use_fp16)
    }

    fn release_model(&self, _model: &EngineModel) {}
}
