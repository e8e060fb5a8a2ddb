//! wgpu device setup for the accelerated engine.

use burn::backend::wgpu::{init_device, RuntimeOptions, WgpuDevice, WgpuSetup};
use hoshi_core::EngineError;
use wgpu::{Adapter, Backends, DeviceDescriptor, Features, Instance, Limits, PowerPreference};

pub(crate) type CpuDevice = burn::backend::ndarray::NdArrayDevice;

/// Which GPU the accelerated engine binds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GpuSelection {
    /// The high-performance adapter wgpu picks.
    Preferred,
    /// The adapter at this position among the platform's backends.
    Index(usize),
}

impl GpuSelection {
    /// Reads the first entry of a context's device list. Extra entries are
    /// ignored since one engine drives one device.
    pub(crate) fn from_device_indices(indices: &[i32]) -> Result<Self, EngineError> {
        if indices.len() > 1 {
            tracing::debug!(
                "Accelerated engine uses one device, ignoring {:?}",
                &indices[1..]
            );
        }
        match indices.first() {
            None => Ok(Self::Preferred),
            Some(&i) => usize::try_from(i).map(Self::Index).map_err(|_| {
                EngineError::DeviceUnavailable(format!("invalid device index {}", i))
            }),
        }
    }
}

/// Opens `selection` as a Burn wgpu device.
pub(crate) fn open_gpu(selection: GpuSelection) -> Result<WgpuDevice, EngineError> {
    let instance = Instance::new(&wgpu::InstanceDescriptor {
        backends: platform_backends(),
        ..Default::default()
    });
    let adapter = select_adapter(&instance, selection)?;
    let adapter_info = adapter.get_info();
    tracing::debug!(
        "Accelerated engine adapter: {} ({:?})",
        adapter_info.name,
        adapter_info.backend
    );

    let (device, queue) = pollster::block_on(adapter.request_device(&DeviceDescriptor {
        label: Some("hoshi accelerated engine"),
        required_features: Features::empty(),
        required_limits: Limits::default(),
        memory_hints: Default::default(),
        trace: Default::default(),
    }))
    .map_err(|e| EngineError::BackendInit(format!("{}: {}", adapter_info.name, e)))?;

    Ok(init_device(
        WgpuSetup {
            instance,
            adapter,
            device,
            queue,
            backend: adapter_info.backend,
        },
        RuntimeOptions::default(),
    ))
}

fn select_adapter(instance: &Instance, selection: GpuSelection) -> Result<Adapter, EngineError> {
    match selection {
        GpuSelection::Index(index) => {
            let mut adapters = instance.enumerate_adapters(platform_backends());
            let found = adapters.len();
            if index >= found {
                return Err(EngineError::DeviceUnavailable(format!(
                    "device index {} but only {} GPU adapter(s)",
                    index, found
                )));
            }
            Ok(adapters.swap_remove(index))
        }
        GpuSelection::Preferred => pollster::block_on(instance.request_adapter(
            &wgpu::RequestAdapterOptions {
                power_preference: PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: None,
            },
        ))
        .map_err(|_| EngineError::DeviceUnavailable("no GPU adapter available".into())),
    }
}

fn platform_backends() -> Backends {
    if cfg!(target_os = "macos") {
        Backends::METAL
    } else if cfg!(target_os = "windows") {
        Backends::DX12 | Backends::VULKAN
    } else if cfg!(target_os = "linux") {
        Backends::VULKAN
    } else {
        Backends::all()
    }
}
