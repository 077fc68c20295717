use wgpu::{Device, Queue};

use crate::error::{Error, Result};

/// Storage buffers bound at once by the propagation shader.
pub const REQUIRED_STORAGE_BUFFERS: u32 = 7;

/// Adapter, device and queue of the GPU path
pub struct GpuContext {
    pub device: Device,
    pub queue: Queue,
    pub adapter_name: String,
}

impl GpuContext {
    pub async fn new() -> Result<Self> {
        let instance = wgpu::Instance::default();

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await
            .ok_or_else(|| Error::Gpu("no compatible GPU adapter found".to_string()))?;

        let info = adapter.get_info();
        let adapter_limits = adapter.limits();
        if adapter_limits.max_storage_buffers_per_shader_stage < REQUIRED_STORAGE_BUFFERS {
            return Err(Error::Gpu(format!(
                "adapter {} supports {} storage buffers per stage, {} are required",
                info.name, adapter_limits.max_storage_buffers_per_shader_stage, REQUIRED_STORAGE_BUFFERS
            )));
        }

        let required_limits = wgpu::Limits {
            max_storage_buffers_per_shader_stage: REQUIRED_STORAGE_BUFFERS,
            max_storage_buffer_binding_size: adapter_limits.max_storage_buffer_binding_size,
            max_buffer_size: adapter_limits.max_buffer_size,
            ..wgpu::Limits::downlevel_defaults()
        };

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Propagation Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits,
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .map_err(|e| Error::Gpu(format!("device request failed: {e}")))?;

        log::debug!("GPU device ready on {} ({:?})", info.name, info.backend);

        Ok(GpuContext {
            device,
            queue,
            adapter_name: info.name,
        })
    }

    /// Blocking variant of [`GpuContext::new`].
    pub fn blocking() -> Result<Self> {
        pollster::block_on(Self::new())
    }
}
