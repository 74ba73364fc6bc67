use std::sync::Arc;

#[allow(unused_imports)]
use log::{debug, info, warn};

use crate::error::{AtlasError, Result};

/// Shared device and queue. Submission is serialized through the queue, so the
/// handle is cloned freely between components.
#[derive(Debug, Clone)]
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub backend: wgpu::Backend,
}

impl GpuContext {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>, backend: wgpu::Backend) -> Self {
        Self { device, queue, backend }
    }

    /// Requests a device without a surface, for offline atlas building and tests.
    pub async fn headless() -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| AtlasError::gpu("no suitable adapter found"))?;

        let info = adapter.get_info();
        info!("Using adapter {} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("atlasforge device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: adapter.limits(),
                },
                None,
            )
            .await
            .map_err(|e| AtlasError::gpu(format!("failed to request device: {e}")))?;

        Ok(Self::new(Arc::new(device), Arc::new(queue), info.backend))
    }

    pub fn limits(&self) -> wgpu::Limits {
        self.device.limits()
    }
}
