use anyhow::{Context, Result};

use super::GpuInit;

/// Owns the wgpu core objects shared by the producer and every surface.
///
/// This type is the low-level device context:
/// - creates and stores Instance/Adapter/Device/Queue (no window, no swapchain)
/// - exposes blocking flush/idle waits
///
/// Callers own the context and lend it out by reference; the pool and
/// backend never outlive it.
pub struct GpuContext {
    /// wgpu instance used to create the adapter.
    _instance: wgpu::Instance,

    /// Selected adapter.
    adapter: wgpu::Adapter,

    /// Logical device.
    device: wgpu::Device,

    /// Command queue.
    queue: wgpu::Queue,

    /// Texel format used for pooled surfaces.
    surface_format: wgpu::TextureFormat,
}

impl GpuContext {
    /// Creates a headless GPU context.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu.
    pub async fn new(init: GpuInit) -> Result<Self> {
        let GpuInit {
            power_preference,
            force_fallback_adapter,
            required_features,
            required_limits,
            surface_format,
        } = init;

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
                compatible_surface: None,
                force_fallback_adapter,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("stratum device"),
                required_features,
                required_limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        let info = adapter.get_info();
        log::info!(
            "gpu context ready: {} ({:?}, {:?})",
            info.name,
            info.backend,
            info.device_type
        );

        Ok(Self {
            _instance: instance,
            adapter,
            device,
            queue,
            surface_format,
        })
    }

    /// Blocking variant of [`GpuContext::new`].
    pub fn new_blocking(init: GpuInit) -> Result<Self> {
        pollster::block_on(Self::new(init))
    }

    /// Returns a reference to the logical device.
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Returns a reference to the command queue.
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }

    /// Texel format of pooled surfaces.
    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.surface_format
    }

    /// Largest width/height a surface may have on this device.
    pub fn max_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    /// Submits any pending queue work and blocks until the device has
    /// finished it.
    pub fn flush(&self) -> Result<()> {
        self.queue.submit(std::iter::empty());
        self.wait_idle()
    }

    /// Runs callbacks for finished work without blocking.
    pub fn poll(&self) -> Result<()> {
        self.device
            .poll(wgpu::PollType::Poll)
            .context("non-blocking device poll failed")?;
        Ok(())
    }

    /// Blocks until the device has no outstanding work.
    pub fn wait_idle(&self) -> Result<()> {
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .context("device poll failed while waiting for idle")?;
        Ok(())
    }
}
