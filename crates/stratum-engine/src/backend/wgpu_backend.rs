//! wgpu-backed surfaces.
//!
//! wgpu does not expose raw device memory, so a pooled allocation is a
//! texture and an "image" is the rectangle of it the surface currently
//! renders into. Rebinding a smaller image onto a larger texture reuses the
//! texture and narrows the viewport; memory only hosts images that fit
//! inside its extent on both axes.

use anyhow::{Context, Result, ensure};

use super::{SurfaceBackend, required_bytes_for};
use crate::device::GpuContext;
use crate::surface::SurfaceSize;
use crate::sync::SyncSignal;

/// Image description: a logical size and its byte requirement.
#[derive(Debug, Clone)]
pub struct WgpuImage {
    size: SurfaceSize,
    required_bytes: u64,
}

/// A pooled texture standing in for a device memory allocation.
#[derive(Debug)]
pub struct WgpuMemory {
    texture: wgpu::Texture,
    extent: SurfaceSize,
    bytes: u64,
}

impl WgpuMemory {
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    /// Full texture extent, which may exceed the bound image.
    pub fn extent(&self) -> SurfaceSize {
        self.extent
    }
}

/// Paintable view. Renderers must restrict drawing to `viewport`, anchored
/// at the texture origin.
#[derive(Debug)]
pub struct WgpuTarget {
    view: wgpu::TextureView,
    viewport: SurfaceSize,
}

impl WgpuTarget {
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn viewport(&self) -> SurfaceSize {
        self.viewport
    }
}

/// Handle given to the compositor: the texture plus the readable region.
#[derive(Debug, Clone)]
pub struct WgpuExport {
    pub texture: wgpu::Texture,
    pub size: SurfaceSize,
}

/// Surface backend over a shared [`GpuContext`].
pub struct WgpuBackend<'c> {
    ctx: &'c GpuContext,
    bytes_per_pixel: u32,
}

impl<'c> WgpuBackend<'c> {
    pub fn new(ctx: &'c GpuContext) -> Result<Self> {
        let format = ctx.surface_format();
        let bytes_per_pixel = format
            .block_copy_size(None)
            .with_context(|| format!("surface format {format:?} has no fixed texel size"))?;
        Ok(Self {
            ctx,
            bytes_per_pixel,
        })
    }

    pub fn context(&self) -> &GpuContext {
        self.ctx
    }
}

impl SurfaceBackend for WgpuBackend<'_> {
    type Image = WgpuImage;
    type Memory = WgpuMemory;
    type Target = WgpuTarget;
    type Export = WgpuExport;

    fn name(&self) -> &str {
        "wgpu"
    }

    fn create_image(&self, size: SurfaceSize) -> Result<WgpuImage> {
        ensure!(!size.is_empty(), "cannot create an empty {size} image");
        let max = self.ctx.max_dimension();
        ensure!(
            size.width <= max && size.height <= max,
            "{size} exceeds the device's {max} px texture limit"
        );
        Ok(WgpuImage {
            size,
            required_bytes: required_bytes_for(size, self.bytes_per_pixel),
        })
    }

    fn image_size(&self, image: &WgpuImage) -> SurfaceSize {
        image.size
    }

    fn required_bytes(&self, image: &WgpuImage) -> u64 {
        image.required_bytes
    }

    fn allocate_memory(&self, image: &WgpuImage) -> Result<WgpuMemory> {
        let texture = self.ctx.device().create_texture(&wgpu::TextureDescriptor {
            label: Some("stratum pooled surface"),
            size: wgpu::Extent3d {
                width: image.size.width,
                height: image.size.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.ctx.surface_format(),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });

        Ok(WgpuMemory {
            texture,
            extent: image.size,
            bytes: image.required_bytes,
        })
    }

    fn allocation_bytes(&self, memory: &WgpuMemory) -> u64 {
        memory.bytes
    }

    fn can_host(&self, memory: &WgpuMemory, image: &WgpuImage) -> bool {
        memory.extent.contains(image.size)
    }

    fn bind_image(&self, memory: &WgpuMemory, image: &WgpuImage) -> Result<()> {
        ensure!(
            memory.extent.contains(image.size),
            "{} image does not fit a {} texture",
            image.size,
            memory.extent
        );
        Ok(())
    }

    fn create_target(&self, memory: &WgpuMemory, image: &WgpuImage) -> Result<WgpuTarget> {
        let view = memory.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("stratum surface view"),
            ..Default::default()
        });
        Ok(WgpuTarget {
            view,
            viewport: image.size,
        })
    }

    fn flush(&self) -> Result<()> {
        self.ctx.flush()
    }

    fn poll(&self) -> Result<()> {
        self.ctx.poll()
    }

    fn transition_for_consumer(
        &self,
        memory: &WgpuMemory,
        _image: &WgpuImage,
        ready: &SyncSignal,
    ) -> Result<()> {
        let mut encoder = self
            .ctx
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("stratum consumer transition"),
            });

        encoder.transition_resources(
            std::iter::empty::<wgpu::BufferTransition<&wgpu::Buffer>>(),
            std::iter::once(wgpu::TextureTransition {
                texture: &memory.texture,
                selector: None,
                state: wgpu::TextureUses::RESOURCE,
            }),
        );

        let queue = self.ctx.queue();
        queue.submit(std::iter::once(encoder.finish()));

        // Fires from the next device poll once the submission has retired.
        let ready = ready.clone();
        queue.on_submitted_work_done(move || ready.signal());
        Ok(())
    }

    fn export(&self, memory: &WgpuMemory, image: &WgpuImage) -> WgpuExport {
        WgpuExport {
            texture: memory.texture.clone(),
            size: image.size,
        }
    }

    fn wait_idle(&self) -> Result<()> {
        self.ctx.wait_idle()
    }
}
