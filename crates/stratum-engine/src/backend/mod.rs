//! Surface backend abstraction.
//!
//! A backend is the primitive the pool builds on: it creates single images
//! with an exact memory requirement, allocates and binds memory, wraps the
//! result in a paintable render target, and performs the per-frame flush and
//! layout transition. Two implementations ship with the crate:
//! - [`WgpuBackend`]: real GPU resources through wgpu
//! - [`HeadlessBackend`]: deterministic bookkeeping for tests and fallback runs

mod headless;
mod wgpu_backend;

pub use headless::{
    Fault, HeadlessBackend, HeadlessExport, HeadlessImage, HeadlessMemory, HeadlessTarget,
    LedgerEvent,
};
pub use wgpu_backend::{WgpuBackend, WgpuExport, WgpuImage, WgpuMemory, WgpuTarget};

use anyhow::Result;

use crate::surface::SurfaceSize;
use crate::sync::SyncSignal;

/// Row pitch alignment applied when computing image memory requirements.
pub const ROW_PITCH_ALIGNMENT: u64 = 256;

/// Bytes needed to hold an image of `size` with `bytes_per_pixel` texels,
/// rows padded to [`ROW_PITCH_ALIGNMENT`].
pub fn required_bytes_for(size: SurfaceSize, bytes_per_pixel: u32) -> u64 {
    let row = size.width as u64 * bytes_per_pixel as u64;
    let pitch = row.div_ceil(ROW_PITCH_ALIGNMENT) * ROW_PITCH_ALIGNMENT;
    pitch * size.height as u64
}

/// GPU primitives consumed by [`Surface`](crate::surface::Surface) and the pool.
///
/// All resource types are owned handles; dropping one releases the
/// underlying GPU object. Implementations are used from a single thread.
pub trait SurfaceBackend {
    /// An image description bound (or about to be bound) to memory.
    type Image;
    /// A device memory allocation.
    type Memory;
    /// The paintable render-target view over an image.
    type Target;
    /// The handle given to the presentation collaborator.
    type Export;

    fn name(&self) -> &str;

    /// Creates an image of `size` and reports its memory requirement.
    fn create_image(&self, size: SurfaceSize) -> Result<Self::Image>;

    /// Pixel size the image was created with.
    fn image_size(&self, image: &Self::Image) -> SurfaceSize;

    /// Exact bytes the image needs from its backing memory.
    fn required_bytes(&self, image: &Self::Image) -> u64;

    /// Allocates memory satisfying `image`'s requirement.
    fn allocate_memory(&self, image: &Self::Image) -> Result<Self::Memory>;

    /// Size of the allocation in bytes.
    fn allocation_bytes(&self, memory: &Self::Memory) -> u64;

    /// Whether `memory` is compatible with `image` beyond the byte count
    /// (layout, memory type). Best-fit reuse skips incompatible memory.
    fn can_host(&self, _memory: &Self::Memory, _image: &Self::Image) -> bool {
        true
    }

    fn bind_image(&self, memory: &Self::Memory, image: &Self::Image) -> Result<()>;

    fn create_target(&self, memory: &Self::Memory, image: &Self::Image) -> Result<Self::Target>;

    fn create_signal(&self) -> Result<SyncSignal> {
        Ok(SyncSignal::new())
    }

    /// Returns `signal` to the unsignaled state for a new write/read round.
    fn rearm_signal(&self, signal: &SyncSignal) -> Result<()> {
        signal.reset();
        Ok(())
    }

    /// Submits all recorded work and blocks until the queue has drained it.
    fn flush(&self) -> Result<()>;

    /// Runs completion callbacks for work the device has already finished.
    /// Never blocks.
    fn poll(&self) -> Result<()> {
        Ok(())
    }

    /// Moves the image from the render-target layout to the layout the
    /// consumer reads from. `ready` must be asserted once the transition
    /// has completed on the device, at the latest by the next
    /// [`poll`](Self::poll), [`flush`](Self::flush) or
    /// [`wait_idle`](Self::wait_idle).
    fn transition_for_consumer(
        &self,
        memory: &Self::Memory,
        image: &Self::Image,
        ready: &SyncSignal,
    ) -> Result<()>;

    fn export(&self, memory: &Self::Memory, image: &Self::Image) -> Self::Export;

    /// Blocks until the device has no outstanding work.
    fn wait_idle(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_padded_to_alignment() {
        // 64 px * 4 B = 256 B, already aligned.
        assert_eq!(required_bytes_for(SurfaceSize::new(64, 64), 4), 256 * 64);
        // 65 px * 4 B = 260 B, padded to 512.
        assert_eq!(required_bytes_for(SurfaceSize::new(65, 10), 4), 512 * 10);
        assert_eq!(required_bytes_for(SurfaceSize::new(1, 1), 4), 256);
    }

    #[test]
    fn empty_size_needs_no_bytes() {
        assert_eq!(required_bytes_for(SurfaceSize::new(0, 10), 4), 0);
    }
}
