use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::backend::SurfaceBackend;
use crate::sync::SyncSignal;

use super::size::SizeHistory;
use super::{RetainedKey, SurfaceError, SurfaceSize};

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque per-surface token. Unique for the lifetime of the process.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct SurfaceId(u64);

impl SurfaceId {
    fn next() -> Self {
        Self(NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

type WritesFinished = Box<dyn FnOnce()>;

/// A drawable GPU-backed render target plus its memory and sync signals.
///
/// Invariant: `allocation_bytes >= required_bytes`. Memory may be larger
/// than the bound image needs (after a best-fit rebind), never smaller.
///
/// Resources are released on drop. Field order puts the render target and
/// image ahead of the memory they reference.
pub struct Surface<B: SurfaceBackend> {
    id: SurfaceId,
    size: SurfaceSize,

    target: B::Target,
    image: B::Image,
    memory: B::Memory,

    allocation_bytes: u64,
    required_bytes: u64,

    valid: bool,
    age: u32,
    history: SizeHistory,

    used_in_retained_rendering: bool,
    retained_key: Option<RetainedKey>,

    /// Asserted once the surface is legible to the consumer.
    ready: SyncSignal,
    /// Asserted by the consumer once it has finished reading.
    release: SyncSignal,
    writes_finished: Option<WritesFinished>,
}

impl<B: SurfaceBackend> Surface<B> {
    /// Allocates memory and an image of `size`, binds them and builds the
    /// render target and both signals.
    pub fn create(backend: &B, size: SurfaceSize) -> Result<Self, SurfaceError> {
        let image = backend
            .create_image(size)
            .map_err(|cause| SurfaceError::Image { size, cause })?;
        Self::with_image(backend, image)
    }

    /// Like [`Surface::create`] for an image the caller already created.
    pub fn with_image(backend: &B, image: B::Image) -> Result<Self, SurfaceError> {
        let id = SurfaceId::next();
        let size = backend.image_size(&image);
        let required_bytes = backend.required_bytes(&image);

        let memory = backend
            .allocate_memory(&image)
            .map_err(|cause| SurfaceError::Allocation { size, cause })?;

        let allocation_bytes = backend.allocation_bytes(&memory);
        if allocation_bytes < required_bytes {
            return Err(SurfaceError::Undersized {
                required: required_bytes,
                allocated: allocation_bytes,
            });
        }

        backend
            .bind_image(&memory, &image)
            .map_err(|cause| SurfaceError::Bind { size, cause })?;

        let target = backend
            .create_target(&memory, &image)
            .map_err(|cause| SurfaceError::RenderTarget { size, cause })?;

        let ready = backend
            .create_signal()
            .map_err(|cause| SurfaceError::Sync { id, cause })?;
        let release = backend
            .create_signal()
            .map_err(|cause| SurfaceError::Sync { id, cause })?;

        log::trace!("surface {id} created: {size}, {allocation_bytes} bytes");

        Ok(Self {
            id,
            size,
            target,
            image,
            memory,
            allocation_bytes,
            required_bytes,
            valid: true,
            age: 0,
            history: SizeHistory::new(),
            used_in_retained_rendering: false,
            retained_key: None,
            ready,
            release,
            writes_finished: None,
        })
    }

    /// Binds a new, differently-sized image onto this surface's memory and
    /// rebuilds the render target.
    ///
    /// An image needing more bytes than the allocation holds is rejected and
    /// the surface is left untouched. A bind or render-target failure
    /// invalidates the surface.
    pub fn rebind(&mut self, backend: &B, image: B::Image) -> Result<(), SurfaceError> {
        if !self.valid {
            return Err(SurfaceError::Invalid(self.id));
        }

        let size = backend.image_size(&image);
        let required = backend.required_bytes(&image);
        if required > self.allocation_bytes {
            return Err(SurfaceError::Undersized {
                required,
                allocated: self.allocation_bytes,
            });
        }

        if let Err(cause) = backend.bind_image(&self.memory, &image) {
            self.valid = false;
            return Err(SurfaceError::Bind { size, cause });
        }

        let target = match backend.create_target(&self.memory, &image) {
            Ok(target) => target,
            Err(cause) => {
                self.valid = false;
                return Err(SurfaceError::RenderTarget { size, cause });
            }
        };

        log::trace!(
            "surface {} rebound {} -> {size} ({required}/{} bytes)",
            self.id,
            self.size,
            self.allocation_bytes
        );

        self.target = target;
        self.image = image;
        self.size = size;
        self.required_bytes = required;
        Ok(())
    }

    /// Records the current size into the stability ring, then bumps and
    /// returns the age.
    pub fn advance_and_get_age(&mut self) -> u32 {
        self.history.record(self.size);
        self.age = self.age.saturating_add(1);
        self.age
    }

    /// Re-arms both signals for a new producer-write / consumer-read round
    /// and resets the age. A failure invalidates the surface.
    pub fn flush_pending_sync(&mut self, backend: &B) -> Result<(), SurfaceError> {
        if !self.valid {
            return Err(SurfaceError::Invalid(self.id));
        }

        for signal in [&self.ready, &self.release] {
            if let Err(cause) = backend.rearm_signal(signal) {
                self.valid = false;
                return Err(SurfaceError::Sync { id: self.id, cause });
            }
        }

        self.age = 0;
        Ok(())
    }

    /// Registers a one-shot callback fired once the release signal is
    /// observed by [`Surface::poll_writes_finished`].
    ///
    /// Only one callback may be armed at a time.
    pub fn signal_writes_finished<F>(&mut self, callback: F) -> Result<(), SurfaceError>
    where
        F: FnOnce() + 'static,
    {
        if self.writes_finished.is_some() {
            return Err(SurfaceError::CallbackPending(self.id));
        }
        self.writes_finished = Some(Box::new(callback));
        Ok(())
    }

    /// Non-blocking check of the release signal.
    ///
    /// When the signal is set and a callback is armed, the slot is cleared
    /// and then the callback runs. Returns whether a callback fired.
    pub fn poll_writes_finished(&mut self) -> bool {
        if self.writes_finished.is_none() || !self.release.is_signaled() {
            return false;
        }
        match self.writes_finished.take() {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    pub fn has_pending_callback(&self) -> bool {
        self.writes_finished.is_some()
    }

    /// Moves the image into the consumer-readable layout. The backend asserts
    /// the ready signal once the device has executed the transition, which
    /// callers observe after a [`SurfaceBackend::poll`].
    pub fn transition_for_consumer(&mut self, backend: &B) -> Result<(), SurfaceError> {
        if !self.valid {
            return Err(SurfaceError::Invalid(self.id));
        }
        backend
            .transition_for_consumer(&self.memory, &self.image, &self.ready)
            .map_err(|cause| {
                self.valid = false;
                SurfaceError::Transition { id: self.id, cause }
            })
    }

    /// Whether this surface's memory could take `image` through
    /// [`Surface::rebind`].
    pub fn can_host(&self, backend: &B, image: &B::Image) -> bool {
        self.valid
            && backend.required_bytes(image) <= self.allocation_bytes
            && backend.can_host(&self.memory, image)
    }

    pub fn export(&self, backend: &B) -> B::Export {
        backend.export(&self.memory, &self.image)
    }

    #[inline]
    pub fn id(&self) -> SurfaceId {
        self.id
    }

    #[inline]
    pub fn size(&self) -> SurfaceSize {
        self.size
    }

    /// The paintable view.
    #[inline]
    pub fn target(&self) -> &B::Target {
        &self.target
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub(crate) fn invalidate(&mut self) {
        self.valid = false;
    }

    #[inline]
    pub fn age(&self) -> u32 {
        self.age
    }

    #[inline]
    pub fn allocation_bytes(&self) -> u64 {
        self.allocation_bytes
    }

    #[inline]
    pub fn required_bytes(&self) -> u64 {
        self.required_bytes
    }

    /// More memory is allocated than the bound image needs.
    #[inline]
    pub fn is_oversized(&self) -> bool {
        self.allocation_bytes > self.required_bytes
    }

    /// The surface held the same size at each of its last
    /// [`SIZE_HISTORY_LEN`](super::SIZE_HISTORY_LEN) aging passes.
    #[inline]
    pub fn has_stable_size_history(&self) -> bool {
        self.history.is_stable()
    }

    pub fn is_used_in_retained_rendering(&self) -> bool {
        self.used_in_retained_rendering
    }

    pub fn mark_used_in_retained_rendering(&mut self) {
        self.used_in_retained_rendering = true;
    }

    pub fn reset_used_in_retained_rendering(&mut self) {
        self.used_in_retained_rendering = false;
    }

    pub fn retained_key(&self) -> Option<RetainedKey> {
        self.retained_key
    }

    pub fn set_retained_key(&mut self, key: Option<RetainedKey>) {
        self.retained_key = key;
    }

    pub(crate) fn take_retained_key(&mut self) -> Option<RetainedKey> {
        self.retained_key.take()
    }

    pub fn ready_signal(&self) -> &SyncSignal {
        &self.ready
    }

    pub fn release_signal(&self) -> &SyncSignal {
        &self.release
    }
}

impl<B: SurfaceBackend> fmt::Debug for Surface<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface")
            .field("id", &self.id)
            .field("size", &self.size)
            .field("allocation_bytes", &self.allocation_bytes)
            .field("required_bytes", &self.required_bytes)
            .field("valid", &self.valid)
            .field("age", &self.age)
            .field("retained_key", &self.retained_key)
            .finish_non_exhaustive()
    }
}
