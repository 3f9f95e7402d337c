use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::backend::SurfaceBackend;
use crate::surface::{RetainedKey, Surface, SurfaceError, SurfaceId, SurfaceSize};

use super::{Acquired, PoolError, PoolLimits, PoolStats, SubmitOutcome};

/// A surface handed to the consumer, waiting for its release signal.
struct PendingSurface<B: SurfaceBackend> {
    surface: Surface<B>,
    /// Set by the writes-finished callback.
    released: Rc<Cell<bool>>,
}

/// A surface kept alive under a content key.
struct RetainedSurface<B: SurfaceBackend> {
    surface: Surface<B>,
    /// Cleared by the writes-finished callback.
    is_pending: Rc<Cell<bool>>,
}

/// Cache of GPU surfaces shared across frames.
///
/// Every live surface is in exactly one place: the available list, the
/// pending map, the retained map, or checked out to the caller (tracked by
/// id only). The pool is single-threaded; release signals are observed
/// through [`SurfacePool::dispatch_releases`] on the owning thread.
///
/// Lifetimes:
/// - `'g` is the borrow of the backend (and through it the GPU context)
pub struct SurfacePool<'g, B: SurfaceBackend> {
    backend: &'g B,
    limits: PoolLimits,

    available: Vec<Surface<B>>,
    pending: HashMap<SurfaceId, PendingSurface<B>>,
    retained: HashMap<RetainedKey, RetainedSurface<B>>,
    acquired: HashSet<SurfaceId>,

    stats: PoolStats,
}

impl<'g, B: SurfaceBackend> SurfacePool<'g, B> {
    pub fn new(backend: &'g B) -> Self {
        Self::with_limits(backend, PoolLimits::default())
    }

    pub fn with_limits(backend: &'g B, limits: PoolLimits) -> Self {
        Self {
            backend,
            limits,
            available: Vec::with_capacity(limits.max_surfaces),
            pending: HashMap::new(),
            retained: HashMap::new(),
            acquired: HashSet::new(),
            stats: PoolStats::default(),
        }
    }

    pub fn backend(&self) -> &'g B {
        self.backend
    }

    pub fn limits(&self) -> PoolLimits {
        self.limits
    }

    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    // ── acquisition ───────────────────────────────────────────────────────

    /// Checks out a surface of `size`.
    ///
    /// Order of preference:
    /// 1) an available surface of exactly `size`
    /// 2) the available surface with the smallest allocation that can host
    ///    an image of `size`, rebound to a new image
    /// 3) a new surface
    ///
    /// The returned surface has freshly armed sync signals.
    pub fn acquire_surface(&mut self, size: SurfaceSize) -> Result<Acquired<B>, PoolError> {
        let mut acquired = match self.cached_or_created(size) {
            Ok(acquired) => acquired,
            Err(err) => {
                self.stats.acquire_failures += 1;
                log::error!("could not acquire a {size} surface: {err}");
                return Err(err);
            }
        };

        if let Err(err) = acquired.surface_mut().flush_pending_sync(self.backend) {
            self.stats.acquire_failures += 1;
            log::error!("could not arm sync signals for a {size} surface: {err}");
            return Err(err.into());
        }

        let id = acquired.surface().id();
        self.acquired.insert(id);
        log::trace!("acquired surface {id} ({size}) via {:?}", acquired.path());
        Ok(acquired)
    }

    fn cached_or_created(&mut self, size: SurfaceSize) -> Result<Acquired<B>, PoolError> {
        if let Some(pos) = self
            .available
            .iter()
            .position(|s| s.is_valid() && s.size() == size)
        {
            self.stats.reused_exact += 1;
            return Ok(Acquired::Exact(self.available.remove(pos)));
        }

        let image = self
            .backend
            .create_image(size)
            .map_err(|cause| SurfaceError::Image { size, cause })?;

        let backend = self.backend;
        let best = self
            .available
            .iter()
            .enumerate()
            .filter(|(_, s)| s.can_host(backend, &image))
            .min_by_key(|(_, s)| s.allocation_bytes())
            .map(|(pos, _)| pos);

        let Some(pos) = best else {
            let surface = Surface::with_image(backend, image)?;
            self.stats.created += 1;
            return Ok(Acquired::Created(surface));
        };

        let mut surface = self.available.remove(pos);
        match surface.rebind(backend, image) {
            Ok(()) => {
                self.stats.reused_best_fit += 1;
                Ok(Acquired::BestFit(surface))
            }
            Err(err) => {
                log::warn!(
                    "best-fit rebind of surface {} to {size} failed, allocating instead: {err}",
                    surface.id()
                );
                self.stats.rebind_failures += 1;
                self.recycle(surface);

                let surface = Surface::create(backend, size)?;
                self.stats.created += 1;
                Ok(Acquired::Created(surface))
            }
        }
    }

    // ── submission & recycling ────────────────────────────────────────────

    /// Takes back a surface the caller painted and handed to the consumer.
    ///
    /// With a non-trivial `retained_key` the surface is held in the retained
    /// map; otherwise it waits in the pending map until its release signal
    /// fires and is then recycled. An invalid surface is destroyed.
    ///
    /// A surface that is not currently checked out is rejected.
    pub fn submit_surface(
        &mut self,
        mut surface: Surface<B>,
        retained_key: Option<RetainedKey>,
    ) -> Result<SubmitOutcome, PoolError> {
        let id = surface.id();
        if !self.acquired.remove(&id) {
            log::error!("surface {id} submitted without being acquired from this pool");
            return Err(PoolError::NotAcquired(id));
        }

        if !surface.is_valid() {
            self.stats.invalid_drops += 1;
            log::debug!("dropping invalid surface {id} on submit");
            return Ok(SubmitOutcome::Discarded);
        }

        let retained_key = retained_key.filter(|key| !key.is_trivial());
        if let Some(key) = retained_key {
            if !self.retained.contains_key(&key) {
                let is_pending = Rc::new(Cell::new(true));
                let flag = Rc::clone(&is_pending);
                surface.signal_writes_finished(move || flag.set(false))?;
                surface.set_retained_key(Some(key));
                surface.reset_used_in_retained_rendering();
                self.retained.insert(key, RetainedSurface { surface, is_pending });
                return Ok(SubmitOutcome::Retained);
            }
            log::warn!("retained key {key} already held; surface {id} goes through the pending path");
        }

        let released = Rc::new(Cell::new(false));
        let flag = Rc::clone(&released);
        surface.signal_writes_finished(move || flag.set(true))?;
        surface.set_retained_key(None);
        self.pending.insert(id, PendingSurface { surface, released });
        Ok(SubmitOutcome::Pending)
    }

    /// Observes release signals and runs the callbacks that fired.
    ///
    /// Released pending surfaces are recycled into the available list;
    /// retained entries only lose their pending mark. Returns the number of
    /// pending surfaces recycled or destroyed.
    ///
    /// The device is polled first so completions queued since the last
    /// frame have run.
    pub fn dispatch_releases(&mut self) -> usize {
        if let Err(err) = self.backend.poll() {
            log::warn!("device poll failed while dispatching releases: {err:#}");
        }

        let mut released: Vec<SurfaceId> = Vec::new();
        for (id, entry) in self.pending.iter_mut() {
            entry.surface.poll_writes_finished();
            if entry.released.get() {
                released.push(*id);
            }
        }

        for entry in self.retained.values_mut() {
            entry.surface.poll_writes_finished();
        }

        released.sort_unstable();
        for id in &released {
            if let Some(entry) = self.pending.remove(id) {
                self.recycle(entry.surface);
            }
        }
        released.len()
    }

    /// Returns a surface to the available list, or destroys it when it is
    /// invalid or the list is full.
    fn recycle(&mut self, mut surface: Surface<B>) {
        if !surface.is_valid() {
            self.stats.invalid_drops += 1;
            return;
        }

        surface.take_retained_key();
        surface.reset_used_in_retained_rendering();

        if self.available.len() < self.limits.max_surfaces {
            self.available.push(surface);
        } else {
            self.stats.capacity_drops += 1;
            log::trace!("available list full; destroying surface {}", surface.id());
        }
    }

    // ── retained lookup ───────────────────────────────────────────────────

    pub fn has_retained(&self, key: &RetainedKey) -> bool {
        self.retained.contains_key(key)
    }

    /// Looks up a retained surface and marks it used for this frame, which
    /// keeps it out of the next aging pass's recycling.
    pub fn retained(&mut self, key: &RetainedKey) -> Option<&Surface<B>> {
        let entry = self.retained.get_mut(key)?;
        entry.surface.mark_used_in_retained_rendering();
        Some(&entry.surface)
    }

    /// `Some(true)` while the consumer has not yet released the retained
    /// surface under `key`.
    pub fn is_retained_pending(&self, key: &RetainedKey) -> Option<bool> {
        self.retained.get(key).map(|entry| entry.is_pending.get())
    }

    // ── maintenance ───────────────────────────────────────────────────────

    /// Per-frame bookkeeping.
    ///
    /// 1) ages every available surface and discards invalid ones and those
    ///    that reached `max_surface_age`
    /// 2) replaces at most one oversized surface with a stable size history
    ///    by an exact-sized one
    /// 3) recycles retained surfaces that are released and were not used
    ///    this frame, then clears the used mark on every retained entry
    pub fn age_and_collect_old_buffers(&mut self) {
        let max_age = self.limits.max_surface_age;
        let before = self.available.len();
        self.available
            .retain_mut(|s| s.is_valid() && s.advance_and_get_age() < max_age);
        self.stats.evicted += (before - self.available.len()) as u64;

        if let Some(pos) = self
            .available
            .iter()
            .position(|s| s.is_oversized() && s.has_stable_size_history())
        {
            let oversized = self.available.remove(pos);
            let size = oversized.size();
            drop(oversized);
            self.replace_with_exact(size);
        }

        let mut recycle_keys: Vec<RetainedKey> = Vec::new();
        for (key, entry) in self.retained.iter_mut() {
            // The mark only covers the frame that just ended, pending or not.
            let used = entry.surface.is_used_in_retained_rendering();
            entry.surface.reset_used_in_retained_rendering();
            if !used && !entry.is_pending.get() {
                recycle_keys.push(*key);
            }
        }
        for key in recycle_keys {
            if let Some(entry) = self.retained.remove(&key) {
                self.recycle(entry.surface);
            }
        }

        self.log_stats();
    }

    /// Replaces every oversized available surface with an exact-sized one.
    ///
    /// Each old allocation is released before its replacement is made, so
    /// at most one of the pair is alive at any moment.
    pub fn shrink_to_fit(&mut self) {
        let surfaces = std::mem::take(&mut self.available);
        for surface in surfaces {
            if !surface.is_oversized() {
                self.available.push(surface);
                continue;
            }
            let size = surface.size();
            drop(surface);
            self.replace_with_exact(size);
        }
    }

    fn replace_with_exact(&mut self, size: SurfaceSize) {
        match Surface::create(self.backend, size) {
            Ok(surface) => {
                self.stats.compacted += 1;
                self.available.push(surface);
            }
            Err(err) => log::error!("could not replace oversized {size} surface: {err}"),
        }
    }

    // ── queries ───────────────────────────────────────────────────────────

    pub fn available_count(&self) -> usize {
        self.available.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn retained_count(&self) -> usize {
        self.retained.len()
    }

    /// Surfaces checked out and not yet submitted.
    pub fn acquired_count(&self) -> usize {
        self.acquired.len()
    }

    pub fn available_surfaces(&self) -> impl Iterator<Item = &Surface<B>> {
        self.available.iter()
    }

    /// Bytes of memory held by available surfaces.
    pub fn cached_bytes(&self) -> u64 {
        self.available.iter().map(Surface::allocation_bytes).sum()
    }

    fn log_stats(&self) {
        if !log::log_enabled!(log::Level::Debug) {
            return;
        }
        let s = &self.stats;
        log::debug!(
            "surface pool [{}]: available={} pending={} retained={} acquired={} cached={}B \
             created={} reused={} (exact={} best_fit={}) evicted={} compacted={}",
            self.backend.name(),
            self.available.len(),
            self.pending.len(),
            self.retained.len(),
            self.acquired.len(),
            self.cached_bytes(),
            s.created,
            s.reused(),
            s.reused_exact,
            s.reused_best_fit,
            s.evicted,
            s.compacted,
        );
    }
}

impl<B: SurfaceBackend> Drop for SurfacePool<'_, B> {
    fn drop(&mut self) {
        // Outstanding GPU work may still reference pooled memory.
        if let Err(err) = self.backend.wait_idle() {
            log::error!("device idle wait failed during pool teardown: {err:#}");
        }
        self.available.clear();
        self.pending.clear();
        self.retained.clear();
    }
}
