use std::time::{Duration, Instant};

use crate::backend::SurfaceBackend;
use crate::pool::{PoolLimits, PoolStats, SubmitOutcome, SurfacePool};
use crate::surface::{RetainedKey, Surface, SurfaceSize};
use crate::time::{IDLE_SHRINK_DELAY, IdleTimer};

use super::{FrameError, PresentedSurface, Presenter};

/// Per-frame summary returned by [`SurfaceProducer::finish_frame`].
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct FrameReport {
    /// Zero-based index of the finished frame.
    pub frame_index: u64,
    /// Surfaces handed to the presenter.
    pub presented: usize,
    /// Presented surfaces now waiting for release.
    pub pending: usize,
    /// Presented surfaces kept under a retained key.
    pub retained: usize,
    /// Surfaces destroyed instead of being returned to the pool.
    pub discarded: usize,
}

/// Facade used by the rasterizer: one pool, one device, one frame at a time.
pub struct SurfaceProducer<'g, B: SurfaceBackend> {
    pool: SurfacePool<'g, B>,
    idle: IdleTimer,
    /// Bumped by every production request; tags the idle tick.
    produced: u64,
    frame_index: u64,
}

impl<'g, B: SurfaceBackend> SurfaceProducer<'g, B> {
    pub fn new(backend: &'g B) -> Self {
        Self::with_limits(backend, PoolLimits::default(), IDLE_SHRINK_DELAY)
    }

    pub fn with_limits(backend: &'g B, limits: PoolLimits, idle_delay: Duration) -> Self {
        log::info!(
            "surface producer on {} backend (max {} surfaces, age {}, idle shrink after {:?})",
            backend.name(),
            limits.max_surfaces,
            limits.max_surface_age,
            idle_delay
        );
        Self {
            pool: SurfacePool::with_limits(backend, limits),
            idle: IdleTimer::new(idle_delay),
            produced: 0,
            frame_index: 0,
        }
    }

    /// Returns a paintable surface of `size`, or `None` when the pool could
    /// not produce one (the failure is logged by the pool).
    ///
    /// `retained_key` is recorded on the surface and decides, at
    /// [`finish_frame`](Self::finish_frame), whether it is retained.
    pub fn produce_surface(
        &mut self,
        size: SurfaceSize,
        retained_key: Option<RetainedKey>,
    ) -> Option<Surface<B>> {
        self.produced = self.produced.wrapping_add(1);

        let mut surface = self.pool.acquire_surface(size).ok()?.into_surface();
        surface.set_retained_key(retained_key.filter(|key| !key.is_trivial()));
        Some(surface)
    }

    pub fn has_retained(&self, key: &RetainedKey) -> bool {
        self.pool.has_retained(key)
    }

    /// Looks up a retained surface and keeps it alive for this frame.
    pub fn retained(&mut self, key: &RetainedKey) -> Option<&Surface<B>> {
        self.pool.retained(key)
    }

    /// Completes a frame.
    ///
    /// 1) flushes the device once for every surface painted this frame
    /// 2) transitions every surface for the consumer
    /// 3) polls the device so finished transitions assert their ready signal
    /// 4) presents the transitioned surfaces
    /// 5) returns every surface to the pool
    /// 6) ages the pool and schedules the idle shrink
    ///
    /// A flush failure discards the whole batch. Surfaces whose transition
    /// fails are discarded before anything is presented; the others are
    /// still presented.
    pub fn finish_frame<P>(
        &mut self,
        surfaces: Vec<Surface<B>>,
        presenter: &mut P,
        now: Instant,
    ) -> Result<FrameReport, FrameError>
    where
        P: Presenter<B> + ?Sized,
    {
        let total = surfaces.len();
        let mut report = FrameReport {
            frame_index: self.frame_index,
            ..FrameReport::default()
        };
        self.frame_index += 1;

        let backend = self.pool.backend();
        if let Err(cause) = backend.flush() {
            log::error!("frame {}: flush failed, discarding {total} surfaces", report.frame_index);
            for mut surface in surfaces {
                surface.invalidate();
                self.submit(surface, &mut report);
            }
            self.end_frame(now);
            return Err(FrameError::Flush { cause });
        }

        let mut transitioned = Vec::with_capacity(total);
        let mut failed = 0;
        for mut surface in surfaces {
            match surface.transition_for_consumer(backend) {
                Ok(()) => transitioned.push(surface),
                Err(err) => {
                    log::warn!("frame {}: {err}", report.frame_index);
                    failed += 1;
                    self.submit(surface, &mut report);
                }
            }
        }

        if let Err(err) = backend.poll() {
            log::warn!(
                "frame {}: device poll after transitions failed: {err:#}",
                report.frame_index
            );
        }

        for surface in transitioned {
            presenter.present(PresentedSurface {
                id: surface.id(),
                size: surface.size(),
                memory: surface.export(backend),
                ready: surface.ready_signal().clone(),
                release: surface.release_signal().clone(),
            });
            report.presented += 1;
            self.submit(surface, &mut report);
        }

        self.end_frame(now);

        if failed > 0 {
            return Err(FrameError::Transition { failed, total });
        }
        log::trace!("frame {report:?}");
        Ok(report)
    }

    fn submit(&mut self, surface: Surface<B>, report: &mut FrameReport) {
        let key = surface.retained_key();
        match self.pool.submit_surface(surface, key) {
            Ok(SubmitOutcome::Pending) => report.pending += 1,
            Ok(SubmitOutcome::Retained) => report.retained += 1,
            Ok(SubmitOutcome::Discarded) => report.discarded += 1,
            Err(err) => {
                log::error!("frame {}: {err}", report.frame_index);
                report.discarded += 1;
            }
        }
    }

    fn end_frame(&mut self, now: Instant) {
        self.pool.age_and_collect_old_buffers();
        self.idle.schedule(now, self.produced);
    }

    /// Observes consumer releases; see [`SurfacePool::dispatch_releases`].
    pub fn dispatch_releases(&mut self) -> usize {
        self.pool.dispatch_releases()
    }

    /// Shrinks the pool once no surface has been produced for the idle delay.
    /// Returns whether the shrink ran.
    pub fn idle_tick(&mut self, now: Instant) -> bool {
        if !self.idle.poll(now, self.produced) {
            return false;
        }
        log::debug!("producer idle; shrinking cached surfaces to fit");
        self.pool.shrink_to_fit();
        true
    }

    pub fn pool(&self) -> &SurfacePool<'g, B> {
        &self.pool
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Frames finished so far.
    pub fn frames(&self) -> u64 {
        self.frame_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Fault, HeadlessBackend};
    use crate::surface::{ContentId, SurfaceId};
    use crate::sync::SyncSignal;

    const DELAY: Duration = Duration::from_millis(100);

    fn sz(w: u32, h: u32) -> SurfaceSize {
        SurfaceSize::new(w, h)
    }

    fn producer(backend: &HeadlessBackend) -> SurfaceProducer<'_, HeadlessBackend> {
        SurfaceProducer::with_limits(
            backend,
            PoolLimits {
                max_surfaces: 12,
                max_surface_age: 100,
            },
            DELAY,
        )
    }

    /// Records every presented surface.
    #[derive(Default)]
    struct Recorder {
        seen: Vec<(SurfaceId, SurfaceSize, SyncSignal, SyncSignal)>,
        /// Whether `ready` was already asserted when the surface arrived.
        ready_on_arrival: Vec<bool>,
    }

    impl Presenter<HeadlessBackend> for Recorder {
        fn present(&mut self, s: PresentedSurface<HeadlessBackend>) {
            assert_eq!(s.memory.size, s.size);
            self.ready_on_arrival.push(s.ready.is_signaled());
            self.seen.push((s.id, s.size, s.ready, s.release));
        }
    }

    impl Recorder {
        fn release_all(&mut self) {
            for (_, _, _, release) in self.seen.drain(..) {
                release.signal();
            }
        }
    }

    #[test]
    fn frame_presents_ready_surfaces_and_holds_them_pending() {
        let backend = HeadlessBackend::new();
        let mut producer = producer(&backend);
        let mut presenter = Recorder::default();

        let a = producer.produce_surface(sz(64, 64), None).unwrap();
        let b = producer.produce_surface(sz(32, 32), None).unwrap();
        let report = producer
            .finish_frame(vec![a, b], &mut presenter, Instant::now())
            .unwrap();

        assert_eq!(report.presented, 2);
        assert_eq!(report.pending, 2);
        assert_eq!(backend.flushes(), 1);
        assert_eq!(backend.transitions(), 2);
        assert_eq!(backend.transitions_in_flight(), 0);
        assert_eq!(presenter.ready_on_arrival, vec![true, true]);
        assert_eq!(producer.pool().pending_count(), 2);
        assert_eq!(producer.pool().acquired_count(), 0);
    }

    #[test]
    fn released_surfaces_are_reused_next_frame() {
        let backend = HeadlessBackend::new();
        let mut producer = producer(&backend);
        let mut presenter = Recorder::default();
        let now = Instant::now();

        let s = producer.produce_surface(sz(64, 64), None).unwrap();
        let id = s.id();
        producer.finish_frame(vec![s], &mut presenter, now).unwrap();
        presenter.release_all();
        assert_eq!(producer.dispatch_releases(), 1);

        let again = producer.produce_surface(sz(64, 64), None).unwrap();
        assert_eq!(again.id(), id);
        assert_eq!(backend.allocations_made(), 1);
        producer.finish_frame(vec![again], &mut presenter, now).unwrap();
    }

    #[test]
    fn closure_presenter_is_accepted() {
        let backend = HeadlessBackend::new();
        let mut producer = producer(&backend);
        let mut count = 0;
        let mut presenter = |_: PresentedSurface<HeadlessBackend>| count += 1;

        let s = producer.produce_surface(sz(8, 8), None).unwrap();
        producer.finish_frame(vec![s], &mut presenter, Instant::now()).unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn produce_failure_returns_none() {
        let backend = HeadlessBackend::new();
        let mut producer = producer(&backend);
        backend.inject(Fault::Allocate, 1);
        assert!(producer.produce_surface(sz(8, 8), None).is_none());
        assert_eq!(producer.pool().acquired_count(), 0);
    }

    #[test]
    fn flush_failure_discards_whole_batch() {
        let backend = HeadlessBackend::new();
        let mut producer = producer(&backend);
        let mut presenter = Recorder::default();
        let surfaces = vec![
            producer.produce_surface(sz(8, 8), None).unwrap(),
            producer.produce_surface(sz(16, 16), None).unwrap(),
        ];

        backend.inject(Fault::Flush, 1);
        let err = producer
            .finish_frame(surfaces, &mut presenter, Instant::now())
            .unwrap_err();
        assert!(matches!(err, FrameError::Flush { .. }));
        assert!(presenter.seen.is_empty());
        assert_eq!(producer.pool().pending_count(), 0);
        assert_eq!(producer.pool().acquired_count(), 0);
        assert_eq!(backend.live_allocations(), 0);
    }

    #[test]
    fn transition_failure_discards_only_failed_surface() {
        let backend = HeadlessBackend::new();
        let mut producer = producer(&backend);
        let mut presenter = Recorder::default();
        let surfaces = vec![
            producer.produce_surface(sz(8, 8), None).unwrap(),
            producer.produce_surface(sz(16, 16), None).unwrap(),
        ];

        backend.inject(Fault::Transition, 1);
        let err = producer
            .finish_frame(surfaces, &mut presenter, Instant::now())
            .unwrap_err();
        assert!(matches!(err, FrameError::Transition { failed: 1, total: 2 }));
        assert_eq!(presenter.seen.len(), 1);
        assert_eq!(presenter.seen[0].1, sz(16, 16));
        assert_eq!(producer.pool().pending_count(), 1);
        assert_eq!(backend.live_allocations(), 1);
    }

    #[test]
    fn every_transition_runs_before_the_first_present() {
        let backend = HeadlessBackend::new();
        let mut producer = producer(&backend);
        let surfaces = vec![
            producer.produce_surface(sz(8, 8), None).unwrap(),
            producer.produce_surface(sz(16, 16), None).unwrap(),
            producer.produce_surface(sz(24, 24), None).unwrap(),
        ];

        let mut transitions_seen = Vec::new();
        let mut presenter = |_: PresentedSurface<HeadlessBackend>| {
            transitions_seen.push(backend.transitions());
        };
        producer
            .finish_frame(surfaces, &mut presenter, Instant::now())
            .unwrap();

        assert_eq!(transitions_seen, vec![3, 3, 3]);
        assert_eq!(backend.polls(), 1);
    }

    #[test]
    fn poll_failure_still_presents() {
        let backend = HeadlessBackend::new();
        let mut producer = producer(&backend);
        let mut presenter = Recorder::default();
        let s = producer.produce_surface(sz(8, 8), None).unwrap();

        backend.inject(Fault::Poll, 1);
        let report = producer
            .finish_frame(vec![s], &mut presenter, Instant::now())
            .unwrap();
        assert_eq!(report.presented, 1);
        // Completion is picked up by the next flush instead.
        assert_eq!(presenter.ready_on_arrival, vec![false]);
        assert_eq!(backend.transitions_in_flight(), 1);
    }

    #[test]
    fn retained_key_routes_surface_to_retained() {
        let backend = HeadlessBackend::new();
        let mut producer = producer(&backend);
        let mut presenter = Recorder::default();
        let key = RetainedKey::untransformed(ContentId(7));

        let s = producer.produce_surface(sz(32, 32), Some(key)).unwrap();
        assert_eq!(s.retained_key(), Some(key));
        let report = producer
            .finish_frame(vec![s], &mut presenter, Instant::now())
            .unwrap();
        assert_eq!(report.retained, 1);
        assert!(producer.has_retained(&key));
        assert!(producer.retained(&key).is_some());
    }

    #[test]
    fn idle_tick_shrinks_after_quiet_period() {
        let backend = HeadlessBackend::new();
        let mut producer = producer(&backend);
        let mut presenter = Recorder::default();
        let t0 = Instant::now();

        let big = producer.produce_surface(sz(128, 128), None).unwrap();
        producer.finish_frame(vec![big], &mut presenter, t0).unwrap();
        presenter.release_all();
        producer.dispatch_releases();

        let small = producer.produce_surface(sz(64, 64), None).unwrap();
        producer.finish_frame(vec![small], &mut presenter, t0).unwrap();
        presenter.release_all();
        producer.dispatch_releases();
        assert!(producer.pool().available_surfaces().any(|s| s.is_oversized()));

        assert!(!producer.idle_tick(t0 + DELAY / 2));
        assert!(producer.idle_tick(t0 + DELAY));
        assert!(producer.pool().available_surfaces().all(|s| !s.is_oversized()));
        assert!(!producer.idle_tick(t0 + DELAY * 3));
    }

    #[test]
    fn production_cancels_idle_tick() {
        let backend = HeadlessBackend::new();
        let mut producer = producer(&backend);
        let mut presenter = Recorder::default();
        let t0 = Instant::now();

        let s = producer.produce_surface(sz(8, 8), None).unwrap();
        producer.finish_frame(vec![s], &mut presenter, t0).unwrap();

        let held = producer.produce_surface(sz(8, 8), None).unwrap();
        assert!(!producer.idle_tick(t0 + DELAY));
        producer.finish_frame(vec![held], &mut presenter, t0 + DELAY).unwrap();
        assert!(producer.idle_tick(t0 + DELAY * 2));
    }

    #[test]
    fn empty_frame_still_ages_pool() {
        let backend = HeadlessBackend::new();
        let mut producer = SurfaceProducer::with_limits(
            &backend,
            PoolLimits {
                max_surfaces: 12,
                max_surface_age: 2,
            },
            DELAY,
        );
        let mut presenter = Recorder::default();
        let now = Instant::now();

        let s = producer.produce_surface(sz(8, 8), None).unwrap();
        producer.finish_frame(vec![s], &mut presenter, now).unwrap();
        presenter.release_all();
        producer.dispatch_releases();
        assert_eq!(producer.pool().available_count(), 1);

        producer.finish_frame(Vec::new(), &mut presenter, now).unwrap();
        producer.finish_frame(Vec::new(), &mut presenter, now).unwrap();
        assert_eq!(producer.pool().available_count(), 0);
        assert_eq!(producer.frames(), 3);
    }

    #[test]
    fn best_fit_reuse_is_visible_through_pool() {
        let backend = HeadlessBackend::new();
        let mut producer = producer(&backend);
        let mut presenter = Recorder::default();
        let now = Instant::now();

        let s = producer.produce_surface(sz(100, 100), None).unwrap();
        producer.finish_frame(vec![s], &mut presenter, now).unwrap();
        presenter.release_all();
        producer.dispatch_releases();

        let s = producer.produce_surface(sz(90, 90), None).unwrap();
        assert!(s.is_oversized());
        assert_eq!(producer.stats().reused_best_fit, 1);
        producer.finish_frame(vec![s], &mut presenter, now).unwrap();
    }
}
