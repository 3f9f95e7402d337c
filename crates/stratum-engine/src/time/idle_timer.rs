use std::time::{Duration, Instant};

/// Quiet period before unused allocations are shrunk: ten frames at 60 Hz.
pub const IDLE_SHRINK_DELAY: Duration = Duration::from_nanos(10 * 1_000_000_000 / 60);

/// One-shot deadline tagged with a generation counter.
///
/// A scheduled tick fires only when its deadline has passed and the
/// generation it was scheduled under is still current. Bumping the
/// generation (e.g. on every produced surface) cancels a pending tick
/// without touching the timer.
#[derive(Debug, Clone)]
pub struct IdleTimer {
    delay: Duration,
    pending: Option<(Instant, u64)>,
}

impl IdleTimer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    #[inline]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Arms a tick at `now + delay` for `generation`.
    ///
    /// A tick already pending for the same generation keeps its earlier
    /// deadline; one pending for an older generation is replaced.
    pub fn schedule(&mut self, now: Instant, generation: u64) {
        match self.pending {
            Some((_, pending)) if pending == generation => {}
            _ => self.pending = Some((now + self.delay, generation)),
        }
    }

    /// Consumes the pending tick if it is due.
    ///
    /// Returns `true` when the deadline passed and `generation` matches the
    /// one the tick was scheduled under. A stale tick is discarded.
    pub fn poll(&mut self, now: Instant, generation: u64) -> bool {
        let Some((deadline, scheduled)) = self.pending else {
            return false;
        };
        if now < deadline {
            return false;
        }

        self.pending = None;
        scheduled == generation
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl Default for IdleTimer {
    fn default() -> Self {
        Self::new(IDLE_SHRINK_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_millis(100);

    #[test]
    fn default_delay_is_ten_frames() {
        let d = IdleTimer::default().delay();
        assert!(d > Duration::from_millis(166) && d < Duration::from_millis(167));
    }

    #[test]
    fn fires_after_deadline_once() {
        let t0 = Instant::now();
        let mut timer = IdleTimer::new(DELAY);
        timer.schedule(t0, 1);

        assert!(!timer.poll(t0 + Duration::from_millis(99), 1));
        assert!(timer.poll(t0 + DELAY, 1));
        assert!(!timer.poll(t0 + DELAY * 2, 1));
        assert!(!timer.is_pending());
    }

    #[test]
    fn stale_generation_is_discarded() {
        let t0 = Instant::now();
        let mut timer = IdleTimer::new(DELAY);
        timer.schedule(t0, 1);

        assert!(!timer.poll(t0 + DELAY, 2));
        assert!(!timer.is_pending());
    }

    #[test]
    fn same_generation_keeps_earliest_deadline() {
        let t0 = Instant::now();
        let mut timer = IdleTimer::new(DELAY);
        timer.schedule(t0, 3);
        timer.schedule(t0 + Duration::from_millis(50), 3);
        assert!(timer.poll(t0 + DELAY, 3));
    }

    #[test]
    fn new_generation_pushes_deadline_out() {
        let t0 = Instant::now();
        let mut timer = IdleTimer::new(DELAY);
        timer.schedule(t0, 1);
        timer.schedule(t0 + Duration::from_millis(50), 2);

        assert!(!timer.poll(t0 + DELAY, 2));
        assert!(timer.poll(t0 + Duration::from_millis(150), 2));
    }
}
