use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A binary, resettable completion signal.
///
/// Clones share state. The handle is `Send + Sync` so GPU completion
/// callbacks running on a driver thread may assert it; observation always
/// happens on the thread that owns the pool.
#[derive(Debug, Clone, Default)]
pub struct SyncSignal {
    state: Arc<AtomicBool>,
}

impl SyncSignal {
    /// Creates an unsignaled handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Asserts the signal. Idempotent.
    pub fn signal(&self) {
        self.state.store(true, Ordering::Release);
    }

    /// Non-blocking query.
    pub fn is_signaled(&self) -> bool {
        self.state.load(Ordering::Acquire)
    }

    /// Returns the handle to the unsignaled state for a new round.
    pub fn reset(&self) {
        self.state.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let a = SyncSignal::new();
        let b = a.clone();
        assert!(!b.is_signaled());
        a.signal();
        assert!(b.is_signaled());
    }

    #[test]
    fn reset_rearms() {
        let s = SyncSignal::new();
        s.signal();
        s.reset();
        assert!(!s.is_signaled());
    }

    #[test]
    fn can_be_signaled_from_another_thread() {
        let s = SyncSignal::new();
        let remote = s.clone();
        std::thread::spawn(move || remote.signal())
            .join()
            .expect("signal thread panicked");
        assert!(s.is_signaled());
    }
}
