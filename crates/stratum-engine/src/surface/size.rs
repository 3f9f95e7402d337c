use core::fmt;

/// Number of sizes remembered per surface for stability detection.
pub const SIZE_HISTORY_LEN: usize = 4;

/// Pixel extent of a surface (physical pixels).
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub const ZERO: Self = Self::new(0, 0);

    #[inline]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Returns `true` when `other` fits inside `self` on both axes.
    #[inline]
    pub const fn contains(self, other: SurfaceSize) -> bool {
        other.width <= self.width && other.height <= self.height
    }
}

impl fmt::Display for SurfaceSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Fixed-length ring of the sizes a surface held at its last aging passes.
#[derive(Debug, Clone)]
pub(crate) struct SizeHistory {
    entries: [SurfaceSize; SIZE_HISTORY_LEN],
    cursor: usize,
}

impl SizeHistory {
    pub(crate) fn new() -> Self {
        Self {
            entries: [SurfaceSize::ZERO; SIZE_HISTORY_LEN],
            cursor: 0,
        }
    }

    pub(crate) fn record(&mut self, size: SurfaceSize) {
        self.entries[self.cursor] = size;
        self.cursor = (self.cursor + 1) % SIZE_HISTORY_LEN;
    }

    /// `true` once every slot holds the same size.
    ///
    /// Slots start out zero-sized, so a fresh ring never reports stable.
    pub(crate) fn is_stable(&self) -> bool {
        let first = self.entries[0];
        !first.is_empty() && self.entries.iter().all(|s| *s == first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_checks_both_axes() {
        let big = SurfaceSize::new(128, 64);
        assert!(big.contains(SurfaceSize::new(128, 64)));
        assert!(big.contains(SurfaceSize::new(10, 10)));
        assert!(!big.contains(SurfaceSize::new(129, 1)));
        assert!(!big.contains(SurfaceSize::new(1, 65)));
    }

    #[test]
    fn display_is_width_by_height() {
        assert_eq!(SurfaceSize::new(640, 480).to_string(), "640x480");
    }

    #[test]
    fn fresh_history_is_not_stable() {
        assert!(!SizeHistory::new().is_stable());
    }

    #[test]
    fn history_becomes_stable_after_full_ring() {
        let mut h = SizeHistory::new();
        let s = SurfaceSize::new(32, 32);
        for _ in 0..SIZE_HISTORY_LEN - 1 {
            h.record(s);
            assert!(!h.is_stable());
        }
        h.record(s);
        assert!(h.is_stable());
    }

    #[test]
    fn one_odd_entry_breaks_stability() {
        let mut h = SizeHistory::new();
        for _ in 0..SIZE_HISTORY_LEN {
            h.record(SurfaceSize::new(32, 32));
        }
        h.record(SurfaceSize::new(64, 32));
        assert!(!h.is_stable());

        // The odd entry rotates out after another full lap.
        for _ in 0..SIZE_HISTORY_LEN {
            h.record(SurfaceSize::new(32, 32));
        }
        assert!(h.is_stable());
    }
}
