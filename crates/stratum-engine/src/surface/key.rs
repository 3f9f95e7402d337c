use core::fmt;

/// Stable identity of a piece of painted content (e.g. a layer or subtree).
///
/// `ContentId(0)` is reserved for "no identity" and never retains a surface.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ContentId(pub u64);

impl ContentId {
    pub const NONE: Self = Self(0);
}

/// Cache key for retained surfaces: content identity plus the 2D affine
/// transform the content was rasterized under.
///
/// The transform is stored as raw bit patterns so the key can be hashed.
/// Two keys match only when every transform component is bit-identical
/// (after folding `-0.0` into `0.0`).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct RetainedKey {
    content: ContentId,
    transform: [u32; 6],
}

impl RetainedKey {
    /// Affine transform `[a, b, c, d, tx, ty]` of the identity matrix.
    pub const IDENTITY: [f32; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

    pub fn new(content: ContentId, transform: [f32; 6]) -> Self {
        // `+ 0.0` turns negative zero into positive zero.
        let transform = transform.map(|v| (v + 0.0).to_bits());
        Self { content, transform }
    }

    #[inline]
    pub fn untransformed(content: ContentId) -> Self {
        Self::new(content, Self::IDENTITY)
    }

    #[inline]
    pub fn content(&self) -> ContentId {
        self.content
    }

    pub fn transform(&self) -> [f32; 6] {
        self.transform.map(f32::from_bits)
    }

    /// A trivial key carries no content identity and is treated as absent.
    #[inline]
    pub fn is_trivial(&self) -> bool {
        self.content == ContentId::NONE
    }
}

impl fmt::Display for RetainedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, tx, ty] = self.transform();
        write!(
            f,
            "content#{} [{a} {b} {c} {d} {tx} {ty}]",
            self.content.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_zero_matches_positive_zero() {
        let a = RetainedKey::new(ContentId(7), [1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
        let b = RetainedKey::new(ContentId(7), [1.0, -0.0, 0.0, 1.0, -0.0, 0.0]);
        assert_eq!(a, b);
    }

    #[test]
    fn transform_is_part_of_identity() {
        let a = RetainedKey::untransformed(ContentId(7));
        let b = RetainedKey::new(ContentId(7), [2.0, 0.0, 0.0, 2.0, 0.0, 0.0]);
        assert_ne!(a, b);
        assert_eq!(b.transform()[0], 2.0);
    }

    #[test]
    fn zero_content_is_trivial() {
        assert!(RetainedKey::untransformed(ContentId::NONE).is_trivial());
        assert!(!RetainedKey::untransformed(ContentId(1)).is_trivial());
    }
}
