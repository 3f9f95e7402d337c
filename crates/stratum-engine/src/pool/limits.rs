/// Maximum number of surfaces kept in the available list.
pub const MAX_SURFACES: usize = 12;

/// Aging passes an available surface survives before it is discarded.
pub const MAX_SURFACE_AGE: u32 = 3;

/// Capacity and eviction bounds of a [`SurfacePool`](super::SurfacePool).
///
/// Production code uses [`PoolLimits::default`], built from the constants
/// above.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PoolLimits {
    pub max_surfaces: usize,
    pub max_surface_age: u32,
}

impl Default for PoolLimits {
    fn default() -> Self {
        Self {
            max_surfaces: MAX_SURFACES,
            max_surface_age: MAX_SURFACE_AGE,
        }
    }
}
