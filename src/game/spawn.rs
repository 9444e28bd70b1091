//! Spawn Allocator
//!
//! Picks spawn coordinates uniformly from a fixed pool: the corners and
//! edge midpoints of the play area, all at standing height.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::core::vec3::Vec3;

/// Default spawn pool.
pub const SPAWN_POINTS: [Vec3; 6] = [
    Vec3::new(10.0, 2.0, 10.0),
    Vec3::new(-10.0, 2.0, -10.0),
    Vec3::new(10.0, 2.0, -10.0),
    Vec3::new(-10.0, 2.0, 10.0),
    Vec3::new(0.0, 2.0, 10.0),
    Vec3::new(0.0, 2.0, -10.0),
];

/// Chooses spawn points from a static list.
///
/// Holds no mutable state, so a shared reference can be used from any task.
#[derive(Clone, Copy, Debug)]
pub struct SpawnAllocator {
    points: &'static [Vec3],
}

impl Default for SpawnAllocator {
    fn default() -> Self {
        Self::new(&SPAWN_POINTS)
    }
}

impl SpawnAllocator {
    /// Create an allocator over a custom pool.
    ///
    /// An empty pool falls back to the default one.
    pub fn new(points: &'static [Vec3]) -> Self {
        if points.is_empty() {
            return Self { points: &SPAWN_POINTS };
        }
        Self { points }
    }

    /// The spawn pool.
    pub fn points(&self) -> &'static [Vec3] {
        self.points
    }

    /// Is `position` one of the pool's coordinates?
    pub fn contains(&self, position: Vec3) -> bool {
        self.points.contains(&position)
    }

    /// Next spawn point using the thread-local RNG.
    pub fn next_spawn_point(&self) -> Vec3 {
        self.next_spawn_point_with(&mut rand::thread_rng())
    }

    /// Next spawn point drawn from a caller-supplied RNG.
    pub fn next_spawn_point_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec3 {
        // Pool is never empty
        *self.points.choose(rng).unwrap_or(&SPAWN_POINTS[0])
    }
}
