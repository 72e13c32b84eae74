//! Boundary with the physics collaborator.

use glam::Vec2;

use crate::chunk::ChunkPos;


/// World rectangle covered by a chunk, given to the physics collaborator when the
/// chunk is created.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkBounds {
    pub pos: ChunkPos,
    /// Bottom left corner, in pixels.
    pub min: Vec2,
    /// Top right corner, in pixels.
    pub max: Vec2,
}

impl ChunkBounds {

    /// Bounds of the chunk at the given position, the world size is the side of a
    /// chunk in pixels.
    #[inline]
    pub fn of(pos: ChunkPos, world_size: f32) -> Self {
        let min = pos.as_vec2() * world_size;
        Self { pos, min, max: min + world_size }
    }

    #[inline]
    pub fn size(&self) -> Vec2 {
        self.max - self.min
    }

    #[inline]
    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    /// Return true if this rectangle intersects the given one.
    #[inline]
    pub fn intersects(&self, min: Vec2, max: Vec2) -> bool {
        self.min.x < max.x && self.max.x > min.x && self.min.y < max.y && self.max.y > min.y
    }

}


/// A collaborator notified of every chunk created, typically to create its static
/// collider. Chunks may be created from generation tasks, so the sink is shared.
pub trait ColliderSink: Send + Sync {

    fn chunk_created(&self, bounds: ChunkBounds);

}

/// No physics.
impl ColliderSink for () {
    fn chunk_created(&self, _bounds: ChunkBounds) {}
}
