//! The render window, a square ring of render slots following the camera. Each slot
//! is bound to the chunk at its position in the ring and holds its block instances
//! once the chunk is fully loaded.

use std::sync::Arc;

use glam::{IVec2, Vec2};

use tracing::{debug, trace};

use crate::block::BlockKind;
use crate::camera::CameraView;
use crate::chunk::{Chunk, ChunkPos};
use crate::config::TerrainConfig;
use crate::render::{BlockAtlas, QuadMesh, RenderBackend, SlotHandle};
use crate::store::{ChunkRange, ChunkStore};
use crate::util::Direction;


/// A render slot of the window.
#[derive(Debug, Clone)]
pub struct RenderSlot {
    handle: SlotHandle,
    /// Position of the chunk bound to this slot.
    chunk: Option<ChunkPos>,
    /// Block counts of the last data written to the slot, none if nothing written.
    counts: Option<[u32; BlockKind::COUNT]>,
}

impl RenderSlot {

    #[inline]
    pub fn handle(&self) -> SlotHandle {
        self.handle
    }

    #[inline]
    pub fn chunk(&self) -> Option<ChunkPos> {
        self.chunk
    }

}


/// The ring of render slots, slot `col + row * side` is bound to the chunk at
/// `origin + (col, row)`, rows going upward.
pub struct ChunkWindow {
    /// Number of slots on each side of the ring.
    side: usize,
    slots: Vec<RenderSlot>,
    /// Position of the chunk bound to the bottom left slot.
    origin: ChunkPos,
    view_distance: i32,
    chunk_world_size: f32,
    reassign_buffer: f32,
    world_half_height: f32,
    generation_radius: i32,
    unload_radius: i32,
    /// Reused instance buffers.
    positions: Vec<Vec2>,
    frames: Vec<u32>,
}

impl ChunkWindow {

    /// Create the window and the buffers of every slot, no chunk is bound until
    /// [`Self::init`] is called.
    pub fn new(config: &TerrainConfig, mesh: QuadMesh, backend: &mut dyn RenderBackend) -> Self {

        let side = config.window_side();
        let capacity = config.chunk_size * config.chunk_size;

        Self {
            side,
            slots: (0..side * side)
                .map(|_| RenderSlot {
                    handle: backend.create_slot(mesh, capacity),
                    chunk: None,
                    counts: None,
                })
                .collect(),
            origin: IVec2::ZERO,
            view_distance: config.view_distance as i32,
            chunk_world_size: config.chunk_world_size() as f32,
            reassign_buffer: config.reassign_buffer,
            world_half_height: config.world_half_height(),
            generation_radius: config.generation_radius,
            unload_radius: config.unload_radius,
            positions: Vec::with_capacity(capacity),
            frames: Vec::with_capacity(capacity),
        }

    }

    #[inline]
    pub fn side(&self) -> usize {
        self.side
    }

    #[inline]
    pub fn origin(&self) -> ChunkPos {
        self.origin
    }

    #[inline]
    pub fn slots(&self) -> &[RenderSlot] {
        &self.slots
    }

    /// Get the index of the slot bound to the given chunk position, if in the ring.
    pub fn slot_index(&self, pos: ChunkPos) -> Option<usize> {
        let local = pos - self.origin;
        let side = self.side as i32;
        if local.x >= 0 && local.y >= 0 && local.x < side && local.y < side {
            Some(local.x as usize + local.y as usize * self.side)
        } else {
            None
        }
    }

    #[inline]
    fn ring_pos(&self, index: usize) -> ChunkPos {
        self.origin + IVec2::new((index % self.side) as i32, (index / self.side) as i32)
    }

    /// Bind every slot around the given world position, creating missing chunks. The
    /// position of every created chunk is returned.
    pub fn init(&mut self, pos: Vec2, store: &ChunkStore, backend: &mut dyn RenderBackend) -> Vec<ChunkPos> {

        self.unbind_all(store, backend);

        let center = (pos / self.chunk_world_size).floor().as_ivec2();
        self.origin = center - IVec2::splat(self.view_distance / 2);
        debug!("window initialized at {}", self.origin);

        self.bind_ring(store, backend)

    }

    /// Unbind every slot and clear its buffers.
    pub fn unbind_all(&mut self, store: &ChunkStore, backend: &mut dyn RenderBackend) {
        for index in 0..self.slots.len() {
            self.unbind(index, store, backend);
        }
    }

    /// Bind every slot to its ring position, getting or creating chunks.
    fn bind_ring(&mut self, store: &ChunkStore, backend: &mut dyn RenderBackend) -> Vec<ChunkPos> {
        let mut created = Vec::new();
        for index in 0..self.slots.len() {
            let (chunk, new) = store.get_or_create(self.ring_pos(index));
            if new {
                created.push(chunk.pos());
            }
            self.bind(index, &chunk, backend);
        }
        created
    }

    fn bind(&mut self, index: usize, chunk: &Chunk, backend: &mut dyn RenderBackend) {
        chunk.set_slot(Some(index));
        self.slots[index].chunk = Some(chunk.pos());
        if chunk.is_fully_loaded() {
            self.write_slot(index, chunk, backend);
        } else {
            self.clear_slot(index, backend);
        }
    }

    fn unbind(&mut self, index: usize, store: &ChunkStore, backend: &mut dyn RenderBackend) {
        if let Some(pos) = self.slots[index].chunk.take() {
            if let Some(chunk) = store.get(pos) {
                if chunk.slot() == Some(index) {
                    chunk.set_slot(None);
                }
            }
            self.clear_slot(index, backend);
        }
    }

    fn write_slot(&mut self, index: usize, chunk: &Chunk, backend: &mut dyn RenderBackend) {
        // A neighbor's worm may have carved the chunk since its last sort.
        let mut data = chunk.lock();
        data.sort_order();
        data.write_instances(&mut self.positions, &mut self.frames);
        let slot = &mut self.slots[index];
        slot.counts = Some(*data.counts());
        drop(data);
        backend.write_slot(slot.handle, &self.positions, &self.frames);
    }

    fn clear_slot(&mut self, index: usize, backend: &mut dyn RenderBackend) {
        let slot = &mut self.slots[index];
        if slot.counts.take().is_some() {
            backend.clear_slot(slot.handle);
        }
    }

    /// Shift the ring by one chunk in the given direction. Chunks leaving the ring are
    /// unbound, chunks staying are rebound to their new slot and chunks entering are
    /// created if missing. The position of every created chunk is returned.
    pub fn shift(&mut self, dir: Direction, store: &ChunkStore, backend: &mut dyn RenderBackend) -> Vec<ChunkPos> {

        let delta = dir.delta();
        let new_origin = self.origin + delta;
        trace!("shift window {dir:?} to {new_origin}");

        // Unbind the trailing edge.
        for index in 0..self.slots.len() {
            let pos = self.ring_pos(index);
            let local = pos - new_origin;
            let side = self.side as i32;
            if local.x < 0 || local.y < 0 || local.x >= side || local.y >= side {
                self.unbind(index, store, backend);
            }
        }

        self.origin = new_origin;
        self.bind_ring(store, backend)

    }

    /// Shift the ring if the camera gets close to one of its edges. The vertical
    /// shifts are limited by the world height.
    pub fn follow(&mut self, camera: &CameraView, store: &ChunkStore, backend: &mut dyn RenderBackend) -> Vec<ChunkPos> {

        let mut created = Vec::new();
        let ring_size = self.chunk_world_size * self.side as f32;
        let buffer = self.reassign_buffer;
        let cam_min = camera.min();
        let cam_max = camera.max();

        if cam_max.x + buffer >= self.world_origin().x + ring_size {
            created.extend(self.shift(Direction::Right, store, backend));
        }

        if cam_min.x - buffer <= self.world_origin().x {
            created.extend(self.shift(Direction::Left, store, backend));
        }

        if cam_max.y + buffer >= self.world_origin().y + ring_size && cam_max.y <= self.world_half_height {
            created.extend(self.shift(Direction::Up, store, backend));
        }

        if cam_min.y - buffer <= self.world_origin().y && cam_min.y >= -self.world_half_height {
            created.extend(self.shift(Direction::Down, store, backend));
        }

        created

    }

    /// World position of the bottom left corner of the ring.
    #[inline]
    pub fn world_origin(&self) -> Vec2 {
        self.origin.as_vec2() * self.chunk_world_size
    }

    /// Create every missing chunk in the generation radius around the camera chunk,
    /// returning their positions.
    pub fn pregenerate(&self, camera: &CameraView, store: &ChunkStore) -> Vec<ChunkPos> {
        let center = (camera.pos / self.chunk_world_size).floor().as_ivec2();
        ChunkRange::around(center, self.generation_radius)
            .filter_map(|pos| {
                let (_, created) = store.get_or_create(pos);
                created.then_some(pos)
            })
            .collect()
    }

    /// Unload every fully loaded chunk that is entirely beyond the unload distance of
    /// the viewport and that no generation task is using. Returns the number of chunks
    /// unloaded.
    pub fn sweep(&mut self, camera: &CameraView, store: &ChunkStore, backend: &mut dyn RenderBackend) -> usize {

        let margin = Vec2::splat(self.unload_radius as f32 * self.chunk_world_size);
        let min = camera.min() - margin;
        let max = camera.max() + margin;
        let size = self.chunk_world_size;

        let removed = store.remove_if(|chunk| {
            // Any other strong reference is held by a generation task.
            if !chunk.is_fully_loaded() || Arc::strong_count(chunk) > 1 {
                return false;
            }
            let chunk_min = chunk.pos().as_vec2() * size;
            let chunk_max = chunk_min + size;
            chunk_max.x < min.x || chunk_min.x > max.x || chunk_max.y < min.y || chunk_min.y > max.y
        });

        for chunk in &removed {
            if let Some(index) = chunk.slot() {
                if self.slots[index].chunk == Some(chunk.pos()) {
                    self.slots[index].chunk = None;
                    self.clear_slot(index, backend);
                }
            }
        }

        if !removed.is_empty() {
            debug!("unloaded {} chunks", removed.len());
        }

        removed.len()

    }

    /// Write the data of a chunk to its slot if it's bound and fully loaded.
    pub fn push(&mut self, pos: ChunkPos, store: &ChunkStore, backend: &mut dyn RenderBackend) -> bool {

        let Some(chunk) = store.get(pos) else { return false };
        let Some(index) = chunk.slot() else { return false };

        if self.slots[index].chunk != Some(pos) || !chunk.is_fully_loaded() {
            return false;
        }

        self.write_slot(index, &chunk, backend);
        true

    }

    /// Issue the draws of every written slot, one instanced draw for each non-air
    /// block kind present.
    pub fn draw(&self, atlas: &BlockAtlas, backend: &mut dyn RenderBackend) {
        for slot in &self.slots {

            let Some(counts) = slot.counts else { continue };

            // Blocks are sorted by kind, so each kind's instances follow the ones of
            // every lower kind.
            let mut base = counts[BlockKind::Air.index()];
            for kind in &BlockKind::ALL[1..] {
                let count = counts[kind.index()];
                if count != 0 {
                    if let Some(info) = atlas.get(*kind) {
                        backend.draw_instanced(slot.handle, info, count, base);
                    }
                }
                base += count;
            }

        }
    }

    /// Destroy the buffers of every slot, the window can't be used afterward.
    pub fn release(&mut self, store: &ChunkStore, backend: &mut dyn RenderBackend) {
        self.unbind_all(store, backend);
        for slot in self.slots.drain(..) {
            backend.destroy_slot(slot.handle);
        }
    }

}
