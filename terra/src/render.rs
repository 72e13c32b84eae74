//! Boundary with the render collaborator: slot buffers, instanced draws and the
//! block atlas.

use glam::Vec2;

use crate::block::BlockKind;


/// Maximum number of animation frames of a block.
pub const MAX_ANIMATION_LENGTH: usize = 30;


/// Opaque handle of a slot's per-instance buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotHandle(pub u32);

/// Opaque handle of a backend mesh buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshHandle(pub u32);

/// Opaque handle of a backend texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);


/// The quad mesh shared by every slot, each block instance is one quad.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuadMesh {
    pub vertices: MeshHandle,
    pub indices: MeshHandle,
}


/// Render information of a block kind.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockRenderInfo {
    pub texture: TextureHandle,
    /// Size of the whole texture, in pixels.
    pub texture_size: Vec2,
    /// Size of a single tile of the texture, in pixels.
    pub tile_size: Vec2,
    /// Offset of each animation frame's tile in the texture, in tiles.
    pub uv_offsets: [Vec2; MAX_ANIMATION_LENGTH],
}

impl BlockRenderInfo {

    /// Scale applied to the quad UVs to cover a single tile.
    #[inline]
    pub fn uv_scale(&self) -> Vec2 {
        self.tile_size / self.texture_size
    }

}


/// Render information of every block kind, air has none.
#[derive(Debug, Clone, Default)]
pub struct BlockAtlas {
    infos: [Option<BlockRenderInfo>; BlockKind::COUNT],
}

impl BlockAtlas {

    pub fn new() -> Self {
        Self::default()
    }

    /// Build the atlas of a single sheet texture where each block kind uses one row
    /// of tiles, the first tile of the row being the first animation frame.
    pub fn from_sheet(texture: TextureHandle, texture_size: Vec2, tile_size: Vec2) -> Self {
        let mut atlas = Self::new();
        for kind in BlockKind::ALL {
            if kind.is_air() {
                continue;
            }
            let row = (kind.id() - 1) as f32;
            atlas.set(kind, BlockRenderInfo {
                texture,
                texture_size,
                tile_size,
                uv_offsets: std::array::from_fn(|frame| Vec2::new(frame as f32, row)),
            });
        }
        atlas
    }

    pub fn set(&mut self, kind: BlockKind, info: BlockRenderInfo) {
        self.infos[kind.index()] = Some(info);
    }

    #[inline]
    pub fn get(&self, kind: BlockKind) -> Option<&BlockRenderInfo> {
        self.infos[kind.index()].as_ref()
    }

}


/// A render backend, owning the slots' instance buffers and issuing draws.
pub trait RenderBackend {

    /// Create the instance buffers of a slot, able to hold the given number of block
    /// instances, every instance uses the given quad mesh.
    fn create_slot(&mut self, mesh: QuadMesh, capacity: usize) -> SlotHandle;

    /// Replace the instance data of a slot, both slices have the same length.
    fn write_slot(&mut self, slot: SlotHandle, positions: &[Vec2], frames: &[u32]);

    /// Clear the instance data of a slot.
    fn clear_slot(&mut self, slot: SlotHandle);

    fn destroy_slot(&mut self, slot: SlotHandle);

    /// Draw a range of instances of a slot with the given block's texture.
    fn draw_instanced(&mut self, slot: SlotHandle, info: &BlockRenderInfo, instance_count: u32, base_instance: u32);

}


/// A draw recorded by the headless backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCall {
    pub slot: SlotHandle,
    pub texture: TextureHandle,
    pub instance_count: u32,
    pub base_instance: u32,
}

/// Instance buffers of the headless backend.
#[derive(Debug, Clone, Default)]
pub struct HeadlessSlot {
    pub capacity: usize,
    pub positions: Vec<Vec2>,
    pub frames: Vec<u32>,
    /// Number of writes to this slot.
    pub writes: usize,
}

/// A render backend keeping instance data in memory and recording draws instead of
/// issuing them, used when no display is available.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    slots: Vec<Option<HeadlessSlot>>,
    draws: Vec<DrawCall>,
}

impl HeadlessBackend {

    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn slot(&self, slot: SlotHandle) -> Option<&HeadlessSlot> {
        self.slots.get(slot.0 as usize)?.as_ref()
    }

    /// Number of slots currently alive.
    pub fn slot_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Draws recorded since the last call.
    pub fn take_draws(&mut self) -> Vec<DrawCall> {
        std::mem::take(&mut self.draws)
    }

    fn slot_mut(&mut self, slot: SlotHandle) -> Option<&mut HeadlessSlot> {
        self.slots.get_mut(slot.0 as usize)?.as_mut()
    }

}

impl RenderBackend for HeadlessBackend {

    fn create_slot(&mut self, _mesh: QuadMesh, capacity: usize) -> SlotHandle {
        let handle = SlotHandle(self.slots.len() as u32);
        self.slots.push(Some(HeadlessSlot {
            capacity,
            ..HeadlessSlot::default()
        }));
        handle
    }

    fn write_slot(&mut self, slot: SlotHandle, positions: &[Vec2], frames: &[u32]) {
        if let Some(slot) = self.slot_mut(slot) {
            debug_assert!(positions.len() <= slot.capacity);
            slot.positions.clear();
            slot.positions.extend_from_slice(positions);
            slot.frames.clear();
            slot.frames.extend_from_slice(frames);
            slot.writes += 1;
        }
    }

    fn clear_slot(&mut self, slot: SlotHandle) {
        if let Some(slot) = self.slot_mut(slot) {
            slot.positions.clear();
            slot.frames.clear();
        }
    }

    fn destroy_slot(&mut self, slot: SlotHandle) {
        if let Some(slot) = self.slots.get_mut(slot.0 as usize) {
            *slot = None;
        }
    }

    fn draw_instanced(&mut self, slot: SlotHandle, info: &BlockRenderInfo, instance_count: u32, base_instance: u32) {
        self.draws.push(DrawCall {
            slot,
            texture: info.texture,
            instance_count,
            base_instance,
        });
    }

}


#[cfg(test)]
mod tests {

    use super::*;

    const MESH: QuadMesh = QuadMesh { vertices: MeshHandle(0), indices: MeshHandle(1) };

    #[test]
    fn sheet_atlas() {
        let atlas = BlockAtlas::from_sheet(TextureHandle(3), Vec2::new(480.0, 96.0), Vec2::splat(16.0));
        assert!(atlas.get(BlockKind::Air).is_none());
        let grass = atlas.get(BlockKind::Grass).unwrap();
        assert_eq!(grass.texture, TextureHandle(3));
        assert_eq!(grass.uv_offsets[3], Vec2::new(3.0, 1.0));
        assert_eq!(grass.uv_scale(), Vec2::new(16.0 / 480.0, 16.0 / 96.0));
        assert_eq!(atlas.get(BlockKind::Leaf).unwrap().uv_offsets[0], Vec2::new(0.0, 5.0));
    }

    #[test]
    fn headless_slots() {
        let mut backend = HeadlessBackend::new();
        let a = backend.create_slot(MESH, 4);
        let b = backend.create_slot(MESH, 4);
        assert_ne!(a, b);
        backend.write_slot(a, &[Vec2::ZERO, Vec2::ONE], &[0, 3]);
        assert_eq!(backend.slot(a).unwrap().positions.len(), 2);
        assert_eq!(backend.slot(a).unwrap().writes, 1);
        backend.clear_slot(a);
        assert!(backend.slot(a).unwrap().positions.is_empty());
        backend.destroy_slot(b);
        assert!(backend.slot(b).is_none());
        assert_eq!(backend.slot_count(), 1);
    }

}
