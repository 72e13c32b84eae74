//! A chunk storing a square of blocks, shared between the tick thread and the
//! generation tasks.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use glam::{IVec2, Vec2};

use crate::block::{Block, BlockKind};
use crate::worldgen::GenError;


/// Position of a chunk in chunk coordinates.
pub type ChunkPos = IVec2;

/// Slot value stored in the atomic when the chunk is not bound to a render slot.
const NO_SLOT: usize = usize::MAX;


/// Classification of a chunk computed by the first generation stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChunkKind {
    /// Every block of the chunk is air.
    #[default]
    Air,
    /// The chunk is crossed by the surface, or above it without being only air.
    Surface,
    /// The chunk is fully below the world origin.
    Underground,
}


/// Lifecycle stage of a chunk, stages only go forward except when a failed stage is
/// rolled back for a retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ChunkStage {
    Empty = 0,
    Generating = 1,
    Generated = 2,
    PostGenerating = 3,
    FullyLoaded = 4,
    /// The terrain couldn't be generated, terminal.
    Failed = 5,
    /// The terrain is generated but post generation couldn't complete, terminal. The
    /// chunk's blocks remain valid for neighbors.
    PostFailed = 6,
}

impl ChunkStage {

    #[inline]
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Empty,
            1 => Self::Generating,
            2 => Self::Generated,
            3 => Self::PostGenerating,
            4 => Self::FullyLoaded,
            6 => Self::PostFailed,
            _ => Self::Failed,
        }
    }

    /// Return true if the first generation stage has completed for that chunk.
    #[inline]
    pub fn is_generated(self) -> bool {
        matches!(self, Self::Generated | Self::PostGenerating | Self::FullyLoaded | Self::PostFailed)
    }

}


/// Block storage of a chunk, blocks are stored row by row from the bottom row, the
/// per-kind counts always sum to the number of blocks.
#[derive(Debug, Clone)]
pub struct ChunkData {
    /// Number of blocks on each side.
    size: usize,
    blocks: Box<[Block]>,
    counts: [u32; BlockKind::COUNT],
    /// Permutation of block indices in render order, grouped by kind.
    order: Box<[u32]>,
    pub kind: ChunkKind,
    /// True when this chunk spawns a cave worm on post generation.
    pub worm_head: bool,
}

impl ChunkData {

    /// Create a chunk data of the given side full of air, the origin is the world
    /// position of the bottom left block and the block size is in pixels.
    pub fn new(size: usize, origin: Vec2, block_size: f32) -> Self {

        let len = size * size;
        let blocks = (0..len)
            .map(|index| Block {
                kind: BlockKind::Air,
                pos: origin + Vec2::new((index % size) as f32, (index / size) as f32) * block_size,
                frame: 0,
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        let mut counts = [0; BlockKind::COUNT];
        counts[BlockKind::Air.index()] = len as u32;

        Self {
            size,
            blocks,
            counts,
            order: (0..len as u32).collect::<Vec<_>>().into_boxed_slice(),
            kind: ChunkKind::Air,
            worm_head: false,
        }

    }

    /// Number of blocks on each side of the chunk.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    fn index(&self, local: IVec2) -> Option<usize> {
        let size = self.size as i32;
        if local.x >= 0 && local.y >= 0 && local.x < size && local.y < size {
            Some(local.x as usize + local.y as usize * self.size)
        } else {
            None
        }
    }

    #[inline]
    pub fn contains(&self, local: IVec2) -> bool {
        self.index(local).is_some()
    }

    /// Get the block at the given chunk-local position.
    #[inline]
    pub fn block(&self, local: IVec2) -> Option<&Block> {
        self.index(local).map(|index| &self.blocks[index])
    }

    /// Get the block kind at the given chunk-local position.
    #[inline]
    pub fn kind_at(&self, local: IVec2) -> Option<BlockKind> {
        self.block(local).map(|block| block.kind)
    }

    /// Set the kind and animation frame of the block at the given chunk-local
    /// position, keeping the counts up to date. The previous kind is returned, or
    /// none if the position is out of the chunk.
    pub fn set_block(&mut self, local: IVec2, kind: BlockKind, frame: u32) -> Option<BlockKind> {
        let index = self.index(local)?;
        let block = &mut self.blocks[index];
        let prev = block.kind;
        block.kind = kind;
        block.frame = frame;
        self.counts[prev.index()] -= 1;
        self.counts[kind.index()] += 1;
        Some(prev)
    }

    #[inline]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    #[inline]
    pub fn counts(&self) -> &[u32; BlockKind::COUNT] {
        &self.counts
    }

    #[inline]
    pub fn count(&self, kind: BlockKind) -> u32 {
        self.counts[kind.index()]
    }

    /// Return true if every block of the chunk is air.
    #[inline]
    pub fn is_all_air(&self) -> bool {
        self.count(BlockKind::Air) as usize == self.blocks.len()
    }

    /// Block indices in render order.
    #[inline]
    pub fn order(&self) -> &[u32] {
        &self.order
    }

    /// Sort the render order of blocks by their kind.
    pub fn sort_order(&mut self) {
        sort_block_indices(&self.blocks, &mut self.order);
    }

    /// Fill the given buffers with positions and frames of blocks in render order.
    pub fn write_instances(&self, positions: &mut Vec<Vec2>, frames: &mut Vec<u32>) {
        positions.clear();
        frames.clear();
        for &index in &self.order[..] {
            let block = &self.blocks[index as usize];
            positions.push(block.pos);
            frames.push(block.frame);
        }
    }

}


/// Stable sort of a permutation of block indices by the kind of the indexed block,
/// indices of blocks of the same kind keep their relative order.
pub fn sort_block_indices(blocks: &[Block], order: &mut [u32]) {
    order.sort_by_key(|&index| blocks[index as usize].kind);
}


/// A chunk of the world, shared behind an `Arc` by the store, the render window and
/// any generation task working on it.
#[derive(Debug)]
pub struct Chunk {
    pos: ChunkPos,
    data: Mutex<ChunkData>,
    /// Broadcast once the first generation stage completes, or on permanent failure.
    generated: Condvar,
    stage: AtomicU8,
    slot: AtomicUsize,
    /// Number of failed generation attempts.
    failures: AtomicU8,
}

impl Chunk {

    /// Create a new chunk full of air at the given position.
    pub fn new(pos: ChunkPos, size: usize, block_size: i32) -> Self {
        let origin = (pos * size as i32 * block_size).as_vec2();
        Self {
            pos,
            data: Mutex::new(ChunkData::new(size, origin, block_size as f32)),
            generated: Condvar::new(),
            stage: AtomicU8::new(ChunkStage::Empty as u8),
            slot: AtomicUsize::new(NO_SLOT),
            failures: AtomicU8::new(0),
        }
    }

    #[inline]
    pub fn pos(&self) -> ChunkPos {
        self.pos
    }

    /// Lock the chunk data, a poisoned lock is recovered because every block write
    /// keeps the data consistent.
    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, ChunkData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    pub fn stage(&self) -> ChunkStage {
        ChunkStage::from_u8(self.stage.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn set_stage(&self, stage: ChunkStage) {
        self.stage.store(stage as u8, Ordering::Release);
    }

    #[inline]
    pub fn is_fully_loaded(&self) -> bool {
        self.stage() == ChunkStage::FullyLoaded
    }

    /// Index of the render slot this chunk is bound to.
    #[inline]
    pub fn slot(&self) -> Option<usize> {
        match self.slot.load(Ordering::Acquire) {
            NO_SLOT => None,
            slot => Some(slot),
        }
    }

    #[inline]
    pub(crate) fn set_slot(&self, slot: Option<usize>) {
        self.slot.store(slot.unwrap_or(NO_SLOT), Ordering::Release);
    }

    /// Increment the failure counter and return the number of failures so far.
    #[inline]
    pub(crate) fn record_failure(&self) -> u8 {
        self.failures.fetch_add(1, Ordering::AcqRel).saturating_add(1)
    }

    #[inline]
    pub(crate) fn reset_failures(&self) {
        self.failures.store(0, Ordering::Release);
    }

    #[inline]
    pub fn failures(&self) -> u8 {
        self.failures.load(Ordering::Acquire)
    }

    /// Publish the result of the first generation stage, replacing the whole data in
    /// a single step, and wake every task waiting on this chunk.
    pub(crate) fn publish_generated(&self, data: ChunkData) {
        let mut guard = self.lock();
        *guard = data;
        self.set_stage(ChunkStage::Generated);
        drop(guard);
        self.generated.notify_all();
    }

    /// Mark the terrain of this chunk as permanently failed and wake every task
    /// waiting on it.
    pub(crate) fn fail(&self) {
        let guard = self.lock();
        self.set_stage(ChunkStage::Failed);
        drop(guard);
        self.generated.notify_all();
    }

    /// Mark the post generation of this chunk as permanently failed, its terrain
    /// stays available to neighbors.
    pub(crate) fn fail_post(&self) {
        let guard = self.lock();
        self.set_stage(ChunkStage::PostFailed);
        drop(guard);
    }

    /// Block the calling thread until the first generation stage of this chunk has
    /// completed. This must never be called with another chunk's lock held.
    pub fn wait_generated(&self) -> Result<(), GenError> {
        let mut guard = self.lock();
        loop {
            // The stage is always written with the lock held, so checking it here
            // can't miss a notification.
            match self.stage() {
                ChunkStage::Failed => return Err(GenError::NeighborFailed(self.pos)),
                stage if stage.is_generated() => return Ok(()),
                _ => guard = self.generated.wait(guard).unwrap_or_else(PoisonError::into_inner),
            }
        }
    }

}
