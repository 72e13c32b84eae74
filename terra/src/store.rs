//! Unbounded storage of every chunk in memory, indexed by chunk position.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::iter::FusedIterator;

use indexmap::IndexMap;
use indexmap::map::Entry;
use glam::IVec2;

use tracing::{trace, warn};

use crate::chunk::{Chunk, ChunkPos};
use crate::physics::{ChunkBounds, ColliderSink};


/// The chunk store, at most one chunk exists for each position. The map lock is only
/// held for map operations, never while waiting on a chunk or generating.
pub struct ChunkStore {
    chunks: RwLock<IndexMap<ChunkPos, Arc<Chunk>>>,
    chunk_size: usize,
    block_size: i32,
    colliders: Arc<dyn ColliderSink>,
}

impl ChunkStore {

    pub fn new(chunk_size: usize, block_size: i32, colliders: Arc<dyn ColliderSink>) -> Self {
        Self {
            chunks: RwLock::new(IndexMap::new()),
            chunk_size,
            block_size,
            colliders,
        }
    }

    #[inline]
    fn read(&self) -> RwLockReadGuard<'_, IndexMap<ChunkPos, Arc<Chunk>>> {
        self.chunks.read().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    fn write(&self) -> RwLockWriteGuard<'_, IndexMap<ChunkPos, Arc<Chunk>>> {
        self.chunks.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn new_chunk(&self, pos: ChunkPos) -> Arc<Chunk> {
        Arc::new(Chunk::new(pos, self.chunk_size, self.block_size))
    }

    fn notify_created(&self, pos: ChunkPos) {
        trace!("chunk created: {}/{}", pos.x, pos.y);
        let world_size = (self.chunk_size as i32 * self.block_size) as f32;
        self.colliders.chunk_created(ChunkBounds::of(pos, world_size));
    }

    /// Create a new empty chunk at the given position, an error is returned if a
    /// chunk already exists there, in which case the existing one is untouched.
    pub fn create(&self, pos: ChunkPos) -> Result<Arc<Chunk>, StoreError> {
        let chunk = match self.write().entry(pos) {
            Entry::Occupied(_) => {
                warn!("duplicate chunk creation: {}/{}", pos.x, pos.y);
                return Err(StoreError::Duplicate(pos));
            }
            Entry::Vacant(v) => Arc::clone(v.insert(self.new_chunk(pos))),
        };
        self.notify_created(pos);
        Ok(chunk)
    }

    /// Get the chunk at the given position, or create an empty one atomically. The
    /// returned boolean is true if the chunk has just been created.
    pub fn get_or_create(&self, pos: ChunkPos) -> (Arc<Chunk>, bool) {

        if let Some(chunk) = self.get(pos) {
            return (chunk, false);
        }

        let (chunk, created) = match self.write().entry(pos) {
            Entry::Occupied(o) => (Arc::clone(o.get()), false),
            Entry::Vacant(v) => (Arc::clone(v.insert(self.new_chunk(pos))), true),
        };

        if created {
            self.notify_created(pos);
        }

        (chunk, created)

    }

    #[inline]
    pub fn get(&self, pos: ChunkPos) -> Option<Arc<Chunk>> {
        self.read().get(&pos).cloned()
    }

    #[inline]
    pub fn contains(&self, pos: ChunkPos) -> bool {
        self.read().contains_key(&pos)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Remove the chunk at the given position, if any.
    pub fn remove(&self, pos: ChunkPos) -> Option<Arc<Chunk>> {
        self.write().shift_remove(&pos)
    }

    /// Remove every chunk matching the predicate and return them. The predicate is
    /// called with the map locked, so the strong count of a chunk can't grow from a
    /// store lookup while it's evaluated.
    pub fn remove_if(&self, mut pred: impl FnMut(&Arc<Chunk>) -> bool) -> Vec<Arc<Chunk>> {
        let mut removed = Vec::new();
        self.write().retain(|_, chunk| {
            if pred(chunk) {
                removed.push(Arc::clone(chunk));
                false
            } else {
                true
            }
        });
        removed
    }

    /// Remove every chunk and return them.
    pub fn clear(&self) -> Vec<Arc<Chunk>> {
        self.write().drain(..).map(|(_, chunk)| chunk).collect()
    }

    /// Positions of every chunk, in creation order.
    pub fn positions(&self) -> Vec<ChunkPos> {
        self.read().keys().copied().collect()
    }

    /// Every existing chunk in the given inclusive range of positions.
    pub fn chunks_in(&self, min: ChunkPos, max: ChunkPos) -> Vec<Arc<Chunk>> {
        let chunks = self.read();
        ChunkRange::new(min, max)
            .filter_map(|pos| chunks.get(&pos).cloned())
            .collect()
    }

}


/// Iterator of chunk positions, both start and end are inclusive, rows are iterated
/// from the bottom one.
#[derive(Debug, Clone)]
pub struct ChunkRange {
    pos: ChunkPos,
    start_x: i32,
    end: ChunkPos,
}

impl ChunkRange {

    #[inline]
    pub fn new(start: ChunkPos, end: ChunkPos) -> Self {
        Self {
            pos: start,
            start_x: start.x,
            end,
        }
    }

    /// Range of every chunk at the given distance of a center chunk.
    #[inline]
    pub fn around(center: ChunkPos, radius: i32) -> Self {
        Self::new(center - IVec2::splat(radius), center + IVec2::splat(radius))
    }

}

impl FusedIterator for ChunkRange {}
impl Iterator for ChunkRange {

    type Item = ChunkPos;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {

        if self.pos.x > self.end.x || self.pos.y > self.end.y {
            return None;
        }

        let ret = self.pos;

        self.pos.x += 1;
        if self.pos.x > self.end.x {
            self.pos.x = self.start_x;
            self.pos.y += 1;
        }

        Some(ret)

    }

}


/// Error type used by the chunk store.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("chunk {0} already exists")]
    Duplicate(ChunkPos),
}


#[cfg(test)]
mod tests {

    use std::sync::Mutex;
    use std::thread;

    use glam::{IVec2, Vec2};

    use crate::block::BlockKind;

    use super::*;

    fn store() -> ChunkStore {
        ChunkStore::new(4, 16, Arc::new(()))
    }

    #[test]
    fn chunk_range() {
        let range = |a: (i32, i32), b: (i32, i32)| {
            ChunkRange::new(IVec2::from(a), IVec2::from(b)).map(|p| (p.x, p.y)).collect::<Vec<_>>()
        };
        assert_eq!(range((0, 0), (0, 0)), [(0, 0)]);
        assert_eq!(range((0, 0), (1, 0)), [(0, 0), (1, 0)]);
        assert_eq!(range((0, 0), (1, 1)), [(0, 0), (1, 0), (0, 1), (1, 1)]);
        assert_eq!(range((0, 0), (-1, 0)), []);
        assert_eq!(range((0, 0), (0, -1)), []);
        assert_eq!(ChunkRange::around(IVec2::ZERO, 1).count(), 9);
    }

    #[test]
    fn duplicate_creation() {

        let store = store();
        let chunk = store.create(IVec2::ZERO).unwrap();
        chunk.lock().set_block(IVec2::new(1, 1), BlockKind::Stone, 0);

        assert_eq!(store.create(IVec2::ZERO).unwrap_err(), StoreError::Duplicate(IVec2::ZERO));
        assert_eq!(store.len(), 1);

        let existing = store.get(IVec2::ZERO).unwrap();
        assert!(Arc::ptr_eq(&chunk, &existing));
        assert_eq!(existing.lock().count(BlockKind::Stone), 1);

    }

    #[test]
    fn get_or_create() {
        let store = store();
        let (a, created) = store.get_or_create(IVec2::new(3, -2));
        assert!(created);
        let (b, created) = store.get_or_create(IVec2::new(3, -2));
        assert!(!created);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(store.contains(IVec2::new(3, -2)));
        assert!(!store.contains(IVec2::new(-2, 3)));
    }

    #[test]
    fn concurrent_get_or_create_is_unique() {

        let store = Arc::new(store());
        let handles = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    (0..16)
                        .map(|i| store.get_or_create(IVec2::new(i % 4, i / 4)).1)
                        .filter(|&created| created)
                        .count()
                })
            })
            .collect::<Vec<_>>();

        let created: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(created, 16);
        assert_eq!(store.len(), 16);

    }

    #[test]
    fn remove_if_and_clear() {
        let store = store();
        for pos in ChunkRange::new(IVec2::ZERO, IVec2::new(2, 2)) {
            store.create(pos).unwrap();
        }
        let removed = store.remove_if(|chunk| chunk.pos().x == 1);
        assert_eq!(removed.len(), 3);
        assert_eq!(store.len(), 6);
        assert!(store.remove(IVec2::ZERO).is_some());
        assert!(store.remove(IVec2::ZERO).is_none());
        assert_eq!(store.chunks_in(IVec2::ZERO, IVec2::new(1, 1)).len(), 1);
        assert_eq!(store.clear().len(), 5);
        assert!(store.is_empty());
    }

    #[test]
    fn colliders_notified() {

        struct Recorder(Mutex<Vec<ChunkBounds>>);
        impl ColliderSink for Recorder {
            fn chunk_created(&self, bounds: ChunkBounds) {
                self.0.lock().unwrap().push(bounds);
            }
        }

        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let store = ChunkStore::new(4, 16, recorder.clone());
        store.create(IVec2::new(1, -1)).unwrap();
        store.get_or_create(IVec2::new(1, -1));
        let _ = store.create(IVec2::new(1, -1));

        let recorded = recorder.0.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].min, Vec2::new(64.0, -64.0));
        assert_eq!(recorded[0].max, Vec2::new(128.0, 0.0));

    }

}
