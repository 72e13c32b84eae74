//! World generation module.
//!
//! Generation runs in two stages. The first stage shapes a single chunk from noise
//! and doesn't need anything else. The second stage carves cave worms and grows trees,
//! a worm may cross into neighbor chunks, in which case the neighbor is created if
//! needed, queued for its first stage and waited on.

use std::sync::Arc;

use crossbeam_channel::Sender;
use indexmap::IndexMap;

use tracing::trace;

use crate::chunk::{Chunk, ChunkData, ChunkPos};
use crate::store::ChunkStore;


mod terrain;
mod cave;
pub mod tree;

pub use terrain::TerrainGenerator;
pub use cave::CaveWorm;


/// A trait for the two stages of chunk generation, a generator is shared by all the
/// generation tasks.
pub trait ChunkGenerator: Send + Sync + 'static {

    /// Generate the terrain of the chunk at the given position. The returned data is
    /// published to the chunk in a single step, its render order must be sorted.
    fn generate(&self, pos: ChunkPos) -> ChunkData;

    /// Post generate a chunk which terrain has been generated, returning every chunk
    /// modified, including the given one.
    fn post_generate(&self, chunk: &Arc<Chunk>, ctx: &GenContext) -> Result<TouchedChunks, GenError>;

}


/// Access to the chunk store given to post generation, a chunk acquired through this
/// context is created and queued for generation if needed.
pub struct GenContext<'a> {
    store: &'a ChunkStore,
    queue: &'a Sender<ChunkPos>,
}

impl<'a> GenContext<'a> {

    pub fn new(store: &'a ChunkStore, queue: &'a Sender<ChunkPos>) -> Self {
        Self { store, queue }
    }

    #[inline]
    pub fn store(&self) -> &'a ChunkStore {
        self.store
    }

    /// Get the chunk at the given position, waiting for its terrain to be generated.
    /// No chunk lock must be held by the caller.
    pub fn acquire(&self, pos: ChunkPos) -> Result<Arc<Chunk>, GenError> {
        let (chunk, created) = self.store.get_or_create(pos);
        if created {
            trace!("queue neighbor chunk: {}/{}", pos.x, pos.y);
            self.queue.send(pos).map_err(|_| GenError::Shutdown)?;
        }
        chunk.wait_generated()?;
        Ok(chunk)
    }

}


/// Deduplicated set of chunks modified by a post generation, in the order they were
/// first touched, the base chunk always comes first.
#[derive(Debug, Clone)]
pub struct TouchedChunks {
    chunks: IndexMap<ChunkPos, Arc<Chunk>>,
}

impl TouchedChunks {

    pub fn new(base: &Arc<Chunk>) -> Self {
        let mut chunks = IndexMap::new();
        chunks.insert(base.pos(), Arc::clone(base));
        Self { chunks }
    }

    /// Add a touched chunk, nothing is done if it's already present.
    #[inline]
    pub fn insert(&mut self, chunk: &Arc<Chunk>) {
        self.chunks.entry(chunk.pos()).or_insert_with(|| Arc::clone(chunk));
    }

    #[inline]
    pub fn contains(&self, pos: ChunkPos) -> bool {
        self.chunks.contains_key(&pos)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn positions(&self) -> impl Iterator<Item = ChunkPos> + '_ {
        self.chunks.keys().copied()
    }

    pub fn into_chunks(self) -> impl Iterator<Item = Arc<Chunk>> {
        self.chunks.into_values()
    }

}


/// Error type used when post generation can't complete.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GenError {
    #[error("neighbor chunk {0} failed to generate")]
    NeighborFailed(ChunkPos),
    #[error("generation is shutting down")]
    Shutdown,
}
