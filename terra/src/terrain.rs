//! The terrain, tying the chunk store, the generation scheduler and the render window
//! together. The terrain is updated once per tick from a single thread.

use std::sync::Arc;

use glam::Vec2;

use tracing::{debug, instrument};

use crate::block::BlockKind;
use crate::camera::CameraView;
use crate::chunk::{Chunk, ChunkPos};
use crate::config::{ConfigError, TerrainConfig};
use crate::physics::{ChunkBounds, ColliderSink};
use crate::render::{BlockAtlas, QuadMesh, RenderBackend};
use crate::scheduler::{GenScheduler, GenStats};
use crate::store::ChunkStore;
use crate::window::ChunkWindow;
use crate::worldgen::{ChunkGenerator, TerrainGenerator};


/// A streamed procedural terrain. Chunks are created around the camera, generated
/// in the background and pushed to the render window once fully loaded, then
/// unloaded when the camera goes far enough.
pub struct Terrain<G: ChunkGenerator = TerrainGenerator> {
    config: TerrainConfig,
    store: Arc<ChunkStore>,
    scheduler: GenScheduler<G>,
    window: ChunkWindow,
}

impl Terrain {

    /// Create a terrain generated from the configuration's seed.
    pub fn new(
        config: TerrainConfig,
        colliders: Arc<dyn ColliderSink>,
        mesh: QuadMesh,
        backend: &mut dyn RenderBackend,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let generator = TerrainGenerator::new(config.clone());
        Self::with_generator(config, generator, colliders, mesh, backend)
    }

}

impl<G: ChunkGenerator> Terrain<G> {

    /// Create a terrain with a custom generator, the render window is not bound until
    /// [`Self::init`] is called.
    pub fn with_generator(
        config: TerrainConfig,
        generator: G,
        colliders: Arc<dyn ColliderSink>,
        mesh: QuadMesh,
        backend: &mut dyn RenderBackend,
    ) -> Result<Self, ConfigError> {

        config.validate()?;

        let store = Arc::new(ChunkStore::new(config.chunk_size, config.block_size, colliders));
        let scheduler = GenScheduler::new(Arc::new(generator), Arc::clone(&store), config.max_attempts);
        let window = ChunkWindow::new(&config, mesh, backend);

        Ok(Self {
            config,
            store,
            scheduler,
            window,
        })

    }

    #[inline]
    pub fn config(&self) -> &TerrainConfig {
        &self.config
    }

    #[inline]
    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    #[inline]
    pub fn window(&self) -> &ChunkWindow {
        &self.window
    }

    #[inline]
    pub fn generator(&self) -> &G {
        self.scheduler.generator()
    }

    pub fn stats(&self) -> GenStats {
        self.scheduler.stats()
    }

    /// Bind the render window around the given world position, every chunk created
    /// is queued for generation.
    pub fn init(&mut self, pos: Vec2, backend: &mut dyn RenderBackend) {
        for pos in self.window.init(pos, &self.store, backend) {
            self.scheduler.enqueue(pos);
        }
    }

    /// Update the terrain for the given camera: shift the window, create chunks around
    /// the camera, unload far chunks, advance generation and push loaded chunks to
    /// their slot. The position of every chunk that became or stayed fully loaded with
    /// new data is returned.
    #[instrument(level = "debug", skip_all)]
    pub fn update(&mut self, camera: &CameraView, backend: &mut dyn RenderBackend) -> Vec<ChunkPos> {

        for pos in self.window.follow(camera, &self.store, backend) {
            self.scheduler.enqueue(pos);
        }

        for pos in self.window.pregenerate(camera, &self.store) {
            self.scheduler.enqueue(pos);
        }

        self.window.sweep(camera, &self.store, backend);

        let loaded = self.scheduler.tick();
        for &pos in &loaded {
            self.window.push(pos, &self.store, backend);
        }

        loaded

    }

    /// Draw every fully loaded chunk of the render window.
    pub fn render(&self, atlas: &BlockAtlas, backend: &mut dyn RenderBackend) {
        self.window.draw(atlas, backend);
    }

    /// Unload every chunk, once generation has settled, and bind the render window
    /// again around the given world position.
    pub fn reset(&mut self, pos: Vec2, backend: &mut dyn RenderBackend) {
        self.scheduler.drain();
        self.window.unbind_all(&self.store, backend);
        let removed = self.store.clear();
        debug!("terrain reset, {} chunks unloaded", removed.len());
        self.init(pos, backend);
    }

    /// Join every generation task, destroy the render slots and unload every chunk.
    pub fn shutdown(&mut self, backend: &mut dyn RenderBackend) {
        self.scheduler.shutdown();
        self.window.release(&self.store, backend);
        let removed = self.store.clear();
        let stats = self.scheduler.stats();
        debug!("terrain shut down, {} chunks unloaded, {} generated, {} loaded, {} failed",
            removed.len(), stats.generated_count, stats.loaded_count, stats.failed_count);
    }

    /// Get the block kind at the given world position, if its chunk is fully loaded.
    pub fn block_at(&self, pos: Vec2) -> Option<BlockKind> {
        let chunk = self.store.get(self.config.chunk_at(pos))?;
        if !chunk.is_fully_loaded() {
            return None;
        }
        let origin = self.config.chunk_origin(chunk.pos()).as_vec2();
        let local = ((pos - origin) / self.config.block_size as f32).floor().as_ivec2();
        chunk.lock().kind_at(local)
    }

    /// Every fully loaded chunk intersecting the given world rectangle.
    pub fn chunks_overlapping(&self, min: Vec2, max: Vec2) -> Vec<Arc<Chunk>> {
        let world_size = self.config.chunk_world_size() as f32;
        self.store.chunks_in(self.config.chunk_at(min), self.config.chunk_at(max))
            .into_iter()
            .filter(|chunk| chunk.is_fully_loaded())
            .filter(|chunk| ChunkBounds::of(chunk.pos(), world_size).intersects(min, max))
            .collect()
    }

}
