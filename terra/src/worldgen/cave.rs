//! Cave worm carving.

use std::sync::Arc;

use glam::{DVec2, IVec2};

use tracing::trace;

use crate::block::BlockKind;
use crate::chunk::{Chunk, ChunkPos};
use crate::config::TerrainConfig;
use crate::util::noise::NoiseSampler;
use crate::util::{map_range, Direction};

use super::{GenContext, GenError, TouchedChunks};


/// Step of the noise position of a worm between two moves.
const NOISE_STEP: DVec2 = DVec2::new(0.16, 0.64);


/// A cave worm, starting in a chunk and walking block by block, it carves a disc of
/// air around each of its positions and may cross into neighbor chunks.
#[derive(Debug, Clone)]
pub struct CaveWorm {
    /// Position in the noise field of the worm head, directions are sampled around.
    head: DVec2,
    /// Start world position, in pixels, aligned on the block grid.
    start: IVec2,
    /// Number of steps.
    length: u32,
}

impl CaveWorm {

    /// Compute the worm starting in the given chunk.
    pub fn new(config: &TerrainConfig, noise: &impl NoiseSampler, pos: ChunkPos) -> Self {

        let smoothness = config.terrain_smoothness;
        let origin = config.chunk_origin(pos);
        let origin_f = origin.as_dvec2();
        let world_size = config.chunk_world_size();

        let head = DVec2::new(
            noise.noise_1d(origin_f.x / smoothness),
            noise.noise_1d(origin_f.y / smoothness));

        let length = map_range(
            noise.noise_2d(pos.x as f64, pos.y as f64),
            -1.0, 1.0,
            config.worm_length_min as f64, config.worm_length_max as f64);

        let start_noise = (origin_f + 0.1) / smoothness;
        let start_x = noise.noise_3d(start_noise.x, start_noise.y, NOISE_STEP.x);
        let start_y = noise.noise_3d(start_noise.x, start_noise.y, NOISE_STEP.y);
        let start = DVec2::new(
            map_range(start_x, -1.0, 1.0, origin_f.x, origin_f.x + world_size as f64),
            map_range(start_y, -1.0, 1.0, origin_f.y, origin_f.y + world_size as f64));

        // Truncate and align on the block grid, then keep it in the chunk.
        let start = start.as_ivec2().div_euclid(IVec2::splat(config.block_size)) * config.block_size;
        let start = start.clamp(origin, origin + IVec2::splat(world_size - config.block_size));

        Self {
            head,
            start,
            length: length.round().max(0.0) as u32,
        }

    }

    /// Create a worm with explicit parameters.
    pub fn with_params(head: DVec2, start: IVec2, length: u32) -> Self {
        Self { head, start, length }
    }

    #[inline]
    pub fn start(&self) -> IVec2 {
        self.start
    }

    #[inline]
    pub fn length(&self) -> u32 {
        self.length
    }

    /// Carve this worm, starting from the given base chunk. Every chunk the worm goes
    /// through is acquired from the context, so this may block until neighbors are
    /// generated, and added to the touched chunks.
    pub fn carve(&self,
        config: &TerrainConfig,
        noise: &impl NoiseSampler,
        base: &Arc<Chunk>,
        ctx: &GenContext,
        touched: &mut TouchedChunks,
    ) -> Result<(), GenError> {

        let smoothness = config.terrain_smoothness;
        let block_size = config.block_size;
        let radius_min = config.worm_radius_min as f64;
        let radius_max = config.worm_radius_max as f64;

        let mut current = self.start;
        let mut noise_pos = self.head;
        let mut chunk = Arc::clone(base);

        trace!("carve worm from {} of length {}", self.start, self.length);

        for i in 0..self.length {

            let chunk_pos = config.chunk_at_int(current);
            if chunk.pos() != chunk_pos {
                chunk = ctx.acquire(chunk_pos)?;
            }

            touched.insert(&chunk);

            let radius = map_range(
                noise.noise_2d(i as f64 / self.length as f64 / smoothness, noise_pos.y / smoothness),
                -1.0, 1.0,
                radius_min, radius_max).round() as i32;

            let center = (current - config.chunk_origin(chunk_pos)) / block_size;
            let mut data = chunk.lock();
            for dy in -radius..=radius {
                for dx in -radius..=radius {
                    if dx * dx + dy * dy <= radius * radius {
                        let local = center + IVec2::new(dx, dy);
                        if data.kind_at(local).is_some_and(|kind| kind != BlockKind::Air) {
                            data.set_block(local, BlockKind::Air, 0);
                        }
                    }
                }
            }
            drop(data);

            noise_pos = self.head + NOISE_STEP * i as f64;
            let dir = Direction::from_worm_noise(noise.noise_2d(noise_pos.x, noise_pos.y));
            current += dir.delta() * block_size;

        }

        Ok(())

    }

}


#[cfg(test)]
mod tests {

    use std::thread;

    use crate::chunk::{ChunkData, ChunkStage};
    use crate::store::ChunkStore;
    use crate::util::noise::ConstNoise;
    use crate::worldgen::{ChunkGenerator, TerrainGenerator};

    use super::*;

    fn config() -> TerrainConfig {
        TerrainConfig {
            chunk_size: 8,
            block_size: 16,
            ..TerrainConfig::default()
        }
    }

    fn solid_chunk(store: &ChunkStore, pos: ChunkPos, config: &TerrainConfig) -> Arc<Chunk> {
        let chunk = store.create(pos).unwrap();
        let origin = config.chunk_origin(pos).as_vec2();
        let mut data = ChunkData::new(config.chunk_size, origin, config.block_size as f32);
        for y in 0..config.chunk_size as i32 {
            for x in 0..config.chunk_size as i32 {
                data.set_block(IVec2::new(x, y), BlockKind::Stone, 0);
            }
        }
        chunk.publish_generated(data);
        chunk
    }

    #[test]
    fn start_inside_chunk() {
        let config = config();
        for value in [-1.0, -0.3, 0.0, 0.7, 1.0] {
            let worm = CaveWorm::new(&config, &ConstNoise(value), IVec2::new(-2, 3));
            let origin = config.chunk_origin(IVec2::new(-2, 3));
            assert_eq!(config.chunk_at_int(worm.start()), IVec2::new(-2, 3));
            assert_eq!((worm.start() - origin) % config.block_size, IVec2::ZERO);
        }
        assert_eq!(CaveWorm::new(&config, &ConstNoise(-1.0), IVec2::ZERO).length(), 32);
        assert_eq!(CaveWorm::new(&config, &ConstNoise(1.0), IVec2::ZERO).length(), 512);
    }

    #[test]
    fn zero_length_touches_only_base() {

        let config = config();
        let store = ChunkStore::new(config.chunk_size, config.block_size, Arc::new(()));
        let (sender, receiver) = crossbeam_channel::unbounded();
        let base = solid_chunk(&store, IVec2::ZERO, &config);

        let worm = CaveWorm::with_params(DVec2::ZERO, IVec2::new(64, 64), 0);
        let mut touched = TouchedChunks::new(&base);
        worm.carve(&config, &ConstNoise(0.0), &base, &GenContext::new(&store, &sender), &mut touched).unwrap();

        assert_eq!(touched.positions().collect::<Vec<_>>(), [IVec2::ZERO]);
        assert_eq!(base.lock().count(BlockKind::Stone), 64);
        assert!(receiver.is_empty());

    }

    #[test]
    fn carves_disc() {

        let config = TerrainConfig {
            worm_radius_min: 2,
            worm_radius_max: 2,
            ..config()
        };
        let store = ChunkStore::new(config.chunk_size, config.block_size, Arc::new(()));
        let (sender, _receiver) = crossbeam_channel::unbounded();
        let base = solid_chunk(&store, IVec2::ZERO, &config);

        // A single step at the center of the chunk.
        let worm = CaveWorm::with_params(DVec2::ZERO, IVec2::new(64, 64), 1);
        let mut touched = TouchedChunks::new(&base);
        worm.carve(&config, &ConstNoise(0.0), &base, &GenContext::new(&store, &sender), &mut touched).unwrap();

        let data = base.lock();
        // 13 blocks are within a radius of 2 blocks.
        assert_eq!(data.count(BlockKind::Air), 13);
        assert_eq!(data.kind_at(IVec2::new(4, 4)), Some(BlockKind::Air));
        assert_eq!(data.kind_at(IVec2::new(6, 4)), Some(BlockKind::Air));
        assert_eq!(data.kind_at(IVec2::new(6, 6)), Some(BlockKind::Stone));
        let sum: u32 = data.counts().iter().sum();
        assert_eq!(sum, 64);

    }

    #[test]
    fn crosses_into_generated_neighbor() {

        // Noise 0 always moves the worm to the right.
        let config = TerrainConfig {
            worm_radius_min: 0,
            worm_radius_max: 0,
            ..config()
        };
        let store = ChunkStore::new(config.chunk_size, config.block_size, Arc::new(()));
        let (sender, receiver) = crossbeam_channel::unbounded();
        let base = solid_chunk(&store, IVec2::ZERO, &config);
        let right = solid_chunk(&store, IVec2::X, &config);

        let worm = CaveWorm::with_params(DVec2::ZERO, IVec2::new(96, 0), 4);
        let mut touched = TouchedChunks::new(&base);
        worm.carve(&config, &ConstNoise(0.0), &base, &GenContext::new(&store, &sender), &mut touched).unwrap();

        assert_eq!(touched.positions().collect::<Vec<_>>(), [IVec2::ZERO, IVec2::X]);
        assert_eq!(base.lock().count(BlockKind::Air), 2);
        assert_eq!(right.lock().count(BlockKind::Air), 2);
        assert!(receiver.is_empty());

    }

    #[test]
    fn waits_for_created_neighbor() {

        let config = TerrainConfig {
            worm_radius_min: 0,
            worm_radius_max: 0,
            ..config()
        };
        let store = ChunkStore::new(config.chunk_size, config.block_size, Arc::new(()));
        let (sender, receiver) = crossbeam_channel::unbounded();
        let base = solid_chunk(&store, IVec2::ZERO, &config);
        let generator = TerrainGenerator::with_noise(config.clone(), ConstNoise(0.0), ConstNoise(0.0));

        let touched = thread::scope(|scope| {

            let worker = scope.spawn(|| {
                let worm = CaveWorm::with_params(DVec2::ZERO, IVec2::new(112, 16), 3);
                let mut touched = TouchedChunks::new(&base);
                worm.carve(&config, &ConstNoise(0.0), &base, &GenContext::new(&store, &sender), &mut touched)
                    .map(|()| touched)
            });

            // The worm created the right neighbor and queued it.
            let pos = receiver.recv().unwrap();
            assert_eq!(pos, IVec2::X);
            let chunk = store.get(pos).unwrap();
            assert_eq!(chunk.stage(), ChunkStage::Empty);
            chunk.publish_generated(generator.generate(pos));

            worker.join().unwrap()

        }).unwrap();

        assert_eq!(touched.len(), 2);
        assert!(touched.contains(IVec2::X));

    }

    #[test]
    fn failed_neighbor_stops_worm() {
        let config = config();
        let store = ChunkStore::new(config.chunk_size, config.block_size, Arc::new(()));
        let (sender, _receiver) = crossbeam_channel::unbounded();
        let base = solid_chunk(&store, IVec2::ZERO, &config);
        store.create(IVec2::X).unwrap().fail();

        let worm = CaveWorm::with_params(DVec2::ZERO, IVec2::new(112, 16), 8);
        let mut touched = TouchedChunks::new(&base);
        let res = worm.carve(&config, &ConstNoise(0.0), &base, &GenContext::new(&store, &sender), &mut touched);
        assert_eq!(res, Err(GenError::NeighborFailed(IVec2::X)));
    }

}
