//! Terrain chunk generator.

use std::sync::Arc;

use glam::IVec2;

use tracing::trace;

use crate::block::{BlockKind, GRASS_FRAME};
use crate::chunk::{Chunk, ChunkData, ChunkKind, ChunkPos};
use crate::config::TerrainConfig;
use crate::util::noise::{NoiseGenerator, NoiseSampler};

use super::{ChunkGenerator, GenContext, GenError, TouchedChunks};
use super::cave::CaveWorm;
use super::tree;


/// The terrain generator, the surface is a 1D fractal height map with dirt under it
/// and stone deeper, underground chunks are carved by a 2D fractal noise.
pub struct TerrainGenerator<N: NoiseSampler = NoiseGenerator> {
    config: TerrainConfig,
    /// Noise for the surface, stone, caves and every point sample.
    terrain_noise: N,
    /// Noise deciding where trees grow.
    tree_noise: N,
}

impl TerrainGenerator<NoiseGenerator> {

    /// Create a new terrain generator with noises seeded from the configuration.
    pub fn new(config: TerrainConfig) -> Self {
        let terrain_noise = NoiseGenerator::new(config.seed, config.terrain_fractal);
        let tree_noise = NoiseGenerator::new(config.seed, config.tree_fractal);
        Self::with_noise(config, terrain_noise, tree_noise)
    }

}

impl<N: NoiseSampler> TerrainGenerator<N> {

    pub fn with_noise(config: TerrainConfig, terrain_noise: N, tree_noise: N) -> Self {
        Self {
            config,
            terrain_noise,
            tree_noise,
        }
    }

    #[inline]
    pub fn config(&self) -> &TerrainConfig {
        &self.config
    }

    /// Round a pixel value to the block grid.
    #[inline]
    fn snap(&self, value: f64) -> i32 {
        let block_size = self.config.block_size as f64;
        (value / block_size).round() as i32 * self.config.block_size
    }

    /// Get the surface height of the block column at the given world x.
    pub fn surface_height(&self, x: i32) -> i32 {
        let noise = self.terrain_noise.fractal_1d(
            self.config.surface_octaves,
            (x + 1) as f64 / self.config.terrain_smoothness);
        self.snap(noise * self.config.height_flux)
    }

    /// Surface heights of every block column of the chunk starting at the given x.
    pub fn surface_heights(&self, origin_x: i32) -> Vec<i32> {
        (0..self.config.chunk_size as i32)
            .map(|i| self.surface_height(origin_x + i * self.config.block_size))
            .collect()
    }

    fn stone_value(&self, pos: IVec2) -> i32 {
        let smoothness = self.config.terrain_smoothness;
        let noise = self.terrain_noise.fractal_2d(
            self.config.stone_octaves,
            (pos.x + 1) as f64 / smoothness,
            (pos.y + 1) as f64 / smoothness);
        self.snap(noise * self.config.stone_flux)
    }

    /// Cave noise threshold for a chunk at the given world y, caves get wider deeper
    /// down until the threshold reaches its floor.
    fn cave_cutoff(&self, chunk_y: i32) -> f64 {
        let world_height = (self.config.world_chunk_height * self.config.chunk_world_size()) as f64;
        let depth = (chunk_y as f64 * 2.0 / world_height).abs();
        (1.0 - depth - 0.2).max(-0.25)
    }

    /// Return true if a surface chunk at the given origin spawns a cave worm.
    pub fn is_worm_head(&self, origin: IVec2) -> bool {
        let smoothness = self.config.terrain_smoothness;
        let noise = self.terrain_noise.noise_2d(origin.x as f64 / smoothness, origin.y as f64 / smoothness);
        noise.abs() > self.config.worm_head_threshold
    }

    fn carve_caves(&self, data: &mut ChunkData, origin: IVec2) {

        let size = self.config.chunk_size as i32;
        let scale = (self.config.chunk_size * 2) as f64;
        let cutoff = self.cave_cutoff(origin.y);

        for y in 0..size {
            for x in 0..size {
                let local = IVec2::new(x, y);
                let pos = origin + local * self.config.block_size;
                let noise = self.terrain_noise.fractal_2d(
                    self.config.cave_octaves,
                    pos.x as f64 / scale,
                    pos.y as f64 / scale);
                if noise > cutoff {
                    data.set_block(local, BlockKind::Air, 0);
                }
            }
        }

    }

}

impl<N: NoiseSampler + 'static> ChunkGenerator for TerrainGenerator<N> {

    fn generate(&self, pos: ChunkPos) -> ChunkData {

        let size = self.config.chunk_size as i32;
        let block_size = self.config.block_size;
        let origin = self.config.chunk_origin(pos);

        let mut data = ChunkData::new(self.config.chunk_size, origin.as_vec2(), block_size as f32);
        let surfaces = self.surface_heights(origin.x);
        let dirt_depth = self.config.dirt_depth * block_size;

        for y in 0..size {
            let block_y = origin.y + y * block_size;
            for (x, &surface) in surfaces.iter().enumerate() {

                let local = IVec2::new(x as i32, y);

                if block_y < surface {
                    let block_pos = IVec2::new(origin.x + local.x * block_size, block_y);
                    let kind = if block_y < surface - dirt_depth && self.stone_value(block_pos) >= self.config.stone_weight {
                        BlockKind::Stone
                    } else {
                        BlockKind::Dirt
                    };
                    data.set_block(local, kind, 0);
                } else if block_y == surface {
                    data.set_block(local, BlockKind::Grass, GRASS_FRAME);
                }

            }
        }

        data.kind = if data.is_all_air() {
            ChunkKind::Air
        } else if origin.y + self.config.chunk_world_size() < 0 {
            ChunkKind::Underground
        } else {
            ChunkKind::Surface
        };

        if data.kind == ChunkKind::Underground {
            self.carve_caves(&mut data, origin);
        } else if data.kind == ChunkKind::Surface {
            data.worm_head = self.is_worm_head(origin);
        }

        data.sort_order();
        trace!("generated chunk {}/{}: {:?}", pos.x, pos.y, data.kind);
        data

    }

    fn post_generate(&self, chunk: &Arc<Chunk>, ctx: &GenContext) -> Result<TouchedChunks, GenError> {

        let (kind, worm_head) = {
            let data = chunk.lock();
            (data.kind, data.worm_head)
        };

        let mut touched = TouchedChunks::new(chunk);

        if worm_head {
            let worm = CaveWorm::new(&self.config, &self.terrain_noise, chunk.pos());
            worm.carve(&self.config, &self.terrain_noise, chunk, ctx, &mut touched)?;
        }

        if kind == ChunkKind::Surface {
            let origin = self.config.chunk_origin(chunk.pos());
            let surfaces = self.surface_heights(origin.x);
            tree::grow_trees(&self.config, &self.tree_noise, &self.terrain_noise, chunk, &surfaces);
        }

        Ok(touched)

    }

}
