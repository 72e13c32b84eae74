//! Tunable parameters of the terrain.

use glam::{IVec2, Vec2};

use crate::chunk::ChunkPos;
use crate::util::noise::FractalParams;


/// Every tunable value of terrain generation and streaming. Distances are in pixels
/// unless stated otherwise.
#[derive(Debug, Clone)]
pub struct TerrainConfig {
    /// Seed of every noise generator.
    pub seed: i64,
    /// Number of blocks on each side of a chunk.
    pub chunk_size: usize,
    /// Size of a block.
    pub block_size: i32,
    /// Number of chunks around the camera chunk kept in the render window, must be
    /// even, the window is `view_distance + 1` chunks wide.
    pub view_distance: usize,
    /// Distance past the window edge the camera must reach before the window shifts.
    pub reassign_buffer: f32,
    /// Radius in chunks around the camera chunk that is eagerly generated.
    pub generation_radius: i32,
    /// Distance in chunks beyond the viewport after which chunks are unloaded.
    pub unload_radius: i32,
    /// Number of chunks above and below the origin the window may reach.
    pub world_chunk_height: i32,
    /// Fractal parameters of the terrain noise.
    pub terrain_fractal: FractalParams,
    /// Fractal parameters of the tree noise.
    pub tree_fractal: FractalParams,
    /// Horizontal scale of surface and stone noise.
    pub terrain_smoothness: f64,
    /// Maximum amplitude of the surface height.
    pub height_flux: f64,
    pub surface_octaves: usize,
    pub stone_octaves: usize,
    /// Maximum amplitude of the stone noise.
    pub stone_flux: f64,
    /// Minimum stone noise value for a block to be stone.
    pub stone_weight: i32,
    /// Number of blocks of dirt at least between the surface and the stone.
    pub dirt_depth: i32,
    pub cave_octaves: usize,
    /// Absolute noise value a surface chunk must exceed to spawn a cave worm.
    pub worm_head_threshold: f64,
    pub worm_length_min: u32,
    pub worm_length_max: u32,
    pub worm_radius_min: u32,
    pub worm_radius_max: u32,
    pub tree_octaves: usize,
    /// Horizontal scale of the tree noise.
    pub tree_smoothness: f64,
    /// Tree noise value a column must exceed to grow a tree.
    pub tree_threshold: f64,
    /// Number of attempts of each generation stage before a chunk fails.
    pub max_attempts: u8,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            chunk_size: 64,
            block_size: 16,
            view_distance: 2,
            reassign_buffer: 128.0,
            generation_radius: 3,
            unload_radius: 4,
            world_chunk_height: 8,
            terrain_fractal: FractalParams {
                frequency: 0.25,
                ..FractalParams::default()
            },
            tree_fractal: FractalParams {
                frequency: 4.0,
                amplitude: 0.25,
                ..FractalParams::default()
            },
            terrain_smoothness: 400.0,
            height_flux: 768.0,
            surface_octaves: 4,
            stone_octaves: 8,
            stone_flux: 64.0,
            stone_weight: 0,
            dirt_depth: 8,
            cave_octaves: 2,
            worm_head_threshold: 0.75,
            worm_length_min: 32,
            worm_length_max: 512,
            worm_radius_min: 2,
            worm_radius_max: 5,
            tree_octaves: 4,
            tree_smoothness: 200.0,
            tree_threshold: 0.4,
            max_attempts: 3,
        }
    }
}

impl TerrainConfig {

    /// Check that every value is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 || self.chunk_size > u16::MAX as usize {
            return Err(ConfigError::ChunkSize(self.chunk_size));
        }
        if self.block_size <= 0 {
            return Err(ConfigError::BlockSize(self.block_size));
        }
        if self.view_distance % 2 != 0 {
            return Err(ConfigError::ViewDistance(self.view_distance));
        }
        if self.generation_radius < 0 || self.unload_radius < 0 || self.world_chunk_height < 1 {
            return Err(ConfigError::Radius);
        }
        if self.worm_length_min > self.worm_length_max {
            return Err(ConfigError::Range("worm_length"));
        }
        if self.worm_radius_min > self.worm_radius_max {
            return Err(ConfigError::Range("worm_radius"));
        }
        if self.terrain_smoothness <= 0.0 || self.tree_smoothness <= 0.0 {
            return Err(ConfigError::Smoothness);
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::MaxAttempts);
        }
        Ok(())
    }

    /// Number of chunks on each side of the render window.
    #[inline]
    pub fn window_side(&self) -> usize {
        self.view_distance + 1
    }

    /// Size of a chunk, in pixels.
    #[inline]
    pub fn chunk_world_size(&self) -> i32 {
        self.chunk_size as i32 * self.block_size
    }

    /// World position of the bottom left corner of a chunk.
    #[inline]
    pub fn chunk_origin(&self, pos: ChunkPos) -> IVec2 {
        pos * self.chunk_world_size()
    }

    /// Chunk containing the given world position.
    #[inline]
    pub fn chunk_at(&self, pos: Vec2) -> ChunkPos {
        (pos / self.chunk_world_size() as f32).floor().as_ivec2()
    }

    /// Chunk containing the given integer world position.
    #[inline]
    pub fn chunk_at_int(&self, pos: IVec2) -> ChunkPos {
        pos.div_euclid(IVec2::splat(self.chunk_world_size()))
    }

    /// Height of the world above and below the origin, in pixels.
    #[inline]
    pub fn world_half_height(&self) -> f32 {
        (self.world_chunk_height * self.chunk_world_size()) as f32
    }

}


/// Error returned when validating a configuration.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid chunk size: {0}")]
    ChunkSize(usize),
    #[error("invalid block size: {0}")]
    BlockSize(i32),
    #[error("view distance must be even: {0}")]
    ViewDistance(usize),
    #[error("generation, unload and world height radii must be positive")]
    Radius,
    #[error("{0} minimum is greater than its maximum")]
    Range(&'static str),
    #[error("noise smoothness must be positive")]
    Smoothness,
    #[error("at least one generation attempt is required")]
    MaxAttempts,
}
