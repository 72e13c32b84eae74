//! Chunked procedural 2D terrain, generated in background tasks and streamed around
//! a camera into a fixed window of render slots.

pub mod util;

pub mod block;
pub mod chunk;
pub mod config;
pub mod store;

pub mod worldgen;
pub mod scheduler;

pub mod camera;
pub mod physics;
pub mod render;
pub mod window;

pub mod terrain;

pub use config::TerrainConfig;
pub use terrain::Terrain;
