//! This example is just used internally to debug structures sizes.

use std::mem::size_of;

pub fn main() {

    println!("terra::block::Block: {}", size_of::<terra::block::Block>());
    println!("terra::chunk::Chunk: {}", size_of::<terra::chunk::Chunk>());
    println!("terra::chunk::ChunkData: {}", size_of::<terra::chunk::ChunkData>());
    println!("terra::window::ChunkWindow: {}", size_of::<terra::window::ChunkWindow>());
    println!("terra::Terrain: {}", size_of::<terra::Terrain>());

}
