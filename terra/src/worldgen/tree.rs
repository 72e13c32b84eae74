//! Tree generation functions.

use glam::IVec2;

use tracing::trace;

use crate::block::BlockKind;
use crate::chunk::{Chunk, ChunkData};
use crate::config::TerrainConfig;
use crate::util::map_range;
use crate::util::noise::NoiseSampler;


/// A tree pattern, rows are given from the top one. Cells are `L` for leaves, `W` for
/// wood, `B` for branches, and any other character for no block.
#[derive(Debug, Clone, Copy)]
pub struct TreePattern {
    rows: &'static [&'static str],
}

impl TreePattern {

    pub const fn new(rows: &'static [&'static str]) -> Self {
        Self { rows }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.rows.first().map_or(0, |row| row.len())
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// Get the block of the cell at the given column and row from the bottom.
    pub fn cell(&self, x: usize, y: usize) -> Option<BlockKind> {
        let row = self.rows.get(self.rows.len().checked_sub(y + 1)?)?;
        match row.as_bytes().get(x)? {
            b'L' => Some(BlockKind::Leaf),
            b'W' => Some(BlockKind::Wood),
            b'B' => Some(BlockKind::Branch),
            _ => None,
        }
    }

}


/// The built-in tree patterns, the two bottom rows are the roots.
pub const PATTERNS: [TreePattern; 2] = [
    TreePattern::new(&[
        "..L..",
        ".LLL.",
        "LLLLL",
        ".LLL.",
        "..W..",
        "..W..",
        "..W..",
        "..W..",
        "..W..",
        "..W..",
        "..W..",
        "..W..",
        ".B.B.",
        "B...B",
    ]),
    TreePattern::new(&[
        ".....L.....",
        "....LLL....",
        "...LLLLL...",
        "LLL.LLL.LLL",
        "LLL..W..LLL",
        "LLB..W..BLL",
        "...BBWBB...",
        ".....W.....",
        ".....W.....",
        ".....W.....",
        ".....W.....",
        ".....W.....",
        "....B.B....",
        "...B...B...",
    ]),
];


/// Stamp a tree pattern in the chunk, the anchor is the chunk-local position of the
/// bottom row's center cell. Nothing is placed and false is returned if the pattern
/// doesn't fit in the chunk or if the anchor cell is air. Leaves are only placed in
/// air.
pub fn place_tree(data: &mut ChunkData, pattern: &TreePattern, anchor: IVec2) -> bool {

    let size = data.size() as i32;
    let width = pattern.width() as i32;
    let height = pattern.height() as i32;
    let half = width / 2;

    if anchor.y < 0 || anchor.y + height >= size {
        return false;
    }

    if anchor.x - half < 0 || anchor.x + half >= size {
        return false;
    }

    if data.kind_at(anchor).is_none_or(BlockKind::is_air) {
        return false;
    }

    for y in 0..height {
        for x in 0..width {

            let Some(kind) = pattern.cell(x as usize, y as usize) else { continue };
            let local = IVec2::new(anchor.x + x - half, anchor.y + y);

            if kind == BlockKind::Leaf && data.kind_at(local) != Some(BlockKind::Air) {
                continue;
            }

            data.set_block(local, kind, 0);

        }
    }

    true

}


/// Grow trees on the surface of a chunk, the surface heights are given for each
/// block column. Returns the number of trees placed.
pub fn grow_trees(
    config: &TerrainConfig,
    tree_noise: &impl NoiseSampler,
    point_noise: &impl NoiseSampler,
    chunk: &Chunk,
    surfaces: &[i32],
) -> usize {

    let block_size = config.block_size;
    let origin = config.chunk_origin(chunk.pos());
    let top = origin.y + config.chunk_world_size();
    let smoothness = config.tree_smoothness;

    let mut data = chunk.lock();
    let mut count = 0;

    for (x, &surface) in surfaces.iter().enumerate() {

        if surface < origin.y || surface >= top {
            continue;
        }

        let column_x = origin.x + x as i32 * block_size;
        let anchor_y = surface - 2 * block_size;

        let noise = tree_noise.fractal_2d(
            config.tree_octaves,
            column_x as f64 / smoothness,
            anchor_y as f64 / smoothness);

        if noise <= config.tree_threshold {
            continue;
        }

        let index = map_range(point_noise.noise_1d(column_x as f64 / smoothness), -1.0, 1.0, 0.0, PATTERNS.len() as f64);
        let pattern = &PATTERNS[(index.max(0.0) as usize).min(PATTERNS.len() - 1)];
        let anchor = IVec2::new(x as i32, (anchor_y - origin.y) / block_size);

        if place_tree(&mut data, pattern, anchor) {
            count += 1;
        }

    }

    if count != 0 {
        trace!("grown {count} trees in chunk {}/{}", chunk.pos().x, chunk.pos().y);
    }

    count

}


#[cfg(test)]
mod tests {

    use std::sync::Arc;

    use glam::Vec2;

    use crate::chunk::ChunkKind;
    use crate::util::noise::ConstNoise;
    use crate::worldgen::{ChunkGenerator, TerrainGenerator};

    use super::*;

    fn dirt_floor(size: usize, rows: i32) -> ChunkData {
        let mut data = ChunkData::new(size, Vec2::ZERO, 16.0);
        for y in 0..rows {
            for x in 0..size as i32 {
                data.set_block(IVec2::new(x, y), BlockKind::Dirt, 0);
            }
        }
        data
    }

    #[test]
    fn pattern_shapes() {
        for pattern in &PATTERNS {
            assert!(pattern.rows.iter().all(|row| row.len() == pattern.width()));
            assert_eq!(pattern.height(), 14);
        }
        let small = &PATTERNS[0];
        assert_eq!(small.cell(0, 0), Some(BlockKind::Branch));
        assert_eq!(small.cell(2, 0), None);
        assert_eq!(small.cell(2, 2), Some(BlockKind::Wood));
        assert_eq!(small.cell(2, 13), Some(BlockKind::Leaf));
        assert_eq!(small.cell(2, 14), None);
        assert_eq!(small.cell(5, 0), None);
    }

    #[test]
    fn place_small_tree() {

        let mut data = dirt_floor(16, 3);
        assert!(place_tree(&mut data, &PATTERNS[0], IVec2::new(8, 1)));

        assert_eq!(data.kind_at(IVec2::new(6, 1)), Some(BlockKind::Branch));
        assert_eq!(data.kind_at(IVec2::new(8, 3)), Some(BlockKind::Wood));
        assert_eq!(data.kind_at(IVec2::new(8, 10)), Some(BlockKind::Wood));
        assert_eq!(data.kind_at(IVec2::new(8, 14)), Some(BlockKind::Leaf));
        assert_eq!(data.kind_at(IVec2::new(7, 14)), Some(BlockKind::Air));
        assert_eq!(data.count(BlockKind::Wood), 8);
        assert_eq!(data.count(BlockKind::Branch), 4);
        assert_eq!(data.count(BlockKind::Leaf), 12);

        let sum: u32 = data.counts().iter().sum();
        assert_eq!(sum, 256);

    }

    #[test]
    fn refuse_out_of_bounds() {
        let mut data = dirt_floor(16, 3);
        let before = data.counts().to_owned();
        assert!(!place_tree(&mut data, &PATTERNS[0], IVec2::new(1, 1)));
        assert!(!place_tree(&mut data, &PATTERNS[0], IVec2::new(14, 1)));
        assert!(!place_tree(&mut data, &PATTERNS[0], IVec2::new(8, -1)));
        assert!(!place_tree(&mut data, &PATTERNS[0], IVec2::new(8, 2)));
        assert!(!place_tree(&mut data, &PATTERNS[1], IVec2::new(4, 1)));
        assert_eq!(data.counts(), &before);
    }

    #[test]
    fn refuse_air_anchor() {
        let mut data = dirt_floor(16, 1);
        assert!(!place_tree(&mut data, &PATTERNS[0], IVec2::new(8, 1)));
        assert!(data.blocks().iter().all(|b| matches!(b.kind, BlockKind::Dirt | BlockKind::Air)));
    }

    #[test]
    fn leaves_do_not_overwrite() {
        let mut data = dirt_floor(16, 3);
        data.set_block(IVec2::new(8, 14), BlockKind::Stone, 0);
        data.set_block(IVec2::new(7, 13), BlockKind::Wood, 0);
        assert!(place_tree(&mut data, &PATTERNS[0], IVec2::new(8, 1)));
        assert_eq!(data.kind_at(IVec2::new(8, 14)), Some(BlockKind::Stone));
        assert_eq!(data.kind_at(IVec2::new(7, 13)), Some(BlockKind::Wood));
    }

    #[test]
    fn grow_on_surface() {

        // Surface at 384 pixels, row 24 of the chunk, every column passes the tree
        // noise and picks the wide pattern.
        let config = TerrainConfig { chunk_size: 64, ..TerrainConfig::default() };
        let generator = TerrainGenerator::with_noise(config.clone(), ConstNoise(0.5), ConstNoise(0.5));
        let chunk = Arc::new(Chunk::new(IVec2::ZERO, 64, 16));
        chunk.publish_generated(generator.generate(IVec2::ZERO));
        assert_eq!(chunk.lock().kind, ChunkKind::Surface);

        let surfaces = generator.surface_heights(0);
        let count = grow_trees(&config, &ConstNoise(0.5), &ConstNoise(0.5), &chunk, &surfaces);
        // Columns 5 to 58 fit the 11 wide pattern.
        assert_eq!(count, 54);

        let data = chunk.lock();
        assert!(data.count(BlockKind::Wood) > 0);
        assert!(data.count(BlockKind::Leaf) > 0);
        let sum: u32 = data.counts().iter().sum();
        assert_eq!(sum, 64 * 64);

    }

    #[test]
    fn no_trees_below_threshold() {
        let config = TerrainConfig { chunk_size: 64, ..TerrainConfig::default() };
        let generator = TerrainGenerator::with_noise(config.clone(), ConstNoise(0.5), ConstNoise(0.4));
        let chunk = Chunk::new(IVec2::ZERO, 64, 16);
        chunk.publish_generated(generator.generate(IVec2::ZERO));
        let surfaces = generator.surface_heights(0);
        assert_eq!(grow_trees(&config, &ConstNoise(0.4), &ConstNoise(0.5), &chunk, &surfaces), 0);
    }

    #[test]
    fn surface_outside_chunk() {
        let config = TerrainConfig { chunk_size: 16, ..TerrainConfig::default() };
        let chunk = Chunk::new(IVec2::new(0, 3), 16, 16);
        assert_eq!(grow_trees(&config, &ConstNoise(1.0), &ConstNoise(0.0), &chunk, &[0; 16]), 0);
    }

}
