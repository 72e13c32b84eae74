//! Block enumeration and per-block data.

use glam::Vec2;


/// Internal macro to easily define the blocks registry.
macro_rules! blocks {
    (
        $($ident:ident / $id:literal : $name:literal),* $(,)?
    ) => {

        /// Kind of a block, kinds are ordered by their numeric id and this order is
        /// the render order of a chunk's blocks.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        #[repr(u8)]
        pub enum BlockKind {
            #[default]
            $($ident = $id,)*
        }

        impl BlockKind {

            /// Array of all block kinds, in id order.
            pub const ALL: [Self; Self::COUNT] = [$(Self::$ident,)*];

            /// Return the name of this block kind.
            pub fn name(self) -> &'static str {
                match self {
                    $(Self::$ident => $name,)*
                }
            }

        }

    };
}

blocks! {
    Air/0:      "air",
    Dirt/1:     "dirt",
    Grass/2:    "grass",
    Stone/3:    "stone",
    Wood/4:     "wood",
    Branch/5:   "branch",
    Leaf/6:     "leaf",
}

impl BlockKind {

    /// Number of block kinds.
    pub const COUNT: usize = 7;

    #[inline]
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Index of this kind in per-kind tables.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    #[inline]
    pub fn is_air(self) -> bool {
        self == Self::Air
    }

}


/// Animation frame of grass blocks.
pub const GRASS_FRAME: u32 = 3;


/// A single block of a chunk, the position is the world position of its bottom left
/// corner, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Block {
    pub kind: BlockKind,
    pub pos: Vec2,
    pub frame: u32,
}
