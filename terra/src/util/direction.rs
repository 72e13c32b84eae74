use glam::IVec2;


/// Represent one of the four axis directions of the 2D world, y growing upward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Direction {
    Down = 0,
    Right = 1,
    Left = 2,
    Up = 3,
}

impl Direction {

    /// Array containing all 4 directions.
    pub const ALL: [Self; 4] = [Self::Down, Self::Right, Self::Left, Self::Up];

    /// Pick the next direction of a cave worm from a noise value, the four bands
    /// are not even so worms tend to go sideways and downward.
    #[inline]
    pub fn from_worm_noise(noise: f64) -> Self {
        if noise <= -0.25 {
            Self::Down
        } else if noise <= 0.20 {
            Self::Right
        } else if noise <= 0.75 {
            Self::Left
        } else {
            Self::Up
        }
    }

    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            Self::Down => Self::Up,
            Self::Right => Self::Left,
            Self::Left => Self::Right,
            Self::Up => Self::Down,
        }
    }

    /// Get the unit delta of this direction.
    #[inline]
    pub fn delta(self) -> IVec2 {
        match self {
            Self::Down => IVec2::NEG_Y,
            Self::Right => IVec2::X,
            Self::Left => IVec2::NEG_X,
            Self::Up => IVec2::Y,
        }
    }

}
