//! Various math and uncategorized utilities.

mod rand;
mod direction;
pub mod noise;

pub use rand::SeedRandom;
pub use direction::Direction;


/// Linearly map a value from one range to another, the value is not clamped.
#[inline]
pub fn map_range(value: f64, from_min: f64, from_max: f64, to_min: f64, to_max: f64) -> f64 {
    to_min + (value - from_min) * (to_max - to_min) / (from_max - from_min)
}


/// A fading average
#[derive(Debug, Clone, Default)]
pub struct FadingAverage {
    value: f32,
}

impl FadingAverage {

    #[inline]
    pub fn push(&mut self, value: f32, factor: f32) {
        self.value = (self.value * (1.0 - factor)) + value * factor;
    }

    #[inline]
    pub fn get(&self) -> f32 {
        self.value
    }

}
