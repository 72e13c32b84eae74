//! Camera view given to the terrain each tick.

use glam::Vec2;


/// The part of the world visible on screen, the position is the viewport center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraView {
    pub pos: Vec2,
    pub width: f32,
    pub height: f32,
}

impl CameraView {

    #[inline]
    pub fn new(pos: Vec2, width: f32, height: f32) -> Self {
        Self { pos, width, height }
    }

    #[inline]
    pub fn half_size(&self) -> Vec2 {
        Vec2::new(self.width, self.height) * 0.5
    }

    /// Bottom left corner of the viewport.
    #[inline]
    pub fn min(&self) -> Vec2 {
        self.pos - self.half_size()
    }

    /// Top right corner of the viewport.
    #[inline]
    pub fn max(&self) -> Vec2 {
        self.pos + self.half_size()
    }

}
