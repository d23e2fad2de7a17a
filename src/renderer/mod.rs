//! Render surface
//!
//! Entities describe themselves as `Sprite` records from `render` and
//! `render_additive`; a platform renderer turns them into draw calls. The
//! simulation never issues draw calls itself.

pub mod draw_list;

pub use draw_list::DrawList;

use glam::Vec2;

use crate::sim::entity::EntityClass;

/// One sprite to draw this frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sprite {
    pub class: EntityClass,
    pub pos: Vec2,
    pub rotation: f32,
    /// World-space radius
    pub scale: f32,
    /// Hit flash overlay
    pub flash: bool,
}

/// Receives sprites in draw order
pub trait RenderSink {
    fn draw(&mut self, sprite: Sprite);
    fn draw_additive(&mut self, sprite: Sprite);
}
