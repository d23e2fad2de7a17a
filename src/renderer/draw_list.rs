//! Sprite batch recorder
//!
//! Collects a frame's sprites in two passes (normal, then additive) so a
//! platform renderer can upload them in one go. Also used by tests.

use super::{RenderSink, Sprite};
use crate::sim::entity::EntityClass;

#[derive(Debug, Default, Clone)]
pub struct DrawList {
    pub normal: Vec<Sprite>,
    pub additive: Vec<Sprite>,
}

impl DrawList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.normal.clear();
        self.additive.clear();
    }

    pub fn len(&self) -> usize {
        self.normal.len() + self.additive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sprites of one class across both passes
    pub fn count(&self, class: EntityClass) -> usize {
        self.normal
            .iter()
            .chain(&self.additive)
            .filter(|s| s.class == class)
            .count()
    }
}

impl RenderSink for DrawList {
    fn draw(&mut self, sprite: Sprite) {
        self.normal.push(sprite);
    }

    fn draw_additive(&mut self, sprite: Sprite) {
        self.additive.push(sprite);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    fn sprite(class: EntityClass) -> Sprite {
        Sprite {
            class,
            pos: Vec2::ZERO,
            rotation: 0.0,
            scale: 1.0,
            flash: false,
        }
    }

    #[test]
    fn test_passes_are_separate() {
        let mut list = DrawList::new();
        list.draw(sprite(EntityClass::Grunt));
        list.draw_additive(sprite(EntityClass::Bullet));
        list.draw(sprite(EntityClass::Grunt));
        assert_eq!(list.normal.len(), 2);
        assert_eq!(list.additive.len(), 1);
        assert_eq!(list.count(EntityClass::Grunt), 2);
        list.clear();
        assert!(list.is_empty());
    }
}
