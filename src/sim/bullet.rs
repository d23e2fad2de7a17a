//! Pooled projectiles
//!
//! Bullets are not hittable themselves. Each frame the world sweeps the
//! segment from `prev` to the new position through the selection map.

use std::any::Any;

use glam::Vec2;

use super::context::{BulletSpec, FrameContext};
use super::entity::{Entity, EntityClass, EntityCore, EntityFlags};
use super::pool::Poolable;

/// Slack outside the world before a bullet is discarded
const OFFSCREEN_MARGIN: f32 = 32.0;

#[derive(Debug, Default)]
pub struct Bullet {
    pub core: EntityCore,
    pub damage: f32,
    pub lifetime: f32,
    pub piercing: bool,
    /// Position at the start of the current frame
    pub prev: Vec2,
}

impl Poolable for Bullet {
    fn initialize(&mut self) {
        *self = Self::default();
    }
}

impl Bullet {
    pub fn setup(&mut self, spec: &BulletSpec) {
        self.core = EntityCore::spawn(EntityClass::Bullet, spec.pos);
        self.core.vel = spec.vel;
        self.core.rotation = spec.vel.to_angle();
        self.core.ignore_id = spec.ignore;
        if spec.friendly {
            self.core.flags.insert(EntityFlags::FRIENDLY | EntityFlags::RENDER_ADDITIVE);
        }
        self.damage = spec.damage;
        self.lifetime = spec.lifetime;
        self.piercing = spec.piercing;
        self.prev = spec.pos;
    }

    fn out_of_bounds(&self, extent: Vec2) -> bool {
        let p = self.core.pos;
        p.x < -OFFSCREEN_MARGIN
            || p.y < -OFFSCREEN_MARGIN
            || p.x > extent.x + OFFSCREEN_MARGIN
            || p.y > extent.y + OFFSCREEN_MARGIN
    }
}

impl Entity for Bullet {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EntityCore {
        &mut self.core
    }

    fn update(&mut self, ctx: &mut FrameContext<'_>, dt: f32) {
        self.prev = self.core.pos;
        if !self.core.is_active() {
            return;
        }
        self.core.pos += self.core.vel * dt;
        self.lifetime -= dt;
        if self.lifetime <= 0.0 || self.out_of_bounds(ctx.extent) {
            self.core.retire();
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
