//! Collectible powerups
//!
//! Powerups live in the dynamic registry on the lowest layer. They are not
//! hittable; they check for overlap with the target themselves.

use std::any::Any;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::collision::circles_overlap;
use super::context::{Command, FrameContext, GameEvent};
use super::entity::{Entity, EntityClass, EntityCore, EntityFlags, Layer};
use crate::audio::SoundId;
use crate::consts::PLAYER_RADIUS;
use crate::renderer::RenderSink;

/// Seconds before an uncollected powerup disappears
pub const POWERUP_LIFETIME: f32 = 10.0;
/// Seconds of blinking before it disappears
const BLINK_TIME: f32 = 2.0;
const DRIFT_SPEED: f32 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PowerupKind {
    WeaponUp,
    Shield,
    SlowMotion,
    Bomb,
    ExtraLife,
}

impl PowerupKind {
    /// Pick a kind from a uniform roll in `[0, 1)`
    pub fn from_roll(roll: f32) -> Self {
        match roll {
            r if r < 0.35 => PowerupKind::WeaponUp,
            r if r < 0.60 => PowerupKind::Shield,
            r if r < 0.80 => PowerupKind::SlowMotion,
            r if r < 0.95 => PowerupKind::Bomb,
            _ => PowerupKind::ExtraLife,
        }
    }
}

#[derive(Debug)]
pub struct Powerup {
    pub core: EntityCore,
    pub kind: PowerupKind,
    age: f32,
}

impl Powerup {
    pub fn new(kind: PowerupKind, pos: Vec2) -> Self {
        let mut core = EntityCore::spawn(EntityClass::Powerup, pos);
        core.layer = Layer::Powerup;
        core.flags.insert(EntityFlags::POWERUP | EntityFlags::INVINCIBLE);
        core.vel = Vec2::new(0.0, DRIFT_SPEED);
        Self { core, kind, age: 0.0 }
    }

    fn visible(&self) -> bool {
        let left = POWERUP_LIFETIME - self.age;
        left > BLINK_TIME || (left * 8.0) as i32 % 2 == 0
    }
}

impl Entity for Powerup {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EntityCore {
        &mut self.core
    }

    fn update(&mut self, ctx: &mut FrameContext<'_>, dt: f32) {
        if !self.core.is_active() {
            return;
        }
        self.age += dt;
        self.core.pos += self.core.vel * dt;
        self.core.rotation += dt;
        self.core.clamp_to(ctx.extent);

        if let Some(target) = ctx.target {
            if circles_overlap(self.core.pos, self.core.radius, target.pos, PLAYER_RADIUS) {
                ctx.push(Command::ApplyPowerup(self.kind));
                ctx.emit(GameEvent::PowerupCollected { kind: self.kind });
                ctx.play(SoundId::PickupCollect);
                self.core.retire();
                return;
            }
        }
        if self.age >= POWERUP_LIFETIME {
            self.core.retire();
        }
    }

    fn render(&self, out: &mut dyn RenderSink) {
        if self.visible() {
            out.draw(self.core.sprite());
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::testing::Harness;

    #[test]
    fn test_from_roll_covers_all_kinds() {
        assert_eq!(PowerupKind::from_roll(0.0), PowerupKind::WeaponUp);
        assert_eq!(PowerupKind::from_roll(0.5), PowerupKind::Shield);
        assert_eq!(PowerupKind::from_roll(0.7), PowerupKind::SlowMotion);
        assert_eq!(PowerupKind::from_roll(0.9), PowerupKind::Bomb);
        assert_eq!(PowerupKind::from_roll(0.99), PowerupKind::ExtraLife);
    }

    #[test]
    fn test_collected_on_overlap() {
        let mut h = Harness::new();
        h.target = Some(Vec2::new(200.0, 200.0));
        let mut p = Powerup::new(PowerupKind::Shield, Vec2::new(205.0, 200.0));
        h.with_ctx(|ctx| p.update(ctx, 0.016));
        assert!(h.commands.contains(&Command::ApplyPowerup(PowerupKind::Shield)));
        assert!(p.core.must_reap());
        assert!(p.core.is_transient());
    }

    #[test]
    fn test_expires_uncollected() {
        let mut h = Harness::new();
        let mut p = Powerup::new(PowerupKind::Bomb, Vec2::new(100.0, 100.0));
        for _ in 0..11 {
            h.with_ctx(|ctx| p.update(ctx, 1.0));
        }
        assert!(p.core.must_reap());
        assert!(h.commands.is_empty());
    }
}
