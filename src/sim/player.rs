//! The player ship

use std::any::Any;
use std::f32::consts::FRAC_PI_2;

use glam::Vec2;

use super::context::{BulletSpec, Command, FrameContext, GameEvent};
use super::entity::{DamageType, Entity, EntityClass, EntityCore, EntityFlags, Hit, Layer};
use super::powerup::PowerupKind;
use crate::audio::SoundId;
use crate::consts::*;
use crate::error::{SimError, SimResult};
use crate::renderer::{RenderSink, Sprite};

pub const MAX_WEAPON_LEVEL: u8 = 5;
pub const MAX_LIVES: u8 = 9;
/// Seconds between volleys
pub const FIRE_INTERVAL: f32 = 0.12;
/// Seconds of shield granted by a shield powerup
pub const SHIELD_TIME: f32 = 8.0;
/// Radius cleared around the player when a life is lost
pub const HIT_CLEAR_RADIUS: f32 = 160.0;

/// Angular offsets of each bullet in a volley, by weapon level
pub fn weapon_spread(level: u8) -> SimResult<&'static [f32]> {
    match level {
        1 => Ok(&[0.0]),
        2 => Ok(&[-0.04, 0.04]),
        3 => Ok(&[-0.12, 0.0, 0.12]),
        4 => Ok(&[-0.16, -0.05, 0.05, 0.16]),
        5 => Ok(&[-0.24, -0.12, 0.0, 0.12, 0.24]),
        other => Err(SimError::unreachable("weapon level", other.to_string())),
    }
}

#[derive(Debug)]
pub struct Player {
    pub core: EntityCore,
    pub lives: u8,
    pub weapon_level: u8,
    /// Seconds of powerup shield left
    pub shield: f32,
    /// Seconds of post-hit invincibility left
    pub respawn_shield: f32,
    fire_cooldown: f32,
    aim: Vec2,
}

impl Player {
    pub fn new(pos: Vec2) -> Self {
        let mut core = EntityCore::spawn(EntityClass::Player, pos);
        core.layer = Layer::Player;
        core.hit_points = PLAYER_HIT_POINTS;
        core.flags.insert(EntityFlags::FRIENDLY);
        Self {
            core,
            lives: PLAYER_LIVES,
            weapon_level: 1,
            shield: 0.0,
            respawn_shield: 0.0,
            fire_cooldown: 0.0,
            aim: Vec2::NEG_Y,
        }
    }

    pub fn aim(&self) -> Vec2 {
        self.aim
    }

    pub fn is_shielded(&self) -> bool {
        self.shield > 0.0 || self.respawn_shield > 0.0
    }

    /// Powerups that change the ship itself
    pub fn apply_powerup(&mut self, kind: PowerupKind) {
        match kind {
            PowerupKind::WeaponUp => {
                self.weapon_level = (self.weapon_level + 1).min(MAX_WEAPON_LEVEL);
            }
            PowerupKind::Shield => self.shield = SHIELD_TIME,
            PowerupKind::ExtraLife => self.lives = (self.lives + 1).min(MAX_LIVES),
            // World-level effects
            PowerupKind::SlowMotion | PowerupKind::Bomb => {}
        }
    }

    fn fire(&mut self, ctx: &mut FrameContext<'_>) {
        let single: &'static [f32] = &[0.0];
        let spread = ctx.policy.settle(weapon_spread(self.weapon_level), single);
        let base = self.aim.to_angle();
        for offset in spread {
            let dir = Vec2::from_angle(base + offset);
            ctx.push(Command::SpawnBullet(BulletSpec {
                pos: self.core.pos + dir * (self.core.radius + BULLET_RADIUS),
                vel: dir * BULLET_SPEED,
                damage: 1.0,
                friendly: true,
                ignore: self.core.selection,
                piercing: self.weapon_level >= MAX_WEAPON_LEVEL,
                lifetime: BULLET_LIFETIME,
            }));
        }
        ctx.play(SoundId::Shoot);
    }
}

impl Entity for Player {
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
        self.shield = (self.shield - dt).max(0.0);
        self.respawn_shield = (self.respawn_shield - dt).max(0.0);
        let shielded = self.is_shielded();
        self.core.flags.set(EntityFlags::INVINCIBLE, shielded);
        self.core.flags.set(EntityFlags::RENDER_ADDITIVE, shielded);

        let controls = ctx.controls;
        self.core.vel = controls.move_dir.clamp_length_max(1.0) * PLAYER_SPEED;
        self.core.pos += self.core.vel * dt;
        self.core.clamp_to(ctx.extent);

        if let Some(aim) = controls.aim_dir.filter(|a| a.length_squared() > 1e-6) {
            self.aim = aim.normalize();
        }
        self.core.rotation = self.aim.to_angle() + FRAC_PI_2;

        self.fire_cooldown = (self.fire_cooldown - dt).max(0.0);
        if controls.fire && self.fire_cooldown <= 0.0 {
            self.fire_cooldown = FIRE_INTERVAL;
            self.fire(ctx);
        }
    }

    fn render(&self, out: &mut dyn RenderSink) {
        out.draw(self.core.sprite());
    }

    fn render_additive(&self, out: &mut dyn RenderSink) {
        if self.is_shielded() {
            out.draw_additive(Sprite {
                scale: self.core.radius * 1.6,
                ..self.core.sprite()
            });
        }
    }

    fn handle_damage(&mut self, ctx: &mut FrameContext<'_>, hit: &Hit) -> bool {
        if !self.core.is_active() || self.is_shielded() || hit.amount <= 0.0 {
            return false;
        }
        self.lives = self.lives.saturating_sub(1);
        self.core.hit_flash = HIT_FLASH_TIME;
        ctx.emit(GameEvent::PlayerHit { lives: self.lives });
        if self.lives == 0 {
            self.core.hit_points = 0.0;
            self.core.kill();
            return true;
        }
        self.respawn_shield = PLAYER_RESPAWN_SHIELD;
        self.core.flags.insert(EntityFlags::INVINCIBLE);
        self.weapon_level = self.weapon_level.saturating_sub(1).max(1);
        ctx.push(Command::RadiusDamage {
            center: self.core.pos,
            radius: HIT_CLEAR_RADIUS,
            amount: 2.0,
            friendly: true,
            kind: DamageType::Explosion,
        });
        false
    }

    fn handle_damage_begin(&mut self, ctx: &mut FrameContext<'_>, _hit: &Hit) {
        if !self.is_shielded() {
            ctx.play(SoundId::PlayerHit);
        }
    }

    fn handle_die(&mut self, ctx: &mut FrameContext<'_>) {
        if self.core.is_transient() {
            return;
        }
        ctx.emit(GameEvent::PlayerDied);
        ctx.play(SoundId::GameOver);
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
    use crate::sim::context::Controls;
    use crate::sim::testing::Harness;

    fn bullet_hit() -> Hit {
        Hit::new(Vec2::ZERO, Vec2::ZERO, 1.0, DamageType::Bullet)
    }

    #[test]
    fn test_weapon_spread_table() {
        for level in 1..=MAX_WEAPON_LEVEL {
            assert_eq!(weapon_spread(level).unwrap().len(), level as usize);
        }
        assert!(weapon_spread(0).is_err());
        assert!(weapon_spread(6).is_err());
    }

    #[test]
    fn test_moves_and_fires() {
        let mut h = Harness::new();
        h.controls = Controls {
            move_dir: Vec2::X,
            aim_dir: Some(Vec2::NEG_Y),
            fire: true,
        };
        let mut player = Player::new(Vec2::new(400.0, 400.0));
        player.weapon_level = 3;
        h.with_ctx(|ctx| player.update(ctx, 0.1));
        assert!(player.core.pos.x > 400.0);
        let volley = h
            .commands
            .iter()
            .filter(|c| matches!(c, Command::SpawnBullet(b) if b.friendly))
            .count();
        assert_eq!(volley, 3);

        // Cooldown blocks the next frame
        h.commands.clear();
        h.with_ctx(|ctx| player.update(ctx, 0.01));
        assert!(h.commands.is_empty());
    }

    #[test]
    fn test_hit_costs_a_life_then_shields() {
        let mut h = Harness::new();
        let mut player = Player::new(Vec2::new(400.0, 400.0));
        assert!(!h.with_ctx(|ctx| player.handle_damage(ctx, &bullet_hit())));
        assert_eq!(player.lives, PLAYER_LIVES - 1);
        assert!(player.is_shielded());
        // Shielded: the next hit is ignored
        assert!(!h.with_ctx(|ctx| player.handle_damage(ctx, &bullet_hit())));
        assert_eq!(player.lives, PLAYER_LIVES - 1);
    }

    #[test]
    fn test_last_life_kills() {
        let mut h = Harness::new();
        let mut player = Player::new(Vec2::new(400.0, 400.0));
        player.lives = 1;
        assert!(h.with_ctx(|ctx| player.handle_damage(ctx, &bullet_hit())));
        assert!(player.core.must_reap());
        assert_eq!(player.core.hit_points, 0.0);
    }

    #[test]
    fn test_powerups() {
        let mut player = Player::new(Vec2::ZERO);
        for _ in 0..10 {
            player.apply_powerup(PowerupKind::WeaponUp);
        }
        assert_eq!(player.weapon_level, MAX_WEAPON_LEVEL);
        player.apply_powerup(PowerupKind::ExtraLife);
        assert_eq!(player.lives, PLAYER_LIVES + 1);
        player.apply_powerup(PowerupKind::Shield);
        assert!(player.is_shielded());
    }
}
