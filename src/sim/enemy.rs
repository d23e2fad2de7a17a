//! Small-fry enemies
//!
//! One pooled type for every small enemy; the class tag selects the behavior.

use std::any::Any;
use std::f32::consts::TAU;

use glam::Vec2;

use super::collision::reflect_velocity;
use super::context::{BulletSpec, Command, FrameContext, GameEvent};
use super::entity::{
    DamageType, Entity, EntityClass, EntityCore, EntityFlags, Hit, apply_damage,
};
use super::pool::Poolable;
use super::powerup::PowerupKind;
use crate::audio::SoundId;
use crate::consts::{BULLET_RADIUS, ENEMY_BULLET_SPEED};
use crate::error::{SimError, SimResult};
use crate::normalize_angle;

/// Chance that a destroyed enemy drops a powerup
pub const DROP_CHANCE: f32 = 0.04;
/// Splitlings spawned by a dying splitter
pub const SPLIT_COUNT: usize = 3;
/// Mine blast radius
pub const MINE_BLAST_RADIUS: f32 = 70.0;

const SNIPER_RANGE: f32 = 320.0;
const SNIPER_FIRE_INTERVAL: f32 = 2.4;
const BANDIT_ORBIT: f32 = 220.0;
const BANDIT_FIRE_INTERVAL: f32 = 3.2;
const SEEKER_ACCEL: f32 = 360.0;

#[derive(Debug, Default)]
pub struct Enemy {
    pub core: EntityCore,
    /// Seconds since spawn
    age: f32,
    /// Per-instance phase offset for sway/orbit patterns
    phase: f32,
    fire_timer: f32,
}

impl Poolable for Enemy {
    fn initialize(&mut self) {
        *self = Self::default();
    }
}

impl Enemy {
    /// Configure a freshly allocated slot
    pub fn setup(&mut self, class: EntityClass, pos: Vec2, vel: Vec2, phase: f32) -> SimResult<()> {
        if !class.is_small_fry() {
            return Err(SimError::unreachable("small-fry class", class.as_str()));
        }
        self.core = EntityCore::spawn(class, pos);
        self.core.vel = vel;
        self.core.flags.insert(EntityFlags::POSITION_TRACKED);
        self.phase = phase;
        self.fire_timer = match class {
            EntityClass::Sniper => SNIPER_FIRE_INTERVAL * (0.5 + phase / TAU),
            EntityClass::Bandit => BANDIT_FIRE_INTERVAL,
            _ => 0.0,
        };
        if class == EntityClass::Bouncer && vel == Vec2::ZERO {
            self.core.vel = Vec2::from_angle(phase) * class.speed();
        }
        Ok(())
    }

    pub fn age(&self) -> f32 {
        self.age
    }

    fn steer(&self, ctx: &FrameContext<'_>, speed: f32, dt: f32) -> Vec2 {
        let pos = self.core.pos;
        let class = self.core.class;
        let Some(dir) = ctx.aim_at_target(pos) else {
            return self.core.vel;
        };
        let dist = ctx.target.map(|t| t.pos.distance(pos)).unwrap_or(0.0);
        let side = dir.perp();

        match class {
            EntityClass::Grunt
            | EntityClass::Splitter
            | EntityClass::Splitling
            | EntityClass::Drone => dir * speed,
            EntityClass::Weaver => {
                let sway = (self.age * 4.0 + self.phase).sin() * 0.9;
                (dir + side * sway).normalize_or_zero() * speed
            }
            EntityClass::Spinner => (dir * 0.45 + side * 0.9).normalize_or_zero() * speed,
            EntityClass::Sniper => {
                if dist < SNIPER_RANGE * 0.8 {
                    -dir * speed
                } else if dist > SNIPER_RANGE * 1.2 {
                    dir * speed
                } else {
                    side * speed * 0.3
                }
            }
            EntityClass::Bandit => {
                if dist < BANDIT_ORBIT * 0.6 {
                    (-dir + side * 0.5).normalize_or_zero() * speed * 1.4
                } else {
                    let radial = if dist > BANDIT_ORBIT { 0.5 } else { -0.2 };
                    (dir * radial + side).normalize_or_zero() * speed
                }
            }
            EntityClass::Seeker => {
                let v = self.core.vel + dir * SEEKER_ACCEL * ctx.speed * dt;
                v.clamp_length_max(speed)
            }
            EntityClass::Mine | EntityClass::Bouncer => self.core.vel,
            _ => self.core.vel,
        }
    }

    /// Push apart from nearby tracked bodies so swarms do not stack
    fn separation(&self, ctx: &FrameContext<'_>) -> Vec2 {
        let me = self.core.selection;
        let pos = self.core.pos;
        let reach = self.core.radius * 2.5;
        let mut push = Vec2::ZERO;
        ctx.for_each_neighbor(pos, reach, |id, body| {
            if Some(id) == me || body.friendly {
                return;
            }
            let away = pos - body.pos;
            let d = away.length();
            if d > f32::EPSILON {
                push += away / d * (1.0 - d / reach);
            }
        });
        push
    }

    fn shoot(&mut self, ctx: &mut FrameContext<'_>) {
        let Some(dir) = ctx.aim_at_target(self.core.pos) else {
            return;
        };
        ctx.push(Command::SpawnBullet(BulletSpec {
            pos: self.core.pos + dir * (self.core.radius + BULLET_RADIUS),
            vel: dir * ENEMY_BULLET_SPEED * ctx.speed.max(1.0),
            damage: 1.0,
            friendly: false,
            ignore: self.core.selection,
            piercing: false,
            lifetime: 3.0,
        }));
        ctx.play(SoundId::EnemyShoot);
    }
}

impl Entity for Enemy {
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
        let class = self.core.class;
        let speed = class.speed() * ctx.speed;

        let mut vel = self.steer(ctx, speed, dt);
        if class != EntityClass::Mine && class != EntityClass::Bouncer {
            vel += self.separation(ctx) * speed * 0.5;
        }
        self.core.vel = vel;
        self.core.pos += vel * dt;

        let extent = ctx.extent;
        if class == EntityClass::Bouncer {
            let r = self.core.radius;
            if self.core.pos.x < r || self.core.pos.x > extent.x - r {
                self.core.vel = reflect_velocity(self.core.vel, Vec2::X);
            }
            if self.core.pos.y < r || self.core.pos.y > extent.y - r {
                self.core.vel = reflect_velocity(self.core.vel, Vec2::Y);
            }
        }
        self.core.clamp_to(extent);

        if class == EntityClass::Mine {
            self.core.rotation = normalize_angle(self.core.rotation + dt * 1.5);
        } else if vel.length_squared() > 1e-6 {
            self.core.rotation = vel.to_angle();
        }

        if matches!(class, EntityClass::Sniper | EntityClass::Bandit) {
            self.fire_timer -= dt * ctx.speed;
            if self.fire_timer <= 0.0 {
                self.fire_timer += if class == EntityClass::Sniper {
                    SNIPER_FIRE_INTERVAL
                } else {
                    BANDIT_FIRE_INTERVAL
                };
                self.shoot(ctx);
            }
        }
    }

    fn handle_damage(&mut self, _ctx: &mut FrameContext<'_>, hit: &Hit) -> bool {
        let amount = match (self.core.class, hit.kind) {
            (EntityClass::Drone, DamageType::Fire) => 0.0,
            (EntityClass::Splitter, DamageType::Fire) => hit.amount * 0.5,
            _ => hit.amount,
        };
        apply_damage(&mut self.core, amount)
    }

    fn handle_damage_begin(&mut self, ctx: &mut FrameContext<'_>, _hit: &Hit) {
        ctx.play(SoundId::Hit);
    }

    fn handle_die(&mut self, ctx: &mut FrameContext<'_>) {
        // Retired objects leave without rewards
        if self.core.is_transient() {
            return;
        }
        let class = self.core.class;
        let pos = self.core.pos;
        ctx.push(Command::AddScore(class.score()));
        ctx.emit(GameEvent::EnemyKilled { class });
        ctx.play(SoundId::Explode);

        match class {
            EntityClass::Splitter => {
                for i in 0..SPLIT_COUNT {
                    let dir = Vec2::from_angle(self.phase + i as f32 * TAU / SPLIT_COUNT as f32);
                    ctx.push(Command::SpawnEnemy {
                        class: EntityClass::Splitling,
                        pos: pos + dir * self.core.radius,
                        vel: dir * EntityClass::Splitling.speed(),
                    });
                }
            }
            EntityClass::Mine => ctx.push(Command::RadiusDamage {
                center: pos,
                radius: MINE_BLAST_RADIUS,
                amount: 1.0,
                friendly: false,
                kind: DamageType::Explosion,
            }),
            _ => {}
        }

        if ctx.random() < DROP_CHANCE {
            let roll = ctx.random();
            ctx.push(Command::SpawnPowerup {
                kind: PowerupKind::from_roll(roll),
                pos,
            });
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

    fn spawn(class: EntityClass, pos: Vec2) -> Enemy {
        let mut enemy = Enemy::default();
        enemy.setup(class, pos, Vec2::ZERO, 0.0).unwrap();
        enemy
    }

    #[test]
    fn test_setup_rejects_bosses() {
        let mut enemy = Enemy::default();
        let err = enemy.setup(EntityClass::MaxiBoss, Vec2::ZERO, Vec2::ZERO, 0.0);
        assert!(matches!(err, Err(SimError::Unreachable { .. })));
        assert!(!enemy.core.alive);
    }

    #[test]
    fn test_grunt_walks_toward_target() {
        let mut h = Harness::new();
        h.target = Some(Vec2::new(500.0, 100.0));
        let mut grunt = spawn(EntityClass::Grunt, Vec2::new(100.0, 100.0));
        let before = grunt.core.pos.distance(Vec2::new(500.0, 100.0));
        h.with_ctx(|ctx| grunt.update(ctx, 0.1));
        let after = grunt.core.pos.distance(Vec2::new(500.0, 100.0));
        assert!(after < before);
    }

    #[test]
    fn test_mine_stays_put() {
        let mut h = Harness::new();
        h.target = Some(Vec2::new(500.0, 100.0));
        let mut mine = spawn(EntityClass::Mine, Vec2::new(100.0, 100.0));
        h.with_ctx(|ctx| mine.update(ctx, 0.5));
        assert_eq!(mine.core.pos, Vec2::new(100.0, 100.0));
    }

    #[test]
    fn test_bouncer_reflects_off_walls() {
        let mut h = Harness::new();
        let mut bouncer = Enemy::default();
        bouncer
            .setup(EntityClass::Bouncer, Vec2::new(20.0, 300.0), Vec2::new(-150.0, 40.0), 0.0)
            .unwrap();
        h.with_ctx(|ctx| bouncer.update(ctx, 0.1));
        assert_eq!(bouncer.core.vel, Vec2::new(150.0, 40.0));
        assert!(bouncer.core.pos.x >= 0.0);
    }

    #[test]
    fn test_sniper_fires_on_timer() {
        let mut h = Harness::new();
        h.target = Some(Vec2::new(400.0, 100.0));
        let mut sniper = spawn(EntityClass::Sniper, Vec2::new(100.0, 100.0));
        for _ in 0..200 {
            h.with_ctx(|ctx| sniper.update(ctx, 1.0 / 60.0));
        }
        let shots = h
            .commands
            .iter()
            .filter(|c| matches!(c, Command::SpawnBullet(b) if !b.friendly))
            .count();
        assert!(shots >= 1);
    }

    #[test]
    fn test_splitter_spawns_splitlings_on_death() {
        let mut h = Harness::new();
        let mut splitter = spawn(EntityClass::Splitter, Vec2::new(300.0, 300.0));
        splitter.core.kill();
        h.with_ctx(|ctx| splitter.handle_die(ctx));
        let splitlings = h
            .commands
            .iter()
            .filter(|c| matches!(c, Command::SpawnEnemy { class: EntityClass::Splitling, .. }))
            .count();
        assert_eq!(splitlings, SPLIT_COUNT);
        assert!(h.commands.contains(&Command::AddScore(EntityClass::Splitter.score())));
    }

    #[test]
    fn test_retired_enemy_gives_no_reward() {
        let mut h = Harness::new();
        let mut grunt = spawn(EntityClass::Grunt, Vec2::new(300.0, 300.0));
        grunt.core.retire();
        h.with_ctx(|ctx| grunt.handle_die(ctx));
        assert!(h.commands.is_empty());
        assert!(h.events.is_empty());
    }

    #[test]
    fn test_drone_ignores_fire() {
        let mut h = Harness::new();
        let mut drone = spawn(EntityClass::Drone, Vec2::ZERO);
        let hit = Hit::new(Vec2::ZERO, Vec2::ZERO, 10.0, DamageType::Fire);
        let killed = h.with_ctx(|ctx| drone.handle_damage(ctx, &hit));
        assert!(!killed);
        assert_eq!(drone.core.hit_points, EntityClass::Drone.base_hit_points());
    }

    #[test]
    fn test_initialize_resets_everything() {
        let mut grunt = spawn(EntityClass::Seeker, Vec2::new(10.0, 10.0));
        grunt.age = 3.0;
        grunt.initialize();
        assert!(!grunt.core.alive);
        assert_eq!(grunt.age, 0.0);
        assert_eq!(grunt.core.flags, EntityFlags::NONE);
    }
}
