//! Shared contract for every live simulated object
//!
//! All variants carry an `EntityCore` (lifecycle flags, class tag, layer,
//! kinematics, hit points) and implement `Entity` for the per-class behavior.
//! Lifecycle: `Uninitialized -> Alive -> Dying (MUST_REAP) -> Reaped`, where the
//! last step only ever happens in the reap pass at the end of a frame.

use std::any::Any;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::context::FrameContext;
use super::selection::{Owner, SelectionId};
use crate::consts::HIT_FLASH_TIME;
use crate::error::{SimError, SimResult};
use crate::renderer::{RenderSink, Sprite};

/// Class tag of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EntityClass {
    Player,
    Powerup,
    Bullet,
    /// Walks straight at the target
    #[default]
    Grunt,
    /// Chases with a sideways sway
    Weaver,
    /// Circles the target while closing in
    Spinner,
    /// Stationary proximity mine
    Mine,
    /// Splits into splitlings on death
    Splitter,
    Splitling,
    /// Bounces off the world edges
    Bouncer,
    /// Keeps its distance and shoots
    Sniper,
    /// Accelerates toward the target
    Seeker,
    /// Circles at range, fleeing when approached
    Bandit,
    /// Boss escort
    Drone,
    MiniBoss,
    MiniBossSegment,
    MaxiBoss,
    MaxiBossSegment,
    SectorWreck,
}

impl EntityClass {
    pub const SMALL_FRY: [EntityClass; 11] = [
        EntityClass::Grunt,
        EntityClass::Weaver,
        EntityClass::Spinner,
        EntityClass::Mine,
        EntityClass::Splitter,
        EntityClass::Splitling,
        EntityClass::Bouncer,
        EntityClass::Sniper,
        EntityClass::Seeker,
        EntityClass::Bandit,
        EntityClass::Drone,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityClass::Player => "player",
            EntityClass::Powerup => "powerup",
            EntityClass::Bullet => "bullet",
            EntityClass::Grunt => "grunt",
            EntityClass::Weaver => "weaver",
            EntityClass::Spinner => "spinner",
            EntityClass::Mine => "mine",
            EntityClass::Splitter => "splitter",
            EntityClass::Splitling => "splitling",
            EntityClass::Bouncer => "bouncer",
            EntityClass::Sniper => "sniper",
            EntityClass::Seeker => "seeker",
            EntityClass::Bandit => "bandit",
            EntityClass::Drone => "drone",
            EntityClass::MiniBoss => "mini_boss",
            EntityClass::MiniBossSegment => "mini_boss_segment",
            EntityClass::MaxiBoss => "maxi_boss",
            EntityClass::MaxiBossSegment => "maxi_boss_segment",
            EntityClass::SectorWreck => "sector_wreck",
        }
    }

    pub fn from_name(name: &str) -> SimResult<Self> {
        let lower = name.to_lowercase();
        Self::SMALL_FRY
            .iter()
            .chain(&[
                EntityClass::Player,
                EntityClass::Powerup,
                EntityClass::Bullet,
                EntityClass::MiniBoss,
                EntityClass::MiniBossSegment,
                EntityClass::MaxiBoss,
                EntityClass::MaxiBossSegment,
                EntityClass::SectorWreck,
            ])
            .copied()
            .find(|c| c.as_str() == lower)
            .ok_or_else(|| SimError::unreachable("entity class", name))
    }

    /// Pool-managed enemy classes
    pub fn is_small_fry(&self) -> bool {
        Self::SMALL_FRY.contains(self)
    }

    /// Whether a live instance holds back the alive-count wave gate
    pub fn counts_for_wave(&self) -> bool {
        self.is_small_fry() && !matches!(self, EntityClass::Mine | EntityClass::Drone)
    }

    pub fn base_hit_points(&self) -> f32 {
        match self {
            EntityClass::Grunt | EntityClass::Splitling | EntityClass::Mine => 1.0,
            EntityClass::Weaver | EntityClass::Bouncer | EntityClass::Drone => 2.0,
            EntityClass::Spinner | EntityClass::Seeker | EntityClass::Bandit => 3.0,
            EntityClass::Splitter | EntityClass::Sniper => 4.0,
            EntityClass::MiniBoss => 60.0,
            EntityClass::MiniBossSegment => 12.0,
            EntityClass::MaxiBoss => 150.0,
            EntityClass::MaxiBossSegment => 20.0,
            EntityClass::Player | EntityClass::Powerup => 1.0,
            EntityClass::Bullet | EntityClass::SectorWreck => 1.0,
        }
    }

    pub fn radius(&self) -> f32 {
        match self {
            EntityClass::Splitling | EntityClass::Drone => 8.0,
            EntityClass::Mine => 10.0,
            EntityClass::Grunt | EntityClass::Weaver | EntityClass::Seeker => 12.0,
            EntityClass::Spinner | EntityClass::Bouncer | EntityClass::Bandit => 14.0,
            EntityClass::Splitter | EntityClass::Sniper => 16.0,
            EntityClass::MiniBoss => 36.0,
            EntityClass::MiniBossSegment => 18.0,
            EntityClass::MaxiBoss => 56.0,
            EntityClass::MaxiBossSegment => 24.0,
            EntityClass::Player => crate::consts::PLAYER_RADIUS,
            EntityClass::Powerup => 12.0,
            EntityClass::Bullet => crate::consts::BULLET_RADIUS,
            EntityClass::SectorWreck => 60.0,
        }
    }

    /// Base movement speed in units/s before the level speed multiplier
    pub fn speed(&self) -> f32 {
        match self {
            EntityClass::Mine => 0.0,
            EntityClass::Grunt => 90.0,
            EntityClass::Weaver => 110.0,
            EntityClass::Spinner => 130.0,
            EntityClass::Splitter => 70.0,
            EntityClass::Splitling => 170.0,
            EntityClass::Bouncer => 150.0,
            EntityClass::Sniper => 60.0,
            EntityClass::Seeker => 240.0,
            EntityClass::Bandit => 140.0,
            EntityClass::Drone => 120.0,
            _ => 0.0,
        }
    }

    pub fn score(&self) -> u64 {
        match self {
            EntityClass::Grunt | EntityClass::Splitling | EntityClass::Mine => 10,
            EntityClass::Weaver | EntityClass::Drone => 20,
            EntityClass::Spinner | EntityClass::Bouncer => 30,
            EntityClass::Splitter | EntityClass::Seeker => 40,
            EntityClass::Sniper | EntityClass::Bandit => 50,
            EntityClass::MiniBossSegment => 100,
            EntityClass::MaxiBossSegment => 200,
            EntityClass::MiniBoss => 1_000,
            EntityClass::MaxiBoss => 5_000,
            _ => 0,
        }
    }
}

/// Draw/update ordering bucket for the dynamic registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum Layer {
    Powerup,
    #[default]
    Player,
    Boss,
    Effect,
}

/// Cross-cutting entity flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct EntityFlags(u16);

impl EntityFlags {
    pub const NONE: Self = Self(0);
    /// Dead; the reap pass calls `handle_die` and reclaims the slot
    pub const MUST_REAP: Self = Self(1 << 0);
    pub const MINI_BOSS: Self = Self(1 << 1);
    pub const MAXI_BOSS: Self = Self(1 << 2);
    pub const MINI_BOSS_SEGMENT: Self = Self(1 << 3);
    pub const MAXI_BOSS_SEGMENT: Self = Self(1 << 4);
    pub const INVINCIBLE: Self = Self(1 << 5);
    /// On the player's side
    pub const FRIENDLY: Self = Self(1 << 6);
    /// Tracked by the spatial grid
    pub const POSITION_TRACKED: Self = Self(1 << 7);
    pub const POWERUP: Self = Self(1 << 8);
    pub const RENDER_ADDITIVE: Self = Self(1 << 9);
    /// Mid-death-sequence; hidden from target queries
    pub const TRANSIENT: Self = Self(1 << 10);

    #[inline]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    #[inline]
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    #[inline]
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    #[inline]
    pub fn set(&mut self, other: Self, on: bool) {
        if on {
            self.insert(other);
        } else {
            self.remove(other);
        }
    }

    pub fn bits(self) -> u16 {
        self.0
    }
}

impl std::ops::BitOr for EntityFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Kind of damage, for type-specific defense rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DamageType {
    #[default]
    Bullet,
    Contact,
    Explosion,
    /// Damage over time (burning wrecks)
    Fire,
}

/// One damage application
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub point: Vec2,
    pub impact_velocity: Vec2,
    pub amount: f32,
    pub kind: DamageType,
    /// Body part that was hit (0 = main body, boss segments are 1..)
    pub part: u16,
}

impl Hit {
    pub fn new(point: Vec2, impact_velocity: Vec2, amount: f32, kind: DamageType) -> Self {
        Self {
            point,
            impact_velocity,
            amount,
            kind,
            part: 0,
        }
    }
}

/// Derived lifecycle stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Life {
    Uninitialized,
    Alive,
    Dying,
}

/// State shared by every entity variant
#[derive(Debug, Clone, Default)]
pub struct EntityCore {
    pub class: EntityClass,
    pub layer: Layer,
    pub alive: bool,
    pub flags: EntityFlags,
    /// Never negative
    pub hit_points: f32,
    pub pos: Vec2,
    /// Bounding radius used for hit tests
    pub radius: f32,
    pub vel: Vec2,
    pub rotation: f32,
    /// Selection id excluded from this object's damage (a bullet's shooter)
    pub ignore_id: Option<SelectionId>,
    /// Slot in the selection map, while registered
    pub selection: Option<SelectionId>,
    /// Where this object is stored (pool slot or registry key)
    pub owner: Option<Owner>,
    /// Remaining hit-flash time, set by every damage application
    pub hit_flash: f32,
    pub damaged_now: bool,
    pub damage_streak: bool,
}

impl EntityCore {
    /// Fresh, alive core for a class
    pub fn spawn(class: EntityClass, pos: Vec2) -> Self {
        Self {
            class,
            alive: true,
            hit_points: class.base_hit_points(),
            pos,
            radius: class.radius(),
            ..Default::default()
        }
    }

    pub fn life(&self) -> Life {
        if !self.alive {
            Life::Uninitialized
        } else if self.flags.contains(EntityFlags::MUST_REAP) {
            Life::Dying
        } else {
            Life::Alive
        }
    }

    /// Alive and not yet flagged for reaping
    #[inline]
    pub fn is_active(&self) -> bool {
        self.life() == Life::Alive
    }

    #[inline]
    pub fn must_reap(&self) -> bool {
        self.alive && self.flags.contains(EntityFlags::MUST_REAP)
    }

    #[inline]
    pub fn is_friendly(&self) -> bool {
        self.flags.contains(EntityFlags::FRIENDLY)
    }

    #[inline]
    pub fn is_transient(&self) -> bool {
        self.flags.contains(EntityFlags::TRANSIENT)
    }

    #[inline]
    pub fn is_invincible(&self) -> bool {
        self.flags.contains(EntityFlags::INVINCIBLE)
    }

    /// Flag for the reap pass. Safe to call repeatedly.
    pub fn kill(&mut self) {
        if self.alive {
            self.flags.insert(EntityFlags::MUST_REAP);
        }
    }

    /// Kill without rewards (bullets expiring, pickups collected)
    pub fn retire(&mut self) {
        self.kill();
        self.flags.insert(EntityFlags::TRANSIENT);
    }

    /// Per-frame bookkeeping after every update and damage pass
    pub fn end_frame(&mut self, dt: f32) {
        self.damage_streak = self.damaged_now;
        self.damaged_now = false;
        self.hit_flash = (self.hit_flash - dt).max(0.0);
    }

    /// True when a damage call this frame starts a new contact streak
    pub fn begins_damage(&self) -> bool {
        !self.damage_streak && !self.damaged_now
    }

    /// Keep the body inside `[0, extent]`
    pub fn clamp_to(&mut self, extent: Vec2) {
        self.pos = self.pos.clamp(Vec2::ZERO, extent);
    }

    pub fn sprite(&self) -> Sprite {
        Sprite {
            class: self.class,
            pos: self.pos,
            rotation: self.rotation,
            scale: self.radius,
            flash: self.hit_flash > 0.0,
        }
    }
}

/// Base damage reducer: clamp hit points at zero, trigger the hit flash and
/// flag the object for reaping when it runs out. Returns true on the killing
/// blow (only once per object).
pub fn apply_damage(core: &mut EntityCore, amount: f32) -> bool {
    if !core.alive || core.is_invincible() || amount <= 0.0 {
        return false;
    }
    core.hit_flash = HIT_FLASH_TIME;
    let was_dying = core.must_reap();
    core.hit_points = (core.hit_points - amount).max(0.0);
    if core.hit_points <= 0.0 && !was_dying {
        core.kill();
        return true;
    }
    false
}

/// Capability set of every live object
pub trait Entity: Any {
    fn core(&self) -> &EntityCore;
    fn core_mut(&mut self) -> &mut EntityCore;

    /// Advance simulation state. Never renders or plays audio directly except
    /// through the context's event surfaces.
    fn update(&mut self, ctx: &mut FrameContext<'_>, dt: f32);

    fn render(&self, out: &mut dyn RenderSink) {
        let core = self.core();
        if !core.flags.contains(EntityFlags::RENDER_ADDITIVE) {
            out.draw(core.sprite());
        }
    }

    fn render_additive(&self, out: &mut dyn RenderSink) {
        let core = self.core();
        if core.flags.contains(EntityFlags::RENDER_ADDITIVE) {
            out.draw_additive(core.sprite());
        }
    }

    /// Apply damage. Variants add their own defense rules and then defer to
    /// `apply_damage`. Returns true on the killing blow.
    fn handle_damage(&mut self, _ctx: &mut FrameContext<'_>, hit: &Hit) -> bool {
        apply_damage(self.core_mut(), hit.amount)
    }

    /// Fire-once side effects at the start of a damage streak
    fn handle_damage_begin(&mut self, _ctx: &mut FrameContext<'_>, _hit: &Hit) {}

    /// Terminal transition, called exactly once by the reap pass
    fn handle_die(&mut self, _ctx: &mut FrameContext<'_>) {}

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
