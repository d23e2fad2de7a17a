//! Per-frame simulation context handed to entities
//!
//! Entities never reach into the world. They read what they need from the
//! context (target, time, neighbors) and push `Command`s that the world applies
//! at the end of the update phase, before reaping.

use glam::Vec2;
use rand_pcg::Pcg32;

use super::boss::BossKind;
use super::entity::{DamageType, EntityClass, EntityCore};
use super::grid::SpatialGrid;
use super::powerup::PowerupKind;
use super::registry::EntityId;
use super::selection::{Body, SelectionId, SelectionMap};
use crate::audio::{AudioSink, PlayFlags, SoundId};
use crate::error::ErrorPolicy;

/// The object enemies chase (the player)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Target {
    pub pos: Vec2,
    pub vel: Vec2,
    pub selection: Option<SelectionId>,
}

/// Player controls for the current frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Controls {
    /// Movement direction (not normalized)
    pub move_dir: Vec2,
    /// Aim direction; `None` keeps the last aim
    pub aim_dir: Option<Vec2>,
    pub fire: bool,
}

/// Construction parameters for a bullet
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BulletSpec {
    pub pos: Vec2,
    pub vel: Vec2,
    pub damage: f32,
    pub friendly: bool,
    /// Shooter excluded from this bullet's hits
    pub ignore: Option<SelectionId>,
    pub piercing: bool,
    pub lifetime: f32,
}

/// Deferred world mutation requested by an entity
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SpawnBullet(BulletSpec),
    SpawnEnemy {
        class: EntityClass,
        pos: Vec2,
        vel: Vec2,
    },
    SpawnPowerup {
        kind: PowerupKind,
        pos: Vec2,
    },
    /// Damage every opposing body within `radius`, and the sectors under it
    RadiusDamage {
        center: Vec2,
        radius: f32,
        amount: f32,
        friendly: bool,
        kind: DamageType,
    },
    DestroySector {
        pos: Vec2,
    },
    AddScore(u64),
    /// Slow time down for `seconds`
    Shock {
        seconds: f32,
    },
    ApplyPowerup(PowerupKind),
}

/// Notable things that happened this frame, for the frontend and for
/// aggregate counters
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    EnemyKilled { class: EntityClass },
    BossDefeated { kind: BossKind },
    PlayerHit { lives: u8 },
    PlayerDied,
    PowerupCollected { kind: PowerupKind },
    SectorDestroyed { x: usize, y: usize },
    /// A registry entity was removed by the reap pass
    Removed { id: EntityId, class: EntityClass },
    WaveStarted { level: u32, wave: u32 },
    BossArrived { kind: BossKind },
    LevelCleared { level: u32 },
}

pub struct FrameContext<'a> {
    /// Seconds since session start
    pub time: f32,
    /// Level speed multiplier
    pub speed: f32,
    /// World extents
    pub extent: Vec2,
    pub target: Option<Target>,
    pub controls: Controls,
    /// What to do with unreachable branches hit during the frame
    pub policy: ErrorPolicy,
    pub selection: &'a mut SelectionMap,
    pub grid: &'a mut SpatialGrid<SelectionId>,
    pub rng: &'a mut Pcg32,
    pub audio: &'a mut dyn AudioSink,
    pub commands: &'a mut Vec<Command>,
    pub events: &'a mut Vec<GameEvent>,
}

impl FrameContext<'_> {
    #[inline]
    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    #[inline]
    pub fn emit(&mut self, event: GameEvent) {
        self.events.push(event);
    }

    #[inline]
    pub fn play(&mut self, sound: SoundId) {
        self.audio.play(sound, PlayFlags::ONCE);
    }

    /// Register or move the core's body in the selection map and grid
    pub fn track(&mut self, core: &mut EntityCore) {
        let Some(owner) = core.owner else { return };
        let body = Body::from_core(core, owner);
        self.selection.sync(self.grid, &mut core.selection, body);
    }

    /// Register or move an extra body part (boss segments)
    pub fn track_part(&mut self, slot: &mut Option<SelectionId>, body: Body) {
        self.selection.sync(self.grid, slot, body);
    }

    pub fn untrack(&mut self, core: &mut EntityCore) {
        self.selection.release(self.grid, &mut core.selection);
    }

    pub fn untrack_part(&mut self, slot: &mut Option<SelectionId>) {
        self.selection.release(self.grid, slot);
    }

    /// Visit grid-tracked bodies whose centers lie within `radius` of `pos`
    pub fn for_each_neighbor(&self, pos: Vec2, radius: f32, mut f: impl FnMut(SelectionId, &Body)) {
        let selection = &*self.selection;
        let reach = Vec2::splat(radius);
        self.grid.for_each_in_area(pos - reach, pos + reach, |id| {
            if let Some(body) = selection.get(id) {
                if body.pos.distance_squared(pos) <= radius * radius {
                    f(id, body);
                }
            }
        });
    }

    /// Uniform random float in `[0, 1)`
    pub fn random(&mut self) -> f32 {
        use rand::Rng;
        self.rng.random::<f32>()
    }

    /// Direction from `from` toward the target, if there is one
    pub fn aim_at_target(&self, from: Vec2) -> Option<Vec2> {
        self.target
            .map(|t| (t.pos - from).normalize_or_zero())
            .filter(|d| *d != Vec2::ZERO)
    }
}
