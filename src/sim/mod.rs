//! Deterministic simulation module
//!
//! All gameplay logic lives here. This module must be pure and deterministic:
//! - Fixed timestep only
//! - Seeded RNG only
//! - Stable iteration order (pool slot order, registry layer order)
//! - No rendering or platform dependencies

pub mod boss;
pub mod bullet;
pub mod collision;
pub mod context;
pub mod enemy;
pub mod entity;
pub mod grid;
pub mod player;
pub mod pool;
pub mod powerup;
pub mod registry;
pub mod round;
pub mod sector;
pub mod selection;
pub mod survival;
pub mod tick;
pub mod wave;
pub mod world;

#[cfg(test)]
pub(crate) mod testing;

pub use boss::{Boss, BossKind};
pub use context::{Command, Controls, FrameContext, GameEvent, Target};
pub use entity::{DamageType, Entity, EntityClass, EntityCore, EntityFlags, Hit, Layer};
pub use grid::SpatialGrid;
pub use pool::{Handle, Pool, Poolable};
pub use registry::{EntityId, Registry};
pub use round::{Progression, RoundHost, RoundMachine, RoundState};
pub use selection::{Body, CollisionQuery, Owner, SelectionId, SelectionMap};
pub use survival::{SurvivalMachine, SurvivalState};
pub use tick::{FrameClock, TickInput, tick};
pub use wave::{Formation, Wave, WaveQueue};
pub use world::{Director, Phase, World};
