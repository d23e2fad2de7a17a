//! Shmup Core - real-time simulation core of a 2D arcade shooter
//!
//! Core modules:
//! - `sim`: Deterministic simulation (pools, spatial grid, entities, waves, rounds)
//! - `settings`: World extents, pool capacities and difficulty tuning
//! - `persistence`: Save archive used by the sector grid and session counters
//! - `audio`: Audio surface the entities call into
//! - `renderer`: Render surface the entities draw into

pub mod audio;
pub mod error;
pub mod persistence;
pub mod renderer;
pub mod settings;
pub mod sim;

pub use error::{ErrorPolicy, SimError};
pub use settings::{Difficulty, Settings};

use glam::Vec2;

/// Game configuration constants
pub mod consts {
    /// Fixed simulation timestep (60 Hz)
    pub const SIM_DT: f32 = 1.0 / 60.0;
    /// Maximum substeps per frame to prevent spiral of death
    pub const MAX_SUBSTEPS: u32 = 4;

    /// Default play-field extents
    pub const WORLD_WIDTH: f32 = 1600.0;
    pub const WORLD_HEIGHT: f32 = 1200.0;
    /// Spatial grid cell size
    pub const GRID_CELL_SIZE: f32 = 100.0;

    /// Default pool capacities
    pub const ENEMY_POOL_SIZE: usize = 256;
    pub const BULLET_POOL_SIZE: usize = 512;
    pub const SECTOR_POOL_SIZE: usize = 64;

    /// Destructible sector grid (cells across the world)
    pub const SECTOR_COLUMNS: usize = 8;
    pub const SECTOR_ROWS: usize = 6;

    /// Player defaults
    pub const PLAYER_RADIUS: f32 = 14.0;
    pub const PLAYER_SPEED: f32 = 320.0;
    pub const PLAYER_HIT_POINTS: f32 = 1.0;
    pub const PLAYER_LIVES: u8 = 3;
    /// Invincibility after being hit (seconds)
    pub const PLAYER_RESPAWN_SHIELD: f32 = 2.0;

    /// Bullet defaults
    pub const BULLET_RADIUS: f32 = 4.0;
    pub const BULLET_SPEED: f32 = 900.0;
    pub const BULLET_LIFETIME: f32 = 1.5;
    pub const ENEMY_BULLET_SPEED: f32 = 320.0;

    /// Duration of the hit flash triggered by any damage (seconds)
    pub const HIT_FLASH_TIME: f32 = 0.1;
}

/// Normalized angle to [-π, π)
#[inline]
pub fn normalize_angle(mut angle: f32) -> f32 {
    use std::f32::consts::PI;
    while angle >= PI {
        angle -= 2.0 * PI;
    }
    while angle < -PI {
        angle += 2.0 * PI;
    }
    angle
}

/// Convert polar (r, theta) to cartesian (x, y)
#[inline]
pub fn polar_to_cartesian(r: f32, theta: f32) -> Vec2 {
    Vec2::new(r * theta.cos(), r * theta.sin())
}

/// Linear interpolation between two scalars
#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}
