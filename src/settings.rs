//! Session configuration
//!
//! World extents, pool capacities and per-difficulty tuning, supplied when a
//! world is set up. Stored as JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::error::{ErrorPolicy, SimError, SimResult};

/// Difficulty preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Difficulty {
    Easy,
    #[default]
    Normal,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Normal => "Normal",
            Difficulty::Hard => "Hard",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "easy" => Some(Difficulty::Easy),
            "normal" | "medium" => Some(Difficulty::Normal),
            "hard" => Some(Difficulty::Hard),
            _ => None,
        }
    }

    /// Tuning table for this preset
    pub fn tuning(&self) -> Tuning {
        let normal = Tuning::default();
        match self {
            Difficulty::Easy => Tuning {
                extra_waves_per_level: 0,
                wave_size: 6,
                wave_size_per_level: 1,
                alive_threshold: 3,
                wave_timer: 10.0,
                speed_ramp: 0.05,
                max_speed: 1.6,
                maxi_boss_every: 2,
                support_base: 1,
                support_per_level: 0,
                ..normal
            },
            Difficulty::Normal => normal,
            Difficulty::Hard => Tuning {
                wave_cooldown: 1.0,
                extra_waves_per_level: 2,
                wave_size: 10,
                wave_size_per_level: 3,
                spawn_interval: 0.1,
                alive_threshold: 4,
                wave_timer: 6.0,
                base_speed: 1.15,
                speed_ramp: 0.12,
                max_speed: 2.5,
                support_base: 4,
                support_per_level: 2,
                ..normal
            },
        }
    }
}

/// Which progression runs the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum GameMode {
    /// Waves, mini boss, maxi boss, level cleared
    #[default]
    Campaign,
    /// Endless swarms with timed surges, no bosses
    Survival,
}

/// When the wave sub-machine may spawn the next wave
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum WaveGate {
    /// Once live non-exempt enemies drop to the alive threshold
    #[default]
    AliveCount,
    /// Once the wave timer runs out
    Timed,
}

/// Per-difficulty numbers driving progression
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    /// Seconds in `Idle` before the first wave of a level
    pub idle_cooldown: f32,
    /// Seconds between a wave gate opening and the next spawn
    pub wave_cooldown: f32,
    /// Seconds of warning before the boss arrives
    pub boss_cooldown: f32,
    /// Seconds in `LevelCleared` before the next level
    pub level_clear_cooldown: f32,

    pub base_wave_count: u32,
    pub extra_waves_per_level: u32,
    pub max_wave_count: u32,
    /// Enemies per wave at level 1
    pub wave_size: usize,
    pub wave_size_per_level: usize,
    /// Seconds between spawns inside a wave
    pub spawn_interval: f32,

    pub alive_threshold: u32,
    /// Seconds per wave when time gated
    pub wave_timer: f32,

    pub base_speed: f32,
    pub speed_ramp: f32,
    pub max_speed: f32,

    /// A maxi boss closes every n-th level
    pub maxi_boss_every: u32,
    /// Escort drones spawned with a boss
    pub support_base: u32,
    pub support_per_level: u32,

    /// Survival: seconds of regular swarming between surges
    pub swarm_time: f32,
    /// Survival: seconds a surge lasts
    pub surge_time: f32,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            idle_cooldown: 2.0,
            wave_cooldown: 1.5,
            boss_cooldown: 3.0,
            level_clear_cooldown: 3.0,

            base_wave_count: 4,
            extra_waves_per_level: 1,
            max_wave_count: 12,
            wave_size: 8,
            wave_size_per_level: 2,
            spawn_interval: 0.15,

            alive_threshold: 2,
            wave_timer: 8.0,

            base_speed: 1.0,
            speed_ramp: 0.08,
            max_speed: 2.0,

            maxi_boss_every: 1,
            support_base: 2,
            support_per_level: 1,

            swarm_time: 20.0,
            surge_time: 8.0,
        }
    }
}

impl Tuning {
    pub fn wave_count(&self, level: u32) -> u32 {
        (self.base_wave_count + self.extra_waves_per_level * level.saturating_sub(1))
            .min(self.max_wave_count)
            .max(1)
    }

    pub fn wave_size(&self, level: u32) -> usize {
        self.wave_size + self.wave_size_per_level * level.saturating_sub(1) as usize
    }

    pub fn speed(&self, level: u32) -> f32 {
        (self.base_speed + self.speed_ramp * level.saturating_sub(1) as f32).min(self.max_speed)
    }

    pub fn support_units(&self, level: u32) -> u32 {
        self.support_base + self.support_per_level * level.saturating_sub(1)
    }

    pub fn has_maxi_boss(&self, level: u32) -> bool {
        self.maxi_boss_every <= 1 || level % self.maxi_boss_every == 0
    }
}

/// Session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // === World ===
    pub world_width: f32,
    pub world_height: f32,
    /// Spatial grid cell edge
    pub grid_cell_size: f32,

    // === Pools ===
    pub enemy_pool_size: usize,
    pub bullet_pool_size: usize,
    pub sector_pool_size: usize,

    // === Destructible sectors ===
    pub sector_columns: usize,
    pub sector_rows: usize,

    // === Progression ===
    pub difficulty: Difficulty,
    /// Replaces the difficulty's table when set
    pub tuning: Option<Tuning>,
    pub wave_gate: WaveGate,
    pub mode: GameMode,

    // === Determinism / diagnostics ===
    pub seed: u64,
    pub error_policy: ErrorPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            world_width: WORLD_WIDTH,
            world_height: WORLD_HEIGHT,
            grid_cell_size: GRID_CELL_SIZE,

            enemy_pool_size: ENEMY_POOL_SIZE,
            bullet_pool_size: BULLET_POOL_SIZE,
            sector_pool_size: SECTOR_POOL_SIZE,

            sector_columns: SECTOR_COLUMNS,
            sector_rows: SECTOR_ROWS,

            difficulty: Difficulty::Normal,
            tuning: None,
            wave_gate: WaveGate::AliveCount,
            mode: GameMode::Campaign,

            seed: 0x5eed,
            error_policy: ErrorPolicy::Lenient,
        }
    }
}

impl Settings {
    /// Defaults with a difficulty preset applied
    pub fn from_preset(difficulty: Difficulty) -> Self {
        Self {
            difficulty,
            ..Self::default()
        }
    }

    /// Effective tuning table
    pub fn tuning(&self) -> Tuning {
        self.tuning.unwrap_or_else(|| self.difficulty.tuning())
    }

    pub fn from_json(json: &str) -> SimResult<Self> {
        let settings: Self =
            serde_json::from_str(json).map_err(|e| SimError::Settings(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json(&self) -> SimResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| SimError::Settings(e.to_string()))
    }

    /// Load from a JSON file, falling back to defaults
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let loaded = std::fs::read_to_string(path)
            .map_err(|e| SimError::Settings(e.to_string()))
            .and_then(|json| Self::from_json(&json));
        match loaded {
            Ok(settings) => {
                log::info!("Loaded settings from {}", path.display());
                settings
            }
            Err(err) => {
                log::warn!("Using default settings ({err})");
                Self::default()
            }
        }
    }

    fn validate(&self) -> SimResult<()> {
        if !(self.world_width > 0.0 && self.world_height > 0.0) {
            return Err(SimError::Settings("world extents must be positive".into()));
        }
        if !(self.grid_cell_size > 0.0) {
            return Err(SimError::Settings("grid cell size must be positive".into()));
        }
        if self.sector_columns == 0 || self.sector_rows == 0 {
            return Err(SimError::Settings("sector grid must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_difficulty_names() {
        for d in [Difficulty::Easy, Difficulty::Normal, Difficulty::Hard] {
            assert_eq!(Difficulty::from_str(d.as_str()), Some(d));
        }
        assert_eq!(Difficulty::from_str("nightmare"), None);
    }

    #[test]
    fn test_presets_scale() {
        let easy = Difficulty::Easy.tuning();
        let hard = Difficulty::Hard.tuning();
        assert!(hard.wave_size(3) > easy.wave_size(3));
        assert!(hard.speed(5) > easy.speed(5));
        assert!(!easy.has_maxi_boss(1));
        assert!(easy.has_maxi_boss(2));
        assert!(Difficulty::Normal.tuning().has_maxi_boss(1));
    }

    #[test]
    fn test_tuning_curves() {
        let t = Tuning::default();
        assert_eq!(t.wave_count(1), 4);
        assert_eq!(t.wave_count(100), t.max_wave_count);
        assert_eq!(t.speed(1), 1.0);
        assert_eq!(t.speed(1000), t.max_speed);
        assert_eq!(t.support_units(3), 4);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings = Settings::from_json(r#"{ "difficulty": "Hard", "mode": "Survival" }"#).unwrap();
        assert_eq!(settings.difficulty, Difficulty::Hard);
        assert_eq!(settings.mode, GameMode::Survival);
        assert_eq!(settings.enemy_pool_size, ENEMY_POOL_SIZE);
        assert_eq!(settings.tuning(), Difficulty::Hard.tuning());
    }

    #[test]
    fn test_json_roundtrip_with_override() {
        let mut settings = Settings::from_preset(Difficulty::Easy);
        settings.tuning = Some(Tuning {
            alive_threshold: 9,
            ..Tuning::default()
        });
        let back = Settings::from_json(&settings.to_json().unwrap()).unwrap();
        assert_eq!(back, settings);
        assert_eq!(back.tuning().alive_threshold, 9);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        assert!(matches!(
            Settings::from_json(r#"{ "world_width": -5.0 }"#),
            Err(SimError::Settings(_))
        ));
        assert!(Settings::from_json("not json").is_err());
    }

    #[test]
    fn test_load_missing_file_falls_back() {
        let settings = Settings::load("/nonexistent/shmup-settings.json");
        assert_eq!(settings, Settings::default());
    }
}
