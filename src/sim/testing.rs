//! Stand-alone frame context for entity unit tests

use glam::Vec2;
use rand::SeedableRng;
use rand_pcg::Pcg32;

use super::context::{Command, Controls, FrameContext, GameEvent, Target};
use super::grid::SpatialGrid;
use super::selection::{SelectionId, SelectionMap};
use crate::audio::AudioLog;
use crate::consts::*;
use crate::error::ErrorPolicy;

pub struct Harness {
    pub selection: SelectionMap,
    pub grid: SpatialGrid<SelectionId>,
    pub rng: Pcg32,
    pub audio: AudioLog,
    pub commands: Vec<Command>,
    pub events: Vec<GameEvent>,
    /// Target position; velocity is zero and it has no selection id
    pub target: Option<Vec2>,
    pub controls: Controls,
    pub extent: Vec2,
    pub speed: f32,
    pub time: f32,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            selection: SelectionMap::new(),
            grid: SpatialGrid::setup(WORLD_WIDTH, WORLD_HEIGHT, GRID_CELL_SIZE, GRID_CELL_SIZE),
            rng: Pcg32::seed_from_u64(7),
            audio: AudioLog::default(),
            commands: Vec::new(),
            events: Vec::new(),
            target: None,
            controls: Controls::default(),
            extent: Vec2::new(WORLD_WIDTH, WORLD_HEIGHT),
            speed: 1.0,
            time: 0.0,
        }
    }

    pub fn with_ctx<R>(&mut self, f: impl FnOnce(&mut FrameContext<'_>) -> R) -> R {
        let mut ctx = FrameContext {
            time: self.time,
            speed: self.speed,
            extent: self.extent,
            target: self.target.map(|pos| Target {
                pos,
                vel: Vec2::ZERO,
                selection: None,
            }),
            controls: self.controls,
            policy: ErrorPolicy::Strict,
            selection: &mut self.selection,
            grid: &mut self.grid,
            rng: &mut self.rng,
            audio: &mut self.audio,
            commands: &mut self.commands,
            events: &mut self.events,
        };
        f(&mut ctx)
    }
}
