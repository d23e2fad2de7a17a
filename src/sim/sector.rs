//! Destructible sectors
//!
//! A coarse grid of "is destroyed" flags laid over the world, independent of
//! the spatial grid. Destroying a cell is idempotent; the first destruction
//! also spawns a burning wreck that scorches enemies standing in it.

use std::any::Any;

use glam::Vec2;

use super::context::{Command, FrameContext, GameEvent};
use super::entity::{DamageType, Entity, EntityClass, EntityCore, EntityFlags};
use super::pool::Poolable;
use crate::audio::SoundId;
use crate::error::{SimError, SimResult};
use crate::persistence::Archive;

/// Seconds a wreck keeps burning
pub const BURN_TIME: f32 = 6.0;
/// Damage per second dealt by a burning wreck
pub const BURN_DAMAGE: f32 = 1.5;

#[derive(Debug, Clone, PartialEq)]
pub struct SectorGrid {
    columns: usize,
    rows: usize,
    cell_size: Vec2,
    destroyed: Vec<bool>,
}

impl SectorGrid {
    pub fn new(columns: usize, rows: usize, extent: Vec2) -> Self {
        let columns = columns.max(1);
        let rows = rows.max(1);
        Self {
            columns,
            rows,
            cell_size: extent / Vec2::new(columns as f32, rows as f32),
            destroyed: vec![false; columns * rows],
        }
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Cell under a world position, if it lies inside the grid
    pub fn cell_at(&self, pos: Vec2) -> Option<(usize, usize)> {
        if pos.x < 0.0 || pos.y < 0.0 || pos.is_nan() {
            return None;
        }
        let x = (pos.x / self.cell_size.x) as usize;
        let y = (pos.y / self.cell_size.y) as usize;
        (x < self.columns && y < self.rows).then_some((x, y))
    }

    pub fn center(&self, x: usize, y: usize) -> Vec2 {
        (Vec2::new(x as f32, y as f32) + 0.5) * self.cell_size
    }

    pub fn cell_radius(&self) -> f32 {
        self.cell_size.min_element() * 0.5
    }

    pub fn is_destroyed(&self, x: usize, y: usize) -> bool {
        x < self.columns && y < self.rows && self.destroyed[y * self.columns + x]
    }

    /// Mark a cell destroyed. Returns true only the first time.
    pub fn destroy(&mut self, x: usize, y: usize) -> bool {
        if x >= self.columns || y >= self.rows {
            return false;
        }
        let cell = &mut self.destroyed[y * self.columns + x];
        let fresh = !*cell;
        *cell = true;
        fresh
    }

    pub fn destroyed_count(&self) -> usize {
        self.destroyed.iter().filter(|d| **d).count()
    }

    pub fn reset(&mut self) {
        self.destroyed.fill(false);
    }

    pub fn save(&self, archive: &mut Archive) -> SimResult<()> {
        archive.write("columns", &self.columns)?;
        archive.write("rows", &self.rows)?;
        archive.write("destroyed", &self.destroyed)
    }

    /// Restore the flags verbatim. The stored dimensions must match.
    pub fn load(&mut self, archive: &Archive) -> SimResult<()> {
        let columns: usize = archive.read("columns")?;
        let rows: usize = archive.read("rows")?;
        let destroyed: Vec<bool> = archive.read("destroyed")?;
        if columns != self.columns || rows != self.rows || destroyed.len() != columns * rows {
            return Err(SimError::Archive {
                key: "destroyed".into(),
            });
        }
        self.destroyed = destroyed;
        Ok(())
    }
}

/// Burning remains of a destroyed sector
#[derive(Debug, Default)]
pub struct SectorWreck {
    pub core: EntityCore,
    pub cell: (usize, usize),
    burn: f32,
}

impl Poolable for SectorWreck {
    fn initialize(&mut self) {
        *self = Self::default();
    }
}

impl SectorWreck {
    pub fn setup(&mut self, cell: (usize, usize), center: Vec2, radius: f32) {
        self.core = EntityCore::spawn(EntityClass::SectorWreck, center);
        self.core.radius = radius;
        self.core.flags.insert(EntityFlags::INVINCIBLE);
        self.cell = cell;
        self.burn = BURN_TIME;
    }

    pub fn burning(&self) -> bool {
        self.burn > 0.0
    }
}

impl Entity for SectorWreck {
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
        self.burn -= dt;
        if self.burn <= 0.0 {
            self.core.retire();
            return;
        }
        ctx.push(Command::RadiusDamage {
            center: self.core.pos,
            radius: self.core.radius,
            amount: BURN_DAMAGE * dt,
            friendly: true,
            kind: DamageType::Fire,
        });
    }

    fn handle_die(&mut self, _ctx: &mut FrameContext<'_>) {
        log::debug!("sector {:?} burned out", self.cell);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Announce a freshly destroyed sector
pub(crate) fn announce(ctx: &mut FrameContext<'_>, (x, y): (usize, usize)) {
    ctx.emit(GameEvent::SectorDestroyed { x, y });
    ctx.play(SoundId::SectorCollapse);
}
