//! Selection map: the collision query surface
//!
//! A dense array mirroring position/alive state of every hittable body so hit
//! tests and "what is here" lookups never touch the pools directly. Bodies are
//! registered when an object is first tracked and released by the reap pass,
//! so an object that dies mid-frame stays queryable until the frame ends.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::collision::{circle_rect_overlap, segment_circle_hit};
use super::entity::{EntityClass, EntityCore, EntityFlags};
use super::grid::SpatialGrid;
use super::pool::Handle;
use super::registry::EntityId;

/// Dense index into the selection map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SelectionId(u32);

impl SelectionId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Storage location of the object behind a body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Owner {
    Enemy(Handle),
    Dynamic(EntityId),
}

/// A hittable circle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Body {
    pub owner: Owner,
    /// 0 for the main body, boss segments use 1..
    pub part: u16,
    pub class: EntityClass,
    pub pos: Vec2,
    pub radius: f32,
    pub friendly: bool,
    /// Also indexed by the spatial grid
    pub gridded: bool,
}

impl Body {
    pub fn from_core(core: &EntityCore, owner: Owner) -> Self {
        Self {
            owner,
            part: 0,
            class: core.class,
            pos: core.pos,
            radius: core.radius,
            friendly: core.is_friendly(),
            gridded: core.flags.contains(EntityFlags::POSITION_TRACKED),
        }
    }
}

/// Hit-test service the core consumes for damage resolution
pub trait CollisionQuery {
    /// Body under `pos`, nearest center first
    fn query_point(&self, pos: Vec2) -> Option<SelectionId>;
    /// Bodies touching the rectangle, in selection order
    fn query_rect(&self, min: Vec2, max: Vec2, out: &mut Vec<SelectionId>);
    /// Bodies crossed by a thick segment, ordered along it, with contact points
    fn query_line(&self, p1: Vec2, p2: Vec2, thickness: f32, out: &mut Vec<(SelectionId, Vec2)>);
}

#[derive(Debug, Default)]
pub struct SelectionMap {
    bodies: Vec<Option<Body>>,
    free: Vec<u32>,
}

impl SelectionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, body: Body) -> SelectionId {
        match self.free.pop() {
            Some(index) => {
                self.bodies[index as usize] = Some(body);
                SelectionId(index)
            }
            None => {
                self.bodies.push(Some(body));
                SelectionId(self.bodies.len() as u32 - 1)
            }
        }
    }

    pub fn unregister(&mut self, id: SelectionId) -> Option<Body> {
        let body = self.bodies.get_mut(id.index())?.take()?;
        self.free.push(id.0);
        Some(body)
    }

    pub fn get(&self, id: SelectionId) -> Option<&Body> {
        self.bodies.get(id.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: SelectionId) -> Option<&mut Body> {
        self.bodies.get_mut(id.index()).and_then(Option::as_mut)
    }

    pub fn len(&self) -> usize {
        self.bodies.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (SelectionId, &Body)> {
        self.bodies
            .iter()
            .enumerate()
            .filter_map(|(i, b)| b.as_ref().map(|b| (SelectionId(i as u32), b)))
    }

    /// Register `body` into `slot` or move the existing registration, keeping
    /// the grid in step with the new position
    pub fn sync(&mut self, grid: &mut SpatialGrid<SelectionId>, slot: &mut Option<SelectionId>, body: Body) {
        if let Some(id) = *slot {
            if let Some(existing) = self.get_mut(id) {
                let old = existing.pos;
                *existing = body;
                if body.gridded {
                    grid.update(old, body.pos, id);
                }
                return;
            }
        }
        let id = self.register(body);
        if body.gridded {
            grid.add(body.pos, id);
        }
        *slot = Some(id);
    }

    /// Drop the registration held in `slot`, if any
    pub fn release(&mut self, grid: &mut SpatialGrid<SelectionId>, slot: &mut Option<SelectionId>) {
        if let Some(id) = slot.take() {
            if let Some(body) = self.unregister(id) {
                if body.gridded {
                    grid.remove(body.pos, id);
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.bodies.clear();
        self.free.clear();
    }
}

impl CollisionQuery for SelectionMap {
    fn query_point(&self, pos: Vec2) -> Option<SelectionId> {
        self.iter()
            .filter(|(_, b)| b.pos.distance_squared(pos) <= b.radius * b.radius)
            .min_by(|(_, a), (_, b)| {
                a.pos
                    .distance_squared(pos)
                    .partial_cmp(&b.pos.distance_squared(pos))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(id, _)| id)
    }

    fn query_rect(&self, min: Vec2, max: Vec2, out: &mut Vec<SelectionId>) {
        out.clear();
        out.extend(
            self.iter()
                .filter(|(_, b)| circle_rect_overlap(b.pos, b.radius, min, max))
                .map(|(id, _)| id),
        );
    }

    fn query_line(&self, p1: Vec2, p2: Vec2, thickness: f32, out: &mut Vec<(SelectionId, Vec2)>) {
        out.clear();
        let mut hits: Vec<(f32, SelectionId, Vec2)> = self
            .iter()
            .filter_map(|(id, b)| {
                segment_circle_hit(p1, p2, thickness, b.pos, b.radius).map(|(t, p)| (t, id, p))
            })
            .collect();
        hits.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        out.extend(hits.into_iter().map(|(_, id, p)| (id, p)));
    }
}
