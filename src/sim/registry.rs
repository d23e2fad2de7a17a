//! Dynamic registry for long-lived heterogeneous entities
//!
//! Owns the player, bosses and powerups. Entities are stored in a slotmap so a
//! removed entity's id can never alias a newer one, and visited through a
//! separate layer-ordered list.

use slotmap::{SlotMap, new_key_type};

use super::context::{FrameContext, GameEvent};
use super::entity::{Entity, EntityFlags};
use super::selection::Owner;

new_key_type! {
    /// Generational id of a registry entity
    pub struct EntityId;
}

/// Called with each entity right before the registry drops it
pub type RemoveHook = Box<dyn FnMut(EntityId, &dyn Entity)>;

#[derive(Default)]
pub struct Registry {
    entities: SlotMap<EntityId, Box<dyn Entity>>,
    /// Ids grouped by ascending layer
    order: Vec<EntityId>,
    on_remove: Option<RemoveHook>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_on_remove(&mut self, hook: RemoveHook) {
        self.on_remove = Some(hook);
    }

    /// Take ownership of `entity`, inserting it before the first entity whose
    /// layer is not lower than its own
    pub fn add(&mut self, mut entity: Box<dyn Entity>) -> EntityId {
        let layer = entity.core().layer;
        let id = self.entities.insert_with_key(|id| {
            let core = entity.core_mut();
            core.owner = Some(Owner::Dynamic(id));
            core.alive = true;
            entity
        });
        let entities = &self.entities;
        let at = self
            .order
            .iter()
            .position(|k| entities.get(*k).is_some_and(|e| e.core().layer >= layer))
            .unwrap_or(self.order.len());
        self.order.insert(at, id);
        id
    }

    pub fn get(&self, id: EntityId) -> Option<&dyn Entity> {
        self.entities.get(id).map(|e| e.as_ref())
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut (dyn Entity + 'static)> {
        self.entities.get_mut(id).map(|e| e.as_mut())
    }

    /// Typed access
    pub fn get_as<T: Entity>(&self, id: EntityId) -> Option<&T> {
        self.get(id)?.as_any().downcast_ref()
    }

    pub fn get_as_mut<T: Entity>(&mut self, id: EntityId) -> Option<&mut T> {
        self.get_mut(id)?.as_any_mut().downcast_mut()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Ids in visiting order
    pub fn order(&self) -> &[EntityId] {
        &self.order
    }

    /// Every entity in layer order, transient ones included
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &(dyn Entity + 'static))> {
        self.order
            .iter()
            .filter_map(|&id| self.entities.get(id).map(|e| (id, e.as_ref())))
    }

    /// Visit every entity not in a death sequence, once, in layer order
    pub fn for_each(&self, mut f: impl FnMut(EntityId, &dyn Entity)) {
        for (id, entity) in self.iter() {
            if !entity.core().flags.contains(EntityFlags::TRANSIENT) {
                f(id, entity);
            }
        }
    }

    /// Mutable visit of every entity in layer order
    pub fn for_each_mut(&mut self, mut f: impl FnMut(EntityId, &mut dyn Entity)) {
        for &id in &self.order {
            if let Some(entity) = self.entities.get_mut(id) {
                f(id, entity.as_mut());
            }
        }
    }

    /// Remove every entity flagged for reaping. Each one gets its `handle_die`
    /// call, loses its selection slot and is announced to the remove hook.
    pub fn reap(&mut self, ctx: &mut FrameContext<'_>) -> usize {
        let entities = &self.entities;
        let dead: Vec<EntityId> = self
            .order
            .iter()
            .copied()
            .filter(|id| entities.get(*id).is_some_and(|e| e.core().must_reap()))
            .collect();
        if dead.is_empty() {
            return 0;
        }
        self.order.retain(|id| !dead.contains(id));

        for &id in &dead {
            let Some(mut entity) = self.entities.remove(id) else {
                continue;
            };
            entity.handle_die(ctx);
            ctx.untrack(entity.core_mut());
            let class = entity.core().class;
            if let Some(hook) = self.on_remove.as_mut() {
                hook(id, entity.as_ref());
            }
            ctx.emit(GameEvent::Removed { id, class });
        }
        dead.len()
    }

    /// Retire everything and reap it at once (session reset)
    pub fn clear(&mut self, ctx: &mut FrameContext<'_>) -> usize {
        for entity in self.entities.values_mut() {
            entity.core_mut().retire();
        }
        self.reap(ctx)
    }
}
