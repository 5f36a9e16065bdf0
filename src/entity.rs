use glam::Vec3;

use crate::bounds::BoundingBox;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId {
    pub index: u32,
    pub generation: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Orbit {
    pub center: Vec3,
    pub radius: f32,
    /// Radians per second.
    pub speed: f32,
    pub phase: f32,
}

impl Orbit {
    pub fn position(&self, time: f32) -> Vec3 {
        let angle = self.phase + self.speed * time;
        self.center + Vec3::new(angle.cos(), 0.0, angle.sin()) * self.radius
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Entity {
    pub position: Vec3,
    pub half_extents: Vec3,
    pub color: Vec3,
    pub orbit: Option<Orbit>,
    /// Pass token of the last draw pass that submitted this entity.
    pub last_drawn: u64,
}

impl Entity {
    pub fn new(position: Vec3, half_extents: Vec3, color: Vec3) -> Self {
        Self {
            position,
            half_extents,
            color,
            orbit: None,
            last_drawn: 0,
        }
    }

    pub fn with_orbit(mut self, orbit: Orbit) -> Self {
        self.position = orbit.position(0.0);
        self.orbit = Some(orbit);
        self
    }

    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::new(
            self.position - self.half_extents,
            self.position + self.half_extents,
        )
    }

    pub fn update(&mut self, time: f32) -> bool {
        let Some(orbit) = self.orbit else {
            return false;
        };

        let position = orbit.position(time);
        let moved = position != self.position;
        self.position = position;
        moved
    }
}

#[derive(Clone, Debug, Default)]
struct Slot {
    generation: u32,
    entity: Option<Entity>,
}

#[derive(Clone, Debug, Default)]
pub struct Entities {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl Entities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self, entity: Entity) -> EntityId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation += 1;
            slot.entity = Some(entity);

            return EntityId {
                index,
                generation: slot.generation,
            };
        }

        self.slots.push(Slot {
            generation: 0,
            entity: Some(entity),
        });

        EntityId {
            index: self.slots.len() as u32 - 1,
            generation: 0,
        }
    }

    pub fn despawn(&mut self, id: EntityId) -> Option<Entity> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }

        let entity = slot.entity.take()?;
        self.free.push(id.index);
        Some(entity)
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }

        slot.entity.as_ref()
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }

        slot.entity.as_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &Entity)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            let id = EntityId {
                index: index as u32,
                generation: slot.generation,
            };

            slot.entity.as_ref().map(|entity| (id, entity))
        })
    }

    pub fn ids(&self) -> Vec<EntityId> {
        self.iter().map(|(id, _)| id).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.entity.is_some()).count()
    }

    pub fn reset_draw_marks(&mut self) {
        for entity in self.slots.iter_mut().filter_map(|slot| slot.entity.as_mut()) {
            entity.last_drawn = 0;
        }
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
    }
}
