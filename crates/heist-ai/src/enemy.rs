//! Enemy instances and the live roster.

use std::collections::BTreeMap;

use heist_common::{EntityId, RoomId, SpawnerId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::EncounterConfig;
use crate::detector::Detector;
use crate::pursuer::Pursuer;
use crate::route::PatrolRoute;
use crate::world::Services;

/// Error types for roster operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RosterError {
    /// Handle is already registered
    #[error("Enemy {0} is already in the roster")]
    Duplicate(EntityId),
    /// Handle is not registered
    #[error("Enemy {0} is not in the roster")]
    Unknown(EntityId),
}

/// Enemy archetype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Archetype {
    /// Melee chaser ("Hanadura")
    Pursuer,
    /// Spotlight detector
    Grimoire,
}

impl Archetype {
    /// Display name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Pursuer => "Hanadura",
            Self::Grimoire => "Grimoire",
        }
    }
}

/// Behavior of one enemy.
#[derive(Debug, Clone)]
pub enum Brain {
    /// Pursuer state machine
    Pursuer(Pursuer),
    /// Detector state machine
    Grimoire(Detector),
}

/// A live enemy.
#[derive(Debug, Clone)]
pub struct Enemy {
    id: EntityId,
    archetype: Archetype,
    room: RoomId,
    spawner: Option<SpawnerId>,
    brain: Brain,
}

impl Enemy {
    /// Builds an enemy of the given archetype with its configured brain.
    #[must_use]
    pub fn new(
        id: EntityId,
        archetype: Archetype,
        room: RoomId,
        spawner: Option<SpawnerId>,
        config: &EncounterConfig,
    ) -> Self {
        let brain = match archetype {
            Archetype::Pursuer => {
                Brain::Pursuer(Pursuer::new(id, config.pursuer.clone(), config.perception.clone()))
            },
            Archetype::Grimoire => {
                Brain::Grimoire(Detector::new(id, config.detector.clone(), config.reinforcement.clone()))
            },
        };
        Self {
            id,
            archetype,
            room,
            spawner,
            brain,
        }
    }

    /// Entity handle.
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Archetype.
    #[must_use]
    pub fn archetype(&self) -> Archetype {
        self.archetype
    }

    /// Room the enemy was spawned into.
    #[must_use]
    pub fn room(&self) -> &RoomId {
        &self.room
    }

    /// Spawner the enemy came from.
    #[must_use]
    pub fn spawner(&self) -> Option<SpawnerId> {
        self.spawner
    }

    /// Behavior.
    #[must_use]
    pub fn brain(&self) -> &Brain {
        &self.brain
    }

    /// Mutable behavior.
    pub fn brain_mut(&mut self) -> &mut Brain {
        &mut self.brain
    }

    /// Pursuer brain, if this is a pursuer.
    #[must_use]
    pub fn as_pursuer(&self) -> Option<&Pursuer> {
        match &self.brain {
            Brain::Pursuer(p) => Some(p),
            Brain::Grimoire(_) => None,
        }
    }

    /// Mutable pursuer brain.
    pub fn as_pursuer_mut(&mut self) -> Option<&mut Pursuer> {
        match &mut self.brain {
            Brain::Pursuer(p) => Some(p),
            Brain::Grimoire(_) => None,
        }
    }

    /// Detector brain, if this is a grimoire.
    #[must_use]
    pub fn as_detector(&self) -> Option<&Detector> {
        match &self.brain {
            Brain::Grimoire(d) => Some(d),
            Brain::Pursuer(_) => None,
        }
    }

    /// Mutable detector brain.
    pub fn as_detector_mut(&mut self) -> Option<&mut Detector> {
        match &mut self.brain {
            Brain::Grimoire(d) => Some(d),
            Brain::Pursuer(_) => None,
        }
    }

    /// Name of the active state.
    #[must_use]
    pub fn state_name(&self) -> Option<&'static str> {
        match &self.brain {
            Brain::Pursuer(p) => p.state().map(crate::fsm::StateKind::name),
            Brain::Grimoire(d) => d.state().map(crate::fsm::StateKind::name),
        }
    }

    /// Current target.
    #[must_use]
    pub fn target(&self) -> Option<EntityId> {
        match &self.brain {
            Brain::Pursuer(p) => p.target(),
            Brain::Grimoire(d) => d.target(),
        }
    }

    /// Whether the last perception pass found a target.
    #[must_use]
    pub fn is_detecting(&self) -> bool {
        match &self.brain {
            Brain::Pursuer(p) => p.is_detecting(),
            Brain::Grimoire(d) => d.is_detecting(),
        }
    }

    /// Assigned patrol route.
    #[must_use]
    pub fn route(&self) -> Option<&PatrolRoute> {
        match &self.brain {
            Brain::Pursuer(p) => p.route(),
            Brain::Grimoire(d) => d.route(),
        }
    }

    /// Replaces the patrol route.
    pub fn set_route(&mut self, route: Option<PatrolRoute>) {
        match &mut self.brain {
            Brain::Pursuer(p) => p.set_route(route),
            Brain::Grimoire(d) => d.set_route(route),
        }
    }

    /// Enters the initial state.
    pub fn start(&mut self, svc: Services<'_>) {
        match &mut self.brain {
            Brain::Pursuer(p) => p.start(svc),
            Brain::Grimoire(d) => d.start(svc),
        }
    }

    /// Runs one simulation tick.
    pub fn update(&mut self, dt: f32, svc: Services<'_>) {
        match &mut self.brain {
            Brain::Pursuer(p) => p.update(dt, svc),
            Brain::Grimoire(d) => d.update(dt, svc),
        }
    }

    /// Exits the active state.
    pub fn teardown(&mut self, svc: Services<'_>) {
        match &mut self.brain {
            Brain::Pursuer(p) => p.teardown(svc),
            Brain::Grimoire(d) => d.teardown(svc),
        }
    }
}

/// Per-room head count by archetype.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomOccupancy {
    /// Live pursuers
    pub pursuers: usize,
    /// Live grimoires
    pub grimoires: usize,
}

impl RoomOccupancy {
    /// Count for one archetype.
    #[must_use]
    pub fn count(&self, archetype: Archetype) -> usize {
        match archetype {
            Archetype::Pursuer => self.pursuers,
            Archetype::Grimoire => self.grimoires,
        }
    }
}

/// Live enemies keyed by handle, iterated in handle order.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    enemies: BTreeMap<EntityId, Enemy>,
}

impl Roster {
    /// Empty roster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an enemy.
    pub fn insert(&mut self, enemy: Enemy) -> Result<(), RosterError> {
        let id = enemy.id();
        if self.enemies.contains_key(&id) {
            return Err(RosterError::Duplicate(id));
        }
        self.enemies.insert(id, enemy);
        Ok(())
    }

    /// Unregisters an enemy.
    pub fn remove(&mut self, id: EntityId) -> Result<Enemy, RosterError> {
        self.enemies.remove(&id).ok_or(RosterError::Unknown(id))
    }

    /// Enemy by handle.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&Enemy> {
        self.enemies.get(&id)
    }

    /// Mutable enemy by handle.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Enemy> {
        self.enemies.get_mut(&id)
    }

    /// Whether the handle is live.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.enemies.contains_key(&id)
    }

    /// Number of live enemies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.enemies.len()
    }

    /// Whether the roster is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.enemies.is_empty()
    }

    /// Handles in iteration order.
    #[must_use]
    pub fn ids(&self) -> Vec<EntityId> {
        self.enemies.keys().copied().collect()
    }

    /// Enemies in handle order.
    pub fn iter(&self) -> impl Iterator<Item = &Enemy> {
        self.enemies.values()
    }

    /// Mutable enemies in handle order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Enemy> {
        self.enemies.values_mut()
    }

    /// Live enemies of `archetype` in `room`.
    #[must_use]
    pub fn count_in_room(&self, room: &RoomId, archetype: Archetype) -> usize {
        self.enemies
            .values()
            .filter(|e| e.archetype == archetype && &e.room == room)
            .count()
    }

    /// Head count of every room with at least one live enemy.
    #[must_use]
    pub fn occupancy(&self) -> BTreeMap<RoomId, RoomOccupancy> {
        let mut rooms: BTreeMap<RoomId, RoomOccupancy> = BTreeMap::new();
        for enemy in self.enemies.values() {
            let entry = rooms.entry(enemy.room.clone()).or_default();
            match enemy.archetype {
                Archetype::Pursuer => entry.pursuers += 1,
                Archetype::Grimoire => entry.grimoires += 1,
            }
        }
        rooms
    }

    /// Removes every enemy, returning them.
    pub fn drain(&mut self) -> Vec<Enemy> {
        std::mem::take(&mut self.enemies).into_values().collect()
    }
}
