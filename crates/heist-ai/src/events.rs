//! Event bus for encounter notifications.
//!
//! The encounter publishes what happened during a tick; the host drains the
//! bus to drive presentation, scoring or damage without the core knowing.

use crossbeam_channel::{bounded, Receiver, Sender};
use heist_common::{EntityId, RoomId, SpawnerId, Vec3};
use serde::{Deserialize, Serialize};

use crate::enemy::Archetype;

/// Why a spawn request was turned down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefusalReason {
    /// Room already holds its quota of that archetype
    RoomFull,
    /// Spawner is occupied and its room has no free spawner
    NoFreeSpawner,
    /// No spawner qualifies for the request
    NoSpawner,
}

/// Event types that can be sent through the event bus.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum EncounterEvent {
    /// Enemy spawned
    EnemySpawned {
        /// Enemy ID
        enemy: EntityId,
        /// Archetype
        archetype: Archetype,
        /// Spawner used
        spawner: SpawnerId,
        /// Room of the spawner
        room: RoomId,
    },
    /// Enemy died and its bookkeeping was released
    EnemyDied {
        /// Enemy ID
        enemy: EntityId,
        /// Archetype
        archetype: Archetype,
    },
    /// Enemy removed without dying (teardown, script)
    EnemyDespawned {
        /// Enemy ID
        enemy: EntityId,
    },
    /// Spawn request refused
    SpawnRefused {
        /// Requested room
        room: RoomId,
        /// Requested archetype
        archetype: Archetype,
        /// Reason
        reason: RefusalReason,
    },
    /// Respawn scheduled
    RespawnQueued {
        /// Preferred spawner
        spawner: SpawnerId,
        /// Archetype to respawn
        archetype: Archetype,
        /// Simulated time at which it fires
        scheduled_time: f64,
        /// Whether this came from the instant-respawn roll
        instant: bool,
    },
    /// A pursuer's attack connected
    AttackLanded {
        /// Attacking enemy
        attacker: EntityId,
        /// Target hit
        target: EntityId,
    },
    /// A detector called nearby pursuers
    ReinforcementsCalled {
        /// Calling detector
        caller: EntityId,
        /// Alerted allies, nearest first
        allies: Vec<EntityId>,
        /// Position broadcast to the allies
        position: Vec3,
    },
    /// Behavior state changed
    StateChanged {
        /// Enemy ID
        enemy: EntityId,
        /// Previous state name
        from: Option<&'static str>,
        /// New state name
        to: &'static str,
    },
}

/// Event bus for broadcasting events to subscribers.
#[derive(Debug)]
pub struct EventBus {
    /// Sender for broadcasting events
    sender: Sender<EncounterEvent>,
    /// Receiver for collecting events
    receiver: Receiver<EncounterEvent>,
    /// Channel capacity
    capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventBus {
    /// Creates a new event bus with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
        }
    }

    /// Publishes an event to the bus.
    pub fn publish(&self, event: EncounterEvent) {
        // Non-blocking send - if full, event is dropped
        let _ = self.sender.try_send(event);
    }

    /// Drains all pending events.
    pub fn drain(&self) -> Vec<EncounterEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    /// Returns the number of pending events.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    /// Returns the channel capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Creates a new sender handle for publishing events.
    #[must_use]
    pub fn sender(&self) -> Sender<EncounterEvent> {
        self.sender.clone()
    }
}
