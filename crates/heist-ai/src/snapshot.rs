//! Read-only encounter snapshots for observers.
//!
//! The authoritative encounter publishes one snapshot per tick. Observers
//! subscribe to a bounded stream and never write back; a slow subscriber
//! misses snapshots instead of stalling the tick.

use std::collections::BTreeMap;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use heist_common::{EntityId, RoomId, SpawnerId, Vec3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::detector::DetectorState;
use crate::enemy::{Archetype, Brain, Enemy, RoomOccupancy};
use crate::pursuer::PursuerState;

/// Behavior state of either archetype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnemyStateTag {
    /// Pursuer state
    Pursuer(PursuerState),
    /// Detector state
    Grimoire(DetectorState),
}

/// Replicated view of one enemy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnemySnapshot {
    /// Entity handle
    pub id: EntityId,
    /// Archetype
    pub archetype: Archetype,
    /// Active state, `None` once torn down
    pub state: Option<EnemyStateTag>,
    /// Perceived target
    pub target: Option<EntityId>,
    /// Whether perception currently sees a target
    pub detecting: bool,
    /// Position, if the agent is on the navigable surface
    pub position: Option<Vec3>,
    /// Room the enemy belongs to
    pub room: RoomId,
    /// Spawner it came from
    pub spawner: Option<SpawnerId>,
}

impl EnemySnapshot {
    /// Captures an enemy at `position`.
    #[must_use]
    pub fn capture(enemy: &Enemy, position: Option<Vec3>) -> Self {
        let state = match enemy.brain() {
            Brain::Pursuer(p) => p.state().map(EnemyStateTag::Pursuer),
            Brain::Grimoire(d) => d.state().map(EnemyStateTag::Grimoire),
        };
        Self {
            id: enemy.id(),
            archetype: enemy.archetype(),
            state,
            target: enemy.target(),
            detecting: enemy.is_detecting(),
            position,
            room: enemy.room().clone(),
            spawner: enemy.spawner(),
        }
    }
}

/// Replicated view of the whole encounter after a tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EncounterSnapshot {
    /// Ticks run so far
    pub tick: u64,
    /// Simulated seconds since the match started
    pub time: f64,
    /// Match progress fraction
    pub match_progress: f32,
    /// Live enemies in handle order
    pub enemies: Vec<EnemySnapshot>,
    /// Queued spawns
    pub pending_respawns: usize,
    /// Per-room head counts
    pub occupancy: BTreeMap<RoomId, RoomOccupancy>,
    /// Rooms with a patrol zone
    pub zones: usize,
}

impl EncounterSnapshot {
    /// Snapshot entry of one enemy.
    #[must_use]
    pub fn enemy(&self, id: EntityId) -> Option<&EnemySnapshot> {
        self.enemies.iter().find(|e| e.id == id)
    }
}

/// Fans snapshots out to any number of observers.
#[derive(Debug, Default)]
pub struct SnapshotPublisher {
    subscribers: Vec<Sender<EncounterSnapshot>>,
}

impl SnapshotPublisher {
    /// Publisher with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a stream buffering at most `capacity` snapshots.
    pub fn subscribe(&mut self, capacity: usize) -> Receiver<EncounterSnapshot> {
        let (sender, receiver) = bounded(capacity.max(1));
        self.subscribers.push(sender);
        receiver
    }

    /// Number of connected subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Sends a snapshot to every subscriber, dropping disconnected ones.
    pub fn publish(&mut self, snapshot: &EncounterSnapshot) {
        if self.subscribers.is_empty() {
            return;
        }
        self.subscribers.retain(|sender| match sender.try_send(snapshot.clone()) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => {
                debug!("Snapshot subscriber disconnected");
                false
            },
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EncounterConfig;

    #[test]
    fn test_capture_pursuer_before_start() {
        let enemy = Enemy::new(
            EntityId::new(),
            Archetype::Pursuer,
            RoomId::from("Hall"),
            Some(SpawnerId::new(3)),
            &EncounterConfig::default(),
        );
        let snap = EnemySnapshot::capture(&enemy, Some(Vec3::ONE));
        assert_eq!(snap.state, None);
        assert_eq!(snap.room, RoomId::from("Hall"));
        assert_eq!(snap.spawner, Some(SpawnerId::new(3)));
        assert!(!snap.detecting);
    }

    #[test]
    fn test_publish_fans_out_and_prunes() {
        let mut publisher = SnapshotPublisher::new();
        let a = publisher.subscribe(4);
        let b = publisher.subscribe(4);
        assert_eq!(publisher.subscriber_count(), 2);

        let snapshot = EncounterSnapshot {
            tick: 1,
            ..EncounterSnapshot::default()
        };
        publisher.publish(&snapshot);
        assert_eq!(a.try_recv().map(|s| s.tick), Ok(1));
        assert_eq!(b.try_recv().map(|s| s.tick), Ok(1));

        drop(b);
        publisher.publish(&snapshot);
        assert_eq!(publisher.subscriber_count(), 1);
    }

    #[test]
    fn test_full_subscriber_misses_snapshots() {
        let mut publisher = SnapshotPublisher::new();
        let rx = publisher.subscribe(1);
        for tick in 0..3 {
            publisher.publish(&EncounterSnapshot {
                tick,
                ..EncounterSnapshot::default()
            });
        }
        assert_eq!(rx.len(), 1);
        assert_eq!(rx.try_recv().map(|s| s.tick), Ok(0));
        assert_eq!(publisher.subscriber_count(), 1);
    }

    #[test]
    fn test_snapshot_serializes() {
        let snapshot = EncounterSnapshot {
            tick: 5,
            time: 2.5,
            ..EncounterSnapshot::default()
        };
        let json = serde_json::to_string(&snapshot).expect("serialize");
        let back: EncounterSnapshot = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, snapshot);
    }
}
