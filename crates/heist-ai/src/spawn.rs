//! Enemy spawn and respawn scheduling.
//!
//! The [`SpawnManager`] owns the map's spawners, enforces per-room capacity
//! before every spawn, performs initial placement, and runs a time-ordered
//! respawn queue on a simulated clock advanced once per tick.

use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap};

use crossbeam_channel::Sender;
use heist_common::{EntityId, Pose, RoomId, SpawnerId, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::authority::Authority;
use crate::config::{EncounterConfig, SpawnConfig};
use crate::enemy::{Archetype, Enemy, Roster, RosterError};
use crate::events::{EncounterEvent, RefusalReason};
use crate::patrol_zone::PatrolZones;
use crate::route_gen::room_at;
use crate::world::{Cue, RoomInfo, SceneMetadata, Services, SpatialQuery};

/// Height above a spawner from which the ground probe starts.
const GROUND_PROBE_LIFT: f32 = 0.1;

/// Error types for spawn operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpawnError {
    /// Room already holds its quota of the archetype
    #[error("Room {room} is full for {archetype:?} ({count}/{max})")]
    RoomFull {
        /// Room of the spawner
        room: RoomId,
        /// Requested archetype
        archetype: Archetype,
        /// Live count in the room
        count: usize,
        /// Configured maximum
        max: usize,
    },
    /// Spawner and every other spawner of its room are occupied
    #[error("Spawner {0} is occupied and its room has no free spawner")]
    SpawnerOccupied(SpawnerId),
    /// No spawner with that id is registered
    #[error("Unknown spawner {0}")]
    UnknownSpawner(SpawnerId),
    /// This process does not run the simulation
    #[error("Not authoritative")]
    NotAuthoritative,
    /// No spawner qualifies for the request
    #[error("No spawners available")]
    NoSpawners,
    /// Roster rejected the new enemy
    #[error("Roster error: {0}")]
    Roster(#[from] RosterError),
}

/// A registered spawn point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spawner {
    /// Handle
    pub id: SpawnerId,
    /// World position
    pub position: Vec3,
    /// Facing yaw in radians
    pub yaw: f32,
    /// Resolved room
    pub room: RoomId,
    /// Enemy currently spawned from here
    pub occupant: Option<EntityId>,
}

impl Spawner {
    /// Whether an enemy from this spawner is alive.
    #[must_use]
    pub fn is_occupied(&self) -> bool {
        self.occupant.is_some()
    }
}

/// Why a respawn was scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RespawnCause {
    /// Enemy died and won the instant roll
    Instant,
    /// Enemy died; delay scaled by match progress
    Death,
    /// Detector called for reinforcements
    Reinforcement,
    /// Match milestone reached
    Milestone,
}

/// A queued spawn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingRespawn {
    /// Simulated time at which the spawn fires
    pub scheduled_time: f64,
    /// Preferred spawner
    pub spawner: SpawnerId,
    /// Archetype to spawn
    pub archetype: Archetype,
    /// Position the new enemy investigates on arrival
    pub alert_target: Option<Vec3>,
    /// Why it was queued
    pub cause: RespawnCause,
    seq: u64,
}

impl PartialEq for PendingRespawn {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PendingRespawn {}

impl PartialOrd for PendingRespawn {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingRespawn {
    // Reversed so the BinaryHeap pops the earliest entry first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .scheduled_time
            .total_cmp(&self.scheduled_time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Queued respawn delay at `progress` through the match.
///
/// Linear from `base` at the start to `min` at the end; progress is clamped to `[0, 1]`.
#[must_use]
pub fn interpolate_respawn_delay(base: f32, min: f32, progress: f32) -> f32 {
    let t = if progress.is_nan() { 0.0 } else { progress.clamp(0.0, 1.0) };
    base + (min - base) * t
}

/// Places enemies and runs the respawn queue.
#[derive(Debug)]
pub struct SpawnManager {
    config: EncounterConfig,
    authority: Authority,
    events: Sender<EncounterEvent>,
    spawners: Vec<Spawner>,
    rooms: Vec<RoomInfo>,
    queue: BinaryHeap<PendingRespawn>,
    next_seq: u64,
    now: f64,
    match_progress: f32,
    last_milestone: Option<f64>,
    rng: fastrand::Rng,
}

impl SpawnManager {
    /// Creates a manager with no spawners.
    #[must_use]
    pub fn new(config: EncounterConfig, authority: Authority, events: Sender<EncounterEvent>) -> Self {
        let rng = config
            .spawn
            .rng_seed
            .map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed);
        Self {
            config,
            authority,
            events,
            spawners: Vec::new(),
            rooms: Vec::new(),
            queue: BinaryHeap::new(),
            next_seq: 0,
            now: 0.0,
            match_progress: 0.0,
            last_milestone: None,
            rng,
        }
    }

    fn spawn_config(&self) -> &SpawnConfig {
        &self.config.spawn
    }

    /// Maximum live enemies of `archetype` per room.
    #[must_use]
    pub fn capacity(&self, archetype: Archetype) -> usize {
        match archetype {
            Archetype::Pursuer => self.spawn_config().max_enemies_per_room,
            Archetype::Grimoire => self.spawn_config().max_grimoires_per_room,
        }
    }

    /// Registered spawners in registration order.
    #[must_use]
    pub fn spawners(&self) -> &[Spawner] {
        &self.spawners
    }

    /// Spawner by handle.
    #[must_use]
    pub fn spawner(&self, id: SpawnerId) -> Option<&Spawner> {
        self.spawners.iter().find(|s| s.id == id)
    }

    /// Simulated seconds since the match started.
    #[must_use]
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Match progress fraction in `[0, 1]`.
    #[must_use]
    pub fn match_progress(&self) -> f32 {
        self.match_progress
    }

    /// Sets the match progress fraction used for respawn delays.
    pub fn set_match_progress(&mut self, progress: f32) {
        self.match_progress = if progress.is_nan() { 0.0 } else { progress.clamp(0.0, 1.0) };
    }

    /// Queued respawn delay at the current match progress.
    #[must_use]
    pub fn current_respawn_delay(&self) -> f32 {
        let spawn = self.spawn_config();
        interpolate_respawn_delay(spawn.base_respawn_delay, spawn.min_respawn_delay, self.match_progress)
    }

    /// Queued spawns, earliest first.
    #[must_use]
    pub fn pending(&self) -> Vec<PendingRespawn> {
        let mut pending: Vec<PendingRespawn> = self.queue.iter().cloned().collect();
        pending.sort_by(|a, b| b.cmp(a));
        pending
    }

    /// Number of queued spawns.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.queue.len()
    }

    /// Discovers every spawner in the scene and resolves its room.
    ///
    /// Resolution order: scene hierarchy, ground collider beneath the spawner,
    /// room bounds containment, nearest room within the threshold, `Unknown`.
    pub fn register_all_spawners(&mut self, scene: &dyn SceneMetadata, spatial: &dyn SpatialQuery) -> usize {
        if !self.authority.is_authoritative() {
            return 0;
        }
        self.rooms = scene.rooms();
        self.spawners.clear();

        let infos = scene.spawners();
        if infos.is_empty() {
            warn!("No spawners found in scene; enemies cannot be placed");
            return 0;
        }

        for (index, info) in infos.into_iter().enumerate() {
            let id = SpawnerId::new(index as u32);
            let room = self.resolve_room(info.position, info.parent_room, scene, spatial);
            if room.is_unknown() {
                warn!("Spawner {id} at {:?} could not be assigned to a room", info.position);
            } else {
                debug!("Spawner {id} resolved to room {room}");
            }
            self.spawners.push(Spawner {
                id,
                position: info.position,
                yaw: info.yaw,
                room,
                occupant: None,
            });
        }

        info!(
            "Registered {} spawners across {} rooms",
            self.spawners.len(),
            self.spawners.iter().map(|s| &s.room).collect::<BTreeSet<_>>().len()
        );
        self.spawners.len()
    }

    fn resolve_room(
        &self,
        position: Vec3,
        parent_room: Option<RoomId>,
        scene: &dyn SceneMetadata,
        spatial: &dyn SpatialQuery,
    ) -> RoomId {
        if let Some(room) = parent_room.filter(|r| !r.is_unknown()) {
            return room;
        }

        let spawn = self.spawn_config();
        let origin = position + Vec3::Y * GROUND_PROBE_LIFT;
        let beneath = spatial
            .raycast(origin, Vec3::NEG_Y, spawn.ground_probe_distance, spawn.ground_mask)
            .and_then(|hit| hit.collider)
            .and_then(|collider| scene.room_of_collider(collider));
        if let Some(room) = beneath {
            return room;
        }

        room_at(&self.rooms, position, spawn.nearest_room_threshold).map_or_else(RoomId::unknown, |(room, _)| room)
    }

    fn publish(&self, event: EncounterEvent) {
        let _ = self.events.try_send(event);
    }

    fn free_spawner_in(&self, room: &RoomId) -> Option<usize> {
        self.spawners
            .iter()
            .position(|s| &s.room == room && !s.is_occupied())
    }

    /// Spawns one enemy at `spawner`, assigning it a route before its first tick.
    ///
    /// An occupied spawner falls back to a free spawner in the same room.
    /// Capacity violations are refused without side effects.
    pub fn try_spawn(
        &mut self,
        roster: &mut Roster,
        zones: &mut PatrolZones,
        spawner: SpawnerId,
        archetype: Archetype,
        mut svc: Services<'_>,
    ) -> Result<EntityId, SpawnError> {
        if !self.authority.is_authoritative() {
            return Err(SpawnError::NotAuthoritative);
        }
        if self.spawners.is_empty() {
            return Err(SpawnError::NoSpawners);
        }
        let requested = self
            .spawners
            .iter()
            .position(|s| s.id == spawner)
            .ok_or(SpawnError::UnknownSpawner(spawner))?;
        let room = self.spawners[requested].room.clone();

        let max = self.capacity(archetype);
        let count = roster.count_in_room(&room, archetype);
        if count >= max {
            debug!("Refusing {archetype:?} at spawner {spawner}: room {room} is full ({count}/{max})");
            self.publish(EncounterEvent::SpawnRefused {
                room: room.clone(),
                archetype,
                reason: RefusalReason::RoomFull,
            });
            return Err(SpawnError::RoomFull {
                room,
                archetype,
                count,
                max,
            });
        }

        let index = if self.spawners[requested].is_occupied() {
            match self.free_spawner_in(&room) {
                Some(index) => index,
                None => {
                    debug!("Refusing {archetype:?}: spawner {spawner} occupied, no free spawner in {room}");
                    self.publish(EncounterEvent::SpawnRefused {
                        room,
                        archetype,
                        reason: RefusalReason::NoFreeSpawner,
                    });
                    return Err(SpawnError::SpawnerOccupied(spawner));
                },
            }
        } else {
            requested
        };

        let (spawner_id, pose) = {
            let s = &self.spawners[index];
            (s.id, Pose::from_yaw(s.position, s.yaw))
        };

        let id = EntityId::new();
        svc.nav.add_agent(id, pose);
        let mut enemy = Enemy::new(id, archetype, room.clone(), Some(spawner_id), &self.config);
        enemy.set_route(zones.route_for(id, &room));
        enemy.start(svc.reborrow());

        if let Err(e) = roster.insert(enemy) {
            zones.release(id);
            svc.nav.remove_agent(id);
            return Err(e.into());
        }

        self.spawners[index].occupant = Some(id);
        svc.cues.fire(id, Cue::Spawn);
        debug!("Spawned {} {id} at spawner {spawner_id} in {room}", archetype.name());
        self.publish(EncounterEvent::EnemySpawned {
            enemy: id,
            archetype,
            spawner: spawner_id,
            room,
        });
        Ok(id)
    }

    /// Performs initial placement for a new match.
    ///
    /// Pursuers go to the least-populated room, taking the first empty room
    /// found after a shuffle. The first grimoire prefers the largest room;
    /// later ones avoid rooms already chosen in this pass.
    pub fn on_match_start(
        &mut self,
        pursuers: usize,
        grimoires: usize,
        roster: &mut Roster,
        zones: &mut PatrolZones,
        mut svc: Services<'_>,
    ) -> Vec<EntityId> {
        if !self.authority.is_authoritative() {
            return Vec::new();
        }
        if self.spawners.is_empty() {
            warn!("Match started with no registered spawners");
            return Vec::new();
        }

        let mut spawned = Vec::new();

        for slot in 0..pursuers {
            let Some(index) = self.pick_pursuer_spawner(roster) else {
                warn!("No room has capacity for pursuer {}/{pursuers}", slot + 1);
                break;
            };
            let spawner = self.spawners[index].id;
            match self.try_spawn(roster, zones, spawner, Archetype::Pursuer, svc.reborrow()) {
                Ok(id) => spawned.push(id),
                Err(e) => debug!("Initial pursuer {} not placed: {e}", slot + 1),
            }
        }

        let mut chosen: BTreeSet<RoomId> = BTreeSet::new();
        for slot in 0..grimoires {
            let preferred = if slot == 0 {
                self.largest_room_spawner(roster)
            } else {
                None
            };
            let Some(index) = preferred.or_else(|| self.pick_grimoire_spawner(roster, &chosen)) else {
                warn!("No room has capacity for grimoire {}/{grimoires}", slot + 1);
                break;
            };
            let spawner = self.spawners[index].id;
            let room = self.spawners[index].room.clone();
            match self.try_spawn(roster, zones, spawner, Archetype::Grimoire, svc.reborrow()) {
                Ok(id) => {
                    chosen.insert(room);
                    spawned.push(id);
                },
                Err(e) => debug!("Initial grimoire {} not placed: {e}", slot + 1),
            }
        }

        info!(
            "Initial placement: {} of {} enemies spawned across {} rooms",
            spawned.len(),
            pursuers + grimoires,
            roster.occupancy().len()
        );
        spawned
    }

    fn shuffled_indices(&mut self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.spawners.len()).collect();
        self.rng.shuffle(&mut order);
        order
    }

    fn pick_pursuer_spawner(&mut self, roster: &Roster) -> Option<usize> {
        let max = self.capacity(Archetype::Pursuer);
        let mut best: Option<(usize, usize)> = None;
        for index in self.shuffled_indices() {
            let s = &self.spawners[index];
            if s.is_occupied() {
                continue;
            }
            let count = roster.count_in_room(&s.room, Archetype::Pursuer);
            if count >= max {
                continue;
            }
            if count == 0 {
                return Some(index);
            }
            if best.map_or(true, |(_, c)| count < c) {
                best = Some((index, count));
            }
        }
        best.map(|(index, _)| index)
    }

    fn largest_room_spawner(&self, roster: &Roster) -> Option<usize> {
        let max = self.capacity(Archetype::Grimoire);
        let largest = self
            .rooms
            .iter()
            .filter(|r| self.spawners.iter().any(|s| s.room == r.id))
            .max_by(|a, b| a.bounds.volume().total_cmp(&b.bounds.volume()))?;
        if roster.count_in_room(&largest.id, Archetype::Grimoire) >= max {
            return None;
        }
        self.free_spawner_in(&largest.id)
    }

    fn pick_grimoire_spawner(&mut self, roster: &Roster, chosen: &BTreeSet<RoomId>) -> Option<usize> {
        let max = self.capacity(Archetype::Grimoire);
        self.shuffled_indices().into_iter().find(|&index| {
            let s = &self.spawners[index];
            !s.is_occupied() && !chosen.contains(&s.room) && roster.count_in_room(&s.room, Archetype::Grimoire) < max
        })
    }

    fn enqueue(
        &mut self,
        spawner: SpawnerId,
        archetype: Archetype,
        delay: f32,
        alert_target: Option<Vec3>,
        cause: RespawnCause,
    ) -> f64 {
        let scheduled_time = self.now + f64::from(delay.max(0.0));
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(PendingRespawn {
            scheduled_time,
            spawner,
            archetype,
            alert_target,
            cause,
            seq,
        });
        self.publish(EncounterEvent::RespawnQueued {
            spawner,
            archetype,
            scheduled_time,
            instant: cause == RespawnCause::Instant,
        });
        scheduled_time
    }

    /// Releases a removed enemy's spawner and route.
    pub fn release_enemy(&mut self, enemy: &Enemy, zones: &mut PatrolZones) {
        zones.release(enemy.id());
        for spawner in &mut self.spawners {
            if spawner.occupant == Some(enemy.id()) {
                spawner.occupant = None;
            }
        }
    }

    /// Releases a dead enemy's bookkeeping and schedules its respawn.
    ///
    /// Returns the scheduled time, or `None` when no respawn was queued.
    pub fn on_enemy_death(&mut self, enemy: &Enemy, zones: &mut PatrolZones) -> Option<f64> {
        if !self.authority.is_authoritative() {
            return None;
        }
        self.release_enemy(enemy, zones);

        let Some(spawner) = enemy.spawner() else {
            debug!("Enemy {} had no spawner; no respawn", enemy.id());
            return None;
        };
        if self.spawner(spawner).is_none() {
            warn!("Enemy {} came from unknown spawner {spawner}; no respawn", enemy.id());
            return None;
        }

        let (delay, cause) = if self.rng.f32() < self.spawn_config().instant_respawn_chance {
            (self.spawn_config().instant_respawn_delay, RespawnCause::Instant)
        } else {
            (self.current_respawn_delay(), RespawnCause::Death)
        };
        let at = self.enqueue(spawner, enemy.archetype(), delay, None, cause);
        debug!("Respawn of {} at spawner {spawner} scheduled for t={at:.2} ({cause:?})", enemy.archetype().name());
        Some(at)
    }

    /// Spawner nearest `position` whose room differs from the room containing it.
    fn nearest_spawner_outside(&self, position: Vec3) -> Option<SpawnerId> {
        let inside = room_at(&self.rooms, position, 0.0).map(|(room, _)| room);
        self.spawners
            .iter()
            .filter(|s| inside.as_ref() != Some(&s.room))
            .min_by(|a, b| {
                a.position
                    .distance_squared(position)
                    .total_cmp(&b.position.distance_squared(position))
            })
            .map(|s| s.id)
    }

    /// May queue one extra pursuer near a detector's alert.
    pub fn on_reinforcement_alert(&mut self, position: Vec3) -> Option<SpawnerId> {
        if !self.authority.is_authoritative() {
            return None;
        }
        if self.rng.f32() >= self.spawn_config().reinforcement_spawn_chance {
            return None;
        }
        let Some(spawner) = self.nearest_spawner_outside(position) else {
            debug!("No spawner outside the alerted room for a reinforcement spawn");
            return None;
        };
        let delay = self.spawn_config().reinforcement_spawn_delay;
        self.enqueue(
            spawner,
            Archetype::Pursuer,
            delay,
            Some(position),
            RespawnCause::Reinforcement,
        );
        info!("Reinforcement spawn queued at spawner {spawner}");
        Some(spawner)
    }

    /// Queues a delayed spawn near a milestone, at most once per cooldown.
    pub fn on_milestone_event(&mut self, position: Vec3) -> Option<SpawnerId> {
        if !self.authority.is_authoritative() {
            return None;
        }
        let cooldown = f64::from(self.spawn_config().milestone_cooldown);
        if let Some(last) = self.last_milestone {
            if self.now - last < cooldown {
                debug!("Milestone spawn on cooldown ({:.1}s left)", cooldown - (self.now - last));
                return None;
            }
        }
        let Some(spawner) = self.nearest_spawner_outside(position) else {
            warn!("No spawner available for milestone spawn");
            return None;
        };
        self.last_milestone = Some(self.now);
        let delay = self.spawn_config().milestone_spawn_delay;
        self.enqueue(spawner, Archetype::Pursuer, delay, None, RespawnCause::Milestone);
        info!("Milestone spawn queued at spawner {spawner}");
        Some(spawner)
    }

    /// Advances the clock and spawns every queued entry that is due.
    ///
    /// Due entries refused by capacity are dropped.
    pub fn tick(
        &mut self,
        dt: f32,
        roster: &mut Roster,
        zones: &mut PatrolZones,
        mut svc: Services<'_>,
    ) -> Vec<EntityId> {
        if !self.authority.is_authoritative() {
            return Vec::new();
        }
        self.now += f64::from(dt.max(0.0));

        let mut spawned = Vec::new();
        while self.queue.peek().is_some_and(|p| p.scheduled_time <= self.now) {
            let Some(due) = self.queue.pop() else {
                break;
            };
            match self.try_spawn(roster, zones, due.spawner, due.archetype, svc.reborrow()) {
                Ok(id) => {
                    if let Some(position) = due.alert_target {
                        if let Some(pursuer) = roster.get_mut(id).and_then(Enemy::as_pursuer_mut) {
                            pursuer.alert(position, None);
                        }
                    }
                    spawned.push(id);
                },
                Err(e) => debug!("Dropped {:?} spawn at {}: {e}", due.cause, due.spawner),
            }
        }
        spawned
    }

    /// Forgets spawners, rooms and the queue (map unload).
    pub fn clear(&mut self) {
        self.spawners.clear();
        self.rooms.clear();
        self.queue.clear();
        self.last_milestone = None;
        self.now = 0.0;
        self.match_progress = 0.0;
    }

    /// Rooms discovered at registration.
    #[must_use]
    pub fn rooms(&self) -> &[RoomInfo] {
        &self.rooms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::mock::{MockNavigation, MockWorld, RecordingCues};
    use heist_common::Aabb;

    struct Rig {
        world: MockWorld,
        nav: MockNavigation,
        cues: RecordingCues,
        bus: EventBus,
        roster: Roster,
        zones: PatrolZones,
        spawns: SpawnManager,
    }

    impl Rig {
        fn new(spawn: SpawnConfig) -> Self {
            let bus = EventBus::new(256);
            let config = EncounterConfig {
                spawn: SpawnConfig {
                    rng_seed: Some(7),
                    ..spawn
                },
                ..EncounterConfig::default()
            };
            let spawns = SpawnManager::new(config, Authority::server(), bus.sender());
            Self {
                world: MockWorld::new(),
                nav: MockNavigation::new(),
                cues: RecordingCues::new(),
                bus,
                roster: Roster::new(),
                zones: PatrolZones::new(Some(1)),
                spawns,
            }
        }

        fn register(&mut self) {
            self.spawns.register_all_spawners(&self.world, &self.world);
        }

        fn spawn(&mut self, spawner: u32, archetype: Archetype) -> Result<EntityId, SpawnError> {
            let svc = Services::new(&self.world, &self.world, &mut self.nav, &mut self.cues);
            self.spawns
                .try_spawn(&mut self.roster, &mut self.zones, SpawnerId::new(spawner), archetype, svc)
        }

        fn tick(&mut self, dt: f32) -> Vec<EntityId> {
            let svc = Services::new(&self.world, &self.world, &mut self.nav, &mut self.cues);
            self.spawns.tick(dt, &mut self.roster, &mut self.zones, svc)
        }

        fn kill(&mut self, id: EntityId) -> Option<f64> {
            let enemy = self.roster.remove(id).expect("live enemy");
            self.spawns.on_enemy_death(&enemy, &mut self.zones)
        }
    }

    fn library_and_hall(rig: &mut Rig) -> (RoomId, RoomId) {
        let library = rig
            .world
            .add_room("Library", Aabb::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(10.0, 4.0, 10.0)));
        let hall = rig
            .world
            .add_room("Hall", Aabb::new(Vec3::new(20.0, 0.0, 0.0), Vec3::new(40.0, 6.0, 20.0)));
        (library, hall)
    }

    #[test]
    fn test_interpolated_delay_bounds() {
        assert_eq!(interpolate_respawn_delay(30.0, 8.0, 0.0), 30.0);
        assert_eq!(interpolate_respawn_delay(30.0, 8.0, 1.0), 8.0);
        assert_eq!(interpolate_respawn_delay(30.0, 8.0, 0.5), 19.0);
        assert_eq!(interpolate_respawn_delay(30.0, 8.0, 4.0), 8.0);
    }

    #[test]
    fn test_room_resolution_chain() {
        let mut rig = Rig::new(SpawnConfig::default());
        let (library, hall) = library_and_hall(&mut rig);
        // Parented.
        rig.world.add_spawner(Vec3::new(100.0, 0.0, 100.0), 0.0, Some(library.clone()));
        // Ground beneath.
        rig.world.add_spawner(Vec3::new(25.0, 0.0, 5.0), 0.0, None);
        // Just outside the Library footprint, within the threshold.
        rig.world.add_spawner(Vec3::new(12.0, 2.0, 5.0), 0.0, None);
        // Nowhere.
        rig.world.add_spawner(Vec3::new(200.0, 0.0, 200.0), 0.0, None);
        rig.register();

        let rooms: Vec<RoomId> = rig.spawns.spawners().iter().map(|s| s.room.clone()).collect();
        assert_eq!(rooms, vec![library.clone(), hall, library, RoomId::unknown()]);
    }

    #[test]
    fn test_capacity_refusal() {
        let mut rig = Rig::new(SpawnConfig::default());
        let (library, _) = library_and_hall(&mut rig);
        for x in [2.0, 5.0, 8.0] {
            rig.world.add_spawner(Vec3::new(x, 0.0, 5.0), 0.0, Some(library.clone()));
        }
        rig.register();

        rig.spawn(0, Archetype::Pursuer).expect("first");
        rig.spawn(1, Archetype::Pursuer).expect("second");
        let err = rig.spawn(2, Archetype::Pursuer).expect_err("room full");
        assert_eq!(
            err,
            SpawnError::RoomFull {
                room: library.clone(),
                archetype: Archetype::Pursuer,
                count: 2,
                max: 2
            }
        );
        assert_eq!(rig.roster.count_in_room(&library, Archetype::Pursuer), 2);
        assert_eq!(rig.nav.agent_count(), 2);

        rig.spawn(2, Archetype::Grimoire).expect("grimoire has its own cap");
        assert!(matches!(rig.spawn(0, Archetype::Grimoire), Err(SpawnError::RoomFull { .. })));

        let refused = rig
            .bus
            .drain()
            .into_iter()
            .filter(|e| matches!(e, EncounterEvent::SpawnRefused { .. }))
            .count();
        assert_eq!(refused, 2);
    }

    #[test]
    fn test_occupied_spawner_falls_back_within_room() {
        let mut rig = Rig::new(SpawnConfig {
            max_enemies_per_room: 3,
            ..SpawnConfig::default()
        });
        let (library, _) = library_and_hall(&mut rig);
        rig.world.add_spawner(Vec3::new(2.0, 0.0, 5.0), 0.0, Some(library.clone()));
        rig.world.add_spawner(Vec3::new(8.0, 0.0, 5.0), 0.0, Some(library));
        rig.register();

        let first = rig.spawn(0, Archetype::Pursuer).expect("first");
        let second = rig.spawn(0, Archetype::Pursuer).expect("falls back");
        assert_eq!(rig.roster.get(first).and_then(Enemy::spawner), Some(SpawnerId::new(0)));
        assert_eq!(rig.roster.get(second).and_then(Enemy::spawner), Some(SpawnerId::new(1)));
        assert_eq!(
            rig.spawn(0, Archetype::Pursuer),
            Err(SpawnError::SpawnerOccupied(SpawnerId::new(0)))
        );
    }

    #[test]
    fn test_spawn_fires_cue_and_starts_brain() {
        let mut rig = Rig::new(SpawnConfig::default());
        let (library, _) = library_and_hall(&mut rig);
        rig.world.add_spawner(Vec3::new(2.0, 0.0, 5.0), 0.0, Some(library));
        rig.register();

        let id = rig.spawn(0, Archetype::Pursuer).expect("spawn");
        assert_eq!(rig.cues.count_for(id, Cue::Spawn), 1);
        assert_eq!(rig.roster.get(id).and_then(Enemy::state_name), Some("Patrol"));
        assert!(rig.spawns.spawners()[0].is_occupied());
    }

    #[test]
    fn test_unknown_spawner() {
        let mut rig = Rig::new(SpawnConfig::default());
        assert_eq!(rig.spawn(0, Archetype::Pursuer), Err(SpawnError::NoSpawners));

        let (library, _) = library_and_hall(&mut rig);
        rig.world.add_spawner(Vec3::new(2.0, 0.0, 5.0), 0.0, Some(library));
        rig.register();
        assert_eq!(
            rig.spawn(9, Archetype::Pursuer),
            Err(SpawnError::UnknownSpawner(SpawnerId::new(9)))
        );
    }

    #[test]
    fn test_queued_respawn_after_interpolated_delay() {
        let mut rig = Rig::new(SpawnConfig {
            instant_respawn_chance: 0.0,
            base_respawn_delay: 30.0,
            min_respawn_delay: 10.0,
            ..SpawnConfig::default()
        });
        let (library, _) = library_and_hall(&mut rig);
        rig.world.add_spawner(Vec3::new(2.0, 0.0, 5.0), 0.0, Some(library));
        rig.register();
        let id = rig.spawn(0, Archetype::Pursuer).expect("spawn");

        rig.tick(5.0);
        rig.spawns.set_match_progress(0.5);
        let at = rig.kill(id).expect("queued");
        assert!((at - 25.0).abs() < 1e-6);
        assert!(!rig.spawns.spawners()[0].is_occupied());

        let pending = rig.spawns.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].cause, RespawnCause::Death);

        assert!(rig.tick(19.0).is_empty());
        let spawned = rig.tick(1.5);
        assert_eq!(spawned.len(), 1);
        assert_eq!(
            rig.roster.get(spawned[0]).and_then(Enemy::spawner),
            Some(SpawnerId::new(0))
        );
        assert_eq!(rig.spawns.pending_len(), 0);
    }

    #[test]
    fn test_instant_respawn_uses_short_delay() {
        let mut rig = Rig::new(SpawnConfig {
            instant_respawn_chance: 1.0,
            instant_respawn_delay: 1.0,
            ..SpawnConfig::default()
        });
        let (library, _) = library_and_hall(&mut rig);
        rig.world.add_spawner(Vec3::new(2.0, 0.0, 5.0), 0.0, Some(library));
        rig.register();
        let id = rig.spawn(0, Archetype::Grimoire).expect("spawn");

        assert_eq!(rig.kill(id), Some(1.0));
        assert_eq!(rig.spawns.pending()[0].cause, RespawnCause::Instant);
        let spawned = rig.tick(1.0);
        assert_eq!(spawned.len(), 1);
        assert_eq!(
            rig.roster.get(spawned[0]).map(Enemy::archetype),
            Some(Archetype::Grimoire)
        );
    }

    #[test]
    fn test_due_respawn_dropped_when_room_full() {
        let mut rig = Rig::new(SpawnConfig {
            instant_respawn_chance: 1.0,
            instant_respawn_delay: 2.0,
            max_enemies_per_room: 1,
            ..SpawnConfig::default()
        });
        let (library, _) = library_and_hall(&mut rig);
        rig.world.add_spawner(Vec3::new(2.0, 0.0, 5.0), 0.0, Some(library.clone()));
        rig.world.add_spawner(Vec3::new(8.0, 0.0, 5.0), 0.0, Some(library.clone()));
        rig.register();
        let id = rig.spawn(0, Archetype::Pursuer).expect("spawn");
        rig.kill(id);
        rig.spawn(1, Archetype::Pursuer).expect("refill");

        assert!(rig.tick(3.0).is_empty());
        assert_eq!(rig.spawns.pending_len(), 0);
        assert_eq!(rig.roster.count_in_room(&library, Archetype::Pursuer), 1);
    }

    #[test]
    fn test_initial_placement_spreads_and_respects_caps() {
        let mut rig = Rig::new(SpawnConfig::default());
        let (library, hall) = library_and_hall(&mut rig);
        for x in [2.0, 5.0, 8.0] {
            rig.world.add_spawner(Vec3::new(x, 0.0, 5.0), 0.0, Some(library.clone()));
        }
        for x in [22.0, 30.0, 38.0] {
            rig.world.add_spawner(Vec3::new(x, 0.0, 10.0), 0.0, Some(hall.clone()));
        }
        rig.register();

        let svc = Services::new(&rig.world, &rig.world, &mut rig.nav, &mut rig.cues);
        let spawned = rig
            .spawns
            .on_match_start(6, 3, &mut rig.roster, &mut rig.zones, svc);

        // Two pursuers per room, then one grimoire per room on the spare spawners.
        assert_eq!(spawned.len(), 6);
        for room in [&library, &hall] {
            assert_eq!(rig.roster.count_in_room(room, Archetype::Pursuer), 2);
            assert_eq!(rig.roster.count_in_room(room, Archetype::Grimoire), 1);
        }
    }

    #[test]
    fn test_first_pursuers_take_empty_rooms() {
        let mut rig = Rig::new(SpawnConfig::default());
        let (library, hall) = library_and_hall(&mut rig);
        for x in [2.0, 5.0, 8.0] {
            rig.world.add_spawner(Vec3::new(x, 0.0, 5.0), 0.0, Some(library.clone()));
        }
        rig.world.add_spawner(Vec3::new(30.0, 0.0, 10.0), 0.0, Some(hall.clone()));
        rig.register();

        let svc = Services::new(&rig.world, &rig.world, &mut rig.nav, &mut rig.cues);
        rig.spawns.on_match_start(2, 0, &mut rig.roster, &mut rig.zones, svc);
        assert_eq!(rig.roster.count_in_room(&library, Archetype::Pursuer), 1);
        assert_eq!(rig.roster.count_in_room(&hall, Archetype::Pursuer), 1);
    }

    #[test]
    fn test_first_grimoire_prefers_largest_room() {
        let mut rig = Rig::new(SpawnConfig::default());
        let (library, hall) = library_and_hall(&mut rig);
        rig.world.add_spawner(Vec3::new(2.0, 0.0, 5.0), 0.0, Some(library));
        rig.world.add_spawner(Vec3::new(30.0, 0.0, 10.0), 0.0, Some(hall.clone()));
        rig.register();

        let svc = Services::new(&rig.world, &rig.world, &mut rig.nav, &mut rig.cues);
        rig.spawns.on_match_start(0, 1, &mut rig.roster, &mut rig.zones, svc);
        assert_eq!(rig.roster.count_in_room(&hall, Archetype::Grimoire), 1);
    }

    #[test]
    fn test_reinforcement_spawn_outside_alerted_room() {
        let mut rig = Rig::new(SpawnConfig {
            reinforcement_spawn_chance: 1.0,
            reinforcement_spawn_delay: 0.0,
            ..SpawnConfig::default()
        });
        let (library, hall) = library_and_hall(&mut rig);
        rig.world.add_spawner(Vec3::new(8.0, 0.0, 5.0), 0.0, Some(library));
        rig.world.add_spawner(Vec3::new(22.0, 0.0, 5.0), 0.0, Some(hall.clone()));
        rig.register();

        let alert = Vec3::new(6.0, 1.0, 5.0);
        assert_eq!(rig.spawns.on_reinforcement_alert(alert), Some(SpawnerId::new(1)));
        let spawned = rig.tick(0.1);
        assert_eq!(spawned.len(), 1);

        let enemy = rig.roster.get_mut(spawned[0]).expect("spawned");
        assert_eq!(enemy.room(), &hall);
        enemy.update(0.1, Services::new(&rig.world, &rig.world, &mut rig.nav, &mut rig.cues));
        let pursuer = enemy.as_pursuer().expect("pursuer");
        assert!(pursuer.is_investigating());
        assert_eq!(pursuer.last_known_position(), Some(alert));
    }

    #[test]
    fn test_reinforcement_roll_can_fail() {
        let mut rig = Rig::new(SpawnConfig {
            reinforcement_spawn_chance: 0.0,
            ..SpawnConfig::default()
        });
        let (library, _) = library_and_hall(&mut rig);
        rig.world.add_spawner(Vec3::new(8.0, 0.0, 5.0), 0.0, Some(library));
        rig.register();
        assert_eq!(rig.spawns.on_reinforcement_alert(Vec3::new(30.0, 1.0, 5.0)), None);
        assert_eq!(rig.spawns.pending_len(), 0);
    }

    #[test]
    fn test_milestone_cooldown() {
        let mut rig = Rig::new(SpawnConfig {
            milestone_cooldown: 30.0,
            milestone_spawn_delay: 5.0,
            ..SpawnConfig::default()
        });
        let (library, _) = library_and_hall(&mut rig);
        rig.world.add_spawner(Vec3::new(8.0, 0.0, 5.0), 0.0, Some(library));
        rig.register();

        let at = Vec3::new(30.0, 1.0, 5.0);
        assert!(rig.spawns.on_milestone_event(at).is_some());
        assert!(rig.spawns.on_milestone_event(at).is_none());
        rig.tick(10.0);
        assert!(rig.spawns.on_milestone_event(at).is_none());
        rig.tick(20.0);
        assert!(rig.spawns.on_milestone_event(at).is_some());
        assert_eq!(rig.spawns.pending()[0].scheduled_time, 35.0);
    }

    #[test]
    fn test_observer_never_spawns() {
        let bus = EventBus::new(8);
        let mut spawns = SpawnManager::new(EncounterConfig::default(), Authority::observer(), bus.sender());
        let mut world = MockWorld::new();
        let library = world.add_room("Library", Aabb::new(Vec3::ZERO, Vec3::splat(10.0)));
        world.add_spawner(Vec3::new(2.0, 0.0, 2.0), 0.0, Some(library));
        assert_eq!(spawns.register_all_spawners(&world, &world), 0);

        let mut nav = MockNavigation::new();
        let mut cues = RecordingCues::new();
        let svc = Services::new(&world, &world, &mut nav, &mut cues);
        let mut roster = Roster::new();
        let mut zones = PatrolZones::new(None);
        assert_eq!(
            spawns.try_spawn(&mut roster, &mut zones, SpawnerId::new(0), Archetype::Pursuer, svc),
            Err(SpawnError::NotAuthoritative)
        );
    }
}
