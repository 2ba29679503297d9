//! In-memory collaborators.
//!
//! Box-collider world, straight-line navigation and a recording cue sink.
//! The test suites and the headless harness drive the encounter through
//! these; a game host replaces them with its engine bindings.

use std::collections::BTreeMap;

use heist_common::{flatten, Aabb, EntityId, ExclusionZone, LayerMask, Pose, RoomId, Vec3, GEOMETRY_EPSILON};

use crate::world::{
    Cue, CueSink, Navigation, RayHit, RoomInfo, SceneMetadata, SpatialQuery, SpawnerInfo, Targets,
};

/// Thickness of the floor slab created for each room.
const FLOOR_THICKNESS: f32 = 0.2;

#[derive(Debug, Clone)]
struct Collider {
    id: EntityId,
    bounds: Aabb,
    layer: LayerMask,
    room: Option<RoomId>,
}

#[derive(Debug, Clone, Copy)]
struct Player {
    position: Vec3,
    alive: bool,
}

/// Static scene made of axis-aligned colliders plus moving players.
#[derive(Debug, Clone, Default)]
pub struct MockWorld {
    colliders: Vec<Collider>,
    players: BTreeMap<EntityId, Player>,
    rooms: Vec<RoomInfo>,
    exclusion_zones: Vec<ExclusionZone>,
    spawners: Vec<SpawnerInfo>,
    map_bounds: Option<Aabb>,
}

impl MockWorld {
    /// Creates an empty world.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a live player and returns its handle.
    pub fn add_player(&mut self, position: Vec3) -> EntityId {
        let id = EntityId::new();
        self.players.insert(id, Player { position, alive: true });
        id
    }

    /// Moves a player.
    pub fn move_player(&mut self, id: EntityId, position: Vec3) {
        if let Some(player) = self.players.get_mut(&id) {
            player.position = position;
        }
    }

    /// Marks a player dead; its handle stops resolving.
    pub fn kill(&mut self, id: EntityId) {
        if let Some(player) = self.players.get_mut(&id) {
            player.alive = false;
        }
    }

    /// Adds a collider on an arbitrary layer.
    pub fn add_collider(&mut self, bounds: Aabb, layer: LayerMask, room: Option<RoomId>) -> EntityId {
        let id = EntityId::new();
        self.colliders.push(Collider {
            id,
            bounds,
            layer,
            room,
        });
        id
    }

    /// Adds a view- and movement-blocking obstacle.
    pub fn add_obstacle(&mut self, bounds: Aabb) -> EntityId {
        self.add_collider(bounds, LayerMask::OBSTACLE, None)
    }

    /// Adds walkable ground, optionally owned by a room.
    pub fn add_ground(&mut self, bounds: Aabb, room: Option<RoomId>) -> EntityId {
        self.add_collider(bounds, LayerMask::GROUND, room)
    }

    /// Registers a room and lays a floor slab under its footprint.
    ///
    /// The floor's top face sits at `bounds.min.y`.
    pub fn add_room(&mut self, name: &str, bounds: Aabb) -> RoomId {
        let id = RoomId::new(name);
        let floor = Aabb::new(
            Vec3::new(bounds.min.x, bounds.min.y - FLOOR_THICKNESS, bounds.min.z),
            Vec3::new(bounds.max.x, bounds.min.y, bounds.max.z),
        );
        self.add_ground(floor, Some(id.clone()));
        self.rooms.push(RoomInfo {
            id: id.clone(),
            bounds,
        });
        id
    }

    /// Adds an exclusion volume.
    pub fn add_exclusion_zone(&mut self, zone: ExclusionZone) {
        self.exclusion_zones.push(zone);
    }

    /// Adds a spawner.
    pub fn add_spawner(&mut self, position: Vec3, yaw: f32, parent_room: Option<RoomId>) {
        self.spawners.push(SpawnerInfo {
            position,
            yaw,
            parent_room,
        });
    }

    /// Overrides the map bounds instead of deriving them from colliders.
    pub fn set_map_bounds(&mut self, bounds: Aabb) {
        self.map_bounds = Some(bounds);
    }
}

impl SpatialQuery for MockWorld {
    fn overlap_sphere(&self, center: Vec3, radius: f32, mask: LayerMask) -> Vec<EntityId> {
        let mut hits = Vec::new();

        if mask.intersects(LayerMask::PLAYER) {
            hits.extend(
                self.players
                    .iter()
                    .filter(|(_, p)| p.alive && p.position.distance(center) <= radius)
                    .map(|(id, _)| *id),
            );
        }

        hits.extend(
            self.colliders
                .iter()
                .filter(|c| c.layer.intersects(mask) && c.bounds.intersects_sphere(center, radius))
                .map(|c| c.id),
        );

        hits
    }

    fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32, mask: LayerMask) -> Option<RayHit> {
        let dir = direction.try_normalize()?;
        let mut best: Option<RayHit> = None;

        for collider in self.colliders.iter().filter(|c| c.layer.intersects(mask)) {
            let Some((t, normal)) = collider.bounds.ray_intersection(origin, dir, max_distance) else {
                continue;
            };
            if best.as_ref().map_or(true, |b| t < b.distance) {
                best = Some(RayHit {
                    point: origin + dir * t,
                    distance: t,
                    normal,
                    collider: Some(collider.id),
                });
            }
        }

        best
    }
}

impl Targets for MockWorld {
    fn is_alive(&self, target: EntityId) -> bool {
        self.players.get(&target).is_some_and(|p| p.alive)
    }

    fn position(&self, target: EntityId) -> Option<Vec3> {
        self.players.get(&target).filter(|p| p.alive).map(|p| p.position)
    }
}

impl SceneMetadata for MockWorld {
    fn map_bounds(&self) -> Option<Aabb> {
        self.map_bounds.or_else(|| {
            Aabb::union_all(
                self.colliders
                    .iter()
                    .filter(|c| c.layer.intersects(LayerMask::GROUND | LayerMask::OBSTACLE))
                    .map(|c| c.bounds),
            )
        })
    }

    fn rooms(&self) -> Vec<RoomInfo> {
        self.rooms.clone()
    }

    fn exclusion_zones(&self) -> Vec<ExclusionZone> {
        self.exclusion_zones.clone()
    }

    fn spawners(&self) -> Vec<SpawnerInfo> {
        self.spawners.clone()
    }

    fn room_of_collider(&self, collider: EntityId) -> Option<RoomId> {
        self.colliders
            .iter()
            .find(|c| c.id == collider)
            .and_then(|c| c.room.clone())
    }
}

#[derive(Debug, Clone)]
struct Agent {
    pose: Pose,
    destination: Option<Vec3>,
    stopped: bool,
    move_requests: u32,
}

/// Navigation that walks agents in straight lines at a fixed speed.
#[derive(Debug, Clone)]
pub struct MockNavigation {
    agents: BTreeMap<EntityId, Agent>,
    ready: bool,
    walkable: Option<Aabb>,
    speed: f32,
    stopping_distance: f32,
    path_pending: bool,
}

impl Default for MockNavigation {
    fn default() -> Self {
        Self::new()
    }
}

impl MockNavigation {
    /// Ready navigation where every point is walkable.
    #[must_use]
    pub fn new() -> Self {
        Self {
            agents: BTreeMap::new(),
            ready: true,
            walkable: None,
            speed: 3.5,
            stopping_distance: 0.5,
            path_pending: false,
        }
    }

    /// Sets whether the navigable surface is built.
    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    /// Restricts the navigable surface to a footprint.
    pub fn set_walkable(&mut self, bounds: Aabb) {
        self.walkable = Some(bounds);
    }

    /// Sets the walking speed in units per second.
    pub fn set_speed(&mut self, speed: f32) {
        self.speed = speed;
    }

    /// Reports every path as still being computed.
    pub fn set_path_pending(&mut self, pending: bool) {
        self.path_pending = pending;
    }

    /// Moves an agent instantly.
    pub fn teleport(&mut self, agent: EntityId, position: Vec3) {
        if let Some(a) = self.agents.get_mut(&agent) {
            a.pose.position = position;
        }
    }

    /// Current destination of an agent.
    #[must_use]
    pub fn destination(&self, agent: EntityId) -> Option<Vec3> {
        self.agents.get(&agent).and_then(|a| a.destination)
    }

    /// Whether an agent is halted.
    #[must_use]
    pub fn is_stopped(&self, agent: EntityId) -> bool {
        self.agents.get(&agent).map_or(true, |a| a.stopped)
    }

    /// Number of `move_to` calls an agent received.
    #[must_use]
    pub fn move_requests(&self, agent: EntityId) -> u32 {
        self.agents.get(&agent).map_or(0, |a| a.move_requests)
    }

    /// Number of agents on the surface.
    #[must_use]
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Advances every moving agent toward its destination.
    pub fn step(&mut self, dt: f32) {
        let max_step = self.speed * dt;
        for agent in self.agents.values_mut() {
            if agent.stopped || self.path_pending {
                continue;
            }
            let Some(dest) = agent.destination else {
                continue;
            };
            let offset = flatten(dest - agent.pose.position);
            let distance = offset.length();
            if distance < GEOMETRY_EPSILON {
                continue;
            }
            let travel = distance.min(max_step);
            let dir = offset / distance;
            agent.pose.position += dir * travel;
            agent.pose.forward = dir;
        }
    }
}

impl Navigation for MockNavigation {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn sample_position(&self, point: Vec3, max_distance: f32) -> Option<Vec3> {
        if !self.ready {
            return None;
        }
        let Some(walkable) = self.walkable else {
            return Some(point);
        };
        let mut snapped = walkable.closest_point(point);
        snapped.y = point.y;
        (snapped.distance(point) <= max_distance).then_some(snapped)
    }

    fn add_agent(&mut self, agent: EntityId, pose: Pose) {
        self.agents.insert(
            agent,
            Agent {
                pose,
                destination: None,
                stopped: false,
                move_requests: 0,
            },
        );
    }

    fn remove_agent(&mut self, agent: EntityId) {
        self.agents.remove(&agent);
    }

    fn pose(&self, agent: EntityId) -> Option<Pose> {
        self.agents.get(&agent).map(|a| a.pose)
    }

    fn set_forward(&mut self, agent: EntityId, forward: Vec3) {
        if let Some(a) = self.agents.get_mut(&agent) {
            a.pose = Pose::new(a.pose.position, forward);
        }
    }

    fn move_to(&mut self, agent: EntityId, destination: Vec3) {
        if let Some(a) = self.agents.get_mut(&agent) {
            a.destination = Some(destination);
            a.stopped = false;
            a.move_requests += 1;
        }
    }

    fn stop(&mut self, agent: EntityId) {
        if let Some(a) = self.agents.get_mut(&agent) {
            a.stopped = true;
        }
    }

    fn resume(&mut self, agent: EntityId) {
        if let Some(a) = self.agents.get_mut(&agent) {
            a.stopped = false;
        }
    }

    fn is_path_pending(&self, _agent: EntityId) -> bool {
        self.path_pending
    }

    fn remaining_distance(&self, agent: EntityId) -> f32 {
        self.agents
            .get(&agent)
            .and_then(|a| a.destination.map(|d| flatten(d - a.pose.position).length()))
            .unwrap_or(0.0)
    }

    fn stopping_distance(&self, _agent: EntityId) -> f32 {
        self.stopping_distance
    }
}

/// Cue sink that keeps every cue in firing order.
#[derive(Debug, Clone, Default)]
pub struct RecordingCues {
    fired: Vec<(EntityId, Cue)>,
}

impl RecordingCues {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded cue.
    #[must_use]
    pub fn fired(&self) -> &[(EntityId, Cue)] {
        &self.fired
    }

    /// Number of times `cue` fired on any source.
    #[must_use]
    pub fn count(&self, cue: Cue) -> usize {
        self.fired.iter().filter(|(_, c)| *c == cue).count()
    }

    /// Number of times `cue` fired on `source`.
    #[must_use]
    pub fn count_for(&self, source: EntityId, cue: Cue) -> usize {
        self.fired.iter().filter(|(s, c)| *s == source && *c == cue).count()
    }

    /// Forgets everything recorded.
    pub fn clear(&mut self) {
        self.fired.clear();
    }
}

impl CueSink for RecordingCues {
    fn fire(&mut self, source: EntityId, cue: Cue) {
        self.fired.push((source, cue));
    }
}
