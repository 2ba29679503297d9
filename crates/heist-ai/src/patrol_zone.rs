//! Room patrol zones and unique route assignment.
//!
//! Each room owns a waypoint pool. Enemies patrolling the same room get
//! routes built with different strategies so that no two of them walk the
//! same sequence at the same time.

use std::collections::BTreeMap;

use ahash::AHashMap;
use heist_common::{flatten, nearest_neighbour_order, yaw_of, Aabb, EntityId, RoomId, Vec3};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::route::PatrolRoute;

/// Rule for selecting and ordering a waypoint subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RouteStrategy {
    /// Waypoints hugging the walls, ordered around the room center
    Perimeter,
    /// Waypoints nearest the center, nearest-neighbour ordered
    Interior,
    /// Band-by-band sweep alternating direction
    Zigzag,
    /// Random subset, nearest-neighbour ordered
    Random,
}

impl RouteStrategy {
    /// Strategy for an enemy joining a zone that already has `assigned` patrols.
    #[must_use]
    pub fn for_assignment_count(assigned: usize) -> Self {
        match assigned {
            0 => Self::Perimeter,
            1 => Self::Interior,
            _ => Self::Random,
        }
    }
}

/// Limits applied when building routes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteRules {
    /// Maximum waypoints in one route
    pub waypoints_per_route: usize,
    /// Random re-rolls tried before the zigzag fallback
    pub random_attempts: u32,
    /// Whether built routes loop
    pub looping: bool,
}

impl Default for RouteRules {
    fn default() -> Self {
        Self {
            waypoints_per_route: 6,
            random_attempts: 4,
            looping: true,
        }
    }
}

/// An enemy's current route in a zone.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteAssignment {
    /// Patrolling enemy
    pub enemy: EntityId,
    /// Route handed out
    pub route: PatrolRoute,
    /// Strategy the route was built with
    pub strategy: RouteStrategy,
}

/// Waypoint pool and active assignments of one room.
#[derive(Debug, Clone)]
pub struct RoomPatrolZone {
    room: RoomId,
    bounds: Aabb,
    waypoints: Vec<Vec3>,
    rules: RouteRules,
    assignments: Vec<RouteAssignment>,
}

impl RoomPatrolZone {
    /// Creates a zone with no assignments.
    #[must_use]
    pub fn new(room: RoomId, bounds: Aabb, waypoints: Vec<Vec3>, rules: RouteRules) -> Self {
        Self {
            room,
            bounds,
            waypoints,
            rules,
            assignments: Vec::new(),
        }
    }

    /// Room key.
    #[must_use]
    pub fn room(&self) -> &RoomId {
        &self.room
    }

    /// Combined bounds of the room.
    #[must_use]
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Waypoint pool.
    #[must_use]
    pub fn waypoints(&self) -> &[Vec3] {
        &self.waypoints
    }

    /// Active assignments.
    #[must_use]
    pub fn assignments(&self) -> &[RouteAssignment] {
        &self.assignments
    }

    /// Assignment held by `enemy`, if any.
    #[must_use]
    pub fn assignment_of(&self, enemy: EntityId) -> Option<&RouteAssignment> {
        self.assignments.iter().find(|a| a.enemy == enemy)
    }

    /// Builds a route for `enemy` that differs from every other active route.
    ///
    /// Any route the enemy already holds here is released first.
    pub fn generate_unique_route(&mut self, enemy: EntityId, rng: &mut fastrand::Rng) -> Option<PatrolRoute> {
        self.release_route(enemy);
        if self.waypoints.is_empty() {
            return None;
        }

        let strategy = RouteStrategy::for_assignment_count(self.assignments.len());
        let (strategy, waypoints) = self.pick_unique(strategy, rng);
        let route = PatrolRoute::new(waypoints, self.rules.looping);

        debug!(
            "Zone {}: assigned {:?} route of {} waypoints to {}",
            self.room,
            strategy,
            route.len(),
            enemy
        );
        self.assignments.push(RouteAssignment {
            enemy,
            route: route.clone(),
            strategy,
        });
        Some(route)
    }

    /// Drops the assignment held by `enemy`. Returns whether one existed.
    pub fn release_route(&mut self, enemy: EntityId) -> bool {
        let before = self.assignments.len();
        self.assignments.retain(|a| a.enemy != enemy);
        before != self.assignments.len()
    }

    /// Drops every assignment.
    pub fn clear_assignments(&mut self) {
        self.assignments.clear();
    }

    fn is_taken(&self, waypoints: &[Vec3]) -> bool {
        self.assignments.iter().any(|a| a.route.waypoints == waypoints)
    }

    fn pick_unique(&self, preferred: RouteStrategy, rng: &mut fastrand::Rng) -> (RouteStrategy, Vec<Vec3>) {
        let first = self.select(preferred, rng);
        if !self.is_taken(&first) {
            return (preferred, first);
        }

        for _ in 0..self.rules.random_attempts {
            let candidate = self.select(RouteStrategy::Random, rng);
            if !self.is_taken(&candidate) {
                return (RouteStrategy::Random, candidate);
            }
        }

        let zigzag = self.select(RouteStrategy::Zigzag, rng);
        if !self.is_taken(&zigzag) {
            return (RouteStrategy::Zigzag, zigzag);
        }

        for shift in 1..first.len() {
            let mut rotated = first.clone();
            rotated.rotate_left(shift);
            if !self.is_taken(&rotated) {
                return (preferred, rotated);
            }
        }

        warn!(
            "Zone {} has too few waypoints ({}) for distinct routes",
            self.room,
            self.waypoints.len()
        );
        (preferred, first)
    }

    fn route_len(&self) -> usize {
        self.rules.waypoints_per_route.clamp(1, self.waypoints.len().max(1))
    }

    /// Waypoint subset for `strategy`, in walking order.
    #[must_use]
    pub fn select(&self, strategy: RouteStrategy, rng: &mut fastrand::Rng) -> Vec<Vec3> {
        if self.waypoints.is_empty() {
            return Vec::new();
        }
        match strategy {
            RouteStrategy::Perimeter => self.perimeter(),
            RouteStrategy::Interior => self.interior(),
            RouteStrategy::Zigzag => self.zigzag(),
            RouteStrategy::Random => self.random(rng),
        }
    }

    fn perimeter(&self) -> Vec<Vec3> {
        let center = self.bounds.center();
        let mut points = self.waypoints.clone();
        points.sort_by(|a, b| {
            self.bounds
                .edge_distance_xz(*a)
                .total_cmp(&self.bounds.edge_distance_xz(*b))
        });
        points.truncate(self.route_len());
        points.sort_by(|a, b| yaw_of(*a - center).total_cmp(&yaw_of(*b - center)));
        points
    }

    fn interior(&self) -> Vec<Vec3> {
        let center = self.bounds.center();
        let mut points = self.waypoints.clone();
        points.sort_by(|a, b| {
            flatten(*a - center)
                .length_squared()
                .total_cmp(&flatten(*b - center).length_squared())
        });
        points.truncate(self.route_len());
        nearest_neighbour_order(&points, 0)
    }

    fn random(&self, rng: &mut fastrand::Rng) -> Vec<Vec3> {
        let mut indices: Vec<usize> = (0..self.waypoints.len()).collect();
        rng.shuffle(&mut indices);
        indices.truncate(self.route_len());
        let points: Vec<Vec3> = indices.iter().map(|&i| self.waypoints[i]).collect();
        nearest_neighbour_order(&points, 0)
    }

    fn zigzag(&self) -> Vec<Vec3> {
        let count = self.route_len();
        let bands = ((count as f32).sqrt().round() as usize).max(1);
        let depth = self.bounds.size().z.max(f32::EPSILON);
        let band_of = |p: &Vec3| {
            let t = ((p.z - self.bounds.min.z) / depth).clamp(0.0, 1.0);
            ((t * bands as f32) as usize).min(bands - 1)
        };

        let mut sweep = self.waypoints.clone();
        sweep.sort_by(|a, b| {
            let (ba, bb) = (band_of(a), band_of(b));
            ba.cmp(&bb).then_with(|| {
                if ba % 2 == 0 {
                    a.x.total_cmp(&b.x)
                } else {
                    b.x.total_cmp(&a.x)
                }
            })
        });

        (0..count).map(|i| sweep[i * sweep.len() / count]).collect()
    }
}

/// Every room zone of the loaded map plus the global fallback route.
#[derive(Debug)]
pub struct PatrolZones {
    zones: BTreeMap<RoomId, RoomPatrolZone>,
    global_route: Option<PatrolRoute>,
    assigned_room: AHashMap<EntityId, RoomId>,
    rng: fastrand::Rng,
}

impl PatrolZones {
    /// Creates an empty set; `seed` fixes the random strategies.
    #[must_use]
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            zones: BTreeMap::new(),
            global_route: None,
            assigned_room: AHashMap::new(),
            rng: seed.map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed),
        }
    }

    /// Replaces the zones and global route with a freshly generated set.
    pub fn install(&mut self, zones: Vec<RoomPatrolZone>, global_route: Option<PatrolRoute>) {
        self.assigned_room.clear();
        self.zones = zones.into_iter().map(|z| (z.room().clone(), z)).collect();
        self.global_route = global_route;
    }

    /// Zone of a room.
    #[must_use]
    pub fn zone(&self, room: &RoomId) -> Option<&RoomPatrolZone> {
        self.zones.get(room)
    }

    /// Every zone, keyed by room.
    pub fn zones(&self) -> impl Iterator<Item = &RoomPatrolZone> {
        self.zones.values()
    }

    /// Number of zones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    /// Whether no zone exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Route covering every waypoint, used when a room has no zone.
    #[must_use]
    pub fn global_route(&self) -> Option<&PatrolRoute> {
        self.global_route.as_ref()
    }

    /// Room whose zone currently holds `enemy`'s route.
    #[must_use]
    pub fn assigned_room(&self, enemy: EntityId) -> Option<&RoomId> {
        self.assigned_room.get(&enemy)
    }

    /// Hands `enemy` a unique route in `room`, falling back to the global route.
    pub fn route_for(&mut self, enemy: EntityId, room: &RoomId) -> Option<PatrolRoute> {
        self.release(enemy);

        if let Some(zone) = self.zones.get_mut(room) {
            let route = zone.generate_unique_route(enemy, &mut self.rng)?;
            self.assigned_room.insert(enemy, room.clone());
            return Some(route);
        }

        match &self.global_route {
            Some(route) if !route.is_empty() => {
                debug!("No patrol zone for room {room}, using the global route for {enemy}");
                Some(route.clone())
            },
            _ => {
                warn!("No patrol zone for room {room} and no global route; {enemy} will stand still");
                None
            },
        }
    }

    /// Releases whatever route `enemy` holds.
    pub fn release(&mut self, enemy: EntityId) -> bool {
        match self.assigned_room.remove(&enemy) {
            Some(room) => self
                .zones
                .get_mut(&room)
                .is_some_and(|zone| zone.release_route(enemy)),
            None => false,
        }
    }

    /// Drops every zone and assignment.
    pub fn clear(&mut self) {
        self.zones.clear();
        self.assigned_room.clear();
        self.global_route = None;
    }
}
