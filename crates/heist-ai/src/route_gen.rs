//! Waypoint generation from map geometry.
//!
//! Once per map load the generator samples a grid over the map bounds,
//! keeps the samples an enemy could actually stand and walk on, orders them
//! into a global route and clusters them into per-room patrol zones.

use heist_common::{nearest_neighbour_order, Aabb, ExclusionZone, RoomId, Vec3};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::authority::Authority;
use crate::config::{PatrolZoneConfig, RouteGenConfig};
use crate::patrol_zone::{RoomPatrolZone, RouteRules};
use crate::route::PatrolRoute;
use crate::world::{Navigation, RoomInfo, SceneMetadata, SpatialQuery};

/// Why a grid sample was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rejection {
    /// Downward ray found no ground
    NoGround,
    /// Ground point lies inside an exclusion volume
    Excluded,
    /// Obstacles overlap the clearance sphere
    Obstructed,
    /// Something sits above within the minimum headroom
    NoHeadroom,
    /// Point cannot be snapped onto the navigable surface
    OffNavmesh,
}

/// Counts collected during one generation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationReport {
    /// Grid samples tested
    pub sampled: usize,
    /// Samples that became waypoints
    pub accepted: usize,
    /// Rejected for missing ground
    pub no_ground: usize,
    /// Rejected by exclusion volumes
    pub excluded: usize,
    /// Rejected by the clearance overlap
    pub obstructed: usize,
    /// Rejected by the ceiling check
    pub no_headroom: usize,
    /// Rejected by the navigation snap
    pub off_navmesh: usize,
    /// Whether the navigation snap was skipped because navigation never became ready
    pub navigation_skipped: bool,
}

impl GenerationReport {
    fn record(&mut self, rejection: Rejection) {
        match rejection {
            Rejection::NoGround => self.no_ground += 1,
            Rejection::Excluded => self.excluded += 1,
            Rejection::Obstructed => self.obstructed += 1,
            Rejection::NoHeadroom => self.no_headroom += 1,
            Rejection::OffNavmesh => self.off_navmesh += 1,
        }
    }

    /// Total rejected samples.
    #[must_use]
    pub fn rejected(&self) -> usize {
        self.no_ground + self.excluded + self.obstructed + self.no_headroom + self.off_navmesh
    }
}

/// Output of a generation pass.
#[derive(Debug, Clone, Default)]
pub struct PatrolNetwork {
    /// Every waypoint, nearest-neighbour ordered
    pub global_route: PatrolRoute,
    /// Non-empty room zones (empty when clustering is disabled)
    pub zones: Vec<RoomPatrolZone>,
    /// Sample statistics
    pub report: GenerationReport,
}

/// Grid-sampling waypoint generator.
#[derive(Debug, Clone)]
pub struct RouteGenerator {
    config: RouteGenConfig,
    rules: RouteRules,
    authority: Authority,
}

impl RouteGenerator {
    /// Creates a generator.
    #[must_use]
    pub fn new(config: RouteGenConfig, zone_config: &PatrolZoneConfig, authority: Authority) -> Self {
        let rules = RouteRules {
            waypoints_per_route: zone_config.waypoints_per_route,
            random_attempts: zone_config.random_attempts,
            looping: config.looping,
        };
        Self {
            config,
            rules,
            authority,
        }
    }

    /// Config in use.
    #[must_use]
    pub fn config(&self) -> &RouteGenConfig {
        &self.config
    }

    /// Validates one grid column, returning the waypoint it yields.
    ///
    /// The ground probe starts at `origin` and travels `depth` downward.
    /// Without `nav` the navmesh snap is skipped and the raw ground point is kept.
    pub fn validate_sample(
        &self,
        origin: Vec3,
        depth: f32,
        exclusions: &[ExclusionZone],
        spatial: &dyn SpatialQuery,
        nav: Option<&dyn Navigation>,
    ) -> Result<Vec3, Rejection> {
        let cfg = &self.config;

        let ground = spatial
            .raycast(origin, Vec3::NEG_Y, depth, cfg.ground_mask)
            .ok_or(Rejection::NoGround)?;
        let point = ground.point + Vec3::Y * cfg.ground_offset;

        if exclusions.iter().any(|zone| zone.contains(ground.point) || zone.contains(point)) {
            return Err(Rejection::Excluded);
        }

        if cfg.clearance_radius > 0.0 {
            let center = point + Vec3::Y * cfg.clearance_radius;
            if !spatial
                .overlap_sphere(center, cfg.clearance_radius, cfg.obstacle_mask)
                .is_empty()
            {
                return Err(Rejection::Obstructed);
            }
        }

        if spatial
            .raycast(point, Vec3::Y, cfg.min_height_clearance, cfg.obstacle_mask | cfg.ground_mask)
            .is_some()
        {
            return Err(Rejection::NoHeadroom);
        }

        match nav {
            Some(nav) => nav
                .sample_position(point, cfg.navmesh_snap_distance)
                .ok_or(Rejection::OffNavmesh),
            None => Ok(point),
        }
    }

    /// Samples the map and returns the surviving waypoints in patrol order.
    ///
    /// Returns `None` on observers or when the map has no tagged geometry.
    pub fn generate_waypoints(
        &self,
        scene: &dyn SceneMetadata,
        spatial: &dyn SpatialQuery,
        nav: &dyn Navigation,
    ) -> Option<(Vec<Vec3>, GenerationReport)> {
        if !self.authority.is_authoritative() {
            return None;
        }
        let Some(bounds) = scene.map_bounds() else {
            warn!("No map geometry found, skipping waypoint generation");
            return None;
        };

        let exclusions = scene.exclusion_zones();
        let snap = nav.is_ready();
        let mut report = GenerationReport {
            navigation_skipped: !snap,
            ..GenerationReport::default()
        };
        if !snap {
            warn!("Navigation not ready, generating waypoints without navmesh snapping");
        }

        let spacing = self.config.grid_spacing.max(0.01);
        let top = bounds.max.y + self.config.raycast_height;
        let depth = top - bounds.min.y + 1.0;
        let snap_nav = snap.then_some(nav);
        let columns = ((bounds.size().x / spacing).floor() as usize) + 1;
        let rows = ((bounds.size().z / spacing).floor() as usize) + 1;
        let mut accepted = Vec::new();

        for i in 0..columns {
            let x = bounds.min.x + i as f32 * spacing;
            for j in 0..rows {
                let z = bounds.min.z + j as f32 * spacing;
                report.sampled += 1;
                let origin = Vec3::new(x, top, z);
                match self.validate_sample(origin, depth, &exclusions, spatial, snap_nav) {
                    Ok(point) => accepted.push(point),
                    Err(rejection) => report.record(rejection),
                }
            }
        }

        report.accepted = accepted.len();
        Some((nearest_neighbour_order(&accepted, 0), report))
    }

    /// Assigns each waypoint to the room containing it, else the nearest by center.
    ///
    /// Rooms that end up empty are dropped.
    #[must_use]
    pub fn cluster(&self, waypoints: &[Vec3], rooms: &[RoomInfo]) -> Vec<RoomPatrolZone> {
        if rooms.is_empty() {
            return Vec::new();
        }
        let mut pools: Vec<Vec<Vec3>> = vec![Vec::new(); rooms.len()];

        for wp in waypoints {
            let index = rooms
                .iter()
                .position(|r| r.bounds.contains(*wp))
                .or_else(|| nearest_room(rooms, *wp));
            if let Some(i) = index {
                pools[i].push(*wp);
            }
        }

        rooms
            .iter()
            .zip(pools)
            .filter_map(|(room, pool)| {
                if pool.is_empty() {
                    debug!("Room {} has no waypoints, dropping its zone", room.id);
                    None
                } else {
                    Some(RoomPatrolZone::new(room.id.clone(), room.bounds, pool, self.rules))
                }
            })
            .collect()
    }

    /// Full pass: waypoints, global route and room zones.
    pub fn build(
        &self,
        scene: &dyn SceneMetadata,
        spatial: &dyn SpatialQuery,
        nav: &dyn Navigation,
    ) -> Option<PatrolNetwork> {
        let (waypoints, report) = self.generate_waypoints(scene, spatial, nav)?;

        let zones = if self.config.cluster_by_room {
            self.cluster(&waypoints, &scene.rooms())
        } else {
            Vec::new()
        };

        info!(
            "Generated {} waypoints from {} samples ({} rejected) in {} room zones",
            report.accepted,
            report.sampled,
            report.rejected(),
            zones.len()
        );
        debug!(
            "Rejections: no_ground={} excluded={} obstructed={} no_headroom={} off_navmesh={}",
            report.no_ground, report.excluded, report.obstructed, report.no_headroom, report.off_navmesh
        );

        Some(PatrolNetwork {
            global_route: PatrolRoute::new(waypoints, self.config.looping),
            zones,
            report,
        })
    }
}

fn nearest_room(rooms: &[RoomInfo], point: Vec3) -> Option<usize> {
    rooms
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            a.bounds
                .center()
                .distance_squared(point)
                .total_cmp(&b.bounds.center().distance_squared(point))
        })
        .map(|(i, _)| i)
}

/// Room containing `point`, else the nearest room whose bounds lie within `threshold`.
#[must_use]
pub fn room_at(rooms: &[RoomInfo], point: Vec3, threshold: f32) -> Option<(RoomId, Aabb)> {
    if let Some(room) = rooms.iter().find(|r| r.bounds.contains(point)) {
        return Some((room.id.clone(), room.bounds));
    }
    rooms
        .iter()
        .map(|r| (r, r.bounds.distance_to(point)))
        .filter(|(_, d)| *d <= threshold)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(r, _)| (r.id.clone(), r.bounds))
}

/// Progress of the wait-for-navigation build.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RouteBuildState {
    /// Polling for the navigable surface
    WaitingForNavigation {
        /// Seconds spent waiting
        elapsed: f32,
        /// Readiness polls made
        attempts: u32,
    },
    /// Generation ran
    Complete,
}

/// Builds the patrol network once navigation is ready, without blocking the tick.
#[derive(Debug, Clone)]
pub struct RouteBuildJob {
    state: RouteBuildState,
    poll_timer: f32,
}

impl Default for RouteBuildJob {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteBuildJob {
    /// Job that polls on its first advance.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RouteBuildState::WaitingForNavigation {
                elapsed: 0.0,
                attempts: 0,
            },
            poll_timer: 0.0,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> RouteBuildState {
        self.state
    }

    /// Whether generation already ran.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state == RouteBuildState::Complete
    }

    /// Advances the wait by `dt`; yields the network once it is built.
    ///
    /// Generation runs when navigation reports ready, or best-effort once
    /// `nav_wait_timeout` has passed.
    pub fn advance(
        &mut self,
        dt: f32,
        generator: &RouteGenerator,
        scene: &dyn SceneMetadata,
        spatial: &dyn SpatialQuery,
        nav: &dyn Navigation,
    ) -> Option<PatrolNetwork> {
        let RouteBuildState::WaitingForNavigation { elapsed, attempts } = self.state else {
            return None;
        };
        let elapsed = elapsed + dt;
        self.poll_timer -= dt;
        if self.poll_timer > 0.0 {
            self.state = RouteBuildState::WaitingForNavigation { elapsed, attempts };
            return None;
        }
        self.poll_timer = generator.config().nav_poll_interval;
        let attempts = attempts + 1;

        let timed_out = elapsed >= generator.config().nav_wait_timeout;
        if !nav.is_ready() && !timed_out {
            trace!("Waiting for navigation ({attempts} polls, {elapsed:.1}s)");
            self.state = RouteBuildState::WaitingForNavigation { elapsed, attempts };
            return None;
        }
        if timed_out && !nav.is_ready() {
            warn!("Navigation still not ready after {elapsed:.1}s ({attempts} polls), building anyway");
        }

        self.state = RouteBuildState::Complete;
        generator.build(scene, spatial, nav)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockNavigation, MockWorld};
    use heist_common::{LayerMask, Quat};

    fn generator(config: RouteGenConfig) -> RouteGenerator {
        RouteGenerator::new(config, &PatrolZoneConfig::default(), Authority::server())
    }

    fn config() -> RouteGenConfig {
        RouteGenConfig {
            grid_spacing: 2.0,
            clearance_radius: 0.3,
            min_height_clearance: 2.0,
            ..RouteGenConfig::default()
        }
    }

    fn two_rooms() -> MockWorld {
        let mut world = MockWorld::new();
        world.add_room("Hall", Aabb::new(Vec3::ZERO, Vec3::new(10.0, 3.0, 10.0)));
        world.add_room("Vault", Aabb::new(Vec3::new(13.0, 0.0, 0.0), Vec3::new(21.0, 3.0, 10.0)));
        world
    }

    #[test]
    fn test_generates_on_floors_only() {
        let world = two_rooms();
        let nav = MockNavigation::new();
        let (waypoints, report) = generator(config())
            .generate_waypoints(&world, &world, &nav)
            .expect("generated");

        assert!(!waypoints.is_empty());
        assert_eq!(report.accepted, waypoints.len());
        assert_eq!(report.sampled, report.accepted + report.rejected());
        assert!(report.no_ground > 0);
        for wp in &waypoints {
            assert!(!(wp.x > 10.0 && wp.x < 13.0));
            assert!((wp.y - 0.1).abs() < 1e-4);
        }
    }

    #[test]
    fn test_rejects_exclusions_obstacles_and_low_ceilings() {
        let mut world = two_rooms();
        world.add_exclusion_zone(ExclusionZone::Sphere {
            center: Vec3::new(4.0, 0.0, 4.0),
            radius: 1.0,
        });
        world.add_exclusion_zone(ExclusionZone::Box {
            center: Vec3::new(14.0, 0.0, 2.0),
            half_extents: Vec3::new(1.0, 1.0, 1.0),
            rotation: Quat::from_rotation_y(0.3),
        });
        world.add_obstacle(Aabb::new(Vec3::new(7.5, 0.0, 7.5), Vec3::new(8.5, 2.0, 8.5)));
        world.add_collider(
            Aabb::new(Vec3::new(1.5, 1.0, 7.5), Vec3::new(2.5, 1.2, 8.5)),
            LayerMask::OBSTACLE,
            None,
        );

        let nav = MockNavigation::new();
        let (waypoints, report) = generator(config())
            .generate_waypoints(&world, &world, &nav)
            .expect("generated");

        assert!(report.excluded >= 2);
        assert!(report.obstructed >= 1);
        assert!(report.no_headroom >= 1);
        assert!(!waypoints.iter().any(|w| (w.x - 4.0).abs() < 0.1 && (w.z - 4.0).abs() < 0.1));
        assert!(!waypoints.iter().any(|w| (w.x - 8.0).abs() < 0.1 && (w.z - 8.0).abs() < 0.1));
        assert!(!waypoints.iter().any(|w| (w.x - 2.0).abs() < 0.1 && (w.z - 8.0).abs() < 0.1));
    }

    #[test]
    fn test_navmesh_snap_rejects_unwalkable() {
        let world = two_rooms();
        let mut nav = MockNavigation::new();
        nav.set_walkable(Aabb::new(Vec3::new(0.0, -1.0, 0.0), Vec3::new(10.0, 1.0, 10.0)));

        let (waypoints, report) = generator(config())
            .generate_waypoints(&world, &world, &nav)
            .expect("generated");
        assert!(report.off_navmesh > 0);
        assert!(waypoints.iter().all(|w| w.x <= 10.5));
    }

    #[test]
    fn test_clusters_into_rooms() {
        let world = two_rooms();
        let nav = MockNavigation::new();
        let network = generator(config()).build(&world, &world, &nav).expect("network");

        assert_eq!(network.zones.len(), 2);
        let total: usize = network.zones.iter().map(|z| z.waypoints().len()).sum();
        assert_eq!(total, network.global_route.len());
        for zone in &network.zones {
            assert!(zone.waypoints().iter().all(|w| zone.bounds().contains(*w)));
        }
    }

    #[test]
    fn test_empty_room_zone_dropped_and_nearest_fallback() {
        let gen = generator(config());
        let rooms = vec![
            RoomInfo {
                id: RoomId::new("A"),
                bounds: Aabb::new(Vec3::ZERO, Vec3::new(4.0, 3.0, 4.0)),
            },
            RoomInfo {
                id: RoomId::new("B"),
                bounds: Aabb::new(Vec3::new(20.0, 0.0, 0.0), Vec3::new(24.0, 3.0, 4.0)),
            },
            RoomInfo {
                id: RoomId::new("C"),
                bounds: Aabb::new(Vec3::new(50.0, 0.0, 0.0), Vec3::new(54.0, 3.0, 4.0)),
            },
        ];
        let zones = gen.cluster(&[Vec3::new(1.0, 0.1, 1.0), Vec3::new(6.0, 0.1, 2.0)], &rooms);
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].room(), &RoomId::new("A"));
        assert_eq!(zones[0].waypoints().len(), 2);
    }

    #[test]
    fn test_observer_does_not_generate() {
        let world = two_rooms();
        let nav = MockNavigation::new();
        let gen = RouteGenerator::new(config(), &PatrolZoneConfig::default(), Authority::observer());
        assert!(gen.build(&world, &world, &nav).is_none());
    }

    #[test]
    fn test_build_job_waits_then_builds() {
        let world = two_rooms();
        let mut nav = MockNavigation::new();
        nav.set_ready(false);
        let gen = generator(RouteGenConfig {
            nav_poll_interval: 0.5,
            nav_wait_timeout: 10.0,
            ..config()
        });

        let mut job = RouteBuildJob::new();
        assert!(job.advance(0.1, &gen, &world, &world, &nav).is_none());
        assert!(job.advance(0.1, &gen, &world, &world, &nav).is_none());
        assert!(matches!(
            job.state(),
            RouteBuildState::WaitingForNavigation { attempts: 1, .. }
        ));

        nav.set_ready(true);
        let mut built = None;
        for _ in 0..10 {
            if let Some(network) = job.advance(0.1, &gen, &world, &world, &nav) {
                built = Some(network);
                break;
            }
        }
        assert!(built.is_some_and(|n| !n.report.navigation_skipped));
        assert!(job.is_complete());
        assert!(job.advance(0.1, &gen, &world, &world, &nav).is_none());
    }

    #[test]
    fn test_build_job_times_out_best_effort() {
        let world = two_rooms();
        let mut nav = MockNavigation::new();
        nav.set_ready(false);
        let gen = generator(RouteGenConfig {
            nav_poll_interval: 0.5,
            nav_wait_timeout: 2.0,
            ..config()
        });

        let mut job = RouteBuildJob::new();
        let mut built = None;
        for _ in 0..30 {
            if let Some(network) = job.advance(0.25, &gen, &world, &world, &nav) {
                built = Some(network);
                break;
            }
        }
        let network = built.expect("built after timeout");
        assert!(network.report.navigation_skipped);
        assert!(!network.global_route.is_empty());
    }
}
