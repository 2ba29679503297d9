//! Encounter configuration.
//!
//! Every tunable of the enemy subsystem lives here, grouped by component.
//! Configuration is plain TOML; missing fields fall back to the defaults.

use heist_common::{ConfigError, HeistResult, LayerMask};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Perception unit tuning shared by pursuers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerceptionConfig {
    /// Radius of the candidate query
    pub detection_radius: f32,
    /// Full horizontal field of view in degrees
    pub horizontal_fov_degrees: f32,
    /// Full vertical field of view in degrees
    pub vertical_fov_degrees: f32,
    /// Height of the eye above the agent's feet
    pub eye_height: f32,
    /// Seconds between polls
    pub poll_interval: f32,
    /// Layers holding perceivable targets
    pub target_mask: LayerMask,
    /// Layers that block line of sight
    pub obstacle_mask: LayerMask,
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            detection_radius: 12.0,
            horizontal_fov_degrees: 110.0,
            vertical_fov_degrees: 60.0,
            eye_height: 1.6,
            poll_interval: 0.2,
            target_mask: LayerMask::PLAYER,
            obstacle_mask: LayerMask::OBSTACLE,
        }
    }
}

/// Melee pursuer behavior tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PursuerConfig {
    /// Distance at which the pursuer switches from chasing to attacking
    pub attack_range: f32,
    /// Seconds a lost target is still chased via its last known position
    pub forget_target_time: f32,
    /// Seconds between attacks
    pub attack_cooldown: f32,
    /// Seconds between chase path refreshes
    pub chase_refresh_interval: f32,
    /// Turn rate while facing a target, degrees per second
    pub turn_speed_degrees: f32,
    /// Distance at which an investigated position counts as reached
    pub investigate_arrival_threshold: f32,
    /// Look-around rate at an investigated position, degrees per second
    pub investigate_spin_degrees: f32,
    /// Seconds spent looking around at an investigated position
    pub investigate_duration: f32,
}

impl Default for PursuerConfig {
    fn default() -> Self {
        Self {
            attack_range: 2.0,
            forget_target_time: 5.0,
            attack_cooldown: 1.5,
            chase_refresh_interval: 0.25,
            turn_speed_degrees: 360.0,
            investigate_arrival_threshold: 1.5,
            investigate_spin_degrees: 90.0,
            investigate_duration: 4.0,
        }
    }
}

/// Stationary detector (spotlight) tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Reach of the spotlight cone
    pub spotlight_range: f32,
    /// Full opening angle of the spotlight cone in degrees
    pub spotlight_angle_degrees: f32,
    /// Height of the spotlight above the agent's feet
    pub eye_height: f32,
    /// Seconds between cone queries
    pub detect_interval: f32,
    /// Seconds spent in Alert before deciding between Tracking and Patrol
    pub alert_duration: f32,
    /// Spotlight turn rate toward a target, degrees per second
    pub tracking_turn_speed_degrees: f32,
    /// Spotlight turn rate back to rest, degrees per second
    pub return_speed_degrees: f32,
    /// Seconds between movement refreshes while tracking
    pub follow_refresh_interval: f32,
    /// Layers holding perceivable targets
    pub target_mask: LayerMask,
    /// Layers that block the spotlight
    pub obstacle_mask: LayerMask,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            spotlight_range: 10.0,
            spotlight_angle_degrees: 40.0,
            eye_height: 2.0,
            detect_interval: 0.1,
            alert_duration: 1.5,
            tracking_turn_speed_degrees: 180.0,
            return_speed_degrees: 90.0,
            follow_refresh_interval: 0.5,
            target_mask: LayerMask::PLAYER,
            obstacle_mask: LayerMask::OBSTACLE,
        }
    }
}

/// Reinforcement call tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReinforcementConfig {
    /// Radius searched for allied pursuers
    pub search_radius: f32,
    /// Upper bound on allies alerted per call
    pub max_reinforcements_to_call: usize,
    /// Seconds before a detector may call again
    pub call_cooldown: f32,
    /// Seconds between target position pushes to alerted allies
    pub update_interval: f32,
    /// Ticks to wait between acquisition and the call
    pub call_delay_ticks: u32,
}

impl Default for ReinforcementConfig {
    fn default() -> Self {
        Self {
            search_radius: 25.0,
            max_reinforcements_to_call: 3,
            call_cooldown: 10.0,
            update_interval: 0.5,
            call_delay_ticks: 0,
        }
    }
}

/// Waypoint generation tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteGenConfig {
    /// Grid spacing between samples
    pub grid_spacing: f32,
    /// Height above the map top from which ground rays are cast
    pub raycast_height: f32,
    /// Offset above the ground hit for clearance probes
    pub ground_offset: f32,
    /// Radius of the obstacle clearance probe
    pub clearance_radius: f32,
    /// Minimum free height above a waypoint
    pub min_height_clearance: f32,
    /// Maximum snap distance onto the navigable surface
    pub navmesh_snap_distance: f32,
    /// Whether waypoints are clustered into per-room zones
    pub cluster_by_room: bool,
    /// Whether generated routes loop
    pub looping: bool,
    /// Layers treated as ground
    pub ground_mask: LayerMask,
    /// Layers treated as obstacles
    pub obstacle_mask: LayerMask,
    /// Seconds to wait for the navigable surface before generating anyway
    pub nav_wait_timeout: f32,
    /// Seconds between readiness checks
    pub nav_poll_interval: f32,
}

impl Default for RouteGenConfig {
    fn default() -> Self {
        Self {
            grid_spacing: 3.0,
            raycast_height: 20.0,
            ground_offset: 0.1,
            clearance_radius: 0.4,
            min_height_clearance: 2.0,
            navmesh_snap_distance: 0.5,
            cluster_by_room: true,
            looping: true,
            ground_mask: LayerMask::GROUND,
            obstacle_mask: LayerMask::OBSTACLE,
            nav_wait_timeout: 10.0,
            nav_poll_interval: 0.5,
        }
    }
}

/// Room patrol zone tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatrolZoneConfig {
    /// Waypoints picked for each route
    pub waypoints_per_route: usize,
    /// Random subsets tried before falling back to other strategies
    pub random_attempts: u32,
    /// Fixed seed for route randomness
    pub rng_seed: Option<u64>,
}

impl Default for PatrolZoneConfig {
    fn default() -> Self {
        Self {
            waypoints_per_route: 6,
            random_attempts: 4,
            rng_seed: None,
        }
    }
}

/// Spawn and respawn scheduling tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnConfig {
    /// Pursuers allowed per room
    pub max_enemies_per_room: usize,
    /// Grimoires allowed per room
    pub max_grimoires_per_room: usize,
    /// Probability of an instant respawn on death
    pub instant_respawn_chance: f32,
    /// Delay of an instant respawn in seconds
    pub instant_respawn_delay: f32,
    /// Queued respawn delay at the start of the match
    pub base_respawn_delay: f32,
    /// Queued respawn delay at the end of the match
    pub min_respawn_delay: f32,
    /// Probability that a reinforcement alert spawns an extra pursuer
    pub reinforcement_spawn_chance: f32,
    /// Delay of a reinforcement spawn in seconds
    pub reinforcement_spawn_delay: f32,
    /// Seconds between milestone-triggered spawns
    pub milestone_cooldown: f32,
    /// Delay of a milestone spawn in seconds
    pub milestone_spawn_delay: f32,
    /// Maximum distance for attributing a spawner to the nearest room
    pub nearest_room_threshold: f32,
    /// Length of the downward probe under a spawner
    pub ground_probe_distance: f32,
    /// Layers probed under a spawner
    pub ground_mask: LayerMask,
    /// Fixed seed for spawn randomness
    pub rng_seed: Option<u64>,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            max_enemies_per_room: 2,
            max_grimoires_per_room: 1,
            instant_respawn_chance: 0.25,
            instant_respawn_delay: 1.0,
            base_respawn_delay: 30.0,
            min_respawn_delay: 8.0,
            reinforcement_spawn_chance: 0.3,
            reinforcement_spawn_delay: 0.0,
            milestone_cooldown: 45.0,
            milestone_spawn_delay: 5.0,
            nearest_room_threshold: 5.0,
            ground_probe_distance: 5.0,
            ground_mask: LayerMask::GROUND,
            rng_seed: None,
        }
    }
}

/// Complete configuration of the encounter subsystem.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncounterConfig {
    /// Pursuer perception
    pub perception: PerceptionConfig,
    /// Pursuer behavior
    pub pursuer: PursuerConfig,
    /// Detector behavior
    pub detector: DetectorConfig,
    /// Reinforcement calls
    pub reinforcement: ReinforcementConfig,
    /// Waypoint generation
    pub route_generation: RouteGenConfig,
    /// Room patrol zones
    pub patrol_zone: PatrolZoneConfig,
    /// Spawn manager
    pub spawn: SpawnConfig,
}

impl EncounterConfig {
    /// Parses a config from TOML text.
    pub fn from_toml_str(text: &str) -> HeistResult<Self> {
        let config = toml::from_str(text).map_err(ConfigError::from)?;
        Ok(config)
    }

    /// Renders the config as TOML.
    pub fn to_toml_string(&self) -> HeistResult<String> {
        let text = toml::to_string_pretty(self).map_err(ConfigError::from)?;
        Ok(text)
    }

    /// Loads a config, falling back to defaults if the file is missing or invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!("Encounter config {} not found, using defaults", path.display());
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(contents) => match Self::from_toml_str(&contents) {
                Ok(mut config) => match config.validate() {
                    Ok(()) => {
                        info!("Loaded encounter config from {}", path.display());
                        config
                    },
                    Err(e) => {
                        warn!("Rejected encounter config {}: {e}", path.display());
                        Self::default()
                    },
                },
                Err(e) => {
                    warn!("Failed to parse encounter config: {e}");
                    Self::default()
                },
            },
            Err(e) => {
                warn!("Failed to read encounter config: {e}");
                Self::default()
            },
        }
    }

    /// Saves the config as TOML, creating parent directories.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> HeistResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_toml_string()?)?;
        info!("Saved encounter config to {}", path.display());
        Ok(())
    }

    /// Clamps every value into the range the simulation supports.
    ///
    /// Non-finite values cannot be clamped and are rejected.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        let p = &mut self.perception;
        p.detection_radius = finite("perception.detection_radius", p.detection_radius)?.clamp(0.5, 200.0);
        p.horizontal_fov_degrees = finite("perception.horizontal_fov_degrees", p.horizontal_fov_degrees)?.clamp(1.0, 360.0);
        p.vertical_fov_degrees = finite("perception.vertical_fov_degrees", p.vertical_fov_degrees)?.clamp(1.0, 180.0);
        p.eye_height = finite("perception.eye_height", p.eye_height)?.clamp(0.0, 10.0);
        p.poll_interval = finite("perception.poll_interval", p.poll_interval)?.clamp(0.0, 5.0);

        let a = &mut self.pursuer;
        a.attack_range = finite("pursuer.attack_range", a.attack_range)?.clamp(0.1, 50.0);
        a.forget_target_time = finite("pursuer.forget_target_time", a.forget_target_time)?.clamp(0.0, 120.0);
        a.attack_cooldown = finite("pursuer.attack_cooldown", a.attack_cooldown)?.clamp(0.05, 60.0);
        a.chase_refresh_interval = finite("pursuer.chase_refresh_interval", a.chase_refresh_interval)?.clamp(0.0, 5.0);
        a.turn_speed_degrees = finite("pursuer.turn_speed_degrees", a.turn_speed_degrees)?.clamp(1.0, 3600.0);
        a.investigate_arrival_threshold =
            finite("pursuer.investigate_arrival_threshold", a.investigate_arrival_threshold)?.clamp(0.1, 20.0);
        a.investigate_spin_degrees = finite("pursuer.investigate_spin_degrees", a.investigate_spin_degrees)?;
        a.investigate_duration = finite("pursuer.investigate_duration", a.investigate_duration)?.clamp(0.0, 120.0);

        let d = &mut self.detector;
        d.spotlight_range = finite("detector.spotlight_range", d.spotlight_range)?.clamp(0.5, 200.0);
        d.spotlight_angle_degrees = finite("detector.spotlight_angle_degrees", d.spotlight_angle_degrees)?.clamp(1.0, 180.0);
        d.eye_height = finite("detector.eye_height", d.eye_height)?.clamp(0.0, 10.0);
        d.detect_interval = finite("detector.detect_interval", d.detect_interval)?.clamp(0.0, 5.0);
        d.alert_duration = finite("detector.alert_duration", d.alert_duration)?.clamp(0.0, 60.0);
        d.tracking_turn_speed_degrees =
            finite("detector.tracking_turn_speed_degrees", d.tracking_turn_speed_degrees)?.clamp(1.0, 3600.0);
        d.return_speed_degrees = finite("detector.return_speed_degrees", d.return_speed_degrees)?.clamp(1.0, 3600.0);
        d.follow_refresh_interval = finite("detector.follow_refresh_interval", d.follow_refresh_interval)?.clamp(0.0, 5.0);

        let r = &mut self.reinforcement;
        r.search_radius = finite("reinforcement.search_radius", r.search_radius)?.clamp(0.0, 500.0);
        r.call_cooldown = finite("reinforcement.call_cooldown", r.call_cooldown)?.clamp(0.0, 600.0);
        r.update_interval = finite("reinforcement.update_interval", r.update_interval)?.clamp(0.02, 10.0);
        r.call_delay_ticks = r.call_delay_ticks.min(600);

        let g = &mut self.route_generation;
        g.grid_spacing = finite("route_generation.grid_spacing", g.grid_spacing)?.clamp(0.25, 100.0);
        g.raycast_height = finite("route_generation.raycast_height", g.raycast_height)?;
        g.ground_offset = finite("route_generation.ground_offset", g.ground_offset)?;
        g.clearance_radius = finite("route_generation.clearance_radius", g.clearance_radius)?.clamp(0.0, 10.0);
        g.min_height_clearance = finite("route_generation.min_height_clearance", g.min_height_clearance)?.clamp(0.0, 20.0);
        g.navmesh_snap_distance = finite("route_generation.navmesh_snap_distance", g.navmesh_snap_distance)?.clamp(0.0, 10.0);
        g.nav_wait_timeout = finite("route_generation.nav_wait_timeout", g.nav_wait_timeout)?.clamp(0.0, 300.0);
        g.nav_poll_interval = finite("route_generation.nav_poll_interval", g.nav_poll_interval)?.clamp(0.0, 10.0);

        self.patrol_zone.waypoints_per_route = self.patrol_zone.waypoints_per_route.clamp(1, 256);

        let s = &mut self.spawn;
        s.max_enemies_per_room = s.max_enemies_per_room.min(MAX_PER_ROOM);
        s.max_grimoires_per_room = s.max_grimoires_per_room.min(MAX_PER_ROOM);
        s.instant_respawn_chance = finite("spawn.instant_respawn_chance", s.instant_respawn_chance)?.clamp(0.0, 1.0);
        s.reinforcement_spawn_chance =
            finite("spawn.reinforcement_spawn_chance", s.reinforcement_spawn_chance)?.clamp(0.0, 1.0);
        s.instant_respawn_delay = finite("spawn.instant_respawn_delay", s.instant_respawn_delay)?.max(0.0);
        s.base_respawn_delay = finite("spawn.base_respawn_delay", s.base_respawn_delay)?.max(0.0);
        s.min_respawn_delay = finite("spawn.min_respawn_delay", s.min_respawn_delay)?.clamp(0.0, s.base_respawn_delay);
        s.reinforcement_spawn_delay = finite("spawn.reinforcement_spawn_delay", s.reinforcement_spawn_delay)?.max(0.0);
        s.milestone_cooldown = finite("spawn.milestone_cooldown", s.milestone_cooldown)?.max(0.0);
        s.milestone_spawn_delay = finite("spawn.milestone_spawn_delay", s.milestone_spawn_delay)?.max(0.0);
        s.nearest_room_threshold = finite("spawn.nearest_room_threshold", s.nearest_room_threshold)?.max(0.0);
        s.ground_probe_distance = finite("spawn.ground_probe_distance", s.ground_probe_distance)?.max(0.0);
        Ok(())
    }
}

/// Upper bound on either per-room quota.
const MAX_PER_ROOM: usize = 64;

fn finite(field: &str, value: f32) -> Result<f32, ConfigError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ConfigError::Invalid {
            field: field.to_string(),
            reason: format!("{value} is not a finite number"),
        })
    }
}
