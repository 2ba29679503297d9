//! Encounter orchestration.
//!
//! The [`Encounter`] is the single context object the host drives: it owns
//! the roster, the patrol zones, the spawn manager and the route build, and
//! runs them once per tick in a fixed order:
//!
//! 1. route build (until the navigable surface is ready)
//! 2. per-enemy perception and state update, in handle order
//! 3. reinforcement requests raised during the update
//! 4. respawn queue drain
//! 5. snapshot publication

use std::collections::{BTreeMap, BTreeSet};

use crossbeam_channel::Receiver;
use heist_common::{EntityId, RoomId, SpawnerId, Vec3};
use tracing::{debug, info, warn};

use crate::authority::Authority;
use crate::config::EncounterConfig;
use crate::enemy::{Archetype, Brain, Enemy, RoomOccupancy, Roster};
use crate::events::{EncounterEvent, EventBus};
use crate::fsm::StateKind;
use crate::patrol_zone::PatrolZones;
use crate::reinforcement::{select_allies, ReinforcementRequest};
use crate::route_gen::{GenerationReport, PatrolNetwork, RouteBuildJob, RouteBuildState, RouteGenerator};
use crate::snapshot::{EncounterSnapshot, EnemySnapshot, SnapshotPublisher};
use crate::spawn::{SpawnError, SpawnManager};
use crate::world::{Navigation, SceneMetadata, Services, SpatialQuery};

/// The enemy subsystem of one match.
#[derive(Debug)]
pub struct Encounter {
    config: EncounterConfig,
    authority: Authority,
    roster: Roster,
    zones: PatrolZones,
    spawns: SpawnManager,
    generator: RouteGenerator,
    route_job: Option<RouteBuildJob>,
    report: Option<GenerationReport>,
    events: EventBus,
    snapshots: SnapshotPublisher,
    ticks: u64,
}

impl Encounter {
    /// Creates an encounter; the config is validated first and replaced by
    /// the defaults if it holds values that cannot be clamped.
    #[must_use]
    pub fn new(mut config: EncounterConfig, authority: Authority) -> Self {
        if let Err(e) = config.validate() {
            warn!("{e}, using default encounter config");
            config = EncounterConfig::default();
        }
        let events = EventBus::default();
        let spawns = SpawnManager::new(config.clone(), authority.clone(), events.sender());
        let generator = RouteGenerator::new(
            config.route_generation.clone(),
            &config.patrol_zone,
            authority.clone(),
        );
        let zones = PatrolZones::new(config.patrol_zone.rng_seed);
        Self {
            config,
            authority,
            roster: Roster::new(),
            zones,
            spawns,
            generator,
            route_job: None,
            report: None,
            events,
            snapshots: SnapshotPublisher::new(),
            ticks: 0,
        }
    }

    /// Config in use.
    #[must_use]
    pub fn config(&self) -> &EncounterConfig {
        &self.config
    }

    /// Shared authority predicate.
    #[must_use]
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Live enemies.
    #[must_use]
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Room patrol zones.
    #[must_use]
    pub fn zones(&self) -> &PatrolZones {
        &self.zones
    }

    /// Spawn manager.
    #[must_use]
    pub fn spawns(&self) -> &SpawnManager {
        &self.spawns
    }

    /// Statistics of the last route generation.
    #[must_use]
    pub fn generation_report(&self) -> Option<&GenerationReport> {
        self.report.as_ref()
    }

    /// State of the route build, `None` before a map is loaded.
    #[must_use]
    pub fn route_build_state(&self) -> Option<RouteBuildState> {
        self.route_job.as_ref().map(RouteBuildJob::state)
    }

    /// Ticks run so far.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Registers the map's spawners and starts building patrol routes.
    ///
    /// Routes are built right away when navigation is ready, otherwise on a
    /// later tick once it is, or best-effort after the configured timeout.
    pub fn load_map(&mut self, scene: &dyn SceneMetadata, spatial: &dyn SpatialQuery, nav: &dyn Navigation) {
        if !self.authority.is_authoritative() {
            debug!("Observer ignores map load");
            return;
        }
        self.zones.clear();
        self.report = None;
        let spawners = self.spawns.register_all_spawners(scene, spatial);
        info!("Loading map: {} rooms, {spawners} spawners", scene.rooms().len());

        let mut job = RouteBuildJob::new();
        let network = job.advance(0.0, &self.generator, scene, spatial, nav);
        self.route_job = Some(job);
        if let Some(network) = network {
            self.install_network(network);
        }
    }

    fn install_network(&mut self, network: PatrolNetwork) {
        let PatrolNetwork {
            global_route,
            zones,
            report,
        } = network;
        let global = (!global_route.is_empty()).then_some(global_route);
        if global.is_none() {
            warn!("Route generation produced no waypoints; enemies will stand at their spawners");
        }
        self.zones.install(zones, global);
        self.report = Some(report);

        for enemy in self.roster.iter_mut() {
            let route = self.zones.route_for(enemy.id(), enemy.room());
            enemy.set_route(route);
        }
    }

    /// Performs initial placement.
    pub fn start_match(&mut self, pursuers: usize, grimoires: usize, svc: Services<'_>) -> Vec<EntityId> {
        if !self.authority.is_authoritative() {
            return Vec::new();
        }
        self.spawns
            .on_match_start(pursuers, grimoires, &mut self.roster, &mut self.zones, svc)
    }

    /// Spawns one enemy at a spawner on request (scripted or host-driven).
    pub fn spawn_at(
        &mut self,
        spawner: SpawnerId,
        archetype: Archetype,
        svc: Services<'_>,
    ) -> Result<EntityId, SpawnError> {
        self.spawns
            .try_spawn(&mut self.roster, &mut self.zones, spawner, archetype, svc)
    }

    /// Runs one simulation tick.
    pub fn tick(&mut self, dt: f32, scene: &dyn SceneMetadata, mut svc: Services<'_>) {
        if !self.authority.is_authoritative() {
            return;
        }
        self.ticks += 1;

        self.advance_route_build(dt, scene, &svc);

        for enemy in self.roster.iter_mut() {
            enemy.update(dt, svc.reborrow());
        }
        self.publish_enemy_events();
        self.prune_ally_links();
        self.apply_reinforcements(&svc);

        self.spawns
            .tick(dt, &mut self.roster, &mut self.zones, svc.reborrow());

        let snapshot = self.snapshot(&svc);
        self.snapshots.publish(&snapshot);
    }

    fn advance_route_build(&mut self, dt: f32, scene: &dyn SceneMetadata, svc: &Services<'_>) {
        let Some(job) = self.route_job.as_mut() else {
            return;
        };
        if job.is_complete() {
            return;
        }
        if let Some(network) = job.advance(dt, &self.generator, scene, svc.spatial, &*svc.nav) {
            self.install_network(network);
        }
    }

    fn publish_enemy_events(&mut self) {
        for enemy in self.roster.iter_mut() {
            let id = enemy.id();
            let mut events = Vec::new();
            match enemy.brain_mut() {
                Brain::Pursuer(p) => {
                    for t in p.drain_transitions() {
                        events.push(EncounterEvent::StateChanged {
                            enemy: id,
                            from: t.from.map(StateKind::name),
                            to: t.to.name(),
                        });
                    }
                    for target in p.drain_landed_attacks() {
                        events.push(EncounterEvent::AttackLanded { attacker: id, target });
                    }
                },
                Brain::Grimoire(d) => {
                    for t in d.drain_transitions() {
                        events.push(EncounterEvent::StateChanged {
                            enemy: id,
                            from: t.from.map(StateKind::name),
                            to: t.to.name(),
                        });
                    }
                },
            }
            for event in events {
                self.events.publish(event);
            }
        }
    }

    fn prune_ally_links(&mut self) {
        let live: BTreeSet<EntityId> = self.roster.ids().into_iter().collect();
        for enemy in self.roster.iter_mut() {
            if let Some(detector) = enemy.as_detector_mut() {
                detector.link_mut().retain_live(|ally| live.contains(&ally));
            }
        }
    }

    fn apply_reinforcements(&mut self, svc: &Services<'_>) {
        let mut requests: Vec<(EntityId, ReinforcementRequest)> = Vec::new();
        for enemy in self.roster.iter_mut() {
            let id = enemy.id();
            if let Some(detector) = enemy.as_detector_mut() {
                requests.extend(detector.drain_requests().into_iter().map(|r| (id, r)));
            }
        }

        for (caller, request) in requests {
            match request {
                ReinforcementRequest::Call { position, target } => {
                    self.call_reinforcements(caller, position, target, svc);
                },
                ReinforcementRequest::Push { position, target } => {
                    let allies = self
                        .roster
                        .get(caller)
                        .and_then(Enemy::as_detector)
                        .map(|d| d.allies().to_vec())
                        .unwrap_or_default();
                    for ally in allies {
                        if let Some(pursuer) = self.roster.get_mut(ally).and_then(Enemy::as_pursuer_mut) {
                            pursuer.alert(position, target);
                        }
                    }
                },
            }
        }
    }

    fn call_reinforcements(&mut self, caller: EntityId, position: Vec3, target: Option<EntityId>, svc: &Services<'_>) {
        let origin = svc.nav.pose(caller).map_or(position, |p| p.position);
        let candidates: Vec<(EntityId, Vec3)> = self
            .roster
            .iter()
            .filter(|e| e.archetype() == Archetype::Pursuer)
            .filter_map(|e| svc.nav.pose(e.id()).map(|p| (e.id(), p.position)))
            .collect();
        let reinforcement = &self.config.reinforcement;
        let allies = select_allies(
            origin,
            candidates,
            reinforcement.search_radius,
            reinforcement.max_reinforcements_to_call,
        );

        for ally in &allies {
            if let Some(pursuer) = self.roster.get_mut(*ally).and_then(Enemy::as_pursuer_mut) {
                pursuer.alert(position, target);
            }
        }
        if let Some(detector) = self.roster.get_mut(caller).and_then(Enemy::as_detector_mut) {
            detector.link_allies(allies.clone());
        }
        info!("Detector {caller} called {} reinforcements", allies.len());
        self.events.publish(EncounterEvent::ReinforcementsCalled {
            caller,
            allies,
            position,
        });

        self.spawns.on_reinforcement_alert(position);
    }

    /// Removes a dead enemy and schedules its respawn.
    ///
    /// Route and spawner are released before anything reads the room counts again.
    pub fn on_enemy_death(&mut self, id: EntityId, mut svc: Services<'_>) -> Option<f64> {
        if !self.authority.is_authoritative() {
            return None;
        }
        let mut enemy = match self.roster.remove(id) {
            Ok(enemy) => enemy,
            Err(e) => {
                warn!("Death reported for non-live enemy: {e}");
                return None;
            },
        };
        enemy.teardown(svc.reborrow());
        svc.nav.remove_agent(id);
        self.unlink_ally(id);
        self.events.publish(EncounterEvent::EnemyDied {
            enemy: id,
            archetype: enemy.archetype(),
        });
        self.spawns.on_enemy_death(&enemy, &mut self.zones)
    }

    /// Removes an enemy without a respawn (scene teardown, scripted removal).
    pub fn despawn(&mut self, id: EntityId, mut svc: Services<'_>) -> bool {
        if !self.authority.is_authoritative() {
            return false;
        }
        let Ok(mut enemy) = self.roster.remove(id) else {
            debug!("Despawn of non-live enemy {id} ignored");
            return false;
        };
        enemy.teardown(svc.reborrow());
        svc.nav.remove_agent(id);
        self.unlink_ally(id);
        self.spawns.release_enemy(&enemy, &mut self.zones);
        self.events.publish(EncounterEvent::EnemyDespawned { enemy: id });
        true
    }

    fn unlink_ally(&mut self, ally: EntityId) {
        for enemy in self.roster.iter_mut() {
            if let Some(detector) = enemy.as_detector_mut() {
                detector.link_mut().remove(ally);
            }
        }
    }

    /// Sends an external alert to a pursuer.
    pub fn alert_enemy(&mut self, id: EntityId, position: Vec3, target: Option<EntityId>) -> bool {
        if !self.authority.is_authoritative() {
            return false;
        }
        match self.roster.get_mut(id).and_then(Enemy::as_pursuer_mut) {
            Some(pursuer) => {
                pursuer.alert(position, target);
                true
            },
            None => false,
        }
    }

    /// Forwards a match milestone to the spawn manager.
    pub fn on_milestone_event(&mut self, position: Vec3) -> bool {
        self.spawns.on_milestone_event(position).is_some()
    }

    /// Sets the match progress fraction.
    pub fn set_match_progress(&mut self, progress: f32) {
        self.spawns.set_match_progress(progress);
    }

    /// Live enemies of `archetype` in `room`.
    #[must_use]
    pub fn count_in_room(&self, room: &RoomId, archetype: Archetype) -> usize {
        self.roster.count_in_room(room, archetype)
    }

    /// Per-room head counts.
    #[must_use]
    pub fn occupancy(&self) -> BTreeMap<RoomId, RoomOccupancy> {
        self.roster.occupancy()
    }

    /// Events published since the last drain.
    pub fn drain_events(&self) -> Vec<EncounterEvent> {
        self.events.drain()
    }

    /// Opens a snapshot stream.
    pub fn subscribe(&mut self, capacity: usize) -> Receiver<EncounterSnapshot> {
        self.snapshots.subscribe(capacity)
    }

    /// Current state as observers see it.
    #[must_use]
    pub fn snapshot(&self, svc: &Services<'_>) -> EncounterSnapshot {
        EncounterSnapshot {
            tick: self.ticks,
            time: self.spawns.now(),
            match_progress: self.spawns.match_progress(),
            enemies: self
                .roster
                .iter()
                .map(|e| EnemySnapshot::capture(e, svc.nav.pose(e.id()).map(|p| p.position)))
                .collect(),
            pending_respawns: self.spawns.pending_len(),
            occupancy: self.roster.occupancy(),
            zones: self.zones.len(),
        }
    }

    /// Tears everything down (map unload).
    pub fn shutdown(&mut self, mut svc: Services<'_>) {
        if !self.authority.is_authoritative() {
            return;
        }
        let enemies = self.roster.drain();
        let count = enemies.len();
        for mut enemy in enemies {
            enemy.teardown(svc.reborrow());
            svc.nav.remove_agent(enemy.id());
            self.events.publish(EncounterEvent::EnemyDespawned { enemy: enemy.id() });
        }
        self.zones.clear();
        self.spawns.clear();
        self.route_job = None;
        self.report = None;
        info!("Encounter shut down, {count} enemies removed");
    }
}
