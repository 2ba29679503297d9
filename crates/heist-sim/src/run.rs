//! One scripted heist against the demo mansion.

use std::collections::BTreeMap;

use crossbeam_channel::Receiver;
use heist_ai::mock::{MockNavigation, MockWorld, RecordingCues};
use heist_ai::{
    Authority, Cue, Encounter, EncounterEvent, EncounterSnapshot, Navigation, Services, Targets,
};
use heist_common::{EntityId, RoomId};
use serde::Serialize;
use tracing::{debug, info};

use crate::mansion::{self, CrewPath};
use crate::settings::SimSettings;

/// Walking speed of the crew in units per second.
const CREW_SPEED: f32 = 2.5;

/// Totals reported at the end of a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Ticks simulated
    pub ticks: u64,
    /// Event counts by kind
    pub events: BTreeMap<&'static str, usize>,
    /// Cue counts by kind
    pub cues: BTreeMap<String, usize>,
    /// Enemies the crew took down
    pub takedowns: usize,
    /// Whether the milestone spawn fired
    pub milestone_triggered: bool,
    /// Snapshots received by the observer stream
    pub snapshots_observed: usize,
    /// Final encounter state
    pub final_snapshot: Option<EncounterSnapshot>,
}

/// Mutable state of a run.
pub struct HeistRun {
    settings: SimSettings,
    world: MockWorld,
    nav: MockNavigation,
    cues: RecordingCues,
    encounter: Encounter,
    crew: EntityId,
    path: CrewPath,
    vault: RoomId,
    observer: Receiver<EncounterSnapshot>,
    summary: RunSummary,
    elapsed: f32,
    since_takedown: f32,
    since_report: f32,
}

impl HeistRun {
    /// Builds the mansion, loads it and places the opening guards.
    #[must_use]
    pub fn new(settings: SimSettings) -> Self {
        let mansion = mansion::build();
        let mut world = mansion.world;
        let path = CrewPath::through(CREW_SPEED);
        let crew = world.add_player(path.position());

        let mut encounter = Encounter::new(settings.encounter.clone(), Authority::server());
        let observer = encounter.subscribe(256);
        let mut nav = MockNavigation::new();
        let mut cues = RecordingCues::new();

        encounter.load_map(&world, &world, &nav);
        let placed = encounter.start_match(
            settings.run.pursuers,
            settings.run.grimoires,
            Services::new(&world, &world, &mut nav, &mut cues),
        );
        info!("Placed {} guards", placed.len());

        Self {
            settings,
            world,
            nav,
            cues,
            encounter,
            crew,
            path,
            vault: mansion.vault,
            observer,
            summary: RunSummary::default(),
            elapsed: 0.0,
            since_takedown: 0.0,
            since_report: 0.0,
        }
    }

    /// Runs every tick and returns the totals.
    pub fn run(mut self) -> RunSummary {
        let dt = self.settings.run.tick_seconds;
        for _ in 0..self.settings.run.total_ticks() {
            self.step(dt);
        }
        self.finish()
    }

    fn step(&mut self, dt: f32) {
        self.elapsed += dt;
        let crew_at = self.path.advance(dt);
        self.world.move_player(self.crew, crew_at);

        let progress = self.elapsed / self.settings.run.duration_seconds;
        self.encounter.set_match_progress(progress);

        if !self.summary.milestone_triggered && self.in_vault() && self.encounter.on_milestone_event(crew_at) {
            self.summary.milestone_triggered = true;
            info!("Crew reached the vault at t={:.1}s", self.elapsed);
        }

        self.since_takedown += dt;
        if self.settings.run.takedown_interval > 0.0 && self.since_takedown >= self.settings.run.takedown_interval {
            self.since_takedown = 0.0;
            self.take_down_nearest();
        }

        self.encounter.tick(
            dt,
            &self.world,
            Services::new(&self.world, &self.world, &mut self.nav, &mut self.cues),
        );
        self.nav.step(dt);

        for event in self.encounter.drain_events() {
            *self.summary.events.entry(event_kind(&event)).or_default() += 1;
            debug!("{event:?}");
        }
        while self.observer.try_recv().is_ok() {
            self.summary.snapshots_observed += 1;
        }

        self.since_report += dt;
        if self.since_report >= self.settings.run.report_interval {
            self.since_report = 0.0;
            self.report();
        }
    }

    fn in_vault(&self) -> bool {
        self.encounter
            .spawns()
            .rooms()
            .iter()
            .any(|r| r.id == self.vault && r.bounds.contains(self.path.position()))
    }

    fn take_down_nearest(&mut self) {
        let crew_at = self.path.position();
        let nearest = self
            .encounter
            .roster()
            .iter()
            .filter_map(|e| self.nav.pose(e.id()).map(|p| (e.id(), p.position.distance(crew_at))))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id);
        let Some(victim) = nearest else {
            return;
        };
        let respawn = self.encounter.on_enemy_death(
            victim,
            Services::new(&self.world, &self.world, &mut self.nav, &mut self.cues),
        );
        self.summary.takedowns += 1;
        match respawn {
            Some(at) => info!("Crew took down {victim}, respawn due at t={at:.1}s"),
            None => info!("Crew took down {victim}, no respawn"),
        }
    }

    fn report(&self) {
        let occupancy: Vec<String> = self
            .encounter
            .occupancy()
            .iter()
            .map(|(room, o)| format!("{room}:{}/{}", o.pursuers, o.grimoires))
            .collect();
        let chasing = self
            .encounter
            .roster()
            .iter()
            .filter(|e| e.target() == Some(self.crew))
            .count();
        info!(
            "t={:.0}s guards={} chasing={} pending={} rooms=[{}] crew_alive={}",
            self.elapsed,
            self.encounter.roster().len(),
            chasing,
            self.encounter.spawns().pending_len(),
            occupancy.join(" "),
            self.world.is_alive(self.crew)
        );
    }

    fn finish(mut self) -> RunSummary {
        for cue in [Cue::Attack, Cue::Alert, Cue::Spawn] {
            self.summary.cues.insert(format!("{cue:?}"), self.cues.count(cue));
        }
        let svc = Services::new(&self.world, &self.world, &mut self.nav, &mut self.cues);
        self.summary.final_snapshot = Some(self.encounter.snapshot(&svc));
        self.summary.ticks = self.encounter.ticks();

        self.encounter
            .shutdown(Services::new(&self.world, &self.world, &mut self.nav, &mut self.cues));
        self.summary
    }
}

fn event_kind(event: &EncounterEvent) -> &'static str {
    match event {
        EncounterEvent::EnemySpawned { .. } => "enemy_spawned",
        EncounterEvent::EnemyDied { .. } => "enemy_died",
        EncounterEvent::EnemyDespawned { .. } => "enemy_despawned",
        EncounterEvent::SpawnRefused { .. } => "spawn_refused",
        EncounterEvent::RespawnQueued { .. } => "respawn_queued",
        EncounterEvent::AttackLanded { .. } => "attack_landed",
        EncounterEvent::ReinforcementsCalled { .. } => "reinforcements_called",
        EncounterEvent::StateChanged { .. } => "state_changed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_run_places_guards_and_reports() {
        let mut settings = SimSettings::default();
        settings.run.duration_seconds = 20.0;
        settings.run.takedown_interval = 5.0;
        settings.encounter.spawn.rng_seed = Some(3);
        settings.encounter.patrol_zone.rng_seed = Some(3);

        let summary = HeistRun::new(settings).run();

        assert_eq!(summary.ticks, 200);
        assert!(summary.takedowns >= 3);
        assert_eq!(summary.snapshots_observed, 200);
        assert_eq!(summary.events.get("enemy_died"), Some(&summary.takedowns));
        assert!(summary.cues["Spawn"] >= 8);
        let snapshot = summary.final_snapshot.expect("snapshot");
        assert_eq!(snapshot.tick, 200);
        assert!(!snapshot.enemies.is_empty());
    }
}
