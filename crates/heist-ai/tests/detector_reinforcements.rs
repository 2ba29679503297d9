#![allow(clippy::unwrap_used)]

mod common;

use common::{seeded_config, Harness};
use heist_ai::mock::MockWorld;
use heist_ai::{Archetype, DetectorState, EncounterEvent, Navigation, PursuerState};
use heist_common::{Aabb, EntityId, Vec3};

/// Six spawners along the south wall of one gallery; pursuers walk slowly so
/// positions at the call match the spawn positions.
fn gallery() -> Harness {
    let mut world = MockWorld::new();
    let gallery = world.add_room("Gallery", Aabb::new(Vec3::ZERO, Vec3::new(40.0, 4.0, 40.0)));
    for x in [2.0, 6.0, 12.0, 20.0, 30.0, 38.0] {
        world.add_spawner(Vec3::new(x, 0.0, 2.0), 0.0, Some(gallery.clone()));
    }
    let mut config = seeded_config();
    config.spawn.max_enemies_per_room = 5;
    config.spawn.reinforcement_spawn_chance = 0.0;
    let mut h = Harness::new(world, config);
    h.nav.set_speed(0.1);
    h.load();
    h
}

fn grimoire_of(h: &Harness) -> EntityId {
    h.encounter
        .roster()
        .iter()
        .find(|e| e.archetype() == Archetype::Grimoire)
        .map(|e| e.id())
        .unwrap()
}

fn calls(events: &[EncounterEvent]) -> Vec<(EntityId, Vec<EntityId>)> {
    events
        .iter()
        .filter_map(|e| match e {
            EncounterEvent::ReinforcementsCalled { caller, allies, .. } => Some((*caller, allies.clone())),
            _ => None,
        })
        .collect()
}

#[test]
fn first_acquisition_calls_nearest_allies_once() {
    let mut h = gallery();
    h.start(5, 1);
    let grimoire = grimoire_of(&h);
    let origin = h.nav.pose(grimoire).unwrap().position;

    let mut expected: Vec<(EntityId, f32)> = h
        .encounter
        .roster()
        .iter()
        .filter(|e| e.archetype() == Archetype::Pursuer)
        .map(|e| (e.id(), h.nav.pose(e.id()).unwrap().position.distance(origin)))
        .filter(|(_, d)| *d <= h.encounter.config().reinforcement.search_radius)
        .collect();
    expected.sort_by(|a, b| a.1.total_cmp(&b.1));
    expected.truncate(h.encounter.config().reinforcement.max_reinforcements_to_call);
    let expected: Vec<EntityId> = expected.into_iter().map(|(id, _)| id).collect();

    h.world.add_player(origin + Vec3::new(0.0, 2.0, 4.0));
    let mut events = Vec::new();
    for _ in 0..40 {
        h.tick(0.1);
        events.extend(h.encounter.drain_events());
    }

    let made = calls(&events);
    assert_eq!(made.len(), 1);
    assert_eq!(made[0].0, grimoire);
    assert_eq!(made[0].1, expected);
    assert!(made[0].1.len() <= 3);

    let detector = h.encounter.roster().get(grimoire).unwrap().as_detector().unwrap();
    assert_eq!(detector.state(), Some(DetectorState::Tracking));
    assert!(detector.is_detecting());
}

#[test]
fn called_allies_leave_their_patrol() {
    let mut h = gallery();
    h.start(5, 1);
    let grimoire = grimoire_of(&h);
    let origin = h.nav.pose(grimoire).unwrap().position;
    h.world.add_player(origin + Vec3::new(0.0, 2.0, 4.0));

    h.tick(0.1);
    let made = calls(&h.encounter.drain_events());
    assert_eq!(made.len(), 1);
    h.tick(0.1);

    for ally in &made[0].1 {
        let state = h
            .encounter
            .roster()
            .get(*ally)
            .unwrap()
            .as_pursuer()
            .unwrap()
            .state();
        assert_ne!(state, Some(PursuerState::Patrol));
    }
}

#[test]
fn losing_the_target_returns_to_patrol_without_a_second_call() {
    let mut h = gallery();
    h.start(5, 1);
    let grimoire = grimoire_of(&h);
    let origin = h.nav.pose(grimoire).unwrap().position;
    let player = h.world.add_player(origin + Vec3::new(0.0, 2.0, 4.0));

    let mut events = Vec::new();
    for _ in 0..25 {
        h.tick(0.1);
        events.extend(h.encounter.drain_events());
    }
    h.world.kill(player);
    for _ in 0..5 {
        h.tick(0.1);
        events.extend(h.encounter.drain_events());
    }
    let detector = h.encounter.roster().get(grimoire).unwrap().as_detector().unwrap();
    assert_eq!(detector.state(), Some(DetectorState::Patrol));
    assert!(detector.allies().is_empty());

    h.world.add_player(origin + Vec3::new(0.0, 2.0, 3.0));
    for _ in 0..5 {
        h.tick(0.1);
        events.extend(h.encounter.drain_events());
    }
    assert_eq!(calls(&events).len(), 1);
}
