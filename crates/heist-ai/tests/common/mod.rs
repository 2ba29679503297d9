#![allow(dead_code)]

use heist_ai::mock::{MockNavigation, MockWorld, RecordingCues};
use heist_ai::{Authority, Encounter, EncounterConfig, Services};
use heist_common::{Aabb, RoomId, Vec3};

/// Mock world, navigation, cues and the encounter under test.
pub struct Harness {
    pub world: MockWorld,
    pub nav: MockNavigation,
    pub cues: RecordingCues,
    pub encounter: Encounter,
}

impl Harness {
    pub fn new(world: MockWorld, config: EncounterConfig) -> Self {
        Self {
            world,
            nav: MockNavigation::new(),
            cues: RecordingCues::new(),
            encounter: Encounter::new(config, Authority::server()),
        }
    }

    pub fn load(&mut self) {
        self.encounter.load_map(&self.world, &self.world, &self.nav);
    }

    pub fn services(&mut self) -> Services<'_> {
        Services::new(&self.world, &self.world, &mut self.nav, &mut self.cues)
    }

    pub fn start(&mut self, pursuers: usize, grimoires: usize) -> Vec<heist_common::EntityId> {
        let svc = Services::new(&self.world, &self.world, &mut self.nav, &mut self.cues);
        self.encounter.start_match(pursuers, grimoires, svc)
    }

    /// One encounter tick followed by one navigation step.
    pub fn tick(&mut self, dt: f32) {
        let svc = Services::new(&self.world, &self.world, &mut self.nav, &mut self.cues);
        self.encounter.tick(dt, &self.world, svc);
        self.nav.step(dt);
    }
}

/// Four rooms along +X with a corridor gap between each, two spawners per room.
pub fn mansion() -> (MockWorld, Vec<RoomId>) {
    let mut world = MockWorld::new();
    let mut rooms = Vec::new();
    for (i, name) in ["Library", "Hall", "Vault", "Kitchen"].iter().enumerate() {
        let x0 = i as f32 * 16.0;
        let room = world.add_room(name, Aabb::new(Vec3::new(x0, 0.0, 0.0), Vec3::new(x0 + 12.0, 4.0, 12.0)));
        world.add_spawner(Vec3::new(x0 + 2.0, 0.0, 2.0), 0.0, Some(room.clone()));
        world.add_spawner(Vec3::new(x0 + 10.0, 0.0, 10.0), 0.0, Some(room.clone()));
        rooms.push(room);
    }
    (world, rooms)
}

pub fn seeded_config() -> EncounterConfig {
    let mut config = EncounterConfig::default();
    config.spawn.rng_seed = Some(11);
    config.patrol_zone.rng_seed = Some(5);
    config
}
