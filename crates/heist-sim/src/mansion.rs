//! The demo map and the crew's scripted route through it.

use std::f32::consts::{FRAC_PI_2, PI};

use heist_ai::mock::MockWorld;
use heist_common::{Aabb, ExclusionZone, RoomId, Vec3};

/// Height of the intruder's aim point above the floor.
const INTRUDER_HEIGHT: f32 = 1.0;

/// Demo map plus the names of its rooms.
pub struct Mansion {
    /// Scene the encounter runs against
    pub world: MockWorld,
    /// Room holding the loot
    pub vault: RoomId,
}

/// Four rooms strung along a corridor running east-west at z = 6.
///
/// The Hall is the largest room, so it receives the first grimoire.
#[must_use]
pub fn build() -> Mansion {
    let mut world = MockWorld::new();

    let library = world.add_room("Library", Aabb::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(12.0, 4.0, 12.0)));
    let hall = world.add_room("Hall", Aabb::new(Vec3::new(16.0, 0.0, -2.0), Vec3::new(34.0, 6.0, 14.0)));
    let vault = world.add_room("Vault", Aabb::new(Vec3::new(38.0, 0.0, 0.0), Vec3::new(48.0, 4.0, 10.0)));
    let kitchen = world.add_room("Kitchen", Aabb::new(Vec3::new(52.0, 0.0, 0.0), Vec3::new(62.0, 4.0, 12.0)));

    world.add_ground(Aabb::new(Vec3::new(0.0, -0.2, 5.0), Vec3::new(62.0, 0.0, 7.0)), None);

    // Bookshelves, pillars, the safe.
    world.add_obstacle(Aabb::new(Vec3::new(3.0, 0.0, 9.0), Vec3::new(9.0, 2.5, 10.0)));
    world.add_obstacle(Aabb::new(Vec3::new(24.0, 0.0, 2.0), Vec3::new(25.0, 6.0, 3.0)));
    world.add_obstacle(Aabb::new(Vec3::new(24.0, 0.0, 9.0), Vec3::new(25.0, 6.0, 10.0)));
    world.add_exclusion_zone(ExclusionZone::Sphere {
        center: Vec3::new(43.0, 0.0, 8.0),
        radius: 1.5,
    });

    for (room, a, b) in [
        (&library, Vec3::new(1.0, 0.0, 1.0), Vec3::new(11.0, 0.0, 11.0)),
        (&hall, Vec3::new(17.0, 0.0, -1.0), Vec3::new(33.0, 0.0, 13.0)),
        (&vault, Vec3::new(39.0, 0.0, 1.0), Vec3::new(47.0, 0.0, 9.0)),
        (&kitchen, Vec3::new(53.0, 0.0, 1.0), Vec3::new(61.0, 0.0, 11.0)),
    ] {
        world.add_spawner(a, FRAC_PI_2 / 2.0, Some(room.clone()));
        world.add_spawner(b, PI + FRAC_PI_2 / 2.0, Some(room.clone()));
    }
    // An unparented spawner in the corridor; its room is resolved from the floor.
    world.add_spawner(Vec3::new(14.0, 0.0, 6.0), FRAC_PI_2, None);

    Mansion { world, vault }
}

/// An intruder walking a fixed path back and forth.
#[derive(Debug, Clone)]
pub struct CrewPath {
    points: Vec<Vec3>,
    speed: f32,
    segment: usize,
    position: Vec3,
}

impl CrewPath {
    /// Corridor run from the Library to the Kitchen with a detour through the Vault.
    #[must_use]
    pub fn through(speed: f32) -> Self {
        let points = vec![
            Vec3::new(2.0, INTRUDER_HEIGHT, 6.0),
            Vec3::new(30.0, INTRUDER_HEIGHT, 6.0),
            Vec3::new(40.0, INTRUDER_HEIGHT, 6.0),
            Vec3::new(44.0, INTRUDER_HEIGHT, 3.0),
            Vec3::new(40.0, INTRUDER_HEIGHT, 6.0),
            Vec3::new(60.0, INTRUDER_HEIGHT, 6.0),
        ];
        Self {
            position: points[0],
            points,
            speed,
            segment: 0,
        }
    }

    /// Current aim point.
    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Walks `dt` seconds along the path, turning back at either end.
    pub fn advance(&mut self, dt: f32) -> Vec3 {
        let mut budget = self.speed * dt;
        while budget > 0.0 {
            let Some(&next) = self.points.get(self.segment + 1) else {
                self.points.reverse();
                self.segment = 0;
                continue;
            };
            let to = next - self.position;
            let distance = to.length();
            if distance <= budget {
                self.position = next;
                self.segment += 1;
                budget -= distance;
            } else {
                self.position += to / distance * budget;
                budget = 0.0;
            }
        }
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heist_ai::SceneMetadata;

    #[test]
    fn test_mansion_layout() {
        let mansion = build();
        assert_eq!(mansion.world.rooms().len(), 4);
        assert_eq!(mansion.world.spawners().len(), 9);
        assert_eq!(mansion.vault, RoomId::new("Vault"));
    }

    #[test]
    fn test_crew_path_turns_back_at_the_end() {
        let mut path = CrewPath::through(10.0);
        for _ in 0..100 {
            path.advance(0.5);
        }
        let p = path.position();
        assert!(p.x >= 2.0 - 1e-3 && p.x <= 60.0 + 1e-3);
        assert!((p.y - INTRUDER_HEIGHT).abs() < 1e-5);
    }
}
