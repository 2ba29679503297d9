//! Patrol routes.

use heist_common::{EntityId, Vec3};
use serde::{Deserialize, Serialize};

use crate::world::Navigation;

/// Ordered waypoints an enemy walks, optionally looping back to the start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatrolRoute {
    /// Waypoints in walking order
    pub waypoints: Vec<Vec3>,
    /// Whether the last waypoint leads back to the first
    pub looping: bool,
}

impl PatrolRoute {
    /// Creates a route.
    #[must_use]
    pub fn new(waypoints: Vec<Vec3>, looping: bool) -> Self {
        Self { waypoints, looping }
    }

    /// Number of waypoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    /// Whether the route has no waypoints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// Waypoint at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Vec3> {
        self.waypoints.get(index).copied()
    }

    /// Index of the waypoint closest to `position`.
    #[must_use]
    pub fn nearest_index(&self, position: Vec3) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for (i, wp) in self.waypoints.iter().enumerate() {
            let d = wp.distance_squared(position);
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((i, d));
            }
        }
        best.map(|(i, _)| i)
    }

    /// Index after `index`, wrapping when looping, `None` at the end otherwise.
    #[must_use]
    pub fn next_index(&self, index: usize) -> Option<usize> {
        if self.waypoints.is_empty() {
            return None;
        }
        let next = index + 1;
        if next < self.waypoints.len() {
            Some(next)
        } else if self.looping {
            Some(0)
        } else {
            None
        }
    }

    /// Whether two routes visit the same waypoints in the same order.
    #[must_use]
    pub fn same_sequence(&self, other: &PatrolRoute) -> bool {
        self.waypoints == other.waypoints
    }
}

/// Walks one agent along its assigned route.
#[derive(Debug, Clone, Default)]
pub struct PatrolCursor {
    route: Option<PatrolRoute>,
    index: usize,
    started: bool,
    finished: bool,
}

impl PatrolCursor {
    /// Cursor with no route; the agent stands still.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigned route.
    #[must_use]
    pub fn route(&self) -> Option<&PatrolRoute> {
        self.route.as_ref()
    }

    /// Index of the waypoint being walked to.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Replaces the route; the next advance heads for its nearest waypoint.
    pub fn set_route(&mut self, route: Option<PatrolRoute>) {
        self.route = route.filter(|r| !r.is_empty());
        self.index = 0;
        self.started = false;
        self.finished = false;
    }

    /// Heads for the waypoint nearest the agent.
    pub fn begin(&mut self, agent: EntityId, nav: &mut dyn Navigation) {
        let position = nav.pose(agent).map(|p| p.position);
        let target = match (&self.route, position) {
            (Some(route), Some(position)) => route
                .nearest_index(position)
                .and_then(|i| route.get(i).map(|wp| (i, wp))),
            _ => None,
        };

        match target {
            Some((index, waypoint)) => {
                self.index = index;
                self.started = true;
                self.finished = false;
                nav.move_to(agent, waypoint);
            },
            None => nav.stop(agent),
        }
    }

    /// Moves on to the next waypoint once the current one is reached.
    pub fn advance(&mut self, agent: EntityId, nav: &mut dyn Navigation) {
        if self.route.is_some() && !self.started {
            self.begin(agent, nav);
            return;
        }
        let Some(route) = &self.route else {
            return;
        };
        if self.finished || nav.is_path_pending(agent) {
            return;
        }
        if nav.remaining_distance(agent) > nav.stopping_distance(agent) {
            return;
        }

        match route.next_index(self.index).and_then(|i| route.get(i).map(|wp| (i, wp))) {
            Some((index, waypoint)) => {
                self.index = index;
                nav.move_to(agent, waypoint);
            },
            None => {
                self.finished = true;
                nav.stop(agent);
            },
        }
    }
}
