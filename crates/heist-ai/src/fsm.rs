//! Finite state machine shared by every archetype.
//!
//! States are a closed enum per archetype. Each variant maps to a table of
//! plain function hooks ({enter, update, exit}); the machine only sequences
//! them. Deciding *which* state comes next is left to the archetype's tick.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of a state for logs and snapshots.
pub trait StateKind: Copy + Eq + fmt::Debug {
    /// Stable display name.
    fn name(self) -> &'static str;
}

/// Hooks run by the machine for one state.
pub struct StateHooks<C: ?Sized> {
    /// Runs once when the state becomes active
    pub on_enter: fn(&mut C),
    /// Runs every tick while active
    pub on_update: fn(&mut C, f32),
    /// Runs once when the state is left
    pub on_exit: fn(&mut C),
}

/// Hook that does nothing.
pub fn no_hook<C: ?Sized>(_ctx: &mut C) {}

/// Update hook that does nothing.
pub fn no_update<C: ?Sized>(_ctx: &mut C, _dt: f32) {}

/// Dispatch table from a state variant to its hooks, for a context type `C`.
pub trait StateTable<C: ?Sized>: StateKind {
    /// Hooks of this state.
    fn hooks(self) -> StateHooks<C>;
}

/// A recorded state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition<S> {
    /// State left, `None` for the initial entry
    pub from: Option<S>,
    /// State entered
    pub to: S,
}

/// Exactly-one-active-state machine.
#[derive(Debug, Clone)]
pub struct StateMachine<S> {
    current: Option<S>,
    time_in_state: f32,
    history: Vec<Transition<S>>,
}

impl<S: StateKind> Default for StateMachine<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: StateKind> StateMachine<S> {
    /// Creates a machine with no active state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: None,
            time_in_state: 0.0,
            history: Vec::new(),
        }
    }

    /// Active state, `None` before start and after teardown.
    #[must_use]
    pub fn current(&self) -> Option<S> {
        self.current
    }

    /// Whether `state` is active.
    #[must_use]
    pub fn is(&self, state: S) -> bool {
        self.current == Some(state)
    }

    /// Seconds since the active state was entered.
    #[must_use]
    pub fn time_in_state(&self) -> f32 {
        self.time_in_state
    }

    /// Name of the active state.
    #[must_use]
    pub fn state_name(&self) -> Option<&'static str> {
        self.current.map(StateKind::name)
    }

    /// Switches to `next`, running exit and enter hooks.
    ///
    /// Re-entering the active state is a no-op; returns whether a change happened.
    pub fn transition<C: ?Sized>(&mut self, next: S, ctx: &mut C) -> bool
    where
        S: StateTable<C>,
    {
        if self.current == Some(next) {
            return false;
        }
        self.force(next, ctx);
        true
    }

    /// Switches to `next` even if it is already active, restarting it.
    pub fn force<C: ?Sized>(&mut self, next: S, ctx: &mut C)
    where
        S: StateTable<C>,
    {
        let from = self.current.take();
        if let Some(prev) = from {
            (prev.hooks().on_exit)(ctx);
        }
        self.current = Some(next);
        self.time_in_state = 0.0;
        self.history.push(Transition { from, to: next });
        (next.hooks().on_enter)(ctx);
    }

    /// Runs the active state's update hook.
    pub fn update<C: ?Sized>(&mut self, ctx: &mut C, dt: f32)
    where
        S: StateTable<C>,
    {
        if let Some(state) = self.current {
            self.time_in_state += dt;
            (state.hooks().on_update)(ctx, dt);
        }
    }

    /// Exits the active state and leaves the machine empty.
    pub fn teardown<C: ?Sized>(&mut self, ctx: &mut C)
    where
        S: StateTable<C>,
    {
        if let Some(state) = self.current.take() {
            (state.hooks().on_exit)(ctx);
        }
        self.time_in_state = 0.0;
    }

    /// Clears the active state without running hooks.
    pub fn clear(&mut self) {
        self.current = None;
        self.time_in_state = 0.0;
    }

    /// Takes the transitions recorded since the last call.
    pub fn drain_transitions(&mut self) -> Vec<Transition<S>> {
        std::mem::take(&mut self.history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Light {
        Red,
        Green,
    }

    #[derive(Default)]
    struct Log {
        lines: Vec<String>,
        green_time: f32,
    }

    impl StateKind for Light {
        fn name(self) -> &'static str {
            match self {
                Light::Red => "Red",
                Light::Green => "Green",
            }
        }
    }

    fn red_enter(log: &mut Log) {
        log.lines.push("enter red".into());
    }

    fn red_exit(log: &mut Log) {
        log.lines.push("exit red".into());
    }

    fn green_update(log: &mut Log, dt: f32) {
        log.green_time += dt;
    }

    impl StateTable<Log> for Light {
        fn hooks(self) -> StateHooks<Log> {
            match self {
                Light::Red => StateHooks {
                    on_enter: red_enter,
                    on_update: no_update,
                    on_exit: red_exit,
                },
                Light::Green => StateHooks {
                    on_enter: no_hook,
                    on_update: green_update,
                    on_exit: no_hook,
                },
            }
        }
    }

    #[test]
    fn test_transition_runs_hooks_in_order() {
        let mut fsm = StateMachine::new();
        let mut log = Log::default();

        assert!(fsm.transition(Light::Red, &mut log));
        assert!(fsm.transition(Light::Green, &mut log));
        assert_eq!(log.lines, vec!["enter red", "exit red"]);
        assert!(fsm.is(Light::Green));
    }

    #[test]
    fn test_same_state_is_noop_unless_forced() {
        let mut fsm = StateMachine::new();
        let mut log = Log::default();

        fsm.transition(Light::Red, &mut log);
        assert!(!fsm.transition(Light::Red, &mut log));
        assert_eq!(log.lines.len(), 1);

        fsm.force(Light::Red, &mut log);
        assert_eq!(log.lines, vec!["enter red", "exit red", "enter red"]);
    }

    #[test]
    fn test_update_and_time_in_state() {
        let mut fsm = StateMachine::new();
        let mut log = Log::default();

        fsm.update(&mut log, 1.0);
        assert_eq!(fsm.time_in_state(), 0.0);

        fsm.transition(Light::Green, &mut log);
        fsm.update(&mut log, 0.5);
        fsm.update(&mut log, 0.25);
        assert!((log.green_time - 0.75).abs() < 1e-6);
        assert!((fsm.time_in_state() - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_teardown_exits_and_clears() {
        let mut fsm = StateMachine::new();
        let mut log = Log::default();

        fsm.transition(Light::Red, &mut log);
        fsm.teardown(&mut log);
        assert_eq!(fsm.current(), None);
        assert_eq!(log.lines.last().map(String::as_str), Some("exit red"));

        let history = fsm.drain_transitions();
        assert_eq!(history, vec![Transition { from: None, to: Light::Red }]);
        assert!(fsm.drain_transitions().is_empty());
    }

    #[test]
    fn test_transition_serializes_state_names() {
        use crate::pursuer::PursuerState;

        let transition = Transition {
            from: Some(PursuerState::Patrol),
            to: PursuerState::Chase,
        };
        let json = serde_json::to_string(&transition).expect("serialize");
        assert_eq!(json, r#"{"from":"Patrol","to":"Chase"}"#);
        let back: Transition<PursuerState> = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, transition);
    }
}
