//! Generic finite state machine.
//!
//! A [`StateMachine`] is keyed by a state-kind discriminant `K` (usually a
//! fieldless enum) and driven with an owner context `C` passed into every
//! lifecycle call. States never hold a reference to the machine or the owner;
//! they request transitions by returning [`Transition::To`] from
//! [`State::enter`] or [`State::update`].

use std::fmt::Debug;
use std::hash::Hash;

use bevy::platform::collections::HashMap;
use bevy::prelude::*;
use thiserror::Error;

/// Maximum number of transitions followed in one call.
///
/// `enter` may itself request a transition (a pass-through state such as
/// Land); chains longer than this are cut off with an error.
pub const MAX_TRANSITION_CHAIN: usize = 8;

/// Marker trait for state-kind keys.
pub trait StateKind: Copy + Eq + Hash + Debug + Send + Sync + 'static {}

impl<T: Copy + Eq + Hash + Debug + Send + Sync + 'static> StateKind for T {}

/// Outcome of a lifecycle callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transition<K> {
    /// Remain in the current state.
    #[default]
    Stay,
    /// Exit the current state and enter `K`.
    To(K),
}

/// A unit of behaviour with an enter/update/exit lifecycle.
pub trait State<C>: Send + Sync + 'static {
    /// Key type shared by every state of a machine.
    type Kind: StateKind;

    /// The kind this state is registered under.
    fn kind(&self) -> Self::Kind;

    /// Called when the machine switches to this state.
    fn enter(&mut self, ctx: &mut C) -> Transition<Self::Kind>;

    /// Called once per machine tick while this state is current.
    fn update(&mut self, ctx: &mut C) -> Transition<Self::Kind>;

    /// Called when the machine switches away from this state.
    fn exit(&mut self, ctx: &mut C);
}

/// A completed transition, recorded for listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRecord<K> {
    /// State that was exited, if any.
    pub from: Option<K>,
    /// State that was entered.
    pub to: K,
}

/// Errors raised while transitioning.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransitionError<K: Debug> {
    /// No state is registered for the requested kind. The machine is left
    /// without a current state.
    #[error("no state registered for {0:?}")]
    Unregistered(K),

    /// `enter` callbacks kept requesting transitions.
    #[error("transition chain exceeded {limit} hops (last requested {last:?})")]
    ChainTooDeep { limit: usize, last: K },
}

type BoxedState<K, C> = Box<dyn State<C, Kind = K>>;

/// Finite state machine over states of kind `K` driven with context `C`.
pub struct StateMachine<K: StateKind, C> {
    states: HashMap<K, BoxedState<K, C>>,
    current: Option<K>,
    journal: Vec<TransitionRecord<K>>,
}

impl<K: StateKind, C> Default for StateMachine<K, C> {
    fn default() -> Self {
        Self {
            states: HashMap::default(),
            current: None,
            journal: Vec::new(),
        }
    }
}

impl<K: StateKind, C: 'static> StateMachine<K, C> {
    /// Create an empty machine with no current state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: register a state.
    pub fn with_state(mut self, state: impl State<C, Kind = K>) -> Self {
        self.register(state);
        self
    }

    /// Register a state under its kind.
    ///
    /// Registering the same kind again replaces the previous instance, which
    /// is returned.
    pub fn register(&mut self, state: impl State<C, Kind = K>) -> Option<BoxedState<K, C>> {
        let kind = state.kind();
        self.states.insert(kind, Box::new(state))
    }

    /// Check whether a kind has a registered state.
    pub fn is_registered(&self, kind: K) -> bool {
        self.states.contains_key(&kind)
    }

    /// The current state kind, if any.
    pub fn current(&self) -> Option<K> {
        self.current
    }

    /// Check whether the machine is currently in `kind`.
    pub fn is_currently(&self, kind: K) -> bool {
        self.current == Some(kind)
    }

    /// Switch to `kind`.
    ///
    /// Exits the current state before entering the new one. If the new
    /// state's `enter` requests another transition it is followed here.
    pub fn transition(&mut self, ctx: &mut C, kind: K) -> Result<(), TransitionError<K>> {
        let mut next = kind;
        for _ in 0..MAX_TRANSITION_CHAIN {
            match self.switch(ctx, next)? {
                Transition::Stay => return Ok(()),
                Transition::To(requested) => next = requested,
            }
        }
        Err(TransitionError::ChainTooDeep {
            limit: MAX_TRANSITION_CHAIN,
            last: next,
        })
    }

    /// Run `update` on the current state and follow any requested transition.
    pub fn tick(&mut self, ctx: &mut C) -> Result<(), TransitionError<K>> {
        let Some(current) = self.current else {
            return Ok(());
        };
        let requested = match self.states.get_mut(&current) {
            Some(state) => state.update(ctx),
            None => Transition::Stay,
        };
        match requested {
            Transition::Stay => Ok(()),
            Transition::To(kind) => self.transition(ctx, kind),
        }
    }

    /// Take the transitions recorded since the last drain.
    pub fn drain_transitions(&mut self) -> impl Iterator<Item = TransitionRecord<K>> + '_ {
        self.journal.drain(..)
    }

    fn switch(&mut self, ctx: &mut C, kind: K) -> Result<Transition<K>, TransitionError<K>> {
        let from = self.current.take();
        if let Some(state) = from.and_then(|k| self.states.get_mut(&k)) {
            state.exit(ctx);
        }

        let Some(state) = self.states.get_mut(&kind) else {
            warn!("transition from {from:?} to unregistered state {kind:?}");
            return Err(TransitionError::Unregistered(kind));
        };

        debug!("state transition {from:?} -> {kind:?}");
        self.current = Some(kind);
        self.journal.push(TransitionRecord { from, to: kind });
        Ok(state.enter(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Light {
        Red,
        Green,
        Amber,
        Blink,
    }

    /// Test context that records lifecycle calls in order.
    #[derive(Default)]
    struct Log {
        calls: Vec<String>,
        go: bool,
    }

    type Machine = StateMachine<Light, Log>;

    struct Probe {
        kind: Light,
        on_enter: Transition<Light>,
        on_update: Transition<Light>,
        tag: &'static str,
    }

    impl Probe {
        fn new(kind: Light) -> Self {
            Self {
                kind,
                on_enter: Transition::Stay,
                on_update: Transition::Stay,
                tag: "",
            }
        }
    }

    impl State<Log> for Probe {
        type Kind = Light;

        fn kind(&self) -> Light {
            self.kind
        }

        fn enter(&mut self, ctx: &mut Log) -> Transition<Light> {
            ctx.calls.push(format!("enter {:?}{}", self.kind, self.tag));
            self.on_enter
        }

        fn update(&mut self, ctx: &mut Log) -> Transition<Light> {
            ctx.calls.push(format!("update {:?}", self.kind));
            if ctx.go {
                self.on_update
            } else {
                Transition::Stay
            }
        }

        fn exit(&mut self, ctx: &mut Log) {
            ctx.calls.push(format!("exit {:?}", self.kind));
        }
    }

    #[test]
    fn first_transition_only_enters() {
        let mut fsm = Machine::new().with_state(Probe::new(Light::Red));
        let mut log = Log::default();

        fsm.transition(&mut log, Light::Red).unwrap();

        assert_eq!(log.calls, ["enter Red"]);
        assert!(fsm.is_currently(Light::Red));
    }

    #[test]
    fn exit_runs_before_enter() {
        let mut fsm = Machine::new()
            .with_state(Probe::new(Light::Red))
            .with_state(Probe::new(Light::Green));
        let mut log = Log::default();

        fsm.transition(&mut log, Light::Red).unwrap();
        fsm.transition(&mut log, Light::Green).unwrap();

        assert_eq!(log.calls, ["enter Red", "exit Red", "enter Green"]);
    }

    #[test]
    fn unregistered_transition_leaves_machine_stateless() {
        let mut fsm = Machine::new().with_state(Probe::new(Light::Red));
        let mut log = Log::default();
        fsm.transition(&mut log, Light::Red).unwrap();

        let result = fsm.transition(&mut log, Light::Amber);

        assert_eq!(result, Err(TransitionError::Unregistered(Light::Amber)));
        assert_eq!(fsm.current(), None);
        assert_eq!(log.calls, ["enter Red", "exit Red"]);

        // Ticking a state-less machine is a no-op.
        fsm.tick(&mut log).unwrap();
        assert_eq!(log.calls.len(), 2);

        // The next valid transition recovers.
        fsm.transition(&mut log, Light::Red).unwrap();
        assert!(fsm.is_currently(Light::Red));
    }

    #[test]
    fn re_registering_overwrites() {
        let mut fsm = Machine::new().with_state(Probe::new(Light::Red));
        let replacement = Probe {
            tag: " (second)",
            ..Probe::new(Light::Red)
        };

        let previous = fsm.register(replacement);
        assert!(previous.is_some());

        let mut log = Log::default();
        fsm.transition(&mut log, Light::Red).unwrap();
        assert_eq!(log.calls, ["enter Red (second)"]);
    }

    #[test]
    fn tick_updates_current_and_follows_request() {
        let mut fsm = Machine::new()
            .with_state(Probe {
                on_update: Transition::To(Light::Green),
                ..Probe::new(Light::Red)
            })
            .with_state(Probe::new(Light::Green));
        let mut log = Log::default();
        fsm.transition(&mut log, Light::Red).unwrap();

        fsm.tick(&mut log).unwrap();
        assert!(fsm.is_currently(Light::Red));

        log.go = true;
        fsm.tick(&mut log).unwrap();
        assert!(fsm.is_currently(Light::Green));
        assert_eq!(
            log.calls,
            ["enter Red", "update Red", "update Red", "exit Red", "enter Green"]
        );
    }

    #[test]
    fn pass_through_state_chains_in_one_call() {
        let mut fsm = Machine::new()
            .with_state(Probe::new(Light::Red))
            .with_state(Probe {
                on_enter: Transition::To(Light::Green),
                ..Probe::new(Light::Amber)
            })
            .with_state(Probe::new(Light::Green));
        let mut log = Log::default();
        fsm.transition(&mut log, Light::Red).unwrap();

        fsm.transition(&mut log, Light::Amber).unwrap();

        assert!(fsm.is_currently(Light::Green));
        let journal: Vec<_> = fsm.drain_transitions().collect();
        assert_eq!(
            journal,
            [
                TransitionRecord { from: None, to: Light::Red },
                TransitionRecord { from: Some(Light::Red), to: Light::Amber },
                TransitionRecord { from: Some(Light::Amber), to: Light::Green },
            ]
        );
        assert_eq!(fsm.drain_transitions().count(), 0);
    }

    #[test]
    fn runaway_chain_is_cut_off() {
        let mut fsm = Machine::new()
            .with_state(Probe {
                on_enter: Transition::To(Light::Blink),
                ..Probe::new(Light::Red)
            })
            .with_state(Probe {
                on_enter: Transition::To(Light::Red),
                ..Probe::new(Light::Blink)
            });
        let mut log = Log::default();

        let result = fsm.transition(&mut log, Light::Red);

        assert!(matches!(result, Err(TransitionError::ChainTooDeep { limit: MAX_TRANSITION_CHAIN, .. })));
    }
}
