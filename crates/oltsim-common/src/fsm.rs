//! Transition-table finite state machine.
//!
//! A [`StateMachine`] is declared once through [`StateMachineBuilder`] as a
//! table mapping `(state, event)` to `(new state, optional action)`. Firing
//! an event that has no entry for the current state is an error and leaves
//! the state untouched, which makes every machine a total function over
//! `(state, event)`.
//!
//! Actions are plain values (usually a small enum) returned in the
//! [`Transition`]. The owner of the machine matches on them and runs the side
//! effect with whatever context it holds, so the machine never needs to own a
//! reference back to its device.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use thiserror::Error;

/// Error returned when an event is fired in a state that does not accept it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{machine}: event {event} inappropriate in current state {state}")]
pub struct StateTransitionError {
    pub machine: &'static str,
    pub event: String,
    pub state: String,
}

/// A committed state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition<S, E, A> {
    pub event: E,
    pub from: S,
    pub to: S,
    /// Side effect attached to this edge of the table, if any.
    pub action: Option<A>,
}

type Hook<S, E, A> = Box<dyn Fn(&Transition<S, E, A>) + Send + Sync>;

enum HookPoint<S> {
    Enter(S),
    Leave(S),
    Any,
}

struct Edge<S, A> {
    to: S,
    action: Option<A>,
}

/// Builder declaring the transition table of a [`StateMachine`].
pub struct StateMachineBuilder<S, E, A> {
    name: &'static str,
    initial: S,
    table: HashMap<(S, E), Edge<S, A>>,
}

impl<S, E, A> StateMachineBuilder<S, E, A>
where
    S: Copy + Eq + Hash + fmt::Display,
    E: Copy + Eq + Hash + fmt::Display,
    A: Clone,
{
    /// Declares `event` moving any of `from` to `to`.
    pub fn transition(mut self, from: &[S], event: E, to: S) -> Self {
        for src in from {
            self.table.insert((*src, event), Edge { to, action: None });
        }
        self
    }

    /// Declares `event` moving any of `from` to `to` and carrying `action`.
    pub fn transition_with(mut self, from: &[S], event: E, to: S, action: A) -> Self {
        for src in from {
            self.table.insert(
                (*src, event),
                Edge {
                    to,
                    action: Some(action.clone()),
                },
            );
        }
        self
    }

    pub fn build(self) -> StateMachine<S, E, A> {
        StateMachine {
            name: self.name,
            current: self.initial,
            table: self.table,
            hooks: Vec::new(),
        }
    }
}

/// Finite state machine driven by a transition table.
///
/// The machine is not internally synchronized. Owners keep it behind a mutex
/// so that transitions on one machine are applied one at a time.
pub struct StateMachine<S, E, A = ()> {
    name: &'static str,
    current: S,
    table: HashMap<(S, E), Edge<S, A>>,
    hooks: Vec<(HookPoint<S>, Hook<S, E, A>)>,
}

impl<S, E, A> StateMachine<S, E, A>
where
    S: Copy + Eq + Hash + fmt::Display,
    E: Copy + Eq + Hash + fmt::Display,
    A: Clone,
{
    /// Starts declaring a machine called `name` that begins in `initial`.
    pub fn builder(name: &'static str, initial: S) -> StateMachineBuilder<S, E, A> {
        StateMachineBuilder {
            name,
            initial,
            table: HashMap::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the state of the last committed transition.
    pub fn current(&self) -> S {
        self.current
    }

    pub fn is(&self, state: S) -> bool {
        self.current == state
    }

    /// Returns true if `event` is accepted in the current state.
    pub fn can(&self, event: E) -> bool {
        self.table.contains_key(&(self.current, event))
    }

    /// Fires `event`, committing the transition and running the hooks.
    ///
    /// Leave hooks of the old state run first, then enter hooks of the new
    /// state, then hooks registered for every transition.
    pub fn fire(&mut self, event: E) -> Result<Transition<S, E, A>, StateTransitionError> {
        let edge = self
            .table
            .get(&(self.current, event))
            .ok_or_else(|| StateTransitionError {
                machine: self.name,
                event: event.to_string(),
                state: self.current.to_string(),
            })?;

        let transition = Transition {
            event,
            from: self.current,
            to: edge.to,
            action: edge.action.clone(),
        };
        self.current = transition.to;

        for (point, hook) in &self.hooks {
            if matches!(point, HookPoint::Leave(s) if *s == transition.from) {
                hook(&transition);
            }
        }
        for (point, hook) in &self.hooks {
            if matches!(point, HookPoint::Enter(s) if *s == transition.to) {
                hook(&transition);
            }
        }
        for (point, hook) in &self.hooks {
            if matches!(point, HookPoint::Any) {
                hook(&transition);
            }
        }

        Ok(transition)
    }

    /// Forces the machine into `state` without consulting the table or
    /// running hooks.
    pub fn set_state(&mut self, state: S) {
        self.current = state;
    }

    /// Registers a hook run when `state` is entered.
    pub fn on_enter<F>(&mut self, state: S, hook: F)
    where
        F: Fn(&Transition<S, E, A>) + Send + Sync + 'static,
    {
        self.hooks.push((HookPoint::Enter(state), Box::new(hook)));
    }

    /// Registers a hook run when `state` is left.
    pub fn on_leave<F>(&mut self, state: S, hook: F)
    where
        F: Fn(&Transition<S, E, A>) + Send + Sync + 'static,
    {
        self.hooks.push((HookPoint::Leave(state), Box::new(hook)));
    }

    /// Registers a hook run after every committed transition.
    pub fn on_transition<F>(&mut self, hook: F)
    where
        F: Fn(&Transition<S, E, A>) + Send + Sync + 'static,
    {
        self.hooks.push((HookPoint::Any, Box::new(hook)));
    }
}

impl<S: fmt::Debug, E, A> fmt::Debug for StateMachine<S, E, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("name", &self.name)
            .field("current", &self.current)
            .field("transitions", &self.table.len())
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Light {
        Off,
        On,
        Broken,
    }

    impl fmt::Display for Light {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", format!("{:?}", self).to_lowercase())
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Switch {
        Flip,
        Unflip,
        Smash,
    }

    impl fmt::Display for Switch {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", format!("{:?}", self).to_lowercase())
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Effect {
        CallElectrician,
    }

    fn light() -> StateMachine<Light, Switch, Effect> {
        StateMachine::builder("light", Light::Off)
            .transition(&[Light::Off], Switch::Flip, Light::On)
            .transition(&[Light::On], Switch::Unflip, Light::Off)
            .transition_with(&[Light::Off, Light::On], Switch::Smash, Light::Broken, Effect::CallElectrician)
            .build()
    }

    #[test]
    fn test_fire_commits_transition() {
        let mut fsm = light();
        assert!(fsm.is(Light::Off));
        assert!(fsm.can(Switch::Flip));

        let t = fsm.fire(Switch::Flip).unwrap();
        assert_eq!(t.from, Light::Off);
        assert_eq!(t.to, Light::On);
        assert_eq!(t.action, None);
        assert_eq!(fsm.current(), Light::On);
    }

    #[test]
    fn test_unlisted_pair_leaves_state_unchanged() {
        let mut fsm = light();
        let err = fsm.fire(Switch::Unflip).unwrap_err();
        assert_eq!(
            err.to_string(),
            "light: event unflip inappropriate in current state off"
        );
        assert_eq!(fsm.current(), Light::Off);

        fsm.fire(Switch::Smash).unwrap();
        for event in [Switch::Flip, Switch::Unflip, Switch::Smash] {
            assert!(fsm.fire(event).is_err());
            assert_eq!(fsm.current(), Light::Broken);
        }
    }

    #[test]
    fn test_action_returned_with_transition() {
        let mut fsm = light();
        fsm.fire(Switch::Flip).unwrap();
        let t = fsm.fire(Switch::Smash).unwrap();
        assert_eq!(t.action, Some(Effect::CallElectrician));
        assert_eq!(t.from, Light::On);
    }

    #[test]
    fn test_hook_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut fsm = light();

        let log = seen.clone();
        fsm.on_transition(move |t| log.lock().unwrap().push(format!("any:{}", t.to)));
        let log = seen.clone();
        fsm.on_enter(Light::On, move |_| log.lock().unwrap().push("enter:on".to_string()));
        let log = seen.clone();
        fsm.on_leave(Light::Off, move |_| log.lock().unwrap().push("leave:off".to_string()));

        fsm.fire(Switch::Flip).unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["leave:off".to_string(), "enter:on".to_string(), "any:on".to_string()]
        );
    }

    #[test]
    fn test_set_state_skips_hooks() {
        let seen = Arc::new(Mutex::new(0));
        let mut fsm = light();
        let count = seen.clone();
        fsm.on_transition(move |_| *count.lock().unwrap() += 1);

        fsm.set_state(Light::On);
        assert!(fsm.is(Light::On));
        assert_eq!(*seen.lock().unwrap(), 0);
    }
}
