//! Simulated device model.
//!
//! The chassis is an [`Olt`] owning its [`NniPort`]s and [`PonPort`]s; every
//! PON owns a fixed set of [`Onu`]s, each exposing one or more [`UniPort`]s.
//! The topology is built once from configuration and never changes shape;
//! only states, flows and resources move.

mod nni;
mod olt;
mod onu;
mod pon;
mod uni;

pub use nni::NniPort;
pub use olt::{Olt, OltAction, OltEvent, OltState};
pub use onu::{Onu, OnuAction, OnuEvent, OnuState};
pub use pon::{OnuTemplate, PonAction, PonEvent, PonPort, PonState};
pub use uni::{Service, UniPort};

use oltsim_common::StateMachine;
use oltsim_types::OperState;
use std::fmt;

/// Events of the link-level [`OperState`] machine shared by OLT, NNI and PON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperEvent {
    Enable,
    Disable,
}

impl fmt::Display for OperEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperEvent::Enable => write!(f, "enable"),
            OperEvent::Disable => write!(f, "disable"),
        }
    }
}

impl From<OperState> for OperEvent {
    fn from(state: OperState) -> Self {
        match state {
            OperState::Up => OperEvent::Enable,
            OperState::Down => OperEvent::Disable,
        }
    }
}

pub type OperStateMachine = StateMachine<OperState, OperEvent>;

/// Builds a down/up machine. It carries no side effects; owners look at
/// whether a transition happened to decide on emitting indications.
pub(crate) fn oper_state_machine(name: &'static str) -> OperStateMachine {
    StateMachine::builder(name, OperState::Down)
        .transition(&[OperState::Down], OperEvent::Enable, OperState::Up)
        .transition(&[OperState::Up], OperEvent::Disable, OperState::Down)
        .build()
}
