//! Engine primitives for the OLT simulator.
//!
//! This crate provides the building blocks every simulated device is made of:
//!
//! - [`StateMachine`]: Transition-table finite state machine with action tags
//!   and enter/leave hooks
//! - [`ResourceLedger`]: Alloc-ID and GEM port ownership tracking per
//!   (PON, ONU, port)
//! - [`DeviceChannel`]: Bounded, re-openable inbound queue of a device
//!
//! # Architecture
//!
//! Each simulated device owns a [`DeviceChannel`] that RPC handlers enqueue
//! messages into. A single dispatch task per device drains the channel and
//! commits [`StateMachine`] transitions, so that outbound indications keep
//! the enqueue order:
//!
//! 1. An RPC handler validates the request (against the ledger and states)
//! 2. It enqueues a typed message on the owning device's channel
//! 3. The device's dispatch task fires the matching state machine event
//! 4. The resulting action tag tells the owner which side effect to run
//!
//! # Example
//!
//! ```ignore
//! use oltsim_common::StateMachine;
//!
//! let mut fsm = StateMachine::builder("pon", State::Created)
//!     .transition(&[State::Created, State::Disabled], Event::Enable, State::Enabled)
//!     .transition(&[State::Enabled], Event::Disable, State::Disabled)
//!     .build();
//!
//! let transition = fsm.fire(Event::Enable)?;
//! assert_eq!(transition.to, State::Enabled);
//! ```

mod channel;
mod fsm;
mod ledger;

pub use channel::{
    Backpressure, ChannelConfig, ChannelError, ChannelReceiver, DeviceChannel, SendPermit,
};
pub use fsm::{StateMachine, StateMachineBuilder, StateTransitionError, Transition};
pub use ledger::{LedgerError, ResourceClaim, ResourceKey, ResourceKind, ResourceLedger};
