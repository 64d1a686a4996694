//! Common types for the OLT simulator.
//!
//! This crate provides the protocol-facing vocabulary shared by the engine
//! primitives and the simulator daemon:
//!
//! - [`OperState`], [`AdminState`]: link-level and administrative states
//! - [`PonTechnology`], [`ControlledActivation`]: per-port and device modes
//! - [`SerialNumber`], [`MacAddress`]: ONU and subscriber identities
//! - [`Flow`], [`FlowKey`]: controller-provisioned flows
//! - [`Indication`]: the outbound events streamed to the controller
//! - [`openolt`]: request/response messages of the controller-facing RPCs

mod flow;
mod ident;
mod indication;
pub mod openolt;
mod state;

pub use flow::{Classifier, Flow, FlowKey, FlowType, TrafficScheduler, TrafficSchedulers};
pub use ident::{port_number, MacAddress, SerialNumber};
pub use indication::{
    AlarmIndication, FlowUpdateIndication, FlowUpdateKind, Indication, IntfOperIndication,
    LosIndication, OmciIndication, OnuDiscIndication, OnuIndication, PacketIndication,
    PortStatistics,
};
pub use state::{AdminState, AlarmStatus, ControlledActivation, InterfaceType, OperState, PonTechnology};

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid operational state: {0}")]
    InvalidOperState(String),

    #[error("invalid PON technology: {0}")]
    InvalidTechnology(String),

    #[error("invalid activation mode: {0}")]
    InvalidActivationMode(String),

    #[error("invalid interface type: {0}")]
    InvalidInterfaceType(String),

    #[error("invalid alarm status: {0} (must be on or off)")]
    InvalidAlarmStatus(String),

    #[error("invalid serial number: {0}")]
    InvalidSerialNumber(String),

    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),
}
