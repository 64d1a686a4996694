//! OLT Device Simulator
//!
//! Simulates an optical line terminal with its NNI and PON ports, the ONUs
//! on each PON and the UNI ports behind them, and exposes the controller
//! surface of a real OLT: a long-lived indication stream plus request/response
//! operations for activation, flows, packets and lifecycle control.
//!
//! Each device with inbound work owns a bounded channel drained by a single
//! dispatch loop per controller session, so indications of one device are
//! always observed in the order they were queued.

pub mod collaborators;
pub mod config;
pub mod device;
mod dispatch;
pub mod error;
pub mod events;
mod flows;
pub mod message;
pub mod service;
mod session;
pub mod stream;
pub mod telemetry;

pub use config::OltSimConfig;
pub use device::{Olt, OltState, OnuState, PonState};
pub use error::{OltError, Result};
pub use events::{EventType, SimEvent};
pub use service::{OltServer, OpenOltService, SimulatorControl};
pub use stream::{IndicationReceiver, IndicationStream};
