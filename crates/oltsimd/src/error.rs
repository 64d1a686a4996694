//! Error types for oltsimd

use oltsim_common::{ChannelError, LedgerError, StateTransitionError};
use thiserror::Error;
use tonic::Status;

/// OLT simulator errors
#[derive(Error, Debug)]
pub enum OltError {
    /// Unknown PON, NNI, ONU or flow reference
    #[error("Not found: {0}")]
    NotFound(String),

    /// Alloc-ID or GEM port already owned by another ONU on the PON
    #[error("Resource conflict: {0}")]
    ResourceConflict(#[from] LedgerError),

    /// Identifier already taken by another device
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Operation attempted in an incompatible lifecycle state
    #[error("Device not ready: {0}")]
    DeviceNotReady(String),

    /// Inbound management payload or frame failed to parse
    #[error("Malformed protocol payload: {0}")]
    MalformedProtocolPayload(String),

    /// Illegal state machine edge
    #[error("State transition error: {0}")]
    StateTransition(#[from] StateTransitionError),

    /// Device channel closed or full
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for oltsimd operations
pub type Result<T> = std::result::Result<T, OltError>;

impl From<OltError> for Status {
    fn from(err: OltError) -> Self {
        match err {
            OltError::NotFound(msg) => Status::not_found(msg),
            OltError::ResourceConflict(e) => Status::invalid_argument(e.to_string()),
            OltError::MalformedProtocolPayload(msg) => Status::invalid_argument(msg),
            OltError::AlreadyExists(msg) => Status::already_exists(msg),
            OltError::DeviceNotReady(msg) => Status::unavailable(msg),
            OltError::Channel(e) => Status::unavailable(e.to_string()),
            other => Status::internal(other.to_string()),
        }
    }
}
