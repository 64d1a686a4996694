//! Simulator lifecycle events.
//!
//! When enabled, notable control-plane actions are published on a broadcast
//! bus so that test harnesses can follow what the simulator was asked to do.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tokio::sync::broadcast;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventType {
    OltEnableReceived,
    OltDisableReceived,
    OltReenableReceived,
    OltRebootReceived,
    OnuActivateReceived,
    FlowAddReceived,
    FlowRemoveReceived,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventType::OltEnableReceived => "OLT-enable-received",
            EventType::OltDisableReceived => "OLT-disable-received",
            EventType::OltReenableReceived => "OLT-reenable-received",
            EventType::OltRebootReceived => "OLT-reboot-received",
            EventType::OnuActivateReceived => "ONU-activate-indication-received",
            EventType::FlowAddReceived => "Flow-add-received",
            EventType::FlowRemoveReceived => "Flow-remove-received",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SimEvent {
    pub event_type: EventType,
    pub olt_id: u32,
    pub pon_id: Option<u32>,
    pub onu_id: Option<u32>,
    pub serial_number: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl SimEvent {
    pub fn olt(event_type: EventType, olt_id: u32) -> Self {
        Self {
            event_type,
            olt_id,
            pon_id: None,
            onu_id: None,
            serial_number: None,
            timestamp: Utc::now(),
        }
    }

    pub fn onu(event_type: EventType, olt_id: u32, pon_id: u32, onu_id: u32, serial: impl fmt::Display) -> Self {
        Self {
            pon_id: Some(pon_id),
            onu_id: Some(onu_id),
            serial_number: Some(serial.to_string()),
            ..Self::olt(event_type, olt_id)
        }
    }
}

/// Broadcast bus for [`SimEvent`]s. A disabled bus drops everything.
#[derive(Debug)]
pub struct EventBus {
    tx: Option<broadcast::Sender<SimEvent>>,
}

impl EventBus {
    pub fn new(enabled: bool, capacity: usize) -> Self {
        let tx = enabled.then(|| broadcast::channel(capacity.max(1)).0);
        Self { tx }
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    pub fn publish(&self, event: SimEvent) {
        if let Some(tx) = &self.tx {
            trace!(event = %event.event_type, "publishing event");
            // No subscriber is not an error.
            let _ = tx.send(event);
        }
    }

    pub fn subscribe(&self) -> Option<broadcast::Receiver<SimEvent>> {
        self.tx.as_ref().map(|tx| tx.subscribe())
    }
}
