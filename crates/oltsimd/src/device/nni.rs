use super::{oper_state_machine, OperEvent, OperStateMachine};
use oltsim_common::{StateTransitionError, Transition};
use oltsim_types::{port_number, InterfaceType, OperState};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Network-facing uplink port.
#[derive(Debug)]
pub struct NniPort {
    pub id: u32,
    /// Speed in Mbps, reported in interface-oper indications.
    pub speed: u32,
    oper_state: Mutex<OperStateMachine>,
    packets_out: AtomicU64,
}

impl NniPort {
    pub fn new(id: u32, speed: u32) -> Self {
        let mut fsm = oper_state_machine("nni-oper");
        fsm.on_transition(move |t| {
            debug!(nni_id = id, from = %t.from, to = %t.to, "nni oper state changed");
        });
        Self {
            id,
            speed,
            oper_state: Mutex::new(fsm),
            packets_out: AtomicU64::new(0),
        }
    }

    pub fn oper_state(&self) -> OperState {
        self.oper_state.lock().current()
    }

    pub fn fire_oper(
        &self,
        event: OperEvent,
    ) -> Result<Transition<OperState, OperEvent, ()>, StateTransitionError> {
        self.oper_state.lock().fire(event)
    }

    pub(crate) fn force_down(&self) {
        self.oper_state.lock().set_state(OperState::Down);
    }

    pub fn port_number(&self) -> u32 {
        port_number(InterfaceType::Nni, self.id)
    }

    pub(crate) fn count_packet_out(&self) -> u64 {
        self.packets_out.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Frames the controller sent out of this port.
    pub fn packets_out(&self) -> u64 {
        self.packets_out.load(Ordering::Relaxed)
    }
}
