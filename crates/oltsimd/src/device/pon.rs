use super::onu::{Onu, OnuEvent, OnuState};
use super::{oper_state_machine, OperEvent, OperStateMachine};
use oltsim_common::{ChannelConfig, StateMachine, StateTransitionError, Transition};
use oltsim_types::{port_number, InterfaceType, OperState, PonTechnology, SerialNumber};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PonState {
    Created,
    Enabled,
    Disabled,
}

impl fmt::Display for PonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PonState::Created => write!(f, "created"),
            PonState::Enabled => write!(f, "enabled"),
            PonState::Disabled => write!(f, "disabled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PonEvent {
    Enable,
    Disable,
}

impl fmt::Display for PonEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PonEvent::Enable => write!(f, "enable"),
            PonEvent::Disable => write!(f, "disable"),
        }
    }
}

impl From<OperState> for PonEvent {
    fn from(state: OperState) -> Self {
        match state {
            OperState::Up => PonEvent::Enable,
            OperState::Down => PonEvent::Disable,
        }
    }
}

/// Effect of a PON lifecycle transition on the ONUs it owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PonAction {
    /// First enable: ONUs still in `created` may be discovered.
    Activate,
    /// Enable after an outage: ONUs parked in `pon_disabled` come back.
    Reactivate,
    /// Outage: enabled ONUs are parked in `pon_disabled`.
    Deactivate,
}

pub type PonTransition = Transition<PonState, PonEvent, PonAction>;

fn pon_state_machine(pon_id: u32) -> StateMachine<PonState, PonEvent, PonAction> {
    use PonState::*;

    let mut fsm = StateMachine::builder("pon", Created)
        .transition_with(&[Created], PonEvent::Enable, Enabled, PonAction::Activate)
        .transition_with(&[Disabled], PonEvent::Enable, Enabled, PonAction::Reactivate)
        .transition_with(&[Enabled], PonEvent::Disable, Disabled, PonAction::Deactivate)
        .build();
    fsm.on_transition(move |t| {
        debug!(pon_id, event = %t.event, from = %t.from, to = %t.to, "pon state changed");
    });
    fsm
}

/// Parameters shared by every ONU built on a PON.
#[derive(Debug, Clone)]
pub struct OnuTemplate {
    pub olt_id: u32,
    pub onus: u32,
    pub first_onu_id: u32,
    pub uni_ports: u32,
    pub services: Vec<String>,
    pub channel: ChannelConfig,
}

/// Optical distribution port and the ONUs behind it.
#[derive(Debug)]
pub struct PonPort {
    pub id: u32,
    pub technology: PonTechnology,
    oper_state: Mutex<OperStateMachine>,
    internal_state: Mutex<StateMachine<PonState, PonEvent, PonAction>>,
    onus: Vec<Arc<Onu>>,
}

impl PonPort {
    pub fn new(id: u32, technology: PonTechnology, template: &OnuTemplate) -> Self {
        let onus = (0..template.onus)
            .map(|idx| {
                Arc::new(Onu::new(
                    template.olt_id,
                    id,
                    template.first_onu_id + idx,
                    template.uni_ports,
                    &template.services,
                    template.channel,
                ))
            })
            .collect();

        Self {
            id,
            technology,
            oper_state: Mutex::new(oper_state_machine("pon-oper")),
            internal_state: Mutex::new(pon_state_machine(id)),
            onus,
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

    pub fn internal_state(&self) -> PonState {
        self.internal_state.lock().current()
    }

    pub fn fire(&self, event: PonEvent) -> Result<PonTransition, StateTransitionError> {
        self.internal_state.lock().fire(event)
    }

    /// Puts the port back to link-down and, if it was enabled, disabled.
    /// Used when the chassis re-initializes.
    pub(crate) fn reset(&self) {
        self.oper_state.lock().set_state(OperState::Down);
        let mut fsm = self.internal_state.lock();
        if fsm.is(PonState::Enabled) {
            if let Err(e) = fsm.fire(PonEvent::Disable) {
                warn!(pon_id = self.id, error = %e, "failed to disable pon");
            }
        }
    }

    pub fn port_number(&self) -> u32 {
        port_number(InterfaceType::Pon, self.id)
    }

    pub fn onus(&self) -> &[Arc<Onu>] {
        &self.onus
    }

    pub fn onu_by_id(&self, onu_id: u32) -> Option<&Arc<Onu>> {
        self.onus.iter().find(|onu| onu.id() == onu_id)
    }

    pub fn onu_by_serial(&self, serial: &SerialNumber) -> Option<&Arc<Onu>> {
        self.onus.iter().find(|onu| onu.serial_number() == *serial)
    }

    /// Applies the effect of a lifecycle transition to the owned ONUs.
    pub(crate) async fn apply(
        &self,
        action: PonAction,
        auto_discover: bool,
        discovery_delay: Duration,
        token: &CancellationToken,
    ) {
        match action {
            PonAction::Activate => {
                if auto_discover {
                    self.discover_onus(discovery_delay, token).await;
                } else {
                    info!(pon_id = self.id, "pon enabled, waiting for manual onu discovery");
                }
            }
            PonAction::Reactivate => {
                for onu in &self.onus {
                    onu.fire_if(&[OnuState::PonDisabled], OnuEvent::Enable);
                }
            }
            PonAction::Deactivate => {
                for onu in &self.onus {
                    onu.fire_if(&[OnuState::Enabled], OnuEvent::PonDisable);
                }
            }
        }
    }

    /// Discovers every ONU still in `created`, staggered by `delay`.
    async fn discover_onus(&self, delay: Duration, token: &CancellationToken) {
        let pending = self
            .onus
            .iter()
            .filter(|onu| onu.internal_state() == OnuState::Created);

        for (position, onu) in pending.enumerate() {
            if delay.is_zero() {
                if let Err(e) = onu.discover().await {
                    warn!(pon_id = self.id, serial = %onu.serial_number(), error = %e, "onu discovery failed");
                }
                continue;
            }

            let onu = Arc::clone(onu);
            let token = token.clone();
            let wait = delay.saturating_mul(u32::try_from(position + 1).unwrap_or(u32::MAX));
            tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(wait) => {
                        if let Err(e) = onu.discover().await {
                            warn!(serial = %onu.serial_number(), error = %e, "onu discovery failed");
                        }
                    }
                }
            });
        }
    }
}
