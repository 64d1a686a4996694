use super::uni::UniPort;
use crate::error::Result;
use crate::message::Message;
use oltsim_common::{
    ChannelConfig, DeviceChannel, SendPermit, StateMachine, StateTransitionError, Transition,
};
use oltsim_types::{AdminState, FlowKey, OnuIndication, OperState, SerialNumber, TrafficSchedulers};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lifecycle of an ONU.
///
/// `PonDisabled` means the parent PON went down while the ONU was active.
/// Unlike `Disabled` it is left automatically once the PON comes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OnuState {
    Created,
    Enabled,
    Disabled,
    PonDisabled,
}

impl fmt::Display for OnuState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OnuState::Created => write!(f, "created"),
            OnuState::Enabled => write!(f, "enabled"),
            OnuState::Disabled => write!(f, "disabled"),
            OnuState::PonDisabled => write!(f, "pon_disabled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OnuEvent {
    Enable,
    Disable,
    PonDisable,
    /// Re-arms the ONU and announces it on its PON.
    Discover,
}

impl fmt::Display for OnuEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OnuEvent::Enable => write!(f, "enable"),
            OnuEvent::Disable => write!(f, "disable"),
            OnuEvent::PonDisable => write!(f, "pon_disable"),
            OnuEvent::Discover => write!(f, "discover"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnuAction {
    SendDiscovery,
}

pub type OnuTransition = Transition<OnuState, OnuEvent, OnuAction>;

fn onu_state_machine(pon_id: u32, serial: SerialNumber) -> StateMachine<OnuState, OnuEvent, OnuAction> {
    use OnuState::*;

    let mut fsm = StateMachine::builder("onu", Created)
        .transition(&[Created, Disabled, PonDisabled], OnuEvent::Enable, Enabled)
        .transition(&[Created, Enabled, PonDisabled], OnuEvent::Disable, Disabled)
        .transition(&[Enabled], OnuEvent::PonDisable, PonDisabled)
        .transition_with(&[Created, Disabled], OnuEvent::Discover, Created, OnuAction::SendDiscovery)
        .build();
    fsm.on_transition(move |t| {
        debug!(pon_id, serial = %serial, event = %t.event, from = %t.from, to = %t.to, "onu state changed");
    });
    fsm
}

/// A simulated optical network unit.
#[derive(Debug)]
pub struct Onu {
    pon_id: u32,
    id: AtomicU32,
    serial_number: SerialNumber,
    internal_state: Mutex<StateMachine<OnuState, OnuEvent, OnuAction>>,
    channel: DeviceChannel<Message>,
    flows: Mutex<Vec<FlowKey>>,
    uni_ports: Vec<Arc<UniPort>>,
    traffic_schedulers: Mutex<Option<TrafficSchedulers>>,
    omci_requests: AtomicU64,
}

impl Onu {
    pub fn new(
        olt_id: u32,
        pon_id: u32,
        onu_id: u32,
        uni_count: u32,
        service_names: &[String],
        channel_config: ChannelConfig,
    ) -> Self {
        let serial_number = SerialNumber::simulated(olt_id, pon_id, onu_id);
        let uni_ports = (0..uni_count)
            .map(|uni_id| Arc::new(UniPort::new(olt_id, pon_id, onu_id, uni_id, service_names)))
            .collect();

        Self {
            pon_id,
            id: AtomicU32::new(onu_id),
            serial_number,
            internal_state: Mutex::new(onu_state_machine(pon_id, serial_number)),
            channel: DeviceChannel::new(format!("onu-{}", serial_number), channel_config),
            flows: Mutex::new(Vec::new()),
            uni_ports,
            traffic_schedulers: Mutex::new(None),
            omci_requests: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> u32 {
        self.id.load(Ordering::Acquire)
    }

    pub(crate) fn set_id(&self, id: u32) {
        self.id.store(id, Ordering::Release);
    }

    pub fn pon_id(&self) -> u32 {
        self.pon_id
    }

    pub fn serial_number(&self) -> SerialNumber {
        self.serial_number
    }

    pub fn internal_state(&self) -> OnuState {
        self.internal_state.lock().current()
    }

    pub fn fire(&self, event: OnuEvent) -> std::result::Result<OnuTransition, StateTransitionError> {
        self.internal_state.lock().fire(event)
    }

    /// Fires `event` only if the ONU is in one of `states`.
    pub(crate) fn fire_if(&self, states: &[OnuState], event: OnuEvent) -> Option<OnuTransition> {
        let mut fsm = self.internal_state.lock();
        if !states.contains(&fsm.current()) {
            return None;
        }
        match fsm.fire(event) {
            Ok(t) => Some(t),
            Err(e) => {
                warn!(serial = %self.serial_number, error = %e, "onu transition failed");
                None
            }
        }
    }

    pub(crate) fn channel(&self) -> &DeviceChannel<Message> {
        &self.channel
    }

    /// Enqueues a message for this ONU's dispatch loop.
    pub(crate) async fn send(&self, msg: Message) -> Result<()> {
        self.channel.send(msg).await?;
        Ok(())
    }

    /// Reserves a slot on this ONU's channel for a message sent later.
    pub(crate) async fn reserve(&self) -> Result<SendPermit<Message>> {
        Ok(self.channel.reserve().await?)
    }

    pub fn flows(&self) -> Vec<FlowKey> {
        self.flows.lock().clone()
    }

    pub fn has_flow(&self, flow_id: u64) -> bool {
        self.flows.lock().iter().any(|k| k.id == flow_id)
    }

    /// Appends a flow key. Returns true if it is the ONU's first flow.
    pub(crate) fn add_flow(&self, key: FlowKey) -> bool {
        let mut flows = self.flows.lock();
        let first = flows.is_empty();
        flows.push(key);
        first
    }

    /// Removes every occurrence of a flow key. Returns false if it was absent.
    pub(crate) fn remove_flow(&self, key: FlowKey) -> bool {
        let mut flows = self.flows.lock();
        let before = flows.len();
        flows.retain(|k| *k != key);
        flows.len() != before
    }

    pub(crate) fn clear_flows(&self) -> Vec<FlowKey> {
        std::mem::take(&mut *self.flows.lock())
    }

    pub fn uni_ports(&self) -> &[Arc<UniPort>] {
        &self.uni_ports
    }

    pub fn uni(&self, uni_id: u32) -> Option<&Arc<UniPort>> {
        self.uni_ports.iter().find(|u| u.id == uni_id)
    }

    pub fn uni_by_port_no(&self, port_no: u32) -> Option<&Arc<UniPort>> {
        self.uni_ports.iter().find(|u| u.port_no == port_no)
    }

    pub fn traffic_schedulers(&self) -> Option<TrafficSchedulers> {
        self.traffic_schedulers.lock().clone()
    }

    pub(crate) fn set_traffic_schedulers(&self, schedulers: Option<TrafficSchedulers>) {
        *self.traffic_schedulers.lock() = schedulers;
    }

    /// Counts an inbound OMCI request and returns its sequence number.
    pub(crate) fn next_omci_request(&self) -> u64 {
        self.omci_requests.fetch_add(1, Ordering::Relaxed)
    }

    pub fn indication(&self, oper_state: OperState) -> OnuIndication {
        OnuIndication {
            intf_id: self.pon_id,
            onu_id: self.id(),
            oper_state,
            admin_state: AdminState::from(oper_state),
            serial_number: self.serial_number,
        }
    }

    /// Fires `discover` and queues the discovery indication.
    pub(crate) async fn discover(&self) -> Result<()> {
        let transition = self.fire(OnuEvent::Discover)?;
        if transition.action == Some(OnuAction::SendDiscovery) {
            info!(pon_id = self.pon_id, serial = %self.serial_number, "onu discovered");
            self.send(Message::OnuDiscovery).await?;
        }
        Ok(())
    }

    /// Disables the ONU if it is active, then discovers it again after `delay`.
    pub(crate) async fn rediscover(&self, delay: Duration) {
        self.fire_if(&[OnuState::Enabled, OnuState::PonDisabled], OnuEvent::Disable);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Err(e) = self.discover().await {
            warn!(serial = %self.serial_number, error = %e, "onu rediscovery failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn onu() -> Onu {
        Onu::new(0, 0, 1, 1, &["hsia".to_string()], ChannelConfig::default())
    }

    #[test]
    fn test_new_onu() {
        let onu = onu();
        assert_eq!(onu.id(), 1);
        assert_eq!(onu.serial_number().to_string(), "BBSM00000001");
        assert_eq!(onu.internal_state(), OnuState::Created);
        assert_eq!(onu.uni_ports().len(), 1);
        assert_eq!(onu.uni_by_port_no(16).unwrap().id, 0);
    }

    #[test]
    fn test_lifecycle_transitions() {
        let onu = onu();
        onu.fire(OnuEvent::Enable).unwrap();
        onu.fire(OnuEvent::PonDisable).unwrap();
        assert_eq!(onu.internal_state(), OnuState::PonDisabled);

        // Parent PON outage does not allow rediscovery.
        assert!(onu.fire(OnuEvent::Discover).is_err());
        assert_eq!(onu.internal_state(), OnuState::PonDisabled);

        onu.fire(OnuEvent::Enable).unwrap();
        onu.fire(OnuEvent::Disable).unwrap();
        let t = onu.fire(OnuEvent::Discover).unwrap();
        assert_eq!(t.to, OnuState::Created);
        assert_eq!(t.action, Some(OnuAction::SendDiscovery));
    }

    #[test]
    fn test_pon_disable_only_from_enabled() {
        let onu = onu();
        assert!(onu.fire(OnuEvent::PonDisable).is_err());
        assert!(onu.fire_if(&[OnuState::Enabled], OnuEvent::PonDisable).is_none());
    }

    #[test]
    fn test_flow_list() {
        let onu = onu();
        assert!(onu.add_flow(FlowKey { id: 1 }));
        assert!(!onu.add_flow(FlowKey { id: 2 }));
        assert!(onu.has_flow(2));
        assert!(onu.remove_flow(FlowKey { id: 1 }));
        assert!(!onu.remove_flow(FlowKey { id: 1 }));
        assert_eq!(onu.clear_flows(), vec![FlowKey { id: 2 }]);
        assert!(onu.flows().is_empty());
    }

    #[tokio::test]
    async fn test_discover_queues_message() {
        let onu = onu();
        onu.discover().await.unwrap();

        let mut rx = onu.channel().take_receiver().unwrap();
        assert!(matches!(rx.recv().await, Some(Message::OnuDiscovery)));
    }

    #[tokio::test]
    async fn test_rediscover_disables_first() {
        let onu = onu();
        onu.fire(OnuEvent::Enable).unwrap();
        onu.rediscover(Duration::ZERO).await;
        assert_eq!(onu.internal_state(), OnuState::Created);

        let mut rx = onu.channel().take_receiver().unwrap();
        assert!(matches!(rx.recv().await, Some(Message::OnuDiscovery)));
    }
}
