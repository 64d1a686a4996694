use super::nni::NniPort;
use super::onu::{Onu, OnuEvent, OnuState};
use super::pon::{OnuTemplate, PonPort, PonState};
use super::uni::UniPort;
use super::{oper_state_machine, OperEvent, OperStateMachine};
use crate::collaborators::{BaselineOmciCodec, EthernetClassifier, OmciCodec, PacketClassifier};
use crate::config::OltSimConfig;
use crate::error::{OltError, Result};
use crate::events::{EventBus, EventType, SimEvent};
use crate::message::Message;
use crate::session::Session;
use crate::stream::IndicationStream;
use crate::telemetry;
use chrono::Utc;
use dashmap::DashMap;
use oltsim_common::{DeviceChannel, ResourceLedger, StateMachine, StateTransitionError, Transition};
use oltsim_types::openolt::{
    AlarmRequest, DeviceInfo, DeviceResourceRange, Heartbeat, InterfaceRequest, OmciMessage,
    OnuPacket, OnuRequest, PoolSharing, PoolType, ResourcePool, UplinkPacket,
};
use oltsim_types::{
    port_number, AlarmIndication, ControlledActivation, Flow, InterfaceType, LosIndication,
    MacAddress, OperState, PortStatistics, SerialNumber, TrafficSchedulers,
};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Lifecycle of the chassis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OltState {
    Created,
    Initialized,
    Enabled,
    Disabled,
    /// Rebooting. Sessions are refused until the chassis is initialized again.
    Deleted,
}

impl fmt::Display for OltState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OltState::Created => write!(f, "created"),
            OltState::Initialized => write!(f, "initialized"),
            OltState::Enabled => write!(f, "enabled"),
            OltState::Disabled => write!(f, "disabled"),
            OltState::Deleted => write!(f, "deleted"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OltEvent {
    Initialize,
    Enable,
    Disable,
    Delete,
}

impl fmt::Display for OltEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OltEvent::Initialize => write!(f, "initialize"),
            OltEvent::Enable => write!(f, "enable"),
            OltEvent::Disable => write!(f, "disable"),
            OltEvent::Delete => write!(f, "delete"),
        }
    }
}

impl From<OperState> for OltEvent {
    fn from(state: OperState) -> Self {
        match state {
            OperState::Up => OltEvent::Enable,
            OperState::Down => OltEvent::Disable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OltAction {
    /// Reopen channels and put every port back to down.
    InitializeDevice,
    /// Drop every flow and resource claim.
    ClearResources,
}

pub type OltTransition = Transition<OltState, OltEvent, OltAction>;

fn olt_state_machine(olt_id: u32) -> StateMachine<OltState, OltEvent, OltAction> {
    use OltState::*;

    let mut fsm = StateMachine::builder("olt", Created)
        .transition_with(
            &[Created, Deleted],
            OltEvent::Initialize,
            Initialized,
            OltAction::InitializeDevice,
        )
        .transition(&[Initialized, Disabled], OltEvent::Enable, Enabled)
        .transition(&[Enabled], OltEvent::Disable, Disabled)
        .transition_with(&[Disabled, Enabled], OltEvent::Delete, Deleted, OltAction::ClearResources)
        .build();
    fsm.on_transition(move |t| {
        debug!(olt_id, event = %t.event, from = %t.from, to = %t.to, "olt state changed");
    });
    fsm
}

fn epoch_signature() -> u32 {
    u32::try_from(Utc::now().timestamp()).unwrap_or(u32::MAX)
}

/// The simulated chassis.
///
/// Built once from configuration and shared as `Arc<Olt>` between the RPC
/// service, the dispatch loops and the telemetry task. Topology (NNIs, PONs,
/// ONUs, UNIs) never changes after construction.
#[derive(Debug)]
pub struct Olt {
    pub(crate) id: u32,
    pub(crate) serial_number: String,
    pub(crate) config: OltSimConfig,
    pub(crate) mode: ControlledActivation,
    pub(crate) nnis: Vec<Arc<NniPort>>,
    pub(crate) pons: Vec<Arc<PonPort>>,
    internal_state: Mutex<StateMachine<OltState, OltEvent, OltAction>>,
    oper_state: Mutex<OperStateMachine>,
    pub(crate) channel: DeviceChannel<Message>,
    pub(crate) resources: ResourceLedger,
    pub(crate) flows: DashMap<u64, Flow>,
    pub(crate) stream: RwLock<Option<IndicationStream>>,
    pub(crate) session: tokio::sync::Mutex<Option<Session>>,
    pub(crate) had_session: AtomicBool,
    previously_connected: AtomicBool,
    signature: AtomicU32,
    pub(crate) events: EventBus,
    pub(crate) codec: Arc<dyn OmciCodec>,
    pub(crate) classifier: Arc<dyn PacketClassifier>,
    pub(crate) stats: Vec<PortStatistics>,
}

impl Olt {
    /// Builds a chassis with the default OMCI codec and packet classifier.
    pub fn new(config: OltSimConfig) -> Result<Arc<Self>> {
        Self::with_collaborators(config, Arc::new(BaselineOmciCodec), Arc::new(EthernetClassifier))
    }

    pub fn with_collaborators(
        config: OltSimConfig,
        codec: Arc<dyn OmciCodec>,
        classifier: Arc<dyn PacketClassifier>,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let id = config.olt.id;
        let channel_config = config.channel_config();
        let services = config.service_names();

        let nnis: Vec<_> = (0..config.olt.nni_ports)
            .map(|nni_id| Arc::new(NniPort::new(nni_id, config.olt.nni_speed)))
            .collect();

        let mut pons = Vec::with_capacity(config.olt.pon_ports as usize);
        for pon_id in 0..config.olt.pon_ports {
            let range = config.pon_range(pon_id).ok_or_else(|| {
                OltError::Configuration(format!("pon {} is not covered by any range", pon_id))
            })?;
            let template = OnuTemplate {
                olt_id: id,
                onus: config.olt.onus_per_pon,
                first_onu_id: range.onu_id_start,
                uni_ports: config.olt.uni_ports,
                services: services.clone(),
                channel: channel_config,
            };
            pons.push(Arc::new(PonPort::new(pon_id, range.technology, &template)));
        }

        let stats = match &config.telemetry.stats_file {
            Some(path) => telemetry::load_port_stats(path)?,
            None => telemetry::synthetic_port_stats(config.olt.nni_ports, config.olt.pon_ports),
        };

        let olt = Self {
            id,
            serial_number: format!("BBSIM_OLT_{}", id),
            mode: config.activation_mode(),
            nnis,
            pons,
            internal_state: Mutex::new(olt_state_machine(id)),
            oper_state: Mutex::new(oper_state_machine("olt-oper")),
            channel: DeviceChannel::new(format!("olt-{}", id), channel_config),
            resources: ResourceLedger::new(),
            flows: DashMap::new(),
            stream: RwLock::new(None),
            session: tokio::sync::Mutex::new(None),
            had_session: AtomicBool::new(false),
            previously_connected: AtomicBool::new(false),
            signature: AtomicU32::new(epoch_signature()),
            events: EventBus::new(config.simulator.publish_events, config.simulator.event_buffer),
            codec,
            classifier,
            stats,
            config,
        };
        olt.fire(OltEvent::Initialize)?;

        info!(
            olt_id = id,
            nni_ports = olt.nnis.len(),
            pon_ports = olt.pons.len(),
            onus_per_pon = olt.config.olt.onus_per_pon,
            mode = %olt.mode,
            "olt created"
        );
        Ok(Arc::new(olt))
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    pub fn config(&self) -> &OltSimConfig {
        &self.config
    }

    pub fn activation_mode(&self) -> ControlledActivation {
        self.mode
    }

    pub fn is_perf(&self) -> bool {
        self.config.simulator.enable_perf
    }

    pub fn internal_state(&self) -> OltState {
        self.internal_state.lock().current()
    }

    pub fn oper_state(&self) -> OperState {
        self.oper_state.lock().current()
    }

    /// Fires a lifecycle event and runs the attached action.
    pub fn fire(&self, event: OltEvent) -> std::result::Result<OltTransition, StateTransitionError> {
        let transition = self.internal_state.lock().fire(event)?;
        if let Some(action) = transition.action {
            self.apply(action);
        }
        Ok(transition)
    }

    pub fn fire_oper(
        &self,
        event: OperEvent,
    ) -> std::result::Result<Transition<OperState, OperEvent, ()>, StateTransitionError> {
        self.oper_state.lock().fire(event)
    }

    fn apply(&self, action: OltAction) {
        match action {
            OltAction::InitializeDevice => {
                self.channel.reopen();
                self.oper_state.lock().set_state(OperState::Down);
                for nni in &self.nnis {
                    nni.force_down();
                }
                for pon in &self.pons {
                    pon.reset();
                    for onu in pon.onus() {
                        onu.channel().reopen();
                    }
                }
                info!(olt_id = self.id, "olt initialized");
            }
            OltAction::ClearResources => {
                self.resources.clear();
                self.flows.clear();
                for onu in self.onus() {
                    onu.clear_flows();
                }
                info!(olt_id = self.id, "olt resources cleared");
            }
        }
    }

    pub fn signature(&self) -> u32 {
        self.signature.load(Ordering::Acquire)
    }

    /// Moves the signature to a new reboot epoch, always different from the
    /// current one.
    pub(crate) fn regenerate_signature(&self) -> u32 {
        let now = epoch_signature();
        let next = |old: u32| now.max(old.wrapping_add(1));
        let previous = self
            .signature
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |old| Some(next(old)))
            .unwrap_or_else(|old| old);
        next(previous)
    }

    pub fn previously_connected(&self) -> bool {
        self.previously_connected.load(Ordering::Acquire)
    }

    pub(crate) fn clear_previously_connected(&self) {
        self.previously_connected.store(false, Ordering::Release);
    }

    pub fn resources(&self) -> &ResourceLedger {
        &self.resources
    }

    pub fn flow(&self, flow_id: u64) -> Option<Flow> {
        self.flows.get(&flow_id).map(|entry| entry.value().clone())
    }

    pub fn flow_count(&self) -> usize {
        self.flows.len()
    }

    /// Subscribes to simulator events. Returns `None` when publishing is off.
    pub fn subscribe_events(&self) -> Option<broadcast::Receiver<SimEvent>> {
        self.events.subscribe()
    }

    pub fn nnis(&self) -> &[Arc<NniPort>] {
        &self.nnis
    }

    pub fn pons(&self) -> &[Arc<PonPort>] {
        &self.pons
    }

    pub fn onus(&self) -> impl Iterator<Item = &Arc<Onu>> {
        self.pons.iter().flat_map(|pon| pon.onus().iter())
    }

    pub fn nni(&self, nni_id: u32) -> Result<&Arc<NniPort>> {
        self.nnis
            .iter()
            .find(|nni| nni.id == nni_id)
            .ok_or_else(|| OltError::NotFound(format!("nni-{}", nni_id)))
    }

    pub fn pon(&self, pon_id: u32) -> Result<&Arc<PonPort>> {
        self.pons
            .iter()
            .find(|pon| pon.id == pon_id)
            .ok_or_else(|| OltError::NotFound(format!("pon-{}", pon_id)))
    }

    pub fn find_onu(&self, pon_id: u32, onu_id: u32) -> Result<Arc<Onu>> {
        self.pon(pon_id)?
            .onu_by_id(onu_id)
            .cloned()
            .ok_or_else(|| OltError::NotFound(format!("onu-{}-on-pon-{}", onu_id, pon_id)))
    }

    pub fn find_onu_by_serial(&self, serial: &SerialNumber) -> Result<Arc<Onu>> {
        self.onus()
            .find(|onu| onu.serial_number() == *serial)
            .cloned()
            .ok_or_else(|| OltError::NotFound(format!("onu-{}", serial)))
    }

    pub fn find_onu_by_flow_id(&self, flow_id: u64) -> Result<Arc<Onu>> {
        self.onus()
            .find(|onu| onu.has_flow(flow_id))
            .cloned()
            .ok_or_else(|| OltError::NotFound(format!("onu-for-flow-{}", flow_id)))
    }

    /// Finds the UNI serving the subscriber service with `mac`.
    pub fn find_service_by_mac(&self, mac: &MacAddress) -> Result<(Arc<Onu>, Arc<UniPort>)> {
        for onu in self.onus() {
            for uni in onu.uni_ports() {
                if uni.service_by_mac(mac).is_some() {
                    return Ok((Arc::clone(onu), Arc::clone(uni)));
                }
            }
        }
        Err(OltError::NotFound(format!("service-{}", mac)))
    }

    /// Enqueues a message for the OLT dispatch loop.
    pub(crate) async fn send(&self, msg: Message) -> Result<()> {
        self.channel.send(msg).await?;
        Ok(())
    }

    /// Moves an ONU to `disabled`, queueing an ONU-down indication if
    /// `announce` is set and the ONU was not disabled already.
    pub(crate) async fn disable_onu(&self, onu: &Onu, announce: bool) -> Result<()> {
        let transition = onu.fire_if(
            &[OnuState::Created, OnuState::Enabled, OnuState::PonDisabled],
            OnuEvent::Disable,
        );
        if transition.is_some() && announce {
            onu.send(Message::OnuIndication {
                oper_state: OperState::Down,
            })
            .await?;
        }
        Ok(())
    }

    pub fn get_device_info(&self) -> DeviceInfo {
        let ranges = self
            .config
            .effective_pon_ranges()
            .into_iter()
            .map(|range| DeviceResourceRange {
                intf_ids: (range.pon_start..=range.pon_end).collect(),
                technology: range.technology,
                pools: vec![
                    ResourcePool {
                        pool_type: PoolType::OnuId,
                        sharing: PoolSharing::DedicatedPerIntf,
                        start: range.onu_id_start,
                        end: range.onu_id_end,
                    },
                    ResourcePool {
                        pool_type: PoolType::AllocId,
                        sharing: PoolSharing::DedicatedPerIntf,
                        start: range.alloc_id_start,
                        end: range.alloc_id_end,
                    },
                    ResourcePool {
                        pool_type: PoolType::GemportId,
                        sharing: PoolSharing::DedicatedPerIntf,
                        start: range.gemport_id_start,
                        end: range.gemport_id_end,
                    },
                ],
            })
            .collect();

        // Reported as it was before this call, then set.
        let previously_connected = self.previously_connected.swap(true, Ordering::AcqRel);

        let olt = &self.config.olt;
        info!(olt_id = self.id, previously_connected, "received get device info");
        DeviceInfo {
            vendor: olt.vendor.clone(),
            model: olt.model.clone(),
            hardware_version: olt.hardware_version.clone(),
            firmware_version: olt.firmware_version.clone(),
            pon_ports: olt.pon_ports,
            nni_ports: olt.nni_ports,
            device_serial_number: self.serial_number.clone(),
            device_id: olt.device_id.clone(),
            previously_connected,
            ranges,
        }
    }

    pub fn heartbeat(&self) -> Heartbeat {
        let heartbeat_signature = self.signature();
        debug!(olt_id = self.id, signature = heartbeat_signature, "heartbeat check");
        Heartbeat { heartbeat_signature }
    }

    pub async fn activate_onu(&self, req: &OnuRequest) -> Result<()> {
        let pon = self.pon(req.intf_id)?;
        let onu = pon
            .onu_by_serial(&req.serial_number)
            .cloned()
            .ok_or_else(|| OltError::NotFound(format!("onu-{}", req.serial_number)))?;

        info!(
            pon_id = req.intf_id,
            onu_id = req.onu_id,
            serial = %req.serial_number,
            "received activate onu"
        );

        if let Some(owner) = pon.onu_by_id(req.onu_id) {
            if !Arc::ptr_eq(owner, &onu) {
                error!(
                    pon_id = req.intf_id,
                    onu_id = req.onu_id,
                    serial = %req.serial_number,
                    owner = %owner.serial_number(),
                    "onu id already in use"
                );
                return Err(OltError::AlreadyExists(format!(
                    "onu-id-{}-on-pon-{}-belongs-to-{}",
                    req.onu_id,
                    req.intf_id,
                    owner.serial_number()
                )));
            }
        }
        self.events.publish(SimEvent::onu(
            EventType::OnuActivateReceived,
            self.id,
            req.intf_id,
            req.onu_id,
            req.serial_number,
        ));

        self.resources.register_onu(req.intf_id, req.onu_id);
        onu.set_id(req.onu_id);

        match onu.fire(OnuEvent::Enable) {
            Ok(_) => {
                onu.send(Message::OnuIndication {
                    oper_state: OperState::Up,
                })
                .await?
            }
            Err(e) => error!(serial = %req.serial_number, error = %e, "failed to enable onu"),
        }
        Ok(())
    }

    pub async fn deactivate_onu(&self, req: &OnuRequest) -> Result<()> {
        let onu = self.find_onu(req.intf_id, req.onu_id)?;
        info!(pon_id = req.intf_id, onu_id = req.onu_id, "received deactivate onu");
        self.disable_onu(&onu, true).await
    }

    /// Disables the ONU and, while both the chassis and its PON are
    /// enabled, schedules its re-discovery.
    pub async fn delete_onu(&self, req: &OnuRequest) -> Result<()> {
        let pon = self.pon(req.intf_id)?;
        let onu = pon.onu_by_id(req.onu_id).cloned().ok_or_else(|| {
            OltError::NotFound(format!("onu-{}-on-pon-{}", req.onu_id, req.intf_id))
        })?;
        info!(pon_id = req.intf_id, onu_id = req.onu_id, serial = %onu.serial_number(), "received delete onu");

        self.disable_onu(&onu, true).await?;

        if self.internal_state() == OltState::Enabled && pon.internal_state() == PonState::Enabled {
            let delay = self.config.onu_discovery_delay();
            tokio::spawn(async move { onu.rediscover(delay).await });
        }
        Ok(())
    }

    async fn set_pon_oper(&self, req: &InterfaceRequest, oper_state: OperState) -> Result<()> {
        let pon = self.pon(req.intf_id)?;
        self.send(Message::PonIndication {
            pon_id: pon.id,
            oper_state,
        })
        .await?;
        for onu in pon.onus() {
            onu.send(Message::OnuIndication { oper_state }).await?;
        }
        Ok(())
    }

    pub async fn enable_pon_if(&self, req: &InterfaceRequest) -> Result<()> {
        info!(pon_id = req.intf_id, "received enable pon");
        self.set_pon_oper(req, OperState::Up).await
    }

    pub async fn disable_pon_if(&self, req: &InterfaceRequest) -> Result<()> {
        info!(pon_id = req.intf_id, "received disable pon");
        self.set_pon_oper(req, OperState::Down).await
    }

    /// Brings every enabled PON and then the chassis down. NNIs stay up.
    pub async fn disable_olt(&self) -> Result<()> {
        info!(olt_id = self.id, "received disable olt");
        self.events.publish(SimEvent::olt(EventType::OltDisableReceived, self.id));

        for pon in &self.pons {
            if pon.internal_state() == PonState::Enabled {
                self.send(Message::PonIndication {
                    pon_id: pon.id,
                    oper_state: OperState::Down,
                })
                .await?;
            }
        }
        self.send(Message::OltIndication {
            oper_state: OperState::Down,
        })
        .await
    }

    pub async fn reenable_olt(&self) -> Result<()> {
        info!(olt_id = self.id, "received reenable olt");
        self.events.publish(SimEvent::olt(EventType::OltReenableReceived, self.id));

        self.send(Message::OltIndication {
            oper_state: OperState::Up,
        })
        .await?;
        for pon in &self.pons {
            if pon.internal_state() == PonState::Disabled {
                self.send(Message::PonIndication {
                    pon_id: pon.id,
                    oper_state: OperState::Up,
                })
                .await?;
            }
        }
        Ok(())
    }

    pub async fn set_alarm(&self, req: &AlarmRequest) -> Result<()> {
        match req.intf_type {
            InterfaceType::Nni => self.nni(req.intf_id).map(|_| ())?,
            InterfaceType::Pon => self.pon(req.intf_id).map(|_| ())?,
        }
        info!(intf_type = %req.intf_type, intf_id = req.intf_id, status = %req.status, "raising los alarm");
        self.send(Message::Alarm(AlarmIndication::Los(LosIndication {
            intf_id: port_number(req.intf_type, req.intf_id),
            status: req.status,
        })))
        .await
    }

    pub async fn omci_msg_out(&self, msg: &OmciMessage) -> Result<()> {
        let onu = self.find_onu(msg.intf_id, msg.onu_id)?;
        let frame = self.codec.decode(&msg.pkt).map_err(|e| {
            OltError::MalformedProtocolPayload(format!("omci for onu {}: {}", onu.serial_number(), e))
        })?;

        if onu.internal_state() == OnuState::Disabled {
            warn!(
                serial = %onu.serial_number(),
                transaction_id = frame.transaction_id,
                "dropping omci request for disabled onu"
            );
            return Ok(());
        }
        onu.send(Message::Omci(frame)).await
    }

    pub async fn onu_packet_out(&self, packet: OnuPacket) -> Result<()> {
        let onu = self.find_onu(packet.intf_id, packet.onu_id)?;
        let classified = match self.classifier.classify(&packet.pkt) {
            Ok(classified) => classified,
            Err(e) => {
                warn!(serial = %onu.serial_number(), port_no = packet.port_no, error = %e, "dropping onu packet out");
                return Ok(());
            }
        };
        onu.send(Message::OnuPacketOut {
            port_no: packet.port_no,
            packet: classified,
            pkt: packet.pkt,
        })
        .await
    }

    pub async fn uplink_packet_out(&self, packet: UplinkPacket) -> Result<()> {
        let nni = self.nni(packet.intf_id)?;
        let classified = self
            .classifier
            .classify(&packet.pkt)
            .map_err(|e| OltError::MalformedProtocolPayload(format!("uplink packet: {}", e)))?;
        let (onu, uni) = self.find_service_by_mac(&classified.dst_mac)?;

        let count = nni.count_packet_out();
        debug!(nni_id = nni.id, count, serial = %onu.serial_number(), uni_id = uni.id, "uplink packet out");
        onu.send(Message::DownstreamPacket {
            uni_id: uni.id,
            packet: classified,
            pkt: packet.pkt,
        })
        .await
    }

    pub fn create_traffic_schedulers(&self, schedulers: TrafficSchedulers) -> Result<()> {
        if self.is_perf() {
            return Ok(());
        }
        let onu = self.find_onu(schedulers.intf_id, schedulers.onu_id)?;
        debug!(serial = %onu.serial_number(), count = schedulers.traffic_scheds.len(), "storing traffic schedulers");
        onu.set_traffic_schedulers(Some(schedulers));
        Ok(())
    }

    pub fn remove_traffic_schedulers(&self, schedulers: &TrafficSchedulers) -> Result<()> {
        if self.is_perf() {
            return Ok(());
        }
        let onu = self.find_onu(schedulers.intf_id, schedulers.onu_id)?;
        onu.set_traffic_schedulers(None);
        Ok(())
    }

    /// Manually discovers an ONU, for activation modes without automatic
    /// discovery.
    pub async fn power_on_onu(&self, pon_id: u32, onu_id: u32) -> Result<()> {
        let onu = self.find_onu(pon_id, onu_id)?;
        info!(pon_id, onu_id, serial = %onu.serial_number(), "powering on onu");
        onu.discover().await.map_err(|e| match e {
            OltError::StateTransition(e) => OltError::DeviceNotReady(e.to_string()),
            other => other,
        })
    }

    /// Drops the resource claims and flows of one PON.
    pub fn reset_pon(&self, pon_id: u32) -> Result<()> {
        let pon = self.pon(pon_id)?;
        if pon.internal_state() == PonState::Enabled {
            return Err(OltError::DeviceNotReady(format!("pon-{}-is-enabled", pon_id)));
        }

        self.resources.clear_pon(pon_id);
        for onu in pon.onus() {
            for key in onu.clear_flows() {
                self.flows.remove(&key.id);
            }
        }
        info!(pon_id, "pon resources reset");
        Ok(())
    }

    /// Makes a subscriber behind a UNI send a frame upstream.
    pub async fn inject_subscriber_packet(&self, pon_id: u32, onu_id: u32, uni_id: u32, pkt: Vec<u8>) -> Result<()> {
        let onu = self.find_onu(pon_id, onu_id)?;
        if onu.uni(uni_id).is_none() {
            return Err(OltError::NotFound(format!("uni-{}-on-onu-{}", uni_id, onu.serial_number())));
        }
        onu.send(Message::UniPacketIn { uni_id, pkt }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::tests::omci_request;
    use crate::config::PonRange;
    use oltsim_common::ResourceKind;
    use oltsim_types::AlarmStatus;
    use pretty_assertions::assert_eq;

    fn config(pon_ports: u32, onus_per_pon: u32) -> OltSimConfig {
        let mut config = OltSimConfig::default();
        config.olt.pon_ports = pon_ports;
        config.olt.onus_per_pon = onus_per_pon;
        config.telemetry.enabled = false;
        config
    }

    fn onu_request(olt: &Olt, pon_id: u32, onu_id: u32) -> OnuRequest {
        OnuRequest {
            intf_id: pon_id,
            onu_id,
            serial_number: olt.find_onu(pon_id, onu_id).unwrap().serial_number(),
        }
    }

    #[test]
    fn test_new_olt_is_initialized() {
        let olt = Olt::new(config(2, 2)).unwrap();
        assert_eq!(olt.internal_state(), OltState::Initialized);
        assert_eq!(olt.oper_state(), OperState::Down);
        assert_eq!(olt.pons().len(), 2);
        assert_eq!(olt.onus().count(), 4);
        assert_eq!(olt.serial_number(), "BBSIM_OLT_0");
        assert!(olt.find_onu(1, 2).is_ok());
        assert!(matches!(olt.find_onu(2, 1), Err(OltError::NotFound(_))));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = config(1, 1);
        config.olt.nni_ports = 0;
        assert!(matches!(Olt::new(config), Err(OltError::Configuration(_))));
    }

    #[test]
    fn test_lifecycle_table() {
        let olt = Olt::new(config(1, 1)).unwrap();
        assert!(olt.fire(OltEvent::Delete).is_err());
        assert_eq!(olt.internal_state(), OltState::Initialized);

        olt.fire(OltEvent::Enable).unwrap();
        olt.fire(OltEvent::Disable).unwrap();
        let t = olt.fire(OltEvent::Delete).unwrap();
        assert_eq!(t.action, Some(OltAction::ClearResources));
        let t = olt.fire(OltEvent::Initialize).unwrap();
        assert_eq!(t.action, Some(OltAction::InitializeDevice));
    }

    #[test]
    fn test_signature_always_moves() {
        let olt = Olt::new(config(1, 1)).unwrap();
        let before = olt.signature();
        let after = olt.regenerate_signature();
        assert_ne!(before, after);
        assert_eq!(olt.heartbeat().heartbeat_signature, after);
    }

    #[test]
    fn test_device_info_sets_previously_connected() {
        let olt = Olt::new(config(2, 1)).unwrap();
        let info = olt.get_device_info();
        assert!(!info.previously_connected);
        assert_eq!(info.pon_ports, 2);
        assert_eq!(info.ranges[0].intf_ids, vec![0, 1]);
        assert_eq!(info.ranges[0].pools.len(), 3);
        assert!(olt.get_device_info().previously_connected);
    }

    #[tokio::test]
    async fn test_activate_onu_enables_and_announces() {
        let olt = Olt::new(config(1, 1)).unwrap();
        let req = onu_request(&olt, 0, 1);
        olt.activate_onu(&req).await.unwrap();

        let onu = olt.find_onu(0, 1).unwrap();
        assert_eq!(onu.internal_state(), OnuState::Enabled);
        assert!(olt.resources().is_registered(0, 1));

        let mut rx = onu.channel().take_receiver().unwrap();
        assert!(matches!(
            rx.recv().await,
            Some(Message::OnuIndication {
                oper_state: OperState::Up
            })
        ));
    }

    #[tokio::test]
    async fn test_activate_with_taken_onu_id() {
        let olt = Olt::new(config(1, 2)).unwrap();
        let first = olt.find_onu(0, 1).unwrap();
        let second = olt.find_onu(0, 2).unwrap();

        let req = OnuRequest {
            intf_id: 0,
            onu_id: 1,
            serial_number: second.serial_number(),
        };
        assert!(matches!(olt.activate_onu(&req).await, Err(OltError::AlreadyExists(_))));
        assert_eq!(second.id(), 2);
        assert_ne!(second.internal_state(), OnuState::Enabled);
        assert!(Arc::ptr_eq(&olt.find_onu(0, 1).unwrap(), &first));

        // Re-activating an ONU under its own id is fine.
        olt.activate_onu(&onu_request(&olt, 0, 2)).await.unwrap();
        assert_eq!(second.internal_state(), OnuState::Enabled);
    }

    #[test]
    fn test_onu_ids_must_fit_serial_numbers() {
        let mut config = config(1, 257);
        config.pon_ranges = vec![PonRange {
            onu_id_end: 300,
            ..config.effective_pon_ranges()[0].clone()
        }];
        assert!(matches!(Olt::new(config), Err(OltError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_activate_unknown_serial() {
        let olt = Olt::new(config(1, 1)).unwrap();
        let req = OnuRequest {
            intf_id: 0,
            onu_id: 1,
            serial_number: SerialNumber::simulated(0, 3, 9),
        };
        assert!(matches!(olt.activate_onu(&req).await, Err(OltError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_deactivate_twice_announces_once() {
        let olt = Olt::new(config(1, 1)).unwrap();
        let req = onu_request(&olt, 0, 1);
        olt.activate_onu(&req).await.unwrap();
        olt.deactivate_onu(&req).await.unwrap();
        olt.deactivate_onu(&req).await.unwrap();

        let onu = olt.find_onu(0, 1).unwrap();
        let mut rx = onu.channel().take_receiver().unwrap();
        onu.channel().close();
        let mut kinds = Vec::new();
        while let Some(msg) = rx.recv().await {
            kinds.push(msg.kind());
        }
        assert_eq!(kinds, vec!["onu_indication", "onu_indication"]);
    }

    #[tokio::test]
    async fn test_set_alarm_requires_interface() {
        let olt = Olt::new(config(1, 1)).unwrap();
        let mut req = AlarmRequest {
            intf_id: 3,
            intf_type: InterfaceType::Pon,
            status: AlarmStatus::On,
        };
        assert!(matches!(olt.set_alarm(&req).await, Err(OltError::NotFound(_))));

        req.intf_id = 0;
        olt.set_alarm(&req).await.unwrap();
        let mut rx = olt.channel.take_receiver().unwrap();
        match rx.recv().await {
            Some(Message::Alarm(AlarmIndication::Los(los))) => {
                assert_eq!(los.intf_id, 0x2000_0000);
                assert_eq!(los.status, AlarmStatus::On);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_omci_malformed_and_disabled() {
        let olt = Olt::new(config(1, 1)).unwrap();
        let mut msg = OmciMessage {
            intf_id: 0,
            onu_id: 1,
            pkt: vec![0, 1],
        };
        assert!(matches!(
            olt.omci_msg_out(&msg).await,
            Err(OltError::MalformedProtocolPayload(_))
        ));

        let onu = olt.find_onu(0, 1).unwrap();
        onu.fire(OnuEvent::Disable).unwrap();
        msg.pkt = omci_request();
        olt.omci_msg_out(&msg).await.unwrap();

        let mut rx = onu.channel().take_receiver().unwrap();
        onu.channel().close();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_power_on_requires_discoverable_state() {
        let olt = Olt::new(config(1, 1)).unwrap();
        olt.power_on_onu(0, 1).await.unwrap();

        let onu = olt.find_onu(0, 1).unwrap();
        onu.fire(OnuEvent::Enable).unwrap();
        assert!(matches!(olt.power_on_onu(0, 1).await, Err(OltError::DeviceNotReady(_))));
    }

    #[test]
    fn test_reset_pon_only_when_not_enabled() {
        let olt = Olt::new(config(1, 1)).unwrap();
        olt.pon(0).unwrap().fire(crate::device::PonEvent::Enable).unwrap();
        assert!(matches!(olt.reset_pon(0), Err(OltError::DeviceNotReady(_))));

        olt.pon(0).unwrap().fire(crate::device::PonEvent::Disable).unwrap();
        olt.reset_pon(0).unwrap();
        assert_eq!(olt.resources().len(ResourceKind::AllocId), 0);
    }

    #[test]
    fn test_traffic_schedulers() {
        let olt = Olt::new(config(1, 1)).unwrap();
        let scheds = TrafficSchedulers {
            intf_id: 0,
            onu_id: 1,
            uni_id: 0,
            port_no: 16,
            traffic_scheds: Vec::new(),
        };
        olt.create_traffic_schedulers(scheds.clone()).unwrap();
        assert!(olt.find_onu(0, 1).unwrap().traffic_schedulers().is_some());
        olt.remove_traffic_schedulers(&scheds).unwrap();
        assert!(olt.find_onu(0, 1).unwrap().traffic_schedulers().is_none());

        let unknown = TrafficSchedulers { onu_id: 9, ..scheds };
        assert!(matches!(olt.create_traffic_schedulers(unknown), Err(OltError::NotFound(_))));
    }

    #[test]
    fn test_find_service_by_mac() {
        let olt = Olt::new(config(1, 2)).unwrap();
        let mac = olt.find_onu(0, 2).unwrap().uni_ports()[0].services()[0].mac;
        let (onu, uni) = olt.find_service_by_mac(&mac).unwrap();
        assert_eq!(onu.id(), 2);
        assert_eq!(uni.id, 0);
        assert!(olt.find_service_by_mac(&MacAddress::BROADCAST).is_err());
    }
}
