//! Messages exchanged between RPC handlers and the dispatch loops.

use crate::collaborators::{ClassifiedPacket, OmciFrame};
use oltsim_types::{AlarmIndication, Flow, OperState};

/// Inbound message of a device channel.
///
/// The OLT dispatch loop handles the device-level variants and the ONU
/// dispatch loops handle the rest. A loop that receives a variant it does
/// not own logs and drops it.
#[derive(Debug, Clone)]
pub enum Message {
    // OLT channel
    OltIndication {
        oper_state: OperState,
    },
    NniIndication {
        nni_id: u32,
        oper_state: OperState,
    },
    PonIndication {
        pon_id: u32,
        oper_state: OperState,
    },
    Alarm(AlarmIndication),

    // ONU channels
    OnuDiscovery,
    OnuIndication {
        oper_state: OperState,
    },
    FlowAdd(Flow),
    FlowRemoved(Flow),
    Omci(OmciFrame),
    OnuPacketOut {
        port_no: u32,
        packet: ClassifiedPacket,
        pkt: Vec<u8>,
    },
    /// Frame received on an NNI for a subscriber service
    DownstreamPacket {
        uni_id: u32,
        packet: ClassifiedPacket,
        pkt: Vec<u8>,
    },
    /// Frame sent by a subscriber behind a UNI
    UniPacketIn {
        uni_id: u32,
        pkt: Vec<u8>,
    },
}

impl Message {
    /// Short name of the message kind, used in logs.
    pub const fn kind(&self) -> &'static str {
        match self {
            Message::OltIndication { .. } => "olt_indication",
            Message::NniIndication { .. } => "nni_indication",
            Message::PonIndication { .. } => "pon_indication",
            Message::Alarm(_) => "alarm",
            Message::OnuDiscovery => "onu_discovery",
            Message::OnuIndication { .. } => "onu_indication",
            Message::FlowAdd(_) => "flow_add",
            Message::FlowRemoved(_) => "flow_removed",
            Message::Omci(_) => "omci",
            Message::OnuPacketOut { .. } => "onu_packet_out",
            Message::DownstreamPacket { .. } => "downstream_packet",
            Message::UniPacketIn { .. } => "uni_packet_in",
        }
    }
}
