//! Indications streamed from the simulated device to the controller.

use crate::{AdminState, AlarmStatus, InterfaceType, OperState, SerialNumber};
use serde::{Deserialize, Serialize};

/// Operational change of an NNI or PON interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntfOperIndication {
    pub intf_type: InterfaceType,
    pub intf_id: u32,
    pub oper_state: OperState,
    /// Port speed in Mbps. Zero when unknown.
    pub speed: u32,
}

/// An ONU announcing itself on a PON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnuDiscIndication {
    pub intf_id: u32,
    pub serial_number: SerialNumber,
}

/// State of an activated ONU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnuIndication {
    pub intf_id: u32,
    pub onu_id: u32,
    pub oper_state: OperState,
    pub admin_state: AdminState,
    pub serial_number: SerialNumber,
}

/// OMCI frame sent by an ONU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OmciIndication {
    pub intf_id: u32,
    pub onu_id: u32,
    pub pkt: Vec<u8>,
}

/// Packet trapped to the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketIndication {
    pub intf_type: InterfaceType,
    pub intf_id: u32,
    pub onu_id: u32,
    pub uni_id: u32,
    pub port_no: u32,
    pub gemport_id: u32,
    pub pkt: Vec<u8>,
}

/// Loss of signal on an interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LosIndication {
    /// Port number of the interface, see [`crate::port_number`].
    pub intf_id: u32,
    pub status: AlarmStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmIndication {
    Los(LosIndication),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowUpdateKind {
    Added,
    Removed,
}

/// A flow applied to (or removed from) an ONU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowUpdateIndication {
    pub flow_id: u64,
    pub intf_id: u32,
    pub onu_id: u32,
    pub kind: FlowUpdateKind,
}

/// Port counters reported by the periodic statistics loop.
///
/// This is also the record format of the statistics samples file, one JSON
/// object per line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortStatistics {
    pub intf_id: u32,
    pub rx_bytes: u64,
    pub rx_packets: u64,
    pub rx_ucast_packets: u64,
    pub rx_mcast_packets: u64,
    pub rx_bcast_packets: u64,
    pub rx_error_packets: u64,
    pub rx_crc_errors: u64,
    pub tx_bytes: u64,
    pub tx_packets: u64,
    pub tx_ucast_packets: u64,
    pub tx_mcast_packets: u64,
    pub tx_bcast_packets: u64,
    pub tx_error_packets: u64,
    pub bip_errors: u64,
    pub timestamp: u32,
}

/// Outbound event on the indication stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Indication {
    Olt { oper_state: OperState },
    Intf { intf_id: u32, oper_state: OperState },
    IntfOper(IntfOperIndication),
    OnuDisc(OnuDiscIndication),
    Onu(OnuIndication),
    Omci(OmciIndication),
    Packet(PacketIndication),
    PortStats(PortStatistics),
    Alarm(AlarmIndication),
    FlowUpdate(FlowUpdateIndication),
}

impl Indication {
    /// Short name of the indication kind, used in logs.
    pub const fn kind(&self) -> &'static str {
        match self {
            Indication::Olt { .. } => "olt",
            Indication::Intf { .. } => "intf",
            Indication::IntfOper(_) => "intf_oper",
            Indication::OnuDisc(_) => "onu_disc",
            Indication::Onu(_) => "onu",
            Indication::Omci(_) => "omci",
            Indication::Packet(_) => "pkt",
            Indication::PortStats(_) => "port_stats",
            Indication::Alarm(_) => "alarm",
            Indication::FlowUpdate(_) => "flow_update",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_port_statistics_partial_record() {
        let line = r#"{"intf_id": 1048576, "rx_bytes": 2048, "tx_packets": 12}"#;
        let stats: PortStatistics = serde_json::from_str(line).unwrap();
        assert_eq!(stats.intf_id, 1_048_576);
        assert_eq!(stats.rx_bytes, 2048);
        assert_eq!(stats.tx_packets, 12);
        assert_eq!(stats.bip_errors, 0);
    }

    #[test]
    fn test_indication_kind() {
        let ind = Indication::Olt {
            oper_state: OperState::Up,
        };
        assert_eq!(ind.kind(), "olt");

        let ind = Indication::Alarm(AlarmIndication::Los(LosIndication {
            intf_id: 1,
            status: AlarmStatus::On,
        }));
        assert_eq!(ind.kind(), "alarm");
    }
}
