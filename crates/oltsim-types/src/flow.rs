//! Flow and traffic scheduler definitions pushed by the controller.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a provisioned flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlowKey {
    pub id: u64,
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Direction/kind of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowType {
    #[default]
    Upstream,
    Downstream,
    Multicast,
}

impl fmt::Display for FlowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowType::Upstream => write!(f, "upstream"),
            FlowType::Downstream => write!(f, "downstream"),
            FlowType::Multicast => write!(f, "multicast"),
        }
    }
}

/// Packet match criteria. Only used for logging and service binding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classifier {
    #[serde(default)]
    pub eth_type: Option<u32>,
    #[serde(default)]
    pub o_vid: Option<u32>,
    #[serde(default)]
    pub i_vid: Option<u32>,
    #[serde(default)]
    pub o_pbits: Option<u32>,
    #[serde(default)]
    pub ip_proto: Option<u32>,
    #[serde(default)]
    pub src_port: Option<u32>,
    #[serde(default)]
    pub dst_port: Option<u32>,
}

/// A flow as received from the controller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flow {
    pub flow_id: u64,
    /// PON port the flow is bound to. `None` for OLT-scoped (trap/broadcast) flows.
    #[serde(default)]
    pub access_intf_id: Option<u32>,
    #[serde(default)]
    pub network_intf_id: u32,
    pub onu_id: u32,
    #[serde(default)]
    pub uni_id: u32,
    #[serde(default)]
    pub port_no: u32,
    pub alloc_id: u32,
    pub gemport_id: u32,
    #[serde(default)]
    pub flow_type: FlowType,
    #[serde(default)]
    pub replicate_flow: bool,
    /// Priority bit to GEM port mapping, used when `replicate_flow` is set.
    #[serde(default)]
    pub pbit_to_gemport: BTreeMap<u32, u32>,
    #[serde(default)]
    pub classifier: Classifier,
    #[serde(default)]
    pub cookie: u64,
    #[serde(default)]
    pub priority: i32,
}

impl Flow {
    pub fn key(&self) -> FlowKey {
        FlowKey { id: self.flow_id }
    }

    /// Returns true if the flow targets a specific ONU and goes through
    /// per-ONU bookkeeping.
    pub fn is_onu_flow(&self) -> bool {
        self.access_intf_id.is_some() && self.flow_type != FlowType::Multicast
    }

    /// GEM ports referenced by this flow.
    ///
    /// A replicated flow references one GEM port per priority bit; any other
    /// flow references only `gemport_id`.
    pub fn gem_ports(&self) -> Vec<u32> {
        if self.replicate_flow {
            let mut gems: Vec<u32> = self.pbit_to_gemport.values().copied().collect();
            gems.sort_unstable();
            gems.dedup();
            gems
        } else {
            vec![self.gemport_id]
        }
    }
}

/// A single traffic scheduler (T-CONT) configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficScheduler {
    pub direction: FlowType,
    pub alloc_id: u32,
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub weight: u32,
    #[serde(default)]
    pub cir: u32,
    #[serde(default)]
    pub pir: u32,
}

/// Scheduler configuration for one UNI of an ONU.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficSchedulers {
    pub intf_id: u32,
    pub onu_id: u32,
    #[serde(default)]
    pub uni_id: u32,
    #[serde(default)]
    pub port_no: u32,
    #[serde(default)]
    pub traffic_scheds: Vec<TrafficScheduler>,
}
