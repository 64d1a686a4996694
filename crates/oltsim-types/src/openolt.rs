//! Request and response messages of the controller-facing OpenOLT surface.

use crate::{AlarmStatus, InterfaceType, PonTechnology, SerialNumber};
use serde::{Deserialize, Serialize};

/// Addresses an ONU, optionally by serial number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnuRequest {
    pub intf_id: u32,
    pub onu_id: u32,
    pub serial_number: SerialNumber,
}

/// Addresses a PON or NNI interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceRequest {
    pub intf_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OmciMessage {
    pub intf_id: u32,
    pub onu_id: u32,
    pub pkt: Vec<u8>,
}

/// Packet sent by the controller towards an ONU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnuPacket {
    pub intf_id: u32,
    pub onu_id: u32,
    pub port_no: u32,
    #[serde(default)]
    pub gemport_id: u32,
    pub pkt: Vec<u8>,
}

/// Packet sent by the controller out of an NNI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UplinkPacket {
    pub intf_id: u32,
    pub pkt: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub heartbeat_signature: u32,
}

/// Alarm raised or cleared through the simulator control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmRequest {
    pub intf_id: u32,
    pub intf_type: InterfaceType,
    pub status: AlarmStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PoolType {
    OnuId,
    AllocId,
    GemportId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PoolSharing {
    DedicatedPerIntf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePool {
    pub pool_type: PoolType,
    pub sharing: PoolSharing,
    pub start: u32,
    pub end: u32,
}

/// Resource ranges shared by a group of PON ports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceResourceRange {
    pub intf_ids: Vec<u32>,
    pub technology: PonTechnology,
    pub pools: Vec<ResourcePool>,
}

/// Static capability description returned by `GetDeviceInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub vendor: String,
    pub model: String,
    pub hardware_version: String,
    pub firmware_version: String,
    pub pon_ports: u32,
    pub nni_ports: u32,
    pub device_serial_number: String,
    pub device_id: String,
    pub previously_connected: bool,
    pub ranges: Vec<DeviceResourceRange>,
}
