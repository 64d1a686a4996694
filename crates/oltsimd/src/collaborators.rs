//! Codec and packet classification seams.
//!
//! The simulator never looks inside OMCI payloads or subscriber frames
//! itself. It hands them to an [`OmciCodec`] and a [`PacketClassifier`],
//! which can be swapped for full implementations. The defaults shipped here
//! understand just enough to route traffic: the OMCI baseline header and the
//! Ethernet/IP headers of the control protocols a subscriber speaks.

use oltsim_types::MacAddress;
use std::fmt;
use thiserror::Error;

const OMCI_HEADER_LEN: usize = 8;
const OMCI_BASELINE_LEN: usize = 48;
const OMCI_BASELINE_DEVICE_ID: u8 = 0x0a;
const OMCI_EXTENDED_DEVICE_ID: u8 = 0x0b;
const OMCI_AR: u8 = 0x40;
const OMCI_AK: u8 = 0x20;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("omci payload too short: {0} bytes")]
    TooShort(usize),

    #[error("unsupported omci device identifier {0:#04x}")]
    UnsupportedDeviceId(u8),
}

/// Decoded OMCI header together with the raw frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OmciFrame {
    pub transaction_id: u16,
    pub message_type: u8,
    pub device_id: u8,
    pub me_class: u16,
    pub me_instance: u16,
    pub raw: Vec<u8>,
}

impl OmciFrame {
    /// Returns true if the sender expects a response.
    pub fn ack_requested(&self) -> bool {
        self.message_type & OMCI_AR != 0
    }

    /// Message type without the DB/AR/AK flag bits.
    pub fn action(&self) -> u8 {
        self.message_type & 0x1f
    }
}

/// Turns raw OMCI bytes into frames and produces the ONU's answers.
pub trait OmciCodec: Send + Sync + fmt::Debug {
    fn decode(&self, pkt: &[u8]) -> Result<OmciFrame, CodecError>;

    /// Response the ONU sends for `frame`, if any.
    fn respond(&self, frame: &OmciFrame) -> Option<Vec<u8>>;
}

/// Codec that understands the baseline message header only.
///
/// Responses echo the request header with AR cleared and AK set, and carry
/// an all-zero (success) message body.
#[derive(Debug, Default, Clone, Copy)]
pub struct BaselineOmciCodec;

impl OmciCodec for BaselineOmciCodec {
    fn decode(&self, pkt: &[u8]) -> Result<OmciFrame, CodecError> {
        if pkt.len() < OMCI_HEADER_LEN {
            return Err(CodecError::TooShort(pkt.len()));
        }
        let device_id = pkt[3];
        if device_id != OMCI_BASELINE_DEVICE_ID && device_id != OMCI_EXTENDED_DEVICE_ID {
            return Err(CodecError::UnsupportedDeviceId(device_id));
        }
        Ok(OmciFrame {
            transaction_id: u16::from_be_bytes([pkt[0], pkt[1]]),
            message_type: pkt[2],
            device_id,
            me_class: u16::from_be_bytes([pkt[4], pkt[5]]),
            me_instance: u16::from_be_bytes([pkt[6], pkt[7]]),
            raw: pkt.to_vec(),
        })
    }

    fn respond(&self, frame: &OmciFrame) -> Option<Vec<u8>> {
        if !frame.ack_requested() {
            return None;
        }
        let mut resp = vec![0u8; OMCI_BASELINE_LEN];
        resp[..2].copy_from_slice(&frame.transaction_id.to_be_bytes());
        resp[2] = (frame.message_type & !OMCI_AR) | OMCI_AK;
        resp[3] = OMCI_BASELINE_DEVICE_ID;
        resp[4..6].copy_from_slice(&frame.me_class.to_be_bytes());
        resp[6..8].copy_from_slice(&frame.me_instance.to_be_bytes());
        // Trailer: CPCS-UU/CPI, then the SDU length of the contents.
        resp[42..44].copy_from_slice(&0x0028u16.to_be_bytes());
        Some(resp)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    Eapol,
    Dhcp,
    Dhcpv6,
    Igmp,
    Arp,
    Icmp,
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PacketType::Eapol => "eapol",
            PacketType::Dhcp => "dhcp",
            PacketType::Dhcpv6 => "dhcpv6",
            PacketType::Igmp => "igmp",
            PacketType::Arp => "arp",
            PacketType::Icmp => "icmp",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifyError {
    #[error("frame truncated at {0} bytes")]
    Truncated(usize),

    #[error("unsupported packet: {0}")]
    Unsupported(String),
}

/// Type and addressing extracted from a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedPacket {
    pub pkt_type: PacketType,
    pub dst_mac: MacAddress,
    pub src_mac: MacAddress,
    /// VLAN IDs from outermost to innermost tag.
    pub vlan_ids: Vec<u16>,
}

pub trait PacketClassifier: Send + Sync + fmt::Debug {
    fn classify(&self, pkt: &[u8]) -> Result<ClassifiedPacket, ClassifyError>;
}

/// Classifier for untagged, 802.1Q and QinQ Ethernet frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct EthernetClassifier;

fn read_u16(pkt: &[u8], offset: usize) -> Result<u16, ClassifyError> {
    pkt.get(offset..offset + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or(ClassifyError::Truncated(pkt.len()))
}

fn read_u8(pkt: &[u8], offset: usize) -> Result<u8, ClassifyError> {
    pkt.get(offset).copied().ok_or(ClassifyError::Truncated(pkt.len()))
}

impl EthernetClassifier {
    fn classify_ipv4(&self, pkt: &[u8], l3: usize) -> Result<PacketType, ClassifyError> {
        let ihl = usize::from(read_u8(pkt, l3)? & 0x0f) * 4;
        match read_u8(pkt, l3 + 9)? {
            1 => Ok(PacketType::Icmp),
            2 => Ok(PacketType::Igmp),
            17 => {
                let l4 = l3 + ihl;
                let (src, dst) = (read_u16(pkt, l4)?, read_u16(pkt, l4 + 2)?);
                if matches!(src, 67 | 68) || matches!(dst, 67 | 68) {
                    Ok(PacketType::Dhcp)
                } else {
                    Err(ClassifyError::Unsupported(format!("udp {}->{}", src, dst)))
                }
            }
            proto => Err(ClassifyError::Unsupported(format!("ip protocol {}", proto))),
        }
    }

    fn classify_ipv6(&self, pkt: &[u8], l3: usize) -> Result<PacketType, ClassifyError> {
        match read_u8(pkt, l3 + 6)? {
            58 => Ok(PacketType::Icmp),
            17 => {
                let l4 = l3 + 40;
                let (src, dst) = (read_u16(pkt, l4)?, read_u16(pkt, l4 + 2)?);
                if matches!(src, 546 | 547) || matches!(dst, 546 | 547) {
                    Ok(PacketType::Dhcpv6)
                } else {
                    Err(ClassifyError::Unsupported(format!("udp {}->{}", src, dst)))
                }
            }
            next => Err(ClassifyError::Unsupported(format!("ipv6 next header {}", next))),
        }
    }
}

impl PacketClassifier for EthernetClassifier {
    fn classify(&self, pkt: &[u8]) -> Result<ClassifiedPacket, ClassifyError> {
        let dst_mac = MacAddress::from_slice(pkt).ok_or(ClassifyError::Truncated(pkt.len()))?;
        let src_mac = pkt
            .get(6..)
            .and_then(MacAddress::from_slice)
            .ok_or(ClassifyError::Truncated(pkt.len()))?;

        let mut offset = 12;
        let mut vlan_ids = Vec::new();
        let mut ether_type = read_u16(pkt, offset)?;
        while matches!(ether_type, 0x8100 | 0x88a8) {
            vlan_ids.push(read_u16(pkt, offset + 2)? & 0x0fff);
            offset += 4;
            ether_type = read_u16(pkt, offset)?;
        }
        let l3 = offset + 2;

        let pkt_type = match ether_type {
            0x888e => PacketType::Eapol,
            0x0806 => PacketType::Arp,
            0x0800 => self.classify_ipv4(pkt, l3)?,
            0x86dd => self.classify_ipv6(pkt, l3)?,
            other => return Err(ClassifyError::Unsupported(format!("ethertype {:#06x}", other))),
        };

        Ok(ClassifiedPacket {
            pkt_type,
            dst_mac,
            src_mac,
            vlan_ids,
        })
    }
}
