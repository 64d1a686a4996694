//! Identity types: ONU serial numbers, MAC addresses and port numbers.

use crate::{InterfaceType, ParseError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Vendor ID used for every simulated ONU.
const SIMULATED_VENDOR_ID: [u8; 4] = *b"BBSM";

/// GPON serial number: a four letter vendor ID followed by four vendor-specific bytes.
///
/// Rendered as the vendor ID followed by the hex encoding of the vendor-specific part,
/// e.g. `BBSM00000101`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SerialNumber {
    vendor_id: [u8; 4],
    vendor_specific: [u8; 4],
}

impl SerialNumber {
    /// Creates a serial number from raw parts.
    pub const fn new(vendor_id: [u8; 4], vendor_specific: [u8; 4]) -> Self {
        Self {
            vendor_id,
            vendor_specific,
        }
    }

    /// Deterministic serial number of a simulated ONU.
    pub const fn simulated(olt_id: u32, pon_id: u32, onu_id: u32) -> Self {
        Self::new(
            SIMULATED_VENDOR_ID,
            [0, (olt_id % 256) as u8, pon_id as u8, onu_id as u8],
        )
    }

    pub const fn vendor_id(&self) -> &[u8; 4] {
        &self.vendor_id
    }

    pub const fn vendor_specific(&self) -> &[u8; 4] {
        &self.vendor_specific
    }
}

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.vendor_id {
            write!(f, "{}", b as char)?;
        }
        for b in self.vendor_specific {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl FromStr for SerialNumber {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidSerialNumber(s.to_string());
        if s.len() != 12 || !s.is_ascii() {
            return Err(invalid());
        }

        let mut vendor_id = [0u8; 4];
        vendor_id.copy_from_slice(&s.as_bytes()[..4]);

        let mut vendor_specific = [0u8; 4];
        for (i, byte) in vendor_specific.iter_mut().enumerate() {
            let start = 4 + i * 2;
            *byte = u8::from_str_radix(&s[start..start + 2], 16).map_err(|_| invalid())?;
        }

        Ok(Self::new(vendor_id, vendor_specific))
    }
}

impl TryFrom<String> for SerialNumber {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<SerialNumber> for String {
    fn from(sn: SerialNumber) -> Self {
        sn.to_string()
    }
}

/// A 48-bit Ethernet MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub const BROADCAST: MacAddress = MacAddress([0xff; 6]);

    pub const fn new(bytes: [u8; 6]) -> Self {
        MacAddress(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Reads a MAC address from the first six bytes of a slice.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; 6] = bytes.get(..6)?.try_into().ok()?;
        Some(MacAddress(raw))
    }

    /// Returns true if this is a multicast (or broadcast) address.
    pub const fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", a, b, c, d, e, g)
    }
}

impl FromStr for MacAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidMacAddress(s.to_string());
        let parts: Vec<&str> = s.split([':', '-']).collect();
        if parts.len() != 6 {
            return Err(invalid());
        }

        let mut bytes = [0u8; 6];
        for (byte, part) in bytes.iter_mut().zip(parts) {
            if part.len() != 2 {
                return Err(invalid());
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        Ok(MacAddress(bytes))
    }
}

impl TryFrom<String> for MacAddress {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> Self {
        mac.to_string()
    }
}

/// Converts an interface ID into the port number the controller expects.
///
/// NNI ports start at 1,048,576 and PON ports at 536,870,912.
pub const fn port_number(intf_type: InterfaceType, intf_id: u32) -> u32 {
    match intf_type {
        InterfaceType::Nni => (0x1 << 20) + intf_id,
        InterfaceType::Pon => (0x2 << 28) + intf_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_simulated_serial_number() {
        let sn = SerialNumber::simulated(0, 1, 2);
        assert_eq!(sn.to_string(), "BBSM00000102");
        assert_eq!(sn.vendor_id(), b"BBSM");
    }

    #[test]
    fn test_serial_number_parse() {
        let sn: SerialNumber = "BBSM000a0b0c".parse().unwrap();
        assert_eq!(sn.vendor_specific(), &[0x00, 0x0a, 0x0b, 0x0c]);
        assert_eq!(sn, "BBSM000A0B0C".parse().unwrap());

        assert!("BBSM0001".parse::<SerialNumber>().is_err());
        assert!("BBSM0000zz01".parse::<SerialNumber>().is_err());
    }

    #[test]
    fn test_serial_number_serde() {
        let sn = SerialNumber::simulated(1, 0, 1);
        let json = serde_json::to_string(&sn).unwrap();
        assert_eq!(json, "\"BBSM00010001\"");
        let back: SerialNumber = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sn);
    }

    #[test]
    fn test_mac_address() {
        let mac: MacAddress = "2e:00:01:02:00:01".parse().unwrap();
        assert_eq!(mac.to_string(), "2e:00:01:02:00:01");
        assert!(!mac.is_multicast());
        assert!(MacAddress::BROADCAST.is_multicast());
        assert_eq!(MacAddress::from_slice(&[1, 2, 3, 4, 5, 6, 7]), Some(MacAddress::new([1, 2, 3, 4, 5, 6])));
        assert_eq!(MacAddress::from_slice(&[1, 2, 3]), None);
        assert!("2e:00:01".parse::<MacAddress>().is_err());
    }

    #[test]
    fn test_port_number_mapping() {
        assert_eq!(port_number(InterfaceType::Nni, 0), 1_048_576);
        assert_eq!(port_number(InterfaceType::Pon, 3), 536_870_915);
    }
}
