use crate::collaborators::ClassifiedPacket;
use crate::error::{OltError, Result};
use crate::stream::IndicationStream;
use oltsim_types::{Indication, InterfaceType, MacAddress, PacketIndication};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// A subscriber service bound to a UNI, identified by its MAC address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub name: String,
    pub mac: MacAddress,
}

/// Subscriber-facing port of an ONU.
#[derive(Debug)]
pub struct UniPort {
    pub id: u32,
    pub port_no: u32,
    services: Vec<Service>,
    stream: RwLock<Option<IndicationStream>>,
    packets_delivered: AtomicU64,
    packets_sent: AtomicU64,
}

impl UniPort {
    pub fn new(olt_id: u32, pon_id: u32, onu_id: u32, uni_id: u32, service_names: &[String]) -> Self {
        let services = service_names
            .iter()
            .enumerate()
            .map(|(idx, name)| Service {
                name: name.clone(),
                mac: MacAddress::new([
                    0x2e,
                    olt_id as u8,
                    pon_id as u8,
                    onu_id as u8,
                    uni_id as u8,
                    idx as u8,
                ]),
            })
            .collect();

        Self {
            id: uni_id,
            port_no: Self::port_number(pon_id, onu_id, uni_id),
            services,
            stream: RwLock::new(None),
            packets_delivered: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
        }
    }

    /// Logical port number the controller uses for a UNI.
    pub const fn port_number(pon_id: u32, onu_id: u32, uni_id: u32) -> u32 {
        (pon_id << 12) | (onu_id << 4) | uni_id
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    pub fn service_by_mac(&self, mac: &MacAddress) -> Option<&Service> {
        self.services.iter().find(|s| s.mac == *mac)
    }

    pub(crate) fn update_stream(&self, stream: IndicationStream) {
        *self.stream.write() = Some(stream);
    }

    pub(crate) fn clear_stream(&self) {
        *self.stream.write() = None;
    }

    /// Hands a downstream frame to the subscriber side.
    pub(crate) fn deliver(&self, packet: &ClassifiedPacket, len: usize) {
        let service = self
            .service_by_mac(&packet.dst_mac)
            .map(|s| s.name.as_str())
            .unwrap_or("broadcast");
        self.packets_delivered.fetch_add(1, Ordering::Relaxed);
        debug!(
            uni_id = self.id,
            port_no = self.port_no,
            service,
            pkt_type = %packet.pkt_type,
            len,
            "packet delivered to uni"
        );
    }

    /// Sends a subscriber frame upstream as a packet-in indication.
    pub(crate) async fn send_packet_in(&self, pon_id: u32, onu_id: u32, pkt: Vec<u8>) -> Result<()> {
        let stream = self.stream.read().clone();
        let Some(stream) = stream else {
            warn!(uni_id = self.id, onu_id, "no active session, dropping subscriber packet");
            return Err(OltError::DeviceNotReady(format!(
                "uni-{}-onu-{}-has-no-stream",
                self.id, onu_id
            )));
        };

        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        stream
            .send(Indication::Packet(PacketIndication {
                intf_type: InterfaceType::Pon,
                intf_id: pon_id,
                onu_id,
                uni_id: self.id,
                port_no: self.port_no,
                gemport_id: 0,
                pkt,
            }))
            .await;
        Ok(())
    }

    pub fn packets_delivered(&self) -> u64 {
        self.packets_delivered.load(Ordering::Relaxed)
    }

    pub fn packets_sent(&self) -> u64 {
        self.packets_sent.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_port_number() {
        assert_eq!(UniPort::port_number(0, 1, 0), 16);
        assert_eq!(UniPort::port_number(1, 2, 3), 4096 + 32 + 3);
    }

    #[test]
    fn test_service_macs() {
        let uni = UniPort::new(0, 1, 2, 0, &["hsia".to_string(), "voip".to_string()]);
        assert_eq!(uni.services().len(), 2);
        assert_eq!(uni.services()[1].mac.to_string(), "2e:00:01:02:00:01");

        let mac = uni.services()[0].mac;
        assert_eq!(uni.service_by_mac(&mac).unwrap().name, "hsia");
    }

    #[tokio::test]
    async fn test_packet_in_requires_stream() {
        let uni = UniPort::new(0, 0, 1, 0, &["hsia".to_string()]);
        assert!(uni.send_packet_in(0, 1, vec![1, 2, 3]).await.is_err());

        let (stream, _rx) = IndicationStream::channel(4);
        uni.update_stream(stream);
        uni.send_packet_in(0, 1, vec![1, 2, 3]).await.unwrap();
        assert_eq!(uni.packets_sent(), 1);
    }
}
