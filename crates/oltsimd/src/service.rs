//! Controller-facing service surface.
//!
//! [`OpenOltService`] is what a transport (gRPC or an in-process harness)
//! calls into. [`SimulatorControl`] holds the operations a test harness uses
//! to play the part of the physical world. Both are implemented by
//! [`OltServer`] on top of a shared [`Olt`], converting
//! [`OltError`](crate::error::OltError) into
//! [`Status`] at this boundary.

use crate::device::Olt;
use crate::stream::IndicationReceiver;
use async_trait::async_trait;
use oltsim_types::openolt::{
    AlarmRequest, DeviceInfo, Heartbeat, InterfaceRequest, OmciMessage, OnuPacket, OnuRequest,
    UplinkPacket,
};
use oltsim_types::{Flow, TrafficSchedulers};
use std::sync::Arc;
use tonic::Status;

#[async_trait]
pub trait OpenOltService: Send + Sync {
    /// Opens a controller session. The returned stream stays open until the
    /// session is replaced or the chassis reboots.
    async fn enable_indication(&self) -> Result<IndicationReceiver, Status>;

    async fn get_device_info(&self) -> Result<DeviceInfo, Status>;

    async fn heartbeat_check(&self) -> Result<Heartbeat, Status>;

    async fn activate_onu(&self, req: OnuRequest) -> Result<(), Status>;

    async fn deactivate_onu(&self, req: OnuRequest) -> Result<(), Status>;

    async fn delete_onu(&self, req: OnuRequest) -> Result<(), Status>;

    async fn enable_pon_if(&self, req: InterfaceRequest) -> Result<(), Status>;

    async fn disable_pon_if(&self, req: InterfaceRequest) -> Result<(), Status>;

    async fn disable_olt(&self) -> Result<(), Status>;

    async fn reenable_olt(&self) -> Result<(), Status>;

    /// Starts a reboot and returns before it completes.
    async fn reboot(&self) -> Result<(), Status>;

    async fn flow_add(&self, flow: Flow) -> Result<(), Status>;

    async fn flow_remove(&self, flow: Flow) -> Result<(), Status>;

    async fn omci_msg_out(&self, msg: OmciMessage) -> Result<(), Status>;

    async fn onu_packet_out(&self, packet: OnuPacket) -> Result<(), Status>;

    async fn uplink_packet_out(&self, packet: UplinkPacket) -> Result<(), Status>;

    async fn create_traffic_schedulers(&self, schedulers: TrafficSchedulers) -> Result<(), Status>;

    async fn remove_traffic_schedulers(&self, schedulers: TrafficSchedulers) -> Result<(), Status>;

    async fn set_alarm(&self, req: AlarmRequest) -> Result<(), Status>;
}

/// Operations that stand in for events of the physical network.
#[async_trait]
pub trait SimulatorControl: Send + Sync {
    /// Powers an ONU on so it announces itself with a discovery indication.
    async fn power_on_onu(&self, pon_id: u32, onu_id: u32) -> Result<(), Status>;

    /// Has the subscriber behind a UNI send `pkt` upstream.
    async fn inject_subscriber_packet(
        &self,
        pon_id: u32,
        onu_id: u32,
        uni_id: u32,
        pkt: Vec<u8>,
    ) -> Result<(), Status>;

    /// Drops every flow and resource claim of a disabled PON.
    async fn reset_pon(&self, pon_id: u32) -> Result<(), Status>;
}

#[derive(Debug, Clone)]
pub struct OltServer {
    olt: Arc<Olt>,
}

impl OltServer {
    pub fn new(olt: Arc<Olt>) -> Self {
        Self { olt }
    }

    pub fn olt(&self) -> &Arc<Olt> {
        &self.olt
    }
}

#[async_trait]
impl OpenOltService for OltServer {
    async fn enable_indication(&self) -> Result<IndicationReceiver, Status> {
        Ok(self.olt.enable().await?)
    }

    async fn get_device_info(&self) -> Result<DeviceInfo, Status> {
        Ok(self.olt.get_device_info())
    }

    async fn heartbeat_check(&self) -> Result<Heartbeat, Status> {
        Ok(self.olt.heartbeat())
    }

    async fn activate_onu(&self, req: OnuRequest) -> Result<(), Status> {
        Ok(self.olt.activate_onu(&req).await?)
    }

    async fn deactivate_onu(&self, req: OnuRequest) -> Result<(), Status> {
        Ok(self.olt.deactivate_onu(&req).await?)
    }

    async fn delete_onu(&self, req: OnuRequest) -> Result<(), Status> {
        Ok(self.olt.delete_onu(&req).await?)
    }

    async fn enable_pon_if(&self, req: InterfaceRequest) -> Result<(), Status> {
        Ok(self.olt.enable_pon_if(&req).await?)
    }

    async fn disable_pon_if(&self, req: InterfaceRequest) -> Result<(), Status> {
        Ok(self.olt.disable_pon_if(&req).await?)
    }

    async fn disable_olt(&self) -> Result<(), Status> {
        Ok(self.olt.disable_olt().await?)
    }

    async fn reenable_olt(&self) -> Result<(), Status> {
        Ok(self.olt.reenable_olt().await?)
    }

    async fn reboot(&self) -> Result<(), Status> {
        self.olt.reboot();
        Ok(())
    }

    async fn flow_add(&self, flow: Flow) -> Result<(), Status> {
        Ok(self.olt.add_flow(flow).await?)
    }

    async fn flow_remove(&self, flow: Flow) -> Result<(), Status> {
        Ok(self.olt.remove_flow(flow).await?)
    }

    async fn omci_msg_out(&self, msg: OmciMessage) -> Result<(), Status> {
        Ok(self.olt.omci_msg_out(&msg).await?)
    }

    async fn onu_packet_out(&self, packet: OnuPacket) -> Result<(), Status> {
        Ok(self.olt.onu_packet_out(packet).await?)
    }

    async fn uplink_packet_out(&self, packet: UplinkPacket) -> Result<(), Status> {
        Ok(self.olt.uplink_packet_out(packet).await?)
    }

    async fn create_traffic_schedulers(&self, schedulers: TrafficSchedulers) -> Result<(), Status> {
        Ok(self.olt.create_traffic_schedulers(schedulers)?)
    }

    async fn remove_traffic_schedulers(&self, schedulers: TrafficSchedulers) -> Result<(), Status> {
        Ok(self.olt.remove_traffic_schedulers(&schedulers)?)
    }

    async fn set_alarm(&self, req: AlarmRequest) -> Result<(), Status> {
        Ok(self.olt.set_alarm(&req).await?)
    }
}

#[async_trait]
impl SimulatorControl for OltServer {
    async fn power_on_onu(&self, pon_id: u32, onu_id: u32) -> Result<(), Status> {
        Ok(self.olt.power_on_onu(pon_id, onu_id).await?)
    }

    async fn inject_subscriber_packet(
        &self,
        pon_id: u32,
        onu_id: u32,
        uni_id: u32,
        pkt: Vec<u8>,
    ) -> Result<(), Status> {
        self.olt
            .inject_subscriber_packet(pon_id, onu_id, uni_id, pkt)
            .await
            .map_err(Status::from)
    }

    async fn reset_pon(&self, pon_id: u32) -> Result<(), Status> {
        Ok(self.olt.reset_pon(pon_id)?)
    }
}
