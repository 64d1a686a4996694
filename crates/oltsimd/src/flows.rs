//! Flow add and remove.
//!
//! ONU-scoped flows claim their Alloc-ID and GEM ports in the resource
//! ledger before anything else is recorded, so a rejected flow leaves no
//! trace. OLT-scoped and multicast flows are only recorded in the flow table.

use crate::device::{Olt, OnuState};
use crate::error::{OltError, Result};
use crate::events::{EventType, SimEvent};
use crate::message::Message;
use oltsim_common::ResourceClaim;
use oltsim_types::Flow;
use tracing::{debug, error, info};

impl Olt {
    pub async fn add_flow(&self, flow: Flow) -> Result<()> {
        debug!(
            flow_id = flow.flow_id,
            pon_id = ?flow.access_intf_id,
            onu_id = flow.onu_id,
            uni_id = flow.uni_id,
            port_no = flow.port_no,
            flow_type = %flow.flow_type,
            "received flow add"
        );

        let claim = match ResourceClaim::from_flow(&flow) {
            Some(claim) => claim,
            None => {
                debug!(flow_id = flow.flow_id, flow_type = %flow.flow_type, "adding olt flow");
                if !self.is_perf() {
                    self.flows.insert(flow.flow_id, flow);
                }
                return Ok(());
            }
        };

        let onu = self.find_onu(claim.pon, claim.onu)?;

        // The controller may not have seen the port-down indication yet.
        let state = onu.internal_state();
        if matches!(state, OnuState::Disabled | OnuState::PonDisabled) {
            error!(
                flow_id = flow.flow_id,
                serial = %onu.serial_number(),
                state = %state,
                "rejected flow because of onu state"
            );
            return Err(OltError::DeviceNotReady(format!(
                "onu-{}-is-currently-{}",
                onu.serial_number(),
                state
            )));
        }

        // Nothing is recorded unless the message is sure to be queued.
        let permit = match onu.reserve().await {
            Ok(permit) => permit,
            Err(e) => {
                error!(flow_id = flow.flow_id, serial = %onu.serial_number(), error = %e, "cannot queue flow for onu");
                return Err(e);
            }
        };

        if let Err(e) = self.resources.claim(&claim) {
            error!(flow_id = flow.flow_id, serial = %onu.serial_number(), error = %e, "invalid flow for onu");
            return Err(e.into());
        }

        if !self.is_perf() {
            self.flows.insert(flow.flow_id, flow.clone());
            if onu.add_flow(flow.key()) {
                self.events.publish(SimEvent::onu(
                    EventType::FlowAddReceived,
                    self.id,
                    onu.pon_id(),
                    onu.id(),
                    onu.serial_number(),
                ));
            }
        }

        permit.send(Message::FlowAdd(flow));
        Ok(())
    }

    pub async fn remove_flow(&self, flow: Flow) -> Result<()> {
        debug!(flow_id = flow.flow_id, pon_id = ?flow.access_intf_id, onu_id = flow.onu_id, "received flow remove");

        // Always freed, even for flows that never made it past validation.
        self.resources.free(flow.flow_id);

        let stored = self.flows.remove(&flow.flow_id).map(|(_, stored)| stored);
        if stored.is_none() && !self.is_perf() {
            error!(flow_id = flow.flow_id, "flow not found");
            return Err(OltError::NotFound(format!("flow-{}", flow.flow_id)));
        }

        let scoped = stored.as_ref().unwrap_or(&flow);
        if !scoped.is_onu_flow() {
            debug!(flow_id = flow.flow_id, "removing olt flow");
            return Ok(());
        }

        // In perf mode ONUs keep no flow list to search.
        let onu = match (self.is_perf(), scoped.access_intf_id) {
            (true, Some(pon_id)) => self.find_onu(pon_id, scoped.onu_id)?,
            _ => self.find_onu_by_flow_id(flow.flow_id)?,
        };
        if onu.remove_flow(flow.key()) {
            self.events.publish(SimEvent::onu(
                EventType::FlowRemoveReceived,
                self.id,
                onu.pon_id(),
                onu.id(),
                onu.serial_number(),
            ));
        }
        info!(flow_id = flow.flow_id, serial = %onu.serial_number(), "flow removed");

        onu.send(Message::FlowRemoved(flow)).await
    }
}
