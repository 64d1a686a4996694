//! Per-device dispatch loops.
//!
//! Every device with an inbound channel (the OLT and each ONU) runs exactly
//! one loop per session. The loop is the only writer of that device's
//! indications, so the controller sees them in the order the messages were
//! queued.
//!
//! A loop ends in one of two ways:
//!
//! - the session is cancelled: the receiver is handed back to the channel
//!   so the next session resumes on the same queue;
//! - the channel is closed: the loop drains what is buffered and exits.

use crate::device::{Olt, Onu, OperEvent, PonEvent};
use crate::message::Message;
use crate::stream::IndicationStream;
use oltsim_common::ChannelReceiver;
use oltsim_types::{
    FlowUpdateIndication, FlowUpdateKind, Indication, IntfOperIndication, InterfaceType,
    OmciIndication, OnuDiscIndication, OperState,
};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Outcome of waiting on a device channel.
enum Next {
    Message(Message),
    Closed,
    Cancelled,
}

async fn next_message(rx: &mut ChannelReceiver<Message>, token: &CancellationToken) -> Next {
    tokio::select! {
        biased;
        _ = token.cancelled() => Next::Cancelled,
        msg = rx.recv() => match msg {
            Some(msg) => Next::Message(msg),
            None => Next::Closed,
        },
    }
}

/// Runs `handler` unless the session is cancelled first. Returns false on
/// cancellation.
async fn run_handler<F: Future<Output = ()>>(handler: F, token: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        _ = handler => true,
    }
}

pub(crate) async fn olt_loop(
    olt: Arc<Olt>,
    mut rx: ChannelReceiver<Message>,
    stream: IndicationStream,
    token: CancellationToken,
) {
    info!(olt_id = olt.id(), session = %stream.session_id(), "olt dispatch loop started");

    loop {
        let msg = match next_message(&mut rx, &token).await {
            Next::Message(msg) => msg,
            Next::Closed => {
                info!(olt_id = olt.id(), "olt channel closed, dispatch loop done");
                return;
            }
            Next::Cancelled => break,
        };
        debug!(olt_id = olt.id(), kind = msg.kind(), "olt message received");

        if !run_handler(handle_olt_message(&olt, msg, &stream, &token), &token).await {
            break;
        }
    }

    olt.channel.restore_receiver(rx);
    debug!(olt_id = olt.id(), "olt dispatch loop cancelled");
}

async fn handle_olt_message(olt: &Olt, msg: Message, stream: &IndicationStream, token: &CancellationToken) {
    match msg {
        Message::OltIndication { oper_state } => {
            if let Err(e) = olt.fire(oper_state.into()) {
                error!(olt_id = olt.id(), error = %e, "olt lifecycle transition failed");
            }
            if let Err(e) = olt.fire_oper(OperEvent::from(oper_state)) {
                error!(olt_id = olt.id(), error = %e, "olt oper transition failed");
            }
            stream.send(Indication::Olt { oper_state }).await;
        }
        Message::NniIndication { nni_id, oper_state } => {
            let nni = match olt.nni(nni_id) {
                Ok(nni) => nni,
                Err(e) => {
                    warn!(error = %e, "dropping nni indication");
                    return;
                }
            };
            if let Err(e) = nni.fire_oper(OperEvent::from(oper_state)) {
                error!(nni_id, error = %e, "nni oper transition failed");
            }
            stream
                .send(Indication::IntfOper(IntfOperIndication {
                    intf_type: InterfaceType::Nni,
                    intf_id: nni_id,
                    oper_state,
                    speed: nni.speed,
                }))
                .await;
        }
        Message::PonIndication { pon_id, oper_state } => {
            let pon = match olt.pon(pon_id) {
                Ok(pon) => pon,
                Err(e) => {
                    warn!(error = %e, "dropping pon indication");
                    return;
                }
            };

            match pon.fire_oper(OperEvent::from(oper_state)) {
                Ok(_) => {
                    stream
                        .send(Indication::Intf {
                            intf_id: pon_id,
                            oper_state,
                        })
                        .await;
                    stream
                        .send(Indication::IntfOper(IntfOperIndication {
                            intf_type: InterfaceType::Pon,
                            intf_id: pon_id,
                            oper_state,
                            speed: 0,
                        }))
                        .await;
                }
                Err(e) => error!(pon_id, error = %e, "pon oper transition failed"),
            }

            match pon.fire(PonEvent::from(oper_state)) {
                Ok(transition) => {
                    if let Some(action) = transition.action {
                        pon.apply(
                            action,
                            olt.activation_mode().auto_discovers_onus(),
                            olt.config().onu_discovery_delay(),
                            token,
                        )
                        .await;
                    }
                }
                Err(e) => error!(pon_id, error = %e, "pon lifecycle transition failed"),
            }
        }
        Message::Alarm(alarm) => {
            stream.send(Indication::Alarm(alarm)).await;
        }
        other => warn!(olt_id = olt.id(), kind = other.kind(), "olt loop dropping onu message"),
    }
}

pub(crate) async fn onu_loop(
    olt: Arc<Olt>,
    onu: Arc<Onu>,
    mut rx: ChannelReceiver<Message>,
    stream: IndicationStream,
    token: CancellationToken,
) {
    debug!(serial = %onu.serial_number(), session = %stream.session_id(), "onu dispatch loop started");

    loop {
        let msg = match next_message(&mut rx, &token).await {
            Next::Message(msg) => msg,
            Next::Closed => {
                debug!(serial = %onu.serial_number(), "onu channel closed, dispatch loop done");
                return;
            }
            Next::Cancelled => break,
        };
        debug!(serial = %onu.serial_number(), kind = msg.kind(), "onu message received");

        if !run_handler(handle_onu_message(&olt, &onu, msg, &stream), &token).await {
            break;
        }
    }

    onu.channel().restore_receiver(rx);
    debug!(serial = %onu.serial_number(), "onu dispatch loop cancelled");
}

async fn handle_onu_message(olt: &Olt, onu: &Onu, msg: Message, stream: &IndicationStream) {
    let pon_id = onu.pon_id();

    match msg {
        Message::OnuDiscovery => {
            stream
                .send(Indication::OnuDisc(OnuDiscIndication {
                    intf_id: pon_id,
                    serial_number: onu.serial_number(),
                }))
                .await;
        }
        Message::OnuIndication { oper_state } => {
            stream.send(Indication::Onu(onu.indication(oper_state))).await;
        }
        Message::FlowAdd(flow) => {
            send_flow_update(stream, onu, flow.flow_id, FlowUpdateKind::Added).await;
        }
        Message::FlowRemoved(flow) => {
            send_flow_update(stream, onu, flow.flow_id, FlowUpdateKind::Removed).await;
        }
        Message::Omci(frame) => {
            let seq = onu.next_omci_request();
            let rate = u64::from(olt.config().olt.omci_response_rate);
            if seq % 10 >= rate {
                debug!(serial = %onu.serial_number(), transaction_id = frame.transaction_id, "omci response dropped");
                return;
            }
            match olt.codec.respond(&frame) {
                Some(pkt) => {
                    stream
                        .send(Indication::Omci(OmciIndication {
                            intf_id: pon_id,
                            onu_id: onu.id(),
                            pkt,
                        }))
                        .await;
                }
                None => debug!(
                    serial = %onu.serial_number(),
                    transaction_id = frame.transaction_id,
                    "omci request needs no response"
                ),
            }
        }
        Message::OnuPacketOut { port_no, packet, pkt } => match onu.uni_by_port_no(port_no) {
            Some(uni) => uni.deliver(&packet, pkt.len()),
            None => warn!(serial = %onu.serial_number(), port_no, "no uni for packet out"),
        },
        Message::DownstreamPacket { uni_id, packet, pkt } => match onu.uni(uni_id) {
            Some(uni) => uni.deliver(&packet, pkt.len()),
            None => warn!(serial = %onu.serial_number(), uni_id, "no uni for downstream packet"),
        },
        Message::UniPacketIn { uni_id, pkt } => match onu.uni(uni_id) {
            Some(uni) => {
                if let Err(e) = uni.send_packet_in(pon_id, onu.id(), pkt).await {
                    warn!(serial = %onu.serial_number(), uni_id, error = %e, "packet in failed");
                }
            }
            None => warn!(serial = %onu.serial_number(), uni_id, "no uni for packet in"),
        },
        other => warn!(serial = %onu.serial_number(), kind = other.kind(), "onu loop dropping olt message"),
    }
}

async fn send_flow_update(stream: &IndicationStream, onu: &Onu, flow_id: u64, kind: FlowUpdateKind) {
    stream
        .send(Indication::FlowUpdate(FlowUpdateIndication {
            flow_id,
            intf_id: onu.pon_id(),
            onu_id: onu.id(),
            kind,
        }))
        .await;
}
