//! Flow provisioning, PON enable/disable and OMCI scenarios.

mod common;

use common::*;
use oltsim_common::{Backpressure, ResourceKind};
use oltsim_types::openolt::{InterfaceRequest, OmciMessage};
use oltsim_types::{FlowUpdateIndication, FlowUpdateKind, Indication, OperState};
use oltsimd::{OnuState, OpenOltService, PonState, SimulatorControl};
use pretty_assertions::assert_eq;
use tonic::Code;

#[tokio::test]
async fn test_alloc_id_conflict_between_onus() {
    let server = server(config(1, 2));
    let olt = olt(&server);
    let mut rx = enabled(&server).await;
    activate(&server, &mut rx, 0, 1).await;
    activate(&server, &mut rx, 0, 2).await;

    server.flow_add(flow(1, 1, 100, 50)).await.unwrap();
    assert_eq!(
        next(&mut rx).await,
        Indication::FlowUpdate(FlowUpdateIndication {
            flow_id: 1,
            intf_id: 0,
            onu_id: 1,
            kind: FlowUpdateKind::Added,
        })
    );

    let status = server.flow_add(flow(2, 2, 100, 60)).await.unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);
    assert_eq!(olt.resources().len(ResourceKind::AllocId), 1);
    assert_eq!(olt.resources().len(ResourceKind::GemPort), 1);
    assert!(olt.flow(2).is_none());

    server.flow_remove(flow(1, 1, 100, 50)).await.unwrap();
    assert_eq!(
        next(&mut rx).await,
        Indication::FlowUpdate(FlowUpdateIndication {
            flow_id: 1,
            intf_id: 0,
            onu_id: 1,
            kind: FlowUpdateKind::Removed,
        })
    );
    assert!(olt.resources().is_empty());

    server.flow_add(flow(3, 2, 100, 60)).await.unwrap();
    assert!(olt.find_onu(0, 2).unwrap().has_flow(3));
}

#[tokio::test]
async fn test_flow_that_cannot_be_queued_is_not_recorded() {
    let mut config = config(1, 2);
    config.channel.queue_depth = 1;
    config.channel.backpressure = Backpressure::Reject;
    let server = server(config);
    let olt = olt(&server);

    // No session is open, so each ONU queue holds a single message.
    server.flow_add(flow(1, 1, 100, 50)).await.unwrap();
    let status = server.flow_add(flow(2, 1, 200, 60)).await.unwrap_err();
    assert_eq!(status.code(), Code::Unavailable);

    assert_eq!(olt.resources().len(ResourceKind::AllocId), 1);
    assert_eq!(olt.resources().len(ResourceKind::GemPort), 1);
    assert!(olt.flow(2).is_none());
    assert_eq!(olt.find_onu(0, 1).unwrap().flows().len(), 1);

    server.flow_add(flow(3, 2, 200, 60)).await.unwrap();
    assert_eq!(olt.resources().len(ResourceKind::AllocId), 2);
}

#[tokio::test]
async fn test_same_onu_may_reuse_its_alloc_id() {
    let server = server(config(1, 1));
    let olt = olt(&server);
    let mut rx = enabled(&server).await;
    activate(&server, &mut rx, 0, 1).await;

    server.flow_add(flow(1, 1, 100, 50)).await.unwrap();
    server.flow_add(flow(2, 1, 100, 50)).await.unwrap();
    assert_eq!(olt.find_onu(0, 1).unwrap().flows().len(), 2);

    server.flow_remove(flow(1, 1, 100, 50)).await.unwrap();
    server.flow_remove(flow(2, 1, 100, 50)).await.unwrap();
    assert!(olt.resources().is_empty());
}

#[tokio::test]
async fn test_enable_then_disable_pon() {
    let server = server(config(1, 2));
    let olt = olt(&server);
    let mut rx = enabled(&server).await;
    activate(&server, &mut rx, 0, 1).await;
    activate(&server, &mut rx, 0, 2).await;

    server.enable_pon_if(InterfaceRequest { intf_id: 0 }).await.unwrap();
    server.disable_pon_if(InterfaceRequest { intf_id: 0 }).await.unwrap();

    let mut pon_down = false;
    let mut onu_downs = 0;
    let seen = read_until(&mut rx, |ind| {
        match ind {
            Indication::Intf { intf_id: 0, oper_state: OperState::Down } => pon_down = true,
            Indication::Onu(onu) if onu.oper_state == OperState::Down => onu_downs += 1,
            _ => {}
        }
        pon_down && onu_downs == 2
    })
    .await;

    // The PON was already up, so enabling it again announces nothing for the port.
    assert!(!seen.contains(&Indication::Intf { intf_id: 0, oper_state: OperState::Up }));

    let pon = olt.pon(0).unwrap();
    eventually(|| olt.onus().all(|onu| onu.internal_state() == OnuState::PonDisabled)).await;
    assert_eq!(pon.internal_state(), PonState::Disabled);
    assert_eq!(pon.oper_state(), OperState::Down);

    let status = server.flow_add(flow(1, 1, 100, 50)).await.unwrap_err();
    assert_eq!(status.code(), Code::Unavailable);
}

#[tokio::test]
async fn test_reset_pon_drops_its_resources() {
    let server = server(config(1, 1));
    let olt = olt(&server);
    let mut rx = enabled(&server).await;
    activate(&server, &mut rx, 0, 1).await;
    server.flow_add(flow(1, 1, 100, 50)).await.unwrap();

    server.disable_pon_if(InterfaceRequest { intf_id: 0 }).await.unwrap();
    eventually(|| olt.pon(0).unwrap().internal_state() == PonState::Disabled).await;

    server.reset_pon(0).await.unwrap();
    assert!(olt.resources().is_empty());
    assert_eq!(olt.flow_count(), 0);
    assert!(olt.find_onu(0, 1).unwrap().flows().is_empty());
}

#[tokio::test]
async fn test_delete_onu_rediscovers_it() {
    let server = server(config(1, 1));
    let olt = olt(&server);
    let mut rx = enabled(&server).await;
    activate(&server, &mut rx, 0, 1).await;

    server.delete_onu(onu_request(&olt, 0, 1)).await.unwrap();
    let seen = read_until(&mut rx, |ind| matches!(ind, Indication::OnuDisc(_))).await;
    assert!(matches!(
        seen.first(),
        Some(Indication::Onu(onu)) if onu.oper_state == OperState::Down
    ));
    assert_eq!(olt.find_onu(0, 1).unwrap().internal_state(), OnuState::Created);
}

#[tokio::test]
async fn test_omci_request_gets_a_response() {
    let server = server(config(1, 1));
    let mut rx = enabled(&server).await;
    activate(&server, &mut rx, 0, 1).await;

    server
        .omci_msg_out(OmciMessage {
            intf_id: 0,
            onu_id: 1,
            pkt: omci_request(7),
        })
        .await
        .unwrap();

    match next(&mut rx).await {
        Indication::Omci(omci) => {
            assert_eq!(omci.onu_id, 1);
            assert_eq!(&omci.pkt[..2], &7u16.to_be_bytes());
            assert_eq!(omci.pkt[2] & 0x40, 0, "AR cleared");
            assert_eq!(omci.pkt[2] & 0x20, 0x20, "AK set");
        }
        other => panic!("expected an omci indication, got {:?}", other),
    }
}

#[tokio::test]
async fn test_omci_responses_can_be_dropped() {
    let mut config = config(1, 1);
    config.olt.omci_response_rate = 0;
    let server = server(config);
    let mut rx = enabled(&server).await;
    activate(&server, &mut rx, 0, 1).await;

    server
        .omci_msg_out(OmciMessage {
            intf_id: 0,
            onu_id: 1,
            pkt: omci_request(1),
        })
        .await
        .unwrap();
    server.flow_add(flow(1, 1, 100, 50)).await.unwrap();

    // The ONU handles its messages in order, so the flow update comes first
    // only if the request produced nothing.
    assert!(matches!(next(&mut rx).await, Indication::FlowUpdate(_)));
}

#[tokio::test]
async fn test_malformed_omci_is_not_forwarded() {
    let server = server(config(1, 1));
    let mut rx = enabled(&server).await;
    activate(&server, &mut rx, 0, 1).await;

    let status = server
        .omci_msg_out(OmciMessage {
            intf_id: 0,
            onu_id: 1,
            pkt: vec![0, 1, 2],
        })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);

    server.flow_add(flow(1, 1, 100, 50)).await.unwrap();
    assert!(matches!(next(&mut rx).await, Indication::FlowUpdate(_)));
}
