//! Controlled activation modes.

mod common;

use common::*;
use oltsim_types::openolt::InterfaceRequest;
use oltsim_types::{Indication, OperState};
use oltsimd::{OltServer, OpenOltService, PonState, SimulatorControl};
use pretty_assertions::assert_eq;
use std::time::Duration;
use tonic::Code;

const QUIET: Duration = Duration::from_millis(200);

fn server_in(mode: &str) -> OltServer {
    let mut config = config(1, 1);
    config.simulator.controlled_activation = mode.to_string();
    server(config)
}

/// Reads the OLT-up and NNI-up indications every session starts with.
async fn open(server: &OltServer) -> oltsimd::IndicationReceiver {
    let mut rx = server.enable_indication().await.unwrap();
    assert_eq!(next(&mut rx).await, Indication::Olt { oper_state: OperState::Up });
    assert!(matches!(next(&mut rx).await, Indication::IntfOper(_)));
    rx
}

#[tokio::test]
async fn test_only_onu_enables_pons_but_waits_for_power_on() {
    let server = server_in("only-onu");
    let mut rx = open(&server).await;

    assert_eq!(next(&mut rx).await, Indication::Intf { intf_id: 0, oper_state: OperState::Up });
    assert!(matches!(next(&mut rx).await, Indication::IntfOper(_)));
    assert!(stays_quiet(&mut rx, QUIET).await);

    server.power_on_onu(0, 1).await.unwrap();
    assert!(matches!(next(&mut rx).await, Indication::OnuDisc(_)));
}

#[tokio::test]
async fn test_only_pon_waits_for_pon_enable_then_discovers() {
    let server = server_in("only-pon");
    let olt = olt(&server);
    let mut rx = open(&server).await;
    assert!(stays_quiet(&mut rx, QUIET).await);
    assert_eq!(olt.pon(0).unwrap().internal_state(), PonState::Created);

    server.enable_pon_if(InterfaceRequest { intf_id: 0 }).await.unwrap();
    let seen = read_until(&mut rx, |ind| matches!(ind, Indication::OnuDisc(_))).await;
    assert!(seen.contains(&Indication::Intf { intf_id: 0, oper_state: OperState::Up }));
    assert_eq!(olt.pon(0).unwrap().internal_state(), PonState::Enabled);
}

#[tokio::test]
async fn test_both_needs_pon_enable_and_power_on() {
    let server = server_in("both");
    let olt = olt(&server);
    let mut rx = open(&server).await;
    assert!(stays_quiet(&mut rx, QUIET).await);

    server.enable_pon_if(InterfaceRequest { intf_id: 0 }).await.unwrap();
    let mut pon_up = false;
    let mut onu_up = false;
    read_until(&mut rx, |ind| {
        match ind {
            Indication::IntfOper(intf) if intf.oper_state == OperState::Up => pon_up = true,
            Indication::Onu(_) => onu_up = true,
            _ => {}
        }
        pon_up && onu_up
    })
    .await;
    eventually(|| olt.pon(0).unwrap().internal_state() == PonState::Enabled).await;
    assert!(stays_quiet(&mut rx, QUIET).await);

    server.power_on_onu(0, 1).await.unwrap();
    assert!(matches!(next(&mut rx).await, Indication::OnuDisc(_)));
}

#[tokio::test]
async fn test_power_on_of_enabled_onu_is_refused() {
    let server = server(config(1, 1));
    let mut rx = enabled(&server).await;
    activate(&server, &mut rx, 0, 1).await;

    let status = server.power_on_onu(0, 1).await.unwrap_err();
    assert_eq!(status.code(), Code::Unavailable);

    let status = server.power_on_onu(0, 9).await.unwrap_err();
    assert_eq!(status.code(), Code::NotFound);
}
