//! Helpers shared by the integration tests.

#![allow(dead_code)]

use oltsim_types::openolt::OnuRequest;
use oltsim_types::{Flow, FlowType, Indication};
use oltsimd::{IndicationReceiver, Olt, OltServer, OltSimConfig, OnuState, OpenOltService};
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;

/// How long a test waits for an indication before failing.
pub const WAIT: Duration = Duration::from_secs(5);

/// A small chassis with fast reboots and no periodic statistics.
pub fn config(pon_ports: u32, onus_per_pon: u32) -> OltSimConfig {
    let mut config = OltSimConfig::default();
    config.olt.pon_ports = pon_ports;
    config.olt.onus_per_pon = onus_per_pon;
    config.olt.reboot_delay_ms = 0;
    config.olt.reboot_drain_ms = 0;
    config.olt.reconnect_grace_ms = 1000;
    config.telemetry.enabled = false;
    config
}

pub fn server(config: OltSimConfig) -> OltServer {
    OltServer::new(Olt::new(config).expect("valid test config"))
}

pub fn olt(server: &OltServer) -> Arc<Olt> {
    Arc::clone(server.olt())
}

/// Next indication, failing the test if none arrives in time.
pub async fn next(rx: &mut IndicationReceiver) -> Indication {
    tokio::time::timeout(WAIT, rx.next())
        .await
        .expect("timed out waiting for an indication")
        .expect("indication stream ended")
        .expect("indication stream error")
}

/// Reads exactly `count` indications.
pub async fn take(rx: &mut IndicationReceiver, count: usize) -> Vec<Indication> {
    let mut seen = Vec::with_capacity(count);
    for _ in 0..count {
        seen.push(next(rx).await);
    }
    seen
}

/// Reads indications until `done` returns true for one of them. Returns
/// everything read, the matching indication last.
pub async fn read_until<F>(rx: &mut IndicationReceiver, mut done: F) -> Vec<Indication>
where
    F: FnMut(&Indication) -> bool,
{
    let mut seen = Vec::new();
    loop {
        let ind = next(rx).await;
        let stop = done(&ind);
        seen.push(ind);
        if stop {
            return seen;
        }
    }
}

/// Reads until `count` indications matched `pred`.
pub async fn read_matching<F>(rx: &mut IndicationReceiver, count: usize, mut pred: F) -> Vec<Indication>
where
    F: FnMut(&Indication) -> bool,
{
    let mut matched = 0;
    read_until(rx, |ind| {
        if pred(ind) {
            matched += 1;
        }
        matched == count
    })
    .await
}

/// Returns true if nothing arrives on the stream within `wait`.
pub async fn stays_quiet(rx: &mut IndicationReceiver, wait: Duration) -> bool {
    tokio::time::timeout(wait, rx.next()).await.is_err()
}

/// Waits for the stream to end, failing the test if it does not.
pub async fn ends(rx: &mut IndicationReceiver) {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        match tokio::time::timeout_at(deadline, rx.next()).await {
            Ok(None) => return,
            Ok(Some(_)) => continue,
            Err(_) => panic!("indication stream did not end"),
        }
    }
}

/// Polls `cond` until it holds.
pub async fn eventually<F: FnMut() -> bool>(mut cond: F) {
    tokio::time::timeout(WAIT, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition never became true");
}

pub fn onu_request(olt: &Olt, pon_id: u32, onu_id: u32) -> OnuRequest {
    let onu = olt.find_onu(pon_id, onu_id).expect("onu exists");
    OnuRequest {
        intf_id: pon_id,
        onu_id,
        serial_number: onu.serial_number(),
    }
}

/// Opens a session on a default-mode chassis and reads up to the discovery
/// of every ONU.
pub async fn enabled(server: &OltServer) -> IndicationReceiver {
    let onus = server.olt().onus().count();
    let mut rx = server.enable_indication().await.expect("session opens");
    read_matching(&mut rx, onus, |ind| matches!(ind, Indication::OnuDisc(_))).await;
    rx
}

/// Activates an ONU and reads its ONU-up indication.
pub async fn activate(server: &OltServer, rx: &mut IndicationReceiver, pon_id: u32, onu_id: u32) {
    let req = onu_request(server.olt(), pon_id, onu_id);
    server.activate_onu(req).await.expect("onu activates");
    read_until(rx, |ind| matches!(ind, Indication::Onu(onu) if onu.onu_id == onu_id && onu.intf_id == pon_id)).await;
    assert_eq!(
        server.olt().find_onu(pon_id, onu_id).unwrap().internal_state(),
        OnuState::Enabled
    );
}

pub fn flow(flow_id: u64, onu_id: u32, alloc_id: u32, gemport_id: u32) -> Flow {
    Flow {
        flow_id,
        access_intf_id: Some(0),
        onu_id,
        uni_id: 0,
        port_no: onu_id << 4,
        alloc_id,
        gemport_id,
        flow_type: FlowType::Upstream,
        ..Default::default()
    }
}

/// Minimal 802.1Q-tagged EAPOL frame addressed to `dst`.
pub fn eapol_frame(dst: [u8; 6]) -> Vec<u8> {
    let mut pkt = dst.to_vec();
    pkt.extend_from_slice(&[0x2e, 0x60, 0x00, 0x00, 0x00, 0x01]);
    pkt.extend_from_slice(&[0x81, 0x00, 0x00, 0x64]);
    pkt.extend_from_slice(&[0x88, 0x8e, 0x01, 0x00, 0x00, 0x00]);
    pkt
}

/// Baseline OMCI request with the AR bit set.
pub fn omci_request(transaction_id: u16) -> Vec<u8> {
    let mut pkt = vec![0u8; 48];
    pkt[..2].copy_from_slice(&transaction_id.to_be_bytes());
    pkt[2..8].copy_from_slice(&[0x49, 0x0a, 0x00, 0x02, 0x00, 0x00]);
    pkt
}
