//! Periodic port statistics.

use crate::device::{Olt, OltState};
use crate::error::{OltError, Result};
use crate::stream::IndicationStream;
use oltsim_types::{port_number, Indication, InterfaceType, PortStatistics};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Samples generated per port when no statistics file is configured.
const SYNTHETIC_SAMPLES: u64 = 16;

/// Reads statistics samples from a JSON-lines file. Blank lines are skipped.
pub fn load_port_stats(path: impl AsRef<Path>) -> Result<Vec<PortStatistics>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;

    let mut samples = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let sample = serde_json::from_str(line).map_err(|e| {
            OltError::Configuration(format!("{} line {}: {}", path.display(), idx + 1, e))
        })?;
        samples.push(sample);
    }

    if samples.is_empty() {
        return Err(OltError::Configuration(format!(
            "{} holds no statistics samples",
            path.display()
        )));
    }
    info!(path = %path.display(), count = samples.len(), "loaded port statistics");
    Ok(samples)
}

/// Builds a circular sequence with one sample per NNI and PON port per
/// round, with counters growing from round to round.
pub fn synthetic_port_stats(nni_ports: u32, pon_ports: u32) -> Vec<PortStatistics> {
    let ports: Vec<u32> = (0..nni_ports)
        .map(|id| port_number(InterfaceType::Nni, id))
        .chain((0..pon_ports).map(|id| port_number(InterfaceType::Pon, id)))
        .collect();

    let mut samples = Vec::with_capacity(ports.len() * SYNTHETIC_SAMPLES as usize);
    for round in 1..=SYNTHETIC_SAMPLES {
        for intf_id in &ports {
            let packets = round * 1000;
            samples.push(PortStatistics {
                intf_id: *intf_id,
                rx_bytes: packets * 512,
                rx_packets: packets,
                rx_ucast_packets: packets * 9 / 10,
                rx_mcast_packets: packets / 20,
                rx_bcast_packets: packets / 20,
                tx_bytes: packets * 768,
                tx_packets: packets,
                tx_ucast_packets: packets * 9 / 10,
                tx_mcast_packets: packets / 20,
                tx_bcast_packets: packets / 20,
                ..Default::default()
            });
        }
    }
    samples
}

/// Sends one statistics sample per tick while the chassis is enabled,
/// cycling through the loaded samples.
pub(crate) async fn periodic_port_stats(olt: Arc<Olt>, stream: IndicationStream, token: CancellationToken) {
    let period = olt.config().port_stats_interval();
    if olt.stats.is_empty() || period.is_zero() {
        warn!(olt_id = olt.id(), "port statistics disabled");
        return;
    }

    let mut interval = tokio::time::interval(period);
    // The first tick completes immediately.
    interval.tick().await;

    let mut next = 0;
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(olt_id = olt.id(), "stop sending port stats");
                return;
            }
            _ = interval.tick() => {}
        }

        if olt.internal_state() != OltState::Enabled {
            continue;
        }

        let mut sample = olt.stats[next].clone();
        sample.timestamp = u32::try_from(chrono::Utc::now().timestamp()).unwrap_or(u32::MAX);
        stream.send(Indication::PortStats(sample)).await;
        next = (next + 1) % olt.stats.len();
    }
}
