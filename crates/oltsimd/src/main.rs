//! OLT simulator daemon entry point.

use anyhow::{Context, Result};
use clap::Parser;
use oltsimd::{Olt, OltServer, OltSimConfig, OpenOltService};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Simulated OLT with PON ports and ONUs
#[derive(Parser, Debug)]
#[command(name = "oltsimd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = oltsimd::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error), overrides the config file
    #[arg(short = 'l', long)]
    log_level: Option<String>,

    /// Number of PON ports, overrides the config file
    #[arg(long)]
    pon_ports: Option<u32>,

    /// Number of ONUs per PON port, overrides the config file
    #[arg(long)]
    onus_per_pon: Option<u32>,

    /// Open a local session and log every indication as JSON
    #[arg(long)]
    watch: bool,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .init();
}

fn load_config(args: &Args) -> Result<OltSimConfig> {
    let mut config = OltSimConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    if let Some(level) = &args.log_level {
        config.simulator.log_level = level.clone();
    }
    if let Some(pon_ports) = args.pon_ports {
        config.olt.pon_ports = pon_ports;
    }
    if let Some(onus_per_pon) = args.onus_per_pon {
        config.olt.onus_per_pon = onus_per_pon;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

async fn watch(server: OltServer) {
    let mut indications = match server.enable_indication().await {
        Ok(indications) => indications,
        Err(status) => {
            error!(code = ?status.code(), message = status.message(), "failed to open session");
            return;
        }
    };

    while let Some(item) = indications.next().await {
        match item {
            Ok(indication) => match serde_json::to_string(&indication) {
                Ok(json) => info!(kind = indication.kind(), "{}", json),
                Err(e) => warn!(error = %e, "failed to encode indication"),
            },
            Err(status) => warn!(code = ?status.code(), message = status.message(), "stream error"),
        }
    }
    info!("indication stream closed");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    init_logging(&config.simulator.log_level);

    info!(
        olt_id = config.olt.id,
        nni_ports = config.olt.nni_ports,
        pon_ports = config.olt.pon_ports,
        onus_per_pon = config.olt.onus_per_pon,
        mode = %config.activation_mode(),
        perf = config.simulator.enable_perf,
        "starting oltsimd"
    );

    let olt = Olt::new(config).context("building simulated olt")?;
    let server = OltServer::new(Arc::clone(&olt));
    info!(
        serial = olt.serial_number(),
        signature = olt.signature(),
        "olt initialized"
    );

    if args.watch {
        tokio::spawn(watch(server));
    }

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("oltsimd shutting down");
    Ok(())
}
