//! Configuration file support for oltsimd
//!
//! Loads and validates the simulated chassis description from TOML files.
//! Default location: /etc/oltsim/oltsim.toml

use crate::error::{OltError, Result};
use oltsim_common::{Backpressure, ChannelConfig};
use oltsim_types::{ControlledActivation, PonTechnology};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/oltsim/oltsim.toml";

// Serial numbers and service MACs carry the PON and ONU IDs in one byte
// each, and UNI port numbers pack the ONU and UNI IDs into 8 and 4 bits.
pub const MAX_PON_PORTS: u32 = 256;
pub const MAX_ONU_ID: u32 = 255;
pub const MAX_UNI_PORTS: u32 = 16;
pub const MAX_SERVICES: usize = 256;

/// Chassis topology and identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OltSection {
    #[serde(default)]
    pub id: u32,

    #[serde(default = "default_nni_ports")]
    pub nni_ports: u32,

    /// NNI speed in Mbps
    #[serde(default = "default_nni_speed")]
    pub nni_speed: u32,

    #[serde(default = "default_pon_ports")]
    pub pon_ports: u32,

    #[serde(default = "default_onus_per_pon")]
    pub onus_per_pon: u32,

    #[serde(default = "default_uni_ports")]
    pub uni_ports: u32,

    #[serde(default = "default_vendor")]
    pub vendor: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_hardware_version")]
    pub hardware_version: String,

    #[serde(default = "default_firmware_version")]
    pub firmware_version: String,

    #[serde(default = "default_device_id")]
    pub device_id: String,

    /// Interval between two port statistics indications
    #[serde(default = "default_port_stats_interval")]
    pub port_stats_interval_secs: u64,

    /// Simulated reboot time
    #[serde(default = "default_reboot_delay")]
    pub reboot_delay_ms: u64,

    /// Time given to in-flight RPCs before the channels are closed on reboot
    #[serde(default = "default_reboot_drain")]
    pub reboot_drain_ms: u64,

    /// Upper bound on waiting for the dispatch loops of a replaced session
    #[serde(default = "default_reconnect_grace")]
    pub reconnect_grace_ms: u64,

    /// Delay between two ONU discoveries on the same PON, and before an ONU
    /// is rediscovered after deletion
    #[serde(default)]
    pub onu_discovery_delay_ms: u64,

    /// Number of OMCI requests out of ten that get a response
    #[serde(default = "default_omci_response_rate")]
    pub omci_response_rate: u8,
}

/// Simulator behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorSection {
    /// One of default, only-onu, only-pon, both
    #[serde(default = "default_controlled_activation")]
    pub controlled_activation: String,

    /// Skips flow bookkeeping and telemetry for scale tests
    #[serde(default)]
    pub enable_perf: bool,

    #[serde(default)]
    pub publish_events: bool,

    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Outbound indication stream buffer
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Device channel sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSection {
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    #[serde(default)]
    pub backpressure: Backpressure,
}

/// Periodic statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySection {
    #[serde(default = "default_telemetry_enabled")]
    pub enabled: bool,

    /// JSON-lines file of port statistics samples
    #[serde(default)]
    pub stats_file: Option<PathBuf>,
}

/// Resource ranges shared by a group of PON ports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PonRange {
    pub pon_start: u32,
    pub pon_end: u32,

    #[serde(default)]
    pub technology: PonTechnology,

    #[serde(default = "default_onu_id_start")]
    pub onu_id_start: u32,
    #[serde(default = "default_onu_id_end")]
    pub onu_id_end: u32,

    #[serde(default = "default_alloc_id_start")]
    pub alloc_id_start: u32,
    #[serde(default = "default_alloc_id_end")]
    pub alloc_id_end: u32,

    #[serde(default = "default_gemport_id_start")]
    pub gemport_id_start: u32,
    #[serde(default = "default_gemport_id_end")]
    pub gemport_id_end: u32,
}

impl PonRange {
    pub fn contains(&self, pon_id: u32) -> bool {
        (self.pon_start..=self.pon_end).contains(&pon_id)
    }

    pub fn onu_id_count(&self) -> u32 {
        self.onu_id_end.saturating_sub(self.onu_id_start) + 1
    }

    fn default_for(pon_ports: u32) -> Self {
        Self {
            pon_start: 0,
            pon_end: pon_ports.saturating_sub(1),
            technology: PonTechnology::default(),
            onu_id_start: default_onu_id_start(),
            onu_id_end: default_onu_id_end(),
            alloc_id_start: default_alloc_id_start(),
            alloc_id_end: default_alloc_id_end(),
            gemport_id_start: default_gemport_id_start(),
            gemport_id_end: default_gemport_id_end(),
        }
    }
}

/// A subscriber service instantiated on every UNI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
}

/// Complete oltsimd configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OltSimConfig {
    #[serde(default)]
    pub olt: OltSection,

    #[serde(default)]
    pub simulator: SimulatorSection,

    #[serde(default)]
    pub channel: ChannelSection,

    #[serde(default)]
    pub telemetry: TelemetrySection,

    #[serde(default)]
    pub pon_ranges: Vec<PonRange>,

    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

// Default functions
fn default_nni_ports() -> u32 {
    1
}

fn default_nni_speed() -> u32 {
    10000
}

fn default_pon_ports() -> u32 {
    1
}

fn default_onus_per_pon() -> u32 {
    1
}

fn default_uni_ports() -> u32 {
    1
}

fn default_vendor() -> String {
    "BBSim".to_string()
}

fn default_model() -> String {
    "asfvolt16".to_string()
}

fn default_hardware_version() -> String {
    "emulated".to_string()
}

fn default_firmware_version() -> String {
    "0.1.0".to_string()
}

fn default_device_id() -> String {
    "0a:0a:0a:0a:0a:00".to_string()
}

fn default_port_stats_interval() -> u64 {
    20
}

fn default_reboot_delay() -> u64 {
    60_000
}

fn default_reboot_drain() -> u64 {
    1000
}

fn default_reconnect_grace() -> u64 {
    1000
}

fn default_omci_response_rate() -> u8 {
    10
}

fn default_controlled_activation() -> String {
    "default".to_string()
}

fn default_event_buffer() -> usize {
    100
}

fn default_stream_buffer() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_queue_depth() -> usize {
    1024
}

fn default_telemetry_enabled() -> bool {
    true
}

fn default_onu_id_start() -> u32 {
    1
}

fn default_onu_id_end() -> u32 {
    255
}

fn default_alloc_id_start() -> u32 {
    1024
}

fn default_alloc_id_end() -> u32 {
    16383
}

fn default_gemport_id_start() -> u32 {
    1024
}

fn default_gemport_id_end() -> u32 {
    65535
}

// Default implementations
impl Default for OltSection {
    fn default() -> Self {
        Self {
            id: 0,
            nni_ports: default_nni_ports(),
            nni_speed: default_nni_speed(),
            pon_ports: default_pon_ports(),
            onus_per_pon: default_onus_per_pon(),
            uni_ports: default_uni_ports(),
            vendor: default_vendor(),
            model: default_model(),
            hardware_version: default_hardware_version(),
            firmware_version: default_firmware_version(),
            device_id: default_device_id(),
            port_stats_interval_secs: default_port_stats_interval(),
            reboot_delay_ms: default_reboot_delay(),
            reboot_drain_ms: default_reboot_drain(),
            reconnect_grace_ms: default_reconnect_grace(),
            onu_discovery_delay_ms: 0,
            omci_response_rate: default_omci_response_rate(),
        }
    }
}

impl Default for SimulatorSection {
    fn default() -> Self {
        Self {
            controlled_activation: default_controlled_activation(),
            enable_perf: false,
            publish_events: false,
            event_buffer: default_event_buffer(),
            stream_buffer: default_stream_buffer(),
            log_level: default_log_level(),
        }
    }
}

impl Default for ChannelSection {
    fn default() -> Self {
        Self {
            queue_depth: default_queue_depth(),
            backpressure: Backpressure::default(),
        }
    }
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            enabled: default_telemetry_enabled(),
            stats_file: None,
        }
    }
}

impl OltSimConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => {
                let config = toml::from_str(&content).map_err(|e| {
                    OltError::Configuration(format!(
                        "Failed to parse config file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(OltError::Io(e)),
        }
    }

    /// Load from default location or defaults
    pub fn load() -> Result<Self> {
        Self::load_or_default(DEFAULT_CONFIG_PATH)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            OltError::Configuration(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(path.as_ref(), content)?;

        Ok(())
    }

    /// Activation mode, falling back to `default` on an unknown value
    pub fn activation_mode(&self) -> ControlledActivation {
        self.simulator
            .controlled_activation
            .parse()
            .unwrap_or_else(|e| {
                warn!(error = %e, "unknown controlled activation mode, using default");
                ControlledActivation::Default
            })
    }

    /// Configured PON ranges, or a single default range covering every PON
    pub fn effective_pon_ranges(&self) -> Vec<PonRange> {
        if self.pon_ranges.is_empty() {
            vec![PonRange::default_for(self.olt.pon_ports)]
        } else {
            self.pon_ranges.clone()
        }
    }

    /// Range a PON belongs to
    pub fn pon_range(&self, pon_id: u32) -> Option<PonRange> {
        self.effective_pon_ranges()
            .into_iter()
            .find(|range| range.contains(pon_id))
    }

    /// Names of the services instantiated on each UNI
    pub fn service_names(&self) -> Vec<String> {
        if self.services.is_empty() {
            vec!["hsia".to_string()]
        } else {
            self.services.iter().map(|s| s.name.clone()).collect()
        }
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig::default()
            .with_queue_depth(self.channel.queue_depth)
            .with_backpressure(self.channel.backpressure)
    }

    pub fn port_stats_interval(&self) -> Duration {
        Duration::from_secs(self.olt.port_stats_interval_secs)
    }

    pub fn reboot_delay(&self) -> Duration {
        Duration::from_millis(self.olt.reboot_delay_ms)
    }

    pub fn reboot_drain(&self) -> Duration {
        Duration::from_millis(self.olt.reboot_drain_ms)
    }

    pub fn reconnect_grace(&self) -> Duration {
        Duration::from_millis(self.olt.reconnect_grace_ms)
    }

    pub fn onu_discovery_delay(&self) -> Duration {
        Duration::from_millis(self.olt.onu_discovery_delay_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.olt.pon_ports == 0 {
            return Err(OltError::Configuration("pon_ports must be > 0".to_string()));
        }

        if self.olt.nni_ports == 0 {
            return Err(OltError::Configuration("nni_ports must be > 0".to_string()));
        }

        if self.olt.pon_ports > MAX_PON_PORTS {
            return Err(OltError::Configuration(format!(
                "pon_ports must be <= {}",
                MAX_PON_PORTS
            )));
        }

        if self.olt.uni_ports == 0 || self.olt.uni_ports > MAX_UNI_PORTS {
            return Err(OltError::Configuration(format!(
                "uni_ports must be 1-{}",
                MAX_UNI_PORTS
            )));
        }

        if self.services.len() > MAX_SERVICES {
            return Err(OltError::Configuration(format!(
                "at most {} services per uni",
                MAX_SERVICES
            )));
        }

        if self.channel.queue_depth == 0 {
            return Err(OltError::Configuration("queue_depth must be > 0".to_string()));
        }

        if self.olt.omci_response_rate > 10 {
            return Err(OltError::Configuration(
                "omci_response_rate must be 0-10".to_string(),
            ));
        }

        for range in &self.effective_pon_ranges() {
            if range.pon_start > range.pon_end
                || range.onu_id_start > range.onu_id_end
                || range.alloc_id_start > range.alloc_id_end
                || range.gemport_id_start > range.gemport_id_end
            {
                return Err(OltError::Configuration(format!(
                    "inverted range for pons {}-{}",
                    range.pon_start, range.pon_end
                )));
            }
            if range.onu_id_end > MAX_ONU_ID {
                return Err(OltError::Configuration(format!(
                    "onu_id_end ({}) for pons {}-{} must be <= {}",
                    range.onu_id_end, range.pon_start, range.pon_end, MAX_ONU_ID
                )));
            }
        }

        for pon_id in 0..self.olt.pon_ports {
            let range = self.pon_range(pon_id).ok_or_else(|| {
                OltError::Configuration(format!("pon {} is not covered by any pon_ranges entry", pon_id))
            })?;
            if range.onu_id_count() < self.olt.onus_per_pon {
                return Err(OltError::Configuration(format!(
                    "onus_per_pon ({}) exceeds the onu id range of pon {} ({})",
                    self.olt.onus_per_pon,
                    pon_id,
                    range.onu_id_count()
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = OltSimConfig::default();
        assert_eq!(config.olt.pon_ports, 1);
        assert_eq!(config.olt.nni_speed, 10000);
        assert_eq!(config.channel.queue_depth, 1024);
        assert_eq!(config.channel.backpressure, Backpressure::Block);
        assert!(config.telemetry.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duration_getters() {
        let config = OltSimConfig::default();
        assert_eq!(config.port_stats_interval(), Duration::from_secs(20));
        assert_eq!(config.reboot_delay(), Duration::from_secs(60));
        assert_eq!(config.reboot_drain(), Duration::from_secs(1));
        assert_eq!(config.onu_discovery_delay(), Duration::ZERO);
    }

    #[test]
    fn test_default_pon_range_covers_all_pons() {
        let mut config = OltSimConfig::default();
        config.olt.pon_ports = 4;
        let ranges = config.effective_pon_ranges();
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].pon_end, 3);
        assert_eq!(config.pon_range(3).unwrap().alloc_id_start, 1024);
        assert!(config.pon_range(4).is_none());
    }

    #[test]
    fn test_activation_mode_fallback() {
        let mut config = OltSimConfig::default();
        config.simulator.controlled_activation = "only-pon".to_string();
        assert_eq!(config.activation_mode(), ControlledActivation::OnlyPon);

        config.simulator.controlled_activation = "sometimes".to_string();
        assert_eq!(config.activation_mode(), ControlledActivation::Default);
    }

    #[test]
    fn test_validate_onus_exceed_range() {
        let mut config = OltSimConfig::default();
        config.olt.onus_per_pon = 8;
        config.pon_ranges = vec![PonRange {
            onu_id_end: 4,
            ..PonRange::default_for(1)
        }];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_uncovered_pon() {
        let mut config = OltSimConfig::default();
        config.olt.pon_ports = 2;
        config.pon_ranges = vec![PonRange::default_for(1)];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_inverted_range() {
        let mut config = OltSimConfig::default();
        config.pon_ranges = vec![PonRange {
            alloc_id_start: 2000,
            alloc_id_end: 1000,
            ..PonRange::default_for(1)
        }];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_onu_id_beyond_one_byte() {
        let mut config = OltSimConfig::default();
        config.olt.onus_per_pon = 257;
        config.pon_ranges = vec![PonRange {
            onu_id_end: 300,
            ..PonRange::default_for(1)
        }];
        assert!(config.validate().is_err());

        config.olt.onus_per_pon = 255;
        config.pon_ranges[0].onu_id_end = MAX_ONU_ID;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_pon_count_bound() {
        let mut config = OltSimConfig::default();
        config.olt.pon_ports = MAX_PON_PORTS + 1;
        assert!(config.validate().is_err());

        config.olt.pon_ports = MAX_PON_PORTS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_uni_count_bound() {
        let mut config = OltSimConfig::default();
        config.olt.uni_ports = MAX_UNI_PORTS + 1;
        assert!(config.validate().is_err());

        config.olt.uni_ports = 0;
        assert!(config.validate().is_err());

        config.olt.uni_ports = MAX_UNI_PORTS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_service_count_bound() {
        let mut config = OltSimConfig::default();
        config.services = (0..=MAX_SERVICES)
            .map(|i| ServiceConfig {
                name: format!("svc-{}", i),
            })
            .collect();
        assert!(config.validate().is_err());

        config.services.pop();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_ports() {
        let mut config = OltSimConfig::default();
        config.olt.nni_ports = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
[olt]
id = 3
pon_ports = 2
onus_per_pon = 4

[simulator]
controlled_activation = "both"

[channel]
queue_depth = 16
backpressure = "reject"

[[pon_ranges]]
pon_start = 0
pon_end = 1
technology = "XGS-PON"
alloc_id_start = 256

[[services]]
name = "hsia"

[[services]]
name = "voip"
"#;
        let config: OltSimConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.olt.id, 3);
        assert_eq!(config.olt.pon_ports, 2);
        assert_eq!(config.activation_mode(), ControlledActivation::Both);
        assert_eq!(config.channel.backpressure, Backpressure::Reject);
        assert_eq!(config.pon_ranges[0].technology, PonTechnology::XgsPon);
        assert_eq!(config.pon_ranges[0].alloc_id_start, 256);
        assert_eq!(config.pon_ranges[0].gemport_id_end, 65535);
        assert_eq!(config.service_names(), vec!["hsia".to_string(), "voip".to_string()]);
        // Unspecified values should use defaults
        assert_eq!(config.olt.nni_ports, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oltsim.toml");

        let mut config = OltSimConfig::default();
        config.olt.onus_per_pon = 16;
        config.save(&path).unwrap();

        let loaded = OltSimConfig::load_or_default(&path).unwrap();
        assert_eq!(loaded.olt.onus_per_pon, 16);
    }

    #[test]
    fn test_load_nonexistent_file_defaults() {
        let config = OltSimConfig::load_or_default("/nonexistent/oltsim.toml").unwrap();
        assert_eq!(config.olt.pon_ports, 1);
    }
}
