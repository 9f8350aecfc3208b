//! The daemon's TOML configuration and its mapping onto the engine's
//! configuration structures.

use std::{
    fs::read_to_string,
    net::IpAddr,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

use arrayvec::ArrayVec;
use log::warn;
use nanosync::{
    config::{
        ClockIdentity, DelayMechanism, InstanceConfig, LeapAction, TransportAddress,
        TransportMode, UnicastMaster,
    },
    servo::{DisciplineConfig, DtMode, OutlierFilterConfig, ServoConfig},
    time::{Duration, Interval},
};
use serde::{Deserialize, Deserializer};
use timestamped_socket::interface::InterfaceName;

use crate::{acl::AclOrder, tracing::LogLevel, transport::NetworkMode};

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub loglevel: LogLevel,
    #[serde(default = "default_domain")]
    pub domain: u8,
    #[serde(default, deserialize_with = "deserialize_clock_identity")]
    pub identity: Option<ClockIdentity>,
    #[serde(default = "default_priority1")]
    pub priority1: u8,
    #[serde(default = "default_priority2")]
    pub priority2: u8,
    #[serde(default)]
    pub slave_only: bool,
    #[serde(default = "default_two_step")]
    pub two_step: bool,
    #[serde(default)]
    pub frequency_file: Option<PathBuf>,
    #[serde(default)]
    pub leap_seconds_file: Option<PathBuf>,
    #[serde(rename = "port")]
    pub ports: Vec<PortConfig>,
    #[serde(default)]
    pub servo: ServoSection,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PortConfig {
    pub interface: InterfaceName,
    #[serde(default)]
    pub network_mode: NetworkMode,
    #[serde(default)]
    pub hardware_clock: Option<u32>,
    #[serde(default)]
    pub monitor_only: bool,
    #[serde(default, deserialize_with = "deserialize_acceptable_master_list")]
    pub acceptable_master_list: Option<Vec<ClockIdentity>>,
    #[serde(default = "default_announce_interval")]
    pub announce_interval: i8,
    #[serde(default = "default_sync_interval")]
    pub sync_interval: i8,
    #[serde(default = "default_announce_receipt_timeout")]
    pub announce_receipt_timeout: u8,
    #[serde(default)]
    pub master_only: bool,
    #[serde(default)]
    pub delay_asymmetry: i64,
    #[serde(default)]
    pub ingress_latency: i64,
    #[serde(default)]
    pub egress_latency: i64,
    #[serde(default)]
    pub offset_correction: i64,
    #[serde(default)]
    pub delay_mechanism: DelayType,
    #[serde(default = "default_delay_interval")]
    pub delay_interval: i8,
    #[serde(default)]
    pub transport_mode: TransportModeConfig,
    #[serde(default)]
    pub unicast_negotiation: bool,
    #[serde(default)]
    pub unicast_accept_any: bool,
    #[serde(default)]
    pub unicast_masters: Vec<UnicastMasterConfig>,
    #[serde(default = "default_unicast_grant_duration")]
    pub unicast_grant_duration: u32,
    #[serde(default = "default_true")]
    pub sync_sequence_checking: bool,
    #[serde(default = "default_clock_update_timeout")]
    pub clock_update_timeout: u32,
    #[serde(default)]
    pub calibration_delay: u32,
    #[serde(default)]
    pub leap_second_smear: u32,
    #[serde(default = "default_leap_pause_period")]
    pub leap_pause_period: u32,
    #[serde(default)]
    pub panic_mode: bool,
    #[serde(default = "default_panic_mode_duration")]
    pub panic_mode_duration: u32,
    #[serde(default = "default_transport_fault_timeout")]
    pub transport_fault_timeout: u32,
    #[serde(default = "default_clock_fault_timeout")]
    pub clock_fault_timeout: u32,
    #[serde(default)]
    pub acl_permit: Vec<String>,
    #[serde(default)]
    pub acl_deny: Vec<String>,
    #[serde(default)]
    pub acl_order: AclOrder,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct UnicastMasterConfig {
    pub address: IpAddr,
    #[serde(default = "default_local_preference")]
    pub local_preference: u8,
}

#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum DelayType {
    #[default]
    E2E,
    P2P,
}

#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportModeConfig {
    #[default]
    Multicast,
    Hybrid,
    Unicast,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ServoSection {
    #[serde(default)]
    pub kp: Option<f64>,
    #[serde(default)]
    pub ki: Option<f64>,
    #[serde(default = "default_max_ppb")]
    pub max_ppb: f64,
    #[serde(default = "default_delay_filter_stiffness")]
    pub delay_filter_stiffness: u8,
    #[serde(default)]
    pub outlier_filter: bool,
    #[serde(default = "default_outlier_threshold")]
    pub outlier_threshold: f64,
    #[serde(default = "default_outlier_weight")]
    pub outlier_weight: f64,
    #[serde(default = "default_true")]
    pub outlier_autotune: bool,
    #[serde(default)]
    pub step_level: f64,
    #[serde(default = "default_step_threshold")]
    pub step_threshold: i64,
    #[serde(default)]
    pub no_step: bool,
    #[serde(default)]
    pub step_once: bool,
    #[serde(default = "default_true")]
    pub step_backwards: bool,
    #[serde(default = "default_adev_period")]
    pub adev_period: u32,
    #[serde(default = "default_stable_adev")]
    pub stable_adev: f64,
    #[serde(default = "default_unstable_adev")]
    pub unstable_adev: f64,
    #[serde(default = "default_locked_age")]
    pub locked_age: u32,
    #[serde(default = "default_holdover_age")]
    pub holdover_age: u32,
}

impl Default for ServoSection {
    fn default() -> Self {
        toml::from_str("").expect("the empty servo section deserializes")
    }
}

fn deserialize_acceptable_master_list<'de, D>(
    deserializer: D,
) -> Result<Option<Vec<ClockIdentity>>, D::Error>
where
    D: Deserializer<'de>,
{
    use hex::FromHex;
    use serde::de::Error;

    let raw: Vec<String> = Deserialize::deserialize(deserializer)?;
    let mut result = Vec::with_capacity(raw.len());

    for identity in raw {
        result.push(ClockIdentity(<[u8; 8]>::from_hex(identity).map_err(
            |e| D::Error::custom(format!("Invalid clock identifier: {}", e)),
        )?));
    }

    Ok(Some(result))
}

fn deserialize_clock_identity<'de, D>(deserializer: D) -> Result<Option<ClockIdentity>, D::Error>
where
    D: Deserializer<'de>,
{
    use hex::FromHex;
    use serde::de::Error;
    let raw: String = Deserialize::deserialize(deserializer)?;
    Ok(Some(ClockIdentity(<[u8; 8]>::from_hex(raw).map_err(
        |e| D::Error::custom(format!("Invalid clock identifier: {}", e)),
    )?)))
}

impl Config {
    /// Parse the config from a file
    pub fn from_file(file: &Path) -> Result<Config, ConfigError> {
        let meta = std::fs::metadata(file).map_err(ConfigError::Io)?;
        let perm = meta.permissions();

        if perm.mode() as libc::mode_t & libc::S_IWOTH != 0 {
            warn!("Unrestricted config file permissions: Others can write.");
        }

        let contents = read_to_string(file).map_err(ConfigError::Io)?;
        let config: Config = toml::de::from_str(&contents).map_err(ConfigError::Toml)?;
        config.warn_when_unreasonable();
        Ok(config)
    }

    /// Warns about unreasonable config values
    pub fn warn_when_unreasonable(&self) {
        if self.ports.is_empty() {
            warn!("No port configured.");
        }

        if self.ports.len() > 1 {
            warn!("Multiple ports configured; this ordinary clock uses only the first.");
        }

        for port in &self.ports {
            if port.unicast_negotiation
                && matches!(port.transport_mode, TransportModeConfig::Unicast)
                && port.unicast_masters.is_empty()
                && !port.master_only
            {
                warn!("Unicast negotiation without configured masters; this node can only serve.");
            }
        }
    }

    /// The engine's instance configuration
    pub fn instance_config(&self, clock_identity: ClockIdentity) -> InstanceConfig {
        InstanceConfig {
            clock_identity,
            priority_1: self.priority1,
            priority_2: self.priority2,
            domain_number: self.domain,
            slave_only: self.slave_only,
            two_step: self.two_step,
            ..Default::default()
        }
    }

    /// The engine's servo configuration, defaulted by timestamping flavor
    pub fn servo_config(&self, hardware_timestamping: bool) -> ServoConfig {
        let base = if hardware_timestamping {
            ServoConfig::hardware()
        } else {
            ServoConfig::software()
        };

        let outlier = OutlierFilterConfig {
            enabled: self.servo.outlier_filter,
            threshold: self.servo.outlier_threshold,
            weight: self.servo.outlier_weight.clamp(0.01, 2.0),
            autotune: self.servo.outlier_autotune,
            step_level: self.servo.step_level,
            ..Default::default()
        };

        ServoConfig {
            kp: self.servo.kp.unwrap_or(base.kp),
            ki: self.servo.ki.unwrap_or(base.ki),
            dt_mode: DtMode::Measured,
            max_ppb: self.servo.max_ppb,
            delay_filter_stiffness: self.servo.delay_filter_stiffness,
            offset_outlier_filter: outlier,
            delay_outlier_filter: outlier,
            discipline: DisciplineConfig {
                adev_period: self.servo.adev_period,
                stable_adev: self.servo.stable_adev,
                unstable_adev: self.servo.unstable_adev,
                locked_age: self.servo.locked_age,
                holdover_age: self.servo.holdover_age,
            },
            step_threshold: Duration::from_nanos(self.servo.step_threshold),
            no_step: self.servo.no_step,
            step_once: self.servo.step_once,
            allow_step_backwards: self.servo.step_backwards,
        }
    }
}

impl PortConfig {
    /// The engine's port configuration
    pub fn port_config(&self) -> nanosync::config::PortConfig<Option<Vec<ClockIdentity>>> {
        let mut unicast_masters = ArrayVec::new();
        for master in self.unicast_masters.iter().take(unicast_masters.capacity()) {
            unicast_masters.push(UnicastMaster {
                address: match master.address {
                    IpAddr::V4(ip) => TransportAddress::from_ipv4(ip.octets()),
                    IpAddr::V6(ip) => TransportAddress::from_ipv6(ip.octets()),
                },
                local_preference: master.local_preference,
            });
        }

        nanosync::config::PortConfig {
            acceptable_master_list: self.acceptable_master_list.clone(),
            delay_mechanism: match self.delay_mechanism {
                DelayType::E2E => DelayMechanism::E2E {
                    interval: Interval::from_log_2(self.delay_interval),
                },
                DelayType::P2P => DelayMechanism::P2P {
                    interval: Interval::from_log_2(self.delay_interval),
                },
            },
            announce_interval: Interval::from_log_2(self.announce_interval),
            announce_receipt_timeout: self.announce_receipt_timeout,
            sync_interval: Interval::from_log_2(self.sync_interval),
            master_only: self.master_only,
            delay_asymmetry: Duration::from_nanos(self.delay_asymmetry),
            ingress_latency: Duration::from_nanos(self.ingress_latency),
            egress_latency: Duration::from_nanos(self.egress_latency),
            offset_correction: Duration::from_nanos(self.offset_correction),
            transport_mode: match self.transport_mode {
                TransportModeConfig::Multicast => TransportMode::Multicast,
                TransportModeConfig::Hybrid => TransportMode::Hybrid,
                TransportModeConfig::Unicast => TransportMode::Unicast,
            },
            unicast_negotiation: self.unicast_negotiation,
            unicast_accept_any: self.unicast_accept_any,
            unicast_masters,
            unicast_grant_duration: self.unicast_grant_duration,
            unicast_log_max_interval: 4,
            unicast_log_min_interval: -4,
            sync_sequence_checking: self.sync_sequence_checking,
            clock_update_timeout: self.clock_update_timeout,
            calibration_delay: self.calibration_delay,
            leap_action: if self.leap_second_smear > 0 {
                LeapAction::Smear {
                    period: self.leap_second_smear,
                }
            } else {
                LeapAction::Step
            },
            leap_pause_period: self.leap_pause_period,
            panic_mode_duration: if self.panic_mode {
                self.panic_mode_duration
            } else {
                0
            },
            transport_fault_timeout: self.transport_fault_timeout,
            clock_fault_timeout: self.clock_fault_timeout,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Toml(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => writeln!(f, "io error while reading config: {e}"),
            ConfigError::Toml(e) => writeln!(f, "config toml parsing error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

fn default_domain() -> u8 {
    0
}

fn default_announce_interval() -> i8 {
    1
}

fn default_sync_interval() -> i8 {
    0
}

fn default_announce_receipt_timeout() -> u8 {
    3
}

fn default_priority1() -> u8 {
    128
}

fn default_priority2() -> u8 {
    128
}

fn default_two_step() -> bool {
    true
}

fn default_delay_interval() -> i8 {
    0
}

fn default_unicast_grant_duration() -> u32 {
    300
}

fn default_local_preference() -> u8 {
    255
}

fn default_true() -> bool {
    true
}

fn default_clock_update_timeout() -> u32 {
    60
}

fn default_leap_pause_period() -> u32 {
    5
}

fn default_panic_mode_duration() -> u32 {
    30
}

fn default_transport_fault_timeout() -> u32 {
    10
}

fn default_clock_fault_timeout() -> u32 {
    10
}

fn default_max_ppb() -> f64 {
    512_000.0
}

fn default_delay_filter_stiffness() -> u8 {
    6
}

fn default_outlier_threshold() -> f64 {
    1.0
}

fn default_outlier_weight() -> f64 {
    1.0
}

fn default_step_threshold() -> i64 {
    1_000_000_000
}

fn default_adev_period() -> u32 {
    10
}

fn default_stable_adev() -> f64 {
    200.0
}

fn default_unstable_adev() -> f64 {
    2000.0
}

fn default_locked_age() -> u32 {
    10
}

fn default_holdover_age() -> u32 {
    600
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub observation_path: Option<PathBuf>,
    #[serde(default = "default_observation_permissions")]
    pub observation_permissions: u32,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            observation_path: Default::default(),
            observation_permissions: default_observation_permissions(),
        }
    }
}

const fn default_observation_permissions() -> u32 {
    0o666
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    // Minimal amount of config results in default values
    #[test]
    fn minimal_config() {
        const MINIMAL_CONFIG: &str = r#"
[[port]]
interface = "enp0s31f6"
"#;

        let actual: Config = toml::from_str(MINIMAL_CONFIG).unwrap();

        assert_eq!(actual.loglevel, LogLevel::Info);
        assert_eq!(actual.domain, 0);
        assert_eq!(actual.priority1, 128);
        assert_eq!(actual.priority2, 128);
        assert!(actual.two_step);
        assert_eq!(actual.ports.len(), 1);

        let port = &actual.ports[0];
        assert_eq!(port.interface, InterfaceName::from_str("enp0s31f6").unwrap());
        assert_eq!(port.network_mode, NetworkMode::Ipv4);
        assert_eq!(port.announce_interval, 1);
        assert_eq!(port.sync_interval, 0);
        assert_eq!(port.announce_receipt_timeout, 3);
        assert_eq!(port.delay_mechanism, DelayType::E2E);
        assert_eq!(port.transport_mode, TransportModeConfig::Multicast);
        assert!(port.sync_sequence_checking);
    }

    #[test]
    fn unicast_slave_config() {
        const UNICAST_CONFIG: &str = r#"
identity = "0011223344556677"
slave-only = true

[[port]]
interface = "eth0"
transport-mode = "unicast"
unicast-negotiation = true
unicast-masters = [
    { address = "192.0.2.10", local-preference = 10 },
    { address = "192.0.2.11" },
]

[servo]
outlier-filter = true
no-step = true
"#;

        let config: Config = toml::from_str(UNICAST_CONFIG).unwrap();

        assert_eq!(
            config.identity,
            Some(ClockIdentity([0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77]))
        );
        assert!(config.slave_only);

        let port = &config.ports[0];
        assert!(port.unicast_negotiation);
        assert_eq!(port.unicast_masters.len(), 2);
        assert_eq!(port.unicast_masters[0].local_preference, 10);
        assert_eq!(port.unicast_masters[1].local_preference, 255);

        assert!(config.servo.outlier_filter);
        assert!(config.servo.no_step);

        let engine_config = port.port_config();
        assert_eq!(engine_config.unicast_masters.len(), 2);
        assert!(matches!(
            engine_config.delay_mechanism,
            DelayMechanism::E2E { .. }
        ));
    }
}
