//! Fleet Config - Broker Section
//! Where Kafka is installed and how many brokers to run from it.

use super::config_def::{ConfigDef, ConfigDefImportance};
use super::{ConfigSet, FleetConfigError};
use crate::broker::broker_config::BrokerConfig;
use crate::broker::BrokerId;
use const_format::concatcp;
use enum_iterator::IntoEnumIterator;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::trace;

// Config Keys
pub const INSTALL_ROOT_PROP: &str = "install.root";
pub const BROKER_BASE_PORT_PROP: &str = "broker.base.port";
pub const BROKER_COUNT_PROP: &str = "broker.count";
pub const BROKER_HOST_PROP: &str = "broker.host";
pub const BROKER_SETTLE_DELAY_MS_PROP: &str = "broker.settle.delay.ms";
pub const BROKER_REACHABILITY_TIMEOUT_MS_PROP: &str = "broker.reachability.timeout.ms";
pub const BROKER_POLL_INTERVAL_MS_PROP: &str = "broker.poll.interval.ms";
pub const BROKER_LOG_DIR_PROP: &str = "broker.log.dir";

/// The most brokers a single fleet file may describe.
pub const MAX_BROKER_COUNT: u32 = 64;

// Documentation
pub const INSTALL_ROOT_DOC: &str = "The Kafka installation directory, it must contain the bin/ \
                                    scripts and the config/server-<id>.properties files";
pub const BROKER_BASE_PORT_DOC: &str =
    "The port of broker 0, broker <id> listens on the base port plus its id";
pub const BROKER_COUNT_DOC: &str = "How many brokers the fleet runs, ids go from 0 to count - 1";
pub const BROKER_HOST_DOC: &str = "The host the brokers are addressed by";
pub const BROKER_SETTLE_DELAY_MS_DOC: &str =
    "How long to wait after starting a broker before the next one is started";
pub const BROKER_REACHABILITY_TIMEOUT_MS_DOC: &str = concatcp!(
    "How long a started broker has to accept connections on its port before it is marked as \
     failed. It is polled every `",
    BROKER_POLL_INTERVAL_MS_PROP,
    "`"
);
pub const BROKER_POLL_INTERVAL_MS_DOC: &str = "The interval between two reachability probes";
pub const BROKER_LOG_DIR_DOC: &str = concatcp!(
    "Where the broker-<id>.log output files are written. If not set, the logs/ directory under `",
    INSTALL_ROOT_PROP,
    "` is used"
);

#[derive(Debug, IntoEnumIterator)]
pub enum BrokerConfigKey {
    InstallRoot,
    BasePort,
    Count,
    Host,
    SettleDelayMs,
    ReachabilityTimeoutMs,
    PollIntervalMs,
    LogDir,
}

impl fmt::Display for BrokerConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InstallRoot => write!(f, "{}", INSTALL_ROOT_PROP),
            Self::BasePort => write!(f, "{}", BROKER_BASE_PORT_PROP),
            Self::Count => write!(f, "{}", BROKER_COUNT_PROP),
            Self::Host => write!(f, "{}", BROKER_HOST_PROP),
            Self::SettleDelayMs => write!(f, "{}", BROKER_SETTLE_DELAY_MS_PROP),
            Self::ReachabilityTimeoutMs => write!(f, "{}", BROKER_REACHABILITY_TIMEOUT_MS_PROP),
            Self::PollIntervalMs => write!(f, "{}", BROKER_POLL_INTERVAL_MS_PROP),
            Self::LogDir => write!(f, "{}", BROKER_LOG_DIR_PROP),
        }
    }
}

impl FromStr for BrokerConfigKey {
    type Err = FleetConfigError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            INSTALL_ROOT_PROP => Ok(Self::InstallRoot),
            BROKER_BASE_PORT_PROP => Ok(Self::BasePort),
            BROKER_COUNT_PROP => Ok(Self::Count),
            BROKER_HOST_PROP => Ok(Self::Host),
            BROKER_SETTLE_DELAY_MS_PROP => Ok(Self::SettleDelayMs),
            BROKER_REACHABILITY_TIMEOUT_MS_PROP => Ok(Self::ReachabilityTimeoutMs),
            BROKER_POLL_INTERVAL_MS_PROP => Ok(Self::PollIntervalMs),
            BROKER_LOG_DIR_PROP => Ok(Self::LogDir),
            _ => Err(FleetConfigError::UnknownKey(input.to_string())),
        }
    }
}

#[derive(Debug)]
pub struct BrokerSectionProperties {
    install_root: ConfigDef<PathBuf>,
    base_port: ConfigDef<u16>,
    count: ConfigDef<u32>,
    host: ConfigDef<String>,
    settle_delay_ms: ConfigDef<u64>,
    reachability_timeout_ms: ConfigDef<u64>,
    poll_interval_ms: ConfigDef<u64>,
    log_dir: ConfigDef<PathBuf>,
}

impl Default for BrokerSectionProperties {
    fn default() -> Self {
        Self {
            install_root: ConfigDef::default()
                .with_key(INSTALL_ROOT_PROP)
                .with_importance(ConfigDefImportance::High)
                .with_doc(INSTALL_ROOT_DOC)
                .with_default(PathBuf::from("/usr/local/kafka")),
            base_port: ConfigDef::default()
                .with_key(BROKER_BASE_PORT_PROP)
                .with_importance(ConfigDefImportance::High)
                .with_doc(BROKER_BASE_PORT_DOC)
                .with_default(9092)
                .with_validator(Box::new(|data| {
                    ConfigDef::at_least(data, &1, BROKER_BASE_PORT_PROP)
                })),
            count: ConfigDef::default()
                .with_key(BROKER_COUNT_PROP)
                .with_importance(ConfigDefImportance::High)
                .with_doc(BROKER_COUNT_DOC)
                .with_default(3)
                .with_validator(Box::new(|data| {
                    ConfigDef::between(data, &1, &MAX_BROKER_COUNT, BROKER_COUNT_PROP)
                })),
            host: ConfigDef::default()
                .with_key(BROKER_HOST_PROP)
                .with_importance(ConfigDefImportance::Medium)
                .with_doc(BROKER_HOST_DOC)
                .with_default(String::from("localhost")),
            settle_delay_ms: ConfigDef::default()
                .with_key(BROKER_SETTLE_DELAY_MS_PROP)
                .with_importance(ConfigDefImportance::Medium)
                .with_doc(BROKER_SETTLE_DELAY_MS_DOC)
                .with_default(5_000),
            reachability_timeout_ms: ConfigDef::default()
                .with_key(BROKER_REACHABILITY_TIMEOUT_MS_PROP)
                .with_importance(ConfigDefImportance::Medium)
                .with_doc(BROKER_REACHABILITY_TIMEOUT_MS_DOC)
                .with_default(30_000)
                .with_validator(Box::new(|data| {
                    ConfigDef::at_least(data, &1, BROKER_REACHABILITY_TIMEOUT_MS_PROP)
                })),
            poll_interval_ms: ConfigDef::default()
                .with_key(BROKER_POLL_INTERVAL_MS_PROP)
                .with_importance(ConfigDefImportance::Low)
                .with_doc(BROKER_POLL_INTERVAL_MS_DOC)
                .with_default(500)
                .with_validator(Box::new(|data| {
                    ConfigDef::at_least(data, &1, BROKER_POLL_INTERVAL_MS_PROP)
                })),
            log_dir: ConfigDef::default()
                .with_key(BROKER_LOG_DIR_PROP)
                .with_importance(ConfigDefImportance::Low)
                .with_doc(BROKER_LOG_DIR_DOC),
        }
    }
}

impl BrokerSectionProperties {
    /// When `broker.log.dir` is not set, the logs/ dir under the installation root is used
    pub fn resolve_log_dir(&mut self, install_root: &Path) -> Result<PathBuf, FleetConfigError> {
        self.log_dir.validate()?;
        Ok(self.log_dir.get_or_fallback(install_root.join("logs")))
    }
}

impl ConfigSet for BrokerSectionProperties {
    type ConfigKey = BrokerConfigKey;
    type ConfigType = BrokerSection;

    fn try_set_property(
        &mut self,
        property_name: &str,
        property_value: &str,
    ) -> Result<(), FleetConfigError> {
        match Self::ConfigKey::from_str(property_name)? {
            Self::ConfigKey::InstallRoot => self.install_root.try_set_parsed_value(property_value)?,
            Self::ConfigKey::BasePort => self.base_port.try_set_parsed_value(property_value)?,
            Self::ConfigKey::Count => self.count.try_set_parsed_value(property_value)?,
            Self::ConfigKey::Host => self.host.try_set_parsed_value(property_value)?,
            Self::ConfigKey::SettleDelayMs => {
                self.settle_delay_ms.try_set_parsed_value(property_value)?
            },
            Self::ConfigKey::ReachabilityTimeoutMs => {
                self.reachability_timeout_ms.try_set_parsed_value(property_value)?
            },
            Self::ConfigKey::PollIntervalMs => {
                self.poll_interval_ms.try_set_parsed_value(property_value)?
            },
            Self::ConfigKey::LogDir => self.log_dir.try_set_parsed_value(property_value)?,
        };
        Ok(())
    }

    fn resolve(&mut self) -> Result<BrokerSection, FleetConfigError> {
        trace!("BrokerSectionProperties::resolve()");
        let install_root = self.install_root.build()?;
        let log_dir = self.resolve_log_dir(&install_root)?;
        Ok(BrokerSection {
            base_port: self.base_port.build()?,
            count: self.count.build()?,
            host: self.host.build()?,
            settle_delay: Duration::from_millis(self.settle_delay_ms.build()?),
            reachability_timeout: Duration::from_millis(self.reachability_timeout_ms.build()?),
            poll_interval: Duration::from_millis(self.poll_interval_ms.build()?),
            install_root,
            log_dir,
        })
    }

    fn validate_values(&self, cfg: &BrokerSection) -> Result<(), FleetConfigError> {
        let last_port = u32::from(cfg.base_port) + cfg.count - 1;
        if last_port > u32::from(u16::MAX) {
            return Err(FleetConfigError::InvalidValue(format!(
                "{}: '{}' with {} brokers would use port {}, which is out of range",
                BROKER_BASE_PORT_PROP, cfg.base_port, cfg.count, last_port
            )));
        }
        if cfg.host.trim().is_empty() {
            return Err(FleetConfigError::InvalidValue(format!(
                "{}: must not be empty",
                BROKER_HOST_PROP
            )));
        }
        if cfg.poll_interval > cfg.reachability_timeout {
            return Err(FleetConfigError::InvalidValue(format!(
                "{}: '{}' should not exceed {}",
                BROKER_POLL_INTERVAL_MS_PROP,
                cfg.poll_interval.as_millis(),
                BROKER_REACHABILITY_TIMEOUT_MS_PROP
            )));
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct BrokerSection {
    pub install_root: PathBuf,
    pub base_port: u16,
    pub count: u32,
    pub host: String,
    pub settle_delay: Duration,
    pub reachability_timeout: Duration,
    pub poll_interval: Duration,
    pub log_dir: PathBuf,
}

impl BrokerSection {
    /// `<install.root>/config/server-<id>.properties`, listening on the base port plus the id.
    pub fn broker_config(&self, id: BrokerId) -> BrokerConfig {
        let config_path =
            self.install_root.join("config").join(format!("server-{}.properties", id));
        // count is bounded by MAX_BROKER_COUNT and the last port checked in validate_values.
        let port = self.base_port + id as u16;
        BrokerConfig::new(id, config_path, port).with_host(&self.host)
    }

    /// The brokers of the fleet, in ascending id order.
    pub fn broker_configs(&self) -> Vec<BrokerConfig> {
        (0..self.count).map(|id| self.broker_config(id)).collect()
    }
}
