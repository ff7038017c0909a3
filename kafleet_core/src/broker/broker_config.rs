//! Broker configuration as seen by the supervisor: where the broker's `server.properties` file
//! lives and which port its administrative endpoint answers on.
use super::{BrokerError, BrokerId};
use crate::utils::core_utils::listener_list_to_end_points;
use fs_err::File;
use std::fmt;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const BROKER_ID_PROP: &str = "broker.id";
pub const LISTENERS_PROP: &str = "listeners";
pub const PORT_PROP: &str = "port";

/// `host:port` of a broker, as passed to `--bootstrap-server`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Immutable once built, the id identifies the broker within its fleet.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerConfig {
    id: BrokerId,
    config_path: PathBuf,
    host: String,
    port: u16,
}

impl BrokerConfig {
    pub fn new<P: Into<PathBuf>>(id: BrokerId, config_path: P, port: u16) -> Self {
        Self { id, config_path: config_path.into(), host: String::from("localhost"), port }
    }

    pub fn with_host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    pub fn id(&self) -> BrokerId {
        self.id
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn address(&self) -> BrokerAddress {
        BrokerAddress { host: self.host.clone(), port: self.port }
    }

    /// Reads the broker's properties file, any failure to find, open or parse it is reported as
    /// `ConfigNotFound` since the broker could not use it either.
    pub fn read_properties(&self) -> Result<BrokerProperties, BrokerError> {
        let not_found = || BrokerError::ConfigNotFound(self.id, self.config_path.clone());
        if !self.config_path.is_file() {
            warn!("Broker {}: {} is not a file", self.id, self.config_path.display());
            return Err(not_found());
        }
        let file = File::open(&self.config_path).map_err(|err| {
            warn!("Broker {}: {}", self.id, err);
            not_found()
        })?;
        let props = java_properties::read(BufReader::new(file)).map_err(|err| {
            warn!("Broker {}: unable to parse {}: {}", self.id, self.config_path.display(), err);
            not_found()
        })?;
        let broker_id = props.get(BROKER_ID_PROP).and_then(|val| val.trim().parse::<i64>().ok());
        let mut listener_ports: Vec<u16> = props
            .get(LISTENERS_PROP)
            .map(|listeners| {
                listener_list_to_end_points(listeners).into_iter().map(|ep| ep.port).collect()
            })
            .unwrap_or_default();
        if listener_ports.is_empty() {
            if let Some(port) = props.get(PORT_PROP).and_then(|val| val.trim().parse::<u16>().ok()) {
                listener_ports.push(port);
            }
        }
        debug!(
            "Broker {}: {} declares broker.id={:?} listener ports {:?}",
            self.id,
            self.config_path.display(),
            broker_id,
            listener_ports
        );
        Ok(BrokerProperties { broker_id, listener_ports })
    }
}

/// What the supervisor cares about in a broker's `server.properties`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BrokerProperties {
    pub broker_id: Option<i64>,
    pub listener_ports: Vec<u16>,
}

impl BrokerProperties {
    /// Returns the disagreements between the properties file and the fleet's view of the broker.
    pub fn mismatches(&self, config: &BrokerConfig) -> Vec<String> {
        let mut res = vec![];
        if let Some(broker_id) = self.broker_id {
            if broker_id != i64::from(config.id()) {
                res.push(format!("{}={} but the fleet expects {}", BROKER_ID_PROP, broker_id, config.id()));
            }
        }
        if !self.listener_ports.is_empty() && !self.listener_ports.contains(&config.port()) {
            res.push(format!(
                "listener ports {:?} do not include the expected port {}",
                self.listener_ports,
                config.port()
            ));
        }
        res
    }
}
