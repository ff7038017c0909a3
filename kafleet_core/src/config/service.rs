//! Fleet Config - Service Section
//! The host services the brokers depend on, started through the service manager before any
//! broker is launched.

use super::config_def::{ConfigDef, ConfigDefImportance};
use super::{ConfigSet, FleetConfigError};
use crate::utils::parse_csv_list;
use enum_iterator::IntoEnumIterator;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::trace;

pub const SERVICES_PROP: &str = "services";
pub const SERVICE_START_TIMEOUT_MS_PROP: &str = "service.start.timeout.ms";
pub const SERVICE_POLL_INTERVAL_MS_PROP: &str = "service.poll.interval.ms";
pub const SERVICE_USE_SUDO_PROP: &str = "service.use.sudo";

pub const SERVICES_DOC: &str =
    "Comma separated list of services to ensure are running, in order, before the brokers start";
pub const SERVICE_START_TIMEOUT_MS_DOC: &str =
    "How long a service has to become active after it has been asked to start";
pub const SERVICE_POLL_INTERVAL_MS_DOC: &str =
    "The interval between two status queries while waiting for a service to start";
pub const SERVICE_USE_SUDO_DOC: &str = "Whether start requests are run through sudo";

#[derive(Debug, IntoEnumIterator)]
pub enum ServiceConfigKey {
    Services,
    StartTimeoutMs,
    PollIntervalMs,
    UseSudo,
}

impl fmt::Display for ServiceConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Services => write!(f, "{}", SERVICES_PROP),
            Self::StartTimeoutMs => write!(f, "{}", SERVICE_START_TIMEOUT_MS_PROP),
            Self::PollIntervalMs => write!(f, "{}", SERVICE_POLL_INTERVAL_MS_PROP),
            Self::UseSudo => write!(f, "{}", SERVICE_USE_SUDO_PROP),
        }
    }
}

impl FromStr for ServiceConfigKey {
    type Err = FleetConfigError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            SERVICES_PROP => Ok(Self::Services),
            SERVICE_START_TIMEOUT_MS_PROP => Ok(Self::StartTimeoutMs),
            SERVICE_POLL_INTERVAL_MS_PROP => Ok(Self::PollIntervalMs),
            SERVICE_USE_SUDO_PROP => Ok(Self::UseSudo),
            _ => Err(FleetConfigError::UnknownKey(input.to_string())),
        }
    }
}

#[derive(Debug)]
pub struct ServiceSectionProperties {
    services: ConfigDef<String>,
    start_timeout_ms: ConfigDef<u64>,
    poll_interval_ms: ConfigDef<u64>,
    use_sudo: ConfigDef<bool>,
}

impl Default for ServiceSectionProperties {
    fn default() -> Self {
        Self {
            services: ConfigDef::default()
                .with_key(SERVICES_PROP)
                .with_importance(ConfigDefImportance::High)
                .with_doc(SERVICES_DOC)
                .with_default(String::from("zookeeper.service,kafka.service")),
            start_timeout_ms: ConfigDef::default()
                .with_key(SERVICE_START_TIMEOUT_MS_PROP)
                .with_importance(ConfigDefImportance::Medium)
                .with_doc(SERVICE_START_TIMEOUT_MS_DOC)
                .with_default(30_000)
                .with_validator(Box::new(|data| {
                    ConfigDef::at_least(data, &1, SERVICE_START_TIMEOUT_MS_PROP)
                })),
            poll_interval_ms: ConfigDef::default()
                .with_key(SERVICE_POLL_INTERVAL_MS_PROP)
                .with_importance(ConfigDefImportance::Low)
                .with_doc(SERVICE_POLL_INTERVAL_MS_DOC)
                .with_default(500)
                .with_validator(Box::new(|data| {
                    ConfigDef::at_least(data, &1, SERVICE_POLL_INTERVAL_MS_PROP)
                })),
            use_sudo: ConfigDef::default()
                .with_key(SERVICE_USE_SUDO_PROP)
                .with_importance(ConfigDefImportance::Low)
                .with_doc(SERVICE_USE_SUDO_DOC)
                .with_default(true),
        }
    }
}

impl ConfigSet for ServiceSectionProperties {
    type ConfigKey = ServiceConfigKey;
    type ConfigType = ServiceSection;

    fn try_set_property(
        &mut self,
        property_name: &str,
        property_value: &str,
    ) -> Result<(), FleetConfigError> {
        match Self::ConfigKey::from_str(property_name)? {
            Self::ConfigKey::Services => self.services.try_set_parsed_value(property_value)?,
            Self::ConfigKey::StartTimeoutMs => {
                self.start_timeout_ms.try_set_parsed_value(property_value)?
            },
            Self::ConfigKey::PollIntervalMs => {
                self.poll_interval_ms.try_set_parsed_value(property_value)?
            },
            Self::ConfigKey::UseSudo => self.use_sudo.try_set_parsed_value(property_value)?,
        };
        Ok(())
    }

    fn resolve(&mut self) -> Result<ServiceSection, FleetConfigError> {
        trace!("ServiceSectionProperties::resolve()");
        Ok(ServiceSection {
            names: parse_csv_list(&self.services.build()?),
            start_timeout: Duration::from_millis(self.start_timeout_ms.build()?),
            poll_interval: Duration::from_millis(self.poll_interval_ms.build()?),
            use_sudo: self.use_sudo.build()?,
        })
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct ServiceSection {
    /// May be empty, in which case no service is started.
    pub names: Vec<String>,
    pub start_timeout: Duration,
    pub poll_interval: Duration,
    pub use_sudo: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn it_splits_the_service_list() {
        let mut props = ServiceSectionProperties::default();
        props.try_set_property(SERVICES_PROP, " zookeeper.service , ,kafka.service").unwrap();
        props.try_set_property(SERVICE_USE_SUDO_PROP, "false").unwrap();
        let section = props.build().unwrap();
        assert_eq!(section.names, vec![
            String::from("zookeeper.service"),
            String::from("kafka.service")
        ]);
        assert!(!section.use_sudo);
        props.try_set_property(SERVICES_PROP, "").unwrap();
        assert!(props.build().unwrap().names.is_empty());
        assert!(props.try_set_property(SERVICE_USE_SUDO_PROP, "maybe").is_err());
    }
}
