//! Fleet Config
//! The fleet is described by a Java `.properties` file, the same format the brokers it
//! supervises use. Properties are grouped in sections, each section resolves its `ConfigDef`s
//! into a plain config struct and validates values that depend on each other.

pub mod admin;
pub mod broker;
pub mod config_def;
pub mod service;

use self::admin::{AdminConfigKey, AdminSection, AdminSectionProperties};
use self::broker::{BrokerConfigKey, BrokerSection, BrokerSectionProperties};
use self::service::{ServiceConfigKey, ServiceSection, ServiceSectionProperties};
use enum_iterator::IntoEnumIterator;
use fs_err::File;
use std::collections::HashMap;
use std::fmt;
use std::io::{self, BufReader};
use std::num;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, trace};

/// A helper enum to find the section a property belongs to.
#[derive(Debug)]
pub enum FleetConfigKey {
    Broker(BrokerConfigKey),
    Service(ServiceConfigKey),
    Admin(AdminConfigKey),
}

impl fmt::Display for FleetConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Broker(val) => write!(f, "{}", val),
            Self::Service(val) => write!(f, "{}", val),
            Self::Admin(val) => write!(f, "{}", val),
        }
    }
}

impl FromStr for FleetConfigKey {
    type Err = FleetConfigError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if let Ok(val) = BrokerConfigKey::from_str(input) {
            return Ok(Self::Broker(val));
        }
        if let Ok(val) = ServiceConfigKey::from_str(input) {
            return Ok(Self::Service(val));
        }
        if let Ok(val) = AdminConfigKey::from_str(input) {
            return Ok(Self::Admin(val));
        }
        Err(FleetConfigError::UnknownKey(input.to_string()))
    }
}

/// `FleetConfigError` is returned when properties are invalid, unknown, missing or the fleet
/// file is not readable.
#[derive(Error, Debug)]
pub enum FleetConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Property error: {0}")]
    Property(#[from] java_properties::PropertiesError),
    #[error("ParseInt error: {0}")]
    ParseInt(#[from] num::ParseIntError),
    #[error("ParseBool error: {0}")]
    ParseBool(#[from] std::str::ParseBoolError),
    // PathBuf and String parse through FromStr as well.
    #[error("Infallible String Error {0:?}")]
    Infallible(#[from] std::convert::Infallible),
    #[error("Missing Key error: {0:?}")]
    MissingKey(String),
    #[error("Invalid Value: {0}")]
    InvalidValue(String),
    #[error("Unknown Key: {0}")]
    UnknownKey(String),
    #[error("Attempt to compare a value that is not provided and has no default: {0}")]
    ComparisonOnNone(String),
    #[error("Invalid override '{0}', expected key=value")]
    InvalidOverride(String),
}

/// This implementation is only for testing, for example any I/O error is considered equal
impl PartialEq for FleetConfigError {
    fn eq(&self, rhs: &Self) -> bool {
        match self {
            Self::Io(_) => matches!(rhs, Self::Io(_)),
            Self::Property(lhs) => {
                matches!(rhs, Self::Property(rhs) if lhs.line_number() == rhs.line_number())
            },
            Self::ParseInt(lhs) => matches!(rhs, Self::ParseInt(rhs) if lhs == rhs),
            Self::ParseBool(lhs) => matches!(rhs, Self::ParseBool(rhs) if lhs == rhs),
            Self::Infallible(lhs) => matches!(rhs, Self::Infallible(rhs) if lhs == rhs),
            Self::MissingKey(lhs) => matches!(rhs, Self::MissingKey(rhs) if lhs == rhs),
            Self::InvalidValue(lhs) => matches!(rhs, Self::InvalidValue(rhs) if lhs == rhs),
            Self::UnknownKey(lhs) => matches!(rhs, Self::UnknownKey(rhs) if lhs == rhs),
            Self::ComparisonOnNone(lhs) => matches!(rhs, Self::ComparisonOnNone(rhs) if lhs == rhs),
            Self::InvalidOverride(lhs) => matches!(rhs, Self::InvalidOverride(rhs) if lhs == rhs),
        }
    }
}

/// A set of functions that the different configuration sections must implement.
pub trait ConfigSet {
    type ConfigKey;
    type ConfigType;
    /// `try_set_property` transforms a string value from the fleet file into our actual types
    fn try_set_property(
        &mut self,
        property_name: &str,
        property_value: &str,
    ) -> Result<(), FleetConfigError>;
    /// `resolve` turns the `ConfigDef`s into a ConfigType, applying fallbacks.
    /// NOTE: This doesn't consume self so that overrides can be applied and the section rebuilt.
    fn resolve(&mut self) -> Result<Self::ConfigType, FleetConfigError>;
    /// `build` resolves the section and then makes sure the values are compatible with
    /// each-other.
    fn build(&mut self) -> Result<Self::ConfigType, FleetConfigError> {
        let res = self.resolve()?;
        self.validate_values(&res)?;
        Ok(res)
    }
    /// `config_names` returns a list of config keys used
    fn config_names() -> Vec<String>
    where
        Self::ConfigKey: IntoEnumIterator + fmt::Display,
    {
        Self::ConfigKey::into_enum_iter().map(|val| val.to_string()).collect()
    }
    /// `validate_values` ensures values are compatible with others and within limits not provided
    /// by the per-property validators.
    fn validate_values(&self, _cfg: &Self::ConfigType) -> Result<(), FleetConfigError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FleetConfigProperties {
    broker: BrokerSectionProperties,
    service: ServiceSectionProperties,
    admin: AdminSectionProperties,
}

impl FleetConfigProperties {
    pub fn try_set_property(
        &mut self,
        property_name: &str,
        property_value: &str,
    ) -> Result<(), FleetConfigError> {
        match FleetConfigKey::from_str(property_name)? {
            FleetConfigKey::Broker(_) => {
                self.broker.try_set_property(property_name, property_value)?
            },
            FleetConfigKey::Service(_) => {
                self.service.try_set_property(property_name, property_value)?
            },
            FleetConfigKey::Admin(_) => self.admin.try_set_property(property_name, property_value)?,
        };
        Ok(())
    }

    /// Applies a `key=value` override, as given on the command line.
    pub fn try_set_override(&mut self, property_override: &str) -> Result<(), FleetConfigError> {
        match property_override.split_once('=') {
            Some((property_name, property_value)) => {
                self.try_set_property(property_name.trim(), property_value)
            },
            None => Err(FleetConfigError::InvalidOverride(property_override.to_string())),
        }
    }

    /// `config_names` returns a list of all the keys a fleet file may contain
    pub fn config_names() -> Vec<String> {
        let mut res = vec![];
        res.append(&mut BrokerSectionProperties::config_names());
        res.append(&mut ServiceSectionProperties::config_names());
        res.append(&mut AdminSectionProperties::config_names());
        res
    }

    pub fn build(&mut self) -> Result<FleetConfig, FleetConfigError> {
        trace!("FleetConfigProperties::build() INIT");
        let broker = self.broker.build()?;
        let service = self.service.build()?;
        let admin = self.admin.build()?;
        trace!("FleetConfigProperties::build() DONE");
        Ok(FleetConfig { broker, service, admin })
    }

    /// Transforms a HashMap of properties into a FleetConfigProperties object
    /// This may return FleetConfigError::UnknownKey errors
    pub fn from_properties_hashmap(
        input_config: HashMap<String, String>,
    ) -> Result<Self, FleetConfigError> {
        let mut config_builder = Self::default();
        for (property, property_value) in &input_config {
            debug!("from_properties_hashmap: {} = {}", property, property_value);
            config_builder.try_set_property(property, property_value)?;
        }
        Ok(config_builder)
    }

    /// `read_config_file` reads the fleet properties file.
    pub fn read_config_file<P: AsRef<Path>>(filename: P) -> Result<Self, FleetConfigError> {
        debug!("read_config_file: Reading {}", filename.as_ref().display());
        let config_file_content = File::open(filename.as_ref())?;
        let input_config = java_properties::read(BufReader::new(config_file_content))?;
        FleetConfigProperties::from_properties_hashmap(input_config)
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct FleetConfig {
    pub broker: BrokerSection,
    pub service: ServiceSection,
    pub admin: AdminSection,
}

impl Default for FleetConfig {
    fn default() -> Self {
        FleetConfigProperties::default().build().expect("default fleet properties are valid")
    }
}
