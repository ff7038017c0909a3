//! Typed definitions for the properties a fleet file may carry.
//! Each `ConfigDef` knows its key, its documentation, an optional default and an optional
//! validator, so errors can always point back at the offending property.
use super::FleetConfigError;
use std::fmt;
use std::str::FromStr;
use tracing::{error, info, trace};

/// `ConfigDefImportance` provides the levels of importance of the different properties.
#[derive(Debug, PartialEq, Clone)]
pub enum ConfigDefImportance {
    High,
    Medium,
    Low,
}

/// A validator receives the current value (if any) of a property.
pub type ConfigValidator<T> = Box<dyn Fn(Option<&T>) -> Result<(), FleetConfigError>>;

/// `ConfigDef` defines a configuration property, its default and how it is validated.
pub struct ConfigDef<T> {
    /// The configuration key that is used to apply this value
    pub key: String,
    /// How important the configuration definition is
    importance: ConfigDefImportance,
    /// `default` of the value, used when the fleet file does not provide one
    default: Option<T>,
    /// The documentation of the field, used for showing errors
    doc: &'static str,
    /// Whether or not this variable was provided by the configuration file.
    provided: bool,
    /// The current value, be it the default or overwritten by config
    value: Option<T>,
    /// A validator to ensure the new field value is correct
    validator: Option<ConfigValidator<T>>,
}

impl<T> fmt::Debug for ConfigDef<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigDef")
            .field("key", &self.key)
            .field("importance", &self.importance)
            .field("default", &self.default)
            .field("provided", &self.provided)
            .field("value", &self.value)
            .field("validator_exists", &self.validator.is_some())
            .finish()
    }
}

impl<T> Default for ConfigDef<T> {
    fn default() -> Self {
        Self {
            importance: ConfigDefImportance::Low,
            doc: "",
            key: String::from("unset.key"),
            default: None,
            provided: false,
            value: None,
            validator: None,
        }
    }
}

impl<T> ConfigDef<T>
where
    T: FromStr,
    FleetConfigError: From<<T as FromStr>::Err>,
    <T as FromStr>::Err: fmt::Display,
    T: fmt::Debug,
{
    /// Sets the `key` value, this comes from const &str values in the calling modules
    pub fn with_key(mut self, key: &str) -> Self {
        self.key = key.to_string();
        self
    }

    pub fn with_doc(mut self, doc: &'static str) -> Self {
        self.doc = doc;
        self
    }

    pub fn with_importance(mut self, importance: ConfigDefImportance) -> Self {
        self.importance = importance;
        self
    }

    /// Sets the default value, which is also the initial value.
    pub fn with_default(mut self, default: T) -> Self
    where
        T: Clone,
    {
        self.value = Some(default.clone());
        self.default = Some(default);
        self
    }

    pub fn with_validator(mut self, validator: ConfigValidator<T>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn set_value(&mut self, value: T) {
        self.value = Some(value);
        self.provided = true;
    }

    pub fn try_set_parsed_value(&mut self, value: &str) -> Result<(), FleetConfigError> {
        match value.trim().parse::<_>() {
            Ok(val) => {
                self.set_value(val);
                Ok(())
            },
            Err(err) => {
                error!("Unable to parse property {} = {:?}: {}. Doc: {}", self.key, value, err, self.doc);
                Err(FleetConfigError::from(err))
            },
        }
    }

    pub fn at_least(data: Option<&T>, rhs: &T, key: &str) -> Result<(), FleetConfigError>
    where
        T: PartialOrd + fmt::Display,
    {
        match data {
            Some(val) => {
                if val < rhs {
                    Err(FleetConfigError::InvalidValue(format!(
                        "{}: '{}' should be at least {}",
                        key, val, rhs
                    )))
                } else {
                    Ok(())
                }
            },
            None => {
                error!("Running at_least() with no value provided for {}", key);
                Err(FleetConfigError::ComparisonOnNone(key.to_string()))
            },
        }
    }

    /// Checks a value is between both the upper (inclusive) and lower bound
    pub fn between(data: Option<&T>, min: &T, max: &T, key: &str) -> Result<(), FleetConfigError>
    where
        T: PartialOrd + fmt::Display,
    {
        match data {
            Some(val) => {
                if val < min {
                    Err(FleetConfigError::InvalidValue(format!(
                        "{}: '{}' should be at least {}",
                        key, val, min
                    )))
                } else if val > max {
                    Err(FleetConfigError::InvalidValue(format!(
                        "{}: '{}' should be no more than {}",
                        key, val, max
                    )))
                } else {
                    Ok(())
                }
            },
            None => {
                error!("Running between() with no value provided for {}", key);
                Err(FleetConfigError::ComparisonOnNone(key.to_string()))
            },
        }
    }

    pub fn is_provided(&self) -> bool {
        self.provided
    }

    pub fn validate(&self) -> Result<(), FleetConfigError> {
        match &self.validator {
            Some(validator) => (validator)(self.value.as_ref()),
            None => Ok(()),
        }
    }

    /// `build` does not consume self, overrides from the command line may be applied to the
    /// properties after the fleet file was read and the config re-built.
    pub fn build(&mut self) -> Result<T, FleetConfigError>
    where
        T: Clone,
    {
        self.validate()?;
        match &self.value {
            Some(value) => {
                trace!("ConfigDef::build() {} = {:?}", self.key, value);
                Ok(value.clone())
            },
            None => Err(FleetConfigError::MissingKey(self.key.to_string())),
        }
    }

    /// Uses `fallback` when this property has no value.
    pub fn get_or_fallback(&mut self, fallback: T) -> T
    where
        T: Clone,
    {
        match &self.value {
            Some(value) => value.clone(),
            None => {
                info!("Unspecified property {}: using fallback value {:?}", self.key, fallback);
                fallback
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_parses_and_validates_values() {
        let mut port: ConfigDef<u16> = ConfigDef::default()
            .with_key("broker.base.port")
            .with_default(9092)
            .with_validator(Box::new(|data| ConfigDef::at_least(data, &1, "broker.base.port")));
        assert_eq!(port.build().unwrap(), 9092);
        assert!(!port.is_provided());
        port.try_set_parsed_value(" 19092 ").unwrap();
        assert!(port.is_provided());
        assert_eq!(port.build().unwrap(), 19092);
        port.try_set_parsed_value("0").unwrap();
        assert_eq!(
            port.build().unwrap_err(),
            FleetConfigError::InvalidValue(String::from("broker.base.port: '0' should be at least 1"))
        );
        assert!(port.try_set_parsed_value("not-a-port").is_err());
    }

    #[test]
    fn it_requires_a_value_without_default() {
        let mut host: ConfigDef<String> = ConfigDef::default().with_key("broker.host");
        assert_eq!(host.build().unwrap_err(), FleetConfigError::MissingKey(String::from("broker.host")));
        assert_eq!(host.get_or_fallback(String::from("localhost")), "localhost");
        host.set_value(String::from("kafka-0"));
        assert_eq!(host.get_or_fallback(String::from("localhost")), "kafka-0");
    }

    #[test]
    fn it_checks_ranges() {
        assert!(ConfigDef::<u32>::between(Some(&3), &1, &16, "broker.count").is_ok());
        assert!(ConfigDef::<u32>::between(Some(&17), &1, &16, "broker.count").is_err());
        assert_eq!(
            ConfigDef::<u32>::between(None, &1, &16, "broker.count").unwrap_err(),
            FleetConfigError::ComparisonOnNone(String::from("broker.count"))
        );
    }
}
