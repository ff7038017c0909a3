//! Fleet Config - Admin Section
//! Retries and timeouts for the topic administration and smoke test commands.

use super::config_def::{ConfigDef, ConfigDefImportance};
use super::{ConfigSet, FleetConfigError};
use crate::utils::bounded_wait::Backoff;
use enum_iterator::IntoEnumIterator;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::trace;

pub const ADMIN_RETRY_ATTEMPTS_PROP: &str = "admin.retry.attempts";
pub const ADMIN_RETRY_BACKOFF_MS_PROP: &str = "admin.retry.backoff.ms";
pub const ADMIN_COMMAND_TIMEOUT_MS_PROP: &str = "admin.command.timeout.ms";
pub const SMOKE_TEST_TIMEOUT_MS_PROP: &str = "smoke.test.timeout.ms";

pub const ADMIN_RETRY_ATTEMPTS_DOC: &str =
    "How many times a command against an unreachable broker is attempted before giving up";
pub const ADMIN_RETRY_BACKOFF_MS_DOC: &str =
    "The delay before the first retry, doubled after every further attempt";
pub const ADMIN_COMMAND_TIMEOUT_MS_DOC: &str =
    "How long a single kafka-topics invocation may run before it is killed";
pub const SMOKE_TEST_TIMEOUT_MS_DOC: &str =
    "The default time the smoke test waits for the produced message to be consumed";

#[derive(Debug, IntoEnumIterator)]
pub enum AdminConfigKey {
    RetryAttempts,
    RetryBackoffMs,
    CommandTimeoutMs,
    SmokeTestTimeoutMs,
}

impl fmt::Display for AdminConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RetryAttempts => write!(f, "{}", ADMIN_RETRY_ATTEMPTS_PROP),
            Self::RetryBackoffMs => write!(f, "{}", ADMIN_RETRY_BACKOFF_MS_PROP),
            Self::CommandTimeoutMs => write!(f, "{}", ADMIN_COMMAND_TIMEOUT_MS_PROP),
            Self::SmokeTestTimeoutMs => write!(f, "{}", SMOKE_TEST_TIMEOUT_MS_PROP),
        }
    }
}

impl FromStr for AdminConfigKey {
    type Err = FleetConfigError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            ADMIN_RETRY_ATTEMPTS_PROP => Ok(Self::RetryAttempts),
            ADMIN_RETRY_BACKOFF_MS_PROP => Ok(Self::RetryBackoffMs),
            ADMIN_COMMAND_TIMEOUT_MS_PROP => Ok(Self::CommandTimeoutMs),
            SMOKE_TEST_TIMEOUT_MS_PROP => Ok(Self::SmokeTestTimeoutMs),
            _ => Err(FleetConfigError::UnknownKey(input.to_string())),
        }
    }
}

#[derive(Debug)]
pub struct AdminSectionProperties {
    retry_attempts: ConfigDef<u32>,
    retry_backoff_ms: ConfigDef<u64>,
    command_timeout_ms: ConfigDef<u64>,
    smoke_test_timeout_ms: ConfigDef<u64>,
}

impl Default for AdminSectionProperties {
    fn default() -> Self {
        Self {
            retry_attempts: ConfigDef::default()
                .with_key(ADMIN_RETRY_ATTEMPTS_PROP)
                .with_importance(ConfigDefImportance::Medium)
                .with_doc(ADMIN_RETRY_ATTEMPTS_DOC)
                .with_default(3)
                .with_validator(Box::new(|data| {
                    ConfigDef::between(data, &1, &10, ADMIN_RETRY_ATTEMPTS_PROP)
                })),
            retry_backoff_ms: ConfigDef::default()
                .with_key(ADMIN_RETRY_BACKOFF_MS_PROP)
                .with_importance(ConfigDefImportance::Low)
                .with_doc(ADMIN_RETRY_BACKOFF_MS_DOC)
                .with_default(200),
            command_timeout_ms: ConfigDef::default()
                .with_key(ADMIN_COMMAND_TIMEOUT_MS_PROP)
                .with_importance(ConfigDefImportance::Medium)
                .with_doc(ADMIN_COMMAND_TIMEOUT_MS_DOC)
                .with_default(30_000)
                .with_validator(Box::new(|data| {
                    ConfigDef::at_least(data, &1, ADMIN_COMMAND_TIMEOUT_MS_PROP)
                })),
            smoke_test_timeout_ms: ConfigDef::default()
                .with_key(SMOKE_TEST_TIMEOUT_MS_PROP)
                .with_importance(ConfigDefImportance::Medium)
                .with_doc(SMOKE_TEST_TIMEOUT_MS_DOC)
                .with_default(10_000)
                .with_validator(Box::new(|data| {
                    ConfigDef::at_least(data, &1, SMOKE_TEST_TIMEOUT_MS_PROP)
                })),
        }
    }
}

impl ConfigSet for AdminSectionProperties {
    type ConfigKey = AdminConfigKey;
    type ConfigType = AdminSection;

    fn try_set_property(
        &mut self,
        property_name: &str,
        property_value: &str,
    ) -> Result<(), FleetConfigError> {
        match Self::ConfigKey::from_str(property_name)? {
            Self::ConfigKey::RetryAttempts => {
                self.retry_attempts.try_set_parsed_value(property_value)?
            },
            Self::ConfigKey::RetryBackoffMs => {
                self.retry_backoff_ms.try_set_parsed_value(property_value)?
            },
            Self::ConfigKey::CommandTimeoutMs => {
                self.command_timeout_ms.try_set_parsed_value(property_value)?
            },
            Self::ConfigKey::SmokeTestTimeoutMs => {
                self.smoke_test_timeout_ms.try_set_parsed_value(property_value)?
            },
        };
        Ok(())
    }

    fn resolve(&mut self) -> Result<AdminSection, FleetConfigError> {
        trace!("AdminSectionProperties::resolve()");
        Ok(AdminSection {
            retry_attempts: self.retry_attempts.build()?,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms.build()?),
            command_timeout: Duration::from_millis(self.command_timeout_ms.build()?),
            smoke_test_timeout: Duration::from_millis(self.smoke_test_timeout_ms.build()?),
        })
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct AdminSection {
    pub retry_attempts: u32,
    pub retry_backoff: Duration,
    pub command_timeout: Duration,
    pub smoke_test_timeout: Duration,
}

impl AdminSection {
    /// The retry policy for commands that failed to reach a broker.
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.retry_attempts, self.retry_backoff)
    }
}
