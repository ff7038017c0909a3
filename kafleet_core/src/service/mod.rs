//! Host services the brokers depend on, such as ZooKeeper, managed through the host's service
//! manager.

pub mod service_controller;

use crate::tools::ToolError;
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub use self::service_controller::ServiceController;

lazy_static! {
    static ref SERVICE_NAME: Regex = Regex::new(r"^[a-zA-Z0-9@._:-]+$").unwrap();
    static ref ACTIVE_LINE: Regex = Regex::new(r"(?m)^\s*Active:\s+(\S+)").unwrap();
}

/// The state of a host service as reported by the service manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// The status could not be interpreted.
    Unknown,
    Inactive,
    /// Starting up, a start request has already been issued.
    Activating,
    Active,
}

impl ServiceState {
    /// Classifies status output, either the single word printed by `is-active` or the
    /// `Active:` line of a full status report. A status is only `Active` when its state word is
    /// exactly an active state, so `inactive` never counts as running.
    pub fn classify(status_output: &str) -> Self {
        let word = match ACTIVE_LINE.captures(status_output) {
            Some(captures) => captures[1].to_string(),
            None => match status_output.split_whitespace().next() {
                Some(word) => word.to_string(),
                None => return Self::Unknown,
            },
        };
        match word.to_lowercase().as_str() {
            "active" | "reloading" => Self::Active,
            "activating" => Self::Activating,
            "inactive" | "failed" | "dead" | "deactivating" => Self::Inactive,
            _ => Self::Unknown,
        }
    }

    pub fn is_active(&self) -> bool {
        *self == Self::Active
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Inactive => write!(f, "inactive"),
            Self::Activating => write!(f, "activating"),
            Self::Active => write!(f, "active"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid service name {0:?}")]
    InvalidName(String),
    #[error("Service {0} is unavailable: {1}")]
    Unavailable(String, #[source] ToolError),
    #[error("Service {0} did not become active within {1:?}")]
    StartTimeout(String, Duration),
}

impl ServiceError {
    pub fn service(&self) -> &str {
        match self {
            Self::InvalidName(name) | Self::Unavailable(name, _) | Self::StartTimeout(name, _) => {
                name
            },
        }
    }
}

/// Rejects names that would be interpreted as options or that no service manager accepts.
pub fn validate_service_name(name: &str) -> Result<(), ServiceError> {
    if name.starts_with('-') || !SERVICE_NAME.is_match(name) {
        return Err(ServiceError::InvalidName(name.to_string()));
    }
    Ok(())
}
