//! Brokers
//! A broker is one `kafka-server-start.sh` process of the fleet, identified by its id.

pub mod broker_config;
pub mod broker_process;
pub mod broker_states;

use self::broker_states::ProcessState;
use crate::tools::ToolError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Broker ids are unique within a fleet and start at 0.
pub type BrokerId = u32;

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Broker {0}: configuration file {1} not found or not readable")]
    ConfigNotFound(BrokerId, PathBuf),
    #[error("Broker {0} has already been started by this supervisor")]
    DuplicateBroker(BrokerId),
    #[error("Broker {0} did not accept connections on port {1} within {2:?}")]
    StartTimeout(BrokerId, u16, Duration),
    #[error("Broker {0} is unreachable: {1}")]
    Unreachable(BrokerId, String),
    #[error("Broker {0} is not part of the fleet")]
    UnknownBroker(BrokerId),
    #[error("Broker {0} could not be spawned: {1}")]
    Spawn(BrokerId, #[source] ToolError),
    #[error("Broker {0} exited during startup: {1}")]
    ExitedDuringStartup(BrokerId, String),
    #[error("Broker {0} cannot go from {1} to {2}")]
    InvalidTransition(BrokerId, ProcessState, ProcessState),
}

impl BrokerError {
    /// The broker the error is about.
    pub fn broker_id(&self) -> BrokerId {
        match self {
            Self::ConfigNotFound(id, _)
            | Self::DuplicateBroker(id)
            | Self::StartTimeout(id, ..)
            | Self::Unreachable(id, _)
            | Self::UnknownBroker(id)
            | Self::Spawn(id, _)
            | Self::ExitedDuringStartup(id, _)
            | Self::InvalidTransition(id, ..) => *id,
        }
    }
}
