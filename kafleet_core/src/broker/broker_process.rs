//! A single supervised broker process.

use super::broker_config::BrokerConfig;
use super::broker_states::ProcessState;
use super::{BrokerError, BrokerId};
use crate::tools::{BrokerLauncher, SpawnedBroker};
use crate::utils::bounded_wait::{BoundedWait, WaitError};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_attributes::instrument;

/// How long a stopped broker is given to release its process.
pub const STOP_GRACE: Duration = Duration::from_secs(10);

/// A snapshot of a broker as known by the supervisor.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerHandle {
    config: BrokerConfig,
    state: ProcessState,
    pid: Option<u32>,
}

impl BrokerHandle {
    pub fn id(&self) -> BrokerId {
        self.config.id()
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }
}

/// The authoritative state of one broker plus its spawned process.
#[derive(Debug)]
pub struct BrokerProcess {
    handle: BrokerHandle,
    spawned: Option<SpawnedBroker>,
}

impl BrokerProcess {
    pub fn new(config: BrokerConfig) -> Self {
        Self { handle: BrokerHandle { config, state: ProcessState::default(), pid: None }, spawned: None }
    }

    pub fn id(&self) -> BrokerId {
        self.handle.id()
    }

    pub fn state(&self) -> ProcessState {
        self.handle.state
    }

    pub fn handle(&self) -> BrokerHandle {
        self.handle.clone()
    }

    /// Applies a state change, illegal transitions are rejected and leave the state untouched.
    pub fn transition(&mut self, next: ProcessState) -> Result<(), BrokerError> {
        let current = self.handle.state;
        if !current.can_transition_to(next) {
            error!("Broker {}: illegal transition from {} to {}", self.id(), current, next);
            return Err(BrokerError::InvalidTransition(self.id(), current, next));
        }
        debug!("Broker {}: {} -> {}", self.id(), current, next);
        self.handle.state = next;
        Ok(())
    }

    /// Launches the broker and waits for its port to accept connections.
    /// The configuration file is checked before anything is spawned. The broker is `Running`
    /// once reachable, and `Failed` when it cannot be spawned, exits or stays unreachable for
    /// the duration of `wait`.
    #[instrument(skip(self, launcher, wait), fields(broker_id = self.id()))]
    pub async fn start<L: BrokerLauncher>(
        &mut self,
        launcher: &L,
        wait: &BoundedWait,
    ) -> Result<BrokerHandle, BrokerError> {
        let properties = self.handle.config.read_properties()?;
        for mismatch in properties.mismatches(&self.handle.config) {
            warn!("Broker {}: {}", self.id(), mismatch);
        }
        self.transition(ProcessState::Starting)?;
        let spawned = match launcher.spawn(&self.handle.config) {
            Ok(spawned) => spawned,
            Err(err) => {
                error!("Broker {}: unable to spawn: {}", self.id(), err);
                self.transition(ProcessState::Failed)?;
                return Err(BrokerError::Spawn(self.id(), err));
            },
        };
        self.handle.pid = spawned.pid();
        let config = &self.handle.config;
        let probe_result = wait
            .until(|| {
                let exit_status = spawned.exit_status();
                async move {
                    match exit_status {
                        Some(exit_status) => Err(exit_status),
                        None => Ok(launcher.is_reachable(config).await),
                    }
                }
            })
            .await;
        self.spawned = Some(spawned);
        match probe_result {
            Ok(elapsed) => {
                self.transition(ProcessState::Running)?;
                info!(
                    "Broker {} running on {} after {:?}",
                    self.id(),
                    self.handle.config.address(),
                    elapsed
                );
                Ok(self.handle())
            },
            Err(WaitError::TimedOut(_, timeout)) => {
                self.transition(ProcessState::Failed)?;
                Err(BrokerError::StartTimeout(self.id(), self.handle.config.port(), timeout))
            },
            Err(WaitError::Aborted(_, exit_status)) => {
                self.transition(ProcessState::Failed)?;
                Err(BrokerError::ExitedDuringStartup(self.id(), exit_status))
            },
        }
    }

    /// How the process ended, `None` while it runs or when it was never spawned.
    pub fn exit_status(&self) -> Option<String> {
        self.spawned.as_ref().and_then(|spawned| spawned.exit_status())
    }

    /// A running broker whose process has not exited.
    pub fn is_alive(&self) -> bool {
        self.handle.is_running() && self.spawned.is_some() && self.exit_status().is_none()
    }

    /// Stops the process if one was spawned. Stopping a stopped broker does nothing.
    #[instrument(skip(self), fields(broker_id = self.id()))]
    pub async fn stop(&mut self) -> Result<(), BrokerError> {
        if self.handle.state == ProcessState::Stopped {
            return Ok(());
        }
        self.transition(ProcessState::Stopped)?;
        if let Some(mut spawned) = self.spawned.take() {
            let exit_status = spawned.stop(STOP_GRACE).await;
            info!("Broker {} stopped: {:?}", self.id(), exit_status);
        }
        Ok(())
    }
}
