//! The fleet ties the components together: host services are started first, then the
//! brokers, after which topic administration and smoke tests are available as commands.

pub mod command;
pub mod supervisor;

use crate::broker::broker_process::BrokerHandle;
use crate::broker::BrokerError;
use crate::config::{FleetConfig, FleetConfigError};
use crate::harness::{HarnessError, SmokeTestHarness};
use crate::service::{ServiceController, ServiceError};
use crate::tools::{
    BrokerLauncher, KafkaCli, MessageClient, ServiceManager, Systemctl, TopicClient,
};
use crate::topic::{TopicAdmin, TopicError, TopicRegistry};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};
use tracing_attributes::instrument;

pub use self::command::{CommandOutcome, FleetCommand, MenuChoice};
pub use self::supervisor::FleetSupervisor;

#[derive(Error, Debug)]
pub enum FleetError {
    #[error("Config {0}")]
    Config(#[from] FleetConfigError),
    #[error("Service {0}")]
    Service(#[from] ServiceError),
    #[error("Broker {0}")]
    Broker(#[from] BrokerError),
    #[error("Topic {0}")]
    Topic(#[from] TopicError),
    #[error("Smoke test {0}")]
    Harness(#[from] HarnessError),
    #[error("Invalid menu choice {0:?}")]
    InvalidMenuChoice(String),
}

/// The fleet driven by the Kafka command line tools and systemctl.
pub type KafkaFleet = Fleet<KafkaCli, Systemctl>;

#[derive(Debug)]
pub struct Fleet<T, S> {
    config: FleetConfig,
    services: ServiceController<S>,
    supervisor: FleetSupervisor<T>,
    admin: TopicAdmin<T>,
    harness: SmokeTestHarness<T>,
}

impl KafkaFleet {
    pub fn from_config(config: FleetConfig) -> Self {
        let tools = Arc::new(KafkaCli::new(&config));
        let services = Arc::new(Systemctl::new(config.service.use_sudo));
        Self::new(config, tools, services)
    }
}

impl<T, S> Fleet<T, S>
where
    T: BrokerLauncher + TopicClient + MessageClient + 'static,
    S: ServiceManager,
{
    pub fn new(config: FleetConfig, tools: Arc<T>, services: Arc<S>) -> Self {
        let metadata = Arc::new(RwLock::new(TopicRegistry::default()));
        let backoff = config.admin.backoff();
        Self {
            services: ServiceController::from_section(services, &config.service),
            supervisor: FleetSupervisor::new(
                config.broker.clone(),
                tools.clone(),
                metadata.clone(),
                backoff,
            ),
            admin: TopicAdmin::new(tools.clone(), metadata, backoff),
            harness: SmokeTestHarness::new(tools),
            config,
        }
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    pub fn supervisor(&self) -> &FleetSupervisor<T> {
        &self.supervisor
    }

    /// Makes sure the host services are active, then starts the brokers. A service that
    /// cannot be started aborts the bootstrap, broker failures are returned per broker.
    #[instrument(skip(self))]
    pub async fn bootstrap(&mut self) -> Result<Vec<Result<BrokerHandle, BrokerError>>, FleetError> {
        self.services.ensure_all(&self.config.service.names).await?;
        info!("Services ready: {:?}", self.config.service.names);
        Ok(self.supervisor.start_fleet().await)
    }

    #[instrument(skip(self))]
    pub async fn dispatch(&self, command: FleetCommand) -> Result<CommandOutcome, FleetError> {
        let brokers = self.supervisor.list_brokers();
        let outcome = match command {
            FleetCommand::ListTopics { broker_id: Some(broker_id) } => CommandOutcome::Topics {
                broker_id,
                topics: self.admin.list_topics(&brokers, broker_id).await?,
            },
            FleetCommand::ListTopics { broker_id: None } => {
                CommandOutcome::FleetTopics(self.admin.list_fleet_topics(&brokers).await)
            },
            FleetCommand::CreateTopic { name, replication_factor, broker_id } => {
                CommandOutcome::TopicCreated(
                    self.admin.create_topic(&brokers, &name, replication_factor, broker_id).await?,
                )
            },
            FleetCommand::SmokeTest { topic, broker_id, timeout } => {
                let broker = self.supervisor.broker(broker_id)?;
                let timeout = timeout.unwrap_or(self.config.admin.smoke_test_timeout);
                CommandOutcome::SmokeTestPassed(
                    self.harness.run_smoke_test(&broker, &topic, timeout).await?,
                )
            },
            FleetCommand::ListBrokers => CommandOutcome::Brokers(brokers),
            FleetCommand::Exit => CommandOutcome::Exit,
        };
        debug!("Outcome: {:?}", outcome);
        Ok(outcome)
    }

    pub async fn shutdown(&mut self) {
        self.supervisor.shutdown().await;
    }
}
