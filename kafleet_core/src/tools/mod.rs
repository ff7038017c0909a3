//! The process boundary of the fleet.
//! Everything the fleet does is eventually delegated to an external program: the host service
//! manager, the broker start script and the Kafka command line tools. Each concern is a trait so
//! the supervisor can be driven by the real tools (`KafkaCli`, `Systemctl`) or by in-memory
//! implementations.

pub mod kafka_cli;
pub mod systemctl;

use crate::broker::broker_config::{BrokerAddress, BrokerConfig};
use crate::service::ServiceState;
use std::future::Future;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub use self::kafka_cli::KafkaCli;
pub use self::systemctl::Systemctl;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Unable to run {0}: {1}")]
    Spawn(String, #[source] io::Error),
    #[error("{0} exited with {1}: {2}")]
    Failed(String, String, String),
    #[error("{0} did not finish within {1:?}")]
    Timeout(String, Duration),
    #[error("{0} could not reach the broker: {1}")]
    Unreachable(String, String),
    #[error("Topic {0} already exists")]
    TopicExists(String),
    #[error("{0} rejected the request: {1}")]
    Rejected(String, String),
    #[error("Unexpected output from {0}: {1}")]
    UnexpectedOutput(String, String),
    #[error("Task error {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ToolError {
    /// Whether running the same command again may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Failed(..) | Self::Timeout(..) | Self::Unreachable(..))
    }
}

/// A topic as reported by the broker's `--describe` output.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicDescription {
    pub name: String,
    pub replication_factor: u16,
}

/// Starts the service manager's named services and reports their state.
pub trait ServiceManager: Send + Sync {
    fn status(&self, service: &str) -> impl Future<Output = Result<ServiceState, ToolError>> + Send;
    fn start(&self, service: &str) -> impl Future<Output = Result<(), ToolError>> + Send;
}

/// Launches broker processes and probes their administrative port.
pub trait BrokerLauncher: Send + Sync {
    /// Spawns the broker, returning as soon as the process exists.
    fn spawn(&self, config: &BrokerConfig) -> Result<SpawnedBroker, ToolError>;
    /// Whether the broker accepts connections on its port.
    fn is_reachable(&self, config: &BrokerConfig) -> impl Future<Output = bool> + Send;
}

/// Administrative operations addressed to a single broker.
pub trait TopicClient: Send + Sync {
    fn create_topic(
        &self,
        broker: &BrokerAddress,
        topic: &str,
        replication_factor: u16,
    ) -> impl Future<Output = Result<(), ToolError>> + Send;
    fn list_topics(
        &self,
        broker: &BrokerAddress,
    ) -> impl Future<Output = Result<Vec<String>, ToolError>> + Send;
    fn describe_topics(
        &self,
        broker: &BrokerAddress,
    ) -> impl Future<Output = Result<Vec<TopicDescription>, ToolError>> + Send;
}

/// Data plane operations addressed to a single broker.
pub trait MessageClient: Send + Sync {
    /// Attaches a consumer to `topic`, it is attached once the returned future completes.
    fn subscribe(
        &self,
        broker: &BrokerAddress,
        topic: &str,
    ) -> impl Future<Output = Result<Subscription, ToolError>> + Send;
    fn produce(
        &self,
        broker: &BrokerAddress,
        topic: &str,
        payload: &str,
    ) -> impl Future<Output = Result<(), ToolError>> + Send;
}

/// A launched broker process, watched by a task that reports its exit.
/// The process is not awaited by its owner: `exit_status` only reads the last known state.
#[derive(Debug)]
pub struct SpawnedBroker {
    pid: Option<u32>,
    exit_rx: watch::Receiver<Option<String>>,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SpawnedBroker {
    /// Runs `watch_process` in a task. It receives the stop signal and resolves to a description
    /// of how the process ended.
    pub fn supervise<F, Fut>(pid: Option<u32>, watch_process: F) -> Self
    where
        F: FnOnce(oneshot::Receiver<()>) -> Fut,
        Fut: Future<Output = String> + Send + 'static,
    {
        let (exit_tx, exit_rx) = watch::channel(None);
        let (stop_tx, stop_rx) = oneshot::channel();
        let process = watch_process(stop_rx);
        let task = tokio::spawn(async move {
            let exit_status = process.await;
            debug!("Broker process {:?} ended: {}", pid, exit_status);
            let _ = exit_tx.send(Some(exit_status));
        });
        Self { pid, exit_rx, stop_tx: Some(stop_tx), task: Some(task) }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// `None` while the process is alive.
    pub fn exit_status(&self) -> Option<String> {
        self.exit_rx.borrow().clone()
    }

    /// Signals the process to stop and waits up to `grace` for the watcher to report the exit.
    pub async fn stop(&mut self, grace: Duration) -> Option<String> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(task) = self.task.take() {
            match tokio::time::timeout(grace, task).await {
                Ok(Ok(())) => {},
                Ok(Err(err)) => warn!("Broker process {:?} watcher failed: {}", self.pid, err),
                Err(_) => warn!("Broker process {:?} did not stop within {:?}", self.pid, grace),
            }
        }
        self.exit_status()
    }
}

impl Drop for SpawnedBroker {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
    }
}

/// An attached consumer. Messages arrive in order; the consumer is stopped on `close` or drop.
#[derive(Debug)]
pub struct Subscription {
    topic: String,
    messages: mpsc::Receiver<Result<String, ToolError>>,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(
        topic: &str,
        messages: mpsc::Receiver<Result<String, ToolError>>,
        stop_tx: oneshot::Sender<()>,
        task: JoinHandle<()>,
    ) -> Self {
        Self { topic: topic.to_string(), messages, stop_tx: Some(stop_tx), task: Some(task) }
    }

    /// `None` once the consumer has ended.
    pub async fn next(&mut self) -> Option<Result<String, ToolError>> {
        self.messages.recv().await
    }

    /// Stops the consumer and waits for its task to release the process.
    pub async fn close(mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        self.messages.close();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!("Consumer of {} failed: {}", self.topic, err);
            }
        }
        debug!("Consumer of {} closed", self.topic);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
    }
}
