//! In-memory implementations of the tool traits and fleet fixtures for tests.

use crate::broker::broker_config::{BrokerAddress, BrokerConfig};
use crate::broker::broker_process::BrokerHandle;
use crate::broker::{BrokerError, BrokerId};
use crate::config::broker::BrokerSection;
use crate::config::{FleetConfig, FleetConfigProperties};
use crate::fleet::FleetSupervisor;
use crate::service::ServiceState;
use crate::tools::kafka_cli::{CONSOLE_PRODUCER_SCRIPT, TOPICS_SCRIPT};
use crate::tools::{
    BrokerLauncher, MessageClient, ServiceManager, SpawnedBroker, Subscription, TopicClient,
    TopicDescription, ToolError,
};
use crate::topic::TopicRegistry;
use crate::utils::bounded_wait::Backoff;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock};

/// Writes `server-<id>.properties` files for `count` brokers under a fresh install root and
/// returns the fleet configuration pointing at it.
pub fn fleet_config(count: u32) -> FleetConfig {
    let install_root = std::env::temp_dir().join(format!("kafleet-{}", uuid::Uuid::new_v4()));
    let config_dir = install_root.join("config");
    std::fs::create_dir_all(&config_dir).unwrap();
    for id in 0..count {
        let content = format!(
            "broker.id={}\nlisteners=PLAINTEXT://localhost:{}\nlog.dirs=/tmp/kafka-logs-{}\n",
            id,
            9092 + id,
            id
        );
        std::fs::write(config_dir.join(format!("server-{}.properties", id)), content).unwrap();
    }
    let mut props = FleetConfigProperties::default();
    for property in &[
        format!("install.root={}", install_root.display()),
        format!("broker.count={}", count),
        String::from("broker.reachability.timeout.ms=2000"),
        String::from("broker.poll.interval.ms=100"),
        String::from("service.start.timeout.ms=5000"),
        String::from("service.poll.interval.ms=100"),
        String::from("service.use.sudo=false"),
    ] {
        props.try_set_override(property).unwrap();
    }
    props.build().unwrap()
}

pub fn broker_section(count: u32) -> BrokerSection {
    fleet_config(count).broker
}

/// Starts a fleet of `count` brokers against `cluster`.
pub async fn running_fleet(
    cluster: &Arc<FakeCluster>,
    count: u32,
) -> (FleetSupervisor<FakeCluster>, Vec<Result<BrokerHandle, BrokerError>>) {
    let mut supervisor = FleetSupervisor::new(
        broker_section(count),
        cluster.clone(),
        Arc::new(RwLock::new(TopicRegistry::default())),
        Backoff::new(3, Duration::from_millis(200)),
    );
    let outcomes = supervisor.start_fleet().await;
    (supervisor, outcomes)
}

#[derive(Debug, Default)]
struct ServicesState {
    states: HashMap<String, ServiceState>,
    starts: HashMap<String, usize>,
    refused: HashSet<String>,
    unreachable: bool,
    status_calls: usize,
}

/// A service manager whose services become active as soon as they are started.
#[derive(Debug, Default)]
pub struct FakeServiceManager {
    state: Mutex<ServicesState>,
}

impl FakeServiceManager {
    pub fn set_state(&self, service: &str, state: ServiceState) {
        self.state.lock().unwrap().states.insert(service.to_string(), state);
    }

    pub fn status_of(&self, service: &str) -> ServiceState {
        self.state.lock().unwrap().states.get(service).copied().unwrap_or(ServiceState::Inactive)
    }

    /// Starts of `service` are accepted but it never becomes active.
    pub fn refuse_activation(&self, service: &str) {
        self.state.lock().unwrap().refused.insert(service.to_string());
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unwrap().unreachable = unreachable;
    }

    pub fn start_count(&self, service: &str) -> usize {
        self.state.lock().unwrap().starts.get(service).copied().unwrap_or(0)
    }

    pub fn status_calls(&self) -> usize {
        self.state.lock().unwrap().status_calls
    }
}

impl ServiceManager for FakeServiceManager {
    async fn status(&self, service: &str) -> Result<ServiceState, ToolError> {
        let mut state = self.state.lock().unwrap();
        state.status_calls += 1;
        if state.unreachable {
            return Err(ToolError::Unreachable(
                String::from("systemctl"),
                String::from("Failed to connect to bus"),
            ));
        }
        Ok(state.states.get(service).copied().unwrap_or(ServiceState::Inactive))
    }

    async fn start(&self, service: &str) -> Result<(), ToolError> {
        let mut state = self.state.lock().unwrap();
        *state.starts.entry(service.to_string()).or_insert(0) += 1;
        if !state.refused.contains(service) {
            state.states.insert(service.to_string(), ServiceState::Active);
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ClusterState {
    spawned: Vec<BrokerId>,
    topics: BTreeMap<String, u16>,
    records: BTreeMap<String, Vec<String>>,
    subscribers: Vec<(String, mpsc::Sender<Result<String, ToolError>>)>,
    events: Vec<String>,
    create_calls: usize,
    list_calls: usize,
}

/// Brokers, topics and records held in memory. Every broker is reachable and answers admin
/// commands unless configured otherwise.
#[derive(Debug, Default)]
pub struct FakeCluster {
    unreachable_ports: HashSet<u16>,
    exiting_brokers: HashSet<BrokerId>,
    failing_admin_ports: HashSet<u16>,
    failing_producer: bool,
    no_delivery: bool,
    timed_out_creates: usize,
    state: Mutex<ClusterState>,
    closed_subscriptions: Arc<AtomicUsize>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Brokers listening on `port` never accept connections.
    pub fn with_unreachable_port(mut self, port: u16) -> Self {
        self.unreachable_ports.insert(port);
        self
    }

    /// The process of broker `id` exits right after it is spawned.
    pub fn with_exiting_broker(mut self, id: BrokerId) -> Self {
        self.exiting_brokers.insert(id);
        self
    }

    /// Admin commands addressed to `port` fail as if the broker could not be reached.
    pub fn with_failing_admin(mut self, port: u16) -> Self {
        self.failing_admin_ports.insert(port);
        self
    }

    /// The first `count` creates store the topic but report a timeout.
    pub fn with_timed_out_creates(mut self, count: usize) -> Self {
        self.timed_out_creates = count;
        self
    }

    pub fn with_failing_producer(mut self) -> Self {
        self.failing_producer = true;
        self
    }

    /// Produced records are accepted but never reach a consumer.
    pub fn without_delivery(mut self) -> Self {
        self.no_delivery = true;
        self
    }

    pub fn with_topic(self, name: &str, replication_factor: u16) -> Self {
        self.add_topic(name, replication_factor);
        self
    }

    pub fn with_record(self, topic: &str, payload: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .records
            .entry(topic.to_string())
            .or_default()
            .push(payload.to_string());
        self
    }

    pub fn add_topic(&self, name: &str, replication_factor: u16) {
        self.state.lock().unwrap().topics.insert(name.to_string(), replication_factor);
    }

    pub fn spawned(&self) -> Vec<BrokerId> {
        self.state.lock().unwrap().spawned.clone()
    }

    pub fn create_calls(&self) -> usize {
        self.state.lock().unwrap().create_calls
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }

    pub fn events(&self) -> Vec<String> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn closed_subscriptions(&self) -> usize {
        self.closed_subscriptions.load(Ordering::SeqCst)
    }

    fn check_admin(&self, broker: &BrokerAddress) -> Result<(), ToolError> {
        if self.failing_admin_ports.contains(&broker.port) {
            return Err(ToolError::Unreachable(
                TOPICS_SCRIPT.to_string(),
                format!("Connection to node -1 ({}) could not be established.", broker),
            ));
        }
        Ok(())
    }
}

impl BrokerLauncher for FakeCluster {
    fn spawn(&self, config: &BrokerConfig) -> Result<SpawnedBroker, ToolError> {
        self.state.lock().unwrap().spawned.push(config.id());
        let exits = self.exiting_brokers.contains(&config.id());
        Ok(SpawnedBroker::supervise(Some(10_000 + config.id()), move |stop_rx| async move {
            if exits {
                String::from("exit status: 1")
            } else {
                let _ = stop_rx.await;
                String::from("signal: 9 (SIGKILL)")
            }
        }))
    }

    async fn is_reachable(&self, config: &BrokerConfig) -> bool {
        !self.unreachable_ports.contains(&config.port())
    }
}

impl TopicClient for FakeCluster {
    async fn create_topic(
        &self,
        broker: &BrokerAddress,
        topic: &str,
        replication_factor: u16,
    ) -> Result<(), ToolError> {
        self.state.lock().unwrap().create_calls += 1;
        self.check_admin(broker)?;
        let mut state = self.state.lock().unwrap();
        if state.topics.contains_key(topic) {
            return Err(ToolError::TopicExists(topic.to_string()));
        }
        state.topics.insert(topic.to_string(), replication_factor);
        if state.create_calls <= self.timed_out_creates {
            return Err(ToolError::Timeout(TOPICS_SCRIPT.to_string(), Duration::from_secs(30)));
        }
        Ok(())
    }

    async fn list_topics(&self, broker: &BrokerAddress) -> Result<Vec<String>, ToolError> {
        self.state.lock().unwrap().list_calls += 1;
        self.check_admin(broker)?;
        Ok(self.state.lock().unwrap().topics.keys().cloned().collect())
    }

    async fn describe_topics(
        &self,
        broker: &BrokerAddress,
    ) -> Result<Vec<TopicDescription>, ToolError> {
        self.check_admin(broker)?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .topics
            .iter()
            .map(|(name, replication_factor)| TopicDescription {
                name: name.clone(),
                replication_factor: *replication_factor,
            })
            .collect())
    }
}

impl MessageClient for FakeCluster {
    async fn subscribe(
        &self,
        _broker: &BrokerAddress,
        topic: &str,
    ) -> Result<Subscription, ToolError> {
        let (tx, rx) = mpsc::channel(64);
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        {
            let mut state = self.state.lock().unwrap();
            state.events.push(format!("subscribe {}", topic));
            for record in state.records.get(topic).cloned().unwrap_or_default() {
                let _ = tx.try_send(Ok(record));
            }
            state.subscribers.push((topic.to_string(), tx));
        }
        let closed = self.closed_subscriptions.clone();
        let task = tokio::spawn(async move {
            let _ = stop_rx.await;
            closed.fetch_add(1, Ordering::SeqCst);
        });
        Ok(Subscription::new(topic, rx, stop_tx, task))
    }

    async fn produce(
        &self,
        _broker: &BrokerAddress,
        topic: &str,
        payload: &str,
    ) -> Result<(), ToolError> {
        let mut state = self.state.lock().unwrap();
        state.events.push(format!("produce {}", topic));
        if self.failing_producer {
            return Err(ToolError::Failed(
                CONSOLE_PRODUCER_SCRIPT.to_string(),
                String::from("exit status: 1"),
                String::from("org.apache.kafka.common.errors.TimeoutException"),
            ));
        }
        if self.no_delivery {
            return Ok(());
        }
        state.records.entry(topic.to_string()).or_default().push(payload.to_string());
        for (subscribed_topic, tx) in &state.subscribers {
            if subscribed_topic == topic {
                let _ = tx.try_send(Ok(payload.to_string()));
            }
        }
        Ok(())
    }
}

