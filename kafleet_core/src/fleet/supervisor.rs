//! The fleet supervisor owns every broker process it launched.
//! Brokers are started one at a time in ascending id order, each followed by a settle delay.
//! Callers only ever receive `BrokerHandle` snapshots, the supervisor keeps the authoritative
//! state and the spawned processes until `shutdown`.

use crate::broker::broker_config::BrokerConfig;
use crate::broker::broker_process::{BrokerHandle, BrokerProcess};
use crate::broker::{BrokerError, BrokerId};
use crate::config::broker::BrokerSection;
use crate::tools::{BrokerLauncher, TopicClient, ToolError};
use crate::topic::{Topic, TopicRegistry};
use crate::utils::bounded_wait::{Backoff, BoundedWait};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use tracing_attributes::instrument;

#[derive(Debug)]
pub struct FleetSupervisor<T> {
    section: BrokerSection,
    tools: Arc<T>,
    brokers: BTreeMap<BrokerId, BrokerProcess>,
    metadata: Arc<RwLock<TopicRegistry>>,
    backoff: Backoff,
}

impl<T: BrokerLauncher> FleetSupervisor<T> {
    pub fn new(
        section: BrokerSection,
        tools: Arc<T>,
        metadata: Arc<RwLock<TopicRegistry>>,
        backoff: Backoff,
    ) -> Self {
        Self { section, tools, brokers: BTreeMap::new(), metadata, backoff }
    }

    fn reachability_wait(&self, broker_id: BrokerId) -> BoundedWait {
        BoundedWait::new(
            &format!("broker {} reachability", broker_id),
            self.section.reachability_timeout,
            self.section.poll_interval,
        )
    }

    /// Starts one broker. A broker id can only be started once, and a broker whose
    /// configuration file is missing is neither spawned nor added to the fleet.
    /// A broker that was spawned but failed stays in the fleet as `Failed`.
    #[instrument(skip(self), fields(broker_id = config.id()))]
    pub async fn start_broker(&mut self, config: BrokerConfig) -> Result<BrokerHandle, BrokerError> {
        let broker_id = config.id();
        if self.brokers.contains_key(&broker_id) {
            return Err(BrokerError::DuplicateBroker(broker_id));
        }
        let wait = self.reachability_wait(broker_id);
        let mut process = BrokerProcess::new(config);
        let res = process.start(self.tools.as_ref(), &wait).await;
        if let Err(BrokerError::ConfigNotFound(..)) = res {
            return res;
        }
        if let Err(err) = &res {
            error!("Broker {} failed to start: {}", broker_id, err);
        }
        self.brokers.insert(broker_id, process);
        res
    }

    /// Starts the configured brokers in ascending id order, waiting the settle delay after
    /// each one. Failures are reported per broker and do not stop the remaining brokers.
    #[instrument(skip(self))]
    pub async fn start_fleet(&mut self) -> Vec<Result<BrokerHandle, BrokerError>> {
        let configs = self.section.broker_configs();
        let total = configs.len();
        let mut res = Vec::with_capacity(total);
        for (idx, config) in configs.into_iter().enumerate() {
            res.push(self.start_broker(config).await);
            if idx + 1 < total {
                debug!("Settling for {:?}", self.section.settle_delay);
                tokio::time::sleep(self.section.settle_delay).await;
            }
        }
        let running = res.iter().filter(|outcome| outcome.is_ok()).count();
        info!("{} of {} brokers running", running, total);
        res
    }

    /// Snapshots of every broker of the fleet, by ascending id.
    pub fn list_brokers(&self) -> Vec<BrokerHandle> {
        self.brokers.values().map(BrokerProcess::handle).collect()
    }

    pub fn running_brokers(&self) -> Vec<BrokerHandle> {
        self.brokers
            .values()
            .filter(|process| process.state().is_running())
            .map(BrokerProcess::handle)
            .collect()
    }

    pub fn broker(&self, broker_id: BrokerId) -> Result<BrokerHandle, BrokerError> {
        self.brokers
            .get(&broker_id)
            .map(BrokerProcess::handle)
            .ok_or(BrokerError::UnknownBroker(broker_id))
    }

    /// Whether a running broker's process is still alive.
    pub fn is_alive(&self, broker_id: BrokerId) -> Result<bool, BrokerError> {
        let process = self.brokers.get(&broker_id).ok_or(BrokerError::UnknownBroker(broker_id))?;
        if process.state().is_running() && !process.is_alive() {
            warn!("Broker {} exited: {:?}", broker_id, process.exit_status());
        }
        Ok(process.is_alive())
    }

    pub async fn stop_broker(&mut self, broker_id: BrokerId) -> Result<BrokerHandle, BrokerError> {
        let process =
            self.brokers.get_mut(&broker_id).ok_or(BrokerError::UnknownBroker(broker_id))?;
        process.stop().await?;
        Ok(process.handle())
    }

    /// Stops every broker, in descending id order.
    #[instrument(skip(self))]
    pub async fn shutdown(&mut self) {
        for (broker_id, process) in self.brokers.iter_mut().rev() {
            if let Err(err) = process.stop().await {
                error!("Unable to stop broker {}: {}", broker_id, err);
            }
        }
        info!("Fleet shut down");
    }

    pub fn metadata(&self) -> Arc<RwLock<TopicRegistry>> {
        self.metadata.clone()
    }

    pub fn tools(&self) -> Arc<T> {
        self.tools.clone()
    }
}

impl<T: BrokerLauncher + TopicClient> FleetSupervisor<T> {
    /// The topics a broker reports, with the creating broker filled in for topics created
    /// through the fleet.
    #[instrument(skip(self))]
    pub async fn topics_on_broker(&self, broker_id: BrokerId) -> Result<BTreeSet<Topic>, BrokerError> {
        let handle = self.broker(broker_id)?;
        if !handle.is_running() {
            return Err(BrokerError::Unreachable(broker_id, format!("broker is {}", handle.state())));
        }
        let address = &handle.config().address();
        let tools = &self.tools;
        let descriptions = self
            .backoff
            .retry(
                &format!("describe topics on broker {}", broker_id),
                move || tools.describe_topics(address),
                ToolError::is_transient,
            )
            .await
            .map_err(|err| BrokerError::Unreachable(broker_id, err.to_string()))?;
        let metadata = self.metadata.read().await;
        Ok(descriptions
            .into_iter()
            .map(|description| {
                let created_on_broker_id = metadata
                    .get(&description.name)
                    .and_then(|topic| topic.created_on_broker_id);
                Topic::new(&description.name, description.replication_factor, created_on_broker_id)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::broker_states::ProcessState;
    use crate::testing::{broker_section, running_fleet, FakeCluster};
    use std::time::Duration;

    fn supervisor(cluster: &Arc<FakeCluster>, count: u32) -> FleetSupervisor<FakeCluster> {
        FleetSupervisor::new(
            broker_section(count),
            cluster.clone(),
            Arc::new(RwLock::new(TopicRegistry::default())),
            Backoff::new(2, Duration::from_millis(100)),
        )
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn it_lists_brokers_by_id() {
        let cluster = Arc::new(FakeCluster::new());
        let section = broker_section(3);
        let mut supervisor = supervisor(&cluster, 3);
        for broker_id in &[2, 0, 1] {
            supervisor.start_broker(section.broker_config(*broker_id)).await.unwrap();
        }
        assert_eq!(cluster.spawned(), vec![2, 0, 1]);
        let ids: Vec<BrokerId> = supervisor.list_brokers().iter().map(BrokerHandle::id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn it_rejects_duplicate_brokers() {
        let cluster = Arc::new(FakeCluster::new());
        let section = broker_section(1);
        let mut supervisor = supervisor(&cluster, 1);
        supervisor.start_broker(section.broker_config(0)).await.unwrap();
        assert!(matches!(
            supervisor.start_broker(section.broker_config(0)).await,
            Err(BrokerError::DuplicateBroker(0))
        ));
        assert_eq!(cluster.spawned(), vec![0]);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn it_never_spawns_without_a_config_file() {
        let cluster = Arc::new(FakeCluster::new());
        let mut supervisor = supervisor(&cluster, 1);
        let config = BrokerConfig::new(0, "/nonexistent/kafka/config/server-0.properties", 9092);
        assert!(matches!(
            supervisor.start_broker(config).await,
            Err(BrokerError::ConfigNotFound(0, _))
        ));
        assert!(cluster.spawned().is_empty());
        assert!(supervisor.list_brokers().is_empty());
        assert!(matches!(supervisor.broker(0), Err(BrokerError::UnknownBroker(0))));
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn it_keeps_starting_after_a_failure() {
        let cluster = Arc::new(FakeCluster::new().with_unreachable_port(9093));
        let start = tokio::time::Instant::now();
        let (supervisor, outcomes) = running_fleet(&cluster, 3).await;
        assert!(outcomes[0].is_ok());
        assert!(matches!(outcomes[1], Err(BrokerError::StartTimeout(1, 9093, _))));
        assert!(outcomes[2].is_ok());
        let states: Vec<ProcessState> =
            supervisor.list_brokers().iter().map(BrokerHandle::state).collect();
        assert_eq!(states, vec![ProcessState::Running, ProcessState::Failed, ProcessState::Running]);
        assert_eq!(
            supervisor.running_brokers().iter().map(BrokerHandle::id).collect::<Vec<_>>(),
            vec![0, 2]
        );
        // Two settle delays, one between each pair of brokers.
        assert!(start.elapsed() >= Duration::from_secs(10));
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn it_reports_topics_on_a_broker() {
        let cluster = Arc::new(FakeCluster::new().with_topic("external", 2));
        let (supervisor, _) = running_fleet(&cluster, 1).await;
        supervisor.metadata().write().await.register(Topic::new("t1", 1, Some(0)));
        cluster.add_topic("t1", 1);
        let topics: Vec<Topic> = supervisor.topics_on_broker(0).await.unwrap().into_iter().collect();
        assert_eq!(topics, vec![Topic::new("external", 2, None), Topic::new("t1", 1, Some(0))]);
        assert!(matches!(supervisor.topics_on_broker(5).await, Err(BrokerError::UnknownBroker(5))));
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn it_reports_unreachable_brokers() {
        let cluster =
            Arc::new(FakeCluster::new().with_unreachable_port(9093).with_failing_admin(9092));
        let (supervisor, _) = running_fleet(&cluster, 2).await;
        assert!(matches!(supervisor.topics_on_broker(0).await, Err(BrokerError::Unreachable(0, _))));
        assert!(matches!(supervisor.topics_on_broker(1).await, Err(BrokerError::Unreachable(1, _))));
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn it_stops_every_broker_on_shutdown() {
        let cluster = Arc::new(FakeCluster::new());
        let (mut supervisor, _) = running_fleet(&cluster, 2).await;
        assert!(supervisor.is_alive(1).unwrap());
        let stopped = supervisor.stop_broker(1).await.unwrap();
        assert_eq!(stopped.state(), ProcessState::Stopped);
        assert!(!supervisor.is_alive(1).unwrap());
        supervisor.shutdown().await;
        assert!(supervisor
            .list_brokers()
            .iter()
            .all(|broker| broker.state() == ProcessState::Stopped));
        assert!(supervisor.running_brokers().is_empty());
    }
}
