//! Topic administration over the running brokers of the fleet.
//! Requests are validated before any broker is contacted; commands that fail to reach a broker
//! are retried with the configured backoff. Fleet-wide listings collect per-broker failures
//! next to the successful answers.

use super::{validate_topic_name, Topic, TopicError, TopicRegistry};
use crate::broker::broker_process::BrokerHandle;
use crate::broker::BrokerId;
use crate::tools::{TopicClient, ToolError};
use crate::utils::bounded_wait::Backoff;
use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use tracing_attributes::instrument;

/// The topics of every running broker, and the brokers that could not be queried.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FleetTopicListing {
    pub per_broker: BTreeMap<BrokerId, Vec<String>>,
    pub failures: BTreeMap<BrokerId, TopicError>,
}

impl FleetTopicListing {
    /// The union of the topics seen on every broker.
    pub fn all_topics(&self) -> BTreeSet<String> {
        self.per_broker.values().flatten().cloned().collect()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A created topic and the fleet's view right after its creation.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicCreation {
    pub topic: Topic,
    pub listing: FleetTopicListing,
}

#[derive(Debug)]
pub struct TopicAdmin<T> {
    tools: Arc<T>,
    metadata: Arc<RwLock<TopicRegistry>>,
    backoff: Backoff,
}

/// Finds a broker that accepts administrative commands.
fn running_broker(brokers: &[BrokerHandle], broker_id: BrokerId) -> Result<&BrokerHandle, TopicError> {
    let broker = brokers
        .iter()
        .find(|broker| broker.id() == broker_id)
        .ok_or(TopicError::UnknownBroker(broker_id))?;
    if !broker.is_running() {
        return Err(TopicError::BrokerNotRunning(broker_id, broker.state()));
    }
    Ok(broker)
}

impl<T: TopicClient> TopicAdmin<T> {
    pub fn new(tools: Arc<T>, metadata: Arc<RwLock<TopicRegistry>>, backoff: Backoff) -> Self {
        Self { tools, metadata, backoff }
    }

    /// Creates `name` on `target_broker_id` and registers it in the fleet metadata.
    /// A retry that finds the topic already present counts as a success, since the attempt
    /// that failed may have created it. On success every running broker is listed again, brokers that fail to answer are
    /// reported in the returned listing.
    #[instrument(skip(self, brokers))]
    pub async fn create_topic(
        &self,
        brokers: &[BrokerHandle],
        name: &str,
        replication_factor: u16,
        target_broker_id: BrokerId,
    ) -> Result<TopicCreation, TopicError> {
        if replication_factor < 1 {
            return Err(TopicError::InvalidReplicationFactor(name.to_string(), replication_factor));
        }
        validate_topic_name(name)?;
        let broker = running_broker(brokers, target_broker_id)?;
        let address = &broker.config().address();
        let tools = &self.tools;
        let attempts = &AtomicU32::new(0);
        self.backoff
            .retry(
                &format!("create topic {} on broker {}", name, target_broker_id),
                move || async move {
                    let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                    match tools.create_topic(address, name, replication_factor).await {
                        // An earlier attempt may have created it before failing.
                        Err(ToolError::TopicExists(_)) if attempt > 0 => {
                            warn!("Topic {} found after {} failed attempts", name, attempt);
                            Ok(())
                        },
                        res => res,
                    }
                },
                ToolError::is_transient,
            )
            .await
            .map_err(|err| match err {
                ToolError::TopicExists(_) => TopicError::TopicAlreadyExists(name.to_string()),
                ToolError::Rejected(_, reason) => TopicError::Rejected(name.to_string(), reason),
                err => TopicError::BrokerUnreachable(target_broker_id, err.to_string()),
            })?;
        let topic = Topic::new(name, replication_factor, Some(target_broker_id));
        if !self.metadata.write().await.register(topic.clone()) {
            warn!("Topic {} was already registered in the fleet metadata", name);
        }
        info!("Created {}", topic);
        let listing = self.list_fleet_topics(brokers).await;
        Ok(TopicCreation { topic, listing })
    }

    /// The topics of one running broker, sorted and without duplicates.
    #[instrument(skip(self, brokers))]
    pub async fn list_topics(
        &self,
        brokers: &[BrokerHandle],
        broker_id: BrokerId,
    ) -> Result<Vec<String>, TopicError> {
        let broker = running_broker(brokers, broker_id)?;
        let address = &broker.config().address();
        let tools = &self.tools;
        let mut topics = self
            .backoff
            .retry(
                &format!("list topics on broker {}", broker_id),
                move || tools.list_topics(address),
                ToolError::is_transient,
            )
            .await
            .map_err(|err| TopicError::BrokerUnreachable(broker_id, err.to_string()))?;
        topics.sort();
        topics.dedup();
        debug!("Broker {} has {} topics", broker_id, topics.len());
        Ok(topics)
    }

    /// Lists every running broker concurrently. Brokers that are not running are not queried,
    /// so a fleet without running brokers yields an empty listing.
    pub async fn list_fleet_topics(&self, brokers: &[BrokerHandle]) -> FleetTopicListing {
        let running: Vec<BrokerId> =
            brokers.iter().filter(|broker| broker.is_running()).map(BrokerHandle::id).collect();
        let results =
            join_all(running.iter().map(|broker_id| self.list_topics(brokers, *broker_id))).await;
        let mut listing = FleetTopicListing::default();
        for (broker_id, result) in running.into_iter().zip(results) {
            match result {
                Ok(topics) => {
                    listing.per_broker.insert(broker_id, topics);
                },
                Err(err) => {
                    warn!("Unable to list the topics of broker {}: {}", broker_id, err);
                    listing.failures.insert(broker_id, err);
                },
            }
        }
        listing
    }

    /// The topics created through this fleet, by name.
    pub async fn registered_topics(&self) -> Vec<Topic> {
        self.metadata.read().await.topics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::broker_states::ProcessState;
    use crate::testing::{running_fleet, FakeCluster};
    use std::time::Duration;

    fn admin(cluster: &Arc<FakeCluster>) -> TopicAdmin<FakeCluster> {
        TopicAdmin::new(
            cluster.clone(),
            Arc::new(RwLock::new(TopicRegistry::default())),
            Backoff::new(3, Duration::from_millis(200)),
        )
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn it_creates_and_lists_a_topic() {
        let cluster = Arc::new(FakeCluster::new());
        let (supervisor, _) = running_fleet(&cluster, 1).await;
        let brokers = supervisor.list_brokers();
        let admin = admin(&cluster);
        let creation = admin.create_topic(&brokers, "t1", 1, 0).await.unwrap();
        assert_eq!(creation.topic, Topic::new("t1", 1, Some(0)));
        assert_eq!(creation.listing.per_broker.get(&0), Some(&vec![String::from("t1")]));
        let topics = admin.list_topics(&brokers, 0).await.unwrap();
        assert_eq!(topics.iter().filter(|topic| *topic == "t1").count(), 1);
        assert_eq!(admin.registered_topics().await, vec![Topic::new("t1", 1, Some(0))]);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn it_validates_before_calling_a_broker() {
        let cluster = Arc::new(FakeCluster::new());
        let (supervisor, _) = running_fleet(&cluster, 1).await;
        let brokers = supervisor.list_brokers();
        let admin = admin(&cluster);
        assert!(matches!(
            admin.create_topic(&brokers, "t1", 0, 0).await,
            Err(TopicError::InvalidReplicationFactor(_, 0))
        ));
        assert!(matches!(
            admin.create_topic(&brokers, "no spaces", 1, 0).await,
            Err(TopicError::InvalidTopicName(..))
        ));
        assert!(matches!(
            admin.create_topic(&brokers, "t1", 1, 7).await,
            Err(TopicError::UnknownBroker(7))
        ));
        assert_eq!(cluster.create_calls(), 0);
        assert_eq!(cluster.list_calls(), 0);
        assert!(admin.registered_topics().await.is_empty());
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn it_requires_a_running_broker() {
        let cluster = Arc::new(FakeCluster::new().with_unreachable_port(9093));
        let (supervisor, _) = running_fleet(&cluster, 2).await;
        let brokers = supervisor.list_brokers();
        let admin = admin(&cluster);
        assert_eq!(
            admin.create_topic(&brokers, "t1", 1, 1).await.unwrap_err(),
            TopicError::BrokerNotRunning(1, ProcessState::Failed)
        );
        assert_eq!(
            admin.list_topics(&brokers, 1).await.unwrap_err(),
            TopicError::BrokerNotRunning(1, ProcessState::Failed)
        );
        assert_eq!(cluster.create_calls(), 0);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn it_reports_existing_topics() {
        let cluster = Arc::new(FakeCluster::new());
        let (supervisor, _) = running_fleet(&cluster, 1).await;
        let brokers = supervisor.list_brokers();
        let admin = admin(&cluster);
        admin.create_topic(&brokers, "t1", 1, 0).await.unwrap();
        assert_eq!(
            admin.create_topic(&brokers, "t1", 1, 0).await.unwrap_err(),
            TopicError::TopicAlreadyExists(String::from("t1"))
        );
        // Not transient, so not retried.
        assert_eq!(cluster.create_calls(), 2);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn it_registers_a_topic_created_by_a_timed_out_attempt() {
        let cluster = Arc::new(FakeCluster::new().with_timed_out_creates(1));
        let (supervisor, _) = running_fleet(&cluster, 1).await;
        let brokers = supervisor.list_brokers();
        let admin = admin(&cluster);
        let creation = admin.create_topic(&brokers, "t1", 1, 0).await.unwrap();
        assert_eq!(cluster.create_calls(), 2);
        assert_eq!(creation.topic, Topic::new("t1", 1, Some(0)));
        assert_eq!(creation.listing.per_broker.get(&0), Some(&vec![String::from("t1")]));
        assert_eq!(admin.registered_topics().await, vec![Topic::new("t1", 1, Some(0))]);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn it_keeps_the_registry_consistent_under_concurrent_creates() {
        let cluster = Arc::new(FakeCluster::new());
        let (supervisor, _) = running_fleet(&cluster, 2).await;
        let brokers = supervisor.list_brokers();
        let admin = Arc::new(admin(&cluster));
        let names: Vec<String> = (0..8).map(|idx| format!("topic-{}", idx)).collect();
        let creations = join_all(names.iter().enumerate().map(|(idx, name)| {
            let admin = admin.clone();
            let brokers = &brokers;
            async move { admin.create_topic(brokers, name, 1, (idx % 2) as BrokerId).await }
        }))
        .await;
        for (name, creation) in names.iter().zip(creations) {
            let creation = creation.unwrap();
            assert_eq!(&creation.topic.name, name);
            assert!(creation.listing.is_complete());
            assert_eq!(creation.listing.per_broker.len(), 2);
            for topics in creation.listing.per_broker.values() {
                assert!(topics.contains(name), "{} missing from {:?}", name, topics);
                assert!(topics.windows(2).all(|pair| pair[0] < pair[1]));
            }
        }
        let registered: Vec<String> =
            admin.registered_topics().await.into_iter().map(|topic| topic.name).collect();
        assert_eq!(registered, names);
        assert_eq!(cluster.create_calls(), 8);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn it_retries_unreachable_brokers_then_gives_up() {
        let cluster = Arc::new(FakeCluster::new().with_failing_admin(9092));
        let (supervisor, _) = running_fleet(&cluster, 1).await;
        let brokers = supervisor.list_brokers();
        let admin = admin(&cluster);
        let start = tokio::time::Instant::now();
        let err = admin.list_topics(&brokers, 0).await.unwrap_err();
        assert!(matches!(err, TopicError::BrokerUnreachable(0, _)));
        assert_eq!(cluster.list_calls(), 3);
        assert!(start.elapsed() >= Duration::from_millis(600));
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn it_collects_partial_failures_in_fleet_listings() {
        let cluster =
            Arc::new(FakeCluster::new().with_unreachable_port(9093).with_failing_admin(9094));
        let (supervisor, _) = running_fleet(&cluster, 4).await;
        let brokers = supervisor.list_brokers();
        let admin = admin(&cluster);
        let creation = admin.create_topic(&brokers, "t1", 1, 0).await.unwrap();
        let listing = creation.listing;
        assert_eq!(listing.per_broker.keys().copied().collect::<Vec<_>>(), vec![0, 3]);
        assert_eq!(listing.failures.keys().copied().collect::<Vec<_>>(), vec![2]);
        assert!(!listing.is_complete());
        assert_eq!(listing.all_topics().into_iter().collect::<Vec<_>>(), vec![String::from("t1")]);
    }

    #[test_log::test(tokio::test)]
    async fn it_lists_nothing_without_running_brokers() {
        let cluster = Arc::new(FakeCluster::new());
        let admin = admin(&cluster);
        let listing = admin.list_fleet_topics(&[]).await;
        assert_eq!(listing, FleetTopicListing::default());
        assert_eq!(cluster.list_calls(), 0);
    }
}
