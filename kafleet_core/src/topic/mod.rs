//! Topics
//! Topics are created through `TopicAdmin` and recorded in the fleet's shared `TopicRegistry`.
//! Topics found on a broker that were not created through the admin carry no creating broker.

pub mod topic_admin;

use crate::broker::broker_states::ProcessState;
use crate::broker::BrokerId;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

pub use self::topic_admin::{FleetTopicListing, TopicAdmin, TopicCreation};

/// The longest topic name a broker accepts.
pub const MAX_TOPIC_NAME_LENGTH: usize = 249;

lazy_static! {
    static ref LEGAL_TOPIC_NAME: Regex = Regex::new(r"^[a-zA-Z0-9._-]+$").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Topic {
    pub name: String,
    pub replication_factor: u16,
    pub created_on_broker_id: Option<BrokerId>,
}

impl Topic {
    pub fn new(name: &str, replication_factor: u16, created_on_broker_id: Option<BrokerId>) -> Self {
        Self { name: name.to_string(), replication_factor, created_on_broker_id }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.created_on_broker_id {
            Some(id) => write!(
                f,
                "{} (replication factor {}, created on broker {})",
                self.name, self.replication_factor, id
            ),
            None => write!(f, "{} (replication factor {})", self.name, self.replication_factor),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TopicError {
    #[error("Broker {0} is {1}, topics can only be administered on a running broker")]
    BrokerNotRunning(BrokerId, ProcessState),
    #[error("Broker {0} is not part of the fleet")]
    UnknownBroker(BrokerId),
    #[error("Topic {0}: replication factor {1} must be at least 1")]
    InvalidReplicationFactor(String, u16),
    #[error("Broker {0} is unreachable: {1}")]
    BrokerUnreachable(BrokerId, String),
    #[error("Invalid topic name {0:?}: {1}")]
    InvalidTopicName(String, String),
    #[error("Topic {0} already exists")]
    TopicAlreadyExists(String),
    #[error("Topic {0} was rejected by the broker: {1}")]
    Rejected(String, String),
}

/// Checks a name against the rules brokers apply to topic names.
pub fn validate_topic_name(name: &str) -> Result<(), TopicError> {
    let invalid = |reason: &str| Err(TopicError::InvalidTopicName(name.to_string(), reason.to_string()));
    if name.is_empty() {
        return invalid("the name is empty");
    }
    if name == "." || name == ".." {
        return invalid("'.' and '..' are reserved");
    }
    if name.len() > MAX_TOPIC_NAME_LENGTH {
        return invalid(&format!("longer than {} characters", MAX_TOPIC_NAME_LENGTH));
    }
    if !LEGAL_TOPIC_NAME.is_match(name) {
        return invalid("only ASCII alphanumerics, '.', '_' and '-' are allowed");
    }
    Ok(())
}

/// The topics created through the fleet, shared between the admin and the supervisor.
#[derive(Debug, Default)]
pub struct TopicRegistry {
    topics: BTreeMap<String, Topic>,
}

impl TopicRegistry {
    /// Returns false when a topic with the same name was already registered, the first
    /// registration is kept.
    pub fn register(&mut self, topic: Topic) -> bool {
        if self.topics.contains_key(&topic.name) {
            return false;
        }
        self.topics.insert(topic.name.clone(), topic);
        true
    }

    pub fn get(&self, name: &str) -> Option<&Topic> {
        self.topics.get(name)
    }

    pub fn topics(&self) -> Vec<Topic> {
        self.topics.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}
