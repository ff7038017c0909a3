//! One-shot produce and consume checks against a topic.


use crate::broker::BrokerId;
use crate::tools::ToolError;
use std::time::Duration;
use thiserror::Error;

pub use self::smoke_test::SmokeTestHarness;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("No message observed on topic {0} within {1:?}")]
    Timeout(String, Duration),
    #[error("Producer for topic {0} failed: {1}")]
    ProducerError(String, #[source] ToolError),
    #[error("Consumer for topic {0} failed: {1}")]
    ConsumerError(String, #[source] ToolError),
    #[error("Broker {0} is not running, topic {1} cannot be tested")]
    BrokerNotRunning(BrokerId, String),
}

/// The message the consumer observed.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedMessage {
    pub topic: String,
    pub payload: String,
    pub broker_id: BrokerId,
    /// From the start of the test until the message was observed
    pub elapsed: Duration,
}
