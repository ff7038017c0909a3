//! Commands accepted by the fleet and their outcomes.

use super::FleetError;
use crate::broker::broker_process::BrokerHandle;
use crate::broker::BrokerId;
use crate::harness::ReceivedMessage;
use crate::topic::{FleetTopicListing, TopicCreation};
use enum_iterator::IntoEnumIterator;
use itertools::Itertools;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum FleetCommand {
    /// A single broker's topics, or every running broker's when no broker is given
    ListTopics { broker_id: Option<BrokerId> },
    CreateTopic { name: String, replication_factor: u16, broker_id: BrokerId },
    /// Uses the configured smoke test timeout when none is given
    SmokeTest { topic: String, broker_id: BrokerId, timeout: Option<Duration> },
    ListBrokers,
    Exit,
}

/// The entries of the interactive menu, selected by their number.
#[derive(Debug, Clone, Copy, PartialEq, IntoEnumIterator)]
pub enum MenuChoice {
    ListTopics,
    CreateTopic,
    SmokeTest,
    Exit,
}

impl MenuChoice {
    pub fn number(&self) -> u8 {
        match self {
            Self::ListTopics => 1,
            Self::CreateTopic => 2,
            Self::SmokeTest => 3,
            Self::Exit => 4,
        }
    }

    /// The menu as shown to the user, one numbered entry per line.
    pub fn menu() -> String {
        Self::into_enum_iter().map(|choice| format!("{}. {}", choice.number(), choice)).join("\n")
    }
}

impl fmt::Display for MenuChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ListTopics => write!(f, "List Topics"),
            Self::CreateTopic => write!(f, "Create a Topic"),
            Self::SmokeTest => write!(f, "Produce and Consume Test Message"),
            Self::Exit => write!(f, "Exit"),
        }
    }
}

impl FromStr for MenuChoice {
    type Err = FleetError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let input = input.trim();
        Self::into_enum_iter()
            .find(|choice| choice.number().to_string() == input)
            .ok_or_else(|| FleetError::InvalidMenuChoice(input.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Topics { broker_id: BrokerId, topics: Vec<String> },
    FleetTopics(FleetTopicListing),
    TopicCreated(TopicCreation),
    SmokeTestPassed(ReceivedMessage),
    Brokers(Vec<BrokerHandle>),
    Exit,
}

fn fmt_topic_list(f: &mut fmt::Formatter<'_>, topics: &[String]) -> fmt::Result {
    if topics.is_empty() {
        write!(f, "No topics available.")
    } else {
        write!(f, "{}", topics.iter().map(|topic| format!("- {}", topic)).join("\n"))
    }
}

fn fmt_fleet_listing(f: &mut fmt::Formatter<'_>, listing: &FleetTopicListing) -> fmt::Result {
    if listing.per_broker.is_empty() && listing.failures.is_empty() {
        return write!(f, "No running brokers.");
    }
    for (broker_id, topics) in &listing.per_broker {
        writeln!(f, "Broker {} topics:", broker_id)?;
        fmt_topic_list(f, topics)?;
        writeln!(f)?;
    }
    for (broker_id, err) in &listing.failures {
        writeln!(f, "Broker {} could not be listed: {}", broker_id, err)?;
    }
    Ok(())
}

impl fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Topics { broker_id, topics } => {
                writeln!(f, "Broker {} topics:", broker_id)?;
                fmt_topic_list(f, topics)
            },
            Self::FleetTopics(listing) => fmt_fleet_listing(f, listing),
            Self::TopicCreated(creation) => {
                writeln!(f, "Created topic {}", creation.topic)?;
                fmt_fleet_listing(f, &creation.listing)
            },
            Self::SmokeTestPassed(received) => write!(
                f,
                "Broker {} delivered {:?} on topic {} in {:?}",
                received.broker_id, received.payload, received.topic, received.elapsed
            ),
            Self::Brokers(brokers) if brokers.is_empty() => write!(f, "No brokers."),
            Self::Brokers(brokers) => write!(
                f,
                "{}",
                brokers
                    .iter()
                    .map(|broker| match broker.pid() {
                        Some(pid) => format!(
                            "Broker {} on {}: {} (pid {})",
                            broker.id(),
                            broker.config().address(),
                            broker.state(),
                            pid
                        ),
                        None => format!(
                            "Broker {} on {}: {}",
                            broker.id(),
                            broker.config().address(),
                            broker.state()
                        ),
                    })
                    .join("\n")
            ),
            Self::Exit => write!(f, "Exiting."),
        }
    }
}
