#![warn(rust_2018_idioms)]
//! Supervision of a small fleet of Kafka brokers: host services, broker processes, topic
//! administration and smoke tests, all driven through the Kafka command line tools.

pub mod broker;
pub mod config;
pub mod fleet;
pub mod harness;
pub mod service;
pub mod tools;
pub mod topic;
pub mod utils;

#[cfg(test)]
pub mod testing;
