//! The Kafka command line tools as the fleet's process boundary.
//! Brokers are launched with `kafka-server-start.sh`, topics are administered with
//! `kafka-topics.sh` and the smoke test uses the console producer and consumer. Their text
//! output is parsed here and nowhere else.

use super::{
    BrokerLauncher, MessageClient, SpawnedBroker, Subscription, TopicClient, TopicDescription,
    ToolError,
};
use crate::broker::broker_config::{BrokerAddress, BrokerConfig};
use crate::config::FleetConfig;
use lazy_static::lazy_static;
use regex::Regex;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};
use tracing_attributes::instrument;

pub const SERVER_START_SCRIPT: &str = "kafka-server-start.sh";
pub const TOPICS_SCRIPT: &str = "kafka-topics.sh";
pub const CONSOLE_PRODUCER_SCRIPT: &str = "kafka-console-producer.sh";
pub const CONSOLE_CONSUMER_SCRIPT: &str = "kafka-console-consumer.sh";

/// Buffered consumer lines, the smoke test only ever needs the first few.
const CONSUMER_CHANNEL_SIZE: usize = 64;

lazy_static! {
    // Topic: t1	TopicId: X	PartitionCount: 1	ReplicationFactor: 1	Configs:
    // Partition lines also start with "Topic:" but carry no ReplicationFactor.
    static ref DESCRIBE_TOPIC: Regex =
        Regex::new(r"^Topic:\s*(?P<name>\S+)\s.*\bReplicationFactor:\s*(?P<rf>\d+)").unwrap();
    static ref UNREACHABLE: Regex = Regex::new(
        r"(?i)(TimeoutException|could not be established|Connection refused|Broker may not be available)"
    )
    .unwrap();
    static ref REJECTED: Regex = Regex::new(
        r"(InvalidReplicationFactorException|InvalidTopicException|InvalidPartitionsException|larger than available brokers)"
    )
    .unwrap();
}

/// Drives the scripts found in the `bin/` directory of a Kafka installation.
#[derive(Debug, Clone)]
pub struct KafkaCli {
    install_root: PathBuf,
    log_dir: PathBuf,
    command_timeout: Duration,
    probe_timeout: Duration,
}

impl KafkaCli {
    pub fn new(config: &FleetConfig) -> Self {
        Self {
            install_root: config.broker.install_root.clone(),
            log_dir: config.broker.log_dir.clone(),
            command_timeout: config.admin.command_timeout,
            probe_timeout: config.broker.poll_interval,
        }
    }

    fn script(&self, name: &str) -> PathBuf {
        self.install_root.join("bin").join(name)
    }

    /// Runs a script to completion, killing it when `command_timeout` elapses.
    async fn run_script(&self, name: &str, args: &[String]) -> Result<Output, ToolError> {
        trace!("run_script: {} {:?}", name, args);
        let mut command = Command::new(self.script(name));
        command.args(args).stdin(Stdio::null()).kill_on_drop(true);
        match tokio::time::timeout(self.command_timeout, command.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(err)) => Err(ToolError::Spawn(name.to_string(), err)),
            Err(_) => Err(ToolError::Timeout(name.to_string(), self.command_timeout)),
        }
    }

    /// Runs `kafka-topics.sh` against a broker, returning its stdout on success.
    async fn run_topics(&self, broker: &BrokerAddress, args: &[&str]) -> Result<String, ToolError> {
        let mut full_args = vec![String::from("--bootstrap-server"), broker.to_string()];
        full_args.extend(args.iter().map(|arg| arg.to_string()));
        let output = self.run_script(TOPICS_SCRIPT, &full_args).await?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if output.status.success() {
            if !stderr.trim().is_empty() {
                debug!("{} {}: {}", TOPICS_SCRIPT, broker, stderr.trim());
            }
            Ok(stdout)
        } else {
            Err(classify_failure(TOPICS_SCRIPT, &output.status.to_string(), &stderr, &stdout))
        }
    }

    fn broker_log_file(&self, config: &BrokerConfig) -> Result<std::fs::File, ToolError> {
        let path = broker_log_path(&self.log_dir, config);
        fs_err::create_dir_all(&self.log_dir)
            .map_err(|err| ToolError::Spawn(SERVER_START_SCRIPT.to_string(), err))?;
        OpenOptions::new().create(true).append(true).open(&path).map_err(|err| {
            error!("Unable to open broker log {}: {}", path.display(), err);
            ToolError::Spawn(SERVER_START_SCRIPT.to_string(), err)
        })
    }
}

/// Maps a failed invocation to the error kind its output describes.
pub fn classify_failure(script: &str, status: &str, stderr: &str, stdout: &str) -> ToolError {
    let text = format!("{}\n{}", stderr, stdout);
    let first_line = text.lines().map(str::trim).find(|line| !line.is_empty()).unwrap_or("");
    if text.contains("TopicExistsException") || text.contains("already exists") {
        let topic = text
            .split('\'')
            .nth(1)
            .map(str::to_string)
            .unwrap_or_else(|| first_line.to_string());
        ToolError::TopicExists(topic)
    } else if REJECTED.is_match(&text) {
        ToolError::Rejected(script.to_string(), first_line.to_string())
    } else if UNREACHABLE.is_match(&text) {
        ToolError::Unreachable(script.to_string(), first_line.to_string())
    } else {
        ToolError::Failed(script.to_string(), status.to_string(), first_line.to_string())
    }
}

/// One topic name per line, blank lines ignored.
pub fn parse_topic_list(stdout: &str) -> Vec<String> {
    stdout.lines().map(str::trim).filter(|line| !line.is_empty()).map(str::to_string).collect()
}

/// Topic summary lines of `--describe`, partition lines are skipped.
pub fn parse_topic_descriptions(stdout: &str) -> Result<Vec<TopicDescription>, ToolError> {
    let mut res = vec![];
    for line in stdout.lines().map(str::trim) {
        if let Some(captures) = DESCRIBE_TOPIC.captures(line) {
            let replication_factor = captures["rf"].parse::<u16>().map_err(|err| {
                ToolError::UnexpectedOutput(TOPICS_SCRIPT.to_string(), format!("{}: {}", line, err))
            })?;
            res.push(TopicDescription { name: captures["name"].to_string(), replication_factor });
        }
    }
    Ok(res)
}

impl BrokerLauncher for KafkaCli {
    #[instrument]
    fn spawn(&self, config: &BrokerConfig) -> Result<SpawnedBroker, ToolError> {
        let log = self.broker_log_file(config)?;
        let log_err = log
            .try_clone()
            .map_err(|err| ToolError::Spawn(SERVER_START_SCRIPT.to_string(), err))?;
        let mut child = Command::new(self.script(SERVER_START_SCRIPT))
            .arg(config.config_path())
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .spawn()
            .map_err(|err| ToolError::Spawn(SERVER_START_SCRIPT.to_string(), err))?;
        let pid = child.id();
        info!("Broker {} spawned with pid {:?}", config.id(), pid);
        Ok(SpawnedBroker::supervise(pid, move |stop_rx| async move {
            let exited = tokio::select! {
                status = child.wait() => Some(status),
                _ = stop_rx => None,
            };
            match exited {
                Some(Ok(status)) => status.to_string(),
                Some(Err(err)) => format!("unable to wait for the process: {}", err),
                None => match child.kill().await {
                    Ok(()) => String::from("stopped by the supervisor"),
                    Err(err) => format!("unable to stop the process: {}", err),
                },
            }
        }))
    }

    async fn is_reachable(&self, config: &BrokerConfig) -> bool {
        let address = config.address();
        let connect = TcpStream::connect((address.host.as_str(), address.port));
        match tokio::time::timeout(self.probe_timeout, connect).await {
            Ok(Ok(_)) => true,
            Ok(Err(err)) => {
                trace!("Broker {} not reachable on {}: {}", config.id(), address, err);
                false
            },
            Err(_) => false,
        }
    }
}

impl TopicClient for KafkaCli {
    #[instrument]
    async fn create_topic(
        &self,
        broker: &BrokerAddress,
        topic: &str,
        replication_factor: u16,
    ) -> Result<(), ToolError> {
        let replication_factor = replication_factor.to_string();
        let stdout = self
            .run_topics(broker, &["--create", "--replication-factor", &replication_factor, "--topic", topic])
            .await?;
        debug!("{}", stdout.trim());
        Ok(())
    }

    #[instrument]
    async fn list_topics(&self, broker: &BrokerAddress) -> Result<Vec<String>, ToolError> {
        Ok(parse_topic_list(&self.run_topics(broker, &["--list"]).await?))
    }

    #[instrument]
    async fn describe_topics(
        &self,
        broker: &BrokerAddress,
    ) -> Result<Vec<TopicDescription>, ToolError> {
        parse_topic_descriptions(&self.run_topics(broker, &["--describe"]).await?)
    }
}

impl MessageClient for KafkaCli {
    #[instrument]
    async fn subscribe(&self, broker: &BrokerAddress, topic: &str) -> Result<Subscription, ToolError> {
        let mut child = Command::new(self.script(CONSOLE_CONSUMER_SCRIPT))
            .args(["--bootstrap-server", &broker.to_string(), "--topic", topic, "--from-beginning"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| ToolError::Spawn(CONSOLE_CONSUMER_SCRIPT.to_string(), err))?;
        let stdout = child.stdout.take().ok_or_else(|| {
            ToolError::UnexpectedOutput(CONSOLE_CONSUMER_SCRIPT.to_string(), String::from("no stdout"))
        })?;
        let (tx, rx) = mpsc::channel(CONSUMER_CHANNEL_SIZE);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => {
                            if tx.send(Ok(line)).await.is_err() {
                                break;
                            }
                        },
                        Ok(None) => {
                            let status = match child.wait().await {
                                Ok(status) => status.to_string(),
                                Err(err) => err.to_string(),
                            };
                            let _ = tx
                                .send(Err(ToolError::Failed(
                                    CONSOLE_CONSUMER_SCRIPT.to_string(),
                                    status,
                                    String::from("consumer exited"),
                                )))
                                .await;
                            return;
                        },
                        Err(err) => {
                            let _ = tx.send(Err(ToolError::Spawn(CONSOLE_CONSUMER_SCRIPT.to_string(), err))).await;
                            break;
                        },
                    },
                }
            }
            if let Err(err) = child.kill().await {
                warn!("Unable to stop {}: {}", CONSOLE_CONSUMER_SCRIPT, err);
            }
        });
        Ok(Subscription::new(topic, rx, stop_tx, task))
    }

    #[instrument(skip(payload))]
    async fn produce(&self, broker: &BrokerAddress, topic: &str, payload: &str) -> Result<(), ToolError> {
        let mut child = Command::new(self.script(CONSOLE_PRODUCER_SCRIPT))
            .args(["--bootstrap-server", &broker.to_string(), "--topic", topic])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| ToolError::Spawn(CONSOLE_PRODUCER_SCRIPT.to_string(), err))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(format!("{}\n", payload).as_bytes())
                .await
                .map_err(|err| ToolError::Spawn(CONSOLE_PRODUCER_SCRIPT.to_string(), err))?;
            // Closing stdin makes the console producer flush and exit.
            drop(stdin);
        }
        let output = match tokio::time::timeout(self.command_timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => return Err(ToolError::Spawn(CONSOLE_PRODUCER_SCRIPT.to_string(), err)),
            Err(_) => {
                return Err(ToolError::Timeout(CONSOLE_PRODUCER_SCRIPT.to_string(), self.command_timeout))
            },
        };
        if output.status.success() {
            Ok(())
        } else {
            Err(classify_failure(
                CONSOLE_PRODUCER_SCRIPT,
                &output.status.to_string(),
                &String::from_utf8_lossy(&output.stderr),
                "",
            ))
        }
    }
}

/// Used by the binary to tell the user where a broker's output goes.
pub fn broker_log_path(log_dir: &Path, config: &BrokerConfig) -> PathBuf {
    log_dir.join(format!("broker-{}.log", config.id()))
}
