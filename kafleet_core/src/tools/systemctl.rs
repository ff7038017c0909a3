//! `systemctl` as the host service manager.

use super::{ServiceManager, ToolError};
use crate::service::ServiceState;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, trace};
use tracing_attributes::instrument;

pub const SYSTEMCTL: &str = "systemctl";
const SUDO: &str = "sudo";

#[derive(Debug, Clone)]
pub struct Systemctl {
    /// Prefix start requests with `sudo`
    use_sudo: bool,
}

impl Systemctl {
    pub fn new(use_sudo: bool) -> Self {
        Self { use_sudo }
    }

    fn start_command(&self, service: &str) -> Command {
        let mut command = if self.use_sudo {
            let mut command = Command::new(SUDO);
            command.arg(SYSTEMCTL);
            command
        } else {
            Command::new(SYSTEMCTL)
        };
        command.args(["start", service]).stdin(Stdio::null());
        command
    }
}

impl ServiceManager for Systemctl {
    #[instrument]
    async fn status(&self, service: &str) -> Result<ServiceState, ToolError> {
        // is-active exits non-zero for anything but active, the state word is on stdout.
        let output = Command::new(SYSTEMCTL)
            .args(["is-active", service])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|err| ToolError::Spawn(SYSTEMCTL.to_string(), err))?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        trace!("systemctl is-active {}: {} ({})", service, stdout.trim(), output.status);
        Ok(ServiceState::classify(&stdout))
    }

    #[instrument]
    async fn start(&self, service: &str) -> Result<(), ToolError> {
        let output = self
            .start_command(service)
            .output()
            .await
            .map_err(|err| ToolError::Spawn(SYSTEMCTL.to_string(), err))?;
        if output.status.success() {
            debug!("Requested start of {}", service);
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(ToolError::Rejected(
                format!("{} start {}", SYSTEMCTL, service),
                stderr.lines().next().unwrap_or("").to_string(),
            ))
        }
    }
}
