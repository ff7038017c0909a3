//! Starts host services and waits for them to become active.

use super::{validate_service_name, ServiceError, ServiceState};
use crate::config::service::ServiceSection;
use crate::tools::ServiceManager;
use crate::utils::bounded_wait::{BoundedWait, WaitError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use tracing_attributes::instrument;

#[derive(Debug)]
pub struct ServiceController<S> {
    manager: Arc<S>,
    start_timeout: Duration,
    poll_interval: Duration,
}

impl<S: ServiceManager> ServiceController<S> {
    pub fn new(manager: Arc<S>, start_timeout: Duration, poll_interval: Duration) -> Self {
        Self { manager, start_timeout, poll_interval }
    }

    pub fn from_section(manager: Arc<S>, section: &ServiceSection) -> Self {
        Self::new(manager, section.start_timeout, section.poll_interval)
    }

    /// Queries the host, never cached.
    pub async fn status(&self, service: &str) -> Result<ServiceState, ServiceError> {
        validate_service_name(service)?;
        self.manager
            .status(service)
            .await
            .map_err(|err| ServiceError::Unavailable(service.to_string(), err))
    }

    /// Makes sure `service` is active, starting it if needed. A service that is already
    /// active is left untouched and one that is activating is only waited on, so repeated
    /// calls issue at most one start.
    #[instrument(skip(self))]
    pub async fn ensure_running(&self, service: &str) -> Result<(), ServiceError> {
        match self.status(service).await? {
            ServiceState::Active => {
                debug!("Service {} already active", service);
                return Ok(());
            },
            ServiceState::Activating => info!("Service {} is already starting", service),
            ServiceState::Inactive | ServiceState::Unknown => {
                info!("Starting service {}", service);
                self.manager
                    .start(service)
                    .await
                    .map_err(|err| ServiceError::Unavailable(service.to_string(), err))?;
            },
        }
        let wait =
            BoundedWait::new(&format!("service {}", service), self.start_timeout, self.poll_interval);
        let manager = &self.manager;
        match wait
            .until(|| async move {
                manager.status(service).await.map(|state| state.is_active())
            })
            .await
        {
            Ok(elapsed) => {
                info!("Service {} active after {:?}", service, elapsed);
                Ok(())
            },
            Err(WaitError::TimedOut(..)) => {
                Err(ServiceError::StartTimeout(service.to_string(), self.start_timeout))
            },
            Err(WaitError::Aborted(_, err)) => {
                Err(ServiceError::Unavailable(service.to_string(), err))
            },
        }
    }

    /// Runs `ensure_running` over `services` in order, stopping at the first failure.
    pub async fn ensure_all(&self, services: &[String]) -> Result<(), ServiceError> {
        for service in services {
            self.ensure_running(service).await?;
        }
        Ok(())
    }
}
