use async_trait::async_trait;
use bollard::errors::Error as BollardError;
use bollard::models::ServiceSpec;
use bollard::service::{InspectServiceOptions, UpdateServiceOptions};
use bollard::{Docker, API_DEFAULT_VERSION};
use log::{debug, warn};

use super::{CurrentService, SwarmGateway};
use crate::error::{Error, Result};

/// Message the swarm manager returns when the submitted version is stale.
const OUT_OF_SEQUENCE: &str = "update out of sequence";

/// [`SwarmGateway`] talking to a Docker engine in swarm mode.
#[derive(Debug, Clone)]
pub struct DockerGateway {
    docker: Docker,
}

impl DockerGateway {
    /// Builds a client for `host`; no request is made until first use.
    ///
    /// `unix://` paths use the socket, `tcp://` and `http://` use plain HTTP,
    /// anything else falls back to the local defaults.
    pub fn connect(host: &str, timeout_secs: u64) -> anyhow::Result<Self> {
        let docker = if host.starts_with("unix://") {
            Docker::connect_with_unix(host, timeout_secs, API_DEFAULT_VERSION)?
        } else if host.starts_with("tcp://") || host.starts_with("http://") {
            Docker::connect_with_http(host, timeout_secs, API_DEFAULT_VERSION)?
        } else {
            warn!("Unrecognised docker host {:?}, using local defaults", host);
            Docker::connect_with_local_defaults()?
        };
        Ok(Self { docker })
    }
}

#[async_trait]
impl SwarmGateway for DockerGateway {
    async fn node_name(&self) -> Result<String> {
        let info = self
            .docker
            .info()
            .await
            .map_err(|e| Error::Orchestrator(e.to_string()))?;
        Ok(info.name.unwrap_or_default())
    }

    async fn fetch_service(&self, name: &str) -> Result<CurrentService> {
        let opts = InspectServiceOptions {
            insert_defaults: false,
        };
        let service = self
            .docker
            .inspect_service(name, Some(opts))
            .await
            .map_err(|e| {
                debug!("Inspect of service {} failed: {}", name, e);
                Error::ServiceUnavailable(name.to_string())
            })?;

        let id = service
            .id
            .ok_or_else(|| Error::Orchestrator(format!("service {name} has no id")))?;
        let version = service
            .version
            .and_then(|v| v.index)
            .ok_or_else(|| Error::Orchestrator(format!("service {name} has no version")))?;
        let spec = service
            .spec
            .ok_or_else(|| Error::MissingContainerSpec(name.to_string()))?;

        Ok(CurrentService { id, version, spec })
    }

    async fn apply_service(&self, id: &str, version: u64, spec: ServiceSpec) -> Result<()> {
        let opts = UpdateServiceOptions {
            version,
            ..Default::default()
        };
        let response = self
            .docker
            .update_service(id, spec, opts, None)
            .await
            .map_err(classify_apply_error)?;

        for warning in response.warnings.unwrap_or_default() {
            warn!("Engine warning while updating service {}: {}", id, warning);
        }
        Ok(())
    }
}

fn classify_apply_error(err: BollardError) -> Error {
    match err {
        BollardError::DockerResponseServerError {
            status_code,
            message,
        } if status_code == 409 || message.contains(OUT_OF_SEQUENCE) => Error::Conflict(message),
        other => Error::Orchestrator(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_version_maps_to_conflict() {
        let err = classify_apply_error(BollardError::DockerResponseServerError {
            status_code: 500,
            message: "rpc error: code = Unknown desc = update out of sequence".into(),
        });
        assert!(matches!(err, Error::Conflict(_)));

        let err = classify_apply_error(BollardError::DockerResponseServerError {
            status_code: 409,
            message: "conflict".into(),
        });
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn other_failures_map_to_orchestrator() {
        let err = classify_apply_error(BollardError::DockerResponseServerError {
            status_code: 400,
            message: "invalid mount config".into(),
        });
        assert!(matches!(err, Error::Orchestrator(_)));
    }

    #[test]
    fn connect_does_not_touch_the_network() {
        assert!(DockerGateway::connect("tcp://127.0.0.1:2375", 5).is_ok());
    }
}
