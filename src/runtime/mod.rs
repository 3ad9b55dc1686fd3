use async_trait::async_trait;
use bollard::models::ServiceSpec;

use crate::error::Result;

pub mod docker;
pub use docker::DockerGateway;

/// A swarm service as read from the orchestrator.
#[derive(Debug, Clone)]
pub struct CurrentService {
    pub id: String,
    /// Optimistic concurrency index; must be sent back unchanged on apply.
    pub version: u64,
    pub spec: ServiceSpec,
}

impl CurrentService {
    /// Image reference of the service's container, if it has one.
    pub fn image(&self) -> Option<&str> {
        container_image(&self.spec)
    }
}

pub fn container_image(spec: &ServiceSpec) -> Option<&str> {
    spec.task_template
        .as_ref()?
        .container_spec
        .as_ref()?
        .image
        .as_deref()
}

#[async_trait]
pub trait SwarmGateway: Send + Sync {
    /// Name of the node this daemon talks to.
    async fn node_name(&self) -> Result<String>;

    /// Fetch a service by name together with its current version.
    async fn fetch_service(&self, name: &str) -> Result<CurrentService>;

    /// Submit `spec` for the service `id`, rejected if `version` is stale.
    async fn apply_service(&self, id: &str, version: u64, spec: ServiceSpec) -> Result<()>;
}
