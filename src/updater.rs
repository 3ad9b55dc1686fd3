//! Resolves tokens and drives a single status or update request end to end.
//!
//! Each request is handled on its own: validate, resolve the token, fetch the
//! service once, build the plan and apply it once. Nothing is retried; the
//! first failing step decides the response.

use std::sync::Arc;

use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::image::is_valid_tag;
use crate::plan::build_plan;
use crate::registry::Registry;
use crate::runtime::{container_image, SwarmGateway};
use crate::token;
use crate::types::{ServiceRegistration, ServiceView, StatusRequest, StopSignal, UpdateRequest};

pub struct Updater {
    registry: Registry,
    gateway: Arc<dyn SwarmGateway>,
}

impl Updater {
    pub fn new(registry: Registry, gateway: Arc<dyn SwarmGateway>) -> Self {
        Self { registry, gateway }
    }

    pub async fn node_name(&self) -> Result<String> {
        self.gateway.node_name().await
    }

    /// Reports the image currently configured for the token's service.
    pub async fn status(&self, req: &StatusRequest) -> Result<ServiceView> {
        check_token(&req.token)?;
        let registration = self.resolve(&req.token).await?;
        let current = self.gateway.fetch_service(&registration.service_name).await?;

        Ok(ServiceView {
            image: current.image().unwrap_or_default().to_string(),
            service: registration.service_name,
        })
    }

    /// Retags the token's service and submits the rolling update.
    pub async fn update(&self, req: &UpdateRequest) -> Result<ServiceView> {
        validate_update(req)?;
        debug!("Update request validated");

        let registration = self.resolve(&req.token).await?;
        let service = registration.service_name;
        debug!("Token resolved to service {}", service);

        let result = self.apply_update(&service, req).await;
        match &result {
            Ok(view) => info!("Service {} updated to {}", service, view.image),
            Err(e) => warn!("Update of service {} failed: {}", service, e),
        }
        result
    }

    /// Token lookup on the blocking pool, so a locked database file never
    /// stalls the runtime.
    async fn resolve(&self, token: &str) -> Result<ServiceRegistration> {
        let registry = self.registry.clone();
        let token = token.to_string();
        tokio::task::spawn_blocking(move || registry.resolve(&token))
            .await
            .map_err(|e| Error::Internal(format!("registry lookup task failed: {e}")))?
    }

    async fn apply_update(&self, service: &str, req: &UpdateRequest) -> Result<ServiceView> {
        let current = self.gateway.fetch_service(service).await?;
        debug!(
            "Fetched service {} (id {}, version {})",
            service, current.id, current.version
        );

        let spec = build_plan(&current.spec, req)?;
        let image = container_image(&spec).unwrap_or_default().to_string();
        debug!("Plan built for service {}: {}", service, image);

        self.gateway
            .apply_service(&current.id, current.version, spec)
            .await?;

        Ok(ServiceView {
            service: service.to_string(),
            image,
        })
    }
}

fn check_token(token: &str) -> Result<()> {
    if token.is_empty() {
        return Err(Error::InvalidInput("token is required".into()));
    }
    if !token::is_valid_format(token) {
        return Err(Error::InvalidTokenFormat);
    }
    Ok(())
}

/// Request-level checks that need no storage or orchestrator access.
pub fn validate_update(req: &UpdateRequest) -> Result<()> {
    check_token(&req.token)?;
    if req.tag.is_empty() {
        return Err(Error::InvalidInput("tag is required".into()));
    }
    if !is_valid_tag(&req.tag) {
        return Err(Error::InvalidInput(format!("invalid image tag {:?}", req.tag)));
    }
    if StopSignal::resolve(req.stop_signal.as_deref())? == StopSignal::Quit {
        warn!("Stop signal QUIT is not a POSIX signal name, passing it to the engine unchanged");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bollard::models::{
        ServiceSpec, ServiceSpecUpdateConfigFailureActionEnum, ServiceSpecUpdateConfigOrderEnum,
        TaskSpec, TaskSpecContainerSpec,
    };

    use super::*;
    use crate::runtime::CurrentService;

    /// In-memory swarm holding named services and recording every apply.
    #[derive(Default)]
    pub struct FakeSwarm {
        pub services: Mutex<Vec<CurrentService>>,
        pub applied: Mutex<Vec<(String, u64, ServiceSpec)>>,
        pub conflict: bool,
    }

    impl FakeSwarm {
        pub fn with_service(name: &str, image: &str) -> Self {
            let swarm = Self::default();
            swarm.services.lock().unwrap().push(CurrentService {
                id: format!("{name}-id"),
                version: 7,
                spec: ServiceSpec {
                    name: Some(name.into()),
                    task_template: Some(TaskSpec {
                        container_spec: Some(TaskSpecContainerSpec {
                            image: Some(image.into()),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            });
            swarm
        }
    }

    #[async_trait]
    impl SwarmGateway for FakeSwarm {
        async fn node_name(&self) -> Result<String> {
            Ok("manager-1".into())
        }

        async fn fetch_service(&self, name: &str) -> Result<CurrentService> {
            self.services
                .lock()
                .unwrap()
                .iter()
                .find(|s| s.spec.name.as_deref() == Some(name))
                .cloned()
                .ok_or_else(|| Error::ServiceUnavailable(name.into()))
        }

        async fn apply_service(&self, id: &str, version: u64, spec: ServiceSpec) -> Result<()> {
            if self.conflict {
                return Err(Error::Conflict("update out of sequence".into()));
            }
            self.applied
                .lock()
                .unwrap()
                .push((id.to_string(), version, spec));
            Ok(())
        }
    }

    fn setup(swarm: FakeSwarm) -> (Updater, Arc<FakeSwarm>, Registry) {
        let registry = Registry::open_in_memory().unwrap();
        let swarm = Arc::new(swarm);
        let updater = Updater::new(registry.clone(), swarm.clone());
        (updater, swarm, registry)
    }

    fn update_request(token: &str, tag: &str) -> UpdateRequest {
        UpdateRequest {
            token: token.into(),
            tag: tag.into(),
            start_first: true,
            stop_signal: None,
        }
    }

    #[tokio::test]
    async fn register_then_update_applies_retagged_spec() {
        let (updater, swarm, registry) = setup(FakeSwarm::with_service("web", "repo/web:v1"));
        let token = registry.register("web").unwrap();

        let view = updater.update(&update_request(&token, "v2")).await.unwrap();
        assert_eq!(
            view,
            ServiceView {
                service: "web".into(),
                image: "repo/web:v2".into()
            }
        );

        let applied = swarm.applied.lock().unwrap();
        assert_eq!(applied.len(), 1);
        let (id, version, spec) = &applied[0];
        assert_eq!(id, "web-id");
        assert_eq!(*version, 7);

        let update = spec.update_config.as_ref().unwrap();
        assert_eq!(update.order, Some(ServiceSpecUpdateConfigOrderEnum::START_FIRST));
        assert_eq!(
            update.failure_action,
            Some(ServiceSpecUpdateConfigFailureActionEnum::ROLLBACK)
        );

        let container = spec
            .task_template
            .as_ref()
            .unwrap()
            .container_spec
            .as_ref()
            .unwrap();
        assert_eq!(container.image.as_deref(), Some("repo/web:v2"));
        assert_eq!(
            container.env.as_deref().unwrap(),
            ["FLOCKMAN_IMAGE_TAG=v2", "FLOCKMAN_IMAGE_REPO=repo/web:"]
        );
    }

    #[tokio::test]
    async fn status_reports_current_image() {
        let (updater, _swarm, registry) = setup(FakeSwarm::with_service("web", "repo/web:v1"));
        let token = registry.register("web").unwrap();

        let view = updater.status(&StatusRequest { token }).await.unwrap();
        assert_eq!(view.service, "web");
        assert_eq!(view.image, "repo/web:v1");
    }

    #[tokio::test]
    async fn invalid_stop_signal_is_rejected_before_fetch() {
        let (updater, swarm, registry) = setup(FakeSwarm::with_service("web", "repo/web:v1"));
        let token = registry.register("web").unwrap();

        let mut req = update_request(&token, "v2");
        req.stop_signal = Some("BOGUS".into());
        assert!(matches!(
            updater.update(&req).await,
            Err(Error::InvalidStopSignal(_))
        ));
        assert!(swarm.applied.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_token_is_not_found() {
        let (updater, _swarm, _registry) = setup(FakeSwarm::with_service("web", "repo/web:v1"));
        let token = token::generate();
        assert!(matches!(
            updater.update(&update_request(&token, "v2")).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn service_missing_from_swarm_is_unavailable() {
        let (updater, swarm, registry) = setup(FakeSwarm::default());
        let token = registry.register("web").unwrap();
        assert!(matches!(
            updater.update(&update_request(&token, "v2")).await,
            Err(Error::ServiceUnavailable(_))
        ));
        assert!(swarm.applied.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stale_version_surfaces_conflict() {
        let mut swarm = FakeSwarm::with_service("web", "repo/web:v1");
        swarm.conflict = true;
        let (updater, _swarm, registry) = setup(swarm);
        let token = registry.register("web").unwrap();
        assert!(matches!(
            updater.update(&update_request(&token, "v2")).await,
            Err(Error::Conflict(_))
        ));
    }

    #[test]
    fn request_validation() {
        let token = token::generate();
        assert!(validate_update(&update_request(&token, "v2")).is_ok());
        assert!(matches!(
            validate_update(&update_request("", "v2")),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            validate_update(&update_request("abc", "v2")),
            Err(Error::InvalidTokenFormat)
        ));
        assert!(matches!(
            validate_update(&update_request(&token, "")),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            validate_update(&update_request(&token, "v2 latest")),
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn locked_database_does_not_stall_the_runtime() {
        use std::time::{Duration, Instant};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flockman.sqlite3");
        let registry = Registry::open(&path).unwrap();
        let token = registry.register("web").unwrap();

        let locker = rusqlite::Connection::open(&path).unwrap();
        locker.execute_batch("BEGIN EXCLUSIVE").unwrap();

        let updater = Arc::new(Updater::new(
            registry,
            Arc::new(FakeSwarm::with_service("web", "repo/web:v1")),
        ));
        let status = tokio::spawn({
            let updater = updater.clone();
            async move { updater.status(&StatusRequest { token }).await }
        });

        let started = Instant::now();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(
            started.elapsed() < Duration::from_secs(1),
            "timer fired after {:?}",
            started.elapsed()
        );

        locker.execute_batch("COMMIT").unwrap();
        let view = status.await.unwrap().unwrap();
        assert_eq!(view.image, "repo/web:v1");
    }
}
