//! Builds the service specification submitted for a rolling image update.
//!
//! [`build_plan`] never mutates the fetched specification: it clones it and
//! returns the new value. The version index travels separately in
//! [`CurrentService`](crate::runtime::CurrentService) and is not touched here.

use bollard::models::{
    ServiceSpec, ServiceSpecUpdateConfig, ServiceSpecUpdateConfigFailureActionEnum,
    ServiceSpecUpdateConfigOrderEnum,
};

use crate::error::{Error, Result};
use crate::image::split_image;
use crate::types::{StopSignal, UpdateRequest};

/// Prefix reserved for the variables written by this daemon.
pub const ENV_PREFIX: &str = "FLOCKMAN_";
pub const ENV_IMAGE_TAG: &str = "FLOCKMAN_IMAGE_TAG";
pub const ENV_IMAGE_REPO: &str = "FLOCKMAN_IMAGE_REPO";

/// Produces the specification that retags `current` to `req.tag`.
///
/// The update always rolls back on failure; start-first ordering is used
/// only when requested. Every environment variable carrying
/// [`ENV_PREFIX`] is dropped before the fresh tag and repository entries
/// are appended, so repeated updates never accumulate stale entries.
pub fn build_plan(current: &ServiceSpec, req: &UpdateRequest) -> Result<ServiceSpec> {
    let stop_signal = StopSignal::resolve(req.stop_signal.as_deref())?;

    let mut spec = current.clone();
    let container = spec
        .task_template
        .as_mut()
        .and_then(|task| task.container_spec.as_mut())
        .ok_or_else(|| Error::MissingContainerSpec(current.name.clone().unwrap_or_default()))?;

    let current_image = container
        .image
        .as_deref()
        .filter(|image| !image.is_empty())
        .ok_or_else(|| Error::MissingContainerSpec(current.name.clone().unwrap_or_default()))?;
    let (repository, _) = split_image(current_image);
    container.image = Some(format!("{repository}{}", req.tag));
    container.stop_signal = Some(stop_signal.to_string());

    let mut env = filter_env(container.env.as_deref().unwrap_or_default(), ENV_PREFIX);
    env.push(format!("{ENV_IMAGE_TAG}={}", req.tag));
    env.push(format!("{ENV_IMAGE_REPO}={repository}"));
    container.env = Some(env);

    let order = req
        .start_first
        .then_some(ServiceSpecUpdateConfigOrderEnum::START_FIRST);
    spec.update_config = Some(ServiceSpecUpdateConfig {
        failure_action: Some(ServiceSpecUpdateConfigFailureActionEnum::ROLLBACK),
        order,
        ..current.update_config.clone().unwrap_or_default()
    });

    Ok(spec)
}

/// Returns `env` without the entries whose key starts with `prefix`.
pub fn filter_env(env: &[String], prefix: &str) -> Vec<String> {
    env.iter()
        .filter(|entry| !entry.starts_with(prefix))
        .cloned()
        .collect()
}
