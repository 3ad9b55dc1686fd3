//! HTTP surface of the daemon.
//!
//! Routes live under `/api/v1`. Handlers only unpack the request and hand it
//! to the [`Updater`]; every failure is rendered through
//! [`Error`](crate::error::Error) as a `{"error": ...}` body.

use std::any::Any;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{Response, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use log::error;
use serde_json::{json, Value};
use tower_http::catch_panic::CatchPanicLayer;

use crate::error::{Error, Result};
use crate::types::{ServiceView, StatusRequest, UpdateRequest};
use crate::updater::Updater;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Builds the router serving every `/api/v1` route.
pub fn router(updater: Arc<Updater>) -> Router {
    let v1 = Router::new()
        .route("/health", get(health))
        .route("/node", get(node))
        .route("/service/status", post(service_status))
        .route("/service/update", post(service_update));

    Router::new()
        .nest("/api/v1", v1)
        .fallback(route_not_found)
        .with_state(updater)
        .layer(CatchPanicLayer::custom(handle_panic))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn node(State(updater): State<Arc<Updater>>) -> Result<Json<Value>> {
    let node_name = updater.node_name().await?;
    Ok(Json(json!({
        "node_name": node_name,
        "flockman_version": VERSION,
    })))
}

async fn service_status(
    State(updater): State<Arc<Updater>>,
    body: std::result::Result<Json<StatusRequest>, JsonRejection>,
) -> Result<Json<ServiceView>> {
    let Json(req) = body.map_err(bad_body)?;
    Ok(Json(updater.status(&req).await?))
}

async fn service_update(
    State(updater): State<Arc<Updater>>,
    body: std::result::Result<Json<UpdateRequest>, JsonRejection>,
) -> Result<Json<ServiceView>> {
    let Json(req) = body.map_err(bad_body)?;
    Ok(Json(updater.update(&req).await?))
}

async fn route_not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "Route not found" })),
    )
}

/// Every body rejection is a client error, whatever axum would pick.
fn bad_body(rejection: JsonRejection) -> Error {
    Error::InvalidInput(rejection.body_text())
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    error!("Request handler panicked: {}", detail);
    Error::Internal("request handler panicked".into()).into_response()
}
