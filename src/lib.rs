//! Token-gated rolling image updates for Docker Swarm services.
//!
//! Operators register a swarm service under an opaque token; holders of the
//! token may then ask the daemon to retag the service's image. The daemon
//! rewrites only the tag, enforces rollback on failure and keeps its own
//! bookkeeping variables in the service environment.

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod image;
pub mod plan;
pub mod registry;
pub mod runtime;
pub mod token;
pub mod types;
pub mod updater;

pub use error::{Error, Result};
