//! Data structures shared between the registry, the updater and the API.
//!
//! Request types are deserialised straight from the HTTP body and are never
//! persisted. [`ServiceRegistration`] is the only record the registry stores;
//! it is immutable once written.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A registered service and the token that grants control over it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRegistration {
    pub token: String,
    pub service_name: String,
}

/// Body of `POST /api/v1/service/status`.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusRequest {
    pub token: String,
}

/// Body of `POST /api/v1/service/update`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateRequest {
    pub token: String,
    pub tag: String,
    #[serde(default)]
    pub start_first: bool,
    #[serde(default)]
    pub stop_signal: Option<String>,
}

/// What the status and update endpoints report back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceView {
    pub service: String,
    pub image: String,
}

/// Stop signals a token holder may request.
///
/// `QUIT` is kept under that exact name rather than `SIGQUIT`; it is passed
/// to the engine verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopSignal {
    Quit,
    #[default]
    SigTerm,
    SigKill,
}

impl StopSignal {
    pub const ALLOWED: [StopSignal; 3] = [StopSignal::Quit, StopSignal::SigTerm, StopSignal::SigKill];

    pub fn as_str(&self) -> &'static str {
        match self {
            StopSignal::Quit => "QUIT",
            StopSignal::SigTerm => "SIGTERM",
            StopSignal::SigKill => "SIGKILL",
        }
    }

    /// Resolves the optional requested signal, falling back to `SIGTERM`
    /// when it is absent or empty.
    pub fn resolve(requested: Option<&str>) -> Result<Self> {
        match requested {
            None | Some("") => Ok(StopSignal::default()),
            Some(name) => name.parse(),
        }
    }
}

impl FromStr for StopSignal {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALLOWED
            .into_iter()
            .find(|signal| signal.as_str() == s)
            .ok_or_else(|| Error::InvalidStopSignal(s.to_string()))
    }
}

impl fmt::Display for StopSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
