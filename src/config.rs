use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub database: PathBuf,
    pub docker_host: String,
    pub host: String,
    pub port: u16,
    pub debug: bool,
    /// How long in-flight requests may run after a shutdown signal.
    pub shutdown_grace_secs: u64,
    pub docker_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: PathBuf::from("flockman.sqlite3"),
            docker_host: "unix:///var/run/docker.sock".into(),
            host: "127.0.0.1".into(),
            port: 8314,
            debug: false,
            shutdown_grace_secs: 5,
            docker_timeout_secs: 120,
        }
    }
}

/// Values given on the command line; unset fields leave lower layers alone.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub debug: bool,
}

impl Config {
    pub fn figment(config_file: Option<&Path>, overrides: &Overrides) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("flockman.toml"))
            .merge(Json::file("flockman.json"));
        if let Some(path) = config_file {
            figment = figment.merge(Toml::file(path));
        }
        figment
            .merge(Env::prefixed("FLOCKMAN_"))
            .merge(Serialized::defaults(overrides))
    }

    pub fn load(config_file: Option<&Path>, overrides: &Overrides) -> anyhow::Result<Self> {
        Self::figment(config_file, overrides)
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
    }

    pub fn listen_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid listen address {}:{}: {}", self.host, self.port, e))
    }
}
