//! Server configuration.
//!
//! Loaded from a TOML file with the operator-facing key names the server has
//! always used (`Name`, `Motd`, `Port`, `Db*`). `Motd` is the only optional
//! key; everything else missing is a bootstrap error.

use std::path::Path;

use serde::Deserialize;
use sqlx::postgres::PgConnectOptions;

use super::error::ServerError;

/// Server configuration, one instance per process.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server display name, sent in `Established`.
    #[serde(rename = "Name")]
    pub name: String,

    /// Message of the day, sent in `Established`.
    #[serde(rename = "Motd", default)]
    pub motd: String,

    /// TCP listening port.
    #[serde(rename = "Port")]
    pub port: u16,

    /// Database name.
    #[serde(rename = "DbName")]
    pub db_name: String,

    /// Database host.
    #[serde(rename = "DbHost")]
    pub db_host: String,

    /// Database port.
    #[serde(rename = "DbPort")]
    pub db_port: u16,

    /// Database user.
    #[serde(rename = "DbUser")]
    pub db_user: String,

    /// Database password.
    #[serde(rename = "DbPass")]
    pub db_pass: String,
}

impl ServerConfig {
    /// Load the configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ServerError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ServerError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        toml::from_str(&raw).map_err(|e| {
            ServerError::Config(format!("cannot parse {}: {}", path.display(), e))
        })
    }

    /// Connection options for the configured database.
    pub fn db_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.db_host)
            .port(self.db_port)
            .username(&self.db_user)
            .password(&self.db_pass)
            .database(&self.db_name)
    }
}
