//! Process configuration, read from flags or the environment.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use tiberius::AuthMethod;

use crate::collector::FailurePolicy;

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Exporter configuration.
///
/// Every flag can also be given through the environment variable named in
/// its help text.
#[derive(Clone, Parser)]
#[command(name = "mssql-exporter", about = "MSSQL exporter for Prometheus", version)]
pub struct Config {
    /// Sql Server
    #[arg(long = "sqlserver", env = "SQLSERVER", default_value = "")]
    pub server: String,

    /// Sql Server Port
    #[arg(long = "sqlport", env = "SQLPORT", default_value_t = 1433)]
    pub port: u16,

    /// Sql Username
    #[arg(long = "sqlusername", env = "SQLUSERNAME", default_value = "")]
    pub username: String,

    /// Sql Password
    #[arg(
        long = "sqlpassword",
        env = "SQLPASSWORD",
        default_value = "",
        hide_env_values = true,
        hide_default_value = true
    )]
    pub password: String,

    /// Seconds allowed for connecting and logging in to the server.
    #[arg(long, env = "CONNECT_TIMEOUT", default_value_t = 15)]
    pub connect_timeout: u64,

    /// Accept the server certificate without validation.
    #[arg(long, env = "TRUST_SERVER_CERTIFICATE")]
    pub trust_server_certificate: bool,

    /// Address serving the landing page and `/metrics`.
    #[arg(long, env = "LISTEN_ADDRESS", default_value = "0.0.0.0:8080")]
    pub listen_address: SocketAddr,

    /// What a scrape does when one metric cannot be collected.
    #[arg(
        long,
        env = "FAILURE_POLICY",
        value_enum,
        default_value_t = FailurePolicy::PartialEmission
    )]
    pub failure_policy: FailurePolicy,

    /// Log output format.
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Config {
    /// Checks that everything needed to reach the server was given.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.is_empty() {
            Err(ConfigError::MissingServer)
        } else if self.username.is_empty() {
            Err(ConfigError::MissingUsername)
        } else if self.password.is_empty() {
            Err(ConfigError::MissingPassword)
        } else {
            Ok(())
        }
    }

    /// Deadline for establishing a connection.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// Client configuration for the configured server.
    pub fn tds_config(&self) -> tiberius::Config {
        let mut config = tiberius::Config::new();
        config.host(&self.server);
        config.port(self.port);
        config.authentication(AuthMethod::sql_server(&self.username, &self.password));
        config.application_name(env!("CARGO_PKG_NAME"));
        if self.trust_server_certificate {
            config.trust_cert();
        }
        config
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("connect_timeout", &self.connect_timeout)
            .field("trust_server_certificate", &self.trust_server_certificate)
            .field("listen_address", &self.listen_address)
            .field("failure_policy", &self.failure_policy)
            .field("log_format", &self.log_format)
            .finish_non_exhaustive()
    }
}

/// Missing connection settings.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    /// No server host given.
    #[error("missing SERVER information")]
    MissingServer,
    /// No user name given.
    #[error("missing USERNAME information")]
    MissingUsername,
    /// No password given.
    #[error("missing PASSWORD information")]
    MissingPassword,
}
