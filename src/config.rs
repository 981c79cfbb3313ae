//! Gateway configuration.
//!
//! Everything the router and the auth guard need is passed in explicitly.
//! [`Config::from_env`] is the one place that reads the process environment:
//!
//! - `STACK_SERVICE_PORT`: listen port, wins over any port set in code
//! - `AUTH_ENABLED`: `false` switches bearer-token enforcement off
//!
//! Port precedence is environment, then [`Config::port`], then `8080`.

use std::env;
use std::net::SocketAddr;

use crate::error::Error;

pub const PORT_ENV: &str = "STACK_SERVICE_PORT";
pub const AUTH_ENABLED_ENV: &str = "AUTH_ENABLED";
pub const DEFAULT_PORT: &str = "8080";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// Interface to bind when the port value carries no host.
    pub host: String,
    /// Port set in code.
    pub port: Option<String>,
    /// Port from the environment.
    pub port_override: Option<String>,
    pub auth_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: None,
            port_override: None,
            auth_enabled: true,
        }
    }
}

impl Config {
    /// Defaults overlaid with `STACK_SERVICE_PORT` and `AUTH_ENABLED`.
    pub fn from_env() -> Self {
        Self::from_vars(
            env::var(PORT_ENV).ok().as_deref(),
            env::var(AUTH_ENABLED_ENV).ok().as_deref(),
        )
    }

    fn from_vars(port: Option<&str>, auth_enabled: Option<&str>) -> Self {
        Self {
            port_override: port.filter(|p| !p.is_empty()).map(str::to_owned),
            auth_enabled: auth_enabled != Some("false"),
            ..Self::default()
        }
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// The winning port value, before parsing.
    pub fn resolve_port(&self) -> &str {
        self.port_override
            .as_deref()
            .or(self.port.as_deref())
            .unwrap_or(DEFAULT_PORT)
    }

    /// The socket address to listen on.
    ///
    /// Accepts `8080`, `:8080`, or a full `host:port`.
    pub fn listen_addr(&self) -> Result<SocketAddr, Error> {
        let port = self.resolve_port();
        if let Ok(addr) = port.parse::<SocketAddr>() {
            return Ok(addr);
        }
        let bare = port.strip_prefix(':').unwrap_or(port);
        let bare: u16 = bare
            .parse()
            .map_err(|_| Error::Config(format!("invalid port `{port}`")))?;
        format!("{}:{bare}", self.host)
            .parse()
            .map_err(|e| Error::Config(format!("invalid host `{}`: {e}", self.host)))
    }
}
