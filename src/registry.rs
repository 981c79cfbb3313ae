//! Service-registry collaborator.
//!
//! The gateway announces itself once at startup so other services can find
//! it and health-check it. What the registry does with the descriptor
//! (Consul, etcd, a static file) is its own business.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// Describes one service instance to the registry.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Service {
    pub name: String,
    pub host: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Path the registry should poll, e.g. `/healthz`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Service {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            version: None,
            health_check: None,
            tags: Vec::new(),
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn health_check(mut self, path: impl Into<String>) -> Self {
        self.health_check = Some(path.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// Discovery / health registration backend.
#[async_trait]
pub trait Registry: Send + Sync + 'static {
    async fn register(&self, service: &Service) -> Result<(), RegistryError>;
}
