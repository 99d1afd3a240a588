//! Capability oracle: the source of configurable model identities.
//!
//! The topology registry exposes objects of kind `o1t` carrying a
//! `Configurable` aspect; the oracle reduces them to `target:type:version`
//! strings. The registry transport itself is an external collaborator, so
//! the shipped implementation sources the listing from the bridge
//! configuration file.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A configurable model identity from the topology registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configurable {
    pub target: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub version: String,
}

/// Oracle over the topology registry's `o1t` configurables.
#[async_trait]
pub trait TopoClient: Send + Sync {
    /// Return `"<target>:<type>:<version>"` for every configurable object of
    /// kind `o1t`, in registry iteration order.
    async fn o1t_configurables(&self) -> Result<Vec<String>>;
}

/// Registry listing backed by the bridge configuration file.
pub struct FileTopoClient {
    configurables: Vec<Configurable>,
}

impl FileTopoClient {
    pub fn new(configurables: Vec<Configurable>) -> Self {
        Self { configurables }
    }
}

#[async_trait]
impl TopoClient for FileTopoClient {
    async fn o1t_configurables(&self) -> Result<Vec<String>> {
        Ok(self
            .configurables
            .iter()
            .map(|c| format!("{}:{}:{}", c.target, c.kind, c.version))
            .collect())
    }
}
