//! CLI arguments and file configuration for the bridge.

use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

use netconf_bridge_common::{load_config, LoggingConfig, Result};

use crate::topo::Configurable;

/// CLI arguments.
#[derive(Parser, Debug, Clone)]
#[command(about = "NETCONF-over-SSH to gNMI protocol bridge", version)]
pub struct BridgeArgs {
    /// Path to CA certificate for the admin gRPC server.
    #[arg(long)]
    pub ca_path: Option<PathBuf>,

    /// Path to the admin server private key.
    #[arg(long)]
    pub key_path: Option<PathBuf>,

    /// Path to the admin server certificate.
    #[arg(long)]
    pub cert_path: Option<PathBuf>,

    /// Admin gRPC port.
    #[arg(long, default_value_t = 5150)]
    pub grpc_port: u16,

    /// NETCONF SSH port.
    #[arg(long, default_value_t = 8300)]
    pub netconf_port: u16,

    /// Southbound gNMI endpoint.
    #[arg(long, default_value = "onos-config:5150")]
    pub gnmi_endpoint: String,

    /// Path to a JSON5 configuration file.
    #[arg(long)]
    pub config_path: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,
}

/// File configuration (JSON5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Configurable model identities advertised as capabilities.
    #[serde(default)]
    pub configurables: Vec<Configurable>,

    /// Deadline for dispatching a single NETCONF message, in milliseconds.
    #[serde(default = "default_dispatch_timeout_ms")]
    pub dispatch_timeout_ms: u64,

    /// Deadline for a single southbound gNMI call, in milliseconds.
    #[serde(default = "default_gnmi_timeout_ms")]
    pub gnmi_timeout_ms: u64,
}

fn default_dispatch_timeout_ms() -> u64 {
    1_000
}

fn default_gnmi_timeout_ms() -> u64 {
    3_000
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            configurables: Vec::new(),
            dispatch_timeout_ms: default_dispatch_timeout_ms(),
            gnmi_timeout_ms: default_gnmi_timeout_ms(),
        }
    }
}

impl BridgeConfig {
    /// Load the configuration file, or fall back to defaults when no path is
    /// given.
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => load_config(path),
            None => Ok(Self::default()),
        }
    }
}
