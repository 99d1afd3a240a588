//! NETCONF-over-SSH to gNMI protocol bridge.
//!
//! Serves the SSH `netconf` subsystem northbound and an administrative gRPC
//! service, translating NETCONF get-config/edit-config onto gNMI Get/Set.

use anyhow::Result;
use clap::Parser;
use tracing::info;

use netconf_bridge_common::init_tracing;
use netconf_bridge_gnmi::{BridgeArgs, BridgeConfig, Manager};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = BridgeArgs::parse();

    // Load configuration
    let mut config = BridgeConfig::load(args.config_path.as_ref())?;
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }

    init_tracing(&config.logging)?;

    info!(
        netconf_port = args.netconf_port,
        grpc_port = args.grpc_port,
        gnmi_endpoint = %args.gnmi_endpoint,
        "Starting netconf-bridge"
    );

    Manager::new(args, config).run().await
}
