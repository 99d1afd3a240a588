//! Wires the bridge together and manages its lifecycle.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info};

use crate::admin::{self, AdminSettings};
use crate::config::{BridgeArgs, BridgeConfig};
use crate::server::SshServer;
use crate::southbound::{GnmiChannel, GnmiClient};
use crate::store::SessionStore;
use crate::topo::{FileTopoClient, TopoClient};
use crate::translator::Translator;

pub struct Manager {
    args: BridgeArgs,
    config: BridgeConfig,
}

impl Manager {
    pub fn new(args: BridgeArgs, config: BridgeConfig) -> Self {
        Self { args, config }
    }

    /// Start the admin gRPC server and the NETCONF SSH server, then run
    /// until Ctrl+C. On shutdown every worker is signalled and aborted.
    pub async fn run(self) -> anyhow::Result<()> {
        let store = Arc::new(SessionStore::new());

        let topo: Arc<dyn TopoClient> =
            Arc::new(FileTopoClient::new(self.config.configurables.clone()));
        let gnmi: Arc<dyn GnmiClient> = Arc::new(
            GnmiChannel::connect(&self.args.gnmi_endpoint)
                .context("create gNMI southbound client")?,
        );

        let translator = Arc::new(
            Translator::new(
                store.clone(),
                topo,
                gnmi,
                Duration::from_millis(self.config.gnmi_timeout_ms),
            )
            .await,
        );

        let ssh_server = Arc::new(SshServer::new(
            self.args.netconf_port,
            translator,
            Duration::from_millis(self.config.dispatch_timeout_ms),
        )?);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let admin_settings = AdminSettings {
            grpc_port: self.args.grpc_port,
            ca_path: self.args.ca_path.clone(),
            key_path: self.args.key_path.clone(),
            cert_path: self.args.cert_path.clone(),
        };
        let mut admin_task =
            tokio::spawn(admin::serve(store.clone(), admin_settings, shutdown_rx.clone()));
        let mut ssh_task = tokio::spawn(ssh_server.run(shutdown_rx));

        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("listen for Ctrl+C")?;
                info!("received shutdown signal");
            }
            result = &mut admin_task => {
                error!("admin server exited unexpectedly");
                return result.context("admin server task")?;
            }
            result = &mut ssh_task => {
                error!("SSH server exited unexpectedly");
                return result.context("SSH server task")?;
            }
        }

        let _ = shutdown_tx.send(true);

        // Give workers a moment to drain before aborting what remains.
        tokio::time::sleep(Duration::from_millis(100)).await;
        admin_task.abort();
        ssh_task.abort();

        info!("bridge stopped");
        Ok(())
    }
}
