//! Administrative gRPC service exposing NETCONF session state.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::{Certificate, Identity, Server, ServerTlsConfig};
use tonic::{Request, Response, Status};
use tracing::info;

use netconf_bridge_proto::o1t::netconf_sessions_server::{NetconfSessions, NetconfSessionsServer};
use netconf_bridge_proto::o1t::{GetRequest, GetResponse, Operation, Session};

use crate::store::{SessionKey, SessionStore, SessionValue};

const CHANNEL_BUFFER: usize = 64;

/// TLS material and listen port for the admin server.
#[derive(Debug, Clone, Default)]
pub struct AdminSettings {
    pub grpc_port: u16,
    pub ca_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
    pub cert_path: Option<PathBuf>,
}

pub struct AdminService {
    store: Arc<SessionStore>,
    shutdown: watch::Receiver<bool>,
}

fn session_proto(key: &SessionKey, value: &SessionValue) -> Session {
    Session {
        session_id: key.session_id.clone(),
        alive: value.alive,
        operations: value
            .operations
            .iter()
            .map(|(ts, op)| {
                (
                    ts.clone(),
                    Operation {
                        name: op.name.clone(),
                        namespace: op.namespace.clone(),
                        timestamp: op.timestamp,
                        status: op.status,
                    },
                )
            })
            .collect(),
    }
}

#[tonic::async_trait]
impl NetconfSessions for AdminService {
    async fn list(
        &self,
        _request: Request<GetRequest>,
    ) -> Result<Response<GetResponse>, Status> {
        let (tx, mut rx) = mpsc::channel::<(SessionKey, SessionValue)>(CHANNEL_BUFFER);

        let collector = tokio::spawn(async move {
            let mut sessions = HashMap::new();
            while let Some((key, value)) = rx.recv().await {
                sessions.insert(key.session_id.clone(), session_proto(&key, &value));
            }
            sessions
        });

        let drained = self.store.entries(tx).await;
        let sessions = collector
            .await
            .map_err(|e| Status::internal(e.to_string()))?;
        drained.map_err(|e| Status::not_found(e.to_string()))?;

        Ok(Response::new(GetResponse { sessions }))
    }

    type WatchStream = ReceiverStream<Result<GetResponse, Status>>;

    async fn watch(
        &self,
        _request: Request<GetRequest>,
    ) -> Result<Response<Self::WatchStream>, Status> {
        let (event_tx, mut event_rx) = mpsc::channel(CHANNEL_BUFFER);
        self.store.watch(self.shutdown.clone(), event_tx).await;

        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER);
        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                let mut sessions = HashMap::new();
                sessions.insert(
                    event.key.session_id.clone(),
                    session_proto(&event.key, &event.value),
                );
                if tx.send(Ok(GetResponse { sessions })).await.is_err() {
                    break;
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

impl AdminService {
    pub fn new(store: Arc<SessionStore>, shutdown: watch::Receiver<bool>) -> Self {
        Self { store, shutdown }
    }
}

/// Serve the admin gRPC endpoint until `shutdown` fires. TLS is enabled when
/// certificate and key paths are configured.
pub async fn serve(
    store: Arc<SessionStore>,
    settings: AdminSettings,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", settings.grpc_port)
        .parse()
        .context("invalid admin listen address")?;

    let service = AdminService::new(store, shutdown.clone());

    let mut builder = Server::builder();
    if let (Some(cert_path), Some(key_path)) = (&settings.cert_path, &settings.key_path) {
        let cert = tokio::fs::read(cert_path)
            .await
            .with_context(|| format!("read certificate {}", cert_path.display()))?;
        let key = tokio::fs::read(key_path)
            .await
            .with_context(|| format!("read private key {}", key_path.display()))?;
        let mut tls = ServerTlsConfig::new().identity(Identity::from_pem(cert, key));

        if let Some(ca_path) = &settings.ca_path {
            let ca = tokio::fs::read(ca_path)
                .await
                .with_context(|| format!("read CA certificate {}", ca_path.display()))?;
            tls = tls.client_ca_root(Certificate::from_pem(ca));
        }

        builder = builder.tls_config(tls)?;
        info!("admin gRPC server TLS enabled");
    }

    info!("admin gRPC server listening on {}", addr);

    let mut shutdown_rx = shutdown;
    builder
        .add_service(NetconfSessionsServer::new(service))
        .serve_with_shutdown(addr, async move {
            loop {
                if shutdown_rx.changed().await.is_err() {
                    break;
                }
                if *shutdown_rx.borrow() {
                    break;
                }
            }
            info!("admin gRPC server shutting down");
        })
        .await
        .context("admin gRPC server error")?;

    Ok(())
}
