//! SSH server exposing the `netconf` subsystem.
//!
//! Accepts TCP connections on the configured port, performs the SSH
//! handshake with an ephemeral RSA host key, and hands `netconf` subsystem
//! channels to the per-connection NETCONF loop. Channels of any type other
//! than `session` and requests for any other subsystem are rejected.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use russh::keys::key::PublicKey;
use russh::server::{Auth, Msg, Session};
use russh::{Channel, ChannelId, MethodSet, SshId};
use russh_keys::key::{KeyPair, SignatureHash};
use tokio::net::TcpListener;
use tokio::sync::{watch, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::framing::{FrameReader, FrameWriter};
use crate::subsystem::NetconfSession;
use crate::translator::Translator;

/// The only subsystem this server exposes.
pub const NETCONF_SUBSYSTEM: &str = "netconf";

/// Decides whether a presented public key authenticates `user`.
pub type PublicKeyHandler = Arc<dyn Fn(&str, &PublicKey) -> bool + Send + Sync>;

/// Decides whether a presented password authenticates `user`.
pub type PasswordHandler = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;

pub struct SshServer {
    netconf_port: u16,
    translator: Arc<Translator>,
    dispatch_timeout: Duration,
    host_keys: RwLock<Vec<KeyPair>>,
    public_key_handler: Option<PublicKeyHandler>,
    password_handler: Option<PasswordHandler>,
}

impl SshServer {
    /// Build a server with a fresh 2048-bit RSA host key and the default
    /// accept-every-key public-key handler.
    pub fn new(
        netconf_port: u16,
        translator: Arc<Translator>,
        dispatch_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let key = KeyPair::generate_rsa(2048, SignatureHash::SHA2_256)
            .context("generate RSA host key")?;
        let mut keys = Vec::new();
        install_host_key(&mut keys, key);

        Ok(Self {
            netconf_port,
            translator,
            dispatch_timeout,
            host_keys: RwLock::new(keys),
            // TODO: compare against a configured known-keys set instead of
            // accepting every presented key.
            public_key_handler: Some(Arc::new(|_user, _key| true)),
            password_handler: None,
        })
    }

    /// Replace the public-key handler.
    pub fn with_public_key_handler(mut self, handler: Option<PublicKeyHandler>) -> Self {
        self.public_key_handler = handler;
        self
    }

    /// Replace the password handler.
    pub fn with_password_handler(mut self, handler: Option<PasswordHandler>) -> Self {
        self.password_handler = handler;
        self
    }

    /// Install a host key, replacing any existing key of the same algorithm.
    pub async fn add_host_key(&self, key: KeyPair) {
        let mut keys = self.host_keys.write().await;
        install_host_key(&mut keys, key);
    }

    async fn config(&self) -> russh::server::Config {
        let keys = self.host_keys.read().await.clone();

        let mut methods = MethodSet::empty();
        if self.public_key_handler.is_some() {
            methods |= MethodSet::PUBLICKEY;
        }
        if self.password_handler.is_some() {
            methods |= MethodSet::PASSWORD;
        }
        if methods.is_empty() {
            // No handlers registered: no-auth mode.
            methods = MethodSet::NONE;
        }

        russh::server::Config {
            server_id: SshId::Standard(format!(
                "SSH-2.0-netconf-bridge_{}",
                env!("CARGO_PKG_VERSION")
            )),
            keys,
            methods,
            ..Default::default()
        }
    }

    /// Accept and serve connections until `shutdown` fires.
    pub async fn run(
        self: Arc<Self>,
        shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let address = format!("0.0.0.0:{}", self.netconf_port);
        let listener = TcpListener::bind(&address)
            .await
            .with_context(|| format!("bind NETCONF SSH listener on {}", address))?;

        info!("NETCONF SSH server listening on {}", address);

        let config = Arc::new(self.config().await);
        let mut shutdown_rx = shutdown.clone();

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            error!("accept error: {}", e);
                            continue;
                        }
                    };
                    debug!(%peer, "accepted connection");

                    let handler = SshSession::new(self.clone(), shutdown.clone());
                    let config = config.clone();
                    tokio::spawn(async move {
                        match russh::server::run_stream(config, stream, handler).await {
                            Ok(session) => {
                                if let Err(e) = session.await {
                                    debug!("ssh connection ended: {}", e);
                                }
                            }
                            Err(e) => warn!("ssh handshake failed: {}", e),
                        }
                    });
                }
            }
        }

        info!("NETCONF SSH server stopped");
        Ok(())
    }
}

fn install_host_key(keys: &mut Vec<KeyPair>, key: KeyPair) {
    for existing in keys.iter_mut() {
        if existing.name() == key.name() {
            *existing = key;
            return;
        }
    }
    keys.push(key);
}

/// Handler for one SSH connection.
struct SshSession {
    server: Arc<SshServer>,
    session_id: String,
    user: Option<String>,
    channel: Option<Channel<Msg>>,
    shutdown: watch::Receiver<bool>,
}

impl SshSession {
    fn new(server: Arc<SshServer>, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            server,
            // Opaque per-connection id, reported to the admin service.
            session_id: Uuid::new_v4().simple().to_string(),
            user: None,
            channel: None,
            shutdown,
        }
    }
}

#[async_trait]
impl russh::server::Handler for SshSession {
    type Error = anyhow::Error;

    async fn auth_none(&mut self, user: &str) -> Result<Auth, Self::Error> {
        if self.server.public_key_handler.is_none() && self.server.password_handler.is_none() {
            self.user = Some(user.to_string());
            return Ok(Auth::Accept);
        }
        Ok(Auth::Reject {
            proceed_with_methods: None,
        })
    }

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        if let Some(handler) = &self.server.password_handler {
            if handler(user, password) {
                self.user = Some(user.to_string());
                return Ok(Auth::Accept);
            }
        }
        Ok(Auth::Reject {
            proceed_with_methods: None,
        })
    }

    async fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        if let Some(handler) = &self.server.public_key_handler {
            if handler(user, public_key) {
                self.user = Some(user.to_string());
                return Ok(Auth::Accept);
            }
        }
        Ok(Auth::Reject {
            proceed_with_methods: None,
        })
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        debug!(session = %self.session_id, "opening session channel");
        self.channel = Some(channel);
        Ok(true)
    }

    async fn channel_eof(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        session.close(channel);
        Ok(())
    }

    async fn subsystem_request(
        &mut self,
        channel_id: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        debug!(
            session = %self.session_id,
            user = self.user.as_deref().unwrap_or_default(),
            subsystem = name,
            "handling subsystem request"
        );

        if name != NETCONF_SUBSYSTEM {
            warn!(subsystem = name, "unknown subsystem requested");
            session.channel_failure(channel_id);
            return Ok(());
        }

        let Some(channel) = self.channel.take() else {
            warn!(session = %self.session_id, "subsystem requested without a session channel");
            session.channel_failure(channel_id);
            return Ok(());
        };

        session.channel_success(channel_id);

        let translator = self.server.translator.clone();
        let dispatch_timeout = self.server.dispatch_timeout;
        let session_id = self.session_id.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let (read_half, write_half) = tokio::io::split(channel.into_stream());
            let netconf = NetconfSession::new(
                session_id,
                FrameReader::new(read_half),
                FrameWriter::new(write_half),
                translator,
                dispatch_timeout,
                shutdown,
            );
            if let Err(e) = netconf.serve().await {
                debug!("netconf subsystem ended with transport error: {}", e);
            }
        });

        Ok(())
    }
}
