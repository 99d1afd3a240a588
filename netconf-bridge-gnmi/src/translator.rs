//! NETCONF request dispatcher.
//!
//! Translates inbound NETCONF messages into gNMI calls and assembles the
//! replies. Any error that can be expressed as an `<rpc-error>` is; only
//! transport-level failures terminate a session, and those never originate
//! here.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::time::timeout;
use tonic::Status;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::message::{self, MessageKind, RpcError};
use crate::parser::{self, TranslateError};
use crate::southbound::GnmiClient;
use crate::store::{Operation, SessionKey, SessionStore, SessionValue};
use crate::topo::TopoClient;

/// Capability URI prefix for domain models discovered from the registry.
pub const ONF_CAPABILITY_PREFIX: &str = "http://opennetworking.org";

/// Capabilities advertised regardless of what the registry knows.
pub const DEFAULT_CAPABILITIES: [&str; 4] = [
    "urn:ietf:params:netconf:base:1.1",
    "urn:ietf:params:netconf:capability:writable-running:1.0",
    "urn:ietf:params:netconf:capability:rollback-on-error:1.0",
    "urn:ietf:params:netconf:capability:xpath:1.0",
];

pub struct Translator {
    capabilities: RwLock<Vec<String>>,
    gnmi: Arc<dyn GnmiClient>,
    topo: Arc<dyn TopoClient>,
    store: Arc<SessionStore>,
    gnmi_timeout: Duration,
}

impl Translator {
    /// Build a translator and prime the capability list from the oracle.
    /// Oracle failure at construction time is a warning, not an error.
    pub async fn new(
        store: Arc<SessionStore>,
        topo: Arc<dyn TopoClient>,
        gnmi: Arc<dyn GnmiClient>,
        gnmi_timeout: Duration,
    ) -> Self {
        let translator = Self {
            capabilities: RwLock::new(Vec::new()),
            gnmi,
            topo,
            store,
            gnmi_timeout,
        };

        if let Err(e) = translator.capabilities().await {
            warn!("initial capability computation failed: {}", e);
            translator.set_capabilities(default_capabilities());
        }

        translator
    }

    /// Dispatch one raw inbound message for `session_id`. Returns the reply
    /// payload, or `None` when the message is absorbed without a reply.
    pub async fn handle(&self, session_id: &str, raw: &[u8]) -> Option<Vec<u8>> {
        let text = match std::str::from_utf8(raw) {
            Ok(text) => text,
            Err(_) => {
                info!(session = %session_id, "received non-UTF-8 message");
                return Some(self.error_reply("", TranslateError::UnknownMessage));
            }
        };
        debug!(session = %session_id, message = %text, "dispatching message");

        match message::classify(text) {
            MessageKind::RequestHello => Some(self.hello(session_id).await),
            MessageKind::PeerHello => None,
            MessageKind::CloseSession => Some(self.close_session(session_id).await),
            MessageKind::KillSession => Some(self.kill_session(session_id)),
            MessageKind::GetConfig => Some(self.get(session_id, text).await),
            MessageKind::EditConfig => Some(self.set(session_id, text).await),
            MessageKind::Unknown => {
                info!(session = %session_id, "unknown message type received");
                let message_id = message::message_id_of(text).unwrap_or_default();
                Some(self.error_reply(&message_id, TranslateError::UnknownMessage))
            }
        }
    }

    /// Recompute the capability list from the oracle and store it.
    pub async fn capabilities(&self) -> anyhow::Result<Vec<String>> {
        let configurables = self.topo.o1t_configurables().await?;

        let mut capabilities: Vec<String> = configurables
            .iter()
            .map(|c| format!("{}/{}", ONF_CAPABILITY_PREFIX, c))
            .collect();
        capabilities.extend(DEFAULT_CAPABILITIES.iter().map(|s| s.to_string()));

        self.set_capabilities(capabilities.clone());
        Ok(capabilities)
    }

    /// The most recently computed capability list.
    pub fn capabilities_snapshot(&self) -> Vec<String> {
        self.capabilities
            .read()
            .map(|caps| caps.clone())
            .unwrap_or_default()
    }

    fn set_capabilities(&self, capabilities: Vec<String>) {
        if let Ok(mut caps) = self.capabilities.write() {
            *caps = capabilities;
        }
    }

    async fn hello(&self, session_id: &str) -> Vec<u8> {
        let capabilities = match self.capabilities().await {
            Ok(capabilities) => capabilities,
            Err(e) => {
                warn!("capability computation failed, using defaults: {}", e);
                let defaults = default_capabilities();
                self.set_capabilities(defaults.clone());
                defaults
            }
        };

        let reply = message::hello(&capabilities);
        debug!(session = %session_id, "built hello message");

        self.store
            .put(SessionKey::new(session_id), SessionValue::alive())
            .await;

        reply.into_bytes()
    }

    async fn close_session(&self, session_id: &str) -> Vec<u8> {
        let reply = message::rpc_reply_close(&new_message_id());
        self.store.delete(&SessionKey::new(session_id)).await;
        reply.into_bytes()
    }

    fn kill_session(&self, session_id: &str) -> Vec<u8> {
        // Acknowledges the request; does not terminate the named session.
        message::kill_session(&new_message_id(), session_id).into_bytes()
    }

    async fn get(&self, session_id: &str, raw: &str) -> Vec<u8> {
        let request = match message::parse_get_config(raw) {
            Ok(request) => request,
            Err(e) => {
                let message_id = message::message_id_of(raw).unwrap_or_default();
                return self.error_reply(&message_id, e.into());
            }
        };

        let (gnmi_get, namespace) = match parser::build_get_request(&request) {
            Ok(built) => built,
            Err(e) => return self.error_reply(&request.message_id, e),
        };

        let result = match timeout(self.gnmi_timeout, self.gnmi.get(gnmi_get)).await {
            Ok(result) => result,
            Err(_) => Err(Status::deadline_exceeded("gNMI get timed out")),
        };

        self.record_operation(session_id, "get-config", &namespace.to_string(), result.is_ok())
            .await;

        match result {
            Ok(response) => match parser::single_json_update(&response) {
                Ok(json) => message::rpc_reply_data(&request.message_id, &json).into_bytes(),
                Err(e) => self.error_reply(&request.message_id, e),
            },
            Err(status) => self.status_reply(&request.message_id, &status),
        }
    }

    async fn set(&self, session_id: &str, raw: &str) -> Vec<u8> {
        let request = match message::parse_edit_config(raw) {
            Ok(request) => request,
            Err(e) => {
                let message_id = message::message_id_of(raw).unwrap_or_default();
                return self.error_reply(&message_id, e.into());
            }
        };

        // Capabilities are rebuilt on every set so a freshly registered model
        // is immediately usable.
        let capabilities = match self.capabilities().await {
            Ok(capabilities) => capabilities,
            Err(e) => {
                warn!("capability recomputation failed, using last known: {}", e);
                self.capabilities_snapshot()
            }
        };

        let (gnmi_set, namespace) = match parser::build_set_request(&request, &capabilities) {
            Ok(built) => built,
            Err(e) => return self.error_reply(&request.message_id, e),
        };

        let result = match timeout(self.gnmi_timeout, self.gnmi.set(gnmi_set)).await {
            Ok(result) => result,
            Err(_) => Err(Status::deadline_exceeded("gNMI set timed out")),
        };

        self.record_operation(session_id, "edit-config", &namespace.to_string(), result.is_ok())
            .await;

        match result {
            Ok(_) => message::rpc_reply_ok(&request.message_id).into_bytes(),
            Err(status) => self.status_reply(&request.message_id, &status),
        }
    }

    /// Append an operation record to the session entry, creating the entry
    /// if the session was never announced.
    async fn record_operation(&self, session_id: &str, name: &str, namespace: &str, ok: bool) {
        let key = SessionKey::new(session_id);

        let mut value = match self.store.get(&key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(session = %session_id, "session entry missing: {}", e);
                SessionValue::alive()
            }
        };

        let now = chrono::Utc::now();
        let timestamp = now.timestamp_nanos_opt().unwrap_or_default() as u64;
        value.alive = true;
        value.operations.insert(
            now.to_rfc3339(),
            Operation {
                name: name.to_string(),
                namespace: namespace.to_string(),
                status: ok,
                timestamp,
            },
        );

        debug!(
            session = %session_id,
            operation = name,
            namespace = namespace,
            status = ok,
            "recording operation"
        );
        self.store.update(key, value).await;
    }

    fn error_reply(&self, message_id: &str, error: TranslateError) -> Vec<u8> {
        message::rpc_reply_errors(
            message_id,
            &[RpcError {
                error_type: format!("{:?}", error.code()),
                message: error.to_string(),
            }],
        )
        .into_bytes()
    }

    fn status_reply(&self, message_id: &str, status: &Status) -> Vec<u8> {
        message::rpc_reply_errors(
            message_id,
            &[RpcError {
                error_type: format!("{:?}", status.code()),
                message: status.message().to_string(),
            }],
        )
        .into_bytes()
    }
}

fn default_capabilities() -> Vec<String> {
    DEFAULT_CAPABILITIES.iter().map(|s| s.to_string()).collect()
}

fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}
