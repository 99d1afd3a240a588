//! Shared stubs for integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use tonic::Status;

use netconf_bridge_gnmi::southbound::GnmiClient;
use netconf_bridge_gnmi::store::SessionStore;
use netconf_bridge_gnmi::topo::TopoClient;
use netconf_bridge_gnmi::translator::Translator;
use netconf_bridge_proto::gnmi::{
    typed_value, GetRequest, GetResponse, Notification, SetRequest, SetResponse, TypedValue,
    Update,
};

/// Oracle stub returning a fixed configurable list, or failing on demand.
pub struct StubTopo {
    configurables: Vec<String>,
    fail: bool,
}

impl StubTopo {
    pub fn with_configurables(configurables: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            configurables: configurables.iter().map(|s| s.to_string()).collect(),
            fail: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            configurables: Vec::new(),
            fail: true,
        })
    }
}

#[async_trait]
impl TopoClient for StubTopo {
    async fn o1t_configurables(&self) -> anyhow::Result<Vec<String>> {
        if self.fail {
            return Err(anyhow!("topology registry unreachable"));
        }
        Ok(self.configurables.clone())
    }
}

/// gNMI stub recording every request and replying with canned results.
pub struct StubGnmi {
    get_result: Mutex<Result<GetResponse, Status>>,
    set_result: Mutex<Result<SetResponse, Status>>,
    pub get_requests: Mutex<Vec<GetRequest>>,
    pub set_requests: Mutex<Vec<SetRequest>>,
}

impl StubGnmi {
    /// Replies to Get with one notification holding one JSON update, and to
    /// Set with OK.
    pub fn with_json(json: &str) -> Arc<Self> {
        let response = GetResponse {
            notification: vec![Notification {
                update: vec![Update {
                    val: Some(TypedValue {
                        value: Some(typed_value::Value::JsonVal(json.as_bytes().to_vec())),
                    }),
                    ..Default::default()
                }],
                ..Default::default()
            }],
        };
        Arc::new(Self {
            get_result: Mutex::new(Ok(response)),
            set_result: Mutex::new(Ok(SetResponse::default())),
            get_requests: Mutex::new(Vec::new()),
            set_requests: Mutex::new(Vec::new()),
        })
    }

    /// Replies to both Get and Set with the given status.
    pub fn with_error(status: Status) -> Arc<Self> {
        Arc::new(Self {
            get_result: Mutex::new(Err(status.clone())),
            set_result: Mutex::new(Err(status)),
            get_requests: Mutex::new(Vec::new()),
            set_requests: Mutex::new(Vec::new()),
        })
    }

    pub fn get_count(&self) -> usize {
        self.get_requests.lock().unwrap().len()
    }

    pub fn set_count(&self) -> usize {
        self.set_requests.lock().unwrap().len()
    }
}

#[async_trait]
impl GnmiClient for StubGnmi {
    async fn get(&self, request: GetRequest) -> Result<GetResponse, Status> {
        self.get_requests.lock().unwrap().push(request);
        self.get_result.lock().unwrap().clone()
    }

    async fn set(&self, request: SetRequest) -> Result<SetResponse, Status> {
        self.set_requests.lock().unwrap().push(request);
        self.set_result.lock().unwrap().clone()
    }
}

/// Build a translator over fresh store wired to the given stubs.
pub async fn build_translator(
    gnmi: Arc<StubGnmi>,
    topo: Arc<StubTopo>,
) -> (Arc<Translator>, Arc<SessionStore>) {
    let store = Arc::new(SessionStore::new());
    let translator = Arc::new(
        Translator::new(
            store.clone(),
            topo,
            gnmi,
            Duration::from_secs(3),
        )
        .await,
    );
    (translator, store)
}
