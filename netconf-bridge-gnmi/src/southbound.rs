//! Southbound gNMI client facade.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Status};
use tracing::info;

use netconf_bridge_proto::gnmi::g_nmi_client::GNmiClient;
use netconf_bridge_proto::gnmi::{GetRequest, GetResponse, SetRequest, SetResponse};

/// A way of making gNMI calls. The translator only depends on this trait so
/// tests can substitute a recording stub.
#[async_trait]
pub trait GnmiClient: Send + Sync {
    async fn get(&self, request: GetRequest) -> Result<GetResponse, Status>;
    async fn set(&self, request: SetRequest) -> Result<SetResponse, Status>;
}

/// gNMI facade over a persistent tonic channel.
///
/// The channel is dialled lazily and the transport re-establishes broken
/// connections on subsequent calls, so a temporarily unreachable endpoint
/// degrades to per-call errors instead of failing startup.
pub struct GnmiChannel {
    client: GNmiClient<Channel>,
}

impl GnmiChannel {
    pub fn connect(endpoint: &str) -> Result<Self> {
        let uri = if endpoint.contains("://") {
            endpoint.to_string()
        } else {
            format!("http://{}", endpoint)
        };

        info!(endpoint = %uri, "connecting gNMI southbound");
        let channel = Endpoint::from_shared(uri)
            .context("invalid gNMI endpoint")?
            .connect_lazy();

        Ok(Self {
            client: GNmiClient::new(channel),
        })
    }
}

#[async_trait]
impl GnmiClient for GnmiChannel {
    async fn get(&self, request: GetRequest) -> Result<GetResponse, Status> {
        let mut client = self.client.clone();
        client
            .get(Request::new(request))
            .await
            .map(|response| response.into_inner())
    }

    async fn set(&self, request: SetRequest) -> Result<SetResponse, Status> {
        let mut client = self.client.clone();
        client
            .set(Request::new(request))
            .await
            .map(|response| response.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_accepts_bare_host_port() {
        assert!(GnmiChannel::connect("onos-config:5150").is_ok());
    }

    #[tokio::test]
    async fn test_connect_accepts_full_uri() {
        assert!(GnmiChannel::connect("http://localhost:9339").is_ok());
    }
}
