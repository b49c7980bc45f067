//! Recovery client over the agents' replication service.

use crate::error::{GrpcError, Result};
use crate::proto::{Empty, RECOVER_PATH, Recovery, SERVICE};
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tonic::GrpcMethod;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};
use tracing::debug;
use vald_replication::{BoxError, MemberRecord, RecoveryClient};

/// Port agents serve the replication service on by default.
pub const DEFAULT_PORT: u16 = 8081;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Sends `Recover` requests to agents, keeping one channel per address.
///
/// Channels connect lazily on first use. A failed call evicts the channel
/// for that address so the next attempt dials again.
pub struct GrpcRecoveryClient {
    channels: DashMap<String, Channel>,
    port: u16,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl GrpcRecoveryClient {
    pub fn new(port: u16) -> Self {
        Self {
            channels: DashMap::new(),
            port,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Number of pooled channels.
    pub fn pooled(&self) -> usize {
        self.channels.len()
    }

    /// URI of the replication service on `address`.
    pub fn uri(&self, address: &str) -> String {
        if address.contains(':') && !address.starts_with('[') {
            format!("http://[{address}]:{}", self.port)
        } else {
            format!("http://{address}:{}", self.port)
        }
    }

    fn channel(&self, address: &str) -> Result<Channel> {
        if let Some(channel) = self.channels.get(address) {
            return Ok(channel.clone());
        }

        let uri = self.uri(address);
        let endpoint = Endpoint::from_shared(uri.clone())
            .map_err(|source| GrpcError::InvalidEndpoint { uri, source })?
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout);
        let channel = endpoint.connect_lazy();

        Ok(self
            .channels
            .entry(address.to_string())
            .or_insert(channel)
            .clone())
    }

    fn evict(&self, address: &str) {
        if self.channels.remove(address).is_some() {
            debug!(address, "evicted replication channel");
        }
    }

    /// Sends one `Recover` request naming `member` to the agent at its address.
    pub async fn send_recover(&self, member: &MemberRecord) -> Result<()> {
        let channel = self.channel(&member.address)?;
        let request = Recovery {
            deleted_agents: vec![member.name.clone()],
        };

        let result = unary_recover(channel, &member.address, request).await;
        if result.is_err() {
            self.evict(&member.address);
        }
        result
    }
}

impl Default for GrpcRecoveryClient {
    fn default() -> Self {
        Self::new(DEFAULT_PORT)
    }
}

#[async_trait]
impl RecoveryClient for GrpcRecoveryClient {
    async fn recover(&self, member: &MemberRecord) -> std::result::Result<(), BoxError> {
        self.send_recover(member).await.map_err(Into::into)
    }
}

async fn unary_recover(channel: Channel, address: &str, request: Recovery) -> Result<()> {
    let mut grpc = tonic::client::Grpc::new(channel);
    grpc.ready().await.map_err(|source| GrpcError::NotReady {
        address: address.to_string(),
        source,
    })?;

    let codec = tonic::codec::ProstCodec::<Recovery, Empty>::default();
    let path = PathAndQuery::from_static(RECOVER_PATH);
    let mut req = tonic::Request::new(request);
    req.extensions_mut()
        .insert(GrpcMethod::new(SERVICE, "Recover"));

    grpc.unary(req, path, codec)
        .await
        .map_err(|status| GrpcError::Status {
            address: address.to_string(),
            status,
        })?;
    Ok(())
}
