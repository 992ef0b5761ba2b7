//! The rendezvous transport seam.
//!
//! The relay core only needs two things from a transport: a constructor
//! taking a [`TransportConfig`] and a `dial` returning a byte stream. The
//! rendezvous mechanics behind it (broker negotiation, ICE, fronting) live
//! in the factory implementation.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use log::info;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

pub trait TransportStream: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> TransportStream for T {}

pub type BoxedStream = Box<dyn TransportStream>;

/// Everything a factory needs to stand up one rendezvous transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub broker_url: String,
    pub amp_cache_url: String,
    pub front_domains: Vec<String>,
    pub ice_addresses: Vec<String>,
    pub max_peers: u32,
    pub utls_client_id: String,
    pub utls_remove_sni: bool,
}

/// A live rendezvous tunnel endpoint. `dial` may be called repeatedly and
/// concurrently on the same handle.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn dial(&self) -> Result<BoxedStream>;
}

pub trait TransportFactory: Send + Sync {
    fn create(&self, config: &TransportConfig) -> Result<Arc<dyn Transport>>;
}

/// Plain TCP transport to a fixed bridge address. Stands in for a full
/// rendezvous implementation when the bridge is directly reachable.
pub struct DirectTransport {
    bridge_addr: String,
}

#[async_trait]
impl Transport for DirectTransport {
    async fn dial(&self) -> Result<BoxedStream> {
        info!("Connecting to bridge {}", self.bridge_addr);
        let stream = TcpStream::connect(&self.bridge_addr).await?;
        Ok(Box::new(stream))
    }
}

pub struct DirectTransportFactory {
    bridge_addr: String,
}

impl DirectTransportFactory {
    pub fn new(bridge_addr: String) -> Self {
        DirectTransportFactory { bridge_addr }
    }
}

impl TransportFactory for DirectTransportFactory {
    fn create(&self, _config: &TransportConfig) -> Result<Arc<dyn Transport>> {
        Ok(Arc::new(DirectTransport {
            bridge_addr: self.bridge_addr.clone(),
        }))
    }
}
