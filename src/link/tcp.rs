//! TCP connector to a collector listening on a host:port.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use super::{Connector, LinkIo};
use crate::error::{Result, TelemetryError};

/// Connects to the collector over TCP
#[derive(Debug, Clone)]
pub struct TcpConnector {
    address: String,
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(address: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            address: address.into(),
            connect_timeout,
        }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&mut self) -> Result<LinkIo> {
        debug!("Connecting to {}", self.address);

        let stream = timeout(self.connect_timeout, TcpStream::connect(&self.address))
            .await
            .map_err(|_| TelemetryError::Link(format!("connect to {} timed out", self.address)))??;

        // Frames are small and latency matters more than coalescing
        stream.set_nodelay(true)?;

        let (reader, writer) = stream.into_split();
        Ok(LinkIo {
            reader: Box::new(reader),
            writer: Box::new(writer),
        })
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.address)
    }
}
