//! Socket plumbing for the emitter.
//!
//! The emitter only sees a [`Connector`] that hands out [`DatagramSocket`]s. The
//! real implementation is a connected, non-blocking `UdpSocket`: a send either
//! completes immediately or fails, it never parks the tick loop.

use serde::Deserialize;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use tracing::debug;

use crate::error::NetworkError;

/// Destination of the haptic datagrams, fixed at emitter construction.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NetworkEndpoint {
    pub host: String,
    pub port: u16,
}

impl NetworkEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl std::fmt::Display for NetworkEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A socket that can push one datagram to a fixed peer.
pub trait DatagramSocket: Send {
    fn send(&mut self, payload: &[u8]) -> io::Result<usize>;
}

impl DatagramSocket for UdpSocket {
    fn send(&mut self, payload: &[u8]) -> io::Result<usize> {
        UdpSocket::send(self, payload)
    }
}

/// Opens sockets to the emitter's endpoint. Called lazily and after failures.
pub trait Connector: Send {
    fn endpoint(&self) -> &NetworkEndpoint;
    fn open(&mut self) -> Result<Box<dyn DatagramSocket>, NetworkError>;
}

/// Connector producing real UDP sockets.
#[derive(Debug, Clone)]
pub struct UdpConnector {
    endpoint: NetworkEndpoint,
    target: SocketAddr,
}

impl UdpConnector {
    /// Resolves the endpoint once, up front. A host that does not resolve is a
    /// configuration error for the caller to handle.
    pub fn resolve(endpoint: NetworkEndpoint) -> Result<Self, NetworkError> {
        let unresolvable = || NetworkError::Unresolvable {
            host: endpoint.host.clone(),
            port: endpoint.port,
        };
        let target = (endpoint.host.as_str(), endpoint.port)
            .to_socket_addrs()
            .map_err(|_| unresolvable())?
            .next()
            .ok_or_else(unresolvable)?;
        debug!(%endpoint, %target, "resolved haptic endpoint");
        Ok(Self { endpoint, target })
    }
}

impl Connector for UdpConnector {
    fn endpoint(&self) -> &NetworkEndpoint {
        &self.endpoint
    }

    fn open(&mut self) -> Result<Box<dyn DatagramSocket>, NetworkError> {
        let local: IpAddr = match self.target {
            SocketAddr::V4(_) => Ipv4Addr::UNSPECIFIED.into(),
            SocketAddr::V6(_) => Ipv6Addr::UNSPECIFIED.into(),
        };
        let socket = UdpSocket::bind((local, 0)).map_err(NetworkError::Open)?;
        socket.connect(self.target).map_err(NetworkError::Open)?;
        socket.set_nonblocking(true).map_err(NetworkError::Open)?;
        debug!(target = %self.target, "opened haptic socket");
        Ok(Box::new(socket))
    }
}
