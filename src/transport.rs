//! UDP transport for CAM datagrams.

use crate::protocol::{self, ParseError};
use crate::types::Cam;
use std::io;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::UdpSocket;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Socket error: {0}")]
    Io(#[from] io::Error),
    #[error("Bad datagram from {from}: {source}")]
    Parse {
        from: SocketAddr,
        #[source]
        source: ParseError,
    },
}

impl TransportError {
    /// Whether the socket itself is still usable.
    pub fn is_datagram_error(&self) -> bool {
        matches!(self, Self::Parse { .. })
    }
}

/// Default port for local CAMs.
pub const DEFAULT_PORT: u16 = 6000;

/// Configuration for the CAM receiver.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Local address to bind
    pub bind_addr: SocketAddr,
    /// Receive buffer size, larger than any valid datagram
    pub recv_buffer_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            recv_buffer_size: 256,
        }
    }
}

impl TransportConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.bind_addr.set_port(port);
        self
    }

    pub fn with_recv_buffer_size(mut self, size: usize) -> Self {
        self.recv_buffer_size = size;
        self
    }
}

/// Receives and decodes CAM datagrams.
pub struct CamReceiver {
    socket: UdpSocket,
    buf: Vec<u8>,
}

impl CamReceiver {
    /// Bind the receiving socket.
    pub async fn bind(config: &TransportConfig) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(config.bind_addr).await?;
        tracing::info!("Listening for local CAM messages on {}", socket.local_addr()?);

        Ok(Self {
            socket,
            buf: vec![0u8; config.recv_buffer_size],
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }

    /// Wait for the next datagram and decode it.
    ///
    /// Returns the raw datagram length alongside the message. A datagram that
    /// fails to decode yields [`TransportError::Parse`] and leaves the socket
    /// ready for the next one.
    pub async fn recv(&mut self) -> Result<(Cam, usize), TransportError> {
        let (len, from) = self.socket.recv_from(&mut self.buf).await?;

        let cam = protocol::decode(&self.buf[..len])
            .map_err(|source| TransportError::Parse { from, source })?;

        Ok((cam, len))
    }
}

/// Sends CAMs to a fixed destination.
pub struct CamSender {
    socket: UdpSocket,
}

impl CamSender {
    /// Bind an ephemeral socket and connect it to `dest`.
    pub async fn connect(dest: SocketAddr) -> Result<Self, TransportError> {
        let local: SocketAddr = if dest.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(dest).await?;

        Ok(Self { socket })
    }

    pub async fn send(&self, cam: &Cam) -> Result<usize, TransportError> {
        let bytes = protocol::encode(cam);
        tracing::debug!("Sending CAM from station {}", cam.station_id());
        Ok(self.socket.send(&bytes).await?)
    }

    /// Send raw bytes, used to feed malformed datagrams in tests.
    pub async fn send_raw(&self, data: &[u8]) -> Result<usize, TransportError> {
        Ok(self.socket.send(data).await?)
    }
}
