use std::net::SocketAddr;

use bytes::BytesMut;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio_util::codec::Encoder;

use crate::core::{Error, Result};
use crate::protocol::{codec::MessageCodec, message::Message};

/// The device's UDP endpoint
pub struct Connection {
    /// UDP socket for communication
    socket: UdpSocket,
    /// Message codec
    codec: MessageCodec,
    /// Buffer for outgoing data
    send_buffer: BytesMut,
}

impl Connection {
    /// Binds the device socket.
    ///
    /// Address reuse is enabled so a restarted device can rebind at once, and
    /// broadcast is enabled on IPv4 so broadcast discovery probes arrive.
    /// Must be called from within a tokio runtime.
    pub fn bind(bind_addr: SocketAddr) -> Result<Self> {
        let socket = Socket::new(Domain::for_address(bind_addr), Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        if bind_addr.is_ipv4() {
            socket.set_broadcast(true)?;
        }
        socket.set_nonblocking(true)?;
        socket
            .bind(&bind_addr.into())
            .map_err(|e| Error::network(format!("Failed to bind {}: {}", bind_addr, e)))?;

        let socket = UdpSocket::from_std(socket.into())?;

        Ok(Connection {
            socket,
            codec: MessageCodec::new(),
            send_buffer: BytesMut::with_capacity(crate::core::MAX_PACKET_SIZE),
        })
    }

    /// Waits for one datagram
    pub async fn recv(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        Ok(self.socket.recv_from(buf).await?)
    }

    /// Encodes and sends a message to `addr`
    pub async fn send(&mut self, message: Message, addr: SocketAddr) -> Result<()> {
        self.send_buffer.clear();
        self.codec.encode(message, &mut self.send_buffer)?;
        self.socket
            .send_to(&self.send_buffer, addr)
            .await
            .map_err(|e| Error::network(format!("Failed to send to {}: {}", addr, e)))?;
        Ok(())
    }

    /// Returns the local socket address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket
            .local_addr()
            .map_err(|e| Error::network(format!("Failed to get local address: {}", e)))
    }
}
