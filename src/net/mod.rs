//! Outbound TCP link to the ground station.

use core::net::SocketAddr;

pub mod client;
pub mod esp_at;

pub use client::{Client, ClientStats, Phase, Step};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "firmware", derive(defmt::Format))]
pub enum NetError {
    #[error("address resolution failed")]
    Resolve,
    #[error("unable to create socket")]
    Socket,
    #[error("connection refused")]
    Refused,
    #[error("connection timed out")]
    Timeout,
    #[error("connection closed by peer")]
    Closed,
    #[error("not connected")]
    NotConnected,
    #[error("send failed")]
    Send,
    #[error("receive failed")]
    Receive,
    #[error("outbound queue full")]
    OutboxFull,
}

/// A non-blocking stream socket provider.
///
/// `nb::Error::WouldBlock` means "not yet, call again": a connect still in
/// progress, no data to read, or no room to send. `nb::Error::Other` is a
/// hard failure of that socket.
pub trait Transport {
    type Socket;

    fn resolve(&mut self, host: &str, port: u16) -> Result<SocketAddr, NetError>;

    fn socket(&mut self) -> Result<Self::Socket, NetError>;

    /// Starts a connection, or polls one already started on `socket`.
    fn connect(&mut self, socket: &mut Self::Socket, remote: SocketAddr) -> nb::Result<(), NetError>;

    /// `Ok(0)` is not an error.
    fn receive(&mut self, socket: &mut Self::Socket, buf: &mut [u8]) -> nb::Result<usize, NetError>;

    /// Callers retry a `WouldBlock` with the same `buf`.
    fn send(&mut self, socket: &mut Self::Socket, buf: &[u8]) -> nb::Result<usize, NetError>;

    fn close(&mut self, socket: Self::Socket);
}

/// Sends all of `data`, blocking through `WouldBlock`. Stops at the first
/// hard error.
pub fn send_all<T: Transport>(
    transport: &mut T,
    socket: &mut T::Socket,
    data: &[u8],
) -> Result<(), NetError> {
    let mut sent = 0;
    while sent < data.len() {
        match nb::block!(transport.send(socket, &data[sent..]))? {
            0 => return Err(NetError::Send),
            n => sent += n,
        }
    }
    Ok(())
}
