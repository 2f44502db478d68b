#![allow(dead_code)]

use std::{
    collections::VecDeque,
    net::{Ipv4Addr, SocketAddr},
};

use laelaps::net::{NetError, Transport};

/// Ground station stand-in: accepts or refuses, hands out queued chunks,
/// records everything sent to it.
#[derive(Default)]
pub struct ScriptedPeer {
    pub refuse: bool,
    pub inbound: VecDeque<Vec<u8>>,
    pub hang_up: bool,
    pub sent: Vec<u8>,
    pub opened: u32,
    pub closed: u32,
}

impl ScriptedPeer {
    pub fn live_sockets(&self) -> u32 {
        self.opened - self.closed
    }
}

pub struct PeerSocket;

impl Transport for ScriptedPeer {
    type Socket = PeerSocket;

    fn resolve(&mut self, _host: &str, port: u16) -> Result<SocketAddr, NetError> {
        Ok(SocketAddr::from((Ipv4Addr::new(192, 168, 4, 1), port)))
    }

    fn socket(&mut self) -> Result<PeerSocket, NetError> {
        self.opened += 1;
        Ok(PeerSocket)
    }

    fn connect(&mut self, _socket: &mut PeerSocket, _remote: SocketAddr) -> nb::Result<(), NetError> {
        if self.refuse {
            Err(nb::Error::Other(NetError::Refused))
        } else {
            Ok(())
        }
    }

    fn receive(&mut self, _socket: &mut PeerSocket, buf: &mut [u8]) -> nb::Result<usize, NetError> {
        match self.inbound.pop_front() {
            Some(chunk) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                Ok(n)
            }
            None if self.hang_up => Err(nb::Error::Other(NetError::Closed)),
            None => Err(nb::Error::WouldBlock),
        }
    }

    fn send(&mut self, _socket: &mut PeerSocket, buf: &[u8]) -> nb::Result<usize, NetError> {
        self.sent.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn close(&mut self, _socket: PeerSocket) {
        self.closed += 1;
    }
}

pub const GGA: &[u8] = b"$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\r\n";

pub fn close_to(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-4
}
