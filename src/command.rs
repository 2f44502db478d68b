//! Ground station commands, one per received line.
//!
//! | Line prefix             | Effect                                   |
//! |-------------------------|------------------------------------------|
//! | `$id-req`               | reply `$id-ack-<DEVICE_ID>\r\n`           |
//! | `$gps-dest:<lat>,<lon>` | replace the commanded target             |
//!
//! Anything else is ignored.

use core::fmt::Write;

use crate::{
    config::COMMAND_FIELD_MAX_LEN,
    lines::LineRing,
    net::{Client, NetError, Transport},
    nmea::{decimal, Fields},
    rb::Producer,
    store::PositionStore,
    FmtBuf, Position,
};

pub const ID_REQUEST: &[u8] = b"$id-req";
pub const DESTINATION: &[u8] = b"$gps-dest:";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    IdRequest,
    /// Missing or unparseable coordinates decode as zero.
    Destination(Position),
}

impl Command {
    pub fn parse(line: &[u8]) -> Option<Self> {
        if line.starts_with(ID_REQUEST) {
            return Some(Command::IdRequest);
        }

        let args = line.strip_prefix(DESTINATION)?;
        let fields = Fields::<2, COMMAND_FIELD_MAX_LEN>::split(args);
        Some(Command::Destination(Position {
            lat: decimal(fields.get(0)),
            lon: decimal(fields.get(1)),
        }))
    }
}

/// Where command replies go.
pub trait Reply {
    fn reply(&mut self, bytes: &[u8]) -> Result<(), NetError>;
}

/// Queues the reply for the network task to flush.
impl<const N: usize> Reply for Producer<u8, N> {
    fn reply(&mut self, bytes: &[u8]) -> Result<(), NetError> {
        self.try_write_all(bytes).map_err(|_| NetError::OutboxFull)
    }
}

/// Writes the reply straight to the connected peer.
impl<T: Transport> Reply for Client<T> {
    fn reply(&mut self, bytes: &[u8]) -> Result<(), NetError> {
        self.write_all(bytes)
    }
}

pub struct Dispatcher {
    ack: FmtBuf<16>,
}

impl Dispatcher {
    pub fn new(device_id: u8) -> Self {
        let mut ack = FmtBuf::new();
        // Can't fail, FmtBuf truncates
        let _ = write!(ack, "$id-ack-{}\r\n", device_id);
        Self { ack }
    }

    /// The identification reply, e.g. `$id-ack-2\r\n`.
    pub fn ack(&self) -> &[u8] {
        self.ack.as_bytes()
    }

    /// Acts on one received line.
    pub fn handle(
        &self,
        line: &[u8],
        store: &PositionStore,
        reply: &mut impl Reply,
    ) -> Option<Command> {
        let command = Command::parse(line)?;
        match command {
            Command::IdRequest => {
                if let Err(err) = reply.reply(self.ack()) {
                    log_warn!("id reply not sent: {}", err);
                }
            }
            Command::Destination(target) => {
                store.commit_target(target);
                log_info!("new target {} {}", target.lat, target.lon);
            }
        }
        Some(command)
    }

    /// Handles every complete line waiting in `inbound`. Returns the number
    /// of lines consumed.
    pub fn poll<const R: usize, const C: usize>(
        &self,
        inbound: &LineRing<R, C>,
        store: &PositionStore,
        reply: &mut impl Reply,
    ) -> usize {
        let mut count = 0;
        while let Some(line) = inbound.pull_next_line() {
            if self.handle(line.trimmed(), store, reply).is_none() {
                log_debug!("ignored line of {} bytes", line.len());
            }
            count += 1;
        }
        count
    }
}
