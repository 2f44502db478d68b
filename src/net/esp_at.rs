//! [`Transport`] over an ESP-AT Wi-Fi coprocessor in single-connection mode
//! (`AT+CIPMUX=0`), talking over a UART byte link.
//!
//! The coprocessor is assumed to be joined to the access point already.
//! Only IPv4 literals resolve; there is no DNS.

use core::{
    fmt::Write,
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
};

use tinyvec::ArrayVec;

use crate::{
    rb::{Consumer, Producer},
    FmtBuf,
};

use super::{NetError, Transport};

/// Largest payload accepted by one `AT+CIPSEND`.
pub const MAX_SEND: usize = 2048;
/// Received payload bytes buffered between `receive` calls.
pub const RX_PENDING_LEN: usize = 256;
const RESPONSE_LINE_LEN: usize = 64;

/// Raw byte link to the coprocessor.
pub trait Link {
    fn read(&mut self) -> Option<u8>;
    /// Blocks until every byte has been queued.
    fn write(&mut self, bytes: &[u8]);
}

/// [`Link`] over a pair of interrupt-serviced byte pipes.
pub struct RingLink<const TX: usize, const RX: usize> {
    tx: Producer<u8, TX>,
    rx: Consumer<u8, RX>,
}

impl<const TX: usize, const RX: usize> RingLink<TX, RX> {
    pub fn new(tx: Producer<u8, TX>, rx: Consumer<u8, RX>) -> Self {
        Self { tx, rx }
    }
}

impl<const TX: usize, const RX: usize> Link for RingLink<TX, RX> {
    fn read(&mut self) -> Option<u8> {
        self.rx.try_read()
    }

    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            while self.tx.try_write(b).is_err() {
                core::hint::spin_loop();
            }
        }
    }
}

/// Something the coprocessor said.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Ok,
    Error,
    Connect,
    AlreadyConnected,
    Closed,
    SendOk,
    SendFail,
    Prompt,
    Data(u8),
}

// States are named for the portion of the response which was *last received*
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderState {
    LineStart,
    Line,
    IpdLength { len: usize },
    Payload { remaining: usize },
}

/// Splits the coprocessor's output into response lines, the send prompt,
/// and `+IPD,<len>:<payload>` data frames.
struct Reader {
    state: ReaderState,
    line: ArrayVec<[u8; RESPONSE_LINE_LEN]>,
}

impl Reader {
    fn new() -> Self {
        Self {
            state: ReaderState::LineStart,
            line: ArrayVec::new(),
        }
    }

    fn feed(&mut self, b: u8) -> Option<Event> {
        match self.state {
            ReaderState::LineStart if b == b'>' => Some(Event::Prompt),
            ReaderState::LineStart if matches!(b, b'\r' | b'\n' | b' ') => None,
            ReaderState::LineStart | ReaderState::Line => {
                if b == b'\n' {
                    let event = classify(&self.line);
                    self.line.clear();
                    self.state = ReaderState::LineStart;
                    return event;
                }

                let _ = self.line.try_push(b);
                self.state = ReaderState::Line;
                if self.line.as_slice() == b"+IPD," {
                    self.line.clear();
                    self.state = ReaderState::IpdLength { len: 0 };
                }
                None
            }
            ReaderState::IpdLength { len } => {
                self.state = match b {
                    b'0'..=b'9' => ReaderState::IpdLength {
                        len: len.saturating_mul(10).saturating_add((b - b'0') as usize),
                    },
                    b':' if len > 0 => ReaderState::Payload { remaining: len },
                    _ => ReaderState::LineStart,
                };
                None
            }
            ReaderState::Payload { remaining } => {
                self.state = match remaining {
                    1 => ReaderState::LineStart,
                    _ => ReaderState::Payload {
                        remaining: remaining - 1,
                    },
                };
                Some(Event::Data(b))
            }
        }
    }
}

fn classify(line: &[u8]) -> Option<Event> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    match line {
        b"OK" => Some(Event::Ok),
        b"ERROR" | b"FAIL" => Some(Event::Error),
        b"CONNECT" => Some(Event::Connect),
        b"ALREADY CONNECTED" => Some(Event::AlreadyConnected),
        b"CLOSED" => Some(Event::Closed),
        b"SEND OK" => Some(Event::SendOk),
        b"SEND FAIL" => Some(Event::SendFail),
        // Command echo, "busy p...", "Recv n bytes", Wi-Fi status, ...
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Session {
    Idle,
    Opening,
    OpenFailed,
    Open,
    AwaitingPrompt { len: usize },
    Prompted { len: usize },
    AwaitingAck { len: usize },
    Sent { len: usize },
    SendFailed,
    PeerClosed,
}

impl Session {
    fn is_established(self) -> bool {
        !matches!(
            self,
            Session::Idle | Session::Opening | Session::OpenFailed | Session::PeerClosed
        )
    }

    fn on_event(self, event: Event) -> Self {
        match (self, event) {
            (Session::Opening, Event::Connect | Event::AlreadyConnected) => Session::Open,
            (Session::Opening, Event::Error | Event::Closed) => Session::OpenFailed,
            (Session::AwaitingPrompt { len }, Event::Prompt) => Session::Prompted { len },
            (
                Session::AwaitingPrompt { .. } | Session::AwaitingAck { .. },
                Event::Error | Event::SendFail,
            ) => Session::SendFailed,
            (Session::AwaitingAck { len }, Event::SendOk) => Session::Sent { len },
            (Session::Idle | Session::Opening | Session::OpenFailed, _) => self,
            (_, Event::Closed) => Session::PeerClosed,
            _ => self,
        }
    }
}

/// The coprocessor's only connection.
#[derive(Debug)]
pub struct AtSocket(());

pub struct EspAt<L: Link> {
    link: L,
    reader: Reader,
    session: Session,
    rx: ArrayVec<[u8; RX_PENDING_LEN]>,
    socket_taken: bool,
}

impl<L: Link> EspAt<L> {
    pub fn new(link: L) -> Self {
        Self {
            link,
            reader: Reader::new(),
            session: Session::Idle,
            rx: ArrayVec::new(),
            socket_taken: false,
        }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Consumes everything the coprocessor has sent so far.
    fn poll(&mut self) {
        while let Some(b) = self.link.read() {
            match self.reader.feed(b) {
                Some(Event::Data(b)) if self.session.is_established() => {
                    if self.rx.try_push(b).is_some() {
                        log_warn!("dropped received byte, pending buffer full");
                    }
                }
                Some(Event::Data(_)) | None => {}
                Some(event) => self.session = self.session.on_event(event),
            }
        }
    }

    fn command(&mut self, args: core::fmt::Arguments) -> Result<(), NetError> {
        let mut cmd = FmtBuf::<64>::new();
        cmd.write_fmt(args).map_err(|_| NetError::Send)?;
        log_trace!("at: {}", cmd.as_str().unwrap_or("?"));
        self.link.write(cmd.as_bytes());
        Ok(())
    }
}

impl<L: Link> Transport for EspAt<L> {
    type Socket = AtSocket;

    fn resolve(&mut self, host: &str, port: u16) -> Result<SocketAddr, NetError> {
        let ip: Ipv4Addr = host.parse().map_err(|_| NetError::Resolve)?;
        Ok(SocketAddr::V4(SocketAddrV4::new(ip, port)))
    }

    fn socket(&mut self) -> Result<AtSocket, NetError> {
        if self.socket_taken {
            return Err(NetError::Socket);
        }
        self.socket_taken = true;
        Ok(AtSocket(()))
    }

    fn connect(&mut self, _socket: &mut AtSocket, remote: SocketAddr) -> nb::Result<(), NetError> {
        self.poll();
        match self.session {
            Session::Idle | Session::PeerClosed => {
                let SocketAddr::V4(remote) = remote else {
                    return Err(nb::Error::Other(NetError::Resolve));
                };
                self.rx.clear();
                self.command(format_args!(
                    "AT+CIPSTART=\"TCP\",\"{}\",{}\r\n",
                    remote.ip(),
                    remote.port()
                ))?;
                self.session = Session::Opening;
                Err(nb::Error::WouldBlock)
            }
            Session::Opening => Err(nb::Error::WouldBlock),
            Session::OpenFailed => {
                self.session = Session::Idle;
                Err(nb::Error::Other(NetError::Refused))
            }
            _ => Ok(()),
        }
    }

    fn receive(&mut self, _socket: &mut AtSocket, buf: &mut [u8]) -> nb::Result<usize, NetError> {
        self.poll();
        if !self.rx.is_empty() {
            let n = self.rx.len().min(buf.len());
            buf[..n].copy_from_slice(&self.rx[..n]);
            self.rx.drain(..n).for_each(|_| ());
            return Ok(n);
        }
        match self.session {
            Session::PeerClosed => Err(nb::Error::Other(NetError::Closed)),
            Session::Idle | Session::Opening | Session::OpenFailed => {
                Err(nb::Error::Other(NetError::NotConnected))
            }
            _ => Err(nb::Error::WouldBlock),
        }
    }

    fn send(&mut self, _socket: &mut AtSocket, buf: &[u8]) -> nb::Result<usize, NetError> {
        self.poll();
        match self.session {
            Session::Open if buf.is_empty() => Ok(0),
            Session::Open => {
                let len = buf.len().min(MAX_SEND);
                self.command(format_args!("AT+CIPSEND={}\r\n", len))?;
                self.session = Session::AwaitingPrompt { len };
                Err(nb::Error::WouldBlock)
            }
            Session::Prompted { len } => {
                self.link.write(&buf[..len.min(buf.len())]);
                self.session = Session::AwaitingAck { len };
                Err(nb::Error::WouldBlock)
            }
            Session::AwaitingPrompt { .. } | Session::AwaitingAck { .. } => {
                Err(nb::Error::WouldBlock)
            }
            Session::Sent { len } => {
                self.session = Session::Open;
                Ok(len)
            }
            Session::SendFailed => {
                self.session = Session::Open;
                Err(nb::Error::Other(NetError::Send))
            }
            Session::PeerClosed => Err(nb::Error::Other(NetError::Closed)),
            Session::Idle | Session::Opening | Session::OpenFailed => {
                Err(nb::Error::Other(NetError::NotConnected))
            }
        }
    }

    fn close(&mut self, _socket: AtSocket) {
        if self.session != Session::Idle {
            self.link.write(b"AT+CIPCLOSE\r\n");
        }
        self.session = Session::Idle;
        self.rx.clear();
        self.socket_taken = false;
    }
}
