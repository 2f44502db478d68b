//! Connection manager for the single TCP link to the ground station.
//!
//! The client is a state machine advanced by [`Client::step`]; every step
//! says how long the caller should sleep before the next one. It owns at
//! most one socket and closes it before opening another.

use core::{mem, net::SocketAddr, time::Duration};

use crate::{
    config::{NetConfig, ResolvePolicy, RX_CHUNK_LEN},
    lines::LineRing,
    rb::Consumer,
};

use super::{send_all, NetError, Transport};

/// What the caller does after a [`Client::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Sleep(Duration),
    /// The client will not make progress again.
    Halted(NetError),
}

/// Socket-free view of the client state, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "firmware", derive(defmt::Format))]
pub enum Phase {
    Resolving,
    Backoff,
    Connecting,
    Connected,
    Halted,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ClientStats {
    pub attempts: u32,
    pub failures: u32,
    pub connections: u32,
    pub bytes_received: usize,
    /// Most recent hard error from the write path. It does not tear the
    /// connection down; the receive path notices a dead link.
    pub last_send_error: Option<NetError>,
}

enum State<S> {
    Resolving,
    Backoff { until: u64 },
    Connecting { socket: S, deadline: u64 },
    Connected { socket: S },
    Halted(NetError),
}

pub struct Client<T: Transport> {
    transport: T,
    config: NetConfig,
    remote: Option<SocketAddr>,
    state: State<T::Socket>,
    stats: ClientStats,
}

fn ms(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

impl<T: Transport> Client<T> {
    pub fn new(transport: T, config: NetConfig) -> Self {
        Self {
            transport,
            config,
            remote: None,
            state: State::Resolving,
            stats: ClientStats::default(),
        }
    }

    pub fn phase(&self) -> Phase {
        match self.state {
            State::Resolving => Phase::Resolving,
            State::Backoff { .. } => Phase::Backoff,
            State::Connecting { .. } => Phase::Connecting,
            State::Connected { .. } => Phase::Connected,
            State::Halted(_) => Phase::Halted,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.phase() == Phase::Connected
    }

    pub fn stats(&self) -> ClientStats {
        self.stats
    }

    pub fn remote(&self) -> Option<SocketAddr> {
        self.remote
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Advances the connection by one step at time `now` (milliseconds).
    ///
    /// While connected this flushes `outbox` to the peer and pushes at most
    /// one received chunk into `inbound`.
    pub fn step<const R: usize, const C: usize, const N: usize>(
        &mut self,
        now: u64,
        inbound: &LineRing<R, C>,
        outbox: &Consumer<u8, N>,
    ) -> Step {
        let (state, step) = match mem::replace(&mut self.state, State::Resolving) {
            State::Resolving => self.resolve(now, false),
            State::Backoff { until } if now < until => {
                (State::Backoff { until }, Step::Sleep(ms(until - now)))
            }
            State::Backoff { .. } => match self.remote {
                Some(remote) => self.open(now, remote),
                None => self.resolve(now, true),
            },
            State::Connecting { socket, deadline } => self.poll_connect(now, socket, deadline),
            State::Connected { socket } => self.service(now, socket, inbound, outbox),
            State::Halted(err) => (State::Halted(err), Step::Halted(err)),
        };
        self.state = state;
        step
    }

    /// Writes all of `data` to the connected peer, blocking through partial
    /// writes. A failure is recorded in [`ClientStats::last_send_error`].
    pub fn write_all(&mut self, data: &[u8]) -> Result<(), NetError> {
        let sent = match &mut self.state {
            State::Connected { socket } => send_all(&mut self.transport, socket, data),
            _ => return Err(NetError::NotConnected),
        };
        self.record_send(sent)
    }

    fn record_send(&mut self, sent: Result<(), NetError>) -> Result<(), NetError> {
        if let Err(err) = sent {
            log_error!("send failed: {}", err);
            self.stats.last_send_error = Some(err);
        }
        sent
    }

    fn backoff(&self, now: u64) -> (State<T::Socket>, Step) {
        let delay = self.config.backoff_ms as u64;
        (State::Backoff { until: now + delay }, Step::Sleep(ms(delay)))
    }

    fn halt(&self, err: NetError) -> (State<T::Socket>, Step) {
        log_error!("network halted: {}", err);
        (State::Halted(err), Step::Halted(err))
    }

    /// `waited` is set when a back-off already ran before this resolve, in
    /// which case a resolved address is connected to straight away.
    fn resolve(&mut self, now: u64, waited: bool) -> (State<T::Socket>, Step) {
        match self.transport.resolve(self.config.host, self.config.port) {
            Ok(remote) => {
                log_debug!("resolved {}", self.config.host);
                self.remote = Some(remote);
                if waited {
                    self.open(now, remote)
                } else {
                    self.backoff(now)
                }
            }
            Err(err) => match self.config.on_resolve_failure {
                ResolvePolicy::Halt => self.halt(err),
                ResolvePolicy::Retry => {
                    log_warn!("unable to resolve {}: {}", self.config.host, err);
                    self.backoff(now)
                }
            },
        }
    }

    fn open(&mut self, now: u64, remote: SocketAddr) -> (State<T::Socket>, Step) {
        self.stats.attempts += 1;
        let mut socket = match self.transport.socket() {
            Ok(socket) => socket,
            Err(err) => return self.halt(err),
        };

        match self.transport.connect(&mut socket, remote) {
            Ok(()) => self.connected(socket),
            Err(nb::Error::WouldBlock) => {
                let deadline = now + self.config.connect_timeout_ms as u64;
                (
                    State::Connecting { socket, deadline },
                    Step::Sleep(ms(self.config.rx_tick_ms as u64)),
                )
            }
            Err(nb::Error::Other(err)) => self.fail(now, socket, "connect failed", err),
        }
    }

    fn poll_connect(
        &mut self,
        now: u64,
        mut socket: T::Socket,
        deadline: u64,
    ) -> (State<T::Socket>, Step) {
        let Some(remote) = self.remote else {
            return self.fail(now, socket, "connect failed", NetError::Resolve);
        };

        match self.transport.connect(&mut socket, remote) {
            Ok(()) => self.connected(socket),
            Err(nb::Error::WouldBlock) if now >= deadline => {
                self.fail(now, socket, "connect failed", NetError::Timeout)
            }
            Err(nb::Error::WouldBlock) => {
                let tick = (self.config.rx_tick_ms as u64).min(deadline - now);
                (State::Connecting { socket, deadline }, Step::Sleep(ms(tick)))
            }
            Err(nb::Error::Other(err)) => self.fail(now, socket, "connect failed", err),
        }
    }

    fn connected(&mut self, socket: T::Socket) -> (State<T::Socket>, Step) {
        self.stats.connections += 1;
        log_info!("connected to {}:{}", self.config.host, self.config.port);
        (State::Connected { socket }, Step::Sleep(Duration::ZERO))
    }

    fn fail(
        &mut self,
        now: u64,
        socket: T::Socket,
        what: &'static str,
        err: NetError,
    ) -> (State<T::Socket>, Step) {
        self.transport.close(socket);
        self.stats.failures += 1;
        log_warn!("{}: {}", what, err);
        self.backoff(now)
    }

    fn service<const R: usize, const C: usize, const N: usize>(
        &mut self,
        now: u64,
        mut socket: T::Socket,
        inbound: &LineRing<R, C>,
        outbox: &Consumer<u8, N>,
    ) -> (State<T::Socket>, Step) {
        self.flush(&mut socket, outbox);

        let mut chunk = [0_u8; RX_CHUNK_LEN];
        match self.transport.receive(&mut socket, &mut chunk) {
            Ok(0) | Err(nb::Error::WouldBlock) => {}
            Ok(n) => {
                self.stats.bytes_received += n;
                log_trace!("received {} bytes", n);
                inbound.push_bytes(&chunk[..n]);
            }
            Err(nb::Error::Other(err)) => return self.fail(now, socket, "connection lost", err),
        }

        (
            State::Connected { socket },
            Step::Sleep(ms(self.config.rx_tick_ms as u64)),
        )
    }

    fn flush<const N: usize>(&mut self, socket: &mut T::Socket, outbox: &Consumer<u8, N>) {
        let mut chunk = [0_u8; 32];
        loop {
            let n = outbox.read_available(&mut chunk);
            if n == 0 {
                break;
            }
            let sent = send_all(&mut self.transport, socket, &chunk[..n]);
            if self.record_send(sent).is_err() {
                break;
            }
        }
    }
}
