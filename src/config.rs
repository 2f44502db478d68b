//! Build-time configuration for one Laelaps capsule.

/// Identity of this capsule, reported in the `$id-ack-<id>` reply.
/// Valid range is 1-5; the ground station only tracks five capsules.
pub const DEVICE_ID: u8 = 2;

/// Rows in the inbound line ring.
pub const RX_LINE_ROWS: usize = 5;
/// Bytes per inbound line, including the slot reserved for the terminator.
pub const RX_LINE_COLUMNS: usize = 64;

/// GGA fields kept by the field splitter; later fields are dropped.
pub const NMEA_FIELDS: usize = 9;
/// Characters kept per NMEA field.
pub const NMEA_FIELD_MAX_LEN: usize = 12;
/// Characters kept per field of a `$gps-dest:` command.
pub const COMMAND_FIELD_MAX_LEN: usize = 12;

/// Largest chunk of GPS UART data scanned in one pass.
pub const GPS_WINDOW_LEN: usize = 1024;

pub const GPS_PERIOD_MS: u32 = 500;
pub const DISPATCH_PERIOD_MS: u32 = 200;
pub const CONTROL_PERIOD_MS: u32 = 1000;

pub const GPS_RX_BUFSIZE: usize = 1024;
pub const LINK_RX_BUFSIZE: usize = 512;
pub const LINK_TX_BUFSIZE: usize = 256;
pub const OUTBOX_BUFSIZE: usize = 64;

/// What the network task does when the peer address cannot be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "firmware", derive(defmt::Format))]
pub enum ResolvePolicy {
    /// Stop the network task. Resolution failure then looks exactly like a
    /// permanent misconfiguration.
    Halt,
    /// Back off and resolve again, forever.
    Retry,
}

#[derive(Debug, Clone, Copy)]
pub struct NetConfig {
    pub host: &'static str,
    pub port: u16,
    /// Delay before every connection attempt, including the first.
    pub backoff_ms: u32,
    /// Bound on waiting for an in-progress connect to complete.
    pub connect_timeout_ms: u32,
    /// Receive poll interval while connected.
    pub rx_tick_ms: u32,
    pub on_resolve_failure: ResolvePolicy,
}

impl NetConfig {
    pub const DEFAULT: Self = Self {
        host: "192.168.4.1",
        port: 7983,
        backoff_ms: 1000,
        connect_timeout_ms: 1000,
        rx_tick_ms: 50,
        on_resolve_failure: ResolvePolicy::Retry,
    };
}

impl Default for NetConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Bytes read from the socket per receive call.
pub const RX_CHUNK_LEN: usize = 128;
