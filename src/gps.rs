//! Decoding GGA fix sentences into [`Fix`] records.

use crate::{
    config::{NMEA_FIELDS, NMEA_FIELD_MAX_LEN},
    nmea::{decimal, digit_group, find_sentence, Fields, GGA_MARKER},
    rb::Consumer,
    store::PositionStore,
    Position,
};

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "firmware", derive(defmt::Format))]
pub struct UtcTime {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

/// One decoded position report.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "firmware", derive(defmt::Format))]
pub struct Fix {
    pub position: Position,
    /// Metres above mean sea level.
    pub altitude: f32,
    /// Horizontal dilution of precision.
    pub hdop: f32,
    pub utc: UtcTime,
    pub satellites: u8,
}

impl Fix {
    pub const ZERO: Self = Self {
        position: Position::ZERO,
        altitude: 0.0,
        hdop: 0.0,
        utc: UtcTime {
            hour: 0,
            minute: 0,
            second: 0,
        },
        satellites: 0,
    };
}

type GgaFields = Fields<NMEA_FIELDS, NMEA_FIELD_MAX_LEN>;

// Field positions within the GGA payload (after the `$GPGGA,` marker)
const UTC: usize = 0;
const LAT: usize = 1;
const LAT_HEMISPHERE: usize = 2;
const LON: usize = 3;
const LON_HEMISPHERE: usize = 4;
const SATELLITES: usize = 6;
const HDOP: usize = 7;
const ALTITUDE: usize = 8;

/// `ddmm.mmmm`-style angle: `degree_digits` whole degrees followed by
/// decimal minutes. Negated when the hemisphere field is exactly `negative`.
fn angle(value: &[u8], hemisphere: &[u8], degree_digits: usize, negative: &[u8]) -> f32 {
    let degrees = digit_group(value, 0, degree_digits) as f32;
    let minutes = decimal(value.get(degree_digits..).unwrap_or(&[]));
    let angle = degrees + minutes / 60.0;
    if hemisphere == negative {
        -angle
    } else {
        angle
    }
}

/// Decodes a GGA payload (the bytes after the marker, up to the line feed).
///
/// Returns `None` if fewer than the nine leading fields are present.
/// Malformed values inside present fields decode as zero.
pub fn decode_gga(payload: &[u8]) -> Option<Fix> {
    let fields = GgaFields::split(payload);
    if fields.len() < NMEA_FIELDS {
        return None;
    }

    let utc = fields.get(UTC);
    Some(Fix {
        position: Position {
            lat: angle(fields.get(LAT), fields.get(LAT_HEMISPHERE), 2, b"S"),
            lon: angle(fields.get(LON), fields.get(LON_HEMISPHERE), 3, b"W"),
        },
        altitude: decimal(fields.get(ALTITUDE)),
        hdop: decimal(fields.get(HDOP)),
        utc: UtcTime {
            hour: digit_group(utc, 0, 2) as u8,
            minute: digit_group(utc, 2, 2) as u8,
            second: digit_group(utc, 4, 2) as u8,
        },
        satellites: digit_group(fields.get(SATELLITES), 0, 2) as u8,
    })
}

/// Scans a window of receiver output and commits the fix from its GGA
/// sentence, if it has a complete one.
pub fn ingest(window: &[u8], store: &PositionStore) -> Option<Fix> {
    let sentence = find_sentence(window, GGA_MARKER)?;
    let fix = decode_gga(sentence.payload(window))?;
    store.commit_fix(fix);
    log_trace!(
        "fix committed: {} sats, hdop {}",
        fix.satellites,
        fix.hdop
    );
    Some(fix)
}

/// Scan buffer for receiver output that carries an unterminated sentence
/// over to the next read.
pub struct Window<const N: usize> {
    buf: [u8; N],
    len: usize,
}

impl<const N: usize> Window<N> {
    pub const fn new() -> Self {
        Self { buf: [0; N], len: 0 }
    }

    /// Bytes held back from the previous read.
    pub fn carried(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Appends whatever is waiting in `rx` and commits the fix from the
    /// first complete GGA sentence, as [`ingest`] does.
    pub fn ingest_from<const M: usize>(
        &mut self,
        rx: &Consumer<u8, M>,
        store: &PositionStore,
    ) -> Option<Fix> {
        self.len += rx.read_available(&mut self.buf[self.len..]);
        let fix = ingest(&self.buf[..self.len], store);
        self.carry_tail();
        fix
    }

    /// Keeps the bytes after the last line feed. A full window without one
    /// is dropped.
    fn carry_tail(&mut self) {
        let start = match self.buf[..self.len].iter().rposition(|&b| b == b'\n') {
            Some(i) => i + 1,
            None if self.len == N => N,
            None => 0,
        };
        self.buf.copy_within(start..self.len, 0);
        self.len -= start;
    }
}

impl<const N: usize> Default for Window<N> {
    fn default() -> Self {
        Self::new()
    }
}
