//! Locating NMEA-style sentences in a raw byte window and splitting them
//! into comma-separated fields.
//!
//! Everything here is tolerant: malformed input yields `None` or zero, never
//! an error.

use tinyvec::ArrayVec;

/// Marker of the GGA fix sentence, including the comma that ends the tag.
pub const GGA_MARKER: &[u8] = b"$GPGGA,";

/// Where a sentence's payload sits inside a scan window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sentence {
    /// Offset of the first byte after the marker.
    pub start: usize,
    /// Payload length up to, not including, the line feed.
    pub len: usize,
}

impl Sentence {
    pub fn payload<'a>(&self, window: &'a [u8]) -> &'a [u8] {
        &window[self.start..self.start + self.len]
    }
}

/// Scans `window` for `marker` followed by a line feed.
///
/// A mismatching byte resets the match cursor to zero without re-checking
/// that byte against the start of the marker. If the marker completes more
/// than once before a line feed, the most recent occurrence wins. A
/// completed marker with no line feed after it in the window is not a match.
pub fn find_sentence(window: &[u8], marker: &[u8]) -> Option<Sentence> {
    if marker.is_empty() {
        return None;
    }

    let mut matched = 0;
    let mut start = None;
    for (i, &b) in window.iter().enumerate() {
        if b == marker[matched] {
            matched += 1;
        } else {
            matched = 0;
        }

        if matched == marker.len() {
            matched = 0;
            start = Some(i + 1);
        }

        if let Some(start) = start {
            if b == b'\n' && i >= start {
                return Some(Sentence { start, len: i - start });
            }
        }
    }

    None
}

pub type Field<const LEN: usize> = ArrayVec<[u8; LEN]>;

/// Up to `N` comma-separated fields of up to `LEN` bytes each.
#[derive(Debug, Clone, Default)]
pub struct Fields<const N: usize, const LEN: usize>(ArrayVec<[Field<LEN>; N]>);

impl<const N: usize, const LEN: usize> Fields<N, LEN> {
    /// Splits on commas. Fields past the `N`th and bytes past the `LEN`th
    /// within a field are dropped.
    pub fn split(payload: &[u8]) -> Self {
        let mut fields = ArrayVec::new();
        if N == 0 {
            return Self(fields);
        }
        fields.push(Field::new());

        for &b in payload {
            if b == b',' {
                if fields.len() == N {
                    break;
                }
                fields.push(Field::new());
            } else if let Some(field) = fields.last_mut() {
                let _ = field.try_push(b);
            }
        }

        Self(fields)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The field at `index`, or an empty slice if it wasn't present.
    pub fn get(&self, index: usize) -> &[u8] {
        self.0.get(index).map(|f| f.as_slice()).unwrap_or(&[])
    }
}

/// Decodes `len` ASCII digits starting at `start`. Any non-digit or missing
/// byte in the group decodes the whole group as zero.
pub fn digit_group(field: &[u8], start: usize, len: usize) -> u32 {
    let mut value = 0_u32;
    for i in start..start + len {
        match field.get(i) {
            Some(&d @ b'0'..=b'9') => value = value * 10 + (d - b'0') as u32,
            _ => return 0,
        }
    }
    value
}

/// Parses decimal text, ignoring surrounding whitespace and line endings.
/// Anything unparseable is zero.
pub fn decimal(field: &[u8]) -> f32 {
    core::str::from_utf8(field)
        .ok()
        .and_then(|s| s.trim().parse::<f32>().ok())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GGA: &[u8] =
        b"$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\r\n";

    #[test]
    fn finds_payload_after_marker() {
        let s = find_sentence(GGA, GGA_MARKER).unwrap();
        assert_eq!(s.start, 7);
        assert_eq!(
            s.payload(GGA),
            b"123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\r"
        );
    }

    #[test]
    fn skips_other_sentences() {
        let window = b"$GPRMC,123519,A,4807.038,N\n$GPGGA,1,2\n";
        let s = find_sentence(window, GGA_MARKER).unwrap();
        assert_eq!(s.payload(window), b"1,2");
    }

    #[test]
    fn no_marker_is_not_found() {
        assert_eq!(find_sentence(b"", GGA_MARKER), None);
        assert_eq!(find_sentence(b"\n\n\n", GGA_MARKER), None);
        assert_eq!(find_sentence(b"$GPGG", GGA_MARKER), None);
        assert_eq!(find_sentence(b"$GPGSV,1,2,3\n", GGA_MARKER), None);
    }

    #[test]
    fn marker_without_terminator_is_not_found() {
        assert_eq!(find_sentence(b"junk\n$GPGGA,123519,4807", GGA_MARKER), None);
    }

    #[test]
    fn terminator_before_marker_is_ignored() {
        let window = b"\n\n$GPGGA,x\n";
        assert_eq!(find_sentence(window, GGA_MARKER).unwrap().payload(window), b"x");
    }

    #[test]
    fn mismatch_does_not_retrigger_on_same_byte() {
        // The second '$' breaks the match and is not itself treated as a new start.
        assert_eq!(find_sentence(b"$$GPGGA,x\n", GGA_MARKER), None);
    }

    // Documented behaviour, kept as-is: when the marker completes twice before
    // a line feed, the later occurrence is reported.
    #[test]
    fn later_marker_before_terminator_wins() {
        let window = b"$GPGGA,first$GPGGA,second\n";
        let s = find_sentence(window, GGA_MARKER).unwrap();
        assert_eq!(s.payload(window), b"second");
    }

    // Documented behaviour, kept as-is: the first terminated sentence is
    // reported even if a newer one follows in the same window.
    #[test]
    fn first_terminated_sentence_is_reported() {
        let window = b"$GPGGA,first\n$GPGGA,second\n";
        let s = find_sentence(window, GGA_MARKER).unwrap();
        assert_eq!(s.payload(window), b"first");
    }

    #[test]
    fn scanner_stays_in_bounds_on_arbitrary_bytes() {
        let mut window = [0_u8; 256];
        for (i, b) in window.iter_mut().enumerate() {
            *b = (i * 37 % 251) as u8;
        }
        for end in 0..window.len() {
            if let Some(s) = find_sentence(&window[..end], GGA_MARKER) {
                assert!(s.start + s.len <= end);
            }
        }
    }

    #[test]
    fn split_drops_extra_fields_and_characters() {
        let fields = Fields::<3, 4>::split(b"abcdefg,hi,,jk,lm");
        assert_eq!(fields.len(), 3);
        assert_eq!(fields.get(0), b"abcd");
        assert_eq!(fields.get(1), b"hi");
        assert_eq!(fields.get(2), b"");
        assert_eq!(fields.get(3), b"");
    }

    #[test]
    fn split_of_empty_payload_has_one_empty_field() {
        let fields = Fields::<9, 12>::split(b"");
        assert_eq!(fields.len(), 1);
        assert_eq!(fields.get(0), b"");
    }

    #[test]
    fn digit_group_rejects_any_non_digit() {
        assert_eq!(digit_group(b"123519", 0, 2), 12);
        assert_eq!(digit_group(b"123519", 2, 2), 35);
        assert_eq!(digit_group(b"123519", 4, 2), 19);
        assert_eq!(digit_group(b"12a519", 2, 2), 0);
        assert_eq!(digit_group(b"1", 0, 2), 0);
        assert_eq!(digit_group(b"", 0, 2), 0);
        assert_eq!(digit_group(b"01131.000", 0, 3), 11);
    }

    #[test]
    fn decimal_is_tolerant() {
        assert_eq!(decimal(b"545.4"), 545.4);
        assert_eq!(decimal(b"-80.25\r\n"), -80.25);
        assert_eq!(decimal(b"1e2"), 100.0);
        assert_eq!(decimal(b""), 0.0);
        assert_eq!(decimal(b"4.5.6"), 0.0);
        assert_eq!(decimal(&[0xff, b'1']), 0.0);
    }
}
