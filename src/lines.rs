//! Ring of received text lines, written by the network task and read by the
//! command dispatcher.
//!
//! The writer never blocks and never fails: when it wraps onto the oldest
//! unread line, that line is dropped. Lines longer than a slot are split,
//! with the last byte of every slot left free for a terminator.

use core::cell::RefCell;

use critical_section::Mutex;

/// One line-sized slot. Holds at most `C - 1` bytes.
#[derive(Clone, Copy)]
pub struct Line<const C: usize> {
    buf: [u8; C],
    len: usize,
}

impl<const C: usize> Line<C> {
    pub const fn new() -> Self {
        Self { buf: [0; C], len: 0 }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The line without its trailing `\n` / `\r\n`.
    pub fn trimmed(&self) -> &[u8] {
        let mut bytes = self.as_bytes();
        while let [rest @ .., b'\n' | b'\r'] = bytes {
            bytes = rest;
        }
        bytes
    }

    fn clear(&mut self) {
        self.buf = [0; C];
        self.len = 0;
    }
}

impl<const C: usize> Default for Line<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const C: usize> core::fmt::Debug for Line<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match core::str::from_utf8(self.as_bytes()) {
            Ok(s) => write!(f, "Line({s:?})"),
            Err(_) => write!(f, "Line({:?})", self.as_bytes()),
        }
    }
}

struct Cursors<const R: usize, const C: usize> {
    rows: [Line<C>; R],
    write_row: usize,
    read_row: usize,
}

impl<const R: usize, const C: usize> Cursors<R, C> {
    fn advance_write(&mut self) {
        self.write_row = (self.write_row + 1) % R;
        self.rows[self.write_row].clear();
        if self.write_row == self.read_row {
            // Overwrote the oldest unread line
            self.read_row = (self.read_row + 1) % R;
        }
    }
}

/// `R` slots of `C` bytes each.
pub struct LineRing<const R: usize, const C: usize> {
    inner: Mutex<RefCell<Cursors<R, C>>>,
}

impl<const R: usize, const C: usize> Default for LineRing<R, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const R: usize, const C: usize> LineRing<R, C> {
    pub const fn new() -> Self {
        assert!(R >= 2 && C >= 2);
        Self {
            inner: Mutex::new(RefCell::new(Cursors {
                rows: [Line::new(); R],
                write_row: 0,
                read_row: 0,
            })),
        }
    }

    /// Appends received bytes, which may span several lines. A `\n` ends the
    /// current line; a line that reaches `C - 1` bytes is ended early.
    pub fn push_bytes(&self, data: &[u8]) {
        critical_section::with(|cs| {
            let mut ring = self.inner.borrow_ref_mut(cs);
            for &b in data {
                let row = ring.write_row;
                let line = &mut ring.rows[row];
                line.buf[line.len] = b;
                line.len += 1;

                if b == b'\n' || line.len >= C - 1 {
                    ring.advance_write();
                }
            }
        });
    }

    /// Copies out the oldest completed line, if there is one.
    pub fn pull_next_line(&self) -> Option<Line<C>> {
        critical_section::with(|cs| {
            let mut ring = self.inner.borrow_ref_mut(cs);
            if ring.read_row == ring.write_row {
                return None;
            }

            let row = ring.read_row;
            let mut line = ring.rows[row];
            line.buf[C - 1] = 0;
            line.len = line.len.min(C - 1);
            ring.read_row = (row + 1) % R;
            Some(line)
        })
    }
}
