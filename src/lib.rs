#![cfg_attr(not(test), no_std)]

use core::fmt::{self, Write};
#[cfg(feature = "firmware")]
use core::sync::atomic::{AtomicUsize, Ordering};
#[cfg(feature = "firmware")]
use defmt_brtt as _; // global logger

#[cfg(feature = "firmware")]
use panic_probe as _;

#[cfg(feature = "firmware")]
use stm32l4xx_hal as _; // memory layout and interrupt vectors
use tinyvec::ArrayVec;

#[macro_use]
mod logging;

pub mod command;
pub mod config;
pub mod gps;
pub mod lines;
pub mod net;
pub mod nmea;
pub mod rb;
pub mod servo;
pub mod store;

// same panicking *behavior* as `panic-probe` but doesn't print a panic message
// this prevents the panic message being printed *twice* when `defmt::panic` is invoked
#[cfg(feature = "firmware")]
#[defmt::panic_handler]
fn panic() -> ! {
    cortex_m::asm::udf()
}

#[cfg(feature = "firmware")]
static COUNT: AtomicUsize = AtomicUsize::new(0);
#[cfg(feature = "firmware")]
defmt::timestamp!("{=usize}", {
    // NOTE(no-CAS) `timestamps` runs with interrupts disabled
    let n = COUNT.load(Ordering::Relaxed);
    COUNT.store(n + 1, Ordering::Relaxed);
    n
});

/// Terminates the application and makes `probe-rs` exit with exit-code = 0
#[cfg(feature = "firmware")]
pub fn exit() -> ! {
    loop {
        cortex_m::asm::bkpt();
    }
}

/// Fixed-capacity text buffer. Bytes past the capacity are dropped.
#[derive(Clone, Copy)]
pub struct FmtBuf<const N: usize = 256>(pub ArrayVec<[u8; N]>);

impl<const N: usize> Write for FmtBuf<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for b in s.bytes() {
            self.0.try_push(b);
        }
        Ok(())
    }
}

impl<const N: usize> FmtBuf<N> {
    pub fn as_str(&self) -> Option<&str> {
        core::str::from_utf8(self.0.as_slice()).ok()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }

    pub fn new() -> Self {
        Self(Default::default())
    }
}

impl<const N: usize> Default for FmtBuf<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// A latitude/longitude pair in signed decimal degrees.
///
/// This is also the commanded target: it carries no timestamp.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "firmware", derive(defmt::Format))]
pub struct Position {
    pub lat: f32,
    pub lon: f32,
}

impl Position {
    pub const ZERO: Self = Self { lat: 0.0, lon: 0.0 };
}
