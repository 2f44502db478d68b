//! The vehicle's current fix and commanded target, shared between tasks.
//!
//! Each record sits behind its own critical-section mutex and is only ever
//! replaced or copied whole, so a reader can't observe a half-written fix.
//! Nothing but the copy happens while a lock is held.

use core::cell::Cell;

use critical_section::Mutex;

use crate::{gps::Fix, Position};

pub struct PositionStore {
    fix: Mutex<Cell<Fix>>,
    target: Mutex<Cell<Position>>,
}

impl Default for PositionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionStore {
    pub const fn new() -> Self {
        Self {
            fix: Mutex::new(Cell::new(Fix::ZERO)),
            target: Mutex::new(Cell::new(Position::ZERO)),
        }
    }

    pub fn commit_fix(&self, fix: Fix) {
        critical_section::with(|cs| self.fix.borrow(cs).set(fix));
    }

    pub fn read_fix(&self) -> Fix {
        critical_section::with(|cs| self.fix.borrow(cs).get())
    }

    pub fn commit_target(&self, target: Position) {
        critical_section::with(|cs| self.target.borrow(cs).set(target));
    }

    pub fn read_target(&self) -> Position {
        critical_section::with(|cs| self.target.borrow(cs).get())
    }
}
