//! Steering servos: angle to pulse-width mapping and the sweep used as a
//! stand-in steering law.

pub const MIN_DEG: i16 = -90;
pub const MAX_DEG: i16 = 90;
pub const MIN_PULSE_US: u16 = 1000;
pub const MAX_PULSE_US: u16 = 2000;
pub const CENTER_PULSE_US: u16 = (MIN_PULSE_US + MAX_PULSE_US) / 2;
/// 50 Hz frame.
pub const PERIOD_US: u16 = 20_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "firmware", derive(defmt::Format))]
pub enum Servo {
    One,
    Two,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "firmware", derive(defmt::Format))]
pub enum ServoError {
    #[error("angle {0} out of range")]
    OutOfRange(i16),
}

/// Pulse high time for `degrees`, linear over -90..=90 -> 1000..=2000 us.
/// Out-of-range angles give the centre pulse.
pub fn pulse_width_us(degrees: i16) -> u16 {
    if !(MIN_DEG..=MAX_DEG).contains(&degrees) {
        return CENTER_PULSE_US;
    }
    let span_us = (MAX_PULSE_US - MIN_PULSE_US) as i32;
    let span_deg = (MAX_DEG - MIN_DEG) as i32;
    let us = (degrees - MIN_DEG) as i32 * span_us / span_deg + MIN_PULSE_US as i32;
    us as u16
}

pub trait Servos {
    /// Sets the pulse width for one PWM channel.
    fn set_pulse_us(&mut self, servo: Servo, us: u16);

    fn set_servo(&mut self, servo: Servo, degrees: i16) -> Result<(), ServoError> {
        if !(MIN_DEG..=MAX_DEG).contains(&degrees) {
            log_error!("servo angle {} rejected", degrees);
            return Err(ServoError::OutOfRange(degrees));
        }
        self.set_pulse_us(servo, pulse_width_us(degrees));
        Ok(())
    }
}

/// Back-and-forth oscillator between the servo limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sweep {
    position: i16,
    step: i16,
}

impl Sweep {
    pub const STEP_DEG: i16 = 10;

    pub const fn new(step: i16) -> Self {
        Self { position: 0, step }
    }

    /// Servo 1 starts by turning down.
    pub const fn down() -> Self {
        Self::new(-Self::STEP_DEG)
    }

    /// Servo 2 starts by turning up.
    pub const fn up() -> Self {
        Self::new(Self::STEP_DEG)
    }

    pub fn position(&self) -> i16 {
        self.position
    }
}

impl Iterator for Sweep {
    type Item = i16;

    /// Yields the current angle, then moves one step, turning around at
    /// either limit.
    fn next(&mut self) -> Option<i16> {
        let current = self.position;
        self.position += self.step;
        if self.position <= MIN_DEG || self.position >= MAX_DEG {
            self.step = -self.step;
        }
        Some(current)
    }
}
