//! Divides incoming MIDI clock down to the clock output.

use wmidi::U14;

use crate::configuration::{ConfigAddress, ConfigStore};

/// Largest supported division: two quarter notes at 24 pulses per quarter note.
pub const MAX_DIVISOR: u8 = 48;

/// MIDI clocks per song position unit (a sixteenth note).
const CLOCKS_PER_SIXTEENTH: u32 = 6;

/// Clamp a divisor into `1..=MAX_DIVISOR`.
pub const fn clamp_divisor(divisor: u8) -> u8 {
    if divisor == 0 {
        1
    } else if divisor > MAX_DIVISOR {
        MAX_DIVISOR
    } else {
        divisor
    }
}

/// Transport state and clock division.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClockDivider {
    running: bool,
    divisor: u8,
    counter: u8,
    armed: bool,
}

impl Default for ClockDivider {
    fn default() -> Self {
        Self::new(1)
    }
}

impl ClockDivider {
    /// A stopped divider emitting one pulse per `divisor` clocks.
    pub const fn new(divisor: u8) -> Self {
        Self {
            running: false,
            divisor: clamp_divisor(divisor),
            counter: 0,
            armed: false,
        }
    }

    /// A stopped divider using the stored divisor.
    pub fn load(store: &impl ConfigStore) -> Self {
        Self::new(store.load(ConfigAddress::ClockDivisor))
    }

    /// Clamp, apply and persist a new divisor.
    pub fn set_divisor(&mut self, divisor: u8, store: &mut impl ConfigStore) {
        self.divisor = clamp_divisor(divisor);
        store.save(ConfigAddress::ClockDivisor, self.divisor);
        info!("Clock divisor set to {}", self.divisor);
    }

    /// The current divisor.
    pub fn divisor(&self) -> u8 {
        self.divisor
    }

    /// Whether the transport is running.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Count one MIDI clock. Returns `true` when a clock pulse should be emitted.
    ///
    /// Clocks are ignored while stopped; a pending arm waits for the transport to run again.
    pub fn tick(&mut self) -> bool {
        if !self.running {
            return false;
        }
        self.counter = self.counter.saturating_add(1);
        if self.counter >= self.divisor || self.armed {
            self.counter = 0;
            self.armed = false;
            true
        } else {
            false
        }
    }

    /// Restart the transport; the next clock pulses unconditionally.
    pub fn start(&mut self) {
        self.running = true;
        self.counter = 0;
        self.armed = true;
    }

    /// Resume the transport where it stopped.
    pub fn resume(&mut self) {
        self.running = true;
    }

    /// Stop the transport.
    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Realign the divided clock to a song position given in sixteenth notes.
    pub fn song_position(&mut self, position: U14) {
        let clocks = u32::from(u16::from(position)) * CLOCKS_PER_SIXTEENTH;
        self.counter = (clocks % u32::from(self.divisor)) as u8;
        if self.counter == 0 {
            self.armed = true;
        }
    }
}
