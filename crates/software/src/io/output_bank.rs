//! Provides [`OutputBank`], a software model of the converter's output timers.

use super::{AnalogOutput, DigitalOutput, Indicator, IoControl, LATCH, Switch};

/// Number of multiplex rounds in a blanking cycle; one round in this many keeps every LED dark to dim the panel.
const BLANK_ROUNDS: u8 = 6;

/// DAC code both channels start at before the core writes anything.
const ANALOG_POWER_ON: u16 = 2048;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
struct AnalogChannel {
    level: u16,
    pending: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
struct Pulse {
    remaining: u8,
    level: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
struct Blink {
    on_time: u8,
    off_time: u8,
    on_count: u8,
    off_count: u8,
    level: bool,
}

impl Blink {
    fn refresh(&mut self) {
        if self.on_count != 0 {
            self.level = true;
            if self.on_count != LATCH {
                self.on_count -= 1;
            }
        } else {
            self.level = false;
            // a zero off time means a one-shot flash; otherwise reload and repeat
            if self.off_count != 0 {
                self.off_count -= 1;
                if self.off_count == 0 {
                    self.on_count = self.on_time;
                    self.off_count = self.off_time;
                }
            }
        }
    }
}

/// Implements [`IoControl`] without hardware.
///
/// Firmware owns one of these, calls [`tick_pulses`](OutputBank::tick_pulses) every 1024 µs and
/// [`tick_indicators`](OutputBank::tick_indicators) every 256 µs, and copies the resulting levels onto its pins.
/// Setting a digital output to `n` keeps it high for `n` pulse ticks; indicators are multiplexed, so each LED is
/// serviced once every twelve indicator ticks.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutputBank {
    analog: [AnalogChannel; 2],
    digital: [Pulse; 8],
    indicators: [Blink; 12],
    indicator_phase: usize,
    blank_round: u8,
    switches: [bool; 2],
    test_mode: bool,
}

impl Default for OutputBank {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputBank {
    /// Construct a bank with every output off and both DACs pending their power-on code.
    pub fn new() -> Self {
        Self {
            analog: [AnalogChannel {
                level: ANALOG_POWER_ON,
                pending: true,
            }; 2],
            digital: [Pulse::default(); 8],
            indicators: [Blink::default(); 12],
            indicator_phase: 0,
            blank_round: 0,
            switches: [false; 2],
            test_mode: false,
        }
    }

    /// Advance every digital output by one pulse tick.
    pub fn tick_pulses(&mut self) {
        for pulse in self.digital.iter_mut() {
            if pulse.remaining != 0 {
                pulse.level = true;
                if pulse.remaining != LATCH {
                    pulse.remaining -= 1;
                }
            } else {
                pulse.level = false;
            }
        }
    }

    /// Service the next indicator in the multiplex.
    pub fn tick_indicators(&mut self) {
        let blink = &mut self.indicators[self.indicator_phase];
        if self.blank_round == 0 {
            blink.refresh();
        } else {
            blink.level = false;
        }

        self.indicator_phase += 1;
        if self.indicator_phase == self.indicators.len() {
            self.indicator_phase = 0;
            self.blank_round += 1;
            if self.blank_round == BLANK_ROUNDS {
                self.blank_round = 0;
            }
        }
    }

    /// Return the new DAC code for `output` if it changed since the last call.
    pub fn take_analog(&mut self, output: AnalogOutput) -> Option<u16> {
        let channel = &mut self.analog[output.index()];
        if channel.pending {
            channel.pending = false;
            Some(channel.level)
        } else {
            None
        }
    }

    /// The most recent DAC code written to `output`.
    pub fn analog(&self, output: AnalogOutput) -> u16 {
        self.analog[output.index()].level
    }

    /// Whether `output` is currently driven high.
    pub fn digital(&self, output: DigitalOutput) -> bool {
        self.digital[output.index()].level
    }

    /// Whether `indicator` is currently lit.
    pub fn indicator(&self, indicator: Indicator) -> bool {
        self.indicators[indicator.index()].level
    }

    /// Record the sampled state of a panel switch.
    pub fn set_switch(&mut self, switch: Switch, on: bool) {
        self.switches[switch.index()] = on;
    }

    /// Whether the TEST line is asserted.
    pub fn test_mode(&self) -> bool {
        self.test_mode
    }
}

impl IoControl for OutputBank {
    fn set_analog(&mut self, output: AnalogOutput, level: u16) {
        let channel = &mut self.analog[output.index()];
        if channel.level != level {
            channel.level = level;
            channel.pending = true;
        }
    }

    fn set_digital(&mut self, output: DigitalOutput, ticks: u8) {
        let pulse = &mut self.digital[output.index()];
        if ticks != 0 && !output.is_gate() {
            pulse.level = true;
        }
        pulse.remaining = ticks;
    }

    fn set_indicator(&mut self, indicator: Indicator, on_ticks: u8, off_ticks: u8) {
        let blink = &mut self.indicators[indicator.index()];
        blink.on_time = on_ticks;
        blink.off_time = off_ticks;
        blink.on_count = on_ticks;
        blink.off_count = off_ticks;
    }

    fn read_switch(&self, switch: Switch) -> bool {
        self.switches[switch.index()]
    }

    fn set_test_mode(&mut self, asserted: bool) {
        self.test_mode = asserted;
    }
}
