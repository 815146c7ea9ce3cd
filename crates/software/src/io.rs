//! The capability interface between the converter core and the physical inputs and outputs.
//!
//! The core never touches registers. It expresses everything it wants to happen on the panel through [`IoControl`]:
//! analog levels for the two CV outputs, durations for the gate, trigger, clock and reset outputs, blink patterns for
//! the indicators, and the state of the two panel switches. [`OutputBank`] implements the timing side of that
//! interface in software so that firmware only has to mirror its state onto pins.

mod output_bank;
pub use output_bank::*;

use embassy_time::Duration;

/// Period of [`OutputBank::tick_pulses`]; the unit of every digital output duration.
pub const PULSE_TICK: Duration = Duration::from_micros(1024);

/// Period of [`OutputBank::tick_indicators`]; each indicator is refreshed once per twelve of these.
pub const INDICATOR_TICK: Duration = Duration::from_micros(256);

/// Duration value which turns a digital output or indicator off.
pub const OFF: u8 = 0;

/// Duration value which latches a digital output or indicator on until it is explicitly changed.
pub const LATCH: u8 = 255;

/// Full-scale code of the 12-bit DACs driving the CV outputs.
pub const ANALOG_MAX: u16 = 4095;

/// DAC code producing 0 V at a CV output.
pub const CV_ZERO: u16 = 2040;

/// DAC code producing 1 V at a CV output. The output stage is inverting: higher voltages use lower codes.
pub const CV_ONE_VOLT: u16 = 1632;

/// The two analog (CV) outputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AnalogOutput {
    /// CV output 1, the pitch of voice 1.
    Cv1,
    /// CV output 2, the pitch of voice 2.
    Cv2,
}

impl AnalogOutput {
    /// All analog outputs in hardware order.
    pub const ALL: [AnalogOutput; 2] = [AnalogOutput::Cv1, AnalogOutput::Cv2];

    /// Position of the output in hardware order.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// The indicator which shows activity on this output.
    pub const fn indicator(self) -> Indicator {
        match self {
            AnalogOutput::Cv1 => Indicator::Cv1,
            AnalogOutput::Cv2 => Indicator::Cv2,
        }
    }

    /// The gate paired with this output.
    pub const fn gate(self) -> DigitalOutput {
        match self {
            AnalogOutput::Cv1 => DigitalOutput::Gate1,
            AnalogOutput::Cv2 => DigitalOutput::Gate2,
        }
    }
}

/// The pulse/latch outputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DigitalOutput {
    /// Gate paired with CV 1.
    Gate1,
    /// Gate paired with CV 2.
    Gate2,
    /// Trigger output 1.
    Trig1,
    /// Trigger output 2.
    Trig2,
    /// Trigger output 3.
    Trig3,
    /// Trigger output 4.
    Trig4,
    /// Divided MIDI clock.
    Clock,
    /// Transport reset, pulsed on MIDI Start.
    Reset,
}

impl DigitalOutput {
    /// All digital outputs in hardware order.
    pub const ALL: [DigitalOutput; 8] = [
        DigitalOutput::Gate1,
        DigitalOutput::Gate2,
        DigitalOutput::Trig1,
        DigitalOutput::Trig2,
        DigitalOutput::Trig3,
        DigitalOutput::Trig4,
        DigitalOutput::Clock,
        DigitalOutput::Reset,
    ];

    /// The four trigger outputs in order.
    pub const TRIGGERS: [DigitalOutput; 4] = [
        DigitalOutput::Trig1,
        DigitalOutput::Trig2,
        DigitalOutput::Trig3,
        DigitalOutput::Trig4,
    ];

    /// Position of the output in hardware order.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Gates hold their level from the next pulse tick on; every other output goes high as soon as it is set.
    pub const fn is_gate(self) -> bool {
        matches!(self, DigitalOutput::Gate1 | DigitalOutput::Gate2)
    }

    /// The indicator which shows activity on this output.
    pub const fn indicator(self) -> Indicator {
        match self {
            DigitalOutput::Gate1 => Indicator::Gate1,
            DigitalOutput::Gate2 => Indicator::Gate2,
            DigitalOutput::Trig1 => Indicator::Trig1,
            DigitalOutput::Trig2 => Indicator::Trig2,
            DigitalOutput::Trig3 => Indicator::Trig3,
            DigitalOutput::Trig4 => Indicator::Trig4,
            DigitalOutput::Clock => Indicator::Clock,
            DigitalOutput::Reset => Indicator::Reset,
        }
    }
}

/// Panel LEDs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Indicator {
    /// CV 1 activity.
    Cv1,
    /// CV 2 activity.
    Cv2,
    /// Gate 1 level.
    Gate1,
    /// Gate 2 level.
    Gate2,
    /// Trigger 1 activity.
    Trig1,
    /// Trigger 2 activity.
    Trig2,
    /// Trigger 3 activity.
    Trig3,
    /// Trigger 4 activity.
    Trig4,
    /// Reset pulse.
    Reset,
    /// Clock pulse.
    Clock,
    /// MIDI input activity.
    MidiIn,
    /// MIDI output activity.
    MidiOut,
}

impl Indicator {
    /// All indicators in multiplex order.
    pub const ALL: [Indicator; 12] = [
        Indicator::Cv1,
        Indicator::Cv2,
        Indicator::Gate1,
        Indicator::Gate2,
        Indicator::Trig1,
        Indicator::Trig2,
        Indicator::Trig3,
        Indicator::Trig4,
        Indicator::Reset,
        Indicator::Clock,
        Indicator::MidiIn,
        Indicator::MidiOut,
    ];

    /// Position of the indicator in multiplex order.
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Panel switches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Switch {
    /// Toggle enabling setup mode.
    Setup,
    /// Momentary button selecting the setup screen.
    Select,
}

impl Switch {
    /// Position of the switch in hardware order.
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Everything the converter core is able to do to the outside world.
///
/// Durations are expressed in ticks of the implementation's pulse or indicator timer; [`OFF`] switches the output
/// off and [`LATCH`] holds it on until it is changed again.
pub trait IoControl {
    /// Set a CV output to a 12-bit DAC code.
    fn set_analog(&mut self, output: AnalogOutput, level: u16);

    /// Drive a digital output for `ticks` pulse ticks.
    fn set_digital(&mut self, output: DigitalOutput, ticks: u8);

    /// Light an indicator for `on_ticks`. A non-zero `off_ticks` repeats the blink after that many dark ticks.
    fn set_indicator(&mut self, indicator: Indicator, on_ticks: u8, off_ticks: u8);

    /// Whether a switch is currently on (pressed).
    fn read_switch(&self, switch: Switch) -> bool;

    /// Assert or release the TEST line used by the internal diagnostics screen.
    fn set_test_mode(&mut self, asserted: bool);
}
