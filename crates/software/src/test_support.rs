//! An [`IoControl`] which records the last command sent to every output, for unit tests.

use crate::io::{AnalogOutput, DigitalOutput, Indicator, IoControl, Switch};

#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct RecordingIo {
    pub analog: [Option<u16>; 2],
    pub digital: [u8; 8],
    pub indicators: [Option<(u8, u8)>; 12],
    pub switches: [bool; 2],
    pub test_mode: bool,
}

impl RecordingIo {
    pub fn analog(&self, output: AnalogOutput) -> Option<u16> {
        self.analog[output.index()]
    }

    pub fn digital(&self, output: DigitalOutput) -> u8 {
        self.digital[output.index()]
    }

    pub fn indicator(&self, indicator: Indicator) -> Option<(u8, u8)> {
        self.indicators[indicator.index()]
    }
}

impl IoControl for RecordingIo {
    fn set_analog(&mut self, output: AnalogOutput, level: u16) {
        self.analog[output.index()] = Some(level);
    }

    fn set_digital(&mut self, output: DigitalOutput, ticks: u8) {
        self.digital[output.index()] = ticks;
    }

    fn set_indicator(&mut self, indicator: Indicator, on_ticks: u8, off_ticks: u8) {
        self.indicators[indicator.index()] = Some((on_ticks, off_ticks));
    }

    fn read_switch(&self, switch: Switch) -> bool {
        self.switches[switch.index()]
    }

    fn set_test_mode(&mut self, asserted: bool) {
        self.test_mode = asserted;
    }
}
