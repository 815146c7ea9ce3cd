//! Mirrors the converter's [`OutputBank`] onto the board: jacks, LEDs, DAC channels and the two panel switches.

use embassy_stm32::{
    dac::{DacCh1, DacCh2, Value},
    gpio::{Input, Output},
    mode::Async,
    peripherals::DAC1,
};
use midi_cv_converter_lib::io::{AnalogOutput, DigitalOutput, Indicator, OutputBank, Switch};

/// Everything on the front and back panels.
pub struct Panel {
    pub cv1: DacCh1<'static, DAC1, Async>,
    pub cv2: DacCh2<'static, DAC1, Async>,
    /// Gate, trigger, clock and reset jacks, in [`DigitalOutput::ALL`] order.
    pub jacks: [Output<'static>; 8],
    /// LEDs, in [`Indicator::ALL`] order.
    pub leds: [Output<'static>; 12],
    pub test: Output<'static>,
    /// The Nucleo user button; high while pressed.
    pub setup: Input<'static>,
    /// Pulled up; low while pressed.
    pub select: Input<'static>,
}

impl Panel {
    /// Whether the select switch is held down.
    pub fn select_held(&self) -> bool {
        self.select.is_low()
    }

    /// Feed the switch positions into `bank`.
    pub fn sample(&self, bank: &mut OutputBank) {
        bank.set_switch(Switch::Setup, self.setup.is_high());
        bank.set_switch(Switch::Select, self.select_held());
    }

    /// Copy the current levels from `bank` onto the pins, writing the DAC only when a code changed.
    pub fn refresh(&mut self, bank: &mut OutputBank) {
        for (jack, output) in self.jacks.iter_mut().zip(DigitalOutput::ALL) {
            jack.set_level(bank.digital(output).into());
        }
        for (led, indicator) in self.leds.iter_mut().zip(Indicator::ALL) {
            led.set_level(bank.indicator(indicator).into());
        }
        self.test.set_level(bank.test_mode().into());

        if let Some(code) = bank.take_analog(AnalogOutput::Cv1) {
            self.cv1.set(Value::Bit12Right(code));
        }
        if let Some(code) = bank.take_analog(AnalogOutput::Cv2) {
            self.cv2.set(Value::Bit12Right(code));
        }
    }
}
