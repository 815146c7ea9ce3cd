//! Front-panel setup screens.
//!
//! The select button steps through the [`SetupMode`] screens; the setup switch enables learning on the selected screen
//! and, while it is on, plays a test tone on the outputs being configured so they can be patched and tuned. The panel
//! leaves setup on its own after [`SETUP_TIMEOUT_TICKS`] without activity, and the event mapper cancels it once a
//! screen has learnt what it was waiting for.

use crate::{
    configuration::{CycleConfig, SetupMode},
    io::{AnalogOutput, CV_ONE_VOLT, DigitalOutput, Indicator, IoControl, Switch},
};

/// Voice ticks (4 ms each) of inactivity before setup is cancelled, about 3.6 s.
pub const SETUP_TIMEOUT_TICKS: u16 = 900;

/// Voice ticks the select button must stay released before another press is accepted.
const SELECT_HOLD_TICKS: u8 = 16;

/// Length of the blink cycle in voice ticks.
const BLINK_PERIOD: u8 = 64;

/// Blink phase at which the second half of a split or arpeggiator screen flashes.
const BLINK_OFFSET_PHASE: u8 = 32;

/// Indicator ticks each flash lasts.
const FLASH_TICKS: u8 = 5;

/// Longer flash marking the two-voice screens.
const FLASH_TICKS_PAIRED: u8 = 10;

/// Pulse ticks of the test gates and triggers.
const TEST_PULSE_TICKS: u8 = 50;

/// State of the setup screens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SetupPanel {
    mode: SetupMode,
    last_mode: SetupMode,
    enabled: bool,
    timeout: u16,
    select_hold: u8,
    select_latched: bool,
    blink_phase: u8,
    fade: u16,
}

impl SetupPanel {
    /// A panel showing no setup screen.
    pub fn new() -> Self {
        Self::default()
    }

    /// The screen currently selected.
    pub fn mode(&self) -> SetupMode {
        self.mode
    }

    /// Whether the setup switch is on.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Voice ticks left before setup is cancelled, zero when no timeout is pending.
    pub fn timeout(&self) -> u16 {
        self.timeout
    }

    /// Sample the switches, run the timeout and blink the selected screen. Call every
    /// [`VOICE_TICK`](crate::voice::VOICE_TICK).
    pub fn tick(&mut self, io: &mut impl IoControl) {
        if io.read_switch(Switch::Select) {
            self.select_hold = SELECT_HOLD_TICKS;
            if !self.select_latched {
                self.select_latched = true;
                self.next_mode();
            }
        } else {
            self.select_hold = self.select_hold.saturating_sub(1);
            if self.select_hold == 0 {
                self.select_latched = false;
            }
        }

        if io.read_switch(Switch::Setup) {
            self.timeout = SETUP_TIMEOUT_TICKS;
            if !self.enabled {
                self.enabled = true;
                if self.mode == SetupMode::None {
                    self.next_mode();
                }
            }
        } else if self.enabled {
            self.enabled = false;
            self.timeout = 0;
            self.cancel(io);
        }

        if self.timeout != 0 {
            self.timeout -= 1;
            if self.timeout == 0 {
                debug!("Setup timed out");
                self.cancel(io);
            }
        }

        self.blink(io);
    }

    /// Step to the next screen. From no screen, the last cancelled one comes back first; stepping past the last screen
    /// leaves setup and forgets it.
    pub fn next_mode(&mut self) {
        self.mode = if self.mode == SetupMode::None && self.last_mode != SetupMode::None {
            self.last_mode
        } else {
            self.mode.cycle()
        };

        if self.mode == SetupMode::None {
            self.last_mode = SetupMode::None;
        } else {
            self.timeout = SETUP_TIMEOUT_TICKS;
        }
        self.blink_phase = 0;
        info!("Setup screen {}", self.mode);
    }

    /// Leave the current screen, remembering it for the next press of select.
    pub fn cancel(&mut self, io: &mut impl IoControl) {
        if self.mode == SetupMode::Internal {
            io.set_test_mode(false);
        }
        self.last_mode = self.mode;
        self.mode = SetupMode::None;
        self.timeout = 0;
    }

    fn flash(io: &mut impl IoControl, indicators: &[Indicator], ticks: u8) {
        for &indicator in indicators {
            io.set_indicator(indicator, ticks, 0);
        }
    }

    fn test_tone(&self, io: &mut impl IoControl, cvs: &[AnalogOutput], pulses: &[DigitalOutput]) {
        if !self.enabled {
            return;
        }
        for &cv in cvs {
            io.set_analog(cv, CV_ONE_VOLT);
        }
        for &output in pulses {
            io.set_digital(output, TEST_PULSE_TICKS);
        }
    }

    fn blink(&mut self, io: &mut impl IoControl) {
        use AnalogOutput::{Cv1, Cv2};
        use DigitalOutput::{Gate1, Gate2};

        if self.mode == SetupMode::None {
            return;
        }

        match self.blink_phase {
            0 => match self.mode {
                SetupMode::None => {}
                SetupMode::Cv1 | SetupMode::CvSplit => {
                    Self::flash(io, &[Indicator::Cv1, Indicator::Gate1], FLASH_TICKS);
                    self.test_tone(io, &[Cv1], &[Gate1]);
                }
                SetupMode::Cv2 => {
                    Self::flash(io, &[Indicator::Cv2, Indicator::Gate2], FLASH_TICKS);
                    self.test_tone(io, &[Cv2], &[Gate2]);
                }
                SetupMode::CvPoly | SetupMode::CvArp => {
                    let ticks = if self.mode == SetupMode::CvArp {
                        FLASH_TICKS_PAIRED
                    } else {
                        FLASH_TICKS
                    };
                    Self::flash(
                        io,
                        &[Indicator::Cv1, Indicator::Cv2, Indicator::Gate1, Indicator::Gate2],
                        ticks,
                    );
                    self.test_tone(io, &[Cv1, Cv2], &[Gate1, Gate2]);
                }
                SetupMode::CvVelocity => {
                    Self::flash(
                        io,
                        &[Indicator::Cv1, Indicator::Gate1, Indicator::Gate2],
                        FLASH_TICKS_PAIRED,
                    );
                    self.test_tone(io, &[Cv1, Cv2], &[Gate1, Gate2]);
                }
                SetupMode::Trig1 | SetupMode::Trig2 | SetupMode::Trig3 | SetupMode::Trig4 => {
                    let output = match self.mode {
                        SetupMode::Trig1 => DigitalOutput::Trig1,
                        SetupMode::Trig2 => DigitalOutput::Trig2,
                        SetupMode::Trig3 => DigitalOutput::Trig3,
                        _ => DigitalOutput::Trig4,
                    };
                    Self::flash(io, &[output.indicator()], FLASH_TICKS);
                    self.test_tone(io, &[], &[output]);
                }
                SetupMode::Internal => {
                    Self::flash(io, &[Indicator::MidiIn, Indicator::MidiOut], FLASH_TICKS);
                    io.set_test_mode(self.enabled);
                }
            },
            BLINK_OFFSET_PHASE => match self.mode {
                SetupMode::CvSplit => {
                    Self::flash(io, &[Indicator::Cv2, Indicator::Gate2], FLASH_TICKS);
                    self.test_tone(io, &[Cv2], &[Gate2]);
                }
                SetupMode::CvArp => {
                    Self::flash(io, &[Indicator::Cv1, Indicator::Gate1], FLASH_TICKS_PAIRED)
                }
                _ => {}
            },
            // the velocity CV indicator pulses slowly between flashes
            _ if self.mode == SetupMode::CvVelocity => {
                let on_ticks = if self.fade & 0x80 != 0 { 0x80 } else { 0 };
                io.set_indicator(Indicator::Cv2, on_ticks, 0);
            }
            _ => {}
        }

        self.fade = (self.fade + 1) & 0x1ff;
        self.blink_phase = (self.blink_phase + 1) % BLINK_PERIOD;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingIo;

    fn press_select(panel: &mut SetupPanel, io: &mut RecordingIo) {
        io.switches[Switch::Select.index()] = true;
        panel.tick(io);
        io.switches[Switch::Select.index()] = false;
        for _ in 0..SELECT_HOLD_TICKS {
            panel.tick(io);
        }
    }

    #[test]
    fn select_steps_through_screens() {
        let mut panel = SetupPanel::new();
        let mut io = RecordingIo::default();
        press_select(&mut panel, &mut io);
        assert_eq!(SetupMode::Cv1, panel.mode(), "Expected left but got right");
        press_select(&mut panel, &mut io);
        assert_eq!(SetupMode::Cv2, panel.mode(), "Expected left but got right");
    }

    #[test]
    fn held_select_advances_once() {
        let mut panel = SetupPanel::new();
        let mut io = RecordingIo::default();
        io.switches[Switch::Select.index()] = true;
        for _ in 0..100 {
            panel.tick(&mut io);
        }
        assert_eq!(SetupMode::Cv1, panel.mode(), "Expected left but got right");
    }

    #[test]
    fn stepping_past_internal_leaves_setup() {
        let mut panel = SetupPanel::new();
        let mut io = RecordingIo::default();
        for _ in 0..11 {
            press_select(&mut panel, &mut io);
        }
        assert_eq!(SetupMode::Internal, panel.mode(), "Expected left but got right");
        press_select(&mut panel, &mut io);
        assert_eq!(SetupMode::None, panel.mode(), "Expected left but got right");
        press_select(&mut panel, &mut io);
        assert_eq!(SetupMode::Cv1, panel.mode(), "Last screen should be forgotten");
    }

    #[test]
    fn cancelled_screen_resumes() {
        let mut panel = SetupPanel::new();
        let mut io = RecordingIo::default();
        press_select(&mut panel, &mut io);
        press_select(&mut panel, &mut io);
        panel.cancel(&mut io);
        assert_eq!(SetupMode::None, panel.mode(), "Expected left but got right");
        press_select(&mut panel, &mut io);
        assert_eq!(SetupMode::Cv2, panel.mode(), "Expected left but got right");
    }

    #[test]
    fn inactivity_times_out() {
        let mut panel = SetupPanel::new();
        let mut io = RecordingIo::default();
        panel.next_mode();
        for _ in 0..SETUP_TIMEOUT_TICKS - 1 {
            panel.tick(&mut io);
        }
        assert_eq!(SetupMode::Cv1, panel.mode(), "Expected left but got right");
        panel.tick(&mut io);
        assert_eq!(SetupMode::None, panel.mode(), "Expected left but got right");
    }

    #[test]
    fn setup_switch_enters_and_leaves() {
        let mut panel = SetupPanel::new();
        let mut io = RecordingIo::default();
        io.switches[Switch::Setup.index()] = true;
        panel.tick(&mut io);
        assert!(panel.is_enabled());
        assert_eq!(SetupMode::Cv1, panel.mode(), "Expected left but got right");
        assert_eq!(Some(CV_ONE_VOLT), io.analog[AnalogOutput::Cv1.index()], "Expected left but got right");
        assert_eq!(TEST_PULSE_TICKS, io.digital[DigitalOutput::Gate1.index()], "Expected left but got right");

        for _ in 0..SETUP_TIMEOUT_TICKS * 2 {
            panel.tick(&mut io);
        }
        assert_eq!(SetupMode::Cv1, panel.mode(), "Switch should hold setup open");

        io.switches[Switch::Setup.index()] = false;
        panel.tick(&mut io);
        assert!(!panel.is_enabled());
        assert_eq!(SetupMode::None, panel.mode(), "Expected left but got right");
    }

    #[test]
    fn internal_screen_drives_test_line() {
        let mut panel = SetupPanel::new();
        let mut io = RecordingIo::default();
        for _ in 0..11 {
            panel.next_mode();
        }
        io.switches[Switch::Setup.index()] = true;
        panel.tick(&mut io);
        assert_eq!(SetupMode::Internal, panel.mode(), "Expected left but got right");
        assert!(io.test_mode);

        io.switches[Switch::Setup.index()] = false;
        panel.tick(&mut io);
        assert!(!io.test_mode, "Leaving the internal screen should release the test line");
    }

    #[test]
    fn split_screen_blinks_halves_apart() {
        let mut panel = SetupPanel::new();
        let mut io = RecordingIo::default();
        for _ in 0..3 {
            panel.next_mode();
        }
        assert_eq!(SetupMode::CvSplit, panel.mode(), "Expected left but got right");

        panel.tick(&mut io);
        assert_eq!(Some((FLASH_TICKS, 0)), io.indicators[Indicator::Cv1.index()], "Expected left but got right");
        assert_eq!(None, io.indicators[Indicator::Cv2.index()], "Expected left but got right");

        for _ in 0..BLINK_OFFSET_PHASE {
            panel.tick(&mut io);
        }
        assert_eq!(Some((FLASH_TICKS, 0)), io.indicators[Indicator::Cv2.index()], "Expected left but got right");
    }
}
