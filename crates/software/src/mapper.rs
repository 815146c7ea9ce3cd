//! Routes decoded MIDI messages to the outputs.
//!
//! Each channel message first gives an active setup screen the chance to learn from it, then runs through every
//! routing slot, then is echoed to the MIDI output. Channel 16 is reserved: it never plays notes or teaches a setup
//! screen, and its controllers drive the outputs directly for calibration and testing.

use wmidi::{Channel, ControlFunction, ControlValue, Note, U7, U14};

use crate::{
    clock::ClockDivider,
    codec::{MidiEvent, TxQueue},
    configuration::{ConfigStore, Mapping, Route, RoutingSlot, RoutingTable, SetupMode, VoiceMode},
    io::{ANALOG_MAX, AnalogOutput, CV_ZERO, DigitalOutput, Indicator, IoControl, LATCH, OFF},
    setup::SetupPanel,
    sysex::{SysexReceiver, SystemConfig},
    voice::{CV_INDICATOR_TICKS, Voice, VoiceManager},
};

/// Pulse ticks of a note-mapped trigger.
pub const TRIGGER_PULSE_TICKS: u8 = 10;
const TRIGGER_INDICATOR_TICKS: u8 = 3;
/// Pulse ticks of a divided clock pulse.
pub const CLOCK_PULSE_TICKS: u8 = 5;
const CLOCK_INDICATOR_TICKS: u8 = 2;
/// Pulse ticks of the reset pulse sent on MIDI Start.
pub const RESET_PULSE_TICKS: u8 = 5;
const RESET_INDICATOR_TICKS: u8 = 2;
const MIDI_IN_INDICATOR_TICKS: u8 = 2;

/// Pitch-wheel positions above this count as pushed up.
pub const BEND_UP_THRESHOLD: u16 = 0x27ff;

/// Pitch-wheel positions below this count as pushed down.
pub const BEND_DOWN_THRESHOLD: u16 = 0x17ff;

/// Highest controller number a setup screen will learn; the channel mode messages above it are never routed.
const MAX_LEARNABLE_CONTROLLER: u8 = 121;

const LEGATO_CONTROLLER: u8 = 20;
const DAMPER_CONTROLLER: u8 = 64;

/// The reserved control channel.
const CONTROL_CHANNEL: Channel = Channel::Ch16;

/// Direct-control controllers on [`CONTROL_CHANNEL`].
const DIRECT_CV_MSB: [u8; 2] = [16, 17];
const DIRECT_CV_LSB: [u8; 2] = [48, 49];

/// Programs on [`CONTROL_CHANNEL`] below this select a clock divisor.
const CLOCK_PROGRAMS: u8 = 48;

/// Programs below this set the bend range of voice 1; the next block of the same size sets voice 2.
const BEND_PROGRAMS: u8 = 12;

/// The collaborators a MIDI message may touch.
pub struct Context<'a, I, S> {
    /// The outputs.
    pub io: &'a mut I,
    /// The persistent settings.
    pub store: &'a mut S,
    /// The pitch voices.
    pub voices: &'a mut VoiceManager,
    /// The setup screens.
    pub setup: &'a mut SetupPanel,
    /// Where received messages are echoed.
    pub thru: &'a mut TxQueue,
}

/// The registers behind the channel 16 direct CV controllers.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
struct DirectCv {
    msb: u8,
    lsb: u8,
}

impl Default for DirectCv {
    fn default() -> Self {
        Self {
            msb: (CV_ZERO >> 8) as u8,
            lsb: (CV_ZERO & 0xff) as u8,
        }
    }
}

impl DirectCv {
    fn level(&self) -> u16 {
        (u16::from(self.msb) << 5) | (u16::from(self.lsb) >> 2)
    }
}

/// Applies the routing table, the clock divider and the bulk configuration to incoming MIDI.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventMapper {
    routing: RoutingTable,
    clock: ClockDivider,
    sysex: SysexReceiver,
    direct: [DirectCv; 2],
}

/// The unit a note selects when learning polyphonic mode: C4 through C5 pick units 0 through 7.
fn poly_unit_for(note: Note) -> u8 {
    match u8::from(note) {
        62 => 1,
        64 => 2,
        65 => 3,
        67 => 4,
        69 => 5,
        71 => 6,
        72 => 7,
        _ => 0,
    }
}

/// Whether the wheel is pushed far enough in the direction a pitch-bend slot value selects.
fn bend_engaged(polarity: U7, bend: u16) -> bool {
    match u8::from(polarity) {
        1 => bend > BEND_UP_THRESHOLD,
        0 => bend < BEND_DOWN_THRESHOLD,
        _ => false,
    }
}

/// Whether a setup screen refuses to learn from `event`: anything on the control channel, and the channel mode
/// controllers.
fn unlearnable(event: &MidiEvent) -> bool {
    match *event {
        MidiEvent::NoteOn(channel, ..) | MidiEvent::PitchBend(channel, _) => channel == CONTROL_CHANNEL,
        MidiEvent::ControlChange(channel, function, _) => {
            channel == CONTROL_CHANNEL || u8::from(function.0) > MAX_LEARNABLE_CONTROLLER
        }
        _ => false,
    }
}

/// Drive a digital output and its indicator together.
fn set_level(io: &mut impl IoControl, output: DigitalOutput, on: bool, indicator_off_ticks: u8) {
    if on {
        io.set_digital(output, LATCH);
        io.set_indicator(output.indicator(), LATCH, indicator_off_ticks);
    } else {
        io.set_digital(output, OFF);
        io.set_indicator(output.indicator(), OFF, 0);
    }
}

fn set_cv(io: &mut impl IoControl, output: AnalogOutput, level: u16) {
    io.set_analog(output, level);
    io.set_indicator(output.indicator(), CV_INDICATOR_TICKS, 0);
}

const fn voice_for(route: Route) -> Voice {
    match route {
        Route::Cv2 => Voice::Two,
        _ => Voice::One,
    }
}

impl EventMapper {
    /// A mapper with the stored routing and clock divisor. Both CV outputs are set to 0 V.
    pub fn load(store: &impl ConfigStore, io: &mut impl IoControl) -> Self {
        let mapper = Self {
            routing: RoutingTable::load(store),
            clock: ClockDivider::load(store),
            sysex: SysexReceiver::new(),
            direct: [DirectCv::default(); 2],
        };
        for output in AnalogOutput::ALL {
            io.set_analog(output, CV_ZERO);
        }
        info!("Routing loaded: {}", mapper.routing);
        mapper
    }

    /// The routing table.
    pub fn routing(&self) -> &RoutingTable {
        &self.routing
    }

    /// The clock divider.
    pub fn clock(&self) -> &ClockDivider {
        &self.clock
    }

    /// Store a new routing slot for a CV output or trigger.
    pub fn set_route(
        &mut self,
        route: Route,
        mapping: u8,
        channel: u8,
        value: u8,
        store: &mut impl ConfigStore,
    ) -> RoutingSlot {
        self.routing.assign(route, mapping, channel, value, store)
    }

    /// Store a new clock divisor.
    pub fn set_clock_divisor(&mut self, divisor: u8, store: &mut impl ConfigStore) {
        self.clock.set_divisor(divisor, store);
    }

    /// Handle one decoded message.
    ///
    /// While a setup screen is active, a message it cannot learn from (see [`SetupMode`]) is dropped outright: it is
    /// neither routed nor echoed.
    pub fn handle<I: IoControl, S: ConfigStore>(&mut self, event: MidiEvent, ctx: &mut Context<'_, I, S>) {
        if ctx.setup.mode() != SetupMode::None && unlearnable(&event) {
            debug!("Setup screen ignored an unlearnable message");
            return;
        }

        match event {
            MidiEvent::NoteOn(channel, note, velocity) => self.note_on(channel, note, velocity, ctx),
            MidiEvent::NoteOff(channel, note) => self.note_off(channel, note, ctx),
            MidiEvent::ControlChange(channel, function, value) => {
                self.control_change(channel, function, value, ctx)
            }
            MidiEvent::PitchBend(channel, bend) => self.pitch_bend(channel, bend, ctx),
            MidiEvent::ProgramChange(channel, program) => self.program_change(channel, program, ctx),
            MidiEvent::SongPosition(position) => self.clock.song_position(position),
            MidiEvent::SysexStart => self.sysex.start(),
            MidiEvent::SysexData(byte) => self.sysex.data(byte),
            MidiEvent::SysexEnd => {
                if let Some(config) = self.sysex.end(ctx.thru) {
                    self.apply_system_config(&config, ctx);
                }
            }
            MidiEvent::TimingTick => {
                if self.clock.tick() {
                    ctx.io.set_digital(DigitalOutput::Clock, CLOCK_PULSE_TICKS);
                    ctx.io.set_indicator(Indicator::Clock, CLOCK_INDICATOR_TICKS, 0);
                }
            }
            MidiEvent::Start => {
                ctx.io.set_digital(DigitalOutput::Reset, RESET_PULSE_TICKS);
                ctx.io.set_indicator(Indicator::Reset, RESET_INDICATOR_TICKS, 0);
                self.clock.start();
            }
            MidiEvent::Continue => self.clock.resume(),
            MidiEvent::Stop => self.clock.stop(),
            MidiEvent::SystemReset => self.system_reset(ctx),
            MidiEvent::KeyPressure(..)
            | MidiEvent::ChannelPressure(..)
            | MidiEvent::SongSelect(_)
            | MidiEvent::ActiveSensing => {}
        }

        match event {
            MidiEvent::ActiveSensing => return,
            // the receiver echoes the whole message once it ends
            MidiEvent::SysexStart | MidiEvent::SysexData(_) | MidiEvent::SysexEnd => {}
            _ => ctx.thru.queue(&event),
        }
        ctx.io
            .set_indicator(Indicator::MidiIn, MIDI_IN_INDICATOR_TICKS, 0);
    }

    fn note_on<I: IoControl, S: ConfigStore>(
        &mut self,
        channel: Channel,
        note: Note,
        velocity: U7,
        ctx: &mut Context<'_, I, S>,
    ) {
        if channel == CONTROL_CHANNEL {
            return;
        }

        self.learn_note(channel, note, ctx);

        for route in Route::CVS {
            if self.routing.slot(route).follows(Mapping::Note, channel) {
                ctx.voices.note_on(voice_for(route), note, velocity, ctx.io);
            }
        }
        for route in Route::TRIGGERS {
            let slot = self.routing.slot(route);
            if slot.follows(Mapping::Note, channel) && u8::from(slot.value) == u8::from(note) {
                ctx.io.set_digital(route.digital(), TRIGGER_PULSE_TICKS);
                ctx.io
                    .set_indicator(route.digital().indicator(), TRIGGER_INDICATOR_TICKS, 0);
            }
        }
    }

    fn learn_note<I: IoControl, S: ConfigStore>(
        &mut self,
        channel: Channel,
        note: Note,
        ctx: &mut Context<'_, I, S>,
    ) {
        let mode = ctx.setup.mode();
        let channel = channel.index();
        let note_mapping = Mapping::Note as u8;

        if let Some(voice_mode) = mode.paired_voice_mode() {
            for route in Route::CVS {
                self.routing.assign(route, note_mapping, channel, 0, ctx.store);
            }
            let (split_point, unit) = match voice_mode {
                VoiceMode::Split => (u8::from(note), 0),
                VoiceMode::Poly => (0, poly_unit_for(note)),
                _ => (0, 0),
            };
            ctx.voices.set_mode(voice_mode, split_point, ctx.io, ctx.store);
            ctx.voices.set_unit(unit, ctx.io, ctx.store);
        } else {
            match mode.learn_route() {
                Some(route @ (Route::Cv1 | Route::Cv2)) => {
                    self.routing.assign(route, note_mapping, channel, 0, ctx.store);
                    ctx.voices.set_mode(VoiceMode::Single, 0, ctx.io, ctx.store);
                    ctx.voices.set_unit(0, ctx.io, ctx.store);
                }
                Some(route) => {
                    self.routing
                        .assign(route, note_mapping, channel, u8::from(note), ctx.store);
                }
                None => return,
            }
        }
        ctx.setup.cancel(ctx.io);
    }

    fn note_off<I: IoControl, S: ConfigStore>(
        &mut self,
        channel: Channel,
        note: Note,
        ctx: &mut Context<'_, I, S>,
    ) {
        for route in Route::CVS {
            if self.routing.slot(route).follows(Mapping::Note, channel) {
                ctx.voices.note_off(voice_for(route), note, ctx.io);
            }
        }
    }

    fn control_change<I: IoControl, S: ConfigStore>(
        &mut self,
        channel: Channel,
        function: ControlFunction,
        value: ControlValue,
        ctx: &mut Context<'_, I, S>,
    ) {
        let controller = u8::from(function.0);
        let value = u8::from(value);

        if channel != CONTROL_CHANNEL && controller <= MAX_LEARNABLE_CONTROLLER {
            self.learn_route(Mapping::ControlChange, channel, controller, ctx);
        }

        for route in Route::CVS {
            let slot = self.routing.slot(route);
            if slot.follows(Mapping::Note, channel) {
                match controller {
                    LEGATO_CONTROLLER => {
                        ctx.voices
                            .set_legato_retrig(voice_for(route), value >> 6 != 0, ctx.store)
                    }
                    DAMPER_CONTROLLER => {
                        ctx.voices
                            .damper(voice_for(route), U7::from_u8_lossy(value), ctx.io)
                    }
                    _ => {}
                }
            }
        }

        for route in Route::ALL {
            let slot = self.routing.slot(route);
            if !slot.follows(Mapping::ControlChange, channel) || u8::from(slot.value) != controller {
                continue;
            }
            if let Some(output) = route.analog() {
                set_cv(ctx.io, output, ANALOG_MAX - (u16::from(value) << 5));
            }
            set_level(ctx.io, route.digital(), value & 0x40 != 0, 0);
        }

        if channel == CONTROL_CHANNEL {
            self.direct_control(controller, value, ctx.io);
        }
    }

    fn direct_control(&mut self, controller: u8, value: u8, io: &mut impl IoControl) {
        for (index, output) in AnalogOutput::ALL.into_iter().enumerate() {
            let register = &mut self.direct[index];
            if controller == DIRECT_CV_MSB[index] {
                register.msb = value;
            } else if controller == DIRECT_CV_LSB[index] {
                register.lsb = value;
            } else {
                continue;
            }
            set_cv(io, output, register.level());
            return;
        }

        let output = match controller {
            18 => DigitalOutput::Gate1,
            19 => DigitalOutput::Gate2,
            70 => DigitalOutput::Trig1,
            71 => DigitalOutput::Trig2,
            72 => DigitalOutput::Trig3,
            73 => DigitalOutput::Trig4,
            74 => DigitalOutput::Clock,
            75 => DigitalOutput::Reset,
            _ => return,
        };
        // stretch to eight bits so 127 latches
        let ticks = (value << 1) | u8::from(value != 0);
        io.set_digital(output, ticks);
        io.set_indicator(output.indicator(), ticks, 0);
    }

    fn pitch_bend<I: IoControl, S: ConfigStore>(
        &mut self,
        channel: Channel,
        bend: U14,
        ctx: &mut Context<'_, I, S>,
    ) {
        let raw = u16::from(bend);

        if channel != CONTROL_CHANNEL {
            let polarity = if raw > BEND_UP_THRESHOLD {
                Some(1)
            } else if raw < BEND_DOWN_THRESHOLD {
                Some(0)
            } else {
                None
            };
            if let Some(polarity) = polarity {
                self.learn_route(Mapping::PitchBend, channel, polarity, ctx);
            }
        }

        for route in Route::CVS {
            if self.routing.slot(route).follows(Mapping::Note, channel) {
                ctx.voices.pitch_bend(voice_for(route), bend, ctx.io);
            }
        }

        for route in Route::ALL {
            let slot = self.routing.slot(route);
            if !slot.follows(Mapping::PitchBend, channel) {
                continue;
            }
            let reversed = u8::from(slot.value) != 1;
            match route.analog() {
                Some(output) => {
                    let level = if reversed { raw >> 2 } else { ANALOG_MAX - (raw >> 2) };
                    set_cv(ctx.io, output, level);
                    // a reversed CV 2 opens its gate on the downward bend, CV 1 always on the upward one
                    let gate_on = if reversed && route == Route::Cv2 {
                        raw < BEND_DOWN_THRESHOLD
                    } else {
                        raw > BEND_UP_THRESHOLD
                    };
                    set_level(ctx.io, route.digital(), gate_on, LATCH);
                }
                None => set_level(ctx.io, route.digital(), bend_engaged(slot.value, raw), LATCH),
            }
        }
    }

    /// Teach the single-slot setup screens a controller or pitch-bend mapping.
    fn learn_route<I: IoControl, S: ConfigStore>(
        &mut self,
        mapping: Mapping,
        channel: Channel,
        value: u8,
        ctx: &mut Context<'_, I, S>,
    ) {
        let Some(route) = ctx.setup.mode().learn_route() else {
            return;
        };
        self.routing
            .assign(route, mapping as u8, channel.index(), value, ctx.store);
        ctx.setup.cancel(ctx.io);
    }

    fn program_change<I: IoControl, S: ConfigStore>(
        &mut self,
        channel: Channel,
        program: U7,
        ctx: &mut Context<'_, I, S>,
    ) {
        let program = u8::from(program);
        if channel == CONTROL_CHANNEL && program < CLOCK_PROGRAMS {
            self.clock.set_divisor(program + 1, ctx.store);
        } else if program < BEND_PROGRAMS {
            ctx.voices.set_bend_range(Voice::One, program + 1, ctx.store);
        } else if program < 2 * BEND_PROGRAMS {
            ctx.voices
                .set_bend_range(Voice::Two, program - BEND_PROGRAMS + 1, ctx.store);
        }
    }

    fn system_reset<I: IoControl, S: ConfigStore>(&mut self, ctx: &mut Context<'_, I, S>) {
        info!("System reset");
        ctx.voices.reset(ctx.io);
        for output in DigitalOutput::TRIGGERS
            .into_iter()
            .chain([DigitalOutput::Clock, DigitalOutput::Reset])
        {
            ctx.io.set_digital(output, OFF);
        }
    }

    /// Apply every field of a bulk configuration block through the normal setters.
    pub fn apply_system_config<I: IoControl, S: ConfigStore>(
        &mut self,
        config: &SystemConfig,
        ctx: &mut Context<'_, I, S>,
    ) {
        info!("Applying system configuration {}", config);
        for route in Route::ALL {
            let index = route.index();
            self.routing.assign(
                route,
                config.maps[index],
                config.channels[index],
                config.values[index],
                ctx.store,
            );
        }
        self.clock.set_divisor(config.clock_divisor, ctx.store);
        ctx.voices.set_mode(
            VoiceMode::from_raw(config.voice_mode),
            config.split_point,
            ctx.io,
            ctx.store,
        );
        ctx.voices.set_unit(config.voice_unit, ctx.io, ctx.store);
        ctx.voices
            .set_bend_range(Voice::One, config.bend_range[0], ctx.store);
        ctx.voices
            .set_bend_range(Voice::Two, config.bend_range[1], ctx.store);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        configuration::{ConfigAddress, MemoryStore, VoiceConfig},
        test_support::RecordingIo,
        voice::note_code,
    };

    extern crate std;
    use std::vec::Vec;

    struct Rig {
        mapper: EventMapper,
        io: RecordingIo,
        store: MemoryStore,
        voices: VoiceManager,
        setup: SetupPanel,
        thru: TxQueue,
    }

    impl Rig {
        fn new() -> Self {
            let store = MemoryStore::from_bytes([0; 32]);
            let mut io = RecordingIo::default();
            let mapper = EventMapper::load(&store, &mut io);
            let voices = VoiceManager::load(&store, &mut io);
            Self {
                mapper,
                io,
                store,
                voices,
                setup: SetupPanel::new(),
                thru: TxQueue::new(),
            }
        }

        fn route(mut self, route: Route, mapping: Mapping, channel: u8, value: u8) -> Self {
            self.mapper
                .set_route(route, mapping as u8, channel, value, &mut self.store);
            self
        }

        fn send(&mut self, event: MidiEvent) {
            let mut ctx = Context {
                io: &mut self.io,
                store: &mut self.store,
                voices: &mut self.voices,
                setup: &mut self.setup,
                thru: &mut self.thru,
            };
            self.mapper.handle(event, &mut ctx);
        }

        fn echoed(&mut self) -> Vec<u8> {
            core::iter::from_fn(|| self.thru.pop()).collect()
        }
    }

    fn cc(channel: Channel, controller: u8, value: u8) -> MidiEvent {
        MidiEvent::ControlChange(
            channel,
            ControlFunction(U7::from_u8_lossy(controller)),
            U7::from_u8_lossy(value),
        )
    }

    fn bend(channel: Channel, value: u16) -> MidiEvent {
        MidiEvent::PitchBend(channel, U14::try_from(value).unwrap())
    }

    fn note_on(channel: Channel, note: Note) -> MidiEvent {
        MidiEvent::NoteOn(channel, note, U7::from_u8_lossy(100))
    }

    #[test]
    fn note_plays_routed_voice_and_echoes() {
        let mut rig = Rig::new().route(Route::Cv1, Mapping::Note, 0, 0);
        rig.send(note_on(Channel::Ch1, Note::E4));
        assert!(rig.voices.is_playing(Voice::One));
        assert_eq!(Some(note_code(Note::E4, 0)), rig.io.analog(AnalogOutput::Cv1), "Expected left but got right");
        assert_eq!(LATCH, rig.io.digital(DigitalOutput::Gate1), "Expected left but got right");
        assert_eq!(Some((2, 0)), rig.io.indicator(Indicator::MidiIn), "Expected left but got right");
        assert_eq!(Vec::from([0x90, 64, 100]), rig.echoed(), "Expected left but got right");

        rig.send(MidiEvent::NoteOff(Channel::Ch1, Note::E4));
        assert!(!rig.voices.is_playing(Voice::One));
        assert_eq!(Vec::from([0x90, 64, 0]), rig.echoed(), "Expected left but got right");
    }

    #[test]
    fn other_channels_are_ignored() {
        let mut rig = Rig::new().route(Route::Cv1, Mapping::Note, 0, 0);
        rig.send(note_on(Channel::Ch2, Note::E4));
        assert!(!rig.voices.is_playing(Voice::One));
    }

    #[test]
    fn note_mapped_trigger_fires_on_its_note() {
        let mut rig = Rig::new().route(Route::Trig3, Mapping::Note, 9, 36);
        rig.send(note_on(Channel::Ch10, Note::from(U7::from_u8_lossy(38))));
        assert_eq!(OFF, rig.io.digital(DigitalOutput::Trig3), "Expected left but got right");

        rig.send(note_on(Channel::Ch10, Note::C2));
        assert_eq!(TRIGGER_PULSE_TICKS, rig.io.digital(DigitalOutput::Trig3), "Expected left but got right");
        assert_eq!(Some((3, 0)), rig.io.indicator(Indicator::Trig3), "Expected left but got right");
    }

    #[test]
    fn controller_drives_cv_and_gate() {
        let mut rig = Rig::new().route(Route::Cv2, Mapping::ControlChange, 0, 1);
        rig.send(cc(Channel::Ch1, 1, 100));
        assert_eq!(Some(ANALOG_MAX - (100 << 5)), rig.io.analog(AnalogOutput::Cv2), "Expected left but got right");
        assert_eq!(LATCH, rig.io.digital(DigitalOutput::Gate2), "Expected left but got right");
        assert_eq!(Some((LATCH, 0)), rig.io.indicator(Indicator::Gate2), "Expected left but got right");

        rig.send(cc(Channel::Ch1, 1, 0x3f));
        assert_eq!(OFF, rig.io.digital(DigitalOutput::Gate2), "Expected left but got right");
    }

    #[test]
    fn controller_drives_trigger_level() {
        let mut rig = Rig::new().route(Route::Trig1, Mapping::ControlChange, 3, 74);
        rig.send(cc(Channel::Ch4, 74, 0x40));
        assert_eq!(LATCH, rig.io.digital(DigitalOutput::Trig1), "Expected left but got right");
        rig.send(cc(Channel::Ch4, 74, 0x10));
        assert_eq!(OFF, rig.io.digital(DigitalOutput::Trig1), "Expected left but got right");
    }

    #[test]
    fn damper_controller_sustains_voice() {
        let mut rig = Rig::new().route(Route::Cv1, Mapping::Note, 0, 0);
        let before = (rig.io.analog(AnalogOutput::Cv1), rig.io.indicator(Indicator::Cv1));
        rig.send(cc(Channel::Ch1, 64, 127));
        assert!(rig.voices.is_damped(Voice::One));
        assert_eq!(
            before,
            (rig.io.analog(AnalogOutput::Cv1), rig.io.indicator(Indicator::Cv1)),
            "An unmapped controller must not drive CV 1; expected left but got right"
        );
        rig.send(note_on(Channel::Ch1, Note::C4));
        rig.send(MidiEvent::NoteOff(Channel::Ch1, Note::C4));
        assert!(rig.voices.is_playing(Voice::One), "Damper should hold the gate");

        rig.send(cc(Channel::Ch1, 64, 0));
        assert!(!rig.voices.is_playing(Voice::One));
        assert_eq!(OFF, rig.io.digital(DigitalOutput::Gate1), "Expected left but got right");
    }

    #[test]
    fn legato_controller_sets_retrigger() {
        let mut rig = Rig::new().route(Route::Cv1, Mapping::Note, 0, 0);
        rig.send(cc(Channel::Ch1, 20, 64));
        assert!(rig.voices.config().legato_retrig[0]);
        assert_eq!(1, rig.store.load(ConfigAddress::LegatoRetrig1), "Expected left but got right");
        rig.send(cc(Channel::Ch1, 20, 63));
        assert!(!rig.voices.config().legato_retrig[0]);
    }

    #[test]
    fn full_bend_drives_bend_mapped_cv() {
        let mut rig = Rig::new().route(Route::Cv1, Mapping::PitchBend, 0, 1);
        rig.send(bend(Channel::Ch1, 0x3fff));
        assert_eq!(Some(0), rig.io.analog(AnalogOutput::Cv1), "Expected left but got right");
        assert_eq!(LATCH, rig.io.digital(DigitalOutput::Gate1), "Expected left but got right");
        assert_eq!(Some((LATCH, LATCH)), rig.io.indicator(Indicator::Gate1), "Expected left but got right");

        rig.send(bend(Channel::Ch1, 0x2000));
        assert_eq!(Some(ANALOG_MAX - 0x800), rig.io.analog(AnalogOutput::Cv1), "Expected left but got right");
        assert_eq!(OFF, rig.io.digital(DigitalOutput::Gate1), "Expected left but got right");
    }

    #[test]
    fn reversed_bend_gates_are_asymmetric() {
        let mut rig = Rig::new()
            .route(Route::Cv1, Mapping::PitchBend, 0, 0)
            .route(Route::Cv2, Mapping::PitchBend, 1, 0);

        rig.send(bend(Channel::Ch1, 0x3fff));
        assert_eq!(Some(0xfff), rig.io.analog(AnalogOutput::Cv1), "Expected left but got right");
        assert_eq!(LATCH, rig.io.digital(DigitalOutput::Gate1), "CV 1 opens on the upward bend");

        rig.send(bend(Channel::Ch2, 0x3fff));
        assert_eq!(OFF, rig.io.digital(DigitalOutput::Gate2), "CV 2 stays closed on the upward bend");
        rig.send(bend(Channel::Ch2, 0));
        assert_eq!(Some(0), rig.io.analog(AnalogOutput::Cv2), "Expected left but got right");
        assert_eq!(LATCH, rig.io.digital(DigitalOutput::Gate2), "CV 2 opens on the downward bend");
    }

    #[test]
    fn bend_trigger_dead_zone_turns_off() {
        let mut rig = Rig::new().route(Route::Trig2, Mapping::PitchBend, 0, 0);
        rig.send(bend(Channel::Ch1, 0));
        assert_eq!(LATCH, rig.io.digital(DigitalOutput::Trig2), "Expected left but got right");
        rig.send(bend(Channel::Ch1, 0x2000));
        assert_eq!(OFF, rig.io.digital(DigitalOutput::Trig2), "Expected left but got right");
        rig.send(bend(Channel::Ch1, 0x3fff));
        assert_eq!(OFF, rig.io.digital(DigitalOutput::Trig2), "Expected left but got right");
    }

    #[test]
    fn control_channel_program_sets_divisor() {
        let mut rig = Rig::new();
        rig.send(MidiEvent::ProgramChange(Channel::Ch16, U7::from_u8_lossy(10)));
        assert_eq!(11, rig.mapper.clock().divisor(), "Expected left but got right");
        assert_eq!(11, rig.store.load(ConfigAddress::ClockDivisor), "Expected left but got right");
        assert_eq!(Vec::from([0xcf, 10]), rig.echoed(), "Expected left but got right");
    }

    #[test]
    fn programs_set_bend_ranges() {
        let mut rig = Rig::new();
        rig.send(MidiEvent::ProgramChange(Channel::Ch1, U7::from_u8_lossy(4)));
        rig.send(MidiEvent::ProgramChange(Channel::Ch1, U7::from_u8_lossy(23)));
        rig.send(MidiEvent::ProgramChange(Channel::Ch1, U7::from_u8_lossy(24)));
        assert_eq!([5, 12], rig.voices.config().bend_range, "Expected left but got right");
    }

    #[test]
    fn direct_control_on_channel_16() {
        let mut rig = Rig::new();
        assert_eq!(Some(CV_ZERO), rig.io.analog(AnalogOutput::Cv1), "Expected left but got right");

        rig.send(cc(Channel::Ch16, 16, 0x40));
        assert_eq!(
            Some((0x40 << 5) | (0xf8 >> 2)),
            rig.io.analog(AnalogOutput::Cv1),
            "Expected left but got right"
        );
        rig.send(cc(Channel::Ch16, 48, 0x7c));
        assert_eq!(Some((0x40 << 5) | 0x1f), rig.io.analog(AnalogOutput::Cv1), "Expected left but got right");

        rig.send(cc(Channel::Ch16, 75, 127));
        assert_eq!(LATCH, rig.io.digital(DigitalOutput::Reset), "Expected left but got right");
        rig.send(cc(Channel::Ch16, 18, 10));
        assert_eq!(21, rig.io.digital(DigitalOutput::Gate1), "Expected left but got right");
        rig.send(cc(Channel::Ch16, 70, 0));
        assert_eq!(OFF, rig.io.digital(DigitalOutput::Trig1), "Expected left but got right");
    }

    #[test]
    fn control_channel_notes_are_echoed_but_not_played() {
        let mut rig = Rig::new().route(Route::Cv1, Mapping::Note, 0, 0);
        rig.send(note_on(Channel::Ch16, Note::C4));
        assert!(!rig.voices.is_playing(Voice::One));
        assert_eq!(Vec::from([0x9f, 60, 100]), rig.echoed(), "Expected left but got right");
    }

    #[test]
    fn setup_drops_what_it_cannot_learn() {
        let mut rig = Rig::new().route(Route::Trig1, Mapping::ControlChange, 1, 123);
        rig.setup.next_mode();

        rig.send(note_on(Channel::Ch16, Note::C4));
        rig.send(bend(Channel::Ch16, 0x3fff));
        rig.send(cc(Channel::Ch16, 75, 127));
        rig.send(cc(Channel::Ch2, 123, 127));
        assert_eq!(SetupMode::Cv1, rig.setup.mode(), "Nothing should be learnt");
        assert!(rig.thru.is_empty(), "Dropped messages are not echoed");
        assert_eq!(OFF, rig.io.digital(DigitalOutput::Reset), "Direct control is skipped");
        assert_eq!(OFF, rig.io.digital(DigitalOutput::Trig1), "Routing is skipped");

        rig.setup.cancel(&mut rig.io);
        rig.send(cc(Channel::Ch2, 123, 127));
        assert_eq!(LATCH, rig.io.digital(DigitalOutput::Trig1), "Expected left but got right");
        assert_eq!(Vec::from([0xb1, 123, 127]), rig.echoed(), "Expected left but got right");
    }

    #[test]
    fn clock_divides_and_start_resets() {
        let mut rig = Rig::new();
        rig.send(MidiEvent::ProgramChange(Channel::Ch16, U7::from_u8_lossy(2)));
        rig.send(MidiEvent::Start);
        assert_eq!(RESET_PULSE_TICKS, rig.io.digital(DigitalOutput::Reset), "Expected left but got right");

        let mut pulses = 0;
        for _ in 0..9 {
            rig.io.digital[DigitalOutput::Clock.index()] = OFF;
            rig.send(MidiEvent::TimingTick);
            if rig.io.digital(DigitalOutput::Clock) == CLOCK_PULSE_TICKS {
                pulses += 1;
            }
        }
        assert_eq!(3, pulses, "Expected left but got right");

        rig.send(MidiEvent::Stop);
        rig.io.digital[DigitalOutput::Clock.index()] = OFF;
        for _ in 0..6 {
            rig.send(MidiEvent::TimingTick);
        }
        assert_eq!(OFF, rig.io.digital(DigitalOutput::Clock), "Expected left but got right");
    }

    #[test]
    fn song_position_is_echoed() {
        let mut rig = Rig::new();
        rig.send(MidiEvent::SongPosition(U14::try_from(0x0102).unwrap()));
        assert_eq!(Vec::from([0xf2, 0x02, 0x02]), rig.echoed(), "Expected left but got right");
    }

    #[test]
    fn active_sensing_is_swallowed() {
        let mut rig = Rig::new();
        rig.send(MidiEvent::ActiveSensing);
        assert!(rig.thru.is_empty());
        assert_eq!(None, rig.io.indicator(Indicator::MidiIn), "Expected left but got right");
    }

    #[test]
    fn system_reset_silences_everything() {
        let mut rig = Rig::new().route(Route::Cv1, Mapping::Note, 0, 0);
        rig.send(note_on(Channel::Ch1, Note::C4));
        rig.send(cc(Channel::Ch16, 70, 127));
        rig.send(MidiEvent::SystemReset);
        let once = (rig.voices.clone(), rig.io.digital);
        rig.send(MidiEvent::SystemReset);
        assert_eq!(once, (rig.voices.clone(), rig.io.digital), "Expected left but got right");
        assert!(!rig.voices.is_playing(Voice::One));
        assert_eq!([OFF; 8], rig.io.digital, "Expected left but got right");
        assert_eq!(Mapping::Note, rig.mapper.routing().slot(Route::Cv1).mapping, "Routing survives a reset");
    }

    #[test]
    fn learn_single_voice_from_note() {
        let mut rig = Rig::new();
        rig.setup.next_mode();
        rig.setup.next_mode();
        assert_eq!(SetupMode::Cv2, rig.setup.mode(), "Expected left but got right");

        rig.send(note_on(Channel::Ch5, Note::A4));
        assert_eq!(SetupMode::None, rig.setup.mode(), "Learning should leave setup");
        let slot = rig.mapper.routing().slot(Route::Cv2);
        assert_eq!((Mapping::Note, Channel::Ch5), (slot.mapping, slot.channel), "Expected left but got right");
        assert_eq!(VoiceMode::Single, rig.voices.config().mode, "Expected left but got right");
        assert!(rig.voices.is_playing(Voice::Two), "The learnt note should play straight away");
    }

    #[test]
    fn learn_split_and_poly() {
        let mut rig = Rig::new();
        for _ in 0..3 {
            rig.setup.next_mode();
        }
        rig.send(note_on(Channel::Ch3, Note::G4));
        assert_eq!(
            VoiceConfig {
                mode: VoiceMode::Split,
                split_point: 67,
                ..VoiceConfig::default()
            },
            *rig.voices.config(),
            "Expected left but got right"
        );
        assert!(rig.voices.is_playing(Voice::Two), "G4 is at the split point");

        // the first press brings back the split screen
        rig.setup.next_mode();
        rig.setup.next_mode();
        assert_eq!(SetupMode::CvPoly, rig.setup.mode(), "Expected left but got right");
        rig.send(note_on(Channel::Ch3, Note::F4));
        assert_eq!(VoiceMode::Poly, rig.voices.config().mode, "Expected left but got right");
        assert_eq!(3, rig.voices.config().unit, "Expected left but got right");
        assert_eq!(3, rig.store.load(ConfigAddress::VoiceUnit), "Expected left but got right");
    }

    #[test]
    fn learn_trigger_note() {
        let mut rig = Rig::new();
        for _ in 0..7 {
            rig.setup.next_mode();
        }
        assert_eq!(SetupMode::Trig1, rig.setup.mode(), "Expected left but got right");
        rig.send(note_on(Channel::Ch10, Note::C2));
        let slot = rig.mapper.routing().slot(Route::Trig1);
        assert_eq!(36, u8::from(slot.value), "Expected left but got right");
        assert_eq!(TRIGGER_PULSE_TICKS, rig.io.digital(DigitalOutput::Trig1), "Expected left but got right");
    }

    #[test]
    fn learn_controller_and_bend() {
        let mut rig = Rig::new();
        rig.setup.next_mode();
        rig.send(cc(Channel::Ch2, 122, 5));
        assert_eq!(SetupMode::Cv1, rig.setup.mode(), "Channel mode messages are not learnt");
        rig.send(cc(Channel::Ch2, 7, 5));
        let slot = rig.mapper.routing().slot(Route::Cv1);
        assert_eq!(
            (Mapping::ControlChange, Channel::Ch2, 7),
            (slot.mapping, slot.channel, u8::from(slot.value)),
            "Expected left but got right"
        );

        rig.setup.next_mode();
        rig.send(bend(Channel::Ch1, 0x2000));
        assert_eq!(SetupMode::Cv1, rig.setup.mode(), "The dead zone teaches nothing");
        rig.send(bend(Channel::Ch1, 0));
        let slot = rig.mapper.routing().slot(Route::Cv1);
        assert_eq!((Mapping::PitchBend, 0), (slot.mapping, u8::from(slot.value)), "Expected left but got right");
    }

    #[test]
    fn sysex_system_config_is_applied_and_echoed() {
        let mut rig = Rig::new();
        let config = SystemConfig {
            maps: [1, 1, 2, 0, 0, 3],
            channels: [2, 2, 0, 0, 0, 15],
            values: [0, 0, 64, 0, 0, 1],
            clock_divisor: 60,
            voice_mode: 2,
            split_point: 48,
            voice_unit: 9,
            bend_range: [0, 7],
        };
        let payload = config.to_payload();

        rig.send(MidiEvent::SysexStart);
        for &byte in payload.iter() {
            rig.send(MidiEvent::SysexData(U7::from_u8_lossy(byte)));
        }
        assert!(rig.thru.is_empty(), "Nothing is echoed before the message ends");
        rig.send(MidiEvent::SysexEnd);

        assert_eq!(Mapping::Note, rig.mapper.routing().slot(Route::Cv2).mapping, "Expected left but got right");
        assert_eq!(Channel::Ch3, rig.mapper.routing().slot(Route::Cv2).channel, "Expected left but got right");
        assert_eq!(Channel::Ch1, rig.mapper.routing().slot(Route::Trig4).channel, "Channel 16 folds to 1");
        assert_eq!(48, rig.mapper.clock().divisor(), "Expected left but got right");
        assert_eq!(
            VoiceConfig {
                mode: VoiceMode::Poly,
                split_point: 0,
                unit: 7,
                bend_range: [2, 7],
                legato_retrig: [false; 2],
            },
            *rig.voices.config(),
            "Expected left but got right"
        );

        let echoed = rig.echoed();
        assert_eq!(payload.len() + 2, echoed.len(), "Expected left but got right");
        assert_eq!(Some(&0xf0), echoed.first(), "Expected left but got right");
        assert_eq!(Some(&0xf7), echoed.last(), "Expected left but got right");
    }
}
