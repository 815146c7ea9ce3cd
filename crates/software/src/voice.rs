//! Turns note events into pitch and gate signals for the two CV/gate output pairs.
//!
//! Each of the two voices drives one CV output and its gate. How incoming notes are spread across them depends on the
//! configured [`VoiceMode`]. A voice whose gate must re-fire while it is already high (a repeated note, a legato note
//! with retriggering enabled) drops its gate for one 4 ms [`tick`](VoiceManager::tick) and raises it on the next.

mod note_stack;
pub use note_stack::*;

mod note_table;
pub use note_table::*;

mod poly;
pub use poly::*;

use embassy_time::Duration;
use wmidi::{Note, U7, U14};

use crate::{
    configuration::{
        ConfigAddress, ConfigStore, MAX_UNIT, VoiceConfig, VoiceMode, clamp_bend_range,
    },
    io::{ANALOG_MAX, AnalogOutput, IoControl, LATCH, OFF},
};

/// How often [`VoiceManager::tick`] must be called.
pub const VOICE_TICK: Duration = Duration::from_millis(4);

/// Indicator flash, in indicator ticks, when a CV output changes.
pub const CV_INDICATOR_TICKS: u8 = 3;

/// Center value of the pitch wheel.
const BEND_CENTER: i32 = 8192;

/// One of the two pitch voices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Voice {
    /// Plays CV 1 and gate 1.
    One,
    /// Plays CV 2 and gate 2.
    Two,
}

impl Voice {
    /// Position of the voice, `0` or `1`.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// The CV output this voice plays.
    pub const fn output(self) -> AnalogOutput {
        match self {
            Voice::One => AnalogOutput::Cv1,
            Voice::Two => AnalogOutput::Cv2,
        }
    }

    const fn from_slot(slot: usize) -> Self {
        if slot & 1 == 0 { Voice::One } else { Voice::Two }
    }
}

/// Progress of a gate retrigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retrigger {
    /// Nothing scheduled.
    Idle,
    /// The gate drops on the next tick.
    Armed,
    /// The gate is down and comes back up with this note on the next tick.
    Releasing(Note),
}

#[cfg(feature = "defmt")]
impl defmt::Format for Retrigger {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Retrigger::Idle => defmt::write!(fmt, "Idle"),
            Retrigger::Armed => defmt::write!(fmt, "Armed"),
            Retrigger::Releasing(note) => defmt::write!(fmt, "Releasing({})", note.to_str()),
        }
    }
}

/// Runtime state of one voice.
#[derive(Debug, Clone, Copy, PartialEq)]
struct VoiceState {
    output: AnalogOutput,
    current: Note,
    playing: bool,
    damper: bool,
    bend_offset: i16,
    retrig: Retrigger,
    keys: NoteStack,
}

impl VoiceState {
    fn new(output: AnalogOutput) -> Self {
        Self {
            output,
            current: Note::C4,
            playing: false,
            damper: false,
            bend_offset: 0,
            retrig: Retrigger::Idle,
            keys: NoteStack::new(),
        }
    }

    fn update_cv(&self, io: &mut impl IoControl) {
        io.set_analog(self.output, note_code(self.current, self.bend_offset));
        io.set_indicator(self.output.indicator(), CV_INDICATOR_TICKS, 0);
    }

    fn output_on(&mut self, note: Note, legato_retrig: bool, io: &mut impl IoControl) {
        self.current = note;
        self.update_cv(io);
        let gate = self.output.gate();
        io.set_digital(gate, LATCH);
        io.set_indicator(gate.indicator(), LATCH, 0);
        if self.playing && legato_retrig {
            self.retrig = Retrigger::Armed;
        }
        self.playing = true;
    }

    fn output_off(&mut self, note: Note, io: &mut impl IoControl) {
        self.current = note;
        let gate = self.output.gate();
        io.set_digital(gate, OFF);
        io.set_indicator(gate.indicator(), OFF, 0);
        self.playing = false;
        self.retrig = Retrigger::Idle;
    }

    fn mono_note_on(&mut self, note: Note, legato_retrig: bool, io: &mut impl IoControl) {
        // the same key struck again while sounding needs a fresh gate edge
        if self.playing && self.current == note {
            self.retrig = Retrigger::Armed;
        }
        self.keys.push(note);
        self.output_on(note, legato_retrig, io);
    }

    fn mono_note_off(&mut self, note: Note, legato_retrig: bool, io: &mut impl IoControl) {
        let top = self.keys.top();
        self.keys.remove(note);
        match self.keys.top() {
            Some(still_held) if Some(still_held) == top => {}
            Some(fallback) => self.output_on(fallback, legato_retrig, io),
            None => {
                if !self.damper {
                    self.output_off(note, io);
                }
            }
        }
    }

    fn release_if_unheld(&mut self, io: &mut impl IoControl) {
        if self.keys.is_empty() {
            self.output_off(self.current, io);
        }
    }
}

/// Allocates notes to the two pitch voices.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceManager {
    config: VoiceConfig,
    voices: [VoiceState; 2],
    poly: PolyTable,
}

/// DAC codes of pitch-wheel travel per code of output shift for a bend range.
fn bend_interval(semitones: u8) -> i32 {
    BEND_CENTER / (i32::from(clamp_bend_range(semitones)) * CODES_PER_SEMITONE)
}

impl VoiceManager {
    /// A manager with `config` and every voice silent.
    pub fn new(config: VoiceConfig) -> Self {
        Self {
            config,
            voices: [
                VoiceState::new(AnalogOutput::Cv1),
                VoiceState::new(AnalogOutput::Cv2),
            ],
            poly: PolyTable::default(),
        }
    }

    /// A manager using the stored configuration, with both gates forced off.
    pub fn load(store: &impl ConfigStore, io: &mut impl IoControl) -> Self {
        let mut manager = Self::new(VoiceConfig::load(store));
        info!("Voice configuration: {}", manager.config);
        manager.reset(io);
        manager
    }

    /// The current configuration.
    pub fn config(&self) -> &VoiceConfig {
        &self.config
    }

    /// Whether a voice's gate is up.
    pub fn is_playing(&self, voice: Voice) -> bool {
        self.voices[voice.index()].playing
    }

    /// The note a voice plays or last played.
    pub fn current_note(&self, voice: Voice) -> Note {
        self.voices[voice.index()].current
    }

    /// Whether a voice's damper is down.
    pub fn is_damped(&self, voice: Voice) -> bool {
        self.voices[voice.index()].damper
    }

    /// Pending retrigger of a voice.
    pub fn retrigger(&self, voice: Voice) -> Retrigger {
        self.voices[voice.index()].retrig
    }

    /// The chain-wide polyphonic slot table.
    pub fn poly_slots(&self) -> &PolyTable {
        &self.poly
    }

    fn mono_on(&mut self, voice: Voice, note: Note, io: &mut impl IoControl) {
        let legato = self.config.legato_retrig[voice.index()];
        self.voices[voice.index()].mono_note_on(note, legato, io);
    }

    fn mono_off(&mut self, voice: Voice, note: Note, io: &mut impl IoControl) {
        let legato = self.config.legato_retrig[voice.index()];
        self.voices[voice.index()].mono_note_off(note, legato, io);
    }

    fn split_voice(&self, note: Note) -> Voice {
        if u8::from(note) < self.config.split_point {
            Voice::One
        } else {
            Voice::Two
        }
    }

    /// A key went down on the channel of `voice`.
    pub fn note_on(&mut self, voice: Voice, note: Note, velocity: U7, io: &mut impl IoControl) {
        if !is_playable(note) {
            return;
        }
        match self.config.mode {
            VoiceMode::Single => self.mono_on(voice, note, io),
            // the other modes take their notes from the first voice's channel only
            _ if voice != Voice::One => {}
            VoiceMode::Split => {
                let target = self.split_voice(note);
                self.mono_on(target, note, io);
            }
            VoiceMode::Poly => self.poly_note_on(note, io),
            VoiceMode::Arp => {
                if self.voices[Voice::One.index()].playing {
                    self.mono_on(Voice::Two, note, io);
                } else {
                    self.mono_on(Voice::One, note, io);
                    self.mono_on(Voice::Two, note, io);
                }
            }
            VoiceMode::Velocity => {
                self.mono_on(Voice::One, note, io);
                io.set_analog(AnalogOutput::Cv2, ANALOG_MAX - (u16::from(u8::from(velocity)) << 5));
                io.set_indicator(AnalogOutput::Cv2.indicator(), CV_INDICATOR_TICKS, 0);
            }
        }
    }

    /// A key came up on the channel of `voice`.
    pub fn note_off(&mut self, voice: Voice, note: Note, io: &mut impl IoControl) {
        if !is_playable(note) {
            return;
        }
        match self.config.mode {
            VoiceMode::Single => self.mono_off(voice, note, io),
            _ if voice != Voice::One => {}
            VoiceMode::Split => {
                let target = self.split_voice(note);
                self.mono_off(target, note, io);
            }
            VoiceMode::Poly => self.poly_note_off(note, io),
            VoiceMode::Arp => self.arp_note_off(note, io),
            // CV 2 keeps the last velocity
            VoiceMode::Velocity => self.mono_off(Voice::One, note, io),
        }
    }

    fn poly_note_on(&mut self, note: Note, io: &mut impl IoControl) {
        let (slot, repeat) = match self.poly.assign(note) {
            Assignment::Fresh(slot) => (slot, false),
            Assignment::Repeat(slot) => (slot, true),
            Assignment::Full => {
                debug!("Every polyphonic slot is busy; dropping note {}", u8::from(note));
                return;
            }
        };
        if slot >> 1 != usize::from(self.config.unit) {
            return;
        }
        let voice = Voice::from_slot(slot);
        let legato = self.config.legato_retrig[voice.index()];
        let state = &mut self.voices[voice.index()];
        state.output_on(note, legato, io);
        if repeat {
            state.retrig = Retrigger::Armed;
        }
    }

    fn poly_note_off(&mut self, note: Note, io: &mut impl IoControl) {
        let Some(slot) = self.poly.release(note) else {
            return;
        };
        if self.voices[Voice::One.index()].damper {
            return;
        }
        self.poly.clear(slot);
        if slot >> 1 == usize::from(self.config.unit) {
            self.voices[Voice::from_slot(slot).index()].output_off(note, io);
        }
    }

    fn arp_note_off(&mut self, note: Note, io: &mut impl IoControl) {
        let [first, second] = &self.voices;
        // with the damper down the arpeggiated voice should not fall back to the held note
        if first.damper && first.playing && second.playing && first.current != second.current {
            let held = first.current;
            self.mono_off(Voice::Two, held, io);
        }

        self.mono_off(Voice::One, note, io);
        self.mono_off(Voice::Two, note, io);

        let [first, second] = &self.voices;
        if !first.playing && second.playing {
            let note = second.current;
            self.mono_on(Voice::One, note, io);
        }
    }

    /// The damper pedal of `voice`'s channel moved. Any non-zero value holds notes.
    pub fn damper(&mut self, voice: Voice, value: U7, io: &mut impl IoControl) {
        let down = u8::from(value) != 0;
        match self.config.mode {
            VoiceMode::Single | VoiceMode::Velocity => {
                let state = &mut self.voices[voice.index()];
                state.damper = down;
                if !down {
                    state.release_if_unheld(io);
                }
            }
            VoiceMode::Split | VoiceMode::Poly if voice != Voice::One => {}
            VoiceMode::Split => {
                self.set_both_dampers(down);
                if !down {
                    for state in self.voices.iter_mut() {
                        state.release_if_unheld(io);
                    }
                }
            }
            VoiceMode::Poly => {
                self.set_both_dampers(down);
                if !down {
                    let unit = usize::from(self.config.unit);
                    for (slot, note) in self.poly.drain_released() {
                        if slot >> 1 == unit {
                            self.voices[Voice::from_slot(slot).index()].output_off(note, io);
                        }
                    }
                }
            }
            VoiceMode::Arp => {
                self.set_both_dampers(down);
                if !down {
                    self.arp_damper_release(io);
                }
            }
        }
    }

    fn set_both_dampers(&mut self, down: bool) {
        for state in self.voices.iter_mut() {
            state.damper = down;
        }
    }

    fn arp_damper_release(&mut self, io: &mut impl IoControl) {
        let [first, second] = &self.voices;
        let first_held = !first.keys.is_empty();
        let second_held = !second.keys.is_empty();
        let (first_note, second_note) = (first.current, second.current);
        match (first_held, second_held) {
            (false, false) => {
                self.voices[Voice::One.index()].output_off(first_note, io);
                self.voices[Voice::Two.index()].output_off(second_note, io);
            }
            (true, false) => self.mono_on(Voice::Two, first_note, io),
            (false, true) => self.mono_on(Voice::One, second_note, io),
            (true, true) => {}
        }
    }

    /// The pitch wheel of `voice`'s channel moved.
    pub fn pitch_bend(&mut self, voice: Voice, bend: U14, io: &mut impl IoControl) {
        let amount = i32::from(u16::from(bend)) - BEND_CENTER;
        let offset_for = |voice: Voice, config: &VoiceConfig| {
            (amount / bend_interval(config.bend_range[voice.index()])) as i16
        };
        match self.config.mode {
            VoiceMode::Poly | VoiceMode::Split | VoiceMode::Arp => {
                let offset = offset_for(Voice::One, &self.config);
                for state in self.voices.iter_mut() {
                    state.bend_offset = offset;
                    state.update_cv(io);
                }
            }
            VoiceMode::Single => {
                let state = &mut self.voices[voice.index()];
                state.bend_offset = offset_for(voice, &self.config);
                state.update_cv(io);
            }
            // CV 2 carries velocity, so only the first voice bends
            VoiceMode::Velocity => {
                let state = &mut self.voices[Voice::One.index()];
                state.bend_offset = offset_for(Voice::One, &self.config);
                state.update_cv(io);
            }
        }
    }

    /// Advance pending retriggers. Call every [`VOICE_TICK`].
    pub fn tick(&mut self, io: &mut impl IoControl) {
        for (index, state) in self.voices.iter_mut().enumerate() {
            match state.retrig {
                Retrigger::Idle => {}
                Retrigger::Armed => {
                    let note = state.current;
                    state.output_off(note, io);
                    state.retrig = Retrigger::Releasing(note);
                }
                Retrigger::Releasing(note) => {
                    state.retrig = Retrigger::Idle;
                    state.output_on(note, self.config.legato_retrig[index], io);
                }
            }
        }
    }

    /// Forget every key, damper and bend and turn both gates off. Configuration is kept.
    pub fn reset(&mut self, io: &mut impl IoControl) {
        self.poly = PolyTable::default();
        for state in self.voices.iter_mut() {
            *state = VoiceState::new(state.output);
            state.output_off(Note::C4, io);
        }
    }

    /// Change the allocation mode. The split point is kept only in [`VoiceMode::Split`]. Resets the voices.
    pub fn set_mode(
        &mut self,
        mode: VoiceMode,
        split_point: u8,
        io: &mut impl IoControl,
        store: &mut impl ConfigStore,
    ) {
        self.config.mode = mode;
        self.config.split_point = match mode {
            VoiceMode::Split => split_point & 0x7f,
            _ => 0,
        };
        store.save(ConfigAddress::VoiceMode, mode as u8);
        store.save(ConfigAddress::SplitPoint, self.config.split_point);
        info!("Voice mode {} (split {})", mode, self.config.split_point);
        self.reset(io);
    }

    /// Change the unit number used in [`VoiceMode::Poly`]. Resets the voices.
    pub fn set_unit(&mut self, unit: u8, io: &mut impl IoControl, store: &mut impl ConfigStore) {
        self.config.unit = unit.min(MAX_UNIT);
        store.save(ConfigAddress::VoiceUnit, self.config.unit);
        info!("Voice unit {}", self.config.unit);
        self.reset(io);
    }

    /// Change a voice's pitch-bend range in semitones.
    pub fn set_bend_range(&mut self, voice: Voice, semitones: u8, store: &mut impl ConfigStore) {
        let semitones = clamp_bend_range(semitones);
        self.config.bend_range[voice.index()] = semitones;
        let address = match voice {
            Voice::One => ConfigAddress::BendRange1,
            Voice::Two => ConfigAddress::BendRange2,
        };
        store.save(address, semitones);
        info!("Bend range of voice {} set to {} semitones", voice, semitones);
    }

    /// Enable or disable gate retriggering on legato notes.
    pub fn set_legato_retrig(&mut self, voice: Voice, enabled: bool, store: &mut impl ConfigStore) {
        self.config.legato_retrig[voice.index()] = enabled;
        let address = match voice {
            Voice::One => ConfigAddress::LegatoRetrig1,
            Voice::Two => ConfigAddress::LegatoRetrig2,
        };
        store.save(address, u8::from(enabled));
    }
}
