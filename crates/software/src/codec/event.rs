use tinyvec::ArrayVec;
use wmidi::{Channel, ControlFunction, ControlValue, Note, U7, U14};

/// A complete MIDI message as seen by the converter.
///
/// System exclusive messages are streamed: a [`SysexStart`](MidiEvent::SysexStart), one
/// [`SysexData`](MidiEvent::SysexData) per payload byte, and a [`SysexEnd`](MidiEvent::SysexEnd).
/// A Note On with zero velocity is always reported as [`NoteOff`](MidiEvent::NoteOff).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    /// A key was released.
    NoteOff(Channel, Note),
    /// A key was pressed with a non-zero velocity.
    NoteOn(Channel, Note, U7),
    /// Polyphonic aftertouch.
    KeyPressure(Channel, Note, U7),
    /// A controller moved.
    ControlChange(Channel, ControlFunction, ControlValue),
    /// A program was selected.
    ProgramChange(Channel, U7),
    /// Channel aftertouch.
    ChannelPressure(Channel, U7),
    /// The pitch wheel moved; 8192 is centered.
    PitchBend(Channel, U14),
    /// Song position in sixteenth notes.
    SongPosition(U14),
    /// A song was selected.
    SongSelect(U7),
    /// A system exclusive message began.
    SysexStart,
    /// One payload byte of a system exclusive message.
    SysexData(U7),
    /// A system exclusive message ended.
    SysexEnd,
    /// MIDI clock, 24 per quarter note.
    TimingTick,
    /// Transport start from the beginning.
    Start,
    /// Transport resume.
    Continue,
    /// Transport stop.
    Stop,
    /// Keep-alive.
    ActiveSensing,
    /// Return to power-on state.
    SystemReset,
}

fn status(kind: u8, channel: Channel) -> u8 {
    kind | channel.index()
}

fn split_u14(value: U14) -> (u8, u8) {
    let value = u16::from(value);
    ((value & 0x7f) as u8, ((value >> 7) & 0x7f) as u8)
}

impl MidiEvent {
    /// Serialize the message with its status byte.
    pub fn encode(&self) -> ArrayVec<[u8; 3]> {
        let mut bytes = ArrayVec::new();
        match *self {
            // sent as a zero-velocity Note On so a following Note On can reuse the status
            MidiEvent::NoteOff(channel, note) => {
                bytes.extend_from_slice(&[status(0x90, channel), u8::from(note), 0])
            }
            MidiEvent::NoteOn(channel, note, velocity) => bytes.extend_from_slice(&[
                status(0x90, channel),
                u8::from(note),
                u8::from(velocity),
            ]),
            MidiEvent::KeyPressure(channel, note, pressure) => bytes.extend_from_slice(&[
                status(0xa0, channel),
                u8::from(note),
                u8::from(pressure),
            ]),
            MidiEvent::ControlChange(channel, function, value) => bytes.extend_from_slice(&[
                status(0xb0, channel),
                u8::from(function.0),
                u8::from(value),
            ]),
            MidiEvent::ProgramChange(channel, program) => {
                bytes.extend_from_slice(&[status(0xc0, channel), u8::from(program)])
            }
            MidiEvent::ChannelPressure(channel, pressure) => {
                bytes.extend_from_slice(&[status(0xd0, channel), u8::from(pressure)])
            }
            MidiEvent::PitchBend(channel, bend) => {
                let (lsb, msb) = split_u14(bend);
                bytes.extend_from_slice(&[status(0xe0, channel), lsb, msb])
            }
            MidiEvent::SongPosition(position) => {
                let (lsb, msb) = split_u14(position);
                bytes.extend_from_slice(&[0xf2, lsb, msb])
            }
            MidiEvent::SongSelect(song) => bytes.extend_from_slice(&[0xf3, u8::from(song)]),
            MidiEvent::SysexStart => bytes.push(0xf0),
            MidiEvent::SysexData(data) => bytes.push(u8::from(data)),
            MidiEvent::SysexEnd => bytes.push(0xf7),
            MidiEvent::TimingTick => bytes.push(0xf8),
            MidiEvent::Start => bytes.push(0xfa),
            MidiEvent::Continue => bytes.push(0xfb),
            MidiEvent::Stop => bytes.push(0xfc),
            MidiEvent::ActiveSensing => bytes.push(0xfe),
            MidiEvent::SystemReset => bytes.push(0xff),
        }
        bytes
    }
}
