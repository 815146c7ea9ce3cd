use wmidi::{Channel, ControlFunction, Note, U7, U14};

use super::MidiEvent;

/// Channel message kinds, keyed by the high nibble of their status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelKind {
    NoteOff,
    NoteOn,
    KeyPressure,
    ControlChange,
    ProgramChange,
    ChannelPressure,
    PitchBend,
}

impl ChannelKind {
    fn from_status(status: u8) -> Self {
        match status & 0xf0 {
            0x80 => ChannelKind::NoteOff,
            0x90 => ChannelKind::NoteOn,
            0xa0 => ChannelKind::KeyPressure,
            0xb0 => ChannelKind::ControlChange,
            0xc0 => ChannelKind::ProgramChange,
            0xd0 => ChannelKind::ChannelPressure,
            _ => ChannelKind::PitchBend,
        }
    }
}

/// The message a data byte belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    /// Channel messages keep their status across messages (running status).
    Channel(ChannelKind, Channel),
    SongPosition,
    SongSelect,
}

impl Status {
    fn is_single_data_byte(self) -> bool {
        matches!(
            self,
            Status::Channel(ChannelKind::ProgramChange | ChannelKind::ChannelPressure, _)
                | Status::SongSelect
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    Idle,
    ExpectData0,
    ExpectData1,
    InSysexData,
}

/// Turns a MIDI byte stream into [`MidiEvent`]s, one byte at a time.
#[derive(Debug, Clone, PartialEq)]
pub struct Parser {
    state: ParserState,
    status: Option<Status>,
    data0: u8,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

fn channel(status: u8) -> Channel {
    Channel::from_index(status & 0x0f).unwrap_or(Channel::Ch1)
}

fn u14(lsb: u8, msb: u8) -> U14 {
    // both halves are masked to 7 bits, so the value always fits in 14 bits
    U14::try_from((u16::from(msb & 0x7f) << 7) | u16::from(lsb & 0x7f)).unwrap_or(U14::MAX)
}

impl Parser {
    /// A parser waiting for its first status byte.
    pub const fn new() -> Self {
        Self {
            state: ParserState::Idle,
            status: None,
            data0: 0,
        }
    }

    /// Feed one byte. Returns the event it completes, if any.
    ///
    /// Realtime bytes produce their event at once and leave any message in progress untouched. Every other status
    /// byte abandons the message in progress.
    pub fn advance(&mut self, byte: u8) -> Option<MidiEvent> {
        if byte >= 0xf8 {
            return match byte {
                0xf8 => Some(MidiEvent::TimingTick),
                0xfa => Some(MidiEvent::Start),
                0xfb => Some(MidiEvent::Continue),
                0xfc => Some(MidiEvent::Stop),
                0xfe => Some(MidiEvent::ActiveSensing),
                0xff => Some(MidiEvent::SystemReset),
                // 0xf9 and 0xfd are undefined
                _ => None,
            };
        }

        if byte & 0x80 != 0 {
            return self.status_byte(byte);
        }

        match self.state {
            ParserState::Idle => None,
            ParserState::InSysexData => Some(MidiEvent::SysexData(U7::from_u8_lossy(byte))),
            ParserState::ExpectData0 => {
                self.data0 = byte;
                match self.status {
                    Some(status) if status.is_single_data_byte() => self.complete(status, byte, 0),
                    Some(_) => {
                        self.state = ParserState::ExpectData1;
                        None
                    }
                    None => {
                        self.state = ParserState::Idle;
                        None
                    }
                }
            }
            ParserState::ExpectData1 => match self.status {
                Some(status) => self.complete(status, self.data0, byte),
                None => {
                    self.state = ParserState::Idle;
                    None
                }
            },
        }
    }

    fn status_byte(&mut self, byte: u8) -> Option<MidiEvent> {
        match byte {
            0xf0 => {
                self.status = None;
                self.state = ParserState::InSysexData;
                Some(MidiEvent::SysexStart)
            }
            0xf7 => {
                self.status = None;
                self.state = ParserState::Idle;
                Some(MidiEvent::SysexEnd)
            }
            0xf2 => {
                self.status = Some(Status::SongPosition);
                self.state = ParserState::ExpectData0;
                None
            }
            0xf3 => {
                self.status = Some(Status::SongSelect);
                self.state = ParserState::ExpectData0;
                None
            }
            0xf1 | 0xf4..=0xf6 => {
                trace!("Ignoring system common status {=u8:#x}", byte);
                self.status = None;
                self.state = ParserState::Idle;
                None
            }
            _ => {
                self.status = Some(Status::Channel(ChannelKind::from_status(byte), channel(byte)));
                self.state = ParserState::ExpectData0;
                None
            }
        }
    }

    fn complete(&mut self, status: Status, data0: u8, data1: u8) -> Option<MidiEvent> {
        let event = match status {
            Status::Channel(kind, channel) => {
                let first = U7::from_u8_lossy(data0);
                let second = U7::from_u8_lossy(data1);
                match kind {
                    ChannelKind::NoteOff => MidiEvent::NoteOff(channel, Note::from(first)),
                    ChannelKind::NoteOn if data1 == 0 => {
                        MidiEvent::NoteOff(channel, Note::from(first))
                    }
                    ChannelKind::NoteOn => MidiEvent::NoteOn(channel, Note::from(first), second),
                    ChannelKind::KeyPressure => {
                        MidiEvent::KeyPressure(channel, Note::from(first), second)
                    }
                    ChannelKind::ControlChange => {
                        MidiEvent::ControlChange(channel, ControlFunction(first), second)
                    }
                    ChannelKind::ProgramChange => MidiEvent::ProgramChange(channel, first),
                    ChannelKind::ChannelPressure => MidiEvent::ChannelPressure(channel, first),
                    ChannelKind::PitchBend => MidiEvent::PitchBend(channel, u14(data0, data1)),
                }
            }
            Status::SongPosition => MidiEvent::SongPosition(u14(data0, data1)),
            Status::SongSelect => MidiEvent::SongSelect(U7::from_u8_lossy(data0)),
        };

        self.state = match status {
            Status::Channel(..) => ParserState::ExpectData0,
            _ => {
                self.status = None;
                ParserState::Idle
            }
        };
        Some(event)
    }
}
