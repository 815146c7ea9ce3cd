//! Captures system exclusive messages and decodes the bulk configuration block.
//!
//! Every non-empty message is echoed on the MIDI output once it ends, whether or not it was understood, so converters
//! can be chained and configured together.

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;
use tinyvec::ArrayVec;
use wmidi::U7;

use crate::codec::{MidiEvent, TxQueue};

/// Bytes of a system exclusive message kept between its start and end, framing bytes excluded.
pub const SYSEX_CAPACITY: usize = 64;

/// Manufacturer and device bytes opening every message addressed to the converter.
pub const SYSEX_HEADER: [u8; 4] = [0x00, 0x01, 0x72, 0x40];

/// Captured length of a [`SysexCommand::SystemConfig`] message: header, command and 24 fields.
pub const SYSTEM_CONFIG_LEN: usize = 29;

/// Commands understood after [`SYSEX_HEADER`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, ToPrimitive, FromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SysexCommand {
    /// Replace the whole configuration.
    SystemConfig = 0x02,
    /// Reserved for reading the configuration store.
    EepromRead = 0x70,
    /// Reserved for writing the configuration store.
    EepromWrite = 0x71,
}

/// The raw fields of a bulk configuration block, in routing order (CV 1, CV 2, triggers 1 to 4).
///
/// Nothing is clamped here; the setters the block is applied through normalise every field.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SystemConfig {
    /// Mapping of each route.
    pub maps: [u8; 6],
    /// Channel of each route.
    pub channels: [u8; 6],
    /// Mapping-specific value of each route.
    pub values: [u8; 6],
    /// Clock divisor.
    pub clock_divisor: u8,
    /// Voice allocation mode.
    pub voice_mode: u8,
    /// Split point, used in split mode.
    pub split_point: u8,
    /// Unit number, used in polyphonic mode.
    pub voice_unit: u8,
    /// Pitch-bend range of each voice.
    pub bend_range: [u8; 2],
}

impl SystemConfig {
    /// Decode the 24 fields following the command byte.
    fn parse(fields: &[u8]) -> Option<Self> {
        let field = |index: usize| fields.get(index).copied();
        let mut config = Self::default();
        for route in 0..6 {
            config.maps[route] = field(route)?;
            config.channels[route] = field(6 + route)?;
            config.values[route] = field(12 + route)?;
        }
        config.clock_divisor = field(0x12)?;
        config.voice_mode = field(0x13)?;
        config.split_point = field(0x14)?;
        config.voice_unit = field(0x15)?;
        config.bend_range = [field(0x16)?, field(0x17)?];
        Some(config)
    }

    /// Encode as a complete system exclusive message body, without the framing bytes.
    pub fn to_payload(&self) -> ArrayVec<[u8; SYSTEM_CONFIG_LEN]> {
        let mut payload = ArrayVec::new();
        payload.extend_from_slice(&SYSEX_HEADER);
        payload.push(SysexCommand::SystemConfig as u8);
        payload.extend_from_slice(&self.maps);
        payload.extend_from_slice(&self.channels);
        payload.extend_from_slice(&self.values);
        payload.extend_from_slice(&[
            self.clock_divisor,
            self.voice_mode,
            self.split_point,
            self.voice_unit,
            self.bend_range[0],
            self.bend_range[1],
        ]);
        for byte in payload.iter_mut() {
            *byte &= 0x7f;
        }
        payload
    }
}

/// Collects the payload of the system exclusive message in progress.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SysexReceiver {
    buffer: ArrayVec<[u8; SYSEX_CAPACITY]>,
}

impl SysexReceiver {
    /// An idle receiver.
    pub fn new() -> Self {
        Self::default()
    }

    /// A message began; discard anything captured before.
    pub fn start(&mut self) {
        self.buffer.clear();
    }

    /// Capture one payload byte. An oversized message restarts the capture from the beginning.
    pub fn data(&mut self, byte: U7) {
        if self.buffer.len() == SYSEX_CAPACITY {
            self.buffer.clear();
        }
        self.buffer.push(u8::from(byte));
    }

    /// The bytes captured so far.
    pub fn captured(&self) -> &[u8] {
        &self.buffer
    }

    /// The message ended. Echoes it on `tx` and returns the configuration it carried, if it was a well-formed
    /// [`SysexCommand::SystemConfig`] message.
    pub fn end(&mut self, tx: &mut TxQueue) -> Option<SystemConfig> {
        if self.buffer.is_empty() {
            return None;
        }

        let config = self.decode();

        tx.queue(&MidiEvent::SysexStart);
        for &byte in self.buffer.iter() {
            tx.queue(&MidiEvent::SysexData(U7::from_u8_lossy(byte)));
        }
        tx.queue(&MidiEvent::SysexEnd);
        self.buffer.clear();

        config
    }

    fn decode(&self) -> Option<SystemConfig> {
        let (header, rest) = self.buffer.split_at_checked(SYSEX_HEADER.len())?;
        if header != SYSEX_HEADER {
            trace!("Ignoring system exclusive message for another device");
            return None;
        }
        let (&command, fields) = rest.split_first()?;
        match SysexCommand::from_u8(command) {
            Some(SysexCommand::SystemConfig) if self.buffer.len() == SYSTEM_CONFIG_LEN => {
                SystemConfig::parse(fields)
            }
            Some(command) => {
                debug!("Unsupported system exclusive command {}", command);
                None
            }
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern crate std;
    use std::vec::Vec;

    fn receive(receiver: &mut SysexReceiver, bytes: &[u8]) {
        receiver.start();
        for &byte in bytes {
            receiver.data(U7::from_u8_lossy(byte));
        }
    }

    fn drain(tx: &mut TxQueue) -> Vec<u8> {
        core::iter::from_fn(|| tx.pop()).collect()
    }

    fn sample_config() -> SystemConfig {
        SystemConfig {
            maps: [1, 1, 2, 3, 0, 1],
            channels: [0, 1, 2, 3, 4, 5],
            values: [0, 0, 64, 1, 0, 36],
            clock_divisor: 6,
            voice_mode: 1,
            split_point: 60,
            voice_unit: 0,
            bend_range: [2, 12],
        }
    }

    #[test]
    fn system_config_is_decoded_and_echoed() {
        let payload = sample_config().to_payload();
        assert_eq!(SYSTEM_CONFIG_LEN, payload.len(), "Expected left but got right");

        let mut receiver = SysexReceiver::new();
        let mut tx = TxQueue::new();
        receive(&mut receiver, &payload);
        assert_eq!(Some(sample_config()), receiver.end(&mut tx), "Expected left but got right");

        let mut expected = Vec::from([0xf0]);
        expected.extend_from_slice(&payload);
        expected.push(0xf7);
        assert_eq!(expected, drain(&mut tx), "Expected left but got right");
    }

    #[test]
    fn foreign_message_is_only_echoed() {
        let mut receiver = SysexReceiver::new();
        let mut tx = TxQueue::new();
        receive(&mut receiver, &[0x7e, 0x7f, 0x06, 0x01]);
        assert_eq!(None, receiver.end(&mut tx), "Expected left but got right");
        assert_eq!(
            Vec::from([0xf0, 0x7e, 0x7f, 0x06, 0x01, 0xf7]),
            drain(&mut tx),
            "Expected left but got right"
        );
    }

    #[test]
    fn short_system_config_is_not_applied() {
        let payload = sample_config().to_payload();
        let mut receiver = SysexReceiver::new();
        let mut tx = TxQueue::new();
        receive(&mut receiver, &payload[..SYSTEM_CONFIG_LEN - 1]);
        assert_eq!(None, receiver.end(&mut tx), "Expected left but got right");
        assert_eq!(SYSTEM_CONFIG_LEN + 1, tx.len(), "Message should still be echoed");
    }

    #[test]
    fn empty_message_is_ignored() {
        let mut receiver = SysexReceiver::new();
        let mut tx = TxQueue::new();
        receiver.start();
        assert_eq!(None, receiver.end(&mut tx), "Expected left but got right");
        assert!(tx.is_empty());
    }

    #[test]
    fn oversized_message_restarts_capture() {
        let mut receiver = SysexReceiver::new();
        receiver.start();
        for byte in 0..SYSEX_CAPACITY as u8 + 3 {
            receiver.data(U7::from_u8_lossy(byte));
        }
        assert_eq!(
            &[SYSEX_CAPACITY as u8, SYSEX_CAPACITY as u8 + 1, SYSEX_CAPACITY as u8 + 2],
            receiver.captured(),
            "Expected left but got right"
        );
    }

    #[test]
    fn reserved_commands_are_not_applied() {
        let mut receiver = SysexReceiver::new();
        let mut tx = TxQueue::new();
        receive(&mut receiver, &[0x00, 0x01, 0x72, 0x40, 0x70, 0x12]);
        assert_eq!(None, receiver.end(&mut tx), "Expected left but got right");
    }
}
