use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;

use super::{ConfigAddress, ConfigStore};

/// Highest voice unit number; a chain holds at most eight converters.
pub const MAX_UNIT: u8 = 7;

/// Pitch-bend range assumed when the stored or requested one is unusable.
pub const DEFAULT_BEND_RANGE: u8 = 2;

/// Widest supported pitch-bend range, in semitones.
pub const MAX_BEND_RANGE: u8 = 12;

/// Determines how notes arriving on the note-mapped channels are spread across the two pitch voices.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, ToPrimitive, FromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VoiceMode {
    /// Each voice is an independent monophonic voice with last-note priority.
    #[default]
    Single,
    /// Notes below the split point play voice 1, the rest play voice 2.
    Split,
    /// Two voices out of a 16-voice chain, selected by the unit number.
    Poly,
    /// The first note plays both voices; further notes play voice 2 over the held first note.
    Arp,
    /// Voice 1 plays the note and CV 2 follows the note-on velocity.
    Velocity,
}

impl VoiceMode {
    /// Decode a stored mode, falling back to [`VoiceMode::Single`].
    pub fn from_raw(raw: u8) -> Self {
        <Self as FromPrimitive>::from_u8(raw).unwrap_or_default()
    }
}

/// Clamp a pitch-bend range to the supported span, replacing unusable values with [`DEFAULT_BEND_RANGE`].
pub const fn clamp_bend_range(semitones: u8) -> u8 {
    if semitones < 1 || semitones > MAX_BEND_RANGE {
        DEFAULT_BEND_RANGE
    } else {
        semitones
    }
}

/// The persistent settings of the voice manager.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VoiceConfig {
    /// How notes are allocated.
    pub mode: VoiceMode,
    /// First note played by voice 2 in [`VoiceMode::Split`]; zero in every other mode.
    pub split_point: u8,
    /// Which pair of the 16 polyphonic voices this converter plays.
    pub unit: u8,
    /// Pitch-bend range of each voice, in semitones.
    pub bend_range: [u8; 2],
    /// Whether a new legato note re-fires the gate of each voice.
    pub legato_retrig: [bool; 2],
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            mode: VoiceMode::Single,
            split_point: 0,
            unit: 0,
            bend_range: [DEFAULT_BEND_RANGE; 2],
            legato_retrig: [false; 2],
        }
    }
}

impl VoiceConfig {
    /// Read the settings from `store`, clamping every field into range.
    pub fn load(store: &impl ConfigStore) -> Self {
        let mode = VoiceMode::from_raw(store.load(ConfigAddress::VoiceMode));
        Self {
            mode,
            split_point: match mode {
                VoiceMode::Split => store.load(ConfigAddress::SplitPoint) & 0x7f,
                _ => 0,
            },
            unit: store.load(ConfigAddress::VoiceUnit).min(MAX_UNIT),
            bend_range: [
                clamp_bend_range(store.load(ConfigAddress::BendRange1)),
                clamp_bend_range(store.load(ConfigAddress::BendRange2)),
            ],
            legato_retrig: [
                store.load(ConfigAddress::LegatoRetrig1) != 0,
                store.load(ConfigAddress::LegatoRetrig2) != 0,
            ],
        }
    }
}
