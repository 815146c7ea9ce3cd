use num_derive::{FromPrimitive, ToPrimitive};

use super::{Route, VoiceMode};

/// The setup screen selected on the front panel.
///
/// Every screen other than [`SetupMode::None`] and [`SetupMode::Internal`] waits for a MIDI event to learn.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, ToPrimitive, FromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SetupMode {
    /// Normal operation.
    #[default]
    None,
    /// Learn the event CV 1 follows.
    Cv1,
    /// Learn the event CV 2 follows.
    Cv2,
    /// Learn a split keyboard from the next note.
    CvSplit,
    /// Learn the channel and unit number of a polyphonic chain.
    CvPoly,
    /// Learn the channel of the two-note arpeggiator.
    CvArp,
    /// Learn the channel of the note-plus-velocity mode.
    CvVelocity,
    /// Learn the event trigger 1 follows.
    Trig1,
    /// Learn the event trigger 2 follows.
    Trig2,
    /// Learn the event trigger 3 follows.
    Trig3,
    /// Learn the event trigger 4 follows.
    Trig4,
    /// Hardware diagnostics; asserts the TEST line.
    Internal,
}
impl super::CycleConfig for SetupMode {}

impl SetupMode {
    /// The single routing slot a controller or pitch-bend learn writes to, if any.
    pub const fn learn_route(self) -> Option<Route> {
        match self {
            SetupMode::Cv1 => Some(Route::Cv1),
            SetupMode::Cv2 => Some(Route::Cv2),
            SetupMode::Trig1 => Some(Route::Trig1),
            SetupMode::Trig2 => Some(Route::Trig2),
            SetupMode::Trig3 => Some(Route::Trig3),
            SetupMode::Trig4 => Some(Route::Trig4),
            _ => None,
        }
    }

    /// The voice mode a learnt note installs when both CV outputs are taken over.
    pub const fn paired_voice_mode(self) -> Option<VoiceMode> {
        match self {
            SetupMode::CvSplit => Some(VoiceMode::Split),
            SetupMode::CvPoly => Some(VoiceMode::Poly),
            SetupMode::CvArp => Some(VoiceMode::Arp),
            SetupMode::CvVelocity => Some(VoiceMode::Velocity),
            _ => None,
        }
    }
}
