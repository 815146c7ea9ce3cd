use wmidi::Note;

use crate::io::{ANALOG_MAX, CV_ZERO};

/// DAC codes per semitone at 1 V/octave (408 codes per volt).
pub const CODES_PER_SEMITONE: i32 = 34;

/// The note sounding at 0 V.
const ZERO_VOLT_NOTE: i32 = 60;

/// Lowest note the CV outputs can play.
pub const LOWEST_NOTE: u8 = 12;

/// Highest note the CV outputs can play.
pub const HIGHEST_NOTE: u8 = 115;

const fn code(note: i32) -> u16 {
    let code = CV_ZERO as i32 - (note - ZERO_VOLT_NOTE) * CODES_PER_SEMITONE;
    if code < 0 {
        0
    } else if code > ANALOG_MAX as i32 {
        ANALOG_MAX
    } else {
        code as u16
    }
}

/// Base DAC code of every MIDI note. The output stage inverts, so higher notes have lower codes.
pub const NOTE_TABLE: [u16; 128] = {
    let mut table = [0; 128];
    let mut note = 0;
    while note < 128 {
        table[note] = code(note as i32);
        note += 1;
    }
    table
};

/// Whether `note` lies within the range the CV outputs can play.
pub fn is_playable(note: Note) -> bool {
    (LOWEST_NOTE..=HIGHEST_NOTE).contains(&u8::from(note))
}

/// DAC code for `note` shifted down by `bend_offset` codes, saturated to the DAC range.
pub fn note_code(note: Note, bend_offset: i16) -> u16 {
    let code = i32::from(NOTE_TABLE[usize::from(u8::from(note))]) - i32::from(bend_offset);
    code.clamp(0, i32::from(ANALOG_MAX)) as u16
}
