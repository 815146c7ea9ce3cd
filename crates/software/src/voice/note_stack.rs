//! Provides [`NoteStack`], the last-note-priority memory of a monophonic voice.

use tinyvec::{ArrayVec, array_vec};
use wmidi::{Note, U7};

/// How many held keys a monophonic voice remembers.
pub const NOTE_STACK_DEPTH: usize = 8;

/// The keys held on a monophonic voice, oldest first.
///
/// Keys are stored as [`U7`], since [`tinyvec`] items must implement [`Default`]. When more keys are held than the stack remembers, the oldest one is forgotten.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoteStack<const N: usize = NOTE_STACK_DEPTH> {
    data: ArrayVec<[U7; N]>,
}

impl Default for NoteStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "defmt")]
impl<const N: usize> defmt::Format for NoteStack<N> {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "NoteStack [");
        for (i, &note) in self.data.iter().enumerate() {
            if i != 0 {
                defmt::write!(fmt, ",");
            }
            defmt::write!(fmt, " {}", u8::from(note));
        }
        defmt::write!(fmt, " ]");
    }
}

impl NoteStack {
    /// Construct an empty `NoteStack`.
    pub fn new() -> Self {
        Self { data: array_vec!() }
    }
}

impl<const N: usize> NoteStack<N> {
    /// Make `note` the newest held key, forgetting any earlier press of the same key.
    pub fn push(&mut self, note: Note) {
        let u7 = U7::from_u8_lossy(note as u8);
        self.data.retain(|&n| n != u7);
        if self.data.len() == self.data.capacity() {
            self.data.remove(0);
        }
        self.data.push(u7);
    }

    /// Forget `note`.
    pub fn remove(&mut self, note: Note) {
        let u7 = U7::from_u8_lossy(note as u8);
        self.data.retain(|&n| n != u7);
    }

    /// The newest held key.
    pub fn top(&self) -> Option<Note> {
        self.data.last().map(|&n| Note::from(n))
    }

    /// Whether no keys are held.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
