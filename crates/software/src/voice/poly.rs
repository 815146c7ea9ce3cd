use wmidi::Note;

/// Voices in a full chain of converters: eight units of two voices each.
pub const POLY_SLOTS: usize = 16;

/// What [`PolyTable::assign`] did with a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Assignment {
    /// The note took a free slot.
    Fresh(usize),
    /// The note was already sounding in this slot and should be retriggered.
    Repeat(usize),
    /// Every slot is busy with another note.
    Full,
}

/// Slot allocation for the chain-wide polyphonic mode.
///
/// Slot `i` belongs to unit `i / 2` and is played by that unit's voice `i % 2`. A slot stays assigned after its key is
/// released for as long as the damper holds it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PolyTable {
    notes: [Option<Note>; POLY_SLOTS],
    held: [bool; POLY_SLOTS],
}

impl PolyTable {
    /// Take the first slot which already holds `note` or is free, and mark it held.
    pub fn assign(&mut self, note: Note) -> Assignment {
        let found = self
            .notes
            .iter()
            .position(|&slot| slot.is_none() || slot == Some(note));
        match found {
            Some(index) => {
                let repeat = self.notes[index].is_some();
                self.notes[index] = Some(note);
                self.held[index] = true;
                if repeat {
                    Assignment::Repeat(index)
                } else {
                    Assignment::Fresh(index)
                }
            }
            None => Assignment::Full,
        }
    }

    /// Mark the slot holding `note` as released and return its index.
    pub fn release(&mut self, note: Note) -> Option<usize> {
        let index = self.notes.iter().position(|&slot| slot == Some(note))?;
        self.held[index] = false;
        Some(index)
    }

    /// Free a slot.
    pub fn clear(&mut self, index: usize) {
        self.notes[index] = None;
        self.held[index] = false;
    }

    /// Free every slot whose key is no longer held, yielding the index and note of each.
    pub fn drain_released(&mut self) -> impl Iterator<Item = (usize, Note)> + '_ {
        self.notes
            .iter_mut()
            .zip(self.held.iter())
            .enumerate()
            .filter_map(|(index, (slot, &held))| match *slot {
                Some(note) if !held => {
                    *slot = None;
                    Some((index, note))
                }
                _ => None,
            })
    }

    /// The note assigned to a slot.
    pub fn note(&self, index: usize) -> Option<Note> {
        self.notes[index]
    }
}
