use heapless::Deque;

use super::MidiEvent;

/// Number of bytes the transmit queue holds.
pub const TX_CAPACITY: usize = 256;

/// Bounded queue of bytes waiting for the serial transmitter.
#[derive(Clone, Debug)]
pub struct TxQueue {
    data: Deque<u8, TX_CAPACITY>,
}

impl Default for TxQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TxQueue {
    /// An empty queue.
    pub const fn new() -> Self {
        Self { data: Deque::new() }
    }

    /// Append one byte. Returns `false`, dropping the byte, when the queue is full.
    pub fn push(&mut self, byte: u8) -> bool {
        self.data.push_back(byte).is_ok()
    }

    /// Remove the oldest byte.
    pub fn pop(&mut self) -> Option<u8> {
        self.data.pop_front()
    }

    /// Serialize `event` onto the queue. Bytes which do not fit are dropped.
    pub fn queue(&mut self, event: &MidiEvent) {
        let dropped = event.encode().into_iter().filter(|&byte| !self.push(byte)).count();
        if dropped != 0 {
            warn!("MIDI output queue full; dropped {} bytes", dropped);
        }
    }

    /// Number of bytes waiting.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
