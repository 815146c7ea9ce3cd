//! MIDI 1.0 wire protocol: a receive ring fed from the serial port, a running-status parser, and a transmit queue.

mod event;
pub use event::*;

mod parser;
pub use parser::*;

mod rx_ring;
pub use rx_ring::*;

mod tx_queue;
pub use tx_queue::*;

/// Decodes bytes waiting in an [`RxRing`] and encodes outgoing messages onto a [`TxQueue`].
pub struct MidiCodec<'r> {
    rx: RxConsumer<'r>,
    parser: Parser,
    tx: TxQueue,
}

impl<'r> MidiCodec<'r> {
    /// A codec consuming `rx`.
    pub fn new(rx: RxConsumer<'r>) -> Self {
        Self {
            rx,
            parser: Parser::new(),
            tx: TxQueue::new(),
        }
    }

    /// Decode buffered bytes until one message completes or the ring runs dry.
    pub fn poll(&mut self) -> Option<MidiEvent> {
        while let Some(byte) = self.rx.pop() {
            if let Some(event) = self.parser.advance(byte) {
                return Some(event);
            }
        }
        None
    }

    /// Decode every buffered byte, handing each complete message to `handler` together with the transmit queue.
    /// Returns how many messages were handled.
    pub fn process_received_bytes(&mut self, mut handler: impl FnMut(MidiEvent, &mut TxQueue)) -> usize {
        let mut handled = 0;
        while let Some(event) = self.poll() {
            handler(event, &mut self.tx);
            handled += 1;
        }
        handled
    }

    /// Serialize a message for transmission.
    pub fn queue_outgoing_message(&mut self, event: &MidiEvent) {
        self.tx.queue(event);
    }

    /// The next byte to transmit, if any.
    pub fn drain_outgoing_byte(&mut self) -> Option<u8> {
        self.tx.pop()
    }
}
