use heapless::spsc::{Consumer, Producer, Queue};

/// Number of bytes the receive ring holds.
pub const RX_CAPACITY: usize = 64;

// heapless keeps one slot free to tell full from empty
const RX_SLOTS: usize = RX_CAPACITY + 1;

/// Single-producer, single-consumer byte ring between the serial receiver and the MIDI parser.
///
/// [`split`](RxRing::split) hands out the two ends: an [`RxProducer`] for the serial receiver and an [`RxConsumer`]
/// for the codec. The ring is `const` constructible so firmware can keep it in a `static`.
pub struct RxRing {
    queue: Queue<u8, RX_SLOTS>,
}

impl Default for RxRing {
    fn default() -> Self {
        Self::new()
    }
}

impl RxRing {
    /// An empty ring.
    pub const fn new() -> Self {
        Self {
            queue: Queue::new(),
        }
    }

    /// Split the ring into its writing and reading ends.
    pub fn split(&mut self) -> (RxProducer<'_>, RxConsumer<'_>) {
        let (producer, consumer) = self.queue.split();
        (RxProducer(producer), RxConsumer(consumer))
    }
}

/// The writing end of an [`RxRing`], owned by the serial receiver.
pub struct RxProducer<'r>(Producer<'r, u8, RX_SLOTS>);

impl RxProducer<'_> {
    /// Enqueue one received byte. A full ring drops the byte and returns `false`.
    pub fn push_received_byte(&mut self, byte: u8) -> bool {
        if self.0.enqueue(byte).is_err() {
            warn!("MIDI receive ring full; dropped {=u8:#x}", byte);
            return false;
        }
        true
    }
}

/// The reading end of an [`RxRing`], owned by the codec.
///
/// Reads sample the ring inside a critical section so that a byte arriving from an interrupt cannot tear the empty
/// check.
pub struct RxConsumer<'r>(Consumer<'r, u8, RX_SLOTS>);

impl RxConsumer<'_> {
    /// Dequeue the oldest byte, if any.
    pub fn pop(&mut self) -> Option<u8> {
        critical_section::with(|_| self.0.dequeue())
    }
}
