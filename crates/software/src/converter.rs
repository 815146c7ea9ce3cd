//! Provides [`Converter`], which owns every part of the converter core.

use crate::{
    codec::{MidiCodec, MidiEvent, RxConsumer},
    configuration::{ConfigStore, factory_reset, factory_reset_if_needed},
    io::{Indicator, IoControl},
    mapper::{Context, EventMapper},
    setup::SetupPanel,
    voice::VoiceManager,
};

const MIDI_OUT_INDICATOR_TICKS: u8 = 2;

/// The complete converter: MIDI in, CV/gate/trigger out.
///
/// Firmware pushes received bytes into the [`RxRing`](crate::codec::RxRing) from its serial receiver, then calls
/// [`process_received_bytes`](Converter::process_received_bytes) whenever bytes are waiting,
/// [`drain_outgoing_byte`](Converter::drain_outgoing_byte) whenever its transmitter is idle, and
/// [`service_tick`](Converter::service_tick) every [`VOICE_TICK`](crate::voice::VOICE_TICK).
pub struct Converter<'r, I, S> {
    codec: MidiCodec<'r>,
    mapper: EventMapper,
    voices: VoiceManager,
    setup: SetupPanel,
    io: I,
    store: S,
}

impl<'r, I: IoControl, S: ConfigStore> Converter<'r, I, S> {
    /// Bring up the converter from `store`, restoring the factory configuration first if the store was never
    /// initialized.
    pub fn new(rx: RxConsumer<'r>, mut io: I, mut store: S) -> Self {
        if factory_reset_if_needed(&mut store, &mut io) {
            info!("Configuration store was blank");
        }
        let mapper = EventMapper::load(&store, &mut io);
        let voices = VoiceManager::load(&store, &mut io);
        Self {
            codec: MidiCodec::new(rx),
            mapper,
            voices,
            setup: SetupPanel::new(),
            io,
            store,
        }
    }

    /// Decode and act on every byte waiting in the receive ring. Returns how many messages were handled.
    pub fn process_received_bytes(&mut self) -> usize {
        let Self {
            codec,
            mapper,
            voices,
            setup,
            io,
            store,
        } = self;
        codec.process_received_bytes(|event, thru| {
            let mut ctx = Context {
                io: &mut *io,
                store: &mut *store,
                voices: &mut *voices,
                setup: &mut *setup,
                thru,
            };
            mapper.handle(event, &mut ctx);
        })
    }

    /// Queue a message of our own for transmission.
    pub fn queue_outgoing_message(&mut self, event: &MidiEvent) {
        self.codec.queue_outgoing_message(event);
    }

    /// The next byte for the serial transmitter, if any. Each byte flashes the MIDI out indicator.
    pub fn drain_outgoing_byte(&mut self) -> Option<u8> {
        let byte = self.codec.drain_outgoing_byte()?;
        self.io
            .set_indicator(Indicator::MidiOut, MIDI_OUT_INDICATOR_TICKS, 0);
        Some(byte)
    }

    /// Run the 4 ms housekeeping: the setup panel, then pending voice retriggers.
    pub fn service_tick(&mut self) {
        self.setup.tick(&mut self.io);
        self.voices.tick(&mut self.io);
    }

    /// Erase the configuration and start over from the factory settings.
    pub fn factory_reset(&mut self) {
        factory_reset(&mut self.store, &mut self.io);
        self.mapper = EventMapper::load(&self.store, &mut self.io);
        self.voices = VoiceManager::load(&self.store, &mut self.io);
        self.setup = SetupPanel::new();
    }

    /// The outputs.
    pub fn io(&self) -> &I {
        &self.io
    }

    /// The outputs, for firmware to advance their timers and sample switches.
    pub fn io_mut(&mut self) -> &mut I {
        &mut self.io
    }

    /// The configuration store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The event mapper.
    pub fn mapper(&self) -> &EventMapper {
        &self.mapper
    }

    /// The voice manager.
    pub fn voices(&self) -> &VoiceManager {
        &self.voices
    }

    /// The setup panel.
    pub fn setup(&self) -> &SetupPanel {
        &self.setup
    }
}
