//! This crate contains the architecture-agnostic core of a MIDI-to-CV converter: a device which translates a
//! [MIDI](https://midi.org/midi-1-0) stream into the control voltages, gates and triggers used by analog synthesizer
//! modules (see [CV/gate](https://en.wikipedia.org/wiki/CV/gate)).
//!
//! Received bytes are decoded by the [`codec`], routed to outputs by the [`mapper`] and, for notes, allocated to the two
//! pitch voices by the [`voice`] manager. The core never touches hardware; it drives the outside world through the
//! [`io::IoControl`] trait and persists its settings through [`configuration::ConfigStore`]. [`converter::Converter`]
//! ties everything together.

#![deny(missing_docs)]
#![no_std]

// must come first so the logging macros are visible to every other module
mod fmt;

pub mod clock;
pub mod codec;
pub mod configuration;
pub mod converter;
pub mod io;
pub mod mapper;
pub mod setup;
pub mod sysex;
pub mod voice;

#[cfg(test)]
mod test_support;
