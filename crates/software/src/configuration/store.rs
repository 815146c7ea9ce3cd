use crate::io::{Indicator, IoControl};

/// Number of bytes in the configuration store.
pub const CONFIG_SIZE: usize = 32;

/// Value of [`ConfigAddress::SetupToken`] in a store which has been initialized by this firmware.
pub const SETUP_TOKEN_VALID: u8 = 0x00;

/// Addresses of the persistent settings.
///
/// The routing slots for the CV outputs are interleaved (both maps, then both channels, then both values); the four
/// trigger slots follow the same pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
#[allow(missing_docs)]
pub enum ConfigAddress {
    Cv1Map = 0x00,
    Cv2Map = 0x01,
    Cv1Channel = 0x02,
    Cv2Channel = 0x03,
    Cv1Value = 0x04,
    Cv2Value = 0x05,
    Trig1Map = 0x06,
    Trig2Map = 0x07,
    Trig3Map = 0x08,
    Trig4Map = 0x09,
    Trig1Channel = 0x0a,
    Trig2Channel = 0x0b,
    Trig3Channel = 0x0c,
    Trig4Channel = 0x0d,
    Trig1Value = 0x0e,
    Trig2Value = 0x0f,
    Trig3Value = 0x10,
    Trig4Value = 0x11,
    ClockDivisor = 0x12,
    VoiceMode = 0x13,
    SplitPoint = 0x14,
    VoiceUnit = 0x15,
    BendRange1 = 0x16,
    BendRange2 = 0x17,
    LegatoRetrig1 = 0x18,
    LegatoRetrig2 = 0x19,
    SetupToken = 0x1f,
}

impl ConfigAddress {
    /// The raw byte address.
    pub const fn addr(self) -> u8 {
        self as u8
    }
}

/// A persistent byte-addressed settings store.
///
/// Writes are expected to take effect immediately from the caller's point of view; implementations are free to
/// coalesce or wear-level them.
pub trait ConfigStore {
    /// Read the byte at `addr`.
    fn get(&self, addr: u8) -> u8;

    /// Write `value` to `addr`.
    fn set(&mut self, addr: u8, value: u8);

    /// Read a named setting.
    fn load(&self, address: ConfigAddress) -> u8 {
        self.get(address.addr())
    }

    /// Write a named setting.
    fn save(&mut self, address: ConfigAddress, value: u8) {
        self.set(address.addr(), value)
    }
}

/// A RAM-backed [`ConfigStore`].
///
/// A new store reads as erased memory (`0xff` everywhere), which [`factory_reset_if_needed`] recognises as never having
/// been initialized.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MemoryStore {
    data: [u8; CONFIG_SIZE],
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Construct an erased store.
    pub const fn new() -> Self {
        Self {
            data: [0xff; CONFIG_SIZE],
        }
    }

    /// Construct a store holding a snapshot of previously saved bytes.
    pub const fn from_bytes(data: [u8; CONFIG_SIZE]) -> Self {
        Self { data }
    }

    /// The raw contents, e.g. for writing back to flash.
    pub fn as_bytes(&self) -> &[u8; CONFIG_SIZE] {
        &self.data
    }
}

impl ConfigStore for MemoryStore {
    fn get(&self, addr: u8) -> u8 {
        self.data.get(usize::from(addr)).copied().unwrap_or(0)
    }

    fn set(&mut self, addr: u8, value: u8) {
        if let Some(byte) = self.data.get_mut(usize::from(addr)) {
            *byte = value;
        }
    }
}

/// Zero every setting and flash every indicator.
pub fn factory_reset(store: &mut impl ConfigStore, io: &mut impl IoControl) {
    info!("Restoring factory configuration");
    for addr in 0..CONFIG_SIZE as u8 {
        store.set(addr, 0);
    }
    for indicator in Indicator::ALL {
        io.set_indicator(indicator, 10, 0);
    }
}

/// Run [`factory_reset`] unless the store carries a valid setup token. Returns whether a reset happened.
pub fn factory_reset_if_needed(store: &mut impl ConfigStore, io: &mut impl IoControl) -> bool {
    if store.load(ConfigAddress::SetupToken) == SETUP_TOKEN_VALID {
        false
    } else {
        factory_reset(store, io);
        true
    }
}
