use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;
use wmidi::{Channel, U7};

use super::{ConfigAddress, ConfigStore};
use crate::io::{AnalogOutput, DigitalOutput};

/// The kind of MIDI event a routed output responds to.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, ToPrimitive, FromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mapping {
    /// The output ignores MIDI.
    #[default]
    Unassigned,
    /// CV outputs follow the voice manager; triggers fire on one specific note.
    Note,
    /// The output follows one controller.
    ControlChange,
    /// The output follows the pitch wheel.
    PitchBend,
}

impl Mapping {
    /// Decode a stored mapping. Only the low two bits are significant.
    pub fn from_raw(raw: u8) -> Self {
        <Self as FromPrimitive>::from_u8(raw & 0x03).unwrap_or_default()
    }
}

/// The outputs which own a routing slot.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Route {
    /// CV 1 and its gate.
    Cv1,
    /// CV 2 and its gate.
    Cv2,
    /// Trigger 1.
    Trig1,
    /// Trigger 2.
    Trig2,
    /// Trigger 3.
    Trig3,
    /// Trigger 4.
    Trig4,
}

impl Route {
    /// Every route, CVs first.
    pub const ALL: [Route; 6] = [
        Route::Cv1,
        Route::Cv2,
        Route::Trig1,
        Route::Trig2,
        Route::Trig3,
        Route::Trig4,
    ];

    /// The two CV routes.
    pub const CVS: [Route; 2] = [Route::Cv1, Route::Cv2];

    /// The four trigger routes.
    pub const TRIGGERS: [Route; 4] = [Route::Trig1, Route::Trig2, Route::Trig3, Route::Trig4];

    /// Position of the route in [`Route::ALL`].
    pub const fn index(self) -> usize {
        self as usize
    }

    /// The CV output driven by this route, if it is a CV route.
    pub const fn analog(self) -> Option<AnalogOutput> {
        match self {
            Route::Cv1 => Some(AnalogOutput::Cv1),
            Route::Cv2 => Some(AnalogOutput::Cv2),
            _ => None,
        }
    }

    /// The digital output switched by this route: the paired gate for CV routes, the trigger otherwise.
    pub const fn digital(self) -> DigitalOutput {
        match self {
            Route::Cv1 => DigitalOutput::Gate1,
            Route::Cv2 => DigitalOutput::Gate2,
            Route::Trig1 => DigitalOutput::Trig1,
            Route::Trig2 => DigitalOutput::Trig2,
            Route::Trig3 => DigitalOutput::Trig3,
            Route::Trig4 => DigitalOutput::Trig4,
        }
    }

    const fn addresses(self) -> [ConfigAddress; 3] {
        match self {
            Route::Cv1 => [
                ConfigAddress::Cv1Map,
                ConfigAddress::Cv1Channel,
                ConfigAddress::Cv1Value,
            ],
            Route::Cv2 => [
                ConfigAddress::Cv2Map,
                ConfigAddress::Cv2Channel,
                ConfigAddress::Cv2Value,
            ],
            Route::Trig1 => [
                ConfigAddress::Trig1Map,
                ConfigAddress::Trig1Channel,
                ConfigAddress::Trig1Value,
            ],
            Route::Trig2 => [
                ConfigAddress::Trig2Map,
                ConfigAddress::Trig2Channel,
                ConfigAddress::Trig2Value,
            ],
            Route::Trig3 => [
                ConfigAddress::Trig3Map,
                ConfigAddress::Trig3Channel,
                ConfigAddress::Trig3Value,
            ],
            Route::Trig4 => [
                ConfigAddress::Trig4Map,
                ConfigAddress::Trig4Channel,
                ConfigAddress::Trig4Value,
            ],
        }
    }
}

/// Which MIDI events an output follows.
///
/// `value` is a note number for note-mapped triggers, a controller number for controller mappings, and the bend
/// polarity (`1` normal, `0` reversed) for pitch-bend mappings.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RoutingSlot {
    /// What kind of event the output follows.
    pub mapping: Mapping,
    /// The channel the event must arrive on.
    pub channel: Channel,
    /// Mapping-specific detail.
    pub value: U7,
}

impl Default for RoutingSlot {
    fn default() -> Self {
        Self {
            mapping: Mapping::Unassigned,
            channel: Channel::Ch1,
            value: U7::MIN,
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for RoutingSlot {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "RoutingSlot {{ mapping: {}, channel: {}, value: {} }}",
            self.mapping,
            self.channel.number(),
            u8::from(self.value)
        );
    }
}

impl RoutingSlot {
    /// Build a slot from raw bytes, normalising each field: the mapping keeps two bits, the channel four bits with the
    /// reserved control channel (index 15) folded onto the first channel, and the value seven bits.
    pub fn from_raw(mapping: u8, channel: u8, value: u8) -> Self {
        let channel = match channel & 0x0f {
            15 => 0,
            index => index,
        };
        Self {
            mapping: Mapping::from_raw(mapping),
            channel: Channel::from_index(channel).unwrap_or(Channel::Ch1),
            value: U7::from_u8_lossy(value),
        }
    }

    /// Whether this slot follows `mapping` events on `channel`.
    pub fn follows(&self, mapping: Mapping, channel: Channel) -> bool {
        self.mapping == mapping && self.channel == channel
    }
}

/// The routing slots of every output.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct RoutingTable {
    slots: [RoutingSlot; 6],
}

#[cfg(feature = "defmt")]
impl defmt::Format for RoutingTable {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "RoutingTable {{ slots: {} }}", self.slots);
    }
}

impl RoutingTable {
    /// Read every slot from `store`.
    pub fn load(store: &impl ConfigStore) -> Self {
        let mut table = Self::default();
        for route in Route::ALL {
            let [map, channel, value] = route.addresses();
            table.slots[route.index()] = RoutingSlot::from_raw(
                store.load(map),
                store.load(channel),
                store.load(value),
            );
        }
        table
    }

    /// The slot belonging to `route`.
    pub fn slot(&self, route: Route) -> RoutingSlot {
        self.slots[route.index()]
    }

    /// Normalise, store and persist a slot. Returns the slot as stored.
    pub fn assign(
        &mut self,
        route: Route,
        mapping: u8,
        channel: u8,
        value: u8,
        store: &mut impl ConfigStore,
    ) -> RoutingSlot {
        let slot = RoutingSlot::from_raw(mapping, channel, value);
        self.slots[route.index()] = slot;

        let [map_addr, channel_addr, value_addr] = route.addresses();
        store.save(map_addr, slot.mapping as u8);
        store.save(channel_addr, slot.channel.index());
        store.save(value_addr, u8::from(slot.value));
        debug!("Routing {} assigned: {}", route, slot);
        slot
    }
}
