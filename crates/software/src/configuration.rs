//! This module contains both user-configurable settings (implemented as enums) and the persistent byte store they are
//! saved to.

mod routing;
pub use routing::*;

mod setup_mode;
pub use setup_mode::*;

mod store;
pub use store::*;

mod voice_config;
pub use voice_config::*;

use num_traits::{FromPrimitive, ToPrimitive};

/// Steps through an enum's variants in declaration order, wrapping from the last back to the first.
///
/// Drives the setup panel, where each press of the select switch advances to the next screen.
pub trait CycleConfig {
    /// The variant after `self`.
    fn cycle(self) -> Self
    where
        Self: FromPrimitive + ToPrimitive + Sized + Copy,
    {
        self.to_u8()
            .and_then(|index| <Self as FromPrimitive>::from_u8(index + 1))
            .or_else(|| <Self as FromPrimitive>::from_u8(0))
            .unwrap_or(self)
    }
}
