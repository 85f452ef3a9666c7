#![cfg_attr(not(test), no_std)]
#![doc = "Block erase dispatch for NOR flash used for execute-in-place."]
#![doc = ""]
#![doc = "Splits erase requests into the largest commands the part supports, runs them"]
#![doc = "with interrupts masked and the mapped bus state saved and restored, and"]
#![doc = "exposes the result as a NOR translation layer driver."]
#![doc = ""]
#![doc = "On bare-metal targets the code that runs while the flash is unmapped is"]
#![doc = "placed in the `.data.ramfunc` section. The linker script must put that"]
#![doc = "section in executable RAM and the runtime must copy it there before the"]
#![doc = "first erase, as `cortex-m-rt` does for `.data.*`. The `SerialFlash::erase`"]
#![doc = "and `XipBus` implementations must be RAM resident or `#[inline(always)]`."]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

mod driver;
pub mod erase;
pub mod geometry;
pub mod port;
pub mod profile;
mod types;
pub mod xip;

#[cfg(test)]
mod emulation;

pub use driver::{
    DriverConfig, NorFlashDescriptor, NorFlashDriver, SectorBuffer, VerifyPolicy, XipNorDriver,
};
pub use erase::{EraseCapabilities, Granularity};
pub use geometry::{FlashGeometry, FlashRegion};
pub use port::{SerialFlash, XipBus};
pub use profile::{BuiltInProfile, FlashProfile, JedecId, PartInfo, ProfileSource};
pub use types::{Error, IoMode};
pub use xip::{erase_exclusive, GlobalInterrupts, InterruptMask};
#[cfg(feature = "cortex-m")]
pub use xip::Primask;
