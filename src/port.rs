//! Vendor flash SDK seam.
//!
//! A concrete flash part implements [`SerialFlash`] for the data path and
//! [`XipBus`] for the controller's memory-mapped mode. Status results are
//! plain booleans, as the vendor primitives report them; the driver turns
//! them into [`Error`](crate::Error) values.
//!
//! Everything called between [`XipBus::enter_flash_operation`] and
//! [`XipBus::exit_flash_operation`] runs while the flash is not mapped. The
//! crate's own part of that window lives in `.data.ramfunc`; implementations
//! must keep [`SerialFlash::erase`] and the [`XipBus`] methods in RAM too,
//! either under the same section or as `#[inline(always)]` wrappers around
//! RAM-resident vendor routines.

use crate::erase::EraseStep;
use crate::types::IoMode;

pub trait SerialFlash {
    /// Raw JEDEC ID with the manufacturer in the low byte.
    fn read_jedec_id(&mut self) -> Result<u32, ()>;

    /// Reads `out.len()` bytes at the absolute flash `address`. The vendor
    /// primitive takes care of its own bus locking.
    fn read(&mut self, address: u32, out: &mut [u8]) -> bool;

    fn write(&mut self, address: u32, data: &[u8]) -> bool;

    /// Issues one erase command and waits for the part to finish it.
    fn erase(&mut self, step: EraseStep) -> bool;
}

pub trait XipBus {
    /// Snapshot of the memory-mapped access configuration.
    type BusState;

    /// Stops the prefetch/cache path that feeds the CPU from flash.
    fn enter_flash_operation(&mut self);

    fn exit_flash_operation(&mut self);

    /// Captures the mapped configuration. `None` when the controller is not in
    /// a mapped mode or cannot report it.
    fn save_bus_state(&mut self, io_mode: IoMode) -> Option<Self::BusState>;

    fn restore_bus_state(&mut self, io_mode: IoMode, state: Self::BusState);

    /// Puts the instruction/data bus into raw continuous-read mode with no
    /// address offset and 32-byte reads.
    fn configure_raw_bus(&mut self, io_mode: IoMode);
}
