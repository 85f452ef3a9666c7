//! Exclusive access to a flash the CPU is executing from.
//!
//! While an erase is in flight the controller cannot serve instruction
//! fetches, so the erase runs with interrupts masked, the mapped read path
//! stopped and the mapped bus configuration saved and restored around it.

use crate::erase::{self, EraseCapabilities};
use crate::port::{SerialFlash, XipBus};
use crate::types::{Error, IoMode};

pub trait InterruptMask {
    type Saved;

    /// Masks interrupts and returns the state to restore.
    fn save_disable(&mut self) -> Self::Saved;

    fn restore(&mut self, saved: Self::Saved);
}

/// Interrupt masking through the `critical-section` implementation linked
/// into the image.
#[derive(Clone, Copy, Debug, Default)]
pub struct GlobalInterrupts;

impl InterruptMask for GlobalInterrupts {
    type Saved = critical_section::RestoreState;

    #[inline(always)]
    fn save_disable(&mut self) -> Self::Saved {
        // SAFETY: every acquire is paired with a release by `IrqGuard`.
        unsafe { critical_section::acquire() }
    }

    #[inline(always)]
    fn restore(&mut self, saved: Self::Saved) {
        // SAFETY: `saved` comes from the matching `acquire` above.
        unsafe { critical_section::release(saved) }
    }
}

/// PRIMASK save/disable/restore on Cortex-M.
#[cfg(feature = "cortex-m")]
#[derive(Clone, Copy, Debug, Default)]
pub struct Primask;

#[cfg(feature = "cortex-m")]
impl InterruptMask for Primask {
    type Saved = bool;

    #[inline(always)]
    fn save_disable(&mut self) -> bool {
        let was_enabled = cortex_m::register::primask::read().is_active();
        cortex_m::interrupt::disable();
        was_enabled
    }

    #[inline(always)]
    fn restore(&mut self, was_enabled: bool) {
        // Controller register writes must land before fetching from flash again.
        cortex_m::asm::dsb();
        cortex_m::asm::isb();
        if was_enabled {
            // SAFETY: interrupts were enabled when the guard was taken.
            unsafe { cortex_m::interrupt::enable() };
        }
    }
}

/// RAII guard for a span with interrupts masked.
/// Restores the saved interrupt state on drop.
pub struct IrqGuard<'a, I: InterruptMask> {
    mask: &'a mut I,
    saved: Option<I::Saved>,
}

impl<'a, I: InterruptMask> IrqGuard<'a, I> {
    pub fn new(mask: &'a mut I) -> Self {
        let saved = mask.save_disable();
        Self {
            mask,
            saved: Some(saved),
        }
    }
}

impl<I: InterruptMask> Drop for IrqGuard<'_, I> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            self.mask.restore(saved);
        }
    }
}

/// Erases `[start, start + count)` (absolute block indices) with interrupts
/// masked and the flash out of mapped mode.
///
/// If the mapped bus state cannot be saved, the bus is put into raw I/O mode,
/// nothing is erased and [`Error::BusStateUnavailable`] is returned.
/// Otherwise the saved state is restored whether or not the erase succeeds.
pub fn erase_exclusive<F, I>(
    flash: &mut F,
    irq: &mut I,
    io_mode: IoMode,
    start: u32,
    count: u32,
    caps: &EraseCapabilities,
) -> Result<(), Error>
where
    F: SerialFlash + XipBus,
    I: InterruptMask,
{
    let _irq = IrqGuard::new(irq);
    ram_erase_exclusive(flash, io_mode, start, count, caps)
}

// Everything between entering and leaving flash operation mode executes from
// RAM. Callees from this crate are `#[inline(always)]`; the port methods must
// be RAM resident themselves. On hosted targets the section is left alone.
#[inline(never)]
#[cfg_attr(target_os = "none", link_section = ".data.ramfunc")]
fn ram_erase_exclusive<F>(
    flash: &mut F,
    io_mode: IoMode,
    start: u32,
    count: u32,
    caps: &EraseCapabilities,
) -> Result<(), Error>
where
    F: SerialFlash + XipBus,
{
    flash.enter_flash_operation();

    let result = match flash.save_bus_state(io_mode) {
        Some(state) => {
            let result = erase::erase_blocks(flash, start, count, caps);
            flash.restore_bus_state(io_mode, state);
            result
        }
        None => {
            flash.configure_raw_bus(io_mode);
            Err(Error::BusStateUnavailable)
        }
    };

    flash.exit_flash_operation();
    result
}
