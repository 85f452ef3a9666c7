//! Host-side flash part and interrupt mask that record every call.

use std::cell::RefCell;
use std::rc::Rc;
use std::vec::Vec;

use crate::erase::EraseStep;
use crate::geometry::BYTES_PER_BLOCK;
use crate::port::{SerialFlash, XipBus};
use crate::types::IoMode;
use crate::xip::InterruptMask;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Event {
    IrqDisabled,
    IrqRestored,
    EnterFlashOperation,
    ExitFlashOperation,
    SaveBusState(IoMode),
    RestoreBusState(IoMode),
    RawBus(IoMode),
    Erase(EraseStep),
    Read { address: u32, len: usize },
    Write { address: u32, len: usize },
}

#[derive(Default)]
struct Shared {
    events: Vec<Event>,
    irq_masked: bool,
    disables: usize,
    restores: usize,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct EmulatedBusState {
    io_mode_bits: u8,
    address_offset: u32,
    continuous_read: bool,
}

#[derive(Default)]
pub(crate) struct RecordingMask {
    shared: Rc<RefCell<Shared>>,
}

impl RecordingMask {
    pub(crate) fn masked(&self) -> bool {
        self.shared.borrow().irq_masked
    }

    pub(crate) fn disables(&self) -> usize {
        self.shared.borrow().disables
    }

    pub(crate) fn restores(&self) -> usize {
        self.shared.borrow().restores
    }
}

impl InterruptMask for RecordingMask {
    type Saved = bool;

    fn save_disable(&mut self) -> bool {
        let mut shared = self.shared.borrow_mut();
        let was_masked = shared.irq_masked;
        shared.irq_masked = true;
        shared.disables += 1;
        shared.events.push(Event::IrqDisabled);
        was_masked
    }

    fn restore(&mut self, was_masked: bool) {
        let mut shared = self.shared.borrow_mut();
        shared.irq_masked = was_masked;
        shared.restores += 1;
        shared.events.push(Event::IrqRestored);
    }
}

pub(crate) struct EmulatedFlash {
    mem: Vec<u8>,
    shared: Rc<RefCell<Shared>>,
    jedec: Result<u32, ()>,
    mapped: bool,
    bus_state: EmulatedBusState,
    in_flash_operation: bool,
    raw_bus: bool,
    fail_erase_at: Option<u32>,
    fail_io: bool,
    unguarded_erases: usize,
}

impl EmulatedFlash {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            mem: vec![0xFF; capacity],
            shared: Rc::default(),
            jedec: Ok(0x1540EF),
            mapped: true,
            bus_state: EmulatedBusState {
                io_mode_bits: IoMode::QuadIo.bits(),
                address_offset: 0x2000,
                continuous_read: true,
            },
            in_flash_operation: false,
            raw_bus: false,
            fail_erase_at: None,
            fail_io: false,
            unguarded_erases: 0,
        }
    }

    /// An interrupt mask logging into this flash's event list.
    pub(crate) fn interrupt_mask(&self) -> RecordingMask {
        RecordingMask {
            shared: self.shared.clone(),
        }
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        self.shared.borrow().events.clone()
    }

    pub(crate) fn erase_steps(&self) -> Vec<EraseStep> {
        self.shared
            .borrow()
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Erase(step) => Some(*step),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn set_jedec(&mut self, jedec: Result<u32, ()>) {
        self.jedec = jedec;
    }

    pub(crate) fn set_mapped(&mut self, mapped: bool) {
        self.mapped = mapped;
    }

    pub(crate) fn fail_erase_at(&mut self, block: Option<u32>) {
        self.fail_erase_at = block;
    }

    pub(crate) fn fail_io(&mut self, fail: bool) {
        self.fail_io = fail;
    }

    pub(crate) fn bus_state(&self) -> EmulatedBusState {
        self.bus_state
    }

    // Command-mode erases leave the controller out of its mapped setup.
    fn scramble_bus_state(&mut self) {
        self.bus_state = EmulatedBusState {
            io_mode_bits: IoMode::Normal.bits(),
            address_offset: 0,
            continuous_read: false,
        };
    }

    pub(crate) fn in_flash_operation(&self) -> bool {
        self.in_flash_operation
    }

    pub(crate) fn irq_masked(&self) -> bool {
        self.shared.borrow().irq_masked
    }

    pub(crate) fn raw_bus_configured(&self) -> bool {
        self.raw_bus
    }

    pub(crate) fn unguarded_erases(&self) -> usize {
        self.unguarded_erases
    }

    pub(crate) fn bytes(&self, address: u32, len: usize) -> &[u8] {
        &self.mem[address as usize..address as usize + len]
    }

    pub(crate) fn fill(&mut self, address: u32, len: usize, value: u8) {
        self.mem[address as usize..address as usize + len].fill(value);
    }

    fn push(&self, event: Event) {
        self.shared.borrow_mut().events.push(event);
    }

    fn in_range(&self, address: u32, len: usize) -> bool {
        (address as usize)
            .checked_add(len)
            .is_some_and(|end| end <= self.mem.len())
    }
}

impl SerialFlash for EmulatedFlash {
    fn read_jedec_id(&mut self) -> Result<u32, ()> {
        self.jedec
    }

    fn read(&mut self, address: u32, out: &mut [u8]) -> bool {
        self.push(Event::Read {
            address,
            len: out.len(),
        });
        if self.fail_io || !self.in_range(address, out.len()) {
            return false;
        }
        out.copy_from_slice(self.bytes(address, out.len()));
        true
    }

    fn write(&mut self, address: u32, data: &[u8]) -> bool {
        self.push(Event::Write {
            address,
            len: data.len(),
        });
        if self.fail_io || !self.in_range(address, data.len()) {
            return false;
        }
        let start = address as usize;
        for (cell, byte) in self.mem[start..start + data.len()].iter_mut().zip(data) {
            *cell &= *byte;
        }
        true
    }

    fn erase(&mut self, step: EraseStep) -> bool {
        self.push(Event::Erase(step));
        let exclusive = self.irq_masked() && self.in_flash_operation;
        if !exclusive {
            self.unguarded_erases += 1;
        }
        self.scramble_bus_state();
        if self.fail_erase_at == Some(step.block) {
            return false;
        }
        let address = step.block * BYTES_PER_BLOCK;
        let len = step.granularity.bytes() as usize;
        if !self.in_range(address, len) {
            return false;
        }
        self.fill(address, len, 0xFF);
        true
    }
}

impl XipBus for EmulatedFlash {
    type BusState = EmulatedBusState;

    fn enter_flash_operation(&mut self) {
        self.in_flash_operation = true;
        self.push(Event::EnterFlashOperation);
    }

    fn exit_flash_operation(&mut self) {
        self.in_flash_operation = false;
        self.push(Event::ExitFlashOperation);
    }

    fn save_bus_state(&mut self, io_mode: IoMode) -> Option<EmulatedBusState> {
        self.push(Event::SaveBusState(io_mode));
        self.mapped.then_some(self.bus_state)
    }

    fn restore_bus_state(&mut self, io_mode: IoMode, state: EmulatedBusState) {
        self.push(Event::RestoreBusState(io_mode));
        self.bus_state = state;
    }

    fn configure_raw_bus(&mut self, io_mode: IoMode) {
        self.push(Event::RawBus(io_mode));
        self.raw_bus = true;
        self.bus_state = EmulatedBusState {
            io_mode_bits: io_mode.bits(),
            address_offset: 0,
            continuous_read: true,
        };
    }
}
