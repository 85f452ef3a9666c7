use embedded_storage::nor_flash::{
    check_erase, check_read, check_write, ErrorType, NorFlash, ReadNorFlash,
};

use crate::erase::EraseCapabilities;
use crate::geometry::{FlashGeometry, FlashRegion, BYTES_PER_BLOCK, WORDS_PER_BLOCK};
use crate::port::{SerialFlash, XipBus};
use crate::profile::{JedecId, PartInfo, ProfileSource};
use crate::types::{fail_if_false, Error, IoMode};
use crate::xip::{self, InterruptMask};

/// Scratch storage for one block, lent to the translation layer.
pub type SectorBuffer = [u32; WORDS_PER_BLOCK as usize];

const VERIFY_CHUNK_BYTES: usize = 256;

/// How [`NorFlashDriver::block_erased_verify`] checks a block.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VerifyPolicy {
    /// Report success without touching flash; the translation layer checks
    /// block contents itself.
    Delegated,
    /// Read the block back and require every byte to be `0xFF`.
    ReadBack,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DriverConfig {
    /// I/O mode of the mapped bus, used to save and restore it around erases.
    pub io_mode: IoMode,
    pub erased_verify: VerifyPolicy,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            io_mode: IoMode::Normal,
            erased_verify: VerifyPolicy::Delegated,
        }
    }
}

/// What the translation layer needs to know about the disk.
#[derive(Debug, Default)]
pub struct NorFlashDescriptor {
    pub base_address: u32,
    pub total_blocks: u32,
    pub words_per_block: u32,
    /// Lent by the first [`XipNorDriver::initialize`].
    #[cfg(not(feature = "direct-read"))]
    pub sector_buffer: Option<&'static mut SectorBuffer>,
}

/// The callbacks a NOR translation layer drives a flash part through.
///
/// Addresses passed to the word operations are absolute flash addresses
/// inside the disk; block numbers are relative to the start of the disk.
pub trait NorFlashDriver {
    fn read_words(&mut self, address: u32, destination: &mut [u32], words: usize)
        -> Result<(), Error>;

    fn write_words(&mut self, address: u32, source: &[u32], words: usize) -> Result<(), Error>;

    fn block_erase(&mut self, block: u32, erase_count: u32) -> Result<(), Error>;

    fn block_erased_verify(&mut self, block: u32) -> Result<(), Error>;

    /// Reports a fatal translation layer error. Always fails.
    fn system_error(&mut self, code: u32) -> Result<(), Error>;
}

/// NOR driver for a disk on the flash the CPU executes from.
pub struct XipNorDriver<F, I>
where
    F: SerialFlash + XipBus,
    I: InterruptMask,
{
    flash: F,
    irq: I,
    geometry: FlashGeometry,
    part: PartInfo,
    jedec: Option<JedecId>,
    config: DriverConfig,
    initialized: bool,
    // Moved into the descriptor on the first initialize.
    #[cfg(not(feature = "direct-read"))]
    sector_buffer: Option<&'static mut SectorBuffer>,
}

impl<F, I> XipNorDriver<F, I>
where
    F: SerialFlash + XipBus,
    I: InterruptMask,
{
    /// Without the `direct-read` feature the driver takes the scratch block
    /// buffer it lends to the translation layer.
    pub fn new(
        flash: F,
        irq: I,
        region: FlashRegion,
        profile: ProfileSource,
        config: DriverConfig,
        #[cfg(not(feature = "direct-read"))] sector_buffer: &'static mut SectorBuffer,
    ) -> Result<Self, Error> {
        let part = PartInfo::from_source(profile)?;
        #[allow(unused_mut)]
        let mut driver = Self::from_part(flash, irq, region, part, None, config)?;
        #[cfg(not(feature = "direct-read"))]
        {
            driver.sector_buffer = Some(sector_buffer);
        }
        Ok(driver)
    }

    /// Like [`Self::new`], with the part derived from its JEDEC ID.
    pub fn new_auto(
        mut flash: F,
        irq: I,
        region: FlashRegion,
        config: DriverConfig,
        #[cfg(not(feature = "direct-read"))] sector_buffer: &'static mut SectorBuffer,
    ) -> Result<Self, Error> {
        let raw = flash.read_jedec_id().map_err(|_| Error::IoFailure)?;
        let jedec = JedecId::from(raw);
        let part = PartInfo::detect(jedec).inspect_err(|_| {
            warn!("unsupported JEDEC ID {:#x}", raw);
        })?;
        #[allow(unused_mut)]
        let mut driver = Self::from_part(flash, irq, region, part, Some(jedec), config)?;
        #[cfg(not(feature = "direct-read"))]
        {
            driver.sector_buffer = Some(sector_buffer);
        }
        Ok(driver)
    }

    fn from_part(
        flash: F,
        irq: I,
        region: FlashRegion,
        part: PartInfo,
        jedec: Option<JedecId>,
        config: DriverConfig,
    ) -> Result<Self, Error> {
        let geometry = FlashGeometry::from_region(region, part.capacity_bytes)?;

        debug!(
            "nor disk on {}: base {:#x}, {} blocks",
            part.name,
            geometry.base_address(),
            geometry.total_blocks()
        );

        Ok(Self {
            flash,
            irq,
            geometry,
            part,
            jedec,
            config,
            initialized: false,
            #[cfg(not(feature = "direct-read"))]
            sector_buffer: None,
        })
    }

    /// Fills in `descriptor` on the first call; later calls leave it alone.
    pub fn initialize(&mut self, descriptor: &mut NorFlashDescriptor) -> Result<(), Error> {
        if self.initialized {
            return Ok(());
        }

        descriptor.base_address = self.geometry.base_address();
        descriptor.total_blocks = self.geometry.total_blocks();
        descriptor.words_per_block = self.geometry.words_per_block();
        #[cfg(not(feature = "direct-read"))]
        {
            descriptor.sector_buffer = self.sector_buffer.take();
        }

        self.initialized = true;
        info!(
            "nor driver ready: {} blocks at {:#x}",
            descriptor.total_blocks,
            descriptor.base_address
        );
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn geometry(&self) -> FlashGeometry {
        self.geometry
    }

    pub fn capabilities(&self) -> EraseCapabilities {
        self.part.capabilities
    }

    pub fn part(&self) -> PartInfo {
        self.part
    }

    /// The ID the part was detected from, for drivers built by
    /// [`Self::new_auto`].
    pub fn jedec_id(&self) -> Option<JedecId> {
        self.jedec
    }

    pub fn config(&self) -> DriverConfig {
        self.config
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }

    pub fn free(self) -> (F, I) {
        (self.flash, self.irq)
    }

    fn erase_absolute(&mut self, start: u32, count: u32) -> Result<(), Error> {
        let caps = self.part.capabilities;
        xip::erase_exclusive(
            &mut self.flash,
            &mut self.irq,
            self.config.io_mode,
            start,
            count,
            &caps,
        )
        .map_err(|err| match err {
            // Report in the caller's numbering.
            Error::EraseFailure { block } => Error::EraseFailure {
                block: block - self.geometry.base_block(),
            },
            other => other,
        })
    }

    fn verify_erased(&mut self, block: u32) -> Result<(), Error> {
        let start = self.geometry.absolute_block(block, 1)? * BYTES_PER_BLOCK;
        let mut chunk = [0u8; VERIFY_CHUNK_BYTES];
        let mut offset = 0;
        while offset < BYTES_PER_BLOCK {
            fail_if_false(self.flash.read(start + offset, &mut chunk), Error::IoFailure)?;
            if chunk.iter().any(|b| *b != 0xFF) {
                return Err(Error::NotErased { block });
            }
            offset += VERIFY_CHUNK_BYTES as u32;
        }
        Ok(())
    }
}

fn word_span(buffer_words: usize, words: usize) -> Result<usize, Error> {
    if words > buffer_words {
        return Err(Error::OutOfBounds);
    }
    words.checked_mul(4).ok_or(Error::OutOfBounds)
}

impl<F, I> NorFlashDriver for XipNorDriver<F, I>
where
    F: SerialFlash + XipBus,
    I: InterruptMask,
{
    fn read_words(
        &mut self,
        address: u32,
        destination: &mut [u32],
        words: usize,
    ) -> Result<(), Error> {
        let len = word_span(destination.len(), words)?;
        self.geometry.ensure_contains(address, len)?;

        // SAFETY: `len` bytes lie within `destination`, u8 has no alignment
        // requirement and any byte pattern is a valid u32.
        let bytes =
            unsafe { core::slice::from_raw_parts_mut(destination.as_mut_ptr().cast::<u8>(), len) };
        fail_if_false(self.flash.read(address, bytes), Error::IoFailure)
    }

    fn write_words(&mut self, address: u32, source: &[u32], words: usize) -> Result<(), Error> {
        let len = word_span(source.len(), words)?;
        self.geometry.ensure_contains(address, len)?;

        // SAFETY: `len` bytes lie within `source`.
        let bytes = unsafe { core::slice::from_raw_parts(source.as_ptr().cast::<u8>(), len) };
        fail_if_false(self.flash.write(address, bytes), Error::IoFailure)
    }

    fn block_erase(&mut self, block: u32, erase_count: u32) -> Result<(), Error> {
        if erase_count == 0 {
            return Ok(());
        }
        let start = self.geometry.absolute_block(block, erase_count)?;
        trace!("erase {} blocks from block {}", erase_count, start);

        self.erase_absolute(start, erase_count).inspect_err(|err| {
            error!("erase of {} blocks at {} failed: {:?}", erase_count, block, err);
        })
    }

    fn block_erased_verify(&mut self, block: u32) -> Result<(), Error> {
        match self.config.erased_verify {
            VerifyPolicy::Delegated => Ok(()),
            VerifyPolicy::ReadBack => self.verify_erased(block),
        }
    }

    fn system_error(&mut self, code: u32) -> Result<(), Error> {
        error!("nor flash system error [ {} ]", code);
        Err(Error::SystemError(code))
    }
}

impl<F, I> ErrorType for XipNorDriver<F, I>
where
    F: SerialFlash + XipBus,
    I: InterruptMask,
{
    type Error = Error;
}

impl<F, I> ReadNorFlash for XipNorDriver<F, I>
where
    F: SerialFlash + XipBus,
    I: InterruptMask,
{
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        check_read(&*self, offset, bytes.len())?;
        let address = self.geometry.base_address() + offset;
        fail_if_false(self.flash.read(address, bytes), Error::IoFailure)
    }

    fn capacity(&self) -> usize {
        self.geometry.size_bytes() as usize
    }
}

impl<F, I> NorFlash for XipNorDriver<F, I>
where
    F: SerialFlash + XipBus,
    I: InterruptMask,
{
    const WRITE_SIZE: usize = 1;
    const ERASE_SIZE: usize = BYTES_PER_BLOCK as usize;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        check_erase(&*self, from, to)?;
        self.block_erase(from / BYTES_PER_BLOCK, (to - from) / BYTES_PER_BLOCK)
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        check_write(&*self, offset, bytes.len())?;
        let address = self.geometry.base_address() + offset;
        fail_if_false(self.flash.write(address, bytes), Error::IoFailure)
    }
}
