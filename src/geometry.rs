//! Disk geometry of the region handed to the translation layer.

use crate::types::Error;

pub const BYTES_PER_BLOCK: u32 = 4096;
pub const WORDS_PER_BLOCK: u32 = BYTES_PER_BLOCK / 4;

/// The disk size is truncated to a multiple of 16 KiB.
pub const DISK_SIZE_MASK: u32 = 0xFFFF_C000;

/// Bounds of the flash region reserved for the disk, as placed by the linker.
///
/// `start` and `end` are addresses as the image sees them; `start_offset` is
/// subtracted from `start` to obtain the flash address of the disk.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlashRegion {
    pub start: u32,
    pub end: u32,
    pub start_offset: u32,
}

impl FlashRegion {
    /// Reads the region from `__nor_disk_start__`, `__nor_disk_end__` and
    /// `__nor_disk_start_offset__`.
    #[cfg(feature = "rt")]
    pub fn from_linker() -> Self {
        extern "C" {
            static __nor_disk_start__: u32;
            static __nor_disk_end__: u32;
            static __nor_disk_start_offset__: u32;
        }

        // SAFETY: only the symbol addresses are taken, the symbols are never read.
        unsafe {
            Self {
                start: core::ptr::addr_of!(__nor_disk_start__) as usize as u32,
                end: core::ptr::addr_of!(__nor_disk_end__) as usize as u32,
                start_offset: core::ptr::addr_of!(__nor_disk_start_offset__) as usize as u32,
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlashGeometry {
    base_address: u32,
    total_blocks: u32,
}

impl FlashGeometry {
    pub fn from_region(region: FlashRegion, device_capacity: usize) -> Result<Self, Error> {
        let span = region.end.checked_sub(region.start).ok_or(Error::OutOfBounds)?;
        let disk_size = span & DISK_SIZE_MASK;
        let base_address = region
            .start
            .checked_sub(region.start_offset)
            .ok_or(Error::OutOfBounds)?;
        Self::new(base_address, disk_size / BYTES_PER_BLOCK, device_capacity)
    }

    pub fn new(base_address: u32, total_blocks: u32, device_capacity: usize) -> Result<Self, Error> {
        if !base_address.is_multiple_of(BYTES_PER_BLOCK) {
            return Err(Error::NotAligned);
        }
        if total_blocks == 0 {
            return Err(Error::InvalidConfiguration);
        }
        let end = u64::from(base_address) + u64::from(total_blocks) * u64::from(BYTES_PER_BLOCK);
        if end > device_capacity as u64 {
            return Err(Error::CapacityExceeded);
        }
        Ok(Self {
            base_address,
            total_blocks,
        })
    }

    pub const fn base_address(&self) -> u32 {
        self.base_address
    }

    pub const fn base_block(&self) -> u32 {
        self.base_address / BYTES_PER_BLOCK
    }

    pub const fn total_blocks(&self) -> u32 {
        self.total_blocks
    }

    pub const fn size_bytes(&self) -> u32 {
        self.total_blocks * BYTES_PER_BLOCK
    }

    pub const fn bytes_per_block(&self) -> u32 {
        BYTES_PER_BLOCK
    }

    pub const fn words_per_block(&self) -> u32 {
        WORDS_PER_BLOCK
    }

    /// Absolute block index of the disk relative `block`, checking that
    /// `[block, block + count)` stays on the disk.
    pub fn absolute_block(&self, block: u32, count: u32) -> Result<u32, Error> {
        let end = block.checked_add(count).ok_or(Error::OutOfBounds)?;
        if end > self.total_blocks {
            return Err(Error::OutOfBounds);
        }
        Ok(self.base_block() + block)
    }

    /// Checks that `[address, address + len)` lies on the disk.
    pub fn ensure_contains(&self, address: u32, len: usize) -> Result<(), Error> {
        let start = u64::from(address);
        let end = start
            .checked_add(len as u64)
            .ok_or(Error::OutOfBounds)?;
        let disk_end = u64::from(self.base_address) + u64::from(self.size_bytes());
        if start < u64::from(self.base_address) || end > disk_end {
            return Err(Error::OutOfBounds);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: usize = 1024 * 1024;

    #[test]
    fn region_size_is_masked_to_16k() {
        let region = FlashRegion {
            start: 0x2308_0000,
            end: 0x2308_0000 + 0x1_3FFF,
            start_offset: 0x2300_0000,
        };
        let geometry = FlashGeometry::from_region(region, 2 * MIB).unwrap();

        assert_eq!(geometry.base_address(), 0x8_0000);
        assert_eq!(geometry.base_block(), 0x80);
        assert_eq!(geometry.size_bytes(), 0x1_0000);
        assert_eq!(geometry.total_blocks(), 16);
        assert_eq!(geometry.words_per_block(), 1024);
        assert_eq!(geometry.base_block() * geometry.bytes_per_block(), geometry.base_address());
    }

    #[test]
    fn unaligned_base_is_rejected() {
        assert_eq!(FlashGeometry::new(0x800, 4, MIB), Err(Error::NotAligned));
    }

    #[test]
    fn disk_past_device_end_is_rejected() {
        assert_eq!(
            FlashGeometry::new(0xF_0000, 32, MIB),
            Err(Error::CapacityExceeded)
        );
        assert!(FlashGeometry::new(0xF_0000, 16, MIB).is_ok());
    }

    #[test]
    fn region_smaller_than_16k_is_empty() {
        let region = FlashRegion {
            start: 0x1000,
            end: 0x4000,
            start_offset: 0,
        };
        assert_eq!(
            FlashGeometry::from_region(region, MIB),
            Err(Error::InvalidConfiguration)
        );
    }

    #[test]
    fn absolute_block_checks_disk_bounds() {
        let geometry = FlashGeometry::new(0x10_0000, 64, 2 * MIB).unwrap();

        assert_eq!(geometry.absolute_block(0, 64), Ok(256));
        assert_eq!(geometry.absolute_block(60, 4), Ok(316));
        assert_eq!(geometry.absolute_block(60, 5), Err(Error::OutOfBounds));
        assert_eq!(geometry.absolute_block(u32::MAX, 2), Err(Error::OutOfBounds));
    }

    #[test]
    fn contains_rejects_addresses_outside_disk() {
        let geometry = FlashGeometry::new(0x1_0000, 2, MIB).unwrap();

        assert!(geometry.ensure_contains(0x1_0000, 8192).is_ok());
        assert_eq!(geometry.ensure_contains(0xFFFC, 8), Err(Error::OutOfBounds));
        assert_eq!(geometry.ensure_contains(0x1_1FFC, 8), Err(Error::OutOfBounds));
    }
}
