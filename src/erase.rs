//! Erase granularity selection.
//!
//! A request of `count` 4 KiB blocks starting at an absolute block index is
//! split greedily into the largest commands the part supports. A larger
//! command is only used when the cursor is aligned to its size and enough
//! blocks remain, so nothing outside the request is ever erased.

use crate::geometry::BYTES_PER_BLOCK;
use crate::port::SerialFlash;
use crate::types::Error;

/// Command code the vendor flash configuration uses for "not supported".
pub const CMD_INVALID: u8 = 0xFF;

/// 4 KiB blocks covered by one 64 KiB block erase.
pub const BLOCKS_PER_64K: u32 = 16;
/// 4 KiB blocks covered by one 32 KiB block erase.
pub const BLOCKS_PER_32K: u32 = 8;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Granularity {
    Block64K,
    Block32K,
    Sector,
}

impl Granularity {
    #[inline(always)]
    pub const fn blocks(self) -> u32 {
        match self {
            Self::Block64K => BLOCKS_PER_64K,
            Self::Block32K => BLOCKS_PER_32K,
            Self::Sector => 1,
        }
    }

    pub const fn bytes(self) -> u32 {
        self.blocks() * BYTES_PER_BLOCK
    }
}

/// Erase commands the attached part accepts.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EraseCapabilities {
    pub sector: u8,
    pub block_32k: Option<u8>,
    pub block_64k: Option<u8>,
}

impl EraseCapabilities {
    pub const fn common_spi_nor() -> Self {
        Self {
            sector: 0x20,
            block_32k: Some(0x52),
            block_64k: Some(0xD8),
        }
    }

    /// Builds the set from raw vendor command bytes, where [`CMD_INVALID`]
    /// marks a command the part lacks.
    pub const fn from_vendor_codes(sector: u8, block_32k: u8, block_64k: u8) -> Self {
        Self {
            sector,
            block_32k: if block_32k == CMD_INVALID {
                None
            } else {
                Some(block_32k)
            },
            block_64k: if block_64k == CMD_INVALID {
                None
            } else {
                Some(block_64k)
            },
        }
    }

    pub const fn is_valid(&self) -> bool {
        self.sector != CMD_INVALID && self.sector != 0
    }
}

impl Default for EraseCapabilities {
    fn default() -> Self {
        Self::common_spi_nor()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EraseStep {
    pub granularity: Granularity,
    pub command: u8,
    /// Absolute block index the command starts at.
    pub block: u32,
}

impl EraseStep {
    #[inline(always)]
    pub const fn blocks(&self) -> u32 {
        self.granularity.blocks()
    }
}

/// Picks the command for the block at `block` with `remaining` blocks left in
/// the request. Alignment is checked before length; `remaining` must be > 0.
#[inline(always)]
pub fn plan_next_erase_step(block: u32, remaining: u32, caps: &EraseCapabilities) -> EraseStep {
    if let Some(command) = caps.block_64k {
        if block % BLOCKS_PER_64K == 0 && remaining >= BLOCKS_PER_64K {
            return EraseStep {
                granularity: Granularity::Block64K,
                command,
                block,
            };
        }
    }
    if let Some(command) = caps.block_32k {
        if block % BLOCKS_PER_32K == 0 && remaining >= BLOCKS_PER_32K {
            return EraseStep {
                granularity: Granularity::Block32K,
                command,
                block,
            };
        }
    }

    EraseStep {
        granularity: Granularity::Sector,
        command: caps.sector,
        block,
    }
}

/// The sequence of commands covering `[start, start + count)`.
#[derive(Clone, Debug)]
pub struct ErasePlan {
    caps: EraseCapabilities,
    next: u32,
    end: u32,
}

impl ErasePlan {
    /// Fails with [`Error::OutOfBounds`] when the range runs past the last
    /// addressable block.
    pub fn new(start: u32, count: u32, caps: EraseCapabilities) -> Result<Self, Error> {
        let end = start.checked_add(count).ok_or(Error::OutOfBounds)?;
        Ok(Self {
            caps,
            next: start,
            end,
        })
    }

    pub const fn remaining(&self) -> u32 {
        self.end - self.next
    }
}

impl Iterator for ErasePlan {
    type Item = EraseStep;

    fn next(&mut self) -> Option<EraseStep> {
        if self.next >= self.end {
            return None;
        }
        let step = plan_next_erase_step(self.next, self.end - self.next, &self.caps);
        self.next += step.blocks();
        Some(step)
    }
}

/// Erases `[start, start + count)` (absolute block indices), stopping at the
/// first command the part rejects. The steps are the ones [`ErasePlan`]
/// yields.
///
/// Runs while the flash is unmapped, inlined into the RAM-resident erase
/// routine. It sticks to plain loops and operators so that nothing here
/// becomes a call into flash.
#[inline(always)]
pub fn erase_blocks<F: SerialFlash>(
    flash: &mut F,
    start: u32,
    count: u32,
    caps: &EraseCapabilities,
) -> Result<(), Error> {
    if start as u64 + count as u64 > u32::MAX as u64 {
        return Err(Error::OutOfBounds);
    }
    let end = start + count;

    let mut block = start;
    while block < end {
        let step = plan_next_erase_step(block, end - block, caps);
        if !flash.erase(step) {
            return Err(Error::EraseFailure { block });
        }
        block += step.granularity.blocks();
    }
    Ok(())
}
