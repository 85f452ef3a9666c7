use embedded_storage::nor_flash::{NorFlashError, NorFlashErrorKind};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The vendor read or write primitive reported failure.
    IoFailure,
    /// An erase command failed part way through a request. Blocks before
    /// `block` are erased, `block` and everything after it are untouched.
    /// `block` is numbered like the request: disk relative from
    /// [`NorFlashDriver`](crate::NorFlashDriver), absolute from
    /// [`erase_blocks`](crate::erase::erase_blocks).
    EraseFailure { block: u32 },
    /// Fatal code reported by the translation layer.
    SystemError(u32),
    /// The flash controller was not in a mapped mode whose state could be
    /// saved; the bus was put into raw I/O mode and nothing was erased.
    BusStateUnavailable,
    /// A block read back with at least one programmed bit.
    NotErased { block: u32 },
    InvalidConfiguration,
    UnknownJedecId,
    CapacityExceeded,
    NotAligned,
    OutOfBounds,
}

impl NorFlashError for Error {
    fn kind(&self) -> NorFlashErrorKind {
        match self {
            Self::NotAligned => NorFlashErrorKind::NotAligned,
            Self::OutOfBounds => NorFlashErrorKind::OutOfBounds,
            Self::IoFailure
            | Self::EraseFailure { .. }
            | Self::SystemError(_)
            | Self::BusStateUnavailable
            | Self::NotErased { .. }
            | Self::InvalidConfiguration
            | Self::UnknownJedecId
            | Self::CapacityExceeded => NorFlashErrorKind::Other,
        }
    }
}

impl From<NorFlashErrorKind> for Error {
    fn from(value: NorFlashErrorKind) -> Self {
        match value {
            NorFlashErrorKind::NotAligned => Self::NotAligned,
            NorFlashErrorKind::OutOfBounds => Self::OutOfBounds,
            _ => Self::InvalidConfiguration,
        }
    }
}

/// Serial flash I/O mode the controller uses for memory-mapped reads.
///
/// The discriminants are the low nibble of the vendor flash configuration's
/// I/O mode field.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IoMode {
    Normal,
    DualOutput,
    QuadOutput,
    DualIo,
    QuadIo,
}

impl IoMode {
    pub const fn bits(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::DualOutput => 1,
            Self::QuadOutput => 2,
            Self::DualIo => 3,
            Self::QuadIo => 4,
        }
    }

    /// Decodes the vendor I/O mode field. Only the low nibble is significant;
    /// the high nibble carries unrelated flags.
    pub const fn from_config_bits(bits: u8) -> Option<Self> {
        match bits & 0x0f {
            0 => Some(Self::Normal),
            1 => Some(Self::DualOutput),
            2 => Some(Self::QuadOutput),
            3 => Some(Self::DualIo),
            4 => Some(Self::QuadIo),
            _ => None,
        }
    }
}

#[inline(always)]
pub(crate) fn fail_if_false(ok: bool, err: Error) -> Result<(), Error> {
    if ok {
        Ok(())
    } else {
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_mode_ignores_high_nibble_flags() {
        assert_eq!(IoMode::from_config_bits(0x14), Some(IoMode::QuadIo));
        assert_eq!(IoMode::from_config_bits(0x00), Some(IoMode::Normal));
        assert_eq!(IoMode::from_config_bits(0x07), None);
        assert_eq!(IoMode::from_config_bits(IoMode::DualIo.bits()), Some(IoMode::DualIo));
    }

    #[test]
    fn error_kinds_map_onto_embedded_storage() {
        assert_eq!(Error::NotAligned.kind(), NorFlashErrorKind::NotAligned);
        assert_eq!(Error::OutOfBounds.kind(), NorFlashErrorKind::OutOfBounds);
        assert_eq!(
            Error::EraseFailure { block: 3 }.kind(),
            NorFlashErrorKind::Other
        );
        assert_eq!(Error::from(NorFlashErrorKind::OutOfBounds), Error::OutOfBounds);
    }
}
