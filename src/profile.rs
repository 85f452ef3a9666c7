//! What the driver needs to know about the attached part: how large it is and
//! which erase commands it accepts.

use crate::erase::EraseCapabilities;
use crate::types::Error;

const MIB: usize = 1024 * 1024;

/// Largest part reachable with 3-byte addressing, which is all the XIP
/// controller maps.
pub const MAX_3B_CAPACITY_BYTES: usize = 16 * MIB;

/// A part description supplied by the board.
pub trait FlashProfile: Sync {
    fn name(&self) -> &'static str;
    fn capacity_bytes(&self) -> usize;

    fn erase_capabilities(&self) -> EraseCapabilities {
        EraseCapabilities::common_spi_nor()
    }
}

/// Generic parts with the 0x20/0x52/0xD8 erase set.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BuiltInProfile {
    CommonSpiNor1MiB,
    CommonSpiNor2MiB,
    CommonSpiNor4MiB,
    CommonSpiNor8MiB,
    CommonSpiNor16MiB,
}

impl FlashProfile for BuiltInProfile {
    fn name(&self) -> &'static str {
        "common-spi-nor"
    }

    fn capacity_bytes(&self) -> usize {
        match self {
            Self::CommonSpiNor1MiB => MIB,
            Self::CommonSpiNor2MiB => 2 * MIB,
            Self::CommonSpiNor4MiB => 4 * MIB,
            Self::CommonSpiNor8MiB => 8 * MIB,
            Self::CommonSpiNor16MiB => 16 * MIB,
        }
    }
}

#[derive(Clone, Copy)]
pub enum ProfileSource {
    BuiltIn(BuiltInProfile),
    Custom(&'static dyn FlashProfile),
}

/// Raw JEDEC ID as returned by the 0x9F command.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct JedecId {
    pub manufacturer: u8,
    pub memory_type: u8,
    pub density: u8,
}

impl From<u32> for JedecId {
    /// The manufacturer sits in the low byte, as the vendor read returns it.
    fn from(raw: u32) -> Self {
        let [manufacturer, memory_type, density, _] = raw.to_le_bytes();
        Self {
            manufacturer,
            memory_type,
            density,
        }
    }
}

struct Vendor {
    id: u8,
    name: &'static str,
    capabilities: EraseCapabilities,
}

const fn common(id: u8, name: &'static str) -> Vendor {
    Vendor {
        id,
        name,
        capabilities: EraseCapabilities::common_spi_nor(),
    }
}

// Manufacturers whose serial NOR lines encode capacity as 2^density bytes.
const VENDORS: &[Vendor] = &[
    common(0xEF, "winbond"),
    common(0xC8, "gigadevice"),
    common(0xC2, "macronix"),
    common(0x85, "puya"),
    common(0x0B, "xtx"),
    common(0x68, "boya"),
    common(0x9D, "issi"),
    common(0x5E, "zbit"),
];

fn vendor(id: u8) -> Option<&'static Vendor> {
    VENDORS.iter().find(|v| v.id == id)
}

// 0x10 is 64 KiB, the smallest serial NOR still made with this encoding.
fn capacity_from_density(density: u8) -> Option<usize> {
    (0x10..=0x1F)
        .contains(&density)
        .then(|| 1usize << density)
}

/// Capacity and erase commands, checked against what the controller can map.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PartInfo {
    pub name: &'static str,
    pub capacity_bytes: usize,
    pub capabilities: EraseCapabilities,
}

impl PartInfo {
    pub fn new(
        name: &'static str,
        capacity_bytes: usize,
        capabilities: EraseCapabilities,
    ) -> Result<Self, Error> {
        if capacity_bytes == 0 || capacity_bytes > MAX_3B_CAPACITY_BYTES {
            return Err(Error::InvalidConfiguration);
        }
        if !capabilities.is_valid() {
            return Err(Error::InvalidConfiguration);
        }
        Ok(Self {
            name,
            capacity_bytes,
            capabilities,
        })
    }

    pub fn from_profile(profile: &dyn FlashProfile) -> Result<Self, Error> {
        Self::new(
            profile.name(),
            profile.capacity_bytes(),
            profile.erase_capabilities(),
        )
    }

    pub fn from_source(source: ProfileSource) -> Result<Self, Error> {
        match source {
            ProfileSource::BuiltIn(profile) => Self::from_profile(&profile),
            ProfileSource::Custom(profile) => Self::from_profile(profile),
        }
    }

    /// Derives the part from its JEDEC ID: the manufacturer picks the erase
    /// commands, the density byte gives the capacity.
    pub fn detect(jedec: JedecId) -> Result<Self, Error> {
        let (vendor, density) = match vendor(jedec.manufacturer) {
            Some(vendor) => (vendor, jedec.density),
            // Some XTX parts report density and manufacturer swapped.
            None => (
                vendor(jedec.density).ok_or(Error::UnknownJedecId)?,
                jedec.manufacturer,
            ),
        };
        let capacity = capacity_from_density(density).ok_or(Error::UnknownJedecId)?;
        Self::new(vendor.name, capacity, vendor.capabilities)
    }
}
