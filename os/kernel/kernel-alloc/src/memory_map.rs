//! # BIOS Memory Map
//!
//! The loader copies the firmware's INT 15h/E820 descriptors verbatim into
//! low memory. Each descriptor is 24 bytes; entries are vetted in place
//! before they feed the region trackers:
//!
//! - non-usable entries are left untouched,
//! - a usable entry's base is rounded up to the next page and its length
//!   shrunk by the same amount,
//! - a usable entry shorter than one page afterwards becomes
//!   [`MemoryKind::Useless`].
//!
//! Overlapping descriptors are not merged here.

use crate::error::MalformedMemoryMap;
use bitfield_struct::bitfield;
use kernel_info::memory::PAGE_SIZE;
use kernel_memory_addresses::PhysicalAddress;
use log::{debug, warn};

/// Address range type reported by the firmware.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MemoryKind {
    Usable = 1,
    Reserved = 2,
    AcpiReclaimable = 3,
    AcpiNvs = 4,
    Bad = 5,
    /// Usable range too small to hold a page after alignment.
    Useless = 6,
}

impl MemoryKind {
    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            1 => Self::Usable,
            2 => Self::Reserved,
            3 => Self::AcpiReclaimable,
            4 => Self::AcpiNvs,
            5 => Self::Bad,
            6 => Self::Useless,
            _ => return None,
        })
    }
}

/// ACPI 3.0 extended attributes of an E820 entry.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct ExtendedAttributes {
    /// Bit 0; the entry should be ignored when clear on ACPI 3.0 firmware.
    pub ignore: bool,
    /// Bit 1; the range is non-volatile.
    pub non_volatile: bool,
    #[bits(30)]
    __: u32,
}

/// One firmware memory descriptor, laid out as the loader stores it.
#[repr(C)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MemoryMapEntry {
    base_address: u64,
    byte_length: u64,
    kind: u32,
    extended_attributes: ExtendedAttributes,
}

const _: () = {
    assert!(size_of::<MemoryMapEntry>() == 24);
    assert!(align_of::<MemoryMapEntry>() == 8);
};

impl MemoryMapEntry {
    #[must_use]
    pub const fn new(base: PhysicalAddress, byte_length: u64, kind: MemoryKind) -> Self {
        Self::from_raw(base.as_u64(), byte_length, kind as u32)
    }

    /// Build an entry from raw firmware values, including unknown kinds.
    #[must_use]
    pub const fn from_raw(base_address: u64, byte_length: u64, kind: u32) -> Self {
        Self {
            base_address,
            byte_length,
            kind,
            extended_attributes: ExtendedAttributes::new(),
        }
    }

    #[inline]
    #[must_use]
    pub const fn base_address(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.base_address)
    }

    #[inline]
    #[must_use]
    pub const fn byte_length(&self) -> u64 {
        self.byte_length
    }

    /// The decoded kind; `None` for values the firmware made up.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> Option<MemoryKind> {
        MemoryKind::from_raw(self.kind)
    }

    #[inline]
    #[must_use]
    pub const fn extended_attributes(&self) -> ExtendedAttributes {
        self.extended_attributes
    }

    #[inline]
    #[must_use]
    pub const fn with_extended_attributes(mut self, attributes: ExtendedAttributes) -> Self {
        self.extended_attributes = attributes;
        self
    }

    #[inline]
    #[must_use]
    pub const fn is_usable(&self) -> bool {
        matches!(self.kind(), Some(MemoryKind::Usable))
    }

    /// One past the last byte, or `None` if the range wraps.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> Option<u64> {
        self.base_address.checked_add(self.byte_length)
    }
}

/// Reject maps that cannot be walked safely.
///
/// # Errors
/// - [`MalformedMemoryMap::Empty`] for a zero entry count.
/// - [`MalformedMemoryMap::RangeOverflow`] for the first entry whose range wraps.
pub fn validate(entries: &[MemoryMapEntry]) -> Result<(), MalformedMemoryMap> {
    if entries.is_empty() {
        return Err(MalformedMemoryMap::Empty);
    }
    match entries.iter().position(|e| e.end().is_none()) {
        Some(index) => Err(MalformedMemoryMap::RangeOverflow { index }),
        None => Ok(()),
    }
}

/// Page-align a usable entry in place.
///
/// Returns `true` if the entry is still usable afterwards.
pub fn vet_entry(entry: &mut MemoryMapEntry) -> bool {
    if !entry.is_usable() {
        return false;
    }

    let offset = entry.base_address % PAGE_SIZE;
    if offset != 0 {
        let shift = PAGE_SIZE - offset;
        if shift > entry.byte_length {
            warn!(
                "usable entry at {:#x} ({} bytes) ends before its first page boundary",
                entry.base_address, entry.byte_length
            );
            entry.byte_length = 0;
        } else {
            entry.byte_length -= shift;
        }
        entry.base_address = entry.base_address.saturating_add(shift);
    }

    if entry.byte_length < PAGE_SIZE {
        debug!(
            "entry at {:#x} too small after alignment ({} bytes)",
            entry.base_address, entry.byte_length
        );
        entry.kind = MemoryKind::Useless as u32;
        return false;
    }

    true
}
