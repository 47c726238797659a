//! # Boot Disk Image Layout
//!
//! ```text
//! 0                 boot.len()        +2               +4
//! ┌─────────────────┬─────────────────┬────────────────┬────────────┬───────────┐
//! │ boot sector(s)  │ magic  "AL"     │ sectors u16 LE │ kernel     │ zeroes …  │
//! └─────────────────┴─────────────────┴────────────────┴────────────┴───────────┘
//!                                                                  IMAGE_SIZE ┘
//! ```
//!
//! The loader scans for [`IMAGE_MAGIC`] right behind its own code, reads the
//! sector count and loads that many 512-byte sectors of kernel.

#![cfg_attr(not(any(test, doctest)), no_std)]

#[cfg(feature = "parse")]
pub mod parse;

/// Marker in front of the kernel header.
pub const IMAGE_MAGIC: [u8; 2] = *b"AL";

/// Disk sector size the loader reads in.
pub const SECTOR_SIZE: usize = 512;

/// Total size of the emitted image; the tail is zero padding.
pub const IMAGE_SIZE: usize = 10 * 1024 * 1024;

/// Magic plus sector count.
pub const HEADER_LEN: usize = IMAGE_MAGIC.len() + size_of::<u16>();

/// Kernel header written between the boot code and the kernel.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct KernelHeader {
    /// Kernel length in [`SECTOR_SIZE`] units, rounded up.
    pub kernel_sectors: u16,
}

impl KernelHeader {
    /// Header for a kernel of `kernel_len` bytes, or `None` if the sector
    /// count does not fit the 16-bit field.
    #[must_use]
    pub const fn for_kernel(kernel_len: usize) -> Option<Self> {
        match sector_count(kernel_len) {
            Some(kernel_sectors) => Some(Self { kernel_sectors }),
            None => None,
        }
    }

    #[must_use]
    pub const fn encode(self) -> [u8; HEADER_LEN] {
        let [lo, hi] = self.kernel_sectors.to_le_bytes();
        [IMAGE_MAGIC[0], IMAGE_MAGIC[1], lo, hi]
    }

    /// Bytes the loader will read for the kernel.
    #[inline]
    #[must_use]
    pub const fn kernel_bytes(self) -> usize {
        self.kernel_sectors as usize * SECTOR_SIZE
    }
}

/// Number of sectors covering `len` bytes.
#[inline]
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn sector_count(len: usize) -> Option<u16> {
    let sectors = len.div_ceil(SECTOR_SIZE);
    if sectors > u16::MAX as usize {
        None
    } else {
        Some(sectors as u16)
    }
}

const _: () = assert!(IMAGE_SIZE % SECTOR_SIZE == 0);
