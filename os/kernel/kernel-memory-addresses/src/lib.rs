//! # Virtual and Physical Memory Address Types
//!
//! Strongly typed wrappers for raw memory addresses used by the memory-map
//! parser, the region trackers and the page-table code.
//!
//! ## Overview
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`MemoryAddress`] | A raw 64-bit address, either physical or virtual. |
//! | [`VirtualAddress`] | An address translated by the paging hierarchy. |
//! | [`PhysicalAddress`] | An address on the physical bus (RAM or MMIO). |
//!
//! The kernel maps memory exclusively with 4 KiB pages, so all page
//! arithmetic in this crate is fixed to [`PAGE_SIZE`].
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let pa = PhysicalAddress::new(0x0010_0010);
//! assert_eq!(pa.page_offset(), 0x10);
//! assert_eq!(pa.align_up(), Some(PhysicalAddress::new(0x0010_1000)));
//! assert_eq!(pa.align_down().as_u64(), 0x0010_0000);
//!
//! let va = VirtualAddress::new(0x0020_0000);
//! assert!(va.is_page_aligned());
//! assert_eq!(va.checked_add(PAGE_SIZE), Some(VirtualAddress::new(0x0020_1000)));
//! ```
//!
//! ## Design Notes
//!
//! - The types are `#[repr(transparent)]` and implement `Copy`, `Eq`, `Ord`, and
//!   `Hash`.
//! - Arithmetic that may overflow is exposed as `checked_*`; memory map
//!   descriptors come from firmware and are not trusted.

#![cfg_attr(not(any(test, doctest)), no_std)]

mod memory_address;
mod physical_address;
mod virtual_address;

pub use memory_address::MemoryAddress;
pub use physical_address::PhysicalAddress;
pub use virtual_address::VirtualAddress;

/// Size of a base page in bytes.
pub const PAGE_SIZE: u64 = 4096;

/// `log2(PAGE_SIZE)`, i.e. the number of in-page offset bits.
pub const PAGE_SHIFT: u32 = 12;

const _: () = assert!(1 << PAGE_SHIFT == PAGE_SIZE);

/// Number of whole pages needed to hold `bytes`.
///
/// Returns `None` if rounding up overflows.
#[inline]
#[must_use]
pub const fn pages_for(bytes: u64) -> Option<u64> {
    match bytes.checked_add(PAGE_SIZE - 1) {
        Some(v) => Some(v >> PAGE_SHIFT),
        None => None,
    }
}
