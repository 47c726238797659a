//! # Virtual Memory Support
//!
//! Minimal x86-64 paging for the kernel's bootstrap allocator.
//!
//! ## What you get
//! - A bit-exact [`PageTableEntry`] shared by all four levels.
//! - A 4 KiB-aligned [`PageTable`] and index helpers ([`TableLevel`], [`split_indices`]).
//! - The loader's [`PageTableHierarchy`] scaffold.
//! - An [`AddressSpace`] that maps 4 KiB pages and translates addresses.
//! - A tiny allocator/mapper interface ([`FrameAlloc`], [`PhysMapper`]).
//!
//! ## x86-64 Virtual Address → Physical Address Walk
//!
//! Each 48-bit virtual address is divided into five fields:
//!
//! ```text
//! | 47‒39   | 38‒30         | 29‒21     | 20‒12 | 11‒0   |
//! | Level-4 | Pointer table | Directory | Table | Offset |
//! ```
//!
//! The CPU uses these fields as **indices** into four levels of page tables,
//! each level containing 512 (2⁹) entries of 8 bytes (64 bits) each.
//!
//! ```text
//!  Level-4 → Pointer table → Directory → Table → 4 KiB page
//! ```
//!
//! Only the table level holds leaves here; the kernel never creates 1 GiB or
//! 2 MiB mappings.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

pub mod address_space;
mod hierarchy;
mod page_entry_bits;
mod page_table;

pub use crate::address_space::{AddressSpace, MapError};
pub use crate::hierarchy::PageTableHierarchy;
pub use crate::page_entry_bits::PageTableEntry;
pub use crate::page_table::{PageTable, TableIndex, TableIndices, TableLevel, split_indices};
use kernel_memory_addresses::PhysicalAddress;

/// Source of **physical** 4 KiB frames for new page tables.
///
/// The implementation decides where frames come from. Returned frames
/// **must** be 4 KiB aligned and reachable through the implementor's
/// [`PhysMapper`]; they do not need to be zeroed.
///
/// Returns `None` on out-of-memory.
pub trait FrameAlloc {
    /// Allocate one 4 KiB *physical* frame for a page table.
    fn alloc_4k(&mut self) -> Option<PhysicalAddress>;
}

/// Converts physical addresses to usable references in the current virtual
/// address space (identity map, a scratch window, or simulated RAM in tests).
///
/// A mapper that reaches frames through a shared window only keeps the
/// reference from its most recent call valid. [`AddressSpace`] never holds a
/// table across a second call.
pub trait PhysMapper {
    /// Convert a *physical* address to a mutable reference.
    ///
    /// # Safety
    /// - `pa` must be mapped writable in the current address space until the
    ///   reference is last used.
    /// - Type `T` must match the bytes at `pa`, and no other live reference
    ///   may alias them.
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T;
}

/// Borrow the page table stored in the frame at `phys`.
///
/// # Safety
/// - `phys` must point to a valid 4 KiB page containing a page table.
/// - The mapping must be writable for mut access.
#[inline]
pub(crate) unsafe fn get_table<'a, M>(m: &M, phys: PhysicalAddress) -> &'a mut PageTable
where
    M: PhysMapper,
{
    unsafe { m.phys_to_mut::<PageTable>(phys) }
}
