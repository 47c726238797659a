//! # Loader Page-Table Scaffold
//!
//! Before jumping to the kernel, the loader builds one table per level in a
//! single 16 KiB block and chains them through index 0:
//!
//! ```text
//! base + 0x0000  level-4       [0] ─┐
//! base + 0x1000  pointer table [0] ─┼─┐
//! base + 0x2000  directory     [0] ─┘ ├─┐
//! base + 0x3000  table    [0..256] ───┘ │  identity map of the first 1 MiB
//!                                       └─ entries 256.. free for the kernel
//! ```
//!
//! Entry 255 of the leaf table is taken over by the kernel as its scratch slot.
//!
//! The block's physical base is the `page_mapping_offset` of the boot record
//! and doubles as the root of the kernel's address space.

use crate::{PageTable, TableIndex};
use kernel_info::memory::{PAGE_SIZE, PAGE_TABLE_HIERARCHY_BYTES};
use kernel_memory_addresses::PhysicalAddress;

/// Four consecutive page tables as laid out by the loader.
#[repr(C)]
pub struct PageTableHierarchy {
    pub level_4: PageTable,
    pub pointer_table: PageTable,
    pub directory: PageTable,
    pub table: PageTable,
}

impl PageTableHierarchy {
    /// Offset of the pointer table from the block base.
    pub const POINTER_TABLE_OFFSET: u64 = PAGE_SIZE;
    /// Offset of the directory from the block base.
    pub const DIRECTORY_OFFSET: u64 = 2 * PAGE_SIZE;
    /// Offset of the leaf table from the block base.
    pub const TABLE_OFFSET: u64 = 3 * PAGE_SIZE;

    #[inline]
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            level_4: PageTable::zeroed(),
            pointer_table: PageTable::zeroed(),
            directory: PageTable::zeroed(),
            table: PageTable::zeroed(),
        }
    }

    /// The leaf table's physical address, if the block at `base` is chained
    /// through index 0 the way the loader leaves it.
    ///
    /// The leaf table resolves every virtual address below 2 MiB, including
    /// the identity-mapped megabyte.
    #[must_use]
    pub fn chained_leaf(&self, base: PhysicalAddress) -> Option<PhysicalAddress> {
        let zero = TableIndex::new(0);
        let at = |offset: u64| base.checked_add(offset);

        let links = [
            (&self.level_4, Self::POINTER_TABLE_OFFSET),
            (&self.pointer_table, Self::DIRECTORY_OFFSET),
            (&self.directory, Self::TABLE_OFFSET),
        ];
        for (table, next) in links {
            let entry = table.get(zero);
            if entry.page_size_or_pat() || entry.present_frame() != at(next) {
                return None;
            }
        }
        at(Self::TABLE_OFFSET)
    }
}

const _: () = {
    assert!(size_of::<PageTableHierarchy>() as u64 == PAGE_TABLE_HIERARCHY_BYTES);
    assert!(align_of::<PageTableHierarchy>() as u64 == PAGE_SIZE);
};
