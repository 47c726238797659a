//! # Memory Page Table

use crate::PageTableEntry;
use kernel_info::memory::PAGE_TABLE_ENTRY_COUNT;
use kernel_memory_addresses::VirtualAddress;

/// One of the four levels of the x86-64 paging hierarchy.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TableLevel {
    /// Root table, indexed by VA bits `[47:39]`.
    Level4,
    /// Indexed by VA bits `[38:30]`.
    PointerTable,
    /// Indexed by VA bits `[29:21]`.
    Directory,
    /// Leaf table, indexed by VA bits `[20:12]`.
    Table,
}

impl TableLevel {
    /// Levels whose entries link to another table, walked in order.
    pub const NON_LEAF: [Self; 3] = [Self::Level4, Self::PointerTable, Self::Directory];

    /// Position of the lowest index bit within a virtual address.
    #[inline]
    #[must_use]
    pub const fn shift(self) -> u32 {
        match self {
            Self::Level4 => 39,
            Self::PointerTable => 30,
            Self::Directory => 21,
            Self::Table => 12,
        }
    }

    /// Bytes of virtual address space covered by one entry at this level.
    #[inline]
    #[must_use]
    pub const fn entry_span(self) -> u64 {
        1 << self.shift()
    }

    /// The level an entry of this level points to.
    #[inline]
    #[must_use]
    pub const fn child(self) -> Option<Self> {
        match self {
            Self::Level4 => Some(Self::PointerTable),
            Self::PointerTable => Some(Self::Directory),
            Self::Directory => Some(Self::Table),
            Self::Table => None,
        }
    }

    /// Index into this level's table for `va`.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn index_of(self, va: VirtualAddress) -> TableIndex {
        TableIndex::new(((va.as_u64() >> self.shift()) & 0x1FF) as u16)
    }
}

/// Index into a 512-entry page table.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TableIndex(u16);

impl TableIndex {
    /// Construct an index from a raw `u16`.
    ///
    /// ### Panics / Debug assertions
    /// - Debug builds assert `v < 512`.
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Self {
        debug_assert!((v as usize) < PAGE_TABLE_ENTRY_COUNT);
        Self(v)
    }

    /// Return the index as `usize` for array indexing.
    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// The four table indices of a virtual address, root first.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TableIndices {
    pub level_4: TableIndex,
    pub pointer_table: TableIndex,
    pub directory: TableIndex,
    pub table: TableIndex,
}

#[inline]
#[must_use]
pub const fn split_indices(va: VirtualAddress) -> TableIndices {
    TableIndices {
        level_4: TableLevel::Level4.index_of(va),
        pointer_table: TableLevel::PointerTable.index_of(va),
        directory: TableLevel::Directory.index_of(va),
        table: TableLevel::Table.index_of(va),
    }
}

/// A single 4 KiB page table at any level.
///
/// Layout:
/// - 512 entries, 8 bytes each (4096 bytes total).
/// - 4 KiB aligned, as required by the hardware.
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PageTableEntry; PAGE_TABLE_ENTRY_COUNT],
}

impl PageTable {
    /// Create a fully zeroed (all entries non-present) table.
    #[inline]
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            entries: [PageTableEntry::zero(); PAGE_TABLE_ENTRY_COUNT],
        }
    }

    /// Clear every entry in place.
    #[inline]
    pub fn zero(&mut self) {
        self.entries.fill(PageTableEntry::zero());
    }

    /// Read the entry at the given index.
    ///
    /// This is a plain fetch; it does not perform TLB synchronization.
    #[inline]
    #[must_use]
    pub const fn get(&self, i: TableIndex) -> PageTableEntry {
        self.entries[i.as_usize()]
    }

    /// Write the entry at the given index.
    ///
    /// Caller is responsible for any required TLB invalidation after modifying
    /// mappings that affect active address spaces.
    #[inline]
    pub const fn set(&mut self, i: TableIndex, e: PageTableEntry) {
        self.entries[i.as_usize()] = e;
    }

    /// Number of present entries.
    #[cfg(test)]
    #[must_use]
    pub fn present_count(&self) -> usize {
        self.entries.iter().filter(|e| e.present()).count()
    }
}

const _: () = {
    assert!(size_of::<PageTable>() == 4096);
    assert!(align_of::<PageTable>() == 4096);
};
