//! # Address Space (x86-64, level-4 rooted)
//!
//! Helpers to walk and extend the single kernel address space rooted at the
//! loader's level-4 table.
//!
//! ## Highlights
//!
//! - [`AddressSpace::map_virtual_page`] installs one 4 KiB mapping, creating
//!   missing intermediate tables on the way down.
//! - [`AddressSpace::translate`] resolves a VA the way the CPU does.
//! - [`AddressSpace::missing_tables`] predicts how many table frames a
//!   contiguous mapping will consume.
//!
//! ## Design
//!
//! - Non-leaf links and leaves are created with `present` and `read_write`
//!   only. US/GLOBAL/XD are never set.
//! - Entries are updated from their current value, so CPU-managed bits
//!   (`accessed`, `dirty`) are never cleared.
//! - Keeps `unsafe` confined to turning a physical frame into a typed table
//!   through the [`PhysMapper`].
//!
//! ## Safety
//!
//! - Only previously non-present leaves are written; no TLB maintenance is
//!   needed for that.
//! - The provided `PhysMapper` must yield **writable** references to table frames.

use crate::{FrameAlloc, PageTable, PhysMapper, TableLevel, get_table};
use kernel_info::memory::PAGE_SIZE;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use log::{debug, trace};
use thiserror::Error;

/// Errors returned by [`AddressSpace::map_virtual_page`].
#[derive(Debug, Error, Copy, Clone, Eq, PartialEq)]
pub enum MapError {
    #[error("virtual address {0} is not page aligned")]
    UnalignedVirtual(VirtualAddress),
    #[error("physical address {0} is not page aligned")]
    UnalignedPhysical(PhysicalAddress),
    #[error("no frame available for a new {0:?} table")]
    NoTableFrame(TableLevel),
    #[error("{0:?} entry maps a large page")]
    LargePage(TableLevel),
}

/// Handle to the kernel's address space.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AddressSpace {
    root: PhysicalAddress,
}

impl AddressSpace {
    /// Wrap an existing level-4 table at `root` (4 KiB aligned).
    #[inline]
    #[must_use]
    pub const fn from_root(root: PhysicalAddress) -> Self {
        Self { root }
    }

    /// Physical address of the level-4 table.
    #[inline]
    #[must_use]
    pub const fn root(&self) -> PhysicalAddress {
        self.root
    }

    /// Map the 4 KiB page at `va` to the frame at `pa`.
    ///
    /// Missing level-4/pointer/directory links are backed by frames from
    /// `ctx`, zeroed through the mapper and linked with `present | read_write`.
    /// The leaf receives `present | read_write` and the frame address.
    ///
    /// # Errors
    /// - [`MapError::UnalignedVirtual`] / [`MapError::UnalignedPhysical`] for
    ///   unaligned inputs; nothing is touched.
    /// - [`MapError::NoTableFrame`] if `ctx` cannot provide a table frame.
    ///   Links created before the failure stay in place.
    /// - [`MapError::LargePage`] if the walk hits a large-page entry.
    pub fn map_virtual_page<A>(
        &self,
        ctx: &mut A,
        va: VirtualAddress,
        pa: PhysicalAddress,
    ) -> Result<(), MapError>
    where
        A: FrameAlloc + PhysMapper,
    {
        if !va.is_page_aligned() {
            return Err(MapError::UnalignedVirtual(va));
        }
        if !pa.is_page_aligned() {
            return Err(MapError::UnalignedPhysical(pa));
        }

        let mut table_pa = self.root;
        for level in TableLevel::NON_LEAF {
            table_pa = Self::ensure_next(ctx, table_pa, level, va)?;
        }

        let index = TableLevel::Table.index_of(va);
        let table = unsafe { get_table(&*ctx, table_pa) };
        table.set(index, table.get(index).linked_to(pa));
        trace!("mapped {va} -> {pa}");
        Ok(())
    }

    /// Follow the entry for `va` in the `level` table at `table_pa`, creating
    /// the next table if it is missing.
    fn ensure_next<A>(
        ctx: &mut A,
        table_pa: PhysicalAddress,
        level: TableLevel,
        va: VirtualAddress,
    ) -> Result<PhysicalAddress, MapError>
    where
        A: FrameAlloc + PhysMapper,
    {
        let index = level.index_of(va);
        let entry = unsafe { get_table(&*ctx, table_pa) }.get(index);
        if level != TableLevel::Level4 && entry.present() && entry.page_size_or_pat() {
            return Err(MapError::LargePage(level));
        }
        if let Some(next) = entry.present_frame() {
            return Ok(next);
        }

        let child = level.child().unwrap_or(TableLevel::Table);
        let frame = ctx.alloc_4k().ok_or(MapError::NoTableFrame(child))?;
        unsafe { get_table(&*ctx, frame) }.zero();

        // A frame allocator that maps pages itself may have linked this entry
        // in the meantime.
        let table = unsafe { get_table(&*ctx, table_pa) };
        let current = table.get(index);
        if let Some(next) = current.present_frame() {
            debug!("{level:?} entry for {va} appeared during allocation; frame {frame} unused");
            return Ok(next);
        }

        table.set(index, current.linked_to(frame));
        debug!("new {child:?} table at {frame} for {va}");
        Ok(frame)
    }

    /// Translate a `VirtualAddress` to `PhysicalAddress` if mapped.
    ///
    /// Large pages are not used by the kernel and resolve to `None`.
    #[must_use]
    pub fn translate<M>(&self, mapper: &M, va: VirtualAddress) -> Option<PhysicalAddress>
    where
        M: PhysMapper,
    {
        let leaf = self.leaf_table(mapper, va)?;
        let frame = leaf.get(TableLevel::Table.index_of(va)).present_frame()?;
        frame.checked_add(va.page_offset())
    }

    /// Whether the page containing `va` has a present leaf entry.
    #[inline]
    #[must_use]
    pub fn is_mapped<M: PhysMapper>(&self, mapper: &M, va: VirtualAddress) -> bool {
        self.translate(mapper, va).is_some()
    }

    /// Number of table frames [`map_virtual_page`](Self::map_virtual_page)
    /// would allocate to map `pages` pages starting at `start`.
    #[must_use]
    pub fn missing_tables<M>(&self, mapper: &M, start: VirtualAddress, pages: u64) -> u64
    where
        M: PhysMapper,
    {
        if pages == 0 {
            return 0;
        }

        let span = TableLevel::Directory.entry_span();
        let first = start.align_down().as_u64();
        let last = first.saturating_add((pages - 1).saturating_mul(PAGE_SIZE));

        let mut missing = 0;
        let mut new_pointer_table = None;
        let mut new_directory = None;
        let mut cursor = first & !(span - 1);
        loop {
            let va = VirtualAddress::new(cursor);
            let l4 = TableLevel::Level4.index_of(va);
            let l3 = TableLevel::PointerTable.index_of(va);
            let depth = self.resolved_depth(mapper, va);

            if depth == 0 && new_pointer_table != Some(l4) {
                missing += 1;
                new_pointer_table = Some(l4);
            }
            if depth <= 1 && new_directory != Some((l4, l3)) {
                missing += 1;
                new_directory = Some((l4, l3));
            }
            if depth <= 2 {
                missing += 1;
            }

            match cursor.checked_add(span) {
                Some(next) if next <= last => cursor = next,
                _ => break,
            }
        }
        missing
    }

    /// How many non-leaf levels of the walk for `va` are present (0..=3).
    fn resolved_depth<M: PhysMapper>(&self, mapper: &M, va: VirtualAddress) -> usize {
        let mut table_pa = self.root;
        for (depth, level) in TableLevel::NON_LEAF.into_iter().enumerate() {
            let entry = unsafe { get_table(mapper, table_pa) }.get(level.index_of(va));
            match entry.present_frame() {
                Some(next) => table_pa = next,
                None => return depth,
            }
        }
        TableLevel::NON_LEAF.len()
    }

    fn leaf_table<'a, M>(&self, mapper: &M, va: VirtualAddress) -> Option<&'a mut PageTable>
    where
        M: PhysMapper,
    {
        let mut table_pa = self.root;
        for level in TableLevel::NON_LEAF {
            let entry = unsafe { get_table(mapper, table_pa) }.get(level.index_of(va));
            if level != TableLevel::Level4 && entry.present() && entry.page_size_or_pat() {
                return None;
            }
            table_pa = entry.present_frame()?;
        }
        Some(unsafe { get_table(mapper, table_pa) })
    }
}
