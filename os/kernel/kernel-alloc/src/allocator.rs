//! # Bootstrap Allocator
//!
//! Page-granular, first-fit allocation over the virtual window. Every byte
//! of a returned range is mapped before `allocate` returns: pages that have
//! never been backed get a fresh physical frame and a leaf entry, pages that
//! were backed by an earlier allocation keep their frame.
//!
//! All failure modes that a caller can handle are detected up front, so a
//! returned error leaves every list exactly as it was.

use crate::error::MemoryError;
use crate::fatal;
use crate::manager::{BootstrapState, MemoryManager};
use kernel_info::memory::PAGE_SIZE;
use kernel_memory_addresses::{VirtualAddress, pages_for};
use kernel_vmem::PhysMapper;
use log::debug;

impl<M: PhysMapper> MemoryManager<M> {
    /// Allocate at least `bytes` bytes of mapped kernel memory.
    ///
    /// The size is rounded up to whole pages. The returned address is page
    /// aligned and the memory is not zeroed.
    ///
    /// # Errors
    /// - [`MemoryError::ZeroSizedAllocation`] for `bytes == 0`.
    /// - [`MemoryError::NotInitialized`] before `init`.
    /// - [`MemoryError::OutOfVirtualAddressSpace`] if no free region fits.
    /// - [`MemoryError::OutOfPhysicalMemory`] if the frames for unbacked pages
    ///   and the page tables they need are not available.
    /// - [`MemoryError::TrackingExhausted`] if a tracking arena is full.
    pub fn allocate(&mut self, bytes: u64) -> Result<VirtualAddress, MemoryError> {
        if bytes == 0 {
            return Err(MemoryError::ZeroSizedAllocation);
        }
        if self.state() == BootstrapState::Uninitialized {
            return Err(MemoryError::NotInitialized);
        }

        let pages =
            pages_for(bytes).ok_or(MemoryError::OutOfVirtualAddressSpace { requested: bytes })?;
        let size = pages * PAGE_SIZE;
        let region = self
            .virtual_regions
            .find_suitable(size)
            .ok_or(MemoryError::OutOfVirtualAddressSpace { requested: size })?;
        let base = self
            .virtual_regions
            .region(region)
            .ok_or(MemoryError::OutOfVirtualAddressSpace { requested: size })?
            .base;

        let mut unbacked = 0;
        let mut stretches = 0;
        let mut previous_backed = true;
        for page in 0..pages {
            let backed = self.mapped.by_virtual(page_at(base, page)).is_some();
            if !backed {
                unbacked += 1;
                if previous_backed {
                    stretches += 1;
                }
            }
            previous_backed = backed;
        }

        let tables = self
            .address_space()
            .map_or(0, |space| space.missing_tables(&*self, base, pages));
        let frames = unbacked + tables;
        if !self.physical.can_take_pages(frames) {
            return Err(MemoryError::OutOfPhysicalMemory { pages: frames });
        }

        // upper bound on new ledger runs, see `MAPPED_RUN_SLOTS`
        let free_regions = self.physical.free_regions().count() as u64;
        let runs = (stretches + tables + free_regions).min(unbacked);
        if (self.mapped.available() as u64) < runs {
            return Err(MemoryError::TrackingExhausted);
        }
        if !self.virtual_regions.can_carve(region, size) {
            return Err(MemoryError::TrackingExhausted);
        }

        self.virtual_regions
            .carve(region, size)
            .ok_or(MemoryError::TrackingExhausted)?;
        for page in 0..pages {
            let va = page_at(base, page);
            if self.mapped.by_virtual(va).is_none() {
                self.back_page(va);
            }
        }

        debug!("allocated {size} bytes at {base} ({unbacked} new pages, {tables} tables)");
        Ok(base)
    }

    /// Give a fresh frame to the unbacked page at `va` and map it.
    fn back_page(&mut self, va: VirtualAddress) {
        let Some((frame, owner)) = self.physical.take_page() else {
            fatal::halt(&MemoryError::OutOfPhysicalMemory { pages: 1 });
        };
        if let Err(err) = self.mapped.record(frame, va, owner) {
            fatal::halt(&err);
        }
        self.install(va, frame);
    }

    /// Return the allocation containing `va` to the free list.
    ///
    /// Any address inside the allocation identifies it. The pages stay
    /// mapped and are reused by later allocations of the same range.
    /// Returns the size of the released allocation in bytes.
    ///
    /// # Errors
    /// - [`MemoryError::NotInitialized`] before `init`.
    /// - [`MemoryError::UnknownAllocation`] if no live allocation contains `va`.
    pub fn free(&mut self, va: VirtualAddress) -> Result<u64, MemoryError> {
        if self.state() == BootstrapState::Uninitialized {
            return Err(MemoryError::NotInitialized);
        }
        let region = self.virtual_regions.release(va)?;
        Ok(region.size)
    }
}

#[inline]
const fn page_at(base: VirtualAddress, page: u64) -> VirtualAddress {
    VirtualAddress::new(base.as_u64() + page * PAGE_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_map::{MemoryKind, MemoryMapEntry};
    use crate::physical::PhysicalRegion;
    use crate::testing::{self, SimulatedRam};
    use crate::virtual_region::VirtualRegion;
    use kernel_info::memory::{VIRTUAL_MEMORY_SPAN, VIRTUAL_MEMORY_START};
    use kernel_memory_addresses::PhysicalAddress;

    const START: u64 = VIRTUAL_MEMORY_START;

    fn usable(base: u64, len: u64) -> MemoryMapEntry {
        MemoryMapEntry::new(PhysicalAddress::new(base), len, MemoryKind::Usable)
    }

    fn ready<'r>(
        ram: &'r SimulatedRam,
        entries: &[MemoryMapEntry],
    ) -> MemoryManager<&'r SimulatedRam> {
        let boot = testing::boot(ram, entries);
        let mut mm = MemoryManager::new(ram);
        unsafe { mm.init(&boot) }.unwrap();
        mm
    }

    fn snapshot(
        mm: &MemoryManager<&SimulatedRam>,
    ) -> (Vec<PhysicalRegion>, Vec<PhysicalRegion>, Vec<VirtualRegion>, Vec<VirtualRegion>) {
        (
            mm.physical_regions().free_regions().collect(),
            mm.physical_regions().used_regions().collect(),
            mm.virtual_regions().free_regions().collect(),
            mm.virtual_regions().allocated_regions().collect(),
        )
    }

    #[test]
    fn allocate_before_init() {
        let ram = SimulatedRam::new();
        let mut mm = MemoryManager::new(&ram);
        assert_eq!(mm.allocate(1), Err(MemoryError::NotInitialized));
        assert_eq!(mm.free(VirtualAddress::new(START)), Err(MemoryError::NotInitialized));
    }

    #[test]
    fn zero_sized_allocation() {
        let ram = SimulatedRam::new();
        let mut mm = ready(&ram, &[usable(0x10_0000, 0x2000)]);
        assert_eq!(mm.allocate(0), Err(MemoryError::ZeroSizedAllocation));
    }

    #[test]
    fn first_allocation_is_mapped_and_coalesced() {
        let ram = SimulatedRam::new();
        let mut mm = ready(&ram, &[usable(0x10_0000, 0x2000)]);

        let va = mm.allocate(1).unwrap();
        assert_eq!(va, VirtualAddress::new(START + 4096));
        assert_eq!(mm.translate(va), Some(PhysicalAddress::new(0x10_1000)));
        assert_eq!(
            mm.physical_regions().used_regions().collect::<Vec<_>>(),
            [PhysicalRegion::new(PhysicalAddress::new(0x10_0000), 0x2000)]
        );
        assert_eq!(mm.physical_regions().free_regions().count(), 0);
    }

    #[test]
    fn exhausted_physical_memory_changes_nothing() {
        let ram = SimulatedRam::new();
        let mut mm = ready(&ram, &[usable(0x10_0000, 0x2000)]);
        mm.allocate(1).unwrap();

        let before = snapshot(&mm);
        assert_eq!(mm.allocate(1), Err(MemoryError::OutOfPhysicalMemory { pages: 1 }));
        assert_eq!(snapshot(&mm), before);
    }

    #[test]
    fn every_page_of_an_allocation_is_mapped() {
        let ram = SimulatedRam::new();
        let mut mm = ready(&ram, &[usable(0x10_0000, 0x10_0000)]);

        let va = mm.allocate(3 * 4096 - 100).unwrap();
        for page in 0..3 {
            let at = VirtualAddress::new(va.as_u64() + page * 4096 + 7);
            let pa = mm.translate(at).unwrap();
            assert_eq!(pa.page_offset(), 7);
        }
        assert_eq!(mm.translate(VirtualAddress::new(va.as_u64() + 3 * 4096)), None);
        // bootstrap page and the three new ones back a single run
        assert_eq!(mm.mapped_pages().backed_pages(), 4);
        assert_eq!(mm.mapped_pages().len(), 1);
    }

    #[test]
    fn allocate_then_free_restores_the_free_list() {
        let ram = SimulatedRam::new();
        let mut mm = ready(&ram, &[usable(0x10_0000, 0x10_0000)]);

        let before: Vec<_> = mm.virtual_regions().free_regions().collect();
        let va = mm.allocate(5 * 4096).unwrap();
        assert_eq!(mm.free(va), Ok(5 * 4096));
        assert_eq!(mm.virtual_regions().free_regions().collect::<Vec<_>>(), before);
    }

    #[test]
    fn freed_pages_keep_their_frames() {
        let ram = SimulatedRam::new();
        let mut mm = ready(&ram, &[usable(0x10_0000, 0x10_0000)]);

        let va = mm.allocate(2 * 4096).unwrap();
        let frame = mm.translate(va).unwrap();
        let free_pages = mm.free_physical_pages();

        mm.free(VirtualAddress::new(va.as_u64() + 4096 + 12)).unwrap();
        assert_eq!(mm.translate(va), Some(frame));

        let again = mm.allocate(4096).unwrap();
        assert_eq!(again, va);
        assert_eq!(mm.free_physical_pages(), free_pages);
        assert_eq!(mm.translate(again), Some(frame));
    }

    #[test]
    fn freeing_coalesces_neighbours() {
        let ram = SimulatedRam::new();
        let mut mm = ready(&ram, &[usable(0x10_0000, 0x10_0000)]);

        let a = mm.allocate(4096).unwrap();
        let b = mm.allocate(4096).unwrap();
        let c = mm.allocate(4096).unwrap();
        mm.free(a).unwrap();
        mm.free(c).unwrap();
        mm.free(b).unwrap();

        assert_eq!(
            mm.virtual_regions().free_regions().collect::<Vec<_>>(),
            [VirtualRegion::new(VirtualAddress::new(START + 4096), VIRTUAL_MEMORY_SPAN - 4096)]
        );
        assert_eq!(mm.free(b), Err(MemoryError::UnknownAllocation(b)));
    }

    #[test]
    fn live_allocations_never_overlap() {
        let ram = SimulatedRam::new();
        let mut mm = ready(&ram, &[usable(0x10_0000, 0x20_0000)]);

        let mut live = Vec::new();
        for (i, pages) in [2u64, 1, 4, 3, 1, 2].into_iter().enumerate() {
            let va = mm.allocate(pages * 4096).unwrap();
            live.push((va.as_u64(), va.as_u64() + pages * 4096));
            if i % 3 == 2 {
                let (gone, _) = live.remove(0);
                mm.free(VirtualAddress::new(gone)).unwrap();
            }
        }
        for (i, a) in live.iter().enumerate() {
            for b in &live[i + 1..] {
                assert!(a.1 <= b.0 || b.1 <= a.0, "{a:x?} overlaps {b:x?}");
            }
        }

        let (phys_free, phys_used, virt_free, virt_allocated) = snapshot(&mm);

        // free and allocated regions tile the window without gaps
        let mut tiles: Vec<_> = virt_free.iter().chain(&virt_allocated).copied().collect();
        tiles.sort_by_key(|r| r.base);
        let window = mm.window();
        assert_eq!(tiles.first().map(|r| r.base), Some(window.base));
        assert_eq!(tiles.last().map(VirtualRegion::end), Some(window.end()));
        for pair in tiles.windows(2) {
            assert_eq!(pair[0].end(), pair[1].base.as_u64(), "{pair:x?}");
        }

        // free and used physical regions never share a byte
        let mut ranges: Vec<_> = phys_free.iter().chain(&phys_used).copied().collect();
        ranges.sort_by_key(|r| r.base);
        for pair in ranges.windows(2) {
            assert!(pair[0].end() <= pair[1].base.as_u64(), "{pair:x?}");
        }

        // and no frame backs two live pages
        let mut frames = Vec::new();
        for &(start, end) in &live {
            for page in (start..end).step_by(4096) {
                frames.push(mm.translate(VirtualAddress::new(page)).unwrap());
            }
        }
        let count = frames.len();
        frames.sort();
        frames.dedup();
        assert_eq!(frames.len(), count);
    }

    #[test]
    fn pages_past_the_loader_leaf_table_are_reachable() {
        let ram = SimulatedRam::new();
        let mut mm = ready(&ram, &[usable(0x10_0000, 0x40_0000)]);

        // the first allocation crosses into 2 MiB..4 MiB and the third into
        // 4 MiB..6 MiB; both leaf tables are cut from memory above 1 MiB
        let mut live = Vec::new();
        for size in [0x10_0000, 0x10_0000, 0x10_0000] {
            let va = mm.allocate(size).unwrap();
            live.push((va.as_u64(), va.as_u64() + size));
        }

        for &(start, end) in &live {
            for (n, page) in (start..end).step_by(4096).enumerate() {
                let va = VirtualAddress::new(page + 8);
                ram.store(va, n as u64 ^ page);
                let pa = mm.translate(va).unwrap();
                assert_eq!(ram.resolve(va), Some(pa));
                assert_eq!(ram.read::<u64>(pa), n as u64 ^ page);
            }
        }
    }

    #[test]
    fn crossing_into_a_new_directory_entry_takes_one_table() {
        let ram = SimulatedRam::new();
        let mut mm = ready(&ram, &[usable(0x10_0000, 0x30_0000)]);
        let free_before = mm.free_physical_pages();

        // START + 4 KiB .. START + 1 MiB + 4 KiB crosses the 2 MiB boundary
        let va = mm.allocate(0x10_0000).unwrap();
        assert_eq!(va, VirtualAddress::new(START + 4096));
        assert_eq!(free_before - mm.free_physical_pages(), 256 + 1);
        assert_eq!(
            mm.translate(VirtualAddress::new(0x20_0000)),
            Some(PhysicalAddress::new(0x20_0000))
        );
    }

    #[test]
    fn table_frames_count_against_physical_memory() {
        let ram = SimulatedRam::new();
        // 255 spare pages: enough for the leaves up to 2 MiB, not for the
        // extra leaf plus its table
        let mut mm = ready(&ram, &[usable(0x10_0000, 0x10_0000)]);
        assert_eq!(mm.free_physical_pages(), 255);

        assert_eq!(
            mm.allocate(0x10_0000),
            Err(MemoryError::OutOfPhysicalMemory { pages: 257 })
        );
        assert!(mm.allocate(255 * 4096).is_ok());
        assert_eq!(mm.free_physical_pages(), 0);
    }

    #[test]
    fn physical_shortage_is_reported_before_tracking() {
        let ram = SimulatedRam::new();
        let mut mm = ready(&ram, &[usable(0x10_0000, 0x10_0000)]);
        assert_eq!(mm.free_physical_pages(), 255);

        let before = snapshot(&mm);
        // 3000 pages plus one leaf table for each 2 MiB span from 2 MiB to 14 MiB
        assert_eq!(
            mm.allocate(3000 * 4096),
            Err(MemoryError::OutOfPhysicalMemory { pages: 3006 })
        );
        assert_eq!(
            mm.allocate(300 * 4096),
            Err(MemoryError::OutOfPhysicalMemory { pages: 301 })
        );
        assert_eq!(snapshot(&mm), before);
    }

    #[test]
    fn backed_memory_is_not_capped_by_the_ledger() {
        let ram = SimulatedRam::new();
        let mut mm = ready(&ram, &[usable(0x10_0000, 0xF0_0000)]);

        let va = mm.allocate(3000 * 4096).unwrap();
        assert_eq!(mm.mapped_pages().backed_pages(), 3001);
        // each new leaf table splits the run once
        assert_eq!(mm.mapped_pages().len(), 7);

        let last = VirtualAddress::new(va.as_u64() + 2999 * 4096);
        ram.store(last, 0x77_u64);
        assert_eq!(ram.read::<u64>(mm.translate(last).unwrap()), 0x77);
    }

    #[test]
    fn small_window_runs_out_of_address_space() {
        let ram = SimulatedRam::new();
        let boot = testing::boot(&ram, &[usable(0x10_0000, 0x10_0000)]);
        let mut mm = MemoryManager::with_window(&ram, VirtualAddress::new(START), 4 * 4096);
        unsafe { mm.init(&boot) }.unwrap();

        let va = mm.allocate(3 * 4096).unwrap();
        assert_eq!(
            mm.allocate(1),
            Err(MemoryError::OutOfVirtualAddressSpace { requested: 4096 })
        );
        mm.free(va).unwrap();
        assert_eq!(
            mm.allocate(4 * 4096),
            Err(MemoryError::OutOfVirtualAddressSpace { requested: 4 * 4096 })
        );
        assert!(mm.allocate(3 * 4096).is_ok());
    }
}
