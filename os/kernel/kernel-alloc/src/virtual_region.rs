//! # Virtual Region Tracker
//!
//! Partitions the kernel's virtual window into free and allocated regions.
//! The free list is kept in address order and never holds two adjacent
//! regions; the allocated list is kept in allocation order. Together they
//! tile the window exactly.

use crate::VIRTUAL_REGION_SLOTS;
use crate::arena::{Arena, List, NodeId};
use crate::error::MemoryError;
use kernel_memory_addresses::VirtualAddress;
use log::debug;

/// A contiguous range of kernel virtual addresses.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct VirtualRegion {
    pub base: VirtualAddress,
    pub size: u64,
}

impl VirtualRegion {
    #[inline]
    #[must_use]
    pub const fn new(base: VirtualAddress, size: u64) -> Self {
        Self { base, size }
    }

    #[inline]
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.base.as_u64().saturating_add(self.size)
    }

    #[inline]
    #[must_use]
    pub const fn contains(&self, va: VirtualAddress) -> bool {
        self.base.as_u64() <= va.as_u64() && va.as_u64() < self.end()
    }
}

/// Free and allocated regions of one virtual window, sharing an arena of `N`
/// nodes.
pub struct VirtualRegions<const N: usize = VIRTUAL_REGION_SLOTS> {
    arena: Arena<VirtualRegion, N>,
    free: List,
    allocated: List,
    window: VirtualRegion,
}

impl<const N: usize> VirtualRegions<N> {
    /// Tracker for `[start, start + span)`; nothing is free until [`open`](Self::open).
    #[must_use]
    pub const fn new(start: VirtualAddress, span: u64) -> Self {
        Self {
            arena: Arena::new(),
            free: List::new(),
            allocated: List::new(),
            window: VirtualRegion::new(start, span),
        }
    }

    #[inline]
    #[must_use]
    pub const fn window(&self) -> VirtualRegion {
        self.window
    }

    /// Make the whole window a single free region.
    ///
    /// # Errors
    /// [`MemoryError::TrackingExhausted`] if the arena has no slot at all.
    pub fn open(&mut self) -> Result<(), MemoryError> {
        let id = self.arena.insert(self.window).ok_or(MemoryError::TrackingExhausted)?;
        self.arena.push_back(&mut self.free, id);
        Ok(())
    }

    /// First free region, in address order, that holds `size` bytes.
    #[must_use]
    pub fn find_suitable(&self, size: u64) -> Option<NodeId> {
        self.arena.find(&self.free, |r| r.size >= size)
    }

    /// Whether [`carve`](Self::carve) can take `size` bytes from the free
    /// region `id` without running out of nodes.
    #[must_use]
    pub fn can_carve(&self, id: NodeId, size: u64) -> bool {
        self.arena[id].size == size || self.arena.available() > 0
    }

    /// Split `size` bytes off the front of the free region `id` and append
    /// them to the allocated list.
    ///
    /// An exact fit moves the node itself; otherwise a new node is created
    /// and the free region shrinks from its low end.
    pub fn carve(&mut self, id: NodeId, size: u64) -> Option<NodeId> {
        let source = self.arena[id];
        debug_assert!(source.size >= size);

        let allocated = if source.size == size {
            self.arena.unlink(&mut self.free, id);
            id
        } else {
            let allocated = self.arena.insert(VirtualRegion::new(source.base, size))?;
            let rest = &mut self.arena[id];
            rest.base = VirtualAddress::new(source.base.as_u64() + size);
            rest.size -= size;
            allocated
        };
        self.arena.push_back(&mut self.allocated, allocated);
        Some(allocated)
    }

    /// First-fit allocation of `size` bytes (already page-rounded).
    ///
    /// # Errors
    /// - [`MemoryError::OutOfVirtualAddressSpace`] if no free region is large enough.
    /// - [`MemoryError::TrackingExhausted`] if a split needs a node and none is left.
    pub fn allocate(&mut self, size: u64) -> Result<VirtualRegion, MemoryError> {
        let id = self
            .find_suitable(size)
            .ok_or(MemoryError::OutOfVirtualAddressSpace { requested: size })?;
        if !self.can_carve(id, size) {
            return Err(MemoryError::TrackingExhausted);
        }
        let allocated = self.carve(id, size).ok_or(MemoryError::TrackingExhausted)?;
        Ok(self.arena[allocated])
    }

    /// Return the allocated region containing `va` to the free list and merge
    /// it with adjacent free regions.
    ///
    /// # Errors
    /// [`MemoryError::UnknownAllocation`] if no allocated region contains `va`.
    pub fn release(&mut self, va: VirtualAddress) -> Result<VirtualRegion, MemoryError> {
        let id = self
            .arena
            .find(&self.allocated, |r| r.contains(va))
            .ok_or(MemoryError::UnknownAllocation(va))?;
        let region = self.arena[id];
        self.arena.unlink(&mut self.allocated, id);

        match self.arena.find(&self.free, |r| r.base > region.base) {
            Some(after) => self.arena.insert_before(&mut self.free, after, id),
            None => self.arena.push_back(&mut self.free, id),
        }
        self.coalesce(id);
        debug!("released {} bytes at {}", region.size, region.base);
        Ok(region)
    }

    fn coalesce(&mut self, id: NodeId) {
        if let Some(next) = self.arena.next(id)
            && self.arena[id].end() == self.arena[next].base.as_u64()
        {
            self.arena[id].size += self.arena[next].size;
            self.arena.unlink(&mut self.free, next);
            self.arena.remove(next);
        }

        if let Some(prev) = self.arena.prev(id)
            && self.arena[prev].end() == self.arena[id].base.as_u64()
        {
            self.arena[prev].size += self.arena[id].size;
            self.arena.unlink(&mut self.free, id);
            self.arena.remove(id);
        }
    }

    #[must_use]
    pub fn region(&self, id: NodeId) -> Option<VirtualRegion> {
        self.arena.get(id).copied()
    }

    pub fn free_regions(&self) -> impl Iterator<Item = VirtualRegion> + '_ {
        self.arena.iter(&self.free).map(|(_, r)| *r)
    }

    pub fn allocated_regions(&self) -> impl Iterator<Item = VirtualRegion> + '_ {
        self.arena.iter(&self.allocated).map(|(_, r)| *r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const START: u64 = 0x10_0000;
    const SPAN: u64 = 0x10_0000;

    fn va(v: u64) -> VirtualAddress {
        VirtualAddress::new(v)
    }

    fn opened<const N: usize>() -> VirtualRegions<N> {
        let mut regions = VirtualRegions::<N>::new(va(START), SPAN);
        regions.open().unwrap();
        regions
    }

    fn assert_tiles_window<const N: usize>(regions: &VirtualRegions<N>) {
        let mut all: Vec<_> = regions.free_regions().chain(regions.allocated_regions()).collect();
        all.sort_by_key(|r| r.base);
        let mut cursor = regions.window().base.as_u64();
        for r in &all {
            assert_eq!(r.base.as_u64(), cursor, "gap or overlap at {r:?}");
            cursor = r.end();
        }
        assert_eq!(cursor, regions.window().end());
    }

    #[test]
    fn carving_from_the_front() {
        let mut regions = opened::<8>();
        let a = regions.allocate(0x1000).unwrap();
        let b = regions.allocate(0x3000).unwrap();
        assert_eq!(a, VirtualRegion::new(va(START), 0x1000));
        assert_eq!(b, VirtualRegion::new(va(START + 0x1000), 0x3000));
        assert_eq!(
            regions.free_regions().collect::<Vec<_>>(),
            [VirtualRegion::new(va(START + 0x4000), SPAN - 0x4000)]
        );
        assert_tiles_window(&regions);
    }

    #[test]
    fn exact_fit_moves_the_node() {
        let mut regions = opened::<1>();
        let all = regions.allocate(SPAN).unwrap();
        assert_eq!(all, regions.window());
        assert_eq!(regions.free_regions().count(), 0);
        assert_eq!(
            regions.allocate(0x1000),
            Err(MemoryError::OutOfVirtualAddressSpace { requested: 0x1000 })
        );
    }

    #[test]
    fn split_without_a_slot_is_refused() {
        let mut regions = opened::<1>();
        assert_eq!(regions.allocate(0x1000), Err(MemoryError::TrackingExhausted));
        assert_eq!(
            regions.free_regions().collect::<Vec<_>>(),
            [regions.window()]
        );
    }

    #[test]
    fn release_restores_shape() {
        let mut regions = opened::<8>();
        let before: Vec<_> = regions.free_regions().collect();
        let a = regions.allocate(0x2000).unwrap();
        assert_eq!(regions.release(a.base).unwrap(), a);
        assert_eq!(regions.free_regions().collect::<Vec<_>>(), before);
        assert_eq!(regions.allocated_regions().count(), 0);
    }

    #[test]
    fn release_coalesces_both_neighbours() {
        let mut regions = opened::<8>();
        let a = regions.allocate(0x1000).unwrap();
        let b = regions.allocate(0x1000).unwrap();
        let c = regions.allocate(0x1000).unwrap();
        let _d = regions.allocate(0x1000).unwrap();

        regions.release(a.base).unwrap();
        regions.release(c.base).unwrap();
        assert_eq!(regions.free_regions().count(), 3);

        // interior address of b
        regions.release(VirtualAddress::new(b.base.as_u64() + 0x10)).unwrap();
        assert_eq!(
            regions.free_regions().collect::<Vec<_>>(),
            [
                VirtualRegion::new(va(START), 0x3000),
                VirtualRegion::new(va(START + 0x4000), SPAN - 0x4000),
            ]
        );
        assert_tiles_window(&regions);
    }

    #[test]
    fn freed_range_is_reused_first_fit() {
        let mut regions = opened::<8>();
        let a = regions.allocate(0x2000).unwrap();
        let _b = regions.allocate(0x1000).unwrap();
        regions.release(a.base).unwrap();

        let c = regions.allocate(0x1000).unwrap();
        assert_eq!(c.base, a.base);
        let d = regions.allocate(0x2000).unwrap();
        assert_eq!(d.base, va(START + 0x3000));
        assert_tiles_window(&regions);
    }

    #[test]
    fn unknown_addresses_are_rejected() {
        let mut regions = opened::<8>();
        let a = regions.allocate(0x1000).unwrap();
        assert_eq!(
            regions.release(va(START + 0x1000)),
            Err(MemoryError::UnknownAllocation(va(START + 0x1000)))
        );
        regions.release(a.base).unwrap();
        assert_eq!(
            regions.release(a.base),
            Err(MemoryError::UnknownAllocation(a.base))
        );
    }

    #[test]
    fn allocations_never_overlap() {
        let mut regions = opened::<32>();
        let mut live = Vec::new();
        for (i, pages) in [1u64, 3, 2, 5, 1, 4].into_iter().enumerate() {
            live.push(regions.allocate(pages * 0x1000).unwrap());
            if i % 2 == 1 {
                let gone = live.remove(0);
                regions.release(gone.base).unwrap();
            }
        }
        for (i, a) in live.iter().enumerate() {
            for b in &live[i + 1..] {
                assert!(a.end() <= b.base.as_u64() || b.end() <= a.base.as_u64());
            }
        }
        assert_tiles_window(&regions);
    }
}
