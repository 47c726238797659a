//! # Physical Region Tracker
//!
//! Two lists over one node arena: extents that are free to hand out and
//! extents already in use. Every region belongs to exactly one list and no
//! two tracked regions overlap.
//!
//! Pages are taken first-fit from the free list. A taken page is glued onto
//! the used region that ends right at it when there is one, so a run of
//! allocations from the same extent stays a single used node.

use crate::PHYSICAL_REGION_SLOTS;
use crate::arena::{Arena, List, NodeId};
use crate::error::MemoryError;
use kernel_info::memory::PAGE_SIZE;
use kernel_memory_addresses::PhysicalAddress;
use log::debug;

/// A contiguous physical extent.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PhysicalRegion {
    pub base: PhysicalAddress,
    pub len: u64,
}

impl PhysicalRegion {
    #[inline]
    #[must_use]
    pub const fn new(base: PhysicalAddress, len: u64) -> Self {
        Self { base, len }
    }

    /// One past the last byte (saturating).
    #[inline]
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.base.as_u64().saturating_add(self.len)
    }

    #[inline]
    #[must_use]
    pub const fn overlaps(&self, base: u64, len: u64) -> bool {
        let end = base.saturating_add(len);
        base < self.end() && self.base.as_u64() < end
    }
}

/// Free and used physical memory above the loader's megabyte.
///
/// Both lists share an arena of `N` nodes. A page moves from the front of a
/// free region to the used region that ends where it starts, so the used
/// list stays coalesced as long as frames are taken in order.
pub struct PhysicalRegions<const N: usize = PHYSICAL_REGION_SLOTS> {
    arena: Arena<PhysicalRegion, N>,
    free: List,
    used: List,
}

impl<const N: usize> PhysicalRegions<N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            arena: Arena::new(),
            free: List::new(),
            used: List::new(),
        }
    }

    /// Append `[base, base + len)` to the free list.
    ///
    /// # Errors
    /// - [`MemoryError::OverlappingRegion`] if any tracked region intersects it.
    /// - [`MemoryError::TrackingExhausted`] if the arena is full.
    pub fn add_free(&mut self, base: PhysicalAddress, len: u64) -> Result<NodeId, MemoryError> {
        let id = self.track(base, len)?;
        self.arena.push_back(&mut self.free, id);
        debug!("free physical region {base} ({len} bytes)");
        Ok(id)
    }

    /// Append `[base, base + len)` to the used list.
    ///
    /// # Errors
    /// Same as [`add_free`](Self::add_free).
    pub fn add_used(&mut self, base: PhysicalAddress, len: u64) -> Result<NodeId, MemoryError> {
        let id = self.track(base, len)?;
        self.arena.push_back(&mut self.used, id);
        debug!("used physical region {base} ({len} bytes)");
        Ok(id)
    }

    fn track(&mut self, base: PhysicalAddress, len: u64) -> Result<NodeId, MemoryError> {
        if self.overlaps_any(base, len) {
            return Err(MemoryError::OverlappingRegion);
        }
        self.arena
            .insert(PhysicalRegion::new(base, len))
            .ok_or(MemoryError::TrackingExhausted)
    }

    /// Whether `[base, base + len)` intersects any tracked region.
    #[must_use]
    pub fn overlaps_any(&self, base: PhysicalAddress, len: u64) -> bool {
        let base = base.as_u64();
        self.arena
            .iter(&self.free)
            .chain(self.arena.iter(&self.used))
            .any(|(_, r)| r.overlaps(base, len))
    }

    fn used_ending_at(&self, address: PhysicalAddress) -> Option<NodeId> {
        self.arena.find(&self.used, |r| r.end() == address.as_u64())
    }

    /// Move one page from the front of the first free region that holds one
    /// into the used list.
    ///
    /// Returns the page and the used region that now owns it, or `None` if no
    /// free region has a whole page left or a new used node is needed but the
    /// arena is full.
    pub fn take_page(&mut self) -> Option<(PhysicalAddress, NodeId)> {
        let source = self.arena.find(&self.free, |r| r.len >= PAGE_SIZE)?;
        let page = self.arena[source].base;

        let owner = if let Some(used) = self.used_ending_at(page) {
            self.arena[used].len += PAGE_SIZE;
            used
        } else if self.arena[source].len == PAGE_SIZE {
            self.arena.unlink(&mut self.free, source);
            self.arena.push_back(&mut self.used, source);
            return Some((page, source));
        } else {
            let id = self.arena.insert(PhysicalRegion::new(page, PAGE_SIZE))?;
            self.arena.push_back(&mut self.used, id);
            id
        };

        let region = &mut self.arena[source];
        region.len -= PAGE_SIZE;
        region.base = PhysicalAddress::new(region.base.as_u64() + PAGE_SIZE);
        if region.len == 0 {
            self.arena.unlink(&mut self.free, source);
            self.arena.remove(source);
        }
        Some((page, owner))
    }

    /// Whether `pages` consecutive [`take_page`](Self::take_page) calls would
    /// all succeed.
    #[must_use]
    pub fn can_take_pages(&self, pages: u64) -> bool {
        let mut needed = pages;
        let mut spare = self.arena.available();
        let mut last_end = None;

        for (_, region) in self.arena.iter(&self.free) {
            if needed == 0 {
                break;
            }
            let whole = region.len / PAGE_SIZE;
            if whole == 0 {
                continue;
            }

            let take = whole.min(needed);
            let extends = last_end == Some(region.base.as_u64())
                || self.used_ending_at(region.base).is_some();
            if extends {
                if take == whole && region.len % PAGE_SIZE == 0 {
                    spare += 1;
                }
            } else if region.len != PAGE_SIZE {
                if spare == 0 {
                    return false;
                }
                spare -= 1;
                if take == whole && region.len % PAGE_SIZE == 0 {
                    spare += 1;
                }
            }

            last_end = Some(region.base.as_u64() + take * PAGE_SIZE);
            needed -= take;
        }
        needed == 0
    }

    /// Whole pages left across the free list.
    #[must_use]
    pub fn free_pages(&self) -> u64 {
        self.arena.iter(&self.free).map(|(_, r)| r.len / PAGE_SIZE).sum()
    }

    pub fn free_regions(&self) -> impl Iterator<Item = PhysicalRegion> + '_ {
        self.arena.iter(&self.free).map(|(_, r)| *r)
    }

    pub fn used_regions(&self) -> impl Iterator<Item = PhysicalRegion> + '_ {
        self.arena.iter(&self.used).map(|(_, r)| *r)
    }

    #[must_use]
    pub fn region(&self, id: NodeId) -> Option<PhysicalRegion> {
        self.arena.get(id).copied()
    }
}

impl<const N: usize> Default for PhysicalRegions<N> {
    fn default() -> Self {
        Self::new()
    }
}
