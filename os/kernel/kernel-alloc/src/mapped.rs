//! Ledger of every virtual page that has been backed by a physical frame.
//! Entries are never removed: freeing a virtual region keeps its mappings.
//!
//! Pages backed one after another by consecutive frames of the same used
//! region share one entry, so the ledger grows with the number of breaks in
//! the backing rather than with the amount of memory mapped.

use crate::MAPPED_RUN_SLOTS;
use crate::arena::{Arena, List, NodeId};
use crate::error::MemoryError;
use kernel_info::memory::PAGE_SIZE;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};

/// `pages` consecutive virtual pages mapped to consecutive frames.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MappedPage {
    pub physical_base: PhysicalAddress,
    pub virtual_base: VirtualAddress,
    pub pages: u64,
    /// Used physical region the frames were taken from.
    pub region: NodeId,
}

impl MappedPage {
    #[inline]
    #[must_use]
    pub const fn contains(&self, va: VirtualAddress) -> bool {
        let base = self.virtual_base.as_u64();
        base <= va.as_u64() && va.as_u64() - base < self.pages * PAGE_SIZE
    }

    /// The frame backing the page that contains `va`.
    #[must_use]
    pub const fn frame_of(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        if !self.contains(va) {
            return None;
        }
        let page = va.align_down().as_u64() - self.virtual_base.as_u64();
        Some(PhysicalAddress::new(self.physical_base.as_u64() + page))
    }

    fn continues_with(&self, pa: PhysicalAddress, va: VirtualAddress, region: NodeId) -> bool {
        let len = self.pages * PAGE_SIZE;
        self.region == region
            && self.virtual_base.as_u64() + len == va.as_u64()
            && self.physical_base.as_u64() + len == pa.as_u64()
    }
}

pub struct MappedPages<const N: usize = MAPPED_RUN_SLOTS> {
    arena: Arena<MappedPage, N>,
    pages: List,
}

impl<const N: usize> MappedPages<N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            arena: Arena::new(),
            pages: List::new(),
        }
    }

    /// Record that the page at `virtual_base` is backed by the frame at
    /// `physical_base`. The most recent entry is extended when the page
    /// directly follows it on both sides.
    ///
    /// # Errors
    /// [`MemoryError::TrackingExhausted`] if a new entry is needed and all
    /// `N` slots are in use.
    pub fn record(
        &mut self,
        physical_base: PhysicalAddress,
        virtual_base: VirtualAddress,
        region: NodeId,
    ) -> Result<NodeId, MemoryError> {
        if let Some(last) = self.pages.last()
            && self.arena[last].continues_with(physical_base, virtual_base, region)
        {
            self.arena[last].pages += 1;
            return Ok(last);
        }

        let id = self
            .arena
            .insert(MappedPage {
                physical_base,
                virtual_base,
                pages: 1,
                region,
            })
            .ok_or(MemoryError::TrackingExhausted)?;
        self.arena.push_back(&mut self.pages, id);
        Ok(id)
    }

    /// The entry covering the page that contains `va`.
    #[must_use]
    pub fn by_virtual(&self, va: VirtualAddress) -> Option<MappedPage> {
        self.arena
            .find(&self.pages, |p| p.contains(va))
            .map(|id| self.arena[id])
    }

    #[inline]
    #[must_use]
    pub const fn available(&self) -> usize {
        self.arena.available()
    }

    /// Number of entries.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.pages.len()
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Number of backed pages across all entries.
    #[must_use]
    pub fn backed_pages(&self) -> u64 {
        self.iter().map(|p| p.pages).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = MappedPage> + '_ {
        self.arena.iter(&self.pages).map(|(_, p)| *p)
    }
}

impl<const N: usize> Default for MappedPages<N> {
    fn default() -> Self {
        Self::new()
    }
}
