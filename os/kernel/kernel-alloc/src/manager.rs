//! # Memory Manager
//!
//! The context object that owns every tracker and the kernel address space.
//! It is `const`-constructed into a `static`, initialised exactly once from
//! the loader's [`BootState`], and then serves [`allocate`] and [`free`].
//!
//! ## Bootstrap
//!
//! ```text
//! Uninitialized ──init──▶ NoRootYet ──first usable entry──▶ Bootstrapped
//! ```
//!
//! The first usable entry donates one page that is mapped at the start of
//! the virtual window; the rest of it and all later usable entries become
//! free physical regions. Usable memory below [`IDENTITY_MAPPED_BYTES`] holds
//! the loader's own structures and is never tracked.
//!
//! [`allocate`]: MemoryManager::allocate
//! [`free`]: MemoryManager::free

use crate::error::{MalformedMemoryMap, MemoryError};
use crate::fatal;
use crate::mapped::MappedPages;
use crate::memory_map::{self, MemoryMapEntry};
use crate::phys_mapper::ScratchSlot;
use crate::physical::PhysicalRegions;
use crate::virtual_region::{VirtualRegion, VirtualRegions};
use core::ptr;
use kernel_info::boot::BootState;
use kernel_info::memory::{
    IDENTITY_MAPPED_BYTES, PAGE_SIZE, PAGE_TABLE_HIERARCHY_BYTES, SCRATCH_PAGE, VIRTUAL_MEMORY_SPAN,
    VIRTUAL_MEMORY_START,
};
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_vmem::{AddressSpace, FrameAlloc, PageTableHierarchy, PhysMapper};
use log::{debug, info, trace, warn};

/// Where the manager stands in the bootstrap sequence.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BootstrapState {
    /// `init` has not run.
    Uninitialized,
    /// The map was read but no usable entry has been seen yet.
    NoRootYet,
    /// The first page is mapped; allocations are served.
    Bootstrapped,
}

/// Physical and virtual memory of the kernel, driven through one mapper.
///
/// `M` is the mapper for the identity-mapped first megabyte. Frames above it
/// are reached through the scratch page once `init` has located the loader's
/// leaf table, which is also how [`AddressSpace`] sees this type when it is
/// passed as the frame source.
pub struct MemoryManager<M: PhysMapper> {
    mapper: M,
    state: BootstrapState,
    address_space: AddressSpace,
    scratch: Option<ScratchSlot>,
    pub(crate) physical: PhysicalRegions,
    pub(crate) virtual_regions: VirtualRegions,
    pub(crate) mapped: MappedPages,
}

impl<M: PhysMapper> MemoryManager<M> {
    /// Manager over the default window
    /// `[VIRTUAL_MEMORY_START, VIRTUAL_MEMORY_START + VIRTUAL_MEMORY_SPAN)`.
    #[must_use]
    pub const fn new(mapper: M) -> Self {
        let start = VirtualAddress::new(VIRTUAL_MEMORY_START);
        Self::with_window(mapper, start, VIRTUAL_MEMORY_SPAN)
    }

    /// Manager over a custom virtual window. `start` and `span` must be page
    /// aligned; page tables the window lacks are created on first use.
    #[must_use]
    pub const fn with_window(mapper: M, start: VirtualAddress, span: u64) -> Self {
        Self {
            mapper,
            state: BootstrapState::Uninitialized,
            address_space: AddressSpace::from_root(PhysicalAddress::zero()),
            scratch: None,
            physical: PhysicalRegions::new(),
            virtual_regions: VirtualRegions::new(start, span),
            mapped: MappedPages::new(),
        }
    }

    /// Read the loader's memory map and bring the allocator up.
    ///
    /// # Safety
    /// - The memory map and page-table hierarchy described by `boot` must be
    ///   reachable and writable through the mapper.
    /// - Nothing else may access the memory map while this runs.
    ///
    /// # Errors
    /// See [`init_with_entries`](Self::init_with_entries); additionally
    /// [`MalformedMemoryMap::NullOffset`] and [`MalformedMemoryMap::Misaligned`]
    /// for a bad map location.
    pub unsafe fn init(&mut self, boot: &BootState) -> Result<(), MemoryError> {
        if self.state != BootstrapState::Uninitialized {
            return Err(MemoryError::AlreadyInitialized);
        }

        let map = boot.memory_map_address();
        if map.as_u64() == 0 {
            return Err(MalformedMemoryMap::NullOffset.into());
        }
        if !map.as_u64().is_multiple_of(align_of::<MemoryMapEntry>() as u64) {
            return Err(MalformedMemoryMap::Misaligned(map).into());
        }
        let count = boot.memory_map_len();
        if count == 0 {
            return Err(MalformedMemoryMap::Empty.into());
        }

        let first: &mut MemoryMapEntry = unsafe { self.mapper.phys_to_mut(map) };
        let entries = unsafe { core::slice::from_raw_parts_mut(ptr::from_mut(first), count) };
        self.init_with_entries(boot.page_tables_address(), entries)
    }

    /// Bring the allocator up from an already located memory map.
    ///
    /// Entries are vetted in place. Structural errors are reported before
    /// any state changes. A failure while the entries are consumed rolls
    /// every tracker back, so a failed call can always be retried; entries
    /// vetted by the failed call stay vetted.
    ///
    /// # Errors
    /// - [`MemoryError::AlreadyInitialized`] on a second call.
    /// - [`MemoryError::MalformedMemoryMap`] for an empty or wrapping map.
    /// - [`MemoryError::MisalignedPageTables`] for a null or unaligned root.
    /// - [`MemoryError::UnchainedPageTables`] if the root is not the loader's
    ///   chained block in the identity-mapped megabyte.
    /// - [`MemoryError::OutOfVirtualAddressSpace`] or
    ///   [`MemoryError::TrackingExhausted`] if the bootstrap page cannot be
    ///   placed.
    pub fn init_with_entries(
        &mut self,
        page_tables: PhysicalAddress,
        entries: &mut [MemoryMapEntry],
    ) -> Result<(), MemoryError> {
        if self.state != BootstrapState::Uninitialized {
            return Err(MemoryError::AlreadyInitialized);
        }
        memory_map::validate(entries)?;
        if page_tables.as_u64() == 0 || !page_tables.is_page_aligned() {
            return Err(MemoryError::MisalignedPageTables(page_tables));
        }
        let leaf = self.loader_leaf_table(page_tables)?;

        self.address_space = AddressSpace::from_root(page_tables);
        self.scratch = Some(ScratchSlot::new(leaf));
        if let Err(err) = self.consume(entries) {
            warn!("memory bring-up failed, rolling back: {err}");
            self.reset();
            return Err(err);
        }

        if self.state == BootstrapState::Bootstrapped {
            info!(
                "memory manager ready: {} entries, {} free pages",
                entries.len(),
                self.physical.free_pages()
            );
        } else {
            warn!("memory map has no usable memory above {IDENTITY_MAPPED_BYTES:#x}");
        }
        Ok(())
    }

    /// The leaf table of the loader's block at `page_tables`, which also
    /// holds the scratch slot.
    fn loader_leaf_table(
        &self,
        page_tables: PhysicalAddress,
    ) -> Result<PhysicalAddress, MemoryError> {
        let unchained = MemoryError::UnchainedPageTables(page_tables);
        let end = page_tables
            .as_u64()
            .checked_add(PAGE_TABLE_HIERARCHY_BYTES)
            .ok_or(unchained)?;
        if end > SCRATCH_PAGE {
            return Err(unchained);
        }
        let hierarchy: &PageTableHierarchy = unsafe { self.mapper.phys_to_mut(page_tables) };
        hierarchy.chained_leaf(page_tables).ok_or(unchained)
    }

    fn consume(&mut self, entries: &mut [MemoryMapEntry]) -> Result<(), MemoryError> {
        self.virtual_regions.open()?;
        self.state = BootstrapState::NoRootYet;

        for entry in entries.iter_mut() {
            if !memory_map::vet_entry(entry) {
                continue;
            }
            let Some((base, len)) = above_low_memory(entry) else {
                debug!("usable entry at {} lies in loader memory", entry.base_address());
                continue;
            };
            match self.state {
                BootstrapState::NoRootYet => self.handle_first_region(base, len)?,
                _ => self.handle_subsequent_region(base, len),
            }
        }
        Ok(())
    }

    /// Return to the state `with_window` left the manager in.
    fn reset(&mut self) {
        let window = self.virtual_regions.window();
        self.state = BootstrapState::Uninitialized;
        self.address_space = AddressSpace::from_root(PhysicalAddress::zero());
        self.scratch = None;
        self.physical = PhysicalRegions::new();
        self.virtual_regions = VirtualRegions::new(window.base, window.size);
        self.mapped = MappedPages::new();
    }

    /// Donate the first page of `[base, base + len)` to the start of the
    /// window. Every fallible step runs before the page is installed.
    fn handle_first_region(&mut self, base: PhysicalAddress, len: u64) -> Result<(), MemoryError> {
        let page = self.virtual_regions.allocate(PAGE_SIZE)?;
        if len > PAGE_SIZE {
            let rest = PhysicalAddress::new(base.as_u64() + PAGE_SIZE);
            self.physical.add_free(rest, len - PAGE_SIZE)?;
        }
        let used = self.physical.add_used(base, PAGE_SIZE)?;
        self.mapped.record(base, page.base, used)?;
        self.state = BootstrapState::Bootstrapped;

        self.install(page.base, base);
        debug!("bootstrap page {base} mapped at {}", page.base);
        Ok(())
    }
    fn handle_subsequent_region(&mut self, base: PhysicalAddress, len: u64) {
        match self.physical.add_free(base, len) {
            Ok(_) => {}
            Err(MemoryError::OverlappingRegion) => {
                warn!("skipping usable entry at {base} ({len} bytes): overlaps a tracked region");
            }
            Err(err) => warn!("skipping usable entry at {base} ({len} bytes): {err}"),
        }
    }

    /// Map `va` to `pa`, halting if the page tables cannot be extended.
    pub(crate) fn install(&mut self, va: VirtualAddress, pa: PhysicalAddress) {
        let space = self.address_space;
        if let Err(err) = space.map_virtual_page(self, va, pa) {
            fatal::halt(&MemoryError::PageTableInstallFailure(err));
        }
        trace!("installed {va} -> {pa}");
    }

    #[inline]
    #[must_use]
    pub const fn state(&self) -> BootstrapState {
        self.state
    }

    #[inline]
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        !matches!(self.state, BootstrapState::Uninitialized)
    }

    /// The kernel address space, once `init` has run.
    #[must_use]
    pub const fn address_space(&self) -> Option<AddressSpace> {
        if self.is_initialized() {
            Some(self.address_space)
        } else {
            None
        }
    }

    /// Resolve `va` through the live page tables.
    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        self.address_space()?.translate(self, va)
    }

    #[inline]
    #[must_use]
    pub const fn window(&self) -> VirtualRegion {
        self.virtual_regions.window()
    }

    #[inline]
    #[must_use]
    pub fn free_physical_pages(&self) -> u64 {
        self.physical.free_pages()
    }

    #[inline]
    #[must_use]
    pub const fn physical_regions(&self) -> &PhysicalRegions {
        &self.physical
    }

    #[inline]
    #[must_use]
    pub const fn virtual_regions(&self) -> &VirtualRegions {
        &self.virtual_regions
    }

    #[inline]
    #[must_use]
    pub const fn mapped_pages(&self) -> &MappedPages {
        &self.mapped
    }
}

/// The part of a vetted usable entry above the loader's low memory.
fn above_low_memory(entry: &MemoryMapEntry) -> Option<(PhysicalAddress, u64)> {
    let end = entry.end()?;
    let base = entry.base_address().as_u64().max(IDENTITY_MAPPED_BYTES);
    let len = end.checked_sub(base)?;
    (len >= PAGE_SIZE).then_some((PhysicalAddress::new(base), len))
}

/// Page-table frames are drawn from the physical free list.
impl<M: PhysMapper> FrameAlloc for MemoryManager<M> {
    fn alloc_4k(&mut self) -> Option<PhysicalAddress> {
        let (frame, _) = self.physical.take_page()?;
        debug!("page-table frame {frame}");
        Some(frame)
    }
}

/// Low memory is reached directly; anything else through the scratch page.
impl<M: PhysMapper> PhysMapper for MemoryManager<M> {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        match self.scratch {
            Some(slot) if ScratchSlot::covers(pa) => {
                debug_assert!(pa.page_offset() + size_of::<T>() as u64 <= PAGE_SIZE);
                let visible = unsafe { slot.reach(&self.mapper, pa) };
                unsafe { self.mapper.phys_to_mut(visible) }
            }
            _ => unsafe { self.mapper.phys_to_mut(pa) },
        }
    }
}
