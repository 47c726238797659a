//! Simulated physical memory and a fake loader for host tests.
//!
//! The manager's mapper sees memory the way the CPU does: every address it
//! is handed is translated through the live page tables rooted at
//! [`HIERARCHY`], and an address without a mapping panics as a page fault.
//! [`SimulatedRam::read`] and [`SimulatedRam::write`] bypass paging.

use crate::memory_map::MemoryMapEntry;
use kernel_info::boot::BootState;
use kernel_info::memory::{IDENTITY_MAPPED_BYTES, PAGE_SIZE};
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_vmem::{AddressSpace, PageTable, PageTableHierarchy, PhysMapper, TableIndex};
use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::ptr::NonNull;

/// Where the fake loader puts its page-table hierarchy.
pub const HIERARCHY: u64 = 0x1000;
/// Where the fake loader copies the memory map.
pub const MEMORY_MAP: u64 = 0x8000;
/// Simulated physical memory size.
pub const RAM_BYTES: usize = 16 << 20;

/// Zeroed, 4 KiB aligned bytes standing in for `[0, RAM_BYTES)` of physical memory.
pub struct SimulatedRam {
    base: NonNull<u8>,
    layout: Layout,
}

/// Physical view of [`SimulatedRam`]: addresses are offsets into it.
struct Physical<'r>(&'r SimulatedRam);

impl PhysMapper for Physical<'_> {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let offset = usize::try_from(pa.as_u64()).expect("address");
        assert!(
            offset + size_of::<T>() <= self.0.layout.size(),
            "{pa} is outside simulated RAM"
        );
        unsafe { &mut *self.0.base.as_ptr().add(offset).cast::<T>() }
    }
}

impl SimulatedRam {
    pub fn new() -> Self {
        let layout = Layout::from_size_align(RAM_BYTES, 4096).expect("layout");
        let base = NonNull::new(unsafe { alloc_zeroed(layout) }).expect("simulated RAM");
        Self { base, layout }
    }

    pub fn read<T: Copy>(&self, pa: PhysicalAddress) -> T {
        *unsafe { Physical(self).phys_to_mut::<T>(pa) }
    }

    pub fn write<T: Copy>(&self, pa: PhysicalAddress, value: T) {
        *unsafe { Physical(self).phys_to_mut::<T>(pa) } = value;
    }

    /// Where the CPU would find `va`, or `None` for a page fault.
    pub fn resolve(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        AddressSpace::from_root(PhysicalAddress::new(HIERARCHY)).translate(&Physical(self), va)
    }

    /// Read `va` the way the CPU would.
    pub fn load<T: Copy>(&self, va: VirtualAddress) -> T {
        let mapper = self;
        *unsafe { mapper.phys_to_mut::<T>(PhysicalAddress::new(va.as_u64())) }
    }

    /// Write `va` the way the CPU would.
    pub fn store<T: Copy>(&self, va: VirtualAddress, value: T) {
        let mapper = self;
        *unsafe { mapper.phys_to_mut::<T>(PhysicalAddress::new(va.as_u64())) } = value;
    }
}

impl Drop for SimulatedRam {
    fn drop(&mut self) {
        unsafe { dealloc(self.base.as_ptr(), self.layout) };
    }
}

/// The CPU's view: the address is virtual and goes through the page tables.
impl PhysMapper for &SimulatedRam {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let va = VirtualAddress::new(pa.as_u64());
        let Some(target) = self.resolve(va) else {
            panic!("page fault: {va} not mapped");
        };
        let last = (size_of::<T>() as u64).saturating_sub(1);
        assert_eq!(
            self.resolve(VirtualAddress::new(va.as_u64() + last)),
            target.checked_add(last),
            "access at {va} is not physically contiguous"
        );
        unsafe { Physical(*self).phys_to_mut(target) }
    }
}

/// Copy `entries` to [`MEMORY_MAP`] and return the matching boot record.
fn write_memory_map(ram: &SimulatedRam, entries: &[MemoryMapEntry]) -> BootState {
    for (i, entry) in entries.iter().enumerate() {
        let at = MEMORY_MAP + (i * size_of::<MemoryMapEntry>()) as u64;
        ram.write(PhysicalAddress::new(at), *entry);
    }
    BootState {
        memory_map_offset: MEMORY_MAP as u16,
        memory_map_size: u16::try_from(entries.len()).expect("entry count"),
        page_mapping_offset: HIERARCHY as u16,
    }
}

/// Lay memory out the way the loader does: chained hierarchy at
/// [`HIERARCHY`] identity-mapping the first megabyte, map at [`MEMORY_MAP`].
pub fn boot(ram: &SimulatedRam, entries: &[MemoryMapEntry]) -> BootState {
    let hierarchy: &mut PageTableHierarchy =
        unsafe { Physical(ram).phys_to_mut(PhysicalAddress::new(HIERARCHY)) };

    let zero = TableIndex::new(0);
    let link = |table: &mut PageTable, offset: u64| {
        let next = PhysicalAddress::new(HIERARCHY + offset);
        table.set(zero, table.get(zero).linked_to(next));
    };
    link(&mut hierarchy.level_4, PageTableHierarchy::POINTER_TABLE_OFFSET);
    link(&mut hierarchy.pointer_table, PageTableHierarchy::DIRECTORY_OFFSET);
    link(&mut hierarchy.directory, PageTableHierarchy::TABLE_OFFSET);

    for page in 0..IDENTITY_MAPPED_BYTES / PAGE_SIZE {
        let index = TableIndex::new(u16::try_from(page).expect("index"));
        let frame = PhysicalAddress::new(page * PAGE_SIZE);
        hierarchy.table.set(index, hierarchy.table.get(index).linked_to(frame));
    }

    write_memory_map(ram, entries)
}
