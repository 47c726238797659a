//! # PhysMappers for the Bootstrap Kernel
//!
//! The loader enters long mode with the first megabyte identity mapped and
//! places its page-table hierarchy inside it, so [`IdentityMapper`] uses a
//! low physical address as the pointer directly.
//!
//! Page tables created later are cut from memory above that megabyte, which
//! has no mapping the kernel can rely on. A [`ScratchSlot`] repoints the leaf
//! entry of [`SCRATCH_PAGE`] at such a frame and hands back the scratch
//! address, which the identity mapper then resolves through the new entry.
//! Only one frame is reachable this way at a time.
//!
//! ## Example
//! ```rust,no_run
//! use kernel_alloc::phys_mapper::IdentityMapper;
//! use kernel_memory_addresses::PhysicalAddress;
//! use kernel_vmem::{PageTable, PhysMapper};
//!
//! let mapper = IdentityMapper;
//! unsafe {
//!     let table: &mut PageTable = mapper.phys_to_mut(PhysicalAddress::new(0x1000));
//!     table.zero();
//! }
//! ```

use kernel_info::memory::{PAGE_SIZE, SCRATCH_PAGE};
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_vmem::{PageTable, PhysMapper, TableLevel};
use log::trace;

/// [`PhysMapper`] for an identity-mapped physical range.
///
/// # Safety
/// - Only addresses covered by the identity mapping may be converted.
/// - The returned reference must only be used for valid, writable memory.
#[derive(Copy, Clone, Debug, Default)]
pub struct IdentityMapper;

impl PhysMapper for IdentityMapper {
    #[allow(clippy::cast_possible_truncation)]
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let ptr = core::ptr::with_exposed_provenance_mut::<T>(pa.as_u64() as usize);
        // SAFETY: Caller guarantees `pa` is identity mapped and writable.
        unsafe { &mut *ptr }
    }
}

/// The leaf entry for [`SCRATCH_PAGE`] in the loader's table.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ScratchSlot {
    table: PhysicalAddress,
}

impl ScratchSlot {
    /// Slot in the leaf table at `table`, which must be identity mapped.
    #[inline]
    #[must_use]
    pub const fn new(table: PhysicalAddress) -> Self {
        Self { table }
    }

    /// Whether `pa` is reached through the slot rather than directly.
    #[inline]
    #[must_use]
    pub const fn covers(pa: PhysicalAddress) -> bool {
        pa.as_u64() >= SCRATCH_PAGE
    }

    /// Point the scratch page at the frame containing `pa` and return the
    /// address `pa` is now visible at.
    ///
    /// # Safety
    /// - `mapper` must reach the slot's table.
    /// - References obtained through an earlier call no longer point at
    ///   their frame once the slot moves.
    pub unsafe fn reach<M>(&self, mapper: &M, pa: PhysicalAddress) -> PhysicalAddress
    where
        M: PhysMapper,
    {
        let page = VirtualAddress::new(SCRATCH_PAGE);
        let index = TableLevel::Table.index_of(page);
        let frame = pa.align_down();

        let table: &mut PageTable = unsafe { mapper.phys_to_mut(self.table) };
        let entry = table.get(index);
        if entry.present_frame() != Some(frame) {
            table.set(index, entry.linked_to(frame));
            invalidate(page);
            trace!("scratch page now shows {frame}");
        }
        PhysicalAddress::new(SCRATCH_PAGE + pa.page_offset())
    }
}

const _: () = assert!(SCRATCH_PAGE.is_multiple_of(PAGE_SIZE));

#[cfg(all(target_os = "none", target_arch = "x86_64"))]
fn invalidate(page: VirtualAddress) {
    unsafe {
        core::arch::asm!("invlpg [{}]", in(reg) page.as_u64(), options(nostack, preserves_flags));
    }
}

#[cfg(not(all(target_os = "none", target_arch = "x86_64")))]
fn invalidate(_page: VirtualAddress) {}
