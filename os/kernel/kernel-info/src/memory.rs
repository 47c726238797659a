//! # Memory Layout

pub use kernel_memory_addresses::PAGE_SIZE;

/// Number of 64-bit entries in every level of the paging hierarchy.
pub const PAGE_TABLE_ENTRY_COUNT: usize = 512;

/// Physical bytes the loader identity-maps (VA == PA) before jumping to the kernel.
///
/// The boot record, the BIOS memory map, the VGA buffer and the loader's
/// page-table scaffold all live below this bound.
pub const IDENTITY_MAPPED_BYTES: u64 = 0x10_0000; // 1 MiB

/// Last page of the identity-mapped megabyte.
///
/// Physical memory here is BIOS ROM the kernel never reads. Once the memory
/// manager is up, its leaf entry is repointed on demand at page-table frames
/// above [`IDENTITY_MAPPED_BYTES`], which are otherwise unreachable.
pub const SCRATCH_PAGE: u64 = IDENTITY_MAPPED_BYTES - PAGE_SIZE;

/// First virtual address handed out by the bootstrap allocator.
///
/// The loader's level-4, pointer and directory tables already resolve this
/// address to its leaf table; only the leaf entry is missing.
pub const VIRTUAL_MEMORY_START: u64 = IDENTITY_MAPPED_BYTES;

/// Size of the allocator's virtual window in bytes.
pub const VIRTUAL_MEMORY_SPAN: u64 = 0x3FF0_0000; // 1 GiB - 1 MiB

/// One past the last virtual address of the allocator window.
pub const VIRTUAL_MEMORY_END: u64 = VIRTUAL_MEMORY_START + VIRTUAL_MEMORY_SPAN;

/// Size of the loader's page-table scaffold (four consecutive tables).
pub const PAGE_TABLE_HIERARCHY_BYTES: u64 = 4 * PAGE_SIZE;

const _: () = {
    assert!(PAGE_SIZE == 4096);
    assert!(PAGE_TABLE_ENTRY_COUNT * 8 == PAGE_SIZE as usize);
    assert!(IDENTITY_MAPPED_BYTES.is_multiple_of(PAGE_SIZE));
    assert!(VIRTUAL_MEMORY_START.is_multiple_of(PAGE_SIZE));
    assert!(VIRTUAL_MEMORY_SPAN.is_multiple_of(PAGE_SIZE));
    assert!(VIRTUAL_MEMORY_START >= IDENTITY_MAPPED_BYTES);
    assert!(SCRATCH_PAGE < VIRTUAL_MEMORY_START);
    // the window must sit below the first 1 GiB so the loader's single
    // pointer-table entry covers it
    assert!(VIRTUAL_MEMORY_END <= 0x4000_0000);
};
