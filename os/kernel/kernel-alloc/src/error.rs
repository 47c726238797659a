use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_vmem::MapError;
use thiserror::Error;

/// Structural problems with the firmware memory map.
#[derive(Debug, Error, Copy, Clone, Eq, PartialEq)]
pub enum MalformedMemoryMap {
    #[error("memory map has no entries")]
    Empty,
    #[error("memory map offset is null")]
    NullOffset,
    #[error("memory map at {0} is not 8-byte aligned")]
    Misaligned(PhysicalAddress),
    #[error("entry {index} extends past the end of the address space")]
    RangeOverflow { index: usize },
}

#[derive(Debug, Error, Copy, Clone, Eq, PartialEq)]
pub enum MemoryError {
    #[error("malformed memory map: {0}")]
    MalformedMemoryMap(#[from] MalformedMemoryMap),
    #[error("page tables at {0} are not page aligned")]
    MisalignedPageTables(PhysicalAddress),
    #[error("page tables at {0} are not the loader's chained hierarchy in low memory")]
    UnchainedPageTables(PhysicalAddress),
    #[error("memory manager is already initialized")]
    AlreadyInitialized,
    #[error("memory manager is not initialized")]
    NotInitialized,
    #[error("zero-sized allocation")]
    ZeroSizedAllocation,
    #[error("no free virtual region holds {requested} bytes")]
    OutOfVirtualAddressSpace { requested: u64 },
    #[error("{pages} physical pages required but not available")]
    OutOfPhysicalMemory { pages: u64 },
    #[error("{0} is not inside an allocated region")]
    UnknownAllocation(VirtualAddress),
    #[error("region tracking capacity exhausted")]
    TrackingExhausted,
    #[error("region overlaps a tracked physical region")]
    OverlappingRegion,
    #[error("page table installation failed: {0}")]
    PageTableInstallFailure(#[from] MapError),
}

impl MemoryError {
    /// Whether the kernel must halt instead of handing the error to a caller.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::PageTableInstallFailure(_))
    }
}
