//! # Kernel Boot Information

use kernel_memory_addresses::PhysicalAddress;

/// Kernel function pointer.
///
/// The loader jumps here in long mode with paging enabled and the
/// [`BootState`] address in the first argument register.
pub type KernelEntryFn = extern "C" fn(*const BootState) -> !;

/// Handoff record written by the loader.
///
/// All offsets are physical addresses inside the identity-mapped low
/// memory, hence the 16-bit fields.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct BootState {
    /// Physical address of the first BIOS memory map entry.
    pub memory_map_offset: u16,

    /// Number of 24-byte memory map entries (not bytes).
    pub memory_map_size: u16,

    /// Physical address of the loader's page-table hierarchy (level-4 table first).
    pub page_mapping_offset: u16,
}

impl BootState {
    #[inline]
    #[must_use]
    pub const fn memory_map_address(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.memory_map_offset as u64)
    }

    #[inline]
    #[must_use]
    pub const fn memory_map_len(&self) -> usize {
        self.memory_map_size as usize
    }

    #[inline]
    #[must_use]
    pub const fn page_tables_address(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.page_mapping_offset as u64)
    }
}

const _: () = {
    assert!(size_of::<BootState>() == 6);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses_widen_offsets() {
        let state = BootState {
            memory_map_offset: 0x8000,
            memory_map_size: 3,
            page_mapping_offset: 0x1000,
        };
        assert_eq!(state.memory_map_address().as_u64(), 0x8000);
        assert_eq!(state.memory_map_len(), 3);
        assert_eq!(state.page_tables_address().as_u64(), 0x1000);
    }
}
