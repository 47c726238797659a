use bitfield_struct::bitfield;
use kernel_memory_addresses::PhysicalAddress;

/// A single 64-bit x86-64 page table entry in its raw bitfield form.
///
/// The same layout is used at every level of the hierarchy (level-4,
/// pointer table, directory, table). The kernel maps 4 KiB pages only, so
/// `page_size_or_pat` is never set by this crate.
///
/// ### Bit layout
///
/// | Bits      | Field               | Meaning |
/// |-----------|---------------------|----------|
/// | 0         | `present`           | Valid entry if set |
/// | 1         | `read_write`        | Writable if set |
/// | 2         | `user_supervisor`   | User-mode accessible if set |
/// | 3         | `write_through`     | Write-through caching |
/// | 4         | `cache_disable`     | Disable caching |
/// | 5         | `accessed`          | Set by the CPU on access |
/// | 6         | `dirty`             | Set by the CPU on write (leaf only) |
/// | 7         | `page_size_or_pat`  | Large page (non-leaf) or PAT (leaf) |
/// | 8         | `global`            | Global (leaf only) |
/// | 9–11      | `os_available_low`  | Reserved for OS use |
/// | 12–51     | frame address       | Physical frame bits [51:12] |
/// | 52–58     | `os_available_high` | Reserved for OS use |
/// | 59–62     | `protection_key`    | Protection key or OS use |
/// | 63        | `execute_disable`   | No-execute |
///
/// The frame address is only reachable through [`PhysicalAddress`]-typed
/// accessors.
///
/// ### Example
/// ```rust
/// # use kernel_memory_addresses::PhysicalAddress;
/// # use kernel_vmem::PageTableEntry;
/// let e = PageTableEntry::new()
///     .with_present(true)
///     .with_read_write(true)
///     .with_frame_address(PhysicalAddress::new(0x0010_1000));
/// assert!(e.present());
/// assert_eq!(e.frame_address().as_u64(), 0x0010_1000);
/// assert_eq!(e.into_bits(), 0x0010_1003);
/// ```
#[doc(alias = "PTE")]
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct PageTableEntry {
    /// Present (P, bit 0).
    ///
    /// Set if the entry points to a valid next-level table or maps a page.
    pub present: bool,

    /// Read/Write (RW, bit 1).
    ///
    /// Set to allow writes; clear for read-only. Permissions intersect over
    /// the walk.
    pub read_write: bool,

    /// User/Supervisor (US, bit 2).
    pub user_supervisor: bool,

    /// Page Write-Through (PWT, bit 3).
    pub write_through: bool,

    /// Page Cache Disable (PCD, bit 4).
    pub cache_disable: bool,

    /// Accessed (A, bit 5).
    ///
    /// Set by the CPU on first access through this entry. Software never
    /// writes it except by zero-initialising a fresh table.
    pub accessed: bool,

    /// Dirty (D, bit 6), **leaf only**.
    ///
    /// Set by the CPU on first write through a leaf mapping.
    pub dirty: bool,

    /// Page Size (PS) in directory-level entries, PAT in leaf entries (bit 7).
    pub page_size_or_pat: bool,

    /// Global (G, bit 8), **leaf only**.
    pub global: bool,

    /// OS-available (bits 9..=11).
    #[bits(3)]
    pub os_available_low: u8,

    /// Physical frame number, bits [51:12] of the frame address.
    #[bits(40)]
    frame_number: u64,

    /// OS-available (bits 52..=58).
    #[bits(7)]
    pub os_available_high: u8,

    /// Protection Key (PKU, bits 59..=62) if supported; otherwise OS use.
    #[bits(4)]
    pub protection_key: u8,

    /// Execute Disable (XD/NX, bit 63).
    pub execute_disable: bool,
}

impl PageTableEntry {
    /// A non-present entry with all bits cleared.
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self::new()
    }

    /// Page-aligned physical address stored in bits [51:12].
    #[inline]
    #[must_use]
    pub const fn frame_address(&self) -> PhysicalAddress {
        PhysicalAddress::from_frame_number(self.frame_number())
    }

    /// Store the frame of `phys` in bits [51:12]; the in-page offset is dropped.
    #[inline]
    pub const fn set_frame_address(&mut self, phys: PhysicalAddress) {
        self.set_frame_number(phys.frame_number());
    }

    #[inline]
    #[must_use]
    pub const fn with_frame_address(mut self, phys: PhysicalAddress) -> Self {
        self.set_frame_address(phys);
        self
    }

    /// Frame address if the entry is present.
    #[inline]
    #[must_use]
    pub const fn present_frame(self) -> Option<PhysicalAddress> {
        if self.present() {
            Some(self.frame_address())
        } else {
            None
        }
    }

    /// Mark the entry present and writable, pointing at `frame`.
    ///
    /// All other bits, including `accessed` and `dirty`, are kept as they are.
    #[inline]
    #[must_use]
    pub const fn linked_to(self, frame: PhysicalAddress) -> Self {
        self.with_present(true)
            .with_read_write(true)
            .with_frame_address(frame)
    }
}
