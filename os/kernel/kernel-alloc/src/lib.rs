//! # Kernel Bootstrap Memory Allocator
//!
//! Brings up physical and virtual memory management with no heap, starting
//! from the BIOS memory map and the page tables the loader left behind.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  MemoryManager                      │
//! │    • init / allocate / free                         │
//! │    • bootstrap state machine                        │
//! └───────┬───────────────────┬─────────────────┬───────┘
//!         │                   │                 │
//! ┌───────▼───────┐  ┌────────▼───────┐  ┌──────▼───────┐
//! │ PhysicalRegs  │  │ VirtualRegions │  │ MappedPages  │
//! │ free / used   │  │ free / alloc.  │  │ VA ↔ PA log  │
//! └───────┬───────┘  └────────────────┘  └──────────────┘
//!         │ frames for new tables
//! ┌───────▼─────────────────────────────────────────────┐
//! │  kernel-vmem AddressSpace (tables via scratch page) │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core Components
//!
//! ### Memory map ([`memory_map`])
//! Firmware descriptors are validated, then vetted in place: usable ranges
//! are page aligned and anything shorter than a page becomes
//! [`MemoryKind::Useless`](memory_map::MemoryKind::Useless).
//!
//! ### Region trackers ([`physical`], [`virtual_region`], [`mapped`])
//! Doubly-linked lists over fixed-capacity node arenas ([`arena`]). Nodes move
//! between lists instead of being copied; capacities are const generics with
//! the defaults below.
//!
//! ### Memory manager ([`manager`], allocation in `allocator`)
//! The first usable region above 1 MiB donates the page mapped at
//! [`VIRTUAL_MEMORY_START`](kernel_info::memory::VIRTUAL_MEMORY_START). Later
//! allocations are first-fit over the virtual window and are fully mapped
//! before they are returned.
//!
//! ### Reaching page tables ([`phys_mapper`])
//! The loader only identity-maps the first megabyte, but new tables are cut
//! from memory above it. The manager repoints the leaf entry of
//! [`SCRATCH_PAGE`](kernel_info::memory::SCRATCH_PAGE) at whichever table
//! frame it needs to touch.
//!
//! ## Errors
//!
//! Recoverable conditions are returned as [`MemoryError`]. A page table that
//! cannot be installed halts the machine through [`fatal::halt`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use kernel_alloc::{MemoryManager, phys_mapper::IdentityMapper};
//! use kernel_info::boot::BootState;
//!
//! static mut MEMORY: MemoryManager<IdentityMapper> = MemoryManager::new(IdentityMapper);
//!
//! fn bring_up(boot: &BootState) -> Result<(), kernel_alloc::MemoryError> {
//!     let memory = unsafe { &mut *(&raw mut MEMORY) };
//!     unsafe { memory.init(boot)? };
//!     let buffer = memory.allocate(3 * 4096)?;
//!     memory.free(buffer)?;
//!     Ok(())
//! }
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod allocator;
pub mod arena;
pub mod error;
pub mod fatal;
pub mod manager;
pub mod mapped;
pub mod memory_map;
pub mod phys_mapper;
pub mod physical;
pub mod virtual_region;

#[cfg(test)]
mod testing;

pub use crate::error::{MalformedMemoryMap, MemoryError};
pub use crate::manager::{BootstrapState, MemoryManager};
pub use crate::memory_map::{MemoryKind, MemoryMapEntry};

/// Physical region nodes (free and used lists combined).
pub const PHYSICAL_REGION_SLOTS: usize = 128;

/// Virtual region nodes (free and allocated lists combined).
pub const VIRTUAL_REGION_SLOTS: usize = 256;

/// Runs of consecutively backed pages that can ever be recorded.
///
/// A run only breaks where the backing does: at a page-table frame, at the
/// end of a free physical region, or at a page that was already backed.
pub const MAPPED_RUN_SLOTS: usize = 512;
