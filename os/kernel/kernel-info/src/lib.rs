//! # Kernel Configuration and Boot Interface
//!
//! Memory layout constants and the bootloader-to-kernel handoff record.
//! Every crate that needs to agree with the loader on a number takes it from
//! here.
//!
//! ## Boot Information ([`boot`])
//! * **Kernel Entry Point**: function signature and calling convention
//! * **Boot State**: offsets of the BIOS memory map and the page-table scaffold
//!
//! ## Memory Layout ([`memory`])
//! * **Page geometry**: page size and entries per table
//! * **Identity region**: the low physical range the loader identity-maps
//! * **Virtual window**: the range handed out by the bootstrap allocator
//!
//! ```text
//! Virtual Address Space Layout (bootstrap):
//!
//! 0x0000_0000_0000_0000 ┌─────────────────────────────────┐
//!                       │  Identity map (loader, 1 MiB)   │
//!                       │  boot record, memory map, VGA,  │
//!                       │  page-table scaffold            │
//! VIRTUAL_MEMORY_START  ├─────────────────────────────────┤ 0x0000_0000_0010_0000
//!                       │  Allocator window               │
//!                       │  (mapped on demand, 4 KiB)      │
//! VIRTUAL_MEMORY_END    ├─────────────────────────────────┤ 0x0000_0000_4000_0000
//!                       │  unused                         │
//! 0x0000_7FFF_FFFF_FFFF └─────────────────────────────────┘
//! ```
//!
//! All layout constants are checked at compile time.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod boot;
pub mod memory;
