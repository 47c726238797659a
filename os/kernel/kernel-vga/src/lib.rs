//! # VGA Text Console
//!
//! Diagnostic output for the kernel on the 80×25 colour text buffer at
//! `0xB8000`, plus a [`log`] backend on top of it.
//!
//! ## Overview
//!
//! Before any driver exists the text buffer is the only output the kernel
//! can count on. Every cell is a 16-bit word: the ASCII byte in the low
//! half and a colour attribute in the high half.
//!
//! ```text
//! 15   12 11    8 7             0
//! ┌──────┬───────┬───────────────┐
//! │  bg  │  fg   │   character   │
//! └──────┴───────┴───────────────┘
//! ```
//!
//! ## Core Components
//!
//! * [`Terminal`]: cursor-tracking writer with `clear` / `print`, newline
//!   handling and scrolling.
//! * [`CellBuffer`]: where cells end up. [`VgaTextMemory`] writes the real
//!   buffer with volatile stores; tests use plain memory.
//! * [`VgaLogger`]: `log::Log` implementation writing
//!   `[LEVEL] target: message` lines.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use kernel_vga::{Terminal, VgaLogger, VgaTextMemory};
//! use log::{LevelFilter, info};
//!
//! static CONSOLE: Terminal<VgaTextMemory> = Terminal::new(VgaTextMemory::VGA);
//! static LOGGER: VgaLogger<VgaTextMemory> = VgaLogger::new(&CONSOLE, LevelFilter::Info);
//!
//! CONSOLE.clear();
//! CONSOLE.print("booting\n");
//! LOGGER.init().expect("logger initialization");
//! info!("console ready");
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod colour;
mod logger;
mod memory;
mod terminal;

pub use colour::{Attribute, DEFAULT_ATTRIBUTE, VgaCell, VgaColour};
pub use logger::VgaLogger;
pub use memory::VgaTextMemory;
pub use terminal::{CellBuffer, Terminal};

/// Characters per row.
pub const COLUMNS: usize = 80;

/// Rows on screen.
pub const ROWS: usize = 25;

/// Cells on screen.
pub const CELLS: usize = COLUMNS * ROWS;

/// Glyph printed in place of bytes outside ASCII (a small filled square).
pub const REPLACEMENT_GLYPH: u8 = 0xFE;
