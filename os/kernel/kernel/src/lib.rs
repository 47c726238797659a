//! # Kernel Entry Point
//!
//! The loader switches to long mode, builds the page-table scaffold, copies
//! the BIOS memory map and the [`BootState`] into low memory and calls
//! [`kernel_main`] with the C ABI.
//!
//! The crate is a library so the boot build can link it as a static
//! library (`cargo rustc --crate-type staticlib`) behind the loader, and so
//! its pieces build and test on the host.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

use core::fmt;
use kernel_alloc::phys_mapper::IdentityMapper;
use kernel_alloc::{MemoryError, MemoryManager, fatal};
use kernel_info::boot::{BootState, KernelEntryFn};
use kernel_vga::{Terminal, VgaLogger, VgaTextMemory};
use kernel_vmem::PhysMapper;
use log::{LevelFilter, info};

static CONSOLE: Terminal<VgaTextMemory> = Terminal::new(VgaTextMemory::VGA);

static LOGGER: VgaLogger<VgaTextMemory> = VgaLogger::new(&CONSOLE, LevelFilter::Info);

/// The kernel's only memory manager. Touched exclusively by [`kernel_main`].
static mut MEMORY: MemoryManager<IdentityMapper> = MemoryManager::new(IdentityMapper);

/// The kernel entry point.
///
/// # ABI
/// `extern "C"` so the loader can pass `boot_state` in `RDI`. The loader
/// guarantees the record, the memory map and the page tables stay identity
/// mapped.
#[unsafe(no_mangle)]
pub extern "C" fn kernel_main(boot_state: *const BootState) -> ! {
    CONSOLE.clear();
    if LOGGER.init().is_err() {
        CONSOLE.print("logger already installed\n");
    }

    // SAFETY: single core, no interrupts; this is the only access.
    let memory = unsafe { &mut *(&raw mut MEMORY) };
    // SAFETY: the loader hands over a valid, identity-mapped record.
    match unsafe { boot_state.as_ref() } {
        Some(boot) => match unsafe { memory.init(boot) } {
            Ok(()) => {
                let _ = writeln!(CONSOLE, "{}", Status(memory));
                info!("kernel initialised");
            }
            Err(err) => report(&err),
        },
        None => CONSOLE.print("no boot state\n"),
    }

    halt()
}

const _: KernelEntryFn = kernel_main;

fn report(err: &MemoryError) {
    if err.is_fatal() {
        fatal::halt(err);
    }
    let _ = writeln!(CONSOLE, "memory init failed: {err}");
}

/// One-line summary of the memory manager.
pub struct Status<'a, M: PhysMapper>(pub &'a MemoryManager<M>);

impl<M: PhysMapper> fmt::Display for Status<'_, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let window = self.0.window();
        write!(
            f,
            "memory: {} free pages, window {:#x}..{:#x}",
            self.0.free_physical_pages(),
            window.base.as_u64(),
            window.end()
        )
    }
}

/// Park the core.
pub fn halt() -> ! {
    loop {
        #[cfg(all(target_os = "none", target_arch = "x86_64"))]
        unsafe {
            core::arch::asm!("hlt", options(nomem, nostack));
        }
        #[cfg(not(all(target_os = "none", target_arch = "x86_64")))]
        core::hint::spin_loop();
    }
}

#[cfg(all(target_os = "none", not(test)))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    let _ = writeln!(CONSOLE, "panic: {}", info.message());
    halt()
}
