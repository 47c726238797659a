//! Unrecoverable memory errors.

use crate::error::MemoryError;
use log::error;

/// Log `err` and stop the machine.
///
/// On bare metal interrupts are disabled and the core parks in `hlt`. Hosted
/// builds panic instead so tests can observe the failure.
#[cold]
pub fn halt(err: &MemoryError) -> ! {
    error!("fatal memory error: {err}");
    stop(err)
}

#[cfg(all(target_os = "none", target_arch = "x86_64"))]
fn stop(_err: &MemoryError) -> ! {
    loop {
        unsafe {
            core::arch::asm!("cli; hlt", options(nomem, nostack));
        }
    }
}

#[cfg(not(all(target_os = "none", target_arch = "x86_64")))]
fn stop(err: &MemoryError) -> ! {
    panic!("fatal memory error: {err}")
}
