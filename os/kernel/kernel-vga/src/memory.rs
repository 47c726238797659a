use crate::{CELLS, CellBuffer, VgaCell};

/// The adapter's text buffer, accessed with volatile word stores.
#[derive(Copy, Clone, Debug)]
pub struct VgaTextMemory {
    base: usize,
}

impl VgaTextMemory {
    /// Colour text buffer in identity-mapped low memory.
    pub const VGA: Self = Self { base: 0xB_8000 };

    /// Text buffer at a different address.
    ///
    /// # Safety
    /// `base` must point to [`CELLS`] writable 16-bit cells for the lifetime
    /// of the value.
    #[must_use]
    pub const unsafe fn at(base: usize) -> Self {
        Self { base }
    }

    #[inline]
    fn cell(self, index: usize) -> *mut u16 {
        core::ptr::with_exposed_provenance_mut::<u16>(self.base).wrapping_add(index)
    }
}

impl CellBuffer for VgaTextMemory {
    fn write(&self, index: usize, cell: VgaCell) {
        if index < CELLS {
            // SAFETY: in bounds of the text buffer.
            unsafe { self.cell(index).write_volatile(cell.into_word()) };
        }
    }

    fn read(&self, index: usize) -> VgaCell {
        if index < CELLS {
            // SAFETY: in bounds of the text buffer.
            VgaCell::from_word(unsafe { self.cell(index).read_volatile() })
        } else {
            VgaCell::BLANK
        }
    }
}
