use crate::{CELLS, COLUMNS, DEFAULT_ATTRIBUTE, REPLACEMENT_GLYPH, VgaCell};
use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};

/// Storage for the screen's cells, indexed row-major.
pub trait CellBuffer {
    /// Store `cell` at `index`; out-of-range indices are ignored.
    fn write(&self, index: usize, cell: VgaCell);

    /// Read the cell at `index`.
    fn read(&self, index: usize) -> VgaCell;
}

/// Text console with a linear cursor.
///
/// The kernel runs on one core without preemption; the atomic cursor only
/// makes the console usable from a `static`.
pub struct Terminal<B: CellBuffer> {
    buffer: B,
    cursor: AtomicUsize,
}

impl<B: CellBuffer> Terminal<B> {
    #[must_use]
    pub const fn new(buffer: B) -> Self {
        Self {
            buffer,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Blank every cell and move the cursor to the top left.
    pub fn clear(&self) {
        for index in 0..CELLS {
            self.buffer.write(index, VgaCell::BLANK);
        }
        self.cursor.store(0, Ordering::Relaxed);
    }

    /// Write `text` at the cursor in the default colours.
    pub fn print(&self, text: &str) {
        for byte in text.bytes() {
            self.put_byte(byte);
        }
    }

    fn put_byte(&self, byte: u8) {
        let mut cursor = self.cursor.load(Ordering::Relaxed);
        if byte == b'\n' {
            cursor = (cursor / COLUMNS + 1) * COLUMNS;
        } else {
            let glyph = if byte.is_ascii() { byte } else { REPLACEMENT_GLYPH };
            self.buffer.write(cursor, VgaCell::new(glyph, DEFAULT_ATTRIBUTE));
            cursor += 1;
        }

        if cursor >= CELLS {
            self.scroll();
            cursor -= COLUMNS;
        }
        self.cursor.store(cursor, Ordering::Relaxed);
    }

    /// Move every row up by one and blank the last row.
    fn scroll(&self) {
        for index in COLUMNS..CELLS {
            self.buffer.write(index - COLUMNS, self.buffer.read(index));
        }
        for index in CELLS - COLUMNS..CELLS {
            self.buffer.write(index, VgaCell::BLANK);
        }
    }

    #[inline]
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }

    #[inline]
    #[must_use]
    pub const fn buffer(&self) -> &B {
        &self.buffer
    }

    /// Formatted printing, so `write!(terminal, ...)` works on a shared reference.
    ///
    /// # Errors
    /// Only if a `Display` implementation fails.
    pub fn write_fmt(&self, args: fmt::Arguments<'_>) -> fmt::Result {
        fmt::write(&mut Writer(self), args)
    }
}

struct Writer<'a, B: CellBuffer>(&'a Terminal<B>);

impl<B: CellBuffer> fmt::Write for Writer<'_, B> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.print(s);
        Ok(())
    }
}
