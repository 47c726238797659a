use crate::{CellBuffer, Terminal};
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

/// `log` backend printing to a [`Terminal`].
pub struct VgaLogger<B: CellBuffer + Sync + 'static> {
    terminal: &'static Terminal<B>,
    max_level: LevelFilter,
}

impl<B: CellBuffer + Sync + 'static> VgaLogger<B> {
    #[must_use]
    pub const fn new(terminal: &'static Terminal<B>, max_level: LevelFilter) -> Self {
        Self {
            terminal,
            max_level,
        }
    }

    /// Install as the global logger. Call this once during early init.
    ///
    /// # Errors
    /// If a logger is already installed.
    pub fn init(&'static self) -> Result<(), SetLoggerError> {
        log::set_logger(self)?;
        log::set_max_level(self.max_level);
        Ok(())
    }
}

impl<B: CellBuffer + Sync + 'static> Log for VgaLogger<B> {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // Format: "[LEVEL] target: message\n"
        let _ = writeln!(
            self.terminal,
            "[{}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}
