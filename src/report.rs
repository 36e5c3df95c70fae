//! A [`log::Log`] implementation that keeps what generation reported.
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use log::{Level, LevelFilter, Log, Metadata, Record};

use dfc_common::error::{Error, Result};

pub const REPORT_FILE: &str = "report.txt";

/// Echoes records up to `echo` to stderr and keeps every warning and info
/// record for the report.
#[derive(Debug)]
pub struct ReportLogger {
    echo: LevelFilter,
    lines: Mutex<Vec<String>>,
}

impl ReportLogger {
    pub fn new(echo: LevelFilter) -> Self {
        ReportLogger {
            echo,
            lines: Mutex::new(vec![]),
        }
    }

    /// Installs a logger for the rest of the process.
    pub fn install(echo: LevelFilter) -> Result<&'static ReportLogger> {
        let logger: &'static ReportLogger = Box::leak(Box::new(ReportLogger::new(echo)));
        log::set_logger(logger)?;
        log::set_max_level(echo.max(LevelFilter::Info));
        Ok(logger)
    }

    /// The lines kept so far.
    pub fn lines(&self) -> Vec<String> {
        match self.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Writes the kept lines to `report.txt` in `directory`.
    pub fn write(&self, directory: &Path) -> Result<PathBuf> {
        let path = directory.join(REPORT_FILE);
        let mut contents = self.lines().join("\n");
        contents.push('\n');
        fs::write(&path, contents).map_err(|err| {
            Error::FileIOError(format!("Unable to write {}: {}", path.display(), err))
        })?;
        Ok(path)
    }
}

impl Log for ReportLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.echo || metadata.level() <= Level::Info
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!("{:<5} {}", record.level(), record.args());
        if record.level() <= self.echo {
            eprintln!("{}", line);
        }
        if matches!(record.level(), Level::Warn | Level::Info) {
            let mut lines = match self.lines.lock() {
                Ok(lines) => lines,
                Err(poisoned) => poisoned.into_inner(),
            };
            lines.push(line);
        }
    }

    fn flush(&self) {}
}
