//! The library file: component entries plus the manifest of generated files.
use std::{fmt, fs, path::Path};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use dfc_common::error::{Error, Result};

use crate::{entry::LibraryEntry, kind::CoreKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileKind {
    Vhdl,
    Package,
    Report,
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileKind::Vhdl => write!(f, "VHDL"),
            FileKind::Package => write!(f, "PACKAGE"),
            FileKind::Report => write!(f, "REPORT"),
        }
    }
}

/// A file produced by one compilation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileInfo {
    pub compile_id: u32,
    pub name: String,
    pub kind: FileKind,
    pub directory: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Library {
    #[serde(rename = "entry", default)]
    entries: Vec<LibraryEntry>,
    #[serde(rename = "file", default)]
    files: Vec<FileInfo>,
}

impl Library {
    pub fn parse(src: &str) -> Result<Self> {
        let library: Library = toml::from_str(src).map_err(|err| {
            Error::LibraryError(format!("Unable to parse the library file: {}", err))
        })?;
        for entry in &library.entries {
            entry.streams()?;
        }
        Ok(library)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let src = fs::read_to_string(path).map_err(|err| {
            Error::FileIOError(format!("Unable to read {}: {}", path.display(), err))
        })?;
        Library::parse(&src)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string(self).map_err(|err| {
            Error::LibraryError(format!("Unable to serialize the library: {}", err))
        })
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn entries(&self) -> &[LibraryEntry] {
        &self.entries
    }

    /// The active entry with the given name.
    pub fn entry(&self, name: &str) -> Option<&LibraryEntry> {
        self.entries
            .iter()
            .find(|e| e.active && e.name.eq_ignore_ascii_case(name))
    }

    /// Active entries of one kind, in library order.
    pub fn entries_of_kind(&self, kind: CoreKind) -> impl Iterator<Item = &LibraryEntry> {
        self.entries
            .iter()
            .filter(move |e| e.active && e.kind == kind)
    }

    /// Adds or replaces an entry.
    ///
    /// A new intrinsic deactivates every other entry of its kind; modules and
    /// systems leave other entries untouched.
    pub fn create_entry(&mut self, entry: LibraryEntry) -> Result<()> {
        entry.streams()?;
        if entry.kind.is_intrinsic() {
            for other in self
                .entries
                .iter_mut()
                .filter(|e| e.kind == entry.kind && e.active && e.name != entry.name)
            {
                info!("Deactivating {} {}", other.kind, other.name);
                other.active = false;
            }
        }
        match self.entries.iter_mut().find(|e| e.name == entry.name) {
            Some(existing) => {
                debug!("Replacing library entry {}", entry.name);
                *existing = entry;
            }
            None => self.entries.push(entry),
        }
        Ok(())
    }

    pub fn add_file(&mut self, file: FileInfo) {
        if !self.files.contains(&file) {
            self.files.push(file);
        }
    }

    pub fn files_for(&self, compile_id: u32) -> impl Iterator<Item = &FileInfo> {
        self.files.iter().filter(move |f| f.compile_id == compile_id)
    }
}
