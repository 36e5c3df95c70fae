use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use dfc_common::error::{Error, Result};

/// Switches that turn lenient diagnostics into errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Strictness {
    /// Unconnected output ports of instances are a mapping error instead of a
    /// warning.
    #[serde(default)]
    pub unmapped_outputs: bool,
    /// Feedback that reaches backwards, or is stored but never loaded, is a
    /// graph error instead of "no extra throttling".
    #[serde(default)]
    pub feedback_bounds: bool,
}

#[derive(Debug, Deserialize)]
pub struct ProjectFile {
    name: String,
    graph: String,
    library: String,
    output_dir: String,
    #[serde(default)]
    compile_id: u32,
    #[serde(default)]
    verbose: bool,
    #[serde(default)]
    strict: Strictness,
}

/// A loaded project, with paths resolved against the project file's
/// directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub name: String,
    pub graph: PathBuf,
    pub library: PathBuf,
    pub output_dir: PathBuf,
    pub compile_id: u32,
    pub verbose: bool,
    pub strict: Strictness,
}

impl Project {
    pub fn parse(src: &str, location: impl AsRef<Path>) -> Result<Self> {
        let file: ProjectFile = toml::from_str(src).map_err(|err| {
            Error::ProjectError(format!("Unable to parse the project file: {}", err))
        })?;
        if file.name.trim().is_empty() {
            return Err(Error::ProjectError("the project has no name".to_string()));
        }
        let base = location.as_ref();
        let resolve = |path: &str| {
            let path = Path::new(path);
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                base.join(path)
            }
        };
        Ok(Project {
            graph: resolve(&file.graph),
            library: resolve(&file.library),
            output_dir: resolve(&file.output_dir),
            name: file.name,
            compile_id: file.compile_id,
            verbose: file.verbose,
            strict: file.strict,
        })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let src = fs::read_to_string(path).map_err(|err| {
            Error::ProjectError(format!(
                "Unable to read the project file {}: {}",
                path.display(),
                err
            ))
        })?;
        let location = path.parent().unwrap_or_else(|| Path::new(""));
        Project::parse(&src, location)
    }
}
