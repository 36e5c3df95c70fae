//! Compiles one project: loads its graph and library, generates the VHDL
//! and records the result in the library.
use std::{fs, path::Path};

use log::{info, warn};

use dfc_backend::{db::Database, generate, BackEndOptions, Generated};
use dfc_common::error::{Error, Result};
use dfc_library::store::{FileInfo, FileKind, Library};
use dfc_parser::{graph_file::graph_from_path, project::Project};

pub mod report;

use report::REPORT_FILE;

fn load_library(path: &Path) -> Result<Library> {
    if path.exists() {
        Library::from_path(path)
    } else {
        warn!(
            "Library {} does not exist yet and starts out empty",
            path.display()
        );
        Ok(Library::default())
    }
}

/// Generates the project's component into its output directory, then adds
/// the component and its files to the library.
///
/// The report is listed in the manifest but written by the caller once
/// generation is over.
pub fn compile(project: &Project) -> Result<Generated> {
    let graph = graph_from_path(&project.graph)?;
    if graph.name != project.name {
        warn!(
            "Project {} compiles graph {}, the component is named after the graph",
            project.name, graph.name
        );
    }
    let mut library = load_library(&project.library)?;
    let options = BackEndOptions {
        verbose: project.verbose,
        strict_unmapped_outputs: project.strict.unmapped_outputs,
        strict_feedback_bounds: project.strict.feedback_bounds,
    };
    let mut db = Database::new(library.clone(), graph);
    let generated = generate(&mut db, &options)?;

    let directory = project.output_dir.as_path();
    fs::create_dir_all(directory).map_err(|err| {
        Error::FileIOError(format!(
            "Unable to create {}: {}",
            directory.display(),
            err
        ))
    })?;
    for file in &generated.files {
        let path = directory.join(&file.name);
        fs::write(&path, &file.contents).map_err(|err| {
            Error::FileIOError(format!("Unable to write {}: {}", path.display(), err))
        })?;
        library.add_file(FileInfo {
            compile_id: project.compile_id,
            name: file.name.clone(),
            kind: file.kind,
            directory: directory.display().to_string(),
        });
    }
    library.add_file(FileInfo {
        compile_id: project.compile_id,
        name: REPORT_FILE.to_string(),
        kind: FileKind::Report,
        directory: directory.display().to_string(),
    });
    library.create_entry(generated.entry.clone())?;
    library.write(&project.library)?;
    info!(
        "Wrote {} files to {}",
        generated.files.len(),
        directory.display()
    );
    Ok(generated)
}
