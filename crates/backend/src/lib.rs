//! The VHDL back end of the dataflow compiler.
//!
//! [`generate`] turns the scheduled graph held by a [`db::Database`] into the
//! design units of one component: the pipeline entity, for systems the two
//! stream controllers and their FIFOs, and the helper package. It also
//! describes the component as a library entry so later graphs can call it.
use std::{collections::BTreeSet, sync::Arc};

use log::{debug, info};

use dfc_common::error::{Error, Result};
use dfc_library::{entry::LibraryEntry, kind::CoreKind, store::FileKind};
use dfc_query::{graph::ComponentKind, GraphQueries};
use dfc_vhdl::{
    entity::RenderOptions,
    package::{helper_package, HELPER_PACKAGE},
};

use crate::{
    controllers::{fifo, input::input_controller, output::output_controller},
    db::Database,
    pipeline::Pipeline,
    rewrite::rewrite_intrinsics,
};

pub mod controllers;
pub mod db;
pub mod pipeline;
pub mod rewrite;
pub mod system;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackEndOptions {
    /// Emit comments describing the pipeline stages.
    pub verbose: bool,
    /// Reject instances with output ports left open.
    pub strict_unmapped_outputs: bool,
    /// Reject feedback read before the stage that writes it.
    pub strict_feedback_bounds: bool,
}

impl BackEndOptions {
    fn render(&self) -> RenderOptions {
        RenderOptions {
            verbose: self.verbose,
            strict_unmapped_outputs: self.strict_unmapped_outputs,
        }
    }
}

/// One design unit, named after the file it belongs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    pub name: String,
    pub kind: FileKind,
    pub contents: String,
}

impl GeneratedFile {
    fn vhdl(name: impl std::fmt::Display, contents: String) -> Self {
        GeneratedFile {
            name: format!("{}.vhdl", name),
            kind: FileKind::Vhdl,
            contents,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Generated {
    /// The component as callers see it.
    pub entry: LibraryEntry,
    /// The top-level entity comes first.
    pub files: Vec<GeneratedFile>,
}

/// Generates the component described by the graph of `db`.
///
/// Intrinsic operations are replaced by calls into the library first, so
/// the graph held by `db` afterwards is the rewritten one.
pub fn generate(db: &mut Database, options: &BackEndOptions) -> Result<Generated> {
    db.validate()?;
    let original = db.graph();
    if original.kind == ComponentKind::Module && !original.inductions.is_empty() {
        return Err(Error::BackEndError(format!(
            "module {} declares loop inductions, which only systems can count",
            original.name
        )));
    }
    let rewritten = rewrite_intrinsics(&*db)?;
    db.set_graph(Arc::new(rewritten));

    let db: &Database = db;
    let graph = db.graph();
    let interval = match db.feedback_distance(options.strict_feedback_bounds)? {
        Some(distance) => distance,
        None => {
            debug!("{} has no feedback", graph.name);
            0
        }
    };
    let render = options.render();
    let mut files = vec![];

    let mut pipeline = Pipeline::try_new(db)?;
    match graph.kind {
        ComponentKind::Module => pipeline.module_interface(interval)?,
        ComponentKind::System => {
            let input = input_controller(&graph, interval)?;
            let output = output_controller(&graph)?;
            system::wire_system(&mut pipeline, &input, &output)?;
            for controller in [&input, &output] {
                files.push(GeneratedFile::vhdl(
                    controller.entity.name(),
                    controller.entity.generate_code(&render)?,
                ));
            }
            let widths: BTreeSet<_> = input
                .fifo_widths
                .union(&output.fifo_widths)
                .copied()
                .collect();
            for width in widths {
                files.push(GeneratedFile::vhdl(fifo::name(width), fifo::code(width)));
            }
        }
    }
    pipeline.lower()?;
    pipeline.instantiate_cores()?;
    let (entity, ports) = pipeline.finish()?;
    files.insert(
        0,
        GeneratedFile::vhdl(entity.name(), entity.generate_code(&render)?),
    );
    files.push(GeneratedFile {
        name: format!("{}.vhdl", HELPER_PACKAGE),
        kind: FileKind::Package,
        contents: helper_package()?,
    });

    let kind = match graph.kind {
        ComponentKind::Module => CoreKind::Module,
        ComponentKind::System => CoreKind::System,
    };
    let mut entry_ports = LibraryEntry::standard_ports();
    entry_ports.extend(ports.into_values());
    let entry = LibraryEntry::new(graph.name.clone(), kind, graph.delay, entry_ports);
    info!(
        "Generated {} with a delay of {} in {} files",
        entry.signature(),
        graph.delay,
        files.len()
    );
    Ok(Generated { entry, files })
}
