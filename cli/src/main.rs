use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use log::{error, LevelFilter};

use dfc::report::ReportLogger;
use dfc_common::error::Result;
use dfc_parser::project::Project;

/// Generates VHDL for a scheduled dataflow graph
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// The project file
    project: PathBuf,

    /// Write the generated files here instead of the project's output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Emit stage comments and echo debug messages
    #[arg(short, long)]
    verbose: bool,

    /// Only echo errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Treat unmapped outputs and unbounded feedback as errors
    #[arg(long)]
    strict: bool,
}

impl Cli {
    fn echo(&self) -> LevelFilter {
        if self.quiet {
            LevelFilter::Error
        } else if self.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        }
    }

    fn project(&self) -> Result<Project> {
        let mut project = Project::from_path(&self.project)?;
        if let Some(output_dir) = &self.output_dir {
            project.output_dir = output_dir.clone();
        }
        project.verbose |= self.verbose;
        if self.strict {
            project.strict.unmapped_outputs = true;
            project.strict.feedback_bounds = true;
        }
        Ok(project)
    }
}

fn run(cli: &Cli, logger: &ReportLogger) -> Result<()> {
    let project = cli.project()?;
    let result = dfc::compile(&project);
    if project.output_dir.is_dir() {
        logger.write(&project.output_dir)?;
    }
    result.map(|_| ())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let logger = match ReportLogger::install(cli.echo()) {
        Ok(logger) => logger,
        Err(err) => {
            eprintln!("{}", err);
            return ExitCode::FAILURE;
        }
    };
    match run(&cli, logger) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
