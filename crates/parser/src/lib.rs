//! Loading of the files the back end consumes: the scheduled dataflow graph
//! produced by the front end and the project file that ties a compilation
//! together.

pub mod graph_file;
pub mod project;
