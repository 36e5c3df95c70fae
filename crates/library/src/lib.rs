//! The persisted component library and the engine that picks library cores
//! for operations the pipeline cannot express inline.

pub mod entry;
pub mod kind;
pub mod port;
pub mod resolve;
pub mod store;
pub mod stream;

#[cfg(test)]
pub(crate) mod test_utils;
