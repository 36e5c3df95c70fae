//! Shared building blocks for the back-end crates: the error type, name
//! wrappers, numeric helpers and a handful of traits.

pub mod error;
pub mod name;
pub mod numbers;
pub mod traits;
pub mod util;
