//! RTL object model and VHDL emission.
//!
//! An [`Entity`](entity::Entity) owns its variables, processes and component
//! instances in arenas; everything else refers to them by index. Construction
//! checks the hardware rules (single driver per bit, port directions, name
//! uniqueness) so that code generation only has to print.

pub mod attribute;
pub mod common;
pub mod component;
pub mod condition;
pub mod entity;
pub mod owner;
pub mod package;
pub mod process;
pub mod statement;
pub mod traits;
pub mod usings;
pub mod value;
pub mod variable;
