use crate::{
    common::vhdl_name::VhdlName, owner::OwnerId, statement::Statement, variable::VarId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(pub(crate) usize);

/// A clocked process.
///
/// The process owns every value its statements assign. On reset, all of them
/// return to their reset value; the clocked branch runs the statements in the
/// order they were pushed.
#[derive(Debug, Clone)]
pub struct Process {
    /// While not required in VHDL, a label significantly improves the ability
    /// to debug generated code and simulations, and is thus required here.
    pub(crate) label: VhdlName,
    pub(crate) owner: OwnerId,
    pub(crate) clock: VarId,
    pub(crate) reset: Option<VarId>,
    pub(crate) variables: Vec<VarId>,
    pub(crate) statements: Vec<Statement>,
}

impl Process {
    pub fn label(&self) -> &VhdlName {
        &self.label
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn clock(&self) -> VarId {
        self.clock
    }

    pub fn reset(&self) -> Option<VarId> {
        self.reset
    }

    pub fn variables(&self) -> &[VarId] {
        &self.variables
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }
}
