//! Processes, sequential statements and concurrent assignments.
use dfc_common::error::{Error, Result, TryResult};

use crate::{
    common::vhdl_name::VhdlName,
    condition::Condition,
    owner::OwnerKind,
    process::{Process, ProcessId},
    statement::{validate_cases, Cases, Statement, StatementKind},
    value::Value,
    variable::{VarId, VariableKind},
};

use super::{Concurrent, Entity};

impl Entity {
    /// A process sensitive to `clk` with a synchronous-looking asynchronous
    /// reset on `rst`.
    pub fn create_process(&mut self, label: impl TryResult<VhdlName>) -> Result<ProcessId> {
        let (clk, rst) = (self.standard.clk, self.standard.rst);
        self.create_clocked_process(label, clk, Some(rst))
    }

    /// A process without reset branch, e.g. for memories.
    pub fn create_process_without_reset(
        &mut self,
        label: impl TryResult<VhdlName>,
    ) -> Result<ProcessId> {
        let clk = self.standard.clk;
        self.create_clocked_process(label, clk, None)
    }

    pub fn create_clocked_process(
        &mut self,
        label: impl TryResult<VhdlName>,
        clock: VarId,
        reset: Option<VarId>,
    ) -> Result<ProcessId> {
        let label = self.claim_name(label)?;
        self.read_var(clock, None)?;
        if let Some(reset) = reset {
            self.read_var(reset, None)?;
        }
        let id = ProcessId(self.processes.len());
        let owner = self.ownership.add_owner(
            format!("process '{}'", label),
            OwnerKind::Process(id),
            Some(self.owner),
            false,
        );
        self.processes.push(Process {
            label,
            owner,
            clock,
            reset,
            variables: vec![],
            statements: vec![],
        });
        Ok(id)
    }

    pub fn process(&self, id: ProcessId) -> Result<&Process> {
        self.processes.get(id.0).ok_or_else(|| {
            Error::InvalidArgument(format!("unknown process {} in {}", id.0, self.name))
        })
    }

    pub fn processes(&self) -> &[Process] {
        &self.processes
    }

    fn check_membership(&self, process: ProcessId, statement: &Statement) -> Result<()> {
        if statement.process() == process {
            Ok(())
        } else {
            Err(Error::BackEndError(format!(
                "a statement of process {} cannot be nested in process {}",
                self.process(statement.process())?.label(),
                self.process(process)?.label()
            )))
        }
    }

    pub fn assign(
        &mut self,
        process: ProcessId,
        target: impl Into<Value>,
        value: impl Into<Value>,
    ) -> Result<Statement> {
        self.assign_cases(process, target, vec![(value.into(), None)])
    }

    /// Guarded assignment: the first case whose guard holds wins, the last
    /// case is unguarded.
    pub fn assign_cases(
        &mut self,
        process: ProcessId,
        target: impl Into<Value>,
        cases: Cases,
    ) -> Result<Statement> {
        let target = target.into();
        let owner = self.process(process)?.owner();
        validate_cases(&self.describe(&target), &cases)?;
        for (value, guard) in &cases {
            self.mark_read(value, Some(process))?;
            if let Some(guard) = guard {
                self.mark_condition_read(guard, Some(process))?;
            }
        }
        self.claim_target(&target, owner, Some(process))?;
        let variable = match target.target_var() {
            Some(var) => matches!(
                self.variable(var)?.kind(),
                VariableKind::ProcessVariable(_)
            ),
            None => false,
        };
        Ok(Statement {
            process,
            kind: StatementKind::Assign {
                target,
                cases,
                variable,
            },
        })
    }

    pub fn if_then(
        &mut self,
        process: ProcessId,
        condition: Condition,
        then: Statement,
        otherwise: Option<Statement>,
    ) -> Result<Statement> {
        self.check_membership(process, &then)?;
        if let Some(otherwise) = &otherwise {
            self.check_membership(process, otherwise)?;
        }
        self.mark_condition_read(&condition, Some(process))?;
        Ok(Statement {
            process,
            kind: StatementKind::If {
                condition,
                then: Box::new(then),
                otherwise: otherwise.map(Box::new),
            },
        })
    }

    pub fn if_elsif(
        &mut self,
        process: ProcessId,
        branches: Vec<(Condition, Statement)>,
        otherwise: Option<Statement>,
    ) -> Result<Statement> {
        if branches.is_empty() {
            return Err(Error::InvalidArgument(
                "an if statement needs at least one branch".to_string(),
            ));
        }
        for (condition, statement) in &branches {
            self.check_membership(process, statement)?;
            self.mark_condition_read(condition, Some(process))?;
        }
        if let Some(otherwise) = &otherwise {
            self.check_membership(process, otherwise)?;
        }
        Ok(Statement {
            process,
            kind: StatementKind::IfElsif {
                branches,
                otherwise: otherwise.map(Box::new),
            },
        })
    }

    /// A case statement over a state variable. The process takes ownership
    /// of the state variable, since unlisted states return to the reset
    /// state.
    pub fn case(
        &mut self,
        process: ProcessId,
        state: VarId,
        arms: Vec<(usize, Statement)>,
    ) -> Result<Statement> {
        let count = match self.variable(state)?.kind() {
            VariableKind::StateVar(states) => states.len(),
            _ => {
                return Err(Error::InvalidArgument(format!(
                    "{} is not a state variable",
                    self.variable(state)?.name()
                )))
            }
        };
        for (index, statement) in &arms {
            if *index >= count {
                return Err(Error::InvalidArgument(format!(
                    "{} has no state {}",
                    self.variable(state)?.name(),
                    index
                )));
            }
            self.check_membership(process, statement)?;
        }
        let owner = self.process(process)?.owner();
        self.read_var(state, Some(process))?;
        self.claim_target(&Value::Var(state), owner, Some(process))?;
        Ok(Statement {
            process,
            kind: StatementKind::Case { state, arms },
        })
    }

    pub fn multi(&self, process: ProcessId, statements: Vec<Statement>) -> Result<Statement> {
        for statement in &statements {
            self.check_membership(process, statement)?;
        }
        Ok(Statement {
            process,
            kind: StatementKind::Multi(statements),
        })
    }

    pub fn comment(&self, process: ProcessId, text: impl Into<String>) -> Statement {
        Statement {
            process,
            kind: StatementKind::Comment(text.into()),
        }
    }

    /// Appends a statement to the clocked branch of its process.
    pub fn push(&mut self, process: ProcessId, statement: Statement) -> Result<()> {
        self.check_membership(process, &statement)?;
        self.processes[process.0].statements.push(statement);
        Ok(())
    }

    /// Builds and appends an assignment.
    pub fn push_assign(
        &mut self,
        process: ProcessId,
        target: impl Into<Value>,
        value: impl Into<Value>,
    ) -> Result<()> {
        let statement = self.assign(process, target, value)?;
        self.push(process, statement)
    }

    /// `target <= value;` in the concurrent region.
    pub fn create_synchronous_statement(
        &mut self,
        target: impl Into<Value>,
        value: impl Into<Value>,
    ) -> Result<()> {
        self.add_concurrent(target.into(), vec![(value.into(), None)], false)
    }

    /// `target <= v1 when c1 else ... vn;` in the concurrent region.
    pub fn create_synchronous_cases(&mut self, target: impl Into<Value>, cases: Cases) -> Result<()> {
        self.add_concurrent(target.into(), cases, false)
    }

    /// Drives `target` with `value` until any other owner claims it, at which
    /// point this assignment disappears.
    pub fn drive_default(&mut self, target: impl Into<Value>, value: impl Into<Value>) -> Result<()> {
        self.add_concurrent(target.into(), vec![(value.into(), None)], true)
    }

    fn add_concurrent(&mut self, target: Value, cases: Cases, transferable: bool) -> Result<()> {
        let description = self.describe(&target);
        validate_cases(&description, &cases)?;
        for (value, guard) in &cases {
            self.mark_read(value, None)?;
            if let Some(guard) = guard {
                self.mark_condition_read(guard, None)?;
            }
        }
        let (kind, label) = if transferable {
            (OwnerKind::Default, format!("default driver of {}", description))
        } else {
            (
                OwnerKind::Statement,
                format!("concurrent assignment to {}", description),
            )
        };
        let owner = self
            .ownership
            .add_owner(label, kind, Some(self.owner), transferable);
        self.claim_target(&target, owner, None)?;
        self.concurrent.push(Concurrent {
            target,
            cases,
            owner,
        });
        Ok(())
    }
}
