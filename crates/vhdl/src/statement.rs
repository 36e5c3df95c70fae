//! Sequential statements. They are built through the
//! [`Entity`](crate::entity::Entity) so ownership and direction rules are
//! checked on construction, and each one remembers the process it belongs to.
use textwrap::indent;

use dfc_common::error::{Error, Result};

use crate::{
    condition::Condition,
    entity::RenderOptions,
    process::ProcessId,
    value::{Scope, Value},
    variable::{VariableKind, VarId},
};

/// Candidate values with their guards. Exactly one case has no guard and it
/// must be the last one.
pub type Cases = Vec<(Value, Option<Condition>)>;

pub(crate) fn validate_cases(target: &str, cases: &Cases) -> Result<()> {
    match cases.iter().position(|(_, guard)| guard.is_none()) {
        None => Err(Error::BackEndError(format!(
            "assignment to {} has no default case",
            target
        ))),
        Some(index) if index + 1 != cases.len() => Err(Error::BackEndError(format!(
            "the default case of the assignment to {} must be the last case",
            target
        ))),
        Some(_) if cases.iter().filter(|(_, guard)| guard.is_none()).count() > 1 => {
            Err(Error::BackEndError(format!(
                "assignment to {} has more than one default case",
                target
            )))
        }
        Some(_) => Ok(()),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    Assign {
        target: Value,
        cases: Cases,
        /// Process variables are assigned with `:=`.
        variable: bool,
    },
    If {
        condition: Condition,
        then: Box<Statement>,
        otherwise: Option<Box<Statement>>,
    },
    IfElsif {
        branches: Vec<(Condition, Statement)>,
        otherwise: Option<Box<Statement>>,
    },
    /// Dispatch on a state variable. Unlisted states fall back to the reset
    /// state.
    Case {
        state: VarId,
        arms: Vec<(usize, Statement)>,
    },
    Multi(Vec<Statement>),
    /// Emitted only in verbose mode.
    Comment(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub(crate) process: ProcessId,
    pub(crate) kind: StatementKind,
}

impl Statement {
    pub fn process(&self) -> ProcessId {
        self.process
    }

    pub fn kind(&self) -> &StatementKind {
        &self.kind
    }

    pub fn is_empty(&self) -> bool {
        match &self.kind {
            StatementKind::Multi(statements) => statements.iter().all(|s| s.is_empty()),
            _ => false,
        }
    }

    pub(crate) fn render(
        &self,
        scope: &Scope,
        options: &RenderOptions,
        pre: &str,
    ) -> Result<String> {
        match &self.kind {
            StatementKind::Assign {
                target,
                cases,
                variable,
            } => {
                let operator = if *variable { ":=" } else { "<=" };
                let width = target.width(scope.entity)?;
                let target = target.render(scope, width)?;
                if let [(value, None)] = cases.as_slice() {
                    return Ok(format!(
                        "{} {} {};\n",
                        target,
                        operator,
                        value.render(scope, width)?
                    ));
                }
                let mut result = String::new();
                for (index, (value, guard)) in cases.iter().enumerate() {
                    let line = format!("{} {} {};\n", target, operator, value.render(scope, width)?);
                    match guard {
                        Some(guard) => {
                            let keyword = if index == 0 { "if" } else { "elsif" };
                            result.push_str(&format!("{} {} then\n", keyword, guard.render(scope)?));
                        }
                        None => result.push_str("else\n"),
                    }
                    result.push_str(&indent(&line, pre));
                }
                result.push_str("end if;\n");
                Ok(result)
            }
            StatementKind::If {
                condition,
                then,
                otherwise,
            } => {
                let mut result = format!("if {} then\n", condition.render(scope)?);
                result.push_str(&indent(&then.render(scope, options, pre)?, pre));
                if let Some(otherwise) = otherwise {
                    result.push_str("else\n");
                    result.push_str(&indent(&otherwise.render(scope, options, pre)?, pre));
                }
                result.push_str("end if;\n");
                Ok(result)
            }
            StatementKind::IfElsif {
                branches,
                otherwise,
            } => {
                let mut result = String::new();
                for (index, (condition, statement)) in branches.iter().enumerate() {
                    let keyword = if index == 0 { "if" } else { "elsif" };
                    result.push_str(&format!("{} {} then\n", keyword, condition.render(scope)?));
                    result.push_str(&indent(&statement.render(scope, options, pre)?, pre));
                }
                if let Some(otherwise) = otherwise {
                    result.push_str("else\n");
                    result.push_str(&indent(&otherwise.render(scope, options, pre)?, pre));
                }
                result.push_str("end if;\n");
                Ok(result)
            }
            StatementKind::Case { state, arms } => {
                let var = scope.reference(*state)?;
                let states = match var.kind() {
                    VariableKind::StateVar(states) => states,
                    _ => {
                        return Err(Error::BackEndError(format!(
                            "{} is not a state variable",
                            var.name()
                        )))
                    }
                };
                let state_name = |index: usize| {
                    states.get(index).ok_or_else(|| {
                        Error::BackEndError(format!("{} has no state {}", var.name(), index))
                    })
                };
                let mut body = String::new();
                for (index, statement) in arms {
                    body.push_str(&format!("when {} =>\n", state_name(*index)?));
                    body.push_str(&indent(&statement.render(scope, options, pre)?, pre));
                }
                body.push_str("when others =>\n");
                body.push_str(&indent(
                    &format!("{} <= {};\n", var.name(), state_name(0)?),
                    pre,
                ));
                Ok(format!(
                    "case {} is\n{}end case;\n",
                    var.name(),
                    indent(&body, pre)
                ))
            }
            StatementKind::Multi(statements) => statements
                .iter()
                .map(|s| s.render(scope, options, pre))
                .collect::<Result<Vec<_>>>()
                .map(|parts| parts.concat()),
            StatementKind::Comment(text) => {
                if options.verbose {
                    Ok(text
                        .split_terminator('\n')
                        .map(|line| format!("-- {}\n", line))
                        .collect())
                } else {
                    Ok(String::new())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_case_must_be_last() {
        let a = (Value::int(1), Some(Condition::Const(true)));
        let default = (Value::int(0), None);
        assert!(validate_cases("x", &vec![a.clone(), default.clone()]).is_ok());
        assert!(validate_cases("x", &vec![default.clone(), a.clone()]).is_err());
        assert!(validate_cases("x", &vec![a]).is_err());
        assert!(validate_cases("x", &vec![default.clone(), default]).is_err());
    }
}
