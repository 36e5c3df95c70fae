use dfc_common::error::Result;

use crate::{
    value::{Scope, Value},
    variable::VarId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    Lt,
    Gt,
    Lte,
    Gte,
}

impl Relation {
    fn helper(&self, signed: bool) -> String {
        let relation = match self {
            Relation::Lt => "LT",
            Relation::Gt => "GT",
            Relation::Lte => "LTE",
            Relation::Gte => "GTE",
        };
        format!("DFC_{}{}", if signed { "S" } else { "U" }, relation)
    }
}

/// A boolean expression guarding a statement or an assignment case.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Condition {
    Eq(Value, Value),
    Ne(Value, Value),
    /// Ordered comparison through a helper function. Signed when forced or
    /// when either side is signed.
    Compare {
        relation: Relation,
        lhs: Value,
        rhs: Value,
        force_signed: bool,
    },
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
    Not(Box<Condition>),
    Const(bool),
    Event(VarId),
    RisingEdge(VarId),
}

impl Condition {
    pub fn eq(lhs: impl Into<Value>, rhs: impl Into<Value>) -> Self {
        Condition::Eq(lhs.into(), rhs.into())
    }

    pub fn ne(lhs: impl Into<Value>, rhs: impl Into<Value>) -> Self {
        Condition::Ne(lhs.into(), rhs.into())
    }

    pub fn compare(relation: Relation, lhs: impl Into<Value>, rhs: impl Into<Value>) -> Self {
        Condition::Compare {
            relation,
            lhs: lhs.into(),
            rhs: rhs.into(),
            force_signed: false,
        }
    }

    pub fn compare_signed(
        relation: Relation,
        lhs: impl Into<Value>,
        rhs: impl Into<Value>,
    ) -> Self {
        Condition::Compare {
            relation,
            lhs: lhs.into(),
            rhs: rhs.into(),
            force_signed: true,
        }
    }

    /// `(value = '1')`
    pub fn is_high(value: impl Into<Value>) -> Self {
        Condition::eq(value, Value::int(1))
    }

    /// `(value = '0')`
    pub fn is_low(value: impl Into<Value>) -> Self {
        Condition::eq(value, Value::int(0))
    }

    pub fn and(self, other: Condition) -> Self {
        Condition::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Condition) -> Self {
        Condition::Or(Box::new(self), Box::new(other))
    }

    pub fn not(self) -> Self {
        Condition::Not(Box::new(self))
    }

    /// Conjunction of all conditions, `true` when empty.
    pub fn all(conditions: impl IntoIterator<Item = Condition>) -> Self {
        conditions
            .into_iter()
            .reduce(Condition::and)
            .unwrap_or(Condition::Const(true))
    }

    /// Disjunction of all conditions, `false` when empty.
    pub fn any(conditions: impl IntoIterator<Item = Condition>) -> Self {
        conditions
            .into_iter()
            .reduce(Condition::or)
            .unwrap_or(Condition::Const(false))
    }

    pub fn variables(&self) -> Vec<VarId> {
        let mut result = vec![];
        self.collect_variables(&mut result);
        result
    }

    fn collect_variables(&self, result: &mut Vec<VarId>) {
        match self {
            Condition::Eq(lhs, rhs)
            | Condition::Ne(lhs, rhs)
            | Condition::Compare { lhs, rhs, .. } => {
                lhs.collect_variables(result);
                rhs.collect_variables(result);
            }
            Condition::And(lhs, rhs) | Condition::Or(lhs, rhs) => {
                lhs.collect_variables(result);
                rhs.collect_variables(result);
            }
            Condition::Not(inner) => inner.collect_variables(result),
            Condition::Const(_) => (),
            Condition::Event(var) | Condition::RisingEdge(var) => result.push(*var),
        }
    }

    pub fn render(&self, scope: &Scope) -> Result<String> {
        let entity = scope.entity;
        Ok(match self {
            Condition::Eq(lhs, rhs) | Condition::Ne(lhs, rhs) => {
                let size = lhs.width(entity)?.max(rhs.width(entity)?);
                let operator = if matches!(self, Condition::Eq(_, _)) {
                    "="
                } else {
                    "/="
                };
                format!(
                    "({} {} {})",
                    lhs.render(scope, size)?,
                    operator,
                    rhs.render(scope, size)?
                )
            }
            Condition::Compare {
                relation,
                lhs,
                rhs,
                force_signed,
            } => {
                let size = lhs.width(entity)?.max(rhs.width(entity)?);
                let signed = *force_signed || lhs.is_signed(entity)? || rhs.is_signed(entity)?;
                format!(
                    "{}({}, {}, {})",
                    relation.helper(signed),
                    lhs.render(scope, size)?,
                    rhs.render(scope, size)?,
                    size
                )
            }
            Condition::And(lhs, rhs) => {
                format!("({} and {})", lhs.render(scope)?, rhs.render(scope)?)
            }
            Condition::Or(lhs, rhs) => format!("({} or {})", lhs.render(scope)?, rhs.render(scope)?),
            Condition::Not(inner) => format!("not({})", inner.render(scope)?),
            Condition::Const(value) => value.to_string(),
            Condition::Event(var) => format!("{}'event", scope.reference(*var)?.name()),
            Condition::RisingEdge(var) => {
                let name = scope.reference(*var)?.name();
                format!("({}'event and {} = '1')", name, name)
            }
        })
    }
}
