//! Right-hand-side expressions and their sized rendering.
use bitvec::prelude::*;
use log::warn;

use dfc_common::{
    error::{Error, Result},
    numbers::{min_bit_width, BitWidth},
};

use crate::{
    entity::Entity,
    process::ProcessId,
    variable::{Variable, VariableKind, VarId},
};

/// An integer literal with an explicit width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstantInt {
    value: i64,
    width: BitWidth,
}

impl ConstantInt {
    /// A constant of the minimal width able to hold `value`.
    pub fn new(value: i64) -> Self {
        ConstantInt {
            value,
            width: min_bit_width(value),
        }
    }

    pub fn sized(value: i64, width: BitWidth) -> Self {
        ConstantInt { value, width }
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    pub fn width(&self) -> BitWidth {
        self.width
    }

    fn bit(&self, index: BitWidth) -> bool {
        if index >= 64 {
            self.value < 0
        } else {
            (self.value >> index) & 1 == 1
        }
    }

    pub fn render(&self, size: BitWidth) -> Result<String> {
        if size == 0 {
            return Err(Error::BackEndError(format!(
                "cannot render constant {} with zero bits",
                self.value
            )));
        }
        if min_bit_width(self.value) > size {
            warn!(
                "Constant {} does not fit in {} bits and is truncated",
                self.value, size
            );
        }
        let mut bits: BitVec<usize, Msb0> = BitVec::with_capacity(size as usize);
        for index in (0..size).rev() {
            bits.push(self.bit(index));
        }
        let text: String = bits.iter().map(|b| if *b { '1' } else { '0' }).collect();
        if size == 1 {
            Ok(format!("'{}'", text))
        } else {
            Ok(format!("\"{}\"", text))
        }
    }
}

/// A floating-point literal, stored as the bit pattern of an `f64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstantFloat {
    bits: u64,
    width: BitWidth,
}

impl ConstantFloat {
    pub fn single(value: f64) -> Self {
        ConstantFloat {
            bits: value.to_bits(),
            width: 32,
        }
    }

    pub fn double(value: f64) -> Self {
        ConstantFloat {
            bits: value.to_bits(),
            width: 64,
        }
    }

    pub fn value(&self) -> f64 {
        f64::from_bits(self.bits)
    }

    pub fn width(&self) -> BitWidth {
        self.width
    }

    pub fn render(&self, size: BitWidth) -> Result<String> {
        match size {
            32 => Ok(format!("x\"{:08x}\"", (self.value() as f32).to_bits())),
            64 => Ok(format!("x\"{:016x}\"", self.bits)),
            _ => Err(Error::BackEndError(format!(
                "floating-point constant {} cannot be rendered with {} bits",
                self.value(),
                size
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
}

impl ArithOp {
    fn helper(&self) -> Option<&'static str> {
        match self {
            ArithOp::Add => Some("DFC_ADD"),
            ArithOp::Sub => Some("DFC_SUB"),
            ArithOp::Mul => Some("DFC_MUL"),
            _ => None,
        }
    }

    fn operator(&self) -> &'static str {
        match self {
            ArithOp::And => "and",
            ArithOp::Or => "or",
            ArithOp::Xor => "xor",
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Arith {
    pub op: ArithOp,
    pub lhs: Value,
    pub rhs: Value,
}

/// Anything that can appear on the right-hand side of an RTL expression.
///
/// Widths are derived from the owning [`Entity`]; every width change goes
/// through [`Value::render`], which extends or truncates explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// Reference to a whole variable.
    Var(VarId),
    /// A `high downto low` view of a variable.
    Range { var: VarId, high: BitWidth, low: BitWidth },
    Int(ConstantInt),
    Float(ConstantFloat),
    Arith(Box<Arith>),
    /// `lhs & rhs`, the lhs holding the most significant bits.
    Concat(Box<Value>, Box<Value>),
    /// Overrides the signedness used when the inner value is widened.
    Extend { value: Box<Value>, signed: bool },
    /// `array(conv_integer(index))`
    Element { array: VarId, index: Box<Value> },
    /// One enumerant of a state variable.
    State { var: VarId, state: usize },
    /// A bit-string literal of `width` bits, `'1'`, `"0110"` or `x"6"`.
    Literal { text: String, width: BitWidth },
}

impl From<VarId> for Value {
    fn from(var: VarId) -> Self {
        Value::Var(var)
    }
}

impl From<ConstantInt> for Value {
    fn from(c: ConstantInt) -> Self {
        Value::Int(c)
    }
}

impl Value {
    pub fn int(value: i64) -> Self {
        Value::Int(ConstantInt::new(value))
    }

    pub fn sized(value: i64, width: BitWidth) -> Self {
        Value::Int(ConstantInt::sized(value, width))
    }

    pub fn zeros(width: BitWidth) -> Self {
        Value::sized(0, width)
    }

    pub fn arith(op: ArithOp, lhs: impl Into<Value>, rhs: impl Into<Value>) -> Self {
        Value::Arith(Box::new(Arith {
            op,
            lhs: lhs.into(),
            rhs: rhs.into(),
        }))
    }

    pub fn add(lhs: impl Into<Value>, rhs: impl Into<Value>) -> Self {
        Value::arith(ArithOp::Add, lhs, rhs)
    }

    pub fn sub(lhs: impl Into<Value>, rhs: impl Into<Value>) -> Self {
        Value::arith(ArithOp::Sub, lhs, rhs)
    }

    pub fn concat(lhs: impl Into<Value>, rhs: impl Into<Value>) -> Self {
        Value::Concat(Box::new(lhs.into()), Box::new(rhs.into()))
    }

    pub fn zero_extend(value: impl Into<Value>) -> Self {
        Value::Extend {
            value: Box::new(value.into()),
            signed: false,
        }
    }

    pub fn sign_extend(value: impl Into<Value>) -> Self {
        Value::Extend {
            value: Box::new(value.into()),
            signed: true,
        }
    }

    pub fn element(array: VarId, index: impl Into<Value>) -> Self {
        Value::Element {
            array,
            index: Box::new(index.into()),
        }
    }

    pub fn literal(text: impl Into<String>, width: BitWidth) -> Self {
        Value::Literal {
            text: text.into(),
            width,
        }
    }

    /// The storage variable this value writes to when used as an assignment
    /// target, if it can be a target at all.
    pub fn target_var(&self) -> Option<VarId> {
        match self {
            Value::Var(var) => Some(*var),
            Value::Range { var, .. } => Some(*var),
            Value::Element { array, .. } => Some(*array),
            _ => None,
        }
    }

    /// Every variable referenced by this value, in order of appearance.
    pub fn variables(&self) -> Vec<VarId> {
        let mut result = vec![];
        self.collect_variables(&mut result);
        result
    }

    pub(crate) fn collect_variables(&self, result: &mut Vec<VarId>) {
        match self {
            Value::Var(var) | Value::Range { var, .. } | Value::State { var, .. } => {
                result.push(*var)
            }
            Value::Arith(arith) => {
                arith.lhs.collect_variables(result);
                arith.rhs.collect_variables(result);
            }
            Value::Concat(lhs, rhs) => {
                lhs.collect_variables(result);
                rhs.collect_variables(result);
            }
            Value::Extend { value, .. } => value.collect_variables(result),
            Value::Element { array, index } => {
                result.push(*array);
                index.collect_variables(result);
            }
            Value::Int(_) | Value::Float(_) | Value::Literal { .. } => (),
        }
    }

    pub fn width(&self, entity: &Entity) -> Result<BitWidth> {
        Ok(match self {
            Value::Var(var) => entity.variable(*var)?.width(),
            Value::Range { high, low, .. } => high - low + 1,
            Value::Int(c) => c.width(),
            Value::Float(f) => f.width(),
            Value::Arith(arith) => arith.lhs.width(entity)?.max(arith.rhs.width(entity)?),
            Value::Concat(lhs, rhs) => lhs.width(entity)? + rhs.width(entity)?,
            Value::Extend { value, .. } => value.width(entity)?,
            Value::Element { array, .. } => entity.variable(*array)?.width(),
            Value::State { .. } => 1,
            Value::Literal { width, .. } => *width,
        })
    }

    pub fn is_signed(&self, entity: &Entity) -> Result<bool> {
        Ok(match self {
            Value::Var(var) => entity.variable(*var)?.is_signed(),
            Value::Int(c) => c.value() < 0,
            Value::Arith(arith) => arith.lhs.is_signed(entity)? || arith.rhs.is_signed(entity)?,
            Value::Extend { signed, .. } => *signed,
            _ => false,
        })
    }

    /// Render this value as an expression of exactly `size` bits.
    pub fn render(&self, scope: &Scope, size: BitWidth) -> Result<String> {
        if size == 0 {
            return Err(Error::BackEndError(
                "cannot render a value with zero bits".to_string(),
            ));
        }
        let entity = scope.entity;
        match self {
            Value::Var(id) => {
                let var = scope.reference(*id)?;
                match var.kind() {
                    VariableKind::Generic(_) => {
                        Ok(format!("conv_std_logic_vector({}, {})", var.name(), size))
                    }
                    VariableKind::StateVar(_) => Ok(var.name().to_string()),
                    VariableKind::Array(_) => Err(Error::BackEndError(format!(
                        "array {} can only be accessed element-wise",
                        var.name()
                    ))),
                    _ => Ok(resize_name(
                        var.name().as_str(),
                        var.width(),
                        var.is_signed(),
                        size,
                    )),
                }
            }
            Value::Range { var, high, low } => {
                let variable = scope.reference(*var)?;
                let width = high - low + 1;
                if size < width {
                    warn!(
                        "Truncating {}({} downto {}) to {} bits",
                        variable.name(),
                        high,
                        low,
                        size
                    );
                    Ok(slice(variable.name().as_str(), size - 1 + low, *low))
                } else {
                    let base = slice(variable.name().as_str(), *high, *low);
                    Ok(extend_text(base, None, size - width))
                }
            }
            Value::Int(c) => c.render(size),
            Value::Float(f) => f.render(size),
            Value::Arith(arith) => {
                let width = self.width(entity)?;
                match arith.op.helper() {
                    Some(helper) => {
                        let operand_size = size.max(width);
                        Ok(format!(
                            "{}({}, {}, {})",
                            helper,
                            arith.lhs.render(scope, operand_size)?,
                            arith.rhs.render(scope, operand_size)?,
                            size
                        ))
                    }
                    None => Ok(format!(
                        "({} {} {})",
                        arith.lhs.render(scope, size)?,
                        arith.op.operator(),
                        arith.rhs.render(scope, size)?
                    )),
                }
            }
            Value::Concat(lhs, rhs) => {
                let rhs_width = rhs.width(entity)?;
                if size <= rhs_width {
                    rhs.render(scope, size)
                } else {
                    Ok(format!(
                        "({} & {})",
                        lhs.render(scope, size - rhs_width)?,
                        rhs.render(scope, rhs_width)?
                    ))
                }
            }
            Value::Extend { value, signed } => {
                let width = value.width(entity)?;
                if size <= width {
                    value.render(scope, size)
                } else {
                    let inner = value.render(scope, width)?;
                    let sign = if *signed {
                        Some(value.sign_bit(scope)?)
                    } else {
                        None
                    };
                    Ok(extend_text(inner, sign, size - width))
                }
            }
            Value::Element { array, index } => {
                let variable = scope.reference(*array)?;
                let index_width = index.width(entity)?;
                let base = format!(
                    "{}(conv_integer({}))",
                    variable.name(),
                    index.render(scope, index_width)?
                );
                let width = variable.width();
                if size < width {
                    Ok(format!("{}({} downto 0)", base, size - 1))
                } else {
                    Ok(extend_text(base, None, size - width))
                }
            }
            Value::State { var, state } => {
                let variable = scope.reference(*var)?;
                match variable.kind() {
                    VariableKind::StateVar(states) => states
                        .get(*state)
                        .map(|name| name.to_string())
                        .ok_or_else(|| {
                            Error::BackEndError(format!(
                                "{} has no state {}",
                                variable.name(),
                                state
                            ))
                        }),
                    _ => Err(Error::BackEndError(format!(
                        "{} is not a state variable",
                        variable.name()
                    ))),
                }
            }
            Value::Literal { text, width } => {
                if size < *width {
                    warn!("Truncating literal {} from {} to {} bits", text, width, size);
                    truncate_literal(text, size)
                } else {
                    Ok(extend_text(text.clone(), None, size - width))
                }
            }
        }
    }

    /// The expression for the most significant bit of this value.
    fn sign_bit(&self, scope: &Scope) -> Result<String> {
        match self {
            Value::Var(id) => {
                let var = scope.reference(*id)?;
                Ok(msb(var.name().as_str(), var.width()))
            }
            Value::Range { var, high, .. } => {
                let variable = scope.reference(*var)?;
                Ok(slice(variable.name().as_str(), *high, *high))
            }
            Value::Int(c) => Ok(if c.value() < 0 { "'1'" } else { "'0'" }.to_string()),
            Value::Extend { value, .. } => value.sign_bit(scope),
            Value::Concat(lhs, _) => lhs.sign_bit(scope),
            _ => Err(Error::BackEndError(format!(
                "cannot determine the sign bit of {:?}",
                self
            ))),
        }
    }
}

/// A `STD_LOGIC` cannot be indexed, so its most significant bit is the name
/// itself.
fn msb(name: &str, width: BitWidth) -> String {
    if width == 1 {
        name.to_string()
    } else {
        slice(name, width - 1, width - 1)
    }
}

/// `name(high)` or `name(high downto low)`.
fn slice(name: &str, high: BitWidth, low: BitWidth) -> String {
    if high == low {
        format!("{}({})", name, high)
    } else {
        format!("{}({} downto {})", name, high, low)
    }
}

/// The low `size` bits of a bit-string literal.
fn truncate_literal(text: &str, size: BitWidth) -> Result<String> {
    let invalid = || {
        Error::BackEndError(format!(
            "literal {} cannot be truncated to {} bits",
            text, size
        ))
    };
    let hex = text
        .strip_prefix("x\"")
        .or_else(|| text.strip_prefix("X\""));
    let bits: String = if let Some(hex) = hex {
        hex.strip_suffix('"')
            .ok_or_else(invalid)?
            .chars()
            .map(|digit| digit.to_digit(16).map(|nibble| format!("{:04b}", nibble)))
            .collect::<Option<String>>()
            .ok_or_else(invalid)?
    } else {
        text.trim_matches(|c| c == '"' || c == '\'').to_string()
    };
    if !bits.chars().all(|c| c == '0' || c == '1') || bits.len() < size as usize {
        return Err(invalid());
    }
    let low = &bits[bits.len() - size as usize..];
    if size == 1 {
        Ok(format!("'{}'", low))
    } else {
        Ok(format!("\"{}\"", low))
    }
}

/// Prefix `text` with `pad` copies of the sign bit, or with zeros.
fn extend_text(text: String, sign: Option<String>, pad: BitWidth) -> String {
    if pad == 0 {
        return text;
    }
    match sign {
        Some(sign) => {
            let mut parts = vec![sign; pad as usize];
            parts.push(text);
            format!("({})", parts.join(" & "))
        }
        None if pad == 1 => format!("('0' & {})", text),
        None => format!("(\"{}\" & {})", "0".repeat(pad as usize), text),
    }
}

fn resize_name(name: &str, width: BitWidth, signed: bool, size: BitWidth) -> String {
    if size == width {
        name.to_string()
    } else if size < width {
        warn!("Truncating {} from {} to {} bits", name, width, size);
        slice(name, size - 1, 0)
    } else {
        let sign = if signed { Some(msb(name, width)) } else { None };
        extend_text(name.to_string(), sign, size - width)
    }
}

/// The context a value is rendered in: an entity and, for sequential code,
/// the process whose variables are visible.
#[derive(Clone, Copy)]
pub struct Scope<'a> {
    pub(crate) entity: &'a Entity,
    pub(crate) process: Option<ProcessId>,
}

impl<'a> Scope<'a> {
    pub fn concurrent(entity: &'a Entity) -> Self {
        Scope {
            entity,
            process: None,
        }
    }

    pub fn in_process(entity: &'a Entity, process: ProcessId) -> Self {
        Scope {
            entity,
            process: Some(process),
        }
    }

    /// Looks up a referenced variable, checking it is declared and visible.
    pub(crate) fn reference(&self, id: VarId) -> Result<&'a Variable> {
        let var = self.entity.variable(id)?;
        if !var.is_declared() {
            return Err(Error::UndeclaredReference(format!(
                "{} is referenced in {} but was never declared",
                var.name(),
                self.entity.name()
            )));
        }
        if let VariableKind::ProcessVariable(owner) = var.kind() {
            if self.process != Some(*owner) {
                return Err(Error::UndeclaredReference(format!(
                    "process variable {} is not declared in this scope",
                    var.name()
                )));
            }
        }
        Ok(var)
    }
}
