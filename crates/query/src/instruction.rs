//! Instructions of the scheduled dataflow graph.
use std::fmt;

use crate::graph::{Graph, ValueId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    SDiv,
    UDiv,
    SRem,
    URem,
    FAdd,
    FSub,
    FMul,
    FDiv,
}

impl BinaryOp {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
            BinaryOp::SDiv => "sdiv",
            BinaryOp::UDiv => "udiv",
            BinaryOp::SRem => "srem",
            BinaryOp::URem => "urem",
            BinaryOp::FAdd => "fadd",
            BinaryOp::FSub => "fsub",
            BinaryOp::FMul => "fmul",
            BinaryOp::FDiv => "fdiv",
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(
            self,
            BinaryOp::FAdd | BinaryOp::FSub | BinaryOp::FMul | BinaryOp::FDiv
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Predicate {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
    Ult,
    Ule,
    Ugt,
    Uge,
    FEq,
    FNe,
    FLt,
    FLe,
    FGt,
    FGe,
}

impl Predicate {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Predicate::Eq => "icmp eq",
            Predicate::Ne => "icmp ne",
            Predicate::Slt => "icmp slt",
            Predicate::Sle => "icmp sle",
            Predicate::Sgt => "icmp sgt",
            Predicate::Sge => "icmp sge",
            Predicate::Ult => "icmp ult",
            Predicate::Ule => "icmp ule",
            Predicate::Ugt => "icmp ugt",
            Predicate::Uge => "icmp uge",
            Predicate::FEq => "fcmp eq",
            Predicate::FNe => "fcmp ne",
            Predicate::FLt => "fcmp lt",
            Predicate::FLe => "fcmp le",
            Predicate::FGt => "fcmp gt",
            Predicate::FGe => "fcmp ge",
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(
            self,
            Predicate::FEq
                | Predicate::FNe
                | Predicate::FLt
                | Predicate::FLe
                | Predicate::FGt
                | Predicate::FGe
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShiftKind {
    Shl,
    LShr,
    AShr,
}

impl ShiftKind {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            ShiftKind::Shl => "shl",
            ShiftKind::LShr => "lshr",
            ShiftKind::AShr => "ashr",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastKind {
    ZExt,
    SExt,
    Trunc,
    /// Reinterprets the bits; the widths must match.
    Bitcast,
    FpToSi,
    FpToUi,
    SiToFp,
    UiToFp,
    FpExt,
    FpTrunc,
}

impl CastKind {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            CastKind::ZExt => "zext",
            CastKind::SExt => "sext",
            CastKind::Trunc => "trunc",
            CastKind::Bitcast => "bitcast",
            CastKind::FpToSi => "fptosi",
            CastKind::FpToUi => "fptoui",
            CastKind::SiToFp => "sitofp",
            CastKind::UiToFp => "uitofp",
            CastKind::FpExt => "fpext",
            CastKind::FpTrunc => "fptrunc",
        }
    }
}

/// Redundancy primitives, each implemented by a library core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RedundancyKind {
    /// Majority vote over three copies.
    TripleVote,
    /// Compares two copies and flags a mismatch.
    DoubleVote,
    /// Fans one stream out into several copies.
    StreamSplitter,
    StreamDoubleVote,
    StreamTripleVote,
}

impl RedundancyKind {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            RedundancyKind::TripleVote => "triple_vote",
            RedundancyKind::DoubleVote => "double_vote",
            RedundancyKind::StreamSplitter => "stream_splitter",
            RedundancyKind::StreamDoubleVote => "stream_double_vote",
            RedundancyKind::StreamTripleVote => "stream_triple_vote",
        }
    }

    /// Whether the operands are whole streams rather than scalars.
    pub fn on_streams(&self) -> bool {
        !matches!(self, RedundancyKind::TripleVote | RedundancyKind::DoubleVote)
    }

    /// The number of inputs the primitive takes.
    pub fn inputs(&self) -> usize {
        match self {
            RedundancyKind::TripleVote | RedundancyKind::StreamTripleVote => 3,
            RedundancyKind::DoubleVote | RedundancyKind::StreamDoubleVote => 2,
            RedundancyKind::StreamSplitter => 1,
        }
    }
}

/// One operation of a basic block.
///
/// Feedback registers are named values that are written by
/// [`Instruction::FeedbackStore`] and read by [`Instruction::FeedbackLoad`];
/// they are not operands in the pipeline sense and never get registered
/// across stages.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Instruction {
    Binary {
        op: BinaryOp,
        lhs: ValueId,
        a: ValueId,
        b: ValueId,
    },
    Compare {
        predicate: Predicate,
        lhs: ValueId,
        a: ValueId,
        b: ValueId,
    },
    Shift {
        kind: ShiftKind,
        lhs: ValueId,
        value: ValueId,
        amount: ValueId,
    },
    /// `lhs = condition ? then : otherwise`
    Select {
        lhs: ValueId,
        condition: ValueId,
        then: ValueId,
        otherwise: ValueId,
    },
    Cast {
        kind: CastKind,
        lhs: ValueId,
        value: ValueId,
    },
    Copy {
        lhs: ValueId,
        value: ValueId,
    },
    /// A user module or library core. Inputs and outputs in call order.
    Call {
        callee: String,
        inputs: Vec<ValueId>,
        outputs: Vec<ValueId>,
    },
    /// A vote over redundant copies, or a splitter creating them. The
    /// rewrite into library calls replaces it before scheduling.
    Redundancy {
        kind: RedundancyKind,
        inputs: Vec<ValueId>,
        outputs: Vec<ValueId>,
    },
    InputScalar {
        lhs: ValueId,
    },
    OutputScalar {
        value: ValueId,
    },
    /// Element `index` of the current window of an input stream.
    InputStream {
        lhs: ValueId,
        stream: String,
        index: usize,
    },
    OutputStream {
        value: ValueId,
        stream: String,
        index: usize,
    },
    /// Stores the value the next iteration reads from `register`.
    FeedbackStore {
        register: ValueId,
        value: ValueId,
    },
    /// Reads what the previous iteration stored in `register`. The first
    /// iteration reads `default`, or a dedicated input port when there is
    /// none.
    FeedbackLoad {
        lhs: ValueId,
        register: ValueId,
        default: Option<ValueId>,
    },
    /// `lhs` accumulates `value` over all iterations, starting from
    /// `default`.
    Summation {
        lhs: ValueId,
        value: ValueId,
        default: Option<ValueId>,
    },
    LutRead {
        lhs: ValueId,
        lut: String,
        address: ValueId,
    },
    LutWrite {
        lut: String,
        address: ValueId,
        value: ValueId,
    },
    /// Exposes a value on a debug port. A watch value raises a watchpoint
    /// when both are equal.
    DebugOutput {
        value: ValueId,
        watch: Option<ValueId>,
    },
}

impl Instruction {
    /// Values this instruction assigns.
    pub fn defines(&self) -> Vec<ValueId> {
        match self {
            Instruction::Binary { lhs, .. }
            | Instruction::Compare { lhs, .. }
            | Instruction::Shift { lhs, .. }
            | Instruction::Select { lhs, .. }
            | Instruction::Cast { lhs, .. }
            | Instruction::Copy { lhs, .. }
            | Instruction::InputScalar { lhs }
            | Instruction::InputStream { lhs, .. }
            | Instruction::FeedbackLoad { lhs, .. }
            | Instruction::Summation { lhs, .. }
            | Instruction::LutRead { lhs, .. } => vec![*lhs],
            Instruction::Call { outputs, .. } | Instruction::Redundancy { outputs, .. } => {
                outputs.clone()
            }
            Instruction::OutputScalar { .. }
            | Instruction::OutputStream { .. }
            | Instruction::FeedbackStore { .. }
            | Instruction::LutWrite { .. }
            | Instruction::DebugOutput { .. } => vec![],
        }
    }

    /// Values this instruction reads, in operand order. Feedback registers
    /// are not included.
    pub fn operands(&self) -> Vec<ValueId> {
        match self {
            Instruction::Binary { a, b, .. } | Instruction::Compare { a, b, .. } => vec![*a, *b],
            Instruction::Shift { value, amount, .. } => vec![*value, *amount],
            Instruction::Select {
                condition,
                then,
                otherwise,
                ..
            } => vec![*then, *otherwise, *condition],
            Instruction::Cast { value, .. }
            | Instruction::Copy { value, .. }
            | Instruction::OutputScalar { value }
            | Instruction::OutputStream { value, .. }
            | Instruction::FeedbackStore { value, .. } => vec![*value],
            Instruction::Call { inputs, .. } | Instruction::Redundancy { inputs, .. } => {
                inputs.clone()
            }
            Instruction::InputScalar { .. } | Instruction::InputStream { .. } => vec![],
            Instruction::FeedbackLoad { default, .. } => default.iter().copied().collect(),
            Instruction::Summation { value, default, .. } => {
                std::iter::once(*value).chain(default.iter().copied()).collect()
            }
            Instruction::LutRead { address, .. } => vec![*address],
            Instruction::LutWrite { address, value, .. } => vec![*address, *value],
            Instruction::DebugOutput { value, watch } => {
                std::iter::once(*value).chain(watch.iter().copied()).collect()
            }
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self, Instruction::Call { .. })
    }

    /// Whether the instruction latches a value as its activation is accepted.
    pub fn is_input(&self) -> bool {
        matches!(
            self,
            Instruction::InputScalar { .. } | Instruction::InputStream { .. }
        )
    }

    /// Whether the instruction runs in the stage of its own block. The others
    /// are placed by what they read or write: scalar inputs at the input
    /// stage, feedback stores one stage after their value, lookup table
    /// accesses in their own processes and debug outputs outside the
    /// pipeline.
    pub fn is_staged(&self) -> bool {
        !matches!(
            self,
            Instruction::InputScalar { .. }
                | Instruction::InputStream { .. }
                | Instruction::FeedbackStore { .. }
                | Instruction::LutRead { .. }
                | Instruction::LutWrite { .. }
                | Instruction::DebugOutput { .. }
        )
    }

    /// A printable form using the names of the graph's values.
    pub fn describe<'a>(&'a self, graph: &'a Graph) -> Described<'a> {
        Described {
            instruction: self,
            graph,
        }
    }
}

pub struct Described<'a> {
    instruction: &'a Instruction,
    graph: &'a Graph,
}

impl Described<'_> {
    fn name(&self, id: &ValueId) -> String {
        match self.graph.value(*id) {
            Ok(value) => format!("%{}", value.name),
            Err(_) => format!("%<{}>", id.0),
        }
    }

    fn typed(&self, id: &ValueId) -> String {
        match self.graph.value(*id) {
            Ok(value) => format!("{} %{}", value.type_name(), value.name),
            Err(_) => format!("%<{}>", id.0),
        }
    }

    fn list(&self, ids: &[ValueId]) -> String {
        ids.iter().map(|id| self.typed(id)).collect::<Vec<_>>().join(", ")
    }
}

impl fmt::Display for Described<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.instruction {
            Instruction::Binary { op, lhs, a, b } => write!(
                f,
                "{} = {} {}, {}",
                self.name(lhs),
                op.mnemonic(),
                self.typed(a),
                self.name(b)
            ),
            Instruction::Compare {
                predicate,
                lhs,
                a,
                b,
            } => write!(
                f,
                "{} = {} {}, {}",
                self.name(lhs),
                predicate.mnemonic(),
                self.typed(a),
                self.name(b)
            ),
            Instruction::Shift {
                kind,
                lhs,
                value,
                amount,
            } => write!(
                f,
                "{} = {} {}, {}",
                self.name(lhs),
                kind.mnemonic(),
                self.typed(value),
                self.name(amount)
            ),
            Instruction::Select {
                lhs,
                condition,
                then,
                otherwise,
            } => write!(
                f,
                "{} = select {}, {}, {}",
                self.name(lhs),
                self.typed(condition),
                self.typed(then),
                self.typed(otherwise)
            ),
            Instruction::Cast { kind, lhs, value } => {
                let target = self
                    .graph
                    .value(*lhs)
                    .map(|v| v.type_name())
                    .unwrap_or_default();
                write!(
                    f,
                    "{} = {} {} to {}",
                    self.name(lhs),
                    kind.mnemonic(),
                    self.typed(value),
                    target
                )
            }
            Instruction::Copy { lhs, value } => {
                write!(f, "{} = {}", self.name(lhs), self.typed(value))
            }
            Instruction::Call {
                callee,
                inputs,
                outputs,
            } => {
                if outputs.is_empty() {
                    write!(f, "call @{}({})", callee, self.list(inputs))
                } else {
                    write!(
                        f,
                        "{} = call @{}({})",
                        self.list(outputs),
                        callee,
                        self.list(inputs)
                    )
                }
            }
            Instruction::Redundancy {
                kind,
                inputs,
                outputs,
            } => write!(
                f,
                "{} = {} {}",
                self.list(outputs),
                kind.mnemonic(),
                self.list(inputs)
            ),
            Instruction::InputScalar { lhs } => write!(f, "{} = input_scalar", self.name(lhs)),
            Instruction::OutputScalar { value } => write!(f, "output_scalar {}", self.typed(value)),
            Instruction::InputStream { lhs, stream, index } => {
                write!(f, "{} = {}[{}]", self.name(lhs), stream, index)
            }
            Instruction::OutputStream {
                value,
                stream,
                index,
            } => write!(f, "{}[{}] = {}", stream, index, self.typed(value)),
            Instruction::FeedbackStore { register, value } => write!(
                f,
                "store_next {}, {}",
                self.name(register),
                self.typed(value)
            ),
            Instruction::FeedbackLoad {
                lhs,
                register,
                default,
            } => match default {
                Some(default) => write!(
                    f,
                    "{} = load_previous {}, {}",
                    self.name(lhs),
                    self.name(register),
                    self.typed(default)
                ),
                None => write!(f, "{} = load_previous {}", self.name(lhs), self.name(register)),
            },
            Instruction::Summation { lhs, value, default } => match default {
                Some(default) => write!(
                    f,
                    "{} = summation {}, {}",
                    self.name(lhs),
                    self.typed(value),
                    self.typed(default)
                ),
                None => write!(f, "{} = summation {}", self.name(lhs), self.typed(value)),
            },
            Instruction::LutRead { lhs, lut, address } => {
                write!(f, "{} = lut_read @{}, {}", self.name(lhs), lut, self.typed(address))
            }
            Instruction::LutWrite {
                lut,
                address,
                value,
            } => write!(
                f,
                "lut_write @{}, {}, {}",
                lut,
                self.typed(address),
                self.typed(value)
            ),
            Instruction::DebugOutput { value, watch } => match watch {
                Some(watch) => write!(
                    f,
                    "debug_output {}, {}",
                    self.typed(value),
                    self.typed(watch)
                ),
                None => write!(f, "debug_output {}", self.typed(value)),
            },
        }
    }
}
