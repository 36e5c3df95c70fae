use std::fmt;

use serde::{Deserialize, Serialize};

/// What a library entry implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoreKind {
    /// A user module generated by this back end.
    Module,
    /// A user system generated by this back end.
    System,
    IntDiv,
    IntMod,
    FpAdd,
    FpSub,
    FpMul,
    FpDiv,
    FpEqual,
    FpNotEqual,
    FpLessThan,
    FpLessThanEqual,
    FpGreaterThan,
    FpGreaterThanEqual,
    FpToInt,
    IntToFp,
    FpToFp,
    TripleVote,
    DoubleVote,
    StreamSplitter,
    StreamDoubleVote,
    StreamTripleVote,
}

impl CoreKind {
    /// Intrinsics are pre-built cores; at most one of each kind is active.
    pub fn is_intrinsic(&self) -> bool {
        !matches!(self, CoreKind::Module | CoreKind::System)
    }

    /// Cores whose operands must be registered into a matching width rather
    /// than extended inline.
    pub fn needs_resize_signal(&self) -> bool {
        matches!(self, CoreKind::IntDiv | CoreKind::IntToFp | CoreKind::FpToInt)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CoreKind::Module => "MODULE",
            CoreKind::System => "SYSTEM",
            CoreKind::IntDiv => "INT_DIV",
            CoreKind::IntMod => "INT_MOD",
            CoreKind::FpAdd => "FP_ADD",
            CoreKind::FpSub => "FP_SUB",
            CoreKind::FpMul => "FP_MUL",
            CoreKind::FpDiv => "FP_DIV",
            CoreKind::FpEqual => "FP_EQUAL",
            CoreKind::FpNotEqual => "FP_NOT_EQUAL",
            CoreKind::FpLessThan => "FP_LESS_THAN",
            CoreKind::FpLessThanEqual => "FP_LESS_THAN_EQUAL",
            CoreKind::FpGreaterThan => "FP_GREATER_THAN",
            CoreKind::FpGreaterThanEqual => "FP_GREATER_THAN_EQUAL",
            CoreKind::FpToInt => "FP_TO_INT",
            CoreKind::IntToFp => "INT_TO_FP",
            CoreKind::FpToFp => "FP_TO_FP",
            CoreKind::TripleVote => "TRIPLE_VOTE",
            CoreKind::DoubleVote => "DOUBLE_VOTE",
            CoreKind::StreamSplitter => "STREAM_SPLITTER",
            CoreKind::StreamDoubleVote => "STREAM_DOUBLE_VOTE",
            CoreKind::StreamTripleVote => "STREAM_TRIPLE_VOTE",
        }
    }
}

impl fmt::Display for CoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
