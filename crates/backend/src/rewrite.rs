//! Replaces the operations the pipeline cannot express inline with calls to
//! library cores.
//!
//! Integer division and remainder, floating-point arithmetic, comparisons
//! and conversions, and the redundancy primitives become `Call`s of the core
//! the resolution engine picks. Conversions that keep the bit width only
//! reinterpret the bits and become copies.
use log::debug;

use dfc_common::error::Result;
use dfc_library::{
    kind::CoreKind,
    resolve::{CoreRequest, OperandShape},
};
use dfc_query::{
    graph::{Graph, ValueId},
    instruction::{BinaryOp, CastKind, Instruction, Predicate, RedundancyKind},
};

use crate::db::BackEnd;

enum Rewrite {
    Keep,
    Reinterpret { lhs: ValueId, value: ValueId },
    Core {
        kind: CoreKind,
        inputs: Vec<ValueId>,
        outputs: Vec<ValueId>,
        /// Every operand is a whole stream.
        streams: bool,
    },
}

impl Rewrite {
    fn scalar(kind: CoreKind, inputs: Vec<ValueId>, lhs: ValueId) -> Self {
        Rewrite::Core {
            kind,
            inputs,
            outputs: vec![lhs],
            streams: false,
        }
    }
}

fn binary_kind(op: BinaryOp) -> Option<CoreKind> {
    match op {
        BinaryOp::SDiv | BinaryOp::UDiv => Some(CoreKind::IntDiv),
        BinaryOp::SRem | BinaryOp::URem => Some(CoreKind::IntMod),
        BinaryOp::FAdd => Some(CoreKind::FpAdd),
        BinaryOp::FSub => Some(CoreKind::FpSub),
        BinaryOp::FMul => Some(CoreKind::FpMul),
        BinaryOp::FDiv => Some(CoreKind::FpDiv),
        BinaryOp::Add
        | BinaryOp::Sub
        | BinaryOp::Mul
        | BinaryOp::And
        | BinaryOp::Or
        | BinaryOp::Xor => None,
    }
}

fn redundancy_kind(kind: RedundancyKind) -> CoreKind {
    match kind {
        RedundancyKind::TripleVote => CoreKind::TripleVote,
        RedundancyKind::DoubleVote => CoreKind::DoubleVote,
        RedundancyKind::StreamSplitter => CoreKind::StreamSplitter,
        RedundancyKind::StreamDoubleVote => CoreKind::StreamDoubleVote,
        RedundancyKind::StreamTripleVote => CoreKind::StreamTripleVote,
    }
}

fn compare_kind(predicate: Predicate) -> Option<CoreKind> {
    match predicate {
        Predicate::FEq => Some(CoreKind::FpEqual),
        Predicate::FNe => Some(CoreKind::FpNotEqual),
        Predicate::FLt => Some(CoreKind::FpLessThan),
        Predicate::FLe => Some(CoreKind::FpLessThanEqual),
        Predicate::FGt => Some(CoreKind::FpGreaterThan),
        Predicate::FGe => Some(CoreKind::FpGreaterThanEqual),
        _ => None,
    }
}

fn classify(graph: &Graph, instruction: &Instruction) -> Result<Rewrite> {
    Ok(match instruction {
        Instruction::Binary { op, lhs, a, b } => match binary_kind(*op) {
            Some(kind) => Rewrite::scalar(kind, vec![*a, *b], *lhs),
            None => Rewrite::Keep,
        },
        Instruction::Compare {
            predicate,
            lhs,
            a,
            b,
        } => match compare_kind(*predicate) {
            Some(kind) => Rewrite::scalar(kind, vec![*a, *b], *lhs),
            None => Rewrite::Keep,
        },
        Instruction::Cast { kind, lhs, value } => {
            let core = |kind| Rewrite::scalar(kind, vec![*value], *lhs);
            match kind {
                CastKind::ZExt | CastKind::SExt | CastKind::Trunc => Rewrite::Keep,
                CastKind::Bitcast => Rewrite::Reinterpret {
                    lhs: *lhs,
                    value: *value,
                },
                CastKind::FpToSi | CastKind::FpToUi => core(CoreKind::FpToInt),
                CastKind::SiToFp | CastKind::UiToFp => core(CoreKind::IntToFp),
                CastKind::FpExt | CastKind::FpTrunc => {
                    if graph.value(*lhs)?.width == graph.value(*value)?.width {
                        Rewrite::Reinterpret {
                            lhs: *lhs,
                            value: *value,
                        }
                    } else {
                        core(CoreKind::FpToFp)
                    }
                }
            }
        }
        Instruction::Redundancy {
            kind,
            inputs,
            outputs,
        } => Rewrite::Core {
            kind: redundancy_kind(*kind),
            inputs: inputs.clone(),
            outputs: outputs.clone(),
            streams: kind.on_streams(),
        },
        _ => Rewrite::Keep,
    })
}

fn shape(graph: &Graph, value: ValueId, stream: bool) -> Result<OperandShape> {
    let info = graph.value(value)?;
    let shape = if info.is_constant() {
        OperandShape::constant(info.width)
    } else if info.float {
        OperandShape::float(info.width)
    } else {
        OperandShape::int(info.width)
    };
    Ok(if stream { shape.stream() } else { shape })
}

/// The graph with every core operation turned into a call of the resolved
/// library entry.
pub fn rewrite_intrinsics(db: &dyn BackEnd) -> Result<Graph> {
    let original = db.graph();
    let mut graph = original.as_ref().clone();
    for (block_index, block) in original.blocks.iter().enumerate() {
        for (index, instruction) in block.instructions.iter().enumerate() {
            let replacement = match classify(&original, instruction)? {
                Rewrite::Keep => continue,
                Rewrite::Reinterpret { lhs, value } => {
                    debug!(
                        "'{}' keeps its width and becomes a copy",
                        instruction.describe(&original)
                    );
                    Instruction::Copy { lhs, value }
                }
                Rewrite::Core {
                    kind,
                    inputs,
                    outputs,
                    streams,
                } => {
                    let operands = inputs
                        .iter()
                        .chain(&outputs)
                        .map(|v| shape(&original, *v, streams))
                        .collect::<Result<Vec<_>>>()?;
                    let request = CoreRequest {
                        instruction: instruction.describe(&original).to_string(),
                        kind,
                        operands,
                    };
                    let entry = db.resolve_core(request)?;
                    debug!(
                        "'{}' is implemented by {}",
                        instruction.describe(&original),
                        entry.name
                    );
                    Instruction::Call {
                        callee: entry.name.clone(),
                        inputs,
                        outputs,
                    }
                }
            };
            graph.blocks[block_index].instructions[index] = replacement;
        }
    }
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use dfc_common::error::Error;
    use dfc_library::{
        entry::LibraryEntry,
        port::{LibraryPort, PortDirection},
        store::Library,
    };
    use dfc_query::graph::{Block, ComponentKind, ValueInfo};
    use pretty_assertions::assert_eq;

    fn core(name: &str, kind: CoreKind, widths: &[u32]) -> LibraryEntry {
        let mut ports = LibraryEntry::standard_ports();
        let (result, operands) = widths.split_last().unwrap();
        for (index, width) in operands.iter().enumerate() {
            ports.push(LibraryPort::new(format!("a{}", index), PortDirection::In, *width));
        }
        ports.push(LibraryPort::new("result", PortDirection::Out, *result));
        LibraryEntry::new(name, kind, 4, ports)
    }

    fn library(entries: Vec<LibraryEntry>) -> Library {
        let mut library = Library::default();
        for entry in entries {
            library.create_entry(entry).unwrap();
        }
        library
    }

    fn single(instruction: impl FnOnce(&mut Graph) -> Result<Instruction>) -> Result<Graph> {
        let mut graph = Graph::new("single", ComponentKind::Module, 2);
        let instruction = instruction(&mut graph)?;
        graph.sink = graph.add_block(Block::new("body", 1).with(instruction));
        Ok(graph)
    }

    #[test]
    fn division_becomes_a_call() -> Result<()> {
        let graph = single(|g| {
            Ok(Instruction::Binary {
                op: BinaryOp::SDiv,
                lhs: g.add_value(ValueInfo::int("q", 32).signed())?,
                a: g.add_value(ValueInfo::int("n", 32).signed())?,
                b: g.add_value(ValueInfo::int("d", 32).signed())?,
            })
        })?;
        let db = Database::new(
            library(vec![core("div48", CoreKind::IntDiv, &[48, 48, 48])]),
            graph,
        );
        let rewritten = rewrite_intrinsics(&db)?;
        assert_eq!(
            rewritten.blocks[0].instructions[0],
            Instruction::Call {
                callee: "div48".to_string(),
                inputs: vec![ValueId(1), ValueId(2)],
                outputs: vec![ValueId(0)],
            }
        );
        Ok(())
    }

    #[test]
    fn same_width_conversions_are_copies() -> Result<()> {
        let graph = single(|g| {
            Ok(Instruction::Cast {
                kind: CastKind::Bitcast,
                lhs: g.add_value(ValueInfo::int("bits", 32))?,
                value: g.add_value(ValueInfo::float("x", 32))?,
            })
        })?;
        let db = Database::new(Library::default(), graph);
        assert_eq!(
            rewrite_intrinsics(&db)?.blocks[0].instructions[0],
            Instruction::Copy {
                lhs: ValueId(0),
                value: ValueId(1)
            }
        );

        let graph = single(|g| {
            Ok(Instruction::Cast {
                kind: CastKind::FpExt,
                lhs: g.add_value(ValueInfo::float("wide", 64))?,
                value: g.add_value(ValueInfo::float("x", 32))?,
            })
        })?;
        let db = Database::new(Library::default(), graph);
        assert!(matches!(
            rewrite_intrinsics(&db),
            Err(Error::ResolutionError(_))
        ));
        Ok(())
    }

    #[test]
    fn votes_and_splitters_become_calls() -> Result<()> {
        let graph = single(|g| {
            let inputs = (0..3)
                .map(|i| g.add_value(ValueInfo::int(format!("copy{}", i), 16)))
                .collect::<Result<Vec<_>>>()?;
            Ok(Instruction::Redundancy {
                kind: RedundancyKind::TripleVote,
                inputs,
                outputs: vec![g.add_value(ValueInfo::int("voted", 16))?],
            })
        })?;
        let db = Database::new(
            library(vec![
                core("vote8", CoreKind::TripleVote, &[8, 8, 8, 8]),
                core("vote32", CoreKind::TripleVote, &[32, 32, 32, 32]),
            ]),
            graph,
        );
        assert_eq!(
            rewrite_intrinsics(&db)?.blocks[0].instructions[0],
            Instruction::Call {
                callee: "vote32".to_string(),
                inputs: vec![ValueId(0), ValueId(1), ValueId(2)],
                outputs: vec![ValueId(3)],
            }
        );

        // Splitters need a core whose operands are streams.
        let graph = single(|g| {
            Ok(Instruction::Redundancy {
                kind: RedundancyKind::StreamSplitter,
                inputs: vec![g.add_value(ValueInfo::int("a", 8))?],
                outputs: vec![g.add_value(ValueInfo::int("b", 8))?],
            })
        })?;
        let db = Database::new(
            library(vec![core("split8", CoreKind::StreamSplitter, &[8, 8])]),
            graph,
        );
        assert!(matches!(
            rewrite_intrinsics(&db),
            Err(Error::ResolutionError(_))
        ));
        Ok(())
    }

    #[test]
    fn integer_arithmetic_stays_inline() -> Result<()> {
        let graph = single(|g| {
            Ok(Instruction::Binary {
                op: BinaryOp::Add,
                lhs: g.add_value(ValueInfo::int("s", 8))?,
                a: g.add_value(ValueInfo::int("a", 8))?,
                b: g.add_value(ValueInfo::int("b", 8).with_constant(3))?,
            })
        })?;
        let db = Database::new(Library::default(), graph.clone());
        assert_eq!(rewrite_intrinsics(&db)?, graph);
        Ok(())
    }
}
