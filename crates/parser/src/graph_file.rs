//! The TOML form of a scheduled dataflow graph.
//!
//! Values are referred to by name and blocks by id; both are resolved into
//! graph indices while loading.
use std::{collections::HashMap, fs, path::Path};

use log::debug;
use serde::Deserialize;

use dfc_common::error::{Error, Result};
use dfc_query::{
    graph::{
        Block, BlockId, ComponentKind, Graph, Induction, InductionEnd, Lut, StreamBuffer,
        StreamDirection, ValueId, ValueInfo,
    },
    instruction::{BinaryOp, CastKind, Instruction, Predicate, RedundancyKind, ShiftKind},
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum KindEntry {
    Module,
    System,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ConstantEntry {
    Int(i64),
    Float(f64),
}

#[derive(Debug, Deserialize)]
struct ValueEntry {
    name: String,
    width: u32,
    #[serde(default)]
    signed: bool,
    #[serde(default)]
    float: bool,
    constant: Option<ConstantEntry>,
}

#[derive(Debug, Deserialize)]
struct InstructionEntry {
    op: String,
    lhs: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    results: Vec<String>,
    predicate: Option<String>,
    callee: Option<String>,
    stream: Option<String>,
    index: Option<usize>,
    register: Option<String>,
    lut: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BlockEntry {
    id: u32,
    #[serde(default)]
    name: Option<String>,
    pipeline_level: i64,
    dataflow_level: Option<i64>,
    #[serde(default = "one")]
    delay: i64,
    #[serde(default)]
    predecessors: Vec<u32>,
    #[serde(default)]
    instructions: Vec<InstructionEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum DirectionEntry {
    Input,
    Output,
}

#[derive(Debug, Deserialize)]
struct StreamEntry {
    name: String,
    direction: DirectionEntry,
    width: u32,
    #[serde(default = "one_u32")]
    window: u32,
    #[serde(default = "one_u32")]
    step: u32,
    data_channels: Option<u32>,
    address_channels: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EndEntry {
    Constant(i64),
    Named(String),
}

#[derive(Debug, Deserialize)]
struct InductionEntry {
    name: String,
    #[serde(default = "default_width")]
    width: u32,
    value: Option<String>,
    #[serde(default)]
    start: i64,
    #[serde(default = "one")]
    step: i64,
    end: Option<EndEntry>,
}

#[derive(Debug, Deserialize)]
struct LutEntry {
    name: String,
    width: u32,
    #[serde(default)]
    contents: Vec<i64>,
}

#[derive(Debug, Deserialize)]
struct GraphFile {
    name: String,
    kind: KindEntry,
    delay: u32,
    sink: u32,
    #[serde(default)]
    stream_order: Vec<String>,
    #[serde(rename = "value", default)]
    values: Vec<ValueEntry>,
    #[serde(rename = "block", default)]
    blocks: Vec<BlockEntry>,
    #[serde(rename = "stream", default)]
    streams: Vec<StreamEntry>,
    #[serde(rename = "induction", default)]
    inductions: Vec<InductionEntry>,
    #[serde(rename = "lut", default)]
    luts: Vec<LutEntry>,
}

fn one() -> i64 {
    1
}

fn one_u32() -> u32 {
    1
}

fn default_width() -> u32 {
    32
}

/// Resolves names while one block is converted, for error messages.
struct Resolver<'a> {
    graph: &'a Graph,
    block: &'a str,
}

impl Resolver<'_> {
    fn value(&self, name: &str) -> Result<ValueId> {
        let name = name.trim_start_matches('%');
        self.graph.find_value(name).ok_or_else(|| {
            Error::GraphError(format!(
                "block {} refers to %{}, which is not declared",
                self.block, name
            ))
        })
    }

    fn lhs(&self, entry: &InstructionEntry) -> Result<ValueId> {
        match &entry.lhs {
            Some(lhs) => self.value(lhs),
            None => Err(self.malformed(entry, "needs an lhs")),
        }
    }

    fn args(&self, entry: &InstructionEntry, min: usize, max: usize) -> Result<Vec<ValueId>> {
        if entry.args.len() < min || entry.args.len() > max {
            return Err(self.malformed(
                entry,
                &if min == max {
                    format!("takes {} argument(s), not {}", min, entry.args.len())
                } else {
                    format!(
                        "takes {} to {} arguments, not {}",
                        min,
                        max,
                        entry.args.len()
                    )
                },
            ));
        }
        entry.args.iter().map(|arg| self.value(arg)).collect()
    }

    fn field<'e>(
        &self,
        entry: &'e InstructionEntry,
        field: &'e Option<String>,
        what: &str,
    ) -> Result<&'e str> {
        field
            .as_deref()
            .ok_or_else(|| self.malformed(entry, &format!("needs a {}", what)))
    }

    fn malformed(&self, entry: &InstructionEntry, problem: &str) -> Error {
        Error::ParsingError(format!(
            "'{}' in block {} {}",
            entry.op, self.block, problem
        ))
    }

    fn instruction(&self, entry: &InstructionEntry) -> Result<Instruction> {
        let binary = |op| -> Result<Instruction> {
            let args = self.args(entry, 2, 2)?;
            Ok(Instruction::Binary {
                op,
                lhs: self.lhs(entry)?,
                a: args[0],
                b: args[1],
            })
        };
        let shift = |kind| -> Result<Instruction> {
            let args = self.args(entry, 2, 2)?;
            Ok(Instruction::Shift {
                kind,
                lhs: self.lhs(entry)?,
                value: args[0],
                amount: args[1],
            })
        };
        let redundancy = |kind: RedundancyKind| -> Result<Instruction> {
            Ok(Instruction::Redundancy {
                kind,
                inputs: self.args(entry, kind.inputs(), kind.inputs())?,
                outputs: entry
                    .results
                    .iter()
                    .map(|r| self.value(r))
                    .collect::<Result<_>>()?,
            })
        };
        let cast = |kind| -> Result<Instruction> {
            Ok(Instruction::Cast {
                kind,
                lhs: self.lhs(entry)?,
                value: self.args(entry, 1, 1)?[0],
            })
        };
        match entry.op.as_str() {
            "add" => binary(BinaryOp::Add),
            "sub" => binary(BinaryOp::Sub),
            "mul" => binary(BinaryOp::Mul),
            "and" => binary(BinaryOp::And),
            "or" => binary(BinaryOp::Or),
            "xor" => binary(BinaryOp::Xor),
            "sdiv" => binary(BinaryOp::SDiv),
            "udiv" => binary(BinaryOp::UDiv),
            "srem" => binary(BinaryOp::SRem),
            "urem" => binary(BinaryOp::URem),
            "fadd" => binary(BinaryOp::FAdd),
            "fsub" => binary(BinaryOp::FSub),
            "fmul" => binary(BinaryOp::FMul),
            "fdiv" => binary(BinaryOp::FDiv),
            "icmp" | "fcmp" => {
                let float = entry.op == "fcmp";
                let predicate = match (float, self.field(entry, &entry.predicate, "predicate")?) {
                    (false, "eq") => Predicate::Eq,
                    (false, "ne") => Predicate::Ne,
                    (false, "slt") => Predicate::Slt,
                    (false, "sle") => Predicate::Sle,
                    (false, "sgt") => Predicate::Sgt,
                    (false, "sge") => Predicate::Sge,
                    (false, "ult") => Predicate::Ult,
                    (false, "ule") => Predicate::Ule,
                    (false, "ugt") => Predicate::Ugt,
                    (false, "uge") => Predicate::Uge,
                    (true, "eq") => Predicate::FEq,
                    (true, "ne") => Predicate::FNe,
                    (true, "lt") => Predicate::FLt,
                    (true, "le") => Predicate::FLe,
                    (true, "gt") => Predicate::FGt,
                    (true, "ge") => Predicate::FGe,
                    (_, other) => {
                        return Err(self.malformed(entry, &format!("has unknown predicate {}", other)))
                    }
                };
                let args = self.args(entry, 2, 2)?;
                Ok(Instruction::Compare {
                    predicate,
                    lhs: self.lhs(entry)?,
                    a: args[0],
                    b: args[1],
                })
            }
            "shl" => shift(ShiftKind::Shl),
            "lshr" => shift(ShiftKind::LShr),
            "ashr" => shift(ShiftKind::AShr),
            "select" => {
                let args = self.args(entry, 3, 3)?;
                Ok(Instruction::Select {
                    lhs: self.lhs(entry)?,
                    condition: args[0],
                    then: args[1],
                    otherwise: args[2],
                })
            }
            "zext" => cast(CastKind::ZExt),
            "sext" => cast(CastKind::SExt),
            "trunc" => cast(CastKind::Trunc),
            "bitcast" => cast(CastKind::Bitcast),
            "fptosi" => cast(CastKind::FpToSi),
            "fptoui" => cast(CastKind::FpToUi),
            "sitofp" => cast(CastKind::SiToFp),
            "uitofp" => cast(CastKind::UiToFp),
            "fpext" => cast(CastKind::FpExt),
            "fptrunc" => cast(CastKind::FpTrunc),
            "copy" => Ok(Instruction::Copy {
                lhs: self.lhs(entry)?,
                value: self.args(entry, 1, 1)?[0],
            }),
            "call" => Ok(Instruction::Call {
                callee: self.field(entry, &entry.callee, "callee")?.to_string(),
                inputs: self.args(entry, 0, usize::MAX)?,
                outputs: entry
                    .results
                    .iter()
                    .map(|r| self.value(r))
                    .collect::<Result<_>>()?,
            }),
            "triple_vote" => redundancy(RedundancyKind::TripleVote),
            "double_vote" => redundancy(RedundancyKind::DoubleVote),
            "stream_splitter" => redundancy(RedundancyKind::StreamSplitter),
            "stream_double_vote" => redundancy(RedundancyKind::StreamDoubleVote),
            "stream_triple_vote" => redundancy(RedundancyKind::StreamTripleVote),
            "input_scalar" => Ok(Instruction::InputScalar {
                lhs: self.lhs(entry)?,
            }),
            "output_scalar" => Ok(Instruction::OutputScalar {
                value: self.args(entry, 1, 1)?[0],
            }),
            "input_stream" => Ok(Instruction::InputStream {
                lhs: self.lhs(entry)?,
                stream: self.field(entry, &entry.stream, "stream")?.to_string(),
                index: entry.index.unwrap_or(0),
            }),
            "output_stream" => Ok(Instruction::OutputStream {
                value: self.args(entry, 1, 1)?[0],
                stream: self.field(entry, &entry.stream, "stream")?.to_string(),
                index: entry.index.unwrap_or(0),
            }),
            "store_next" => Ok(Instruction::FeedbackStore {
                register: self.value(self.field(entry, &entry.register, "register")?)?,
                value: self.args(entry, 1, 1)?[0],
            }),
            "load_previous" => Ok(Instruction::FeedbackLoad {
                lhs: self.lhs(entry)?,
                register: self.value(self.field(entry, &entry.register, "register")?)?,
                default: self.args(entry, 0, 1)?.first().copied(),
            }),
            "summation" => {
                let args = self.args(entry, 1, 2)?;
                Ok(Instruction::Summation {
                    lhs: self.lhs(entry)?,
                    value: args[0],
                    default: args.get(1).copied(),
                })
            }
            "lut_read" => Ok(Instruction::LutRead {
                lhs: self.lhs(entry)?,
                lut: self.field(entry, &entry.lut, "lut")?.to_string(),
                address: self.args(entry, 1, 1)?[0],
            }),
            "lut_write" => {
                let args = self.args(entry, 2, 2)?;
                Ok(Instruction::LutWrite {
                    lut: self.field(entry, &entry.lut, "lut")?.to_string(),
                    address: args[0],
                    value: args[1],
                })
            }
            "debug_output" => {
                let args = self.args(entry, 1, 2)?;
                Ok(Instruction::DebugOutput {
                    value: args[0],
                    watch: args.get(1).copied(),
                })
            }
            other => Err(Error::GraphError(format!(
                "block {} uses unsupported instruction {}",
                self.block, other
            ))),
        }
    }
}

fn convert(file: GraphFile) -> Result<Graph> {
    let kind = match file.kind {
        KindEntry::Module => ComponentKind::Module,
        KindEntry::System => ComponentKind::System,
    };
    let mut graph = Graph::new(file.name, kind, file.delay);
    for entry in file.values {
        let info = if entry.float {
            ValueInfo::float(entry.name, entry.width)
        } else {
            ValueInfo::int(entry.name, entry.width)
        };
        let info = if entry.signed { info.signed() } else { info };
        let info = match entry.constant {
            Some(ConstantEntry::Int(value)) if !info.float => info.with_constant(value),
            Some(ConstantEntry::Int(value)) => info.with_float_constant(value as f64),
            Some(ConstantEntry::Float(value)) => info.with_float_constant(value),
            None => info,
        };
        graph.add_value(info)?;
    }

    let ids: HashMap<u32, BlockId> = file
        .blocks
        .iter()
        .enumerate()
        .map(|(index, block)| (block.id, BlockId(index)))
        .collect();
    if ids.len() != file.blocks.len() {
        return Err(Error::GraphError(format!(
            "{} declares a block id twice",
            graph.name
        )));
    }
    let block_id = |id: &u32| {
        ids.get(id)
            .copied()
            .ok_or_else(|| Error::GraphError(format!("block {} is not declared", id)))
    };
    let mut blocks = vec![];
    for entry in &file.blocks {
        let name = entry
            .name
            .clone()
            .unwrap_or_else(|| format!("block{}", entry.id));
        let resolver = Resolver {
            graph: &graph,
            block: &name,
        };
        let instructions = entry
            .instructions
            .iter()
            .map(|i| resolver.instruction(i))
            .collect::<Result<Vec<_>>>()?;
        let mut block = Block::new(name, entry.pipeline_level)
            .with_delay(entry.delay)
            .with_predecessors(entry.predecessors.iter().map(block_id).collect::<Result<_>>()?);
        block.dataflow_level = entry.dataflow_level.unwrap_or(entry.pipeline_level);
        block.instructions = instructions;
        blocks.push(block);
    }
    for block in blocks {
        graph.add_block(block);
    }
    graph.sink = block_id(&file.sink)?;

    for entry in file.streams {
        let direction = match entry.direction {
            DirectionEntry::Input => StreamDirection::Input,
            DirectionEntry::Output => StreamDirection::Output,
        };
        let mut stream = StreamBuffer::new(entry.name, direction, entry.width)
            .with_window(entry.window, entry.step);
        stream.data_channels = entry.data_channels;
        stream.address_channels = entry.address_channels;
        graph.streams.push(stream);
    }
    for entry in file.inductions {
        let value = match &entry.value {
            Some(name) => Some(graph.find_value(name).ok_or_else(|| {
                Error::GraphError(format!(
                    "induction variable {} refers to %{}, which is not declared",
                    entry.name, name
                ))
            })?),
            None => None,
        };
        let end = match entry.end {
            Some(EndEntry::Constant(value)) => Some(InductionEnd::Constant(value)),
            Some(EndEntry::Named(name)) if name == "port" => Some(InductionEnd::Port),
            Some(EndEntry::Named(name)) => {
                return Err(Error::ParsingError(format!(
                    "the end of induction variable {} must be a number or \"port\", not \"{}\"",
                    entry.name, name
                )))
            }
            None => None,
        };
        graph.inductions.push(Induction {
            name: entry.name,
            width: entry.width,
            value,
            start: entry.start,
            step: entry.step,
            end,
        });
    }
    graph.luts = file
        .luts
        .into_iter()
        .map(|l| Lut {
            name: l.name,
            width: l.width,
            contents: l.contents,
        })
        .collect();
    graph.stream_order = file.stream_order;
    debug!(
        "loaded graph {} with {} values in {} blocks",
        graph.name,
        graph.values.len(),
        graph.blocks.len()
    );
    Ok(graph)
}

/// Parses a graph from TOML source.
pub fn parse_graph(src: &str) -> Result<Graph> {
    let file: GraphFile = toml::from_str(src)
        .map_err(|err| Error::ParsingError(format!("Unable to parse the graph file: {}", err)))?;
    convert(file)
}

pub fn graph_from_path(path: impl AsRef<Path>) -> Result<Graph> {
    let path = path.as_ref();
    let src = fs::read_to_string(path).map_err(|err| {
        Error::FileIOError(format!("Unable to read {}: {}", path.display(), err))
    })?;
    parse_graph(&src)
}
