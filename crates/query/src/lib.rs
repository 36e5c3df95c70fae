//! The scheduled dataflow graph handed to the back end and the facts derived
//! from it: where values are defined, at which stage each block runs, which
//! operands cross a stage boundary and how far feedback reaches.
use std::{
    collections::{BTreeMap, HashSet, VecDeque},
    sync::Arc,
};

use log::{debug, warn};

use dfc_common::error::{Error, Result};

use crate::{
    graph::{BlockId, ComponentKind, Graph, StreamDirection, ValueId},
    instruction::Instruction,
};

pub mod graph;
pub mod instruction;

/// Position of an instruction: its block and its index within the block.
pub type Location = (BlockId, usize);

#[salsa::query_group(GraphStorage)]
pub trait GraphQueries {
    #[salsa::input]
    fn graph(&self) -> Arc<Graph>;

    /// The instruction defining each value.
    fn definitions(&self) -> Result<Arc<BTreeMap<ValueId, Location>>>;

    /// Blocks from the sink back to the sources, breadth first. Blocks the
    /// sink does not depend on come last.
    fn block_order(&self) -> Result<Arc<Vec<BlockId>>>;

    /// The stage a block's statements are gated by.
    fn actual_level(&self, block: BlockId) -> Result<i64>;

    /// The stage that produces a value: it is valid in the cycle stage
    /// `level - 1` runs. Inputs arrive in stage `N`, core results `delay`
    /// stages after their call. Constants have none.
    fn def_level(&self, value: ValueId) -> Result<Option<i64>>;

    /// Operands of the block's staged instructions that are produced in an
    /// earlier stage, in order of first use.
    fn live_ins(&self, block: BlockId) -> Result<Arc<Vec<ValueId>>>;

    /// The number of stages between a feedback value's production and its
    /// next consumption, over all feedback registers and lookup tables. None
    /// when the graph has no feedback.
    fn feedback_distance(&self, strict: bool) -> Result<Option<u32>>;

    fn validate(&self) -> Result<()>;
}

fn definitions(db: &dyn GraphQueries) -> Result<Arc<BTreeMap<ValueId, Location>>> {
    let graph = db.graph();
    let mut result = BTreeMap::new();
    for block in graph.block_ids() {
        for (index, instruction) in graph.block(block)?.instructions.iter().enumerate() {
            for value in instruction.defines() {
                if let Some(previous) = result.insert(value, (block, index)) {
                    let name = &graph.value(value)?.name;
                    return Err(Error::GraphError(format!(
                        "%{} is defined in block {} and again in block {}",
                        name,
                        graph.block(previous.0)?.name,
                        graph.block(block)?.name
                    )));
                }
            }
        }
    }
    Ok(Arc::new(result))
}

fn block_order(db: &dyn GraphQueries) -> Result<Arc<Vec<BlockId>>> {
    let graph = db.graph();
    graph.block(graph.sink)?;
    let mut visited = HashSet::new();
    let mut order = vec![];
    let mut queue = VecDeque::from(vec![graph.sink]);
    while let Some(block) = queue.pop_front() {
        if !visited.insert(block) {
            continue;
        }
        order.push(block);
        for predecessor in &graph.block(block)?.predecessors {
            if !visited.contains(predecessor) {
                queue.push_back(*predecessor);
            }
        }
    }
    for block in graph.block_ids() {
        if !visited.contains(&block) {
            debug!(
                "block {} does not reach the sink of {}",
                graph.block(block)?.name,
                graph.name
            );
            order.push(block);
        }
    }
    Ok(Arc::new(order))
}

fn actual_level(db: &dyn GraphQueries, block: BlockId) -> Result<i64> {
    let graph = db.graph();
    let block = graph.block(block)?;
    let core_entry = if block.starts_with_call() { 1 } else { 0 };
    Ok(block.pipeline_level + block.delay - 1 + core_entry)
}

fn def_level(db: &dyn GraphQueries, value: ValueId) -> Result<Option<i64>> {
    let graph = db.graph();
    if graph.value(value)?.is_constant() {
        return Ok(None);
    }
    if graph.induction_of(value).is_some() {
        return Ok(Some(i64::from(graph.delay)));
    }
    match db.definitions()?.get(&value) {
        Some((block_id, index)) => {
            let block = graph.block(*block_id)?;
            let stage = db.actual_level(*block_id)?;
            match block.instructions.get(*index) {
                Some(instruction) if instruction.is_input() => Ok(Some(i64::from(graph.delay))),
                // A core answers `delay` cycles after the stage that loads it.
                Some(Instruction::Call { .. }) => Ok(Some(stage - block.delay)),
                _ => Ok(Some(stage)),
            }
        }
        None => Ok(None),
    }
}

fn live_ins(db: &dyn GraphQueries, block: BlockId) -> Result<Arc<Vec<ValueId>>> {
    let graph = db.graph();
    let current = graph.block(block)?;
    let stage = db.actual_level(block)?;
    let mut result: Vec<ValueId> = vec![];
    for instruction in current.instructions.iter().filter(|i| i.is_staged()) {
        for operand in instruction.operands() {
            if graph.value(operand)?.is_constant() || result.contains(&operand) {
                continue;
            }
            match db.def_level(operand)? {
                Some(level) if level > stage => result.push(operand),
                Some(_) => (),
                None => {
                    return Err(Error::GraphError(format!(
                        "live-in value %{} of '{}' has no defining instruction",
                        graph.value(operand)?.name,
                        instruction.describe(&graph)
                    )))
                }
            }
        }
    }
    Ok(Arc::new(result))
}

fn feedback_distance(db: &dyn GraphQueries, strict: bool) -> Result<Option<u32>> {
    let graph = db.graph();
    let mut distance: Option<i64> = None;
    let mut consider = |length: i64| {
        distance = Some(distance.map_or(length, |d| d.max(length)));
    };

    let mut loads: BTreeMap<ValueId, i64> = BTreeMap::new();
    for (block, instruction) in graph.instructions() {
        if let Instruction::FeedbackLoad { register, .. } = instruction {
            loads.insert(*register, db.actual_level(block)?);
        }
    }
    for (_, instruction) in graph.instructions() {
        if let Instruction::FeedbackStore { register, value } = instruction {
            let register_name = &graph.value(*register)?.name;
            let previous = match loads.get(register) {
                Some(level) => *level,
                None if strict => {
                    return Err(Error::GraphError(format!(
                        "feedback register %{} is stored but never loaded",
                        register_name
                    )))
                }
                None => {
                    warn!(
                        "Feedback register %{} is stored but never loaded; it does not restrict the initiation interval",
                        register_name
                    );
                    continue;
                }
            };
            let next = match db.def_level(*value)? {
                Some(level) => level - 1,
                None => continue,
            };
            let length = previous - next;
            if length < 0 {
                if strict {
                    return Err(Error::GraphError(format!(
                        "feedback through %{} reaches backwards ({} stages)",
                        register_name, length
                    )));
                }
                warn!(
                    "Feedback through %{} reaches backwards ({} stages); no extra throttling is applied",
                    register_name, length
                );
                continue;
            }
            consider(length);
        }
    }

    let mut lut_levels: BTreeMap<&str, (i64, i64)> = BTreeMap::new();
    for (block, instruction) in graph.instructions() {
        let lut = match instruction {
            Instruction::LutRead { lut, .. } | Instruction::LutWrite { lut, .. } => lut,
            _ => continue,
        };
        let level = db.actual_level(block)?;
        if level < 0 {
            continue;
        }
        let entry = lut_levels.entry(lut.as_str()).or_insert((level, level));
        entry.0 = entry.0.min(level);
        entry.1 = entry.1.max(level);
    }
    for (min, max) in lut_levels.values() {
        consider(max - min + 1);
    }

    match distance {
        Some(d) => Ok(Some(u32::try_from(d).map_err(|e| {
            Error::GraphError(format!("feedback distance {} is out of range: {}", d, e))
        })?)),
        None => Ok(None),
    }
}

fn validate(db: &dyn GraphQueries) -> Result<()> {
    let graph = db.graph();
    if graph.delay == 0 {
        return Err(Error::GraphError(format!(
            "{} has no pipeline delay; are the outputs connected to the inputs?",
            graph.name
        )));
    }
    graph.block(graph.sink)?;
    for block in &graph.blocks {
        for predecessor in &block.predecessors {
            graph.block(*predecessor)?;
        }
    }
    db.definitions()?;

    for (_, instruction) in graph.instructions() {
        for value in instruction.operands().into_iter().chain(instruction.defines()) {
            graph.value(value)?;
        }
        match instruction {
            Instruction::InputStream { stream, index, .. }
            | Instruction::OutputStream { stream, index, .. } => {
                let buffer = graph.stream(stream)?;
                let wanted = if matches!(instruction, Instruction::InputStream { .. }) {
                    StreamDirection::Input
                } else {
                    StreamDirection::Output
                };
                if buffer.direction != wanted {
                    return Err(Error::GraphError(format!(
                        "'{}' uses stream {} in the wrong direction",
                        instruction.describe(&graph),
                        stream
                    )));
                }
                if *index >= buffer.window as usize {
                    return Err(Error::GraphError(format!(
                        "'{}' is outside the window of {} elements of stream {}",
                        instruction.describe(&graph),
                        buffer.window,
                        stream
                    )));
                }
            }
            Instruction::LutRead { lut, .. } | Instruction::LutWrite { lut, .. } => {
                graph.lut(lut)?;
            }
            Instruction::Redundancy {
                kind,
                inputs,
                outputs,
            } => {
                if inputs.len() != kind.inputs() || outputs.is_empty() {
                    return Err(Error::GraphError(format!(
                        "'{}' needs {} input(s) and at least one output",
                        instruction.describe(&graph),
                        kind.inputs()
                    )));
                }
            }
            _ => (),
        }
    }

    if graph.kind == ComponentKind::Module && !graph.streams.is_empty() {
        return Err(Error::GraphError(format!(
            "module {} declares streams; only systems can access streams",
            graph.name
        )));
    }
    for stream in &graph.streams {
        if stream.window == 0 || stream.step == 0 {
            return Err(Error::GraphError(format!(
                "stream {} needs a window and a step of at least one element",
                stream.name
            )));
        }
        let count = graph
            .stream_order
            .iter()
            .filter(|name| **name == stream.name)
            .count();
        if count != 1 {
            return Err(Error::GraphError(format!(
                "the stream order must list {} exactly once, it is listed {} times",
                stream.name, count
            )));
        }
    }
    if let Some(unknown) = graph
        .stream_order
        .iter()
        .find(|name| graph.stream(name).is_err())
    {
        return Err(Error::GraphError(format!(
            "the stream order lists {}, which is not declared",
            unknown
        )));
    }
    for induction in &graph.inductions {
        if induction.step == 0 {
            return Err(Error::GraphError(format!(
                "induction variable {} never advances",
                induction.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        graph::{Block, Lut, StreamBuffer, ValueInfo},
        instruction::{BinaryOp, RedundancyKind},
    };
    use pretty_assertions::assert_eq;

    #[salsa::database(GraphStorage)]
    #[derive(Default)]
    struct Database {
        storage: salsa::Storage<Database>,
    }

    impl salsa::Database for Database {}

    fn database(graph: Graph) -> Database {
        let mut db = Database::default();
        db.set_graph(Arc::new(graph));
        db
    }

    /// `acc = load_previous(reg, 0); sum = acc + x; store_next(reg, sum); out(sum)`
    /// over three stages.
    fn accumulator(load_level: i64) -> Result<Graph> {
        let mut graph = Graph::new("acc", ComponentKind::Module, 3);
        let x = graph.add_value(ValueInfo::int("x", 32))?;
        let zero = graph.add_value(ValueInfo::int("zero", 32).with_constant(0))?;
        let reg = graph.add_value(ValueInfo::int("reg", 32))?;
        let acc = graph.add_value(ValueInfo::int("acc", 32))?;
        let sum = graph.add_value(ValueInfo::int("sum", 32))?;
        let input = graph.add_block(Block::new("input", 3).with(Instruction::InputScalar { lhs: x }));
        let load = graph.add_block(
            Block::new("load", load_level)
                .with_predecessors(vec![input])
                .with(Instruction::FeedbackLoad {
                    lhs: acc,
                    register: reg,
                    default: Some(zero),
                }),
        );
        let add = graph.add_block(
            Block::new("add", 1)
                .with_predecessors(vec![load])
                .with(Instruction::Binary {
                    op: BinaryOp::Add,
                    lhs: sum,
                    a: acc,
                    b: x,
                })
                .with(Instruction::FeedbackStore {
                    register: reg,
                    value: sum,
                }),
        );
        graph.sink = graph.add_block(
            Block::new("output", 0)
                .with_predecessors(vec![add])
                .with(Instruction::OutputScalar { value: sum }),
        );
        Ok(graph)
    }

    fn id(graph: &Graph, name: &str) -> Result<ValueId> {
        graph
            .find_value(name)
            .ok_or_else(|| Error::GraphError(format!("no value %{}", name)))
    }

    #[test]
    fn levels_and_live_ins() -> Result<()> {
        let db = database(accumulator(2)?);
        db.validate()?;
        let graph = db.graph();
        let (x, acc, sum) = (id(&graph, "x")?, id(&graph, "acc")?, id(&graph, "sum")?);
        assert_eq!(db.def_level(x)?, Some(3));
        assert_eq!(db.def_level(id(&graph, "zero")?)?, None);
        assert_eq!(db.actual_level(BlockId(2))?, 1);
        assert_eq!(*db.live_ins(BlockId(2))?, vec![acc, x]);
        assert_eq!(*db.live_ins(BlockId(3))?, vec![sum]);
        assert_eq!(
            *db.block_order()?,
            vec![BlockId(3), BlockId(2), BlockId(1), BlockId(0)]
        );
        Ok(())
    }

    #[test]
    fn core_calls_take_an_extra_stage() -> Result<()> {
        let mut graph = Graph::new("call", ComponentKind::Module, 4);
        let a = graph.add_value(ValueInfo::int("a", 8))?;
        let b = graph.add_value(ValueInfo::int("b", 8))?;
        graph.add_block(Block::new("input", 4).with(Instruction::InputScalar { lhs: a }));
        graph.sink = graph.add_block(
            Block::new("core", 1).with_delay(2).with(Instruction::Call {
                callee: "div8".to_string(),
                inputs: vec![a],
                outputs: vec![b],
            }),
        );
        let db = database(graph);
        assert_eq!(db.actual_level(BlockId(1))?, 3);
        Ok(())
    }

    #[test]
    fn multi_cycle_blocks_define_in_their_gated_stage() -> Result<()> {
        let mut graph = Graph::new("square", ComponentKind::Module, 4);
        let x = graph.add_value(ValueInfo::int("x", 16))?;
        let product = graph.add_value(ValueInfo::int("product", 32))?;
        let quotient = graph.add_value(ValueInfo::int("quotient", 16))?;
        let reg = graph.add_value(ValueInfo::int("reg", 32))?;
        let input = graph.add_block(Block::new("input", 4).with(Instruction::InputScalar { lhs: x }));
        let square = graph.add_block(
            Block::new("square", 1)
                .with_delay(2)
                .with_predecessors(vec![input])
                .with(Instruction::Binary {
                    op: BinaryOp::Mul,
                    lhs: product,
                    a: x,
                    b: x,
                }),
        );
        let divide = graph.add_block(
            Block::new("divide", 1)
                .with_delay(2)
                .with_predecessors(vec![input])
                .with(Instruction::Call {
                    callee: "div16".to_string(),
                    inputs: vec![x, x],
                    outputs: vec![quotient],
                }),
        );
        graph.sink = graph.add_block(
            Block::new("store", 0)
                .with_predecessors(vec![square, divide])
                .with(Instruction::FeedbackStore {
                    register: reg,
                    value: product,
                })
                .with(Instruction::OutputScalar { value: quotient }),
        );
        let db = database(graph);
        db.validate()?;
        assert_eq!(db.actual_level(square)?, 2);
        assert_eq!(db.def_level(product)?, Some(2));
        // Loaded in stage 3, answering two cycles later.
        assert_eq!(db.actual_level(divide)?, 3);
        assert_eq!(db.def_level(quotient)?, Some(1));
        assert_eq!(*db.live_ins(square)?, vec![x]);
        Ok(())
    }

    #[test]
    fn redundancy_needs_its_inputs() -> Result<()> {
        let mut graph = Graph::new("tmr", ComponentKind::Module, 2);
        let copies = (0..3)
            .map(|i| graph.add_value(ValueInfo::int(format!("x{}", i), 8)))
            .collect::<Result<Vec<_>>>()?;
        let voted = graph.add_value(ValueInfo::int("voted", 8))?;
        let vote = |inputs: Vec<ValueId>| Instruction::Redundancy {
            kind: RedundancyKind::TripleVote,
            inputs,
            outputs: vec![voted],
        };
        graph.sink = graph.add_block(Block::new("vote", 1).with(vote(copies.clone())));
        let db = database(graph.clone());
        db.validate()?;
        assert_eq!(db.def_level(voted)?, Some(1));

        graph.blocks[0].instructions[0] = vote(copies[..2].to_vec());
        assert_eq!(
            database(graph).validate(),
            Err(Error::GraphError(
                "'i8 %voted = triple_vote i8 %x0, i8 %x1' needs 3 input(s) and at least one output"
                    .to_string()
            ))
        );
        Ok(())
    }

    #[test]
    fn feedback_distances() -> Result<()> {
        // Loaded in stage 2, the stored value is ready once stage 1 is done.
        assert_eq!(database(accumulator(2)?).feedback_distance(false)?, Some(2));
        assert_eq!(database(accumulator(3)?).feedback_distance(false)?, Some(3));

        let mut graph = accumulator(2)?;
        let address = id(&graph, "x")?;
        let value = graph.add_value(ValueInfo::int("entry", 8))?;
        graph.luts.push(Lut {
            name: "table".to_string(),
            width: 8,
            contents: vec![1, 2, 3],
        });
        graph.push(BlockId(1), Instruction::LutRead { lhs: value, lut: "table".to_string(), address })?;
        graph.push(
            BlockId(3),
            Instruction::LutWrite { lut: "table".to_string(), address, value },
        )?;
        let db = database(graph);
        db.validate()?;
        // Read in stage 2, written in stage 0.
        assert_eq!(db.feedback_distance(false)?, Some(3));
        Ok(())
    }

    #[test]
    fn backwards_feedback_is_lenient_unless_strict() -> Result<()> {
        let mut graph = accumulator(0)?;
        graph.blocks[2].pipeline_level = 2;
        let db = database(graph);
        assert_eq!(db.feedback_distance(false)?, None);
        assert!(matches!(db.feedback_distance(true), Err(Error::GraphError(_))));
        Ok(())
    }

    #[test]
    fn no_feedback() -> Result<()> {
        let mut graph = Graph::new("plain", ComponentKind::Module, 1);
        let a = graph.add_value(ValueInfo::int("a", 8))?;
        graph.sink = graph.add_block(
            Block::new("io", 1)
                .with(Instruction::InputScalar { lhs: a })
                .with(Instruction::OutputScalar { value: a }),
        );
        assert_eq!(database(graph).feedback_distance(true)?, None);
        Ok(())
    }

    #[test]
    fn malformed_graphs() -> Result<()> {
        let mut graph = accumulator(2)?;
        let x = id(&graph, "x")?;
        graph.push(BlockId(2), Instruction::InputScalar { lhs: x })?;
        assert!(matches!(database(graph).validate(), Err(Error::GraphError(_))));

        let mut graph = accumulator(2)?;
        graph.kind = ComponentKind::System;
        graph.streams.push(StreamBuffer::new("A", StreamDirection::Input, 8));
        assert_eq!(
            database(graph.clone()).validate(),
            Err(Error::GraphError(
                "the stream order must list A exactly once, it is listed 0 times".to_string()
            ))
        );
        graph.stream_order = vec!["A".to_string(), "B".to_string()];
        assert!(database(graph.clone()).validate().is_err());
        graph.stream_order = vec!["A".to_string()];
        database(graph).validate()?;

        let mut graph = accumulator(2)?;
        let ghost = graph.add_value(ValueInfo::int("ghost", 8))?;
        graph.push(BlockId(3), Instruction::OutputScalar { value: ghost })?;
        assert_eq!(
            database(graph).live_ins(BlockId(3)),
            Err(Error::GraphError(
                "live-in value %ghost of 'output_scalar i8 %ghost' has no defining instruction"
                    .to_string()
            ))
        );
        assert!(graph_with_duplicate_name().is_err());
        Ok(())
    }

    fn graph_with_duplicate_name() -> Result<Graph> {
        let mut graph = Graph::new("dup", ComponentKind::Module, 1);
        graph.add_value(ValueInfo::int("a", 8))?;
        graph.add_value(ValueInfo::int("a", 16))?;
        Ok(graph)
    }
}
