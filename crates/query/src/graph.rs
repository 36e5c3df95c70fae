//! The scheduled dataflow graph.
use indexmap::IndexMap;

use dfc_common::{
    error::{Error, Result},
    numbers::BitWidth,
};

use crate::instruction::Instruction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub usize);

/// Floats are kept as their bit pattern so graphs can be compared and hashed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Constant {
    Int(i64),
    Float(u64),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValueInfo {
    pub name: String,
    pub width: BitWidth,
    pub signed: bool,
    pub float: bool,
    pub constant: Option<Constant>,
}

impl ValueInfo {
    pub fn int(name: impl Into<String>, width: BitWidth) -> Self {
        ValueInfo {
            name: name.into(),
            width,
            signed: false,
            float: false,
            constant: None,
        }
    }

    pub fn float(name: impl Into<String>, width: BitWidth) -> Self {
        ValueInfo {
            float: true,
            ..ValueInfo::int(name, width)
        }
    }

    pub fn signed(mut self) -> Self {
        self.signed = true;
        self
    }

    pub fn with_constant(mut self, value: i64) -> Self {
        self.constant = Some(Constant::Int(value));
        self
    }

    /// A float constant, stored single or double precision depending on the
    /// width.
    pub fn with_float_constant(mut self, value: f64) -> Self {
        let bits = if self.width == 32 {
            u64::from((value as f32).to_bits())
        } else {
            value.to_bits()
        };
        self.float = true;
        self.constant = Some(Constant::Float(bits));
        self
    }

    pub fn is_constant(&self) -> bool {
        self.constant.is_some()
    }

    pub fn type_name(&self) -> String {
        format!("{}{}", if self.float { "f" } else { "i" }, self.width)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Block {
    pub name: String,
    /// Pipeline stage, -1 when the block is not part of the steady-state
    /// pipeline. Higher levels are earlier stages.
    pub pipeline_level: i64,
    pub dataflow_level: i64,
    pub delay: i64,
    pub predecessors: Vec<BlockId>,
    pub instructions: Vec<Instruction>,
}

impl Block {
    pub fn new(name: impl Into<String>, pipeline_level: i64) -> Self {
        Block {
            name: name.into(),
            pipeline_level,
            dataflow_level: pipeline_level,
            delay: 1,
            predecessors: vec![],
            instructions: vec![],
        }
    }

    pub fn with_delay(mut self, delay: i64) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_predecessors(mut self, predecessors: Vec<BlockId>) -> Self {
        self.predecessors = predecessors;
        self
    }

    pub fn with(mut self, instruction: Instruction) -> Self {
        self.instructions.push(instruction);
        self
    }

    pub fn starts_with_call(&self) -> bool {
        self.instructions
            .first()
            .map(Instruction::is_call)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamDirection {
    Input,
    Output,
}

/// A buffer the component reads from or writes to memory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamBuffer {
    pub name: String,
    pub direction: StreamDirection,
    /// Width of one element.
    pub width: BitWidth,
    /// Elements accessed per activation.
    pub window: u32,
    /// Elements the window advances per activation.
    pub step: u32,
    pub data_channels: Option<u32>,
    pub address_channels: Option<u32>,
}

impl StreamBuffer {
    pub fn new(name: impl Into<String>, direction: StreamDirection, width: BitWidth) -> Self {
        StreamBuffer {
            name: name.into(),
            direction,
            width,
            window: 1,
            step: 1,
            data_channels: None,
            address_channels: None,
        }
    }

    pub fn with_window(mut self, window: u32, step: u32) -> Self {
        self.window = window;
        self.step = step;
        self
    }

    pub fn with_channels(mut self, data: u32, address: u32) -> Self {
        self.data_channels = Some(data);
        self.address_channels = Some(address);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InductionEnd {
    Constant(i64),
    /// Supplied at run time through an input port named `<induction>_end`.
    Port,
}

/// A loop induction variable, counted by the input controller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Induction {
    pub name: String,
    pub width: BitWidth,
    /// The graph value the datapath reads, if any.
    pub value: Option<ValueId>,
    pub start: i64,
    pub step: i64,
    /// No end means the loop runs until reset.
    pub end: Option<InductionEnd>,
}

/// A lookup table backed by an on-chip memory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Lut {
    pub name: String,
    pub width: BitWidth,
    pub contents: Vec<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    /// Scalar inputs and outputs, one activation per `inputReady`.
    Module,
    /// Streams through generated input and output controllers.
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Graph {
    pub name: String,
    pub kind: ComponentKind,
    /// Total pipeline delay.
    pub delay: u32,
    pub sink: BlockId,
    pub values: Vec<ValueInfo>,
    pub blocks: Vec<Block>,
    pub streams: Vec<StreamBuffer>,
    pub inductions: Vec<Induction>,
    /// Order in which the controllers access the streams.
    pub stream_order: Vec<String>,
    pub luts: Vec<Lut>,
}

impl Graph {
    pub fn new(name: impl Into<String>, kind: ComponentKind, delay: u32) -> Self {
        Graph {
            name: name.into(),
            kind,
            delay,
            sink: BlockId(0),
            values: vec![],
            blocks: vec![],
            streams: vec![],
            inductions: vec![],
            stream_order: vec![],
            luts: vec![],
        }
    }

    pub fn add_value(&mut self, value: ValueInfo) -> Result<ValueId> {
        if self.find_value(&value.name).is_some() {
            return Err(Error::GraphError(format!(
                "value %{} is declared twice",
                value.name
            )));
        }
        self.values.push(value);
        Ok(ValueId(self.values.len() - 1))
    }

    pub fn add_block(&mut self, block: Block) -> BlockId {
        self.blocks.push(block);
        BlockId(self.blocks.len() - 1)
    }

    pub fn push(&mut self, block: BlockId, instruction: Instruction) -> Result<()> {
        self.block_mut(block)?.instructions.push(instruction);
        Ok(())
    }

    pub fn value(&self, id: ValueId) -> Result<&ValueInfo> {
        self.values
            .get(id.0)
            .ok_or_else(|| Error::GraphError(format!("unknown value <{}>", id.0)))
    }

    pub fn find_value(&self, name: &str) -> Option<ValueId> {
        self.values
            .iter()
            .position(|v| v.name == name)
            .map(ValueId)
    }

    pub fn block(&self, id: BlockId) -> Result<&Block> {
        self.blocks
            .get(id.0)
            .ok_or_else(|| Error::GraphError(format!("unknown block <{}>", id.0)))
    }

    pub fn block_mut(&mut self, id: BlockId) -> Result<&mut Block> {
        self.blocks
            .get_mut(id.0)
            .ok_or_else(|| Error::GraphError(format!("unknown block <{}>", id.0)))
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len()).map(BlockId)
    }

    /// Every instruction with its block, in block order.
    pub fn instructions(&self) -> impl Iterator<Item = (BlockId, &Instruction)> {
        self.blocks
            .iter()
            .enumerate()
            .flat_map(|(index, block)| block.instructions.iter().map(move |i| (BlockId(index), i)))
    }

    pub fn stream(&self, name: &str) -> Result<&StreamBuffer> {
        self.streams
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| Error::GraphError(format!("stream {} is not declared", name)))
    }

    pub fn lut(&self, name: &str) -> Result<&Lut> {
        self.luts
            .iter()
            .find(|l| l.name == name)
            .ok_or_else(|| Error::GraphError(format!("lookup table {} is not declared", name)))
    }

    pub fn input_streams(&self) -> impl Iterator<Item = &StreamBuffer> {
        self.streams
            .iter()
            .filter(|s| s.direction == StreamDirection::Input)
    }

    pub fn output_streams(&self) -> impl Iterator<Item = &StreamBuffer> {
        self.streams
            .iter()
            .filter(|s| s.direction == StreamDirection::Output)
    }

    /// The induction whose value this is.
    pub fn induction_of(&self, value: ValueId) -> Option<&Induction> {
        self.inductions.iter().find(|i| i.value == Some(value))
    }

    /// Stream element reads and writes, keyed by stream, in window order.
    pub fn stream_accesses(&self) -> IndexMap<&str, Vec<(usize, ValueId)>> {
        let mut result: IndexMap<&str, Vec<(usize, ValueId)>> = IndexMap::new();
        for (_, instruction) in self.instructions() {
            match instruction {
                Instruction::InputStream { lhs, stream, index } => result
                    .entry(stream.as_str())
                    .or_insert_with(Vec::new)
                    .push((*index, *lhs)),
                Instruction::OutputStream {
                    value,
                    stream,
                    index,
                } => result
                    .entry(stream.as_str())
                    .or_insert_with(Vec::new)
                    .push((*index, *value)),
                _ => (),
            }
        }
        for accesses in result.values_mut() {
            accesses.sort();
        }
        result
    }
}
