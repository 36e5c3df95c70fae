//! Input and output controllers: the components between a streaming
//! pipeline and the memory-side stream interfaces.
//!
//! Both controllers are ordinary entities with the standard ports. Every
//! stream interface port they expose is recorded as a [`LibraryPort`] so that
//! the system can re-export it and describe it in the library.
use std::collections::BTreeSet;

use log::warn;

use dfc_common::{
    cat,
    error::{Error, Result},
    numbers::BitWidth,
};
use dfc_library::port::{LibraryPort, PortDirection, PortType};
use dfc_query::graph::{Graph, StreamBuffer, StreamDirection, ValueId};
use dfc_vhdl::{
    condition::Condition,
    entity::Entity,
    process::ProcessId,
    statement::Statement,
    value::Value,
    variable::{Mode, VarId},
};

pub mod fifo;
pub mod input;
pub mod output;

/// Width of the address base and count ports.
pub const ADDRESS_WIDTH: BitWidth = 32;

/// A generated controller entity and what the system needs to embed it.
#[derive(Debug)]
pub struct Controller {
    pub entity: Entity,
    /// Ports the system re-exports unchanged.
    pub external: Vec<LibraryPort>,
    /// Widths of the FIFOs instantiated, one design unit each.
    pub fifo_widths: BTreeSet<BitWidth>,
}

impl Controller {
    fn try_new(name: String) -> Result<Self> {
        Ok(Controller {
            entity: Entity::try_new(name)?,
            external: vec![],
            fifo_widths: BTreeSet::new(),
        })
    }

    /// Adds a port that the system re-exports.
    pub(crate) fn add_external(
        &mut self,
        name: String,
        width: BitWidth,
        mode: Mode,
        port_type: PortType,
        readable_name: &str,
    ) -> Result<VarId> {
        let var = self.entity.add_port(name.as_str(), width, mode)?;
        self.external.push(
            LibraryPort::new(name, direction(mode), width)
                .with_type(port_type)
                .with_readable_name(readable_name),
        );
        Ok(var)
    }

    /// The address generator interface of one stream.
    pub(crate) fn address_ports(&mut self, layout: &StreamLayout) -> Result<AddressPorts> {
        let name = layout.name.as_str();
        let clk = self.add_external(
            cat!(name, "address_clk"),
            1,
            Mode::In,
            PortType::StreamAddressClk,
            name,
        )?;
        let rdy = self.add_external(
            cat!(name, "address_rdy"),
            1,
            Mode::Out,
            PortType::StreamAddressRdy,
            name,
        )?;
        let stall = self.add_external(
            cat!(name, "address_stall"),
            1,
            Mode::In,
            PortType::StreamAddressStall,
            name,
        )?;
        let mut pairs = vec![];
        for channel in 0..layout.address_channels {
            let prefix = format!("{}_address_channel{}", name, channel);
            let base = self.add_external(
                cat!(prefix, "base"),
                ADDRESS_WIDTH,
                Mode::Out,
                PortType::StreamAddressBase,
                name,
            )?;
            let count = self.add_external(
                cat!(prefix, "count"),
                ADDRESS_WIDTH,
                Mode::Out,
                PortType::StreamAddressCount,
                name,
            )?;
            pairs.push((base, count));
        }
        Ok(AddressPorts {
            clk,
            rdy,
            stall,
            pairs,
        })
    }
}

pub(crate) fn direction(mode: Mode) -> PortDirection {
    match mode {
        Mode::In => PortDirection::In,
        Mode::Out => PortDirection::Out,
    }
}

/// `<stream>_element<index>`, the port carrying one window element.
pub fn element_port(stream: &str, index: usize) -> String {
    format!("{}_element{}", stream, index)
}

/// A stream buffer with its channel counts settled and checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamLayout {
    pub name: String,
    pub direction: StreamDirection,
    pub width: BitWidth,
    pub window: u32,
    pub step: u32,
    pub data_channels: u32,
    pub address_channels: u32,
    /// Window elements the pipeline touches, in index order.
    pub accessed: Vec<(usize, ValueId)>,
}

impl StreamLayout {
    pub fn try_new(stream: &StreamBuffer, accessed: &[(usize, ValueId)]) -> Result<Self> {
        let name = stream.name.as_str();
        if stream.window == 0 || stream.step == 0 {
            return Err(Error::StreamError(format!(
                "stream {} needs a window and a step of at least one element",
                name
            )));
        }
        if stream.step > stream.window {
            return Err(Error::StreamError(format!(
                "stream {} steps {} elements past its window of {}",
                name, stream.step, stream.window
            )));
        }
        let data_channels = match stream.data_channels {
            Some(channels) => channels,
            None => {
                let channels = match stream.direction {
                    StreamDirection::Input => 1,
                    StreamDirection::Output => stream.window,
                };
                warn!(
                    "Stream {} does not specify its data channels, using {}",
                    name, channels
                );
                channels
            }
        };
        let address_channels = match stream.address_channels {
            Some(channels) => channels,
            None => {
                warn!(
                    "Stream {} does not specify its address channels, using 1",
                    name
                );
                1
            }
        };
        if data_channels == 0 || address_channels == 0 {
            return Err(Error::StreamError(format!(
                "stream {} needs at least one data channel and one address channel",
                name
            )));
        }
        let transferred = match stream.direction {
            StreamDirection::Input => vec![stream.window, stream.step],
            StreamDirection::Output => vec![stream.window],
        };
        for count in &transferred {
            if count % data_channels != 0 {
                return Err(Error::StreamError(format!(
                    "stream {} moves {} elements at a time, which its {} data channels cannot split evenly",
                    name, count, data_channels
                )));
            }
            if count % address_channels != 0 {
                return Err(Error::StreamError(format!(
                    "stream {} requests {} elements at a time, which its {} address channels cannot split evenly",
                    name, count, address_channels
                )));
            }
        }
        if let Some((index, _)) = accessed.iter().find(|(i, _)| *i >= stream.window as usize) {
            return Err(Error::StreamError(format!(
                "element {} of stream {} is outside its window of {}",
                index, name, stream.window
            )));
        }
        Ok(StreamLayout {
            name: stream.name.clone(),
            direction: stream.direction,
            width: stream.width,
            window: stream.window,
            step: stream.step,
            data_channels,
            address_channels,
            accessed: accessed.to_vec(),
        })
    }

    /// Elements carried by one data channel per transfer.
    pub fn elements_per_channel(&self) -> u32 {
        match self.direction {
            StreamDirection::Input => 1,
            StreamDirection::Output => self.window / self.data_channels,
        }
    }
}

/// Layouts of the graph's streams in one direction, in stream access order.
pub fn layouts(graph: &Graph, direction: StreamDirection) -> Result<Vec<StreamLayout>> {
    let accesses = graph.stream_accesses();
    let names: Vec<&str> = if graph.stream_order.is_empty() {
        graph.streams.iter().map(|s| s.name.as_str()).collect()
    } else {
        graph.stream_order.iter().map(String::as_str).collect()
    };
    let mut result = vec![];
    for name in names {
        let stream = graph.stream(name)?;
        if stream.direction == direction {
            let accessed = accesses.get(name).map(Vec::as_slice).unwrap_or(&[]);
            result.push(StreamLayout::try_new(stream, accessed)?);
        }
    }
    Ok(result)
}

/// The address generator ports of one stream.
#[derive(Debug, Clone)]
pub(crate) struct AddressPorts {
    pub clk: VarId,
    pub rdy: VarId,
    pub stall: VarId,
    pub pairs: Vec<(VarId, VarId)>,
}

impl AddressPorts {
    /// Assignments issuing one request of `elements` elements from
    /// `next_base`, split evenly over the address channels. With several
    /// alternatives the first whose guard holds is issued.
    pub(crate) fn issue(
        &self,
        entity: &mut Entity,
        process: ProcessId,
        next_base: VarId,
        requests: &[(u32, Option<Condition>)],
    ) -> Result<Vec<Statement>> {
        let channels = self.pairs.len() as u32;
        let mut result = vec![entity.assign(process, self.rdy, Value::int(1))?];
        for (channel, (base, count)) in self.pairs.iter().enumerate() {
            let channel = channel as u32;
            let bases = requests
                .iter()
                .map(|(elements, guard)| {
                    let offset = i64::from(channel * (elements / channels));
                    let value = if offset == 0 {
                        Value::Var(next_base)
                    } else {
                        Value::add(next_base, Value::int(offset))
                    };
                    (value, guard.clone())
                })
                .collect();
            result.push(entity.assign_cases(process, *base, bases)?);
            let counts = requests
                .iter()
                .map(|(elements, guard)| {
                    (
                        Value::sized(i64::from(elements / channels), ADDRESS_WIDTH),
                        guard.clone(),
                    )
                })
                .collect();
            result.push(entity.assign_cases(process, *count, counts)?);
        }
        Ok(result)
    }
}

/// Delays `input` by `depth` clock cycles through a chain of registers and
/// returns the last register.
pub fn shift_buffer(entity: &mut Entity, name: &str, input: Value, depth: u32) -> Result<VarId> {
    if depth == 0 {
        return Err(Error::InvalidArgument(format!(
            "shift buffer {} needs at least one stage",
            name
        )));
    }
    let width = entity.width(&input)?;
    let process = entity.create_process(cat!(name, "shift"))?;
    let mut previous = input;
    let mut last = None;
    for stage in 0..depth {
        let register = if depth == 1 {
            entity.create_signal(name, width)?
        } else {
            entity.create_signal(format!("{}_stage{}", name, stage), width)?
        };
        entity.push_assign(process, register, previous)?;
        previous = Value::Var(register);
        last = Some(register);
    }
    last.ok_or(Error::UnknownError)
}
