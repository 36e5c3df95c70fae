//! The output controller: collects one result window per activation into a
//! FIFO per output stream and requests a memory write for every window.
use std::collections::BTreeMap;

use log::debug;

use dfc_common::{cat, error::Result};
use dfc_library::port::PortType;
use dfc_query::graph::{Graph, StreamDirection};
use dfc_vhdl::{
    condition::Condition,
    value::Value,
    variable::{Mode, VarId},
};

use super::{element_port, fifo, layouts, Controller, StreamLayout, ADDRESS_WIDTH};

/// Width of the counter of results still waiting for an address request.
const OWED_WIDTH: u32 = 16;

/// Writes that can still arrive once `backpressure` rises: the stall reaches
/// the stages one cycle late through `stall_previous`, and the activation
/// already in the last stage completes.
const STALL_LATENCY: i64 = 2;

const _: () = assert!(fifo::ALMOST_FULL_COUNT >= STALL_LATENCY);

/// Builds the output controller of a streaming graph.
///
/// `inputReady` marks the activation whose elements are on the element
/// ports. `backpressure` rises when any FIFO is almost full, `done` while all
/// of them are empty.
pub fn output_controller(graph: &Graph) -> Result<Controller> {
    let mut controller = Controller::try_new(format!("{}_OutputController", graph.name))?;
    let backpressure = controller.entity.add_port("backpressure", 1, Mode::Out)?;
    let mut almost_full = vec![];
    let mut empty = vec![];
    let mut writes = vec![];
    for layout in layouts(graph, StreamDirection::Output)? {
        let stream = stream_writer(&mut controller, &layout)?;
        almost_full.push(Condition::is_high(stream.almost_full));
        empty.push(Condition::is_high(stream.empty));
        writes.push(Condition::is_high(stream.write));
    }
    let standard = *controller.entity.standard_ports();
    let entity = &mut controller.entity;
    entity.create_synchronous_cases(
        backpressure,
        vec![
            (Value::int(1), Some(Condition::any(almost_full))),
            (Value::int(0), None),
        ],
    )?;
    entity.create_synchronous_cases(
        standard.done,
        vec![
            (Value::int(1), Some(Condition::all(empty))),
            (Value::int(0), None),
        ],
    )?;
    entity.create_synchronous_cases(
        standard.output_ready,
        vec![
            (Value::int(1), Some(Condition::any(writes))),
            (Value::int(0), None),
        ],
    )?;
    Ok(controller)
}

struct StreamSignals {
    almost_full: VarId,
    empty: VarId,
    write: VarId,
}

fn stream_writer(controller: &mut Controller, layout: &StreamLayout) -> Result<StreamSignals> {
    let name = layout.name.as_str();
    let width = layout.width;
    let window = layout.window;
    let lane = width * layout.elements_per_channel();

    let read_clk = controller.add_external(
        cat!(name, "RClk"),
        1,
        Mode::In,
        PortType::StreamCrossClk,
        name,
    )?;
    let empty_port = controller.add_external(
        cat!(name, "empty"),
        1,
        Mode::Out,
        PortType::StreamStopAccess,
        name,
    )?;
    let read = controller.add_external(
        cat!(name, "read"),
        1,
        Mode::In,
        PortType::StreamEnableAccess,
        name,
    )?;
    let mut data = vec![];
    for channel in 0..layout.data_channels {
        data.push(controller.add_external(
            format!("{}_data_channel{}", name, channel),
            lane,
            Mode::Out,
            PortType::StreamChannel,
            name,
        )?);
    }
    let address = controller.address_ports(layout)?;

    let fifo_width = width * window;
    controller.fifo_widths.insert(fifo_width);
    let standard = *controller.entity.standard_ports();
    let entity = &mut controller.entity;
    let mut elements = BTreeMap::new();
    for (index, _) in &layout.accessed {
        if !elements.contains_key(index) {
            let port = entity.add_port(element_port(name, *index), width, Mode::In)?;
            elements.insert(*index, port);
        }
    }
    let element = |index: usize| match elements.get(&index) {
        Some(port) => Value::Var(*port),
        None => Value::zeros(width),
    };
    let din = (1..window as usize).fold(element(0), |din, index| {
        Value::concat(element(index), din)
    });

    let fifo = entity.add_component(cat!(name, "fifo"), fifo::declaration(fifo_width)?)?;
    entity.map_port(fifo, "rst", standard.rst)?;
    entity.map_port(fifo, "wclk", standard.clk)?;
    entity.map_port(fifo, "rclk", read_clk)?;
    entity.map_port(fifo, "din", din)?;
    let write = entity.create_signal(cat!(name, "wen"), 1)?;
    entity.map_port(fifo, "wen", write)?;
    let full = entity.variable_mapped_to(fifo, "full")?;
    let almost_full = entity.variable_mapped_to(fifo, "almost_full")?;
    entity.map_port(fifo, "ren", read)?;
    let dout = entity.variable_mapped_to(fifo, "dout")?;
    let empty = entity.variable_mapped_to(fifo, "empty")?;
    // A write while full is dropped. Backpressure asserts with
    // ALMOST_FULL_COUNT slots left, which covers the writes of STALL_LATENCY.
    debug!(
        "{} backpressures with {} of {} slots free, {} writes may follow",
        name,
        fifo::ALMOST_FULL_COUNT,
        fifo::DEPTH,
        STALL_LATENCY
    );
    entity.create_synchronous_cases(
        write,
        vec![
            (
                Value::int(1),
                Some(Condition::is_high(standard.input_ready).and(Condition::is_low(full))),
            ),
            (Value::int(0), None),
        ],
    )?;
    entity.create_synchronous_statement(empty_port, empty)?;
    for (channel, port) in data.iter().enumerate() {
        let channel = channel as u32;
        let slice = if layout.data_channels == 1 {
            Value::Var(dout)
        } else {
            entity.range(dout, lane * (channel + 1) - 1, lane * channel)?
        };
        entity.create_synchronous_statement(*port, slice)?;
    }

    let owed = entity.create_signal(cat!(name, "owed"), OWED_WIDTH)?;
    let issue = entity.create_signal(cat!(name, "issue"), 1)?;
    let next_base = entity.create_signal(cat!(name, "next_base"), ADDRESS_WIDTH)?;
    entity.create_synchronous_cases(
        issue,
        vec![
            (
                Value::int(1),
                Some(
                    Condition::is_low(address.stall)
                        .and(Condition::ne(owed, Value::zeros(OWED_WIDTH))),
                ),
            ),
            (Value::int(0), None),
        ],
    )?;
    let process = entity.create_process(cat!(name, "address"))?;
    let count = entity.assign_cases(
        process,
        owed,
        vec![
            (
                Value::Var(owed),
                Some(Condition::is_high(write).and(Condition::is_high(issue))),
            ),
            (
                Value::add(owed, Value::int(1)),
                Some(Condition::is_high(write)),
            ),
            (
                Value::sub(owed, Value::int(1)),
                Some(Condition::is_high(issue)),
            ),
            (Value::Var(owed), None),
        ],
    )?;
    entity.push(process, count)?;
    entity.push_assign(process, address.rdy, Value::int(0))?;
    let mut request = address.issue(entity, process, next_base, &[(window, None)])?;
    request.push(entity.assign(
        process,
        next_base,
        Value::add(next_base, Value::int(i64::from(layout.step))),
    )?);
    let request = entity.multi(process, request)?;
    let request = entity.if_then(process, Condition::is_high(issue), request, None)?;
    entity.push(process, request)?;

    Ok(StreamSignals {
        almost_full,
        empty,
        write,
    })
}
