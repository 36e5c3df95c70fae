//! The input controller: buffers every input stream, serves one window per
//! pipeline activation and counts the loop inductions.
//!
//! Per stream, memory writes groups of `data_channels` elements into a FIFO.
//! A smart buffer shifts them into `window` registers, reading all of them
//! for the first activation and `step` new elements for every later one. The
//! controller raises `outputReady` for one cycle per activation once every
//! window is ready and nothing stalls; the same pulse advances the
//! inductions. `done` rises together with the activation in which every
//! bounded induction reaches its end and stays high until reset.
use std::collections::BTreeSet;

use log::{debug, warn};

use dfc_common::{cat, error::Result, util::counter_width};
use dfc_library::port::PortType;
use dfc_query::graph::{Graph, Induction, InductionEnd, StreamDirection};
use dfc_vhdl::{
    condition::{Condition, Relation},
    entity::StandardPorts,
    value::Value,
    variable::{Mode, VarId},
};

use super::{element_port, fifo, layouts, shift_buffer, Controller, StreamLayout};

/// Signals shared by the control logic and the stream buffers.
struct Control {
    standard: StandardPorts,
    consume: VarId,
    done_latched: Option<VarId>,
}

/// Builds the input controller of a streaming graph. `interval` is the
/// minimum number of cycles between activations.
pub fn input_controller(graph: &Graph, interval: u32) -> Result<Controller> {
    let mut controller = Controller::try_new(format!("{}_InputController", graph.name))?;
    let standard = *controller.entity.standard_ports();
    let entity = &mut controller.entity;
    let consume = entity.create_signal("consume", 1)?;
    let started = entity.create_signal("started", 1)?;

    let mut last_iteration = vec![];
    let mut inductions = vec![];
    for induction in &graph.inductions {
        let (value, end) = induction_counter(&mut controller, induction)?;
        inductions.push((induction, value));
        if let Some(end) = end {
            let relation = if induction.step >= 0 {
                Relation::Gte
            } else {
                Relation::Lte
            };
            last_iteration.push(Condition::compare_signed(
                relation,
                Value::add(value, Value::int(induction.step)),
                end,
            ));
        }
    }
    let done_latched = if last_iteration.is_empty() {
        None
    } else {
        Some(controller.entity.create_signal("done_latched", 1)?)
    };
    let control = Control {
        standard,
        consume,
        done_latched,
    };

    let mut ready = vec![];
    for layout in layouts(graph, StreamDirection::Input)? {
        ready.push(stream_buffer(&mut controller, &layout, &control)?);
    }

    let entity = &mut controller.entity;
    let process = entity.create_process("control")?;
    let start = entity.assign(process, started, Value::int(1))?;
    let start = entity.if_then(process, Condition::is_high(standard.input_ready), start, None)?;
    entity.push(process, start)?;

    let mut conditions = ready;
    conditions.push(Condition::is_low(standard.stall));
    conditions.push(Condition::is_high(started));
    if let Some(done_latched) = done_latched {
        conditions.push(Condition::is_low(done_latched));
    }
    if interval > 1 {
        debug!(
            "{} accepts a new activation every {} cycles",
            entity.name(),
            interval
        );
        let width = counter_width(u64::from(interval - 1));
        let counter = entity.create_signal("ii_counter", width)?;
        let wrap = entity.assign_cases(
            process,
            counter,
            vec![
                (
                    Value::zeros(width),
                    Some(Condition::eq(counter, Value::int(i64::from(interval - 1)))),
                ),
                (Value::add(counter, Value::int(1)), None),
            ],
        )?;
        entity.push(process, wrap)?;
        conditions.push(Condition::eq(counter, Value::zeros(width)));
    }
    entity.create_synchronous_cases(
        consume,
        vec![
            (Value::int(1), Some(Condition::all(conditions))),
            (Value::int(0), None),
        ],
    )?;
    entity.create_synchronous_statement(standard.output_ready, consume)?;

    let mut increments = vec![];
    for (induction, value) in inductions {
        increments.push(entity.assign(
            process,
            value,
            Value::add(value, Value::int(induction.step)),
        )?);
    }
    let all_last = Condition::all(last_iteration);
    match done_latched {
        Some(done_latched) => {
            let latch = entity.assign(process, done_latched, Value::int(1))?;
            increments.push(entity.if_then(process, all_last.clone(), latch, None)?);
            entity.create_synchronous_cases(
                standard.done,
                vec![
                    (
                        Value::int(1),
                        Some(
                            Condition::is_high(done_latched)
                                .or(Condition::is_high(consume).and(all_last)),
                        ),
                    ),
                    (Value::int(0), None),
                ],
            )?;
        }
        None => {
            warn!(
                "{} has no bounded loop induction and never finishes",
                graph.name
            );
            entity.create_synchronous_statement(standard.done, Value::int(0))?;
        }
    }
    if !increments.is_empty() {
        let body = entity.multi(process, increments)?;
        let step = entity.if_then(process, Condition::is_high(consume), body, None)?;
        entity.push(process, step)?;
    }
    Ok(controller)
}

/// The counter of one induction and the value it ends at, if bounded.
fn induction_counter(
    controller: &mut Controller,
    induction: &Induction,
) -> Result<(VarId, Option<Value>)> {
    let name = induction.name.as_str();
    let width = induction.width;
    let entity = &mut controller.entity;
    let value = entity.create_signed_signal(cat!(name, "value"), width)?;
    entity.set_reset_value(value, Value::sized(induction.start, width))?;
    let port = entity.add_port(name, width, Mode::Out)?;
    entity.set_signed(port, true)?;
    entity.create_synchronous_statement(port, value)?;
    let end = match induction.end {
        Some(InductionEnd::Constant(end)) => Some(Value::int(end)),
        Some(InductionEnd::Port) => {
            let end_port = cat!(name, "end");
            let port = controller.add_external(
                end_port.clone(),
                width,
                Mode::In,
                PortType::Register,
                &end_port,
            )?;
            controller.entity.set_signed(port, true)?;
            Some(Value::Var(port))
        }
        None => None,
    };
    Ok((value, end))
}

/// The FIFO, smart buffer and address generator of one input stream.
/// Returns the condition under which its window is ready.
fn stream_buffer(
    controller: &mut Controller,
    layout: &StreamLayout,
    control: &Control,
) -> Result<Condition> {
    let name = layout.name.as_str();
    let width = layout.width;
    let channels = layout.data_channels;
    let window = layout.window as usize;
    let standard = control.standard;

    let write_clk = controller.add_external(
        cat!(name, "WClk"),
        1,
        Mode::In,
        PortType::StreamCrossClk,
        name,
    )?;
    let full_port = controller.add_external(
        cat!(name, "full"),
        1,
        Mode::Out,
        PortType::StreamStopAccess,
        name,
    )?;
    let write_enable = controller.add_external(
        cat!(name, "writeEn"),
        1,
        Mode::In,
        PortType::StreamEnableAccess,
        name,
    )?;
    let mut data = vec![];
    for channel in 0..channels {
        data.push(controller.add_external(
            format!("{}_data_channel{}", name, channel),
            width,
            Mode::In,
            PortType::StreamChannel,
            name,
        )?);
    }
    let address = controller.address_ports(layout)?;

    let fifo_width = width * channels;
    controller.fifo_widths.insert(fifo_width);
    let entity = &mut controller.entity;
    let fifo = entity.add_component(cat!(name, "fifo"), fifo::declaration(fifo_width)?)?;
    entity.map_port(fifo, "rst", standard.rst)?;
    entity.map_port(fifo, "wclk", write_clk)?;
    entity.map_port(fifo, "rclk", standard.clk)?;
    let din = data
        .iter()
        .skip(1)
        .fold(Value::Var(data[0]), |din, channel| Value::concat(*channel, din));
    entity.map_port(fifo, "din", din)?;
    entity.map_port(fifo, "wen", write_enable)?;
    let fifo_full = entity.variable_mapped_to(fifo, "full")?;
    let almost_full = entity.variable_mapped_to(fifo, "almost_full")?;
    let dout = entity.variable_mapped_to(fifo, "dout")?;
    let empty = entity.variable_mapped_to(fifo, "empty")?;
    let read = entity.create_signal(cat!(name, "ren"), 1)?;
    entity.map_port(fifo, "ren", read)?;
    entity.create_synchronous_cases(
        full_port,
        vec![
            (
                Value::int(1),
                Some(Condition::is_high(fifo_full).or(Condition::is_high(almost_full))),
            ),
            (Value::int(0), None),
        ],
    )?;

    let fill = i64::from(layout.window / channels);
    let refill = i64::from(layout.step / channels);
    let counter = counter_width(fill as u64);
    let pending = entity.create_signal(cat!(name, "pending"), counter)?;
    let missing = entity.create_signal(cat!(name, "missing"), counter)?;
    entity.set_reset_value(pending, Value::sized(fill, counter))?;
    entity.set_reset_value(missing, Value::sized(fill, counter))?;
    entity.create_synchronous_cases(
        read,
        vec![
            (
                Value::int(1),
                Some(Condition::all([
                    Condition::ne(pending, Value::zeros(counter)),
                    Condition::is_low(empty),
                    Condition::is_low(standard.stall),
                ])),
            ),
            (Value::int(0), None),
        ],
    )?;
    let valid = shift_buffer(entity, &cat!(name, "valid"), Value::Var(read), 1)?;

    let registers = (0..window)
        .map(|index| entity.create_signal(format!("{}_window{}", name, index), width))
        .collect::<Result<Vec<_>>>()?;
    let states = [cat!(name, "S_FILL"), cat!(name, "S_READY")];
    let state = entity.create_state_var(
        cat!(name, "state"),
        &states.iter().map(String::as_str).collect::<Vec<_>>(),
    )?;

    let process = entity.create_process(cat!(name, "buffer"))?;
    let shift_in = channels as usize;
    let mut shift = vec![];
    for (index, register) in registers.iter().enumerate() {
        let source = if index + shift_in < window {
            Value::Var(registers[index + shift_in])
        } else if channels == 1 {
            Value::Var(dout)
        } else {
            let lane = (index + shift_in - window) as u32;
            entity.range(dout, width * (lane + 1) - 1, width * lane)?
        };
        shift.push(entity.assign(process, *register, source)?);
    }
    shift.push(entity.assign(process, missing, Value::sub(missing, Value::int(1)))?);
    let shift = entity.multi(process, shift)?;
    let shift = entity.if_then(process, Condition::is_high(valid), shift, None)?;
    entity.push(process, shift)?;
    let request = entity.assign(process, pending, Value::sub(pending, Value::int(1)))?;
    let request = entity.if_then(process, Condition::is_high(read), request, None)?;
    entity.push(process, request)?;

    let ready_state = entity.state(state, 1)?;
    let filled = entity.assign(process, state, ready_state.clone())?;
    let filled = entity.if_then(
        process,
        Condition::eq(missing, Value::zeros(counter)),
        filled,
        None,
    )?;
    let fill_state = entity.state(state, 0)?;
    let consumed = vec![
        entity.assign(process, state, fill_state)?,
        entity.assign(process, pending, Value::sized(refill, counter))?,
        entity.assign(process, missing, Value::sized(refill, counter))?,
    ];
    let consumed = entity.multi(process, consumed)?;
    let consumed = entity.if_then(process, Condition::is_high(control.consume), consumed, None)?;
    let dispatch = entity.case(process, state, vec![(0, filled), (1, consumed)])?;
    entity.push(process, dispatch)?;

    let indices: BTreeSet<usize> = layout.accessed.iter().map(|(index, _)| *index).collect();
    for index in indices {
        let port = entity.add_port(element_port(name, index), width, Mode::Out)?;
        entity.create_synchronous_statement(port, registers[index])?;
    }

    let process = entity.create_clocked_process(cat!(name, "address"), address.clk, Some(standard.rst))?;
    let first = entity.create_signal(cat!(name, "first"), 1)?;
    entity.set_reset_value(first, Value::int(1))?;
    let next_base = entity.create_signal(cat!(name, "next_base"), super::ADDRESS_WIDTH)?;
    let mut guard = vec![Condition::is_low(address.stall)];
    if let Some(done_latched) = control.done_latched {
        let sync0 = entity.create_signal(cat!(name, "done_sync0"), 1)?;
        let sync1 = entity.create_signal(cat!(name, "done_sync1"), 1)?;
        entity.push_assign(process, sync0, done_latched)?;
        entity.push_assign(process, sync1, sync0)?;
        guard.push(Condition::is_low(sync1));
    }
    entity.push_assign(process, address.rdy, Value::int(0))?;
    let mut issue = address.issue(
        entity,
        process,
        next_base,
        &[
            (layout.window, Some(Condition::is_high(first))),
            (layout.step, None),
        ],
    )?;
    issue.push(entity.assign_cases(
        process,
        next_base,
        vec![
            (
                Value::add(next_base, Value::int(i64::from(layout.window))),
                Some(Condition::is_high(first)),
            ),
            (Value::add(next_base, Value::int(i64::from(layout.step))), None),
        ],
    )?);
    issue.push(entity.assign(process, first, Value::int(0))?);
    let issue = entity.multi(process, issue)?;
    let issue = entity.if_then(process, Condition::all(guard), issue, None)?;
    entity.push(process, issue)?;

    Ok(Condition::eq(state, ready_state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfc_common::error::Error;
    use dfc_query::{
        graph::{Block, ComponentKind, StreamBuffer, ValueInfo},
        instruction::Instruction,
    };
    use dfc_vhdl::entity::RenderOptions;

    fn reader(window: u32, step: u32, end: Option<InductionEnd>) -> Result<Graph> {
        let mut graph = Graph::new("sum", ComponentKind::System, 3);
        graph.streams.push(
            StreamBuffer::new("A", StreamDirection::Input, 16)
                .with_window(window, step)
                .with_channels(1, 1),
        );
        graph.stream_order.push("A".to_string());
        graph.inductions.push(Induction {
            name: "i".to_string(),
            width: 32,
            value: None,
            start: 0,
            step: 1,
            end,
        });
        let a0 = graph.add_value(ValueInfo::int("a0", 16))?;
        let a1 = graph.add_value(ValueInfo::int("a1", 16))?;
        graph.sink = graph.add_block(
            Block::new("body", 3)
                .with(Instruction::InputStream {
                    lhs: a0,
                    stream: "A".to_string(),
                    index: 0,
                })
                .with(Instruction::InputStream {
                    lhs: a1,
                    stream: "A".to_string(),
                    index: 1,
                }),
        );
        Ok(graph)
    }

    #[test]
    fn window_of_two() -> Result<()> {
        let controller = input_controller(&reader(2, 1, Some(InductionEnd::Constant(99)))?, 0)?;
        assert_eq!(controller.fifo_widths.iter().copied().collect::<Vec<_>>(), vec![16]);
        assert!(controller
            .external
            .iter()
            .any(|p| p.name == "A_data_channel0" && p.port_type == PortType::StreamChannel));
        let code = controller.entity.generate_code(&RenderOptions::default())?;
        assert!(code.contains("entity sum_InputController is"));
        assert!(code.contains("A_element0 <= A_window0;"));
        assert!(code.contains("A_element1 <= A_window1;"));
        assert!(code.contains("when A_S_FILL =>"));
        assert!(code.contains("A_window0 <= A_window1;"));
        assert!(code.contains("A_window1 <= A_fifo_dout;"));
        assert!(code.contains("i <= i_value;"));
        Ok(())
    }

    #[test]
    fn runtime_bound() -> Result<()> {
        let controller = input_controller(&reader(1, 1, Some(InductionEnd::Port))?, 2)?;
        assert!(controller.external.iter().any(|p| p.name == "i_end"));
        let code = controller.entity.generate_code(&RenderOptions::default())?;
        assert!(code.contains("DFC_SGTE(DFC_ADD(i_value, "));
        assert!(code.contains("signal ii_counter : STD_LOGIC;"));
        Ok(())
    }

    #[test]
    fn uneven_channels_are_rejected() -> Result<()> {
        let mut graph = reader(3, 1, None)?;
        graph.streams[0].data_channels = Some(2);
        assert!(matches!(
            input_controller(&graph, 0),
            Err(Error::StreamError(_))
        ));
        Ok(())
    }
}
