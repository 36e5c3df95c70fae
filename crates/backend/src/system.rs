//! A streaming system: the pipeline entity with its input and output
//! controller instantiated inside and their memory interfaces re-exported.
use std::sync::Arc;

use log::debug;

use dfc_common::error::Result;
use dfc_vhdl::{condition::Condition, value::Value};

use crate::{
    controllers::{shift_buffer, Controller},
    pipeline::{Pipeline, Streaming},
};

pub const INPUT_CONTROLLER: &str = "inputController0";
pub const OUTPUT_CONTROLLER: &str = "outputController0";

/// Embeds the pipeline between `input` and `output`.
///
/// The pipeline stalls while the system's `stall` is high or any output FIFO
/// is almost full. The input controller sees that stall one cycle late, the
/// same cycle the stages stop advancing, and stops for good once done.
pub fn wire_system(pipeline: &mut Pipeline, input: &Controller, output: &Controller) -> Result<()> {
    let input_decl = Arc::new(input.entity.declaration()?);
    let output_decl = Arc::new(output.entity.declaration()?);
    let standard = *pipeline.entity.standard_ports();

    let entity = &mut pipeline.entity;
    let ic = entity.add_component(INPUT_CONTROLLER, input_decl.clone())?;
    let oc = entity.add_component(OUTPUT_CONTROLLER, output_decl.clone())?;
    for instance in [ic, oc] {
        entity.map_port(instance, "clk", standard.clk)?;
        entity.map_port(instance, "rst", standard.rst)?;
    }

    entity.map_port(ic, "inputReady", standard.input_ready)?;
    let input_ready = entity.variable_mapped_to(ic, "outputReady")?;
    let input_done = entity.variable_mapped_to(ic, "done")?;
    let output_load = entity.variable_mapped_to(oc, "inputReady")?;
    let output_ready = entity.variable_mapped_to(oc, "outputReady")?;
    let output_done = entity.variable_mapped_to(oc, "done")?;
    let backpressure = entity.variable_mapped_to(oc, "backpressure")?;
    entity.map_port(oc, "stall", standard.stall)?;

    let stall_internal = entity.create_signal("stall_internal", 1)?;
    entity.create_synchronous_cases(
        stall_internal,
        vec![
            (
                Value::int(1),
                Some(Condition::is_high(backpressure).or(Condition::is_high(standard.stall))),
            ),
            (Value::int(0), None),
        ],
    )?;
    let stall_delayed = shift_buffer(entity, "stall_delayed", Value::Var(stall_internal), 1)?;
    let input_stall = entity.create_signal("input_stall", 1)?;
    entity.create_synchronous_cases(
        input_stall,
        vec![
            (
                Value::int(1),
                Some(Condition::is_high(stall_delayed).or(Condition::is_high(input_done))),
            ),
            (Value::int(0), None),
        ],
    )?;
    entity.map_port(ic, "stall", input_stall)?;
    entity.create_synchronous_statement(standard.output_ready, output_ready)?;

    for (controller, decl, instance) in [(input, &input_decl, ic), (output, &output_decl, oc)] {
        for port in &controller.external {
            let signed = decl
                .port(&port.name)
                .map(|p| p.is_signed())
                .unwrap_or(false);
            let var = pipeline.add_port(port.clone(), signed)?;
            pipeline.entity.map_port(instance, &port.name, var)?;
        }
        debug!(
            "{} re-exports {} ports of {}",
            pipeline.graph().name,
            controller.external.len(),
            controller.entity.name()
        );
    }

    let graph = pipeline.graph().clone();
    for induction in &graph.inductions {
        let counter = pipeline.entity.variable_mapped_to(ic, &induction.name)?;
        if let Some(value) = induction.value {
            pipeline.arrive(value, counter)?;
        }
    }

    pipeline.input_ready = Value::Var(input_ready);
    pipeline.stall_internal = Value::Var(stall_internal);
    pipeline.streaming = Some(Streaming {
        input: ic,
        output: oc,
        input_done,
        output_done,
        output_load,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        controllers::{input::input_controller, output::output_controller},
        db::Database,
    };
    use dfc_library::store::Library;
    use dfc_query::{
        graph::{
            Block, ComponentKind, Graph, Induction, InductionEnd, StreamBuffer,
            StreamDirection, ValueInfo,
        },
        instruction::Instruction,
    };
    use dfc_vhdl::entity::RenderOptions;

    /// `B[i] = A[i]` over ten elements, one stage deep.
    fn copy() -> Result<Graph> {
        let mut graph = Graph::new("copy", ComponentKind::System, 1);
        graph
            .streams
            .push(StreamBuffer::new("A", StreamDirection::Input, 8).with_channels(1, 1));
        graph
            .streams
            .push(StreamBuffer::new("B", StreamDirection::Output, 8).with_channels(1, 1));
        graph.stream_order = vec!["A".to_string(), "B".to_string()];
        let i = graph.add_value(ValueInfo::int("i", 32))?;
        graph.inductions.push(Induction {
            name: "i".to_string(),
            width: 32,
            value: Some(i),
            start: 0,
            step: 1,
            end: Some(InductionEnd::Constant(10)),
        });
        let a = graph.add_value(ValueInfo::int("a", 8))?;
        graph.sink = graph.add_block(
            Block::new("body", 1)
                .with(Instruction::InputStream {
                    lhs: a,
                    stream: "A".to_string(),
                    index: 0,
                })
                .with(Instruction::OutputStream {
                    value: a,
                    stream: "B".to_string(),
                    index: 0,
                }),
        );
        Ok(graph)
    }

    #[test]
    fn controllers_are_embedded() -> Result<()> {
        let graph = copy()?;
        let input = input_controller(&graph, 0)?;
        let output = output_controller(&graph)?;
        let db = Database::new(Library::default(), graph);
        let mut pipeline = Pipeline::try_new(&db)?;
        wire_system(&mut pipeline, &input, &output)?;
        pipeline.lower()?;
        let (entity, ports) = pipeline.finish()?;

        assert!(ports.contains_key("A_data_channel0"));
        assert!(ports.contains_key("B_empty"));
        let code = entity.generate_code(&RenderOptions::default())?;
        assert!(code.contains("inputController0 : copy_InputController"));
        assert!(code.contains("outputController0 : copy_OutputController"));
        assert!(code.contains("A_data_channel0 => A_data_channel0"));
        assert!(code.contains("stall => input_stall"));
        assert!(code.contains("outputReady <= outputController0_outputReady;"));
        assert!(code.contains(
            "stall_internal <= '1' when ((outputController0_backpressure = '1') or (stall = '1')) else"
        ));
        assert!(code.contains("activeStates <= inputController0_outputReady;"));
        assert!(code.contains("i <= inputController0_i;"));
        assert!(code.contains("(inputController0_done = '1')"));
        Ok(())
    }
}
