//! Calls become instances of library components: intrinsic cores picked by
//! the resolution engine, or user modules a system invokes.
use std::sync::Arc;

use dependency_graph::{DependencyGraph, Node, Step};
use log::{debug, warn};

use dfc_common::{
    cat,
    error::{Error, Result},
};
use dfc_library::{
    entry::{is_standard_port, LibraryEntry, Operand},
    kind::CoreKind,
    port::{LibraryPort, PortDirection, PortType},
};
use dfc_query::{
    graph::{BlockId, Graph, ValueId},
    instruction::Instruction,
};
use dfc_vhdl::{
    attribute::{string_value, PORT_TYPE},
    component::{ComponentDecl, ComponentPort, InstanceId},
    value::Value,
    variable::Mode,
};

use super::Pipeline;

/// One call of the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub block: BlockId,
    pub callee: String,
    pub inputs: Vec<ValueId>,
    pub outputs: Vec<ValueId>,
}

struct CallNode {
    index: usize,
    producers: Vec<usize>,
}

impl Node for CallNode {
    type DependencyType = usize;

    fn dependencies(&self) -> &[usize] {
        &self.producers
    }

    fn matches(&self, dependency: &usize) -> bool {
        self.index == *dependency
    }
}

/// The calls of a graph, every call after the calls producing its inputs.
pub fn invocation_order(graph: &Graph) -> Result<Vec<Call>> {
    let calls: Vec<Call> = graph
        .instructions()
        .filter_map(|(block, instruction)| match instruction {
            Instruction::Call {
                callee,
                inputs,
                outputs,
            } => Some(Call {
                block,
                callee: callee.clone(),
                inputs: inputs.clone(),
                outputs: outputs.clone(),
            }),
            _ => None,
        })
        .collect();
    let nodes: Vec<CallNode> = calls
        .iter()
        .enumerate()
        .map(|(index, call)| CallNode {
            index,
            producers: calls
                .iter()
                .enumerate()
                .filter(|(other, producer)| {
                    *other != index && producer.outputs.iter().any(|o| call.inputs.contains(o))
                })
                .map(|(other, _)| other)
                .collect(),
        })
        .collect();
    let mut order = vec![];
    for step in DependencyGraph::from(&nodes[..]) {
        match step {
            Step::Resolved(node) => order.push(calls[node.index].clone()),
            Step::Unresolved(producer) => {
                return Err(Error::GraphError(format!(
                    "a call of {} depends on call {}, which does not exist",
                    graph.name, producer
                )))
            }
        }
    }
    Ok(order)
}

/// The component declaration of a library entry. Intrinsic cores accept
/// wider inputs, truncating them.
pub fn core_declaration(entry: &LibraryEntry) -> Result<Arc<ComponentDecl>> {
    let ports = entry
        .ports
        .iter()
        .map(|port| {
            let mode = match port.direction {
                PortDirection::In => Mode::In,
                PortDirection::Out => Mode::Out,
            };
            ComponentPort::try_new(port.name.as_str(), mode, port.width)
        })
        .collect::<Result<Vec<_>>>()?;
    let decl = ComponentDecl::try_new(entry.name.as_str(), vec![], ports)?;
    if entry.kind.is_intrinsic() {
        Ok(Arc::new(decl.with_narrowing()))
    } else {
        Ok(Arc::new(decl))
    }
}

impl Pipeline<'_> {
    /// Instantiates the component of every call.
    pub fn instantiate_cores(&mut self) -> Result<()> {
        let library = self.db.library();
        for call in invocation_order(&self.graph)? {
            let entry = library.entry(&call.callee).ok_or_else(|| {
                Error::LibraryError(format!(
                    "{} invokes {}, which is not in the library",
                    self.graph.name, call.callee
                ))
            })?;
            self.instantiate(entry, &call)?;
        }
        Ok(())
    }

    fn instantiate(&mut self, entry: &LibraryEntry, call: &Call) -> Result<()> {
        let mut inputs = vec![];
        let mut outputs = vec![];
        for operand in entry.operands()? {
            match operand {
                Operand::Scalar(port) if port.is_input() => inputs.push(port),
                Operand::Scalar(port) => outputs.push(port),
                Operand::Stream(stream) => {
                    return Err(Error::BackEndError(format!(
                        "{} exchanges stream {}, which a call cannot connect",
                        entry.name,
                        stream.name()
                    )))
                }
            }
        }
        if inputs.len() != call.inputs.len() || outputs.len() != call.outputs.len() {
            return Err(Error::BackEndError(format!(
                "{} takes {} inputs and {} outputs, but is called with {} and {}",
                entry.signature(),
                inputs.len(),
                outputs.len(),
                call.inputs.len(),
                call.outputs.len()
            )));
        }

        let decl = core_declaration(entry)?;
        let label = self.next_instance();
        let instance = self.entity.add_component(label.as_str(), decl.clone())?;
        let stage = self.db.actual_level(call.block)?;
        debug!(
            "{} instantiates {} in stage {}",
            label, entry.name, stage
        );
        self.map_standard_ports(instance, &decl, &label, stage)?;

        for (port, value) in inputs.iter().zip(&call.inputs) {
            self.connect_input(instance, entry.kind, port, *value, stage - 1)?;
        }
        for (port, value) in outputs.iter().zip(&call.outputs) {
            self.connect_output(instance, port, *value)?;
        }
        for port in entry.debug_ports() {
            let name = format!("{}_{}_{}", entry.name, label, port.name);
            let surfaced = self.add_port(
                LibraryPort::new(name, PortDirection::Out, port.width)
                    .with_type(PortType::Debug)
                    .with_readable_name(port.readable_name.as_str()),
                false,
            )?;
            self.entity
                .set_attribute(surfaced, PORT_TYPE, "string", string_value("DEBUG"))?;
            self.entity.map_port(instance, &port.name, surfaced)?;
        }
        Ok(())
    }

    fn map_standard_ports(
        &mut self,
        instance: InstanceId,
        decl: &ComponentDecl,
        label: &str,
        stage: i64,
    ) -> Result<()> {
        let standard = *self.entity.standard_ports();
        for port in decl.ports().iter().filter(|p| is_standard_port(p.name().as_str())) {
            let name = port.name().as_str();
            if name.eq_ignore_ascii_case("clk") {
                self.entity.map_port(instance, name, standard.clk)?;
            } else if name.eq_ignore_ascii_case("rst") {
                self.entity.map_port(instance, name, standard.rst)?;
            } else if name.eq_ignore_ascii_case("stall") {
                self.entity
                    .map_port(instance, name, self.stall_internal.clone())?;
            } else if name.eq_ignore_ascii_case("inputReady") {
                let load_name = self.entity.unique_name(&cat!(label, "load"))?;
                let load = self.entity.create_signal(load_name, 1)?;
                self.entity.map_port(instance, name, load)?;
                self.pulse_at(stage, load)?;
            } else {
                self.entity.variable_mapped_to(instance, name)?;
            }
        }
        Ok(())
    }

    fn connect_input(
        &mut self,
        instance: InstanceId,
        kind: CoreKind,
        port: &LibraryPort,
        value: ValueId,
        cycle: i64,
    ) -> Result<()> {
        let info = self.value_info(value)?;
        let operand = self.operand_at(value, cycle)?;
        let resize = !info.is_constant()
            && (info.width > port.width || (info.width < port.width && kind.needs_resize_signal()));
        let actual = if resize {
            if info.width > port.width {
                warn!(
                    "{} is {} bits wide, input {} of {} takes {} bits; the value is truncated",
                    info.name,
                    info.width,
                    port.name,
                    kind.as_str(),
                    port.width
                );
            }
            let name = self.entity.unique_name(&cat!(info.name, "resize"))?;
            let resized = self.entity.create_signal(name, port.width)?;
            self.entity.set_signed(resized, info.signed)?;
            self.entity.create_synchronous_statement(resized, operand)?;
            Value::Var(resized)
        } else {
            operand
        };
        self.entity.map_port(instance, &port.name, actual)
    }

    fn connect_output(&mut self, instance: InstanceId, port: &LibraryPort, value: ValueId) -> Result<()> {
        let info = self.value_info(value)?;
        let target = self.value_var(value)?;
        if info.width == port.width {
            return self.entity.map_port(instance, &port.name, target);
        }
        let name = self.entity.unique_name(&cat!(info.name, "resize"))?;
        let resized = self.entity.create_signal(name, port.width)?;
        self.entity.set_signed(resized, info.signed)?;
        self.entity.map_port(instance, &port.name, resized)?;
        self.entity.create_synchronous_statement(target, resized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use dfc_library::store::Library;
    use dfc_query::graph::{Block, ComponentKind, ValueInfo};
    use dfc_vhdl::entity::RenderOptions;
    use pretty_assertions::assert_eq;

    fn divider() -> LibraryEntry {
        let mut ports = LibraryEntry::standard_ports();
        ports.push(LibraryPort::new("dividend", PortDirection::In, 48));
        ports.push(LibraryPort::new("divisor", PortDirection::In, 48));
        ports.push(LibraryPort::new("quotient", PortDirection::Out, 48));
        ports.push(LibraryPort::new("state", PortDirection::Out, 4).with_type(PortType::Debug));
        LibraryEntry::new("div48", CoreKind::IntDiv, 10, ports)
    }

    fn call_graph(callee: &str) -> Result<Graph> {
        let mut graph = Graph::new("divide", ComponentKind::Module, 12);
        let n = graph.add_value(ValueInfo::int("n", 32).signed())?;
        let d = graph.add_value(ValueInfo::int("d", 32).signed())?;
        let q = graph.add_value(ValueInfo::int("q", 32).signed())?;
        let inputs = graph.add_block(
            Block::new("inputs", 12)
                .with(Instruction::InputScalar { lhs: n })
                .with(Instruction::InputScalar { lhs: d }),
        );
        let divide = graph.add_block(
            Block::new("divide", 1)
                .with_delay(10)
                .with_predecessors(vec![inputs])
                .with(Instruction::Call {
                    callee: callee.to_string(),
                    inputs: vec![n, d],
                    outputs: vec![q],
                }),
        );
        graph.sink = graph.add_block(
            Block::new("outputs", 0)
                .with_predecessors(vec![divide])
                .with(Instruction::OutputScalar { value: q }),
        );
        Ok(graph)
    }

    fn generate(library: Library, graph: Graph) -> Result<String> {
        let db = Database::new(library, graph);
        let mut pipeline = Pipeline::try_new(&db)?;
        pipeline.lower()?;
        pipeline.instantiate_cores()?;
        let (entity, ports) = pipeline.finish()?;
        assert!(ports.contains_key("div48_U0_state"));
        entity.generate_code(&RenderOptions::default())
    }

    #[test]
    fn narrow_division_operands_are_resized() -> Result<()> {
        let mut library = Library::default();
        library.create_entry(divider())?;
        let code = generate(library, call_graph("div48")?)?;
        assert!(code.contains("signal n_resize : STD_LOGIC_VECTOR(47 downto 0);"));
        assert!(code.contains("dividend => n_resize,"));
        assert!(code.contains("inputReady => U0_load,"));
        assert!(code.contains("quotient => q_resize,"));
        assert!(code.contains("q <= q_resize(31 downto 0);"));
        assert!(code.contains("state => div48_U0_state"));
        // The call block starts 10 + 1 stages above its level.
        assert!(code.contains("U0_load <= '1';"));
        Ok(())
    }

    #[test]
    fn missing_components_are_library_errors() -> Result<()> {
        let db = Database::new(Library::default(), call_graph("div48")?);
        let mut pipeline = Pipeline::try_new(&db)?;
        match pipeline.instantiate_cores() {
            Err(Error::LibraryError(message)) => assert_eq!(
                message,
                "divide invokes div48, which is not in the library"
            ),
            other => panic!("expected a library error, got {:?}", other.map(|_| ())),
        }
        Ok(())
    }

    #[test]
    fn producers_are_instantiated_first() -> Result<()> {
        let mut graph = Graph::new("chain", ComponentKind::System, 4);
        let a = graph.add_value(ValueInfo::int("a", 8))?;
        let b = graph.add_value(ValueInfo::int("b", 8))?;
        let c = graph.add_value(ValueInfo::int("c", 8))?;
        graph.sink = graph.add_block(
            Block::new("body", 0)
                .with(Instruction::Call {
                    callee: "second".to_string(),
                    inputs: vec![b],
                    outputs: vec![c],
                })
                .with(Instruction::Call {
                    callee: "first".to_string(),
                    inputs: vec![a],
                    outputs: vec![b],
                }),
        );
        let order: Vec<String> = invocation_order(&graph)?
            .into_iter()
            .map(|call| call.callee)
            .collect();
        assert_eq!(order, vec!["first".to_string(), "second".to_string()]);
        Ok(())
    }
}
