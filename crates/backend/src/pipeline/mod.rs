//! The pipeline scheduler: one entity per graph whose single clocked
//! process runs every pipeline stage.
//!
//! Bit `L` of `activeStates` is high while the activation accepted `N - L`
//! cycles ago sits at level `L`; level `N` is the cycle of acceptance itself.
//! Every instruction is registered by the stage it is gated on, so a value
//! defined in stage `P` is valid in the cycle in which stage `P - 1` runs.
//! Consumers further down read it through one pipeline register per stage
//! crossed. Inputs are the exception: the stage accepting them reads the
//! port itself.
use std::{collections::BTreeMap, sync::Arc};

use indexmap::IndexMap;
use log::{debug, warn};

use dfc_common::{
    cat,
    error::{Error, Result},
    numbers::BitWidth,
    util::counter_width,
};
use dfc_library::port::{LibraryPort, PortDirection};
use dfc_query::graph::{Constant, Graph, ValueId, ValueInfo};
use dfc_vhdl::{
    attribute::{string_value, SYN_KEEP, SYN_RAMSTYLE},
    component::InstanceId,
    condition::Condition,
    entity::Entity,
    process::ProcessId,
    statement::Statement,
    value::{ConstantFloat, Value},
    variable::{Mode, VarId},
};

use crate::db::BackEnd;

pub mod cores;
pub mod lower;

/// The controllers a streaming pipeline is embedded between.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Streaming {
    pub input: InstanceId,
    pub output: InstanceId,
    pub input_done: VarId,
    pub output_done: VarId,
    /// `inputReady` of the output controller, pulsed by the output stage.
    pub output_load: VarId,
}

pub struct Pipeline<'a> {
    db: &'a dyn BackEnd,
    graph: Arc<Graph>,
    pub(crate) entity: Entity,
    process: ProcessId,
    depth: u32,
    active_states: VarId,
    stall_previous: VarId,
    /// High in the cycle an activation is accepted.
    pub(crate) input_ready: Value,
    /// The stall every stage obeys.
    pub(crate) stall_internal: Value,
    values: BTreeMap<ValueId, VarId>,
    /// Where a value arrives from in the stage accepting it.
    sources: BTreeMap<ValueId, Value>,
    /// Pipeline registers by value and by the number of stages they delay it.
    registered: BTreeMap<(ValueId, i64), VarId>,
    initialized: BTreeMap<ValueId, VarId>,
    triggers: Vec<VarId>,
    stages: BTreeMap<i64, Vec<Statement>>,
    luts: BTreeMap<String, VarId>,
    lut_writers: BTreeMap<String, ProcessId>,
    watchpoints: Vec<VarId>,
    /// Ports beyond the standard ones, as the library describes them.
    pub(crate) ports: IndexMap<String, LibraryPort>,
    pub(crate) streaming: Option<Streaming>,
    instances: usize,
    done_int: Option<VarId>,
}

impl<'a> Pipeline<'a> {
    pub fn try_new(db: &'a dyn BackEnd) -> Result<Self> {
        let graph = db.graph();
        let depth = graph.delay;
        if depth == 0 {
            return Err(Error::GraphError(format!(
                "{} has a pipeline delay of zero",
                graph.name
            )));
        }
        let mut entity = Entity::try_new(graph.name.as_str())?;
        let standard = *entity.standard_ports();
        let process = entity.create_process(cat!(graph.name, "process"))?;
        let active_states = entity.create_signal("activeStates", depth)?;
        let stall_previous = entity.create_signal("stall_previous", 1)?;
        Ok(Pipeline {
            db,
            graph,
            entity,
            process,
            depth,
            active_states,
            stall_previous,
            input_ready: Value::Var(standard.input_ready),
            stall_internal: Value::Var(standard.stall),
            values: BTreeMap::new(),
            sources: BTreeMap::new(),
            registered: BTreeMap::new(),
            initialized: BTreeMap::new(),
            triggers: vec![],
            stages: BTreeMap::new(),
            luts: BTreeMap::new(),
            lut_writers: BTreeMap::new(),
            watchpoints: vec![],
            ports: IndexMap::new(),
            streaming: None,
            instances: 0,
            done_int: None,
        })
    }

    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Scalar interface of a module. With an initiation interval above one,
    /// inputs are only accepted every `interval` cycles.
    pub fn module_interface(&mut self, interval: u32) -> Result<()> {
        if interval <= 1 {
            return Ok(());
        }
        let standard = *self.entity.standard_ports();
        let width = counter_width(u64::from(interval - 1));
        let counter = self.entity.create_signal("ii_counter", width)?;
        let process = self.entity.create_process("initiation_interval")?;
        let count = self.entity.assign_cases(
            process,
            counter,
            vec![
                (
                    Value::zeros(width),
                    Some(Condition::eq(counter, Value::sized(i64::from(interval - 1), width))),
                ),
                (Value::add(counter, Value::int(1)), None),
            ],
        )?;
        self.entity.push(process, count)?;
        let accepted = self.entity.create_signal("input_accepted", 1)?;
        self.entity.create_synchronous_cases(
            accepted,
            vec![
                (
                    Value::int(1),
                    Some(
                        Condition::is_high(standard.input_ready)
                            .and(Condition::eq(counter, Value::zeros(width))),
                    ),
                ),
                (Value::int(0), None),
            ],
        )?;
        debug!(
            "{} accepts an input every {} cycles",
            self.graph.name, interval
        );
        self.input_ready = Value::Var(accepted);
        Ok(())
    }

    fn not_stalled(&self) -> Condition {
        Condition::ne(self.stall_internal.clone(), Value::int(1))
            .or(Condition::is_low(self.stall_previous))
    }

    fn clamp_level(&self, level: i64) -> i64 {
        let depth = i64::from(self.depth);
        if level > depth {
            warn!(
                "Stage {} of {} lies beyond its pipeline depth of {}, using the input stage",
                level, self.graph.name, depth
            );
            depth
        } else {
            level.max(0)
        }
    }

    /// The signal that is high in the cycle stage `level` runs.
    fn trigger(&self, level: i64) -> Result<Value> {
        let level = self.clamp_level(level);
        if level == i64::from(self.depth) {
            Ok(self.input_ready.clone())
        } else {
            let bit = level as BitWidth;
            self.entity.range(self.active_states, bit, bit)
        }
    }

    /// Appends a statement of the main process to stage `level`.
    pub(crate) fn at_stage(&mut self, level: i64, statement: Statement) {
        let level = self.clamp_level(level);
        self.stages.entry(level).or_default().push(statement);
    }

    pub(crate) fn assign_at(
        &mut self,
        level: i64,
        target: impl Into<Value>,
        value: impl Into<Value>,
    ) -> Result<()> {
        let statement = self.entity.assign(self.process, target, value)?;
        self.at_stage(level, statement);
        Ok(())
    }

    /// A one-cycle pulse raised by stage `level`.
    pub(crate) fn pulse_at(&mut self, level: i64, trigger: VarId) -> Result<()> {
        if !self.triggers.contains(&trigger) {
            self.triggers.push(trigger);
        }
        self.assign_at(level, trigger, Value::int(1))
    }

    pub(crate) fn value_info(&self, value: ValueId) -> Result<ValueInfo> {
        Ok(self.graph.value(value)?.clone())
    }

    /// The signal holding a graph value.
    pub(crate) fn value_var(&mut self, value: ValueId) -> Result<VarId> {
        if let Some(var) = self.values.get(&value) {
            return Ok(*var);
        }
        let info = self.value_info(value)?;
        let name = self.entity.unique_name(&info.name)?;
        let var = self.entity.create_signal(name, info.width)?;
        self.entity.set_signed(var, info.signed)?;
        self.values.insert(value, var);
        Ok(var)
    }

    /// Latches `source` into `value` as the activation is accepted.
    pub(crate) fn arrive(&mut self, value: ValueId, source: VarId) -> Result<()> {
        let target = self.value_var(value)?;
        self.sources.insert(value, Value::Var(source));
        self.assign_at(i64::from(self.depth), target, source)
    }

    /// `value` as it reads in the cycle stage `cycle` runs.
    pub(crate) fn operand_at(&mut self, value: ValueId, cycle: i64) -> Result<Value> {
        let info = self.value_info(value)?;
        if let Some(constant) = info.constant {
            return Ok(constant_value(&info, constant));
        }
        let defined = self.db.def_level(value)?.ok_or_else(|| {
            Error::GraphError(format!(
                "%{} of {} has no defining instruction",
                info.name, self.graph.name
            ))
        })?;
        let ready = defined - 1;
        if cycle == ready {
            Ok(Value::Var(self.value_var(value)?))
        } else if cycle < ready {
            Ok(Value::Var(self.registered(value, ready, ready - cycle)?))
        } else if let Some(source) = self.sources.get(&value) {
            Ok(source.clone())
        } else {
            Err(Error::GraphError(format!(
                "%{} of {} is read in stage {} before it is ready in stage {}",
                info.name, self.graph.name, cycle, ready
            )))
        }
    }

    /// `value` delayed by `hops` registers past the cycle it is `ready` in.
    /// The first register is `<value>_registered`, later ones are numbered.
    fn registered(&mut self, value: ValueId, ready: i64, hops: i64) -> Result<VarId> {
        if let Some(register) = self.registered.get(&(value, hops)) {
            return Ok(*register);
        }
        let source = if hops == 1 {
            self.value_var(value)?
        } else {
            self.registered(value, ready, hops - 1)?
        };
        let info = self.value_info(value)?;
        let name = if hops == 1 {
            cat!(info.name, "registered")
        } else {
            cat!(info.name, "registered", hops)
        };
        let name = self.entity.unique_name(&name)?;
        let register = self.entity.create_signal(name, info.width)?;
        self.entity.set_signed(register, info.signed)?;
        self.entity
            .set_attribute(register, SYN_KEEP, "boolean", "true")?;
        self.assign_at(ready - hops + 1, register, source)?;
        self.registered.insert((value, hops), register);
        Ok(register)
    }

    /// `<register>_is_initialized`, set for good by the first store.
    pub(crate) fn initialized(&mut self, register: ValueId) -> Result<VarId> {
        if let Some(flag) = self.initialized.get(&register) {
            return Ok(*flag);
        }
        let info = self.value_info(register)?;
        let name = self.entity.unique_name(&cat!(info.name, "is_initialized"))?;
        let flag = self.entity.create_signal(name, 1)?;
        self.initialized.insert(register, flag);
        Ok(flag)
    }

    /// Adds a port beyond the standard ones and records it for the library.
    pub(crate) fn add_port(&mut self, port: LibraryPort, signed: bool) -> Result<VarId> {
        let mode = match port.direction {
            PortDirection::In => Mode::In,
            PortDirection::Out => Mode::Out,
        };
        let var = self.entity.add_port(port.name.as_str(), port.width, mode)?;
        self.entity.set_signed(var, signed)?;
        self.ports.insert(port.name.clone(), port);
        Ok(var)
    }

    pub(crate) fn next_instance(&mut self) -> String {
        let label = format!("U{}", self.instances);
        self.instances += 1;
        label
    }

    /// Latches the module's `done` once its outputs have been written.
    pub(crate) fn done_int(&mut self) -> Result<VarId> {
        match self.done_int {
            Some(done) => Ok(done),
            None => {
                let done = self.entity.create_signal("done_int", 1)?;
                self.done_int = Some(done);
                Ok(done)
            }
        }
    }

    pub(crate) fn add_watchpoint(&mut self, hit: VarId) {
        self.watchpoints.push(hit);
    }

    pub(crate) fn lut_array(&mut self, name: &str) -> Result<VarId> {
        if let Some(array) = self.luts.get(name) {
            return Ok(*array);
        }
        let lut = self.graph.lut(name)?.clone();
        let array_name = self.entity.unique_name(&lut.name)?;
        let array = self
            .entity
            .create_array(array_name, lut.width, lut.contents.clone())?;
        self.entity
            .set_attribute(array, SYN_RAMSTYLE, "string", string_value("block_ram"))?;
        self.luts.insert(lut.name, array);
        Ok(array)
    }

    pub(crate) fn lut_writer(&mut self, name: &str) -> Result<ProcessId> {
        if let Some(process) = self.lut_writers.get(name) {
            return Ok(*process);
        }
        let label = self.entity.unique_name(&cat!(name, "write"))?;
        let process = self.entity.create_process_without_reset(label)?;
        self.lut_writers.insert(name.to_string(), process);
        Ok(process)
    }

    /// A statement of another process, gated like the stage `level`.
    pub(crate) fn gated(
        &mut self,
        process: ProcessId,
        level: i64,
        statement: Statement,
    ) -> Result<Statement> {
        let condition = Condition::is_high(self.trigger(level)?).and(self.not_stalled());
        self.entity.if_then(process, condition, statement, None)
    }

    /// Emits the state vector, the stages and `done`, and hands over the
    /// entity with the ports it adds to the standard ones.
    pub fn finish(mut self) -> Result<(Entity, IndexMap<String, LibraryPort>)> {
        let process = self.process;
        let depth = self.depth;
        let not_stalled = self.not_stalled();

        for trigger in self.triggers.clone() {
            self.entity.push_assign(process, trigger, Value::int(0))?;
        }
        let shifted = if depth == 1 {
            self.input_ready.clone()
        } else {
            Value::concat(
                self.input_ready.clone(),
                self.entity.range(self.active_states, depth - 1, 1)?,
            )
        };
        let advance = self.entity.assign(process, self.active_states, shifted)?;
        let advance = self
            .entity
            .if_then(process, not_stalled.clone(), advance, None)?;
        self.entity.push(process, advance)?;
        self.entity
            .push_assign(process, self.stall_previous, self.stall_internal.clone())?;

        for (level, statements) in std::mem::take(&mut self.stages) {
            let condition = Condition::is_high(self.trigger(level)?).and(not_stalled.clone());
            let mut body = vec![self.entity.comment(process, format!("stage {}", level))];
            body.extend(statements);
            let body = self.entity.multi(process, body)?;
            let stage = self.entity.if_then(process, condition, body, None)?;
            self.entity.push(process, stage)?;
        }

        let merged = if self.watchpoints.is_empty() {
            None
        } else {
            let merged = self.entity.create_signal("watchpointMerged", 1)?;
            let hits = self.watchpoints.iter().map(|hit| Condition::is_high(*hit));
            self.entity.create_synchronous_cases(
                merged,
                vec![(Value::int(1), Some(Condition::any(hits))), (Value::int(0), None)],
            )?;
            Some(Condition::is_high(merged))
        };
        self.drive_done(merged)?;
        Ok((self.entity, self.ports))
    }

    fn drive_done(&mut self, merged: Option<Condition>) -> Result<()> {
        let done = self.entity.standard_ports().done;
        let finished = match (self.streaming, self.done_int) {
            (Some(streaming), _) => Some(
                Condition::is_high(streaming.input_done)
                    .and(Condition::eq(self.active_states, Value::zeros(self.depth)))
                    .and(Condition::is_high(streaming.output_done)),
            ),
            (None, Some(done_int)) => {
                if merged.is_none() {
                    return self.entity.create_synchronous_statement(done, done_int);
                }
                Some(Condition::is_high(done_int))
            }
            (None, None) => None,
        };
        let condition = match (finished, merged) {
            (Some(finished), Some(merged)) => finished.or(merged),
            (Some(condition), None) | (None, Some(condition)) => condition,
            (None, None) => {
                warn!("{} never finishes, done is tied low", self.graph.name);
                return self.entity.create_synchronous_statement(done, Value::int(0));
            }
        };
        self.entity.create_synchronous_cases(
            done,
            vec![(Value::int(1), Some(condition)), (Value::int(0), None)],
        )
    }
}

/// A graph constant at the width of its value.
pub(crate) fn constant_value(info: &ValueInfo, constant: Constant) -> Value {
    match constant {
        Constant::Int(value) => Value::sized(value, info.width),
        Constant::Float(bits) => {
            if info.width == 32 {
                Value::Float(ConstantFloat::single(f64::from(f32::from_bits(bits as u32))))
            } else {
                Value::Float(ConstantFloat::double(f64::from_bits(bits)))
            }
        }
    }
}
