//! Instruction lowering: one instruction becomes one assignment in the stage
//! of the main process its block is gated on. Lookup tables get processes of
//! their own, gated the same way, and debug outputs stay concurrent.
use log::{debug, warn};

use dfc_common::{
    cat,
    error::{Error, Result},
    numbers::BitWidth,
};
use dfc_library::port::{LibraryPort, PortDirection, PortType};
use dfc_query::{
    graph::{Constant, ValueId},
    instruction::{BinaryOp, CastKind, Instruction, Predicate, ShiftKind},
};
use dfc_vhdl::{
    attribute::{string_value, PORT_TYPE, READABLE_NAME},
    condition::{Condition, Relation},
    statement::Cases,
    value::{ArithOp, Value},
};

use crate::controllers::element_port;

use super::{constant_value, Pipeline};

fn arith_op(op: BinaryOp) -> Option<ArithOp> {
    match op {
        BinaryOp::Add => Some(ArithOp::Add),
        BinaryOp::Sub => Some(ArithOp::Sub),
        BinaryOp::Mul => Some(ArithOp::Mul),
        BinaryOp::And => Some(ArithOp::And),
        BinaryOp::Or => Some(ArithOp::Or),
        BinaryOp::Xor => Some(ArithOp::Xor),
        _ => None,
    }
}

fn relation(predicate: Predicate) -> Option<(Relation, bool)> {
    match predicate {
        Predicate::Slt => Some((Relation::Lt, true)),
        Predicate::Sle => Some((Relation::Lte, true)),
        Predicate::Sgt => Some((Relation::Gt, true)),
        Predicate::Sge => Some((Relation::Gte, true)),
        Predicate::Ult => Some((Relation::Lt, false)),
        Predicate::Ule => Some((Relation::Lte, false)),
        Predicate::Ugt => Some((Relation::Gt, false)),
        Predicate::Uge => Some((Relation::Gte, false)),
        _ => None,
    }
}

fn mask(width: BitWidth) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// A shift of a constant, evaluated at `width` bits.
fn fold_shift(kind: ShiftKind, value: i64, amount: u32, width: BitWidth) -> i64 {
    let bits = value as u64 & mask(width);
    let result = match kind {
        ShiftKind::Shl => bits.checked_shl(amount).unwrap_or(0),
        ShiftKind::LShr => bits.checked_shr(amount).unwrap_or(0),
        ShiftKind::AShr => {
            let unused = 64 - width.min(64);
            let signed = ((bits << unused) as i64) >> unused;
            (signed >> amount.min(63)) as u64
        }
    };
    (result & mask(width)) as i64
}

impl Pipeline<'_> {
    /// Lowers every instruction but calls, which become core instances.
    ///
    /// Inputs are lowered first, so any stage accepting them can read them
    /// straight from their ports.
    pub fn lower(&mut self) -> Result<()> {
        let graph = self.graph.clone();
        for (_, instruction) in graph.instructions().filter(|(_, i)| i.is_input()) {
            self.lower_input(instruction)?;
        }
        for block_id in graph.block_ids() {
            let live_ins = self.db.live_ins(block_id)?;
            let block = graph.block(block_id)?;
            let stage = self.db.actual_level(block_id)?;
            debug!(
                "block {}: level {}, stage {}, {} live-in values",
                block.name,
                block.pipeline_level,
                stage,
                live_ins.len()
            );
            for instruction in &block.instructions {
                self.lower_instruction(instruction, stage)?;
            }
        }
        Ok(())
    }

    fn unsupported(&self, instruction: &Instruction, reason: &str) -> Error {
        Error::BackEndError(format!(
            "'{}' cannot be lowered: {}",
            instruction.describe(&self.graph),
            reason
        ))
    }

    /// A value read without crossing a stage boundary.
    fn raw(&mut self, value: ValueId) -> Result<Value> {
        let info = self.value_info(value)?;
        match info.constant {
            Some(constant) => Ok(constant_value(&info, constant)),
            None => Ok(Value::Var(self.value_var(value)?)),
        }
    }

    /// Registers `lhs` in stage `stage`.
    fn define(&mut self, stage: i64, lhs: ValueId, cases: Cases) -> Result<()> {
        let target = self.value_var(lhs)?;
        let statement = self.entity.assign_cases(self.process, target, cases)?;
        self.at_stage(stage, statement);
        Ok(())
    }

    fn lower_input(&mut self, instruction: &Instruction) -> Result<()> {
        match instruction {
            Instruction::InputScalar { lhs } => {
                let info = self.value_info(*lhs)?;
                let port = self.add_port(
                    LibraryPort::new(cat!(info.name, "in"), PortDirection::In, info.width)
                        .with_readable_name(info.name.as_str())
                        .with_data_type(info.type_name()),
                    info.signed,
                )?;
                self.arrive(*lhs, port)
            }
            Instruction::InputStream { lhs, stream, index } => {
                let streaming = self.streaming.ok_or_else(|| {
                    self.unsupported(instruction, "only systems have input streams")
                })?;
                let element = self
                    .entity
                    .variable_mapped_to(streaming.input, &element_port(stream, *index))?;
                self.arrive(*lhs, element)
            }
            _ => Err(self.unsupported(instruction, "it is not an input")),
        }
    }

    fn lower_instruction(&mut self, instruction: &Instruction, stage: i64) -> Result<()> {
        match instruction {
            Instruction::Binary { op, lhs, a, b } => {
                let op = arith_op(*op)
                    .ok_or_else(|| self.unsupported(instruction, "no core implements it"))?;
                let a = self.operand_at(*a, stage)?;
                let b = self.operand_at(*b, stage)?;
                self.define(stage, *lhs, vec![(Value::arith(op, a, b), None)])
            }
            Instruction::Compare {
                predicate,
                lhs,
                a,
                b,
            } => {
                let a = self.operand_at(*a, stage)?;
                let b = self.operand_at(*b, stage)?;
                let condition = match predicate {
                    Predicate::Eq => Condition::eq(a, b),
                    Predicate::Ne => Condition::ne(a, b),
                    other => match relation(*other) {
                        Some((relation, true)) => Condition::compare_signed(relation, a, b),
                        Some((relation, false)) => Condition::compare(
                            relation,
                            Value::zero_extend(a),
                            Value::zero_extend(b),
                        ),
                        None => return Err(self.unsupported(instruction, "no core implements it")),
                    },
                };
                self.define(
                    stage,
                    *lhs,
                    vec![(Value::int(1), Some(condition)), (Value::int(0), None)],
                )
            }
            Instruction::Shift {
                kind,
                lhs,
                value,
                amount,
            } => {
                let amount = match self.value_info(*amount)?.constant {
                    Some(Constant::Int(amount)) if amount >= 0 => amount as u32,
                    _ => {
                        return Err(self.unsupported(
                            instruction,
                            "the shift amount is not a non-negative constant",
                        ))
                    }
                };
                let shifted = self.shift(*kind, *value, amount, stage)?;
                self.define(stage, *lhs, vec![(shifted, None)])
            }
            Instruction::Select {
                lhs,
                condition,
                then,
                otherwise,
            } => {
                let condition = self.operand_at(*condition, stage)?;
                let then = self.operand_at(*then, stage)?;
                let otherwise = self.operand_at(*otherwise, stage)?;
                self.define(
                    stage,
                    *lhs,
                    vec![(then, Some(Condition::is_high(condition))), (otherwise, None)],
                )
            }
            Instruction::Cast { kind, lhs, value } => {
                let width = self.value_info(*lhs)?.width;
                let source = self.value_info(*value)?;
                let operand = self.operand_at(*value, stage)?;
                let cast = match kind {
                    CastKind::ZExt => Value::zero_extend(operand),
                    CastKind::SExt => Value::sign_extend(operand),
                    CastKind::Trunc => match source.constant {
                        Some(Constant::Int(c)) => Value::sized((c as u64 & mask(width)) as i64, width),
                        _ if width < source.width => self.entity.sub_range(&operand, width - 1, 0)?,
                        _ => operand,
                    },
                    _ => return Err(self.unsupported(instruction, "no core implements it")),
                };
                self.define(stage, *lhs, vec![(cast, None)])
            }
            Instruction::Copy { lhs, value } => {
                let operand = self.operand_at(*value, stage)?;
                self.define(stage, *lhs, vec![(operand, None)])
            }
            Instruction::Call { .. } => Ok(()),
            Instruction::Redundancy { .. } => {
                Err(self.unsupported(instruction, "it is only implemented by library cores"))
            }
            // Lowered ahead of everything else.
            Instruction::InputScalar { .. } | Instruction::InputStream { .. } => Ok(()),
            Instruction::OutputScalar { value } => {
                let info = self.value_info(*value)?;
                let port = self.add_port(
                    LibraryPort::new(cat!(info.name, "out"), PortDirection::Out, info.width)
                        .with_readable_name(info.name.as_str())
                        .with_data_type(info.type_name()),
                    info.signed,
                )?;
                let operand = self.operand_at(*value, stage)?;
                self.assign_at(stage, port, operand)?;
                if self.streaming.is_none() {
                    let output_ready = self.entity.standard_ports().output_ready;
                    self.pulse_at(stage, output_ready)?;
                    let done = self.done_int()?;
                    self.assign_at(stage, done, Value::int(1))?;
                }
                Ok(())
            }
            Instruction::OutputStream {
                value,
                stream,
                index,
            } => {
                let streaming = self.streaming.ok_or_else(|| {
                    self.unsupported(instruction, "only systems have output streams")
                })?;
                let element = self
                    .entity
                    .variable_mapped_to(streaming.output, &element_port(stream, *index))?;
                let operand = self.operand_at(*value, stage)?;
                self.assign_at(stage, element, operand)?;
                self.pulse_at(stage, streaming.output_load)
            }
            Instruction::FeedbackStore { register, value } => {
                let store = match self.db.def_level(*value)? {
                    Some(defined) => defined - 1,
                    None => stage,
                };
                if store < 0 {
                    warn!(
                        "'{}' stores before the first stage, storing in stage 0",
                        instruction.describe(&self.graph)
                    );
                }
                let operand = self.operand_at(*value, store)?;
                let target = self.value_var(*register)?;
                self.assign_at(store, target, operand)?;
                let initialized = self.initialized(*register)?;
                self.assign_at(store, initialized, Value::int(1))
            }
            Instruction::FeedbackLoad {
                lhs,
                register,
                default,
            } => {
                let initial = self.initial_value(*lhs, *default, stage)?;
                let stored = self.value_var(*register)?;
                let initialized = self.initialized(*register)?;
                self.define(
                    stage,
                    *lhs,
                    vec![
                        (initial, Some(Condition::is_low(initialized))),
                        (Value::Var(stored), None),
                    ],
                )
            }
            Instruction::Summation {
                lhs,
                value,
                default,
            } => {
                let initial = self.initial_value(*lhs, *default, stage)?;
                let operand = self.operand_at(*value, stage)?;
                let target = self.value_var(*lhs)?;
                let initialized = self.initialized(*lhs)?;
                let sum = self.entity.assign_cases(
                    self.process,
                    target,
                    vec![
                        (
                            Value::add(initial, operand.clone()),
                            Some(Condition::is_low(initialized)),
                        ),
                        (Value::add(target, operand), None),
                    ],
                )?;
                self.at_stage(stage, sum);
                self.assign_at(stage, initialized, Value::int(1))
            }
            Instruction::LutRead { lhs, lut, address } => {
                let array = self.lut_array(lut)?;
                let info = self.value_info(*lhs)?;
                let label = self.entity.unique_name(&cat!(info.name, "read"))?;
                let process = self.entity.create_process_without_reset(label)?;
                let address = self.operand_at(*address, stage)?;
                let target = self.value_var(*lhs)?;
                let read = self
                    .entity
                    .assign(process, target, Value::element(array, address))?;
                let read = self.gated(process, stage, read)?;
                self.entity.push(process, read)
            }
            Instruction::LutWrite {
                lut,
                address,
                value,
            } => {
                let mut levels = vec![];
                for operand in [*address, *value] {
                    if let Some(defined) = self.db.def_level(operand)? {
                        levels.push(defined - 1);
                    }
                }
                let write_stage = levels.into_iter().min().unwrap_or(stage);
                let array = self.lut_array(lut)?;
                let process = self.lut_writer(lut)?;
                let address = self.operand_at(*address, write_stage)?;
                let value = self.operand_at(*value, write_stage)?;
                let write = self
                    .entity
                    .assign(process, Value::element(array, address), value)?;
                let write = self.gated(process, write_stage, write)?;
                self.entity.push(process, write)
            }
            Instruction::DebugOutput { value, watch } => {
                let info = self.value_info(*value)?;
                let port = self.add_port(
                    LibraryPort::new(cat!(info.name, "debug"), PortDirection::Out, info.width)
                        .with_type(PortType::Debug)
                        .with_readable_name(info.name.as_str())
                        .with_data_type(info.type_name()),
                    info.signed,
                )?;
                self.entity
                    .set_attribute(port, PORT_TYPE, "string", string_value("DEBUG"))?;
                let observed = self.raw(*value)?;
                self.entity
                    .create_synchronous_statement(port, observed.clone())?;
                if let Some(watch) = watch {
                    let watched = self.raw(*watch)?;
                    let name = format!("watchPointHit{}", self.watchpoint_count());
                    let hit = self.entity.create_signal(name, 1)?;
                    self.entity.create_synchronous_cases(
                        hit,
                        vec![
                            (Value::int(1), Some(Condition::eq(observed, watched))),
                            (Value::int(0), None),
                        ],
                    )?;
                    self.add_watchpoint(hit);
                }
                Ok(())
            }
        }
    }

    /// The first-iteration value of a feedback: its default, or an input port
    /// `<lhs>_init` when it has none.
    fn initial_value(&mut self, lhs: ValueId, default: Option<ValueId>, cycle: i64) -> Result<Value> {
        if let Some(default) = default {
            return self.operand_at(default, cycle);
        }
        let info = self.value_info(lhs)?;
        let name = cat!(info.name, "init");
        warn!(
            "{} has no initial value, reading it from input port {}",
            info.name, name
        );
        let port = self.add_port(
            LibraryPort::new(name, PortDirection::In, info.width)
                .with_readable_name(info.name.as_str())
                .with_data_type(info.type_name()),
            info.signed,
        )?;
        self.entity
            .set_attribute(port, READABLE_NAME, "string", string_value(&info.name))?;
        Ok(Value::Var(port))
    }

    fn shift(&mut self, kind: ShiftKind, value: ValueId, amount: u32, cycle: i64) -> Result<Value> {
        let info = self.value_info(value)?;
        let width = info.width;
        if let Some(Constant::Int(constant)) = info.constant {
            return Ok(Value::sized(fold_shift(kind, constant, amount, width), width));
        }
        let operand = self.operand_at(value, cycle)?;
        if amount == 0 {
            return Ok(operand);
        }
        Ok(match kind {
            ShiftKind::Shl if amount >= width => Value::zeros(width),
            ShiftKind::Shl => Value::concat(
                self.entity.sub_range(&operand, width - 1 - amount, 0)?,
                Value::zeros(amount),
            ),
            ShiftKind::LShr if amount >= width => Value::zeros(width),
            ShiftKind::LShr => Value::concat(
                Value::zeros(amount),
                self.entity.sub_range(&operand, width - 1, amount)?,
            ),
            ShiftKind::AShr => {
                let sign = self.entity.sub_range(&operand, width - 1, width - 1)?;
                let fill = amount.min(width);
                let mut result = if amount >= width {
                    sign.clone()
                } else {
                    self.entity.sub_range(&operand, width - 1, amount)?
                };
                let copies = if amount >= width { fill - 1 } else { fill };
                for _ in 0..copies {
                    result = Value::concat(sign.clone(), result);
                }
                result
            }
        })
    }

    fn watchpoint_count(&self) -> usize {
        self.watchpoints.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use dfc_library::store::Library;
    use dfc_query::graph::{Block, ComponentKind, Graph, ValueInfo};
    use dfc_vhdl::entity::RenderOptions;
    use pretty_assertions::assert_eq;

    fn render_with(graph: Graph, options: &RenderOptions) -> Result<String> {
        let db = Database::new(Library::default(), graph);
        let mut pipeline = Pipeline::try_new(&db)?;
        pipeline.module_interface(1)?;
        pipeline.lower()?;
        let (entity, _) = pipeline.finish()?;
        entity.generate_code(options)
    }

    fn render(graph: Graph) -> Result<String> {
        render_with(graph, &RenderOptions::default())
    }

    fn verbose() -> RenderOptions {
        RenderOptions {
            verbose: true,
            ..RenderOptions::default()
        }
    }

    /// Every assignment in the clocked branch of process `label`, with the
    /// stage it is gated by, if any. Needs verbose stage comments.
    fn staged_assignments(code: &str, label: &str) -> Vec<(Option<i64>, String)> {
        let header = format!("{} : process(", label);
        let body = code
            .lines()
            .skip_while(|line| !line.trim_start().starts_with(&header))
            .skip_while(|line| !line.trim_start().starts_with("elsif (clk'event"))
            .skip(1)
            .take_while(|line| line.trim() != "end process;");
        let mut stages: Vec<(usize, i64)> = vec![];
        let mut result = vec![];
        for line in body {
            let indent = line.len() - line.trim_start().len();
            while matches!(stages.last(), Some((depth, _)) if indent < *depth) {
                stages.pop();
            }
            let text = line.trim();
            if let Some(level) = text.strip_prefix("-- stage ") {
                if let Ok(level) = level.parse() {
                    stages.push((indent, level));
                }
            } else if text.contains(" <= ") && !text.starts_with("if ") && !text.starts_with("elsif ") {
                result.push((stages.last().map(|(_, level)| *level), text.to_string()));
            }
        }
        result
    }

    fn stage_of(assignments: &[(Option<i64>, String)], line: &str) -> Option<i64> {
        assignments
            .iter()
            .find(|(_, text)| text == line)
            .and_then(|(stage, _)| *stage)
    }

    /// `y = (x + x) << 2` over four stages, with `x` passed through to the
    /// last one.
    fn shl_graph() -> Result<Graph> {
        let mut graph = Graph::new("shl", ComponentKind::Module, 4);
        let x = graph.add_value(ValueInfo::int("x", 8))?;
        let sum = graph.add_value(ValueInfo::int("sum", 8))?;
        let two = graph.add_value(ValueInfo::int("two", 8).with_constant(2))?;
        let y = graph.add_value(ValueInfo::int("y", 8))?;
        let input = graph.add_block(Block::new("input", 4).with(Instruction::InputScalar { lhs: x }));
        let add = graph.add_block(
            Block::new("add", 2)
                .with_predecessors(vec![input])
                .with(Instruction::Binary {
                    op: BinaryOp::Add,
                    lhs: sum,
                    a: x,
                    b: x,
                }),
        );
        let shift = graph.add_block(
            Block::new("shift", 1)
                .with_predecessors(vec![add])
                .with(Instruction::Shift {
                    kind: ShiftKind::Shl,
                    lhs: y,
                    value: sum,
                    amount: two,
                }),
        );
        graph.sink = graph.add_block(
            Block::new("output", 0)
                .with_predecessors(vec![shift])
                .with(Instruction::OutputScalar { value: y })
                .with(Instruction::OutputScalar { value: x }),
        );
        Ok(graph)
    }

    #[test]
    fn constant_shifts_fold() {
        assert_eq!(fold_shift(ShiftKind::Shl, 0b0011, 2, 4), 0b1100);
        assert_eq!(fold_shift(ShiftKind::Shl, 0b0011, 3, 4), 0b1000);
        assert_eq!(fold_shift(ShiftKind::LShr, 0b1100, 2, 4), 0b0011);
        assert_eq!(fold_shift(ShiftKind::AShr, 0b1000, 2, 4), 0b1110);
        assert_eq!(fold_shift(ShiftKind::AShr, -8, 1, 8), 0xfc);
        assert_eq!(fold_shift(ShiftKind::LShr, 5, 64, 8), 0);
    }

    #[test]
    fn live_ins_are_registered() -> Result<()> {
        let code = render(shl_graph()?)?;
        assert!(code.contains("x_in : in STD_LOGIC_VECTOR(7 downto 0);"));
        assert!(code.contains("signal x_registered : STD_LOGIC_VECTOR(7 downto 0);"));
        assert!(code.contains("signal x_registered_3 : STD_LOGIC_VECTOR(7 downto 0);"));
        assert!(code.contains("attribute syn_keep of x_registered : signal is true;"));
        assert!(code.contains("attribute syn_keep of x_registered_3 : signal is true;"));
        assert!(code.contains("sum <= DFC_ADD(x_registered, x_registered, 8);"));
        assert!(code.contains("y <= (sum(5 downto 0) & \"00\");"));
        assert!(code.contains("activeStates <= (inputReady & activeStates(3 downto 1));"));
        assert!(code.contains("x <= x_in;"));
        assert!(code.contains("x_registered <= x;"));
        assert!(code.contains("x_registered_2 <= x_registered;"));
        assert!(code.contains("x_registered_3 <= x_registered_2;"));
        assert!(code.contains("x_out <= x_registered_3;"));
        assert!(code.contains("y_out <= y;"));
        assert!(code.contains("done <= done_int;"));
        Ok(())
    }

    #[test]
    fn arithmetic_runs_inside_its_stage() -> Result<()> {
        let code = render_with(shl_graph()?, &verbose())?;
        let process = code.find("shl_process : process(").unwrap();
        let add = code.find("sum <= DFC_ADD(").unwrap();
        assert!(add > process);

        let assignments = staged_assignments(&code, "shl_process");
        let stage = |line: &str| stage_of(&assignments, line);
        assert_eq!(stage("x <= x_in;"), Some(4));
        assert_eq!(stage("x_registered <= x;"), Some(3));
        assert_eq!(stage("sum <= DFC_ADD(x_registered, x_registered, 8);"), Some(2));
        assert_eq!(stage("x_registered_2 <= x_registered;"), Some(2));
        assert_eq!(stage("y <= (sum(5 downto 0) & \"00\");"), Some(1));
        assert_eq!(stage("x_registered_3 <= x_registered_2;"), Some(1));
        assert_eq!(stage("y_out <= y;"), Some(0));
        assert_eq!(stage("x_out <= x_registered_3;"), Some(0));
        Ok(())
    }

    #[test]
    fn every_assignment_is_gated_by_a_stage() -> Result<()> {
        let code = render_with(shl_graph()?, &verbose())?;
        let assignments = staged_assignments(&code, "shl_process");
        assert!(assignments.len() > 8);
        for (stage, text) in &assignments {
            match stage {
                Some(level) => assert!((0..=4).contains(level), "{} in stage {}", text, level),
                // The stage shift register itself and the pulses it clears.
                None => assert!(
                    text.starts_with("activeStates <= ")
                        || text.starts_with("stall_previous <= ")
                        || text.ends_with(" <= '0';"),
                    "{} is not gated by a stage",
                    text
                ),
            }
        }

        let mut in_process = false;
        for line in code.lines().skip_while(|line| !line.starts_with("architecture")) {
            let text = line.trim();
            if text.contains(" : process(") {
                in_process = true;
            } else if text == "end process;" {
                in_process = false;
            } else if !in_process {
                assert!(!text.contains("DFC_"), "{} is outside every process", text);
                for value in ["x", "sum", "y"] {
                    assert!(!text.starts_with(&format!("{} <= ", value)));
                }
            }
        }
        Ok(())
    }

    #[test]
    fn stage_reads_of_later_values_are_rejected() -> Result<()> {
        let mut graph = Graph::new("early", ComponentKind::Module, 2);
        let x = graph.add_value(ValueInfo::int("x", 8))?;
        let sum = graph.add_value(ValueInfo::int("sum", 8))?;
        graph.sink = graph.add_block(
            Block::new("body", 1)
                .with(Instruction::InputScalar { lhs: x })
                .with(Instruction::Binary {
                    op: BinaryOp::Add,
                    lhs: sum,
                    a: x,
                    b: x,
                })
                .with(Instruction::OutputScalar { value: sum }),
        );
        match render(graph) {
            Err(Error::GraphError(message)) => assert_eq!(
                message,
                "%sum of early is read in stage 1 before it is ready in stage 0"
            ),
            other => panic!("expected a GraphError, got {:?}", other.map(|_| ())),
        }
        Ok(())
    }

    /// A two-cycle multiply stores into its feedback register once the
    /// product is ready, not when the block starts.
    #[test]
    fn multi_cycle_blocks_store_in_their_last_stage() -> Result<()> {
        let mut graph = Graph::new("square", ComponentKind::Module, 3);
        let x = graph.add_value(ValueInfo::int("x", 16))?;
        let product = graph.add_value(ValueInfo::int("product", 16))?;
        let reg = graph.add_value(ValueInfo::int("reg", 16))?;
        let input = graph.add_block(Block::new("input", 3).with(Instruction::InputScalar { lhs: x }));
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
        graph.sink = graph.add_block(
            Block::new("store", 0)
                .with_predecessors(vec![square])
                .with(Instruction::FeedbackStore {
                    register: reg,
                    value: product,
                }),
        );
        let code = render_with(graph, &verbose())?;
        let assignments = staged_assignments(&code, "square_process");
        let multiply = assignments
            .iter()
            .find(|(_, text)| text.starts_with("product <= "))
            .and_then(|(stage, _)| *stage);
        assert_eq!(multiply, Some(2));
        assert_eq!(stage_of(&assignments, "reg <= product;"), Some(1));
        assert_eq!(stage_of(&assignments, "reg_is_initialized <= '1';"), Some(1));
        Ok(())
    }

    #[test]
    fn variable_shift_amounts_are_rejected() -> Result<()> {
        let mut graph = Graph::new("shift", ComponentKind::Module, 1);
        let x = graph.add_value(ValueInfo::int("x", 8))?;
        let n = graph.add_value(ValueInfo::int("n", 8))?;
        let y = graph.add_value(ValueInfo::int("y", 8))?;
        graph.sink = graph.add_block(
            Block::new("body", 1)
                .with(Instruction::InputScalar { lhs: x })
                .with(Instruction::InputScalar { lhs: n })
                .with(Instruction::Shift {
                    kind: ShiftKind::LShr,
                    lhs: y,
                    value: x,
                    amount: n,
                }),
        );
        assert!(matches!(render(graph), Err(Error::BackEndError(_))));
        Ok(())
    }

    #[test]
    fn feedback_without_default_adds_an_init_port() -> Result<()> {
        let mut graph = Graph::new("acc", ComponentKind::Module, 2);
        let x = graph.add_value(ValueInfo::int("x", 16))?;
        let total = graph.add_value(ValueInfo::int("total", 16))?;
        let body = graph.add_block(
            Block::new("body", 1)
                .with(Instruction::InputScalar { lhs: x })
                .with(Instruction::Summation {
                    lhs: total,
                    value: x,
                    default: None,
                }),
        );
        graph.sink = graph.add_block(
            Block::new("output", 0)
                .with_predecessors(vec![body])
                .with(Instruction::OutputScalar { value: total }),
        );
        let code = render(graph)?;
        assert!(code.contains("total_init : in STD_LOGIC_VECTOR(15 downto 0);"));
        assert!(code.contains("if (total_is_initialized = '0') then"));
        assert!(code.contains("total <= DFC_ADD(total_init, x, 16);"));
        assert!(code.contains("total <= DFC_ADD(total, x, 16);"));
        assert!(code.contains("total_is_initialized <= '1';"));
        Ok(())
    }

    #[test]
    fn debug_watchpoints_force_done() -> Result<()> {
        let mut graph = Graph::new("watch", ComponentKind::Module, 1);
        let x = graph.add_value(ValueInfo::int("x", 8))?;
        let limit = graph.add_value(ValueInfo::int("limit", 8).with_constant(42))?;
        graph.sink = graph.add_block(
            Block::new("body", 1)
                .with(Instruction::InputScalar { lhs: x })
                .with(Instruction::DebugOutput {
                    value: x,
                    watch: Some(limit),
                }),
        );
        let code = render(graph)?;
        assert!(code.contains("x_debug : out STD_LOGIC_VECTOR(7 downto 0);"));
        assert!(code.contains("attribute port_type of x_debug : signal is \"DEBUG\";"));
        assert!(code.contains("watchPointHit0 <= '1' when (x = \"00101010\") else"));
        assert!(code.contains("done <= '1' when (watchpointMerged = '1') else"));
        Ok(())
    }
}
