use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use log::warn;

use dfc_common::{
    error::{Error, Result, TryResult},
    numbers::BitWidth,
    traits::{Document, Documents, Identify},
};

use crate::{
    attribute::AttributeSpec,
    common::vhdl_name::{VhdlName, VhdlNameSelf},
    component::Instance,
    condition::Condition,
    owner::{OwnerId, OwnerKind, Ownership},
    process::{Process, ProcessId},
    statement::Cases,
    usings::Usings,
    value::{ConstantInt, Scope, Value},
    variable::{Mode, VarId, Variable, VariableKind},
};

mod components;
mod impls;
mod statements;

/// Identifies this generator in the header of every generated file.
pub const GENERATOR: &str = concat!("dfc ", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// Emit comment statements.
    pub verbose: bool,
    /// Treat unconnected output ports of instances as an error.
    pub strict_unmapped_outputs: bool,
}

/// The port preamble every generated component carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandardPorts {
    pub clk: VarId,
    pub rst: VarId,
    pub input_ready: VarId,
    pub output_ready: VarId,
    pub done: VarId,
    pub stall: VarId,
}

impl StandardPorts {
    pub const NAMES: [&'static str; 6] =
        ["clk", "rst", "inputReady", "outputReady", "done", "stall"];

    pub fn is_standard(name: &str) -> bool {
        Self::NAMES.iter().any(|n| n.eq_ignore_ascii_case(name))
    }

    pub fn all(&self) -> [VarId; 6] {
        [
            self.clk,
            self.rst,
            self.input_ready,
            self.output_ready,
            self.done,
            self.stall,
        ]
    }
}

/// A concurrent (conditional) signal assignment.
#[derive(Debug, Clone)]
pub(crate) struct Concurrent {
    pub(crate) target: Value,
    pub(crate) cases: Cases,
    pub(crate) owner: OwnerId,
}

/// A generated design unit: the entity declaration and its architecture.
///
/// All variables, processes and instances live in arenas owned by the entity
/// and are referred to by index. Construction goes through methods that check
/// the hardware invariants as early as possible: names are unique, every
/// storage bit has at most one driver, input ports are never driven and
/// output ports are never read.
#[derive(Debug, Clone)]
pub struct Entity {
    name: VhdlName,
    doc: Option<String>,
    variables: Vec<Variable>,
    lookup: HashMap<VhdlName, VarId>,
    taken: HashSet<VhdlName>,
    ports: Vec<VarId>,
    generics: Vec<VarId>,
    standard: StandardPorts,
    ownership: Ownership,
    owner: OwnerId,
    processes: Vec<Process>,
    concurrent: Vec<Concurrent>,
    instances: Vec<Instance>,
    attributes: IndexMap<VhdlName, String>,
    attribute_specs: Vec<AttributeSpec>,
    port_signals: HashMap<VarId, VarId>,
    reset_values: HashMap<VarId, Value>,
    usings: Usings,
}

impl Entity {
    /// Creates an entity with the standard ports.
    pub fn try_new(name: impl TryResult<VhdlName>) -> Result<Self> {
        let name = name.try_result()?;
        let mut ownership = Ownership::default();
        let owner = ownership.add_owner(format!("entity '{}'", name), OwnerKind::Entity, None, false);
        let mut usings = Usings::standard()?;
        usings.add_using("work", "HelperFunctions.all")?;
        let placeholder = VarId(0);
        let mut entity = Entity {
            name,
            doc: None,
            variables: vec![],
            lookup: HashMap::new(),
            taken: HashSet::new(),
            ports: vec![],
            generics: vec![],
            standard: StandardPorts {
                clk: placeholder,
                rst: placeholder,
                input_ready: placeholder,
                output_ready: placeholder,
                done: placeholder,
                stall: placeholder,
            },
            ownership,
            owner,
            processes: vec![],
            concurrent: vec![],
            instances: vec![],
            attributes: IndexMap::new(),
            attribute_specs: vec![],
            port_signals: HashMap::new(),
            reset_values: HashMap::new(),
            usings,
        };
        entity.standard = StandardPorts {
            clk: entity.add_port("clk", 1, Mode::In)?,
            rst: entity.add_port("rst", 1, Mode::In)?,
            input_ready: entity.add_port("inputReady", 1, Mode::In)?,
            output_ready: entity.add_port("outputReady", 1, Mode::Out)?,
            done: entity.add_port("done", 1, Mode::Out)?,
            stall: entity.add_port("stall", 1, Mode::In)?,
        };
        Ok(entity)
    }

    pub fn name(&self) -> &VhdlName {
        &self.name
    }

    pub fn standard_ports(&self) -> &StandardPorts {
        &self.standard
    }

    pub fn ports(&self) -> &[VarId] {
        &self.ports
    }

    pub fn generics(&self) -> &[VarId] {
        &self.generics
    }

    pub fn variable(&self, id: VarId) -> Result<&Variable> {
        self.variables.get(id.0).ok_or_else(|| {
            Error::InvalidArgument(format!("unknown variable {} in {}", id.0, self.name))
        })
    }

    fn variable_mut(&mut self, id: VarId) -> Result<&mut Variable> {
        let name = self.name.clone();
        self.variables
            .get_mut(id.0)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown variable {} in {}", id.0, name)))
    }

    /// All variables in creation order.
    pub fn variables(&self) -> impl Iterator<Item = (VarId, &Variable)> {
        self.variables
            .iter()
            .enumerate()
            .map(|(index, var)| (VarId(index), var))
    }

    pub fn find(&self, name: &str) -> Option<VarId> {
        VhdlName::try_new(name)
            .ok()
            .and_then(|name| self.lookup.get(&name).copied())
    }

    pub fn add_using(&mut self, library: impl TryResult<VhdlName>, using: impl Into<String>) -> Result<()> {
        self.usings.add_using(library, using).map(|_| ())
    }

    pub fn is_taken(&self, name: &VhdlName) -> bool {
        *name == self.name || self.taken.contains(name)
    }

    fn claim_name(&mut self, name: impl TryResult<VhdlName>) -> Result<VhdlName> {
        let name = name.try_result()?;
        if self.is_taken(&name) {
            Err(Error::InvalidArgument(format!(
                "{} is already declared in {}",
                name, self.name
            )))
        } else {
            self.taken.insert(name.clone());
            Ok(name)
        }
    }

    /// A free identifier derived from `base`, suffixed with `_1`, `_2`, ...
    /// when `base` is taken.
    pub fn unique_name(&self, base: &str) -> Result<VhdlName> {
        let base = VhdlName::sanitized(base)?;
        if !self.is_taken(&base) {
            return Ok(base);
        }
        let mut count = 1;
        loop {
            let candidate = VhdlName::try_new(format!("{}_{}", base, count))?;
            if !self.is_taken(&candidate) {
                return Ok(candidate);
            }
            count += 1;
        }
    }

    fn push_variable(&mut self, var: Variable) -> VarId {
        let id = VarId(self.variables.len());
        self.lookup.insert(var.name.clone(), id);
        self.variables.push(var);
        id
    }

    /// Adds a port to the entity.
    ///
    /// Adding a port that already exists with the same direction and width
    /// returns the existing port with a warning.
    pub fn add_port(
        &mut self,
        name: impl TryResult<VhdlName>,
        width: BitWidth,
        mode: Mode,
    ) -> Result<VarId> {
        let name = name.try_result()?;
        if width == 0 {
            return Err(Error::InvalidArgument(format!(
                "port {} must be at least one bit wide",
                name
            )));
        }
        if let Some(existing) = self.lookup.get(&name).copied() {
            let var = self.variable(existing)?;
            return if var.mode() == Some(mode) && var.width() == width {
                warn!("Port {} is added to {} more than once", name, self.name);
                Ok(existing)
            } else {
                Err(Error::InvalidArgument(format!(
                    "{} already exists in {} with a different kind, direction or width",
                    name, self.name
                )))
            };
        }
        let name = self.claim_name(name)?;
        let mut var = Variable::new(name, width, VariableKind::Port(mode));
        var.declared = true;
        let id = self.push_variable(var);
        self.ports.push(id);
        Ok(id)
    }

    pub fn add_generic(&mut self, name: impl TryResult<VhdlName>, default: i64) -> Result<VarId> {
        let name = self.claim_name(name)?;
        let mut var = Variable::new(name, 32, VariableKind::Generic(default));
        var.declared = true;
        let id = self.push_variable(var);
        self.generics.push(id);
        Ok(id)
    }

    pub fn set_signed(&mut self, var: VarId, signed: bool) -> Result<()> {
        self.variable_mut(var)?.signed = signed;
        Ok(())
    }

    fn new_variable(
        &mut self,
        name: impl TryResult<VhdlName>,
        width: BitWidth,
        kind: VariableKind,
        declared: bool,
    ) -> Result<VarId> {
        let name = self.claim_name(name)?;
        if width == 0 {
            return Err(Error::InvalidArgument(format!(
                "{} must be at least one bit wide",
                name
            )));
        }
        let mut var = Variable::new(name, width, kind);
        var.declared = declared;
        Ok(self.push_variable(var))
    }

    pub fn create_signal(&mut self, name: impl TryResult<VhdlName>, width: BitWidth) -> Result<VarId> {
        self.new_variable(name, width, VariableKind::Signal, true)
    }

    pub fn create_signed_signal(
        &mut self,
        name: impl TryResult<VhdlName>,
        width: BitWidth,
    ) -> Result<VarId> {
        let id = self.create_signal(name, width)?;
        self.set_signed(id, true)?;
        Ok(id)
    }

    /// Reserves the name of a signal without declaring it. Referencing it in
    /// emitted code fails until [`Entity::declare`] is called.
    pub fn reserve_signal(&mut self, name: impl TryResult<VhdlName>, width: BitWidth) -> Result<VarId> {
        self.new_variable(name, width, VariableKind::Signal, false)
    }

    pub fn declare(&mut self, var: VarId) -> Result<()> {
        self.variable_mut(var)?.declared = true;
        Ok(())
    }

    pub fn create_constant(
        &mut self,
        name: impl TryResult<VhdlName>,
        width: BitWidth,
        value: i64,
    ) -> Result<VarId> {
        let rendered = ConstantInt::new(value).render(width)?;
        self.new_variable(name, width, VariableKind::NamedConstant(rendered), true)
    }

    /// Creates a state signal with its own enumerated type. The first state
    /// is the reset state.
    pub fn create_state_var(
        &mut self,
        name: impl TryResult<VhdlName>,
        states: &[&str],
    ) -> Result<VarId> {
        let name = name.try_result()?;
        if states.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "state variable {} needs at least one state",
                name
            )));
        }
        let states = states
            .iter()
            .map(|state| self.claim_name(*state))
            .collect::<Result<Vec<_>>>()?;
        self.new_variable(name, 1, VariableKind::StateVar(states), true)
    }

    /// One enumerant of a state variable.
    pub fn state(&self, var: VarId, index: usize) -> Result<Value> {
        match self.variable(var)?.kind() {
            VariableKind::StateVar(states) if index < states.len() => {
                Ok(Value::State { var, state: index })
            }
            _ => Err(Error::InvalidArgument(format!(
                "{} has no state {}",
                self.variable(var)?.name(),
                index
            ))),
        }
    }

    /// Creates an array signal, padded with zeros to a power-of-two depth.
    pub fn create_array(
        &mut self,
        name: impl TryResult<VhdlName>,
        width: BitWidth,
        mut contents: Vec<i64>,
    ) -> Result<VarId> {
        let depth = contents.len().max(1).next_power_of_two();
        contents.resize(depth, 0);
        self.new_variable(name, width, VariableKind::Array(contents), true)
    }

    pub fn create_process_variable(
        &mut self,
        process: ProcessId,
        name: impl TryResult<VhdlName>,
        width: BitWidth,
    ) -> Result<VarId> {
        self.process(process)?;
        let id = self.new_variable(name, width, VariableKind::ProcessVariable(process), true)?;
        self.processes[process.0].variables.push(id);
        Ok(id)
    }

    /// Value to assign on reset instead of zero.
    pub fn set_reset_value(&mut self, var: VarId, value: impl Into<Value>) -> Result<()> {
        self.variable(var)?;
        self.reset_values.insert(var, value.into());
        Ok(())
    }

    /// A `high downto low` view of a variable. A single-bit variable is its
    /// own only view.
    pub fn range(&self, var: VarId, high: BitWidth, low: BitWidth) -> Result<Value> {
        let variable = self.variable(var)?;
        match variable.kind() {
            VariableKind::Array(_) | VariableKind::StateVar(_) | VariableKind::Generic(_) => {
                return Err(Error::InvalidArgument(format!(
                    "{} cannot be sliced",
                    variable.name()
                )))
            }
            _ => (),
        }
        if low > high || high >= variable.width() {
            return Err(Error::InvalidArgument(format!(
                "({} downto {}) is out of bounds for {} of {} bits",
                high,
                low,
                variable.name(),
                variable.width()
            )));
        }
        if variable.width() == 1 {
            Ok(Value::Var(var))
        } else {
            Ok(Value::Range { var, high, low })
        }
    }

    pub fn bit(&self, var: VarId, index: BitWidth) -> Result<Value> {
        self.range(var, index, index)
    }

    /// A view relative to another view; views of views collapse onto the
    /// underlying variable.
    pub fn sub_range(&self, value: &Value, high: BitWidth, low: BitWidth) -> Result<Value> {
        match value {
            Value::Var(var) => self.range(*var, high, low),
            Value::Range {
                var,
                high: outer_high,
                low: outer_low,
            } => {
                if high > outer_high - outer_low {
                    Err(Error::InvalidArgument(format!(
                        "({} downto {}) is out of bounds for {}",
                        high,
                        low,
                        self.describe(value)
                    )))
                } else {
                    self.range(*var, outer_low + high, outer_low + low)
                }
            }
            _ => Err(Error::InvalidArgument(format!(
                "{} cannot be sliced",
                self.describe(value)
            ))),
        }
    }

    pub fn width(&self, value: &Value) -> Result<BitWidth> {
        value.width(self)
    }

    /// Renders a value at `size` bits in the concurrent region.
    pub fn render(&self, value: &Value, size: BitWidth) -> Result<String> {
        value.render(&Scope::concurrent(self), size)
    }

    /// Short human-readable description of a value for diagnostics.
    pub fn describe(&self, value: &Value) -> String {
        let name = |var: &VarId| {
            self.variable(*var)
                .map(|v| v.name().to_string())
                .unwrap_or_else(|_| format!("#{}", var.0))
        };
        match value {
            Value::Var(var) => name(var),
            Value::Range { var, high, low } if high == low => format!("{}({})", name(var), high),
            Value::Range { var, high, low } => format!("{}({} downto {})", name(var), high, low),
            Value::Element { array, .. } => format!("{}(...)", name(array)),
            Value::Int(c) => c.value().to_string(),
            other => format!("{:?}", other),
        }
    }

    fn read_var(&mut self, id: VarId, process: Option<ProcessId>) -> Result<()> {
        let var = self.variable(id)?;
        if var.is_output_port() {
            return Err(Error::BackEndError(format!(
                "output port {} of {} cannot be read",
                var.name(),
                self.name
            )));
        }
        if let VariableKind::ProcessVariable(owner) = var.kind() {
            if process != Some(*owner) {
                return Err(Error::UndeclaredReference(format!(
                    "process variable {} is not declared in this scope",
                    var.name()
                )));
            }
        }
        self.variable_mut(id)?.read = true;
        Ok(())
    }

    pub(crate) fn mark_read(&mut self, value: &Value, process: Option<ProcessId>) -> Result<()> {
        for id in value.variables() {
            self.read_var(id, process)?;
        }
        Ok(())
    }

    pub(crate) fn mark_condition_read(
        &mut self,
        condition: &Condition,
        process: Option<ProcessId>,
    ) -> Result<()> {
        for id in condition.variables() {
            self.read_var(id, process)?;
        }
        Ok(())
    }

    /// Makes `owner` the driver of `target`, enforcing the single-driver
    /// invariant over overlapping views.
    pub fn set_owner(&mut self, target: &Value, owner: OwnerId) -> Result<()> {
        self.claim_target(target, owner, None)
    }

    pub(crate) fn claim_target(
        &mut self,
        target: &Value,
        owner: OwnerId,
        process: Option<ProcessId>,
    ) -> Result<()> {
        let id = target.target_var().ok_or_else(|| {
            Error::BackEndError(format!("{} cannot be assigned", self.describe(target)))
        })?;
        let var = self.variable(id)?;
        if !var.is_storage() {
            return Err(Error::BackEndError(format!(
                "{} of {} cannot be driven",
                var.name(),
                self.name
            )));
        }
        if let VariableKind::ProcessVariable(var_process) = var.kind() {
            if process != Some(*var_process) {
                return Err(Error::UndeclaredReference(format!(
                    "process variable {} is not declared in this scope",
                    var.name()
                )));
            }
        }
        let (high, low) = match target {
            Value::Range { high, low, .. } => (*high, *low),
            _ => (var.width() - 1, 0),
        };
        if let Value::Element { index, .. } = target {
            self.mark_read(index, process)?;
        }
        let description = self.describe(target);
        let released = self.ownership.claim(id, &description, high, low, owner)?;
        if !released.is_empty() {
            self.concurrent.retain(|c| !released.contains(&c.owner));
        }
        self.variable_mut(id)?.written = true;
        Ok(())
    }

    /// The owners currently driving some part of `var`.
    pub fn owners_of(&self, var: VarId) -> Vec<OwnerId> {
        self.ownership.drivers_of(var).map(|d| d.owner).collect()
    }

    pub fn owner_label(&self, owner: OwnerId) -> Result<String> {
        self.ownership.owner(owner).map(|o| o.label().to_string())
    }

    /// The entity itself as an owner, e.g. for values driven from outside.
    pub fn entity_owner(&self) -> OwnerId {
        self.owner
    }

    /// Declares `attribute <name> : <typ>;` once. Declaring it again with a
    /// different type is an error.
    pub fn add_attribute(&mut self, name: impl TryResult<VhdlName>, typ: impl Into<String>) -> Result<()> {
        let name = name.try_result()?;
        let typ = typ.into();
        match self.attributes.get(&name) {
            Some(existing) if *existing != typ => Err(Error::InvalidArgument(format!(
                "attribute {} is already declared as {}",
                name, existing
            ))),
            Some(_) => Ok(()),
            None => {
                self.attributes.insert(name, typ);
                Ok(())
            }
        }
    }

    /// Attaches an attribute value to a variable, declaring the attribute
    /// when needed.
    pub fn set_attribute(
        &mut self,
        var: VarId,
        attribute: impl TryResult<VhdlName>,
        typ: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<()> {
        let attribute = attribute.try_result()?;
        self.add_attribute(attribute.clone(), typ)?;
        let object = self.variable(var)?.name().clone();
        let value = value.into();
        if let Some(existing) = self
            .attribute_specs
            .iter_mut()
            .find(|s| s.attribute == attribute && s.object == object)
        {
            existing.value = value;
        } else {
            self.attribute_specs.push(AttributeSpec {
                attribute,
                object,
                value,
            });
        }
        Ok(())
    }

    pub fn attribute_specs(&self) -> &[AttributeSpec] {
        &self.attribute_specs
    }
}

impl Identify for Entity {
    fn identifier(&self) -> String {
        self.name.to_string()
    }
}

impl VhdlNameSelf for Entity {
    fn vhdl_name(&self) -> &VhdlName {
        &self.name
    }
}

impl Document for Entity {
    fn doc(&self) -> Option<&String> {
        self.doc.as_ref()
    }
}

impl Documents for Entity {
    fn set_doc(&mut self, doc: impl Into<String>) {
        self.doc = Some(doc.into());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::component::{ComponentDecl, ComponentPort};
    use pretty_assertions::assert_eq;

    fn adder_decl() -> Result<Arc<ComponentDecl>> {
        Ok(Arc::new(ComponentDecl::try_new(
            "adder32",
            vec![],
            vec![
                ComponentPort::try_new("clk", Mode::In, 1)?,
                ComponentPort::try_new("a", Mode::In, 32)?,
                ComponentPort::try_new("result", Mode::Out, 32)?,
            ],
        )?))
    }

    #[test]
    fn generate_counter() -> Result<()> {
        let mut entity = Entity::try_new("counter")?;
        let count_out = entity.add_port("count", 4, Mode::Out)?;
        let count = entity.create_signal("count_reg", 4)?;
        let stall = entity.standard_ports().stall;
        let process = entity.create_process("counting")?;
        let increment = entity.assign(process, count, Value::add(count, Value::int(1)))?;
        let guarded = entity.if_then(process, Condition::is_low(stall), increment, None)?;
        entity.push(process, guarded)?;
        entity.create_synchronous_statement(count_out, count)?;

        assert_eq!(
            entity.generate_code(&RenderOptions::default())?,
            format!(
                r#"-- This file was automatically generated by {}, DO NOT EDIT
library IEEE;
use IEEE.STD_LOGIC_1164.all;
use IEEE.STD_LOGIC_ARITH.all;
use IEEE.STD_LOGIC_UNSIGNED.all;
use work.HelperFunctions.all;

entity counter is
  port(
    clk : in STD_LOGIC;
    rst : in STD_LOGIC;
    inputReady : in STD_LOGIC;
    outputReady : out STD_LOGIC;
    done : out STD_LOGIC;
    stall : in STD_LOGIC;
    count : out STD_LOGIC_VECTOR(3 downto 0)
  );
end counter;

architecture Synthesized of counter is
  signal count_reg : STD_LOGIC_VECTOR(3 downto 0);
begin
  count <= count_reg;
  counting : process(clk, rst)
  begin
    if (rst = '1') then
      count_reg <= "0000";
    elsif (clk'event and clk = '1') then
      if (stall = '0') then
        count_reg <= DFC_ADD(count_reg, "0001", 4);
      end if;
    end if;
  end process;
end Synthesized;
"#,
                GENERATOR
            )
        );
        Ok(())
    }

    #[test]
    fn overlapping_drivers_conflict() -> Result<()> {
        let mut entity = Entity::try_new("conflict")?;
        let x = entity.create_signal("x", 8)?;
        let a = entity.create_process("a")?;
        let b = entity.create_process("b")?;
        let low = entity.range(x, 3, 0)?;
        let high = entity.range(x, 7, 4)?;
        entity.assign(a, low, Value::zeros(4))?;
        entity.assign(b, high, Value::zeros(4))?;
        let err = entity.assign(b, x, Value::zeros(8)).unwrap_err();
        assert_eq!(
            err,
            Error::DriverConflict(
                "x is driven by process 'a' in entity 'conflict' and cannot also be driven by process 'b' in entity 'conflict'"
                    .to_string()
            )
        );
        // Bit 2 lies inside the range process a drives.
        let bit = entity.bit(x, 2)?;
        assert!(entity.create_synchronous_statement(bit, Value::int(1)).is_err());
        Ok(())
    }

    #[test]
    fn ranges_are_checked_and_composed() -> Result<()> {
        let mut entity = Entity::try_new("ranges")?;
        let x = entity.create_signal("x", 8)?;
        let flag = entity.create_signal("flag", 1)?;
        assert!(entity.range(x, 8, 0).is_err());
        assert!(entity.range(x, 2, 3).is_err());
        assert_eq!(entity.range(flag, 0, 0)?, Value::Var(flag));
        let upper = entity.range(x, 7, 4)?;
        assert_eq!(
            entity.sub_range(&upper, 1, 0)?,
            Value::Range { var: x, high: 5, low: 4 }
        );
        assert!(entity.sub_range(&upper, 4, 0).is_err());
        Ok(())
    }

    #[test]
    fn port_directions_are_enforced() -> Result<()> {
        let mut entity = Entity::try_new("directions")?;
        let StandardPorts {
            input_ready,
            output_ready,
            ..
        } = *entity.standard_ports();
        let s = entity.create_signal("s", 1)?;
        assert!(entity.create_synchronous_statement(input_ready, Value::int(1)).is_err());
        assert!(entity.create_synchronous_statement(s, output_ready).is_err());
        // Reading an output goes through its internal signal.
        let internal = entity.signal_for_port(output_ready)?;
        assert_eq!(entity.signal_for_port(output_ready)?, internal);
        entity.create_synchronous_statement(s, internal)?;
        Ok(())
    }

    #[test]
    fn adding_a_port_twice() -> Result<()> {
        let mut entity = Entity::try_new("ports")?;
        let a = entity.add_port("a", 8, Mode::In)?;
        assert_eq!(entity.add_port("A", 8, Mode::In)?, a);
        assert!(entity.add_port("a", 4, Mode::In).is_err());
        assert!(entity.add_port("a", 8, Mode::Out).is_err());
        assert!(entity.create_signal("a", 8).is_err());
        Ok(())
    }

    #[test]
    fn unique_names() -> Result<()> {
        let mut entity = Entity::try_new("names")?;
        entity.create_signal("tmp", 1)?;
        entity.create_signal("tmp_1", 1)?;
        assert_eq!(entity.unique_name("tmp")?.as_str(), "tmp_2");
        assert_eq!(entity.unique_name("fresh")?.as_str(), "fresh");
        assert_eq!(entity.unique_name("%1 x")?.as_str(), "v_1_x");
        Ok(())
    }

    #[test]
    fn component_port_widths() -> Result<()> {
        let mut entity = Entity::try_new("mapping")?;
        let clk = entity.standard_ports().clk;
        let narrow = entity.create_signal("narrow", 16)?;
        let wide = entity.create_signal("wide", 40)?;
        let result = entity.create_signal("sum", 64)?;
        let short = entity.create_signal("short", 16)?;
        let u0 = entity.add_component("U0", adder_decl()?)?;
        entity.map_port(u0, "clk", clk)?;

        // Too wide for the port, and the adder does not narrow.
        assert!(matches!(
            entity.map_port(u0, "a", wide),
            Err(Error::MappingError(_))
        ));
        entity.map_port(u0, "a", narrow)?;
        // Mapping the same value again is fine, another value is not.
        entity.map_port(u0, "a", narrow)?;
        assert!(matches!(
            entity.map_port(u0, "a", short),
            Err(Error::MappingError(_))
        ));

        assert!(matches!(
            entity.map_port(u0, "result", short),
            Err(Error::MappingError(_))
        ));
        entity.map_port(u0, "result", result)?;
        assert_eq!(
            entity.instance(u0)?.mapped("result"),
            Some(&Value::Range { var: result, high: 31, low: 0 })
        );
        // The instance now drives the low half of sum.
        let low = entity.range(result, 7, 0)?;
        assert!(matches!(
            entity.create_synchronous_statement(low, Value::zeros(8)),
            Err(Error::DriverConflict(_))
        ));
        let high = entity.range(result, 63, 32)?;
        entity.create_synchronous_statement(high, Value::zeros(32))?;

        let code = entity.generate_code(&RenderOptions::default())?;
        assert!(code.contains(
            r#"  U0 : adder32
    port map(
      clk => clk,
      a => ("0000000000000000" & narrow),
      result => sum(31 downto 0)
    );
"#
        ));
        Ok(())
    }

    #[test]
    fn narrowing_components_truncate() -> Result<()> {
        let mut entity = Entity::try_new("narrowing")?;
        let wide = entity.create_signal("wide", 40)?;
        let decl = Arc::new(
            ComponentDecl::try_new("sink", vec![], vec![ComponentPort::try_new("a", Mode::In, 32)?])?
                .with_narrowing(),
        );
        let u0 = entity.add_component("U0", decl)?;
        entity.map_port(u0, "a", wide)?;
        let code = entity.generate_code(&RenderOptions::default())?;
        assert!(code.contains("a => wide(31 downto 0)"));
        Ok(())
    }

    #[test]
    fn unmapped_ports() -> Result<()> {
        let mut entity = Entity::try_new("open_ports")?;
        let clk = entity.standard_ports().clk;
        let u0 = entity.add_component("U0", adder_decl()?)?;
        entity.map_port(u0, "clk", clk)?;
        // The input a is not mapped.
        assert!(matches!(
            entity.generate_code(&RenderOptions::default()),
            Err(Error::MappingError(_))
        ));
        let a = entity.variable_mapped_to(u0, "a")?;
        assert_eq!(entity.variable(a)?.name().as_str(), "U0_a");
        assert_eq!(entity.variable_mapped_to(u0, "a")?, a);

        let code = entity.generate_code(&RenderOptions::default())?;
        assert!(code.contains("      result => open\n"));
        assert!(matches!(
            entity.generate_code(&RenderOptions {
                strict_unmapped_outputs: true,
                ..RenderOptions::default()
            }),
            Err(Error::MappingError(_))
        ));
        Ok(())
    }

    #[test]
    fn default_drivers_give_way() -> Result<()> {
        let mut entity = Entity::try_new("defaults")?;
        let merged = entity.create_signal("merged", 1)?;
        let done = entity.standard_ports().done;
        entity.drive_default(merged, Value::int(0))?;
        entity.create_synchronous_statement(done, merged)?;
        let code = entity.generate_code(&RenderOptions::default())?;
        assert!(code.contains("begin\n  merged <= '0';\n  done <= merged;\n"));

        let p = entity.create_process("watch")?;
        entity.push_assign(p, merged, Value::int(1))?;
        let code = entity.generate_code(&RenderOptions::default())?;
        assert!(code.contains("begin\n  done <= merged;\n  watch : process(clk, rst)\n"));
        assert!(code.contains("      merged <= '1';\n"));
        Ok(())
    }

    #[test]
    fn state_machines_and_guarded_assignments() -> Result<()> {
        let mut entity = Entity::try_new("fsm")?;
        let input_ready = entity.standard_ports().input_ready;
        let state = entity.create_state_var("phase", &["IDLE", "BUSY"])?;
        let count = entity.create_signal("count", 2)?;
        entity.set_reset_value(count, Value::int(3))?;
        let p = entity.create_process("control")?;
        let busy = entity.state(state, 1)?;
        let idle = entity.state(state, 0)?;
        let start = entity.assign(p, state, busy.clone())?;
        let start = entity.if_then(p, Condition::is_high(input_ready), start, None)?;
        let stop = entity.assign(p, state, idle)?;
        let step = entity.assign_cases(
            p,
            count,
            vec![
                (Value::sub(count, Value::int(1)), Some(Condition::ne(count, Value::int(0)))),
                (Value::Var(count), None),
            ],
        )?;
        let busy_arm = entity.multi(p, vec![step, stop])?;
        let case = entity.case(p, state, vec![(0, start), (1, busy_arm)])?;
        entity.push(p, case)?;

        let code = entity.generate_code(&RenderOptions::default())?;
        assert!(code.contains("  type phase_STATE_TYPE is (IDLE, BUSY);\n"));
        assert!(code.contains("  signal phase : phase_STATE_TYPE;\n"));
        assert!(code.contains(
            r#"    if (rst = '1') then
      phase <= IDLE;
      count <= "11";
    elsif (clk'event and clk = '1') then
      case phase is
        when IDLE =>
          if (inputReady = '1') then
            phase <= BUSY;
          end if;
        when BUSY =>
          if (count /= "00") then
            count <= DFC_SUB(count, "01", 2);
          else
            count <= count;
          end if;
          phase <= IDLE;
        when others =>
          phase <= IDLE;
      end case;
    end if;
"#
        ));
        Ok(())
    }

    #[test]
    fn statements_stay_in_their_process() -> Result<()> {
        let mut entity = Entity::try_new("scoping")?;
        let a = entity.create_signal("a", 1)?;
        let p = entity.create_process("p")?;
        let q = entity.create_process("q")?;
        let local = entity.create_process_variable(p, "tmp", 1)?;
        let statement = entity.assign(p, a, Value::int(1))?;
        assert!(entity.push(q, statement.clone()).is_err());
        entity.push(p, statement)?;
        assert!(matches!(
            entity.assign(q, a, local),
            Err(Error::UndeclaredReference(_))
        ));
        Ok(())
    }

    #[test]
    fn undeclared_signals_cannot_be_emitted() -> Result<()> {
        let mut entity = Entity::try_new("reserved")?;
        let later = entity.reserve_signal("later", 1)?;
        let done = entity.standard_ports().done;
        entity.create_synchronous_statement(done, later)?;
        assert!(matches!(
            entity.generate_code(&RenderOptions::default()),
            Err(Error::UndeclaredReference(_))
        ));
        entity.declare(later)?;
        entity.generate_code(&RenderOptions::default())?;
        Ok(())
    }

    #[test]
    fn arrays_and_attributes() -> Result<()> {
        let mut entity = Entity::try_new("memories")?;
        let table = entity.create_array("table", 4, vec![1, 2, 3])?;
        assert_eq!(
            entity.variable(table)?.kind(),
            &VariableKind::Array(vec![1, 2, 3, 0])
        );
        let index = entity.create_signal("index", 2)?;
        let out = entity.create_signal("out_value", 4)?;
        entity.create_synchronous_statement(out, Value::element(table, index))?;
        entity.set_attribute(out, crate::attribute::SYN_KEEP, "boolean", "true")?;
        let unused = entity.create_signal("unused", 1)?;
        entity.set_attribute(unused, crate::attribute::SYN_KEEP, "boolean", "true")?;
        assert!(entity
            .add_attribute(crate::attribute::SYN_KEEP, "string")
            .is_err());

        let code = entity.generate_code(&RenderOptions::default())?;
        assert!(code.contains("  type table_TYPE is array (0 to 3) of STD_LOGIC_VECTOR(3 downto 0);\n"));
        assert!(code.contains(
            "  signal table : table_TYPE := (\"0001\", \"0010\", \"0011\", \"0000\");\n"
        ));
        assert!(code.contains("  out_value <= table(conv_integer(index));\n"));
        assert!(code.contains("  attribute syn_keep : boolean;\n"));
        assert!(code.contains("  attribute syn_keep of out_value : signal is true;\n"));
        assert!(!code.contains("unused"));
        Ok(())
    }
}
