use std::collections::HashSet;

use indexmap::IndexMap;
use itertools::Itertools;
use log::warn;
use textwrap::indent;

use dfc_common::{
    error::{Error, Result},
    traits::Documents,
};

use crate::{
    common::vhdl_name::{VhdlName, VhdlNameSelf},
    component::{ComponentDecl, ComponentPort, GenericDecl, Instance},
    condition::Condition,
    process::ProcessId,
    traits::{DeclareWithIndent, VhdlDocument},
    usings::{DeclareUsings, ListUsings, Usings},
    value::{ConstantInt, Scope, Value},
    variable::{vector_type, Mode, VarId, Variable, VariableKind},
};

use super::{Concurrent, Entity, RenderOptions, GENERATOR};

impl ListUsings for Entity {
    fn list_usings(&self) -> Result<Usings> {
        Ok(self.usings.clone())
    }
}

impl Entity {
    /// The interface of this entity, for instantiating it elsewhere.
    pub fn declaration(&self) -> Result<ComponentDecl> {
        let generics = self
            .generics
            .iter()
            .map(|id| {
                let var = self.variable(*id)?;
                let default = match var.kind() {
                    VariableKind::Generic(default) => Some(*default),
                    _ => None,
                };
                GenericDecl::try_new(var.name(), default)
            })
            .collect::<Result<Vec<_>>>()?;
        let ports = self
            .ports
            .iter()
            .map(|id| {
                let var = self.variable(*id)?;
                let mode = var.mode().ok_or_else(|| {
                    Error::BackEndError(format!("{} is not a port", var.name()))
                })?;
                Ok(ComponentPort::try_new(var.name(), mode, var.width())?.signed(var.is_signed()))
            })
            .collect::<Result<Vec<_>>>()?;
        let mut decl = ComponentDecl::try_new(self.name.clone(), generics, ports)?;
        if let Some(doc) = &self.doc {
            decl.set_doc(doc.clone());
        }
        Ok(decl)
    }

    /// Emits the complete design unit.
    pub fn generate_code(&self, options: &RenderOptions) -> Result<String> {
        let pre = "  ";
        let mut result = format!(
            "-- This file was automatically generated by {}, DO NOT EDIT\n",
            GENERATOR
        );
        result.push_str(&self.declare_usings()?);
        result.push('\n');
        if let Some(doc) = self.vhdl_doc() {
            result.push_str(&doc);
        }
        result.push_str(&format!("entity {} is\n", self.name));
        result.push_str(&indent(&self.declaration()?.interface(pre), pre));
        result.push_str(&format!("end {};\n\n", self.name));
        result.push_str(&self.architecture(options, pre)?);
        Ok(result)
    }

    /// Whether a variable needs a declaration in the architecture, warning
    /// about signals that are only half connected.
    fn is_emitted(&self, var: &Variable) -> bool {
        match var.kind() {
            VariableKind::Port(_) | VariableKind::Generic(_) | VariableKind::ProcessVariable(_) => {
                false
            }
            _ if !var.is_declared() => false,
            VariableKind::NamedConstant(_) | VariableKind::Array(_) => {
                var.is_read() || var.is_written()
            }
            VariableKind::Signal | VariableKind::StateVar(_) => {
                match (var.is_read(), var.is_written()) {
                    (false, false) => false,
                    (false, true) => {
                        warn!("Signal {} of {} is written but never read", var.name(), self.name);
                        true
                    }
                    (true, false) => {
                        warn!("Signal {} of {} is read but never driven", var.name(), self.name);
                        true
                    }
                    (true, true) => true,
                }
            }
        }
    }

    fn architecture(&self, options: &RenderOptions, pre: &str) -> Result<String> {
        let emitted: Vec<&Variable> = self
            .variables
            .iter()
            .filter(|v| self.is_emitted(v))
            .collect();
        let skipped: HashSet<&VhdlName> = self
            .variables
            .iter()
            .filter(|v| !v.is_port() && !emitted.iter().any(|e| e.name() == v.name()))
            .map(|v| v.name())
            .collect();

        let mut declarations = String::new();
        for var in &emitted {
            match var.kind() {
                VariableKind::StateVar(states) => declarations.push_str(&format!(
                    "type {} is ({});\n",
                    var.type_name(),
                    states.iter().join(", ")
                )),
                VariableKind::Array(contents) => declarations.push_str(&format!(
                    "type {} is array (0 to {}) of {};\n",
                    var.type_name(),
                    contents.len() - 1,
                    vector_type(var.width())
                )),
                _ => (),
            }
        }
        for var in &emitted {
            if let VariableKind::NamedConstant(value) = var.kind() {
                declarations.push_str(&format!(
                    "constant {} : {} := {};\n",
                    var.name(),
                    var.type_name(),
                    value
                ));
            }
        }
        for var in &emitted {
            match var.kind() {
                VariableKind::Signal | VariableKind::StateVar(_) => declarations.push_str(
                    &format!("signal {} : {};\n", var.name(), var.type_name()),
                ),
                VariableKind::Array(contents) => {
                    let values = contents
                        .iter()
                        .map(|v| ConstantInt::new(*v).render(var.width()))
                        .collect::<Result<Vec<_>>>()?;
                    declarations.push_str(&format!(
                        "signal {} : {} := ({});\n",
                        var.name(),
                        var.type_name(),
                        values.join(", ")
                    ));
                }
                _ => (),
            }
        }
        let mut components: IndexMap<&VhdlName, &ComponentDecl> = IndexMap::new();
        for instance in &self.instances {
            let decl = instance.decl().as_ref();
            match components.get(decl.vhdl_name()) {
                Some(existing) if *existing != decl => {
                    return Err(Error::BackEndError(format!(
                        "conflicting declarations of component {} in {}",
                        decl.vhdl_name(),
                        self.name
                    )))
                }
                Some(_) => (),
                None => {
                    components.insert(decl.vhdl_name(), decl);
                }
            }
        }
        for decl in components.values() {
            declarations.push_str(&decl.declare_with_indent(pre)?);
        }
        for (attribute, typ) in &self.attributes {
            declarations.push_str(&format!("attribute {} : {};\n", attribute, typ));
        }
        for spec in &self.attribute_specs {
            if !skipped.contains(spec.object()) {
                declarations.push_str(&spec.declare());
                declarations.push('\n');
            }
        }

        let mut body = String::new();
        for instance in &self.instances {
            body.push_str(&self.render_instance(instance, options, pre)?);
        }
        for concurrent in &self.concurrent {
            body.push_str(&self.render_concurrent(concurrent, pre)?);
        }
        for index in 0..self.processes.len() {
            body.push_str(&self.render_process(ProcessId(index), options, pre)?);
        }

        Ok(format!(
            "architecture Synthesized of {} is\n{}begin\n{}end Synthesized;\n",
            self.name,
            indent(&declarations, pre),
            indent(&body, pre)
        ))
    }

    fn render_instance(
        &self,
        instance: &Instance,
        options: &RenderOptions,
        pre: &str,
    ) -> Result<String> {
        let scope = Scope::concurrent(self);
        let decl = instance.decl();
        let mut generics = vec![];
        for generic in decl.generics() {
            match (instance.generics.get(generic.name()), generic.default()) {
                (Some(value), _) => generics.push(format!("{} => {}", generic.name(), value)),
                (None, Some(_)) => (),
                (None, None) => {
                    return Err(Error::MappingError(format!(
                        "generic {} of {} has no value and no default",
                        generic.name(),
                        instance.label()
                    )))
                }
            }
        }
        let mut ports = vec![];
        for port in decl.ports() {
            match (instance.ports.get(port.name()), port.mode()) {
                (Some(value), _) => ports.push(format!(
                    "{} => {}",
                    port.name(),
                    value.render(&scope, port.width())?
                )),
                (None, Mode::In) => {
                    return Err(Error::MappingError(format!(
                        "input port {} of {} is not mapped",
                        port.name(),
                        instance.label()
                    )))
                }
                (None, Mode::Out) if options.strict_unmapped_outputs => {
                    return Err(Error::MappingError(format!(
                        "output port {} of {} is not mapped",
                        port.name(),
                        instance.label()
                    )))
                }
                (None, Mode::Out) => {
                    warn!(
                        "Output port {} of {} is not connected",
                        port.name(),
                        instance.label()
                    );
                    ports.push(format!("{} => open", port.name()));
                }
            }
        }
        let mut maps = vec![];
        if !generics.is_empty() {
            maps.push(format!("generic map(\n{}\n)", indent(&generics.join(",\n"), pre)));
        }
        if !ports.is_empty() {
            maps.push(format!("port map(\n{}\n)", indent(&ports.join(",\n"), pre)));
        }
        let head = format!("{} : {}", instance.label(), decl.vhdl_name());
        if maps.is_empty() {
            Ok(format!("{};\n", head))
        } else {
            Ok(format!("{}\n{};\n", head, indent(&maps.join("\n"), pre)))
        }
    }

    fn render_concurrent(&self, concurrent: &Concurrent, pre: &str) -> Result<String> {
        let scope = Scope::concurrent(self);
        let width = concurrent.target.width(self)?;
        let target = concurrent.target.render(&scope, width)?;
        let mut lines = vec![];
        for (value, guard) in &concurrent.cases {
            let value = value.render(&scope, width)?;
            match guard {
                Some(guard) => lines.push(format!("{} when {} else", value, guard.render(&scope)?)),
                None => lines.push(format!("{};", value)),
            }
        }
        let separator = format!("\n{}", pre.repeat(2));
        Ok(format!("{} <= {}\n", target, lines.join(separator.as_str())))
    }

    fn render_process(&self, id: ProcessId, options: &RenderOptions, pre: &str) -> Result<String> {
        let process = self.process(id)?;
        let scope = Scope::in_process(self, id);
        let clock = scope.reference(process.clock())?.name().clone();
        let sensitivity = match process.reset() {
            Some(reset) => format!("{}, {}", clock, scope.reference(reset)?.name()),
            None => clock.to_string(),
        };
        let mut result = format!("{} : process({})\n", process.label(), sensitivity);
        for var in process.variables() {
            let variable = self.variable(*var)?;
            result.push_str(&format!(
                "{}variable {} : {};\n",
                pre,
                variable.name(),
                variable.type_name()
            ));
        }
        result.push_str("begin\n");
        let mut body = String::new();
        for statement in process.statements() {
            body.push_str(&statement.render(&scope, options, pre)?);
        }
        let clocked = Condition::RisingEdge(process.clock()).render(&scope)?;
        let inner = match process.reset() {
            Some(reset) => format!(
                "if {} then\n{}elsif {} then\n{}end if;\n",
                Condition::is_high(reset).render(&scope)?,
                indent(&self.reset_statements(id, &scope)?, pre),
                clocked,
                indent(&body, pre)
            ),
            None => format!("if {} then\n{}end if;\n", clocked, indent(&body, pre)),
        };
        result.push_str(&indent(&inner, pre));
        result.push_str("end process;\n");
        Ok(result)
    }

    /// Returns every value driven by the process to its reset value, in
    /// variable order. Arrays keep their contents.
    fn reset_statements(&self, id: ProcessId, scope: &Scope) -> Result<String> {
        let owner = self.process(id)?.owner();
        let mut drivers: Vec<_> = self.ownership.owned_by(owner).copied().collect();
        drivers.sort_by_key(|d| (d.var, std::cmp::Reverse(d.high)));
        let mut done: HashSet<VarId> = HashSet::new();
        let mut result = String::new();
        for driver in drivers {
            if done.contains(&driver.var) {
                continue;
            }
            let var = self.variable(driver.var)?;
            let operator = match var.kind() {
                VariableKind::Array(_) => continue,
                VariableKind::ProcessVariable(_) => ":=",
                _ => "<=",
            };
            let whole = driver.low == 0 && driver.high + 1 == var.width();
            let (target, value) = if whole {
                done.insert(driver.var);
                let value = match (var.kind(), self.reset_values.get(&driver.var)) {
                    (VariableKind::StateVar(_), _) => Value::State {
                        var: driver.var,
                        state: 0,
                    },
                    (_, Some(value)) => value.clone(),
                    _ => Value::zeros(var.width()),
                };
                (Value::Var(driver.var), value)
            } else {
                (
                    Value::Range {
                        var: driver.var,
                        high: driver.high,
                        low: driver.low,
                    },
                    Value::zeros(driver.high - driver.low + 1),
                )
            };
            let width = target.width(self)?;
            result.push_str(&format!(
                "{} {} {};\n",
                target.render(scope, width)?,
                operator,
                value.render(scope, width)?
            ));
        }
        Ok(result)
    }
}
