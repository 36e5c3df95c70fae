//! Component instantiation and port mapping.
use std::sync::Arc;

use indexmap::IndexMap;
use log::warn;

use dfc_common::error::{Error, Result, TryResult};

use crate::{
    common::vhdl_name::{VhdlName, VhdlNameSelf},
    component::{ComponentDecl, Instance, InstanceId},
    owner::OwnerKind,
    value::Value,
    variable::{Mode, VarId, VariableKind},
};

use super::Entity;

impl Entity {
    pub fn add_component(
        &mut self,
        label: impl TryResult<VhdlName>,
        decl: Arc<ComponentDecl>,
    ) -> Result<InstanceId> {
        let label = self.claim_name(label)?;
        let id = InstanceId(self.instances.len());
        let owner = self.ownership.add_owner(
            format!("instance '{}' of {}", label, decl.vhdl_name()),
            OwnerKind::Instance(id),
            Some(self.owner),
            false,
        );
        self.instances.push(Instance {
            label,
            decl,
            owner,
            ports: IndexMap::new(),
            generics: IndexMap::new(),
        });
        Ok(id)
    }

    pub fn instance(&self, id: InstanceId) -> Result<&Instance> {
        self.instances.get(id.0).ok_or_else(|| {
            Error::InvalidArgument(format!("unknown instance {} in {}", id.0, self.name))
        })
    }

    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    /// Connects a port of an instance.
    ///
    /// Inputs narrower than the port are extended. Wider inputs are only
    /// accepted, with truncation, by components that allow narrowing. Outputs
    /// must be connected to storage at least as wide as the port; a wider
    /// actual is connected through its low bits. The instance becomes the
    /// owner of whatever its outputs drive.
    pub fn map_port(
        &mut self,
        instance: InstanceId,
        port: &str,
        value: impl Into<Value>,
    ) -> Result<()> {
        let value = value.into();
        let inst = self.instance(instance)?;
        let decl = inst.decl().clone();
        let label = inst.label().clone();
        let owner = inst.owner();
        let port = decl
            .port(port)
            .ok_or_else(|| {
                Error::MappingError(format!(
                    "{} is not a port of component {}",
                    port,
                    decl.vhdl_name()
                ))
            })?
            .clone();
        let width = value.width(self)?;
        let actual = match port.mode() {
            Mode::In => {
                if width > port.width() {
                    if decl.allows_narrowing() {
                        warn!(
                            "{} is {} bits wide, port {} of {} takes {} bits; the value is truncated",
                            self.describe(&value),
                            width,
                            port.name(),
                            label,
                            port.width()
                        );
                    } else {
                        return Err(Error::MappingError(format!(
                            "{} ({} bits) is wider than input port {} ({} bits) of {}",
                            self.describe(&value),
                            width,
                            port.name(),
                            port.width(),
                            label
                        )));
                    }
                } else if width < port.width() {
                    warn!(
                        "{} is {} bits wide and is extended to the {} bits of port {} of {}",
                        self.describe(&value),
                        width,
                        port.width(),
                        port.name(),
                        label
                    );
                }
                value
            }
            Mode::Out => {
                if value.target_var().is_none() || matches!(value, Value::Element { .. }) {
                    return Err(Error::MappingError(format!(
                        "output port {} of {} must be connected to a signal",
                        port.name(),
                        label
                    )));
                }
                if width < port.width() {
                    return Err(Error::MappingError(format!(
                        "{} ({} bits) is narrower than output port {} ({} bits) of {}",
                        self.describe(&value),
                        width,
                        port.name(),
                        port.width(),
                        label
                    )));
                }
                if width > port.width() {
                    self.sub_range(&value, port.width() - 1, 0)?
                } else {
                    value
                }
            }
        };
        if let Some(existing) = self.instances[instance.0].ports.get(port.name()) {
            return if *existing == actual {
                Ok(())
            } else {
                Err(Error::MappingError(format!(
                    "port {} of {} is already mapped to {} and cannot be remapped to {}",
                    port.name(),
                    label,
                    self.describe(existing),
                    self.describe(&actual)
                )))
            };
        }
        match port.mode() {
            Mode::In => self.mark_read(&actual, None)?,
            Mode::Out => self.claim_target(&actual, owner, None)?,
        }
        self.instances[instance.0]
            .ports
            .insert(port.name().clone(), actual);
        Ok(())
    }

    pub fn map_generic(&mut self, instance: InstanceId, generic: &str, value: i64) -> Result<()> {
        let inst = self.instance(instance)?;
        let name = inst
            .decl()
            .generic(generic)
            .ok_or_else(|| {
                Error::MappingError(format!(
                    "{} is not a generic of component {}",
                    generic,
                    inst.decl().vhdl_name()
                ))
            })?
            .name()
            .clone();
        match inst.generics.get(&name) {
            Some(existing) if *existing != value => Err(Error::MappingError(format!(
                "generic {} of {} is already mapped to {} and cannot be remapped to {}",
                name,
                inst.label(),
                existing,
                value
            ))),
            _ => {
                self.instances[instance.0].generics.insert(name, value);
                Ok(())
            }
        }
    }

    /// The signal connected to a port of an instance, creating and mapping
    /// `<instance>_<port>` when the port is still open.
    pub fn variable_mapped_to(&mut self, instance: InstanceId, port: &str) -> Result<VarId> {
        let inst = self.instance(instance)?;
        let decl_port = inst
            .decl()
            .port(port)
            .ok_or_else(|| {
                Error::MappingError(format!(
                    "{} is not a port of component {}",
                    port,
                    inst.decl().vhdl_name()
                ))
            })?
            .clone();
        match inst.mapped(port) {
            Some(Value::Var(var)) => return Ok(*var),
            Some(other) => {
                return Err(Error::MappingError(format!(
                    "port {} of {} is connected to {}, not to a signal",
                    decl_port.name(),
                    inst.label(),
                    self.describe(other)
                )))
            }
            None => (),
        }
        let name = self.unique_name(&format!("{}_{}", inst.label(), decl_port.name()))?;
        let signal = self.create_signal(name, decl_port.width())?;
        self.set_signed(signal, decl_port.is_signed())?;
        self.map_port(instance, decl_port.name().as_str(), signal)?;
        Ok(signal)
    }

    /// An internal signal mirroring a port of this entity, so that output
    /// values can be read back and input values can be registered under a
    /// stable name. The same signal is returned on every call.
    pub fn signal_for_port(&mut self, port: VarId) -> Result<VarId> {
        if let Some(signal) = self.port_signals.get(&port) {
            return Ok(*signal);
        }
        let var = self.variable(port)?;
        let mode = match var.kind() {
            VariableKind::Port(mode) => *mode,
            _ => {
                return Err(Error::InvalidArgument(format!(
                    "{} is not a port of {}",
                    var.name(),
                    self.name
                )))
            }
        };
        let (width, signed) = (var.width(), var.is_signed());
        let name = self.unique_name(&format!("{}_int", var.name()))?;
        let signal = self.create_signal(name, width)?;
        self.set_signed(signal, signed)?;
        match mode {
            Mode::Out => self.create_synchronous_statement(port, signal)?,
            Mode::In => self.create_synchronous_statement(signal, port)?,
        }
        self.port_signals.insert(port, signal);
        Ok(signal)
    }
}
