use std::sync::Arc;

use indexmap::IndexMap;
use textwrap::indent;

use dfc_common::{
    error::{Error, Result, TryResult},
    numbers::BitWidth,
    traits::{Document, Documents, Identify},
};

use crate::{
    common::vhdl_name::{VhdlName, VhdlNameSelf},
    owner::OwnerId,
    traits::{DeclareWithIndent, VhdlDocument},
    value::Value,
    variable::{vector_type, Mode},
};

/// A port of a component interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComponentPort {
    name: VhdlName,
    mode: Mode,
    width: BitWidth,
    signed: bool,
}

impl ComponentPort {
    pub fn try_new(name: impl TryResult<VhdlName>, mode: Mode, width: BitWidth) -> Result<Self> {
        if width == 0 {
            return Err(Error::InvalidArgument(
                "ports must be at least one bit wide".to_string(),
            ));
        }
        Ok(ComponentPort {
            name: name.try_result()?,
            mode,
            width,
            signed: false,
        })
    }

    pub fn signed(mut self, signed: bool) -> Self {
        self.signed = signed;
        self
    }

    pub fn name(&self) -> &VhdlName {
        &self.name
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn width(&self) -> BitWidth {
        self.width
    }

    pub fn is_signed(&self) -> bool {
        self.signed
    }

    pub(crate) fn declare(&self) -> String {
        format!("{} : {} {}", self.name, self.mode, vector_type(self.width))
    }
}

/// An integer generic of a component interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenericDecl {
    name: VhdlName,
    default: Option<i64>,
}

impl GenericDecl {
    pub fn try_new(name: impl TryResult<VhdlName>, default: Option<i64>) -> Result<Self> {
        Ok(GenericDecl {
            name: name.try_result()?,
            default,
        })
    }

    pub fn name(&self) -> &VhdlName {
        &self.name
    }

    pub fn default(&self) -> Option<i64> {
        self.default
    }

    pub(crate) fn declare(&self) -> String {
        match self.default {
            Some(default) => format!("{} : integer := {}", self.name, default),
            None => format!("{} : integer", self.name),
        }
    }
}

/// The interface of a reusable hardware block.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComponentDecl {
    name: VhdlName,
    generics: Vec<GenericDecl>,
    ports: Vec<ComponentPort>,
    /// Arithmetic cores accept operands wider than their ports; the operand is
    /// truncated with a warning. Everywhere else narrowing is an error.
    allow_narrowing: bool,
    doc: Option<String>,
}

impl ComponentDecl {
    pub fn try_new(
        name: impl TryResult<VhdlName>,
        generics: Vec<GenericDecl>,
        ports: Vec<ComponentPort>,
    ) -> Result<Self> {
        let name = name.try_result()?;
        for (index, port) in ports.iter().enumerate() {
            if ports[..index].iter().any(|p| p.name() == port.name())
                || generics.iter().any(|g| g.name() == port.name())
            {
                return Err(Error::InvalidArgument(format!(
                    "{} is declared twice on component {}",
                    port.name(),
                    name
                )));
            }
        }
        Ok(ComponentDecl {
            name,
            generics,
            ports,
            allow_narrowing: false,
            doc: None,
        })
    }

    pub fn with_narrowing(mut self) -> Self {
        self.allow_narrowing = true;
        self
    }

    pub fn allows_narrowing(&self) -> bool {
        self.allow_narrowing
    }

    pub fn generics(&self) -> &[GenericDecl] {
        &self.generics
    }

    pub fn ports(&self) -> &[ComponentPort] {
        &self.ports
    }

    pub fn port(&self, name: &str) -> Option<&ComponentPort> {
        self.ports.iter().find(|p| p.name().as_str().eq_ignore_ascii_case(name))
    }

    pub fn generic(&self, name: &str) -> Option<&GenericDecl> {
        self.generics
            .iter()
            .find(|g| g.name().as_str().eq_ignore_ascii_case(name))
    }

    /// The generic and port clauses shared by component and entity
    /// declarations.
    pub(crate) fn interface(&self, pre: &str) -> String {
        let mut result = String::new();
        if !self.generics.is_empty() {
            let generics = self
                .generics
                .iter()
                .map(|g| g.declare())
                .collect::<Vec<_>>()
                .join(";\n");
            result.push_str(&format!("generic(\n{}\n);\n", indent(&generics, pre)));
        }
        if !self.ports.is_empty() {
            let ports = self
                .ports
                .iter()
                .map(|p| p.declare())
                .collect::<Vec<_>>()
                .join(";\n");
            result.push_str(&format!("port(\n{}\n);\n", indent(&ports, pre)));
        }
        result
    }
}

impl Identify for ComponentDecl {
    fn identifier(&self) -> String {
        self.name.to_string()
    }
}

impl VhdlNameSelf for ComponentDecl {
    fn vhdl_name(&self) -> &VhdlName {
        &self.name
    }
}

impl Document for ComponentDecl {
    fn doc(&self) -> Option<&String> {
        self.doc.as_ref()
    }
}

impl Documents for ComponentDecl {
    fn set_doc(&mut self, doc: impl Into<String>) {
        self.doc = Some(doc.into());
    }
}

impl DeclareWithIndent for ComponentDecl {
    fn declare_with_indent(&self, pre: &str) -> Result<String> {
        let mut result = String::new();
        if let Some(doc) = self.vhdl_doc() {
            result.push_str(&doc);
        }
        result.push_str(&format!("component {} is\n", self.name));
        result.push_str(&indent(&self.interface(pre), pre));
        result.push_str("end component;\n");
        Ok(result)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceId(pub(crate) usize);

/// A placed instance of a component declaration.
#[derive(Debug, Clone)]
pub struct Instance {
    pub(crate) label: VhdlName,
    pub(crate) decl: Arc<ComponentDecl>,
    pub(crate) owner: OwnerId,
    pub(crate) ports: IndexMap<VhdlName, Value>,
    pub(crate) generics: IndexMap<VhdlName, i64>,
}

impl Instance {
    pub fn label(&self) -> &VhdlName {
        &self.label
    }

    pub fn decl(&self) -> &Arc<ComponentDecl> {
        &self.decl
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn mapped(&self, port: &str) -> Option<&Value> {
        self.decl
            .port(port)
            .and_then(|p| self.ports.get(p.name()))
    }

    /// Ports of the declaration that are not mapped yet.
    pub fn unmapped_ports(&self) -> Vec<ComponentPort> {
        self.decl
            .ports()
            .iter()
            .filter(|p| !self.ports.contains_key(p.name()))
            .cloned()
            .collect()
    }
}
