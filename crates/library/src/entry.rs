use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use dfc_common::{error::Result, numbers::BitWidth};

use crate::{
    kind::CoreKind,
    port::{LibraryPort, PortDirection},
    stream::Stream,
};

/// Port names every generated component carries in front of its own ports.
pub const STANDARD_PORTS: [(&str, PortDirection); 6] = [
    ("clk", PortDirection::In),
    ("rst", PortDirection::In),
    ("inputReady", PortDirection::In),
    ("outputReady", PortDirection::Out),
    ("done", PortDirection::Out),
    ("stall", PortDirection::In),
];

pub fn is_standard_port(name: &str) -> bool {
    STANDARD_PORTS
        .iter()
        .any(|(standard, _)| standard.eq_ignore_ascii_case(name))
}

fn default_active() -> bool {
    true
}

/// A named component of the library.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LibraryEntry {
    pub name: String,
    pub kind: CoreKind,
    /// Pipeline delay in cycles.
    #[serde(default)]
    pub delay: u32,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(rename = "port", default)]
    pub ports: Vec<LibraryPort>,
}

/// One operand position of a core, in call order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operand {
    Scalar(LibraryPort),
    Stream(Stream),
}

impl Operand {
    pub fn is_stream(&self) -> bool {
        matches!(self, Operand::Stream(_))
    }

    pub fn width(&self) -> BitWidth {
        match self {
            Operand::Scalar(port) => port.width,
            Operand::Stream(stream) => stream.width(),
        }
    }

    pub fn direction(&self) -> PortDirection {
        match self {
            Operand::Scalar(port) => port.direction,
            Operand::Stream(stream) => stream.direction(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Operand::Scalar(port) => &port.name,
            Operand::Stream(stream) => stream.name(),
        }
    }
}

impl LibraryEntry {
    pub fn new(name: impl Into<String>, kind: CoreKind, delay: u32, ports: Vec<LibraryPort>) -> Self {
        LibraryEntry {
            name: name.into(),
            kind,
            delay,
            active: true,
            ports,
        }
    }

    /// The standard preamble as library ports.
    pub fn standard_ports() -> Vec<LibraryPort> {
        STANDARD_PORTS
            .iter()
            .map(|(name, direction)| LibraryPort::new(*name, *direction, 1))
            .collect()
    }

    pub fn port(&self, name: &str) -> Option<&LibraryPort> {
        self.ports.iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Scalar ports that take part in a call, without the standard preamble
    /// and debug ports.
    pub fn scalar_ports(&self) -> impl Iterator<Item = &LibraryPort> {
        self.ports
            .iter()
            .filter(|p| !p.is_stream() && !p.is_debug() && !is_standard_port(&p.name))
    }

    pub fn debug_ports(&self) -> impl Iterator<Item = &LibraryPort> {
        self.ports.iter().filter(|p| p.is_debug())
    }

    /// Stream ports grouped by readable name, in order of first appearance.
    pub fn streams(&self) -> Result<Vec<Stream>> {
        let mut groups: IndexMap<&str, Vec<LibraryPort>> = IndexMap::new();
        for port in self.ports.iter().filter(|p| p.is_stream()) {
            groups
                .entry(port.readable_name.as_str())
                .or_insert_with(Vec::new)
                .push(port.clone());
        }
        groups
            .into_iter()
            .map(|(name, ports)| Stream::try_new(name, &ports))
            .collect()
    }

    /// Operands in call order: inputs, then outputs. A stream counts as one
    /// operand at the position of its first port.
    pub fn operands(&self) -> Result<Vec<Operand>> {
        let streams = self.streams()?;
        let mut positioned: Vec<(usize, Operand)> = vec![];
        for (index, port) in self.ports.iter().enumerate() {
            if port.is_debug() || is_standard_port(&port.name) {
                continue;
            }
            if port.is_stream() {
                if let Some(stream) = streams.iter().find(|s| s.name() == port.readable_name) {
                    if !positioned
                        .iter()
                        .any(|(_, o)| matches!(o, Operand::Stream(s) if s.name() == stream.name()))
                    {
                        positioned.push((index, Operand::Stream(stream.clone())));
                    }
                }
            } else {
                positioned.push((index, Operand::Scalar(port.clone())));
            }
        }
        let (inputs, outputs): (Vec<_>, Vec<_>) = positioned
            .into_iter()
            .map(|(_, operand)| operand)
            .partition(|o| o.direction() == PortDirection::In);
        Ok(inputs.into_iter().chain(outputs).collect())
    }

    /// `b32 fp_add(b32, b32)`, for diagnostics.
    pub fn signature(&self) -> String {
        let (inputs, outputs): (Vec<_>, Vec<_>) = self.scalar_ports().partition(|p| p.is_input());
        let widths = |ports: &[&LibraryPort]| {
            ports
                .iter()
                .map(|p| format!("b{}", p.width))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let result = match outputs.len() {
            0 => "void".to_string(),
            1 => widths(&outputs),
            _ => format!("({})", widths(&outputs)),
        };
        format!("{} {}({})", result, self.name, widths(&inputs))
    }
}
