use std::fmt;

use serde::{Deserialize, Serialize};

use dfc_common::numbers::BitWidth;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PortDirection {
    In,
    Out,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortDirection::In => write!(f, "IN"),
            PortDirection::Out => write!(f, "OUT"),
        }
    }
}

/// The role of a library port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PortType {
    /// A scalar operand or result.
    Register,
    /// Only used for observation, never an operand.
    Debug,
    StreamChannel,
    StreamAddressBase,
    StreamAddressCount,
    StreamCrossClk,
    StreamStopAccess,
    StreamEnableAccess,
    StreamAddressClk,
    StreamAddressRdy,
    StreamAddressStall,
}

impl PortType {
    pub fn is_stream(&self) -> bool {
        !matches!(self, PortType::Register | PortType::Debug)
    }
}

fn default_port_type() -> PortType {
    PortType::Register
}

/// One port of a library entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LibraryPort {
    pub name: String,
    pub direction: PortDirection,
    pub width: BitWidth,
    #[serde(rename = "type", default = "default_port_type")]
    pub port_type: PortType,
    /// Groups stream ports into one stream; for scalars the source-level name.
    #[serde(default)]
    pub readable_name: String,
    /// Source data type label, e.g. `int` or `float`.
    #[serde(default)]
    pub data_type: String,
}

impl LibraryPort {
    pub fn new(name: impl Into<String>, direction: PortDirection, width: BitWidth) -> Self {
        let name = name.into();
        LibraryPort {
            readable_name: name.clone(),
            name,
            direction,
            width,
            port_type: PortType::Register,
            data_type: "int".to_string(),
        }
    }

    pub fn with_type(mut self, port_type: PortType) -> Self {
        self.port_type = port_type;
        self
    }

    pub fn with_readable_name(mut self, readable_name: impl Into<String>) -> Self {
        self.readable_name = readable_name.into();
        self
    }

    pub fn with_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = data_type.into();
        self
    }

    pub fn is_input(&self) -> bool {
        self.direction == PortDirection::In
    }

    pub fn is_output(&self) -> bool {
        self.direction == PortDirection::Out
    }

    pub fn is_debug(&self) -> bool {
        self.port_type == PortType::Debug
    }

    pub fn is_stream(&self) -> bool {
        self.port_type.is_stream()
    }
}
