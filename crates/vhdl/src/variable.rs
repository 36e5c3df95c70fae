use std::fmt;

use dfc_common::numbers::BitWidth;

use crate::{common::vhdl_name::VhdlName, process::ProcessId};

/// Index of a variable in its [`Entity`](crate::entity::Entity).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(pub(crate) usize);

impl VarId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    In,
    Out,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::In => write!(f, "in"),
            Mode::Out => write!(f, "out"),
        }
    }
}

/// The kinds of named storage and enumerants the object model knows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableKind {
    Port(Mode),
    Signal,
    /// A variable local to one process, assigned with `:=`.
    ProcessVariable(ProcessId),
    /// `constant NAME : type := value;` with the rendered value.
    NamedConstant(String),
    /// An integer generic of the entity, with its default.
    Generic(i64),
    /// A state signal with its own enumerated type. The first state is the
    /// reset state.
    StateVar(Vec<VhdlName>),
    /// An array signal of `contents.len()` elements (a power of two), each
    /// `width` bits wide.
    Array(Vec<i64>),
}

/// A named, ownable storage location or enumerant.
#[derive(Debug, Clone)]
pub struct Variable {
    pub(crate) name: VhdlName,
    pub(crate) width: BitWidth,
    pub(crate) signed: bool,
    pub(crate) kind: VariableKind,
    pub(crate) declared: bool,
    pub(crate) read: bool,
    pub(crate) written: bool,
}

impl Variable {
    pub(crate) fn new(name: VhdlName, width: BitWidth, kind: VariableKind) -> Self {
        Variable {
            name,
            width,
            signed: false,
            kind,
            declared: false,
            read: false,
            written: false,
        }
    }

    pub fn name(&self) -> &VhdlName {
        &self.name
    }

    /// Width in bits. For arrays this is the element width.
    pub fn width(&self) -> BitWidth {
        self.width
    }

    pub fn is_signed(&self) -> bool {
        self.signed
    }

    pub fn kind(&self) -> &VariableKind {
        &self.kind
    }

    pub fn is_declared(&self) -> bool {
        self.declared
    }

    pub fn is_read(&self) -> bool {
        self.read
    }

    pub fn is_written(&self) -> bool {
        self.written
    }

    pub fn mode(&self) -> Option<Mode> {
        match self.kind {
            VariableKind::Port(mode) => Some(mode),
            _ => None,
        }
    }

    pub fn is_port(&self) -> bool {
        self.mode().is_some()
    }

    pub fn is_input_port(&self) -> bool {
        self.mode() == Some(Mode::In)
    }

    pub fn is_output_port(&self) -> bool {
        self.mode() == Some(Mode::Out)
    }

    /// Whether statements may drive this variable at all.
    pub fn is_storage(&self) -> bool {
        !matches!(
            self.kind,
            VariableKind::NamedConstant(_) | VariableKind::Generic(_) | VariableKind::Port(Mode::In)
        )
    }

    /// The VHDL type of this variable as used in declarations.
    pub fn type_name(&self) -> String {
        match &self.kind {
            VariableKind::Generic(_) => "integer".to_string(),
            VariableKind::StateVar(_) => format!("{}_STATE_TYPE", self.name),
            VariableKind::Array(_) => format!("{}_TYPE", self.name),
            _ => vector_type(self.width),
        }
    }
}

/// `STD_LOGIC` or `STD_LOGIC_VECTOR(w-1 downto 0)`.
pub fn vector_type(width: BitWidth) -> String {
    if width == 1 {
        "STD_LOGIC".to_string()
    } else {
        format!("STD_LOGIC_VECTOR({} downto 0)", width - 1)
    }
}
