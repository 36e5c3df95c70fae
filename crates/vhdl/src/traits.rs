use dfc_common::{error::Result, traits::Document};

pub trait VhdlDocument {
    fn vhdl_doc(&self) -> Option<String>;
}

impl<T: Document> VhdlDocument for T {
    fn vhdl_doc(&self) -> Option<String> {
        self.doc().map(|doc| {
            doc.split_terminator('\n')
                .map(|line| format!("-- {}\n", line))
                .collect()
        })
    }
}

/// Generate trait for generic VHDL declarations.
pub trait Declare {
    /// Generate a VHDL declaration from self.
    fn declare(&self) -> Result<String>;
}

/// Allows users to specify the indent of scopes when declaring VHDL
///
/// E.g., when `pre` is set to two spaces
/// ```vhdl
/// component adder is
///   port(
///     a : in STD_LOGIC
///   );
/// end component;
/// ```
pub trait DeclareWithIndent {
    fn declare_with_indent(&self, indent_style: &str) -> Result<String>;
}

impl<T: DeclareWithIndent> Declare for T {
    fn declare(&self) -> Result<String> {
        self.declare_with_indent("  ")
    }
}
