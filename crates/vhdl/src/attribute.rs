use crate::common::vhdl_name::VhdlName;

/// Keeps a signal from being optimized away or retimed by synthesis.
pub const SYN_KEEP: &str = "syn_keep";
/// Marks a port as a debug port.
pub const PORT_TYPE: &str = "port_type";
/// The source-level name of a port.
pub const READABLE_NAME: &str = "readable_name";
/// Requests a RAM implementation for an array.
pub const SYN_RAMSTYLE: &str = "syn_ramstyle";

/// `attribute <attribute> of <object> : signal is <value>;`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSpec {
    pub(crate) attribute: VhdlName,
    pub(crate) object: VhdlName,
    /// Already rendered, e.g. `true` or `"DEBUG"`.
    pub(crate) value: String,
}

impl AttributeSpec {
    pub fn attribute(&self) -> &VhdlName {
        &self.attribute
    }

    pub fn object(&self) -> &VhdlName {
        &self.object
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub(crate) fn declare(&self) -> String {
        format!(
            "attribute {} of {} : signal is {};",
            self.attribute, self.object, self.value
        )
    }
}

/// Quotes a string attribute value.
pub fn string_value(value: impl AsRef<str>) -> String {
    format!("\"{}\"", value.as_ref())
}
