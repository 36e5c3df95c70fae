use std::{convert::TryFrom, fmt, ops::Deref, str::FromStr};

use dfc_common::{
    error::{Error, Result},
    name::Name,
};
use uncased::{AsUncased, Uncased};

/// Words that cannot be used as identifiers in the generated VHDL.
const RESERVED: &[&str] = &[
    "abs", "access", "after", "alias", "all", "and", "architecture", "array", "assert",
    "attribute", "begin", "block", "body", "buffer", "bus", "case", "component",
    "configuration", "constant", "disconnect", "downto", "else", "elsif", "end", "entity",
    "exit", "file", "for", "function", "generate", "generic", "group", "guarded", "if",
    "impure", "in", "inertial", "inout", "is", "label", "library", "linkage", "literal",
    "loop", "map", "mod", "nand", "new", "next", "nor", "not", "null", "of", "on", "open",
    "or", "others", "out", "package", "port", "postponed", "procedure", "process", "pure",
    "range", "record", "register", "reject", "rem", "report", "return", "rol", "ror",
    "select", "severity", "signal", "shared", "sla", "sll", "sra", "srl", "subtype", "then",
    "to", "transport", "type", "unaffected", "units", "until", "use", "variable", "wait",
    "when", "while", "with", "xnor", "xor",
];

/// Type-safe wrapper for valid VHDL identifiers.
///
/// VHDL identifiers are case-insensitive, so equality and hashing ignore case.
/// On top of the [`Name`] rules, a VHDL name cannot be a reserved word.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VhdlName(Uncased<'static>);

impl VhdlName {
    /// Constructs a new name wrapper. Returns an error when the provided name
    /// is invalid.
    pub fn try_new(name: impl Into<String>) -> Result<Self> {
        let name = Name::try_new(name)?;
        if is_reserved(&name) {
            Err(Error::InvalidArgument(format!(
                "{}: name is a reserved word",
                name
            )))
        } else {
            Ok(VhdlName(Uncased::from(String::from(name))))
        }
    }

    /// Builds a valid identifier from an arbitrary front-end name. Reserved
    /// words receive a `_v` suffix.
    pub fn sanitized(raw: impl AsRef<str>) -> Result<Self> {
        let name = Name::sanitized(raw)?;
        if is_reserved(&name) {
            VhdlName::try_new(format!("{}_v", name))
        } else {
            VhdlName::try_new(name)
        }
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

fn is_reserved(name: &str) -> bool {
    RESERVED
        .iter()
        .any(|word| word.as_uncased() == name.as_uncased())
}

impl From<VhdlName> for String {
    fn from(name: VhdlName) -> Self {
        name.0.into_string()
    }
}

impl From<&VhdlName> for String {
    fn from(name: &VhdlName) -> Self {
        name.0.as_str().to_string()
    }
}

impl TryFrom<&Name> for VhdlName {
    type Error = Error;
    fn try_from(name: &Name) -> Result<Self> {
        VhdlName::try_new(name.as_ref())
    }
}

impl TryFrom<Name> for VhdlName {
    type Error = Error;
    fn try_from(name: Name) -> Result<Self> {
        VhdlName::try_new(name)
    }
}

impl Deref for VhdlName {
    type Target = str;
    fn deref(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<&str> for VhdlName {
    type Error = Error;
    fn try_from(str: &str) -> Result<Self> {
        VhdlName::try_new(str)
    }
}

impl TryFrom<&String> for VhdlName {
    type Error = Error;
    fn try_from(str: &String) -> Result<Self> {
        VhdlName::try_new(str.as_str())
    }
}

impl TryFrom<String> for VhdlName {
    type Error = Error;
    fn try_from(string: String) -> Result<Self> {
        VhdlName::try_new(string)
    }
}

impl TryFrom<&VhdlName> for VhdlName {
    type Error = Error;
    fn try_from(name: &VhdlName) -> Result<Self> {
        Ok(name.clone())
    }
}

impl FromStr for VhdlName {
    type Err = Error;
    fn from_str(str: &str) -> Result<Self> {
        VhdlName::try_new(str)
    }
}

impl fmt::Display for VhdlName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trait for objects carrying a VHDL name.
pub trait VhdlNameSelf {
    fn vhdl_name(&self) -> &VhdlName;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive() -> Result<()> {
        assert_eq!(VhdlName::try_new("Done")?, VhdlName::try_new("done")?);
        assert_eq!(VhdlName::try_new("Done")?.to_string(), "Done");
        Ok(())
    }

    #[test]
    fn reserved_words() -> Result<()> {
        assert!(VhdlName::try_new("signal").is_err());
        assert!(VhdlName::try_new("Process").is_err());
        assert_eq!(VhdlName::sanitized("out")?.as_str(), "out_v");
        assert_eq!(VhdlName::sanitized("%sum.2")?.as_str(), "sum_2");
        Ok(())
    }
}
