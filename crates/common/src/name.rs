use std::{convert::TryFrom, fmt, ops::Deref, str::FromStr};

use crate::{
    error::{Error, Result},
    traits::Identify,
};

/// Type-safe wrapper for valid names of components, streams and values.
///
/// The following rules apply for valid names
/// - The name is non-empty
/// - The name consists of letter, number and underscores
/// - The name does not start or end with an underscore
/// - The name does not start with a digit
/// - The name does not contain double underscores
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Name(String);

impl Name {
    /// Constructs a new name wrapper. Returns an error when the provided name
    /// is invalid.
    pub fn try_new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        match name.chars().next() {
            None => Err(Error::InvalidArgument("name cannot be empty".to_string())),
            Some(first) if first.is_ascii_digit() => Err(Error::InvalidArgument(format!(
                "{}: name cannot start with a digit",
                name
            ))),
            _ if name.starts_with('_') || name.ends_with('_') => Err(Error::InvalidArgument(
                format!("{}: name cannot start or end with an underscore", name),
            )),
            _ if name.contains("__") => Err(Error::InvalidArgument(format!(
                "{}: name cannot contain two or more consecutive underscores",
                name
            ))),
            _ if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') => {
                Err(Error::InvalidArgument(format!(
                    "{}: name must consist of letters, numbers, and/or underscores",
                    name
                )))
            }
            _ => Ok(Name(name)),
        }
    }

    /// Turns an arbitrary front-end identifier (e.g. `%t.12`) into a valid
    /// name by replacing every invalid character with an underscore and
    /// prefixing names that would otherwise start with a digit.
    pub fn sanitized(raw: impl AsRef<str>) -> Result<Self> {
        let mut result = String::new();
        for c in raw.as_ref().chars() {
            let c = if c.is_ascii_alphanumeric() { c } else { '_' };
            if !(c == '_' && (result.is_empty() || result.ends_with('_'))) {
                result.push(c);
            }
        }
        while result.ends_with('_') {
            result.pop();
        }
        if result.starts_with(|c: char| c.is_ascii_digit()) {
            result.insert_str(0, "v_");
        }
        Name::try_new(result)
    }
}

impl From<Name> for String {
    fn from(name: Name) -> Self {
        name.0
    }
}

impl From<&Name> for String {
    fn from(name: &Name) -> Self {
        name.0.clone()
    }
}

impl Deref for Name {
    type Target = str;
    fn deref(&self) -> &str {
        self.0.as_ref()
    }
}

impl TryFrom<&str> for Name {
    type Error = Error;
    fn try_from(str: &str) -> Result<Self> {
        Name::try_new(str)
    }
}

impl TryFrom<&String> for Name {
    type Error = Error;
    fn try_from(str: &String) -> Result<Self> {
        Name::try_new(str)
    }
}

impl TryFrom<String> for Name {
    type Error = Error;
    fn try_from(string: String) -> Result<Self> {
        Name::try_new(string)
    }
}

impl FromStr for Name {
    type Err = Error;
    fn from_str(str: &str) -> Result<Self> {
        Name::try_new(str)
    }
}

impl PartialEq<str> for Name {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl AsRef<str> for Name {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub trait NameSelf: Identify {
    fn name(&self) -> &Name;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_rules() {
        assert!(Name::try_new("valid_name1").is_ok());
        assert!(Name::try_new("").is_err());
        assert!(Name::try_new("1st").is_err());
        assert!(Name::try_new("_x").is_err());
        assert!(Name::try_new("x_").is_err());
        assert!(Name::try_new("a__b").is_err());
        assert!(Name::try_new("a.b").is_err());
    }

    #[test]
    fn sanitize_front_end_names() -> Result<()> {
        assert_eq!(Name::sanitized("%t.12")?.as_ref(), "t_12");
        assert_eq!(Name::sanitized("3x")?.as_ref(), "v_3x");
        assert_eq!(Name::sanitized("a..b_")?.as_ref(), "a_b");
        assert!(Name::sanitized("%%").is_err());
        Ok(())
    }
}
