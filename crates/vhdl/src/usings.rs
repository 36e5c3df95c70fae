use indexmap::{IndexMap, IndexSet};

use dfc_common::error::{Result, TryResult};

use crate::common::vhdl_name::VhdlName;

/// A list of VHDL usings, indexed by library
#[derive(Debug, Clone, Default)]
pub struct Usings(IndexMap<VhdlName, IndexSet<String>>);

impl Usings {
    pub fn new_empty() -> Usings {
        Usings(IndexMap::new())
    }

    /// The clauses every generated design unit needs.
    pub fn standard() -> Result<Usings> {
        let mut usings = Usings::new_empty();
        for package in ["STD_LOGIC_1164", "STD_LOGIC_ARITH", "STD_LOGIC_UNSIGNED"] {
            usings.add_using("IEEE", format!("{}.all", package))?;
        }
        Ok(usings)
    }

    /// If the set did not have this value present, `true` is returned.
    ///
    /// If the set did have this value present, `false` is returned.
    pub fn add_using(
        &mut self,
        library: impl TryResult<VhdlName>,
        using: impl Into<String>,
    ) -> Result<bool> {
        Ok(self
            .0
            .entry(library.try_result()?)
            .or_insert_with(IndexSet::new)
            .insert(using.into()))
    }

    pub fn usings(&self) -> &IndexMap<VhdlName, IndexSet<String>> {
        &self.0
    }

    /// Combine two usings
    pub fn combine(&mut self, other: &Usings) {
        for (library, usings) in other.usings() {
            self.0
                .entry(library.clone())
                .or_insert_with(IndexSet::new)
                .extend(usings.iter().cloned());
        }
    }
}

pub trait ListUsings {
    fn list_usings(&self) -> Result<Usings>;
}

pub trait DeclareUsings {
    fn declare_usings(&self) -> Result<String>;
}

/// Generate supertrait for VHDL with usings declarations. (E.g. use IEEE.STD_LOGIC_1164.all;)
impl<T: ListUsings> DeclareUsings for T {
    fn declare_usings(&self) -> Result<String> {
        let mut result = String::new();
        for (lib, usings) in self.list_usings()?.0 {
            // The working library is always visible.
            if !lib.as_str().eq_ignore_ascii_case("work") {
                result.push_str(&format!("library {};\n", lib));
            }
            for using in usings {
                result.push_str(&format!("use {}.{};\n", lib, using));
            }
        }
        Ok(result)
    }
}
