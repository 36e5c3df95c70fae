//! The `HelperFunctions` package every generated design unit uses.
//!
//! Arithmetic helpers take their operands at a common width and return the
//! low `size` bits of the result. Comparisons interpret their operands as
//! signed or unsigned explicitly, so the result never depends on which
//! arithmetic package is visible.
use crate::{entity::GENERATOR, usings::{DeclareUsings, ListUsings, Usings}};

use dfc_common::error::Result;

pub const HELPER_PACKAGE: &str = "HelperFunctions";

struct HelperPackage;

impl ListUsings for HelperPackage {
    fn list_usings(&self) -> Result<Usings> {
        let mut usings = Usings::new_empty();
        usings.add_using("IEEE", "STD_LOGIC_1164.all")?;
        usings.add_using("IEEE", "NUMERIC_STD.all")?;
        Ok(usings)
    }
}

const ARITHMETIC: [(&str, &str); 3] = [("DFC_ADD", "+"), ("DFC_SUB", "-"), ("DFC_MUL", "*")];

const COMPARISONS: [(&str, &str); 4] = [("LT", "<"), ("GT", ">"), ("LTE", "<="), ("GTE", ">=")];

fn arithmetic_signature(name: &str) -> String {
    format!(
        "function {}(a, b : STD_LOGIC_VECTOR; size : integer) return STD_LOGIC_VECTOR",
        name
    )
}

fn comparison_signature(name: &str) -> String {
    format!(
        "function {}(a, b : STD_LOGIC_VECTOR; size : integer) return boolean",
        name
    )
}

fn comparisons() -> impl Iterator<Item = (String, &'static str, &'static str)> {
    ["SIGNED", "UNSIGNED"].into_iter().flat_map(|kind| {
        COMPARISONS.iter().map(move |(suffix, operator)| {
            (format!("DFC_{}{}", &kind[..1], suffix), kind, *operator)
        })
    })
}

/// Renders the package declaration and body.
pub fn helper_package() -> Result<String> {
    let mut declarations = String::new();
    let mut bodies = String::new();
    for (name, operator) in ARITHMETIC {
        let signature = arithmetic_signature(name);
        declarations.push_str(&format!("  {};\n", signature));
        let result = if operator == "*" {
            "STD_LOGIC_VECTOR(UNSIGNED(a) * UNSIGNED(b))".to_string()
        } else {
            format!("STD_LOGIC_VECTOR(UNSIGNED(a) {} UNSIGNED(b))", operator)
        };
        bodies.push_str(&format!(
            "  {} is\n    variable result : STD_LOGIC_VECTOR({}'length - 1 downto 0);\n  begin\n    result := {};\n    return result(size - 1 downto 0);\n  end {};\n\n",
            signature,
            if operator == "*" { "a'length + b" } else { "a" },
            result,
            name
        ));
    }
    for (name, kind, operator) in comparisons() {
        let signature = comparison_signature(&name);
        declarations.push_str(&format!("  {};\n", signature));
        bodies.push_str(&format!(
            "  {} is\n  begin\n    return {}(a) {} {}(b);\n  end {};\n\n",
            signature, kind, operator, kind, name
        ));
    }
    Ok(format!(
        "-- This file was automatically generated by {}, DO NOT EDIT\n{}\npackage {} is\n{}end {};\n\npackage body {} is\n\n{}end {};\n",
        GENERATOR,
        HelperPackage.declare_usings()?,
        HELPER_PACKAGE,
        declarations,
        HELPER_PACKAGE,
        HELPER_PACKAGE,
        bodies,
        HELPER_PACKAGE
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declares_every_helper() -> Result<()> {
        let package = helper_package()?;
        for name in [
            "DFC_ADD", "DFC_SUB", "DFC_MUL", "DFC_SLT", "DFC_SGT", "DFC_SLTE", "DFC_SGTE",
            "DFC_ULT", "DFC_UGT", "DFC_ULTE", "DFC_UGTE",
        ] {
            assert!(
                package.contains(&format!("function {}(", name)),
                "missing {}",
                name
            );
        }
        assert!(package.contains("package body HelperFunctions is"));
        assert!(package.contains("return SIGNED(a) < SIGNED(b);"));
        Ok(())
    }
}
