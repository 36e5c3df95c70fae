//! Picks the library core that best fits an operation.
//!
//! Every operand (inputs in call order, then the result) contributes one
//! filter and one sort key. Float operands must match exactly. Integer
//! operands need a port at least as wide and prefer the narrowest such port;
//! when nothing fits, the integer requirement of the most recent operand is
//! relaxed into a preference for the closest larger width, then the one before
//! it, and so on.
use std::sync::Arc;

use log::{debug, info, warn};

use dfc_common::{
    error::{Error, Result},
    numbers::BitWidth,
};

use crate::{
    entry::{LibraryEntry, Operand},
    kind::CoreKind,
    store::Library,
};

/// The shape of one operand of the operation being resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperandShape {
    pub width: BitWidth,
    pub stream: bool,
    pub float: bool,
    /// Constants occupy a position but impose no requirement.
    pub constant: bool,
}

impl OperandShape {
    pub fn int(width: BitWidth) -> Self {
        OperandShape {
            width,
            stream: false,
            float: false,
            constant: false,
        }
    }

    pub fn float(width: BitWidth) -> Self {
        OperandShape {
            float: true,
            ..OperandShape::int(width)
        }
    }

    pub fn constant(width: BitWidth) -> Self {
        OperandShape {
            constant: true,
            ..OperandShape::int(width)
        }
    }

    pub fn stream(mut self) -> Self {
        self.stream = true;
        self
    }
}

/// An operation that needs a core.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CoreRequest {
    /// Printed form of the instruction, for diagnostics.
    pub instruction: String,
    pub kind: CoreKind,
    /// Operands in call order, the result last.
    pub operands: Vec<OperandShape>,
}

/// How one operand constrains the candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Requirement {
    None,
    Exact,
    AtLeast,
    Closest,
}

impl Requirement {
    fn for_operand(shape: &OperandShape, relaxed: bool) -> Self {
        match (shape.constant, shape.float, relaxed) {
            (true, _, _) => Requirement::None,
            (_, true, _) => Requirement::Exact,
            (_, false, false) => Requirement::AtLeast,
            (_, false, true) => Requirement::Closest,
        }
    }

    fn accepts(&self, wanted: BitWidth, actual: BitWidth) -> bool {
        match self {
            Requirement::Exact => actual == wanted,
            Requirement::AtLeast => actual >= wanted,
            Requirement::None | Requirement::Closest => true,
        }
    }

    /// Lower is better.
    fn rank(&self, wanted: BitWidth, actual: BitWidth) -> (bool, BitWidth) {
        match self {
            Requirement::None | Requirement::Exact => (false, 0),
            Requirement::AtLeast => (false, actual - wanted),
            Requirement::Closest if actual >= wanted => (false, actual - wanted),
            Requirement::Closest => (true, wanted - actual),
        }
    }
}

#[salsa::query_group(CoreStorage)]
pub trait CoreQueries {
    #[salsa::input]
    fn library(&self) -> Arc<Library>;

    /// Active cores of a kind with their operands, in library order.
    fn candidates(&self, kind: CoreKind) -> Result<Arc<Vec<(LibraryEntry, Vec<Operand>)>>>;

    fn resolve_core(&self, request: CoreRequest) -> Result<Arc<LibraryEntry>>;
}

fn candidates(db: &dyn CoreQueries, kind: CoreKind) -> Result<Arc<Vec<(LibraryEntry, Vec<Operand>)>>> {
    let library = db.library();
    let result = library
        .entries_of_kind(kind)
        .map(|entry| Ok((entry.clone(), entry.operands()?)))
        .collect::<Result<Vec<_>>>()?;
    Ok(Arc::new(result))
}

/// Candidates satisfying every requirement, best first. Ties keep library
/// order.
fn select<'a>(
    candidates: &'a [(LibraryEntry, Vec<Operand>)],
    request: &CoreRequest,
    requirements: &[Requirement],
) -> Vec<&'a LibraryEntry> {
    let mut matching: Vec<(&LibraryEntry, Vec<(bool, BitWidth)>)> = candidates
        .iter()
        .filter(|(_, operands)| {
            operands.len() == request.operands.len()
                && operands.iter().zip(&request.operands).zip(requirements).all(
                    |((operand, shape), requirement)| {
                        operand.is_stream() == shape.stream
                            && requirement.accepts(shape.width, operand.width())
                    },
                )
        })
        .map(|(entry, operands)| {
            let key = operands
                .iter()
                .zip(&request.operands)
                .zip(requirements)
                .map(|((operand, shape), requirement)| requirement.rank(shape.width, operand.width()))
                .collect();
            (entry, key)
        })
        .collect();
    matching.sort_by(|(_, a), (_, b)| a.cmp(b));
    matching.into_iter().map(|(entry, _)| entry).collect()
}

fn is_exact(entry: &LibraryEntry, request: &CoreRequest) -> Result<bool> {
    Ok(entry
        .operands()?
        .iter()
        .zip(&request.operands)
        .all(|(operand, shape)| shape.constant || operand.width() == shape.width))
}

fn resolve_core(db: &dyn CoreQueries, request: CoreRequest) -> Result<Arc<LibraryEntry>> {
    let candidates = db.candidates(request.kind)?;
    if candidates.is_empty() {
        return Err(Error::ResolutionError(format!(
            "The library has no active cores of kind {} for {}",
            request.kind, request.instruction
        )));
    }
    let count = request.operands.len();
    // Partial relaxation choices, one flag per operand. Strict is pushed last
    // so it is explored first, which makes the last operand relax first.
    let mut stack: Vec<Vec<bool>> = vec![vec![]];
    while let Some(relaxed) = stack.pop() {
        if relaxed.len() < count {
            let shape = &request.operands[relaxed.len()];
            if !shape.float && !shape.constant {
                let mut next = relaxed.clone();
                next.push(true);
                stack.push(next);
            }
            let mut next = relaxed;
            next.push(false);
            stack.push(next);
            continue;
        }
        let requirements: Vec<Requirement> = request
            .operands
            .iter()
            .zip(&relaxed)
            .map(|(shape, relaxed)| Requirement::for_operand(shape, *relaxed))
            .collect();
        match select(&candidates, &request, &requirements).first() {
            Some(entry) => {
                if relaxed.iter().any(|r| *r) {
                    warn!(
                        "Could not find an exact match for '{}'; relaxed the width requirements of operand(s) {:?}",
                        request.instruction,
                        relaxed
                            .iter()
                            .enumerate()
                            .filter(|(_, r)| **r)
                            .map(|(index, _)| index)
                            .collect::<Vec<_>>()
                    );
                }
                if is_exact(entry, &request)? {
                    info!(
                        "Using intrinsic '{}' for '{}'",
                        entry.signature(),
                        request.instruction
                    );
                } else {
                    warn!(
                        "Using intrinsic '{}' as closest corresponding intrinsic for '{}'",
                        entry.signature(),
                        request.instruction
                    );
                }
                return Ok(Arc::new((*entry).clone()));
            }
            None => debug!(
                "No core of kind {} matches '{}' with relaxation {:?}",
                request.kind, request.instruction, relaxed
            ),
        }
    }
    Err(Error::ResolutionError(format!(
        "Cannot find intrinsic for {}",
        request.instruction
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        port::PortDirection,
        test_utils::{scalar_core, stream_ports},
    };
    use pretty_assertions::assert_eq;

    #[salsa::database(CoreStorage)]
    #[derive(Default)]
    struct Database {
        storage: salsa::Storage<Database>,
    }

    impl salsa::Database for Database {}

    fn database(entries: Vec<LibraryEntry>) -> Result<Database> {
        let mut library = Library::default();
        for entry in entries {
            library.create_entry(entry)?;
        }
        let mut db = Database::default();
        db.set_library(Arc::new(library));
        Ok(db)
    }

    fn request(kind: CoreKind, operands: Vec<OperandShape>) -> CoreRequest {
        CoreRequest {
            instruction: "i32 %q = sdiv i32 %a, i32 %b".to_string(),
            kind,
            operands,
        }
    }

    fn modules(entries: &[(&str, &[u32])]) -> Vec<LibraryEntry> {
        entries
            .iter()
            .map(|(name, widths)| scalar_core(name, CoreKind::Module, widths, "int"))
            .collect()
    }

    #[test]
    fn wider_divider_is_accepted() -> Result<()> {
        let db = database(vec![scalar_core("div48", CoreKind::IntDiv, &[48, 48, 48], "int")])?;
        let ints = vec![OperandShape::int(32); 3];
        let core = db.resolve_core(request(CoreKind::IntDiv, ints.clone()))?;
        assert_eq!(core.name, "div48");
        // Deterministic.
        assert_eq!(db.resolve_core(request(CoreKind::IntDiv, ints))?.name, "div48");
        Ok(())
    }

    #[test]
    fn narrowest_satisfying_core_wins() -> Result<()> {
        let db = database(modules(&[
            ("m64", &[64, 64, 64]),
            ("m16", &[16, 16, 16]),
            ("m33", &[33, 33, 33]),
            ("m40", &[40, 40, 40]),
        ]))?;
        let core = db.resolve_core(request(CoreKind::Module, vec![OperandShape::int(32); 3]))?;
        assert_eq!(core.name, "m33");
        Ok(())
    }

    #[test]
    fn earlier_operands_weigh_more() -> Result<()> {
        let db = database(modules(&[("a", &[40, 32, 32]), ("b", &[32, 64, 64])]))?;
        let core = db.resolve_core(request(CoreKind::Module, vec![OperandShape::int(32); 3]))?;
        assert_eq!(core.name, "b");
        Ok(())
    }

    #[test]
    fn last_operand_relaxes_first() -> Result<()> {
        // Nothing is wide enough for a 32 bit result.
        let db = database(modules(&[("narrow", &[32, 32, 8]), ("closer", &[32, 32, 16])]))?;
        let core = db.resolve_core(request(CoreKind::Module, vec![OperandShape::int(32); 3]))?;
        assert_eq!(core.name, "closer");

        // The first operand cannot be satisfied either, so it relaxes too.
        let db = database(modules(&[("x", &[8, 32, 16]), ("y", &[16, 32, 16])]))?;
        let core = db.resolve_core(request(CoreKind::Module, vec![OperandShape::int(32); 3]))?;
        assert_eq!(core.name, "y");
        Ok(())
    }

    #[test]
    fn floats_never_relax() -> Result<()> {
        let db = database(vec![scalar_core("fp_add32", CoreKind::FpAdd, &[32, 32, 32], "float")])?;
        let shapes = vec![OperandShape::float(32), OperandShape::float(64), OperandShape::float(32)];
        assert_eq!(
            db.resolve_core(request(CoreKind::FpAdd, shapes)),
            Err(Error::ResolutionError(
                "Cannot find intrinsic for i32 %q = sdiv i32 %a, i32 %b".to_string()
            ))
        );
        let shapes = vec![OperandShape::float(32); 3];
        assert_eq!(db.resolve_core(request(CoreKind::FpAdd, shapes))?.name, "fp_add32");
        Ok(())
    }

    #[test]
    fn constants_impose_nothing() -> Result<()> {
        let db = database(modules(&[("m", &[32, 8, 32])]))?;
        let shapes = vec![OperandShape::int(32), OperandShape::constant(32), OperandShape::int(32)];
        assert_eq!(db.resolve_core(request(CoreKind::Module, shapes))?.name, "m");
        Ok(())
    }

    #[test]
    fn streams_must_line_up() -> Result<()> {
        let mut ports = LibraryEntry::standard_ports();
        ports.extend(stream_ports("A", PortDirection::In, 8, 1, 1));
        ports.extend(stream_ports("B", PortDirection::Out, 8, 1, 1));
        let splitter = LibraryEntry::new("split8", CoreKind::StreamSplitter, 1, ports);
        let db = database(vec![splitter])?;
        let shapes = vec![OperandShape::int(8).stream(), OperandShape::int(8).stream()];
        assert_eq!(db.resolve_core(request(CoreKind::StreamSplitter, shapes))?.name, "split8");
        let shapes = vec![OperandShape::int(8), OperandShape::int(8).stream()];
        assert!(db.resolve_core(request(CoreKind::StreamSplitter, shapes)).is_err());
        Ok(())
    }

    #[test]
    fn missing_kind() -> Result<()> {
        let db = database(vec![])?;
        assert!(matches!(
            db.resolve_core(request(CoreKind::IntMod, vec![OperandShape::int(8); 3])),
            Err(Error::ResolutionError(_))
        ));
        Ok(())
    }
}
