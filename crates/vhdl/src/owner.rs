//! Single-driver bookkeeping.
//!
//! Every storage variable (or bit-range view of one) is driven by at most one
//! [`Owner`]. Views are not separate objects: a claim records the variable and
//! the bit span it covers, and overlapping spans must agree on their owner.
use dfc_common::{
    error::{Error, Result},
    numbers::BitWidth,
};

use crate::{component::InstanceId, process::ProcessId, variable::VarId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OwnerId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OwnerKind {
    Entity,
    Process(ProcessId),
    /// A concurrent assignment.
    Statement,
    Instance(InstanceId),
    /// A fallback driver that gives way to the first real driver.
    Default,
}

/// Anything that may drive a value.
#[derive(Debug, Clone)]
pub struct Owner {
    label: String,
    kind: OwnerKind,
    parent: Option<OwnerId>,
    transferable: bool,
}

impl Owner {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> OwnerKind {
        self.kind
    }

    pub fn parent(&self) -> Option<OwnerId> {
        self.parent
    }

    /// Whether this owner hands its values over to a new owner on request.
    pub fn is_transferable(&self) -> bool {
        self.transferable
    }
}

/// A claim of one owner on the bits `high downto low` of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Driver {
    pub var: VarId,
    pub high: BitWidth,
    pub low: BitWidth,
    pub owner: OwnerId,
}

impl Driver {
    fn overlaps(&self, high: BitWidth, low: BitWidth) -> bool {
        (self.low <= high && high <= self.high) || (low <= self.high && self.high <= high)
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Ownership {
    owners: Vec<Owner>,
    drivers: Vec<Driver>,
}

impl Ownership {
    pub(crate) fn add_owner(
        &mut self,
        label: impl Into<String>,
        kind: OwnerKind,
        parent: Option<OwnerId>,
        transferable: bool,
    ) -> OwnerId {
        self.owners.push(Owner {
            label: label.into(),
            kind,
            parent,
            transferable,
        });
        OwnerId(self.owners.len() - 1)
    }

    pub(crate) fn owner(&self, id: OwnerId) -> Result<&Owner> {
        self.owners
            .get(id.0)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown owner {}", id.0)))
    }

    /// Describes an owner and all of its parents, innermost first.
    pub(crate) fn chain(&self, id: OwnerId) -> String {
        let mut parts = vec![];
        let mut current = Some(id);
        while let Some(owner) = current.and_then(|id| self.owners.get(id.0)) {
            parts.push(owner.label.clone());
            current = owner.parent;
        }
        parts.join(" in ")
    }

    /// Claims `high downto low` of `var` for `owner`.
    ///
    /// Returns the transferable owners that lost their claim on `var`.
    pub(crate) fn claim(
        &mut self,
        var: VarId,
        description: &str,
        high: BitWidth,
        low: BitWidth,
        owner: OwnerId,
    ) -> Result<Vec<OwnerId>> {
        let mut released = vec![];
        for driver in self
            .drivers
            .iter()
            .filter(|d| d.var == var && d.owner != owner && d.overlaps(high, low))
        {
            if self.owner(driver.owner)?.transferable {
                released.push(driver.owner);
            } else {
                return Err(Error::DriverConflict(format!(
                    "{} is driven by {} and cannot also be driven by {}",
                    description,
                    self.chain(driver.owner),
                    self.chain(owner)
                )));
            }
        }
        self.drivers
            .retain(|d| !(d.var == var && released.contains(&d.owner)));
        let claim = Driver {
            var,
            high,
            low,
            owner,
        };
        if !self.drivers.contains(&claim) {
            self.drivers.push(claim);
        }
        Ok(released)
    }

    pub(crate) fn drivers_of(&self, var: VarId) -> impl Iterator<Item = &Driver> {
        self.drivers.iter().filter(move |d| d.var == var)
    }

    pub(crate) fn owned_by(&self, owner: OwnerId) -> impl Iterator<Item = &Driver> {
        self.drivers.iter().filter(move |d| d.owner == owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Ownership, OwnerId, OwnerId, OwnerId) {
        let mut ownership = Ownership::default();
        let entity = ownership.add_owner("entity 'top'", OwnerKind::Entity, None, false);
        let a = ownership.add_owner("process 'a'", OwnerKind::Process(ProcessId(0)), Some(entity), false);
        let b = ownership.add_owner("process 'b'", OwnerKind::Process(ProcessId(1)), Some(entity), false);
        (ownership, entity, a, b)
    }

    #[test]
    fn disjoint_ranges_may_have_different_owners() -> Result<()> {
        let (mut ownership, _, a, b) = setup();
        ownership.claim(VarId(0), "x(3 downto 0)", 3, 0, a)?;
        ownership.claim(VarId(0), "x(7 downto 4)", 7, 4, b)?;
        assert_eq!(ownership.drivers_of(VarId(0)).count(), 2);
        Ok(())
    }

    #[test]
    fn overlapping_ranges_conflict() -> Result<()> {
        let (mut ownership, _, a, b) = setup();
        ownership.claim(VarId(0), "x(5 downto 2)", 5, 2, a)?;
        let err = ownership.claim(VarId(0), "x", 7, 0, b).unwrap_err();
        assert_eq!(
            err,
            Error::DriverConflict(
                "x is driven by process 'a' in entity 'top' and cannot also be driven by process 'b' in entity 'top'"
                    .to_string()
            )
        );
        // Contained the other way around.
        assert!(ownership.claim(VarId(0), "x(3)", 3, 3, b).is_err());
        Ok(())
    }

    #[test]
    fn transferable_owner_gives_way() -> Result<()> {
        let (mut ownership, entity, a, _) = setup();
        let default = ownership.add_owner("default driver", OwnerKind::Default, Some(entity), true);
        ownership.claim(VarId(1), "y", 0, 0, default)?;
        let released = ownership.claim(VarId(1), "y", 0, 0, a)?;
        assert_eq!(released, vec![default]);
        assert_eq!(ownership.drivers_of(VarId(1)).next().map(|d| d.owner), Some(a));
        Ok(())
    }

    #[test]
    fn same_owner_may_claim_twice() -> Result<()> {
        let (mut ownership, _, a, _) = setup();
        ownership.claim(VarId(2), "z", 3, 0, a)?;
        ownership.claim(VarId(2), "z", 3, 0, a)?;
        assert_eq!(ownership.owned_by(a).count(), 1);
        Ok(())
    }
}
