use crate::error::Error;

/// Defines the various families of sketch and set operation classes.
///
/// A family defines a set of classes that share fundamental algorithms and behaviors. The classes
/// within a family may still differ by how they are stored and accessed.
pub(crate) struct Family {
    /// The byte ID for this family.
    pub id: u8,
    /// The name for this family.
    pub name: &'static str,
    /// The minimum preamble size for this family in longs (8-bytes integer).
    pub min_pre_longs: u8,
    /// The maximum preamble size for this family in longs (8-bytes integer).
    pub max_pre_longs: u8,
}

impl Family {
    /// The VarOpt family of weighted sampling sketches.
    pub const VAROPT: Family = Family {
        id: 13,
        name: "VAROPT",
        min_pre_longs: 1,
        max_pre_longs: 3,
    };
}

impl Family {
    pub fn validate_id(&self, family_id: u8) -> Result<(), Error> {
        if family_id != self.id {
            Err(Error::corruption("family mismatch")
                .with_context("family", self.name)
                .with_context("expected", self.id)
                .with_context("found", family_id))
        } else {
            Ok(())
        }
    }
}
