use defmap_model::{Error, GlobalRef, Result};

use crate::idset::IdSet;
use crate::reftree::RefTree;

/// Def ids have the form `unitId * MAX_DEF_ID + rawDefId`. Exported defs
/// have raw ids in `[1, MAX_EXP_ID]`; non-exported defs in
/// `(MAX_EXP_ID, MAX_DEF_ID)`. These values are load-bearing for stored
/// ids and must not change.
pub const MAX_EXP_ID: i64 = 16384;
pub const MAX_DEF_ID: i64 = 65536;

pub fn to_def_id(unit_id: i64, raw_def_id: i64) -> i64 {
    unit_id * MAX_DEF_ID + raw_def_id
}

pub fn to_unit_id(def_id: i64) -> i64 {
    def_id / MAX_DEF_ID
}

pub fn raw_def_id(def_id: i64) -> i64 {
    def_id % MAX_DEF_ID
}

/// Whether `def_id` sits in its unit's exported band.
pub fn is_exported_id(def_id: i64) -> bool {
    raw_def_id(def_id) <= MAX_EXP_ID
}

/// Renders a def id as `exp:unit:raw` or `unit:raw` for diagnostics.
pub fn id_to_string(def_id: i64) -> String {
    let unit = to_unit_id(def_id);
    let raw = raw_def_id(def_id);
    if raw > MAX_EXP_ID {
        format!("{unit}:{}", raw - MAX_EXP_ID)
    } else {
        format!("exp:{unit}:{raw}")
    }
}

/// Assigns def ids within one compilation unit during a single index
/// pass. Exported ids are registered against the project ref tree and
/// skip over the unit's prior ids, so re-indexing a unit keeps stable
/// ids for defs whose global ref is unchanged. Non-exported ids are
/// handed out sequentially against the per-source ephemeral tree.
pub struct IdAllocator<'a> {
    unit_id: i64,
    prior: &'a IdSet,
    next_exported: i64,
    next_local: i64,
}

impl<'a> IdAllocator<'a> {
    /// `prior` is the full set of ids this unit owned after its previous
    /// index pass (both bands; they are disjoint).
    pub fn new(unit_id: i64, prior: &'a IdSet) -> IdAllocator<'a> {
        let mut alloc = IdAllocator {
            unit_id,
            prior,
            next_exported: 0,
            next_local: to_def_id(unit_id, MAX_EXP_ID) + 1,
        };
        alloc.next_exported = alloc.skip_prior(to_def_id(unit_id, 0));
        alloc
    }

    fn skip_prior(&self, after: i64) -> i64 {
        let mut id = after + 1;
        while self.prior.contains(id) {
            id += 1;
        }
        id
    }

    /// Resolves an exported def id for `gref` against the project ref
    /// tree, assigning the next free exported id if the ref is new.
    pub fn resolve_exported(&mut self, refs: &mut dyn RefTree, gref: &GlobalRef) -> Result<i64> {
        if let Some(id) = refs.get(gref)? {
            return Ok(id);
        }
        if self.next_exported > to_def_id(self.unit_id, MAX_EXP_ID) {
            return Err(Error::CapacityExceeded {
                unit: self.unit_id,
                band: "exported",
                limit: MAX_EXP_ID as u32,
            });
        }
        let id = refs.resolve(gref, self.next_exported)?;
        if id == self.next_exported {
            self.next_exported = self.skip_prior(id);
        }
        Ok(id)
    }

    /// Resolves a non-exported def id for `gref` against the per-source
    /// ephemeral ref tree.
    pub fn resolve_local(&mut self, refs: &mut dyn RefTree, gref: &GlobalRef) -> Result<i64> {
        if let Some(id) = refs.get(gref)? {
            return Ok(id);
        }
        if self.next_local >= to_def_id(self.unit_id, MAX_DEF_ID) {
            return Err(Error::CapacityExceeded {
                unit: self.unit_id,
                band: "non-exported",
                limit: (MAX_DEF_ID - MAX_EXP_ID - 1) as u32,
            });
        }
        let id = refs.resolve(gref, self.next_local)?;
        if id == self.next_local {
            self.next_local += 1;
        }
        Ok(id)
    }
}
