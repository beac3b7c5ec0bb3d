//! # Defmap Store
//!
//! Project metadata stores: compact id sets, the global-name↔id ref
//! tree, per-unit id allocation, the incremental unit-storage pipeline,
//! and two interchangeable backends — in-memory and persistent.
//!
//! ## Tables
//!
//! ```text
//! source ──srcToUnit──> unit id ──srcDefs──> def ids
//!                                              │
//!              defs / defSig / defDoc / defMems / defUses
//!              defRelsFrom[r]  ⇄  defRelsTo[r]
//!              locUseSrcs / gloUseSrcs   (reverse-use index)
//!              nameIndex[kind]           (ordered, lowercased)
//!              refsByName ⇄ refsById     (project ref tree)
//! ```
//!
//! Ids are partitioned per unit: `defId = unitId * 0x10000 + rawDefId`,
//! exported defs in raw `[1, 16384]`, non-exported above. Re-indexing a
//! unit reuses ids for defs whose global name is unchanged and purges
//! the ids that disappeared.

mod alloc;
mod idset;
mod io;
mod mem;
mod persistent;
mod query;
mod records;
mod reftree;
mod store;
mod unit;

pub use alloc::{
    id_to_string, is_exported_id, raw_def_id, to_def_id, to_unit_id, IdAllocator, MAX_DEF_ID,
    MAX_EXP_ID,
};
pub use idset::{Builder as IdSetBuilder, IdSet};
pub use mem::MemStore;
pub use persistent::RedbStore;
pub use query::{CancelToken, Locality, Query};
pub use reftree::{EphemeralRefTree, RefTree};
pub use store::ProjectStore;

pub use defmap_model::{Error, Result};
