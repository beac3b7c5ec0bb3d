use std::sync::Arc;

use crate::def::{Def, Doc, Sig, Use};
use crate::error::Result;
use crate::refs::GlobalRef;
use crate::source::Source;

/// A non-owning handle to the project store a record came from. Records
/// hold one of these for lazy loads; they never keep the store alive on
/// their own (stores hand them out from a weak self-reference).
pub type ProjectHandle = Arc<dyn Project>;

/// The read surface a [`Def`] needs from the store that owns it. The full
/// store API (queries, writers, reverse-use lookups) layers on top of
/// this seam in the store crate.
pub trait Project: Send + Sync {
    /// A human-readable name for this project.
    fn name(&self) -> &str;

    /// Returns the def with id `id`, failing with `NoSuchDef` if absent.
    fn def(&self, id: i64) -> Result<Def>;

    /// Returns the global ref registered for `id`, if `id` names an
    /// exported def.
    fn ref_for(&self, id: i64) -> Result<Option<GlobalRef>>;

    /// Returns the defs nested immediately inside `id`; empty if none.
    fn defs_in(&self, id: i64) -> Result<Vec<Def>>;

    /// Returns the uses nested directly in the body of `id` (not those
    /// inside nested defs); empty if none.
    fn uses_in(&self, id: i64) -> Result<Vec<Use>>;

    fn sig(&self, id: i64) -> Result<Option<Sig>>;

    fn doc(&self, id: i64) -> Result<Option<Doc>>;

    /// Returns the source from which `id` originates.
    fn source(&self, id: i64) -> Result<Source>;

    /// Renders `id` for diagnostics. Stores that partition ids override
    /// this with a structured form.
    fn id_to_string(&self, id: i64) -> String {
        id.to_string()
    }
}
