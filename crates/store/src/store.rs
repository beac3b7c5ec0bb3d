use std::collections::BTreeMap;

use defmap_model::{Def, Element, GlobalRef, Project, Ref, Relation, Result, Source};

use crate::query::{CancelToken, Query};

/// A project's metadata store. Extends the [`Project`] lazy-load seam
/// with the bulk read surface; writes go through the
/// `defmap_extract::UnitSink` each store also implements.
pub trait ProjectStore: Project {
    /// All top-level (outerless) defs in this project.
    fn top_level_defs(&self) -> Result<Vec<Def>>;

    /// When `source` was last indexed (millis since epoch), or 0 if it
    /// is unknown to this store.
    fn last_indexed(&self, source: &Source) -> Result<i64>;

    /// All defs extracted from `source`; fails with `UnknownSource` if
    /// the source was never indexed.
    fn source_defs(&self, source: &Source) -> Result<Vec<Def>>;

    /// The def registered for `gref`, if this project has one.
    fn def_by_ref(&self, gref: &GlobalRef) -> Result<Option<Def>>;

    /// The refs `def_id` points at via `relation`.
    fn relations_from(&self, relation: Relation, def_id: i64) -> Result<Vec<Ref>>;

    /// The defs of this project that point at `target` via `relation`.
    fn relations_to(&self, relation: Relation, target: &Ref) -> Result<Vec<Def>>;

    /// Every known use of `def`, grouped by source, as use offsets. The
    /// def's own defining unit is always searched; other units come from
    /// the reverse-use index.
    fn uses_of(&self, def: &Def, cancel: &CancelToken) -> Result<BTreeMap<Source, Vec<u32>>>;

    /// Adds the defs of this store matching `query` to `into`.
    /// `exported_only` restricts to exported defs; stale index entries
    /// are skipped.
    fn find(
        &self,
        query: &Query,
        exported_only: bool,
        into: &mut Vec<Def>,
        cancel: &CancelToken,
    ) -> Result<()>;

    /// Delivers every def in `source`, each immediately followed by the
    /// uses nested directly inside it. Returns false if `source` is
    /// unknown to this store.
    fn visit(&self, source: &Source, sink: &mut dyn FnMut(&dyn Element)) -> Result<bool> {
        if self.last_indexed(source)? == 0 {
            return Ok(false);
        }
        for def in self.source_defs(source)? {
            sink(&def);
            for us in self.uses_in(def.id)? {
                sink(&us);
            }
        }
        Ok(true)
    }

    /// Flushes pending writes and releases handles. Every operation
    /// after close fails with `StorageError::Closed`.
    fn close(&self) -> Result<()>;
}
