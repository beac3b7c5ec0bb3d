//! # Defmap Codex
//!
//! The entry point for cross-project queries. A codex groups a set of
//! related project stores — generally a leaf project and its
//! dependencies — in precedence order and resolves inter-project
//! references against them: each store is consulted in turn and the
//! first to claim knowledge of a name wins. This mirrors a classpath
//! lookup; it only matters when multiple projects claim the same global
//! name, which happens more often than one would hope.

use std::sync::Arc;

use defmap_model::{Def, Element, Ref, Result, Source};
use defmap_store::{CancelToken, ProjectStore, Query};

/// An ordered federation of project stores. The first store has the
/// highest precedence and is the "primary" for locality policies.
pub struct Codex {
    stores: Vec<Arc<dyn ProjectStore>>,
}

impl Codex {
    pub fn new(stores: Vec<Arc<dyn ProjectStore>>) -> Codex {
        Codex { stores }
    }

    /// All stores, from highest precedence to lowest.
    pub fn stores(&self) -> &[Arc<dyn ProjectStore>] {
        &self.stores
    }

    /// The first store that has `source` indexed, if any.
    pub fn store_for(&self, source: &Source) -> Result<Option<&Arc<dyn ProjectStore>>> {
        for store in &self.stores {
            if store.last_indexed(source)? > 0 {
                return Ok(Some(store));
            }
        }
        Ok(None)
    }

    /// Resolves the def for `target`. Local refs go straight to their
    /// project; global refs are tried against each store in precedence
    /// order, first hit wins.
    pub fn resolve(&self, target: &Ref) -> Result<Option<Def>> {
        match target {
            Ref::Local { project, id } => project.def(*id).map(Some),
            Ref::Global(gref) => {
                for store in &self.stores {
                    if let Some(def) = store.def_by_ref(gref)? {
                        return Ok(Some(def));
                    }
                }
                Ok(None)
            }
        }
    }

    /// Locates the store that handles `source` and streams its elements.
    /// Returns false if no store knows the source.
    pub fn visit(&self, source: &Source, sink: &mut dyn FnMut(&dyn Element)) -> Result<bool> {
        for store in &self.stores {
            if store.visit(source, sink)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Finds all defs matching `query` across every store, applying the
    /// query's locality policy per store position.
    pub fn find(&self, query: &Query) -> Result<Vec<Def>> {
        self.find_cancellable(query, &CancelToken::new())
    }

    /// [`Codex::find`] with cooperative cancellation.
    pub fn find_cancellable(&self, query: &Query, cancel: &CancelToken) -> Result<Vec<Def>> {
        let mut matches = Vec::new();
        for (pos, store) in self.stores.iter().enumerate() {
            let exported_only = query.locality.exported_only(pos == 0);
            store.find(query, exported_only, &mut matches, cancel)?;
        }
        Ok(matches)
    }
}
