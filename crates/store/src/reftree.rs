use std::collections::HashMap;

use defmap_model::{GlobalRef, Result};

use crate::idset::IdSet;

/// A bidirectional mapping between [`GlobalRef`]s and externally
/// assigned ids. One implementation is an in-memory trie (per-source
/// scope); the persistent store realizes the same contract over its
/// name↔id tables (project scope). Methods return `Result` so the
/// persistent side can report storage faults; writes take `&mut self`,
/// which serializes them.
pub trait RefTree {
    /// Returns the id assigned to `gref`, if any.
    fn get(&self, gref: &GlobalRef) -> Result<Option<i64>>;

    /// Reverse lookup; `None` if `id` is not registered.
    fn get_ref(&self, id: i64) -> Result<Option<GlobalRef>>;

    /// Resolves the id for `gref`. An existing assignment is reused;
    /// otherwise `assign_id` is registered and returned. The caller is
    /// responsible for `assign_id` being fresh.
    fn resolve(&mut self, gref: &GlobalRef, assign_id: i64) -> Result<i64>;

    /// Detaches the ref↔id association for each id in `ids`.
    fn remove(&mut self, ids: &IdSet) -> Result<()>;

    /// Empties the mapping.
    fn clear(&mut self) -> Result<()>;
}

/// [`RefTree`] over an in-memory trie keyed by interned segments. Nodes
/// are retained after `remove`; only the id association is dropped.
pub struct EphemeralRefTree {
    // node 0 is the root
    nodes: Vec<Node>,
    by_id: HashMap<i64, usize>,
}

struct Node {
    gref: Option<GlobalRef>,
    id: Option<i64>,
    children: HashMap<&'static str, usize>,
}

impl Node {
    fn new(gref: Option<GlobalRef>) -> Node {
        Node {
            gref,
            id: None,
            children: HashMap::new(),
        }
    }
}

impl EphemeralRefTree {
    pub fn new() -> EphemeralRefTree {
        EphemeralRefTree {
            nodes: vec![Node::new(None)],
            by_id: HashMap::new(),
        }
    }

    /// The number of defs in this tree.
    pub fn def_count(&self) -> usize {
        self.by_id.len()
    }

    /// The number of names in this tree, registered or not.
    pub fn name_count(&self) -> usize {
        self.nodes.len() - 1
    }

    fn node_for(&self, gref: &GlobalRef) -> Option<usize> {
        match gref.parent() {
            None => Some(0),
            Some(parent) => {
                let pidx = self.node_for(parent)?;
                self.nodes[pidx].children.get(gref.segment()).copied()
            }
        }
    }

    fn resolve_node(&mut self, gref: &GlobalRef) -> usize {
        match gref.parent() {
            None => 0,
            Some(parent) => {
                let pidx = self.resolve_node(parent);
                if let Some(&child) = self.nodes[pidx].children.get(gref.segment()) {
                    return child;
                }
                let child = self.nodes.len();
                self.nodes.push(Node::new(Some(gref.clone())));
                self.nodes[pidx].children.insert(gref.segment(), child);
                child
            }
        }
    }
}

impl Default for EphemeralRefTree {
    fn default() -> Self {
        Self::new()
    }
}

impl RefTree for EphemeralRefTree {
    fn get(&self, gref: &GlobalRef) -> Result<Option<i64>> {
        Ok(self.node_for(gref).and_then(|idx| self.nodes[idx].id))
    }

    fn get_ref(&self, id: i64) -> Result<Option<GlobalRef>> {
        Ok(self
            .by_id
            .get(&id)
            .and_then(|&idx| self.nodes[idx].gref.clone()))
    }

    fn resolve(&mut self, gref: &GlobalRef, assign_id: i64) -> Result<i64> {
        let idx = self.resolve_node(gref);
        if let Some(id) = self.nodes[idx].id {
            return Ok(id);
        }
        self.nodes[idx].id = Some(assign_id);
        self.by_id.insert(assign_id, idx);
        Ok(assign_id)
    }

    fn remove(&mut self, ids: &IdSet) -> Result<()> {
        for id in ids.iter() {
            if let Some(idx) = self.by_id.remove(&id) {
                self.nodes[idx].id = None;
            }
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.nodes.truncate(1);
        self.nodes[0].children.clear();
        self.by_id.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gref(s: &str) -> GlobalRef {
        GlobalRef::from_string(s)
    }

    #[test]
    fn resolve_is_idempotent() {
        let mut tree = EphemeralRefTree::new();
        assert_eq!(tree.resolve(&gref("com.test Foo"), 7).unwrap(), 7);
        assert_eq!(tree.resolve(&gref("com.test Foo"), 8).unwrap(), 7);
        assert_eq!(tree.get(&gref("com.test Foo")).unwrap(), Some(7));
        assert_eq!(tree.get(&gref("com.test")).unwrap(), None);
    }

    #[test]
    fn reverse_lookup() {
        let mut tree = EphemeralRefTree::new();
        tree.resolve(&gref("com.test Foo"), 7).unwrap();
        assert_eq!(tree.get_ref(7).unwrap(), Some(gref("com.test Foo")));
        assert_eq!(tree.get_ref(8).unwrap(), None);
    }

    #[test]
    fn remove_detaches_but_keeps_nodes() {
        let mut tree = EphemeralRefTree::new();
        tree.resolve(&gref("com.test Foo"), 7).unwrap();
        tree.resolve(&gref("com.test Bar"), 8).unwrap();
        tree.remove(&IdSet::EMPTY.plus(7)).unwrap();

        assert_eq!(tree.get(&gref("com.test Foo")).unwrap(), None);
        assert_eq!(tree.get_ref(7).unwrap(), None);
        assert_eq!(tree.get(&gref("com.test Bar")).unwrap(), Some(8));
        // the name survives and can be re-registered
        assert_eq!(tree.resolve(&gref("com.test Foo"), 9).unwrap(), 9);
    }

    #[test]
    fn clear_empties_everything() {
        let mut tree = EphemeralRefTree::new();
        tree.resolve(&gref("com.test Foo"), 7).unwrap();
        tree.clear().unwrap();
        assert_eq!(tree.def_count(), 0);
        assert_eq!(tree.name_count(), 0);
        assert_eq!(tree.get(&gref("com.test Foo")).unwrap(), None);
    }
}
