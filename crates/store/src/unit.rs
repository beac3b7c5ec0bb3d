//! The unit-storage algorithm shared by every backend. A backend opens a
//! [`UnitTxn`] over its tables and the algorithm drives it: pass A
//! assigns ids and writes skeleton defs, pass B writes payloads with
//! refs resolved to compact local ids where possible, then ids that
//! disappeared since the previous index of the unit are purged.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use defmap_extract::{DefTree, UnitTree, UseTree};
use defmap_model::{GlobalRef, Kind, Relation, Result};

use crate::alloc::{to_unit_id, IdAllocator};
use crate::idset::{Builder, IdSet};
use crate::records::{DefData, DocData, RefData, SigData, SourceInfo, UseData};
use crate::reftree::{EphemeralRefTree, RefTree};

/// One backend write transaction, viewed as the logical tables the
/// algorithm needs. Reads take `&self`, writes `&mut self`.
pub(crate) trait UnitTxn {
    /// Resolves the unit id for a source key, allocating the next id for
    /// an unseen source. Unit id 0 is reserved; the first unit is 1.
    fn resolve_unit_id(&mut self, src_key: &str) -> Result<i64>;

    /// The ids recorded for this unit by its previous index pass.
    fn src_defs(&self, unit_id: i64) -> Result<IdSet>;

    // the project-wide ref tree
    fn ref_get(&self, gref: &GlobalRef) -> Result<Option<i64>>;
    fn ref_name(&self, id: i64) -> Result<Option<GlobalRef>>;
    fn ref_resolve(&mut self, gref: &GlobalRef, assign_id: i64) -> Result<i64>;
    fn ref_remove(&mut self, ids: &IdSet) -> Result<()>;
    fn ref_clear(&mut self) -> Result<()>;

    fn put_def(&mut self, def: &DefData) -> Result<()>;
    fn add_top_def(&mut self, id: i64) -> Result<()>;
    fn index_name(&mut self, kind: Kind, lowered: &str, id: i64) -> Result<()>;
    fn members(&self, id: i64) -> Result<IdSet>;
    /// Empty `members` deletes the entry.
    fn put_members(&mut self, id: i64, members: &IdSet) -> Result<()>;
    fn put_sig(&mut self, id: i64, sig: &SigData) -> Result<()>;
    fn put_doc(&mut self, id: i64, doc: &DocData) -> Result<()>;
    /// Empty `uses` deletes the entry.
    fn put_uses(&mut self, id: i64, uses: &[UseData]) -> Result<()>;
    /// Empty `targets` deletes the entry; additions are mirrored into the
    /// inverse relation index.
    fn put_relations(&mut self, id: i64, relation: Relation, targets: &[RefData]) -> Result<()>;

    /// Purges every record keyed by an id in `ids` (defs, members, uses,
    /// sigs, docs, relations-from, reverse-use entries, top-def and ref
    /// tree membership). Name-index and inverse-relation entries may
    /// stay behind; readers filter them.
    fn remove_defs(&mut self, ids: &IdSet) -> Result<()>;

    fn put_src_defs(&mut self, unit_id: i64, ids: &IdSet) -> Result<()>;
    fn put_src_info(&mut self, unit_id: i64, info: &SourceInfo) -> Result<()>;

    /// Merges `units` into the reverse-use entry for a local target.
    fn merge_loc_use_srcs(&mut self, target: i64, units: &IdSet) -> Result<()>;
    /// Merges `units` into the reverse-use entry for a global target.
    fn merge_glo_use_srcs(&mut self, target: &str, units: &IdSet) -> Result<()>;
}

/// The project ref tree of a transaction, viewed through the [`RefTree`]
/// contract (the persistent realization of it; the trie realization is
/// [`EphemeralRefTree`]).
pub(crate) struct TxnRefTree<'a>(pub &'a mut dyn UnitTxn);

impl RefTree for TxnRefTree<'_> {
    fn get(&self, gref: &GlobalRef) -> Result<Option<i64>> {
        self.0.ref_get(gref)
    }

    fn get_ref(&self, id: i64) -> Result<Option<GlobalRef>> {
        self.0.ref_name(id)
    }

    fn resolve(&mut self, gref: &GlobalRef, assign_id: i64) -> Result<i64> {
        self.0.ref_resolve(gref, assign_id)
    }

    fn remove(&mut self, ids: &IdSet) -> Result<()> {
        self.0.ref_remove(ids)
    }

    fn clear(&mut self) -> Result<()> {
        self.0.ref_clear()
    }
}

/// Reverse-use additions accumulated across a writer session, flushed at
/// session close. Intra-session queries may observe a stale reverse-use
/// index.
#[derive(Default)]
pub(crate) struct PendingUses {
    local: HashMap<i64, Vec<i64>>,
    global: HashMap<String, Vec<i64>>,
}

impl PendingUses {
    pub fn is_empty(&self) -> bool {
        self.local.is_empty() && self.global.is_empty()
    }

    fn note_local(&mut self, target: i64, unit_id: i64) {
        self.local.entry(target).or_default().push(unit_id);
    }

    fn note_global(&mut self, target: String, unit_id: i64) {
        self.global.entry(target).or_default().push(unit_id);
    }

    /// Writes the accumulated entries through `txn`. The maps are left
    /// intact so a failed flush can be retried.
    pub fn flush(&self, txn: &mut dyn UnitTxn) -> Result<()> {
        for (&target, units) in &self.local {
            txn.merge_loc_use_srcs(target, &units.iter().copied().collect())?;
        }
        for (target, units) in &self.global {
            txn.merge_glo_use_srcs(target, &units.iter().copied().collect())?;
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.local.clear();
        self.global.clear();
    }
}

pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Stores one buffered compilation unit. Returns the unit's id.
pub(crate) fn store_unit_tree(
    txn: &mut dyn UnitTxn,
    unit: &mut UnitTree,
    pending: &mut PendingUses,
) -> Result<i64> {
    let indexed = now_millis();
    let src_key = unit.source.to_string();
    let unit_id = txn.resolve_unit_id(&src_key)?;
    let old_ids = txn.src_defs(unit_id)?;

    let mut source_refs = EphemeralRefTree::new();
    let mut alloc = IdAllocator::new(unit_id, &old_ids);
    let mut new_ids = IdSet::builder();

    // pass A: assign ids to all the defs and store the skeleton records
    for def in &mut unit.defs {
        store_def(txn, &mut alloc, &mut source_refs, def, None, &old_ids, &mut new_ids)?;
    }

    // pass B: store sigs, docs, uses and relations; with every def IDed,
    // many refs now resolve to compact local ids
    for def in &unit.defs {
        store_data(txn, &source_refs, def, unit_id, pending)?;
    }

    // purge whatever the previous pass wrote that this one did not
    let new_ids = new_ids.build();
    let stale = old_ids.minus(&new_ids);
    if !stale.is_empty() {
        txn.remove_defs(&stale)?;
    }

    txn.put_src_defs(unit_id, &new_ids)?;
    txn.put_src_info(
        unit_id,
        &SourceInfo {
            source: src_key,
            indexed,
        },
    )?;
    Ok(unit_id)
}

#[allow(clippy::too_many_arguments)]
fn store_def(
    txn: &mut dyn UnitTxn,
    alloc: &mut IdAllocator<'_>,
    source_refs: &mut EphemeralRefTree,
    def: &mut DefTree,
    outer_id: Option<i64>,
    old_ids: &IdSet,
    new_ids: &mut Builder,
) -> Result<i64> {
    let id = if def.exported {
        alloc.resolve_exported(&mut TxnRefTree(&mut *txn), &def.gref)?
    } else {
        alloc.resolve_local(source_refs, &def.gref)?
    };
    def.assigned_id = id;

    txn.put_def(&DefData {
        id,
        outer_id,
        kind: def.kind,
        flavor: def.flavor,
        exported: def.exported,
        access: def.access,
        name: def.name.clone(),
        offset: def.offset,
        body_start: def.body_start,
        body_end: def.body_end,
    })?;
    new_ids.add(id);
    if outer_id.is_none() {
        txn.add_top_def(id)?;
    }
    txn.index_name(def.kind, &def.name.to_lowercase(), id)?;

    let mut member_ids = IdSet::builder();
    for child in &mut def.defs {
        let child_id = store_def(txn, alloc, source_refs, child, Some(id), old_ids, new_ids)?;
        member_ids.add(child_id);
    }
    let members = member_ids.build();

    // defs that span source files keep the members contributed by other
    // units; everyone else's member list is exactly this unit's children
    let members = if def.kind.spans_sources() {
        let prev = txn.members(id)?;
        let mut merged = IdSet::builder();
        merged.add_all(&prev.minus(old_ids));
        merged.add_all(&members);
        merged.build()
    } else {
        members
    };
    txn.put_members(id, &members)?;
    Ok(id)
}

fn store_data(
    txn: &mut dyn UnitTxn,
    source_refs: &EphemeralRefTree,
    def: &DefTree,
    unit_id: i64,
    pending: &mut PendingUses,
) -> Result<()> {
    let def_id = def.assigned_id;

    if let Some(sig) = &def.sig {
        let uses = resolve_uses(txn, source_refs, &sig.uses)?;
        txn.put_sig(
            def_id,
            &SigData {
                text: sig.text.clone(),
                uses,
            },
        )?;
    }
    if let Some(doc) = &def.doc {
        let uses = resolve_uses(txn, source_refs, &doc.uses)?;
        txn.put_doc(
            def_id,
            &DocData {
                offset: doc.offset,
                length: doc.length,
                uses,
            },
        )?;
    }

    for relation in Relation::ALL {
        let mut targets = Vec::new();
        for (rel, target) in &def.relations {
            if *rel == relation {
                targets.push(resolve_ref(txn, source_refs, target)?);
            }
        }
        txn.put_relations(def_id, relation, &targets)?;
    }

    let uses = resolve_uses(txn, source_refs, &def.uses)?;
    for us in &uses {
        match &us.target {
            // uses staying inside the defining unit are implicit in the
            // reverse-use index
            RefData::Local(target) if to_unit_id(*target) == unit_id => {}
            RefData::Local(target) => pending.note_local(*target, unit_id),
            RefData::Global(gref) => pending.note_global(gref.to_string(), unit_id),
        }
    }
    txn.put_uses(def_id, &uses)?;

    for child in &def.defs {
        store_data(txn, source_refs, child, unit_id, pending)?;
    }
    Ok(())
}

fn resolve_ref(
    txn: &mut dyn UnitTxn,
    source_refs: &EphemeralRefTree,
    target: &GlobalRef,
) -> Result<RefData> {
    if let Some(id) = source_refs.get(target)? {
        return Ok(RefData::Local(id));
    }
    if let Some(id) = txn.ref_get(target)? {
        return Ok(RefData::Local(id));
    }
    Ok(RefData::Global(target.clone()))
}

fn resolve_uses(
    txn: &mut dyn UnitTxn,
    source_refs: &EphemeralRefTree,
    uses: &[UseTree],
) -> Result<Vec<UseData>> {
    let mut resolved = Vec::with_capacity(uses.len());
    for us in uses {
        resolved.push(UseData {
            target: resolve_ref(txn, source_refs, &us.target)?,
            kind: us.kind,
            offset: us.offset,
            length: us.length,
        });
    }
    Ok(resolved)
}
