use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use defmap_extract::{UnitSink, UnitTree};
use defmap_model::{
    Def, Doc, Error, GlobalRef, Kind, Project, ProjectHandle, Ref, Relation, Result, Sig, Source,
    StorageError, Use,
};

use crate::alloc::{self, to_unit_id};
use crate::idset::IdSet;
use crate::query::{CancelToken, Query};
use crate::records::{attach_uses, DefData, DocData, RefData, SigData, SourceInfo, UseData};
use crate::reftree::{EphemeralRefTree, RefTree};
use crate::store::ProjectStore;
use crate::unit::{store_unit_tree, PendingUses, UnitTxn};

/// A completely in-memory project store. Same contracts as the
/// persistent store, realized over hash and btree tables; useful for
/// tests and for projects small enough to re-extract on every run.
pub struct MemStore {
    me: Weak<MemStore>,
    name: String,
    closed: AtomicBool,
    inner: RwLock<Inner>,
    pending: Mutex<PendingUses>,
}

#[derive(Default)]
struct Inner {
    refs: EphemeralRefTree,
    src_to_unit: HashMap<String, i64>,
    src_info: HashMap<i64, SourceInfo>,
    src_defs: HashMap<i64, IdSet>,
    top_defs: BTreeSet<i64>,
    defs: HashMap<i64, DefData>,
    def_mems: HashMap<i64, IdSet>,
    def_uses: HashMap<i64, Vec<UseData>>,
    def_sig: HashMap<i64, SigData>,
    def_doc: HashMap<i64, DocData>,
    rels_from: [HashMap<i64, Vec<RefData>>; 3],
    rels_to: [HashMap<String, IdSet>; 3],
    loc_use_srcs: HashMap<i64, IdSet>,
    glo_use_srcs: HashMap<String, IdSet>,
    indices: [BTreeSet<(String, i64)>; 5],
}

impl MemStore {
    pub fn new(name: impl Into<String>) -> Arc<MemStore> {
        let name = name.into();
        Arc::new_cyclic(|me| MemStore {
            me: me.clone(),
            name,
            closed: AtomicBool::new(false),
            inner: RwLock::new(Inner::default()),
            pending: Mutex::new(PendingUses::default()),
        })
    }

    fn handle(&self) -> ProjectHandle {
        self.me.upgrade().expect("store still referenced")
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Storage(StorageError::Closed));
        }
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.check_open()?;
        Ok(self.inner.read().expect("store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.check_open()?;
        Ok(self.inner.write().expect("store lock poisoned"))
    }

    /// Wipes the contents of this store, preparing it to be rebuilt.
    pub fn clear(&self) -> Result<()> {
        let mut inner = self.write()?;
        *inner = Inner::default();
        self.pending.lock().expect("pending lock poisoned").clear();
        Ok(())
    }

    pub fn def_count(&self) -> Result<usize> {
        Ok(self.read()?.defs.len())
    }

    pub fn name_count(&self) -> Result<usize> {
        Ok(self.read()?.refs.def_count())
    }

    /// True if `handle` refers to this store.
    fn is_self(&self, handle: &ProjectHandle) -> bool {
        std::ptr::eq(
            Arc::as_ptr(handle) as *const u8,
            self as *const MemStore as *const u8,
        )
    }

    /// The inverse-index keys under which `target` may have been
    /// recorded: its compact local form when it resolves locally, plus
    /// its global name.
    fn relation_keys(&self, inner: &Inner, target: &Ref) -> Result<Vec<String>> {
        let mut keys = Vec::with_capacity(2);
        match target {
            Ref::Local { project, id } if self.is_self(project) => {
                keys.push(format!("l{id}"));
                if let Some(gref) = inner.refs.get_ref(*id)? {
                    keys.push(gref.to_string());
                }
            }
            Ref::Local { project, id } => {
                if let Some(gref) = project.ref_for(*id)? {
                    keys.push(gref.to_string());
                }
            }
            Ref::Global(gref) => {
                keys.push(gref.to_string());
                if let Some(id) = inner.refs.get(gref)? {
                    keys.push(format!("l{id}"));
                }
            }
        }
        Ok(keys)
    }
}

impl Project for MemStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn def(&self, id: i64) -> Result<Def> {
        let inner = self.read()?;
        inner
            .defs
            .get(&id)
            .map(|d| d.attach(&self.handle()))
            .ok_or(Error::NoSuchDef(id))
    }

    fn ref_for(&self, id: i64) -> Result<Option<GlobalRef>> {
        self.read()?.refs.get_ref(id)
    }

    fn defs_in(&self, id: i64) -> Result<Vec<Def>> {
        let inner = self.read()?;
        let handle = self.handle();
        let Some(members) = inner.def_mems.get(&id) else {
            return Ok(Vec::new());
        };
        // member lists may briefly carry purged ids; skip them
        Ok(members
            .iter()
            .filter_map(|mid| inner.defs.get(&mid))
            .map(|d| d.attach(&handle))
            .collect())
    }

    fn uses_in(&self, id: i64) -> Result<Vec<Use>> {
        let inner = self.read()?;
        Ok(inner
            .def_uses
            .get(&id)
            .map(|uses| attach_uses(uses, &self.handle()))
            .unwrap_or_default())
    }

    fn sig(&self, id: i64) -> Result<Option<Sig>> {
        let inner = self.read()?;
        Ok(inner.def_sig.get(&id).map(|s| s.attach(&self.handle())))
    }

    fn doc(&self, id: i64) -> Result<Option<Doc>> {
        let inner = self.read()?;
        Ok(inner.def_doc.get(&id).map(|d| d.attach(&self.handle())))
    }

    fn source(&self, id: i64) -> Result<Source> {
        let inner = self.read()?;
        inner
            .src_info
            .get(&to_unit_id(id))
            .map(|info| Source::from_string(&info.source))
            .ok_or(Error::NoSuchDef(id))
    }

    fn id_to_string(&self, id: i64) -> String {
        alloc::id_to_string(id)
    }
}

impl ProjectStore for MemStore {
    fn top_level_defs(&self) -> Result<Vec<Def>> {
        let inner = self.read()?;
        let handle = self.handle();
        Ok(inner
            .top_defs
            .iter()
            .filter_map(|id| inner.defs.get(id))
            .map(|d| d.attach(&handle))
            .collect())
    }

    fn last_indexed(&self, source: &Source) -> Result<i64> {
        let inner = self.read()?;
        Ok(inner
            .src_to_unit
            .get(&source.to_string())
            .and_then(|unit_id| inner.src_info.get(unit_id))
            .map(|info| info.indexed)
            .unwrap_or(0))
    }

    fn source_defs(&self, source: &Source) -> Result<Vec<Def>> {
        let inner = self.read()?;
        let handle = self.handle();
        let unit_id = inner
            .src_to_unit
            .get(&source.to_string())
            .ok_or_else(|| Error::UnknownSource(source.clone()))?;
        let Some(ids) = inner.src_defs.get(unit_id) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| inner.defs.get(&id))
            .map(|d| d.attach(&handle))
            .collect())
    }

    fn def_by_ref(&self, gref: &GlobalRef) -> Result<Option<Def>> {
        let inner = self.read()?;
        let Some(id) = inner.refs.get(gref)? else {
            return Ok(None);
        };
        Ok(inner.defs.get(&id).map(|d| d.attach(&self.handle())))
    }

    fn relations_from(&self, relation: Relation, def_id: i64) -> Result<Vec<Ref>> {
        let inner = self.read()?;
        let handle = self.handle();
        Ok(inner.rels_from[relation.index()]
            .get(&def_id)
            .map(|targets| targets.iter().map(|t| t.attach(&handle)).collect())
            .unwrap_or_default())
    }

    fn relations_to(&self, relation: Relation, target: &Ref) -> Result<Vec<Def>> {
        let inner = self.read()?;
        let handle = self.handle();
        let keys = self.relation_keys(&inner, target)?;

        let mut candidates = IdSet::builder();
        for key in &keys {
            if let Some(ids) = inner.rels_to[relation.index()].get(key) {
                candidates.add_all(ids);
            }
        }

        let mut defs = Vec::new();
        for id in candidates.build().iter() {
            let Some(def) = inner.defs.get(&id) else {
                continue; // inverse entries go stale when defs are purged
            };
            let confirmed = inner.rels_from[relation.index()]
                .get(&id)
                .is_some_and(|targets| targets.iter().any(|t| keys.contains(&t.key_string())));
            if confirmed {
                defs.push(def.attach(&handle));
            }
        }
        Ok(defs)
    }

    fn uses_of(&self, def: &Def, cancel: &CancelToken) -> Result<BTreeMap<Source, Vec<u32>>> {
        let inner = self.read()?;

        let (target, unit_ids) = if self.is_self(&def.project) {
            // the defining unit is implicit in the reverse-use index
            let units = inner
                .loc_use_srcs
                .get(&def.id)
                .cloned()
                .unwrap_or(IdSet::EMPTY)
                .plus(to_unit_id(def.id));
            (RefData::Local(def.id), units)
        } else {
            let Some(gref) = def.global_ref()? else {
                return Ok(BTreeMap::new());
            };
            let units = inner
                .glo_use_srcs
                .get(&gref.to_string())
                .cloned()
                .unwrap_or(IdSet::EMPTY);
            (RefData::Global(gref), units)
        };

        let mut uses = BTreeMap::new();
        for unit_id in unit_ids.iter() {
            cancel.check()?;
            let Some(info) = inner.src_info.get(&unit_id) else {
                log::warn!(
                    "Def reports use in non-existent source [def={}, unit={unit_id}]",
                    alloc::id_to_string(def.id)
                );
                continue;
            };
            let Some(def_ids) = inner.src_defs.get(&unit_id) else {
                continue;
            };
            let mut offsets = Vec::new();
            for def_id in def_ids.iter() {
                if let Some(unit_uses) = inner.def_uses.get(&def_id) {
                    for us in unit_uses {
                        if us.target == target {
                            offsets.push(us.offset);
                        }
                    }
                }
            }
            if !offsets.is_empty() {
                offsets.sort_unstable();
                uses.insert(Source::from_string(&info.source), offsets);
            }
        }
        Ok(uses)
    }

    fn find(
        &self,
        query: &Query,
        exported_only: bool,
        into: &mut Vec<Def>,
        cancel: &CancelToken,
    ) -> Result<()> {
        let inner = self.read()?;
        let handle = self.handle();
        for &kind in &query.kinds {
            let index = &inner.indices[kind.index()];
            for (name, id) in index.range((query.name.clone(), i64::MIN)..) {
                cancel.check()?;
                if !query.matches(name) {
                    break;
                }
                let Some(def) = inner.defs.get(id) else {
                    continue; // the index can contain stale entries
                };
                if !exported_only || def.exported {
                    into.push(def.attach(&handle));
                }
            }
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.check_open()?;
        // flush any reverse-use entries from an unclosed session
        {
            let mut inner = self.inner.write().expect("store lock poisoned");
            let pending = self.pending.lock().expect("pending lock poisoned");
            if !pending.is_empty() {
                pending.flush(&mut MemTxn { inner: &mut inner })?;
            }
        }
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

impl UnitSink for MemStore {
    fn open_session(&self) -> Result<()> {
        self.check_open()
    }

    fn store_unit(&self, mut unit: UnitTree) -> Result<()> {
        let mut inner = self.write()?;
        let mut pending = self.pending.lock().expect("pending lock poisoned");
        store_unit_tree(&mut MemTxn { inner: &mut inner }, &mut unit, &mut pending)?;
        Ok(())
    }

    fn close_session(&self) -> Result<()> {
        let mut inner = self.write()?;
        let mut pending = self.pending.lock().expect("pending lock poisoned");
        pending.flush(&mut MemTxn { inner: &mut inner })?;
        pending.clear();
        Ok(())
    }
}

struct MemTxn<'a> {
    inner: &'a mut Inner,
}

impl UnitTxn for MemTxn<'_> {
    fn resolve_unit_id(&mut self, src_key: &str) -> Result<i64> {
        if let Some(&unit_id) = self.inner.src_to_unit.get(src_key) {
            return Ok(unit_id);
        }
        let unit_id = self.inner.src_to_unit.len() as i64 + 1;
        self.inner.src_to_unit.insert(src_key.to_owned(), unit_id);
        Ok(unit_id)
    }

    fn src_defs(&self, unit_id: i64) -> Result<IdSet> {
        Ok(self
            .inner
            .src_defs
            .get(&unit_id)
            .cloned()
            .unwrap_or(IdSet::EMPTY))
    }

    fn ref_get(&self, gref: &GlobalRef) -> Result<Option<i64>> {
        self.inner.refs.get(gref)
    }

    fn ref_name(&self, id: i64) -> Result<Option<GlobalRef>> {
        self.inner.refs.get_ref(id)
    }

    fn ref_resolve(&mut self, gref: &GlobalRef, assign_id: i64) -> Result<i64> {
        self.inner.refs.resolve(gref, assign_id)
    }

    fn ref_remove(&mut self, ids: &IdSet) -> Result<()> {
        self.inner.refs.remove(ids)
    }

    fn ref_clear(&mut self) -> Result<()> {
        self.inner.refs.clear()
    }

    fn put_def(&mut self, def: &DefData) -> Result<()> {
        self.inner.defs.insert(def.id, def.clone());
        Ok(())
    }

    fn add_top_def(&mut self, id: i64) -> Result<()> {
        self.inner.top_defs.insert(id);
        Ok(())
    }

    fn index_name(&mut self, kind: Kind, lowered: &str, id: i64) -> Result<()> {
        self.inner.indices[kind.index()].insert((lowered.to_owned(), id));
        Ok(())
    }

    fn members(&self, id: i64) -> Result<IdSet> {
        Ok(self
            .inner
            .def_mems
            .get(&id)
            .cloned()
            .unwrap_or(IdSet::EMPTY))
    }

    fn put_members(&mut self, id: i64, members: &IdSet) -> Result<()> {
        if members.is_empty() {
            self.inner.def_mems.remove(&id);
        } else {
            self.inner.def_mems.insert(id, members.clone());
        }
        Ok(())
    }

    fn put_sig(&mut self, id: i64, sig: &SigData) -> Result<()> {
        self.inner.def_sig.insert(id, sig.clone());
        Ok(())
    }

    fn put_doc(&mut self, id: i64, doc: &DocData) -> Result<()> {
        self.inner.def_doc.insert(id, doc.clone());
        Ok(())
    }

    fn put_uses(&mut self, id: i64, uses: &[UseData]) -> Result<()> {
        if uses.is_empty() {
            self.inner.def_uses.remove(&id);
        } else {
            self.inner.def_uses.insert(id, uses.to_vec());
        }
        Ok(())
    }

    fn put_relations(&mut self, id: i64, relation: Relation, targets: &[RefData]) -> Result<()> {
        let ridx = relation.index();
        if targets.is_empty() {
            self.inner.rels_from[ridx].remove(&id);
            return Ok(());
        }
        for target in targets {
            let entry = self.inner.rels_to[ridx]
                .entry(target.key_string())
                .or_insert(IdSet::EMPTY);
            *entry = entry.plus(id);
        }
        self.inner.rels_from[ridx].insert(id, targets.to_vec());
        Ok(())
    }

    fn remove_defs(&mut self, ids: &IdSet) -> Result<()> {
        self.inner.refs.remove(ids)?;
        for id in ids.iter() {
            self.inner.top_defs.remove(&id);
            self.inner.defs.remove(&id);
            self.inner.def_mems.remove(&id);
            self.inner.def_uses.remove(&id);
            self.inner.def_sig.remove(&id);
            self.inner.def_doc.remove(&id);
            self.inner.loc_use_srcs.remove(&id);
            for rels in &mut self.inner.rels_from {
                rels.remove(&id);
            }
        }
        Ok(())
    }

    fn put_src_defs(&mut self, unit_id: i64, ids: &IdSet) -> Result<()> {
        self.inner.src_defs.insert(unit_id, ids.clone());
        Ok(())
    }

    fn put_src_info(&mut self, unit_id: i64, info: &SourceInfo) -> Result<()> {
        self.inner.src_info.insert(unit_id, info.clone());
        Ok(())
    }

    fn merge_loc_use_srcs(&mut self, target: i64, units: &IdSet) -> Result<()> {
        let entry = self
            .inner
            .loc_use_srcs
            .entry(target)
            .or_insert(IdSet::EMPTY);
        let mut merged = IdSet::builder();
        merged.add_all(entry).add_all(units);
        *entry = merged.build();
        Ok(())
    }

    fn merge_glo_use_srcs(&mut self, target: &str, units: &IdSet) -> Result<()> {
        let entry = self
            .inner
            .glo_use_srcs
            .entry(target.to_owned())
            .or_insert(IdSet::EMPTY);
        let mut merged = IdSet::builder();
        merged.add_all(entry).add_all(units);
        *entry = merged.build();
        Ok(())
    }
}
