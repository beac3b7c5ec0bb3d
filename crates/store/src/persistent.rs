use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock, Weak};

use redb::{Database, ReadTransaction, ReadableTable, Table, TableDefinition, WriteTransaction};

use defmap_extract::{UnitSink, UnitTree};
use defmap_model::{
    Def, Doc, Error, GlobalRef, Kind, Project, ProjectHandle, Ref, Relation, Result, Sig, Source,
    StorageError, Use,
};

use crate::alloc::{self, to_unit_id};
use crate::idset::IdSet;
use crate::io::{
    decode_def, decode_doc, decode_id_set, decode_refs, decode_sig, decode_source_info,
    decode_uses, encode_def, encode_doc, encode_id_set, encode_refs, encode_sig,
    encode_source_info, encode_uses, name_key, split_name_key,
};
use crate::query::{CancelToken, Query};
use crate::records::{attach_uses, DefData, DocData, RefData, SigData, SourceInfo, UseData};
use crate::store::ProjectStore;
use crate::unit::{store_unit_tree, PendingUses, UnitTxn};

// A bump erases and recreates the database on open; stores are
// rebuildable caches.
const SCHEMA_VERSION: i64 = 1;

// commit every so many compilation units; bounds write-ahead growth
// while permitting crash recovery
const COMMIT_EVERY: u32 = 100;

const META: TableDefinition<&str, i64> = TableDefinition::new("meta");
const SRC_TO_UNIT: TableDefinition<&str, i64> = TableDefinition::new("srcToUnit");
const SRC_INFO: TableDefinition<i64, &[u8]> = TableDefinition::new("srcInfo");
const SRC_DEFS: TableDefinition<i64, &[u8]> = TableDefinition::new("srcDefs");
const TOP_DEFS: TableDefinition<i64, ()> = TableDefinition::new("topDefs");
const DEFS: TableDefinition<i64, &[u8]> = TableDefinition::new("defs");
const DEF_SIG: TableDefinition<i64, &[u8]> = TableDefinition::new("defSig");
const DEF_DOC: TableDefinition<i64, &[u8]> = TableDefinition::new("defDoc");
const DEF_MEMS: TableDefinition<i64, &[u8]> = TableDefinition::new("defMems");
const DEF_USES: TableDefinition<i64, &[u8]> = TableDefinition::new("defUses");
const LOC_USE_SRCS: TableDefinition<i64, &[u8]> = TableDefinition::new("locUseSrcs");
const GLO_USE_SRCS: TableDefinition<&str, &[u8]> = TableDefinition::new("gloUseSrcs");
const REFS_BY_NAME: TableDefinition<&str, i64> = TableDefinition::new("refsByName");
const REFS_BY_ID: TableDefinition<i64, &str> = TableDefinition::new("refsById");

const REL_FROM: [TableDefinition<i64, &[u8]>; 3] = [
    TableDefinition::new("relsFrom.SUPERTYPE"),
    TableDefinition::new("relsFrom.INHERITS"),
    TableDefinition::new("relsFrom.OVERRIDES"),
];
const REL_TO: [TableDefinition<&str, &[u8]>; 3] = [
    TableDefinition::new("relsTo.SUPERTYPE"),
    TableDefinition::new("relsTo.INHERITS"),
    TableDefinition::new("relsTo.OVERRIDES"),
];
const NAME_IDX: [TableDefinition<&[u8], ()>; 5] = [
    TableDefinition::new("idx.MODULE"),
    TableDefinition::new("idx.TYPE"),
    TableDefinition::new("idx.FUNC"),
    TableDefinition::new("idx.VALUE"),
    TableDefinition::new("idx.SYNTHETIC"),
];

const META_SCHEMA: &str = "schema";
const META_NEXT_UNIT: &str = "nextUnitId";

fn storage_err(e: impl Display) -> Error {
    Error::Storage(StorageError::Io(std::io::Error::other(e.to_string())))
}

/// A persistent project store over a single-file embedded database.
/// Readers run on snapshot read transactions and never observe a
/// partially written unit; the writer batches units into one write
/// transaction committed every [`COMMIT_EVERY`] units and at session
/// close.
pub struct RedbStore {
    me: Weak<RedbStore>,
    name: String,
    path: PathBuf,
    db: RwLock<Option<Database>>,
    writer: Mutex<WriterState>,
}

#[derive(Default)]
struct WriterState {
    txn: Option<WriteTransaction>,
    pending: PendingUses,
    units_since_commit: u32,
}

impl RedbStore {
    /// Opens (creating as needed) the store at `path`. A database whose
    /// schema version is older than the code's, or that cannot be read
    /// at all, is erased and recreated.
    pub fn open(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Arc<RedbStore>> {
        let name = name.into();
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut db = create_db(&path)?;
        let on_disk = schema_version(&db)?;
        if on_disk < SCHEMA_VERSION {
            log::info!(
                "Schema version {on_disk} < {SCHEMA_VERSION}; rebuilding {}",
                path.display()
            );
            drop(db);
            fs::remove_file(&path)?;
            db = create_db(&path)?;
        }

        Ok(Arc::new_cyclic(|me| RedbStore {
            me: me.clone(),
            name,
            path,
            db: RwLock::new(Some(db)),
            writer: Mutex::new(WriterState::default()),
        }))
    }

    fn handle(&self) -> ProjectHandle {
        self.me.upgrade().expect("store still referenced")
    }

    fn is_self(&self, handle: &ProjectHandle) -> bool {
        std::ptr::eq(
            Arc::as_ptr(handle) as *const u8,
            self as *const RedbStore as *const u8,
        )
    }

    fn read<T>(&self, f: impl FnOnce(&ReadTransaction) -> Result<T>) -> Result<T> {
        let guard = self.db.read().expect("db lock poisoned");
        let db = guard
            .as_ref()
            .ok_or(Error::Storage(StorageError::Closed))?;
        let txn = db.begin_read().map_err(storage_err)?;
        f(&txn)
    }

    fn begin_write(&self) -> Result<WriteTransaction> {
        let guard = self.db.read().expect("db lock poisoned");
        let db = guard
            .as_ref()
            .ok_or(Error::Storage(StorageError::Closed))?;
        db.begin_write().map_err(storage_err)
    }

    /// Wipes the contents of this store, preparing it to be rebuilt.
    pub fn clear(&self) -> Result<()> {
        let mut state = self.writer.lock().expect("writer lock poisoned");
        if let Some(txn) = state.txn.take() {
            txn.abort().map_err(storage_err)?;
        }
        state.pending.clear();
        state.units_since_commit = 0;
        drop(state);

        let mut guard = self.db.write().expect("db lock poisoned");
        if guard.take().is_none() {
            return Err(Error::Storage(StorageError::Closed));
        }
        fs::remove_file(&self.path)?;
        *guard = Some(create_db(&self.path)?);
        Ok(())
    }

    pub fn def_count(&self) -> Result<usize> {
        self.read(|txn| {
            let table = txn.open_table(DEFS).map_err(storage_err)?;
            Ok(table.iter().map_err(storage_err)?.count())
        })
    }

    pub fn name_count(&self) -> Result<usize> {
        self.read(|txn| {
            let table = txn.open_table(REFS_BY_ID).map_err(storage_err)?;
            Ok(table.iter().map_err(storage_err)?.count())
        })
    }

    fn def_data(&self, txn: &ReadTransaction, id: i64) -> Result<Option<DefData>> {
        let table = txn.open_table(DEFS).map_err(storage_err)?;
        match table.get(id).map_err(storage_err)? {
            Some(guard) => Ok(Some(decode_def(guard.value())?)),
            None => Ok(None),
        }
    }

    fn src_info(&self, txn: &ReadTransaction, unit_id: i64) -> Result<Option<SourceInfo>> {
        let table = txn.open_table(SRC_INFO).map_err(storage_err)?;
        match table.get(unit_id).map_err(storage_err)? {
            Some(guard) => Ok(Some(decode_source_info(guard.value())?)),
            None => Ok(None),
        }
    }

    fn unit_for(&self, txn: &ReadTransaction, source: &Source) -> Result<Option<i64>> {
        let table = txn.open_table(SRC_TO_UNIT).map_err(storage_err)?;
        Ok(table
            .get(source.to_string().as_str())
            .map_err(storage_err)?
            .map(|guard| guard.value()))
    }

    /// The inverse-index keys under which `target` may have been
    /// recorded; see the member on `MemStore` for the reasoning.
    fn relation_keys(&self, txn: &ReadTransaction, target: &Ref) -> Result<Vec<String>> {
        let mut keys = Vec::with_capacity(2);
        match target {
            Ref::Local { project, id } if self.is_self(project) => {
                keys.push(format!("l{id}"));
                let by_id = txn.open_table(REFS_BY_ID).map_err(storage_err)?;
                if let Some(guard) = by_id.get(*id).map_err(storage_err)? {
                    keys.push(guard.value().to_owned());
                }
            }
            Ref::Local { project, id } => {
                if let Some(gref) = project.ref_for(*id)? {
                    keys.push(gref.to_string());
                }
            }
            Ref::Global(gref) => {
                let name = gref.to_string();
                let by_name = txn.open_table(REFS_BY_NAME).map_err(storage_err)?;
                if let Some(guard) = by_name.get(name.as_str()).map_err(storage_err)? {
                    keys.push(format!("l{}", guard.value()));
                }
                keys.push(name);
            }
        }
        Ok(keys)
    }
}

fn create_db(path: &Path) -> Result<Database> {
    let db = match Database::create(path) {
        Ok(db) => db,
        Err(e) => {
            log::warn!("Unreadable database {}: {e}; rebuilding", path.display());
            fs::remove_file(path)?;
            Database::create(path).map_err(storage_err)?
        }
    };

    // make every table exist up front so readers never race creation,
    // and stamp fresh databases with the current schema version
    let txn = db.begin_write().map_err(storage_err)?;
    {
        let mut meta = txn.open_table(META).map_err(storage_err)?;
        if meta.get(META_SCHEMA).map_err(storage_err)?.is_none() {
            meta.insert(META_SCHEMA, SCHEMA_VERSION).map_err(storage_err)?;
        }
        txn.open_table(SRC_TO_UNIT).map_err(storage_err)?;
        txn.open_table(SRC_INFO).map_err(storage_err)?;
        txn.open_table(SRC_DEFS).map_err(storage_err)?;
        txn.open_table(TOP_DEFS).map_err(storage_err)?;
        txn.open_table(DEFS).map_err(storage_err)?;
        txn.open_table(DEF_SIG).map_err(storage_err)?;
        txn.open_table(DEF_DOC).map_err(storage_err)?;
        txn.open_table(DEF_MEMS).map_err(storage_err)?;
        txn.open_table(DEF_USES).map_err(storage_err)?;
        txn.open_table(LOC_USE_SRCS).map_err(storage_err)?;
        txn.open_table(GLO_USE_SRCS).map_err(storage_err)?;
        txn.open_table(REFS_BY_NAME).map_err(storage_err)?;
        txn.open_table(REFS_BY_ID).map_err(storage_err)?;
        for def in REL_FROM {
            txn.open_table(def).map_err(storage_err)?;
        }
        for def in REL_TO {
            txn.open_table(def).map_err(storage_err)?;
        }
        for def in NAME_IDX {
            txn.open_table(def).map_err(storage_err)?;
        }
    }
    txn.commit().map_err(storage_err)?;
    Ok(db)
}

fn schema_version(db: &Database) -> Result<i64> {
    let txn = db.begin_read().map_err(storage_err)?;
    let meta = txn.open_table(META).map_err(storage_err)?;
    Ok(meta
        .get(META_SCHEMA)
        .map_err(storage_err)?
        .map(|guard| guard.value())
        .unwrap_or(0))
}

impl Project for RedbStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn def(&self, id: i64) -> Result<Def> {
        self.read(|txn| {
            self.def_data(txn, id)?
                .map(|d| d.attach(&self.handle()))
                .ok_or(Error::NoSuchDef(id))
        })
    }

    fn ref_for(&self, id: i64) -> Result<Option<GlobalRef>> {
        self.read(|txn| {
            let table = txn.open_table(REFS_BY_ID).map_err(storage_err)?;
            Ok(table
                .get(id)
                .map_err(storage_err)?
                .map(|guard| GlobalRef::from_string(guard.value())))
        })
    }

    fn defs_in(&self, id: i64) -> Result<Vec<Def>> {
        self.read(|txn| {
            let mems = txn.open_table(DEF_MEMS).map_err(storage_err)?;
            let Some(guard) = mems.get(id).map_err(storage_err)? else {
                return Ok(Vec::new());
            };
            let ids = decode_id_set(guard.value())?;
            drop(guard);
            let handle = self.handle();
            let mut defs = Vec::with_capacity(ids.len());
            for member in ids.iter() {
                // member lists may briefly carry purged ids; skip them
                if let Some(data) = self.def_data(txn, member)? {
                    defs.push(data.attach(&handle));
                }
            }
            Ok(defs)
        })
    }

    fn uses_in(&self, id: i64) -> Result<Vec<Use>> {
        self.read(|txn| {
            let table = txn.open_table(DEF_USES).map_err(storage_err)?;
            match table.get(id).map_err(storage_err)? {
                Some(guard) => Ok(attach_uses(&decode_uses(guard.value())?, &self.handle())),
                None => Ok(Vec::new()),
            }
        })
    }

    fn sig(&self, id: i64) -> Result<Option<Sig>> {
        self.read(|txn| {
            let table = txn.open_table(DEF_SIG).map_err(storage_err)?;
            match table.get(id).map_err(storage_err)? {
                Some(guard) => Ok(Some(decode_sig(guard.value())?.attach(&self.handle()))),
                None => Ok(None),
            }
        })
    }

    fn doc(&self, id: i64) -> Result<Option<Doc>> {
        self.read(|txn| {
            let table = txn.open_table(DEF_DOC).map_err(storage_err)?;
            match table.get(id).map_err(storage_err)? {
                Some(guard) => Ok(Some(decode_doc(guard.value())?.attach(&self.handle()))),
                None => Ok(None),
            }
        })
    }

    fn source(&self, id: i64) -> Result<Source> {
        self.read(|txn| {
            self.src_info(txn, to_unit_id(id))?
                .map(|info| Source::from_string(&info.source))
                .ok_or(Error::NoSuchDef(id))
        })
    }

    fn id_to_string(&self, id: i64) -> String {
        alloc::id_to_string(id)
    }
}

impl ProjectStore for RedbStore {
    fn top_level_defs(&self) -> Result<Vec<Def>> {
        self.read(|txn| {
            let tops = txn.open_table(TOP_DEFS).map_err(storage_err)?;
            let handle = self.handle();
            let mut defs = Vec::new();
            for entry in tops.iter().map_err(storage_err)? {
                let (id, _) = entry.map_err(storage_err)?;
                if let Some(data) = self.def_data(txn, id.value())? {
                    defs.push(data.attach(&handle));
                }
            }
            Ok(defs)
        })
    }

    fn last_indexed(&self, source: &Source) -> Result<i64> {
        self.read(|txn| {
            let Some(unit_id) = self.unit_for(txn, source)? else {
                return Ok(0);
            };
            Ok(self
                .src_info(txn, unit_id)?
                .map(|info| info.indexed)
                .unwrap_or(0))
        })
    }

    fn source_defs(&self, source: &Source) -> Result<Vec<Def>> {
        self.read(|txn| {
            let unit_id = self
                .unit_for(txn, source)?
                .ok_or_else(|| Error::UnknownSource(source.clone()))?;
            let table = txn.open_table(SRC_DEFS).map_err(storage_err)?;
            let Some(guard) = table.get(unit_id).map_err(storage_err)? else {
                return Ok(Vec::new());
            };
            let ids = decode_id_set(guard.value())?;
            drop(guard);
            let handle = self.handle();
            let mut defs = Vec::with_capacity(ids.len());
            for id in ids.iter() {
                let data = self.def_data(txn, id)?.ok_or_else(|| {
                    Error::corrupt(format!(
                        "unit {unit_id} lists def {} but no record exists",
                        alloc::id_to_string(id)
                    ))
                })?;
                defs.push(data.attach(&handle));
            }
            Ok(defs)
        })
    }

    fn def_by_ref(&self, gref: &GlobalRef) -> Result<Option<Def>> {
        self.read(|txn| {
            let by_name = txn.open_table(REFS_BY_NAME).map_err(storage_err)?;
            let Some(guard) = by_name
                .get(gref.to_string().as_str())
                .map_err(storage_err)?
            else {
                return Ok(None);
            };
            let id = guard.value();
            drop(guard);
            Ok(self.def_data(txn, id)?.map(|d| d.attach(&self.handle())))
        })
    }

    fn relations_from(&self, relation: Relation, def_id: i64) -> Result<Vec<Ref>> {
        self.read(|txn| {
            let table = txn
                .open_table(REL_FROM[relation.index()])
                .map_err(storage_err)?;
            match table.get(def_id).map_err(storage_err)? {
                Some(guard) => {
                    let handle = self.handle();
                    Ok(decode_refs(guard.value())?
                        .iter()
                        .map(|r| r.attach(&handle))
                        .collect())
                }
                None => Ok(Vec::new()),
            }
        })
    }

    fn relations_to(&self, relation: Relation, target: &Ref) -> Result<Vec<Def>> {
        self.read(|txn| {
            let keys = self.relation_keys(txn, target)?;
            let inverse = txn
                .open_table(REL_TO[relation.index()])
                .map_err(storage_err)?;
            let mut candidates = IdSet::builder();
            for key in &keys {
                if let Some(guard) = inverse.get(key.as_str()).map_err(storage_err)? {
                    candidates.add_all(&decode_id_set(guard.value())?);
                }
            }

            let forward = txn
                .open_table(REL_FROM[relation.index()])
                .map_err(storage_err)?;
            let handle = self.handle();
            let mut defs = Vec::new();
            for id in candidates.build().iter() {
                let Some(data) = self.def_data(txn, id)? else {
                    continue; // inverse entries go stale when defs are purged
                };
                let confirmed = match forward.get(id).map_err(storage_err)? {
                    Some(guard) => decode_refs(guard.value())?
                        .iter()
                        .any(|t| keys.contains(&t.key_string())),
                    None => false,
                };
                if confirmed {
                    defs.push(data.attach(&handle));
                }
            }
            Ok(defs)
        })
    }

    fn uses_of(&self, def: &Def, cancel: &CancelToken) -> Result<BTreeMap<Source, Vec<u32>>> {
        self.read(|txn| {
            let (target, unit_ids) = if self.is_self(&def.project) {
                let table = txn.open_table(LOC_USE_SRCS).map_err(storage_err)?;
                let mut units = match table.get(def.id).map_err(storage_err)? {
                    Some(guard) => decode_id_set(guard.value())?,
                    None => IdSet::EMPTY,
                };
                // the defining unit is implicit in the reverse-use index
                units = units.plus(to_unit_id(def.id));
                (RefData::Local(def.id), units)
            } else {
                let Some(gref) = def.global_ref()? else {
                    return Ok(BTreeMap::new());
                };
                let table = txn.open_table(GLO_USE_SRCS).map_err(storage_err)?;
                let units = match table
                    .get(gref.to_string().as_str())
                    .map_err(storage_err)?
                {
                    Some(guard) => decode_id_set(guard.value())?,
                    None => IdSet::EMPTY,
                };
                (RefData::Global(gref), units)
            };

            let src_defs = txn.open_table(SRC_DEFS).map_err(storage_err)?;
            let def_uses = txn.open_table(DEF_USES).map_err(storage_err)?;
            let mut uses = BTreeMap::new();
            for unit_id in unit_ids.iter() {
                cancel.check()?;
                let Some(info) = self.src_info(txn, unit_id)? else {
                    log::warn!(
                        "Def reports use in non-existent source [def={}, unit={unit_id}]",
                        alloc::id_to_string(def.id)
                    );
                    continue;
                };
                let Some(guard) = src_defs.get(unit_id).map_err(storage_err)? else {
                    continue;
                };
                let ids = decode_id_set(guard.value())?;
                drop(guard);

                let mut offsets = Vec::new();
                for def_id in ids.iter() {
                    if let Some(guard) = def_uses.get(def_id).map_err(storage_err)? {
                        for us in decode_uses(guard.value())? {
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
        })
    }

    fn find(
        &self,
        query: &Query,
        exported_only: bool,
        into: &mut Vec<Def>,
        cancel: &CancelToken,
    ) -> Result<()> {
        self.read(|txn| {
            let handle = self.handle();
            for &kind in &query.kinds {
                let index = txn
                    .open_table(NAME_IDX[kind.index()])
                    .map_err(storage_err)?;
                let lower = query.name.as_bytes();
                for entry in index.range(lower..).map_err(storage_err)? {
                    cancel.check()?;
                    let (key, _) = entry.map_err(storage_err)?;
                    let key = key.value();
                    let (name, id) = split_name_key(key)?;
                    if !query.matches(name) {
                        break;
                    }
                    let Some(data) = self.def_data(txn, id)? else {
                        continue; // the index can contain stale entries
                    };
                    if !exported_only || data.exported {
                        into.push(data.attach(&handle));
                    }
                }
            }
            Ok(())
        })
    }

    fn close(&self) -> Result<()> {
        // flush whatever the writer still holds, then drop the database
        {
            let mut state = self.writer.lock().expect("writer lock poisoned");
            if state.txn.is_some() || !state.pending.is_empty() {
                self.flush_session(&mut state)?;
            }
        }
        let mut guard = self.db.write().expect("db lock poisoned");
        if guard.take().is_none() {
            return Err(Error::Storage(StorageError::Closed));
        }
        Ok(())
    }
}

impl RedbStore {
    /// Flushes pending reverse-use entries and commits the write
    /// transaction. On failure the pending maps survive, so the whole
    /// flush is retried once in a fresh transaction before surfacing.
    fn flush_session(&self, state: &mut WriterState) -> Result<()> {
        match self.try_flush(state) {
            Ok(()) => {
                state.pending.clear();
                Ok(())
            }
            Err(first) => {
                log::warn!("Session commit failed, retrying once: {first}");
                if let Some(txn) = state.txn.take() {
                    let _ = txn.abort();
                }
                self.try_flush(state)?;
                state.pending.clear();
                Ok(())
            }
        }
    }

    fn try_flush(&self, state: &mut WriterState) -> Result<()> {
        if state.txn.is_none() {
            state.txn = Some(self.begin_write()?);
        }
        let WriterState { txn, pending, .. } = state;
        {
            let txn = txn.as_ref().expect("transaction just ensured");
            let mut tables = RedbTxn::open(txn)?;
            pending.flush(&mut tables)?;
        }
        let txn = state.txn.take().expect("transaction just ensured");
        txn.commit().map_err(storage_err)?;
        state.units_since_commit = 0;
        Ok(())
    }
}

impl UnitSink for RedbStore {
    fn open_session(&self) -> Result<()> {
        let guard = self.db.read().expect("db lock poisoned");
        if guard.is_none() {
            return Err(Error::Storage(StorageError::Closed));
        }
        let mut state = self.writer.lock().expect("writer lock poisoned");
        state.units_since_commit = 0;
        Ok(())
    }

    fn store_unit(&self, mut unit: UnitTree) -> Result<()> {
        let mut state = self.writer.lock().expect("writer lock poisoned");
        if state.txn.is_none() {
            state.txn = Some(self.begin_write()?);
        }
        {
            let WriterState { txn, pending, .. } = &mut *state;
            let txn = txn.as_ref().expect("transaction just ensured");
            let mut tables = RedbTxn::open(txn)?;
            store_unit_tree(&mut tables, &mut unit, pending)?;
        }

        state.units_since_commit += 1;
        if state.units_since_commit >= COMMIT_EVERY {
            let txn = state.txn.take().expect("transaction just ensured");
            txn.commit().map_err(storage_err)?;
            state.units_since_commit = 0;
        }
        Ok(())
    }

    fn close_session(&self) -> Result<()> {
        let mut state = self.writer.lock().expect("writer lock poisoned");
        self.flush_session(&mut state)
    }
}

/// One write transaction's tables, driven by the shared unit-storage
/// algorithm.
struct RedbTxn<'txn> {
    meta: Table<'txn, &'static str, i64>,
    src_to_unit: Table<'txn, &'static str, i64>,
    src_info: Table<'txn, i64, &'static [u8]>,
    src_defs: Table<'txn, i64, &'static [u8]>,
    top_defs: Table<'txn, i64, ()>,
    defs: Table<'txn, i64, &'static [u8]>,
    def_sig: Table<'txn, i64, &'static [u8]>,
    def_doc: Table<'txn, i64, &'static [u8]>,
    def_mems: Table<'txn, i64, &'static [u8]>,
    def_uses: Table<'txn, i64, &'static [u8]>,
    loc_use_srcs: Table<'txn, i64, &'static [u8]>,
    glo_use_srcs: Table<'txn, &'static str, &'static [u8]>,
    refs_by_name: Table<'txn, &'static str, i64>,
    refs_by_id: Table<'txn, i64, &'static str>,
    rel_from: [Table<'txn, i64, &'static [u8]>; 3],
    rel_to: [Table<'txn, &'static str, &'static [u8]>; 3],
    name_idx: [Table<'txn, &'static [u8], ()>; 5],
}

impl<'txn> RedbTxn<'txn> {
    fn open(txn: &'txn WriteTransaction) -> Result<RedbTxn<'txn>> {
        Ok(RedbTxn {
            meta: txn.open_table(META).map_err(storage_err)?,
            src_to_unit: txn.open_table(SRC_TO_UNIT).map_err(storage_err)?,
            src_info: txn.open_table(SRC_INFO).map_err(storage_err)?,
            src_defs: txn.open_table(SRC_DEFS).map_err(storage_err)?,
            top_defs: txn.open_table(TOP_DEFS).map_err(storage_err)?,
            defs: txn.open_table(DEFS).map_err(storage_err)?,
            def_sig: txn.open_table(DEF_SIG).map_err(storage_err)?,
            def_doc: txn.open_table(DEF_DOC).map_err(storage_err)?,
            def_mems: txn.open_table(DEF_MEMS).map_err(storage_err)?,
            def_uses: txn.open_table(DEF_USES).map_err(storage_err)?,
            loc_use_srcs: txn.open_table(LOC_USE_SRCS).map_err(storage_err)?,
            glo_use_srcs: txn.open_table(GLO_USE_SRCS).map_err(storage_err)?,
            refs_by_name: txn.open_table(REFS_BY_NAME).map_err(storage_err)?,
            refs_by_id: txn.open_table(REFS_BY_ID).map_err(storage_err)?,
            rel_from: [
                txn.open_table(REL_FROM[0]).map_err(storage_err)?,
                txn.open_table(REL_FROM[1]).map_err(storage_err)?,
                txn.open_table(REL_FROM[2]).map_err(storage_err)?,
            ],
            rel_to: [
                txn.open_table(REL_TO[0]).map_err(storage_err)?,
                txn.open_table(REL_TO[1]).map_err(storage_err)?,
                txn.open_table(REL_TO[2]).map_err(storage_err)?,
            ],
            name_idx: [
                txn.open_table(NAME_IDX[0]).map_err(storage_err)?,
                txn.open_table(NAME_IDX[1]).map_err(storage_err)?,
                txn.open_table(NAME_IDX[2]).map_err(storage_err)?,
                txn.open_table(NAME_IDX[3]).map_err(storage_err)?,
                txn.open_table(NAME_IDX[4]).map_err(storage_err)?,
            ],
        })
    }

    fn get_id_set(table: &Table<'_, i64, &'static [u8]>, id: i64) -> Result<IdSet> {
        match table.get(id).map_err(storage_err)? {
            Some(guard) => decode_id_set(guard.value()),
            None => Ok(IdSet::EMPTY),
        }
    }
}

impl UnitTxn for RedbTxn<'_> {
    fn resolve_unit_id(&mut self, src_key: &str) -> Result<i64> {
        if let Some(guard) = self.src_to_unit.get(src_key).map_err(storage_err)? {
            return Ok(guard.value());
        }
        let unit_id = self
            .meta
            .get(META_NEXT_UNIT)
            .map_err(storage_err)?
            .map(|guard| guard.value())
            .unwrap_or(1);
        self.meta
            .insert(META_NEXT_UNIT, unit_id + 1)
            .map_err(storage_err)?;
        self.src_to_unit
            .insert(src_key, unit_id)
            .map_err(storage_err)?;
        Ok(unit_id)
    }

    fn src_defs(&self, unit_id: i64) -> Result<IdSet> {
        Self::get_id_set(&self.src_defs, unit_id)
    }

    fn ref_get(&self, gref: &GlobalRef) -> Result<Option<i64>> {
        Ok(self
            .refs_by_name
            .get(gref.to_string().as_str())
            .map_err(storage_err)?
            .map(|guard| guard.value()))
    }

    fn ref_name(&self, id: i64) -> Result<Option<GlobalRef>> {
        Ok(self
            .refs_by_id
            .get(id)
            .map_err(storage_err)?
            .map(|guard| GlobalRef::from_string(guard.value())))
    }

    fn ref_resolve(&mut self, gref: &GlobalRef, assign_id: i64) -> Result<i64> {
        let key = gref.to_string();
        if let Some(guard) = self.refs_by_name.get(key.as_str()).map_err(storage_err)? {
            return Ok(guard.value());
        }
        self.refs_by_name
            .insert(key.as_str(), assign_id)
            .map_err(storage_err)?;
        self.refs_by_id
            .insert(assign_id, key.as_str())
            .map_err(storage_err)?;
        Ok(assign_id)
    }

    fn ref_remove(&mut self, ids: &IdSet) -> Result<()> {
        for id in ids.iter() {
            let name = self
                .refs_by_id
                .remove(id)
                .map_err(storage_err)?
                .map(|guard| guard.value().to_owned());
            if let Some(name) = name {
                self.refs_by_name
                    .remove(name.as_str())
                    .map_err(storage_err)?;
            }
        }
        Ok(())
    }

    fn ref_clear(&mut self) -> Result<()> {
        let ids: Vec<i64> = self
            .refs_by_id
            .iter()
            .map_err(storage_err)?
            .map(|entry| entry.map(|(k, _)| k.value()).map_err(storage_err))
            .collect::<Result<_>>()?;
        self.ref_remove(&ids.into_iter().collect())
    }

    fn put_def(&mut self, def: &DefData) -> Result<()> {
        self.defs
            .insert(def.id, encode_def(def).as_slice())
            .map_err(storage_err)?;
        Ok(())
    }

    fn add_top_def(&mut self, id: i64) -> Result<()> {
        self.top_defs.insert(id, ()).map_err(storage_err)?;
        Ok(())
    }

    fn index_name(&mut self, kind: Kind, lowered: &str, id: i64) -> Result<()> {
        self.name_idx[kind.index()]
            .insert(name_key(lowered, id).as_slice(), ())
            .map_err(storage_err)?;
        Ok(())
    }

    fn members(&self, id: i64) -> Result<IdSet> {
        Self::get_id_set(&self.def_mems, id)
    }

    fn put_members(&mut self, id: i64, members: &IdSet) -> Result<()> {
        if members.is_empty() {
            self.def_mems.remove(id).map_err(storage_err)?;
        } else {
            self.def_mems
                .insert(id, encode_id_set(members).as_slice())
                .map_err(storage_err)?;
        }
        Ok(())
    }

    fn put_sig(&mut self, id: i64, sig: &SigData) -> Result<()> {
        self.def_sig
            .insert(id, encode_sig(sig).as_slice())
            .map_err(storage_err)?;
        Ok(())
    }

    fn put_doc(&mut self, id: i64, doc: &DocData) -> Result<()> {
        self.def_doc
            .insert(id, encode_doc(doc).as_slice())
            .map_err(storage_err)?;
        Ok(())
    }

    fn put_uses(&mut self, id: i64, uses: &[UseData]) -> Result<()> {
        if uses.is_empty() {
            self.def_uses.remove(id).map_err(storage_err)?;
        } else {
            self.def_uses
                .insert(id, encode_uses(uses).as_slice())
                .map_err(storage_err)?;
        }
        Ok(())
    }

    fn put_relations(&mut self, id: i64, relation: Relation, targets: &[RefData]) -> Result<()> {
        let ridx = relation.index();
        if targets.is_empty() {
            self.rel_from[ridx].remove(id).map_err(storage_err)?;
            return Ok(());
        }
        for target in targets {
            let key = target.key_string();
            let ids = match self.rel_to[ridx].get(key.as_str()).map_err(storage_err)? {
                Some(guard) => decode_id_set(guard.value())?,
                None => IdSet::EMPTY,
            };
            self.rel_to[ridx]
                .insert(key.as_str(), encode_id_set(&ids.plus(id)).as_slice())
                .map_err(storage_err)?;
        }
        self.rel_from[ridx]
            .insert(id, encode_refs(targets).as_slice())
            .map_err(storage_err)?;
        Ok(())
    }

    fn remove_defs(&mut self, ids: &IdSet) -> Result<()> {
        self.ref_remove(ids)?;
        for id in ids.iter() {
            self.top_defs.remove(id).map_err(storage_err)?;
            self.defs.remove(id).map_err(storage_err)?;
            self.def_mems.remove(id).map_err(storage_err)?;
            self.def_uses.remove(id).map_err(storage_err)?;
            self.def_sig.remove(id).map_err(storage_err)?;
            self.def_doc.remove(id).map_err(storage_err)?;
            self.loc_use_srcs.remove(id).map_err(storage_err)?;
            for rels in &mut self.rel_from {
                rels.remove(id).map_err(storage_err)?;
            }
        }
        Ok(())
    }

    fn put_src_defs(&mut self, unit_id: i64, ids: &IdSet) -> Result<()> {
        self.src_defs
            .insert(unit_id, encode_id_set(ids).as_slice())
            .map_err(storage_err)?;
        Ok(())
    }

    fn put_src_info(&mut self, unit_id: i64, info: &SourceInfo) -> Result<()> {
        self.src_info
            .insert(unit_id, encode_source_info(info).as_slice())
            .map_err(storage_err)?;
        Ok(())
    }

    fn merge_loc_use_srcs(&mut self, target: i64, units: &IdSet) -> Result<()> {
        let mut merged = IdSet::builder();
        merged.add_all(&Self::get_id_set(&self.loc_use_srcs, target)?);
        merged.add_all(units);
        self.loc_use_srcs
            .insert(target, encode_id_set(&merged.build()).as_slice())
            .map_err(storage_err)?;
        Ok(())
    }

    fn merge_glo_use_srcs(&mut self, target: &str, units: &IdSet) -> Result<()> {
        let existing = match self.glo_use_srcs.get(target).map_err(storage_err)? {
            Some(guard) => decode_id_set(guard.value())?,
            None => IdSet::EMPTY,
        };
        let mut merged = IdSet::builder();
        merged.add_all(&existing);
        merged.add_all(units);
        self.glo_use_srcs
            .insert(target, encode_id_set(&merged.build()).as_slice())
            .map_err(storage_err)?;
        Ok(())
    }
}
