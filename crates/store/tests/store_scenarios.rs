//! End-to-end scenarios run against both store backends.

use std::sync::Arc;

use pretty_assertions::assert_eq;

use defmap_extract::{BatchWriter, UnitSink, Writer};
use defmap_model::{Access, Error, Flavor, GlobalRef, Kind, Ref, Relation, Source, StorageError};
use defmap_store::{
    is_exported_id, to_unit_id, CancelToken, MemStore, ProjectStore, Query, RedbStore, MAX_EXP_ID,
};

trait TestStore: ProjectStore + UnitSink {}
impl TestStore for MemStore {}
impl TestStore for RedbStore {}

fn with_stores(test: impl Fn(Arc<dyn TestStore>)) {
    test(MemStore::new("mem-test"));

    let dir = tempfile::tempdir().unwrap();
    let store = RedbStore::open("redb-test", dir.path().join("test.defmap")).unwrap();
    test(store);
}

fn gref(s: &str) -> GlobalRef {
    GlobalRef::from_string(s)
}

type W = BatchWriter<Arc<dyn TestStore>>;

fn open_def(w: &mut W, id: &GlobalRef, name: &str, kind: Kind, exported: bool, offset: u32) {
    w.open_def(
        id,
        name,
        kind,
        Flavor::None,
        exported,
        Access::Public,
        offset,
        offset,
        offset,
    )
    .unwrap();
}

/// Writes `package com.test; def foo() {}` worth of events for one unit.
fn write_simple_unit(store: &Arc<dyn TestStore>, path: &str, fns: &[&str]) {
    let mut w = BatchWriter::new(store.clone());
    w.open_session().unwrap();
    w.open_unit(&Source::file(path)).unwrap();
    let module = gref("com.test");
    open_def(&mut w, &module, "com.test", Kind::Module, true, 8);
    for (i, name) in fns.iter().enumerate() {
        open_def(&mut w, &module.plus(name), name, Kind::Func, true, 30 + i as u32);
        w.close_def().unwrap();
    }
    w.close_def().unwrap();
    w.close_unit().unwrap();
    w.close_session().unwrap();
}

#[test]
fn one_unit_defs_resolve_by_name() {
    with_stores(|store| {
        write_simple_unit(&store, "/proj/pkg/F.x", &["foo"]);

        let foo = store.def_by_ref(&gref("com.test foo")).unwrap().unwrap();
        assert_eq!(foo.name, "foo");
        assert_eq!(foo.kind, Kind::Func);
        let outer = foo.outer().unwrap().unwrap();
        assert_eq!(outer.name, "com.test");
        assert_eq!(outer.kind, Kind::Module);
    });
}

#[test]
fn id_roundtrip_and_unit_partition() {
    with_stores(|store| {
        write_simple_unit(&store, "/proj/pkg/F.x", &["foo", "bar"]);

        for def in store.source_defs(&Source::file("/proj/pkg/F.x")).unwrap() {
            // id roundtrip
            assert_eq!(store.def(def.id).unwrap().id, def.id);
            let gref = store.ref_for(def.id).unwrap().expect("exported def has a name");
            assert_eq!(store.def_by_ref(&gref).unwrap().unwrap().id, def.id);

            // unit partition: the first unit allocated is 1
            assert_eq!(to_unit_id(def.id), 1);
            assert_eq!(is_exported_id(def.id), def.exported);
            assert!(def.id % defmap_store::MAX_DEF_ID <= MAX_EXP_ID);
        }
    });
}

#[test]
fn membership_is_consistent_both_ways() {
    with_stores(|store| {
        write_simple_unit(&store, "/proj/pkg/F.x", &["foo", "bar"]);

        for def in store.source_defs(&Source::file("/proj/pkg/F.x")).unwrap() {
            for member in def.members().unwrap() {
                assert_eq!(member.outer_id, Some(def.id));
            }
            if let Some(outer_id) = def.outer_id {
                let siblings = store.defs_in(outer_id).unwrap();
                assert!(siblings.iter().any(|d| d.id == def.id));
            }
        }
    });
}

#[test]
fn name_index_finds_every_def() {
    with_stores(|store| {
        write_simple_unit(&store, "/proj/pkg/F.x", &["foo", "bar"]);

        for def in store.source_defs(&Source::file("/proj/pkg/F.x")).unwrap() {
            let query = Query::name(&def.name).kind(def.kind);
            let mut hits = Vec::new();
            store
                .find(&query, false, &mut hits, &CancelToken::new())
                .unwrap();
            assert!(hits.iter().any(|d| d.id == def.id), "index missed {}", def.name);
        }
    });
}

#[test]
fn case_insensitive_match_returns_both() {
    with_stores(|store| {
        let mut w = BatchWriter::new(store.clone());
        w.open_session().unwrap();
        w.open_unit(&Source::file("/proj/Case.x")).unwrap();
        let module = gref("com.test");
        open_def(&mut w, &module, "com.test", Kind::Module, true, 0);
        open_def(&mut w, &module.plus("Foo"), "Foo", Kind::Func, true, 10);
        w.close_def().unwrap();
        open_def(&mut w, &module.plus("foo"), "foo", Kind::Func, true, 20);
        w.close_def().unwrap();
        w.close_def().unwrap();
        w.close_unit().unwrap();
        w.close_session().unwrap();

        let mut hits = Vec::new();
        store
            .find(&Query::name("foo"), false, &mut hits, &CancelToken::new())
            .unwrap();
        let mut names: Vec<_> = hits.iter().map(|d| d.name.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["Foo", "foo"]);
    });
}

#[test]
fn prefix_search_stays_within_prefix() {
    with_stores(|store| {
        write_simple_unit(&store, "/proj/pkg/F.x", &["foo", "fog", "zap"]);

        let mut hits = Vec::new();
        store
            .find(
                &Query::prefix("fo").kind(Kind::Func),
                false,
                &mut hits,
                &CancelToken::new(),
            )
            .unwrap();
        let mut names: Vec<_> = hits.iter().map(|d| d.name.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["fog", "foo"]);
    });
}

#[test]
fn incremental_reindex_keeps_surviving_ids() {
    with_stores(|store| {
        write_simple_unit(&store, "/proj/U.x", &["a", "b", "c"]);
        let id_a = store.def_by_ref(&gref("com.test a")).unwrap().unwrap().id;
        let id_b = store.def_by_ref(&gref("com.test b")).unwrap().unwrap().id;
        let id_c = store.def_by_ref(&gref("com.test c")).unwrap().unwrap().id;

        write_simple_unit(&store, "/proj/U.x", &["a", "c", "d"]);

        // b is gone entirely
        assert!(store.def_by_ref(&gref("com.test b")).unwrap().is_none());
        assert!(matches!(store.def(id_b), Err(Error::NoSuchDef(_))));
        // a and c kept their ids
        assert_eq!(store.def_by_ref(&gref("com.test a")).unwrap().unwrap().id, id_a);
        assert_eq!(store.def_by_ref(&gref("com.test c")).unwrap().unwrap().id, id_c);
        // d got a fresh id
        let id_d = store.def_by_ref(&gref("com.test d")).unwrap().unwrap().id;
        assert!(id_d != id_a && id_d != id_b && id_d != id_c);

        // the unit's recorded defs are exactly the module plus a, c, d
        let mut ids: Vec<i64> = store
            .source_defs(&Source::file("/proj/U.x"))
            .unwrap()
            .iter()
            .map(|d| d.id)
            .collect();
        ids.sort_unstable();
        let module_id = store.def_by_ref(&gref("com.test")).unwrap().unwrap().id;
        let mut expect = vec![module_id, id_a, id_c, id_d];
        expect.sort_unstable();
        assert_eq!(ids, expect);
    });
}

#[test]
fn module_members_merge_across_units() {
    with_stores(|store| {
        write_simple_unit(&store, "/proj/U1.x", &["a"]);
        write_simple_unit(&store, "/proj/U2.x", &["b"]);

        let module = store.def_by_ref(&gref("com.test")).unwrap().unwrap();
        let mut names: Vec<_> = module
            .members()
            .unwrap()
            .iter()
            .map(|d| d.name.clone())
            .collect();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);

        // dropping a from U1 leaves U2's contribution intact
        write_simple_unit(&store, "/proj/U1.x", &[]);
        let names: Vec<_> = module
            .members()
            .unwrap()
            .iter()
            .map(|d| d.name.clone())
            .collect();
        assert_eq!(names, vec!["b"]);
    });
}

#[test]
fn sig_and_doc_round_trip() {
    with_stores(|store| {
        let mut w = BatchWriter::new(store.clone());
        w.open_session().unwrap();
        w.open_unit(&Source::file("/proj/S.x")).unwrap();
        let module = gref("com.test");
        open_def(&mut w, &module, "com.test", Kind::Module, true, 0);
        open_def(&mut w, &module.plus("foo"), "foo", Kind::Func, true, 24);
        w.emit_sig("def foo (b: Bar)\n  : Baz").unwrap();
        w.emit_sig_use(&gref("com.test Bar"), Kind::Type, 11, 3).unwrap();
        w.emit_doc(4, 15).unwrap();
        w.emit_doc_use(&gref("com.test Bar"), Kind::Type, 6, 3).unwrap();
        w.close_def().unwrap();
        w.close_def().unwrap();
        w.close_unit().unwrap();
        w.close_session().unwrap();

        let foo = store.def_by_ref(&gref("com.test foo")).unwrap().unwrap();
        let sig = foo.sig().unwrap().expect("sig stored");
        assert_eq!(sig.text, "def foo (b: Bar)\n  : Baz");
        assert_eq!(sig.uses.len(), 1);
        assert_eq!(sig.uses[0].offset, 11);

        let doc = foo.doc().unwrap().expect("doc stored");
        assert_eq!((doc.offset, doc.length), (4, 15));
        assert_eq!(doc.uses.len(), 1);
        assert_eq!(doc.uses[0].offset, 6);
    });
}

#[test]
fn relations_resolve_in_both_directions() {
    with_stores(|store| {
        let mut w = BatchWriter::new(store.clone());
        w.open_session().unwrap();
        w.open_unit(&Source::file("/proj/R.x")).unwrap();
        let module = gref("com.test");
        open_def(&mut w, &module, "com.test", Kind::Module, true, 0);
        open_def(&mut w, &module.plus("Sup"), "Sup", Kind::Type, true, 10);
        w.close_def().unwrap();
        open_def(&mut w, &module.plus("Sub"), "Sub", Kind::Type, true, 20);
        w.emit_relation(Relation::Supertype, &gref("com.test Sup")).unwrap();
        w.emit_relation(Relation::Supertype, &gref("java.lang Object")).unwrap();
        w.close_def().unwrap();
        w.close_def().unwrap();
        w.close_unit().unwrap();
        w.close_session().unwrap();

        let sup = store.def_by_ref(&gref("com.test Sup")).unwrap().unwrap();
        let sub = store.def_by_ref(&gref("com.test Sub")).unwrap().unwrap();

        let from = store.relations_from(Relation::Supertype, sub.id).unwrap();
        assert_eq!(from.len(), 2);
        assert!(from.contains(&sup.to_ref()));
        assert!(from.contains(&Ref::global(gref("java.lang Object"))));

        let to_sup = store.relations_to(Relation::Supertype, &sup.to_ref()).unwrap();
        assert_eq!(to_sup.len(), 1);
        assert_eq!(to_sup[0].id, sub.id);

        let to_obj = store
            .relations_to(Relation::Supertype, &Ref::global(gref("java.lang Object")))
            .unwrap();
        assert_eq!(to_obj.len(), 1);
        assert_eq!(to_obj[0].id, sub.id);

        // nothing relates to Sub itself
        assert!(store
            .relations_to(Relation::Supertype, &sub.to_ref())
            .unwrap()
            .is_empty());
    });
}

#[test]
fn reverse_use_index_finds_cross_unit_uses() {
    with_stores(|store| {
        // U1 defines X (exported)
        let mut w = BatchWriter::new(store.clone());
        w.open_session().unwrap();
        w.open_unit(&Source::file("/proj/U1.x")).unwrap();
        let module = gref("com.test");
        open_def(&mut w, &module, "com.test", Kind::Module, true, 0);
        open_def(&mut w, &module.plus("X"), "X", Kind::Type, true, 10);
        w.close_def().unwrap();
        w.close_def().unwrap();
        w.close_unit().unwrap();

        // U2 uses X
        w.open_unit(&Source::file("/proj/U2.x")).unwrap();
        open_def(&mut w, &module, "com.test", Kind::Module, true, 0);
        open_def(&mut w, &module.plus("Y"), "Y", Kind::Type, true, 10);
        w.emit_use(&gref("com.test X"), Kind::Type, 42, 1).unwrap();
        w.close_def().unwrap();
        w.close_def().unwrap();
        w.close_unit().unwrap();
        w.close_session().unwrap();

        let x = store.def_by_ref(&gref("com.test X")).unwrap().unwrap();
        let uses = store.uses_of(&x, &CancelToken::new()).unwrap();
        assert_eq!(
            uses.get(&Source::file("/proj/U2.x")),
            Some(&vec![42]),
            "expected the cross-unit use at offset 42"
        );
        assert!(!uses.contains_key(&Source::file("/proj/U1.x")));
    });
}

#[test]
fn same_unit_uses_come_from_the_defining_unit() {
    with_stores(|store| {
        let mut w = BatchWriter::new(store.clone());
        w.open_session().unwrap();
        w.open_unit(&Source::file("/proj/Self.x")).unwrap();
        let module = gref("com.test");
        open_def(&mut w, &module, "com.test", Kind::Module, true, 0);
        open_def(&mut w, &module.plus("X"), "X", Kind::Type, true, 10);
        w.close_def().unwrap();
        open_def(&mut w, &module.plus("Y"), "Y", Kind::Type, true, 20);
        w.emit_use(&gref("com.test X"), Kind::Type, 33, 1).unwrap();
        w.close_def().unwrap();
        w.close_def().unwrap();
        w.close_unit().unwrap();
        w.close_session().unwrap();

        let x = store.def_by_ref(&gref("com.test X")).unwrap().unwrap();
        let uses = store.uses_of(&x, &CancelToken::new()).unwrap();
        assert_eq!(uses.get(&Source::file("/proj/Self.x")), Some(&vec![33]));
    });
}

#[test]
fn visit_delivers_defs_then_their_uses() {
    with_stores(|store| {
        let mut w = BatchWriter::new(store.clone());
        w.open_session().unwrap();
        w.open_unit(&Source::file("/proj/V.x")).unwrap();
        let module = gref("com.test");
        open_def(&mut w, &module, "com.test", Kind::Module, true, 0);
        open_def(&mut w, &module.plus("f"), "f", Kind::Func, true, 10);
        w.emit_use(&gref("com.test g"), Kind::Func, 15, 1).unwrap();
        w.close_def().unwrap();
        w.close_def().unwrap();
        w.close_unit().unwrap();
        w.close_session().unwrap();

        let mut log = Vec::new();
        let visited = store
            .visit(&Source::file("/proj/V.x"), &mut |el| {
                log.push((el.kind(), el.offset()));
            })
            .unwrap();
        assert!(visited);
        assert!(log.contains(&(Kind::Func, 10)));
        assert!(log.contains(&(Kind::Func, 15)));

        let visited = store
            .visit(&Source::file("/proj/Other.x"), &mut |_| {})
            .unwrap();
        assert!(!visited);
    });
}

#[test]
fn absent_entities_fail_the_right_way() {
    with_stores(|store| {
        write_simple_unit(&store, "/proj/pkg/F.x", &["foo"]);

        assert!(matches!(
            store.source_defs(&Source::file("/nope.x")),
            Err(Error::UnknownSource(_))
        ));
        assert!(matches!(store.def(999_999_999), Err(Error::NoSuchDef(_))));
        assert!(store.def_by_ref(&gref("com.test nope")).unwrap().is_none());
        assert_eq!(store.last_indexed(&Source::file("/nope.x")).unwrap(), 0);
        assert!(store.last_indexed(&Source::file("/proj/pkg/F.x")).unwrap() > 0);
    });
}

#[test]
fn cancellation_stops_queries() {
    with_stores(|store| {
        write_simple_unit(&store, "/proj/pkg/F.x", &["foo"]);

        let token = CancelToken::new();
        token.cancel();
        let mut hits = Vec::new();
        assert!(matches!(
            store.find(&Query::prefix(""), false, &mut hits, &token),
            Err(Error::Cancelled)
        ));
    });
}

#[test]
fn closed_stores_reject_everything() {
    with_stores(|store| {
        write_simple_unit(&store, "/proj/pkg/F.x", &["foo"]);
        store.close().unwrap();

        assert!(matches!(
            store.def(defmap_store::to_def_id(1, 1)),
            Err(Error::Storage(StorageError::Closed))
        ));
        assert!(matches!(
            store.top_level_defs(),
            Err(Error::Storage(StorageError::Closed))
        ));
    });
}

#[test]
fn persistent_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("p.defmap");

    {
        let store = RedbStore::open("p", &path).unwrap();
        let store: Arc<dyn TestStore> = store;
        write_simple_unit(&store, "/proj/pkg/F.x", &["foo"]);
        store.close().unwrap();
    }

    let store = RedbStore::open("p", &path).unwrap();
    let foo = store.def_by_ref(&gref("com.test foo")).unwrap().unwrap();
    assert_eq!(foo.name, "foo");
    assert!(store.last_indexed(&Source::file("/proj/pkg/F.x")).unwrap() > 0);
    store.close().unwrap();
}

#[test]
fn unreadable_database_is_rebuilt() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("junk.defmap");
    std::fs::write(&path, b"this is not a database").unwrap();

    let store = RedbStore::open("junk", &path).unwrap();
    assert_eq!(store.def_count().unwrap(), 0);
    store.close().unwrap();
}

#[test]
fn clear_wipes_everything() {
    with_stores(|store| {
        write_simple_unit(&store, "/proj/pkg/F.x", &["foo"]);
        assert!(store.def_by_ref(&gref("com.test foo")).unwrap().is_some());
    });

    // clear is exposed on the concrete types
    let mem = MemStore::new("clear-test");
    {
        let store: Arc<dyn TestStore> = mem.clone();
        write_simple_unit(&store, "/proj/pkg/F.x", &["foo"]);
    }
    mem.clear().unwrap();
    assert_eq!(mem.def_count().unwrap(), 0);
    assert!(mem.def_by_ref(&gref("com.test foo")).unwrap().is_none());

    let dir = tempfile::tempdir().unwrap();
    let redb = RedbStore::open("clear-test", dir.path().join("c.defmap")).unwrap();
    {
        let store: Arc<dyn TestStore> = redb.clone();
        write_simple_unit(&store, "/proj/pkg/F.x", &["foo"]);
    }
    redb.clear().unwrap();
    assert_eq!(redb.def_count().unwrap(), 0);
    assert!(redb.def_by_ref(&gref("com.test foo")).unwrap().is_none());
}
