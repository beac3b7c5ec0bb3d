//! Cross-store resolution and query dispatch.

use std::sync::Arc;

use defmap_codex::Codex;
use defmap_extract::{BatchWriter, TokenExtractor, Writer};
use defmap_model::{Access, Flavor, GlobalRef, Kind, Ref, Source};
use defmap_store::{Locality, MemStore, ProjectStore, Query};

fn gref(s: &str) -> GlobalRef {
    GlobalRef::from_string(s)
}

/// Indexes one unit containing `module` with the given (name, kind,
/// exported) members.
fn index_unit(store: &Arc<MemStore>, path: &str, module: &str, defs: &[(&str, Kind, bool)]) {
    let mut w = BatchWriter::new(store.clone());
    w.open_session().unwrap();
    w.open_unit(&Source::file(path)).unwrap();
    let mid = gref(module);
    w.open_def(&mid, module, Kind::Module, Flavor::None, true, Access::Public, 0, 0, 0)
        .unwrap();
    for (i, (name, kind, exported)) in defs.iter().enumerate() {
        let off = 10 + i as u32;
        w.open_def(
            &mid.plus(name),
            name,
            *kind,
            Flavor::None,
            *exported,
            Access::Public,
            off,
            off,
            off,
        )
        .unwrap();
        w.close_def().unwrap();
    }
    w.close_def().unwrap();
    w.close_unit().unwrap();
    w.close_session().unwrap();
}

#[test]
fn prefix_query_against_a_single_store() {
    let store = MemStore::new("main");
    index_unit(
        &store,
        "/proj/F.x",
        "com.test",
        &[("foo", Kind::Func, true), ("forge", Kind::Type, true)],
    );

    let codex = Codex::new(vec![store]);
    let hits = codex.find(&Query::prefix("fo").kind(Kind::Func)).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].name, "foo");
}

#[test]
fn resolve_prefers_higher_precedence_stores() {
    let a = MemStore::new("a");
    let b = MemStore::new("b");
    index_unit(&b, "/dep/Object.x", "java.lang", &[("Object", Kind::Type, true)]);

    let codex = Codex::new(vec![a.clone(), b.clone()]);
    let target = Ref::global(gref("java.lang Object"));

    // only b knows the name
    let def = codex.resolve(&target).unwrap().unwrap();
    assert_eq!(def.project.name(), "b");

    // a duplicate in the primary store wins
    index_unit(&a, "/proj/Object.x", "java.lang", &[("Object", Kind::Type, true)]);
    let def = codex.resolve(&target).unwrap().unwrap();
    assert_eq!(def.project.name(), "a");
}

#[test]
fn resolve_local_refs_directly() {
    let store = MemStore::new("main");
    index_unit(&store, "/proj/F.x", "com.test", &[("foo", Kind::Func, true)]);

    let foo = store.def_by_ref(&gref("com.test foo")).unwrap().unwrap();
    let codex = Codex::new(vec![store]);
    let resolved = codex.resolve(&foo.to_ref()).unwrap().unwrap();
    assert_eq!(resolved.id, foo.id);
    assert_eq!(resolved.name, "foo");
}

#[test]
fn locality_filters_dependent_stores() {
    let primary = MemStore::new("primary");
    let dep = MemStore::new("dep");
    index_unit(
        &primary,
        "/proj/P.x",
        "com.test",
        &[("hidden", Kind::Func, false)],
    );
    index_unit(
        &dep,
        "/dep/D.x",
        "com.dep",
        &[("hidden", Kind::Func, false)],
    );

    let codex = Codex::new(vec![primary, dep]);

    // default locality: everything from the primary, exported only from
    // dependents
    let query = Query::name("hidden");
    assert_eq!(query.locality, Locality::ExportedDependents);
    let hits = codex.find(&query).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].project.name(), "primary");

    let hits = codex.find(&Query::name("hidden").all()).unwrap();
    assert_eq!(hits.len(), 2);

    let hits = codex.find(&Query::name("hidden").exported_only()).unwrap();
    assert!(hits.is_empty());
}

#[test]
fn store_for_picks_the_first_indexed() {
    let a = MemStore::new("a");
    let b = MemStore::new("b");
    index_unit(&b, "/dep/D.x", "com.dep", &[]);

    let codex = Codex::new(vec![a, b]);
    let store = codex
        .store_for(&Source::file("/dep/D.x"))
        .unwrap()
        .expect("b indexed it");
    assert_eq!(store.name(), "b");
    assert!(codex.store_for(&Source::file("/none.x")).unwrap().is_none());
}

#[test]
fn visit_dispatches_to_the_owning_store() {
    let a = MemStore::new("a");
    let b = MemStore::new("b");
    index_unit(&b, "/dep/D.x", "com.dep", &[("f", Kind::Func, true)]);

    let codex = Codex::new(vec![a, b]);
    let mut count = 0;
    assert!(codex
        .visit(&Source::file("/dep/D.x"), &mut |_| count += 1)
        .unwrap());
    assert_eq!(count, 2); // the module and f

    assert!(!codex.visit(&Source::file("/none.x"), &mut |_| {}).unwrap());
}

#[test]
fn token_extracted_sources_are_queryable_end_to_end() {
    let code = "package com.test\n\
                object Foo {\n\
                \x20 class Bar {\n\
                \x20   def baz () {}\n\
                \x20 }\n\
                }\n";

    let store = MemStore::new("scala");
    let mut w = BatchWriter::new(store.clone());
    TokenExtractor::new()
        .process_str("TestA.scala", code, &mut w)
        .unwrap();

    let baz = store
        .def_by_ref(&gref("com.test Foo Bar baz"))
        .unwrap()
        .expect("baz extracted");
    assert_eq!(baz.name, "baz");
    assert_eq!(baz.kind, Kind::Func);
    assert_eq!(baz.outer().unwrap().unwrap().name, "Bar");

    let codex = Codex::new(vec![store]);
    let hits = codex.find(&Query::prefix("ba").kind(Kind::Func)).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].name, "baz");
}
