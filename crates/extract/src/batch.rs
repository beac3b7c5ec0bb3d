use std::sync::Arc;

use defmap_model::{Access, Error, Flavor, GlobalRef, Kind, Relation, Result, Source};

use crate::writer::Writer;

/// One buffered use occurrence.
#[derive(Clone, Debug)]
pub struct UseTree {
    pub target: GlobalRef,
    pub kind: Kind,
    pub offset: u32,
    pub length: u32,
}

/// One buffered signature.
#[derive(Clone, Debug)]
pub struct SigTree {
    pub text: String,
    pub uses: Vec<UseTree>,
}

/// One buffered doc region.
#[derive(Clone, Debug)]
pub struct DocTree {
    pub offset: u32,
    pub length: u32,
    pub uses: Vec<UseTree>,
}

/// One buffered def with everything nested inside it.
#[derive(Clone, Debug)]
pub struct DefTree {
    pub gref: GlobalRef,
    pub name: String,
    pub kind: Kind,
    pub flavor: Flavor,
    pub exported: bool,
    pub access: Access,
    pub offset: u32,
    pub body_start: u32,
    pub body_end: u32,
    pub sig: Option<SigTree>,
    pub doc: Option<DocTree>,
    pub relations: Vec<(Relation, GlobalRef)>,
    pub uses: Vec<UseTree>,
    pub defs: Vec<DefTree>,
    /// Assigned by the store during its first pass; 0 until then.
    pub assigned_id: i64,
}

/// One compilation unit's buffered def tree, handed to the store whole.
#[derive(Clone, Debug)]
pub struct UnitTree {
    pub source: Source,
    pub defs: Vec<DefTree>,
}

/// The hook through which a buffered unit reaches a store. Stores
/// implement this; `store_unit` must be atomic with respect to readers.
pub trait UnitSink {
    fn open_session(&self) -> Result<()>;
    fn store_unit(&self, unit: UnitTree) -> Result<()>;
    fn close_session(&self) -> Result<()>;
}

impl<T: UnitSink + ?Sized> UnitSink for Arc<T> {
    fn open_session(&self) -> Result<()> {
        (**self).open_session()
    }

    fn store_unit(&self, unit: UnitTree) -> Result<()> {
        (**self).store_unit(unit)
    }

    fn close_session(&self) -> Result<()> {
        (**self).close_session()
    }
}

/// A writer that batches up all of the defs and uses for a single
/// compilation unit and flushes them to a [`UnitSink`] at `close_unit`.
/// Out-of-grammar events fail with `Error::Protocol` and leave the
/// writer recoverable via [`Writer::abort_unit`].
pub struct BatchWriter<S: UnitSink> {
    sink: S,
    session_open: bool,
    source: Option<Source>,
    roots: Vec<DefTree>,
    stack: Vec<DefTree>,
}

impl<S: UnitSink> BatchWriter<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            session_open: false,
            source: None,
            roots: Vec::new(),
            stack: Vec::new(),
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn cur(&mut self, event: &str) -> Result<&mut DefTree> {
        self.stack
            .last_mut()
            .ok_or_else(|| Error::Protocol(format!("{event} outside of an open def")))
    }

    fn check_target(event: &str, target: &GlobalRef) -> Result<()> {
        if target.is_root() {
            return Err(Error::Protocol(format!("{event} targeting the root ref")));
        }
        Ok(())
    }

    fn require_unit(&self, event: &str) -> Result<()> {
        if !self.session_open {
            return Err(Error::Protocol(format!("{event} outside of a session")));
        }
        if self.source.is_none() {
            return Err(Error::Protocol(format!("{event} outside of a unit")));
        }
        Ok(())
    }
}

impl<S: UnitSink> Writer for BatchWriter<S> {
    fn open_session(&mut self) -> Result<()> {
        if self.session_open {
            return Err(Error::Protocol("open_session with a session open".into()));
        }
        self.sink.open_session()?;
        self.session_open = true;
        Ok(())
    }

    fn open_unit(&mut self, source: &Source) -> Result<()> {
        if !self.session_open {
            return Err(Error::Protocol("open_unit outside of a session".into()));
        }
        if self.source.is_some() {
            return Err(Error::Protocol("open_unit with a unit open".into()));
        }
        self.source = Some(source.clone());
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn open_def(
        &mut self,
        id: &GlobalRef,
        name: &str,
        kind: Kind,
        flavor: Flavor,
        exported: bool,
        access: Access,
        offset: u32,
        body_start: u32,
        body_end: u32,
    ) -> Result<()> {
        self.require_unit("open_def")?;
        Self::check_target("open_def", id)?;
        self.stack.push(DefTree {
            gref: id.clone(),
            name: name.to_owned(),
            kind,
            flavor,
            exported,
            access,
            offset,
            body_start,
            body_end,
            sig: None,
            doc: None,
            relations: Vec::new(),
            uses: Vec::new(),
            defs: Vec::new(),
            assigned_id: 0,
        });
        Ok(())
    }

    fn emit_sig(&mut self, text: &str) -> Result<()> {
        let def = self.cur("emit_sig")?;
        if def.sig.is_some() {
            return Err(Error::Protocol("emit_sig twice for one def".into()));
        }
        def.sig = Some(SigTree {
            text: text.to_owned(),
            uses: Vec::new(),
        });
        Ok(())
    }

    fn emit_sig_use(
        &mut self,
        target: &GlobalRef,
        kind: Kind,
        offset: u32,
        length: u32,
    ) -> Result<()> {
        Self::check_target("emit_sig_use", target)?;
        let def = self.cur("emit_sig_use")?;
        let sig = def
            .sig
            .as_mut()
            .ok_or_else(|| Error::Protocol("emit_sig_use without emit_sig".into()))?;
        sig.uses.push(UseTree {
            target: target.clone(),
            kind,
            offset,
            length,
        });
        Ok(())
    }

    fn emit_doc(&mut self, offset: u32, length: u32) -> Result<()> {
        let def = self.cur("emit_doc")?;
        if def.doc.is_some() {
            return Err(Error::Protocol("emit_doc twice for one def".into()));
        }
        def.doc = Some(DocTree {
            offset,
            length,
            uses: Vec::new(),
        });
        Ok(())
    }

    fn emit_doc_use(
        &mut self,
        target: &GlobalRef,
        kind: Kind,
        offset: u32,
        length: u32,
    ) -> Result<()> {
        Self::check_target("emit_doc_use", target)?;
        let def = self.cur("emit_doc_use")?;
        let doc = def
            .doc
            .as_mut()
            .ok_or_else(|| Error::Protocol("emit_doc_use without emit_doc".into()))?;
        doc.uses.push(UseTree {
            target: target.clone(),
            kind,
            offset,
            length,
        });
        Ok(())
    }

    fn emit_relation(&mut self, relation: Relation, target: &GlobalRef) -> Result<()> {
        Self::check_target("emit_relation", target)?;
        let def = self.cur("emit_relation")?;
        def.relations.push((relation, target.clone()));
        Ok(())
    }

    fn emit_use(&mut self, target: &GlobalRef, kind: Kind, offset: u32, length: u32) -> Result<()> {
        Self::check_target("emit_use", target)?;
        let def = self.cur("emit_use")?;
        def.uses.push(UseTree {
            target: target.clone(),
            kind,
            offset,
            length,
        });
        Ok(())
    }

    fn close_def(&mut self) -> Result<()> {
        let def = self
            .stack
            .pop()
            .ok_or_else(|| Error::Protocol("close_def with no open def".into()))?;
        match self.stack.last_mut() {
            Some(parent) => parent.defs.push(def),
            None => self.roots.push(def),
        }
        Ok(())
    }

    fn close_unit(&mut self) -> Result<()> {
        self.require_unit("close_unit")?;
        if !self.stack.is_empty() {
            return Err(Error::Protocol(format!(
                "close_unit with {} open defs",
                self.stack.len()
            )));
        }
        let source = self.source.take().expect("unit checked open");
        let defs = std::mem::take(&mut self.roots);
        self.sink.store_unit(UnitTree { source, defs })
    }

    fn close_session(&mut self) -> Result<()> {
        if !self.session_open {
            return Err(Error::Protocol("close_session without a session".into()));
        }
        if self.source.is_some() {
            return Err(Error::Protocol("close_session with a unit open".into()));
        }
        self.session_open = false;
        self.sink.close_session()
    }

    fn abort_unit(&mut self) {
        self.source = None;
        self.roots.clear();
        self.stack.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Collects stored units for inspection.
    #[derive(Default)]
    struct CollectSink {
        units: Mutex<Vec<UnitTree>>,
    }

    impl UnitSink for CollectSink {
        fn open_session(&self) -> Result<()> {
            Ok(())
        }

        fn store_unit(&self, unit: UnitTree) -> Result<()> {
            self.units.lock().unwrap().push(unit);
            Ok(())
        }

        fn close_session(&self) -> Result<()> {
            Ok(())
        }
    }

    fn gref(s: &str) -> GlobalRef {
        GlobalRef::from_string(s)
    }

    fn open(w: &mut BatchWriter<Arc<CollectSink>>, id: &GlobalRef, name: &str, kind: Kind) {
        w.open_def(id, name, kind, Flavor::None, true, Access::Public, 0, 0, 0)
            .unwrap();
    }

    #[test]
    fn buffers_one_unit() {
        let sink = Arc::new(CollectSink::default());
        let mut w = BatchWriter::new(sink.clone());
        w.open_session().unwrap();
        w.open_unit(&Source::file("/p/F.scala")).unwrap();
        let module = gref("com.test");
        open(&mut w, &module, "com.test", Kind::Module);
        open(&mut w, &module.plus("foo"), "foo", Kind::Func);
        w.emit_sig("def foo ()").unwrap();
        w.emit_use(&gref("com.test bar"), Kind::Func, 17, 3).unwrap();
        w.close_def().unwrap();
        w.close_def().unwrap();
        w.close_unit().unwrap();
        w.close_session().unwrap();

        let units = sink.units.lock().unwrap();
        assert_eq!(units.len(), 1);
        let unit = &units[0];
        assert_eq!(unit.defs.len(), 1);
        assert_eq!(unit.defs[0].name, "com.test");
        assert_eq!(unit.defs[0].defs.len(), 1);
        let foo = &unit.defs[0].defs[0];
        assert_eq!(foo.name, "foo");
        assert_eq!(foo.sig.as_ref().unwrap().text, "def foo ()");
        assert_eq!(foo.uses.len(), 1);
    }

    #[test]
    fn sig_use_requires_sig() {
        let mut w = BatchWriter::new(Arc::new(CollectSink::default()));
        w.open_session().unwrap();
        w.open_unit(&Source::file("/p/F.scala")).unwrap();
        open(&mut w, &gref("com.test"), "com.test", Kind::Module);
        let err = w
            .emit_sig_use(&gref("com.test bar"), Kind::Func, 0, 3)
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn close_def_at_top_is_a_violation() {
        let mut w = BatchWriter::new(Arc::new(CollectSink::default()));
        w.open_session().unwrap();
        w.open_unit(&Source::file("/p/F.scala")).unwrap();
        assert!(matches!(w.close_def(), Err(Error::Protocol(_))));
    }

    #[test]
    fn root_ref_is_rejected() {
        let mut w = BatchWriter::new(Arc::new(CollectSink::default()));
        w.open_session().unwrap();
        w.open_unit(&Source::file("/p/F.scala")).unwrap();
        let err = w
            .open_def(
                &GlobalRef::root(),
                "",
                Kind::Module,
                Flavor::None,
                true,
                Access::Public,
                0,
                0,
                0,
            )
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn close_unit_with_open_defs_is_a_violation() {
        let mut w = BatchWriter::new(Arc::new(CollectSink::default()));
        w.open_session().unwrap();
        w.open_unit(&Source::file("/p/F.scala")).unwrap();
        open(&mut w, &gref("com.test"), "com.test", Kind::Module);
        assert!(matches!(w.close_unit(), Err(Error::Protocol(_))));
    }

    #[test]
    fn abort_unit_recovers_the_stream() {
        let sink = Arc::new(CollectSink::default());
        let mut w = BatchWriter::new(sink.clone());
        w.open_session().unwrap();
        w.open_unit(&Source::file("/p/Bad.scala")).unwrap();
        open(&mut w, &gref("com.test"), "com.test", Kind::Module);
        assert!(w.close_unit().is_err());
        w.abort_unit();

        w.open_unit(&Source::file("/p/Good.scala")).unwrap();
        open(&mut w, &gref("com.good"), "com.good", Kind::Module);
        w.close_def().unwrap();
        w.close_unit().unwrap();
        w.close_session().unwrap();

        let units = sink.units.lock().unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].source, Source::file("/p/Good.scala"));
    }
}
