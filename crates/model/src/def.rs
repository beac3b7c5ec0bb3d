use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::kinds::{Access, Flavor, Kind};
use crate::project::ProjectHandle;
use crate::refs::{GlobalRef, Ref};
use crate::source::Source;

/// The definition of a name somewhere in code. Identity is
/// `(project, id)`; the project handle is non-owning and exists for the
/// lazy loads below.
#[derive(Clone)]
pub struct Def {
    /// The project that contains this def.
    pub project: ProjectHandle,
    /// Unique within the project: `unitId * 0x10000 + rawDefId`.
    pub id: i64,
    /// The id of the enclosing def, or `None` at top level. Always a def
    /// in the same project.
    pub outer_id: Option<i64>,
    pub kind: Kind,
    pub flavor: Flavor,
    /// Whether this def is visible outside its compilation unit. Not used
    /// for analysis, but to filter defs during searches.
    pub exported: bool,
    pub access: Access,
    /// The name introduced by this def.
    pub name: String,
    /// Character offset of the name token in the source text.
    pub offset: u32,
    /// Bounds of the def's lexical body.
    pub body_start: u32,
    pub body_end: u32,
}

impl Def {
    /// A local ref for this def.
    pub fn to_ref(&self) -> Ref {
        Ref::local(self.project.clone(), self.id)
    }

    /// The def lexically enclosing this one, if any.
    pub fn outer(&self) -> Result<Option<Def>> {
        match self.outer_id {
            None => Ok(None),
            Some(outer_id) => self.project.def(outer_id).map(Some),
        }
    }

    /// The defs nested immediately inside this one.
    pub fn members(&self) -> Result<Vec<Def>> {
        self.project.defs_in(self.id)
    }

    /// The uses nested directly in this def's body.
    pub fn uses(&self) -> Result<Vec<Use>> {
        self.project.uses_in(self.id)
    }

    pub fn sig(&self) -> Result<Option<Sig>> {
        self.project.sig(self.id)
    }

    pub fn doc(&self) -> Result<Option<Doc>> {
        self.project.doc(self.id)
    }

    /// The source this def was extracted from.
    pub fn source(&self) -> Result<Source> {
        self.project.source(self.id)
    }

    /// The global name registered for this def, if it is exported.
    pub fn global_ref(&self) -> Result<Option<GlobalRef>> {
        self.project.ref_for(self.id)
    }
}

impl PartialEq for Def {
    fn eq(&self, other: &Self) -> bool {
        Arc::as_ptr(&self.project) as *const () == Arc::as_ptr(&other.project) as *const ()
            && self.id == other.id
            && self.outer_id == other.outer_id
            && self.kind == other.kind
            && self.flavor == other.flavor
            && self.exported == other.exported
            && self.access == other.access
            && self.name == other.name
            && self.offset == other.offset
            && self.body_start == other.body_start
            && self.body_end == other.body_end
    }
}

impl Eq for Def {}

impl fmt::Debug for Def {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Def")
            .field("project", &self.project.name())
            .field("id", &self.project.id_to_string(self.id))
            .field("outer_id", &self.outer_id)
            .field("kind", &self.kind)
            .field("flavor", &self.flavor)
            .field("exported", &self.exported)
            .field("access", &self.access)
            .field("name", &self.name)
            .field("offset", &self.offset)
            .finish()
    }
}

/// The use of a name somewhere in code, owned by the def whose body
/// contains it.
#[derive(Clone, PartialEq, Eq)]
pub struct Use {
    /// The referent.
    pub target: Ref,
    /// The kind of the referent.
    pub ref_kind: Kind,
    /// Character offset of this use. Absolute in the source text for body
    /// uses; relative to the sig text or doc start for sig/doc uses.
    pub offset: u32,
    /// Length of the use string, in characters.
    pub length: u32,
}

impl fmt::Debug for Use {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Use({} {} @{}+{})",
            self.target, self.ref_kind, self.offset, self.length
        )
    }
}

/// A def's one-line declaration, with the references that occur inside
/// it. Use offsets are relative to the start of `text`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Sig {
    /// The text of the signature; may contain newlines.
    pub text: String,
    pub uses: Vec<Use>,
}

/// A def's documentation region. `offset` is absolute in the source file;
/// use offsets are relative to `offset`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Doc {
    pub offset: u32,
    pub length: u32,
    pub uses: Vec<Use>,
}
