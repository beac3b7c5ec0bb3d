use defmap_model::{
    Access, Def, Doc, Flavor, GlobalRef, Kind, ProjectHandle, Ref, Sig, Use,
};

/// Handle-free mirror of [`Def`] as stored in tables. Stored records must
/// not hold project handles (a stored `Arc` back to the owning store
/// would keep it alive forever); reads attach the handle on the way out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct DefData {
    pub id: i64,
    pub outer_id: Option<i64>,
    pub kind: Kind,
    pub flavor: Flavor,
    pub exported: bool,
    pub access: Access,
    pub name: String,
    pub offset: u32,
    pub body_start: u32,
    pub body_end: u32,
}

impl DefData {
    pub fn attach(&self, project: &ProjectHandle) -> Def {
        Def {
            project: project.clone(),
            id: self.id,
            outer_id: self.outer_id,
            kind: self.kind,
            flavor: self.flavor,
            exported: self.exported,
            access: self.access,
            name: self.name.clone(),
            offset: self.offset,
            body_start: self.body_start,
            body_end: self.body_end,
        }
    }
}

/// Handle-free mirror of [`Ref`]. Local refs are implicitly refs into the
/// owning store.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum RefData {
    Local(i64),
    Global(GlobalRef),
}

impl RefData {
    pub fn attach(&self, project: &ProjectHandle) -> Ref {
        match self {
            RefData::Local(id) => Ref::local(project.clone(), *id),
            RefData::Global(gref) => Ref::global(gref.clone()),
        }
    }

    /// The string under which this ref keys inverse indices: `l<id>` for
    /// local refs, the space-joined name for global ones.
    pub fn key_string(&self) -> String {
        match self {
            RefData::Local(id) => format!("l{id}"),
            RefData::Global(gref) => gref.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct UseData {
    pub target: RefData,
    pub kind: Kind,
    pub offset: u32,
    pub length: u32,
}

impl UseData {
    pub fn attach(&self, project: &ProjectHandle) -> Use {
        Use {
            target: self.target.attach(project),
            ref_kind: self.kind,
            offset: self.offset,
            length: self.length,
        }
    }
}

pub(crate) fn attach_uses(uses: &[UseData], project: &ProjectHandle) -> Vec<Use> {
    uses.iter().map(|u| u.attach(project)).collect()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct SigData {
    pub text: String,
    pub uses: Vec<UseData>,
}

impl SigData {
    pub fn attach(&self, project: &ProjectHandle) -> Sig {
        Sig {
            text: self.text.clone(),
            uses: attach_uses(&self.uses, project),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct DocData {
    pub offset: u32,
    pub length: u32,
    pub uses: Vec<UseData>,
}

impl DocData {
    pub fn attach(&self, project: &ProjectHandle) -> Doc {
        Doc {
            offset: self.offset,
            length: self.length,
            uses: attach_uses(&self.uses, project),
        }
    }
}

/// Per-unit metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct SourceInfo {
    pub source: String,
    pub indexed: i64,
}
