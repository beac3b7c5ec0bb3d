use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::intern::intern;
use crate::project::ProjectHandle;

/// A persistent, interned hierarchical name that identifies a def across
/// projects. Structurally a linked chain of interned segments; cloning is
/// cheap and equality on shared chains is a pointer comparison.
#[derive(Clone)]
pub struct GlobalRef(Arc<Node>);

struct Node {
    parent: Option<GlobalRef>,
    segment: &'static str,
}

static ROOT: Lazy<GlobalRef> = Lazy::new(|| {
    GlobalRef(Arc::new(Node {
        parent: None,
        segment: "",
    }))
});

impl GlobalRef {
    /// The root global name. Forbidden as a writer-event argument.
    pub fn root() -> GlobalRef {
        ROOT.clone()
    }

    pub fn is_root(&self) -> bool {
        self.0.parent.is_none()
    }

    /// Returns a global ref with `self` as its parent and `segment` as its
    /// leaf. The segment is interned.
    #[must_use]
    pub fn plus(&self, segment: &str) -> GlobalRef {
        GlobalRef(Arc::new(Node {
            parent: Some(self.clone()),
            segment: intern(segment),
        }))
    }

    /// The parent component, or `None` for the root.
    pub fn parent(&self) -> Option<&GlobalRef> {
        self.0.parent.as_ref()
    }

    /// The leaf segment. Empty for the root.
    pub fn segment(&self) -> &'static str {
        self.0.segment
    }

    /// Builds a ref from root through the supplied segments.
    pub fn from_segments<'a, I: IntoIterator<Item = &'a str>>(segments: I) -> GlobalRef {
        segments
            .into_iter()
            .fold(GlobalRef::root(), |r, seg| r.plus(seg))
    }

    /// Parses the space-joined serialized form produced by `Display`. The
    /// empty string parses to the root.
    pub fn from_string(s: &str) -> GlobalRef {
        GlobalRef::from_segments(s.split(' ').filter(|seg| !seg.is_empty()))
    }

    fn write(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(parent) = &self.0.parent {
            if !parent.is_root() {
                parent.write(f)?;
                f.write_str(" ")?;
            }
            f.write_str(self.0.segment)?;
        }
        Ok(())
    }
}

impl PartialEq for GlobalRef {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        // interned segments compare by pointer
        std::ptr::eq(self.0.segment, other.0.segment)
            && match (&self.0.parent, &other.0.parent) {
                (None, None) => true,
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
    }
}

impl Eq for GlobalRef {}

impl Hash for GlobalRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.0.parent {
            None => 13i32.hash(state),
            Some(parent) => {
                parent.hash(state);
                (self.0.segment.as_ptr() as usize).hash(state);
            }
        }
    }
}

impl fmt::Display for GlobalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write(f)
    }
}

impl fmt::Debug for GlobalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GlobalRef({self})")
    }
}

/// Uniquely identifies a def: either a compact id within a known project,
/// or a global name resolvable across projects.
#[derive(Clone)]
pub enum Ref {
    Local { project: ProjectHandle, id: i64 },
    Global(GlobalRef),
}

impl Ref {
    pub fn local(project: ProjectHandle, id: i64) -> Ref {
        Ref::Local { project, id }
    }

    pub fn global(gref: GlobalRef) -> Ref {
        Ref::Global(gref)
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Ref::Local { .. })
    }
}

fn project_addr(project: &ProjectHandle) -> usize {
    Arc::as_ptr(project) as *const () as usize
}

impl PartialEq for Ref {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Ref::Local { project: pa, id: ia }, Ref::Local { project: pb, id: ib }) => {
                ia == ib && project_addr(pa) == project_addr(pb)
            }
            (Ref::Global(a), Ref::Global(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Ref {}

impl Hash for Ref {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Ref::Local { project, id } => {
                id.hash(state);
                project_addr(project).hash(state);
            }
            Ref::Global(gref) => gref.hash(state),
        }
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ref::Local { id, .. } => write!(f, "l{id}"),
            Ref::Global(gref) => fmt::Display::fmt(gref, f),
        }
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ref::Local { project, id } => write!(f, "Ref::Local({}, {id})", project.name()),
            Ref::Global(gref) => write!(f, "Ref::Global({gref})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_round_trips_as_empty() {
        assert!(GlobalRef::root().is_root());
        assert_eq!(GlobalRef::root().to_string(), "");
        assert_eq!(GlobalRef::from_string(""), GlobalRef::root());
    }

    #[test]
    fn string_grammar_round_trips() {
        let gref = GlobalRef::from_segments(["com.test", "Foo", "bar"]);
        assert_eq!(gref.to_string(), "com.test Foo bar");
        assert_eq!(GlobalRef::from_string("com.test Foo bar"), gref);
    }

    #[test]
    fn equality_ignores_construction_path() {
        let a = GlobalRef::root().plus("com.test").plus("Foo");
        let b = GlobalRef::from_string("com.test Foo");
        assert_eq!(a, b);
        assert_ne!(a, b.plus("more"));
    }

    #[test]
    fn hash_agrees_with_equality() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(GlobalRef::from_string("com.test Foo"));
        assert!(set.contains(&GlobalRef::root().plus("com.test").plus("Foo")));
        assert!(!set.contains(&GlobalRef::from_string("com.test")));
    }
}
